pub mod chooser;
pub mod csv_export;
pub mod json_repository;
pub mod memory_repository;
pub mod pros_time_table;

pub use chooser::{CancelChooser, FirstCandidateChooser, PreferredNameChooser};
pub use csv_export::CsvExporter;
pub use json_repository::JsonFileRepository;
pub use memory_repository::{AllocationTables, InMemoryRepository};
