pub mod chooser;
pub mod repository;

pub use chooser::IoChooser;
pub use repository::AllocationRepository;
