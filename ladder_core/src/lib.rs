//! Core ladder generation crate.
//! Responsibilities: allocate controller devices for sequence-control records,
//! resolve IO tags, build per-record ladder instruction rows and export them as CSV.
//! Non-goals: configuration editing UI, database access, device transfer to the controller.

pub mod domain;
pub mod error;
pub mod settings;
pub mod ports;
pub mod adapters;
pub mod allocator;
pub mod resolver;
pub mod builder;
pub mod application;

pub use domain::ladder::{InstructionRow, LadderRows, Opcode};
pub use domain::model::{ConfigSnapshot, MnemonicType};
pub use error::{
    ErrorAggregator, ErrorKind, GenerateError, Severity, ValidationError, ValidationReportRow,
};
pub use settings::{DeviceOffsets, GeneratorSettings};
pub use ports::{AllocationRepository, IoChooser};
pub use adapters::{
    CancelChooser, CsvExporter, FirstCandidateChooser, InMemoryRepository, JsonFileRepository,
};
pub use allocator::ProsTimeCategoryTable;
pub use application::cancel::CancellationToken;
pub use application::service::{ExportReport, GenerationOutput, LadderService};
