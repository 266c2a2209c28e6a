//! 软元件分配：助记符位块 + 定时器 / 速度 / ProsTime 辅助字软元件。
//!
//! 助记符位块按记录 upsert；辅助分配表每次运行整表替换。

pub mod mnemonic;
pub mod pros_time;
pub mod speed;
pub mod timer;

use log::info;

pub use mnemonic::{allocate_mnemonic_devices, MnemonicAllocationRequest};
pub use pros_time::{
    allocate_pros_time_devices, ProsTimeCategoryTable, ProsTimeDefinition, ProsTimeOffsets,
};
pub use speed::allocate_speed_devices;
pub use timer::{allocate_timer_devices, TimerOffsets};

use crate::application::cancel::CancellationToken;
use crate::domain::model::{ConfigSnapshot, MnemonicType, RecordIndex};
use crate::error::{ErrorAggregator, GenerateError};
use crate::ports::AllocationRepository;
use crate::settings::{DeviceOffsets, GeneratorSettings};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocationSummary {
    pub processes: usize,
    pub process_details: usize,
    pub operations: usize,
    pub cylinders: usize,
    pub timers: usize,
    pub speeds: usize,
    pub pros_time_slots: usize,
}

/// 按 Process → ProcessDetail → Operation → Cylinder → Timer → Speed → ProsTime 顺序完成一次分配，
/// 结束时调用 `flush`。
#[allow(clippy::too_many_arguments)]
pub fn allocate_all(
    repository: &mut dyn AllocationRepository,
    snapshot: &ConfigSnapshot,
    records: &RecordIndex<'_>,
    settings: &GeneratorSettings,
    offsets: &DeviceOffsets,
    pros_time_table: &ProsTimeCategoryTable,
    errors: &mut ErrorAggregator,
    cancel: &CancellationToken,
) -> Result<AllocationSummary, GenerateError> {
    let plc_id = snapshot.plc_id;
    let label = settings.device_label.as_str();
    let request = |m: MnemonicType, offset: u32| {
        MnemonicAllocationRequest::for_type(m, plc_id, label, offset)
    };

    let processes = snapshot.ordered_processes();
    let details = snapshot.ordered_details();
    let operations = snapshot.ordered_operations();
    let cylinders = snapshot.ordered_cylinders();

    let mut summary = AllocationSummary {
        processes: allocate_mnemonic_devices(
            repository,
            &request(MnemonicType::Process, offsets.process),
            &processes,
            cancel,
        )?
        .len(),
        process_details: allocate_mnemonic_devices(
            repository,
            &request(MnemonicType::ProcessDetail, offsets.process_detail),
            &details,
            cancel,
        )?
        .len(),
        operations: allocate_mnemonic_devices(
            repository,
            &request(MnemonicType::Operation, offsets.operation),
            &operations,
            cancel,
        )?
        .len(),
        cylinders: allocate_mnemonic_devices(
            repository,
            &request(MnemonicType::Cylinder, offsets.cylinder),
            &cylinders,
            cancel,
        )?
        .len(),
        ..AllocationSummary::default()
    };

    summary.timers = allocate_timer_devices(
        repository,
        plc_id,
        TimerOffsets {
            timer: offsets.timer,
            timer_value: offsets.timer_value,
        },
        &snapshot.ordered_timers(),
        records,
        errors,
        cancel,
    )?
    .len();

    summary.speeds =
        allocate_speed_devices(repository, plc_id, offsets.speed, &cylinders, cancel)?.len();

    summary.pros_time_slots = allocate_pros_time_devices(
        repository,
        plc_id,
        ProsTimeOffsets {
            current: offsets.pros_time_current,
            previous: offsets.pros_time_previous,
            cylinder: offsets.pros_time_cylinder,
        },
        pros_time_table,
        &operations,
        cancel,
    )?
    .len();

    repository.flush()?;
    info!(
        "alloc plc={} process={} detail={} operation={} cylinder={} timer={} speed={} prosTime={}",
        plc_id,
        summary.processes,
        summary.process_details,
        summary.operations,
        summary.cylinders,
        summary.timers,
        summary.speeds,
        summary.pros_time_slots
    );
    Ok(summary)
}
