//! 定时器分配：每个 (Timer × 使用记录) 对一个 T 软元件；外部类别另配 ZR 设定值字。

use log::debug;

use crate::application::cancel::CancellationToken;
use crate::domain::device::{Device, TimerDeviceAllocation};
use crate::domain::model::{PlcId, RecordIndex, Timer};
use crate::domain::roles::{timer_category, TIMER_DEVICE_LABEL, TIMER_VALUE_DEVICE_LABEL};
use crate::error::{ErrorAggregator, ErrorKind, GenerateError, RecordRef};
use crate::ports::AllocationRepository;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimerOffsets {
    /// T 起始编号
    pub timer: u32,
    /// ZR 设定值字起始编号
    pub timer_value: u32,
}

/// 删除该 PLC 的旧定时器表后整表重建。
///
/// - 类别缺失/未知 → MalformedConfiguration，跳过该定时器
/// - 使用记录不存在 → BrokenReference，跳过该对
pub fn allocate_timer_devices(
    repository: &mut dyn AllocationRepository,
    plc_id: PlcId,
    offsets: TimerOffsets,
    timers: &[&Timer],
    records: &RecordIndex<'_>,
    errors: &mut ErrorAggregator,
    cancel: &CancellationToken,
) -> Result<Vec<TimerDeviceAllocation>, GenerateError> {
    let mut out = Vec::new();
    let mut timer_seq: u32 = 0;
    let mut value_seq: u32 = 0;

    for timer in timers {
        cancel.check()?;

        let Some(category) = timer.category_id.and_then(timer_category) else {
            let owner_id = timer.record_ids.first().copied().unwrap_or(timer.id);
            errors.critical(
                ErrorKind::MalformedConfiguration,
                format!("timer '{}' has unknown category {:?}", timer.name, timer.category_id),
                RecordRef::new(timer.mnemonic_type, owner_id, timer.name.clone()),
            );
            continue;
        };

        for record_id in &timer.record_ids {
            if !records.contains(timer.mnemonic_type, *record_id) {
                errors.critical(
                    ErrorKind::BrokenReference,
                    format!(
                        "timer '{}' references missing {} {}",
                        timer.name,
                        timer.mnemonic_type.display_name(),
                        record_id
                    ),
                    RecordRef::new(timer.mnemonic_type, *record_id, timer.name.clone()),
                );
                continue;
            }

            let timer_device = Device::new(
                TIMER_DEVICE_LABEL,
                next_number(offsets.timer, &mut timer_seq, timer)?,
            );
            let value_device = if category.external {
                Some(Device::new(
                    TIMER_VALUE_DEVICE_LABEL,
                    next_number(offsets.timer_value, &mut value_seq, timer)?,
                ))
            } else {
                None
            };

            debug!(
                "timer {} for {} {} -> {} ({:?})",
                timer.id,
                timer.mnemonic_type.display_name(),
                record_id,
                timer_device,
                value_device
            );
            out.push(TimerDeviceAllocation {
                plc_id,
                timer_id: timer.id,
                mnemonic_type: timer.mnemonic_type,
                record_id: *record_id,
                category_id: category.id,
                timer_device,
                value_device,
                preset: timer.value,
            });
        }
    }

    repository.replace_timer_allocations(plc_id, out.clone())?;
    Ok(out)
}

fn next_number(offset: u32, seq: &mut u32, timer: &Timer) -> Result<u32, GenerateError> {
    let number = offset
        .checked_add(*seq)
        .ok_or(GenerateError::DeviceRangeOverflow {
            mnemonic: timer.mnemonic_type,
            offset,
            index: *seq as usize,
            stride: 1,
        })?;
    *seq += 1;
    Ok(number)
}
