//! ProsTime（工序计时）分配。
//!
//! 每个 Operation 按其类别查表得到槽数与每个槽代表的计时类别；
//! 每个槽分配 当前 / 上次 / 气缸 三路 ZR 字，三路各自从独立的起始编号连续递增，
//! 因此同一 Operation 的槽在每一路上都是连续块（BMOV/FMOV 可整块操作）。

use std::borrow::Cow;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::application::cancel::CancellationToken;
use crate::domain::device::{Device, ProsTimeAllocation};
use crate::domain::model::{MnemonicType, Operation, PlcId};
use crate::domain::roles::PROS_TIME_DEVICE_LABEL;
use crate::error::GenerateError;
use crate::ports::AllocationRepository;

pub const DEFAULT_SLOT_COUNT: u32 = 5;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProsTimeDefinition {
    pub operation_category_id: i32,
    pub count: u32,
    /// 槽序号 → 计时类别 ID；缺失的槽按序号 + 1 补齐
    #[serde(default)]
    pub category_ids: Vec<i32>,
}

impl ProsTimeDefinition {
    /// 表缺失时的默认定义：5 个槽，类别 1..5
    pub fn fallback(operation_category_id: i32) -> Self {
        Self {
            operation_category_id,
            count: DEFAULT_SLOT_COUNT,
            category_ids: (1..=DEFAULT_SLOT_COUNT as i32).collect(),
        }
    }

    pub fn slot_category(&self, slot: u32) -> i32 {
        self.category_ids
            .get(slot as usize)
            .copied()
            .unwrap_or(slot as i32 + 1)
    }
}

/// OperationCategoryId → ProsTimeDefinition
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProsTimeCategoryTable {
    #[serde(default)]
    pub definitions: Vec<ProsTimeDefinition>,
}

impl ProsTimeCategoryTable {
    pub fn new(definitions: Vec<ProsTimeDefinition>) -> Self {
        Self { definitions }
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn definition_for(&self, operation_category_id: i32) -> Cow<'_, ProsTimeDefinition> {
        match self
            .definitions
            .iter()
            .find(|d| d.operation_category_id == operation_category_id)
        {
            Some(definition) => Cow::Borrowed(definition),
            None => Cow::Owned(ProsTimeDefinition::fallback(operation_category_id)),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProsTimeOffsets {
    pub current: u32,
    pub previous: u32,
    pub cylinder: u32,
}

/// 类别为空的 Operation 直接跳过（不分配、不报错）
pub fn allocate_pros_time_devices(
    repository: &mut dyn AllocationRepository,
    plc_id: PlcId,
    offsets: ProsTimeOffsets,
    table: &ProsTimeCategoryTable,
    operations: &[&Operation],
    cancel: &CancellationToken,
) -> Result<Vec<ProsTimeAllocation>, GenerateError> {
    let mut out = Vec::new();
    let mut seq: u32 = 0;

    for (index, operation) in operations.iter().enumerate() {
        cancel.check()?;

        let Some(category_id) = operation.category_id else {
            debug!("operation {} has no category, skip ProsTime", operation.id);
            continue;
        };
        let definition = table.definition_for(category_id);

        for slot in 0..definition.count {
            let overflow = || GenerateError::DeviceRangeOverflow {
                mnemonic: MnemonicType::Operation,
                offset: offsets.current,
                index,
                stride: definition.count,
            };
            let device = |base: u32| -> Result<Device, GenerateError> {
                base.checked_add(seq)
                    .map(|n| Device::new(PROS_TIME_DEVICE_LABEL, n))
                    .ok_or_else(overflow)
            };

            out.push(ProsTimeAllocation {
                plc_id,
                operation_id: operation.id,
                sort_id: slot,
                category_id: definition.slot_category(slot),
                current_device: device(offsets.current)?,
                previous_device: device(offsets.previous)?,
                cylinder_device: device(offsets.cylinder)?,
            });
            seq = seq.checked_add(1).ok_or_else(overflow)?;
        }
        debug!(
            "operation {} ProsTime slots={} (category {})",
            operation.id, definition.count, category_id
        );
    }

    repository.replace_pros_time_allocations(plc_id, out.clone())?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_repository::InMemoryRepository;

    fn operation(id: i32, category_id: Option<i32>) -> Operation {
        Operation {
            id,
            plc_id: 1,
            name: format!("OP{id}"),
            cylinder_id: None,
            sort_number: None,
            category_id,
            condition: None,
            manual_switch: None,
            finish_sensor: None,
            speed_sensors: vec![],
            sensor_bank: None,
            forced_decel_sensor: None,
            counter_device: None,
            sensor_exclusion: None,
        }
    }

    const OFFSETS: ProsTimeOffsets = ProsTimeOffsets {
        current: 3000,
        previous: 4000,
        cylinder: 5000,
    };

    #[test]
    fn slot_count_and_categories_come_from_table() {
        let table = ProsTimeCategoryTable::new(vec![ProsTimeDefinition {
            operation_category_id: 3,
            count: 2,
            category_ids: vec![1, 2],
        }]);
        let a = operation(1, Some(3));
        let b = operation(2, Some(3));
        let mut repo = InMemoryRepository::new();

        let allocs = allocate_pros_time_devices(
            &mut repo,
            1,
            OFFSETS,
            &table,
            &[&a, &b],
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(allocs.len(), 4);
        assert_eq!(allocs[1].operation_id, 1);
        assert_eq!(allocs[1].category_id, 2);
        assert_eq!(allocs[2].operation_id, 2);
        assert_eq!(allocs[2].sort_id, 0);
        assert_eq!(allocs[2].current_device.to_string(), "ZR3002");
        assert_eq!(allocs[2].previous_device.to_string(), "ZR4002");
        assert_eq!(allocs[2].cylinder_device.to_string(), "ZR5002");
    }

    #[test]
    fn missing_definition_falls_back_to_five_sequential_slots() {
        let a = operation(1, Some(9));
        let mut repo = InMemoryRepository::new();
        let allocs = allocate_pros_time_devices(
            &mut repo,
            1,
            OFFSETS,
            &ProsTimeCategoryTable::default(),
            &[&a],
            &CancellationToken::new(),
        )
        .unwrap();

        let categories: Vec<i32> = allocs.iter().map(|a| a.category_id).collect();
        assert_eq!(categories, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn operation_without_category_is_skipped() {
        let a = operation(1, None);
        let b = operation(2, Some(1));
        let mut repo = InMemoryRepository::new();
        let allocs = allocate_pros_time_devices(
            &mut repo,
            1,
            OFFSETS,
            &ProsTimeCategoryTable::default(),
            &[&a, &b],
            &CancellationToken::new(),
        )
        .unwrap();

        assert!(allocs.iter().all(|a| a.operation_id == 2));
        assert_eq!(allocs[0].current_device.to_string(), "ZR3000");
        assert_eq!(repo.pros_time_allocations(1).unwrap().len(), 5);
    }

    #[test]
    fn short_category_list_is_padded_by_slot_number() {
        let definition = ProsTimeDefinition {
            operation_category_id: 1,
            count: 3,
            category_ids: vec![7],
        };
        assert_eq!(definition.slot_category(0), 7);
        assert_eq!(definition.slot_category(2), 3);
    }
}
