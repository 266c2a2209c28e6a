//! 助记符位块分配：StartNumber(record_i) = offset + i × stride。

use std::collections::HashSet;

use log::debug;

use crate::application::cancel::CancellationToken;
use crate::domain::device::MnemonicDeviceAllocation;
use crate::domain::model::{ConfigRecord, MnemonicType, PlcId, RecordId};
use crate::error::GenerateError;
use crate::ports::AllocationRepository;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MnemonicAllocationRequest<'a> {
    pub mnemonic_type: MnemonicType,
    pub plc_id: PlcId,
    pub device_label: &'a str,
    pub offset: u32,
    /// 每条记录的位数
    pub stride: u32,
}

impl<'a> MnemonicAllocationRequest<'a> {
    /// 使用该助记符类型的固定 stride
    pub fn for_type(
        mnemonic_type: MnemonicType,
        plc_id: PlcId,
        device_label: &'a str,
        offset: u32,
    ) -> Self {
        Self {
            mnemonic_type,
            plc_id,
            device_label,
            offset,
            stride: mnemonic_type.stride(),
        }
    }
}

/// 按输入顺序为每条记录分配连续位块并 upsert。
/// 对同一输入重复调用得到相同结果（按 (type, record, plc) 更新而非追加）。
/// 不在本批次中的旧记录位块随后释放，同一 (type, plc) 下位块互不重叠。
pub fn allocate_mnemonic_devices<T: ConfigRecord>(
    repository: &mut dyn AllocationRepository,
    request: &MnemonicAllocationRequest<'_>,
    records: &[&T],
    cancel: &CancellationToken,
) -> Result<Vec<MnemonicDeviceAllocation>, GenerateError> {
    let mut out = Vec::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        cancel.check()?;

        let start_number = start_number_for(request, index)?;
        let allocation = MnemonicDeviceAllocation {
            mnemonic_type: request.mnemonic_type,
            record_id: record.id(),
            plc_id: request.plc_id,
            device_label: request.device_label.to_string(),
            start_number,
            out_coil_count: request.stride,
        };
        debug!(
            "allocate {} {} -> {}{} (+{})",
            request.mnemonic_type.display_name(),
            record.id(),
            allocation.device_label,
            start_number,
            request.stride
        );

        repository.upsert_allocation(allocation.clone())?;
        out.push(allocation);
    }

    release_stale(repository, request, &out)?;
    Ok(out)
}

fn release_stale(
    repository: &mut dyn AllocationRepository,
    request: &MnemonicAllocationRequest<'_>,
    current: &[MnemonicDeviceAllocation],
) -> Result<(), GenerateError> {
    let kept: HashSet<RecordId> = current.iter().map(|a| a.record_id).collect();
    let stored = repository.allocations_by_type(request.mnemonic_type, request.plc_id)?;
    for stale in stored.iter().filter(|a| !kept.contains(&a.record_id)) {
        debug!(
            "release {} {} ({}{})",
            request.mnemonic_type.display_name(),
            stale.record_id,
            stale.device_label,
            stale.start_number
        );
        repository.delete_allocation(request.mnemonic_type, stale.record_id, request.plc_id)?;
    }
    Ok(())
}

fn start_number_for(
    request: &MnemonicAllocationRequest<'_>,
    index: usize,
) -> Result<u32, GenerateError> {
    let overflow = || GenerateError::DeviceRangeOverflow {
        mnemonic: request.mnemonic_type,
        offset: request.offset,
        index,
        stride: request.stride,
    };
    let rank = u32::try_from(index).map_err(|_| overflow())?;
    rank.checked_mul(request.stride)
        .and_then(|delta| request.offset.checked_add(delta))
        .ok_or_else(overflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_repository::InMemoryRepository;
    use crate::domain::model::Process;

    fn process(id: i32) -> Process {
        Process {
            id,
            plc_id: 1,
            name: format!("P{id}"),
            sort_number: None,
            category_id: None,
            start_process_ids: vec![],
            override_tag: None,
        }
    }

    fn request(offset: u32, stride: u32) -> MnemonicAllocationRequest<'static> {
        MnemonicAllocationRequest {
            mnemonic_type: MnemonicType::Process,
            plc_id: 1,
            device_label: "M",
            offset,
            stride,
        }
    }

    #[test]
    fn start_numbers_follow_offset_plus_rank_times_stride() {
        let p1 = process(1);
        let p2 = process(2);
        let mut repo = InMemoryRepository::new();

        let allocs = allocate_mnemonic_devices(
            &mut repo,
            &request(100, 5),
            &[&p1, &p2],
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(allocs[0].record_id, 1);
        assert_eq!(allocs[0].start_number, 100);
        assert_eq!(allocs[1].record_id, 2);
        assert_eq!(allocs[1].start_number, 105);
    }

    #[test]
    fn reallocation_updates_in_place_and_reordering_swaps_numbers() {
        let p1 = process(1);
        let p2 = process(2);
        let mut repo = InMemoryRepository::new();
        let cancel = CancellationToken::new();

        allocate_mnemonic_devices(&mut repo, &request(100, 5), &[&p1, &p2], &cancel).unwrap();
        let first = repo.allocations_by_type(MnemonicType::Process, 1).unwrap();
        allocate_mnemonic_devices(&mut repo, &request(100, 5), &[&p1, &p2], &cancel).unwrap();
        let second = repo.allocations_by_type(MnemonicType::Process, 1).unwrap();
        assert_eq!(first, second);
        assert_eq!(second.len(), 2);

        allocate_mnemonic_devices(&mut repo, &request(100, 5), &[&p2, &p1], &cancel).unwrap();
        let swapped = repo.allocations_by_type(MnemonicType::Process, 1).unwrap();
        assert_eq!(swapped.len(), 2);
        assert_eq!(swapped[0].record_id, 2);
        assert_eq!(swapped[0].start_number, 100);
        assert_eq!(swapped[1].record_id, 1);
        assert_eq!(swapped[1].start_number, 105);
    }

    #[test]
    fn records_dropped_from_the_batch_release_their_block() {
        let (p1, p2, p3) = (process(1), process(2), process(3));
        let mut repo = InMemoryRepository::new();
        let cancel = CancellationToken::new();

        allocate_mnemonic_devices(&mut repo, &request(100, 5), &[&p1, &p2], &cancel).unwrap();
        allocate_mnemonic_devices(&mut repo, &request(100, 5), &[&p2, &p3], &cancel).unwrap();

        let stored: Vec<(RecordId, u32)> = repo
            .allocations_by_type(MnemonicType::Process, 1)
            .unwrap()
            .iter()
            .map(|a| (a.record_id, a.start_number))
            .collect();
        assert_eq!(stored, vec![(2, 100), (3, 105)]);
    }

    #[test]
    fn release_keeps_other_plc_and_other_types() {
        let p1 = process(1);
        let mut repo = InMemoryRepository::new();
        let cancel = CancellationToken::new();
        let mut other_plc = request(0, 5);
        other_plc.plc_id = 2;
        let mut detail = request(0, 5);
        detail.mnemonic_type = MnemonicType::ProcessDetail;

        allocate_mnemonic_devices(&mut repo, &other_plc, &[&p1], &cancel).unwrap();
        allocate_mnemonic_devices(&mut repo, &detail, &[&p1], &cancel).unwrap();
        allocate_mnemonic_devices::<Process>(&mut repo, &request(0, 5), &[], &cancel).unwrap();

        assert_eq!(repo.allocations_by_type(MnemonicType::Process, 2).unwrap().len(), 1);
        assert_eq!(repo.allocations_by_type(MnemonicType::ProcessDetail, 1).unwrap().len(), 1);
    }

    #[test]
    fn cancelled_token_stops_before_first_record() {
        let p1 = process(1);
        let mut repo = InMemoryRepository::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = allocate_mnemonic_devices(&mut repo, &request(0, 5), &[&p1], &cancel);
        assert!(matches!(result, Err(GenerateError::Cancelled)));
        assert!(repo.allocations_by_type(MnemonicType::Process, 1).unwrap().is_empty());
    }

    #[test]
    fn overflowing_numbers_are_rejected() {
        let p1 = process(1);
        let p2 = process(2);
        let mut repo = InMemoryRepository::new();

        let result = allocate_mnemonic_devices(
            &mut repo,
            &request(u32::MAX - 2, 5),
            &[&p1, &p2],
            &CancellationToken::new(),
        );
        assert!(matches!(result, Err(GenerateError::DeviceRangeOverflow { index: 1, .. })));
    }
}
