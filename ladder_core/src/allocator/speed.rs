use log::debug;

use crate::application::cancel::CancellationToken;
use crate::domain::device::{Device, SpeedDeviceAllocation};
use crate::domain::model::{Cylinder, MnemonicType, PlcId};
use crate::domain::roles::SPEED_DEVICE_LABEL;
use crate::error::GenerateError;
use crate::ports::AllocationRepository;

/// 每个气缸一个 D 字：offset, offset+1, …（按气缸顺序）
pub fn allocate_speed_devices(
    repository: &mut dyn AllocationRepository,
    plc_id: PlcId,
    offset: u32,
    cylinders: &[&Cylinder],
    cancel: &CancellationToken,
) -> Result<Vec<SpeedDeviceAllocation>, GenerateError> {
    let mut out = Vec::with_capacity(cylinders.len());
    for (index, cylinder) in cylinders.iter().enumerate() {
        cancel.check()?;
        let number = u32::try_from(index)
            .ok()
            .and_then(|rank| offset.checked_add(rank))
            .ok_or(GenerateError::DeviceRangeOverflow {
                mnemonic: MnemonicType::Cylinder,
                offset,
                index,
                stride: 1,
            })?;
        let device = Device::new(SPEED_DEVICE_LABEL, number);
        debug!("speed device for cylinder {} -> {}", cylinder.id, device);
        out.push(SpeedDeviceAllocation {
            plc_id,
            cylinder_id: cylinder.id,
            device,
        });
    }

    repository.replace_speed_allocations(plc_id, out.clone())?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_repository::InMemoryRepository;

    fn cylinder(id: i32) -> Cylinder {
        Cylinder {
            id,
            plc_id: 1,
            name: format!("CY{id}"),
            sort_number: None,
            category_id: Some(1),
            machine_id: None,
            go_valve: None,
            back_valve: None,
            manual_go: None,
            manual_back: None,
            forced_stop: None,
        }
    }

    #[test]
    fn one_sequential_d_device_per_cylinder() {
        let c1 = cylinder(7);
        let c2 = cylinder(3);
        let mut repo = InMemoryRepository::new();
        let cancel = CancellationToken::new();
        let allocs = allocate_speed_devices(&mut repo, 1, 5000, &[&c1, &c2], &cancel).unwrap();

        assert_eq!(allocs[0].cylinder_id, 7);
        assert_eq!(allocs[0].device.to_string(), "D5000");
        assert_eq!(allocs[1].device.to_string(), "D5001");
        assert_eq!(repo.speed_allocations(1).unwrap(), allocs);
    }

    #[test]
    fn regeneration_replaces_previous_table() {
        let c1 = cylinder(1);
        let c2 = cylinder(2);
        let mut repo = InMemoryRepository::new();
        let cancel = CancellationToken::new();
        allocate_speed_devices(&mut repo, 1, 0, &[&c1, &c2], &cancel).unwrap();
        allocate_speed_devices(&mut repo, 1, 0, &[&c2], &cancel).unwrap();

        let stored = repo.speed_allocations(1).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].cylinder_id, 2);
    }
}
