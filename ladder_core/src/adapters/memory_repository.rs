use serde::{Deserialize, Serialize};

use crate::domain::device::{
    MnemonicDeviceAllocation, ProsTimeAllocation, SpeedDeviceAllocation, TimerDeviceAllocation,
};
use crate::domain::model::{MnemonicType, PlcId, RecordId};
use crate::error::RepositoryError;
use crate::ports::AllocationRepository;

/// 四张分配表
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AllocationTables {
    #[serde(default)]
    pub mnemonic: Vec<MnemonicDeviceAllocation>,
    #[serde(default)]
    pub timers: Vec<TimerDeviceAllocation>,
    #[serde(default)]
    pub speeds: Vec<SpeedDeviceAllocation>,
    #[serde(default)]
    pub pros_time: Vec<ProsTimeAllocation>,
}

impl AllocationRepository for AllocationTables {
    fn upsert_allocation(
        &mut self,
        allocation: MnemonicDeviceAllocation,
    ) -> Result<(), RepositoryError> {
        let key = allocation.key();
        match self.mnemonic.iter_mut().find(|a| a.key() == key) {
            Some(existing) => *existing = allocation,
            None => self.mnemonic.push(allocation),
        }
        Ok(())
    }

    fn delete_allocation(
        &mut self,
        mnemonic_type: MnemonicType,
        record_id: RecordId,
        plc_id: PlcId,
    ) -> Result<bool, RepositoryError> {
        let before = self.mnemonic.len();
        self.mnemonic.retain(|a| a.key() != (mnemonic_type, record_id, plc_id));
        Ok(self.mnemonic.len() != before)
    }

    fn delete_all_allocations(
        &mut self,
        mnemonic_type: MnemonicType,
    ) -> Result<(), RepositoryError> {
        self.mnemonic.retain(|a| a.mnemonic_type != mnemonic_type);
        Ok(())
    }

    fn allocations_by_type(
        &self,
        mnemonic_type: MnemonicType,
        plc_id: PlcId,
    ) -> Result<Vec<MnemonicDeviceAllocation>, RepositoryError> {
        let mut out: Vec<MnemonicDeviceAllocation> = self
            .mnemonic
            .iter()
            .filter(|a| a.mnemonic_type == mnemonic_type && a.plc_id == plc_id)
            .cloned()
            .collect();
        out.sort_by_key(|a| (a.start_number, a.record_id));
        Ok(out)
    }

    fn replace_timer_allocations(
        &mut self,
        plc_id: PlcId,
        allocations: Vec<TimerDeviceAllocation>,
    ) -> Result<(), RepositoryError> {
        self.timers.retain(|a| a.plc_id != plc_id);
        self.timers.extend(allocations);
        Ok(())
    }

    fn timer_allocations(
        &self,
        plc_id: PlcId,
    ) -> Result<Vec<TimerDeviceAllocation>, RepositoryError> {
        Ok(self.timers.iter().filter(|a| a.plc_id == plc_id).cloned().collect())
    }

    fn replace_speed_allocations(
        &mut self,
        plc_id: PlcId,
        allocations: Vec<SpeedDeviceAllocation>,
    ) -> Result<(), RepositoryError> {
        self.speeds.retain(|a| a.plc_id != plc_id);
        self.speeds.extend(allocations);
        Ok(())
    }

    fn speed_allocations(
        &self,
        plc_id: PlcId,
    ) -> Result<Vec<SpeedDeviceAllocation>, RepositoryError> {
        Ok(self.speeds.iter().filter(|a| a.plc_id == plc_id).cloned().collect())
    }

    fn replace_pros_time_allocations(
        &mut self,
        plc_id: PlcId,
        allocations: Vec<ProsTimeAllocation>,
    ) -> Result<(), RepositoryError> {
        self.pros_time.retain(|a| a.plc_id != plc_id);
        self.pros_time.extend(allocations);
        Ok(())
    }

    fn pros_time_allocations(
        &self,
        plc_id: PlcId,
    ) -> Result<Vec<ProsTimeAllocation>, RepositoryError> {
        Ok(self.pros_time.iter().filter(|a| a.plc_id == plc_id).cloned().collect())
    }
}

/// 进程内仓储（测试与一次性运行）
#[derive(Clone, Debug, Default)]
pub struct InMemoryRepository {
    tables: AllocationTables,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tables(&self) -> &AllocationTables {
        &self.tables
    }

    pub fn into_tables(self) -> AllocationTables {
        self.tables
    }
}

impl AllocationRepository for InMemoryRepository {
    fn upsert_allocation(
        &mut self,
        allocation: MnemonicDeviceAllocation,
    ) -> Result<(), RepositoryError> {
        self.tables.upsert_allocation(allocation)
    }

    fn delete_allocation(
        &mut self,
        mnemonic_type: MnemonicType,
        record_id: RecordId,
        plc_id: PlcId,
    ) -> Result<bool, RepositoryError> {
        self.tables.delete_allocation(mnemonic_type, record_id, plc_id)
    }

    fn delete_all_allocations(
        &mut self,
        mnemonic_type: MnemonicType,
    ) -> Result<(), RepositoryError> {
        self.tables.delete_all_allocations(mnemonic_type)
    }

    fn allocations_by_type(
        &self,
        mnemonic_type: MnemonicType,
        plc_id: PlcId,
    ) -> Result<Vec<MnemonicDeviceAllocation>, RepositoryError> {
        self.tables.allocations_by_type(mnemonic_type, plc_id)
    }

    fn replace_timer_allocations(
        &mut self,
        plc_id: PlcId,
        allocations: Vec<TimerDeviceAllocation>,
    ) -> Result<(), RepositoryError> {
        self.tables.replace_timer_allocations(plc_id, allocations)
    }

    fn timer_allocations(
        &self,
        plc_id: PlcId,
    ) -> Result<Vec<TimerDeviceAllocation>, RepositoryError> {
        self.tables.timer_allocations(plc_id)
    }

    fn replace_speed_allocations(
        &mut self,
        plc_id: PlcId,
        allocations: Vec<SpeedDeviceAllocation>,
    ) -> Result<(), RepositoryError> {
        self.tables.replace_speed_allocations(plc_id, allocations)
    }

    fn speed_allocations(
        &self,
        plc_id: PlcId,
    ) -> Result<Vec<SpeedDeviceAllocation>, RepositoryError> {
        self.tables.speed_allocations(plc_id)
    }

    fn replace_pros_time_allocations(
        &mut self,
        plc_id: PlcId,
        allocations: Vec<ProsTimeAllocation>,
    ) -> Result<(), RepositoryError> {
        self.tables.replace_pros_time_allocations(plc_id, allocations)
    }

    fn pros_time_allocations(
        &self,
        plc_id: PlcId,
    ) -> Result<Vec<ProsTimeAllocation>, RepositoryError> {
        self.tables.pros_time_allocations(plc_id)
    }
}
