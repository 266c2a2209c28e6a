use crate::domain::device::{
    MnemonicDeviceAllocation, ProsTimeAllocation, SpeedDeviceAllocation, TimerDeviceAllocation,
};
use crate::domain::model::{MnemonicType, PlcId, RecordId};
use crate::error::RepositoryError;

/// 分配表持久化端口
/// 说明：事务/原子性由实现方负责；核心只按批次调用，并在批次结束时调用 `flush`。
pub trait AllocationRepository {
    /// 按 (MnemonicType, RecordId, PlcId) 更新或插入
    fn upsert_allocation(
        &mut self,
        allocation: MnemonicDeviceAllocation,
    ) -> Result<(), RepositoryError>;

    /// 删除单条记录的位块；不存在时返回 false
    fn delete_allocation(
        &mut self,
        mnemonic_type: MnemonicType,
        record_id: RecordId,
        plc_id: PlcId,
    ) -> Result<bool, RepositoryError>;

    fn delete_all_allocations(
        &mut self,
        mnemonic_type: MnemonicType,
    ) -> Result<(), RepositoryError>;

    /// 按 start_number 升序返回
    fn allocations_by_type(
        &self,
        mnemonic_type: MnemonicType,
        plc_id: PlcId,
    ) -> Result<Vec<MnemonicDeviceAllocation>, RepositoryError>;

    /// 删除该 PLC 的全部定时器分配后写入新表
    fn replace_timer_allocations(
        &mut self,
        plc_id: PlcId,
        allocations: Vec<TimerDeviceAllocation>,
    ) -> Result<(), RepositoryError>;

    fn timer_allocations(
        &self,
        plc_id: PlcId,
    ) -> Result<Vec<TimerDeviceAllocation>, RepositoryError>;

    fn replace_speed_allocations(
        &mut self,
        plc_id: PlcId,
        allocations: Vec<SpeedDeviceAllocation>,
    ) -> Result<(), RepositoryError>;

    fn speed_allocations(
        &self,
        plc_id: PlcId,
    ) -> Result<Vec<SpeedDeviceAllocation>, RepositoryError>;

    fn replace_pros_time_allocations(
        &mut self,
        plc_id: PlcId,
        allocations: Vec<ProsTimeAllocation>,
    ) -> Result<(), RepositoryError>;

    fn pros_time_allocations(
        &self,
        plc_id: PlcId,
    ) -> Result<Vec<ProsTimeAllocation>, RepositoryError>;

    /// 批次提交点
    fn flush(&mut self) -> Result<(), RepositoryError> {
        Ok(())
    }
}
