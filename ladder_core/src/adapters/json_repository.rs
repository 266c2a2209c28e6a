//! JSON 文件仓储：`allocations.v1.json`
//!
//! - 启动时整体读入，批次结束 `flush` 时原子写回（tmp + rename）。
//! - 文件带 `schemaVersion`，与当前版本不一致时拒绝加载。

use std::path::{Path, PathBuf};

use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::memory_repository::AllocationTables;
use crate::domain::device::{
    MnemonicDeviceAllocation, ProsTimeAllocation, SpeedDeviceAllocation, TimerDeviceAllocation,
};
use crate::domain::model::{MnemonicType, PlcId, RecordId};
use crate::error::RepositoryError;
use crate::ports::AllocationRepository;

pub const SCHEMA_VERSION_V1: u32 = 1;
pub const ALLOCATIONS_FILE_NAME: &str = "allocations.v1.json";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AllocationsV1 {
    pub schema_version: u32,
    #[serde(flatten)]
    pub tables: AllocationTables,
}

#[derive(Debug)]
pub struct JsonFileRepository {
    path: PathBuf,
    tables: AllocationTables,
    dirty: bool,
}

impl JsonFileRepository {
    /// 在 `dir` 下打开（不存在则为空表）
    pub fn open_in(dir: &Path) -> Result<Self, RepositoryError> {
        Self::open(dir.join(ALLOCATIONS_FILE_NAME))
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RepositoryError> {
        let path = path.into();
        let tables = match read_json_optional::<AllocationsV1>(&path)? {
            Some(payload) => {
                if payload.schema_version != SCHEMA_VERSION_V1 {
                    return Err(RepositoryError::UnsupportedSchemaVersion(payload.schema_version));
                }
                payload.tables
            }
            None => AllocationTables::default(),
        };
        debug!(
            "allocation store opened: path={} mnemonic={} timers={} speeds={} prosTime={}",
            path.display(),
            tables.mnemonic.len(),
            tables.timers.len(),
            tables.speeds.len(),
            tables.pros_time.len()
        );
        Ok(Self {
            path,
            tables,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tables(&self) -> &AllocationTables {
        &self.tables
    }

    fn touch<T>(&mut self, result: Result<T, RepositoryError>) -> Result<T, RepositoryError> {
        if result.is_ok() {
            self.dirty = true;
        }
        result
    }
}

impl AllocationRepository for JsonFileRepository {
    fn upsert_allocation(
        &mut self,
        allocation: MnemonicDeviceAllocation,
    ) -> Result<(), RepositoryError> {
        let result = self.tables.upsert_allocation(allocation);
        self.touch(result)
    }

    fn delete_allocation(
        &mut self,
        mnemonic_type: MnemonicType,
        record_id: RecordId,
        plc_id: PlcId,
    ) -> Result<bool, RepositoryError> {
        let removed = self.tables.delete_allocation(mnemonic_type, record_id, plc_id)?;
        if removed {
            self.dirty = true;
        }
        Ok(removed)
    }

    fn delete_all_allocations(
        &mut self,
        mnemonic_type: MnemonicType,
    ) -> Result<(), RepositoryError> {
        let result = self.tables.delete_all_allocations(mnemonic_type);
        self.touch(result)
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
        let result = self.tables.replace_timer_allocations(plc_id, allocations);
        self.touch(result)
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
        let result = self.tables.replace_speed_allocations(plc_id, allocations);
        self.touch(result)
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
        let result = self.tables.replace_pros_time_allocations(plc_id, allocations);
        self.touch(result)
    }

    fn pros_time_allocations(
        &self,
        plc_id: PlcId,
    ) -> Result<Vec<ProsTimeAllocation>, RepositoryError> {
        self.tables.pros_time_allocations(plc_id)
    }

    fn flush(&mut self) -> Result<(), RepositoryError> {
        if !self.dirty && self.path.exists() {
            return Ok(());
        }
        let payload = AllocationsV1 {
            schema_version: SCHEMA_VERSION_V1,
            tables: self.tables.clone(),
        };
        write_json_atomic(&self.path, &payload)?;
        self.dirty = false;
        debug!("allocation store flushed: {}", self.path.display());
        Ok(())
    }
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), RepositoryError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    std::fs::create_dir_all(parent)?;

    let json = serde_json::to_string_pretty(value)?;
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, json)?;
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    std::fs::rename(tmp_path, path)?;
    Ok(())
}

fn read_json_optional<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, RepositoryError> {
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&text)?))
}
