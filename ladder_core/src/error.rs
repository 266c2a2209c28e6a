//! 校验错误聚合 + 运行级致命错误。
//!
//! 校验发现（IO 未找到、歧义、引用断裂……）是数据而不是 `Err`：
//! 单条记录的失败不会中断其他记录的生成，最终由导出闸门统一判定。

use std::collections::BTreeMap;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::model::{MnemonicType, RecordId};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Informational,
    Critical,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Ambiguous,
    CancelledSelection,
    BrokenReference,
    MalformedConfiguration,
    PersistenceFailure,
}

/// 错误归属的记录
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecordRef {
    pub mnemonic_type: MnemonicType,
    pub record_id: RecordId,
    pub record_name: String,
}

impl RecordRef {
    pub fn new(
        mnemonic_type: MnemonicType,
        record_id: RecordId,
        record_name: impl Into<String>,
    ) -> Self {
        Self {
            mnemonic_type,
            record_id,
            record_name: record_name.into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub message: String,
    pub kind: ErrorKind,
    pub owner: RecordRef,
    pub severity: Severity,
}

impl ValidationError {
    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

/// 扁平报表行（便于表格展示）
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReportRow {
    pub message: String,
    pub mnemonic_type: MnemonicType,
    pub record_id: RecordId,
    pub record_name: String,
    pub severity: Severity,
    pub kind: ErrorKind,
}

/// 一次生成运行内的只追加错误集合，按助记符类型分区
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorAggregator {
    partitions: BTreeMap<MnemonicType, Vec<ValidationError>>,
}

impl ErrorAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(
        &mut self,
        kind: ErrorKind,
        message: impl Into<String>,
        owner: RecordRef,
        severity: Severity,
    ) {
        self.push(ValidationError {
            message: message.into(),
            kind,
            owner,
            severity,
        });
    }

    pub fn critical(&mut self, kind: ErrorKind, message: impl Into<String>, owner: RecordRef) {
        self.add_error(kind, message, owner, Severity::Critical);
    }

    pub fn informational(&mut self, kind: ErrorKind, message: impl Into<String>, owner: RecordRef) {
        self.add_error(kind, message, owner, Severity::Informational);
    }

    pub fn push(&mut self, error: ValidationError) {
        match error.severity {
            Severity::Critical => warn!(
                "critical {:?} on {} {} ({}): {}",
                error.kind,
                error.owner.mnemonic_type.display_name(),
                error.owner.record_id,
                error.owner.record_name,
                error.message
            ),
            Severity::Informational => debug!(
                "info {:?} on {} {}: {}",
                error.kind,
                error.owner.mnemonic_type.display_name(),
                error.owner.record_id,
                error.message
            ),
        }
        self.partitions
            .entry(error.owner.mnemonic_type)
            .or_default()
            .push(error);
    }

    /// 全部错误：按助记符类型分区顺序，分区内按追加顺序
    pub fn all(&self) -> Vec<&ValidationError> {
        self.partitions.values().flatten().collect()
    }

    pub fn for_type(&self, mnemonic_type: MnemonicType) -> &[ValidationError] {
        self.partitions
            .get(&mnemonic_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_critical(&self) -> bool {
        self.partitions.values().flatten().any(ValidationError::is_critical)
    }

    pub fn critical_count(&self) -> usize {
        self.partitions
            .values()
            .flatten()
            .filter(|e| e.is_critical())
            .count()
    }

    pub fn len(&self) -> usize {
        self.partitions.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn report(&self) -> Vec<ValidationReportRow> {
        self.all()
            .into_iter()
            .map(|e| ValidationReportRow {
                message: e.message.clone(),
                mnemonic_type: e.owner.mnemonic_type,
                record_id: e.owner.record_id,
                record_name: e.owner.record_name.clone(),
                severity: e.severity,
                kind: e.kind,
            })
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported schemaVersion: {0}")]
    UnsupportedSchemaVersion(u32),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("io error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// 运行级致命错误：中断整个生成
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("allocation repository failed: {0}")]
    Repository(#[from] RepositoryError),

    #[error("export failed: {0}")]
    Export(#[from] ExportError),

    #[error("generation cancelled")]
    Cancelled,

    #[error(
        "device number overflow for {mnemonic:?} (offset={offset}, index={index}, stride={stride})"
    )]
    DeviceRangeOverflow {
        mnemonic: MnemonicType,
        offset: u32,
        index: usize,
        stride: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(m: MnemonicType, id: RecordId) -> RecordRef {
        RecordRef::new(m, id, format!("R{id}"))
    }

    #[test]
    fn aggregator_partitions_by_type_and_detects_critical() {
        let mut errors = ErrorAggregator::new();
        errors.informational(
            ErrorKind::NotFound,
            "optional sensor bank missing",
            owner(MnemonicType::Operation, 3),
        );
        assert!(!errors.has_critical());

        errors.critical(
            ErrorKind::BrokenReference,
            "block 99 not found",
            owner(MnemonicType::ProcessDetail, 7),
        );
        assert!(errors.has_critical());
        assert_eq!(errors.critical_count(), 1);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors.for_type(MnemonicType::Operation).len(), 1);
        assert!(errors.for_type(MnemonicType::Cylinder).is_empty());

        // 分区顺序：ProcessDetail 在 Operation 之前
        let kinds: Vec<ErrorKind> = errors.all().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ErrorKind::BrokenReference, ErrorKind::NotFound]);
    }

    #[test]
    fn report_rows_flatten_owner() {
        let mut errors = ErrorAggregator::new();
        errors.critical(ErrorKind::Ambiguous, "2 matches", owner(MnemonicType::Cylinder, 5));

        let report = errors.report();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].record_id, 5);
        assert_eq!(report[0].record_name, "R5");
        assert_eq!(report[0].severity, Severity::Critical);

        let json = serde_json::to_string(&report[0]).unwrap();
        assert!(json.contains("\"mnemonicType\":\"Cylinder\""));
    }
}
