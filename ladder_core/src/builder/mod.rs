//! 指令生成器：每种助记符类型一个纯函数
//! `(BuildContext, record, BuildSink) -> Result<Vec<InstructionRow>, RecordAbort>`。
//!
//! - IO 解析失败记入错误集合，不中断当前记录（输入接点以常 OFF 代替）
//! - 结构性错误（引用不存在的记录、缺失必填字段）返回 `RecordAbort`，只放弃当前记录
//! - 行顺序即输入记录顺序，逐条拼接

pub mod cylinder;
pub mod operation;
pub mod process;
pub mod process_detail;

use std::collections::HashMap;

use log::{debug, warn};

use crate::application::cancel::CancellationToken;
use crate::domain::device::{
    Device, MnemonicDeviceAllocation, ProsTimeAllocation, TimerDeviceAllocation,
};
use crate::domain::graph::FlowIndex;
use crate::domain::ladder::InstructionRow;
use crate::domain::model::{
    ConfigRecord, ConfigSnapshot, MnemonicType, PlcId, RecordId, RecordIndex,
};
use crate::domain::roles::{timer_category, TimerPurpose};
use crate::error::{ErrorAggregator, ErrorKind, GenerateError, RecordRef, RepositoryError};
use crate::ports::{AllocationRepository, IoChooser};
use crate::resolver::{IoAddressResolver, IoQuery};
use crate::settings::GeneratorSettings;

pub use cylinder::build_cylinder;
pub use operation::build_operation;
pub use process::build_process;
pub use process_detail::build_process_detail;

/// 单条记录的不可恢复错误
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordAbort {
    BrokenReference(String),
    Malformed(String),
}

impl RecordAbort {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RecordAbort::BrokenReference(_) => ErrorKind::BrokenReference,
            RecordAbort::Malformed(_) => ErrorKind::MalformedConfiguration,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            RecordAbort::BrokenReference(m) | RecordAbort::Malformed(m) => m,
        }
    }
}

pub type BuildResult = Result<Vec<InstructionRow>, RecordAbort>;

/// 本次运行的分配结果，按记录建索引
#[derive(Clone, Debug, Default)]
pub struct DeviceIndex {
    blocks: HashMap<(MnemonicType, RecordId), MnemonicDeviceAllocation>,
    timers: HashMap<(MnemonicType, RecordId), Vec<TimerDeviceAllocation>>,
    speeds: HashMap<RecordId, Device>,
    pros_time: HashMap<RecordId, Vec<ProsTimeAllocation>>,
}

impl DeviceIndex {
    pub fn load(
        repository: &dyn AllocationRepository,
        plc_id: PlcId,
    ) -> Result<Self, RepositoryError> {
        let mut index = DeviceIndex::default();
        for m in MnemonicType::ALL {
            for allocation in repository.allocations_by_type(m, plc_id)? {
                index.blocks.insert((m, allocation.record_id), allocation);
            }
        }
        for allocation in repository.timer_allocations(plc_id)? {
            index
                .timers
                .entry((allocation.mnemonic_type, allocation.record_id))
                .or_default()
                .push(allocation);
        }
        for allocation in repository.speed_allocations(plc_id)? {
            index.speeds.insert(allocation.cylinder_id, allocation.device);
        }
        for allocation in repository.pros_time_allocations(plc_id)? {
            index
                .pros_time
                .entry(allocation.operation_id)
                .or_default()
                .push(allocation);
        }
        for slots in index.pros_time.values_mut() {
            slots.sort_by_key(|s| s.sort_id);
        }
        Ok(index)
    }

    pub fn block(
        &self,
        mnemonic_type: MnemonicType,
        record_id: RecordId,
    ) -> Option<&MnemonicDeviceAllocation> {
        self.blocks.get(&(mnemonic_type, record_id))
    }

    pub fn timers_for(
        &self,
        mnemonic_type: MnemonicType,
        record_id: RecordId,
    ) -> &[TimerDeviceAllocation] {
        self.timers
            .get(&(mnemonic_type, record_id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// 该记录第一个指定用途的定时器
    pub fn timer_for(
        &self,
        mnemonic_type: MnemonicType,
        record_id: RecordId,
        purpose: TimerPurpose,
    ) -> Option<&TimerDeviceAllocation> {
        self.timers_for(mnemonic_type, record_id)
            .iter()
            .find(|t| timer_category(t.category_id).is_some_and(|c| c.purpose == purpose))
    }

    pub fn speed_device(&self, cylinder_id: RecordId) -> Option<&Device> {
        self.speeds.get(&cylinder_id)
    }

    /// 按 sort_id 升序
    pub fn pros_time_for(&self, operation_id: RecordId) -> &[ProsTimeAllocation] {
        self.pros_time
            .get(&operation_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// builder 的只读输入
pub struct BuildContext<'a> {
    pub snapshot: &'a ConfigSnapshot,
    pub records: &'a RecordIndex<'a>,
    pub flow: &'a FlowIndex,
    pub devices: &'a DeviceIndex,
    pub resolver: IoAddressResolver<'a>,
    pub settings: &'a GeneratorSettings,
}

impl<'a> BuildContext<'a> {
    pub fn block(
        &self,
        mnemonic_type: MnemonicType,
        record_id: RecordId,
    ) -> Result<&'a MnemonicDeviceAllocation, RecordAbort> {
        self.devices.block(mnemonic_type, record_id).ok_or_else(|| {
            RecordAbort::BrokenReference(format!(
                "{} {} has no device allocation",
                mnemonic_type.display_name(),
                record_id
            ))
        })
    }

    /// 另一条记录位块中的某一位
    pub fn bit(
        &self,
        mnemonic_type: MnemonicType,
        record_id: RecordId,
        ordinal: u32,
    ) -> Result<Device, RecordAbort> {
        Ok(self.block(mnemonic_type, record_id)?.device(ordinal))
    }
}

/// builder 的可写输出：错误集合 + 歧义选择端口
pub struct BuildSink<'s> {
    pub errors: &'s mut ErrorAggregator,
    pub chooser: &'s mut dyn IoChooser,
}

impl BuildSink<'_> {
    /// 输入接点：解析失败时返回常 OFF 信号（错误已记录，导出会被拦截）
    pub fn input(
        &mut self,
        ctx: &BuildContext<'_>,
        tag: &str,
        exclusion: Option<&str>,
        owner: &RecordRef,
    ) -> String {
        let query = IoQuery::input(tag).excluding(exclusion);
        ctx.resolver
            .resolve_with_chooser(&query, owner, &mut *self.chooser, self.errors)
            .unwrap_or_else(|| ctx.settings.always_off.clone())
    }

    /// 输出线圈：解析失败返回 None，调用方跳过该 OUT 行
    pub fn output(
        &mut self,
        ctx: &BuildContext<'_>,
        tag: &str,
        owner: &RecordRef,
    ) -> Option<String> {
        let query = IoQuery::output(tag);
        ctx.resolver
            .resolve_with_chooser(&query, owner, &mut *self.chooser, self.errors)
    }

    /// 输入范围（传感器组）；无匹配记 informational
    pub fn input_range(
        &mut self,
        ctx: &BuildContext<'_>,
        token: &str,
        exclusion: Option<&str>,
        owner: &RecordRef,
    ) -> Vec<String> {
        let query = IoQuery::input(token).excluding(exclusion);
        ctx.resolver.resolve_range(&query, owner, self.errors, true)
    }

    /// 可恢复的配置问题：记 critical，继续生成
    pub fn malformed(&mut self, owner: &RecordRef, message: impl Into<String>) {
        self.errors
            .critical(ErrorKind::MalformedConfiguration, message, owner.clone());
    }
}

pub type BuildFn<T> = fn(&BuildContext<'_>, &T, &mut BuildSink<'_>) -> BuildResult;

/// 逐条生成并按输入顺序拼接；被放弃的记录记一条 critical 后跳过
pub fn build_all<T: ConfigRecord>(
    ctx: &BuildContext<'_>,
    sink: &mut BuildSink<'_>,
    records: &[&T],
    cancel: &CancellationToken,
    build: BuildFn<T>,
) -> Result<Vec<InstructionRow>, GenerateError> {
    let mut rows = Vec::new();
    for record in records {
        cancel.check()?;
        match build(ctx, *record, sink) {
            Ok(record_rows) => {
                debug!(
                    "built {} {} rows={}",
                    T::MNEMONIC.display_name(),
                    record.id(),
                    record_rows.len()
                );
                rows.extend(record_rows);
            }
            Err(abort) => {
                warn!(
                    "{} {} aborted: {}",
                    T::MNEMONIC.display_name(),
                    record.id(),
                    abort.message()
                );
                sink.errors
                    .critical(abort.kind(), abort.message(), record.record_ref());
            }
        }
    }
    Ok(rows)
}

/// 单条记录的标题语句行
pub(crate) fn heading<T: ConfigRecord>(record: &T, detail: Option<&str>) -> String {
    match detail {
        Some(extra) => format!(
            "; {} {} {} ({})",
            T::MNEMONIC.display_name(),
            record.id(),
            record.name(),
            extra
        ),
        None => format!("; {} {} {}", T::MNEMONIC.display_name(), record.id(), record.name()),
    }
}

pub(crate) fn non_empty(tag: &Option<String>) -> Option<&str> {
    tag.as_deref().map(str::trim).filter(|t| !t.is_empty())
}
