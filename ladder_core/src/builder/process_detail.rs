//! ProcessDetail：工程流节点。
//!
//! 0 Start（主输出，自保持）/ 1 Operating / 2 Skip / 3 FinishCheck / 4 Finish
//!
//! - 开始条件 = (开始传感器 OR 各前驱 Finish OR 自身 Skip) AND 暂停信号，自保持，父工程 Reset 断开
//! - 无前驱的根节点以父工程 Running 作为前驱信号
//! - `block_number` 指向工程块代表节点时，前驱改取代表节点的连接边
//! - 完成条件只读 finish 边，不读连接边

use super::{heading, non_empty, BuildContext, BuildResult, BuildSink, RecordAbort};
use crate::domain::device::Device;
use crate::domain::ladder::{LadderRows, Opcode};
use crate::domain::model::{ConfigRecord, MnemonicType, ProcessDetail};
use crate::domain::roles::{detail as role, operation, process, DetailCategory, TimerPurpose};

pub fn build_process_detail(
    ctx: &BuildContext<'_>,
    detail: &ProcessDetail,
    sink: &mut BuildSink<'_>,
) -> BuildResult {
    let owner = detail.record_ref();
    let block = ctx.block(MnemonicType::ProcessDetail, detail.id)?;
    let bit = |ordinal: u32| block.device(ordinal);
    let settings = ctx.settings;

    let category = DetailCategory::resolve(detail.category_id).ok_or_else(|| {
        RecordAbort::Malformed(format!("unknown process detail category {:?}", detail.category_id))
    })?;

    if ctx.records.process(detail.process_id).is_none() {
        return Err(RecordAbort::BrokenReference(format!(
            "parent process {} does not exist",
            detail.process_id
        )));
    }
    let parent_running = ctx.bit(MnemonicType::Process, detail.process_id, process::RUNNING)?;
    let parent_reset = ctx.bit(MnemonicType::Process, detail.process_id, process::RESET)?;

    let predecessor_source = match detail.block_number {
        Some(representative) => {
            if ctx.records.detail(representative).is_none() {
                return Err(RecordAbort::BrokenReference(format!(
                    "block number {representative} does not exist"
                )));
            }
            representative
        }
        None => detail.id,
    };
    let predecessors = finish_bits(ctx, ctx.flow.predecessors(predecessor_source))?;
    let finish_sources = finish_bits(ctx, ctx.flow.finish_sources(detail.id))?;

    // 完成判定的主条件（Block 类别只看 finish 边）
    let completion = match category {
        DetailCategory::Normal => Completion::Contact(normal_completion(ctx, detail, sink)?),
        DetailCategory::Block => Completion::Operating,
        DetailCategory::SensorOn | DetailCategory::SensorOff => {
            let tag = non_empty(&detail.finish_sensor).ok_or_else(|| {
                RecordAbort::Malformed("sensor detail without finish sensor".to_string())
            })?;
            let sensor = sink.input(ctx, tag, None, &owner);
            if category == DetailCategory::SensorOn {
                Completion::Contact(sensor)
            } else {
                Completion::Inverted(sensor)
            }
        }
        DetailCategory::Timer => {
            let timer = ctx
                .devices
                .timer_for(MnemonicType::ProcessDetail, detail.id, TimerPurpose::Delay)
                .ok_or_else(|| {
                    RecordAbort::Malformed("timer detail without delay timer".to_string())
                })?;
            Completion::Timer(timer.timer_device.clone(), timer.set_value_operand())
        }
    };

    let mut rows = LadderRows::new();
    rows.statement(heading(detail, Some(category_label(category))));

    // Start
    let mut sources: Vec<String> = Vec::new();
    if let Some(tag) = non_empty(&detail.start_sensor) {
        sources.push(sink.input(ctx, tag, None, &owner));
    }
    if predecessors.is_empty() {
        sources.push(parent_running.to_string());
    } else {
        sources.extend(predecessors.iter().map(Device::to_string));
    }
    sources.push(bit(role::SKIP).to_string());
    rows.contacts(&sources, Opcode::Or);
    rows.and(&settings.pause_signal)
        .or(bit(role::START))
        .ani(&parent_reset)
        .out(bit(role::START));

    // Operating
    rows.ld(bit(role::START)).ani(bit(role::FINISH)).out(bit(role::OPERATING));

    // Skip
    match non_empty(&detail.skip_tag) {
        Some(tag) => {
            let contact = sink.input(ctx, tag, None, &owner);
            rows.ld(contact);
        }
        None => {
            rows.ld(&settings.always_off);
        }
    }
    rows.out(bit(role::SKIP));

    // FinishCheck
    match &completion {
        Completion::Contact(contact) => {
            rows.ld(contact).and(bit(role::OPERATING));
        }
        Completion::Inverted(contact) => {
            rows.ldi(contact).and(bit(role::OPERATING));
        }
        Completion::Operating => {
            rows.ld(bit(role::OPERATING));
        }
        Completion::Timer(timer, set_value) => {
            rows.ld(bit(role::OPERATING)).out_timer(timer, set_value);
            rows.ld(timer).and(bit(role::OPERATING));
        }
    }
    for source in &finish_sources {
        rows.and(source);
    }
    rows.or(bit(role::SKIP)).out(bit(role::FINISH_CHECK));

    // Finish
    rows.ld(bit(role::FINISH_CHECK))
        .or(bit(role::FINISH))
        .ani(&parent_reset)
        .out(bit(role::FINISH));

    Ok(rows.into_rows())
}

enum Completion {
    Contact(String),
    Inverted(String),
    Operating,
    Timer(Device, String),
}

fn finish_bits(ctx: &BuildContext<'_>, ids: &[i32]) -> Result<Vec<Device>, RecordAbort> {
    ids.iter()
        .map(|id| ctx.bit(MnemonicType::ProcessDetail, *id, role::FINISH))
        .collect()
}

/// Normal：Operation 完成位；无 Operation 时退回完成传感器
fn normal_completion(
    ctx: &BuildContext<'_>,
    detail: &ProcessDetail,
    sink: &mut BuildSink<'_>,
) -> Result<String, RecordAbort> {
    match detail.operation_id {
        Some(operation_id) => {
            if ctx.records.operation(operation_id).is_none() {
                return Err(RecordAbort::BrokenReference(format!(
                    "operation {operation_id} does not exist"
                )));
            }
            Ok(ctx
                .bit(MnemonicType::Operation, operation_id, operation::COMPLETION)?
                .to_string())
        }
        None => match non_empty(&detail.finish_sensor) {
            Some(tag) => Ok(sink.input(ctx, tag, None, &detail.record_ref())),
            None => Err(RecordAbort::Malformed(
                "detail has neither operation nor finish sensor".to_string(),
            )),
        },
    }
}

fn category_label(category: DetailCategory) -> &'static str {
    match category {
        DetailCategory::Normal => "normal",
        DetailCategory::Block => "block",
        DetailCategory::SensorOn => "sensor on",
        DetailCategory::SensorOff => "sensor off",
        DetailCategory::Timer => "timer",
    }
}
