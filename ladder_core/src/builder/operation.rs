// Operation：动作模板（go / back / active / off），类别决定接线的输出位角色。

use super::{heading, non_empty, BuildContext, BuildResult, BuildSink, RecordAbort};
use crate::domain::device::{constant, Device, MnemonicDeviceAllocation};
use crate::domain::ladder::{LadderRows, Opcode};
use crate::domain::model::{ConfigRecord, MnemonicType, Operation};
use crate::domain::roles::{
    cylinder, detail, operation as role, operation_category, pros_time_gate, OperationCategory,
    OperationDirection, TimerPurpose,
};
use crate::error::RecordRef;

pub fn build_operation(
    ctx: &BuildContext<'_>,
    operation: &Operation,
    sink: &mut BuildSink<'_>,
) -> BuildResult {
    let owner = operation.record_ref();
    let block = ctx.block(MnemonicType::Operation, operation.id)?;
    let bit = |ordinal: u32| block.device(ordinal);
    let settings = ctx.settings;

    let category_id = operation
        .category_id
        .ok_or_else(|| RecordAbort::Malformed("operation without category".to_string()))?;
    let category = operation_category(category_id).ok_or_else(|| {
        RecordAbort::Malformed(format!("unknown operation category {category_id}"))
    })?;

    if let Some(cylinder_id) = operation.cylinder_id {
        if ctx.records.cylinder(cylinder_id).is_none() {
            return Err(RecordAbort::BrokenReference(format!(
                "cylinder {cylinder_id} does not exist"
            )));
        }
    }

    let operating: Vec<Device> = ctx
        .flow
        .details_for_operation(operation.id)
        .iter()
        .map(|id| ctx.bit(MnemonicType::ProcessDetail, *id, detail::OPERATING))
        .collect::<Result<_, _>>()?;

    let exclusion = non_empty(&operation.sensor_exclusion);
    let mut rows = LadderRows::new();
    rows.statement(heading(operation, Some(category.direction.label())));

    // AutoMode
    rows.ldi(&settings.manual_mode).out(bit(role::AUTO_MODE));

    // ManualSwitch
    let manual_switch = non_empty(&operation.manual_switch);
    match manual_switch {
        Some(tag) => {
            let contact = sink.input(ctx, tag, None, &owner);
            rows.ld(contact).and(&settings.manual_mode);
        }
        None => {
            rows.ld(&settings.always_off);
        }
    }
    rows.out(bit(role::MANUAL_SWITCH));

    // ConditionOK
    match non_empty(&operation.condition) {
        Some(tag) => {
            let contact = sink.input(ctx, tag, exclusion, &owner);
            rows.ld(contact);
        }
        None => {
            rows.ld(&settings.always_on);
        }
    }
    rows.out(bit(role::CONDITION_OK));

    // Start
    if operating.is_empty() {
        rows.ld(&settings.always_off);
    } else {
        rows.contacts(&operating, Opcode::Or);
    }
    rows.and(bit(role::AUTO_MODE))
        .and(bit(role::CONDITION_OK))
        .or(bit(role::MANUAL_SWITCH))
        .ani(bit(role::COMPLETION))
        .out(bit(role::START));

    // StartPulse
    rows.ld(bit(role::START)).pls(bit(role::START_PULSE));

    // Counter
    if category.counter {
        match non_empty(&operation.counter_device) {
            Some(counter) => {
                rows.ld(bit(role::COMPLETION_PULSE))
                    .out(bit(role::COUNTER))
                    .inc(counter);
            }
            None => sink.malformed(&owner, "counter category without counter device"),
        }
    }

    // Speed1..SpeedN：第 k 个传感器把速度 k 切到 k+1
    speed_stage(ctx, operation, category, block, sink, &mut rows, &owner);

    // ForcedDeceleration
    if category.forced_deceleration {
        let sensor = match non_empty(&operation.forced_decel_sensor) {
            Some(tag) => sink.input(ctx, tag, exclusion, &owner),
            None => {
                sink.malformed(&owner, "forced deceleration category without sensor");
                settings.always_off.clone()
            }
        };
        rows.ld(bit(role::START))
            .and(sensor)
            .out(bit(role::FORCED_DECELERATION));
    }

    direction_stage(category.direction, block, &mut rows);

    // CompletionPulse
    rows.ld(bit(role::COMPLETION)).pls(bit(role::COMPLETION_PULSE));

    pros_time_stage(ctx, operation, block, &mut rows);

    // Timeout
    if let Some(timer) = ctx
        .devices
        .timer_for(MnemonicType::Operation, operation.id, TimerPurpose::Timeout)
    {
        rows.ld(bit(role::START))
            .ani(bit(role::COMPLETION))
            .out_timer(&timer.timer_device, timer.set_value_operand());
        rows.ld(&timer.timer_device).out(bit(role::TIMEOUT));
    }

    let finish = finish_contact(ctx, operation, category, sink, &owner)?;

    // ManualComplete
    if manual_switch.is_some() {
        rows.ld(bit(role::MANUAL_SWITCH));
        finish.and(&mut rows);
        rows.out(bit(role::MANUAL_COMPLETE));
    }

    // FinishSensor（有稳定定时器时延时确认）
    finish.ld(&mut rows);
    match ctx
        .devices
        .timer_for(MnemonicType::Operation, operation.id, TimerPurpose::Stable)
    {
        Some(timer) => {
            rows.out_timer(&timer.timer_device, timer.set_value_operand());
            rows.ld(&timer.timer_device).out(bit(role::FINISH_SENSOR));
        }
        None => {
            rows.out(bit(role::FINISH_SENSOR));
        }
    }

    // Completion：(完成传感器 AND Start OR 手动完成 OR 自保持) AND (明细运行中 OR 手动)
    rows.ld(bit(role::FINISH_SENSOR))
        .and(bit(role::START))
        .or(bit(role::MANUAL_COMPLETE))
        .or(bit(role::COMPLETION));
    if operating.is_empty() {
        rows.ld(bit(role::MANUAL_SWITCH));
    } else {
        rows.contacts(&operating, Opcode::Or);
        rows.or(bit(role::MANUAL_SWITCH));
    }
    rows.anb().out(bit(role::COMPLETION));

    Ok(rows.into_rows())
}

fn speed_stage(
    ctx: &BuildContext<'_>,
    operation: &Operation,
    category: &OperationCategory,
    block: &MnemonicDeviceAllocation,
    sink: &mut BuildSink<'_>,
    rows: &mut LadderRows,
    owner: &RecordRef,
) {
    let count = u32::from(category.speed_count.min(role::MAX_SPEEDS));
    if count == 0 {
        return;
    }
    let exclusion = non_empty(&operation.sensor_exclusion);
    let needed = (count - 1) as usize;

    let mut sensors: Vec<String> = match non_empty(&operation.sensor_bank) {
        Some(bank) => sink.input_range(ctx, bank, exclusion, owner),
        None => operation
            .speed_sensors
            .iter()
            .map(|tag| tag.trim())
            .filter(|tag| !tag.is_empty())
            .map(|tag| sink.input(ctx, tag, exclusion, owner))
            .collect(),
    };
    if sensors.len() < needed {
        sink.malformed(
            owner,
            format!("{count} speeds need {needed} switch sensors, found {}", sensors.len()),
        );
        sensors.resize(needed, ctx.settings.always_off.clone());
    }

    for k in 1..=count {
        rows.ld(block.device(role::START));
        if k > 1 {
            rows.and(&sensors[(k - 2) as usize]);
        }
        if k < count {
            rows.ani(&sensors[(k - 1) as usize]);
        }
        rows.out(block.device(role::SPEED_BASE + k - 1));
    }
}

/// 开始脉冲：当前 → 上次（BMOV），清零当前（FMOV）；时钟脉冲按槽门控 INC；完成脉冲时 SUB 出气缸流
fn pros_time_stage(
    ctx: &BuildContext<'_>,
    operation: &Operation,
    block: &MnemonicDeviceAllocation,
    rows: &mut LadderRows,
) {
    let slots = ctx.devices.pros_time_for(operation.id);
    let Some(first) = slots.first() else {
        return;
    };
    let count = constant(slots.len() as u32);

    rows.ld(block.device(role::START_PULSE))
        .bmov(&first.current_device, &first.previous_device, &count)
        .fmov(constant(0), &first.current_device, &count);

    for slot in slots {
        rows.ld(&ctx.settings.clock_pulse)
            .and(block.device(pros_time_gate(slot.category_id)))
            .ani(block.device(role::COMPLETION))
            .inc(&slot.current_device);
    }

    rows.ld(block.device(role::COMPLETION_PULSE));
    for slot in slots {
        rows.sub(&slot.current_device, &slot.previous_device, &slot.cylinder_device);
    }
}

/// DirectionCommand
/// - go / back：Start 期间输出，超时切断
/// - active：完成后继续保持（完成位随明细运行中自保持）
/// - off：切断指令不受超时互锁
fn direction_stage(
    direction: OperationDirection,
    block: &MnemonicDeviceAllocation,
    rows: &mut LadderRows,
) {
    let bit = |ordinal: u32| block.device(ordinal);
    match direction {
        OperationDirection::Go | OperationDirection::Back => {
            rows.ld(bit(role::START)).ani(bit(role::TIMEOUT));
        }
        OperationDirection::Active => {
            rows.ld(bit(role::START))
                .or(bit(role::COMPLETION))
                .ani(bit(role::TIMEOUT));
        }
        OperationDirection::Off => {
            rows.ld(bit(role::START));
        }
    }
    rows.out(bit(role::DIRECTION_COMMAND));
}

/// 完成条件接点；`inverted` 时按 b 接点（LDI / ANI）使用
#[derive(Clone, Debug, PartialEq, Eq)]
struct FinishContact {
    device: String,
    inverted: bool,
}

impl FinishContact {
    fn normally_open(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            inverted: false,
        }
    }

    fn ld(&self, rows: &mut LadderRows) {
        if self.inverted {
            rows.ldi(&self.device);
        } else {
            rows.ld(&self.device);
        }
    }

    fn and(&self, rows: &mut LadderRows) {
        if self.inverted {
            rows.ani(&self.device);
        } else {
            rows.and(&self.device);
        }
    }
}

/// 完成传感器；未配置时取气缸输出位：
/// go / active 看前进输出得电，back 看后退输出得电，off 看前进输出失电
fn finish_contact(
    ctx: &BuildContext<'_>,
    operation: &Operation,
    category: &OperationCategory,
    sink: &mut BuildSink<'_>,
    owner: &RecordRef,
) -> Result<FinishContact, RecordAbort> {
    if let Some(tag) = non_empty(&operation.finish_sensor) {
        let contact = sink.input(ctx, tag, non_empty(&operation.sensor_exclusion), owner);
        return Ok(FinishContact::normally_open(contact));
    }
    let Some(cylinder_id) = operation.cylinder_id else {
        sink.malformed(owner, "operation has neither finish sensor nor cylinder");
        return Ok(FinishContact::normally_open(ctx.settings.always_off.clone()));
    };
    let (ordinal, inverted) = match category.direction {
        OperationDirection::Go | OperationDirection::Active => (cylinder::GO_OUTPUT, false),
        OperationDirection::Back => (cylinder::BACK_OUTPUT, false),
        OperationDirection::Off => (cylinder::GO_OUTPUT, true),
    };
    let device = ctx.bit(MnemonicType::Cylinder, cylinder_id, ordinal)?;
    Ok(FinishContact {
        device: device.to_string(),
        inverted,
    })
}
