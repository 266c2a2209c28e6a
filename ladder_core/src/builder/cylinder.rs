//! Cylinder：单电磁阀 / 双电磁阀 / 电机 三种变体。
//!
//! 共用子程序：手动复位、循环启动脉冲、互锁 OK、保持、励磁/保持选择；
//! 三种变体只在最终输出级不同。

use super::{heading, non_empty, BuildContext, BuildResult, BuildSink, RecordAbort};
use crate::domain::device::{constant, Device, MnemonicDeviceAllocation};
use crate::domain::ladder::{LadderRows, Opcode};
use crate::domain::model::{ConfigRecord, Cylinder, InterlockDirection, MnemonicType};
use crate::domain::roles::{
    cylinder as role, operation, operation_category, CylinderKind, OperationCategory,
};
use crate::error::RecordRef;

/// 驱动该气缸的动作：(动作位块, 类别)
struct Drive<'a> {
    block: &'a MnemonicDeviceAllocation,
    category: &'static OperationCategory,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Side {
    Go,
    Back,
}

impl Side {
    fn command(self) -> u32 {
        match self {
            Side::Go => role::GO_COMMAND,
            Side::Back => role::BACK_COMMAND,
        }
    }

    fn manual(self) -> u32 {
        match self {
            Side::Go => role::MANUAL_GO,
            Side::Back => role::MANUAL_BACK,
        }
    }

    fn hold(self) -> u32 {
        match self {
            Side::Go => role::GO_HOLD,
            Side::Back => role::BACK_HOLD,
        }
    }

    fn interlock_ok(self) -> u32 {
        match self {
            Side::Go => role::INTERLOCK_GO_OK,
            Side::Back => role::INTERLOCK_BACK_OK,
        }
    }

    fn output(self) -> u32 {
        match self {
            Side::Go => role::GO_OUTPUT,
            Side::Back => role::BACK_OUTPUT,
        }
    }

    fn completed(self) -> u32 {
        match self {
            Side::Go => role::GO_COMPLETED,
            Side::Back => role::BACK_COMPLETED,
        }
    }

    fn speed_base(self) -> u32 {
        match self {
            Side::Go => role::GO_SPEED_BASE,
            Side::Back => role::BACK_SPEED_BASE,
        }
    }

    /// 速度号：前进 1..5，后退 6..10
    fn speed_number(self, k: u32) -> u32 {
        match self {
            Side::Go => k + 1,
            Side::Back => k + 6,
        }
    }

    fn opposite(self) -> Side {
        match self {
            Side::Go => Side::Back,
            Side::Back => Side::Go,
        }
    }

    fn of(category: &OperationCategory) -> Side {
        if category.direction.drives_go() {
            Side::Go
        } else {
            Side::Back
        }
    }
}

pub fn build_cylinder(
    ctx: &BuildContext<'_>,
    cylinder: &Cylinder,
    sink: &mut BuildSink<'_>,
) -> BuildResult {
    let owner = cylinder.record_ref();
    let block = ctx.block(MnemonicType::Cylinder, cylinder.id)?;
    let settings = ctx.settings;

    let kind = cylinder
        .category_id
        .and_then(CylinderKind::from_category)
        .ok_or_else(|| {
            RecordAbort::Malformed(format!("unknown cylinder category {:?}", cylinder.category_id))
        })?;

    // 类别无效的动作由 Operation 生成器报告，这里跳过
    let mut drives: Vec<Drive<'_>> = Vec::new();
    for operation_id in ctx.flow.operations_for_cylinder(cylinder.id) {
        let Some(op) = ctx.records.operation(*operation_id) else {
            continue;
        };
        let Some(category) = op.category_id.and_then(operation_category) else {
            continue;
        };
        drives.push(Drive {
            block: ctx.block(MnemonicType::Operation, op.id)?,
            category,
        });
    }
    let on = |side: Side| drives.iter().filter(move |d| Side::of(d.category) == side);

    let excitation = settings.uses_excitation(cylinder.machine_id);
    let mut rows = LadderRows::new();
    rows.statement(heading(cylinder, Some(kind.label())));

    // Go / Back 指令：各动作的方向指令位
    for side in [Side::Go, Side::Back] {
        let commands: Vec<Device> = on(side)
            .map(|d| d.block.device(operation::DIRECTION_COMMAND))
            .collect();
        or_contacts(&mut rows, &commands, &settings.always_off);
        rows.out(block.device(side.command()));
    }

    // 手动前进 / 后退
    for (side, tag) in [(Side::Go, &cylinder.manual_go), (Side::Back, &cylinder.manual_back)] {
        match non_empty(tag) {
            Some(tag) => {
                let contact = sink.input(ctx, tag, None, &owner);
                rows.ld(contact).and(&settings.manual_mode);
            }
            None => {
                rows.ld(&settings.always_off);
            }
        }
        rows.out(block.device(side.manual()));
    }

    manual_reset(ctx, block, &mut rows);
    cycle_start(ctx, block, &mut rows);
    for side in [Side::Go, Side::Back] {
        interlock_gate(ctx, cylinder, block, side, sink, &owner, &mut rows)?;
    }

    // 速度 1..10 + 速度字 MOV
    let mut active_speeds: Vec<(u32, u32)> = Vec::new();
    for side in [Side::Go, Side::Back] {
        for k in 0..u32::from(operation::MAX_SPEEDS) {
            let sources: Vec<Device> = on(side)
                .filter(|d| u32::from(d.category.speed_count) > k)
                .map(|d| d.block.device(operation::SPEED_BASE + k))
                .collect();
            if sources.is_empty() {
                continue;
            }
            let ordinal = side.speed_base() + k;
            rows.contacts(&sources, Opcode::Or);
            rows.out(block.device(ordinal));
            active_speeds.push((ordinal, side.speed_number(k)));
        }
    }
    if let Some(speed_device) = ctx.devices.speed_device(cylinder.id) {
        for (ordinal, number) in &active_speeds {
            rows.ld(block.device(*ordinal)).mov(constant(*number), speed_device);
        }
    }

    // ForcedStop
    rows.ld(&settings.emergency_stop);
    if let Some(tag) = non_empty(&cylinder.forced_stop) {
        let contact = sink.input(ctx, tag, None, &owner);
        rows.or(contact);
    }
    rows.out(block.device(role::FORCED_STOP));

    // ForcedDeceleration
    let decelerations: Vec<Device> = drives
        .iter()
        .filter(|d| d.category.forced_deceleration)
        .map(|d| d.block.device(operation::FORCED_DECELERATION))
        .collect();
    if !decelerations.is_empty() {
        rows.contacts(&decelerations, Opcode::Or);
        rows.out(block.device(role::FORCED_DECELERATION));
    }

    for side in [Side::Go, Side::Back] {
        retention(block, side, &mut rows);
    }
    drive_mode(block, excitation, &mut rows);

    // 手动 / 自动模式
    rows.ld(&settings.manual_mode).out(block.device(role::MANUAL_MODE));
    rows.ldi(&settings.manual_mode).out(block.device(role::AUTO_MODE));

    // 前进 / 后退完成：各动作的完成传感器位
    for side in [Side::Go, Side::Back] {
        let finished: Vec<Device> = on(side)
            .map(|d| d.block.device(operation::FINISH_SENSOR))
            .collect();
        or_contacts(&mut rows, &finished, &settings.always_off);
        rows.out(block.device(side.completed()));
    }

    match kind {
        CylinderKind::SingleValve => {
            output_stage(block, Side::Go, excitation, &mut rows);
            valve(ctx, block, Side::Go, &cylinder.go_valve, true, sink, &owner, &mut rows);
            // 单电磁阀：后退 = 断电，只保留状态位
            rows.ld(block.device(role::BACK_HOLD)).out(block.device(role::BACK_OUTPUT));
        }
        CylinderKind::DoubleValve => {
            let valves = [(Side::Go, &cylinder.go_valve), (Side::Back, &cylinder.back_valve)];
            for (side, tag) in valves {
                output_stage(block, side, excitation, &mut rows);
                valve(ctx, block, side, tag, true, sink, &owner, &mut rows);
            }
        }
        CylinderKind::Motor => {
            output_stage(block, Side::Go, excitation, &mut rows);
            valve(ctx, block, Side::Go, &cylinder.go_valve, true, sink, &owner, &mut rows);
            // 反转输出可选
            if non_empty(&cylinder.back_valve).is_some() {
                output_stage(block, Side::Back, excitation, &mut rows);
                valve(ctx, block, Side::Back, &cylinder.back_valve, false, sink, &owner, &mut rows);
            }
        }
    }

    Ok(rows.into_rows())
}

fn or_contacts(rows: &mut LadderRows, contacts: &[Device], fallback: &str) {
    if contacts.is_empty() {
        rows.ld(fallback);
    } else {
        rows.contacts(contacts, Opcode::Or);
    }
}

fn manual_reset(ctx: &BuildContext<'_>, block: &MnemonicDeviceAllocation, rows: &mut LadderRows) {
    rows.ld(&ctx.settings.manual_mode)
        .and(&ctx.settings.reset_signal)
        .out(block.device(role::MANUAL_RESET));
}

fn cycle_start(ctx: &BuildContext<'_>, block: &MnemonicDeviceAllocation, rows: &mut LadderRows) {
    rows.ld(&ctx.settings.cycle_start)
        .pls(block.device(role::CYCLE_START));
}

/// 互锁条件串联：IO 标签或其他气缸的保持位；常闭时用 ANI
fn interlock_gate(
    ctx: &BuildContext<'_>,
    cylinder: &Cylinder,
    block: &MnemonicDeviceAllocation,
    side: Side,
    sink: &mut BuildSink<'_>,
    owner: &RecordRef,
    rows: &mut LadderRows,
) -> Result<(), RecordAbort> {
    let wanted = match side {
        Side::Go => InterlockDirection::Go,
        Side::Back => InterlockDirection::Back,
    };
    rows.ld(&ctx.settings.always_on);
    for interlock in ctx
        .records
        .interlocks_for(cylinder.id)
        .iter()
        .filter(|i| i.direction == wanted)
    {
        let contact = if let Some(tag) = non_empty(&interlock.condition_tag) {
            sink.input(ctx, tag, None, owner)
        } else if let Some(other) = interlock.condition_cylinder_id {
            if ctx.records.cylinder(other).is_none() {
                return Err(RecordAbort::BrokenReference(format!(
                    "interlock {} references missing cylinder {other}",
                    interlock.id
                )));
            }
            let ordinal = if interlock.condition_go {
                role::GO_HOLD
            } else {
                role::BACK_HOLD
            };
            ctx.bit(MnemonicType::Cylinder, other, ordinal)?.to_string()
        } else {
            sink.malformed(owner, format!("interlock {} has no condition", interlock.id));
            continue;
        };

        if interlock.normally_closed {
            rows.ani(contact);
        } else {
            rows.and(contact);
        }
    }
    rows.out(block.device(side.interlock_ok()));
    Ok(())
}

/// 保持位：(指令 OR 手动) AND 互锁 OK，自保持；反向指令 / 强制停止 / 手动复位断开
fn retention(block: &MnemonicDeviceAllocation, side: Side, rows: &mut LadderRows) {
    let other = side.opposite();
    rows.ld(block.device(side.command()))
        .or(block.device(side.manual()))
        .and(block.device(side.interlock_ok()))
        .or(block.device(side.hold()))
        .ani(block.device(other.command()))
        .ani(block.device(other.manual()))
        .ani(block.device(role::FORCED_STOP))
        .ani(block.device(role::MANUAL_RESET))
        .out(block.device(side.hold()));
}

/// 励磁机型：指令期间通电；其余机型：保持位驱动
fn drive_mode(block: &MnemonicDeviceAllocation, excitation: bool, rows: &mut LadderRows) {
    if excitation {
        rows.ld(block.device(role::GO_COMMAND))
            .or(block.device(role::BACK_COMMAND))
            .or(block.device(role::MANUAL_GO))
            .or(block.device(role::MANUAL_BACK))
            .out(block.device(role::EXCITATION));
    } else {
        rows.ld(block.device(role::GO_HOLD))
            .or(block.device(role::BACK_HOLD))
            .out(block.device(role::RETENTION));
    }
}

fn output_stage(
    block: &MnemonicDeviceAllocation,
    side: Side,
    excitation: bool,
    rows: &mut LadderRows,
) {
    if excitation {
        rows.ld(block.device(side.command()))
            .or(block.device(side.manual()))
            .and(block.device(side.interlock_ok()));
    } else {
        rows.ld(block.device(side.hold()));
    }
    rows.ani(block.device(role::FORCED_STOP))
        .out(block.device(side.output()));
}

/// 物理输出：解析失败时跳过该 OUT（错误已记录）
#[allow(clippy::too_many_arguments)]
fn valve(
    ctx: &BuildContext<'_>,
    block: &MnemonicDeviceAllocation,
    side: Side,
    tag: &Option<String>,
    required: bool,
    sink: &mut BuildSink<'_>,
    owner: &RecordRef,
    rows: &mut LadderRows,
) {
    let Some(tag) = non_empty(tag) else {
        if required {
            sink.malformed(owner, format!("{} output tag missing", side_label(side)));
        }
        return;
    };
    if let Some(address) = sink.output(ctx, tag, owner) {
        rows.ld(block.device(side.output())).out(address);
    }
}

fn side_label(side: Side) -> &'static str {
    match side {
        Side::Go => "go",
        Side::Back => "back",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::fixture::{text, with_context};
    use crate::domain::model::{ConfigSnapshot, Interlock, IoPoint, Operation};
    use crate::error::{ErrorAggregator, ErrorKind};

    fn io(address: &str, name: &str) -> IoPoint {
        IoPoint {
            plc_id: 1,
            address: address.to_string(),
            name: name.to_string(),
            comment: None,
            link_device: None,
        }
    }

    fn cylinder(id: i32, category_id: i32) -> Cylinder {
        Cylinder {
            id,
            plc_id: 1,
            name: format!("CY{id}"),
            sort_number: Some(id),
            category_id: Some(category_id),
            machine_id: None,
            go_valve: Some("SOL_GO".to_string()),
            back_valve: Some("SOL_BACK".to_string()),
            manual_go: None,
            manual_back: None,
            forced_stop: None,
        }
    }

    fn operation(id: i32, category_id: i32) -> Operation {
        Operation {
            id,
            plc_id: 1,
            name: format!("OP{id}"),
            cylinder_id: Some(1),
            sort_number: Some(id),
            category_id: Some(category_id),
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

    fn snapshot(cylinders: Vec<Cylinder>, operations: Vec<Operation>) -> ConfigSnapshot {
        ConfigSnapshot {
            plc_id: 1,
            cylinders,
            operations,
            io_points: vec![
                io("Y10", "SOL_GO"),
                io("Y11", "SOL_BACK"),
                io("X40", "DOOR_CLOSED"),
            ],
            ..ConfigSnapshot::default()
        }
    }

    fn build(snapshot: &ConfigSnapshot, index: usize) -> (BuildResult, ErrorAggregator) {
        with_context(snapshot, |ctx, sink| build_cylinder(ctx, &snapshot.cylinders[index], sink))
    }

    #[test]
    fn no_variant_drives_servo_axis_bits() {
        let servo: Vec<String> = role::SERVO_RESERVED
            .map(|ordinal| format!("M{}", 10000 + ordinal))
            .collect();
        for category_id in [1, 2, 3] {
            let snap = snapshot(
                vec![cylinder(1, category_id)],
                vec![operation(1, 1), operation(2, 2)],
            );
            let (rows, _) = build(&snap, 0);
            let rows = text(&rows.unwrap());
            let touched = rows
                .iter()
                .flat_map(|r| r.split(' '))
                .any(|operand| servo.iter().any(|d| d == operand));
            assert!(!touched, "category {category_id} wrote a servo bit");
        }
    }

    #[test]
    fn double_valve_collects_operation_commands_and_outputs_both_sides() {
        // OP1 前进 (M4000..)，OP2 后退 (M4020..)；CY1 = M10000..
        let snap = snapshot(vec![cylinder(1, 2)], vec![operation(1, 1), operation(2, 2)]);
        let (rows, errors) = build(&snap, 0);
        let rows = text(&rows.unwrap());

        assert!(errors.is_empty());
        assert_eq!(
            &rows[..5],
            &["; Cylinder 1 CY1 (double valve)", "LD M4012", "OUT M10000", "LD M4032", "OUT M10001"]
        );
        assert!(rows.windows(2).any(|w| w == ["LD M10022", "OUT Y10"]));
        assert!(rows.windows(2).any(|w| w == ["LD M10023", "OUT Y11"]));
        // 完成位来自动作的 FinishSensor 位
        assert!(rows.windows(2).any(|w| w == ["LD M4018", "OUT M10028"]));
        assert!(rows.windows(2).any(|w| w == ["LD M4038", "OUT M10029"]));
        // 保持驱动（非励磁机型）
        assert!(rows.windows(3).any(|w| w == ["LD M10004", "OR M10005", "OUT M10025"]));
        assert!(rows.windows(3).any(|w| w == ["LD M10004", "ANI M10020", "OUT M10022"]));
    }

    #[test]
    fn speed_commands_and_speed_word() {
        let snap = snapshot(vec![cylinder(1, 2)], vec![operation(1, 5), operation(2, 4)]);
        let (rows, _) = build(&snap, 0);
        let rows = text(&rows.unwrap());

        // 前进速度 1、2，后退速度 1（Speed6）
        assert!(rows.windows(2).any(|w| w == ["LD M4006", "OUT M10010"]));
        assert!(rows.windows(2).any(|w| w == ["LD M4007", "OUT M10011"]));
        assert!(rows.windows(2).any(|w| w == ["LD M4026", "OUT M10015"]));
        assert!(rows.windows(2).any(|w| w == ["LD M10010", "MOV K1 D5000"]));
        assert!(rows.windows(2).any(|w| w == ["LD M10011", "MOV K2 D5000"]));
        assert!(rows.windows(2).any(|w| w == ["LD M10015", "MOV K6 D5000"]));
        assert!(!rows.iter().any(|r| r == "OUT M10012"));
    }

    #[test]
    fn excitation_machine_switches_drive_mode_and_output_stage() {
        let mut cy = cylinder(1, 1);
        cy.machine_id = Some(3);
        let snap = snapshot(vec![cy], vec![operation(1, 1)]);

        let (rows, _) = with_context(&snap, |ctx, sink| {
            let mut settings = ctx.settings.clone();
            settings.excitation_machine_ids = vec![3];
            let ctx = BuildContext {
                snapshot: ctx.snapshot,
                records: ctx.records,
                flow: ctx.flow,
                devices: ctx.devices,
                resolver: ctx.resolver,
                settings: &settings,
            };
            build_cylinder(&ctx, &snap.cylinders[0], sink)
        });
        let rows = text(&rows.unwrap());

        assert!(rows.iter().any(|r| r == "OUT M10024"));
        assert!(!rows.iter().any(|r| r == "OUT M10025"));
        assert!(rows
            .windows(5)
            .any(|w| w == ["LD M10000", "OR M10002", "AND M10008", "ANI M10020", "OUT M10022"]));
        // 单电磁阀：只有前进输出
        assert!(rows.iter().any(|r| r == "OUT Y10"));
        assert!(!rows.iter().any(|r| r == "OUT Y11"));
    }

    #[test]
    fn interlocks_use_tags_and_other_cylinder_holds() {
        let mut snap = snapshot(vec![cylinder(1, 2), cylinder(2, 2)], vec![]);
        snap.interlocks = vec![
            Interlock {
                id: 1,
                plc_id: 1,
                cylinder_id: 1,
                direction: InterlockDirection::Go,
                condition_tag: Some("DOOR".to_string()),
                condition_cylinder_id: None,
                condition_go: false,
                normally_closed: false,
            },
            Interlock {
                id: 2,
                plc_id: 1,
                cylinder_id: 1,
                direction: InterlockDirection::Go,
                condition_tag: None,
                condition_cylinder_id: Some(2),
                condition_go: true,
                normally_closed: true,
            },
        ];
        let (rows, errors) = build(&snap, 0);
        let rows = text(&rows.unwrap());

        assert!(errors.is_empty());
        // CY2 = M10050..，GoHold = +4
        assert!(rows
            .windows(4)
            .any(|w| w == ["LD SM400", "AND X40", "ANI M10054", "OUT M10008"]));
        assert!(rows.windows(2).any(|w| w == ["LD SM400", "OUT M10009"]));
    }

    #[test]
    fn interlock_on_missing_cylinder_aborts() {
        let mut snap = snapshot(vec![cylinder(1, 2)], vec![]);
        snap.interlocks = vec![Interlock {
            id: 1,
            plc_id: 1,
            cylinder_id: 1,
            direction: InterlockDirection::Back,
            condition_tag: None,
            condition_cylinder_id: Some(9),
            condition_go: true,
            normally_closed: false,
        }];
        let (rows, _) = build(&snap, 0);
        assert_eq!(rows.unwrap_err().kind(), ErrorKind::BrokenReference);
    }

    #[test]
    fn unresolved_valve_skips_out_row() {
        let mut cy = cylinder(1, 3);
        cy.go_valve = Some("MOTOR_RUN".to_string());
        cy.back_valve = None;
        let snap = snapshot(vec![cy], vec![]);
        let (rows, errors) = build(&snap, 0);
        let rows = text(&rows.unwrap());

        assert!(rows.iter().any(|r| r == "OUT M10022"));
        assert!(!rows.iter().any(|r| r.starts_with("OUT Y")));
        assert_eq!(errors.critical_count(), 1);
        assert_eq!(errors.all()[0].kind, ErrorKind::NotFound);
    }
}
