//! Process：顶层运行位。
//!
//! 0 StartCondition / 1 Start（自保持）/ 2 Running / 3 Reset / 4 Finish

use super::{heading, non_empty, BuildContext, BuildResult, BuildSink, RecordAbort};
use crate::domain::device::Device;
use crate::domain::ladder::{LadderRows, Opcode};
use crate::domain::model::{ConfigRecord, MnemonicType, Process};
use crate::domain::roles::{detail, process as role, ProcessCategory};

pub fn build_process(
    ctx: &BuildContext<'_>,
    process: &Process,
    sink: &mut BuildSink<'_>,
) -> BuildResult {
    let owner = process.record_ref();
    let block = ctx.block(MnemonicType::Process, process.id)?;
    let bit = |ordinal: u32| block.device(ordinal);
    let settings = ctx.settings;

    let category = ProcessCategory::resolve(process.category_id).ok_or_else(|| {
        RecordAbort::Malformed(format!("unknown process category {:?}", process.category_id))
    })?;

    // 前驱工程完成位
    let mut predecessors: Vec<Device> = Vec::with_capacity(process.start_process_ids.len());
    for id in &process.start_process_ids {
        if ctx.records.process(*id).is_none() {
            return Err(RecordAbort::BrokenReference(format!(
                "start process {id} does not exist"
            )));
        }
        predecessors.push(ctx.bit(MnemonicType::Process, *id, role::FINISH)?);
    }

    let terminals = ctx.flow.terminal_details(process.id);
    let mut finish_sources: Vec<Device> = Vec::with_capacity(terminals.len());
    for id in terminals {
        finish_sources.push(ctx.bit(MnemonicType::ProcessDetail, id, detail::FINISH)?);
    }

    let mut rows = LadderRows::new();
    rows.statement(heading(process, None));

    // StartCondition
    if category == ProcessCategory::AlwaysAvailable || predecessors.is_empty() {
        rows.ld(&settings.always_on);
    } else {
        rows.contacts(&predecessors, Opcode::And);
    }
    if let Some(tag) = non_empty(&process.override_tag) {
        let contact = sink.input(ctx, tag, None, &owner);
        rows.or(contact);
    }
    rows.out(bit(role::START_CONDITION));

    // Start
    rows.ld(bit(role::START_CONDITION))
        .and(&settings.pause_signal)
        .or(bit(role::START))
        .ani(bit(role::RESET))
        .out(bit(role::START));

    // Running
    rows.ld(bit(role::START)).ani(bit(role::FINISH)).out(bit(role::RUNNING));

    // Reset
    rows.ld(&settings.reset_signal)
        .or(&settings.emergency_stop)
        .out(bit(role::RESET));

    // Finish：无工程明细时随 Start 即完成
    if finish_sources.is_empty() {
        rows.ld(bit(role::START));
    } else {
        rows.contacts(&finish_sources, Opcode::And);
        rows.or(bit(role::FINISH)).and(bit(role::START));
    }
    rows.out(bit(role::FINISH));

    Ok(rows.into_rows())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::fixture::{text, with_context};
    use crate::domain::model::{ConfigSnapshot, EdgeKind, IoPoint, ProcessDetail, ProcessFlowEdge};
    use crate::error::ErrorKind;

    fn process(id: i32) -> Process {
        Process {
            id,
            plc_id: 1,
            name: format!("P{id}"),
            sort_number: Some(id),
            category_id: None,
            start_process_ids: vec![],
            override_tag: None,
        }
    }

    fn detail(id: i32, process_id: i32) -> ProcessDetail {
        ProcessDetail {
            id,
            plc_id: 1,
            name: format!("D{id}"),
            process_id,
            operation_id: None,
            sort_number: Some(id),
            category_id: None,
            start_sensor: None,
            finish_sensor: None,
            skip_tag: None,
            block_number: None,
        }
    }

    #[test]
    fn root_process_without_details() {
        let snapshot = ConfigSnapshot {
            plc_id: 1,
            processes: vec![process(1)],
            ..ConfigSnapshot::default()
        };
        let (rows, errors) = with_context(&snapshot, |ctx, sink| {
            build_process(ctx, &snapshot.processes[0], sink)
        });

        assert!(errors.is_empty());
        assert_eq!(
            text(&rows.unwrap()),
            vec![
                "; Process 1 P1",
                "LD SM400",
                "OUT M1000",
                "LD M1000",
                "AND M14",
                "OR M1001",
                "ANI M1003",
                "OUT M1001",
                "LD M1001",
                "ANI M1004",
                "OUT M1002",
                "LD M12",
                "OR M13",
                "OUT M1003",
                "LD M1001",
                "OUT M1004",
            ]
        );
    }

    #[test]
    fn predecessor_processes_and_terminal_details_drive_conditions() {
        let mut second = process(2);
        second.start_process_ids = vec![1];
        second.override_tag = Some("FORCE".to_string());
        let snapshot = ConfigSnapshot {
            plc_id: 1,
            processes: vec![process(1), second],
            process_details: vec![detail(10, 2), detail(11, 2), detail(12, 2)],
            flow_edges: vec![
                ProcessFlowEdge { plc_id: 1, from: 10, to: 11, kind: EdgeKind::Connection },
                ProcessFlowEdge { plc_id: 1, from: 10, to: 12, kind: EdgeKind::Connection },
            ],
            io_points: vec![IoPoint {
                plc_id: 1,
                address: "X7".to_string(),
                name: "FORCE_START".to_string(),
                comment: None,
                link_device: None,
            }],
            ..ConfigSnapshot::default()
        };
        let (rows, errors) = with_context(&snapshot, |ctx, sink| {
            build_process(ctx, &snapshot.processes[1], sink)
        });
        let rows = text(&rows.unwrap());

        assert!(errors.is_empty());
        // P1.Finish = M1004；P2 块从 M1005 开始
        assert_eq!(&rows[1..4], &["LD M1004", "OR X7", "OUT M1005"]);
        // 终端明细 11、12 → detail 块 M2005.. / M2010..，Finish 为 +4
        assert_eq!(
            &rows[rows.len() - 5..],
            &["LD M2009", "AND M2014", "OR M1009", "AND M1006", "OUT M1009"]
        );
    }

    #[test]
    fn unknown_category_aborts() {
        let mut p = process(1);
        p.category_id = Some(9);
        let snapshot = ConfigSnapshot {
            plc_id: 1,
            processes: vec![p],
            ..ConfigSnapshot::default()
        };
        let (rows, _) = with_context(&snapshot, |ctx, sink| {
            build_process(ctx, &snapshot.processes[0], sink)
        });
        let abort = rows.unwrap_err();
        assert_eq!(abort.kind(), ErrorKind::MalformedConfiguration);
    }
}
