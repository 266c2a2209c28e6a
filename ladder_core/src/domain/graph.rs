//! 工程流邻接索引：每次运行预计算一次，builder 按 O(1) 查询前驱/后继/完成依赖。

use std::collections::{HashMap, VecDeque};

use log::warn;

use super::model::{ConfigRecord, ConfigSnapshot, EdgeKind, RecordId, RecordIndex};
use crate::error::{ErrorAggregator, ErrorKind};

#[derive(Clone, Debug, Default)]
pub struct FlowIndex {
    predecessors: HashMap<RecordId, Vec<RecordId>>,
    successors: HashMap<RecordId, Vec<RecordId>>,
    finish_sources: HashMap<RecordId, Vec<RecordId>>,
    details_by_process: HashMap<RecordId, Vec<RecordId>>,
    details_by_operation: HashMap<RecordId, Vec<RecordId>>,
    operations_by_cylinder: HashMap<RecordId, Vec<RecordId>>,
    levels: HashMap<RecordId, u32>,
}

impl FlowIndex {
    /// 构建索引。端点不存在的边记为 BrokenReference 并忽略；连接环上的节点记为 MalformedConfiguration。
    pub fn build(
        snapshot: &ConfigSnapshot,
        records: &RecordIndex<'_>,
        errors: &mut ErrorAggregator,
    ) -> Self {
        let mut index = FlowIndex::default();

        let details = snapshot.ordered_details();
        for detail in &details {
            index
                .details_by_process
                .entry(detail.process_id)
                .or_default()
                .push(detail.id);
            if let Some(operation_id) = detail.operation_id {
                index
                    .details_by_operation
                    .entry(operation_id)
                    .or_default()
                    .push(detail.id);
            }
        }

        for operation in snapshot.ordered_operations() {
            if let Some(cylinder_id) = operation.cylinder_id {
                index
                    .operations_by_cylinder
                    .entry(cylinder_id)
                    .or_default()
                    .push(operation.id);
            }
        }

        for edge in snapshot.flow_edges.iter().filter(|e| e.plc_id == snapshot.plc_id) {
            let Some(to) = records.detail(edge.to) else {
                // 无法定位归属节点：挂到 from 节点（若存在）
                warn!("flow edge {} -> {} has unknown target", edge.from, edge.to);
                if let Some(from) = records.detail(edge.from) {
                    errors.critical(
                        ErrorKind::BrokenReference,
                        format!("flow edge targets unknown ProcessDetail {}", edge.to),
                        from.record_ref(),
                    );
                }
                continue;
            };
            if records.detail(edge.from).is_none() {
                warn!("flow edge {} -> {} has unknown source", edge.from, edge.to);
                errors.critical(
                    ErrorKind::BrokenReference,
                    format!("flow edge from unknown ProcessDetail {}", edge.from),
                    to.record_ref(),
                );
                continue;
            }

            match edge.kind {
                EdgeKind::Connection => {
                    push_unique(index.predecessors.entry(edge.to).or_default(), edge.from);
                    push_unique(index.successors.entry(edge.from).or_default(), edge.to);
                }
                EdgeKind::Finish => {
                    push_unique(index.finish_sources.entry(edge.to).or_default(), edge.from);
                }
            }
        }

        let node_ids: Vec<RecordId> = details.iter().map(|d| d.id).collect();
        index.compute_levels(&node_ids);

        for detail in &details {
            if !index.levels.contains_key(&detail.id) {
                errors.critical(
                    ErrorKind::MalformedConfiguration,
                    "ProcessDetail is part of a connection cycle",
                    detail.record_ref(),
                );
            }
        }

        index
    }

    /// 最长路径层级（Kahn 拓扑序）；环上节点不会得到层级
    fn compute_levels(&mut self, node_ids: &[RecordId]) {
        let mut in_degree: HashMap<RecordId, usize> = node_ids
            .iter()
            .map(|id| (*id, self.predecessors(*id).len()))
            .collect();

        let mut queue: VecDeque<RecordId> = node_ids
            .iter()
            .copied()
            .filter(|id| in_degree.get(id) == Some(&0))
            .collect();
        for id in &queue {
            self.levels.insert(*id, 0);
        }

        while let Some(node) = queue.pop_front() {
            let level = self.levels.get(&node).copied().unwrap_or(0);
            let successors = self.successors(node).to_vec();
            for next in successors {
                let entry = self.levels.entry(next).or_insert(0);
                *entry = (*entry).max(level + 1);

                if let Some(degree) = in_degree.get_mut(&next) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        queue.push_back(next);
                    }
                }
            }
        }

        // 只保留真正出队过的节点（入度归零）
        self.levels
            .retain(|id, _| in_degree.get(id).is_some_and(|d| *d == 0));
    }

    pub fn predecessors(&self, id: RecordId) -> &[RecordId] {
        slice_of(&self.predecessors, id)
    }

    pub fn successors(&self, id: RecordId) -> &[RecordId] {
        slice_of(&self.successors, id)
    }

    pub fn finish_sources(&self, id: RecordId) -> &[RecordId] {
        slice_of(&self.finish_sources, id)
    }

    pub fn details_for_process(&self, process_id: RecordId) -> &[RecordId] {
        slice_of(&self.details_by_process, process_id)
    }

    pub fn details_for_operation(&self, operation_id: RecordId) -> &[RecordId] {
        slice_of(&self.details_by_operation, operation_id)
    }

    pub fn operations_for_cylinder(&self, cylinder_id: RecordId) -> &[RecordId] {
        slice_of(&self.operations_by_cylinder, cylinder_id)
    }

    pub fn level(&self, id: RecordId) -> Option<u32> {
        self.levels.get(&id).copied()
    }

    /// 工程内的终端节点：在同一工程内没有后继
    pub fn terminal_details(&self, process_id: RecordId) -> Vec<RecordId> {
        let members = self.details_for_process(process_id);
        members
            .iter()
            .copied()
            .filter(|id| !self.successors(*id).iter().any(|s| members.contains(s)))
            .collect()
    }
}

fn slice_of(map: &HashMap<RecordId, Vec<RecordId>>, id: RecordId) -> &[RecordId] {
    map.get(&id).map(Vec::as_slice).unwrap_or(&[])
}

fn push_unique(list: &mut Vec<RecordId>, id: RecordId) {
    if !list.contains(&id) {
        list.push(id);
    }
}
