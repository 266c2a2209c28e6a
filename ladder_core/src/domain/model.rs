//! 配置模型：一次生成运行期间只读的记录快照。
//!
//! 约束：
//! - 所有记录都以 `plcId` + 自然键标识
//! - 快照由外部持久化层提供，本 crate 只读取，不修改
//! - 记录顺序：按 `(sortNumber, id)` 稳定排序，缺失 sortNumber 的记录排在最后

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::RecordRef;

pub type PlcId = i32;
pub type RecordId = i32;

/// 助记符类型：四类顶层记录，各自拥有独立的设备分配规则。
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MnemonicType {
    Process,
    ProcessDetail,
    Operation,
    Cylinder,
}

impl MnemonicType {
    pub const ALL: [MnemonicType; 4] = [
        MnemonicType::Process,
        MnemonicType::ProcessDetail,
        MnemonicType::Operation,
        MnemonicType::Cylinder,
    ];

    /// 持久化层使用的数值 ID
    pub fn id(self) -> i32 {
        match self {
            MnemonicType::Process => 1,
            MnemonicType::ProcessDetail => 2,
            MnemonicType::Operation => 3,
            MnemonicType::Cylinder => 4,
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.id() == id)
    }

    /// 每条记录占用的位软元件数量（stride）
    pub fn stride(self) -> u32 {
        match self {
            MnemonicType::Process => 5,
            MnemonicType::ProcessDetail => 5,
            MnemonicType::Operation => 20,
            MnemonicType::Cylinder => 50,
        }
    }

    /// 导出文件名（不含扩展名）
    pub fn file_stem(self) -> &'static str {
        match self {
            MnemonicType::Process => "process",
            MnemonicType::ProcessDetail => "process_detail",
            MnemonicType::Operation => "operation",
            MnemonicType::Cylinder => "cylinder",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            MnemonicType::Process => "Process",
            MnemonicType::ProcessDetail => "ProcessDetail",
            MnemonicType::Operation => "Operation",
            MnemonicType::Cylinder => "Cylinder",
        }
    }
}

/// IO 方向：按地址前缀约定判定（X=输入，Y=输出）
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum IoDirection {
    Input,
    Output,
}

impl IoDirection {
    pub fn address_prefix(self) -> char {
        match self {
            IoDirection::Input => 'X',
            IoDirection::Output => 'Y',
        }
    }
}

/// 工程流连接类型
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// 前驱/后继（feeds into）
    Connection,
    /// 完成依赖（must finish before）
    Finish,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Process {
    pub id: RecordId,
    pub plc_id: PlcId,
    pub name: String,
    #[serde(default)]
    pub sort_number: Option<i32>,
    #[serde(default)]
    pub category_id: Option<i32>,
    /// 必须先完成的其他工程（Process.id）
    #[serde(default)]
    pub start_process_ids: Vec<RecordId>,
    /// 手动/试运行的强制开始信号（IO 标签文本）
    #[serde(default)]
    pub override_tag: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessDetail {
    pub id: RecordId,
    pub plc_id: PlcId,
    pub name: String,
    pub process_id: RecordId,
    #[serde(default)]
    pub operation_id: Option<RecordId>,
    #[serde(default)]
    pub sort_number: Option<i32>,
    #[serde(default)]
    pub category_id: Option<i32>,
    #[serde(default)]
    pub start_sensor: Option<String>,
    #[serde(default)]
    pub finish_sensor: Option<String>,
    #[serde(default)]
    pub skip_tag: Option<String>,
    /// 所属工程块的代表节点（ProcessDetail.id）
    #[serde(default)]
    pub block_number: Option<RecordId>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub id: RecordId,
    pub plc_id: PlcId,
    pub name: String,
    #[serde(default)]
    pub cylinder_id: Option<RecordId>,
    #[serde(default)]
    pub sort_number: Option<i32>,
    #[serde(default)]
    pub category_id: Option<i32>,
    /// 动作条件（interlock）
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub manual_switch: Option<String>,
    #[serde(default)]
    pub finish_sensor: Option<String>,
    /// 速度切换传感器 S1..S5
    #[serde(default)]
    pub speed_sensors: Vec<String>,
    /// 传感器组：存在时按范围解析并优先于 `speed_sensors`
    #[serde(default)]
    pub sensor_bank: Option<String>,
    #[serde(default)]
    pub forced_decel_sensor: Option<String>,
    /// 计数器字软元件（如 "D100"）
    #[serde(default)]
    pub counter_device: Option<String>,
    /// 解析传感器时排除名称包含该 token 的 IO
    #[serde(default)]
    pub sensor_exclusion: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Cylinder {
    pub id: RecordId,
    pub plc_id: PlcId,
    pub name: String,
    #[serde(default)]
    pub sort_number: Option<i32>,
    #[serde(default)]
    pub category_id: Option<i32>,
    #[serde(default)]
    pub machine_id: Option<i32>,
    #[serde(default)]
    pub go_valve: Option<String>,
    #[serde(default)]
    pub back_valve: Option<String>,
    #[serde(default)]
    pub manual_go: Option<String>,
    #[serde(default)]
    pub manual_back: Option<String>,
    #[serde(default)]
    pub forced_stop: Option<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum InterlockDirection {
    Go,
    Back,
}

/// 气缸互锁条件：IO 标签或另一气缸的保持位二选一
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Interlock {
    pub id: RecordId,
    pub plc_id: PlcId,
    pub cylinder_id: RecordId,
    pub direction: InterlockDirection,
    #[serde(default)]
    pub condition_tag: Option<String>,
    #[serde(default)]
    pub condition_cylinder_id: Option<RecordId>,
    /// 参照气缸的前进端（true）或后退端（false）保持位
    #[serde(default)]
    pub condition_go: bool,
    /// true 时使用常闭接点（ANI）
    #[serde(default)]
    pub normally_closed: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Timer {
    pub id: RecordId,
    pub plc_id: PlcId,
    pub name: String,
    #[serde(default)]
    pub category_id: Option<i32>,
    /// 设定值（100ms 单位）
    #[serde(default)]
    pub value: u32,
    pub mnemonic_type: MnemonicType,
    /// 使用该定时器的记录 ID（同一 mnemonic_type）
    #[serde(default)]
    pub record_ids: Vec<RecordId>,
    #[serde(default)]
    pub sort_number: Option<i32>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IoPoint {
    pub plc_id: PlcId,
    pub address: String,
    pub name: String,
    #[serde(default)]
    pub comment: Option<String>,
    /// 存在时优先于原始地址
    #[serde(default)]
    pub link_device: Option<String>,
}

impl IoPoint {
    /// 按地址首字母判定方向；全角地址先转半角
    pub fn direction(&self) -> Option<IoDirection> {
        let address = to_halfwidth_ascii(&self.address);
        let first = address.trim_start().chars().next()?.to_ascii_uppercase();
        match first {
            'X' => Some(IoDirection::Input),
            'Y' => Some(IoDirection::Output),
            _ => None,
        }
    }
}

/// 长度表（"L-" 前缀标签的解析目标）
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Length {
    pub id: RecordId,
    pub plc_id: PlcId,
    pub name: String,
    pub device: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessFlowEdge {
    pub plc_id: PlcId,
    pub from: RecordId,
    pub to: RecordId,
    pub kind: EdgeKind,
}

/// 一次生成运行的完整输入
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    pub plc_id: PlcId,
    #[serde(default)]
    pub processes: Vec<Process>,
    #[serde(default)]
    pub process_details: Vec<ProcessDetail>,
    #[serde(default)]
    pub operations: Vec<Operation>,
    #[serde(default)]
    pub cylinders: Vec<Cylinder>,
    #[serde(default)]
    pub timers: Vec<Timer>,
    #[serde(default)]
    pub interlocks: Vec<Interlock>,
    #[serde(default)]
    pub io_points: Vec<IoPoint>,
    #[serde(default)]
    pub lengths: Vec<Length>,
    #[serde(default)]
    pub flow_edges: Vec<ProcessFlowEdge>,
}

/// 四类顶层记录的公共视图
pub trait ConfigRecord {
    const MNEMONIC: MnemonicType;

    fn id(&self) -> RecordId;
    fn plc_id(&self) -> PlcId;
    fn name(&self) -> &str;
    fn sort_number(&self) -> Option<i32>;

    fn sort_key(&self) -> (i32, RecordId) {
        (self.sort_number().unwrap_or(i32::MAX), self.id())
    }

    fn record_ref(&self) -> RecordRef {
        RecordRef::new(Self::MNEMONIC, self.id(), self.name())
    }
}

macro_rules! impl_config_record {
    ($ty:ty, $mnemonic:expr) => {
        impl ConfigRecord for $ty {
            const MNEMONIC: MnemonicType = $mnemonic;

            fn id(&self) -> RecordId {
                self.id
            }

            fn plc_id(&self) -> PlcId {
                self.plc_id
            }

            fn name(&self) -> &str {
                &self.name
            }

            fn sort_number(&self) -> Option<i32> {
                self.sort_number
            }
        }
    };
}

impl_config_record!(Process, MnemonicType::Process);
impl_config_record!(ProcessDetail, MnemonicType::ProcessDetail);
impl_config_record!(Operation, MnemonicType::Operation);
impl_config_record!(Cylinder, MnemonicType::Cylinder);

fn ordered<T: ConfigRecord>(items: &[T], plc_id: PlcId) -> Vec<&T> {
    let mut out: Vec<&T> = items.iter().filter(|r| r.plc_id() == plc_id).collect();
    // sort_by_key 是稳定排序：相同 key 保持输入顺序
    out.sort_by_key(|r| r.sort_key());
    out
}

impl ConfigSnapshot {
    pub fn ordered_processes(&self) -> Vec<&Process> {
        ordered(&self.processes, self.plc_id)
    }

    pub fn ordered_details(&self) -> Vec<&ProcessDetail> {
        ordered(&self.process_details, self.plc_id)
    }

    pub fn ordered_operations(&self) -> Vec<&Operation> {
        ordered(&self.operations, self.plc_id)
    }

    pub fn ordered_cylinders(&self) -> Vec<&Cylinder> {
        ordered(&self.cylinders, self.plc_id)
    }

    pub fn ordered_timers(&self) -> Vec<&Timer> {
        let mut out: Vec<&Timer> = self
            .timers
            .iter()
            .filter(|t| t.plc_id == self.plc_id)
            .collect();
        out.sort_by_key(|t| (t.sort_number.unwrap_or(i32::MAX), t.id));
        out
    }

    pub fn io_for_plc(&self) -> Vec<IoPoint> {
        self.io_points
            .iter()
            .filter(|io| io.plc_id == self.plc_id)
            .cloned()
            .collect()
    }

    pub fn lengths_for_plc(&self) -> Vec<Length> {
        self.lengths
            .iter()
            .filter(|l| l.plc_id == self.plc_id)
            .cloned()
            .collect()
    }
}

/// 记录 ID → 记录的 O(1) 查找表
#[derive(Debug)]
pub struct RecordIndex<'a> {
    processes: HashMap<RecordId, &'a Process>,
    details: HashMap<RecordId, &'a ProcessDetail>,
    operations: HashMap<RecordId, &'a Operation>,
    cylinders: HashMap<RecordId, &'a Cylinder>,
    interlocks_by_cylinder: HashMap<RecordId, Vec<&'a Interlock>>,
}

impl<'a> RecordIndex<'a> {
    pub fn new(snapshot: &'a ConfigSnapshot) -> Self {
        let plc_id = snapshot.plc_id;
        let mut interlocks_by_cylinder: HashMap<RecordId, Vec<&'a Interlock>> = HashMap::new();
        for interlock in snapshot.interlocks.iter().filter(|i| i.plc_id == plc_id) {
            interlocks_by_cylinder
                .entry(interlock.cylinder_id)
                .or_default()
                .push(interlock);
        }

        Self {
            processes: index_by_id(&snapshot.processes, plc_id),
            details: index_by_id(&snapshot.process_details, plc_id),
            operations: index_by_id(&snapshot.operations, plc_id),
            cylinders: index_by_id(&snapshot.cylinders, plc_id),
            interlocks_by_cylinder,
        }
    }

    pub fn process(&self, id: RecordId) -> Option<&'a Process> {
        self.processes.get(&id).copied()
    }

    pub fn detail(&self, id: RecordId) -> Option<&'a ProcessDetail> {
        self.details.get(&id).copied()
    }

    pub fn operation(&self, id: RecordId) -> Option<&'a Operation> {
        self.operations.get(&id).copied()
    }

    pub fn cylinder(&self, id: RecordId) -> Option<&'a Cylinder> {
        self.cylinders.get(&id).copied()
    }

    pub fn contains(&self, mnemonic_type: MnemonicType, id: RecordId) -> bool {
        match mnemonic_type {
            MnemonicType::Process => self.processes.contains_key(&id),
            MnemonicType::ProcessDetail => self.details.contains_key(&id),
            MnemonicType::Operation => self.operations.contains_key(&id),
            MnemonicType::Cylinder => self.cylinders.contains_key(&id),
        }
    }

    pub fn name_of(&self, mnemonic_type: MnemonicType, id: RecordId) -> Option<&'a str> {
        match mnemonic_type {
            MnemonicType::Process => self.process(id).map(|r| r.name.as_str()),
            MnemonicType::ProcessDetail => self.detail(id).map(|r| r.name.as_str()),
            MnemonicType::Operation => self.operation(id).map(|r| r.name.as_str()),
            MnemonicType::Cylinder => self.cylinder(id).map(|r| r.name.as_str()),
        }
    }

    pub fn interlocks_for(&self, cylinder_id: RecordId) -> &[&'a Interlock] {
        self.interlocks_by_cylinder
            .get(&cylinder_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// 全角 ASCII（！到～）与全角空格转为半角，其余字符不变
pub fn to_halfwidth_ascii(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '\u{3000}' => ' ',
            '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
            _ => c,
        })
        .collect()
}

fn index_by_id<T: ConfigRecord>(items: &[T], plc_id: PlcId) -> HashMap<RecordId, &T> {
    // 重复 ID：保留第一条
    let mut map = HashMap::with_capacity(items.len());
    for item in items.iter().filter(|r| r.plc_id() == plc_id) {
        map.entry(item.id()).or_insert(item);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn process(id: RecordId, sort_number: Option<i32>) -> Process {
        Process {
            id,
            plc_id: 1,
            name: format!("P{id}"),
            sort_number,
            category_id: None,
            start_process_ids: vec![],
            override_tag: None,
        }
    }

    #[test]
    fn ordered_records_sort_by_sort_number_then_id_with_missing_last() {
        let snapshot = ConfigSnapshot {
            plc_id: 1,
            processes: vec![
                process(3, None),
                process(2, Some(20)),
                process(1, Some(20)),
                process(4, Some(10)),
            ],
            ..ConfigSnapshot::default()
        };

        let ids: Vec<RecordId> = snapshot.ordered_processes().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![4, 1, 2, 3]);
    }

    #[test]
    fn ordered_records_skip_other_plc() {
        let mut other = process(9, Some(1));
        other.plc_id = 2;
        let snapshot = ConfigSnapshot {
            plc_id: 1,
            processes: vec![process(1, Some(1)), other],
            ..ConfigSnapshot::default()
        };

        assert_eq!(snapshot.ordered_processes().len(), 1);
        assert!(RecordIndex::new(&snapshot).process(9).is_none());
    }

    #[test]
    fn io_direction_follows_address_prefix() {
        let io = |address: &str| IoPoint {
            plc_id: 1,
            address: address.to_string(),
            name: "N".to_string(),
            comment: None,
            link_device: None,
        };

        assert_eq!(io("X10").direction(), Some(IoDirection::Input));
        assert_eq!(io("y2F").direction(), Some(IoDirection::Output));
        assert_eq!(io("D100").direction(), None);
        assert_eq!(io("").direction(), None);
        assert_eq!(io("Ｘ１０").direction(), Some(IoDirection::Input));
        assert_eq!(io("\u{3000}ｙ２").direction(), Some(IoDirection::Output));
    }

    #[test]
    fn mnemonic_ids_round_trip_through_from_id() {
        for m in MnemonicType::ALL {
            assert_eq!(MnemonicType::from_id(m.id()), Some(m));
        }
        assert_eq!(MnemonicType::from_id(99), None);
    }
}
