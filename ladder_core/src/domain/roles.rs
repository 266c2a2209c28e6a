//! 输出位角色表与类别表。
//!
//! 角色表：位块内序号 → 角色标签，builder 通过序号常量取位，导出注释时查标签。
//! 部分标签在不同序号上重复出现（如 `Reserved`、`ForcedStop`），按现场既有定义原样保留。

use serde::{Deserialize, Serialize};

use super::model::MnemonicType;

pub mod process {
    pub const START_CONDITION: u32 = 0;
    pub const START: u32 = 1;
    pub const RUNNING: u32 = 2;
    pub const RESET: u32 = 3;
    pub const FINISH: u32 = 4;
}

pub mod detail {
    pub const START: u32 = 0;
    pub const OPERATING: u32 = 1;
    pub const SKIP: u32 = 2;
    pub const FINISH_CHECK: u32 = 3;
    pub const FINISH: u32 = 4;
}

pub mod operation {
    pub const AUTO_MODE: u32 = 0;
    pub const MANUAL_SWITCH: u32 = 1;
    pub const CONDITION_OK: u32 = 2;
    pub const START: u32 = 3;
    pub const START_PULSE: u32 = 4;
    pub const COUNTER: u32 = 5;
    /// Speed1..Speed5 = SPEED_BASE + 0..4
    pub const SPEED_BASE: u32 = 6;
    pub const FORCED_DECELERATION: u32 = 11;
    pub const DIRECTION_COMMAND: u32 = 12;
    pub const COMPLETION_PULSE: u32 = 13;
    pub const TIMEOUT: u32 = 16;
    pub const MANUAL_COMPLETE: u32 = 17;
    pub const FINISH_SENSOR: u32 = 18;
    pub const COMPLETION: u32 = 19;

    pub const MAX_SPEEDS: u8 = 5;
}

pub mod cylinder {
    pub const GO_COMMAND: u32 = 0;
    pub const BACK_COMMAND: u32 = 1;
    pub const MANUAL_GO: u32 = 2;
    pub const MANUAL_BACK: u32 = 3;
    pub const GO_HOLD: u32 = 4;
    pub const BACK_HOLD: u32 = 5;
    pub const MANUAL_RESET: u32 = 6;
    pub const CYCLE_START: u32 = 7;
    pub const INTERLOCK_GO_OK: u32 = 8;
    pub const INTERLOCK_BACK_OK: u32 = 9;
    /// 前进速度 1..5 → Speed1..Speed5
    pub const GO_SPEED_BASE: u32 = 10;
    /// 后退速度 1..5 → Speed6..Speed10
    pub const BACK_SPEED_BASE: u32 = 15;
    pub const FORCED_STOP: u32 = 20;
    pub const FORCED_DECELERATION: u32 = 21;
    pub const GO_OUTPUT: u32 = 22;
    pub const BACK_OUTPUT: u32 = 23;
    pub const EXCITATION: u32 = 24;
    pub const RETENTION: u32 = 25;
    pub const MANUAL_MODE: u32 = 26;
    pub const AUTO_MODE: u32 = 27;
    pub const GO_COMPLETED: u32 = 28;
    pub const BACK_COMPLETED: u32 = 29;
    /// 伺服轴位（ServoReady..ServoStop）：仅占位并导出注释，由伺服轴程序驱动，本生成器不输出
    pub const SERVO_RESERVED: std::ops::Range<u32> = 30..40;
}

pub const PROCESS_ROLES: [&str; 5] = ["StartCondition", "Start", "Running", "Reset", "Finish"];

pub const PROCESS_DETAIL_ROLES: [&str; 5] = ["Start", "Operating", "Skip", "FinishCheck", "Finish"];

pub const OPERATION_ROLES: [&str; 20] = [
    "AutoMode",
    "ManualSwitch",
    "ConditionOk",
    "Start",
    "StartPulse",
    "Counter",
    "Speed1",
    "Speed2",
    "Speed3",
    "Speed4",
    "Speed5",
    "ForcedDeceleration",
    "DirectionCommand",
    "CompletionPulse",
    "Reserved",
    "Reserved",
    "Timeout",
    "ManualComplete",
    "FinishSensor",
    "Completion",
];

pub const CYLINDER_ROLES: [&str; 50] = [
    "GoCommand",
    "BackCommand",
    "ManualGo",
    "ManualBack",
    "GoHold",
    "BackHold",
    "ManualReset",
    "CycleStart",
    "InterlockGoOk",
    "InterlockBackOk",
    "Speed1",
    "Speed2",
    "Speed3",
    "Speed4",
    "Speed5",
    "Speed6",
    "Speed7",
    "Speed8",
    "Speed9",
    "Speed10",
    "ForcedStop",
    "ForcedDeceleration",
    "GoOutput",
    "BackOutput",
    "Excitation",
    "Retention",
    "ManualMode",
    "AutoMode",
    "GoCompleted",
    "BackCompleted",
    "ServoReady",
    "ServoOn",
    "ServoAlarm",
    "ServoOriginReturn",
    "ServoOriginDone",
    "ServoJogGo",
    "ServoJogBack",
    "ServoPositioning",
    "ServoPositionDone",
    "ServoStop",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "ForcedStop",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
];

pub fn role_table(mnemonic_type: MnemonicType) -> &'static [&'static str] {
    match mnemonic_type {
        MnemonicType::Process => &PROCESS_ROLES,
        MnemonicType::ProcessDetail => &PROCESS_DETAIL_ROLES,
        MnemonicType::Operation => &OPERATION_ROLES,
        MnemonicType::Cylinder => &CYLINDER_ROLES,
    }
}

pub fn role_label(mnemonic_type: MnemonicType, ordinal: u32) -> Option<&'static str> {
    role_table(mnemonic_type).get(ordinal as usize).copied()
}

// ---- 类别表 ----

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessCategory {
    Normal,
    /// 常时可用：不等待前驱工程
    AlwaysAvailable,
}

impl ProcessCategory {
    /// None → Normal；未知 ID → None（由调用方报 MalformedConfiguration）
    pub fn resolve(category_id: Option<i32>) -> Option<Self> {
        match category_id {
            None | Some(1) => Some(ProcessCategory::Normal),
            Some(2) => Some(ProcessCategory::AlwaysAvailable),
            Some(_) => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetailCategory {
    /// 完成 = Operation 完成位
    Normal,
    /// 工程块代表节点：完成仅由 finish 边决定
    Block,
    SensorOn,
    SensorOff,
    /// 完成 = 延时定时器
    Timer,
}

impl DetailCategory {
    pub fn resolve(category_id: Option<i32>) -> Option<Self> {
        match category_id {
            None | Some(1) => Some(DetailCategory::Normal),
            Some(2) => Some(DetailCategory::Block),
            Some(3) => Some(DetailCategory::SensorOn),
            Some(5) => Some(DetailCategory::SensorOff),
            Some(7) => Some(DetailCategory::Timer),
            Some(_) => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OperationDirection {
    Go,
    Back,
    Active,
    Off,
}

impl OperationDirection {
    /// Go/Active 驱动气缸前进（或电机运转）指令，Back/Off 驱动后退（或停止）指令
    pub fn drives_go(self) -> bool {
        matches!(self, OperationDirection::Go | OperationDirection::Active)
    }

    pub fn label(self) -> &'static str {
        match self {
            OperationDirection::Go => "go",
            OperationDirection::Back => "back",
            OperationDirection::Active => "active",
            OperationDirection::Off => "off",
        }
    }
}

/// OperationCategoryId → 模板参数
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperationCategory {
    pub id: i32,
    pub direction: OperationDirection,
    pub speed_count: u8,
    pub counter: bool,
    pub forced_deceleration: bool,
}

const fn op_category(
    id: i32,
    direction: OperationDirection,
    speed_count: u8,
    counter: bool,
    forced_deceleration: bool,
) -> OperationCategory {
    OperationCategory {
        id,
        direction,
        speed_count,
        counter,
        forced_deceleration,
    }
}

pub const OPERATION_CATEGORIES: [OperationCategory; 15] = [
    op_category(1, OperationDirection::Go, 0, false, false),
    op_category(2, OperationDirection::Back, 0, false, false),
    op_category(3, OperationDirection::Go, 1, false, false),
    op_category(4, OperationDirection::Back, 1, false, false),
    op_category(5, OperationDirection::Go, 2, false, false),
    op_category(6, OperationDirection::Back, 2, false, false),
    op_category(7, OperationDirection::Go, 3, false, false),
    op_category(8, OperationDirection::Back, 3, false, false),
    op_category(9, OperationDirection::Go, 5, false, true),
    op_category(10, OperationDirection::Back, 5, false, true),
    op_category(11, OperationDirection::Active, 0, false, false),
    op_category(12, OperationDirection::Off, 0, false, false),
    op_category(13, OperationDirection::Go, 0, true, false),
    op_category(14, OperationDirection::Back, 0, true, false),
    op_category(15, OperationDirection::Go, 5, true, true),
];

pub fn operation_category(category_id: i32) -> Option<&'static OperationCategory> {
    OPERATION_CATEGORIES.iter().find(|c| c.id == category_id)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CylinderKind {
    SingleValve,
    DoubleValve,
    Motor,
}

impl CylinderKind {
    pub fn from_category(category_id: i32) -> Option<Self> {
        match category_id {
            1 => Some(CylinderKind::SingleValve),
            2 => Some(CylinderKind::DoubleValve),
            3 => Some(CylinderKind::Motor),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CylinderKind::SingleValve => "single valve",
            CylinderKind::DoubleValve => "double valve",
            CylinderKind::Motor => "motor",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerPurpose {
    /// 动作超时
    Timeout,
    /// 完成传感器稳定延时
    Stable,
    /// 工程延时
    Delay,
}

/// 定时器类别：用途 + 设定值来源（本地常数 / 外部 ZR 字）
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerCategory {
    pub id: i32,
    pub purpose: TimerPurpose,
    pub external: bool,
}

pub const TIMER_CATEGORIES: [TimerCategory; 6] = [
    TimerCategory { id: 1, purpose: TimerPurpose::Timeout, external: false },
    TimerCategory { id: 2, purpose: TimerPurpose::Stable, external: false },
    TimerCategory { id: 3, purpose: TimerPurpose::Delay, external: false },
    TimerCategory { id: 4, purpose: TimerPurpose::Timeout, external: true },
    TimerCategory { id: 5, purpose: TimerPurpose::Stable, external: true },
    TimerCategory { id: 6, purpose: TimerPurpose::Delay, external: true },
];

pub const TIMER_DEVICE_LABEL: &str = "T";
pub const TIMER_VALUE_DEVICE_LABEL: &str = "ZR";
pub const SPEED_DEVICE_LABEL: &str = "D";
pub const PROS_TIME_DEVICE_LABEL: &str = "ZR";

pub fn timer_category(category_id: i32) -> Option<&'static TimerCategory> {
    TIMER_CATEGORIES.iter().find(|c| c.id == category_id)
}

/// ProsTime 槽类别 → 计时门控的 Operation 位序号
pub fn pros_time_gate(slot_category_id: i32) -> u32 {
    match slot_category_id {
        2..=6 => operation::SPEED_BASE + (slot_category_id - 2) as u32,
        7 => operation::FORCED_DECELERATION,
        _ => operation::START,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_tables_match_strides() {
        for m in MnemonicType::ALL {
            assert_eq!(role_table(m).len() as u32, m.stride(), "{m:?}");
        }
    }

    #[test]
    fn duplicated_role_labels_are_kept() {
        assert_eq!(role_label(MnemonicType::Cylinder, cylinder::FORCED_STOP), Some("ForcedStop"));
        assert_eq!(role_label(MnemonicType::Cylinder, 44), Some("ForcedStop"));
        assert_eq!(
            role_label(MnemonicType::Operation, 14),
            role_label(MnemonicType::Operation, 15)
        );
        assert_eq!(role_label(MnemonicType::Operation, 20), None);
    }

    #[test]
    fn ordinal_constants_point_at_their_labels() {
        assert_eq!(role_label(MnemonicType::Process, process::RUNNING), Some("Running"));
        assert_eq!(role_label(MnemonicType::ProcessDetail, detail::FINISH), Some("Finish"));
        assert_eq!(role_label(MnemonicType::Operation, operation::COMPLETION), Some("Completion"));
        assert_eq!(
            role_label(MnemonicType::Operation, operation::SPEED_BASE + 4),
            Some("Speed5")
        );
        assert_eq!(
            role_label(MnemonicType::Cylinder, cylinder::BACK_SPEED_BASE + 4),
            Some("Speed10")
        );
    }

    #[test]
    fn category_lookups() {
        assert_eq!(operation_category(9).map(|c| c.speed_count), Some(5));
        assert!(operation_category(0).is_none());
        assert_eq!(CylinderKind::from_category(2), Some(CylinderKind::DoubleValve));
        assert_eq!(DetailCategory::resolve(None), Some(DetailCategory::Normal));
        assert_eq!(DetailCategory::resolve(Some(4)), None);
        assert!(timer_category(4).is_some_and(|c| c.external));
        assert_eq!(pros_time_gate(1), operation::START);
        assert_eq!(pros_time_gate(3), operation::SPEED_BASE + 1);
    }
}
