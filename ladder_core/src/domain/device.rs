//! 软元件（device）与分配记录。

use std::fmt;

use serde::{Deserialize, Serialize};

use super::model::{MnemonicType, PlcId, RecordId};

/// 控制器上的一个存储单元地址：字母标签 + 十进制编号（如 "M100"、"ZR20"）
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Device {
    pub label: String,
    pub number: u32,
}

impl Device {
    pub fn new(label: impl Into<String>, number: u32) -> Self {
        Self {
            label: label.into(),
            number,
        }
    }

    pub fn offset(&self, delta: u32) -> Device {
        Device::new(self.label.clone(), self.number + delta)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.label, self.number)
    }
}

/// 常数操作数（K 前缀十进制）
pub fn constant(value: u32) -> String {
    format!("K{value}")
}

/// 复合键 (MnemonicType, RecordId, PlcId) → 连续位块
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MnemonicDeviceAllocation {
    pub mnemonic_type: MnemonicType,
    pub record_id: RecordId,
    pub plc_id: PlcId,
    pub device_label: String,
    pub start_number: u32,
    pub out_coil_count: u32,
}

impl MnemonicDeviceAllocation {
    pub fn key(&self) -> (MnemonicType, RecordId, PlcId) {
        (self.mnemonic_type, self.record_id, self.plc_id)
    }

    /// 块内第 `ordinal` 个位软元件
    pub fn device(&self, ordinal: u32) -> Device {
        debug_assert!(ordinal < self.out_coil_count, "ordinal outside allocated block");
        Device::new(self.device_label.clone(), self.start_number + ordinal)
    }

    pub fn end_number(&self) -> u32 {
        self.start_number + self.out_coil_count
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerDeviceAllocation {
    pub plc_id: PlcId,
    pub timer_id: RecordId,
    pub mnemonic_type: MnemonicType,
    pub record_id: RecordId,
    pub category_id: i32,
    pub timer_device: Device,
    /// 外部设定值字（ZR）；本地定时器为 None，直接使用常数
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_device: Option<Device>,
    pub preset: u32,
}

impl TimerDeviceAllocation {
    /// OUT T 指令的设定值操作数
    pub fn set_value_operand(&self) -> String {
        match &self.value_device {
            Some(device) => device.to_string(),
            None => constant(self.preset),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SpeedDeviceAllocation {
    pub plc_id: PlcId,
    pub cylinder_id: RecordId,
    pub device: Device,
}

/// 每个 Operation 的一个计时槽：当前 / 上次 / 气缸 三路 ZR
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProsTimeAllocation {
    pub plc_id: PlcId,
    pub operation_id: RecordId,
    pub sort_id: u32,
    pub category_id: i32,
    pub current_device: Device,
    pub previous_device: Device,
    pub cylinder_device: Device,
}

/// 软元件注释行（device, 记录名 + 角色标签）
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceComment {
    pub device: Device,
    pub comment: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_formats_label_and_number() {
        let device = Device::new("ZR", 300);
        assert_eq!(device.to_string(), "ZR300");
        assert_eq!(device.offset(4).to_string(), "ZR304");
    }

    #[test]
    fn timer_set_value_prefers_value_device() {
        let mut alloc = TimerDeviceAllocation {
            plc_id: 1,
            timer_id: 1,
            mnemonic_type: MnemonicType::Operation,
            record_id: 3,
            category_id: 1,
            timer_device: Device::new("T", 0),
            value_device: None,
            preset: 25,
        };
        assert_eq!(alloc.set_value_operand(), "K25");

        alloc.value_device = Some(Device::new("ZR", 1000));
        assert_eq!(alloc.set_value_operand(), "ZR1000");
    }
}
