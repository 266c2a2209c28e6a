use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// 生成器全局信号配置
/// 说明：以显式只读结构传入每个 builder，不使用全局可变状态。
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct GeneratorSettings {
    /// 助记符位块的软元件标签
    pub device_label: String,
    /// 暂停/使能信号（ON = 允许运行）
    pub pause_signal: String,
    /// 计时用时钟脉冲
    pub clock_pulse: String,
    pub always_on: String,
    pub always_off: String,
    pub manual_mode: String,
    pub cycle_start: String,
    pub reset_signal: String,
    pub emergency_stop: String,
    /// 输出级采用“励磁”而非“保持”的机型 ID
    pub excitation_machine_ids: Vec<i32>,
    /// CSV 操作数列数
    pub operand_columns: usize,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            device_label: "M".to_string(),
            pause_signal: "M14".to_string(),
            clock_pulse: "SM410".to_string(),
            always_on: "SM400".to_string(),
            always_off: "SM401".to_string(),
            manual_mode: "M10".to_string(),
            cycle_start: "M11".to_string(),
            reset_signal: "M12".to_string(),
            emergency_stop: "M13".to_string(),
            excitation_machine_ids: Vec::new(),
            operand_columns: 3,
        }
    }
}

impl GeneratorSettings {
    /// 文件不存在 → 默认配置；存在但无法解析 → 报错
    pub fn load_from_file(path: &Path) -> Result<Self> {
        load_json_or_default(path, "generator settings")
    }

    pub fn uses_excitation(&self, machine_id: Option<i32>) -> bool {
        machine_id.is_some_and(|id| self.excitation_machine_ids.contains(&id))
    }
}

/// 各类软元件的起始编号
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceOffsets {
    pub process: u32,
    pub process_detail: u32,
    pub operation: u32,
    pub cylinder: u32,
    pub timer: u32,
    pub timer_value: u32,
    pub speed: u32,
    pub pros_time_current: u32,
    pub pros_time_previous: u32,
    pub pros_time_cylinder: u32,
}

impl Default for DeviceOffsets {
    fn default() -> Self {
        Self {
            process: 1000,
            process_detail: 2000,
            operation: 4000,
            cylinder: 10000,
            timer: 0,
            timer_value: 1000,
            speed: 5000,
            pros_time_current: 3000,
            pros_time_previous: 4000,
            pros_time_cylinder: 5000,
        }
    }
}

impl DeviceOffsets {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        load_json_or_default(path, "device offsets")
    }
}

fn load_json_or_default<T: DeserializeOwned + Default>(path: &Path, what: &str) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {what} file from: {}", path.display()))?;
    let value: T = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {what} JSON from: {}", path.display()))?;
    Ok(value)
}
