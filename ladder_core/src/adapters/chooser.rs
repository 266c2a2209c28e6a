//! 非交互式 IoChooser 实现（批处理 / 测试）。

use std::collections::HashMap;

use log::warn;

use crate::domain::model::IoPoint;
use crate::error::RecordRef;
use crate::ports::IoChooser;

/// 总是选第一个候选（仅用于演示/测试；批处理默认用 `CancelChooser`）
#[derive(Clone, Copy, Debug, Default)]
pub struct FirstCandidateChooser;

impl IoChooser for FirstCandidateChooser {
    fn choose(&mut self, tag: &str, owner: &RecordRef, candidates: &[IoPoint]) -> Option<usize> {
        warn!(
            "auto-pick first of {} candidates for tag={tag} owner={:?}#{}",
            candidates.len(),
            owner.mnemonic_type,
            owner.record_id
        );
        (!candidates.is_empty()).then_some(0)
    }
}

/// 总是取消（多重匹配即记为 CancelledSelection）
#[derive(Clone, Copy, Debug, Default)]
pub struct CancelChooser;

impl IoChooser for CancelChooser {
    fn choose(&mut self, _tag: &str, _owner: &RecordRef, _candidates: &[IoPoint]) -> Option<usize> {
        None
    }
}

/// 预设答案：tag → 期望的 IO 名称（或地址）；未配置的 tag 视为取消
#[derive(Clone, Debug, Default)]
pub struct PreferredNameChooser {
    preferred: HashMap<String, String>,
}

impl PreferredNameChooser {
    pub fn new(preferred: HashMap<String, String>) -> Self {
        Self { preferred }
    }

    pub fn with(mut self, tag: impl Into<String>, name: impl Into<String>) -> Self {
        self.preferred.insert(tag.into(), name.into());
        self
    }
}

impl IoChooser for PreferredNameChooser {
    fn choose(&mut self, tag: &str, _owner: &RecordRef, candidates: &[IoPoint]) -> Option<usize> {
        let wanted = self.preferred.get(tag)?;
        candidates
            .iter()
            .position(|c| &c.name == wanted || &c.address == wanted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::MnemonicType;

    fn point(address: &str, name: &str) -> IoPoint {
        IoPoint {
            plc_id: 1,
            address: address.to_string(),
            name: name.to_string(),
            comment: None,
            link_device: None,
        }
    }

    #[test]
    fn choosers_pick_as_configured() {
        let owner = RecordRef::new(MnemonicType::Operation, 1, "Op1");
        let candidates = vec![point("X10", "CLAMP_A_SENSOR"), point("X11", "CLAMP_B_SENSOR")];

        assert_eq!(FirstCandidateChooser.choose("CLAMP", &owner, &candidates), Some(0));
        assert_eq!(FirstCandidateChooser.choose("CLAMP", &owner, &[]), None);
        assert_eq!(CancelChooser.choose("CLAMP", &owner, &candidates), None);

        let mut preferred = PreferredNameChooser::default().with("CLAMP", "CLAMP_B_SENSOR");
        assert_eq!(preferred.choose("CLAMP", &owner, &candidates), Some(1));
        assert_eq!(preferred.choose("OTHER", &owner, &candidates), None);
    }
}
