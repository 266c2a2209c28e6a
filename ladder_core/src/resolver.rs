//! IO 地址解析：把人工填写的标签文本映射为具体 IO 地址。
//!
//! 规则（按顺序）：
//! 1. `L-` 前缀 → 改查长度表（名称包含剩余文本），只有唯一匹配才算找到
//! 2. 去掉开头的 `_`
//! 3. 按方向（X=输入 / Y=输出）过滤，按排除 token 过滤
//! 4. 名称包含标签 → 唯一匹配返回 `link_device`（若有）否则地址，转半角
//!
//! 匹配前标签与名称都转为半角 ASCII（全角字母/数字/空格与半角视为相同）。

use log::debug;

use crate::domain::model::{to_halfwidth_ascii, IoDirection, IoPoint, Length};
use crate::error::{ErrorAggregator, ErrorKind, RecordRef};
use crate::ports::IoChooser;

pub const LENGTH_PREFIX: &str = "L-";
pub const EXCLUSION_MARKER: char = '_';

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Found(String),
    /// 多重匹配：交给外部选择
    Ambiguous(Vec<IoPoint>),
    NotFound,
}

impl Resolution {
    pub fn found(self) -> Option<String> {
        match self {
            Resolution::Found(address) => Some(address),
            _ => None,
        }
    }
}

/// 一次解析请求
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IoQuery<'q> {
    pub tag: &'q str,
    pub direction: Option<IoDirection>,
    /// 名称包含该 token 的 IO 不参与匹配
    pub exclusion: Option<&'q str>,
}

impl<'q> IoQuery<'q> {
    pub fn any(tag: &'q str) -> Self {
        Self {
            tag,
            direction: None,
            exclusion: None,
        }
    }

    pub fn input(tag: &'q str) -> Self {
        Self {
            direction: Some(IoDirection::Input),
            ..Self::any(tag)
        }
    }

    pub fn output(tag: &'q str) -> Self {
        Self {
            direction: Some(IoDirection::Output),
            ..Self::any(tag)
        }
    }

    pub fn excluding(mut self, token: Option<&'q str>) -> Self {
        self.exclusion = token.filter(|t| !t.trim().is_empty());
        self
    }
}

#[derive(Clone, Copy, Debug)]
pub struct IoAddressResolver<'a> {
    io_points: &'a [IoPoint],
    lengths: &'a [Length],
}

impl<'a> IoAddressResolver<'a> {
    pub fn new(io_points: &'a [IoPoint], lengths: &'a [Length]) -> Self {
        Self { io_points, lengths }
    }

    /// 纯查询：不记录错误。空标签返回 NotFound。
    pub fn lookup(&self, query: &IoQuery<'_>) -> Resolution {
        let tag = normalize(query.tag);
        if tag.is_empty() {
            return Resolution::NotFound;
        }

        if let Some(rest) = tag.strip_prefix(LENGTH_PREFIX) {
            return self.lookup_length(rest);
        }

        let needle = tag.strip_prefix(EXCLUSION_MARKER).unwrap_or(&tag);
        if needle.is_empty() {
            return Resolution::NotFound;
        }

        let mut matches: Vec<&IoPoint> = self
            .candidates(query)
            .filter(|io| normalize(&io.name).contains(needle))
            .collect();

        match matches.len() {
            0 => Resolution::NotFound,
            1 => Resolution::Found(effective_address(matches.remove(0))),
            _ => Resolution::Ambiguous(matches.into_iter().cloned().collect()),
        }
    }

    /// 解析并把失败记入 `errors`：未找到 / 歧义 / 空标签各记一条 critical。
    pub fn resolve(
        &self,
        query: &IoQuery<'_>,
        owner: &RecordRef,
        errors: &mut ErrorAggregator,
    ) -> Resolution {
        if query.tag.trim().is_empty() {
            errors.critical(
                ErrorKind::MalformedConfiguration,
                "empty IO tag",
                owner.clone(),
            );
            return Resolution::NotFound;
        }

        let resolution = self.lookup(query);
        match &resolution {
            Resolution::Found(address) => debug!("resolved '{}' -> {}", query.tag, address),
            Resolution::NotFound => report_not_found(query, owner, errors),
            Resolution::Ambiguous(candidates) => errors.critical(
                ErrorKind::Ambiguous,
                format!(
                    "IO tag '{}' matches {} candidates: {}",
                    query.tag,
                    candidates.len(),
                    candidate_names(candidates)
                ),
                owner.clone(),
            ),
        }
        resolution
    }

    /// 歧义时同步询问 `chooser`；取消或越界视为 CancelledSelection。
    pub fn resolve_with_chooser(
        &self,
        query: &IoQuery<'_>,
        owner: &RecordRef,
        chooser: &mut dyn IoChooser,
        errors: &mut ErrorAggregator,
    ) -> Option<String> {
        if query.tag.trim().is_empty() {
            errors.critical(
                ErrorKind::MalformedConfiguration,
                "empty IO tag",
                owner.clone(),
            );
            return None;
        }

        match self.lookup(query) {
            Resolution::Found(address) => {
                debug!("resolved '{}' -> {}", query.tag, address);
                Some(address)
            }
            Resolution::NotFound => {
                report_not_found(query, owner, errors);
                None
            }
            Resolution::Ambiguous(candidates) => {
                let chosen = chooser
                    .choose(query.tag, owner, &candidates)
                    .and_then(|i| candidates.get(i));
                match chosen {
                    Some(io) => {
                        debug!("'{}' disambiguated to {}", query.tag, io.name);
                        Some(effective_address(io))
                    }
                    None => {
                        errors.critical(
                            ErrorKind::CancelledSelection,
                            format!("selection cancelled for IO tag '{}'", query.tag),
                            owner.clone(),
                        );
                        None
                    }
                }
            }
        }
    }

    /// 范围解析：返回名称包含 token 的全部 IO（按 IO 表顺序）。
    /// 无匹配时返回空列表，`report_miss` 为 true 时记一条 informational。
    pub fn resolve_range(
        &self,
        query: &IoQuery<'_>,
        owner: &RecordRef,
        errors: &mut ErrorAggregator,
        report_miss: bool,
    ) -> Vec<String> {
        let token = normalize(query.tag);
        let token = token.strip_prefix(EXCLUSION_MARKER).unwrap_or(&token);
        if token.is_empty() {
            return Vec::new();
        }

        let addresses: Vec<String> = self
            .candidates(query)
            .filter(|io| normalize(&io.name).contains(token))
            .map(effective_address)
            .collect();

        if addresses.is_empty() && report_miss {
            errors.informational(
                ErrorKind::NotFound,
                format!("no IO in range '{}'", query.tag),
                owner.clone(),
            );
        }
        addresses
    }

    fn lookup_length(&self, name_part: &str) -> Resolution {
        let name_part = name_part.trim();
        if name_part.is_empty() {
            return Resolution::NotFound;
        }
        let mut matches = self
            .lengths
            .iter()
            .filter(|l| normalize(&l.name).contains(name_part));
        match (matches.next(), matches.next()) {
            (Some(length), None) => Resolution::Found(normalize(&length.device)),
            _ => Resolution::NotFound,
        }
    }

    fn candidates(&self, query: &IoQuery<'_>) -> impl Iterator<Item = &'a IoPoint> {
        let points: &'a [IoPoint] = self.io_points;
        let wanted = query.direction;
        let exclusion = query.exclusion.map(normalize);
        points.iter().filter(move |io| {
            if let Some(direction) = wanted {
                if io.direction() != Some(direction) {
                    return false;
                }
            }
            match &exclusion {
                Some(token) => !normalize(&io.name).contains(token.as_str()),
                None => true,
            }
        })
    }
}

fn report_not_found(query: &IoQuery<'_>, owner: &RecordRef, errors: &mut ErrorAggregator) {
    let direction = query
        .direction
        .map(|d| format!(" ({})", d.address_prefix()))
        .unwrap_or_default();
    errors.critical(
        ErrorKind::NotFound,
        format!("IO tag '{}'{} not found", query.tag, direction),
        owner.clone(),
    );
}

fn candidate_names(candidates: &[IoPoint]) -> String {
    candidates
        .iter()
        .map(|io| format!("{}={}", io.name, io.address))
        .collect::<Vec<_>>()
        .join(", ")
}

fn effective_address(io: &IoPoint) -> String {
    match io.link_device.as_deref().map(str::trim) {
        Some(link) if !link.is_empty() => normalize(link),
        _ => normalize(&io.address),
    }
}

fn normalize(text: &str) -> String {
    to_halfwidth_ascii(text).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::MnemonicType;

    fn io(address: &str, name: &str) -> IoPoint {
        IoPoint {
            plc_id: 1,
            address: address.to_string(),
            name: name.to_string(),
            comment: None,
            link_device: None,
        }
    }

    fn owner() -> RecordRef {
        RecordRef::new(MnemonicType::Operation, 4, "OP4")
    }

    struct Pick(Option<usize>);

    impl IoChooser for Pick {
        fn choose(
            &mut self,
            _tag: &str,
            _owner: &RecordRef,
            _candidates: &[IoPoint],
        ) -> Option<usize> {
            self.0
        }
    }

    #[test]
    fn single_substring_match_returns_address() {
        let ios = vec![io("X10", "START1")];
        let resolver = IoAddressResolver::new(&ios, &[]);
        let mut errors = ErrorAggregator::new();

        let r = resolver.resolve(&IoQuery::any("START"), &owner(), &mut errors);
        assert_eq!(r, Resolution::Found("X10".to_string()));
        assert!(errors.is_empty());
    }

    #[test]
    fn multiple_matches_are_ambiguous_with_one_critical_error() {
        let ios = vec![io("X0", "G1"), io("X1", "G2")];
        let resolver = IoAddressResolver::new(&ios, &[]);
        let mut errors = ErrorAggregator::new();

        let r = resolver.resolve(&IoQuery::any("G"), &owner(), &mut errors);
        match r {
            Resolution::Ambiguous(candidates) => assert_eq!(candidates, ios),
            other => panic!("expected ambiguous, got {other:?}"),
        }
        assert_eq!(errors.critical_count(), 1);
        assert_eq!(errors.all()[0].kind, ErrorKind::Ambiguous);
        assert_eq!(errors.all()[0].owner, owner());
    }

    #[test]
    fn zero_matches_record_not_found_against_owner() {
        let ios = vec![io("X0", "G1")];
        let resolver = IoAddressResolver::new(&ios, &[]);
        let mut errors = ErrorAggregator::new();

        assert_eq!(
            resolver.resolve(&IoQuery::any("MISSING"), &owner(), &mut errors),
            Resolution::NotFound
        );
        assert_eq!(errors.critical_count(), 1);
        assert_eq!(errors.all()[0].kind, ErrorKind::NotFound);
        assert_eq!(errors.all()[0].owner.record_id, 4);
    }

    #[test]
    fn link_device_overrides_raw_address() {
        let mut point = io("X10", "CLAMP_SW");
        point.link_device = Some("M500".to_string());
        let ios = vec![point];
        let resolver = IoAddressResolver::new(&ios, &[]);

        assert_eq!(
            resolver.lookup(&IoQuery::any("CLAMP")),
            Resolution::Found("M500".to_string())
        );
    }

    #[test]
    fn direction_filter_uses_address_prefix() {
        let ios = vec![io("X10", "CLAMP"), io("Y20", "CLAMP")];
        let resolver = IoAddressResolver::new(&ios, &[]);

        assert_eq!(
            resolver.lookup(&IoQuery::input("CLAMP")),
            Resolution::Found("X10".to_string())
        );
        assert_eq!(
            resolver.lookup(&IoQuery::output("CLAMP")),
            Resolution::Found("Y20".to_string())
        );
        assert!(matches!(resolver.lookup(&IoQuery::any("CLAMP")), Resolution::Ambiguous(_)));
    }

    #[test]
    fn exclusion_token_and_leading_marker() {
        let ios = vec![io("X1", "LIFT_UP"), io("X2", "LIFT_UP_B")];
        let resolver = IoAddressResolver::new(&ios, &[]);

        let query = IoQuery::input("_LIFT").excluding(Some("_B"));
        assert_eq!(resolver.lookup(&query), Resolution::Found("X1".to_string()));
        // 空排除 token 不生效
        let query = IoQuery::input("LIFT").excluding(Some(" "));
        assert!(matches!(resolver.lookup(&query), Resolution::Ambiguous(_)));
    }

    #[test]
    fn length_prefix_requires_exactly_one_length_row() {
        let lengths = vec![
            Length { id: 1, plc_id: 1, name: "STROKE_A".to_string(), device: "D300".to_string() },
            Length { id: 2, plc_id: 1, name: "STROKE_B".to_string(), device: "D301".to_string() },
        ];
        let ios = vec![io("X0", "L-STROKE_A")];
        let resolver = IoAddressResolver::new(&ios, &lengths);

        assert_eq!(
            resolver.lookup(&IoQuery::any("L-STROKE_A")),
            Resolution::Found("D300".to_string())
        );
        assert_eq!(resolver.lookup(&IoQuery::any("L-STROKE")), Resolution::NotFound);
        assert_eq!(resolver.lookup(&IoQuery::any("L-NONE")), Resolution::NotFound);
    }

    #[test]
    fn full_width_text_is_normalized() {
        let ios = vec![io("Ｘ１０", "ＳＴＡＲＴ")];
        let resolver = IoAddressResolver::new(&ios, &[]);
        assert_eq!(
            resolver.lookup(&IoQuery::any("START")),
            Resolution::Found("X10".to_string())
        );
    }

    #[test]
    fn full_width_address_passes_direction_filter() {
        let ios = vec![io("Ｘ１０", "ＳＴＡＲＴ"), io("Ｙ２０", "ＳＴＡＲＴ_ＬＡＭＰ")];
        let resolver = IoAddressResolver::new(&ios, &[]);
        let mut errors = ErrorAggregator::new();

        let input = resolver.resolve(&IoQuery::input("START"), &owner(), &mut errors);
        assert_eq!(input, Resolution::Found("X10".to_string()));
        let output = resolver.resolve(&IoQuery::output("START"), &owner(), &mut errors);
        assert_eq!(output, Resolution::Found("Y20".to_string()));
        assert!(errors.is_empty());
    }

    #[test]
    fn chooser_picks_or_cancels() {
        let ios = vec![io("X0", "G1"), io("X1", "G2")];
        let resolver = IoAddressResolver::new(&ios, &[]);

        let query = IoQuery::any("G");
        let mut errors = ErrorAggregator::new();
        let picked =
            resolver.resolve_with_chooser(&query, &owner(), &mut Pick(Some(1)), &mut errors);
        assert_eq!(picked.as_deref(), Some("X1"));
        assert!(errors.is_empty());

        let cancelled =
            resolver.resolve_with_chooser(&query, &owner(), &mut Pick(None), &mut errors);
        assert_eq!(cancelled, None);
        assert_eq!(errors.critical_count(), 1);
        assert_eq!(errors.all()[0].kind, ErrorKind::CancelledSelection);

        let out_of_range =
            resolver.resolve_with_chooser(&query, &owner(), &mut Pick(Some(5)), &mut errors);
        assert_eq!(out_of_range, None);
        assert_eq!(errors.critical_count(), 2);
    }

    #[test]
    fn empty_tag_is_malformed() {
        let resolver = IoAddressResolver::new(&[], &[]);
        let mut errors = ErrorAggregator::new();
        resolver.resolve(&IoQuery::any("  "), &owner(), &mut errors);
        assert_eq!(errors.all()[0].kind, ErrorKind::MalformedConfiguration);
    }

    #[test]
    fn range_resolution_returns_all_matches_or_informational_miss() {
        let ios = vec![io("X20", "BANK_S1"), io("Y3", "BANK_OUT"), io("X21", "BANK_S2")];
        let resolver = IoAddressResolver::new(&ios, &[]);
        let mut errors = ErrorAggregator::new();

        let bank = resolver.resolve_range(&IoQuery::input("BANK"), &owner(), &mut errors, true);
        assert_eq!(bank, vec!["X20", "X21"]);

        let none = resolver.resolve_range(&IoQuery::input("NOPE"), &owner(), &mut errors, true);
        assert!(none.is_empty());
        assert_eq!(errors.len(), 1);
        assert!(!errors.has_critical());
    }
}
