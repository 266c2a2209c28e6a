use crate::domain::model::IoPoint;
use crate::error::RecordRef;

/// IO 多重匹配时的人工选择端口
/// 说明：同步调用，阻塞当前 builder 直到返回；`None` 表示取消选择。
pub trait IoChooser {
    /// 返回 `candidates` 中被选中项的下标
    fn choose(&mut self, tag: &str, owner: &RecordRef, candidates: &[IoPoint]) -> Option<usize>;
}
