use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::GenerateError;

/// 协作式取消信号：分配器与 builder 在每条记录之间检查
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), GenerateError> {
        if self.is_cancelled() {
            return Err(GenerateError::Cancelled);
        }
        Ok(())
    }
}
