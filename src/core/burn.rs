//! Burn-down（远程 kill switch）
//!
//! 延迟计算与收尾守卫。无论关闭序列中哪一步失败（返回错误或 panic），
//! BurnGuard 在 drop 时都会把 `burned` 置为 true。

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::core::SessionState;
use crate::protocol::BurnDirective;

/// `force` 时立即执行；否则延迟 `max(0, before - now)`；没有 `before` 时立即执行
pub fn burn_delay(directive: &BurnDirective, now_ms: i64) -> Duration {
    if directive.force {
        return Duration::ZERO;
    }
    match directive.before {
        Some(before) => Duration::from_millis(before.saturating_sub(now_ms).max(0) as u64),
        None => Duration::ZERO,
    }
}

/// 关闭序列的最终步骤：drop 时无条件标记 burned
pub struct BurnGuard {
    state: Arc<Mutex<SessionState>>,
}

impl BurnGuard {
    pub fn new(state: Arc<Mutex<SessionState>>) -> Self {
        Self { state }
    }
}

impl Drop for BurnGuard {
    fn drop(&mut self) {
        self.state.lock().mark_burned();
    }
}
