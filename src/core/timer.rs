//! 可取消的单槽计时器
//!
//! 同一槽位最多一个待触发的计时器：重新 arm 会取消并替换旧的；cancel() 在 stop() 时清理。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Slot {
    generation: u64,
    token: Option<CancellationToken>,
}

/// 单槽计时器（inactivity / burn-down 各一个）
#[derive(Clone)]
pub struct TimerSlot {
    name: &'static str,
    slot: Arc<Mutex<Slot>>,
}

impl TimerSlot {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    /// 取消旧计时器并在 `delay` 后执行 `on_fire`；不阻塞调用方
    pub fn arm<F, Fut>(&self, delay: Duration, on_fire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let generation = {
            let mut slot = self.slot.lock();
            if let Some(prev) = slot.token.replace(token.clone()) {
                prev.cancel();
            }
            slot.generation += 1;
            slot.generation
        };

        let name = self.name;
        let slot = Arc::clone(&self.slot);
        tracing::debug!(timer = name, delay_ms = delay.as_millis() as u64, "Timer armed");

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!(timer = name, "Timer cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    {
                        let mut slot = slot.lock();
                        if slot.generation == generation {
                            slot.token = None;
                        }
                    }
                    tracing::debug!(timer = name, "Timer fired");
                    on_fire().await;
                }
            }
        });
    }

    pub fn cancel(&self) {
        if let Some(token) = self.slot.lock().token.take() {
            token.cancel();
        }
    }

    /// 是否有待触发的计时器
    pub fn is_armed(&self) -> bool {
        self.slot.lock().token.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let timer = TimerSlot::new("test");
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        timer.arm(Duration::from_secs(5), move || async move {
            f.fetch_add(1, Ordering::SeqCst);
        });
        assert!(timer.is_armed());

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_pending() {
        let timer = TimerSlot::new("test");
        let fired = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let f = fired.clone();
            timer.arm(Duration::from_secs(5), move || async move {
                f.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_secs(3)).await;
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let timer = TimerSlot::new("test");
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        timer.arm(Duration::from_secs(1), move || async move {
            f.fetch_add(1, Ordering::SeqCst);
        });
        timer.cancel();
        assert!(!timer.is_armed());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
