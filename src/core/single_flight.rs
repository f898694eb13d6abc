//! 单飞（single-flight）：同一时刻最多一个在途的异步操作
//!
//! 第二次调用若发生在第一次尚未完成时，直接等待第一次的结果，不重复执行。

use std::future::Future;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

pub struct SingleFlight<T: Clone> {
    slot: Mutex<Option<Shared<BoxFuture<'static, T>>>>,
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// 若已有在途操作则合并到它上面；否则用 `f` 启动新操作
    pub async fn run<F, Fut>(&self, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let shared = {
            let mut slot = self.slot.lock();
            match slot.as_ref() {
                Some(inflight) if inflight.peek().is_none() => inflight.clone(),
                _ => {
                    let fut = f().boxed().shared();
                    *slot = Some(fut.clone());
                    fut
                }
            }
        };
        shared.await
    }

    /// 放弃当前在途操作：已在等待的调用者仍拿到它的结果，之后的调用启动新操作
    pub fn forget(&self) {
        self.slot.lock().take();
    }

    pub fn in_flight(&self) -> bool {
        self.slot
            .lock()
            .as_ref()
            .map(|f| f.peek().is_none())
            .unwrap_or(false)
    }
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::{sleep, Duration};

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_coalesce() {
        let flight = SingleFlight::<usize>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let make = |calls: Arc<AtomicUsize>| {
            move || async move {
                sleep(Duration::from_millis(50)).await;
                calls.fetch_add(1, Ordering::SeqCst) + 1
            }
        };

        let (a, b) = tokio::join!(
            flight.run(make(calls.clone())),
            flight.run(make(calls.clone()))
        );
        assert_eq!(a, 1);
        assert_eq!(b, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!flight.in_flight());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_calls_rerun() {
        let flight = SingleFlight::<usize>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for expected in 1..=2 {
            let calls = calls.clone();
            let out = flight
                .run(move || async move { calls.fetch_add(1, Ordering::SeqCst) + 1 })
                .await;
            assert_eq!(out, expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_forget_starts_new_flight() {
        let flight = Arc::new(SingleFlight::<usize>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let first = {
            let flight = flight.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                flight
                    .run(move || async move {
                        sleep(Duration::from_millis(500)).await;
                        calls.fetch_add(1, Ordering::SeqCst) + 1
                    })
                    .await
            })
        };
        sleep(Duration::from_millis(10)).await;
        assert!(flight.in_flight());

        flight.forget();
        assert!(!flight.in_flight());

        let calls2 = calls.clone();
        let second = flight
            .run(move || async move { calls2.fetch_add(1, Ordering::SeqCst) + 100 })
            .await;
        assert_eq!(second, 100);
        assert_eq!(first.await.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
