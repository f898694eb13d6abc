//! Mock 传输（用于测试）
//!
//! 记录 connect/disconnect，保留最近一次 connect 的事件通道，测试通过 emit() 模拟推送。

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{ConnectOptions, Transport, TransportEvent};
use crate::core::TransportError;

#[derive(Default)]
pub struct MockTransport {
    connects: Mutex<Vec<ConnectOptions>>,
    disconnects: AtomicUsize,
    sender: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
    fail_disconnect: AtomicBool,
    fail_connect: Mutex<Option<TransportError>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 之后的 disconnect() 都返回错误（仍会丢弃通道）
    pub fn set_fail_disconnect(&self, fail: bool) {
        self.fail_disconnect.store(fail, Ordering::SeqCst);
    }

    /// 下一次 connect() 返回 `err`
    pub fn fail_next_connect(&self, err: TransportError) {
        *self.fail_connect.lock() = Some(err);
    }

    pub fn connects(&self) -> Vec<ConnectOptions> {
        self.connects.lock().clone()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.lock().len()
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// 向当前连接投递事件；没有连接时返回 false
    pub fn emit(&self, event: TransportEvent) -> bool {
        match self.sender.lock().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub fn emit_frame(&self, raw: impl Into<String>) -> bool {
        self.emit(TransportEvent::Message(raw.into()))
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(
        &self,
        options: ConnectOptions,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<(), TransportError> {
        self.connects.lock().push(options);
        if let Some(err) = self.fail_connect.lock().take() {
            return Err(err);
        }
        *self.sender.lock() = Some(events);
        Ok(())
    }

    fn disconnect(&self) -> Result<(), TransportError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.sender.lock().take();
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnect("mock disconnect failure".to_string()));
        }
        Ok(())
    }
}
