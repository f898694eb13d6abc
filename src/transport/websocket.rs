//! WebSocket 传输（tokio-tungstenite）
//!
//! 每次 connect 启动一个后台任务：建立连接、转发文本帧、断线后按固定间隔重连。
//! 连续失败的连接尝试超过上限时投递 Failure 并退出；连接成功会清零计数。

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::{format_query_params, ConnectOptions, Transport, TransportEvent};
use crate::config::TransportSection;
use crate::core::TransportError;

const ACCESS_TOKEN_HEADER: &str = "x-webchat-access-token";
const CLIENT_VERSION_HEADER: &str = "x-webchat-client-version";
const NO_TRACKING_ID: &str = "noAssociatedTrackingId";

pub struct WebSocketTransport {
    max_attempts: u32,
    reconnect_interval: Duration,
    attempts: Arc<AtomicU32>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl WebSocketTransport {
    pub fn new(section: &TransportSection) -> Self {
        Self {
            max_attempts: section.max_connection_attempts,
            reconnect_interval: Duration::from_millis(section.reconnect_interval_ms),
            attempts: Arc::new(AtomicU32::new(0)),
            cancel: Mutex::new(None),
        }
    }

    fn build_request(url: &str, access_token: Option<&str>) -> Result<Request, TransportError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let headers = request.headers_mut();
        headers.insert(
            CLIENT_VERSION_HEADER,
            HeaderValue::from_static(env!("CARGO_PKG_VERSION")),
        );
        if let Some(token) = access_token {
            let value =
                HeaderValue::from_str(token).map_err(|e| TransportError::Connect(e.to_string()))?;
            headers.insert(ACCESS_TOKEN_HEADER, value);
        }
        Ok(request)
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(
        &self,
        options: ConnectOptions,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<(), TransportError> {
        if self.attempts.load(Ordering::SeqCst) >= self.max_attempts {
            let _ = events.send(TransportEvent::Failure(format!(
                "exceeded {} connection attempts",
                self.max_attempts
            )));
            return Err(TransportError::MaxAttemptsExceeded(self.max_attempts));
        }

        let tracking_id = options.tracking_id.as_deref().unwrap_or(NO_TRACKING_ID);
        let url = format_query_params(
            &options.url,
            &[
                ("trackingId", tracking_id),
                ("clientVersion", env!("CARGO_PKG_VERSION")),
            ],
        )?;
        // 先校验一次，头部非法时同步报错
        Self::build_request(&url, options.access_token.as_deref())?;

        let token = CancellationToken::new();
        if let Some(prev) = self.cancel.lock().replace(token.clone()) {
            prev.cancel();
        }

        let worker = SocketWorker {
            url,
            access_token: options.access_token,
            max_attempts: self.max_attempts,
            reconnect_interval: self.reconnect_interval,
            attempts: Arc::clone(&self.attempts),
            events,
            token,
        };
        tokio::spawn(worker.run());
        Ok(())
    }

    fn disconnect(&self) -> Result<(), TransportError> {
        if let Some(token) = self.cancel.lock().take() {
            tracing::debug!("Closing push socket");
            token.cancel();
        }
        Ok(())
    }
}

struct SocketWorker {
    url: String,
    access_token: Option<String>,
    max_attempts: u32,
    reconnect_interval: Duration,
    attempts: Arc<AtomicU32>,
    events: mpsc::UnboundedSender<TransportEvent>,
    token: CancellationToken,
}

impl SocketWorker {
    async fn run(self) {
        loop {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt > self.max_attempts {
                tracing::error!(attempts = attempt - 1, "Giving up on push socket");
                let _ = self.events.send(TransportEvent::Failure(format!(
                    "exceeded {} connection attempts",
                    self.max_attempts
                )));
                return;
            }

            let request =
                match WebSocketTransport::build_request(&self.url, self.access_token.as_deref()) {
                    Ok(r) => r,
                    Err(e) => {
                        let _ = self.events.send(TransportEvent::Failure(e.to_string()));
                        return;
                    }
                };

            let connected = tokio::select! {
                _ = self.token.cancelled() => return,
                r = tokio_tungstenite::connect_async(request) => r,
            };

            match connected {
                Ok((mut stream, _)) => {
                    tracing::info!(attempt, "Push socket established");
                    self.attempts.store(0, Ordering::SeqCst);
                    let _ = self.events.send(TransportEvent::Established);

                    loop {
                        tokio::select! {
                            _ = self.token.cancelled() => return,
                            msg = stream.next() => match msg {
                                Some(Ok(Message::Text(text))) => {
                                    let _ = self.events.send(TransportEvent::Message(text));
                                }
                                Some(Ok(Message::Close(_))) | None => {
                                    tracing::warn!("Push socket closed by server");
                                    break;
                                }
                                Some(Ok(_)) => {}
                                Some(Err(e)) => {
                                    tracing::warn!("Push socket error: {}", e);
                                    break;
                                }
                            }
                        }
                    }
                    let _ = self.events.send(TransportEvent::Lost);
                }
                Err(e) => {
                    tracing::warn!(attempt, "Push socket connect failed: {}", e);
                }
            }

            let _ = self.events.send(TransportEvent::Reconnecting);
            tokio::select! {
                _ = self.token.cancelled() => return,
                _ = tokio::time::sleep(self.reconnect_interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_attempt_cap_reports_failure() {
        let transport = WebSocketTransport::new(&TransportSection {
            max_connection_attempts: 0,
            reconnect_interval_ms: 10,
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let err = transport
            .connect(
                ConnectOptions {
                    url: "wss://push.example.com/socket".to_string(),
                    ..Default::default()
                },
                tx,
            )
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::MaxAttemptsExceeded(0));
        assert!(matches!(rx.recv().await, Some(TransportEvent::Failure(_))));
    }

    #[test]
    fn test_request_carries_headers() {
        let request =
            WebSocketTransport::build_request("wss://push.example.com/socket", Some("tok")).unwrap();
        assert_eq!(request.headers().get(ACCESS_TOKEN_HEADER).unwrap(), "tok");
        assert!(request.headers().contains_key(CLIENT_VERSION_HEADER));
    }
}
