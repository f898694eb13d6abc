//! 推送传输层
//!
//! Transport 负责建立/断开到推送服务的持久连接，并把连接生命周期与原始文本帧
//! 以 TransportEvent 投递到调用方提供的通道。帧的解析在会话层完成。

mod mock;
#[cfg(feature = "websocket")]
mod websocket;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::TransportError;

pub use mock::MockTransport;
#[cfg(feature = "websocket")]
pub use websocket::WebSocketTransport;

/// 连接生命周期事件与入站帧
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// 连接（或重连）成功
    Established,
    /// 连接断开，传输层将自行重连
    Lost,
    /// 开始一次重连尝试
    Reconnecting,
    /// 原始文本帧
    Message(String),
    /// 传输层放弃，不再重连
    Failure(String),
}

/// 一次 connect 的参数
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectOptions {
    pub url: String,
    pub tracking_id: Option<String>,
    pub access_token: Option<String>,
}

/// 推送传输 trait
#[async_trait]
pub trait Transport: Send + Sync {
    /// 建立连接；此后的事件写入 `events`。再次调用会替换之前的连接
    async fn connect(
        &self,
        options: ConnectOptions,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<(), TransportError>;

    /// 断开当前连接（无连接时为 no-op）
    fn disconnect(&self) -> Result<(), TransportError>;
}

/// 把 `params` 合并进 `url` 的查询串；同名参数被替换，其余保持原顺序
///
/// 没有 scheme 的地址按 `wss://` 处理，http(s) 换成 ws(s)。
pub fn format_query_params(url: &str, params: &[(&str, &str)]) -> Result<String, TransportError> {
    let normalized = if url.starts_with("https://") {
        url.replacen("https://", "wss://", 1)
    } else if url.starts_with("http://") {
        url.replacen("http://", "ws://", 1)
    } else if url.contains("://") {
        url.to_string()
    } else {
        format!("wss://{url}")
    };

    let mut parsed = reqwest::Url::parse(&normalized)
        .map_err(|e| TransportError::Connect(format!("invalid socket url {url}: {e}")))?;

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !params.iter().any(|(name, _)| name == k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    {
        let mut query = parsed.query_pairs_mut();
        query.clear();
        for (k, v) in &kept {
            query.append_pair(k, v);
        }
        for (k, v) in params {
            query.append_pair(k, v);
        }
    }

    Ok(parsed.to_string())
}
