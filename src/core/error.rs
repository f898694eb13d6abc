//! 客户端错误类型
//!
//! 与 RetryPolicy 配合：ApiError 只携带状态码与描述，由重试策略决定 Retryable / Fatal。

use thiserror::Error;

/// Remote API 调用失败；`status == None` 表示网络层失败（未拿到 HTTP 响应）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("API error (status {status:?}): {message}")]
pub struct ApiError {
    pub status: Option<u16>,
    pub message: String,
}

impl ApiError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        Self {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

/// 传输层错误（连接、断开、重连次数耗尽）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Disconnect failed: {0}")]
    Disconnect(String),

    /// 传输层放弃（如重连次数耗尽），会话需重新 start()
    #[error("Transport failure: {0}")]
    Fatal(String),

    #[error("Maximum socket connection attempts exceeded ({0})")]
    MaxAttemptsExceeded(u32),
}

/// 对宿主暴露的统一错误（经 on_error 回调与 Result 返回）
///
/// 需要 Clone：并发的 start() 共享同一次 bootstrap 结果。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Client not initialized")]
    NotInitialized,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Connection lost")]
    ConnectionLost,

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// 在途操作被 stop() 作废，结果已丢弃
    #[error("Operation superseded by stop()")]
    Cancelled,

    /// 已被远程 burn down，客户端永久不可用
    #[error("Client has been burned down")]
    Burned,
}

impl ChatError {
    /// 重试策略只关心状态码
    pub fn status(&self) -> Option<u16> {
        match self {
            ChatError::Api(e) => e.status,
            _ => None,
        }
    }
}
