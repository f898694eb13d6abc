//! webchat-session - 网页聊天会话客户端
//!
//! 模块划分：
//! - **api**: Remote API 客户端抽象与实现（HTTP / Mock）
//! - **config**: 客户端配置加载（TOML + 环境变量）
//! - **core**: 错误、重试策略、会话状态、单飞、计时器、burn-down
//! - **observability**: tracing 初始化
//! - **protocol**: 推送帧与会话事件
//! - **session**: 会话控制器、入站帧归并、宿主回调
//! - **storage**: 持久化键值存储（按 contact point 命名空间）
//! - **transport**: 推送传输（WebSocket / Mock）

pub mod api;
pub mod config;
pub mod core;
pub mod observability;
pub mod protocol;
pub mod session;
pub mod storage;
pub mod transport;

pub use crate::core::{ChatError, ClientStatus};
pub use session::{ChatClient, ChatClientBuilder};
