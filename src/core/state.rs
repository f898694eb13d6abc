//! 会话状态：由 ChatClient 独占持有，宿主只通过访问器读取
//!
//! 每个 ChatClient 拥有自己的 SessionState（非进程级单例），测试可构造隔离实例。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::{ConversationEvent, QueueDisposition};

/// 客户端生命周期：UNINITIALIZED → INITIALIZED → RUNNING
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ClientStatus {
    Uninitialized,
    Initialized,
    Running,
}

/// 附加到外发消息上的会话上下文
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ChatContext {
    /// 浅合并：只覆盖传入中已设置的字段
    pub fn merge(&mut self, other: ChatContext) {
        if other.intent.is_some() {
            self.intent = other.intent;
        }
        if other.data.is_some() {
            self.data = other.data;
        }
    }
}

/// 单个客户端实例的完整会话状态
#[derive(Debug, Clone)]
pub struct SessionState {
    pub status: ClientStatus,
    pub host: Option<String>,
    pub contact_point: Option<String>,
    pub tracking_id: Option<String>,
    pub access_token: Option<String>,
    /// 始终按 timestamp 升序（相同时间戳保持到达顺序）
    pub transcript: Vec<ConversationEvent>,
    /// 是否观察到过 Register 事件
    pub registered: bool,
    pub subscribed: bool,
    pub connected: bool,
    pub chat_is_visible: bool,
    pub has_taken_meaningful_action: bool,
    pub context: ChatContext,
    pub queue_disposition: Option<QueueDisposition>,
    /// 单调：false → true，永不回退
    pub burned: bool,
    /// burn 日志只记一次
    pub burn_logged: bool,
    /// 连接丢失后置位，重连成功时触发 on_error_resolution
    pub connection_errored: bool,
    /// 每次 stop() 递增；在途的 bootstrap 据此丢弃过期响应
    pub epoch: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            status: ClientStatus::Uninitialized,
            host: None,
            contact_point: None,
            tracking_id: None,
            access_token: None,
            transcript: Vec::new(),
            registered: false,
            subscribed: false,
            connected: false,
            chat_is_visible: false,
            has_taken_meaningful_action: false,
            context: ChatContext::default(),
            queue_disposition: None,
            burned: false,
            burn_logged: false,
            connection_errored: false,
            epoch: 0,
        }
    }
}

impl SessionState {
    /// 重置为初始化后的状态；burned 与 epoch 跨 reset 保留
    pub fn reset(&mut self, host: String, contact_point: String) {
        let burned = self.burned;
        let burn_logged = self.burn_logged;
        let epoch = self.epoch;
        *self = Self {
            status: ClientStatus::Initialized,
            host: Some(host),
            contact_point: Some(contact_point),
            burned,
            burn_logged,
            epoch: epoch + 1,
            ..Self::default()
        };
    }

    pub fn mark_burned(&mut self) {
        self.burned = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reset_keeps_burned() {
        let mut state = SessionState::default();
        state.mark_burned();
        state.registered = true;
        state.reset("https://t.example".into(), "default".into());
        assert!(state.burned);
        assert!(!state.registered);
        assert_eq!(state.status, ClientStatus::Initialized);
        assert_eq!(state.contact_point.as_deref(), Some("default"));
    }

    #[test]
    fn test_context_merge_is_shallow() {
        let mut ctx = ChatContext {
            intent: Some("oldVal".into()),
            data: Some(json!({"test": "val"})),
        };
        ctx.merge(ChatContext {
            intent: Some("newVal".into()),
            data: None,
        });
        assert_eq!(ctx.intent.as_deref(), Some("newVal"));
        assert_eq!(ctx.data, Some(json!({"test": "val"})));
    }

    #[test]
    fn test_status_ordering() {
        assert!(ClientStatus::Uninitialized < ClientStatus::Initialized);
        assert!(ClientStatus::Initialized < ClientStatus::Running);
    }
}
