//! Remote API 客户端抽象
//!
//! 所有后端实现 ChatApi：登录、拉取会话与连接参数、发送消息/注册/输入状态、加入/离开。
//! 失败统一返回携带状态码的 ApiError，由 RetryPolicy 分类。

mod http;
mod mock;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::core::ApiError;
use crate::protocol::{ChatPayload, ConversationEvent};

pub use http::HttpChatApi;
pub use mock::{MockCall, MockChatApi};

/// 登录结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub tracking_id: Option<String>,
}

/// 已有会话（bootstrap 时拉取）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(default)]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_events")]
    pub messages: Vec<ConversationEvent>,
    #[serde(default)]
    pub subscribed: bool,
    #[serde(default)]
    pub registered: bool,
}

impl Default for Conversation {
    fn default() -> Self {
        Self {
            id: String::new(),
            messages: Vec::new(),
            subscribed: true,
            registered: false,
        }
    }
}

/// 推送连接参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub url: String,
    #[serde(default)]
    pub protocol: String,
}

/// 跳过未知类型与结构错误的事件，不让单条坏数据拖垮整个 transcript
fn lenient_events<'de, D>(deserializer: D) -> Result<Vec<ConversationEvent>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|value| match ChatPayload::from_value(value) {
            Ok(Some(ChatPayload::Event(event))) => Some(event),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("Dropping malformed transcript entry: {}", e);
                None
            }
        })
        .collect())
}

/// Remote API 客户端 trait
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// 绑定后端地址与 contact point（initialize 时调用）
    fn set_endpoint(&self, host: &str, contact_point: &str);

    async fn login(&self) -> Result<LoginResponse, ApiError>;

    async fn fetch_conversation(&self) -> Result<Conversation, ApiError>;

    async fn fetch_connection_info(&self) -> Result<ConnectionInfo, ApiError>;

    async fn send_message(&self, payload: Value) -> Result<(), ApiError>;

    async fn send_registration(
        &self,
        fields: &HashMap<String, String>,
        version_id: Option<&str>,
    ) -> Result<(), ApiError>;

    async fn update_typing_indicator(&self, text: &str, typing: bool) -> Result<(), ApiError>;

    async fn join_chat(&self) -> Result<(), ApiError>;

    async fn leave_chat(&self) -> Result<(), ApiError>;

    /// 永久禁用外发调用（burn down 时调用）
    fn disable(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_conversation_skips_bad_entries() {
        let conversation: Conversation = serde_json::from_value(json!({
            "id": "testConvo",
            "subscribed": true,
            "messages": [
                {"type": "Text", "authorType": "Customer", "text": "Marco", "id": "msg1", "timestamp": 1},
                {"type": "Mystery", "id": "x", "timestamp": 2},
                {"type": "End"},
                {"type": "Text", "authorType": "User", "text": "Polo", "id": "msg2", "timestamp": 2},
            ],
        }))
        .unwrap();
        let ids: Vec<_> = conversation.messages.iter().map(|m| m.id()).collect();
        assert_eq!(ids, vec!["msg1", "msg2"]);
        assert!(!conversation.registered);
    }

    #[test]
    fn test_login_response_camel_case() {
        let login: LoginResponse =
            serde_json::from_value(json!({"accessToken": "tok", "trackingId": "trk"})).unwrap();
        assert_eq!(login.access_token.as_deref(), Some("tok"));
        assert_eq!(login.tracking_id.as_deref(), Some("trk"));
    }
}
