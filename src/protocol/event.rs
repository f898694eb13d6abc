//! 会话事件（transcript 条目）
//!
//! 以 `type` 字段区分的标签联合。未识别字段保存在 `extra` 中原样透传。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::ChatError;

/// 作者类型；`User` 表示人工坐席，`Customer` 表示访客
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorType {
    Customer,
    User,
    System,
    Bot,
    #[serde(other)]
    Unknown,
}

/// 文本消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMessage {
    pub id: String,
    pub timestamp: i64,
    pub author_type: AuthorType,
    #[serde(default)]
    pub text: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// 除 Text 外的其它已知事件：只关心 id 与时间戳
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericEvent {
    pub id: String,
    pub timestamp: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GenericEvent {
    pub fn new(id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: id.into(),
            timestamp,
            extra: Map::new(),
        }
    }
}

/// transcript 中的一条事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ConversationEvent {
    Text(TextMessage),
    Attachment(GenericEvent),
    RichInteraction(GenericEvent),
    Register(GenericEvent),
    End(GenericEvent),
    Join(GenericEvent),
    Leave(GenericEvent),
    SendTranscript(GenericEvent),
    Spam(GenericEvent),
}

/// 进入 transcript 的事件类型（AgentTyping 不进入）
const TRANSCRIPT_TYPES: &[&str] = &[
    "Text",
    "Attachment",
    "RichInteraction",
    "Register",
    "End",
    "Join",
    "Leave",
    "SendTranscript",
    "Spam",
];

impl ConversationEvent {
    pub fn text(
        id: impl Into<String>,
        timestamp: i64,
        author_type: AuthorType,
        text: impl Into<String>,
    ) -> Self {
        ConversationEvent::Text(TextMessage {
            id: id.into(),
            timestamp,
            author_type,
            text: text.into(),
            extra: Map::new(),
        })
    }

    pub fn end(id: impl Into<String>, timestamp: i64) -> Self {
        ConversationEvent::End(GenericEvent::new(id, timestamp))
    }

    pub fn register(id: impl Into<String>, timestamp: i64) -> Self {
        ConversationEvent::Register(GenericEvent::new(id, timestamp))
    }

    fn generic(&self) -> Option<&GenericEvent> {
        match self {
            ConversationEvent::Text(_) => None,
            ConversationEvent::Attachment(e)
            | ConversationEvent::RichInteraction(e)
            | ConversationEvent::Register(e)
            | ConversationEvent::End(e)
            | ConversationEvent::Join(e)
            | ConversationEvent::Leave(e)
            | ConversationEvent::SendTranscript(e)
            | ConversationEvent::Spam(e) => Some(e),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ConversationEvent::Text(m) => &m.id,
            _ => self.generic().map(|e| e.id.as_str()).unwrap_or_default(),
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            ConversationEvent::Text(m) => m.timestamp,
            _ => self.generic().map(|e| e.timestamp).unwrap_or_default(),
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, ConversationEvent::End(_))
    }

    pub fn is_register(&self) -> bool {
        matches!(self, ConversationEvent::Register(_))
    }

    /// 人工坐席发出的文本消息
    pub fn is_human_authored(&self) -> bool {
        matches!(self, ConversationEvent::Text(m) if m.author_type == AuthorType::User)
    }
}

/// 坐席信息（随 AgentTyping 下发）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_type: Option<AuthorType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_profile_picture: Option<String>,
}

/// 坐席输入状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTyping {
    pub typing: bool,
    #[serde(flatten)]
    pub author: AuthorMetadata,
}

/// ChatMessage 帧的负载
#[derive(Debug, Clone, PartialEq)]
pub enum ChatPayload {
    Event(ConversationEvent),
    AgentTyping(AgentTyping),
}

impl ChatPayload {
    /// 按 `type` 解析；未知类型返回 `Ok(None)`（前向兼容），已知类型但结构错误返回 MalformedFrame
    pub fn from_value(value: Value) -> Result<Option<Self>, ChatError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ChatError::MalformedFrame("chat message without type".to_string()))?
            .to_string();

        if kind == "AgentTyping" {
            return serde_json::from_value(value)
                .map(|t| Some(ChatPayload::AgentTyping(t)))
                .map_err(|e| ChatError::MalformedFrame(format!("AgentTyping: {e}")));
        }

        if !TRANSCRIPT_TYPES.contains(&kind.as_str()) {
            return Ok(None);
        }

        serde_json::from_value(value)
            .map(|e| Some(ChatPayload::Event(e)))
            .map_err(|e| ChatError::MalformedFrame(format!("{kind}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_keeps_unknown_fields() {
        let value = json!({
            "type": "Text",
            "id": "m1",
            "timestamp": 1,
            "authorType": "Agent-ish",
            "text": "hi",
            "authorDisplayName": "Homer",
        });
        let event: ConversationEvent = serde_json::from_value(value).unwrap();
        let ConversationEvent::Text(m) = &event else {
            panic!("expected text");
        };
        assert_eq!(m.author_type, AuthorType::Unknown);
        assert_eq!(m.extra.get("authorDisplayName"), Some(&json!("Homer")));

        let back = serde_json::to_value(&event).unwrap();
        assert_eq!(back["type"], "Text");
        assert_eq!(back["authorDisplayName"], "Homer");
    }

    #[test]
    fn test_payload_agent_typing() {
        let payload = ChatPayload::from_value(json!({
            "type": "AgentTyping",
            "typing": true,
            "authorType": "User",
            "authorDisplayName": "Homer",
            "authorProfilePicture": "testUrl",
        }))
        .unwrap()
        .unwrap();
        let ChatPayload::AgentTyping(t) = payload else {
            panic!("expected typing");
        };
        assert!(t.typing);
        assert_eq!(t.author.author_type, Some(AuthorType::User));
        assert_eq!(t.author.author_display_name.as_deref(), Some("Homer"));
    }

    #[test]
    fn test_payload_unknown_type_is_ignored() {
        let payload = ChatPayload::from_value(json!({"type": "HologramCall", "id": "x"})).unwrap();
        assert!(payload.is_none());
    }

    #[test]
    fn test_payload_known_type_missing_fields_is_malformed() {
        let err = ChatPayload::from_value(json!({"type": "Register"})).unwrap_err();
        assert!(matches!(err, ChatError::MalformedFrame(_)));
        let err = ChatPayload::from_value(json!({"id": "m1"})).unwrap_err();
        assert!(matches!(err, ChatError::MalformedFrame(_)));
    }

    #[test]
    fn test_human_authored() {
        assert!(ConversationEvent::text("1", 1, AuthorType::User, "x").is_human_authored());
        assert!(!ConversationEvent::text("1", 1, AuthorType::Customer, "x").is_human_authored());
        assert!(!ConversationEvent::end("2", 2).is_human_authored());
    }
}
