//! 推送帧协议
//!
//! 传输层投递的原始帧：`{messageType, tenantId, data}`，`data` 的结构取决于 `messageType`。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::event::ChatPayload;
use crate::core::ChatError;

/// 帧类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameType {
    ChatMessage,
    QueueDisposition,
    BurnItDown,
    #[serde(other)]
    Unknown,
}

/// 排队状态：最新值覆盖旧值，不跨会话持久化
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueDisposition {
    Waiting,
    Assigned,
    Unassigned,
    /// 其它终止态
    #[serde(other)]
    Closed,
}

/// 远程 kill switch 指令
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurnDirective {
    /// 截止时间（epoch 毫秒）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<i64>,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub force: bool,
}

/// 原始推送帧
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundFrame {
    pub message_type: FrameType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub data: Value,
}

/// 解码后的帧
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Chat(ChatPayload),
    QueueDisposition(QueueDisposition),
    BurnItDown(BurnDirective),
}

impl InboundFrame {
    pub fn new(message_type: FrameType, data: Value) -> Self {
        Self {
            message_type,
            tenant_id: None,
            data,
        }
    }

    /// 从传输层的原始文本解析；失败返回 MalformedFrame
    pub fn parse(raw: &str) -> Result<Self, ChatError> {
        serde_json::from_str(raw).map_err(|e| ChatError::MalformedFrame(e.to_string()))
    }

    /// 按 messageType 解码 data；未知帧类型或未知事件类型返回 `Ok(None)`
    pub fn decode(self) -> Result<Option<InboundMessage>, ChatError> {
        match self.message_type {
            FrameType::ChatMessage => {
                Ok(ChatPayload::from_value(self.data)?.map(InboundMessage::Chat))
            }
            FrameType::QueueDisposition => serde_json::from_value(self.data)
                .map(|d| Some(InboundMessage::QueueDisposition(d)))
                .map_err(|e| ChatError::MalformedFrame(format!("QueueDisposition: {e}"))),
            FrameType::BurnItDown => serde_json::from_value(self.data)
                .map(|d| Some(InboundMessage::BurnItDown(d)))
                .map_err(|e| ChatError::MalformedFrame(format!("BurnItDown: {e}"))),
            FrameType::Unknown => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ConversationEvent;

    #[test]
    fn test_parse_chat_message_frame() {
        let raw = r#"{"messageType":"ChatMessage","tenantId":"test",
            "data":{"type":"Text","authorType":"Customer","id":"m3","timestamp":3,"text":"hi"}}"#;
        let frame = InboundFrame::parse(raw).unwrap();
        assert_eq!(frame.message_type, FrameType::ChatMessage);
        assert_eq!(frame.tenant_id.as_deref(), Some("test"));

        let Some(InboundMessage::Chat(ChatPayload::Event(event))) = frame.decode().unwrap() else {
            panic!("expected chat event");
        };
        assert!(matches!(event, ConversationEvent::Text(_)));
        assert_eq!(event.id(), "m3");
    }

    #[test]
    fn test_queue_disposition_values() {
        let frame = InboundFrame::parse(r#"{"messageType":"QueueDisposition","data":"assigned"}"#)
            .unwrap();
        assert_eq!(
            frame.decode().unwrap(),
            Some(InboundMessage::QueueDisposition(QueueDisposition::Assigned))
        );
        let frame = InboundFrame::parse(r#"{"messageType":"QueueDisposition","data":"timedOut"}"#)
            .unwrap();
        assert_eq!(
            frame.decode().unwrap(),
            Some(InboundMessage::QueueDisposition(QueueDisposition::Closed))
        );
    }

    #[test]
    fn test_burn_directive_defaults() {
        let frame =
            InboundFrame::parse(r#"{"messageType":"BurnItDown","data":{"code":466}}"#).unwrap();
        let Some(InboundMessage::BurnItDown(d)) = frame.decode().unwrap() else {
            panic!("expected burn directive");
        };
        assert_eq!(d.before, None);
        assert_eq!(d.code, Some(466));
        assert!(!d.force);
    }

    #[test]
    fn test_unknown_frame_type_is_ignored() {
        let frame = InboundFrame::parse(r#"{"messageType":"Heartbeat","data":{}}"#).unwrap();
        assert_eq!(frame.message_type, FrameType::Unknown);
        assert_eq!(frame.decode().unwrap(), None);
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            InboundFrame::parse("not json"),
            Err(ChatError::MalformedFrame(_))
        ));
    }
}
