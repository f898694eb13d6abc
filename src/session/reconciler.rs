//! 入站帧与会话状态的归并
//!
//! 纯函数：只修改传入的 SessionState 并返回需要通知宿主的事件，不触碰 IO、计时器或回调。
//! ChatClient 在锁内调用这里，释放锁后再分发 Notification。

use crate::core::{ChatError, SessionState};
use crate::protocol::{
    AuthorMetadata, BurnDirective, ChatPayload, ConversationEvent, InboundFrame, InboundMessage,
    QueueDisposition,
};

/// 归并产生的宿主通知
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// transcript 已变化，携带变化后的完整快照
    TranscriptChanged(Vec<ConversationEvent>),
    AgentTyping(bool, AuthorMetadata),
    /// registered 首次由 false 变为 true
    Registered,
    QueueDisposition(QueueDisposition),
    Burn(BurnDirective),
}

/// 把一帧归并进状态；未知帧或未知事件类型返回空列表
pub fn reconcile(
    state: &mut SessionState,
    frame: InboundFrame,
) -> Result<Vec<Notification>, ChatError> {
    let Some(message) = frame.decode()? else {
        return Ok(Vec::new());
    };

    let notifications = match message {
        InboundMessage::Chat(ChatPayload::Event(event)) => apply_event(state, event),
        InboundMessage::Chat(ChatPayload::AgentTyping(typing)) => {
            vec![Notification::AgentTyping(typing.typing, typing.author)]
        }
        InboundMessage::QueueDisposition(disposition) => {
            state.queue_disposition = Some(disposition);
            vec![Notification::QueueDisposition(disposition)]
        }
        InboundMessage::BurnItDown(directive) => vec![Notification::Burn(directive)],
    };
    Ok(notifications)
}

/// 单个会话事件：插入 transcript；Register 额外置 registered 与有效操作标志
pub fn apply_event(state: &mut SessionState, event: ConversationEvent) -> Vec<Notification> {
    let is_register = event.is_register();
    insert_event(&mut state.transcript, event);

    let mut out = vec![Notification::TranscriptChanged(state.transcript.clone())];
    if is_register {
        state.has_taken_meaningful_action = true;
        if mark_registered(state) {
            out.push(Notification::Registered);
        }
    }
    out
}

/// bootstrap / 重连后加载整段 transcript，按 id 与本地合并
pub fn load_transcript(
    state: &mut SessionState,
    events: Vec<ConversationEvent>,
    registered: bool,
) -> Vec<Notification> {
    let saw_register = events.iter().any(ConversationEvent::is_register);
    for event in events {
        insert_event(&mut state.transcript, event);
    }

    let mut out = vec![Notification::TranscriptChanged(state.transcript.clone())];
    if saw_register {
        state.has_taken_meaningful_action = true;
    }
    if (registered || saw_register) && mark_registered(state) {
        out.push(Notification::Registered);
    }
    out
}

/// 按 timestamp 升序插入；相同 timestamp 排在已有事件之后；已存在的 id 被替换
pub fn insert_event(transcript: &mut Vec<ConversationEvent>, event: ConversationEvent) {
    if let Some(pos) = transcript.iter().position(|e| e.id() == event.id()) {
        if transcript[pos].timestamp() == event.timestamp() {
            transcript[pos] = event;
            return;
        }
        transcript.remove(pos);
    }
    let at = transcript.partition_point(|e| e.timestamp() <= event.timestamp());
    transcript.insert(at, event);
}

/// 是否已分配坐席
///
/// 明确的 assigned 为真；没有排队状态或 waiting 时看最近的事件：
/// 先遇到 End 为假，先遇到坐席发出的文本为真。其它终止态为假。
pub fn is_agent_assigned(state: &SessionState) -> bool {
    match state.queue_disposition {
        Some(QueueDisposition::Assigned) => true,
        None | Some(QueueDisposition::Waiting) => state
            .transcript
            .iter()
            .rev()
            .find(|e| e.is_end() || e.is_human_authored())
            .map(|e| e.is_human_authored())
            .unwrap_or(false),
        Some(_) => false,
    }
}

/// 只有从一个已知 tracking id 变为另一个时才算新会话
pub fn is_new_session(previous: Option<&str>, incoming: &str) -> bool {
    matches!(previous, Some(prev) if prev != incoming)
}

fn mark_registered(state: &mut SessionState) -> bool {
    let transitioned = !state.registered;
    state.registered = true;
    transitioned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{AuthorType, FrameType};
    use serde_json::json;

    fn running_state() -> SessionState {
        let mut state = SessionState::default();
        state.reset("https://t.example".into(), "default".into());
        state
    }

    fn chat_frame(data: serde_json::Value) -> InboundFrame {
        InboundFrame::new(FrameType::ChatMessage, data)
    }

    fn ids(state: &SessionState) -> Vec<&str> {
        state.transcript.iter().map(|e| e.id()).collect()
    }

    #[test]
    fn test_events_kept_sorted_and_ties_stable() {
        let mut state = running_state();
        for (id, ts) in [("c", 3), ("a", 1), ("b1", 2), ("b2", 2), ("d", 0)] {
            apply_event(&mut state, ConversationEvent::text(id, ts, AuthorType::Customer, "x"));
        }
        assert_eq!(ids(&state), vec!["d", "a", "b1", "b2", "c"]);
    }

    #[test]
    fn test_duplicate_id_not_repeated() {
        let mut state = running_state();
        apply_event(&mut state, ConversationEvent::text("m1", 1, AuthorType::Customer, "old"));
        apply_event(&mut state, ConversationEvent::text("m1", 1, AuthorType::Customer, "new"));
        assert_eq!(state.transcript.len(), 1);
        let ConversationEvent::Text(msg) = &state.transcript[0] else {
            panic!("expected text");
        };
        assert_eq!(msg.text, "new");
    }

    #[test]
    fn test_chat_frame_appends_and_snapshots() {
        let mut state = running_state();
        load_transcript(
            &mut state,
            vec![
                ConversationEvent::text("msg1", 1, AuthorType::Customer, "Marco"),
                ConversationEvent::text("msg2", 2, AuthorType::User, "Polo"),
            ],
            false,
        );

        let out = reconcile(
            &mut state,
            chat_frame(json!({"type": "Text", "authorType": "Customer", "id": "m3", "timestamp": 3, "text": "hi"})),
        )
        .unwrap();

        assert_eq!(ids(&state), vec!["msg1", "msg2", "m3"]);
        let [Notification::TranscriptChanged(snapshot)] = out.as_slice() else {
            panic!("unexpected notifications: {out:?}");
        };
        assert_eq!(snapshot.len(), 3);
    }

    #[test]
    fn test_register_notifies_once() {
        let mut state = running_state();
        let first = reconcile(&mut state, chat_frame(json!({"type": "Register", "id": "r1", "timestamp": 5})))
            .unwrap();
        let second = reconcile(&mut state, chat_frame(json!({"type": "Register", "id": "r2", "timestamp": 6})))
            .unwrap();

        assert!(first.contains(&Notification::Registered));
        assert!(!second.contains(&Notification::Registered));
        assert!(state.registered);
        assert!(state.has_taken_meaningful_action);
        assert_eq!(state.transcript.len(), 2);
    }

    #[test]
    fn test_agent_typing_does_not_touch_transcript() {
        let mut state = running_state();
        let out = reconcile(
            &mut state,
            chat_frame(json!({"type": "AgentTyping", "typing": true, "authorDisplayName": "Homer"})),
        )
        .unwrap();
        assert!(state.transcript.is_empty());
        let [Notification::AgentTyping(true, author)] = out.as_slice() else {
            panic!("unexpected notifications: {out:?}");
        };
        assert_eq!(author.author_display_name.as_deref(), Some("Homer"));
    }

    #[test]
    fn test_unknown_types_are_ignored() {
        let mut state = running_state();
        let unknown_event = reconcile(&mut state, chat_frame(json!({"type": "Hologram", "id": "h", "timestamp": 1})))
            .unwrap();
        let unknown_frame = reconcile(
            &mut state,
            InboundFrame::new(FrameType::Unknown, json!({"anything": true})),
        )
        .unwrap();
        assert!(unknown_event.is_empty());
        assert!(unknown_frame.is_empty());
        assert!(state.transcript.is_empty());
    }

    #[test]
    fn test_malformed_known_type_is_error() {
        let mut state = running_state();
        let err = reconcile(&mut state, chat_frame(json!({"type": "Text", "id": 7}))).unwrap_err();
        assert!(matches!(err, ChatError::MalformedFrame(_)));
    }

    #[test]
    fn test_queue_disposition_latest_wins() {
        let mut state = running_state();
        for value in ["waiting", "assigned"] {
            reconcile(
                &mut state,
                InboundFrame::new(FrameType::QueueDisposition, json!(value)),
            )
            .unwrap();
        }
        assert_eq!(state.queue_disposition, Some(QueueDisposition::Assigned));
        assert!(is_agent_assigned(&state));
    }

    #[test]
    fn test_burn_frame_yields_directive() {
        let mut state = running_state();
        let out = reconcile(
            &mut state,
            InboundFrame::new(FrameType::BurnItDown, json!({"before": 10, "code": 466, "force": true})),
        )
        .unwrap();
        assert_eq!(
            out,
            vec![Notification::Burn(BurnDirective {
                before: Some(10),
                code: Some(466),
                force: true
            })]
        );
    }

    #[test]
    fn test_agent_assigned_from_transcript() {
        let mut state = running_state();
        assert!(!is_agent_assigned(&state));

        apply_event(&mut state, ConversationEvent::text("a", 1, AuthorType::Customer, "hi"));
        assert!(!is_agent_assigned(&state));

        apply_event(&mut state, ConversationEvent::text("b", 2, AuthorType::User, "hello"));
        assert!(is_agent_assigned(&state));

        apply_event(&mut state, ConversationEvent::end("c", 3));
        assert!(!is_agent_assigned(&state));

        state.queue_disposition = Some(QueueDisposition::Waiting);
        apply_event(&mut state, ConversationEvent::text("d", 4, AuthorType::User, "back"));
        assert!(is_agent_assigned(&state));

        state.queue_disposition = Some(QueueDisposition::Unassigned);
        assert!(!is_agent_assigned(&state));
    }

    #[test]
    fn test_load_transcript_merges_by_id() {
        let mut state = running_state();
        apply_event(&mut state, ConversationEvent::text("m1", 1, AuthorType::Customer, "a"));
        apply_event(&mut state, ConversationEvent::text("m3", 3, AuthorType::Customer, "c"));
        load_transcript(
            &mut state,
            vec![
                ConversationEvent::text("m1", 1, AuthorType::Customer, "a"),
                ConversationEvent::text("m2", 2, AuthorType::User, "b"),
            ],
            false,
        );
        assert_eq!(ids(&state), vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn test_load_transcript_registered_flag() {
        let mut state = running_state();
        let out = load_transcript(&mut state, Vec::new(), true);
        assert!(state.registered);
        assert!(out.contains(&Notification::Registered));

        let again = load_transcript(&mut state, vec![ConversationEvent::register("r", 1)], true);
        assert!(!again.contains(&Notification::Registered));
    }

    #[test]
    fn test_new_session_detection() {
        assert!(!is_new_session(None, "abc"));
        assert!(!is_new_session(Some("abc"), "abc"));
        assert!(is_new_session(Some("abc"), "def"));
    }
}
