//! 宿主回调注册表
//!
//! 每个事件一个槽位，后注册的覆盖先注册的。触发时先把回调克隆出锁再调用，
//! 回调内部可以安全地调用 ChatClient 的任何方法或重新注册回调。

use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::ChatError;
use crate::protocol::{AuthorMetadata, ConversationEvent};

pub type TranscriptHandler = Arc<dyn Fn(&[ConversationEvent]) + Send + Sync>;
pub type AgentTypingHandler = Arc<dyn Fn(bool, &AuthorMetadata) + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(&ChatError) + Send + Sync>;
pub type FlagHandler = Arc<dyn Fn(bool) + Send + Sync>;
pub type SignalHandler = Arc<dyn Fn() + Send + Sync>;

#[derive(Default, Clone)]
struct Slots {
    transcript_change: Option<TranscriptHandler>,
    agent_typing: Option<AgentTypingHandler>,
    error: Option<ErrorHandler>,
    error_resolution: Option<SignalHandler>,
    new_session: Option<SignalHandler>,
    connection_status_change: Option<FlagHandler>,
    registration: Option<SignalHandler>,
    burn: Option<SignalHandler>,
    client_inactive_timeout: Option<SignalHandler>,
    reconnect: Option<FlagHandler>,
}

#[derive(Default)]
pub struct CallbackRegistry {
    slots: RwLock<Slots>,
}

macro_rules! signal {
    ($set:ident, $fire:ident, $field:ident) => {
        pub fn $set(&self, handler: SignalHandler) {
            self.slots.write().$field = Some(handler);
        }

        pub fn $fire(&self) {
            let handler = self.slots.read().$field.clone();
            if let Some(handler) = handler {
                handler();
            }
        }
    };
}

macro_rules! flag {
    ($set:ident, $fire:ident, $field:ident) => {
        pub fn $set(&self, handler: FlagHandler) {
            self.slots.write().$field = Some(handler);
        }

        pub fn $fire(&self, value: bool) {
            let handler = self.slots.read().$field.clone();
            if let Some(handler) = handler {
                handler(value);
            }
        }
    };
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_transcript_change(&self, handler: TranscriptHandler) {
        self.slots.write().transcript_change = Some(handler);
    }

    pub fn transcript_change(&self, transcript: &[ConversationEvent]) {
        let handler = self.slots.read().transcript_change.clone();
        if let Some(handler) = handler {
            handler(transcript);
        }
    }

    pub fn set_agent_typing(&self, handler: AgentTypingHandler) {
        self.slots.write().agent_typing = Some(handler);
    }

    pub fn agent_typing(&self, typing: bool, author: &AuthorMetadata) {
        let handler = self.slots.read().agent_typing.clone();
        if let Some(handler) = handler {
            handler(typing, author);
        }
    }

    pub fn set_error(&self, handler: ErrorHandler) {
        self.slots.write().error = Some(handler);
    }

    pub fn error(&self, err: &ChatError) {
        let handler = self.slots.read().error.clone();
        if let Some(handler) = handler {
            handler(err);
        }
    }

    signal!(set_error_resolution, error_resolution, error_resolution);
    signal!(set_new_session, new_session, new_session);
    signal!(set_registration, registration, registration);
    signal!(set_burn, burn, burn);
    signal!(set_client_inactive_timeout, client_inactive_timeout, client_inactive_timeout);

    flag!(set_connection_status_change, connection_status_change, connection_status_change);
    flag!(set_reconnect, reconnect, reconnect);
}
