//! 后端推送协议：帧、会话事件、排队状态、burn 指令

mod event;
mod frame;

pub use event::{
    AgentTyping, AuthorMetadata, AuthorType, ChatPayload, ConversationEvent, GenericEvent,
    TextMessage,
};
pub use frame::{BurnDirective, FrameType, InboundFrame, InboundMessage, QueueDisposition};
