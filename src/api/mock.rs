//! Mock API 客户端（用于测试，无需后端）
//!
//! 返回预置的会话与连接参数，记录每次调用；可注入下一次调用的失败，或给 login 与 bootstrap 调用加延迟。

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::{ChatApi, ConnectionInfo, Conversation, LoginResponse};
use crate::core::ApiError;

/// 记录下来的调用
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    SetEndpoint(String, String),
    Login,
    FetchConversation,
    FetchConnectionInfo,
    SendMessage(Value),
    SendRegistration(HashMap<String, String>, Option<String>),
    UpdateTypingIndicator(String, bool),
    JoinChat,
    LeaveChat,
    Disable,
}

impl MockCall {
    pub fn name(&self) -> &'static str {
        match self {
            MockCall::SetEndpoint(..) => "set_endpoint",
            MockCall::Login => "login",
            MockCall::FetchConversation => "fetch_conversation",
            MockCall::FetchConnectionInfo => "fetch_connection_info",
            MockCall::SendMessage(_) => "send_message",
            MockCall::SendRegistration(..) => "send_registration",
            MockCall::UpdateTypingIndicator(..) => "update_typing_indicator",
            MockCall::JoinChat => "join_chat",
            MockCall::LeaveChat => "leave_chat",
            MockCall::Disable => "disable",
        }
    }
}

pub struct MockChatApi {
    conversation: Mutex<Conversation>,
    connection_info: Mutex<ConnectionInfo>,
    login: Mutex<LoginResponse>,
    failures: Mutex<HashMap<&'static str, ApiError>>,
    bootstrap_delay: Mutex<Duration>,
    login_delay: Mutex<Duration>,
    calls: Mutex<Vec<MockCall>>,
}

impl Default for MockChatApi {
    fn default() -> Self {
        Self {
            conversation: Mutex::new(Conversation::default()),
            connection_info: Mutex::new(ConnectionInfo {
                url: "wss://mock.test/socket".to_string(),
                protocol: "websocket".to_string(),
            }),
            login: Mutex::new(LoginResponse::default()),
            failures: Mutex::new(HashMap::new()),
            bootstrap_delay: Mutex::new(Duration::ZERO),
            login_delay: Mutex::new(Duration::ZERO),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl MockChatApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_conversation(self, conversation: Conversation) -> Self {
        *self.conversation.lock() = conversation;
        self
    }

    pub fn set_conversation(&self, conversation: Conversation) {
        *self.conversation.lock() = conversation;
    }

    pub fn set_login(&self, login: LoginResponse) {
        *self.login.lock() = login;
    }

    /// fetch_conversation / fetch_connection_info 前等待的时长
    pub fn set_bootstrap_delay(&self, delay: Duration) {
        *self.bootstrap_delay.lock() = delay;
    }

    pub fn set_login_delay(&self, delay: Duration) {
        *self.login_delay.lock() = delay;
    }

    /// 让名为 `call` 的下一次调用返回 `err`（名称见 MockCall::name）
    pub fn fail_next(&self, call: &'static str, err: ApiError) {
        self.failures.lock().insert(call, err);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.name() == call).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, call: MockCall) -> Result<(), ApiError> {
        let name = call.name();
        self.calls.lock().push(call);
        match self.failures.lock().remove(name) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn bootstrap_pause(&self) {
        let delay = *self.bootstrap_delay.lock();
        Self::pause(delay).await;
    }

    async fn pause(delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ChatApi for MockChatApi {
    fn set_endpoint(&self, host: &str, contact_point: &str) {
        let _ = self.record(MockCall::SetEndpoint(host.to_string(), contact_point.to_string()));
    }

    async fn login(&self) -> Result<LoginResponse, ApiError> {
        let delay = *self.login_delay.lock();
        Self::pause(delay).await;
        self.record(MockCall::Login)?;
        Ok(self.login.lock().clone())
    }

    async fn fetch_conversation(&self) -> Result<Conversation, ApiError> {
        self.bootstrap_pause().await;
        self.record(MockCall::FetchConversation)?;
        Ok(self.conversation.lock().clone())
    }

    async fn fetch_connection_info(&self) -> Result<ConnectionInfo, ApiError> {
        self.bootstrap_pause().await;
        self.record(MockCall::FetchConnectionInfo)?;
        Ok(self.connection_info.lock().clone())
    }

    async fn send_message(&self, payload: Value) -> Result<(), ApiError> {
        self.record(MockCall::SendMessage(payload))
    }

    async fn send_registration(
        &self,
        fields: &HashMap<String, String>,
        version_id: Option<&str>,
    ) -> Result<(), ApiError> {
        self.record(MockCall::SendRegistration(
            fields.clone(),
            version_id.map(str::to_string),
        ))
    }

    async fn update_typing_indicator(&self, text: &str, typing: bool) -> Result<(), ApiError> {
        self.record(MockCall::UpdateTypingIndicator(text.to_string(), typing))
    }

    async fn join_chat(&self) -> Result<(), ApiError> {
        self.record(MockCall::JoinChat)
    }

    async fn leave_chat(&self) -> Result<(), ApiError> {
        self.record(MockCall::LeaveChat)
    }

    fn disable(&self) {
        let _ = self.record(MockCall::Disable);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fail_next_only_once() {
        let api = MockChatApi::new();
        api.fail_next("join_chat", ApiError::new(500, "boom"));
        assert_eq!(api.join_chat().await.unwrap_err().status, Some(500));
        assert!(api.join_chat().await.is_ok());
        assert_eq!(api.count("join_chat"), 2);
    }
}
