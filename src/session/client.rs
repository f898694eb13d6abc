//! 会话控制器
//!
//! ChatClient 独占 SessionState，串联 API、传输、存储与计时器：
//! - initialize / start / stop 生命周期（start 单飞，重复调用合并）
//! - 入站帧经 reconciler 归并，释放锁后分发回调
//! - 外发操作更新可见性/有效操作标志并重置不活跃计时器
//! - burn-down 指令与不活跃超时

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::api::{ChatApi, ConnectionInfo, Conversation};
use crate::config::ClientConfig;
use crate::core::{
    burn_delay, BurnGuard, ChatContext, ChatError, ClientStatus, RetryPolicy, Retryability,
    SessionState, SingleFlight, TimerSlot, TransportError,
};
use crate::protocol::{AuthorMetadata, BurnDirective, ConversationEvent, InboundFrame};
use crate::storage::{PersistedSession, SessionStorage};
use crate::transport::{ConnectOptions, Transport, TransportEvent};

use super::callbacks::CallbackRegistry;
use super::reconciler::{self, Notification};
use super::ChatClientBuilder;

struct Inner {
    config: ClientConfig,
    api: Arc<dyn ChatApi>,
    transport: Arc<dyn Transport>,
    storage: PersistedSession,
    retry_policy: RetryPolicy,
    state: Arc<Mutex<SessionState>>,
    callbacks: CallbackRegistry,
    bootstrap: SingleFlight<Result<(), ChatError>>,
    inactivity_timer: TimerSlot,
    burn_timer: TimerSlot,
}

/// 单个聊天会话的控制器；克隆共享同一会话
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<Inner>,
}

impl ChatClient {
    pub fn builder(api: Arc<dyn ChatApi>, transport: Arc<dyn Transport>) -> ChatClientBuilder {
        ChatClientBuilder::new(api, transport)
    }

    pub(crate) fn from_parts(
        config: ClientConfig,
        api: Arc<dyn ChatApi>,
        transport: Arc<dyn Transport>,
        storage: Arc<dyn SessionStorage>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                api,
                transport,
                storage: PersistedSession::new(storage),
                retry_policy,
                state: Arc::new(Mutex::new(SessionState::default())),
                callbacks: CallbackRegistry::new(),
                bootstrap: SingleFlight::new(),
                inactivity_timer: TimerSlot::new("inactivity"),
                burn_timer: TimerSlot::new("burn"),
            }),
        }
    }

    fn downgrade(&self) -> Weak<Inner> {
        Arc::downgrade(&self.inner)
    }

    fn upgrade(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    // ========================================================================
    // 生命周期
    // ========================================================================

    /// 绑定后端与 contact point，并从存储恢复持久化的标志
    ///
    /// 正在运行的会话会先被 stop()。
    pub fn initialize(&self, host: &str, contact_point: &str) -> Result<(), ChatError> {
        let parsed = reqwest::Url::parse(host)
            .map_err(|e| ChatError::InvalidArgument(format!("host {host:?}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ChatError::InvalidArgument(format!(
                "host {host:?} must be http(s)"
            )));
        }
        if contact_point.trim().is_empty() || contact_point.contains(char::is_whitespace) {
            return Err(ChatError::InvalidArgument(format!(
                "contact point {contact_point:?}"
            )));
        }

        if self.status() == ClientStatus::Running {
            self.stop();
        }

        let storage = &self.inner.storage;
        storage.scope(contact_point);
        self.inner.api.set_endpoint(host, contact_point);

        {
            let mut state = self.inner.state.lock();
            state.reset(host.to_string(), contact_point.to_string());
            state.tracking_id = storage.tracking_id();
            state.access_token = storage.access_token();
            state.chat_is_visible = storage.chat_visible();
            state.has_taken_meaningful_action = storage.meaningful_action();
        }

        tracing::info!(host, contact_point, "Webchat client initialized");
        Ok(())
    }

    /// 登录、拉取会话与连接参数、建立推送连接，然后进入 RUNNING
    ///
    /// 已在运行时直接返回；并发调用共享同一次 bootstrap。失败时状态保持 INITIALIZED，
    /// 错误同时经 on_error 与返回值交给宿主，由宿主按 is_retryable 决定是否重试。
    pub async fn start(&self) -> Result<(), ChatError> {
        {
            let state = self.inner.state.lock();
            if state.burned {
                return Err(ChatError::Burned);
            }
            match state.status {
                ClientStatus::Uninitialized => return Err(ChatError::NotInitialized),
                ClientStatus::Running => return Ok(()),
                ClientStatus::Initialized => {}
            }
        }

        let this = self.clone();
        self.inner
            .bootstrap
            .run(move || async move { this.bootstrap().await })
            .await
    }

    async fn bootstrap(self) -> Result<(), ChatError> {
        let epoch = self.inner.state.lock().epoch;
        tracing::debug!(epoch, "Starting webchat bootstrap");

        self.disconnect_transport();

        let (conversation, info) = match self.fetch_bootstrap(epoch).await {
            Ok(fetched) => fetched,
            Err(ChatError::Cancelled) => return Err(ChatError::Cancelled),
            Err(err) => return Err(self.fail_bootstrap(epoch, err)),
        };

        let notifications = {
            let mut state = self.inner.state.lock();
            if state.epoch != epoch || state.burned {
                tracing::debug!("Discarding bootstrap response superseded by stop()");
                return Err(ChatError::Cancelled);
            }
            state.subscribed = conversation.subscribed;
            reconciler::load_transcript(&mut state, conversation.messages, conversation.registered)
        };
        self.dispatch(notifications);

        if conversation.subscribed {
            if let Err(err) = self.connect_transport(info).await {
                return Err(self.fail_bootstrap(epoch, err));
            }
        }

        {
            let mut state = self.inner.state.lock();
            if state.epoch != epoch || state.burned {
                // 新一轮 bootstrap 已接管推送连接时不再断开
                let superseded = state.status == ClientStatus::Running;
                drop(state);
                if !superseded {
                    self.disconnect_transport();
                }
                return Err(ChatError::Cancelled);
            }
            state.status = ClientStatus::Running;
            state.connected = true;
        }

        tracing::info!(subscribed = conversation.subscribed, "Webchat session running");
        self.inner.callbacks.connection_status_change(true);
        self.reset_inactivity_timer();
        Ok(())
    }

    async fn fetch_bootstrap(
        &self,
        epoch: u64,
    ) -> Result<(Conversation, ConnectionInfo), ChatError> {
        let api = &self.inner.api;
        let login = api.login().await?;
        {
            let mut state = self.inner.state.lock();
            if state.epoch != epoch || state.burned {
                tracing::debug!("Discarding login response superseded by stop()");
                return Err(ChatError::Cancelled);
            }
            if let Some(token) = &login.access_token {
                state.access_token = Some(token.clone());
            }
        }
        if let Some(token) = &login.access_token {
            self.inner.storage.set_access_token(token);
        }
        if let Some(tracking_id) = &login.tracking_id {
            self.handle_new_session(tracking_id);
        }

        let (info, conversation) =
            tokio::try_join!(api.fetch_connection_info(), api.fetch_conversation())?;
        Ok((conversation, info))
    }

    fn fail_bootstrap(&self, epoch: u64, err: ChatError) -> ChatError {
        let current = self.inner.state.lock().epoch == epoch;
        if current {
            self.disconnect_transport();
        }
        let retryability = self.inner.retry_policy.classify(&err);
        match retryability {
            Retryability::Retryable => {
                tracing::warn!(status = ?err.status(), "Webchat bootstrap failed, retryable: {}", err)
            }
            Retryability::Fatal => {
                tracing::error!(status = ?err.status(), "Webchat bootstrap failed: {}", err)
            }
        }
        if current {
            self.inner.callbacks.error(&err);
        }
        err
    }

    /// 断开推送、取消计时器，回到 INITIALIZED；在途 bootstrap 的结果将被丢弃
    pub fn stop(&self) {
        self.inner.bootstrap.forget();
        self.disconnect_transport();
        self.inner.inactivity_timer.cancel();
        self.inner.burn_timer.cancel();

        let was_connected = {
            let mut state = self.inner.state.lock();
            if state.status == ClientStatus::Running {
                state.status = ClientStatus::Initialized;
            }
            state.epoch += 1;
            std::mem::replace(&mut state.connected, false)
        };

        tracing::info!("Webchat session stopped");
        if was_connected {
            self.inner.callbacks.connection_status_change(false);
        }
    }

    // ========================================================================
    // 推送连接
    // ========================================================================

    async fn connect_transport(&self, info: ConnectionInfo) -> Result<(), ChatError> {
        self.disconnect_transport();

        let options = {
            let state = self.inner.state.lock();
            ConnectOptions {
                url: info.url,
                tracking_id: state.tracking_id.clone(),
                access_token: state.access_token.clone(),
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.transport.connect(options, tx).await?;
        tokio::spawn(Self::pump(self.downgrade(), rx));
        Ok(())
    }

    async fn pump(weak: Weak<Inner>, mut rx: mpsc::UnboundedReceiver<TransportEvent>) {
        while let Some(event) = rx.recv().await {
            let Some(client) = Self::upgrade(&weak) else {
                break;
            };
            client.handle_transport_event(event).await;
        }
        tracing::debug!("Transport event channel closed");
    }

    fn disconnect_transport(&self) {
        if let Err(e) = self.inner.transport.disconnect() {
            tracing::warn!("Transport disconnect failed: {}", e);
        }
    }

    /// 处理传输层事件（连接生命周期与原始帧）
    pub async fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Established => {
                let (was_connected, recovered) = {
                    let mut state = self.inner.state.lock();
                    (
                        std::mem::replace(&mut state.connected, true),
                        std::mem::replace(&mut state.connection_errored, false),
                    )
                };
                if !was_connected {
                    self.inner.callbacks.connection_status_change(true);
                }
                if recovered {
                    tracing::info!("Push connection re-established");
                    self.inner.callbacks.reconnect(false);
                    self.inner.callbacks.error_resolution();
                    self.refresh_transcript().await;
                }
            }
            TransportEvent::Lost => {
                {
                    let mut state = self.inner.state.lock();
                    state.connected = false;
                    state.connection_errored = true;
                }
                tracing::warn!("Push connection lost");
                self.inner.callbacks.connection_status_change(false);
                self.inner.callbacks.error(&ChatError::ConnectionLost);
            }
            TransportEvent::Reconnecting => {
                self.inner.callbacks.reconnect(true);
            }
            TransportEvent::Message(raw) => match InboundFrame::parse(&raw) {
                Ok(frame) => self.handle_inbound_frame(frame),
                Err(e) => tracing::warn!("Dropping malformed frame: {}", e),
            },
            TransportEvent::Failure(reason) => {
                tracing::error!("Push transport gave up: {}", reason);
                self.stop();
                self.inner
                    .callbacks
                    .error(&ChatError::Transport(TransportError::Fatal(reason)));
            }
        }
    }

    /// 归并一帧入站消息；未运行或已 burn 时丢弃
    pub fn handle_inbound_frame(&self, frame: InboundFrame) {
        let (result, meaningful_now) = {
            let mut state = self.inner.state.lock();
            if state.burned || state.status != ClientStatus::Running {
                tracing::debug!(status = ?state.status, burned = state.burned, "Dropping frame");
                return;
            }
            let before = state.has_taken_meaningful_action;
            let result = reconciler::reconcile(&mut state, frame);
            (result, !before && state.has_taken_meaningful_action)
        };

        if meaningful_now {
            self.inner.storage.set_meaningful_action(true);
        }
        match result {
            Ok(notifications) => self.dispatch(notifications),
            Err(e) => tracing::warn!("Dropping malformed frame: {}", e),
        }
    }

    async fn refresh_transcript(&self) {
        let epoch = self.inner.state.lock().epoch;
        match self.inner.api.fetch_conversation().await {
            Ok(conversation) => {
                let notifications = {
                    let mut state = self.inner.state.lock();
                    if state.epoch != epoch || state.burned {
                        return;
                    }
                    reconciler::load_transcript(
                        &mut state,
                        conversation.messages,
                        conversation.registered,
                    )
                };
                self.dispatch(notifications);
            }
            Err(e) => {
                tracing::warn!("Transcript refresh after reconnect failed: {}", e);
                self.inner.callbacks.error(&ChatError::Api(e));
            }
        }
    }

    fn dispatch(&self, notifications: Vec<Notification>) {
        for notification in notifications {
            match notification {
                Notification::TranscriptChanged(transcript) => {
                    self.inner.callbacks.transcript_change(&transcript)
                }
                Notification::AgentTyping(typing, author) => {
                    self.inner.callbacks.agent_typing(typing, &author)
                }
                Notification::Registered => {
                    tracing::info!("Visitor registered");
                    self.inner.callbacks.registration();
                }
                Notification::QueueDisposition(disposition) => {
                    tracing::debug!(
                        ?disposition,
                        agent_assigned = self.is_agent_assigned(),
                        "Queue disposition updated"
                    );
                }
                Notification::Burn(directive) => self.apply_burn_directive(directive),
            }
        }
    }

    // ========================================================================
    // 新会话检测
    // ========================================================================

    /// 采用新的 tracking id；从一个已知值变为另一个时触发 on_new_session
    pub fn handle_new_session(&self, tracking_id: &str) {
        let is_new = {
            let mut state = self.inner.state.lock();
            let is_new = reconciler::is_new_session(state.tracking_id.as_deref(), tracking_id);
            state.tracking_id = Some(tracking_id.to_string());
            is_new
        };
        self.inner.storage.set_tracking_id(tracking_id);

        if is_new {
            tracing::info!(tracking_id, "New webchat session");
            self.inner.callbacks.new_session();
        }
    }

    // ========================================================================
    // Burn-down
    // ========================================================================

    fn apply_burn_directive(&self, directive: BurnDirective) {
        let delay = burn_delay(&directive, chrono::Utc::now().timestamp_millis());
        tracing::warn!(
            code = ?directive.code,
            force = directive.force,
            delay_ms = delay.as_millis() as u64,
            "Burn directive received"
        );

        let weak = self.downgrade();
        self.inner.burn_timer.arm(delay, move || async move {
            if let Some(client) = Self::upgrade(&weak) {
                client.burn_down();
            }
        });
    }

    /// 永久停用客户端：断开推送、禁用 API、清理计时器；任一步失败都不影响 burned 置位
    pub fn burn_down(&self) {
        let first = {
            // burned 由 guard 在离开本块时置位
            let _guard = BurnGuard::new(Arc::clone(&self.inner.state));
            let first = {
                let mut state = self.inner.state.lock();
                state.epoch += 1;
                state.status = ClientStatus::Initialized;
                !std::mem::replace(&mut state.burn_logged, true)
            };

            self.inner.bootstrap.forget();
            self.inner.inactivity_timer.cancel();
            self.inner.burn_timer.cancel();
            if let Err(e) = self.inner.transport.disconnect() {
                tracing::warn!("Transport disconnect failed during burn down: {}", e);
            }
            self.inner.api.disable();
            self.inner.state.lock().connected = false;
            first
        };

        if first {
            tracing::error!("Webchat has been burned down.");
            self.inner.callbacks.burn();
        }
    }

    // ========================================================================
    // 不活跃超时
    // ========================================================================

    fn reset_inactivity_timer(&self) {
        if self.status() != ClientStatus::Running {
            return;
        }
        let timeout = self.inner.config.session.inactivity_timeout();
        let weak = self.downgrade();
        self.inner.inactivity_timer.arm(timeout, move || async move {
            if let Some(client) = Self::upgrade(&weak) {
                client.handle_inactivity_timeout();
            }
        });
    }

    fn handle_inactivity_timeout(&self) {
        tracing::info!("Webchat client inactive, stopping session");
        self.inner.callbacks.client_inactive_timeout();
        self.stop();
    }

    // ========================================================================
    // 外发操作
    // ========================================================================

    fn ensure_usable(&self) -> Result<(), ChatError> {
        let state = self.inner.state.lock();
        if state.burned {
            return Err(ChatError::Burned);
        }
        if state.status == ClientStatus::Uninitialized {
            return Err(ChatError::NotInitialized);
        }
        Ok(())
    }

    /// 用户有交互：标记可见（消息/注册还标记有效操作），持久化并重置不活跃计时器
    fn note_user_action(&self, meaningful: bool) {
        {
            let mut state = self.inner.state.lock();
            state.chat_is_visible = true;
            if meaningful {
                state.has_taken_meaningful_action = true;
            }
        }
        self.inner.storage.set_chat_visible(true);
        if meaningful {
            self.inner.storage.set_meaningful_action(true);
        }
        self.reset_inactivity_timer();
    }

    fn context_value(&self) -> Value {
        serde_json::to_value(&self.inner.state.lock().context).unwrap_or(Value::Null)
    }

    pub async fn send_text_message(&self, text: &str) -> Result<(), ChatError> {
        self.ensure_usable()?;
        self.note_user_action(true);
        let payload = serde_json::json!({ "text": text, "context": self.context_value() });
        self.inner.api.send_message(payload).await?;
        Ok(())
    }

    /// 发送富交互回复；`reply` 必须是 JSON 对象，会附上当前上下文
    pub async fn send_quiq_reply(&self, reply: Value) -> Result<(), ChatError> {
        self.ensure_usable()?;
        let Value::Object(mut payload) = reply else {
            return Err(ChatError::InvalidArgument(
                "reply payload must be an object".to_string(),
            ));
        };
        self.note_user_action(true);
        payload.insert("context".to_string(), self.context_value());
        self.inner.api.send_message(Value::Object(payload)).await?;
        Ok(())
    }

    pub async fn send_registration(
        &self,
        fields: &HashMap<String, String>,
        version_id: Option<&str>,
    ) -> Result<(), ChatError> {
        self.ensure_usable()?;
        self.note_user_action(true);
        self.inner.api.send_registration(fields, version_id).await?;
        Ok(())
    }

    pub async fn update_typing_indicator(&self, text: &str, typing: bool) -> Result<(), ChatError> {
        self.ensure_usable()?;
        self.note_user_action(false);
        self.inner.api.update_typing_indicator(text, typing).await?;
        Ok(())
    }

    /// 访客打开聊天窗口
    pub async fn join_chat(&self) -> Result<(), ChatError> {
        self.ensure_usable()?;
        self.inner.state.lock().chat_is_visible = true;
        self.inner.storage.set_chat_visible(true);
        self.inner.api.join_chat().await?;
        Ok(())
    }

    /// 访客关闭聊天窗口
    pub async fn leave_chat(&self) -> Result<(), ChatError> {
        self.ensure_usable()?;
        self.inner.state.lock().chat_is_visible = false;
        self.inner.storage.set_chat_visible(false);
        self.inner.api.leave_chat().await?;
        Ok(())
    }

    // ========================================================================
    // 上下文
    // ========================================================================

    pub fn chat_context(&self) -> ChatContext {
        self.inner.state.lock().context.clone()
    }

    pub fn set_chat_context(&self, context: ChatContext) {
        self.inner.state.lock().context = context;
    }

    /// 浅合并：只覆盖 `patch` 中设置了的字段
    pub fn update_chat_context(&self, patch: ChatContext) {
        self.inner.state.lock().context.merge(patch);
    }

    // ========================================================================
    // 回调注册（每个事件只保留最后一次注册）
    // ========================================================================

    pub fn on_transcript_change<F>(&self, f: F)
    where
        F: Fn(&[ConversationEvent]) + Send + Sync + 'static,
    {
        self.inner.callbacks.set_transcript_change(Arc::new(f));
    }

    /// on_transcript_change 的别名
    pub fn on_new_messages<F>(&self, f: F)
    where
        F: Fn(&[ConversationEvent]) + Send + Sync + 'static,
    {
        self.on_transcript_change(f);
    }

    pub fn on_agent_typing<F>(&self, f: F)
    where
        F: Fn(bool, &AuthorMetadata) + Send + Sync + 'static,
    {
        self.inner.callbacks.set_agent_typing(Arc::new(f));
    }

    pub fn on_error<F>(&self, f: F)
    where
        F: Fn(&ChatError) + Send + Sync + 'static,
    {
        self.inner.callbacks.set_error(Arc::new(f));
    }

    pub fn on_error_resolution<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.callbacks.set_error_resolution(Arc::new(f));
    }

    pub fn on_new_session<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.callbacks.set_new_session(Arc::new(f));
    }

    pub fn on_connection_status_change<F>(&self, f: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.inner.callbacks.set_connection_status_change(Arc::new(f));
    }

    pub fn on_registration<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.callbacks.set_registration(Arc::new(f));
    }

    pub fn on_burn<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.callbacks.set_burn(Arc::new(f));
    }

    pub fn on_client_inactive_timeout<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.callbacks.set_client_inactive_timeout(Arc::new(f));
    }

    /// `true` 表示开始重连，`false` 表示重连成功
    pub fn on_reconnect<F>(&self, f: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.inner.callbacks.set_reconnect(Arc::new(f));
    }

    // ========================================================================
    // 访问器
    // ========================================================================

    pub fn status(&self) -> ClientStatus {
        self.inner.state.lock().status
    }

    pub fn transcript(&self) -> Vec<ConversationEvent> {
        self.inner.state.lock().transcript.clone()
    }

    pub fn is_registered(&self) -> bool {
        self.inner.state.lock().registered
    }

    pub fn is_agent_assigned(&self) -> bool {
        reconciler::is_agent_assigned(&self.inner.state.lock())
    }

    pub fn is_chat_visible(&self) -> bool {
        self.inner.state.lock().chat_is_visible
    }

    pub fn has_taken_meaningful_action(&self) -> bool {
        self.inner.state.lock().has_taken_meaningful_action
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.lock().connected
    }

    pub fn is_subscribed(&self) -> bool {
        self.inner.state.lock().subscribed
    }

    pub fn is_burned(&self) -> bool {
        self.inner.state.lock().burned
    }

    pub fn tracking_id(&self) -> Option<String> {
        self.inner.state.lock().tracking_id.clone()
    }

    pub fn host(&self) -> Option<String> {
        self.inner.state.lock().host.clone()
    }

    pub fn contact_point(&self) -> Option<String> {
        self.inner.state.lock().contact_point.clone()
    }

    pub fn is_storage_enabled(&self) -> bool {
        self.inner.storage.is_enabled()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.inner.retry_policy
    }

    /// 宿主据此决定 start() 失败后是否重试
    pub fn is_retryable(&self, err: &ChatError) -> bool {
        self.inner.retry_policy.is_retryable(err)
    }
}
