//! HTTP 实现：`{host}/api/v1/messaging/chat/{contactPoint}` 下的 REST 接口

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};

use super::{ChatApi, ConnectionInfo, Conversation, LoginResponse};
use crate::config::ApiSection;
use crate::core::ApiError;

const CLIENT_ID_HEADER: &str = "X-Webchat-Client-Id";
const CLIENT_VERSION_HEADER: &str = "X-Webchat-Client-Version";
const ACCESS_TOKEN_HEADER: &str = "X-Webchat-Access-Token";

#[derive(Debug, Clone)]
struct Endpoint {
    host: String,
    contact_point: String,
}

/// 基于 reqwest 的 ChatApi
pub struct HttpChatApi {
    client: reqwest::Client,
    client_id: String,
    endpoint: RwLock<Option<Endpoint>>,
    access_token: RwLock<Option<String>>,
    disabled: AtomicBool,
}

impl HttpChatApi {
    pub fn new(section: &ApiSection) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(section.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            client_id: section.client_id.clone(),
            endpoint: RwLock::new(None),
            access_token: RwLock::new(None),
            disabled: AtomicBool::new(false),
        })
    }

    /// 恢复已持久化的 access token
    pub fn with_access_token(self, token: Option<String>) -> Self {
        *self.access_token.write() = token;
        self
    }

    fn endpoint(&self) -> Result<Endpoint, ApiError> {
        self.endpoint
            .read()
            .clone()
            .ok_or_else(|| ApiError::network("endpoint not configured"))
    }

    fn contact_point_url(&self, path: &str) -> Result<String, ApiError> {
        let ep = self.endpoint()?;
        Ok(format!(
            "{}/api/v1/messaging/chat/{}{}",
            ep.host.trim_end_matches('/'),
            ep.contact_point,
            path
        ))
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ApiError> {
        if self.disabled.load(Ordering::SeqCst) {
            return Err(ApiError::network("client disabled"));
        }

        let mut request = request
            .header(CLIENT_ID_HEADER, &self.client_id)
            .header(CLIENT_VERSION_HEADER, env!("CARGO_PKG_VERSION"));
        if let Some(token) = self.access_token.read().clone() {
            request = request.header(ACCESS_TOKEN_HEADER, token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(status = status.as_u16(), "API call rejected");
            return Err(ApiError::new(status.as_u16(), body));
        }
        Ok(response)
    }

    async fn post(&self, path: &str, body: Value) -> Result<(), ApiError> {
        let url = self.contact_point_url(path)?;
        self.execute(self.client.post(url).json(&body)).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    fn set_endpoint(&self, host: &str, contact_point: &str) {
        *self.endpoint.write() = Some(Endpoint {
            host: host.to_string(),
            contact_point: contact_point.to_string(),
        });
    }

    async fn login(&self) -> Result<LoginResponse, ApiError> {
        let ep = self.endpoint()?;
        let url = format!("{}/api/v1/token/generate", ep.host.trim_end_matches('/'));
        let response = self.execute(self.client.post(url)).await?;
        let login: LoginResponse = response.json().await?;
        if let Some(token) = &login.access_token {
            *self.access_token.write() = Some(token.clone());
        }
        Ok(login)
    }

    async fn fetch_conversation(&self) -> Result<Conversation, ApiError> {
        let url = self.contact_point_url("")?;
        Ok(self.execute(self.client.get(url)).await?.json().await?)
    }

    async fn fetch_connection_info(&self) -> Result<ConnectionInfo, ApiError> {
        let url = self.contact_point_url("/socket-info")?;
        Ok(self.execute(self.client.get(url)).await?.json().await?)
    }

    async fn send_message(&self, payload: Value) -> Result<(), ApiError> {
        self.post("/send-message", payload).await
    }

    async fn send_registration(
        &self,
        fields: &HashMap<String, String>,
        version_id: Option<&str>,
    ) -> Result<(), ApiError> {
        self.post(
            "/register",
            json!({ "form": fields, "formVersionId": version_id }),
        )
        .await
    }

    async fn update_typing_indicator(&self, text: &str, typing: bool) -> Result<(), ApiError> {
        self.post("/typing", json!({ "text": text, "typing": typing }))
            .await
    }

    async fn join_chat(&self) -> Result<(), ApiError> {
        self.post("/join", json!({})).await
    }

    async fn leave_chat(&self) -> Result<(), ApiError> {
        self.post("/leave", json!({})).await
    }

    fn disable(&self) {
        self.disabled.store(true, Ordering::SeqCst);
    }
}
