//! ChatClient 构建器：统一装配 API、传输、存储与重试策略

use std::sync::Arc;

use crate::api::ChatApi;
use crate::config::ClientConfig;
use crate::core::RetryPolicy;
use crate::storage::{MemoryStorage, NamespacedStorage, SessionStorage};
use crate::transport::Transport;

use super::ChatClient;

pub struct ChatClientBuilder {
    api: Arc<dyn ChatApi>,
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    storage: Option<Arc<dyn SessionStorage>>,
    retry_policy: Option<RetryPolicy>,
}

impl ChatClientBuilder {
    pub fn new(api: Arc<dyn ChatApi>, transport: Arc<dyn Transport>) -> Self {
        Self {
            api,
            transport,
            config: ClientConfig::default(),
            storage: None,
            retry_policy: None,
        }
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// 持久化后端；不设置时使用按 contact point 命名空间的内存存储
    pub fn with_storage(mut self, storage: Arc<dyn SessionStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// 覆盖从配置 [retry] 段得到的策略
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn build(self) -> ChatClient {
        let storage = self.storage.unwrap_or_else(|| {
            Arc::new(NamespacedStorage::new(Arc::new(MemoryStorage::new())))
        });
        let retry_policy = self
            .retry_policy
            .unwrap_or_else(|| RetryPolicy::from_config(&self.config.retry));
        ChatClient::from_parts(self.config, self.api, self.transport, storage, retry_policy)
    }
}
