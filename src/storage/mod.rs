//! 持久化键值存储
//!
//! 核心只通过 PersistedSession 的访问器读写（tracking id、access token、可见性、有效操作标志），
//! 不关心具体后端；按 contact point 命名空间由 NamespacedStorage 负责。

mod namespace;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

pub use namespace::NamespacedStorage;

/// 键值存储接口（同步，值为字符串）
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str);

    fn remove(&self, key: &str);

    /// 切换到某个 contact point 的命名空间；默认无命名空间
    fn scope(&self, _contact_point: &str) {}

    /// 存储是否可用（如浏览器禁用了本地存储）
    fn is_enabled(&self) -> bool {
        true
    }
}

/// 内存存储（测试与无持久化场景）
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前所有键（测试断言用）
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries.write().insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }
}

const TRACKING_ID_KEY: &str = "webchat-tracking-id";
const ACCESS_TOKEN_KEY: &str = "webchat-access-token";
const CHAT_VISIBLE_KEY: &str = "webchat-container-visible";
const MEANINGFUL_ACTION_KEY: &str = "webchat-user-taken-meaningful-action";

/// 会话相关键的类型化访问器
#[derive(Clone)]
pub struct PersistedSession {
    storage: Arc<dyn SessionStorage>,
}

impl PersistedSession {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self { storage }
    }

    pub fn scope(&self, contact_point: &str) {
        self.storage.scope(contact_point);
    }

    pub fn is_enabled(&self) -> bool {
        self.storage.is_enabled()
    }

    pub fn tracking_id(&self) -> Option<String> {
        self.storage.get(TRACKING_ID_KEY)
    }

    pub fn set_tracking_id(&self, tracking_id: &str) {
        self.storage.set(TRACKING_ID_KEY, tracking_id);
    }

    pub fn access_token(&self) -> Option<String> {
        self.storage.get(ACCESS_TOKEN_KEY)
    }

    pub fn set_access_token(&self, token: &str) {
        self.storage.set(ACCESS_TOKEN_KEY, token);
    }

    pub fn chat_visible(&self) -> bool {
        self.flag(CHAT_VISIBLE_KEY)
    }

    pub fn set_chat_visible(&self, visible: bool) {
        self.set_flag(CHAT_VISIBLE_KEY, visible);
    }

    pub fn meaningful_action(&self) -> bool {
        self.flag(MEANINGFUL_ACTION_KEY)
    }

    pub fn set_meaningful_action(&self, taken: bool) {
        self.set_flag(MEANINGFUL_ACTION_KEY, taken);
    }

    fn flag(&self, key: &str) -> bool {
        self.storage.get(key).as_deref() == Some("true")
    }

    fn set_flag(&self, key: &str, value: bool) {
        self.storage.set(key, if value { "true" } else { "false" });
    }
}
