//! Bootstrap 重试策略
//!
//! 根据失败的状态码返回 Retryability，供宿主决定是否再次调用 start()。
//! 控制器本身不做自动重试：每次显式 start() 只尝试一次。

use std::collections::HashMap;

use crate::config::RetrySection;
use crate::core::ChatError;

/// 失败分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retryability {
    /// 可重试（405、5xx、网络层失败）
    Retryable,
    /// 不可重试（404 及其余 4xx），需先修复再重试
    Fatal,
}

/// 显式的状态码分类表：默认规则 + 可覆盖条目
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    overrides: HashMap<u16, Retryability>,
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从配置的 retryable_statuses / fatal_statuses 构建；同一状态码两边都出现时 fatal 优先
    pub fn from_config(section: &RetrySection) -> Self {
        let mut policy = Self::new();
        for status in &section.retryable_statuses {
            policy = policy.with_override(*status, Retryability::Retryable);
        }
        for status in &section.fatal_statuses {
            policy = policy.with_override(*status, Retryability::Fatal);
        }
        policy
    }

    pub fn with_override(mut self, status: u16, retryability: Retryability) -> Self {
        self.overrides.insert(status, retryability);
        self
    }

    /// 纯函数：只依赖状态码与覆盖表
    pub fn classify_status(&self, status: Option<u16>) -> Retryability {
        let Some(status) = status else {
            return Retryability::Retryable;
        };
        if let Some(r) = self.overrides.get(&status) {
            return *r;
        }
        match status {
            405 => Retryability::Retryable,
            400..=499 => Retryability::Fatal,
            _ => Retryability::Retryable,
        }
    }

    pub fn classify(&self, err: &ChatError) -> Retryability {
        match err {
            ChatError::Burned | ChatError::InvalidArgument(_) | ChatError::NotInitialized => {
                Retryability::Fatal
            }
            _ => self.classify_status(err.status()),
        }
    }

    pub fn is_retryable(&self, err: &ChatError) -> bool {
        self.classify(err) == Retryability::Retryable
    }
}
