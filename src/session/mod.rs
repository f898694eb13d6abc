//! 会话层：控制器、入站帧归并、宿主回调

mod builder;
mod callbacks;
mod client;
pub mod reconciler;

pub use builder::ChatClientBuilder;
pub use callbacks::CallbackRegistry;
pub use client::ChatClient;
pub use reconciler::Notification;
