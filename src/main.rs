//! webchat - 演示客户端
//!
//! 连接 config/default.toml（或 WEBCHAT__APP__HOST / WEBCHAT__APP__CONTACT_POINT）指定的后端，
//! 打印 transcript 变化，把 stdin 的每一行作为文本消息发送。
//!
//! 运行方式：
//! ```bash
//! cargo run --bin webchat --features websocket -- [config.toml]
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use webchat_session::api::HttpChatApi;
use webchat_session::config::load_config;
use webchat_session::protocol::ConversationEvent;
use webchat_session::storage::{MemoryStorage, NamespacedStorage};
use webchat_session::transport::WebSocketTransport;
use webchat_session::{observability, ChatClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init("webchat_session=info");

    let cfg = load_config(std::env::args().nth(1).map(PathBuf::from))
        .context("Failed to load config")?;
    let host = cfg
        .app
        .host
        .clone()
        .context("app.host is not configured")?;
    let contact_point = cfg
        .app
        .contact_point
        .clone()
        .unwrap_or_else(|| "default".to_string());

    let api = HttpChatApi::new(&cfg.api).context("Failed to build HTTP client")?;
    let transport = WebSocketTransport::new(&cfg.transport);
    let storage = NamespacedStorage::new(Arc::new(MemoryStorage::new()));

    let client = ChatClient::builder(Arc::new(api), Arc::new(transport))
        .with_storage(Arc::new(storage))
        .with_config(cfg)
        .build();

    client.on_transcript_change(|transcript| {
        if let Some(ConversationEvent::Text(msg)) = transcript.last() {
            println!("[{:?}] {}", msg.author_type, msg.text);
        }
    });
    client.on_agent_typing(|typing, author| {
        if typing {
            let name = author.author_display_name.as_deref().unwrap_or("Agent");
            println!("{name} is typing...");
        }
    });
    client.on_connection_status_change(|connected| {
        tracing::info!(connected, "Connection status changed");
    });
    client.on_error(|err| tracing::warn!("Webchat error: {}", err));
    client.on_burn(|| eprintln!("Webchat has been disabled by the server."));

    client.initialize(&host, &contact_point)?;
    if let Err(err) = client.start().await {
        if client.is_retryable(&err) {
            tracing::warn!("Start failed, retrying once: {}", err);
            client.start().await.context("Failed to start webchat session")?;
        } else {
            return Err(err).context("Failed to start webchat session");
        }
    }
    client.join_chat().await.context("Failed to join chat")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                if let Err(err) = client.send_text_message(text).await {
                    tracing::error!("Send failed: {}", err);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let _ = client.leave_chat().await;
    client.stop();
    Ok(())
}
