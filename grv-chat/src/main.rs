use actix_web::{web, App, HttpServer};
use anyhow::{anyhow, Result};
use clap::Parser;
use grv::init_tracing;
use std::sync::Arc;
use tracing::{error, info, warn};

use grv_chat::config::{self, AppConfig, StorageBackend, StorageConfig};
use grv_chat::server::ChatServer;
use grv_chat::storage::{MemoryMessageStore, MessageStore, PgMessageStore};

/// 命令行参数 / Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "grv-chat WebSocket & HTTP Server", long_about = None)]
pub struct Args {
    /// 指定配置文件路径（TOML/JSON/YAML自动识别）
    /// Specify config file path (auto-detect TOML/JSON/YAML)
    #[arg(short = 'c', long = "config")]
    config: Option<String>,
}

/// 按配置构建消息存储 / Build the message store from configuration
async fn build_store(storage: &StorageConfig) -> Result<Option<Arc<dyn MessageStore>>> {
    match storage.backend {
        StorageBackend::Memory => Ok(Some(Arc::new(MemoryMessageStore::new()))),
        StorageBackend::Postgres => {
            let url = storage
                .url
                .as_deref()
                .ok_or_else(|| anyhow!("storage.url is required for postgres"))?;
            let store = PgMessageStore::connect(url, storage.max_connections).await?;
            Ok(Some(Arc::new(store)))
        }
        StorageBackend::Disabled => Ok(None),
    }
}

/// 启动HTTP服务器 / Start HTTP server
async fn start_http_server(server: ChatServer, host: String, port: u16) -> Result<()> {
    let addr = format!("{}:{}", host, port);
    info!("🌐 HTTP Server starting on http://{}", addr);
    info!("   GET  /chat/status - Online users");
    info!("   GET  /messages?user_id=&peer_id=&limit=&before= - Conversation history");
    info!("   GET  /health - Basic health check");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(server.clone()))
            .configure(grv_chat::router::configure)
    })
    .disable_signals()
    .bind(addr)?
    .run()
    .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 先加载配置，日志级别取自 logging.level
    // Load configuration first; the log level comes from logging.level
    match &args.config {
        Some(path) => {
            grv::init_global_config_with_file(path)?;
        }
        None => {
            grv::get_global_config_manager()?;
        }
    }
    init_tracing()?;
    info!("🎯 Starting grv-chat (WebSocket + HTTP)...");

    let cm = grv::get_global_config_manager()?;
    cm.log_sources_info();
    let AppConfig {
        server: server_cfg,
        chat,
        storage,
    } = config::load()?;

    if chat.ping_interval >= chat.read_timeout {
        warn!(
            "chat.ping_interval_ms ({:?}) is not below chat.read_timeout_ms ({:?}); idle clients may time out",
            chat.ping_interval, chat.read_timeout
        );
    }
    info!(
        "⚙️ outbound_capacity={} store_timeout={:?} read_timeout={:?} ping_interval={:?}",
        chat.outbound_capacity, chat.store_timeout, chat.read_timeout, chat.ping_interval
    );

    let mut server = ChatServer::new(chat);
    if let Some(store) = build_store(&storage).await? {
        server = server.with_store(store);
    }
    info!("💾 Message store: {}", server.store_backend());

    let ws_server = server.clone();
    let ws_host = server_cfg.host.clone();
    let ws_path = server_cfg.ws_path.clone();
    let ws_port = server_cfg.ws_port;
    let ws_future = async move {
        if let Err(e) = ws_server.run(&ws_host, ws_port, &ws_path).await {
            error!("❌ WebSocket server error: {}", e);
        }
    };

    let http_future = start_http_server(server.clone(), server_cfg.host.clone(), server_cfg.http_port);

    // 等待任一服务退出或 Ctrl-C / Wait for either server to stop or Ctrl-C
    tokio::select! {
        _ = ws_future => {
            info!("WebSocket server stopped");
        }
        res = http_future => {
            if let Err(e) = res {
                error!("❌ HTTP server error: {}", e);
            }
            info!("HTTP server stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Shutdown signal received");
        }
    }

    let closed = server.registry.close_all();
    info!("✅ Server shutdown successfully ({} connection(s) closed)", closed);
    Ok(())
}
