use anyhow::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::server::ChatServer;

/// 启动WS监听 / Start WS listener
impl ChatServer {
    pub async fn run(&self, host: &str, port: u16, ws_path: &str) -> Result<()> {
        let addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&addr).await?;
        info!("🚀 grv-chat WebSocket Server starting on ws://{}{}", addr, ws_path);
        self.serve(listener, ws_path).await
    }

    /// 在已绑定的监听器上接受连接，每个连接一个任务
    /// Accept on an already bound listener, one task per connection
    pub async fn serve(&self, listener: TcpListener, ws_path: &str) -> Result<()> {
        let ws_path: Arc<str> = Arc::from(ws_path);
        info!("📡 Waiting for connections...");
        loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("accept failed: {}", e);
                    continue;
                }
            };
            let server = self.clone();
            let ws_path = ws_path.clone();
            tokio::spawn(async move {
                if let Err(e) =
                    crate::ws::connection::handle_connection(stream, peer_addr, server, ws_path).await
                {
                    tracing::debug!("Connection error from {}: {}", peer_addr, e);
                }
            });
        }
    }
}
