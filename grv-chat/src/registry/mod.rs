//! 连接注册表：身份 -> 活动连接的唯一真相来源
//! Connection registry: the single source of truth for "who is reachable right now"
//!
//! 每个身份同一时刻至多一个活动连接；新连接会取代旧连接（先发出结束信号，再安装新连接）。
//! At most one live connection per identity; a reconnect supersedes the old one
//! (its done signal fires before the new one is installed).

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::message::OutboundEvent;
use crate::error::SendError;

/// 默认出站队列容量 / Default outbound queue capacity
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 32;

/// 连接结束信号（幂等关闭，可被多方等待）
/// Connection done signal: idempotent to close, observable by any number of waiters
#[derive(Clone, Debug)]
pub struct DoneSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl DoneSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// 关闭信号；仅首次关闭返回 true / Close the signal; true only for the first close
    pub fn close(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }

    /// 等待信号关闭 / Wait until the signal is closed
    pub async fn closed(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl Default for DoneSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// 一个身份的一次活动连接 / One live session bound to one identity
#[derive(Debug)]
pub struct Connection {
    identity: String,
    session_id: Uuid,
    connected_at: DateTime<Utc>,
    outbound: mpsc::Sender<OutboundEvent>,
    done: DoneSignal,
}

impl Connection {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub fn done(&self) -> &DoneSignal {
        &self.done
    }

    pub fn is_closed(&self) -> bool {
        self.done.is_closed()
    }

    pub fn close(&self) -> bool {
        self.done.close()
    }

    /// 非阻塞入队；已关闭、已断开或队列满时返回对应错误
    /// Non-blocking enqueue; reports closed, disconnected or saturated queues
    pub fn try_deliver(&self, event: impl Into<OutboundEvent>) -> Result<(), SendError> {
        if self.done.is_closed() {
            return Err(SendError::Disconnected(self.identity.clone()));
        }
        self.outbound.try_send(event.into()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::QueueFull(self.identity.clone()),
            mpsc::error::TrySendError::Closed(_) => SendError::Disconnected(self.identity.clone()),
        })
    }
}

/// 连接注册表 / Connection registry
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Arc<Connection>>>,
    outbound_capacity: usize,
}

impl ConnectionRegistry {
    pub fn new(outbound_capacity: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            outbound_capacity: outbound_capacity.max(1),
        }
    }

    /// 注册连接；若已有同身份连接，先结束旧连接再安装新连接
    /// Register a connection; an existing one for the same identity is signalled done first
    pub fn add(&self, identity: &str) -> (Arc<Connection>, mpsc::Receiver<OutboundEvent>) {
        let (tx, rx) = mpsc::channel(self.outbound_capacity);
        let connection = Arc::new(Connection {
            identity: identity.to_string(),
            session_id: Uuid::new_v4(),
            connected_at: Utc::now(),
            outbound: tx,
            done: DoneSignal::new(),
        });

        let mut connections = self.connections.write();
        if let Some(existing) = connections.remove(identity) {
            existing.close();
            info!(
                "🔁 Superseding session {} of user {} with {}",
                existing.session_id, identity, connection.session_id
            );
        }
        connections.insert(identity.to_string(), connection.clone());
        (connection, rx)
    }

    /// 幂等移除 / Idempotent removal; returns whether a connection was removed
    pub fn remove(&self, identity: &str) -> bool {
        let removed = self.connections.write().remove(identity);
        match removed {
            Some(connection) => {
                connection.close();
                true
            }
            None => false,
        }
    }

    /// 仅当当前注册的仍是该会话时移除（旧会话收尾不会误删新会话）
    /// Remove only if the registered session is still `session_id`, so a superseded
    /// session's teardown never evicts its successor
    pub fn remove_session(&self, identity: &str, session_id: Uuid) -> bool {
        let mut connections = self.connections.write();
        let matches = connections
            .get(identity)
            .map(|c| c.session_id == session_id)
            .unwrap_or(false);
        if !matches {
            debug!("session {} of {} already replaced or removed", session_id, identity);
            return false;
        }
        if let Some(connection) = connections.remove(identity) {
            connection.close();
        }
        true
    }

    pub fn get(&self, identity: &str) -> Option<Arc<Connection>> {
        self.connections.read().get(identity).cloned()
    }

    pub fn is_online(&self, identity: &str) -> bool {
        self.connections.read().contains_key(identity)
    }

    /// 在线身份快照（按字典序）/ Snapshot of online identities, sorted
    pub fn list_online(&self) -> Vec<String> {
        let mut users: Vec<String> = self.connections.read().keys().cloned().collect();
        users.sort();
        users
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// 向指定身份非阻塞投递 / Non-blocking delivery to an identity
    pub fn send(&self, identity: &str, event: impl Into<OutboundEvent>) -> Result<(), SendError> {
        // 先克隆句柄再释放锁，入队不持锁 / clone the handle, enqueue without the lock
        let connection = self
            .get(identity)
            .ok_or_else(|| SendError::NotOnline(identity.to_string()))?;
        connection.try_deliver(event)
    }

    /// 关闭并清空全部连接（停机时使用）/ Close and drop every connection (shutdown)
    pub fn close_all(&self) -> usize {
        let drained: Vec<Arc<Connection>> =
            self.connections.write().drain().map(|(_, c)| c).collect();
        for connection in &drained {
            connection.close();
        }
        drained.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOUND_CAPACITY)
    }
}
