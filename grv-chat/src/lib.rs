//! grv-chat：市场后端的实时私信服务
//! grv-chat: real-time direct messaging for the marketplace backend
//!
//! 连接注册表 + 投递管道 + 已读回执 + 历史/在线查询，存储通过 [`storage::MessageStore`] 接入。
//! Connection registry, delivery pipeline, read receipts and history/presence
//! queries; persistence plugs in through [`storage::MessageStore`].

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod registry;
pub mod router;
pub mod server;
pub mod service;
pub mod storage;
pub mod ws;

pub use error::{ChatError, Result};
pub use registry::ConnectionRegistry;
pub use server::ChatServer;
