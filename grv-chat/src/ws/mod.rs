//! WebSocket 传输层：监听、握手、读写循环
//! WebSocket transport: listener, handshake, read and write loops

pub mod connection;
pub mod handler;
pub mod sender;
pub mod server;
