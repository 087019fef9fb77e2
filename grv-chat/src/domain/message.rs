//! 线协议消息结构 / Wire-level message shapes
//!
//! 字段名与既有客户端保持兼容 / Field names stay compatible with existing clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// 已读回执事件标记 / Read-receipt event marker
pub const READ_RECEIPT_EVENT: &str = "message_read";

/// 普通消息事件标记（可选）/ Optional marker for plain messages
pub const MESSAGE_EVENT: &str = "message";

/// 消息类型 / Message kind (0=text, 1=image, 2=file, 3=system)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    File,
    System,
}

impl MessageKind {
    pub fn as_i16(self) -> i16 {
        match self {
            MessageKind::Text => 0,
            MessageKind::Image => 1,
            MessageKind::File => 2,
            MessageKind::System => 3,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, MessageKind::Text)
    }
}

impl TryFrom<i16> for MessageKind {
    type Error = String;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageKind::Text),
            1 => Ok(MessageKind::Image),
            2 => Ok(MessageKind::File),
            3 => Ok(MessageKind::System),
            other => Err(format!("unknown message_type {}", other)),
        }
    }
}

impl From<MessageKind> for i16 {
    fn from(kind: MessageKind) -> Self {
        kind.as_i16()
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// 私信消息（入站与转发共用）/ Direct message, used inbound and when forwarded
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub sender_id: String,
    #[serde(default)]
    pub receiver_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// 客户端提供或服务端生成的消息ID / Client-supplied or server-generated id
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "MessageKind::is_text")]
    pub message_type: MessageKind,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_read: bool,
    /// 持久化后的存储ID，用于已读回执 / Store id once persisted, used by read receipts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_id: Option<i64>,
}

impl ChatMessage {
    /// 服务端规范化：补全ID与时间，强制发送者为已认证身份
    /// Server-side normalisation: fill id and timestamp, force the authenticated sender
    pub fn normalize(&mut self, authenticated_sender: &str) {
        if self.id.is_empty() {
            self.id = uuid::Uuid::new_v4().to_string();
        }
        // 零值时间（早于纪元）视为缺失 / zero-valued timestamps count as absent
        if self.timestamp.map_or(true, |ts| ts.timestamp() <= 0) {
            self.timestamp = Some(Utc::now());
        }
        self.sender_id = authenticated_sender.to_string();
        self.is_read = false;
        self.store_id = None;
    }

    /// 持久化使用的秒级时间戳 / Epoch seconds used for persistence
    pub fn epoch_seconds(&self) -> i64 {
        self.timestamp.unwrap_or_else(Utc::now).timestamp()
    }
}

/// 投递状态 / Delivery status reported to the sender
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Sent,
    Queued,
    Error,
}

/// 发送确认 / Acknowledgement returned to a message's sender
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub message_id: String,
    pub status: AckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_id: Option<i64>,
}

impl Acknowledgement {
    pub fn delivered(message_id: &str, status: AckStatus, store_id: Option<i64>) -> Self {
        Self {
            message_id: message_id.to_string(),
            status,
            error: None,
            store_id,
        }
    }

    pub fn failed(message_id: &str, error: impl Into<String>) -> Self {
        Self {
            message_id: message_id.to_string(),
            status: AckStatus::Error,
            error: Some(error.into()),
            store_id: None,
        }
    }
}

/// 错误响应 / Error response
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl From<&ValidationError> for ErrorResponse {
    fn from(err: &ValidationError) -> Self {
        Self {
            error: err.to_string(),
            code: Some(err.code().to_string()),
        }
    }
}

/// 已读回执请求（接收方发送）/ Read-receipt request sent by the receiver
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ReadReceiptRequest {
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub message_ids: Vec<serde_json::Value>,
}

impl ReadReceiptRequest {
    /// 取出可用的消息ID（字符串或整数），忽略其他类型
    /// Usable ids (strings or integers); anything else is dropped
    pub fn ids(&self) -> Vec<String> {
        self.message_ids
            .iter()
            .filter_map(|v| match v {
                serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
                serde_json::Value::Number(n) => n.as_i64().map(|id| id.to_string()),
                _ => None,
            })
            .collect()
    }
}

/// 已读回执通知（推送给原发送方）/ Read-receipt notification pushed to the original sender
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReadReceiptNotification {
    pub event_type: String,
    pub message_ids: Vec<String>,
    pub read_by: String,
}

impl ReadReceiptNotification {
    pub fn new(message_ids: Vec<String>, read_by: &str) -> Self {
        Self {
            event_type: READ_RECEIPT_EVENT.to_string(),
            message_ids,
            read_by: read_by.to_string(),
        }
    }
}

/// 入站事件：判别字段 `event_type` 决定解码形状
/// Inbound event; the `event_type` discriminator picks exactly one shape
#[derive(Clone, Debug)]
pub enum InboundEvent {
    Message(ChatMessage),
    ReadReceipt(ReadReceiptRequest),
}

impl InboundEvent {
    /// 先读判别字段，再解码为封闭集合中的一种
    /// Read the discriminator first, then decode into one closed variant
    pub fn decode(text: &str) -> Result<Self, ValidationError> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| ValidationError::InvalidFrame(e.to_string()))?;
        let discriminator = match &value {
            serde_json::Value::Object(map) => match map.get("event_type") {
                None | Some(serde_json::Value::Null) => None,
                Some(serde_json::Value::String(s)) => Some(s.clone()),
                Some(other) => {
                    return Err(ValidationError::InvalidFrame(format!(
                        "event_type must be a string, got {}",
                        other
                    )))
                }
            },
            _ => {
                return Err(ValidationError::InvalidFrame(
                    "payload must be a JSON object".to_string(),
                ))
            }
        };

        match discriminator.as_deref() {
            Some(READ_RECEIPT_EVENT) => serde_json::from_value(value)
                .map(InboundEvent::ReadReceipt)
                .map_err(|e| ValidationError::InvalidFrame(e.to_string())),
            None | Some(MESSAGE_EVENT) => serde_json::from_value(value)
                .map(InboundEvent::Message)
                .map_err(|e| ValidationError::InvalidFrame(e.to_string())),
            Some(other) => Err(ValidationError::UnknownEvent(other.to_string())),
        }
    }
}

/// 出站事件：写循环统一序列化 / Outbound event serialised by the write loop
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundEvent {
    Message(ChatMessage),
    Ack(Acknowledgement),
    Error(ErrorResponse),
    ReadReceipt(ReadReceiptNotification),
}

impl From<ChatMessage> for OutboundEvent {
    fn from(msg: ChatMessage) -> Self {
        OutboundEvent::Message(msg)
    }
}

impl From<Acknowledgement> for OutboundEvent {
    fn from(ack: Acknowledgement) -> Self {
        OutboundEvent::Ack(ack)
    }
}

impl From<ErrorResponse> for OutboundEvent {
    fn from(err: ErrorResponse) -> Self {
        OutboundEvent::Error(err)
    }
}

impl From<ReadReceiptNotification> for OutboundEvent {
    fn from(n: ReadReceiptNotification) -> Self {
        OutboundEvent::ReadReceipt(n)
    }
}

/// 在线快照 / Online snapshot
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OnlineSnapshot {
    pub online_users: Vec<String>,
    pub count: usize,
}
