use thiserror::Error;

/// 校验错误：回报给来源连接，不落库，不致命
/// Validation failures: reported to the originating connection, never persisted, never fatal
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("message content cannot be empty")]
    EmptyContent,
    #[error("message content too long (max {max} characters)")]
    ContentTooLong { max: usize },
    #[error("receiver_id is required")]
    MissingReceiver,
    #[error("cannot send messages to yourself")]
    SelfMessage,
    #[error("message_ids required for read receipt")]
    MissingMessageIds,
    #[error("peer_id is required")]
    MissingPeer,
    #[error("invalid message format")]
    InvalidFrame(String),
    #[error("unknown event_type: {0}")]
    UnknownEvent(String),
}

impl ValidationError {
    /// 机器可读错误码 / Machine readable error code
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::EmptyContent => "empty_content",
            ValidationError::ContentTooLong { .. } => "content_too_long",
            ValidationError::MissingReceiver => "missing_receiver",
            ValidationError::SelfMessage => "self_message",
            ValidationError::MissingMessageIds => "missing_message_ids",
            ValidationError::MissingPeer => "missing_peer",
            ValidationError::InvalidFrame(_) => "invalid_payload",
            ValidationError::UnknownEvent(_) => "unknown_event",
        }
    }
}

/// 存储网关错误 / Message store gateway errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("message store unavailable: {0}")]
    Unavailable(String),
    #[error("message store call timed out after {0}ms")]
    Timeout(u64),
    #[error("no user found for uuid: {0}")]
    UnknownUser(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// 注册表投递错误 / Registry send failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("user {0} is not online")]
    NotOnline(String),
    #[error("user {0} disconnected")]
    Disconnected(String),
    #[error("user {0} message queue full")]
    QueueFull(String),
}

/// 消息管道错误分类 / Messaging pipeline error taxonomy
#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("failed to persist message: {0}")]
    Persistence(#[from] StoreError),
    #[error("failed to deliver message: {0}")]
    Delivery(#[from] SendError),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("forbidden: {claimed} does not match authenticated identity {authenticated}")]
    AuthorizationMismatch {
        claimed: String,
        authenticated: String,
    },
    #[error("message store not configured")]
    StoreUnavailable,
}

pub type Result<T> = std::result::Result<T, ChatError>;
