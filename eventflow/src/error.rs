//! 引擎统一错误定义
//!
//! 覆盖日志存储传输、消费组、检查点回放、熔断与配置校验等最小必要集合；
//! 处理器自身的错误对引擎不透明，仅以 `Handler` 形式携带原因。
//!
use crate::event::EntryId;
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StreamError {
    // --- 日志存储 ---
    #[error("log store unavailable: {reason}")]
    StoreUnavailable { reason: String },
    #[error("stream trimmed: stream={stream}, requested={requested}, first_available={first_available}")]
    Trimmed {
        stream: String,
        requested: EntryId,
        first_available: EntryId,
    },
    #[error("consumer group create failed: stream={stream}, group={group}, reason={reason}")]
    GroupCreateFailed {
        stream: String,
        group: String,
        reason: String,
    },

    // --- 消费与回放 ---
    #[error("circuit breaker open")]
    CircuitOpen,
    #[error(
        "checkpoint expired: stream={stream}, position={position}, first_available={first_available}"
    )]
    CheckpointExpired {
        stream: String,
        position: EntryId,
        first_available: EntryId,
    },
    #[error("event handler error: handler={handler}, reason={reason}")]
    Handler { handler: String, reason: String },

    // --- 输入校验 ---
    #[error("invalid event: {reason}")]
    InvalidEvent { reason: String },
    #[error("invalid checkpoint: {reason}")]
    InvalidCheckpoint { reason: String },
    #[error("invalid config: {reason}")]
    InvalidConfig { reason: String },

    // --- 序列化 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },

    // --- 通用 ---
    #[error("service closed")]
    Closed,
}

impl StreamError {
    pub fn store_unavailable(reason: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            reason: reason.into(),
        }
    }

    pub fn invalid_event(reason: impl Into<String>) -> Self {
        Self::InvalidEvent {
            reason: reason.into(),
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// 是否为致命的传输层错误（消费循环据此终止）
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }
}

/// 统一 Result 类型别名
pub type StreamResult<T> = Result<T, StreamError>;
