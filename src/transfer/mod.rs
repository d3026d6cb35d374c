//! Outbound transfer submissions
//!
//! Requests are validated on the caller's side, queued on a bounded channel
//! and delivered one at a time by a single worker task, one TCP connection
//! per request.

pub mod queue;
pub mod request;

pub use queue::{TransferQueue, TransferReceipt};
pub use request::TransferRequest;

#[derive(Debug)]
pub enum TransferError {
    /// The request was rejected before queuing
    Validation(String),
    QueueFull,
    QueueClosed,
    Connect(String),
    Write(String),
}

impl std::fmt::Display for TransferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferError::Validation(msg) => write!(f, "Invalid transfer: {}", msg),
            TransferError::QueueFull => write!(f, "Transfer queue is full"),
            TransferError::QueueClosed => write!(f, "Transfer queue is closed"),
            TransferError::Connect(msg) => write!(f, "Transfer endpoint unreachable: {}", msg),
            TransferError::Write(msg) => write!(f, "Transfer write failed: {}", msg),
        }
    }
}

impl std::error::Error for TransferError {}
