//! Idempotency-receipt client channel: a per-server long-lived connection
//! that reports which request ids a client has durably received, batched
//! and retried so a reconnect never loses or duplicates a report.

pub mod channel;
pub mod config;
pub mod error;
pub mod lru;
pub mod protocol;
pub mod task;

pub use channel::ReceiptChannel;
pub use config::ReceiptConfig;
pub use error::ReceiptError;
pub use lru::ReceiptThreadCtx;
pub use task::{ConnectionTask, TaskStage};
