//! Queue module for RabbitMQ operations.
//!
//! This module provides:
//! - Message types and the shared queue name
//! - A broker session (connection plus channel)
//! - The one-shot publisher and the auto-ack subscriber
//!
//! ## Architecture
//!
//! ```text
//! relay-publisher → my_queue → relay-subscriber
//! ```

pub mod publisher;
pub mod session;
pub mod subscriber;
pub mod types;

pub use publisher::{publish_message, publish_once, PublishReceipt};
pub use session::Session;
pub use subscriber::{
    consume_deliveries, subscribe, ConsumeSummary, LoopExit, MessageHandler, PrintHandler,
    STARTUP_NOTICE,
};
pub use types::{BytesLiteral, Incoming, Message, QueueName, DEFAULT_BODY, DEFAULT_QUEUE};
