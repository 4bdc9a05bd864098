//! Relay - minimal point-to-point messaging over RabbitMQ.
//!
//! This library provides shared modules for the two relay binaries:
//! - `relay-publisher`: declares the queue and sends one message
//! - `relay-subscriber`: declares the queue and prints every delivery
//!   until interrupted
//!
//! ## Architecture
//!
//! ```text
//! relay-publisher → broker queue (my_queue) → relay-subscriber
//! ```

pub mod config;
pub mod error;
pub mod queue;
pub mod shutdown;
pub mod telemetry;

// Re-export commonly used types
pub use config::Config;
pub use error::{HandlerFault, RelayError, Result};
pub use queue::{
    publish_once, subscribe, ConsumeSummary, LoopExit, Message, MessageHandler, PrintHandler,
    QueueName, DEFAULT_BODY, DEFAULT_QUEUE,
};
