//! Error types for the relay.
//!
//! Connection and declaration failures are fatal and bubble up to `main`.
//! Handler faults never leave the receive loop.

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Fatal errors raised while talking to the broker.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Broker unreachable, handshake refused, or channel could not be opened.
    #[error("Failed to connect to RabbitMQ: {source}")]
    Connection {
        #[source]
        source: lapin::Error,
    },

    /// Queue declaration rejected, usually a parameter conflict with an
    /// existing queue of the same name.
    #[error("Failed to declare queue '{queue}': {source}")]
    Declaration {
        queue: String,
        #[source]
        source: lapin::Error,
    },

    #[error("Failed to publish to queue '{queue}': {source}")]
    Publish {
        queue: String,
        #[source]
        source: lapin::Error,
    },

    #[error("Failed to start consumer on queue '{queue}': {source}")]
    Consume {
        queue: String,
        #[source]
        source: lapin::Error,
    },

    /// The consumer stream ended without an error while the subscriber was
    /// still running, e.g. the queue was deleted.
    #[error("Consumer on queue '{queue}' was cancelled by the broker")]
    ConsumerCancelled { queue: String },

    #[error("Invalid queue name '{name}': {reason}")]
    InvalidQueueName { name: String, reason: &'static str },
}

impl RelayError {
    pub fn connection(source: lapin::Error) -> Self {
        RelayError::Connection { source }
    }

    pub fn declaration(queue: &str, source: lapin::Error) -> Self {
        RelayError::Declaration {
            queue: queue.to_string(),
            source,
        }
    }
}

/// Failure raised inside a message handler.
///
/// Under auto-acknowledge the message is already consumed when the handler
/// runs, so a fault is only counted and logged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("handler fault: {reason}")]
pub struct HandlerFault {
    pub reason: String,
}

impl HandlerFault {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Build a fault from a caught panic payload.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let reason = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "handler panicked".to_string()
        };
        Self::new(reason)
    }
}

impl From<std::io::Error> for HandlerFault {
    fn from(err: std::io::Error) -> Self {
        HandlerFault::new(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_fault_from_str_panic() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(HandlerFault::from_panic(payload).reason, "boom");
    }

    #[test]
    fn test_handler_fault_from_string_panic() {
        let payload: Box<dyn std::any::Any + Send> = Box::new(format!("bad body {}", 7));
        assert_eq!(HandlerFault::from_panic(payload).reason, "bad body 7");
    }

    #[test]
    fn test_handler_fault_from_opaque_panic() {
        let payload: Box<dyn std::any::Any + Send> = Box::new(42_u32);
        assert_eq!(HandlerFault::from_panic(payload).reason, "handler panicked");
    }

    #[test]
    fn test_invalid_queue_name_message() {
        let err = RelayError::InvalidQueueName {
            name: String::new(),
            reason: "queue name must not be empty",
        };
        assert_eq!(
            err.to_string(),
            "Invalid queue name '': queue name must not be empty"
        );
    }
}
