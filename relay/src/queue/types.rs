//! Message types shared by the publisher and the subscriber.
//!
//! This module defines:
//! - `QueueName`: a validated queue name
//! - `Message`: what the publisher sends
//! - `Incoming`: what the subscriber's receive loop hands to a handler
//! - `BytesLiteral`: console rendering of a message body

use std::fmt;

use lapin::message::Delivery;

use crate::error::{RelayError, Result};

/// Queue used when nothing else is configured.
pub const DEFAULT_QUEUE: &str = "my_queue";

/// Body sent by the publisher when nothing else is configured.
pub const DEFAULT_BODY: &str = "Hello, RabbitMQ!";

/// AMQP short strings carry a one-byte length prefix.
const MAX_QUEUE_NAME_LEN: usize = 255;

/// A queue name both sides can agree on.
///
/// Delivery only happens when publisher and subscriber use byte-identical
/// names, so the name is kept verbatim (no trimming, no case folding).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueName(String);

impl QueueName {
    pub fn parse(name: &str) -> Result<Self> {
        if name.is_empty() {
            // An empty name asks the broker for a generated one.
            return Err(RelayError::InvalidQueueName {
                name: name.to_string(),
                reason: "queue name must not be empty",
            });
        }
        if name.len() > MAX_QUEUE_NAME_LEN {
            return Err(RelayError::InvalidQueueName {
                name: name.to_string(),
                reason: "queue name longer than 255 bytes",
            });
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message bound for a queue via the default exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Opaque payload
    pub body: Vec<u8>,
    /// Routing key; the default exchange routes by queue name
    pub routing_key: String,
    /// Queue declared before publishing
    pub queue_name: QueueName,
}

impl Message {
    /// Create a message addressed to `queue` through the default exchange.
    pub fn new(queue: QueueName, body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            routing_key: queue.as_str().to_string(),
            queue_name: queue,
        }
    }
}

/// A delivery as seen by the receive loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incoming {
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub body: Vec<u8>,
}

impl Incoming {
    #[cfg(test)]
    pub(crate) fn new(delivery_tag: u64, body: impl Into<Vec<u8>>) -> Self {
        Self {
            delivery_tag,
            redelivered: false,
            body: body.into(),
        }
    }
}

impl From<Delivery> for Incoming {
    fn from(delivery: Delivery) -> Self {
        Self {
            delivery_tag: delivery.delivery_tag,
            redelivered: delivery.redelivered,
            body: delivery.data,
        }
    }
}

/// Renders bytes as a byte-string literal, e.g. `b'Hello, RabbitMQ!'`.
///
/// Printable ASCII is kept as is, `\\` `\n` `\r` `\t` are escaped and any
/// other byte becomes `\xNN`. Single quotes delimit the literal unless the
/// body contains `'` but no `"`.
pub struct BytesLiteral<'a>(pub &'a [u8]);

impl fmt::Display for BytesLiteral<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let quote = if self.0.contains(&b'\'') && !self.0.contains(&b'"') {
            b'"'
        } else {
            b'\''
        };

        write!(f, "b{}", quote as char)?;
        for &byte in self.0 {
            match byte {
                b'\\' => f.write_str("\\\\")?,
                b'\n' => f.write_str("\\n")?,
                b'\r' => f.write_str("\\r")?,
                b'\t' => f.write_str("\\t")?,
                b if b == quote => write!(f, "\\{}", b as char)?,
                0x20..=0x7e => write!(f, "{}", byte as char)?,
                _ => write!(f, "\\x{:02x}", byte)?,
            }
        }
        write!(f, "{}", quote as char)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_name_accepts_default() {
        let queue = QueueName::parse(DEFAULT_QUEUE).unwrap();
        assert_eq!(queue.as_str(), "my_queue");
    }

    #[test]
    fn test_queue_name_rejects_empty() {
        assert!(matches!(
            QueueName::parse(""),
            Err(RelayError::InvalidQueueName { .. })
        ));
    }

    #[test]
    fn test_queue_name_length_limit() {
        assert!(QueueName::parse(&"q".repeat(255)).is_ok());
        assert!(QueueName::parse(&"q".repeat(256)).is_err());
    }

    #[test]
    fn test_queue_name_kept_verbatim() {
        let queue = QueueName::parse(" My_Queue ").unwrap();
        assert_ne!(queue, QueueName::parse("my_queue").unwrap());
    }

    #[test]
    fn test_message_routes_by_queue_name() {
        let message = Message::new(QueueName::parse("my_queue").unwrap(), DEFAULT_BODY);
        assert_eq!(message.routing_key, "my_queue");
        assert_eq!(message.body, b"Hello, RabbitMQ!".to_vec());
    }

    #[test]
    fn test_bytes_literal_plain() {
        assert_eq!(
            BytesLiteral(b"Hello, RabbitMQ!").to_string(),
            "b'Hello, RabbitMQ!'"
        );
    }

    #[test]
    fn test_bytes_literal_escapes() {
        assert_eq!(
            BytesLiteral(b"a\\b\n\t\r\x00\xff").to_string(),
            "b'a\\\\b\\n\\t\\r\\x00\\xff'"
        );
    }

    #[test]
    fn test_bytes_literal_quote_selection() {
        assert_eq!(BytesLiteral(b"it's").to_string(), "b\"it's\"");
        assert_eq!(
            BytesLiteral(b"it's \"quoted\"").to_string(),
            "b'it\\'s \"quoted\"'"
        );
    }

    #[test]
    fn test_bytes_literal_utf8_is_escaped() {
        assert_eq!(BytesLiteral("é".as_bytes()).to_string(), "b'\\xc3\\xa9'");
    }

    #[test]
    fn test_bytes_literal_empty() {
        assert_eq!(BytesLiteral(b"").to_string(), "b''");
    }
}
