//! Broker session: one connection plus one channel, closed together.
//!
//! The connection is a process-scoped resource: callers open a session,
//! run their operation, and call `close` before propagating the operation's
//! result, so the connection is released on every exit path.

use lapin::{
    options::QueueDeclareOptions, types::FieldTable, Channel, Connection, ConnectionProperties,
    Queue,
};
use tracing::{info, warn};

use super::types::QueueName;
use crate::error::{RelayError, Result};

/// Reply code for a normal AMQP close.
const REPLY_SUCCESS: u16 = 200;

/// An open connection and its channel.
pub struct Session {
    connection: Connection,
    channel: Channel,
}

impl Session {
    /// Connect to the broker and open a channel.
    ///
    /// Any failure here is a connection failure: nothing has been declared
    /// or sent yet.
    pub async fn open(url: &str, connection_name: &str) -> Result<Self> {
        info!(url_length = url.len(), connection_name, "rabbitmq_connecting");

        let properties =
            ConnectionProperties::default().with_connection_name(connection_name.into());
        let connection = Connection::connect(url, properties)
            .await
            .map_err(RelayError::connection)?;

        info!("rabbitmq_connected");

        let channel = match connection.create_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                close_connection(&connection).await;
                return Err(RelayError::connection(e));
            }
        };

        info!("rabbitmq_channel_created");

        Ok(Self {
            connection,
            channel,
        })
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Declare `queue` with default options: non-durable, shared, not
    /// auto-deleted.
    ///
    /// Declaring an existing queue with the same options is a no-op.
    /// Declaring it with different options fails and the broker closes the
    /// channel.
    pub async fn declare_queue(&self, queue: &QueueName) -> Result<Queue> {
        let declared = self
            .channel
            .queue_declare(
                queue.as_str(),
                QueueDeclareOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| RelayError::declaration(queue.as_str(), e))?;

        info!(
            queue = %queue,
            message_count = declared.message_count(),
            consumer_count = declared.consumer_count(),
            "rabbitmq_queue_declared"
        );

        Ok(declared)
    }

    /// Close channel then connection. Close errors are logged, not returned:
    /// by this point the caller's outcome is already decided.
    pub async fn close(self) {
        if self.channel.status().connected() {
            if let Err(e) = self.channel.close(REPLY_SUCCESS, "Normal shutdown").await {
                warn!(error = %e, "rabbitmq_channel_close_error");
            }
        }

        close_connection(&self.connection).await;

        info!("rabbitmq_session_closed");
    }
}

async fn close_connection(connection: &Connection) {
    if connection.status().connected() {
        if let Err(e) = connection.close(REPLY_SUCCESS, "Normal shutdown").await {
            warn!(error = %e, "rabbitmq_connection_close_error");
        }
    }
}
