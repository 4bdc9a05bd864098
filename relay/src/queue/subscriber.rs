//! RabbitMQ subscriber using lapin.
//!
//! This module handles connecting to RabbitMQ, registering an
//! auto-acknowledging consumer on the relay queue, and running each
//! delivery through a synchronous handler until the process is told to stop.
//!
//! Deliveries are acknowledged by the broker as they are sent, so a handler
//! that fails or panics loses its message. The fault is logged and the loop
//! carries on with the next delivery.

use std::future::Future;
use std::io::Write;
use std::panic::{catch_unwind, AssertUnwindSafe};

use futures::{Stream, StreamExt};
use lapin::{options::BasicConsumeOptions, types::FieldTable};
use tracing::{error, info, warn};

use super::session::Session;
use super::types::{BytesLiteral, Incoming, QueueName};
use crate::config::Config;
use crate::error::{HandlerFault, RelayError, Result};

/// Name the subscriber's connection shows up under in the broker UI.
pub const SUBSCRIBER_CONNECTION_NAME: &str = "relay-subscriber";

/// Printed once, right before the receive loop starts.
pub const STARTUP_NOTICE: &str = "Waiting for messages. To exit, press Ctrl+C";

/// Processes one message body.
///
/// Runs synchronously inside the receive loop; the next delivery is not
/// awaited until `handle` returns.
pub trait MessageHandler {
    fn handle(&mut self, body: &[u8]) -> std::result::Result<(), HandlerFault>;
}

impl<F> MessageHandler for F
where
    F: FnMut(&[u8]) -> std::result::Result<(), HandlerFault>,
{
    fn handle(&mut self, body: &[u8]) -> std::result::Result<(), HandlerFault> {
        self(body)
    }
}

/// Writes `Received message: b'...'` for every delivery.
pub struct PrintHandler<W> {
    out: W,
}

impl<W: Write> PrintHandler<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl PrintHandler<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> MessageHandler for PrintHandler<W> {
    fn handle(&mut self, body: &[u8]) -> std::result::Result<(), HandlerFault> {
        writeln!(self.out, "Received message: {}", BytesLiteral(body))?;
        self.out.flush()?;
        Ok(())
    }
}

/// Why the receive loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit<E = lapin::Error> {
    /// The shutdown signal fired
    Interrupted,
    /// The stream ended cleanly, e.g. the broker cancelled the consumer
    ConsumerClosed,
    /// The stream ended right after reporting this error
    ConnectionLost(E),
}

/// Counters reported when the receive loop stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumeSummary<E = lapin::Error> {
    pub delivered: u64,
    pub faulted: u64,
    pub exit: LoopExit<E>,
}

/// Run deliveries through `handler` until `shutdown` resolves or the stream
/// ends.
///
/// Handler errors and panics are contained: the message is already
/// acknowledged, so they are counted and logged, never retried. A stream
/// error is remembered until the next delivery; if the stream ends while one
/// is pending the loop exits with `LoopExit::ConnectionLost`.
pub async fn consume_deliveries<S, E, H, F>(
    deliveries: S,
    handler: &mut H,
    shutdown: F,
) -> ConsumeSummary<E>
where
    S: Stream<Item = std::result::Result<Incoming, E>>,
    E: std::fmt::Display,
    H: MessageHandler,
    F: Future<Output = ()>,
{
    tokio::pin!(deliveries);
    tokio::pin!(shutdown);

    let mut delivered = 0_u64;
    let mut faulted = 0_u64;
    let mut last_error: Option<E> = None;

    let exit = loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("subscriber_stopping");
                break LoopExit::Interrupted;
            }
            delivery = deliveries.next() => {
                match delivery {
                    Some(Ok(incoming)) => {
                        last_error = None;
                        delivered += 1;
                        info!(
                            delivery_tag = incoming.delivery_tag,
                            redelivered = incoming.redelivered,
                            body_length = incoming.body.len(),
                            "rabbitmq_message_received"
                        );

                        if let Err(fault) = run_handler(handler, &incoming.body) {
                            faulted += 1;
                            warn!(
                                delivery_tag = incoming.delivery_tag,
                                error = %fault,
                                "handler_fault_discarded"
                            );
                        }
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "rabbitmq_delivery_error");
                        last_error = Some(e);
                    }
                    None => {
                        warn!("rabbitmq_consumer_closed");
                        break match last_error.take() {
                            Some(e) => LoopExit::ConnectionLost(e),
                            None => LoopExit::ConsumerClosed,
                        };
                    }
                }
            }
        }
    };

    ConsumeSummary {
        delivered,
        faulted,
        exit,
    }
}

fn run_handler<H: MessageHandler>(
    handler: &mut H,
    body: &[u8],
) -> std::result::Result<(), HandlerFault> {
    match catch_unwind(AssertUnwindSafe(|| handler.handle(body))) {
        Ok(outcome) => outcome,
        Err(payload) => Err(HandlerFault::from_panic(payload)),
    }
}

/// Connect, declare the queue, consume with auto-acknowledge and run the
/// receive loop until `shutdown` resolves.
///
/// Only the shutdown signal ends the subscription successfully. Losing the
/// connection is a `RelayError::Connection`; a consumer the broker cancels
/// is a `RelayError::ConsumerCancelled`.
///
/// `on_ready` runs once the consumer is registered, right before the loop
/// starts; the binary prints its startup notice there.
pub async fn subscribe<H, F, R>(
    config: &Config,
    handler: &mut H,
    on_ready: R,
    shutdown: F,
) -> Result<ConsumeSummary>
where
    H: MessageHandler,
    F: Future<Output = ()>,
    R: FnOnce(),
{
    let queue = QueueName::parse(&config.queue_name)?;

    let session = Session::open(&config.amqp_url, SUBSCRIBER_CONNECTION_NAME).await?;
    let result = consume_on(
        &session,
        &queue,
        &config.consumer_tag,
        handler,
        on_ready,
        shutdown,
    )
    .await;
    session.close().await;

    let summary = result?;
    info!(
        delivered = summary.delivered,
        faulted = summary.faulted,
        "subscriber_shutdown_complete"
    );
    Ok(summary)
}

/// Turn a finished receive loop into the subscription's outcome.
fn settle(summary: ConsumeSummary, queue: &QueueName) -> Result<ConsumeSummary> {
    let ConsumeSummary {
        delivered,
        faulted,
        exit,
    } = summary;

    match exit {
        LoopExit::Interrupted => Ok(ConsumeSummary {
            delivered,
            faulted,
            exit: LoopExit::Interrupted,
        }),
        LoopExit::ConnectionLost(source) => {
            error!(delivered, faulted, error = %source, "subscriber_connection_lost");
            Err(RelayError::connection(source))
        }
        LoopExit::ConsumerClosed => {
            error!(delivered, faulted, queue = %queue, "subscriber_consumer_cancelled");
            Err(RelayError::ConsumerCancelled {
                queue: queue.to_string(),
            })
        }
    }
}

async fn consume_on<H, F, R>(
    session: &Session,
    queue: &QueueName,
    consumer_tag: &str,
    handler: &mut H,
    on_ready: R,
    shutdown: F,
) -> Result<ConsumeSummary>
where
    H: MessageHandler,
    F: Future<Output = ()>,
    R: FnOnce(),
{
    session.declare_queue(queue).await?;

    let consumer = session
        .channel()
        .basic_consume(
            queue.as_str(),
            consumer_tag,
            BasicConsumeOptions {
                no_ack: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|source| RelayError::Consume {
            queue: queue.to_string(),
            source,
        })?;

    info!(queue = %queue, consumer_tag, no_ack = true, "rabbitmq_consumer_started");

    on_ready();

    let deliveries = consumer.map(|delivery| delivery.map(Incoming::from));
    let summary = consume_deliveries(deliveries, handler, shutdown).await;
    settle(summary, queue)
}
