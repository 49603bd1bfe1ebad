// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Dispatcher
//!
//! This module subscribes typed handlers to RabbitMQ queues. Each call to
//! [`RabbitMQDispatcher::subscribe`] provisions its queue on a dedicated
//! channel, starts a manual-ack consumer, and spawns one task that feeds the
//! deliveries to the handler. The call returns as soon as the task runs.
//!
//! Subscriptions proceed in parallel with each other, while deliveries of a
//! single subscription are handled strictly in order.

use crate::{
    codec::{BinaryCodec, Codec, JsonCodec},
    configs::RabbitMQConfigs,
    consumer::{run_dispatch_loop, Incoming},
    errors::AmqpError,
    handler::ConsumerHandler,
    queue::QueueBinding,
    topology::{declare_and_bind, DeclaredQueue},
};
use async_trait::async_trait;
use futures_util::{stream::BoxStream, StreamExt};
use lapin::{
    acker::Acker,
    options::{BasicConsumeOptions, BasicQosOptions},
    types::FieldTable,
    Channel, Connection,
};
#[cfg(test)]
use mockall::automock;
use serde::de::DeserializeOwned;
use std::{future::Future, sync::Arc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use uuid::Uuid;

pub use crate::consumer::DispatchStats;

/// Bound on unacknowledged deliveries held by one subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Prefetch {
    /// Whatever the subscription's codec asks for
    #[default]
    CodecDefault,
    Bounded(u16),
    Unbounded,
}

/// Per-subscription consumption settings.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionOptions {
    prefetch: Prefetch,
    pub(crate) consumer_tag: Option<String>,
    pub(crate) cancellation: Option<CancellationToken>,
}

impl SubscriptionOptions {
    /// Options deferring the prefetch to the codec of the subscription.
    ///
    /// Nothing is bound to a codec here: the default is looked up when the
    /// subscription starts, so a binary subscription is bounded to
    /// [`crate::codec::BINARY_DEFAULT_PREFETCH`] unless told otherwise.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds the number of unacknowledged deliveries held at once.
    ///
    /// `0` is raised to `1`: the broker reads a zero prefetch as unlimited,
    /// use [`SubscriptionOptions::unbounded`] for that.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn prefetch(mut self, count: u16) -> Self {
        self.prefetch = Prefetch::Bounded(count.max(1));
        self
    }

    /// Leaves the prefetch to the broker's default.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn unbounded(mut self) -> Self {
        self.prefetch = Prefetch::Unbounded;
        self
    }

    /// Sets the consumer tag, generated from the queue name otherwise.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn consumer_tag(mut self, tag: &str) -> Self {
        self.consumer_tag = Some(tag.to_owned());
        self
    }

    /// Stops the subscription when `token` is cancelled.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// The prefetch applied when subscribing with `codec`, `None` meaning unbounded.
    pub fn resolve_prefetch<C>(&self, codec: &C) -> Option<u16>
    where
        C: Codec,
    {
        match self.prefetch {
            Prefetch::CodecDefault => codec.default_prefetch(),
            Prefetch::Bounded(count) => Some(count),
            Prefetch::Unbounded => None,
        }
    }
}

/// Deliveries of a started consumer.
pub(crate) type Deliveries = BoxStream<'static, Result<Incoming<Acker>, lapin::Error>>;

/// The consumer-side calls made on the channel of a subscription.
#[cfg_attr(test, automock)]
#[async_trait]
pub(crate) trait ConsumerSession: Send + Sync {
    async fn set_prefetch(&self, prefetch: u16) -> Result<(), AmqpError>;

    async fn start_consuming(
        &self,
        queue: &str,
        consumer_tag: &str,
        options: BasicConsumeOptions,
    ) -> Result<Deliveries, AmqpError>;
}

/// ConsumerSession over a lapin channel.
pub(crate) struct AmqpConsumerSession {
    channel: Arc<Channel>,
}

impl AmqpConsumerSession {
    pub(crate) fn new(channel: Arc<Channel>) -> Self {
        AmqpConsumerSession { channel }
    }
}

#[async_trait]
impl ConsumerSession for AmqpConsumerSession {
    async fn set_prefetch(&self, prefetch: u16) -> Result<(), AmqpError> {
        match self
            .channel
            .basic_qos(prefetch, BasicQosOptions { global: false })
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), prefetch, "failure to configure qos");
                Err(AmqpError::QoSDeclarationError(err.to_string()))
            }
            Ok(_) => Ok(()),
        }
    }

    async fn start_consuming(
        &self,
        queue: &str,
        consumer_tag: &str,
        options: BasicConsumeOptions,
    ) -> Result<Deliveries, AmqpError> {
        match self
            .channel
            .basic_consume(queue, consumer_tag, options, FieldTable::default())
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), queue, "error to create the consumer");
                Err(AmqpError::ConsumerDeclarationError(queue.to_owned()))
            }
            Ok(consumer) => Ok(consumer.map(|result| result.map(Incoming::from)).boxed()),
        }
    }
}

/// Applies the prefetch of `options`, if any, then starts a manual-ack consumer on `queue`.
///
/// # Returns
/// The consumer tag and the delivery stream
pub(crate) async fn start_consumer<S, C>(
    session: &S,
    queue: &str,
    codec: &C,
    options: &SubscriptionOptions,
) -> Result<(String, Deliveries), AmqpError>
where
    S: ConsumerSession + ?Sized,
    C: Codec,
{
    let prefetch = options.resolve_prefetch(codec);
    if let Some(prefetch) = prefetch {
        session.set_prefetch(prefetch).await?;
    }

    let consumer_tag = options
        .consumer_tag
        .clone()
        .unwrap_or_else(|| format!("{}-{}", queue, Uuid::new_v4()));

    let deliveries = session
        .start_consuming(
            queue,
            &consumer_tag,
            BasicConsumeOptions {
                no_local: false,
                no_ack: false,
                exclusive: false,
                nowait: false,
            },
        )
        .await?;

    debug!(
        queue,
        consumer_tag = consumer_tag.as_str(),
        prefetch = ?prefetch,
        "subscription started"
    );

    Ok((consumer_tag, deliveries))
}

/// A running subscription.
///
/// Dropping it leaves the dispatch task running; use [`Subscription::cancel`]
/// or [`Subscription::shutdown`] to stop it.
#[derive(Debug)]
pub struct Subscription {
    binding: QueueBinding,
    queue: DeclaredQueue,
    consumer_tag: String,
    token: CancellationToken,
    handle: JoinHandle<DispatchStats>,
}

impl Subscription {
    pub(crate) fn spawn<F>(
        binding: QueueBinding,
        queue: DeclaredQueue,
        consumer_tag: String,
        token: CancellationToken,
        task: F,
    ) -> Subscription
    where
        F: Future<Output = DispatchStats> + Send + 'static,
    {
        Subscription {
            binding,
            queue,
            consumer_tag,
            token,
            handle: tokio::spawn(task),
        }
    }

    pub fn binding(&self) -> &QueueBinding {
        &self.binding
    }

    pub fn queue(&self) -> &DeclaredQueue {
        &self.queue
    }

    pub fn consumer_tag(&self) -> &str {
        &self.consumer_tag
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Asks the dispatch task to stop after the delivery in progress.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the dispatch task to end, either because the broker session
    /// closed or because the subscription was cancelled.
    pub async fn join(self) -> Result<DispatchStats, AmqpError> {
        let Subscription { queue, handle, .. } = self;

        handle.await.map_err(|err| {
            error!(error = err.to_string(), queue = queue.name.as_str(), "dispatch task failure");
            AmqpError::DispatchTaskError(err.to_string())
        })
    }

    /// Cancels the subscription and waits for its task to end.
    pub async fn shutdown(self) -> Result<DispatchStats, AmqpError> {
        self.cancel();
        self.join().await
    }
}

/// Subscribes handlers to queues over a shared connection.
pub struct RabbitMQDispatcher {
    connection: Arc<Connection>,
    configs: RabbitMQConfigs,
}

impl RabbitMQDispatcher {
    /// Creates a new RabbitMQ dispatcher.
    ///
    /// # Parameters
    /// * `connection` - The connection every subscription opens its channel on
    /// * `configs` - Broker settings, including the dead-letter exchange
    pub fn new(connection: Arc<Connection>, configs: RabbitMQConfigs) -> Self {
        RabbitMQDispatcher {
            connection,
            configs,
        }
    }

    /// Provisions the queue of `binding` and starts delivering its messages to `handler`.
    ///
    /// Setup failures (channel, declare, bind, qos, consumer) are returned and
    /// no task is started. Once running, per-delivery failures are resolved
    /// inside the task and never surface here.
    pub async fn subscribe<T, C, H>(
        &self,
        binding: QueueBinding,
        codec: C,
        handler: H,
        options: SubscriptionOptions,
    ) -> Result<Subscription, AmqpError>
    where
        T: DeserializeOwned + Send + 'static,
        C: Codec,
        H: ConsumerHandler<T> + 'static,
    {
        let (channel, queue) = declare_and_bind(&self.connection, &self.configs, &binding).await?;

        let session = AmqpConsumerSession::new(channel.clone());
        let (consumer_tag, deliveries) = start_consumer(&session, &queue.name, &codec, &options).await?;

        let token = options.cancellation.unwrap_or_default();
        let task_token = token.clone();
        let queue_name = queue.name.clone();

        let task = async move {
            let stats =
                run_dispatch_loop::<_, _, _, T, C, H>(&queue_name, deliveries, &codec, &handler, &task_token)
                    .await;

            if let Err(err) = channel.close(200, "subscription closed").await {
                debug!(error = err.to_string(), queue = queue_name.as_str(), "error closing channel");
            }

            stats
        };

        Ok(Subscription::spawn(binding, queue, consumer_tag, token, task))
    }

    /// Subscribes with the JSON codec and its default options.
    pub async fn subscribe_json<T, H>(
        &self,
        binding: QueueBinding,
        handler: H,
    ) -> Result<Subscription, AmqpError>
    where
        T: DeserializeOwned + Send + 'static,
        H: ConsumerHandler<T> + 'static,
    {
        self.subscribe(binding, JsonCodec::new(), handler, SubscriptionOptions::new())
            .await
    }

    /// Subscribes with the binary codec and its default options.
    pub async fn subscribe_binary<T, H>(
        &self,
        binding: QueueBinding,
        handler: H,
    ) -> Result<Subscription, AmqpError>
    where
        T: DeserializeOwned + Send + 'static,
        H: ConsumerHandler<T> + 'static,
    {
        self.subscribe(binding, BinaryCodec::new(), handler, SubscriptionOptions::new())
            .await
    }
}
