// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Queue Provisioning
//!
//! This module declares queues and binds them to exchanges. Exchanges are
//! expected to exist already; only queues and their bindings are created.
//!
//! The main components are:
//! - `Topology` trait: declare a queue, bind a queue
//! - `AmqpTopology`: implementation of the Topology trait over a lapin channel
//! - `provision`: declare-then-bind on any topology
//! - `declare_and_bind`: opens a channel and provisions the queue of a binding

use crate::{
    channel::open_channel,
    configs::RabbitMQConfigs,
    errors::AmqpError,
    queue::{QueueBinding, QueueDefinition},
};
use async_trait::async_trait;
use lapin::{
    options::QueueBindOptions,
    types::FieldTable,
    Channel, Connection,
};
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;
use tracing::{debug, error};

/// Queue as reported by the broker after a declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredQueue {
    pub name: String,
    pub message_count: u32,
    pub consumer_count: u32,
}

/// Trait defining the interface for queue provisioning.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Topology: Send + Sync {
    /// Declares a queue. Redeclaring with identical parameters is a no-op on the broker.
    async fn declare_queue(&self, def: &QueueDefinition) -> Result<DeclaredQueue, AmqpError>;

    /// Binds a queue to an exchange under the binding's key.
    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), AmqpError>;
}

/// RabbitMQ implementation of the Topology trait.
pub struct AmqpTopology {
    channel: Arc<Channel>,
}

impl AmqpTopology {
    /// Creates a new AmqpTopology instance.
    ///
    /// # Parameters
    /// * `channel` - A channel to the RabbitMQ server
    pub fn new(channel: Arc<Channel>) -> AmqpTopology {
        AmqpTopology { channel }
    }
}

#[async_trait]
impl Topology for AmqpTopology {
    async fn declare_queue(&self, def: &QueueDefinition) -> Result<DeclaredQueue, AmqpError> {
        debug!("creating queue: {}", def.name);

        match self
            .channel
            .queue_declare(&def.name, def.declare_options(), def.arguments())
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), queue = def.name.as_str(), "error to declare the queue");
                Err(AmqpError::DeclareQueueError {
                    exchange: String::new(),
                    queue: def.name.clone(),
                    key: String::new(),
                    reason: err.to_string(),
                })
            }
            Ok(queue) => {
                debug!("queue: {} was created", def.name);
                Ok(DeclaredQueue {
                    name: queue.name().as_str().to_owned(),
                    message_count: queue.message_count(),
                    consumer_count: queue.consumer_count(),
                })
            }
        }
    }

    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), AmqpError> {
        debug!(
            "binding queue: {} to the exchange: {} with the key: {}",
            binding.queue_name, binding.exchange_name, binding.binding_key
        );

        match self
            .channel
            .queue_bind(
                &binding.queue_name,
                &binding.exchange_name,
                &binding.binding_key,
                QueueBindOptions { nowait: false },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error to bind queue to exchange");
                Err(AmqpError::BindingExchangeToQueueError {
                    exchange: binding.exchange_name.clone(),
                    queue: binding.queue_name.clone(),
                    key: binding.binding_key.clone(),
                    reason: err.to_string(),
                })
            }
            _ => {
                debug!("queue was bounded");
                Ok(())
            }
        }
    }
}

/// Declares the queue of `def`, then binds it as described by `binding`.
///
/// Binding only happens after a successful declaration. A failed binding
/// leaves the queue declared. Errors carry the exchange, queue and key.
pub async fn provision<T>(
    topology: &T,
    def: &QueueDefinition,
    binding: &QueueBinding,
) -> Result<DeclaredQueue, AmqpError>
where
    T: Topology + ?Sized,
{
    let declared = topology.declare_queue(def).await.map_err(|err| match err {
        AmqpError::DeclareQueueError { queue, reason, .. } => AmqpError::DeclareQueueError {
            exchange: binding.exchange_name.clone(),
            queue,
            key: binding.binding_key.clone(),
            reason,
        },
        other => other,
    })?;

    topology.bind_queue(binding).await?;

    Ok(declared)
}

/// Opens a channel on `connection` and provisions the queue of `binding`.
///
/// Flags derive from the binding's queue type and the dead-letter exchange
/// from `cfg`. The returned channel is the session the queue was declared on,
/// which transient (exclusive) queues must be consumed from.
pub async fn declare_and_bind(
    connection: &Connection,
    cfg: &RabbitMQConfigs,
    binding: &QueueBinding,
) -> Result<(Arc<Channel>, DeclaredQueue), AmqpError> {
    let channel = open_channel(connection).await?;
    let def = QueueDefinition::from_binding(binding, &cfg.dead_letter_exchange);

    let declared = provision(&AmqpTopology::new(channel.clone()), &def, binding).await?;

    Ok((channel, declared))
}
