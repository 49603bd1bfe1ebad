// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Definitions for RabbitMQ
//!
//! This module provides the types describing a queue and its binding. The
//! durability, auto-delete and exclusivity flags of a queue are derived from
//! its [`QueueType`], and every queue carries a dead-letter exchange argument
//! so that discarded deliveries are redirected instead of dropped.

use lapin::{
    options::QueueDeclareOptions,
    types::{AMQPValue, FieldTable, LongInt, LongString, ShortString},
};
use std::collections::BTreeMap;

/// Constant for the argument used to specify a dead letter exchange
pub const AMQP_HEADERS_DEAD_LETTER_EXCHANGE: &str = "x-dead-letter-exchange";
/// Constant for the argument used to specify message TTL
pub const AMQP_HEADERS_MESSAGE_TTL: &str = "x-message-ttl";
/// Constant for the argument used to specify maximum queue length
pub const AMQP_HEADERS_MAX_LENGTH: &str = "x-max-length";
/// Constant for the argument used to specify maximum queue size in bytes
pub const AMQP_HEADERS_MAX_LENGTH_BYTES: &str = "x-max-length-bytes";

/// Lifetime policy of a queue.
///
/// - Transient: auto-deleted on disconnect, exclusive to the declaring
///   connection, lost on broker restart
/// - Durable: survives broker restarts, never auto-deleted, shareable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum QueueType {
    #[default]
    Transient,
    Durable,
}

/// Definition of a RabbitMQ queue with its configuration parameters.
///
/// This struct implements the builder pattern to create and configure queue definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueDefinition {
    pub(crate) name: String,
    pub(crate) durable: bool,
    pub(crate) delete: bool,
    pub(crate) exclusive: bool,
    pub(crate) ttl: Option<i32>,
    pub(crate) max_length: Option<i32>,
    pub(crate) max_length_bytes: Option<i32>,
    pub(crate) dead_letter_exchange: Option<String>,
}

impl QueueDefinition {
    /// Creates a new transient queue definition with the given name.
    ///
    /// # Parameters
    /// * `name` - The name of the queue
    pub fn new(name: &str) -> QueueDefinition {
        QueueDefinition {
            name: name.to_owned(),
            ..Default::default()
        }
        .queue_type(QueueType::Transient)
    }

    /// Creates the definition matching a binding, with the given dead-letter exchange.
    pub fn from_binding(binding: &QueueBinding, dead_letter_exchange: &str) -> QueueDefinition {
        QueueDefinition::new(&binding.queue_name)
            .queue_type(binding.queue_type)
            .dead_letter_exchange(dead_letter_exchange)
    }

    /// Derives the durability, auto-delete and exclusivity flags from `kind`.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn queue_type(mut self, kind: QueueType) -> Self {
        self.durable = kind == QueueType::Durable;
        self.delete = kind == QueueType::Transient;
        self.exclusive = kind == QueueType::Transient;
        self
    }

    /// Routes rejected, expired and overflowed messages to `exchange`.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn dead_letter_exchange(mut self, exchange: &str) -> Self {
        self.dead_letter_exchange = Some(exchange.to_owned());
        self
    }

    /// Sets the message Time-To-Live (TTL) for the queue.
    ///
    /// Expired messages are dead-lettered.
    ///
    /// # Parameters
    /// * `ttl` - TTL in milliseconds
    ///
    /// # Returns
    /// Self for method chaining
    pub fn ttl(mut self, ttl: i32) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Sets the maximum number of messages the queue can hold.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn max_length(mut self, max: i32) -> Self {
        self.max_length = Some(max);
        self
    }

    /// Sets the maximum size in bytes the queue can hold.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn max_length_bytes(mut self, max_bytes: i32) -> Self {
        self.max_length_bytes = Some(max_bytes);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Flags sent with the queue declaration.
    ///
    /// Declarations are never passive, so a missing queue is created, and
    /// always wait for the broker's reply, which carries the resolved name.
    pub fn declare_options(&self) -> QueueDeclareOptions {
        QueueDeclareOptions {
            passive: false,
            durable: self.durable,
            exclusive: self.exclusive,
            auto_delete: self.delete,
            nowait: false,
        }
    }

    /// Builds the `x-*` arguments sent with the queue declaration.
    pub fn arguments(&self) -> FieldTable {
        let mut args = BTreeMap::new();

        if let Some(dlx) = &self.dead_letter_exchange {
            args.insert(
                ShortString::from(AMQP_HEADERS_DEAD_LETTER_EXCHANGE),
                AMQPValue::LongString(LongString::from(dlx.as_str())),
            );
        }

        if let Some(ttl) = self.ttl {
            args.insert(
                ShortString::from(AMQP_HEADERS_MESSAGE_TTL),
                AMQPValue::LongInt(LongInt::from(ttl)),
            );
        }

        if let Some(max) = self.max_length {
            args.insert(
                ShortString::from(AMQP_HEADERS_MAX_LENGTH),
                AMQPValue::LongInt(LongInt::from(max)),
            );
        }

        if let Some(max_bytes) = self.max_length_bytes {
            args.insert(
                ShortString::from(AMQP_HEADERS_MAX_LENGTH_BYTES),
                AMQPValue::LongInt(LongInt::from(max_bytes)),
            );
        }

        FieldTable::from(args)
    }
}

/// One queue attached to one exchange under one binding key.
///
/// Built once per subscription and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    pub(crate) exchange_name: String,
    pub(crate) queue_name: String,
    pub(crate) binding_key: String,
    pub(crate) queue_type: QueueType,
}

impl QueueBinding {
    /// Creates a new transient queue binding for the given queue.
    ///
    /// By default, the exchange name and binding key are empty strings.
    /// These should be set using the `exchange` and `binding_key` methods.
    pub fn new(queue: &str) -> QueueBinding {
        QueueBinding {
            exchange_name: String::new(),
            queue_name: queue.to_owned(),
            binding_key: String::new(),
            queue_type: QueueType::Transient,
        }
    }

    /// Sets the exchange to bind the queue to.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn exchange(mut self, exchange: &str) -> Self {
        self.exchange_name = exchange.to_owned();
        self
    }

    /// Sets the binding key, which may hold `*`/`#` wildcards on topic exchanges.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn binding_key(mut self, key: &str) -> Self {
        self.binding_key = key.to_owned();
        self
    }

    /// Sets the lifetime policy of the bound queue.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn queue_type(mut self, kind: QueueType) -> Self {
        self.queue_type = kind;
        self
    }

    pub fn exchange_name(&self) -> &str {
        &self.exchange_name
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn key(&self) -> &str {
        &self.binding_key
    }

    pub fn kind(&self) -> QueueType {
        self.queue_type
    }
}
