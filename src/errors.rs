// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Publish/Subscribe Layer
//!
//! This module provides the error type shared by every operation of the crate.
//! Setup-time variants (connection, channel, declare, bind, qos, consumer) are
//! returned to the caller of `subscribe`/`publish`. Per-delivery variants
//! (decode, ack, nack, handler fault) are produced inside the dispatch loop,
//! logged, and resolved locally through the acknowledgment table.

use thiserror::Error;

/// Represents errors that can occur during AMQP/RabbitMQ operations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// Error establishing a connection to the RabbitMQ server
    #[error("failure to connect: {0}")]
    ConnectionError(String),

    /// Error creating a channel from an established connection
    #[error("failure to create a channel: {0}")]
    ChannelError(String),

    /// Error declaring a queue
    #[error("failure to declare queue `{queue}` for exchange `{exchange}` with key `{key}`: {reason}")]
    DeclareQueueError {
        exchange: String,
        queue: String,
        key: String,
        reason: String,
    },

    /// Error binding a queue to an exchange
    #[error("failure to bind queue `{queue}` to exchange `{exchange}` with key `{key}`: {reason}")]
    BindingExchangeToQueueError {
        exchange: String,
        queue: String,
        key: String,
        reason: String,
    },

    /// Error configuring Quality of Service parameters
    #[error("failure to configure qos `{0}`")]
    QoSDeclarationError(String),

    /// Error starting a consumer on a queue
    #[error("failure to declare consumer on queue `{0}`")]
    ConsumerDeclarationError(String),

    /// Error serializing a payload, raised before any broker call
    #[error("failure to encode payload as `{content_type}`: {reason}")]
    EncodeError {
        content_type: String,
        reason: String,
    },

    /// Error publishing a message
    #[error("failure to publish to exchange `{exchange}` with key `{key}`: {reason}")]
    PublishingError {
        exchange: String,
        key: String,
        reason: String,
    },

    /// Error decoding a payload, or a content type the codec refuses
    #[error("failure to decode payload as `{content_type}`: {reason}")]
    DecodeError {
        content_type: String,
        reason: String,
    },

    /// Error acknowledging a message
    #[error("failure to ack message: {0}")]
    AckMessageError(String),

    /// Error negative-acknowledging a message
    #[error("failure to nack message: {0}")]
    NackMessageError(String),

    /// A handler failed without producing an acknowledgment decision
    #[error("handler fault: {0}")]
    UnresolvedHandlerFault(String),

    /// The dispatch task of a subscription could not be joined
    #[error("dispatch task failure: {0}")]
    DispatchTaskError(String),
}
