// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Publisher
//!
//! This module publishes typed payloads to RabbitMQ exchanges. A payload is
//! first encoded by a [`Codec`] into an [`Envelope`]; only a successfully
//! encoded envelope ever reaches the broker. Publishing is fire-and-forget:
//! no confirmation is requested and no retry is attempted.

use crate::{
    codec::{BinaryCodec, Codec, Envelope, JsonCodec},
    errors::AmqpError,
    otel,
};
use async_trait::async_trait;
use lapin::{
    options::BasicPublishOptions,
    types::{FieldTable, ShortString},
    BasicProperties, Channel,
};
#[cfg(test)]
use mockall::automock;
use opentelemetry::Context;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

/// Sends encoded envelopes to an exchange.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish_envelope(
        &self,
        ctx: &Context,
        exchange: &str,
        routing_key: &str,
        envelope: Envelope,
    ) -> Result<(), AmqpError>;
}

/// Encodes `value` with `codec` and publishes it to `exchange` under `routing_key`.
///
/// An encoding failure returns [`AmqpError::EncodeError`] without contacting
/// the broker.
pub async fn publish<P, T, C>(
    publisher: &P,
    ctx: &Context,
    exchange: &str,
    routing_key: &str,
    value: &T,
    codec: &C,
) -> Result<(), AmqpError>
where
    P: Publisher + ?Sized,
    T: Serialize + ?Sized,
    C: Codec,
{
    let envelope = match codec.encode(value) {
        Ok(envelope) => envelope,
        Err(err) => {
            error!(
                error = err.to_string(),
                exchange, routing_key, "error encoding message"
            );
            return Err(err);
        }
    };

    publisher
        .publish_envelope(ctx, exchange, routing_key, envelope)
        .await
}

/// RabbitMQ implementation of the Publisher trait.
///
/// Messages carry their content type, a random message id and the trace
/// context of the caller in their headers.
pub struct RabbitMQPublisher {
    channel: Arc<Channel>,
}

impl RabbitMQPublisher {
    /// Creates a new RabbitMQ publisher.
    ///
    /// # Parameters
    /// * `channel` - A channel to the RabbitMQ server, owned by this publisher
    ///
    /// # Returns
    /// An Arc-wrapped RabbitMQPublisher instance for thread-safe sharing
    pub fn new(channel: Arc<Channel>) -> Arc<RabbitMQPublisher> {
        Arc::new(RabbitMQPublisher { channel })
    }

    /// Publishes `value` as JSON.
    pub async fn publish_json<T>(
        &self,
        exchange: &str,
        routing_key: &str,
        value: &T,
    ) -> Result<(), AmqpError>
    where
        T: Serialize + ?Sized + Sync,
    {
        publish(
            self,
            &Context::current(),
            exchange,
            routing_key,
            value,
            &JsonCodec::new(),
        )
        .await
    }

    /// Publishes `value` with the compact binary codec.
    pub async fn publish_binary<T>(
        &self,
        exchange: &str,
        routing_key: &str,
        value: &T,
    ) -> Result<(), AmqpError>
    where
        T: Serialize + ?Sized + Sync,
    {
        publish(
            self,
            &Context::current(),
            exchange,
            routing_key,
            value,
            &BinaryCodec::new(),
        )
        .await
    }
}

#[async_trait]
impl Publisher for RabbitMQPublisher {
    async fn publish_envelope(
        &self,
        ctx: &Context,
        exchange: &str,
        routing_key: &str,
        envelope: Envelope,
    ) -> Result<(), AmqpError> {
        let properties = message_properties(ctx, &envelope.content_type);

        match self
            .channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions {
                    immediate: false,
                    mandatory: false,
                },
                &envelope.body,
                properties,
            )
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    exchange, routing_key, "error publishing message"
                );
                Err(AmqpError::PublishingError {
                    exchange: exchange.to_owned(),
                    key: routing_key.to_owned(),
                    reason: err.to_string(),
                })
            }
            _ => {
                debug!(exchange, routing_key, "message published");
                Ok(())
            }
        }
    }
}

/// Builds the AMQP properties of an outgoing message.
fn message_properties(ctx: &Context, content_type: &str) -> BasicProperties {
    BasicProperties::default()
        .with_content_type(ShortString::from(content_type))
        .with_message_id(ShortString::from(Uuid::new_v4().to_string()))
        .with_headers(FieldTable::from(otel::inject_headers(ctx)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        codec::{BINARY_CONTENT_TYPE, JSON_CONTENT_TYPE},
        routing::{routing_key, PlayingState, ARMY_MOVES_PREFIX, EXCHANGE_PERIL_DIRECT, PAUSE_KEY},
    };
    use mockall::predicate::{always, eq};
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn encodes_then_publishes_once() {
        let mut publisher = MockPublisher::new();
        publisher
            .expect_publish_envelope()
            .with(
                always(),
                eq(EXCHANGE_PERIL_DIRECT),
                eq(PAUSE_KEY),
                eq(Envelope {
                    content_type: JSON_CONTENT_TYPE.to_owned(),
                    body: br#"{"IsPaused":true}"#.to_vec(),
                }),
            )
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        publish(
            &publisher,
            &Context::new(),
            EXCHANGE_PERIL_DIRECT,
            PAUSE_KEY,
            &PlayingState { is_paused: true },
            &JsonCodec::new(),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn encode_failure_never_reaches_broker() {
        let mut publisher = MockPublisher::new();
        publisher.expect_publish_envelope().never();

        let mut unencodable = BTreeMap::new();
        unencodable.insert(vec![1u8], "value");

        let err = publish(
            &publisher,
            &Context::new(),
            EXCHANGE_PERIL_DIRECT,
            PAUSE_KEY,
            &unencodable,
            &JsonCodec::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AmqpError::EncodeError { .. }));
    }

    #[tokio::test]
    async fn transport_failure_is_surfaced_without_retry() {
        let mut publisher = MockPublisher::new();
        publisher
            .expect_publish_envelope()
            .times(1)
            .returning(|_, exchange, key, _| {
                Err(AmqpError::PublishingError {
                    exchange: exchange.to_owned(),
                    key: key.to_owned(),
                    reason: "connection reset".to_owned(),
                })
            });

        let key = routing_key(ARMY_MOVES_PREFIX, "alice");
        let err = publish(
            &publisher,
            &Context::new(),
            "peril_topic",
            &key,
            &PlayingState { is_paused: false },
            &BinaryCodec::new(),
        )
        .await
        .unwrap_err();

        assert_eq!(
            err,
            AmqpError::PublishingError {
                exchange: "peril_topic".to_owned(),
                key: "army_moves.alice".to_owned(),
                reason: "connection reset".to_owned(),
            }
        );
    }

    #[test]
    fn properties_carry_content_type_and_message_id() {
        let props = message_properties(&Context::new(), BINARY_CONTENT_TYPE);

        assert_eq!(
            props.content_type().as_ref().map(|c| c.as_str()),
            Some(BINARY_CONTENT_TYPE)
        );
        assert!(props.message_id().is_some());
        assert!(props.headers().is_some());
    }

    #[test]
    fn message_ids_are_unique() {
        let first = message_properties(&Context::new(), JSON_CONTENT_TYPE);
        let second = message_properties(&Context::new(), JSON_CONTENT_TYPE);

        assert_ne!(first.message_id(), second.message_id());
    }
}
