// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Acknowledgment Policy
//!
//! Handlers express the outcome of a delivery as an [`AckDecision`]. The
//! dispatcher maps it to the broker primitive through [`BrokerAck`] and issues
//! the call on the delivery's [`Acknowledger`]. Resolving consumes the
//! decision, so a delivery cannot be acknowledged twice.

use crate::errors::AmqpError;
use async_trait::async_trait;
use lapin::{
    acker::Acker,
    options::{BasicAckOptions, BasicNackOptions},
};
#[cfg(test)]
use mockall::automock;

/// Outcome of handling one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDecision {
    /// The delivery is permanently removed from the queue.
    Accept,
    /// The delivery is returned to the queue for redelivery.
    RequeueReject,
    /// The delivery is removed and routed to the dead-letter exchange.
    DiscardReject,
}

/// Broker acknowledgment primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerAck {
    Ack,
    Nack { requeue: bool },
}

impl From<AckDecision> for BrokerAck {
    fn from(decision: AckDecision) -> Self {
        match decision {
            AckDecision::Accept => BrokerAck::Ack,
            AckDecision::RequeueReject => BrokerAck::Nack { requeue: true },
            AckDecision::DiscardReject => BrokerAck::Nack { requeue: false },
        }
    }
}

/// Issues acknowledgment primitives for a single delivery.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn basic_ack(&self) -> Result<(), AmqpError>;

    async fn basic_nack(&self, requeue: bool) -> Result<(), AmqpError>;
}

#[async_trait]
impl Acknowledger for Acker {
    async fn basic_ack(&self) -> Result<(), AmqpError> {
        self.ack(BasicAckOptions { multiple: false })
            .await
            .map(|_| ())
            .map_err(|err| AmqpError::AckMessageError(err.to_string()))
    }

    async fn basic_nack(&self, requeue: bool) -> Result<(), AmqpError> {
        self.nack(BasicNackOptions {
            multiple: false,
            requeue,
        })
        .await
        .map(|_| ())
        .map_err(|err| AmqpError::NackMessageError(err.to_string()))
    }
}

impl AckDecision {
    /// Issues exactly one broker call for this decision on `acker`.
    pub async fn resolve<A>(self, acker: &A) -> Result<(), AmqpError>
    where
        A: Acknowledger + ?Sized,
    {
        match BrokerAck::from(self) {
            BrokerAck::Ack => acker.basic_ack().await,
            BrokerAck::Nack { requeue } => acker.basic_nack(requeue).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    #[test]
    fn decisions_map_to_broker_primitives() {
        assert_eq!(BrokerAck::from(AckDecision::Accept), BrokerAck::Ack);
        assert_eq!(
            BrokerAck::from(AckDecision::RequeueReject),
            BrokerAck::Nack { requeue: true }
        );
        assert_eq!(
            BrokerAck::from(AckDecision::DiscardReject),
            BrokerAck::Nack { requeue: false }
        );
    }

    #[tokio::test]
    async fn accept_acks_once() {
        let mut acker = MockAcknowledger::new();
        acker.expect_basic_ack().times(1).returning(|| Ok(()));
        acker.expect_basic_nack().never();

        AckDecision::Accept.resolve(&acker).await.unwrap();
    }

    #[tokio::test]
    async fn requeue_reject_nacks_with_requeue_once() {
        let mut acker = MockAcknowledger::new();
        acker.expect_basic_ack().never();
        acker
            .expect_basic_nack()
            .with(eq(true))
            .times(1)
            .returning(|_| Ok(()));

        AckDecision::RequeueReject.resolve(&acker).await.unwrap();
    }

    #[tokio::test]
    async fn discard_reject_nacks_without_requeue_once() {
        let mut acker = MockAcknowledger::new();
        acker.expect_basic_ack().never();
        acker
            .expect_basic_nack()
            .with(eq(false))
            .times(1)
            .returning(|_| Ok(()));

        AckDecision::DiscardReject.resolve(&acker).await.unwrap();
    }

    #[tokio::test]
    async fn broker_failure_is_surfaced() {
        let mut acker = MockAcknowledger::new();
        acker
            .expect_basic_ack()
            .times(1)
            .returning(|| Err(AmqpError::AckMessageError("channel closed".to_owned())));

        let err = AckDecision::Accept.resolve(&acker).await.unwrap_err();
        assert_eq!(err, AmqpError::AckMessageError("channel closed".to_owned()));
    }
}
