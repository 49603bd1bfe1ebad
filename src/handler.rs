// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Consumer Handlers
//!
//! Application code receives decoded payloads through [`ConsumerHandler`] and
//! answers with an [`AckDecision`]; it never sees broker primitives.

use crate::ack::AckDecision;
use async_trait::async_trait;
use opentelemetry::Context;

/// Handles one decoded payload of type `T`.
///
/// `ctx` carries the trace context propagated by the publisher, when present.
#[async_trait]
pub trait ConsumerHandler<T>: Send + Sync
where
    T: Send + 'static,
{
    async fn exec(&self, ctx: &Context, msg: T) -> AckDecision;
}

/// Any synchronous `Fn(T) -> AckDecision` is a handler.
#[async_trait]
impl<T, F> ConsumerHandler<T> for F
where
    T: Send + 'static,
    F: Fn(T) -> AckDecision + Send + Sync,
{
    async fn exec(&self, _ctx: &Context, msg: T) -> AckDecision {
        self(msg)
    }
}
