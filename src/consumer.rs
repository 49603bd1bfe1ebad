// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Consumer
//!
//! This module holds the consumption logic of a subscription. Each delivery
//! is gated on its content type, decoded, handed to the handler, and resolved
//! with exactly one acknowledgment call. Deliveries are handled one at a time:
//! the next one is not pulled from the stream before the previous one has been
//! acknowledged.
//!
//! Nothing that goes wrong with a single delivery stops the loop. Refused
//! content types, undecodable bodies and panicking handlers all end in a
//! discard, which routes the message to the dead-letter exchange.

use crate::{
    ack::{AckDecision, Acknowledger},
    codec::Codec,
    errors::AmqpError,
    handler::ConsumerHandler,
    otel,
};
use futures_util::{FutureExt, Stream, StreamExt};
use lapin::{acker::Acker, message::Delivery, types::FieldTable};
use opentelemetry::{
    global::{self, BoxedTracer},
    trace::{Span, Status},
    Context,
};
use serde::de::DeserializeOwned;
use std::{any::Any, borrow::Cow, fmt::Display, panic::AssertUnwindSafe};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// A delivery detached from its transport, together with its acknowledger.
pub(crate) struct Incoming<A> {
    pub(crate) delivery_tag: u64,
    pub(crate) routing_key: String,
    pub(crate) content_type: Option<String>,
    pub(crate) headers: Option<FieldTable>,
    pub(crate) data: Vec<u8>,
    pub(crate) acker: A,
}

impl From<Delivery> for Incoming<Acker> {
    fn from(delivery: Delivery) -> Self {
        let Delivery {
            delivery_tag,
            routing_key,
            properties,
            data,
            acker,
            ..
        } = delivery;

        Incoming {
            delivery_tag,
            routing_key: routing_key.as_str().to_owned(),
            content_type: properties
                .content_type()
                .as_ref()
                .map(|c| c.as_str().to_owned()),
            headers: properties.headers().clone(),
            data,
            acker,
        }
    }
}

/// Count of resolved deliveries per decision, reported when a subscription ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub accepted: u64,
    pub requeued: u64,
    pub discarded: u64,
}

impl DispatchStats {
    fn record(&mut self, decision: AckDecision) {
        match decision {
            AckDecision::Accept => self.accepted += 1,
            AckDecision::RequeueReject => self.requeued += 1,
            AckDecision::DiscardReject => self.discarded += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.accepted + self.requeued + self.discarded
    }
}

/// Pulls deliveries one by one until the stream ends or `token` is cancelled.
pub(crate) async fn run_dispatch_loop<S, E, A, T, C, H>(
    queue: &str,
    mut deliveries: S,
    codec: &C,
    handler: &H,
    token: &CancellationToken,
) -> DispatchStats
where
    S: Stream<Item = Result<Incoming<A>, E>> + Unpin,
    E: Display,
    A: Acknowledger,
    T: DeserializeOwned + Send + 'static,
    C: Codec,
    H: ConsumerHandler<T> + ?Sized,
{
    let tracer = global::tracer("amqp consumer");
    let mut stats = DispatchStats::default();

    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(queue, "subscription cancelled");
                break;
            }
            next = deliveries.next() => next,
        };

        match next {
            Some(Ok(incoming)) => {
                let decision = consume::<A, T, C, H>(&tracer, queue, incoming, codec, handler).await;
                stats.record(decision);
            }
            Some(Err(err)) => error!(error = err.to_string(), queue, "errors consume msg"),
            None => {
                debug!(queue, "delivery stream closed");
                break;
            }
        }
    }

    stats
}

/// Consumes and resolves a single delivery.
///
/// The incoming delivery is taken by value so its acknowledger is used once.
///
/// # Returns
/// The decision issued to the broker
pub(crate) async fn consume<A, T, C, H>(
    tracer: &BoxedTracer,
    queue: &str,
    incoming: Incoming<A>,
    codec: &C,
    handler: &H,
) -> AckDecision
where
    A: Acknowledger,
    T: DeserializeOwned + Send + 'static,
    C: Codec,
    H: ConsumerHandler<T> + ?Sized,
{
    let Incoming {
        delivery_tag,
        routing_key,
        content_type,
        headers,
        data,
        acker,
    } = incoming;

    let (ctx, mut span) = otel::new_span(headers.as_ref(), tracer, &routing_key);

    debug!(
        queue,
        delivery_tag,
        routing_key = routing_key.as_str(),
        "received"
    );

    let decision = match handle::<T, C, H>(&ctx, content_type.as_deref(), &data, codec, handler).await {
        Ok(decision) => decision,
        Err(err) => {
            warn!(
                error = err.to_string(),
                queue, delivery_tag, "removing message from queue"
            );
            span.record_error(&err);
            span.set_status(Status::Error {
                description: Cow::from(err.to_string()),
            });
            AckDecision::DiscardReject
        }
    };

    match decision.resolve(&acker).await {
        Err(err) => {
            error!(
                error = err.to_string(),
                queue, delivery_tag, "error resolving delivery"
            );
            span.record_error(&err);
            span.set_status(Status::Error {
                description: Cow::from("error to resolve msg"),
            });
        }
        Ok(_) => {
            debug!(queue, delivery_tag, decision = ?decision, "delivery resolved");
            if decision == AckDecision::Accept {
                span.set_status(Status::Ok);
            }
        }
    }

    decision
}

/// Gates, decodes and runs the handler. Any error means the delivery is discarded.
async fn handle<T, C, H>(
    ctx: &Context,
    content_type: Option<&str>,
    data: &[u8],
    codec: &C,
    handler: &H,
) -> Result<AckDecision, AmqpError>
where
    T: DeserializeOwned + Send + 'static,
    C: Codec,
    H: ConsumerHandler<T> + ?Sized,
{
    let msg: T = codec.decode(data, content_type)?;

    AssertUnwindSafe(handler.exec(ctx, msg))
        .catch_unwind()
        .await
        .map_err(|panic| AmqpError::UnresolvedHandlerFault(panic_message(panic.as_ref())))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "handler panicked".to_owned()
    }
}
