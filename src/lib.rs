// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Typed publish/subscribe over RabbitMQ.
//!
//! Publishers encode payloads with a [`codec::Codec`] and send them to an
//! exchange. Subscribers provision a queue, bind it, and receive decoded
//! payloads in a [`handler::ConsumerHandler`] whose [`ack::AckDecision`] is
//! turned into the matching broker acknowledgment.

mod consumer;
mod otel;

pub mod ack;
pub mod channel;
pub mod codec;
pub mod configs;
pub mod dispatcher;
pub mod errors;
pub mod handler;
pub mod publisher;
pub mod queue;
pub mod routing;
pub mod topology;
