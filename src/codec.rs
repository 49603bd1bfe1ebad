// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Payload Codecs
//!
//! A codec turns a typed value into an [`Envelope`] (bytes plus a
//! content-type tag) and back. Two codecs are provided:
//!
//! - [`JsonCodec`]: human readable, tagged `application/json`
//! - [`BinaryCodec`]: compact bincode encoding, tagged `application/x-bincode`
//!
//! Whether a delivery whose tag differs from the codec's own may still be
//! decoded is governed by the codec's [`ContentTypePolicy`].

use crate::errors::AmqpError;
use serde::{de::DeserializeOwned, Serialize};

/// Content type of JSON encoded messages
pub const JSON_CONTENT_TYPE: &str = "application/json";
/// Content type of bincode encoded messages
pub const BINARY_CONTENT_TYPE: &str = "application/x-bincode";
/// Prefetch applied by default to subscriptions using the binary codec
pub const BINARY_DEFAULT_PREFETCH: u16 = 10;

/// The wire unit exchanged with the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub content_type: String,
    pub body: Vec<u8>,
}

/// How a codec treats the content type declared on a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentTypePolicy {
    /// The declared content type must equal the codec's own; a missing one is refused.
    Strict,
    /// The declared content type is ignored and decoding is always attempted.
    Lenient,
}

/// Serialization capability used by the publisher and the dispatcher.
pub trait Codec: Send + Sync + 'static {
    /// The content-type tag written on published envelopes.
    fn content_type(&self) -> &'static str;

    fn policy(&self) -> ContentTypePolicy;

    /// Prefetch used when a subscription does not configure one explicitly.
    fn default_prefetch(&self) -> Option<u16> {
        None
    }

    /// Serializes `value`, failing with [`AmqpError::EncodeError`].
    fn encode<T>(&self, value: &T) -> Result<Envelope, AmqpError>
    where
        T: Serialize + ?Sized;

    /// Deserializes `body` without looking at any content type.
    fn decode_body<T>(&self, body: &[u8]) -> Result<T, AmqpError>
    where
        T: DeserializeOwned;

    /// Reports whether a delivery tagged with `content_type` may be decoded.
    fn accepts(&self, content_type: Option<&str>) -> bool {
        match self.policy() {
            ContentTypePolicy::Lenient => true,
            ContentTypePolicy::Strict => content_type == Some(self.content_type()),
        }
    }

    /// Decodes `body`, refusing content types rejected by [`Codec::accepts`].
    fn decode<T>(&self, body: &[u8], content_type: Option<&str>) -> Result<T, AmqpError>
    where
        T: DeserializeOwned,
    {
        if !self.accepts(content_type) {
            return Err(AmqpError::DecodeError {
                content_type: self.content_type().to_owned(),
                reason: format!(
                    "unexpected content type `{}`",
                    content_type.unwrap_or_default()
                ),
            });
        }

        self.decode_body(body)
    }
}

/// JSON codec backed by `serde_json`.
#[derive(Debug, Clone, Copy)]
pub struct JsonCodec {
    policy: ContentTypePolicy,
}

impl JsonCodec {
    pub fn new() -> Self {
        JsonCodec {
            policy: ContentTypePolicy::Lenient,
        }
    }

    /// Replaces the content-type policy.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn with_policy(mut self, policy: ContentTypePolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl Default for JsonCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for JsonCodec {
    fn content_type(&self) -> &'static str {
        JSON_CONTENT_TYPE
    }

    fn policy(&self) -> ContentTypePolicy {
        self.policy
    }

    fn encode<T>(&self, value: &T) -> Result<Envelope, AmqpError>
    where
        T: Serialize + ?Sized,
    {
        match serde_json::to_vec(value) {
            Ok(body) => Ok(Envelope {
                content_type: JSON_CONTENT_TYPE.to_owned(),
                body,
            }),
            Err(err) => Err(AmqpError::EncodeError {
                content_type: JSON_CONTENT_TYPE.to_owned(),
                reason: err.to_string(),
            }),
        }
    }

    fn decode_body<T>(&self, body: &[u8]) -> Result<T, AmqpError>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(body).map_err(|err| AmqpError::DecodeError {
            content_type: JSON_CONTENT_TYPE.to_owned(),
            reason: err.to_string(),
        })
    }
}

/// Compact binary codec backed by `bincode`.
#[derive(Debug, Clone, Copy)]
pub struct BinaryCodec {
    policy: ContentTypePolicy,
}

impl BinaryCodec {
    pub fn new() -> Self {
        BinaryCodec {
            policy: ContentTypePolicy::Strict,
        }
    }

    /// Replaces the content-type policy.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn with_policy(mut self, policy: ContentTypePolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl Default for BinaryCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for BinaryCodec {
    fn content_type(&self) -> &'static str {
        BINARY_CONTENT_TYPE
    }

    fn policy(&self) -> ContentTypePolicy {
        self.policy
    }

    fn default_prefetch(&self) -> Option<u16> {
        Some(BINARY_DEFAULT_PREFETCH)
    }

    fn encode<T>(&self, value: &T) -> Result<Envelope, AmqpError>
    where
        T: Serialize + ?Sized,
    {
        match bincode::serialize(value) {
            Ok(body) => Ok(Envelope {
                content_type: BINARY_CONTENT_TYPE.to_owned(),
                body,
            }),
            Err(err) => Err(AmqpError::EncodeError {
                content_type: BINARY_CONTENT_TYPE.to_owned(),
                reason: err.to_string(),
            }),
        }
    }

    fn decode_body<T>(&self, body: &[u8]) -> Result<T, AmqpError>
    where
        T: DeserializeOwned,
    {
        bincode::deserialize(body).map_err(|err| AmqpError::DecodeError {
            content_type: BINARY_CONTENT_TYPE.to_owned(),
            reason: err.to_string(),
        })
    }
}
