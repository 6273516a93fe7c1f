//! boardsync webhook receiver.
//!
//! Receives GitHub webhook deliveries over HTTP, validates their
//! HMAC-SHA256 signature against the shared secret, decodes the body once into
//! a [`reconciler::SyncEvent`], and hands it to the
//! [`reconciler::EventDispatcher`].
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Transport details, signature validation, and payload
//! deserialization all live here. The [`reconciler`] crate sees only typed
//! events.

pub mod payload;
pub mod server;
pub mod signature;

pub use payload::{decode_event, DecodeError, DELIVERY_HEADER, EVENT_HEADER};
pub use server::{router, serve, ReceiveError, WebhookReceiver, DEFAULT_WEBHOOK_PATH};
pub use signature::{SignatureError, WebhookSecret, SIGNATURE_HEADER};
