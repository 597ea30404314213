#![allow(clippy::missing_errors_doc)]

//! # PERA Messaging & Tracing
//!
//! Messaging & Tracing (`spec.md` §4.7): a topic-keyed publish/subscribe
//! [`bus::EventBus`] with an explicit ack/nack handshake, and a
//! [`span::TraceRegistry`] accumulating per-correlation-ID span trees.

pub mod bus;
pub mod error;
pub mod event;
pub mod span;

pub use bus::{EventBus, Subscription, TopicMetrics};
pub use error::{Error, Result};
pub use event::{CorrelationId, EventEnvelope, EventType, Severity};
pub use span::{Span, SharedTraceRegistry, SpanTree, TraceRegistry};
