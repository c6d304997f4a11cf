//! Reliable delivery of analytics events to a remote collector.
//!
//! This crate provides:
//! - EventClient: host-facing facade (submit, reconfigure, shutdown)
//! - Dispatcher: one network attempt per event, reconciled into the cache
//! - InFlightTracker: submissions awaiting a network result
//! - SweepScheduler: periodic resubmission of cached events
//! - HttpTransport: collector POST over reqwest
//!
//! # Delivery model
//!
//! Delivery is at-least-once. An event whose submission fails is written to
//! the [`EventCache`](beacon_event_cache::EventCache) and resent by later
//! sweeps until it succeeds or reaches the attempts ceiling. Every submission
//! reports exactly one [`EventStatus`] through its callback; nothing is
//! returned to the caller synchronously.
//!
//! ```ignore
//! let cache = Arc::new(SqliteEventCache::open(Some(&path)));
//! let config = ClientConfig::new("project", "write-key").with_cache(cache);
//! let client = EventClient::new(config, Arc::new(HttpTransport::new(TransportConfig::default())?))?;
//!
//! client.submit("purchases", r#"{"item":"sword"}"#, None);
//! client.shutdown().await;
//! ```

mod callback;
mod client;
mod config;
mod dispatcher;
mod error;
mod in_flight;
mod standard_events;
mod sweep;
mod transport;
mod wire;

pub use beacon_event_cache::{Event, EventCache};
pub use callback::{event_callback, CallbackData, EventCallback, EventStatus};
pub use client::{ClientStatus, EventClient};
pub use config::ClientConfig;
pub use dispatcher::Dispatcher;
pub use error::{OutboxError, OutboxResult};
pub use in_flight::{FlushReport, InFlightRequest, InFlightTracker, Origin, RequestId};
pub use standard_events::{
    ActionEvent, ExperienceData, Pages, QuestionEvent, QuizEvent, Session, StandardEvent,
};
pub use sweep::SweepScheduler;
pub use transport::{
    event_url, HttpTransport, PostRequest, Transport, TransportConfig, JSON_CONTENT_TYPE,
};
pub use wire::ToWireFormat;
