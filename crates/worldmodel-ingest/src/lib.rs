//! `worldmodel-ingest` – Map ingestion.
//!
//! Feeds map snapshots into the world model without duplicating
//! descriptions for content that has already been seen.
//!
//! # Modules
//!
//! - [`bus`] – [`MapBus`][bus::MapBus]: a broadcast channel of
//!   [`MapUpdate`][bus::MapUpdate]s.
//! - [`listener`] – [`MapListener`][listener::MapListener]: rate-limited,
//!   deduplicating consumer of the bus.

pub mod bus;
pub mod error;
pub mod listener;

pub use bus::{MapBus, MapSubscriber, MapUpdate};
pub use error::IngestError;
pub use listener::{IngestOutcome, ListenerConfig, MapListener};
