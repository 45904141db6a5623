//! `worldmodel-store` – The world model's persistence core.
//!
//! Converts wire objects into sparse records, persists them through a
//! pluggable [`Backend`][backend::Backend], and answers tag-superset queries.
//!
//! # Modules
//!
//! - [`record`] – [`Record`][record::Record]: the sparse storage record keyed
//!   by the closed [`Field`][record::Field] set.
//! - [`codec`] – wire object ⇄ record conversion with zero-value elision.
//! - [`tags`] – [`TagQuery`][tags::TagQuery]: superset matching.  An empty
//!   query matches nothing.
//! - [`backend`] / [`sqlite`] – the persistence interface, an in-process
//!   [`MemoryBackend`][backend::MemoryBackend] and a
//!   [`SqliteBackend`][sqlite::SqliteBackend].
//! - [`instance`], [`description`], [`descriptor`] – the three record stores.
//! - [`dedup`] – [`DedupEngine`][dedup::DedupEngine]: finds an existing
//!   description holding equivalent descriptor content.
//! - [`service`] – [`WorldModel`][service::WorldModel]: the boundary
//!   operations.

pub mod backend;
pub mod codec;
pub mod dedup;
pub mod description;
pub mod descriptor;
pub mod error;
pub mod instance;
pub mod record;
pub mod service;
pub mod sqlite;
pub mod tags;

pub use dedup::{DedupEngine, DescriptorCandidate};
pub use error::{CodecError, StoreError};
pub use service::WorldModel;
