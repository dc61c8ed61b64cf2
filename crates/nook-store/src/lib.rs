//! Document store port for Nook.
//!
//! The backend is treated as an opaque document store reachable only through
//! three operations: a filtered, ordered, limited query; a single-document
//! read; and a single-document write. No multi-document transaction is
//! assumed, so callers must tolerate partially visible writes.
//!
//! # Backends
//!
//! All backends implement the [`DocumentStore`] trait:
//!
//! - [`InMemoryDocumentStore`] -- `HashMap`-based store with fault injection,
//!   for tests, demos, and embedding
//!
//! # Design Rules
//!
//! 1. The store holds no client-side state; every call is a request/response.
//! 2. Cursors are opaque tokens; only the backend that issued one can use it.
//! 3. Timeouts are detected here and reported as [`StoreError::Timeout`].
//! 4. The store never interprets documents; [`codec`] maps posts to fields.

pub mod codec;
pub mod error;
pub mod memory;
pub mod query;
pub mod traits;

pub use codec::{decode_post, encode_post, POSTS_COLLECTION};
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryDocumentStore;
pub use query::{Direction, Document, Fields, OrderBy, Predicate, QueryPage, StoreCursor};
pub use traits::DocumentStore;
