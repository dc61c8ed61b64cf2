//! Optimistic mutation ledger for Nook.
//!
//! Lets the UI show a like, unlike, or comment the moment the user acts,
//! while the backend write is still in flight, and converges back to server
//! truth without flicker or double effects. It provides:
//! - [`PendingMutation`] records keyed by a local [`nook_types::MutationId`]
//! - Last-intent-wins replacement of contradictory like/unlike entries
//! - A pure overlay ([`MutationLedger::apply`]) of pending state onto a
//!   fetched [`nook_types::Post`]
//! - Reconciliation against fresh snapshots, with staleness expiry
//!
//! Nothing here touches the network and nothing is persisted.

pub mod config;
pub mod error;
pub mod ledger;
pub mod mutation;

pub use config::LedgerConfig;
pub use error::LedgerError;
pub use ledger::{MutationLedger, ReconcileReport};
pub use mutation::{CommentDraft, MutationKind, PendingMutation};
