//! Foundation types for Nook.
//!
//! This crate provides the identity, content, and time types shared by the
//! store port, the mutation ledger, and the feed assembler. Every other Nook
//! crate depends on `nook-types`.
//!
//! # Key Types
//!
//! - [`PostId`], [`UserId`], [`CommentId`] -- backend document identities
//! - [`MutationId`] -- local sequence number of an optimistic mutation
//! - [`Post`] / [`Comment`] -- feed content with denormalized [`AuthorSnapshot`]s
//! - [`LikerSet`] -- duplicate-free, insertion-ordered set of likers
//! - [`Clock`] -- time source, with [`SystemClock`] and [`ManualClock`]

pub mod clock;
pub mod error;
pub mod identity;
pub mod post;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::TypeError;
pub use identity::{CommentId, MutationId, PostId, UserId};
pub use post::{AuthorSnapshot, Comment, LikerSet, MediaAttachment, MediaKind, Post, Visibility};
