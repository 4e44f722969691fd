//! Paste lifecycle orchestration for the snip paste engine.
//!
//! This crate wires the infrastructure crates into the engine's operation
//! surface:
//! - `PasteService`: create / get / update / soft_delete / purge_expired
//! - `TokenService`: capability token issue and verification
//! - `ContentCodec`: threshold-gated gzip compression
//! - `ExpirySweeper`: the background purge loop
//!
//! The caller (an API layer) consumes these operations; no wire format is
//! defined here.

pub mod codec;
pub mod error;
pub mod paste;
pub mod service;
pub mod sweeper;
pub mod token;

pub use codec::{CodecError, ContentCodec};
pub use error::{PasteError, PasteResult};
pub use paste::{CreatedPaste, NewPaste, Paste, PurgeStats, UpdatePaste};
pub use service::{blob_key, PasteService};
pub use sweeper::ExpirySweeper;
pub use token::{IssuedToken, TokenService};
