//! Durable state store (C1) and the checkpoint manager (C2) built on top of it.
//!
//! Backed by `libsql`, already a dependency of the donor crate for embedded
//! SQLite-compatible storage (`Cargo.toml`). See SPEC_FULL.md §4.1-4.2 and
//! DESIGN.md for the schema and grounding.

mod cache;
mod checkpoint;
mod store;

pub use checkpoint::CheckpointManager;
pub use store::{StateStore, StateStoreConfig};
