//! Core abstractions for localstore: the line-oriented record codec, the
//! `Store` contract with typed accessors, and shared error types.
//! This crate is intentionally small to keep dependency surface minimal.

pub mod codec;
pub mod error;
pub mod store;
pub mod table;

pub use error::{FormatError, Result, StoreError};
