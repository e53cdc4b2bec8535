//! MemoStore - file-backed memoization cache
//!
//! Stores JSON values under string keys with a per-entry expiry instant. An
//! unexpired entry always wins over recomputation; an expired or absent one
//! triggers the producer and a write-through to disk.
//!
//! # Layout
//!
//! ```text
//! cache.json
//! {
//!   "pipelines": { "value": [...], "expires_at": 1718000000000 },
//!   "lead:501":  { "value": {...}, "expires_at": 1718000000000 }
//! }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use memostore::MemoStore;
//! use std::time::Duration;
//!
//! let store = MemoStore::open("storage/cache.json")?;
//! let users: Vec<User> = store
//!     .remember("users", Duration::from_secs(1800), || async { api.list_users().await })
//!     .await?;
//! ```
//!
//! The store assumes a single process owns the file. Concurrent `remember`
//! calls for the same key may both run their producer.

mod store;

pub use store::{EntryInfo, MemoStore};
