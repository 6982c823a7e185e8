//! # Lockstep Core Library
//!
//! This crate contains the core logic of `lockstep` – a manifest-driven incremental file synchronizer.
//!
//! Given a remote manifest of `{path, hash}` records describing an installed application tree, `lockstep`
//! works out which local files are missing or differ, downloads only those, and then commits the new
//! version marker. The marker is the last thing written, so an interrupted or failed run always leaves
//! a tree that the next run can safely re-diff.
//!
//! This library is built for the `lockstep` CLI, but every collaborator sits behind a trait
//! ([`RemoteFetcher`], [`FileStore`], [`HashProvider`]) so it can be embedded elsewhere.
//!
//! ## Modules Overview
//! - [`manifest`] – Fetching and strictly parsing remote manifests
//! - [`diff`] – Comparing manifest entries against the installed root by content hash
//! - [`transfer`] – Sequential, fail-fast downloads with progress events and cancellation
//! - [`ledger`] – The persisted version marker of an installed root
//! - [`lock`] – Per-root mutual exclusion for update runs
//! - [`orchestrator`] – The update state machine tying everything together
//! - [`hash`], [`store`], [`fetch`] – Hashing, filesystem and network collaborators
//! - [`config`] – `lockstep.toml` application catalog
//! - [`error`] – Error types
//! - [`util`] – Shared helpers (paths, URLs, directories)


pub mod error;
pub mod hash;
pub mod store;
pub mod fetch;
pub mod manifest;
pub mod diff;
pub mod transfer;
pub mod ledger;
pub mod lock;
pub mod orchestrator;
pub mod config;
pub mod util;

pub use error::*;
pub use hash::*;
pub use store::*;
pub use fetch::*;
pub use manifest::*;
pub use diff::*;
pub use transfer::*;
pub use ledger::*;
pub use lock::*;
pub use orchestrator::*;
pub use config::*;
pub use util::*;
