//! Purpose: Typed blocking client for eLabFTW-style electronic lab notebook APIs.
//! Exports: `api` (client surface), `core` (records, errors), `export` (artifacts).
//! Role: Library crate; configuration and logging setup belong to the caller.
//! Invariants: All I/O is blocking and synchronous; no internal retries.
//! Invariants: TLS policy is an explicit caller choice at session construction.

pub mod api;
pub mod core;
pub mod export;
