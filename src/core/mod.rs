//! Core modules of the Frontdesk state store.
//!
//! Everything that touches the shared state lives here: locking, atomic
//! writes, the document model, snapshot history, rollback and handoffs.

pub mod atomic;
pub mod audit;
pub mod backend;
pub mod config;
pub mod document;
pub mod error;
pub mod handoff;
pub mod lock;
pub mod store;
pub mod time;
