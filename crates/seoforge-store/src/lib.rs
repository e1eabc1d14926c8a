//! # SEOForge Store
//!
//! Durable-store port for the SEOForge core. The schema/ORM layer is an
//! external collaborator, so this crate exposes a [`Store`] trait whose
//! methods are atomic operations (one call = one transaction; per-page scopes
//! never share transactions, and unique rows resolve conflicts
//! last-writer-wins) plus the [`MemoryStore`] adapter used by tests and
//! single-node deployments.

pub mod memory;
pub mod store;

pub use memory::MemoryStore;
pub use store::{ApprovedPage, Store};
