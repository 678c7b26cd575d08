//! Superjob Tree
//!
//! This crate provides the persisted record types for superjob orchestration.
//! A superjob is one top-level workflow execution; it owns a tree of subjobs
//! whose root is a single chain of top-level subjobs.
//!
//! Key points:
//! - [`Subjob`] is the unit the engine manipulates. Parent and next-sibling
//!   links are stored as ids and resolved through a store, never as owning
//!   pointers.
//! - [`SubjobStatus`] transitions are monotonic, and
//!   `descendants_are_complete` only ever flips from `false` to `true`.
//! - [`SubjobKind`] only distinguishes composite kinds from worker
//!   identifiers. Whether a worker identifier is executable or a nested
//!   superjob is decided by the engine's registry.
//! - [`blueprint`] turns a nested [`SuperjobDef`] into flat records ready to
//!   be inserted into a store.

pub mod blueprint;
mod error;
mod kind;
mod status;
mod subjob;
mod superjob;

pub use blueprint::{NodeDef, SuperjobDef, materialize};
pub use error::TreeError;
pub use kind::SubjobKind;
pub use status::SubjobStatus;
pub use subjob::Subjob;
pub use superjob::{Superjob, SuperjobStatus};
