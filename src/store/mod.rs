//! Typed data-access layer over the shared store.
//!
//! Workers never talk to each other; these modules are the only interface
//! between a stage and its input/output relations. Every guarded insert and
//! claim here is a single statement so concurrency hazards stay inside the
//! database.

pub mod cursor;
pub mod events;
pub mod features;
pub mod parsed;
pub mod positions;
pub mod queue;
pub mod raw;
pub mod signals;
