//! # Shared Types Crate
//!
//! Entities that cross the boundary between the prompt bridge and the remote
//! compute network.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: payload shapes sent to and received from the
//!   execution node are defined once, here.
//! - **Wire Compatibility**: field names follow what the remote plugin emits
//!   (`REQUEST_ID`, `RESPONSE`) and consumes (`request_id`, `request`, `history`).

pub mod entities;

pub use entities::*;
