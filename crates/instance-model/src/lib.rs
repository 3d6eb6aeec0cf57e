//! Multiwall Instance Model
//!
//! Defines the tracked-instance data the rest of the wall refers to:
//! - **Instance:** identity, backing window, lock/focus flags, cached metadata
//! - **Registry:** the ordered collection, reconciled against window discovery
//!
//! Other components hold [`InstanceId`]s only; every mutation of lock or focus
//! goes through [`InstanceRegistry`].

pub mod instance;
pub mod registry;

pub use instance::*;
pub use registry::*;
