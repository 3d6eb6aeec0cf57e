//! Multiwall Layout Engine
//!
//! Pure grid arithmetic plus one timing helper:
//! - **Grid:** split the ordered instance list into contiguous sections
//! - **Pulse:** the "layout is animating" flag raised on instance-count changes

pub mod grid;
pub mod pulse;

pub use grid::*;
pub use pulse::*;
