//! Externally visible message and part handles.

pub mod part;
pub mod summary;
