//! Source access: the shared line cursor and bounded views over it.

pub mod cursor;
pub mod view;
