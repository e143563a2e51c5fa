//! `lazymime`: lazy, incremental MIME message parsing.
//!
//! A message is parsed only as far as a caller asks: opening it reads the
//! top-level header block, and each request for content or a child part
//! advances a single shared cursor just far enough to answer. Every part
//! records its byte offsets, so its headers, content or whole raw text can
//! later be re-read as a bounded view without parsing again.

pub mod config;
pub mod error;
pub mod model;
pub mod parser;
pub mod proxy;
pub mod store;

pub use error::{MimeError, Result};
pub use model::part::{Message, Part};
pub use model::summary::PartSummary;
pub use parser::MessageParser;
pub use proxy::{PartId, PartType};
