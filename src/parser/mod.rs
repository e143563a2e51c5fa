//! Lazy MIME parsing: header blocks, the offset ledger, delimiter matching,
//! and the two discovery strategies.

pub mod boundary;
pub mod header;
pub mod mime;
pub mod non_mime;
pub mod part_builder;
pub mod strategy;

use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use tracing::info;

use crate::config::ParserConfig;
use crate::error::{MimeError, Result};
use crate::model::part::Message;
use crate::proxy::tree::PartTree;
use crate::store::cursor::Source;

/// Entry point: opens a source and returns its (still unparsed) message.
///
/// Only the top-level header block is read here. Everything else happens
/// when the returned [`Message`] is asked for it.
#[derive(Debug, Clone, Default)]
pub struct MessageParser {
    config: ParserConfig,
}

impl MessageParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ParserConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parse an in-memory message.
    pub fn parse_bytes(&self, data: impl Into<Vec<u8>>) -> Result<Message> {
        self.open(Box::new(Cursor::new(data.into())))
    }

    /// Parse any seekable stream positioned at the first byte of a message.
    pub fn parse_reader<R: Read + Seek + 'static>(&self, reader: R) -> Result<Message> {
        self.open(Box::new(reader))
    }

    /// Parse a message file. The file stays open for as long as the message
    /// (or any view over it) is alive.
    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<Message> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MimeError::FileNotFound(path.to_path_buf())
            } else {
                MimeError::io(path, e)
            }
        })?;
        info!("Opening message {}", path.display());
        self.open(Box::new(file))
    }

    fn open(&self, source: Box<dyn Source>) -> Result<Message> {
        let tree = PartTree::new(source, self.config.clone())?;
        Ok(Message::new(tree))
    }
}
