//! Parser strategy selection and dispatch.
//!
//! The strategy of a part is chosen once, when its proxy is created, from
//! the header snapshot. The set is closed: MIME multipart handling, or the
//! legacy non-MIME scan that discovers UU-encoded attachments.

use serde::Serialize;
use tracing::trace;

use super::{mime, non_mime};
use crate::error::{MimeError, Result};
use crate::parser::header::{self, HeaderBlock, HeaderCollection};
use crate::proxy::{PartArena, PartId};
use crate::store::cursor::{Line, SourceCursor};

/// What the selection looks at.
#[derive(Debug, Clone, Copy)]
pub struct StrategyContext<'a> {
    pub headers: &'a HeaderCollection,
    /// Strategy of the parent part, `None` for the message itself.
    pub parent: Option<ParserStrategy>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParserStrategy {
    Mime,
    NonMime,
}

impl ParserStrategy {
    /// Candidates in order of preference.
    const CHAIN: [ParserStrategy; 2] = [ParserStrategy::Mime, ParserStrategy::NonMime];

    pub fn is_supported(self, ctx: &StrategyContext<'_>) -> bool {
        match self {
            ParserStrategy::Mime => {
                ctx.parent == Some(ParserStrategy::Mime)
                    || ctx.headers.contains("MIME-Version")
                    || ctx.headers.contains("Content-Type")
            }
            ParserStrategy::NonMime => true,
        }
    }

    /// Pick the first supported strategy.
    pub fn select(ctx: &StrategyContext<'_>) -> Self {
        Self::CHAIN
            .into_iter()
            .find(|s| s.is_supported(ctx))
            .unwrap_or(ParserStrategy::NonMime)
    }

    /// Scan forward until the content end of `id` is known. A closed
    /// content range makes this a no-op.
    pub fn parse_content(
        self,
        cursor: &mut SourceCursor,
        arena: &mut PartArena,
        id: PartId,
    ) -> Result<()> {
        if arena[id].builder.is_content_closed() {
            return Ok(());
        }
        trace!(part = %id, strategy = ?self, offset = cursor.position(), "Parsing content");
        match self {
            ParserStrategy::Mime => mime::parse_content(cursor, arena, id),
            ParserStrategy::NonMime => non_mime::parse_content(cursor, arena, id),
        }
    }

    /// Discover one more child of `id` at the cursor position. The caller
    /// has already realized the previous child and closed `id`'s content.
    pub fn parse_next_child(
        self,
        cursor: &mut SourceCursor,
        arena: &mut PartArena,
        id: PartId,
    ) -> Result<Option<PartId>> {
        trace!(part = %id, strategy = ?self, offset = cursor.position(), "Looking for next child");
        match self {
            ParserStrategy::Mime => mime::parse_next_child(cursor, arena, id),
            ParserStrategy::NonMime => non_mime::parse_next_child(cursor, arena, id),
        }
    }
}

/// Read one line on behalf of `part`, tagging I/O failures with it.
pub(crate) fn next_line(cursor: &mut SourceCursor, part: PartId) -> Result<Option<Line>> {
    let offset = cursor.position();
    cursor
        .read_line()
        .map_err(|e| MimeError::read(part, offset, e))
}

/// Read the header block of a new child of `parent`.
pub(crate) fn read_child_headers(cursor: &mut SourceCursor, parent: PartId) -> Result<HeaderBlock> {
    let offset = cursor.position();
    header::read_header_block(cursor, false).map_err(|e| MimeError::read(parent, offset, e))
}
