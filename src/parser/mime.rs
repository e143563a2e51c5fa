//! MIME multipart strategy.
//!
//! Content of a leaf runs until an ancestor's delimiter or EOF. Content of
//! a multipart is its preamble, ended by its own first delimiter. Children
//! start right after a `--B` line, even when EOF follows it directly; after
//! `--B--` the remaining lines up to an ancestor's delimiter are the
//! epilogue.

use tracing::{debug, trace, warn};

use super::boundary::{self, BoundaryMatch};
use super::strategy::{next_line, read_child_headers, ParserStrategy, StrategyContext};
use crate::error::{MimeError, Result};
use crate::proxy::{PartArena, PartId, PartKind, PartProxy};
use crate::store::cursor::SourceCursor;

pub(crate) fn parse_content(
    cursor: &mut SourceCursor,
    arena: &mut PartArena,
    id: PartId,
) -> Result<()> {
    let content_start = arena[id].builder.content_start().unwrap_or(cursor.position());
    let mut prev_ending: u8 = 0;

    loop {
        let Some(line) = next_line(cursor, id)? else {
            let eof = cursor.position();
            if arena[id].parent().is_some() || arena[id].mime_boundary().is_some() {
                warn!(part = %id, offset = eof, "Reached EOF before a closing delimiter");
            }
            arena[id].builder.close_content(eof)?;
            arena.set_eof(id, eof);
            return Ok(());
        };

        // The line break before a delimiter belongs to the delimiter.
        let delimiter_start = (line.start - u64::from(prev_ending)).max(content_start);
        let matched = boundary::match_line(arena, id, line.trimmed(), delimiter_start);
        if matched.is_match() {
            arena[id].builder.close_content(delimiter_start)?;
            trace!(
                part = %id,
                start = content_start,
                end = delimiter_start,
                matched = ?matched,
                "Closed content"
            );
            return Ok(());
        }
        prev_ending = line.ending;
    }
}

pub(crate) fn parse_next_child(
    cursor: &mut SourceCursor,
    arena: &mut PartArena,
    id: PartId,
) -> Result<Option<PartId>> {
    if arena[id].mime_boundary().is_none() {
        return Ok(None);
    }
    if arena[id].parent_boundary_found {
        return Ok(None);
    }
    if arena[id].end_boundary_found {
        consume_epilogue(cursor, arena, id)?;
        return Ok(None);
    }

    let offset = cursor.position();
    let at_eof = cursor.at_eof().map_err(|e| MimeError::read(id, offset, e))?;
    if at_eof {
        if !arena[id].open_delimiter {
            warn!(part = %id, offset, "Multipart ended without a closing delimiter");
            arena.set_eof(id, offset);
            return Ok(None);
        }
        debug!(part = %id, offset, "Delimiter at EOF opens an empty body part");
    }

    let block = read_child_headers(cursor, id)?;
    arena[id].open_delimiter = false;
    let strategy = ParserStrategy::select(&StrategyContext {
        headers: &block.headers,
        parent: Some(ParserStrategy::Mime),
    });
    let child_id = arena.next_id();
    debug!(
        part = %child_id,
        parent = %id,
        offset = block.start,
        "Discovered body part"
    );
    let proxy = PartProxy::new(child_id, Some(id), block, strategy, PartKind::Mime)?;
    Ok(Some(arena.insert(proxy)))
}

/// Skip the lines after `--B--` until an ancestor claims one or EOF.
fn consume_epilogue(cursor: &mut SourceCursor, arena: &mut PartArena, id: PartId) -> Result<()> {
    let parent = arena[id].parent();
    let epilogue_start = cursor.position();
    let mut prev_ending: u8 = 0;

    loop {
        let Some(line) = next_line(cursor, id)? else {
            let eof = cursor.position();
            trace!(part = %id, start = epilogue_start, end = eof, "Epilogue ran to EOF");
            arena.set_eof(id, eof);
            return Ok(());
        };

        if let Some(parent) = parent {
            let delimiter_start = (line.start - u64::from(prev_ending)).max(epilogue_start);
            if boundary::match_line(arena, parent, line.trimmed(), delimiter_start)
                != BoundaryMatch::None
            {
                let node = &mut arena[id];
                node.parent_boundary_found = true;
                node.builder.close_part(delimiter_start);
                trace!(part = %id, start = epilogue_start, end = delimiter_start, "Epilogue closed");
                return Ok(());
            }
        }
        prev_ending = line.ending;
    }
}
