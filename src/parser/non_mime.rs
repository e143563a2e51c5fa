//! Legacy (non-MIME) strategy: plain text with embedded UU-encoded files.
//!
//! The message text runs up to the first `begin MODE FILENAME` line. Each
//! such line starts a UU child whose content ends at the matching `end`
//! line; any text after `end` up to the next `begin` stays inside that
//! child's raw range. The pending `begin` is parked on the message proxy
//! until the message is asked for its next child.

use tracing::{debug, warn};

use super::header::{HeaderBlock, HeaderCollection};
use super::strategy::{next_line, ParserStrategy};
use crate::error::Result;
use crate::proxy::{PartArena, PartId, PartKind, PartProxy, PendingUuPart};
use crate::store::cursor::{Line, SourceCursor};

pub(crate) fn parse_content(
    cursor: &mut SourceCursor,
    arena: &mut PartArena,
    id: PartId,
) -> Result<()> {
    if matches!(arena[id].kind, PartKind::UuEncoded { .. }) {
        return parse_uu_content(cursor, arena, id);
    }
    let end = scan_to_next_begin(cursor, arena, id)?;
    arena[id].builder.close_content(end)?;
    Ok(())
}

pub(crate) fn parse_next_child(
    _cursor: &mut SourceCursor,
    arena: &mut PartArena,
    id: PartId,
) -> Result<Option<PartId>> {
    let pending = match &mut arena[id].kind {
        PartKind::Message { pending_uu } => pending_uu.take(),
        _ => None,
    };
    let Some(pending) = pending else {
        return Ok(None);
    };

    let child_id = arena.next_id();
    debug!(
        part = %child_id,
        offset = pending.start,
        mode = %format!("{:o}", pending.mode),
        filename = %pending.filename,
        "Discovered UU-encoded part"
    );
    let block = HeaderBlock {
        headers: HeaderCollection::new(),
        start: pending.start,
        end: pending.content_start,
        content_start: pending.content_start,
    };
    let kind = PartKind::UuEncoded {
        mode: pending.mode,
        filename: pending.filename,
    };
    let proxy = PartProxy::new(child_id, Some(id), block, ParserStrategy::NonMime, kind)?;
    Ok(Some(arena.insert(proxy)))
}

/// Content of a UU part: the lines between `begin` and `end`.
fn parse_uu_content(cursor: &mut SourceCursor, arena: &mut PartArena, id: PartId) -> Result<()> {
    loop {
        let Some(line) = next_line(cursor, id)? else {
            let eof = cursor.position();
            warn!(part = %id, offset = eof, "UU-encoded part has no 'end' line");
            arena[id].builder.close_content(eof)?;
            arena.set_eof(id, eof);
            return Ok(());
        };

        let text = line.trimmed();
        if text == b"end" {
            arena[id].builder.close_content(line.start)?;
            break;
        }
        if let Some((mode, filename)) = parse_begin_line(text) {
            warn!(part = %id, offset = line.start, "UU-encoded part interrupted by another 'begin'");
            arena[id].builder.close_content(line.start)?;
            arena[id].builder.close_part(line.start);
            park_begin(arena, id, &line, mode, filename);
            return Ok(());
        }
    }

    let stop = scan_to_next_begin(cursor, arena, id)?;
    arena[id].builder.close_part(stop);
    Ok(())
}

/// Read lines until the next `begin` line (parked on the message) or EOF.
/// Returns the offset the scan stopped at.
fn scan_to_next_begin(
    cursor: &mut SourceCursor,
    arena: &mut PartArena,
    id: PartId,
) -> Result<u64> {
    loop {
        let Some(line) = next_line(cursor, id)? else {
            let eof = cursor.position();
            arena.set_eof(id, eof);
            return Ok(eof);
        };
        if let Some((mode, filename)) = parse_begin_line(line.trimmed()) {
            park_begin(arena, id, &line, mode, filename);
            return Ok(line.start);
        }
    }
}

/// Store a `begin` line on the message proxy that owns `id`.
fn park_begin(arena: &mut PartArena, id: PartId, line: &Line, mode: u32, filename: String) {
    let message = arena[id].parent().unwrap_or(id);
    if let PartKind::Message { pending_uu } = &mut arena[message].kind {
        *pending_uu = Some(PendingUuPart {
            start: line.start,
            content_start: line.end,
            mode,
            filename,
        });
    }
}

/// Parse `begin MODE FILENAME`, where MODE is three or four octal digits.
fn parse_begin_line(line: &[u8]) -> Option<(u32, String)> {
    let rest = line.strip_prefix(b"begin ")?;
    let space = rest.iter().position(|&b| b == b' ')?;
    let (mode, filename) = (&rest[..space], rest[space + 1..].trim_ascii());
    if !(3..=4).contains(&mode.len()) || !mode.iter().all(|b| (b'0'..=b'7').contains(b)) {
        return None;
    }
    if filename.is_empty() {
        return None;
    }
    let mode = mode
        .iter()
        .fold(0u32, |acc, &digit| acc * 8 + u32::from(digit - b'0'));
    Some((mode, String::from_utf8_lossy(filename).into_owned()))
}
