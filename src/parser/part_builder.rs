//! Position ledger: where a part's header block and content live in the
//! source, plus its place in the tree.
//!
//! Every field is write-once and offsets only grow as parsing advances.
//! A violation is an internal-consistency failure of the parser itself and
//! is reported as [`MimeError::Ledger`].

use serde::Serialize;

use crate::error::{MimeError, Result};
use crate::proxy::PartId;

/// Offsets recorded for one part.
#[derive(Debug, Clone)]
pub struct PartBuilder {
    id: PartId,
    /// Non-owning back-reference into the arena.
    parent: Option<PartId>,
    /// Children in discovery order.
    children: Vec<PartId>,
    header: Option<(u64, u64)>,
    content_start: Option<u64>,
    /// `None` while the content is unbounded (read until boundary/EOF).
    content_end: Option<u64>,
    /// End of the whole part: content, children and epilogue.
    part_end: Option<u64>,
}

/// Plain copy of a ledger entry, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PartOffsets {
    pub header_start: u64,
    pub header_end: u64,
    pub content_start: u64,
    pub content_end: Option<u64>,
    pub part_end: Option<u64>,
}

impl PartBuilder {
    pub fn new(id: PartId, parent: Option<PartId>) -> Self {
        Self {
            id,
            parent,
            children: Vec::new(),
            header: None,
            content_start: None,
            content_end: None,
            part_end: None,
        }
    }

    pub fn id(&self) -> PartId {
        self.id
    }

    pub fn parent(&self) -> Option<PartId> {
        self.parent
    }

    pub fn children(&self) -> &[PartId] {
        &self.children
    }

    pub fn add_child(&mut self, child: PartId) {
        self.children.push(child);
    }

    /// Record `[start, end)` of the header block.
    pub fn record_header_range(&mut self, start: u64, end: u64) -> Result<()> {
        if self.header.is_some() {
            return Err(MimeError::ledger(self.id, "header range recorded twice"));
        }
        if end < start {
            return Err(MimeError::ledger(
                self.id,
                format!("header range {start}..{end} is inverted"),
            ));
        }
        self.header = Some((start, end));
        Ok(())
    }

    /// Record the content range. `end` may be `None` (still open); a later
    /// call with the same `start` closes it.
    pub fn record_content_range(&mut self, start: u64, end: Option<u64>) -> Result<()> {
        if let Some((_, header_end)) = self.header {
            if start < header_end {
                return Err(MimeError::ledger(
                    self.id,
                    format!("content start {start} precedes header end {header_end}"),
                ));
            }
        }
        match self.content_start {
            Some(existing) if existing != start => {
                return Err(MimeError::ledger(
                    self.id,
                    format!("content start moved from {existing} to {start}"),
                ));
            }
            _ => self.content_start = Some(start),
        }
        if let Some(end) = end {
            self.close_content(end)?;
        }
        Ok(())
    }

    /// Fix the end of the content. Fails if it is already fixed.
    pub fn close_content(&mut self, end: u64) -> Result<()> {
        let Some(start) = self.content_start else {
            return Err(MimeError::ledger(self.id, "content closed before it started"));
        };
        if let Some(existing) = self.content_end {
            return Err(MimeError::ledger(
                self.id,
                format!("content end already fixed at {existing}, got {end}"),
            ));
        }
        if end < start {
            return Err(MimeError::ledger(
                self.id,
                format!("content end {end} precedes content start {start}"),
            ));
        }
        self.content_end = Some(end);
        Ok(())
    }

    /// Fix the end of the whole part unless it is already known.
    pub fn close_part(&mut self, end: u64) {
        if self.part_end.is_none() {
            let floor = self.content_end.or(self.content_start).unwrap_or(0);
            self.part_end = Some(end.max(floor));
        }
    }

    pub fn header_range(&self) -> Option<(u64, u64)> {
        self.header
    }

    pub fn content_start(&self) -> Option<u64> {
        self.content_start
    }

    pub fn content_end(&self) -> Option<u64> {
        self.content_end
    }

    /// The content range, once closed.
    pub fn content_range(&self) -> Option<(u64, u64)> {
        Some((self.content_start?, self.content_end?))
    }

    pub fn is_content_closed(&self) -> bool {
        self.content_end.is_some()
    }

    pub fn part_end(&self) -> Option<u64> {
        self.part_end
    }

    pub fn offsets(&self) -> PartOffsets {
        let (header_start, header_end) = self.header.unwrap_or((0, 0));
        PartOffsets {
            header_start,
            header_end,
            content_start: self.content_start.unwrap_or(header_end),
            content_end: self.content_end,
            part_end: self.part_end,
        }
    }
}
