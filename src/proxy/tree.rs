//! The parse tree of one message: arena of proxies plus the shared cursor.
//!
//! Every parse operation is pull-driven. Nothing is read from the source
//! until a caller asks for content or for a child, and each operation reads
//! only as far as it needs to answer.

use serde::Serialize;
use tracing::{debug, trace};

use super::{PartArena, PartId, PartKind, PartProxy};
use crate::config::ParserConfig;
use crate::error::{MimeError, Result};
use crate::parser::header;
use crate::parser::strategy::{ParserStrategy, StrategyContext};
use crate::store::cursor::{SharedCursor, Source, SourceCursor};
use crate::store::view::BoundedView;

/// Counters of the work the parser has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParseStats {
    /// Content scans actually run (no-op calls are not counted).
    pub content_scans: u64,
    /// Calls into a strategy's child discovery.
    pub child_discoveries: u64,
}

pub struct PartTree {
    cursor: SharedCursor,
    arena: PartArena,
    config: ParserConfig,
    stats: ParseStats,
}

impl PartTree {
    /// Read the top-level header block and create the message proxy.
    pub fn new(source: Box<dyn Source>, config: ParserConfig) -> Result<Self> {
        let mut cursor = SourceCursor::new(source, &config);
        let block = header::read_header_block(&mut cursor, config.skip_mbox_separator)
            .map_err(|e| MimeError::read(PartId::ROOT, 0, e))?;

        let strategy = ParserStrategy::select(&StrategyContext {
            headers: &block.headers,
            parent: None,
        });
        debug!(
            strategy = ?strategy,
            headers = block.headers.len(),
            content_start = block.content_start,
            "Opened message"
        );

        let mut arena = PartArena::default();
        let root = PartProxy::new(
            PartId::ROOT,
            None,
            block,
            strategy,
            PartKind::Message { pending_uu: None },
        )?;
        arena.insert(root);

        Ok(Self {
            cursor: cursor.shared(),
            arena,
            config,
            stats: ParseStats::default(),
        })
    }

    /// Scan until the content end of `id` is known.
    pub fn parse_content(&mut self, id: PartId) -> Result<()> {
        if self.arena[id].builder.is_content_closed() {
            return Ok(());
        }
        self.stats.content_scans += 1;
        let strategy = self.arena[id].strategy;
        let mut cursor = self.cursor.borrow_mut();
        strategy.parse_content(&mut cursor, &mut self.arena, id)
    }

    /// Discover the next child of `id`.
    ///
    /// The previously added child is realized first and `id`'s own content
    /// is closed, so the cursor is always where the next child can begin.
    /// Once this returns `None` it keeps returning `None` without reading.
    pub fn parse_next_child(&mut self, id: PartId) -> Result<Option<PartId>> {
        if self.arena[id].children.is_exhausted() {
            return Ok(None);
        }
        if let Some(last) = self.arena[id].last_added_child {
            self.parse_all(last)?;
        }
        self.parse_content(id)?;

        self.stats.child_discoveries += 1;
        let strategy = self.arena[id].strategy;
        let found = {
            let mut cursor = self.cursor.borrow_mut();
            strategy.parse_next_child(&mut cursor, &mut self.arena, id)?
        };
        if found.is_none() {
            trace!(part = %id, children = self.arena[id].builder.children().len(), "No more children");
            self.arena[id].children.mark_exhausted();
        }
        Ok(found)
    }

    /// Parse `id` and all of its descendants to the end.
    pub fn parse_all(&mut self, id: PartId) -> Result<()> {
        self.parse_content(id)?;
        while self.parse_next_child(id)?.is_some() {}
        Ok(())
    }

    pub fn arena(&self) -> &PartArena {
        &self.arena
    }

    pub fn proxy(&self, id: PartId) -> &PartProxy {
        &self.arena[id]
    }

    pub fn proxy_mut(&mut self, id: PartId) -> &mut PartProxy {
        &mut self.arena[id]
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn stats(&self) -> ParseStats {
        self.stats
    }

    /// Where the parser will read next.
    pub fn position(&self) -> u64 {
        self.cursor.borrow().position()
    }

    pub fn cursor(&self) -> &SharedCursor {
        &self.cursor
    }

    /// Window over the header block of `id`.
    pub fn header_view(&self, id: PartId) -> Result<BoundedView> {
        let (start, end) = self.arena[id].builder.header_range().ok_or(
            MimeError::RangeNotClosed {
                part: id,
                range: "header",
            },
        )?;
        Ok(BoundedView::new(&self.cursor, start, end))
    }

    /// Window over the content of `id`. The content must already be closed.
    pub fn content_view(&self, id: PartId) -> Result<BoundedView> {
        let (start, end) = self.arena[id].builder.content_range().ok_or(
            MimeError::RangeNotClosed {
                part: id,
                range: "content",
            },
        )?;
        Ok(BoundedView::new(&self.cursor, start, end))
    }

    /// Window over the whole part, from its first header byte to its end.
    pub fn raw_view(&self, id: PartId) -> Result<BoundedView> {
        let builder = &self.arena[id].builder;
        match (builder.header_range(), builder.part_end()) {
            (Some((start, _)), Some(end)) => Ok(BoundedView::new(&self.cursor, start, end)),
            _ => Err(MimeError::RangeNotClosed {
                part: id,
                range: "part",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn tree(raw: &str) -> PartTree {
        let source = Box::new(Cursor::new(raw.as_bytes().to_vec()));
        PartTree::new(source, ParserConfig::default()).unwrap()
    }

    const MULTIPART: &str = "Content-Type: multipart/mixed; boundary=X\n\
                             \n\
                             preamble\n\
                             --X\n\
                             Content-Type: text/plain\n\
                             \n\
                             one\n\
                             --X\n\
                             \n\
                             two\n\
                             --X--\n\
                             epilogue\n";

    #[test]
    fn test_root_is_lazy() {
        let t = tree(MULTIPART);
        assert_eq!(t.arena().len(), 1);
        assert_eq!(t.proxy(PartId::ROOT).strategy, ParserStrategy::Mime);
        assert!(!t.proxy(PartId::ROOT).builder.is_content_closed());
        assert_eq!(t.stats(), ParseStats::default());
    }

    #[test]
    fn test_preamble_is_content_of_multipart() {
        let mut t = tree(MULTIPART);
        t.parse_content(PartId::ROOT).unwrap();
        let body = t.content_view(PartId::ROOT).unwrap().read_all().unwrap();
        assert_eq!(body, b"preamble");
        assert_eq!(t.arena().len(), 1);
    }

    #[test]
    fn test_parse_content_is_idempotent() {
        let mut t = tree(MULTIPART);
        t.parse_content(PartId::ROOT).unwrap();
        let offsets = t.proxy(PartId::ROOT).builder.offsets();
        let position = t.position();
        t.parse_content(PartId::ROOT).unwrap();
        assert_eq!(t.proxy(PartId::ROOT).builder.offsets(), offsets);
        assert_eq!(t.position(), position);
        assert_eq!(t.stats().content_scans, 1);
    }

    #[test]
    fn test_children_and_epilogue() {
        let mut t = tree(MULTIPART);
        let first = t.parse_next_child(PartId::ROOT).unwrap().unwrap();
        let second = t.parse_next_child(PartId::ROOT).unwrap().unwrap();
        assert_eq!(t.parse_next_child(PartId::ROOT).unwrap(), None);

        let one = t.content_view(first).unwrap().read_all().unwrap();
        assert_eq!(one, b"one");
        let two = t.content_view(second).unwrap().read_all().unwrap();
        assert_eq!(two, b"two");

        let root = t.proxy(PartId::ROOT);
        assert!(root.end_boundary_found);
        assert_eq!(root.builder.part_end(), Some(MULTIPART.len() as u64));
        assert_eq!(t.position(), MULTIPART.len() as u64);
    }

    #[test]
    fn test_cursor_never_moves_back() {
        let mut t = tree(MULTIPART);
        let mut last = t.position();
        t.parse_content(PartId::ROOT).unwrap();
        assert!(t.position() >= last);
        last = t.position();
        while let Some(child) = t.parse_next_child(PartId::ROOT).unwrap() {
            assert!(t.position() >= last);
            last = t.position();
            t.parse_all(child).unwrap();
            assert!(t.position() >= last);
            last = t.position();
        }
    }

    #[test]
    fn test_exhausted_children_do_not_rescan() {
        let mut t = tree(MULTIPART);
        t.parse_all(PartId::ROOT).unwrap();
        let stats = t.stats();
        assert_eq!(t.parse_next_child(PartId::ROOT).unwrap(), None);
        assert_eq!(t.stats(), stats);
    }

    #[test]
    fn test_views_require_closed_ranges() {
        let t = tree(MULTIPART);
        assert!(matches!(
            t.content_view(PartId::ROOT),
            Err(MimeError::RangeNotClosed { range: "content", .. })
        ));
        assert!(matches!(
            t.raw_view(PartId::ROOT),
            Err(MimeError::RangeNotClosed { range: "part", .. })
        ));
        let headers = t.header_view(PartId::ROOT).unwrap().read_all().unwrap();
        assert_eq!(headers, b"Content-Type: multipart/mixed; boundary=X\n");
    }

    #[test]
    fn test_view_reads_do_not_disturb_parsing() {
        let mut t = tree(MULTIPART);
        let first = t.parse_next_child(PartId::ROOT).unwrap().unwrap();
        t.parse_content(first).unwrap();
        let mut view = t.header_view(PartId::ROOT).unwrap();
        view.read_all().unwrap();
        let second = t.parse_next_child(PartId::ROOT).unwrap().unwrap();
        t.parse_content(second).unwrap();
        let two = t.content_view(second).unwrap().read_all().unwrap();
        assert_eq!(two, b"two");
    }
}
