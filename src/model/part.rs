//! Public handles over the lazy part tree.
//!
//! A [`Message`] owns the parse session. [`Part`] handles are cheap clones
//! that share it; any of them may drive parsing forward. Handles are
//! single-threaded (`Rc`), like the session itself.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::{MimeError, Result};
use crate::model::summary::{self, PartSummary};
use crate::parser::header::HeaderCollection;
use crate::parser::part_builder::PartOffsets;
use crate::parser::strategy::ParserStrategy;
use crate::proxy::tree::{ParseStats, PartTree};
use crate::proxy::{PartId, PartKind, PartType};
use crate::store::view::BoundedView;

/// A parsed (or partially parsed) message.
pub struct Message {
    tree: Rc<RefCell<PartTree>>,
}

impl Message {
    pub(crate) fn new(tree: PartTree) -> Self {
        Self {
            tree: Rc::new(RefCell::new(tree)),
        }
    }

    /// The top-level part.
    pub fn root(&self) -> Part {
        Part {
            tree: Rc::clone(&self.tree),
            id: PartId::ROOT,
        }
    }

    /// Resolve an IMAP-style part path such as `"2.1"` (1-based at every
    /// level). The empty path is the root. Only the parts on the way are
    /// realized.
    pub fn part_at_path(&self, path: &str) -> Result<Part> {
        let mut part = self.root();
        if path.trim().is_empty() {
            return Ok(part);
        }
        for segment in path.trim().split('.') {
            let index = match segment.parse::<usize>() {
                Ok(n) if n > 0 => n - 1,
                _ => return Err(MimeError::InvalidPartPath(path.to_string())),
            };
            part = part
                .child_at(index)?
                .ok_or_else(|| MimeError::InvalidPartPath(path.to_string()))?;
        }
        Ok(part)
    }

    /// Realize the whole tree.
    pub fn parse_all(&self) -> Result<()> {
        self.tree.borrow_mut().parse_all(PartId::ROOT)
    }

    pub fn stats(&self) -> ParseStats {
        self.tree.borrow().stats()
    }

    /// Offset the parser will read next.
    pub fn cursor_position(&self) -> u64 {
        self.tree.borrow().position()
    }

    /// Number of parts discovered so far, the root included.
    pub fn part_count(&self) -> usize {
        self.tree.borrow().arena().len()
    }

    /// Realize the whole tree and snapshot it.
    pub fn summary(&self) -> Result<PartSummary> {
        self.parse_all()?;
        summary::summarize(&self.root(), String::new())
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("parts", &self.part_count())
            .field("position", &self.cursor_position())
            .finish()
    }
}

/// One node of a message: the message itself, a MIME body part, or a
/// legacy UU-encoded attachment.
#[derive(Clone)]
pub struct Part {
    tree: Rc<RefCell<PartTree>>,
    id: PartId,
}

impl Part {
    fn wrap(&self, id: PartId) -> Part {
        Part {
            tree: Rc::clone(&self.tree),
            id,
        }
    }

    pub fn id(&self) -> PartId {
        self.id
    }

    pub fn part_type(&self) -> PartType {
        self.tree.borrow().proxy(self.id).part_type()
    }

    pub fn parent(&self) -> Option<Part> {
        let parent = self.tree.borrow().proxy(self.id).parent();
        parent.map(|id| self.wrap(id))
    }

    // ── Headers ─────────────────────────────────────────────────

    /// Copy of the live header collection.
    pub fn headers(&self) -> HeaderCollection {
        self.tree.borrow().proxy(self.id).live.clone()
    }

    /// Raw value of the first header named `name`.
    pub fn header(&self, name: &str) -> Option<String> {
        self.tree
            .borrow()
            .proxy(self.id)
            .live
            .get(name)
            .map(str::to_string)
    }

    /// Value of the first header named `name`, with encoded-words decoded.
    pub fn header_decoded(&self, name: &str) -> Option<String> {
        self.tree.borrow().proxy(self.id).live.get_decoded(name)
    }

    /// Replace (or add) a header. Parsing keeps using the headers the part
    /// had when it was discovered.
    pub fn set_header(&self, name: &str, value: impl Into<String>) {
        self.tree
            .borrow_mut()
            .proxy_mut(self.id)
            .live
            .set(name, value);
    }

    pub fn remove_header(&self, name: &str) -> usize {
        self.tree.borrow_mut().proxy_mut(self.id).live.remove(name)
    }

    /// Lower-cased `type/subtype`. Defaults to `text/plain`, or
    /// `application/octet-stream` for UU-encoded parts.
    pub fn content_type(&self) -> String {
        let tree = self.tree.borrow();
        let proxy = tree.proxy(self.id);
        if let PartKind::UuEncoded { .. } = proxy.kind {
            return "application/octet-stream".to_string();
        }
        proxy
            .live
            .parsed("Content-Type")
            .map(|ct| ct.value().to_ascii_lowercase())
            .filter(|ct| !ct.is_empty())
            .unwrap_or_else(|| "text/plain".to_string())
    }

    pub fn charset(&self) -> Option<String> {
        let tree = self.tree.borrow();
        let ct = tree.proxy(self.id).live.parsed("Content-Type")?;
        ct.parameter("charset").map(|c| c.to_ascii_lowercase())
    }

    /// Lower-cased Content-Transfer-Encoding, if declared.
    pub fn transfer_encoding(&self) -> Option<String> {
        self.tree
            .borrow()
            .proxy(self.id)
            .live
            .parsed("Content-Transfer-Encoding")
            .map(|cte| cte.value().to_ascii_lowercase())
    }

    /// Attachment file name: Content-Disposition `filename`, then
    /// Content-Type `name`, then the name on a UU `begin` line.
    ///
    /// RFC 2231 continued and charset-tagged values come back joined and
    /// decoded, as do RFC 2047 encoded-words inside quoted values.
    pub fn filename(&self) -> Option<String> {
        let tree = self.tree.borrow();
        let proxy = tree.proxy(self.id);
        if let PartKind::UuEncoded { ref filename, .. } = proxy.kind {
            return Some(filename.clone());
        }
        let from_param = |header: &str, param: &str| {
            proxy
                .live
                .parsed(header)
                .and_then(|h| h.parameter(param).map(str::to_string))
        };
        from_param("Content-Disposition", "filename").or_else(|| from_param("Content-Type", "name"))
    }

    /// File mode from the `begin` line of a UU-encoded part.
    pub fn uu_mode(&self) -> Option<u32> {
        match self.tree.borrow().proxy(self.id).kind {
            PartKind::UuEncoded { mode, .. } => Some(mode),
            _ => None,
        }
    }

    /// `true` if the part declared a multipart boundary when discovered.
    pub fn is_multipart(&self) -> bool {
        self.boundary().is_some()
    }

    pub fn boundary(&self) -> Option<String> {
        self.tree
            .borrow_mut()
            .proxy_mut(self.id)
            .mime_boundary()
            .map(str::to_string)
    }

    // ── Parsing ─────────────────────────────────────────────────

    pub fn parse_content(&self) -> Result<()> {
        self.tree.borrow_mut().parse_content(self.id)
    }

    pub fn parse_next_child(&self) -> Result<Option<Part>> {
        let child = self.tree.borrow_mut().parse_next_child(self.id)?;
        Ok(child.map(|id| self.wrap(id)))
    }

    pub fn parse_all(&self) -> Result<()> {
        self.tree.borrow_mut().parse_all(self.id)
    }

    // ── Children ────────────────────────────────────────────────

    pub fn has_child(&self, index: usize) -> Result<bool> {
        self.tree.borrow_mut().child_exists(self.id, index)
    }

    pub fn child_at(&self, index: usize) -> Result<Option<Part>> {
        let child = self.tree.borrow_mut().child_at(self.id, index)?;
        Ok(child.map(|id| self.wrap(id)))
    }

    pub fn child_count(&self) -> Result<usize> {
        self.tree.borrow_mut().child_count(self.id)
    }

    /// All children. Discovers every one of them.
    pub fn children(&self) -> Result<Vec<Part>> {
        self.child_count()?;
        let tree = self.tree.borrow();
        Ok(tree
            .known_children(self.id)
            .iter()
            .map(|&id| self.wrap(id))
            .collect())
    }

    // ── Ledger and views ────────────────────────────────────────

    pub fn offsets(&self) -> PartOffsets {
        self.tree.borrow().proxy(self.id).builder.offsets()
    }

    pub fn end_boundary_found(&self) -> bool {
        self.tree.borrow().proxy(self.id).end_boundary_found
    }

    pub fn parent_boundary_found(&self) -> bool {
        self.tree.borrow().proxy(self.id).parent_boundary_found
    }

    pub fn header_view(&self) -> Result<BoundedView> {
        self.tree.borrow().header_view(self.id)
    }

    /// View over the content. Fails with [`MimeError::RangeNotClosed`]
    /// until [`parse_content`](Self::parse_content) has run.
    pub fn content_view(&self) -> Result<BoundedView> {
        self.tree.borrow().content_view(self.id)
    }

    /// View over the whole part. Fails until the part is fully realized.
    pub fn raw_view(&self) -> Result<BoundedView> {
        self.tree.borrow().raw_view(self.id)
    }

    /// Content bytes, parsing as far as needed.
    pub fn content(&self) -> Result<Vec<u8>> {
        self.parse_content()?;
        let view = self.content_view()?;
        self.read_view(view)
    }

    /// The whole part as it appears in the source, parsing it fully.
    pub fn raw(&self) -> Result<Vec<u8>> {
        self.parse_all()?;
        let view = self.raw_view()?;
        self.read_view(view)
    }

    /// Content with the transfer encoding undone.
    ///
    /// Only MIME leaves are decoded (text is returned as UTF-8). Multipart
    /// and UU-encoded parts yield their raw content.
    pub fn decoded_content(&self) -> Result<Vec<u8>> {
        let raw = self.content()?;
        let snapshot = {
            let mut tree = self.tree.borrow_mut();
            let proxy = tree.proxy_mut(self.id);
            if proxy.strategy != ParserStrategy::Mime || proxy.mime_boundary().is_some() {
                return Ok(raw);
            }
            proxy.snapshot.clone()
        };

        let mut wire = Vec::with_capacity(raw.len() + 512);
        for h in snapshot.iter() {
            wire.extend_from_slice(h.name.as_bytes());
            wire.extend_from_slice(b": ");
            wire.extend_from_slice(h.value.as_bytes());
            wire.extend_from_slice(b"\r\n");
        }
        wire.extend_from_slice(b"\r\n");
        wire.extend_from_slice(&raw);

        let decoded = mail_parser::MessageParser::default()
            .parse(&wire[..])
            .and_then(|msg| msg.part(0).map(|part| part.contents().to_vec()));
        Ok(decoded.unwrap_or(raw))
    }

    fn read_view(&self, mut view: BoundedView) -> Result<Vec<u8>> {
        let start = view.start();
        view.read_all()
            .map_err(|e| MimeError::read(self.id, start, e))
    }
}

impl fmt::Debug for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Part")
            .field("id", &self.id)
            .field("type", &self.part_type())
            .finish()
    }
}

impl PartialEq for Part {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.tree, &other.tree) && self.id == other.id
    }
}
