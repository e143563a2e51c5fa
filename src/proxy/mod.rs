//! Lazy part proxies.
//!
//! One [`PartProxy`] exists per discovered part. Proxies live in a
//! [`PartArena`] owned by the [`PartTree`](tree::PartTree); parent links
//! are plain [`PartId`]s so the tree has a single owner and no cycles.

pub mod children;
pub mod tree;

use std::fmt;
use std::ops::{Index, IndexMut};

use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::parser::header::{HeaderBlock, HeaderCollection};
use crate::parser::part_builder::PartBuilder;
use crate::parser::strategy::ParserStrategy;
use children::LazyChildren;

/// Handle of a part inside its message's arena. The root is always `#0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PartId(pub(crate) usize);

impl PartId {
    pub const ROOT: PartId = PartId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for PartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lazily computed multipart boundary.
///
/// Kept as an explicit tri-state so "not computed yet" can never be
/// confused with "computed, and there is none".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BoundaryCache {
    #[default]
    NotQueried,
    None,
    Boundary(String),
}

/// A `begin MODE FILENAME` line found while scanning legacy content, waiting
/// for the message to turn it into a child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUuPart {
    pub start: u64,
    pub content_start: u64,
    pub mode: u32,
    pub filename: String,
}

/// Variant-specific proxy state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartKind {
    /// The top-level message. Legacy messages stash the next UU part here.
    Message { pending_uu: Option<PendingUuPart> },
    /// A MIME body part.
    Mime,
    /// A legacy UU-encoded attachment inside a non-MIME message.
    UuEncoded { mode: u32, filename: String },
}

/// Public classification of a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartType {
    Message,
    Mime,
    UuEncoded,
}

/// Parse state of one part.
#[derive(Debug)]
pub struct PartProxy {
    pub(crate) builder: PartBuilder,
    /// Header copy taken at creation; parsing decisions read only this.
    pub(crate) snapshot: HeaderCollection,
    /// Headers exposed to (and mutable by) callers.
    pub(crate) live: HeaderCollection,
    pub(crate) strategy: ParserStrategy,
    pub(crate) kind: PartKind,
    boundary: BoundaryCache,
    /// This part's own closing delimiter was seen.
    pub(crate) end_boundary_found: bool,
    /// An ancestor's delimiter (or EOF) ended this part.
    pub(crate) parent_boundary_found: bool,
    /// A `--B` line of this part was read and no child has been opened
    /// after it yet.
    pub(crate) open_delimiter: bool,
    /// Owned by the children list; must be fully realized before the next
    /// sibling is searched for.
    pub(crate) last_added_child: Option<PartId>,
    pub(crate) children: LazyChildren,
}

impl PartProxy {
    /// Create a proxy for a freshly read header block. The content range is
    /// opened at `block.content_start`.
    pub fn new(
        id: PartId,
        parent: Option<PartId>,
        block: HeaderBlock,
        strategy: ParserStrategy,
        kind: PartKind,
    ) -> Result<Self> {
        let mut builder = PartBuilder::new(id, parent);
        builder.record_header_range(block.start, block.end)?;
        builder.record_content_range(block.content_start, None)?;
        Ok(Self {
            builder,
            live: block.headers.clone(),
            snapshot: block.headers,
            strategy,
            kind,
            boundary: BoundaryCache::NotQueried,
            end_boundary_found: false,
            parent_boundary_found: false,
            open_delimiter: false,
            last_added_child: None,
            children: LazyChildren::default(),
        })
    }

    pub fn id(&self) -> PartId {
        self.builder.id()
    }

    pub fn parent(&self) -> Option<PartId> {
        self.builder.parent()
    }

    pub fn part_type(&self) -> PartType {
        match self.kind {
            PartKind::Message { .. } => PartType::Message,
            PartKind::Mime => PartType::Mime,
            PartKind::UuEncoded { .. } => PartType::UuEncoded,
        }
    }

    /// The multipart boundary, computed from the header snapshot on first
    /// use. Only MIME parts with a `multipart/*` type can have one.
    pub fn mime_boundary(&mut self) -> Option<&str> {
        if self.boundary == BoundaryCache::NotQueried {
            self.boundary = match self.strategy {
                ParserStrategy::Mime => boundary_from_headers(&self.snapshot),
                ParserStrategy::NonMime => BoundaryCache::None,
            };
            if let BoundaryCache::Boundary(ref b) = self.boundary {
                debug!(part = %self.id(), boundary = %b, "Found multipart boundary");
            }
        }
        match self.boundary {
            BoundaryCache::Boundary(ref b) => Some(b.as_str()),
            _ => None,
        }
    }

    /// The cache state, without triggering the computation.
    pub fn boundary_cache(&self) -> &BoundaryCache {
        &self.boundary
    }

    /// No further lines can belong to this part or its children.
    pub fn is_finished(&self) -> bool {
        self.end_boundary_found || self.parent_boundary_found
    }
}

fn boundary_from_headers(headers: &HeaderCollection) -> BoundaryCache {
    let Some(ct) = headers.parsed("Content-Type") else {
        return BoundaryCache::None;
    };
    let is_multipart = ct
        .value()
        .get(..10)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("multipart/"));
    match ct.parameter("boundary") {
        Some(b) if is_multipart && !b.is_empty() => BoundaryCache::Boundary(b.to_string()),
        _ => BoundaryCache::None,
    }
}

/// Owner of every proxy of one message.
#[derive(Debug, Default)]
pub struct PartArena {
    nodes: Vec<PartProxy>,
}

impl PartArena {
    /// The id the next inserted proxy will get.
    pub fn next_id(&self) -> PartId {
        PartId(self.nodes.len())
    }

    /// Insert a proxy and link it under its parent.
    pub fn insert(&mut self, proxy: PartProxy) -> PartId {
        let id = proxy.id();
        debug_assert_eq!(id, self.next_id(), "proxies are inserted in id order");
        if let Some(parent) = proxy.parent() {
            let parent = &mut self.nodes[parent.0];
            parent.builder.add_child(id);
            parent.last_added_child = Some(id);
        }
        self.nodes.push(proxy);
        id
    }

    pub fn get(&self, id: PartId) -> Option<&PartProxy> {
        self.nodes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Mark `id` as ended by EOF, and its immediate parent with it.
    ///
    /// The flag travels only one level; grandparents notice EOF themselves
    /// the next time they look for a child.
    pub fn set_eof(&mut self, id: PartId, eof: u64) {
        let node = &mut self[id];
        node.parent_boundary_found = true;
        node.builder.close_part(eof);
        if let Some(parent) = node.parent() {
            let parent = &mut self[parent];
            parent.parent_boundary_found = true;
            parent.builder.close_part(eof);
        }
    }
}

impl Index<PartId> for PartArena {
    type Output = PartProxy;

    fn index(&self, id: PartId) -> &PartProxy {
        &self.nodes[id.0]
    }
}

impl IndexMut<PartId> for PartArena {
    fn index_mut(&mut self, id: PartId) -> &mut PartProxy {
        &mut self.nodes[id.0]
    }
}
