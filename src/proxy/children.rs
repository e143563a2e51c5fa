//! Lazily populated child list.
//!
//! Children are discovered in order, one `parse_next_child` call at a
//! time, and only as far as the requested index. Once the parent reports
//! there are no more, the negative answer is cached.

use super::tree::PartTree;
use super::PartId;
use crate::error::Result;

#[derive(Debug, Default, Clone, Copy)]
pub struct LazyChildren {
    exhausted: bool,
}

impl LazyChildren {
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub(crate) fn mark_exhausted(&mut self) {
        self.exhausted = true;
    }
}

impl PartTree {
    /// Returns `true` if `id` has a child at `index`, discovering children
    /// up to that index if needed.
    pub fn child_exists(&mut self, id: PartId, index: usize) -> Result<bool> {
        loop {
            let proxy = self.proxy(id);
            if index < proxy.builder.children().len() {
                return Ok(true);
            }
            if proxy.children.is_exhausted() {
                return Ok(false);
            }
            if self.parse_next_child(id)?.is_none() {
                return Ok(false);
            }
        }
    }

    /// The child of `id` at `index`, or `None` past the last child.
    pub fn child_at(&mut self, id: PartId, index: usize) -> Result<Option<PartId>> {
        if !self.child_exists(id, index)? {
            return Ok(None);
        }
        Ok(self.proxy(id).builder.children().get(index).copied())
    }

    /// Number of children of `id`. Discovers all of them.
    pub fn child_count(&mut self, id: PartId) -> Result<usize> {
        while self.parse_next_child(id)?.is_some() {}
        Ok(self.proxy(id).builder.children().len())
    }

    /// Children discovered so far, without reading further.
    pub fn known_children(&self, id: PartId) -> &[PartId] {
        self.proxy(id).builder.children()
    }
}
