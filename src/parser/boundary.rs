//! Multipart delimiter detection.
//!
//! [`classify`] is the pure comparison of one line against one boundary.
//! [`match_line`] walks outward from the part being scanned: ancestors are
//! asked first, because a delimiter only means something relative to the
//! multipart that declared it. A line claimed by an ancestor ends every
//! part between that ancestor and the scanned part.

use crate::proxy::{PartArena, PartId};

/// How a line relates to a single boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    /// Ordinary content.
    Content,
    /// `--B`: the next body part starts after this line.
    Start,
    /// `--B--`: the multipart ends here.
    End,
}

/// Outcome of matching a line for a part whose content is being scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryMatch {
    /// Not a delimiter this part or any ancestor cares about.
    None,
    /// The part's own `--B`: first child or next sibling starts.
    Start,
    /// The part's own `--B--`.
    End,
    /// An ancestor claimed the line; this part is implicitly finished.
    Ancestor,
}

impl BoundaryMatch {
    pub fn is_match(self) -> bool {
        self != BoundaryMatch::None
    }
}

/// Compare a line (trailing whitespace already removed) against `boundary`.
pub fn classify(line: &[u8], boundary: &str) -> LineClass {
    let rest = line
        .strip_prefix(b"--")
        .and_then(|rest| rest.strip_prefix(boundary.as_bytes()));
    match rest {
        Some(b"") => LineClass::Start,
        Some(b"--") => LineClass::End,
        _ => LineClass::Content,
    }
}

/// Match `line` for the part `id`, ancestors first.
///
/// `delimiter_start` is where the delimiter begins once the line break
/// preceding it is counted in. Every part ended by an ancestor's delimiter
/// gets `parent_boundary_found` and a part end at that offset.
pub fn match_line(
    arena: &mut PartArena,
    id: PartId,
    line: &[u8],
    delimiter_start: u64,
) -> BoundaryMatch {
    if let Some(parent) = arena[id].parent() {
        if match_line(arena, parent, line, delimiter_start).is_match() {
            let node = &mut arena[id];
            node.parent_boundary_found = true;
            node.builder.close_part(delimiter_start);
            return BoundaryMatch::Ancestor;
        }
    }

    let node = &mut arena[id];
    let class = match node.mime_boundary() {
        Some(boundary) => classify(line, boundary),
        None => return BoundaryMatch::None,
    };
    match class {
        LineClass::Content => BoundaryMatch::None,
        LineClass::Start => {
            node.open_delimiter = true;
            BoundaryMatch::Start
        }
        LineClass::End => {
            node.end_boundary_found = true;
            BoundaryMatch::End
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::header::{HeaderBlock, HeaderCollection};
    use crate::parser::strategy::ParserStrategy;
    use crate::proxy::{PartKind, PartProxy};

    fn add(arena: &mut PartArena, parent: Option<PartId>, content_type: &str) -> PartId {
        let mut headers = HeaderCollection::new();
        headers.push("Content-Type", content_type);
        let block = HeaderBlock {
            headers,
            start: 0,
            end: 0,
            content_start: 0,
        };
        let kind = if parent.is_none() {
            PartKind::Message { pending_uu: None }
        } else {
            PartKind::Mime
        };
        let id = arena.next_id();
        let proxy = PartProxy::new(id, parent, block, ParserStrategy::Mime, kind).unwrap();
        arena.insert(proxy)
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(b"--abc", "abc"), LineClass::Start);
        assert_eq!(classify(b"--abc--", "abc"), LineClass::End);
        assert_eq!(classify(b"--abcd", "abc"), LineClass::Content);
        assert_eq!(classify(b"abc", "abc"), LineClass::Content);
        assert_eq!(classify(b"--abc---", "abc"), LineClass::Content);
        assert_eq!(classify(b"", "abc"), LineClass::Content);
    }

    #[test]
    fn test_own_end_boundary_sets_flag() {
        let mut arena = PartArena::default();
        let root = add(&mut arena, None, "multipart/mixed; boundary=X");
        assert_eq!(match_line(&mut arena, root, b"--X", 0), BoundaryMatch::Start);
        assert!(!arena[root].end_boundary_found);
        assert!(arena[root].open_delimiter);
        assert_eq!(match_line(&mut arena, root, b"--X--", 0), BoundaryMatch::End);
        assert!(arena[root].end_boundary_found);
    }

    #[test]
    fn test_ancestor_boundary_takes_precedence() {
        let mut arena = PartArena::default();
        let outer = add(&mut arena, None, "multipart/mixed; boundary=X");
        let inner = add(&mut arena, Some(outer), "multipart/alternative; boundary=Y");
        let leaf = add(&mut arena, Some(inner), "text/plain");

        assert_eq!(match_line(&mut arena, leaf, b"--Y", 40), BoundaryMatch::Ancestor);
        assert!(arena[leaf].parent_boundary_found);
        assert!(!arena[inner].parent_boundary_found);

        let leaf2 = add(&mut arena, Some(inner), "text/html");
        assert_eq!(match_line(&mut arena, leaf2, b"--X", 90), BoundaryMatch::Ancestor);
        assert!(arena[leaf2].parent_boundary_found);
        assert!(arena[inner].parent_boundary_found);
        assert!(!arena[inner].end_boundary_found);
        assert_eq!(arena[inner].builder.part_end(), Some(90));
    }

    #[test]
    fn test_content_line_matches_nothing() {
        let mut arena = PartArena::default();
        let root = add(&mut arena, None, "multipart/mixed; boundary=X");
        let leaf = add(&mut arena, Some(root), "text/plain");
        assert_eq!(
            match_line(&mut arena, leaf, b"hello --X", 0),
            BoundaryMatch::None
        );
        assert!(!arena[leaf].parent_boundary_found);
    }
}
