//! Serializable snapshot of a realized part tree, used for `tree --json`.

use serde::Serialize;

use super::part::Part;
use crate::error::Result;
use crate::parser::part_builder::PartOffsets;
use crate::proxy::{PartId, PartType};

#[derive(Debug, Clone, Serialize)]
pub struct PartSummary {
    pub id: PartId,
    /// IMAP-style path (`""` for the message itself).
    pub path: String,
    pub part_type: PartType,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boundary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uu_mode: Option<u32>,
    pub offsets: PartOffsets,
    pub content_length: u64,
    pub end_boundary_found: bool,
    pub parent_boundary_found: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PartSummary>,
}

impl PartSummary {
    /// Number of parts in this subtree, itself included.
    pub fn part_count(&self) -> usize {
        1 + self.children.iter().map(PartSummary::part_count).sum::<usize>()
    }
}

/// Snapshot `part` and its subtree. Children are realized on the way.
pub fn summarize(part: &Part, path: String) -> Result<PartSummary> {
    let offsets = part.offsets();
    let content_length = offsets
        .content_end
        .map_or(0, |end| end.saturating_sub(offsets.content_start));

    let mut children = Vec::new();
    for (i, child) in part.children()?.iter().enumerate() {
        let child_path = if path.is_empty() {
            (i + 1).to_string()
        } else {
            format!("{path}.{}", i + 1)
        };
        children.push(summarize(child, child_path)?);
    }

    Ok(PartSummary {
        id: part.id(),
        path,
        part_type: part.part_type(),
        content_type: part.content_type(),
        boundary: part.boundary(),
        filename: part.filename(),
        uu_mode: part.uu_mode(),
        offsets,
        content_length,
        end_boundary_found: part.end_boundary_found(),
        parent_boundary_found: part.parent_boundary_found(),
        children,
    })
}

#[cfg(test)]
mod tests {
    use crate::parser::MessageParser;
    use crate::proxy::PartType;

    #[test]
    fn test_summary_of_legacy_message() {
        let raw = "Subject: files\n\nsee attached\nbegin 644 a.txt\n#86)C\n`\nend\nbye\n";
        let message = MessageParser::new().parse_bytes(raw).unwrap();
        let summary = message.summary().unwrap();

        assert_eq!(summary.part_type, PartType::Message);
        assert_eq!(summary.part_count(), 2);
        let uu = &summary.children[0];
        assert_eq!(uu.path, "1");
        assert_eq!(uu.part_type, PartType::UuEncoded);
        assert_eq!(uu.filename.as_deref(), Some("a.txt"));
        assert_eq!(uu.uu_mode, Some(0o644));
        assert_eq!(uu.offsets.part_end, Some(raw.len() as u64));

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["children"][0]["part_type"], "uu-encoded");
        assert!(json.get("boundary").is_none());
    }
}
