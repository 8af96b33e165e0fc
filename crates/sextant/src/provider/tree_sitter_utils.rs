//! Shared tree-sitter helpers for text and position extraction.

// Tree-sitter returns usize for positions, but we store u32 for compactness.
// This is safe for practical source files (no file has 4 billion lines).
#![allow(clippy::cast_possible_truncation)]

use tree_sitter::Node;

use crate::types::Position;

/// Source text covered by a node.
///
/// Returns `None` if the byte range is not on a character boundary.
pub fn node_text<'s>(node: &Node<'_>, source: &'s str) -> Option<&'s str> {
    let text = source.get(node.byte_range());
    if text.is_none() {
        tracing::trace!(
            byte_range = ?node.byte_range(),
            node_kind = %node.kind(),
            "Node range is not a valid UTF-8 slice"
        );
    }
    text
}

/// Start of a node: 1-based line, 0-based column.
pub fn node_start(node: &Node<'_>) -> Position {
    let point = node.start_position();
    Position::new(point.row as u32 + 1, point.column as u32)
}

/// End of a node: 1-based line, 0-based column.
pub fn node_end(node: &Node<'_>) -> Position {
    let point = node.end_position();
    Position::new(point.row as u32 + 1, point.column as u32)
}

/// Named children of a node, collected so the cursor borrow ends here.
pub fn named_children<'t>(node: &Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

/// All children for a repeated field, collected.
pub fn field_children<'t>(node: &Node<'t>, field: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children_by_field_name(field, &mut cursor).collect()
}

/// Position of the first `ERROR` or `MISSING` node, depth-first.
pub fn first_error(node: &Node<'_>) -> Option<Position> {
    if node.is_error() || node.is_missing() {
        return Some(node_start(node));
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(position) = first_error(&child) {
            return Some(position);
        }
    }
    None
}
