//! Batch mutation planner.
//!
//! Turns desired section content into ordered edit operations whose offsets
//! all come from one snapshot.

use tracker_core::FieldRow;

use crate::error::DocsError;
use crate::snapshot::{DocumentSnapshot, Offset, SnapshotId, Span, TableBlock};
use crate::wire::{self, Location, Request};

/// Columns of every managed table: label, value.
pub const TABLE_COLUMNS: usize = 2;

/// One edit against a single snapshot's coordinate space.
#[derive(Debug, Clone, PartialEq)]
pub enum EditOperation {
    InsertText { at: Offset, text: String },
    InsertTable { at: Offset, rows: usize, columns: usize },
    UpdateParagraphStyle { span: Span, named_style: String },
    UpdateTextStyle { span: Span, bold: bool },
    CreateNamedRange { name: String, span: Span },
    DeleteNamedRange { id: String },
    DeleteContentRange { span: Span },
}

impl EditOperation {
    /// Remove a span of content.
    pub fn delete_range(span: Span) -> Self {
        EditOperation::DeleteContentRange { span }
    }

    /// Snapshot the offsets of this operation were read from, if it has any.
    pub fn origin(&self) -> Option<SnapshotId> {
        match self {
            EditOperation::InsertText { at, .. } | EditOperation::InsertTable { at, .. } => {
                Some(at.origin())
            }
            EditOperation::UpdateParagraphStyle { span, .. }
            | EditOperation::UpdateTextStyle { span, .. }
            | EditOperation::CreateNamedRange { span, .. }
            | EditOperation::DeleteContentRange { span } => Some(span.origin()),
            EditOperation::DeleteNamedRange { .. } => None,
        }
    }

    /// Index content is inserted at, for insertions.
    pub fn insert_index(&self) -> Option<i64> {
        match self {
            EditOperation::InsertText { at, .. } | EditOperation::InsertTable { at, .. } => {
                Some(at.index())
            }
            _ => None,
        }
    }

    pub fn to_request(&self) -> Request {
        match self {
            EditOperation::InsertText { at, text } => Request::InsertText(wire::InsertText {
                text: text.clone(),
                location: Location { index: at.index() },
            }),
            EditOperation::InsertTable { at, rows, columns } => {
                Request::InsertTable(wire::InsertTable {
                    rows: *rows,
                    columns: *columns,
                    location: Location { index: at.index() },
                })
            }
            EditOperation::UpdateParagraphStyle { span, named_style } => {
                Request::UpdateParagraphStyle(wire::UpdateParagraphStyle {
                    range: span.to_wire(),
                    paragraph_style: wire::ParagraphStyle {
                        named_style_type: Some(named_style.clone()),
                    },
                    fields: "namedStyleType".to_string(),
                })
            }
            EditOperation::UpdateTextStyle { span, bold } => {
                Request::UpdateTextStyle(wire::UpdateTextStyle {
                    range: span.to_wire(),
                    text_style: wire::TextStyle { bold: Some(*bold) },
                    fields: "bold".to_string(),
                })
            }
            EditOperation::CreateNamedRange { name, span } => {
                Request::CreateNamedRange(wire::CreateNamedRange {
                    name: name.clone(),
                    range: span.to_wire(),
                })
            }
            EditOperation::DeleteNamedRange { id } => {
                Request::DeleteNamedRange(wire::DeleteNamedRange {
                    named_range_id: Some(id.clone()),
                    name: None,
                })
            }
            EditOperation::DeleteContentRange { span } => {
                Request::DeleteContentRange(wire::DeleteContentRange {
                    range: span.to_wire(),
                })
            }
        }
    }
}

/// Ordered operations applied as one atomic unit.
///
/// Operations run sequentially against a running document state, so their
/// order is part of the plan.
#[derive(Debug, Clone, PartialEq)]
pub struct EditBatch {
    origin: SnapshotId,
    operations: Vec<EditOperation>,
}

impl EditBatch {
    pub fn new(snapshot: &DocumentSnapshot) -> Self {
        Self {
            origin: snapshot.id(),
            operations: Vec::new(),
        }
    }

    /// Append `operation`, rejecting offsets taken from any other snapshot.
    pub fn push(&mut self, operation: EditOperation) -> Result<(), DocsError> {
        if let Some(found) = operation.origin() {
            if found != self.origin {
                return Err(DocsError::StaleOffset {
                    expected: self.origin,
                    found,
                });
            }
        }
        self.operations.push(operation);
        Ok(())
    }

    pub fn origin(&self) -> SnapshotId {
        self.origin
    }

    pub fn operations(&self) -> &[EditOperation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Insertion offsets in array order.
    pub fn insert_indices(&self) -> Vec<i64> {
        self.operations
            .iter()
            .filter_map(EditOperation::insert_index)
            .collect()
    }

    pub fn to_requests(&self) -> Vec<Request> {
        self.operations.iter().map(EditOperation::to_request).collect()
    }
}

fn utf16_len(text: &str) -> i64 {
    text.encode_utf16().count() as i64
}

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

/// Insert `text` as its own paragraph at the paragraph start `at`.
pub fn plan_insert_heading(
    snapshot: &DocumentSnapshot,
    at: Offset,
    text: &str,
) -> Result<EditBatch, DocsError> {
    let mut batch = EditBatch::new(snapshot);
    batch.push(EditOperation::InsertText {
        at,
        text: format!("{text}\n"),
    })?;
    Ok(batch)
}

/// Apply a named paragraph style (`HEADING_1`, ...) to `heading`.
pub fn plan_style_heading(
    snapshot: &DocumentSnapshot,
    heading: Span,
    named_style: &str,
) -> Result<EditBatch, DocsError> {
    let mut batch = EditBatch::new(snapshot);
    batch.push(EditOperation::UpdateParagraphStyle {
        span: heading,
        named_style: named_style.to_string(),
    })?;
    Ok(batch)
}

/// One empty `fields.len()` x 2 table at `at`.
pub fn plan_create_table(
    snapshot: &DocumentSnapshot,
    fields: &[FieldRow],
    at: Offset,
) -> Result<EditBatch, DocsError> {
    if fields.is_empty() {
        return Err(DocsError::malformed("cannot create a table with no rows"));
    }
    let mut batch = EditBatch::new(snapshot);
    batch.push(EditOperation::InsertTable {
        at,
        rows: fields.len(),
        columns: TABLE_COLUMNS,
    })?;
    Ok(batch)
}

/// Fill an empty table with `fields`, labels bold.
///
/// Rows are visited last to first and, inside a row, the value cell before
/// the label cell, so insertion offsets are strictly decreasing and each one
/// is still valid when it is applied. `table` must come from a snapshot taken
/// after the table was inserted.
pub fn plan_populate_table(
    snapshot: &DocumentSnapshot,
    table: &TableBlock,
    fields: &[FieldRow],
) -> Result<EditBatch, DocsError> {
    if table.rows.len() != fields.len() {
        return Err(DocsError::malformed(format!(
            "table has {} rows, expected {}",
            table.rows.len(),
            fields.len()
        )));
    }
    let mut batch = EditBatch::new(snapshot);
    for (row, field) in table.rows.iter().zip(fields).rev() {
        if row.cells.len() != TABLE_COLUMNS {
            return Err(DocsError::malformed(format!(
                "table row at {} has {} cells, expected {TABLE_COLUMNS}",
                row.span.start(),
                row.cells.len()
            )));
        }
        let value_at = row.cells[1].content_start();
        if !field.value.is_empty() {
            batch.push(EditOperation::InsertText {
                at: value_at,
                text: field.value.clone(),
            })?;
        }
        let label_at = row.cells[0].content_start();
        if !field.label.is_empty() {
            batch.push(EditOperation::InsertText {
                at: label_at,
                text: field.label.clone(),
            })?;
            batch.push(EditOperation::UpdateTextStyle {
                span: label_at.extend(utf16_len(&field.label)),
                bold: true,
            })?;
        }
    }
    Ok(batch)
}

/// Register `span` under `name`.
pub fn plan_register_section(
    snapshot: &DocumentSnapshot,
    name: &str,
    span: Span,
) -> Result<EditBatch, DocsError> {
    let mut batch = EditBatch::new(snapshot);
    batch.push(EditOperation::CreateNamedRange {
        name: name.to_string(),
        span,
    })?;
    Ok(batch)
}

/// Drop the registrations first, then the content they covered.
pub fn plan_delete_section(
    snapshot: &DocumentSnapshot,
    registrations: &[String],
    content: Span,
) -> Result<EditBatch, DocsError> {
    let mut batch = EditBatch::new(snapshot);
    for id in registrations {
        batch.push(EditOperation::DeleteNamedRange { id: id.clone() })?;
    }
    batch.push(EditOperation::delete_range(content))?;
    Ok(batch)
}
