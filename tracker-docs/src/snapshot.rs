//! Immutable document snapshots and the offsets derived from them.
//!
//! Every [`DocumentSnapshot`] gets a process-unique [`SnapshotId`]. Offsets
//! and spans read from a snapshot carry that id, and
//! [`EditBatch`](crate::planner::EditBatch) refuses to mix ids, so an offset
//! can never silently outlive the document state it was measured against.
//! The only value that crosses round trips is an [`Anchor`], which must be
//! re-resolved against a fresh snapshot before use.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;
use tracker_core::{DocumentId, FieldRow};

use crate::error::DocsError;
use crate::gateway::DocsGateway;
use crate::wire;

static NEXT_SNAPSHOT: AtomicU64 = AtomicU64::new(1);

/// Identity of one read of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotId(u64);

impl SnapshotId {
    fn next() -> Self {
        Self(NEXT_SNAPSHOT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Offsets
// ---------------------------------------------------------------------------

/// A single position in one snapshot's coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offset {
    index: i64,
    origin: SnapshotId,
}

impl Offset {
    pub fn index(&self) -> i64 {
        self.index
    }

    pub fn origin(&self) -> SnapshotId {
        self.origin
    }

    /// The span of `len` units starting here, in the same snapshot.
    pub fn extend(self, len: i64) -> Span {
        Span {
            start: self.index,
            end: self.index + len,
            origin: self.origin,
        }
    }
}

/// A half-open `[start, end)` range in one snapshot's coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    start: i64,
    end: i64,
    origin: SnapshotId,
}

impl Span {
    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    pub fn len(&self) -> i64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn origin(&self) -> SnapshotId {
        self.origin
    }

    pub fn start_offset(&self) -> Offset {
        Offset {
            index: self.start,
            origin: self.origin,
        }
    }

    pub fn end_offset(&self) -> Offset {
        Offset {
            index: self.end,
            origin: self.origin,
        }
    }

    pub fn contains(&self, other: &Span) -> bool {
        self.origin == other.origin && self.start <= other.start && other.end <= self.end
    }

    /// The smallest span covering both.
    pub fn cover(&self, other: &Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            origin: self.origin,
        }
    }

    pub fn to_wire(&self) -> wire::Range {
        wire::Range::new(self.start, self.end)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// A raw position carried between round trips.
///
/// Valid only while every edit applied since it was taken landed at or after
/// it. Use [`DocumentSnapshot::resolve`] to turn it back into an [`Offset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Anchor(i64);

impl Anchor {
    /// First index of the body, just past the leading section break.
    pub const BODY_START: Anchor = Anchor(1);

    pub fn index(&self) -> i64 {
        self.0
    }
}

impl From<Offset> for Anchor {
    fn from(offset: Offset) -> Self {
        Anchor(offset.index)
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Blocks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct TextSegment {
    pub span: Span,
    pub text: String,
    pub bold: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParagraphBlock {
    pub span: Span,
    /// Raw paragraph text including the terminating newline.
    pub text: String,
    pub named_style: Option<String>,
    pub runs: Vec<TextSegment>,
}

impl ParagraphBlock {
    pub fn trimmed(&self) -> &str {
        self.text.trim()
    }

    pub fn is_blank(&self) -> bool {
        self.trimmed().is_empty()
    }

    pub fn is_heading_style(&self) -> bool {
        self.named_style
            .as_deref()
            .is_some_and(|s| s.starts_with("HEADING_") || s == "TITLE")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CellBlock {
    pub span: Span,
    pub content: Vec<ParagraphBlock>,
}

impl CellBlock {
    /// Where text typed into an empty cell lands.
    pub fn content_start(&self) -> Offset {
        self.content
            .first()
            .map(|p| p.span.start_offset())
            .unwrap_or(Offset {
                index: self.span.start + 1,
                origin: self.span.origin,
            })
    }

    /// Cell text without the final paragraph newline.
    pub fn text(&self) -> String {
        let joined: String = self.content.iter().map(|p| p.text.as_str()).collect();
        joined.trim_end_matches('\n').to_string()
    }

    /// True when the cell has text and all of it is bold.
    pub fn is_bold(&self) -> bool {
        let mut visible = self
            .content
            .iter()
            .flat_map(|p| p.runs.iter())
            .filter(|run| !run.text.trim().is_empty())
            .peekable();
        visible.peek().is_some() && visible.all(|run| run.bold)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowBlock {
    pub span: Span,
    pub cells: Vec<CellBlock>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableBlock {
    pub span: Span,
    pub columns: usize,
    pub rows: Vec<RowBlock>,
}

impl TableBlock {
    /// Rows read back as `(label, value)` pairs from the first two columns.
    pub fn field_rows(&self) -> Vec<FieldRow> {
        self.rows
            .iter()
            .map(|row| {
                let text = |i: usize| row.cells.get(i).map(CellBlock::text).unwrap_or_default();
                FieldRow::new(text(0), text(1))
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Paragraph(ParagraphBlock),
    Table(TableBlock),
    /// Section breaks, tables of contents, and anything else not edited here.
    Other(Span),
}

impl Block {
    pub fn span(&self) -> Span {
        match self {
            Block::Paragraph(p) => p.span,
            Block::Table(t) => t.span,
            Block::Other(span) => *span,
        }
    }
}

/// One registration of a named range.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredRange {
    pub id: String,
    pub span: Span,
}

/// Result of [`DocumentSnapshot::find_heading`].
#[derive(Debug, Clone, PartialEq)]
pub struct HeadingMatch {
    pub span: Span,
    pub is_styled_as_heading: bool,
    pub named_style: Option<String>,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// An immutable, point-in-time read of a document.
#[derive(Debug, Clone)]
pub struct DocumentSnapshot {
    id: SnapshotId,
    document_id: DocumentId,
    revision_id: Option<String>,
    blocks: Vec<Block>,
    named_ranges: BTreeMap<String, Vec<RegisteredRange>>,
    end_index: i64,
}

/// Full-document read through `gateway`.
pub fn get_snapshot<G>(gateway: &G, document_id: &DocumentId) -> Result<DocumentSnapshot, DocsError>
where
    G: DocsGateway + ?Sized,
{
    let document = gateway.get_document(document_id)?;
    let snapshot = DocumentSnapshot::from_wire(document_id.clone(), &document);
    debug!(
        "read {} as snapshot {} ({} blocks, {} named ranges)",
        document_id.masked(),
        snapshot.id,
        snapshot.blocks.len(),
        snapshot.named_ranges.len()
    );
    Ok(snapshot)
}

impl DocumentSnapshot {
    pub fn from_wire(document_id: DocumentId, document: &wire::Document) -> Self {
        let id = SnapshotId::next();
        let blocks: Vec<Block> = document
            .body
            .content
            .iter()
            .map(|element| convert_element(element, id))
            .collect();
        let end_index = document
            .body
            .content
            .last()
            .map(|e| e.end_index)
            .unwrap_or(1);

        let mut named_ranges: BTreeMap<String, Vec<RegisteredRange>> = BTreeMap::new();
        for group in document.named_ranges.values() {
            for named in &group.named_ranges {
                for range in &named.ranges {
                    named_ranges
                        .entry(named.name.clone())
                        .or_default()
                        .push(RegisteredRange {
                            id: named.named_range_id.clone(),
                            span: Span {
                                start: range.start_index,
                                end: range.end_index,
                                origin: id,
                            },
                        });
                }
            }
        }

        Self {
            id,
            document_id,
            revision_id: document.revision_id.clone(),
            blocks,
            named_ranges,
            end_index,
        }
    }

    pub fn id(&self) -> SnapshotId {
        self.id
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub fn revision_id(&self) -> Option<&str> {
        self.revision_id.as_deref()
    }

    /// Top-level blocks in document order.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// One past the final body newline.
    pub fn end_index(&self) -> i64 {
        self.end_index
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableBlock> {
        self.blocks.iter().filter_map(|b| match b {
            Block::Table(t) => Some(t),
            _ => None,
        })
    }

    pub fn paragraphs(&self) -> impl Iterator<Item = &ParagraphBlock> {
        self.blocks.iter().filter_map(|b| match b {
            Block::Paragraph(p) => Some(p),
            _ => None,
        })
    }

    /// Re-tag a carried position against this snapshot.
    ///
    /// Fails when the position falls outside the body.
    pub fn resolve(&self, anchor: Anchor) -> Result<Offset, DocsError> {
        if anchor.0 < 1 || anchor.0 >= self.end_index {
            return Err(DocsError::malformed(format!(
                "position {} is outside the document body [1, {})",
                anchor.0, self.end_index
            )));
        }
        Ok(Offset {
            index: anchor.0,
            origin: self.id,
        })
    }

    /// Every registration under `name`, in document order.
    pub fn named_ranges(&self, name: &str) -> &[RegisteredRange] {
        self.named_ranges
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn named_range_names(&self) -> impl Iterator<Item = &str> {
        self.named_ranges.keys().map(String::as_str)
    }

    /// The span registered under `name`.
    ///
    /// Several registrations collapse to their bounding span, which is only
    /// meaningful when they are contiguous.
    pub fn find_named_range(&self, name: &str) -> Option<Span> {
        self.named_ranges(name)
            .iter()
            .map(|r| r.span)
            .reduce(|acc, span| acc.cover(&span))
    }

    /// First top-level paragraph whose trimmed text equals `text`.
    pub fn find_heading(&self, text: &str) -> Option<HeadingMatch> {
        let wanted = text.trim();
        self.paragraphs()
            .find(|p| p.trimmed() == wanted)
            .map(heading_match)
    }

    /// The top-level paragraph starting at `at`, if its trimmed text is `text`.
    pub fn heading_at(&self, at: Offset, text: &str) -> Option<HeadingMatch> {
        if at.origin != self.id {
            return None;
        }
        self.paragraphs()
            .find(|p| p.span.start == at.index)
            .filter(|p| p.trimmed() == text.trim())
            .map(heading_match)
    }

    /// The n-th top-level table, 0-indexed, in document order.
    pub fn find_table_by_index(&self, n: usize) -> Option<&TableBlock> {
        self.tables().nth(n)
    }

    /// Position of `table` among the top-level tables.
    pub fn table_index_of(&self, table: &TableBlock) -> Option<usize> {
        self.tables().position(|t| t.span == table.span)
    }

    /// The first table starting at or after `from` with nothing but blank
    /// paragraphs in between.
    pub fn table_after(&self, from: Offset) -> Option<&TableBlock> {
        if from.origin != self.id {
            return None;
        }
        for block in self.blocks.iter().filter(|b| b.span().start >= from.index) {
            match block {
                Block::Table(t) => return Some(t),
                Block::Paragraph(p) if p.is_blank() => continue,
                _ => return None,
            }
        }
        None
    }

    /// The first top-level table lying wholly inside `span`.
    pub fn table_within(&self, span: &Span) -> Option<&TableBlock> {
        self.tables().find(|t| span.contains(&t.span))
    }

    /// Top-level blocks ending at or before `index`, nearest first.
    pub(crate) fn blocks_before(&self, index: i64) -> impl Iterator<Item = &Block> {
        self.blocks
            .iter()
            .rev()
            .filter(move |b| b.span().end <= index)
    }
}

fn heading_match(p: &ParagraphBlock) -> HeadingMatch {
    HeadingMatch {
        span: p.span,
        is_styled_as_heading: p.is_heading_style(),
        named_style: p.named_style.clone(),
    }
}

fn span_of(start: i64, end: i64, origin: SnapshotId) -> Span {
    Span { start, end, origin }
}

fn convert_element(element: &wire::StructuralElement, origin: SnapshotId) -> Block {
    let span = span_of(element.start_index, element.end_index, origin);
    if let Some(paragraph) = &element.paragraph {
        Block::Paragraph(convert_paragraph(span, paragraph, origin))
    } else if let Some(table) = &element.table {
        Block::Table(convert_table(span, table, origin))
    } else {
        Block::Other(span)
    }
}

fn convert_paragraph(span: Span, paragraph: &wire::Paragraph, origin: SnapshotId) -> ParagraphBlock {
    let runs: Vec<TextSegment> = paragraph
        .elements
        .iter()
        .filter_map(|element| {
            element.text_run.as_ref().map(|run| TextSegment {
                span: span_of(element.start_index, element.end_index, origin),
                text: run.content.clone(),
                bold: run
                    .text_style
                    .as_ref()
                    .and_then(|s| s.bold)
                    .unwrap_or(false),
            })
        })
        .collect();
    ParagraphBlock {
        span,
        text: runs.iter().map(|r| r.text.as_str()).collect(),
        named_style: paragraph
            .paragraph_style
            .as_ref()
            .and_then(|s| s.named_style_type.clone()),
        runs,
    }
}

fn convert_table(span: Span, table: &wire::Table, origin: SnapshotId) -> TableBlock {
    let rows = table
        .table_rows
        .iter()
        .map(|row| RowBlock {
            span: span_of(row.start_index, row.end_index, origin),
            cells: row
                .table_cells
                .iter()
                .map(|cell| CellBlock {
                    span: span_of(cell.start_index, cell.end_index, origin),
                    content: cell
                        .content
                        .iter()
                        .filter_map(|element| {
                            element.paragraph.as_ref().map(|p| {
                                convert_paragraph(
                                    span_of(element.start_index, element.end_index, origin),
                                    p,
                                    origin,
                                )
                            })
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect();
    TableBlock {
        span,
        columns: table.columns,
        rows,
    }
}
