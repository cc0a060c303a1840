//! In-memory document service.
//!
//! [`MemoryDocsGateway`] keeps documents as paragraphs and tables and applies
//! batch requests with the remote service's offset rules:
//!
//! - the body opens with a one-unit section break, so content starts at 1;
//! - a table occupies one unit for its start, one per row, one per cell plus
//!   the cell's paragraphs, and one closing unit;
//! - `insertTable` splits the target paragraph and leaves a newline before
//!   the table;
//! - named ranges shift when content is inserted at or before their start,
//!   grow when it is inserted strictly inside, and shrink with deletions
//!   (an emptied range disappears);
//! - the final newline of the body cannot be deleted;
//! - a batch is applied to a copy and committed only if every request
//!   succeeds.
//!
//! Content deletion supports ranges inside one paragraph and ranges covering
//! whole top-level elements, which is all a section lifecycle needs.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde_json::{json, Value};
use tracker_core::{DocumentId, FieldRow};

use crate::error::DocsError;
use crate::gateway::DocsGateway;
use crate::wire::{self, BatchUpdateResponse, Request};

const NEWLINE: u16 = b'\n' as u16;
const NORMAL_TEXT: &str = "NORMAL_TEXT";

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Unit {
    code: u16,
    bold: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct Para {
    /// Always ends with a newline unit.
    units: Vec<Unit>,
    style: String,
}

impl Para {
    fn new(text: &str, style: &str, bold: bool) -> Self {
        let mut units: Vec<Unit> = text
            .encode_utf16()
            .filter(|c| *c != NEWLINE)
            .map(|code| Unit { code, bold })
            .collect();
        units.push(Unit {
            code: NEWLINE,
            bold: false,
        });
        Self {
            units,
            style: style.to_string(),
        }
    }

    fn len(&self) -> i64 {
        self.units.len() as i64
    }

    /// Insert `codes` before unit `offset` and re-split on newlines.
    fn insert(mut self, offset: usize, codes: &[u16]) -> Vec<Para> {
        let bold = offset
            .checked_sub(1)
            .and_then(|i| self.units.get(i))
            .is_some_and(|u| u.bold && u.code != NEWLINE);
        let inserted = codes.iter().map(|&code| Unit { code, bold });
        self.units.splice(offset..offset, inserted);
        self.split_lines()
    }

    fn split_lines(self) -> Vec<Para> {
        let style = self.style;
        self.units
            .split_inclusive(|u| u.code == NEWLINE)
            .map(|line| Para {
                units: line.to_vec(),
                style: style.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Cell {
    content: Vec<Para>,
}

impl Cell {
    fn new(text: &str, bold: bool) -> Self {
        Self {
            content: vec![Para::new(text, NORMAL_TEXT, bold)],
        }
    }

    fn len(&self) -> i64 {
        1 + self.content.iter().map(Para::len).sum::<i64>()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Tbl {
    columns: usize,
    rows: Vec<Vec<Cell>>,
}

impl Tbl {
    fn empty(rows: usize, columns: usize) -> Self {
        Self {
            columns,
            rows: (0..rows)
                .map(|_| (0..columns).map(|_| Cell::new("", false)).collect())
                .collect(),
        }
    }

    fn len(&self) -> i64 {
        let rows: i64 = self
            .rows
            .iter()
            .map(|row| 1 + row.iter().map(Cell::len).sum::<i64>())
            .sum();
        2 + rows
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Para(Para),
    Table(Tbl),
}

impl Node {
    fn len(&self) -> i64 {
        match self {
            Node::Para(p) => p.len(),
            Node::Table(t) => t.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct RangeEntry {
    id: String,
    name: String,
    start: i64,
    end: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParaPath {
    Top(usize),
    Cell {
        node: usize,
        row: usize,
        col: usize,
        para: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct Doc {
    title: String,
    nodes: Vec<Node>,
    ranges: Vec<RangeEntry>,
    revision: u64,
    next_range_id: u64,
}

type ApplyResult<T> = Result<T, String>;

impl Doc {
    fn body_end(&self) -> i64 {
        1 + self.nodes.iter().map(Node::len).sum::<i64>()
    }

    /// Start index of every top-level node.
    fn node_starts(&self) -> Vec<i64> {
        let mut pos = 1;
        self.nodes
            .iter()
            .map(|node| {
                let start = pos;
                pos += node.len();
                start
            })
            .collect()
    }

    /// The paragraph containing `index` and the unit offset inside it.
    fn find_para(&self, index: i64) -> Option<(ParaPath, usize)> {
        if index < 1 {
            return None;
        }
        let mut pos = 1;
        for (n, node) in self.nodes.iter().enumerate() {
            let len = node.len();
            if index >= pos + len {
                pos += len;
                continue;
            }
            return match node {
                Node::Para(_) => Some((ParaPath::Top(n), (index - pos) as usize)),
                Node::Table(table) => {
                    let mut p = pos + 1;
                    for (r, row) in table.rows.iter().enumerate() {
                        p += 1;
                        for (c, cell) in row.iter().enumerate() {
                            p += 1;
                            for (k, para) in cell.content.iter().enumerate() {
                                if index >= p && index < p + para.len() {
                                    let path = ParaPath::Cell {
                                        node: n,
                                        row: r,
                                        col: c,
                                        para: k,
                                    };
                                    return Some((path, (index - p) as usize));
                                }
                                p += para.len();
                            }
                        }
                    }
                    None
                }
            };
        }
        None
    }

    fn para(&self, path: ParaPath) -> Option<&Para> {
        match path {
            ParaPath::Top(n) => match self.nodes.get(n)? {
                Node::Para(p) => Some(p),
                Node::Table(_) => None,
            },
            ParaPath::Cell {
                node,
                row,
                col,
                para,
            } => match self.nodes.get(node)? {
                Node::Table(t) => t.rows.get(row)?.get(col)?.content.get(para),
                Node::Para(_) => None,
            },
        }
    }

    fn para_mut(&mut self, path: ParaPath) -> Option<&mut Para> {
        match path {
            ParaPath::Top(n) => match self.nodes.get_mut(n)? {
                Node::Para(p) => Some(p),
                Node::Table(_) => None,
            },
            ParaPath::Cell {
                node,
                row,
                col,
                para,
            } => match self.nodes.get_mut(node)? {
                Node::Table(t) => t.rows.get_mut(row)?.get_mut(col)?.content.get_mut(para),
                Node::Para(_) => None,
            },
        }
    }

    /// Replace the paragraph at `path` with `paras`.
    fn replace_para(&mut self, path: ParaPath, paras: Vec<Para>) -> ApplyResult<()> {
        match path {
            ParaPath::Top(n) => {
                self.nodes.splice(n..=n, paras.into_iter().map(Node::Para));
            }
            ParaPath::Cell {
                node,
                row,
                col,
                para,
            } => {
                let cell = match self.nodes.get_mut(node) {
                    Some(Node::Table(t)) => t
                        .rows
                        .get_mut(row)
                        .and_then(|r| r.get_mut(col))
                        .ok_or("cell vanished")?,
                    _ => return Err("cell vanished".to_string()),
                };
                cell.content.splice(para..=para, paras);
            }
        }
        Ok(())
    }

    /// Visit every paragraph with its start index.
    fn for_each_para_mut(&mut self, mut visit: impl FnMut(i64, &mut Para)) {
        let mut pos = 1;
        for node in &mut self.nodes {
            match node {
                Node::Para(p) => {
                    visit(pos, p);
                    pos += p.len();
                }
                Node::Table(table) => {
                    pos += 1;
                    for row in &mut table.rows {
                        pos += 1;
                        for cell in row {
                            pos += 1;
                            for p in &mut cell.content {
                                visit(pos, p);
                                pos += p.len();
                            }
                        }
                    }
                    pos += 1;
                }
            }
        }
    }

    fn check_range(&self, range: &wire::Range) -> ApplyResult<()> {
        let end = self.body_end();
        if range.start_index < 1 || range.start_index >= range.end_index || range.end_index > end {
            return Err(format!(
                "invalid range [{}, {}) for a body ending at {end}",
                range.start_index, range.end_index
            ));
        }
        Ok(())
    }

    fn shift_ranges(&mut self, index: i64, len: i64) {
        for range in &mut self.ranges {
            if index <= range.start {
                range.start += len;
                range.end += len;
            } else if index < range.end {
                range.end += len;
            }
        }
    }

    fn shrink_ranges(&mut self, start: i64, end: i64) {
        let removed = end - start;
        let shrink = |x: i64| {
            if x <= start {
                x
            } else if x >= end {
                x - removed
            } else {
                start
            }
        };
        for range in &mut self.ranges {
            range.start = shrink(range.start);
            range.end = shrink(range.end);
        }
        self.ranges.retain(|r| r.start < r.end);
    }

    fn check_structure(&self) -> ApplyResult<()> {
        match (self.nodes.first(), self.nodes.last()) {
            (Some(Node::Para(_)), Some(Node::Para(_))) => {}
            _ => return Err("the body must begin and end with a paragraph".to_string()),
        }
        let adjacent_tables = self
            .nodes
            .windows(2)
            .any(|w| matches!(w, [Node::Table(_), Node::Table(_)]));
        if adjacent_tables {
            return Err("a table must be separated from the next table by a paragraph".to_string());
        }
        Ok(())
    }

    // -- requests -----------------------------------------------------------

    fn apply(&mut self, request: &Request) -> ApplyResult<Value> {
        match request {
            Request::InsertText(r) => self.insert_text(r.location.index, &r.text),
            Request::InsertTable(r) => self.insert_table(r.location.index, r.rows, r.columns),
            Request::UpdateParagraphStyle(r) => self.update_paragraph_style(r),
            Request::UpdateTextStyle(r) => self.update_text_style(r),
            Request::CreateNamedRange(r) => self.create_named_range(&r.name, &r.range),
            Request::DeleteNamedRange(r) => {
                self.delete_named_range(r.named_range_id.as_deref(), r.name.as_deref())
            }
            Request::DeleteContentRange(r) => self.delete_content_range(&r.range),
        }
    }

    fn insert_text(&mut self, index: i64, text: &str) -> ApplyResult<Value> {
        let codes: Vec<u16> = text.encode_utf16().collect();
        if codes.is_empty() {
            return Err("text must not be empty".to_string());
        }
        let (path, offset) = self
            .find_para(index)
            .ok_or_else(|| format!("index {index} is not inside a paragraph"))?;
        let para = self.para(path).cloned().ok_or("paragraph vanished")?;
        if offset > 0 && is_high_surrogate(para.units[offset - 1].code) {
            return Err(format!("index {index} splits a surrogate pair"));
        }
        self.replace_para(path, para.insert(offset, &codes))?;
        self.shift_ranges(index, codes.len() as i64);
        Ok(json!({}))
    }

    fn insert_table(&mut self, index: i64, rows: usize, columns: usize) -> ApplyResult<Value> {
        if rows == 0 || columns == 0 {
            return Err("a table needs at least one row and one column".to_string());
        }
        let (path, offset) = self
            .find_para(index)
            .ok_or_else(|| format!("index {index} is not inside a paragraph"))?;
        let ParaPath::Top(n) = path else {
            return Err("tables cannot be inserted inside a table".to_string());
        };
        let Some(Node::Para(para)) = self.nodes.get(n).cloned() else {
            return Err("paragraph vanished".to_string());
        };
        let mut left = Para {
            units: para.units[..offset].to_vec(),
            style: para.style.clone(),
        };
        left.units.push(Unit {
            code: NEWLINE,
            bold: false,
        });
        let right = Para {
            units: para.units[offset..].to_vec(),
            style: para.style,
        };
        let table = Tbl::empty(rows, columns);
        let inserted = 1 + table.len();
        self.nodes.splice(
            n..=n,
            [Node::Para(left), Node::Table(table), Node::Para(right)],
        );
        self.shift_ranges(index, inserted);
        Ok(json!({}))
    }

    fn update_paragraph_style(&mut self, r: &wire::UpdateParagraphStyle) -> ApplyResult<Value> {
        self.check_range(&r.range)?;
        if !r.fields.split(',').any(|f| f.trim() == "namedStyleType") {
            return Err(format!("unsupported paragraph style fields {:?}", r.fields));
        }
        let style = r
            .paragraph_style
            .named_style_type
            .clone()
            .unwrap_or_else(|| NORMAL_TEXT.to_string());
        let (start, end) = (r.range.start_index, r.range.end_index);
        self.for_each_para_mut(|pos, para| {
            if pos < end && start < pos + para.len() {
                para.style = style.clone();
            }
        });
        Ok(json!({}))
    }

    fn update_text_style(&mut self, r: &wire::UpdateTextStyle) -> ApplyResult<Value> {
        self.check_range(&r.range)?;
        if !r.fields.split(',').any(|f| f.trim() == "bold") {
            return Err(format!("unsupported text style fields {:?}", r.fields));
        }
        let bold = r.text_style.bold.unwrap_or(false);
        let (start, end) = (r.range.start_index, r.range.end_index);
        self.for_each_para_mut(|pos, para| {
            for (i, unit) in para.units.iter_mut().enumerate() {
                let at = pos + i as i64;
                if at >= start && at < end && unit.code != NEWLINE {
                    unit.bold = bold;
                }
            }
        });
        Ok(json!({}))
    }

    fn create_named_range(&mut self, name: &str, range: &wire::Range) -> ApplyResult<Value> {
        if name.is_empty() {
            return Err("named range name must not be empty".to_string());
        }
        self.check_range(range)?;
        self.next_range_id += 1;
        let id = format!("kix.nr{}", self.next_range_id);
        self.ranges.push(RangeEntry {
            id: id.clone(),
            name: name.to_string(),
            start: range.start_index,
            end: range.end_index,
        });
        Ok(json!({ "createNamedRange": { "namedRangeId": id } }))
    }

    fn delete_named_range(&mut self, id: Option<&str>, name: Option<&str>) -> ApplyResult<Value> {
        match (id, name) {
            (Some(id), _) => {
                let before = self.ranges.len();
                self.ranges.retain(|r| r.id != id);
                if self.ranges.len() == before {
                    return Err(format!("named range {id} not found"));
                }
            }
            (None, Some(name)) => self.ranges.retain(|r| r.name != name),
            (None, None) => return Err("deleteNamedRange needs an id or a name".to_string()),
        }
        Ok(json!({}))
    }

    fn delete_content_range(&mut self, range: &wire::Range) -> ApplyResult<Value> {
        self.check_range(range)?;
        let (start, end) = (range.start_index, range.end_index);
        if end >= self.body_end() {
            return Err("the final newline of the body cannot be deleted".to_string());
        }

        // Text inside one paragraph, newline excluded.
        if let Some((path, offset)) = self.find_para(start) {
            let para = self.para_mut(path).ok_or("paragraph vanished")?;
            let para_end = start - offset as i64 + para.len();
            if end < para_end {
                let count = (end - start) as usize;
                para.units.drain(offset..offset + count);
                self.shrink_ranges(start, end);
                return Ok(json!({}));
            }
        }

        // Whole top-level elements.
        let starts = self.node_starts();
        let first = starts.iter().position(|&s| s == start);
        let last = starts
            .iter()
            .zip(&self.nodes)
            .position(|(&s, node)| s + node.len() == end);
        match (first, last) {
            (Some(first), Some(last)) if first <= last => {
                self.nodes.drain(first..=last);
                self.check_structure()?;
                self.shrink_ranges(start, end);
                Ok(json!({}))
            }
            _ => Err(format!(
                "deleting [{start}, {end}) would split a paragraph or table"
            )),
        }
    }

    // -- wire ---------------------------------------------------------------

    fn to_wire(&self, document_id: &str) -> wire::Document {
        let mut content = vec![wire::StructuralElement {
            start_index: 0,
            end_index: 1,
            section_break: Some(json!({ "sectionStyle": {} })),
            ..Default::default()
        }];
        let mut pos = 1;
        for node in &self.nodes {
            content.push(match node {
                Node::Para(p) => para_to_wire(p, &mut pos),
                Node::Table(t) => table_to_wire(t, &mut pos),
            });
        }

        let mut named_ranges: BTreeMap<String, wire::NamedRanges> = BTreeMap::new();
        for range in &self.ranges {
            let group = named_ranges
                .entry(range.name.clone())
                .or_insert_with(|| wire::NamedRanges {
                    name: range.name.clone(),
                    named_ranges: Vec::new(),
                });
            let wire_range = wire::Range::new(range.start, range.end);
            match group
                .named_ranges
                .iter_mut()
                .find(|n| n.named_range_id == range.id)
            {
                Some(existing) => existing.ranges.push(wire_range),
                None => group.named_ranges.push(wire::NamedRange {
                    named_range_id: range.id.clone(),
                    name: range.name.clone(),
                    ranges: vec![wire_range],
                }),
            }
        }

        wire::Document {
            document_id: document_id.to_string(),
            title: self.title.clone(),
            revision_id: Some(format!("rev-{}", self.revision)),
            body: wire::Body { content },
            named_ranges,
        }
    }
}

fn is_high_surrogate(code: u16) -> bool {
    (0xD800..0xDC00).contains(&code)
}

fn para_to_wire(para: &Para, pos: &mut i64) -> wire::StructuralElement {
    let start = *pos;
    let mut elements = Vec::new();
    for run in para.units.chunk_by(|a, b| a.bold == b.bold) {
        let run_start = *pos;
        *pos += run.len() as i64;
        let codes: Vec<u16> = run.iter().map(|u| u.code).collect();
        elements.push(wire::ParagraphElement {
            start_index: run_start,
            end_index: *pos,
            text_run: Some(wire::TextRun {
                content: String::from_utf16_lossy(&codes),
                text_style: Some(wire::TextStyle {
                    bold: run[0].bold.then_some(true),
                }),
            }),
        });
    }
    wire::StructuralElement {
        start_index: start,
        end_index: *pos,
        paragraph: Some(wire::Paragraph {
            elements,
            paragraph_style: Some(wire::ParagraphStyle {
                named_style_type: Some(para.style.clone()),
            }),
        }),
        ..Default::default()
    }
}

fn table_to_wire(table: &Tbl, pos: &mut i64) -> wire::StructuralElement {
    let start = *pos;
    *pos += 1;
    let mut table_rows = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let row_start = *pos;
        *pos += 1;
        let mut table_cells = Vec::with_capacity(row.len());
        for cell in row {
            let cell_start = *pos;
            *pos += 1;
            let content = cell
                .content
                .iter()
                .map(|p| para_to_wire(p, pos))
                .collect();
            table_cells.push(wire::TableCell {
                start_index: cell_start,
                end_index: *pos,
                content,
            });
        }
        table_rows.push(wire::TableRow {
            start_index: row_start,
            end_index: *pos,
            table_cells,
        });
    }
    *pos += 1;
    wire::StructuralElement {
        start_index: start,
        end_index: *pos,
        table: Some(wire::Table {
            rows: table.rows.len(),
            columns: table.columns,
            table_rows,
        }),
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builds a starting document for [`MemoryDocsGateway::insert`].
///
/// A table is always preceded and followed by a paragraph; the builder adds
/// an empty one where needed, as the remote editor does.
#[derive(Debug, Clone, Default)]
pub struct DocumentBuilder {
    title: String,
    nodes: Vec<Node>,
    ranges: Vec<(String, i64, i64)>,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// One normal paragraph per line of `text`.
    pub fn paragraph(self, text: &str) -> Self {
        self.styled(text, NORMAL_TEXT)
    }

    pub fn heading(self, text: &str, named_style: &str) -> Self {
        self.styled(text, named_style)
    }

    fn styled(mut self, text: &str, style: &str) -> Self {
        for line in text.split('\n') {
            self.nodes.push(Node::Para(Para::new(line, style, false)));
        }
        self
    }

    /// A table with the given cell texts.
    pub fn table<const C: usize>(self, rows: &[[&str; C]]) -> Self {
        self.push_table(rows, false)
    }

    fn push_table<const C: usize>(mut self, rows: &[[&str; C]], bold_labels: bool) -> Self {
        if rows.is_empty() || C == 0 {
            return self;
        }
        if !matches!(self.nodes.last(), Some(Node::Para(_))) {
            self.nodes.push(Node::Para(Para::new("", NORMAL_TEXT, false)));
        }
        self.nodes.push(Node::Table(Tbl {
            columns: C,
            rows: rows
                .iter()
                .map(|row| {
                    row.iter()
                        .enumerate()
                        .map(|(i, text)| Cell::new(text, bold_labels && i == 0 && !text.is_empty()))
                        .collect()
                })
                .collect(),
        }));
        self
    }

    /// Register `[start, end)` under `name`.
    pub fn named_range(mut self, name: &str, start: i64, end: i64) -> Self {
        self.ranges.push((name.to_string(), start, end));
        self
    }

    /// A heading, a blank paragraph and a bold-labelled two-column table,
    /// registered under `range_name` from heading start to table end.
    pub fn section(self, range_name: &str, heading: &str, named_style: &str, fields: &[FieldRow]) -> Self {
        let start = self.end_index();
        let rows: Vec<[&str; 2]> = fields
            .iter()
            .map(|f| [f.label.as_str(), f.value.as_str()])
            .collect();
        let built = self
            .heading(heading, named_style)
            .paragraph("")
            .push_table(&rows, true);
        let end = built.end_index();
        built.named_range(range_name, start, end)
    }

    /// Index just past the content added so far.
    pub fn end_index(&self) -> i64 {
        1 + self.nodes.iter().map(Node::len).sum::<i64>()
    }

    fn finish(mut self) -> Doc {
        if !matches!(self.nodes.last(), Some(Node::Para(_))) {
            self.nodes.push(Node::Para(Para::new("", NORMAL_TEXT, false)));
        }
        let ranges: Vec<RangeEntry> = self
            .ranges
            .into_iter()
            .enumerate()
            .map(|(i, (name, start, end))| RangeEntry {
                id: format!("kix.seed{}", i + 1),
                name,
                start,
                end,
            })
            .collect();
        Doc {
            title: self.title,
            nodes: self.nodes,
            ranges,
            revision: 1,
            next_range_id: 0,
        }
    }

    /// The document as the service would return it.
    pub fn build_wire(self, document_id: &str) -> wire::Document {
        self.finish().to_wire(document_id)
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// A batch the emulator applied.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedBatch {
    pub document_id: DocumentId,
    pub requests: Vec<Request>,
}

#[derive(Debug, Default)]
struct State {
    documents: BTreeMap<DocumentId, Doc>,
    applied: Vec<RecordedBatch>,
    reads: usize,
    attempts: usize,
    fail_at: Option<usize>,
}

/// A [`DocsGateway`] over documents held in memory.
#[derive(Debug, Default)]
pub struct MemoryDocsGateway {
    state: Mutex<State>,
}

impl MemoryDocsGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add or replace a document.
    pub fn insert(&self, document_id: &str, builder: DocumentBuilder) {
        self.lock()
            .documents
            .insert(DocumentId::from(document_id), builder.finish());
    }

    /// Current state of a document, as `get_document` would return it.
    pub fn document(&self, document_id: &str) -> Option<wire::Document> {
        self.lock()
            .documents
            .get(&DocumentId::from(document_id))
            .map(|doc| doc.to_wire(document_id))
    }

    /// Every batch applied so far, in order.
    pub fn batches(&self) -> Vec<RecordedBatch> {
        self.lock().applied.clone()
    }

    pub fn batch_count(&self) -> usize {
        self.lock().applied.len()
    }

    pub fn read_count(&self) -> usize {
        self.lock().reads
    }

    /// Reject the `n`-th batch update from now (0 is the next one).
    pub fn fail_batch(&self, n: usize) {
        let mut state = self.lock();
        state.fail_at = Some(state.attempts + n);
    }
}

impl DocsGateway for MemoryDocsGateway {
    fn get_document(&self, document_id: &DocumentId) -> Result<wire::Document, DocsError> {
        let mut state = self.lock();
        state.reads += 1;
        state
            .documents
            .get(document_id)
            .map(|doc| doc.to_wire(&document_id.0))
            .ok_or_else(|| DocsError::NotFound {
                document: document_id.to_string(),
            })
    }

    fn batch_update(
        &self,
        document_id: &DocumentId,
        requests: &[Request],
    ) -> Result<BatchUpdateResponse, DocsError> {
        let mut state = self.lock();
        let attempt = state.attempts;
        state.attempts += 1;
        if state.fail_at == Some(attempt) {
            state.fail_at = None;
            return Err(DocsError::RemoteRejected {
                status: 500,
                message: "injected failure".to_string(),
            });
        }

        let mut doc = state
            .documents
            .get(document_id)
            .cloned()
            .ok_or_else(|| DocsError::NotFound {
                document: document_id.to_string(),
            })?;
        let mut replies = Vec::with_capacity(requests.len());
        for (i, request) in requests.iter().enumerate() {
            let reply = doc.apply(request).map_err(|message| {
                DocsError::rejected(format!("{} (request {i}): {message}", request.kind()))
            })?;
            replies.push(reply);
        }
        doc.revision += 1;
        state.documents.insert(document_id.clone(), doc);
        state.applied.push(RecordedBatch {
            document_id: document_id.clone(),
            requests: requests.to_vec(),
        });
        Ok(BatchUpdateResponse {
            document_id: document_id.to_string(),
            replies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{DeleteContentRange, InsertTable, InsertText, Location, Range};

    fn gateway_with(builder: DocumentBuilder) -> (MemoryDocsGateway, DocumentId) {
        let gateway = MemoryDocsGateway::new();
        gateway.insert("doc", builder);
        (gateway, DocumentId::from("doc"))
    }

    fn insert_text(index: i64, text: &str) -> Request {
        Request::InsertText(InsertText {
            text: text.to_string(),
            location: Location { index },
        })
    }

    fn body_texts(doc: &wire::Document) -> Vec<String> {
        doc.body
            .content
            .iter()
            .filter_map(|e| e.paragraph.as_ref())
            .map(|p| {
                p.elements
                    .iter()
                    .filter_map(|e| e.text_run.as_ref())
                    .map(|r| r.content.as_str())
                    .collect()
            })
            .collect()
    }

    #[test]
    fn layout_follows_remote_indexing() {
        let doc = DocumentBuilder::new()
            .paragraph("")
            .table(&[["a", "b"]])
            .build_wire("doc");
        let table = &doc.body.content[2];
        assert_eq!((table.start_index, table.end_index), (2, 11));
        let row = &table.table.as_ref().unwrap().table_rows[0];
        assert_eq!((row.start_index, row.end_index), (3, 10));
        assert_eq!(row.table_cells[1].start_index, 7);
        assert_eq!(row.table_cells[1].content[0].start_index, 8);
        assert_eq!(doc.body.content[3].start_index, 11);
    }

    #[test]
    fn insert_text_with_newline_splits_paragraph_and_shifts_ranges() {
        let (gateway, id) = gateway_with(
            DocumentBuilder::new()
                .paragraph("Body")
                .named_range("R", 1, 5),
        );
        gateway
            .batch_update(&id, &[insert_text(1, "Status\n")])
            .unwrap();
        let doc = gateway.document("doc").unwrap();
        assert_eq!(body_texts(&doc), vec!["Status\n", "Body\n"]);
        let range = doc.named_ranges["R"].named_ranges[0].ranges[0];
        assert_eq!((range.start_index, range.end_index), (8, 12));
    }

    #[test]
    fn insert_inside_range_expands_and_at_end_leaves_it() {
        let (gateway, id) = gateway_with(
            DocumentBuilder::new()
                .paragraph("abcdef")
                .named_range("R", 2, 4),
        );
        gateway
            .batch_update(&id, &[insert_text(3, "xx"), insert_text(6, "yy")])
            .unwrap();
        let range = gateway.document("doc").unwrap().named_ranges["R"].named_ranges[0].ranges[0];
        assert_eq!((range.start_index, range.end_index), (2, 6));
    }

    #[test]
    fn insert_table_leaves_newline_before_table() {
        let (gateway, id) = gateway_with(DocumentBuilder::new().paragraph("Heading").paragraph("Tail"));
        gateway
            .batch_update(
                &id,
                &[Request::InsertTable(InsertTable {
                    rows: 1,
                    columns: 2,
                    location: Location { index: 9 },
                })],
            )
            .unwrap();
        let doc = gateway.document("doc").unwrap();
        assert_eq!(body_texts(&doc), vec!["Heading\n", "\n", "Tail\n"]);
        let table = &doc.body.content[3];
        assert_eq!(table.start_index, 10);
        assert!(table.table.is_some());
    }

    #[test]
    fn failing_request_rolls_back_the_whole_batch() {
        let (gateway, id) = gateway_with(DocumentBuilder::new().paragraph("abc"));
        let err = gateway
            .batch_update(&id, &[insert_text(1, "x"), insert_text(99, "y")])
            .unwrap_err();
        assert!(matches!(err, DocsError::RemoteRejected { status: 400, .. }));
        assert_eq!(body_texts(&gateway.document("doc").unwrap()), vec!["abc\n"]);
        assert_eq!(gateway.batch_count(), 0);
    }

    #[test]
    fn final_newline_cannot_be_deleted() {
        let (gateway, id) = gateway_with(DocumentBuilder::new().paragraph("abc"));
        let delete = |start, end| {
            Request::DeleteContentRange(DeleteContentRange {
                range: Range::new(start, end),
            })
        };
        assert!(gateway.batch_update(&id, &[delete(1, 5)]).is_err());
        gateway.batch_update(&id, &[delete(1, 3)]).unwrap();
        assert_eq!(body_texts(&gateway.document("doc").unwrap()), vec!["c\n"]);
    }

    #[test]
    fn deleting_whole_elements_shrinks_and_drops_ranges() {
        let (gateway, id) = gateway_with(
            DocumentBuilder::new()
                .paragraph("gone")
                .paragraph("kept")
                .named_range("Gone", 1, 6)
                .named_range("Kept", 6, 11),
        );
        gateway
            .batch_update(
                &id,
                &[Request::DeleteContentRange(DeleteContentRange {
                    range: Range::new(1, 6),
                })],
            )
            .unwrap();
        let doc = gateway.document("doc").unwrap();
        assert!(!doc.named_ranges.contains_key("Gone"));
        let kept = doc.named_ranges["Kept"].named_ranges[0].ranges[0];
        assert_eq!((kept.start_index, kept.end_index), (1, 6));
    }

    #[test]
    fn injected_failure_hits_only_the_scheduled_batch() {
        let (gateway, id) = gateway_with(DocumentBuilder::new().paragraph("abc"));
        gateway.fail_batch(1);
        gateway.batch_update(&id, &[insert_text(1, "x")]).unwrap();
        assert!(gateway.batch_update(&id, &[insert_text(1, "y")]).is_err());
        gateway.batch_update(&id, &[insert_text(1, "z")]).unwrap();
        assert_eq!(gateway.batch_count(), 2);
    }

    #[test]
    fn unknown_document_is_not_found() {
        let gateway = MemoryDocsGateway::new();
        let err = gateway.get_document(&DocumentId::from("nope")).unwrap_err();
        assert!(matches!(err, DocsError::NotFound { .. }));
    }
}
