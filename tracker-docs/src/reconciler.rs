//! Section reconciler.
//!
//! A section is either absent or present; nothing else is remembered between
//! calls. Every decision is re-derived from a fresh snapshot, so a sync that
//! failed halfway can simply be run again.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use tracker_core::{DocumentId, FieldRow, SectionName};

use crate::error::DocsError;
use crate::gateway::DocsGateway;
use crate::planner::{
    plan_create_table, plan_delete_section, plan_insert_heading, plan_populate_table,
    plan_register_section, plan_style_heading, EditBatch, TABLE_COLUMNS,
};
use crate::sections::{spec, SectionSpec, UpdatePolicy};
use crate::snapshot::{
    get_snapshot, Anchor, Block, DocumentSnapshot, HeadingMatch, Span, TableBlock,
};

/// How a section was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocateOrigin {
    NamedRange,
    /// Positional fallback for documents written before named ranges.
    LegacyTable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocatedSection {
    pub section: SectionName,
    pub span: Span,
    pub origin: LocateOrigin,
    /// Named-range ids covering the section; empty for legacy sections.
    pub registrations: Vec<String>,
    pub table: Option<TableBlock>,
}

/// What a sync did to one section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionOutcome {
    Created,
    Recreated,
    Preserved,
    /// Nothing to write (no approvers).
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciled {
    pub outcome: SectionOutcome,
    /// Position just past the section, for placing the next one.
    pub end: Anchor,
}

/// Progress of [`SectionReconciler::create`]. Each stage is confirmed by a
/// successful batch update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateStage {
    Pending,
    HeadingInserted,
    HeadingStyled,
    TableInserted,
    TablePopulated,
    RangeCreated,
}

// ---------------------------------------------------------------------------
// Locate
// ---------------------------------------------------------------------------

/// Find `section` in `snapshot`: by named range, else positionally.
pub fn locate(snapshot: &DocumentSnapshot, section: SectionName) -> Option<LocatedSection> {
    let spec = spec(section);
    if let Some(span) = snapshot.find_named_range(spec.range_name) {
        return Some(LocatedSection {
            section,
            span,
            origin: LocateOrigin::NamedRange,
            registrations: snapshot
                .named_ranges(spec.range_name)
                .iter()
                .map(|r| r.id.clone())
                .collect(),
            table: snapshot.table_within(&span).cloned(),
        });
    }
    locate_legacy(snapshot, spec)
}

fn locate_legacy(snapshot: &DocumentSnapshot, spec: &SectionSpec) -> Option<LocatedSection> {
    if spec.section == SectionName::Approvals {
        // Table 1 is only the approvals table when table 0 holds the metadata.
        let metadata_first = locate(snapshot, SectionName::Metadata)
            .and_then(|m| m.table)
            .is_some_and(|t| snapshot.table_index_of(&t) == Some(0));
        if !metadata_first {
            return None;
        }
    }

    let table = snapshot.find_table_by_index(spec.legacy_table_index)?;
    if table.columns != TABLE_COLUMNS || claimed_by_other_section(snapshot, spec, table) {
        return None;
    }
    Some(LocatedSection {
        section: spec.section,
        span: legacy_extent(snapshot, spec, table),
        origin: LocateOrigin::LegacyTable,
        registrations: Vec::new(),
        table: Some(table.clone()),
    })
}

fn claimed_by_other_section(
    snapshot: &DocumentSnapshot,
    own: &SectionSpec,
    table: &TableBlock,
) -> bool {
    SectionName::all()
        .iter()
        .filter(|s| **s != own.section)
        .filter_map(|s| snapshot.find_named_range(spec(*s).range_name))
        .any(|span| span.contains(&table.span))
}

/// Widen a legacy table over the heading paragraphs directly above it.
///
/// Blank paragraphs are walked over but only a heading alias moves the start.
fn legacy_extent(snapshot: &DocumentSnapshot, spec: &SectionSpec, table: &TableBlock) -> Span {
    let mut span = table.span;
    for block in snapshot.blocks_before(table.span.start()) {
        match block {
            Block::Paragraph(p) if spec.is_legacy_heading(&p.text) => span = p.span.cover(&span),
            Block::Paragraph(p) if p.is_blank() => continue,
            _ => break,
        }
    }
    span
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Drives managed sections of one document through the gateway.
pub struct SectionReconciler<'a, G: ?Sized> {
    gateway: &'a G,
    document_id: &'a DocumentId,
}

struct CreateRun<'r> {
    spec: &'static SectionSpec,
    fields: &'r [FieldRow],
    at: Anchor,
    stage: CreateStage,
    seed: Option<DocumentSnapshot>,
    end: Option<Anchor>,
}

impl<'a, G> SectionReconciler<'a, G>
where
    G: DocsGateway + ?Sized,
{
    pub fn new(gateway: &'a G, document_id: &'a DocumentId) -> Self {
        Self {
            gateway,
            document_id,
        }
    }

    pub fn snapshot(&self) -> Result<DocumentSnapshot, DocsError> {
        get_snapshot(self.gateway, self.document_id)
    }

    /// Apply the section's update policy.
    pub fn reconcile(
        &self,
        section: SectionName,
        fields: &[FieldRow],
        at: Anchor,
    ) -> Result<Reconciled, DocsError> {
        match spec(section).policy {
            UpdatePolicy::AlwaysFresh => self.upsert(section, fields, at),
            UpdatePolicy::PreserveOnExists => self.ensure(section, fields, at),
        }
    }

    /// Create `section` at `at` if absent; leave it alone otherwise.
    pub fn ensure(
        &self,
        section: SectionName,
        fields: &[FieldRow],
        at: Anchor,
    ) -> Result<Reconciled, DocsError> {
        let snapshot = self.snapshot()?;
        match locate(&snapshot, section) {
            Some(found) => {
                info!(
                    "{section} already present in {} ({:?}), leaving it untouched",
                    self.document_id.masked(),
                    found.origin
                );
                Ok(Reconciled {
                    outcome: SectionOutcome::Preserved,
                    end: found.span.end_offset().into(),
                })
            }
            None => Ok(Reconciled {
                outcome: SectionOutcome::Created,
                end: self.create(section, fields, at, Some(snapshot))?,
            }),
        }
    }

    /// Create `section` at `at` if absent; otherwise delete it and create it
    /// again where it was.
    pub fn upsert(
        &self,
        section: SectionName,
        fields: &[FieldRow],
        at: Anchor,
    ) -> Result<Reconciled, DocsError> {
        let snapshot = self.snapshot()?;
        match locate(&snapshot, section) {
            None => Ok(Reconciled {
                outcome: SectionOutcome::Created,
                end: self.create(section, fields, at, Some(snapshot))?,
            }),
            Some(found) => {
                self.delete(&snapshot, &found)?;
                let at = found.span.start_offset().into();
                Ok(Reconciled {
                    outcome: SectionOutcome::Recreated,
                    end: self.create(section, fields, at, None)?,
                })
            }
        }
    }

    /// Remove a located section: its registrations first, then its content,
    /// in one batch.
    pub fn delete(
        &self,
        snapshot: &DocumentSnapshot,
        found: &LocatedSection,
    ) -> Result<(), DocsError> {
        let batch = plan_delete_section(snapshot, &found.registrations, found.span)?;
        self.apply(&batch)?;
        info!(
            "deleted {} at {} from {}",
            found.section,
            found.span,
            self.document_id.masked()
        );
        Ok(())
    }

    /// Build `section` at `at` through five dependent round trips.
    ///
    /// `seed` may carry a snapshot read just before the call; every later
    /// stage reads a fresh one. Returns the position just past the new
    /// section.
    pub fn create(
        &self,
        section: SectionName,
        fields: &[FieldRow],
        at: Anchor,
        seed: Option<DocumentSnapshot>,
    ) -> Result<Anchor, DocsError> {
        let mut run = CreateRun {
            spec: spec(section),
            fields,
            at,
            stage: CreateStage::Pending,
            seed,
            end: None,
        };
        while run.stage != CreateStage::RangeCreated {
            if let Err(err) = self.advance(&mut run) {
                warn!(
                    "creating {section} in {} stopped after stage {:?}: {err}",
                    self.document_id.masked(),
                    run.stage
                );
                return Err(err);
            }
            debug!("{section}: reached {:?}", run.stage);
        }
        info!(
            "created {section} in {} at {at}",
            self.document_id.masked()
        );
        run.end
            .ok_or_else(|| DocsError::malformed(format!("{section} was created without an extent")))
    }

    fn advance(&self, run: &mut CreateRun<'_>) -> Result<(), DocsError> {
        let snapshot = match run.seed.take() {
            Some(snapshot) => snapshot,
            None => self.snapshot()?,
        };
        let at = snapshot.resolve(run.at)?;
        let spec = run.spec;

        run.stage = match run.stage {
            CreateStage::Pending => {
                self.apply(&plan_insert_heading(&snapshot, at, spec.heading)?)?;
                CreateStage::HeadingInserted
            }
            CreateStage::HeadingInserted => {
                let heading = expect_heading(&snapshot, run)?;
                self.apply(&plan_style_heading(&snapshot, heading.span, spec.heading_style)?)?;
                CreateStage::HeadingStyled
            }
            CreateStage::HeadingStyled => {
                let heading = expect_heading(&snapshot, run)?;
                let after = heading.span.end_offset();
                self.apply(&plan_create_table(&snapshot, run.fields, after)?)?;
                CreateStage::TableInserted
            }
            CreateStage::TableInserted => {
                let heading = expect_heading(&snapshot, run)?;
                let table = expect_table(&snapshot, &heading, run)?;
                self.apply(&plan_populate_table(&snapshot, table, run.fields)?)?;
                CreateStage::TablePopulated
            }
            CreateStage::TablePopulated => {
                let heading = expect_heading(&snapshot, run)?;
                let table = expect_table(&snapshot, &heading, run)?;
                let extent = heading.span.cover(&table.span);
                self.apply(&plan_register_section(&snapshot, spec.range_name, extent)?)?;
                run.end = Some(extent.end_offset().into());
                CreateStage::RangeCreated
            }
            CreateStage::RangeCreated => CreateStage::RangeCreated,
        };
        Ok(())
    }

    fn apply(&self, batch: &EditBatch) -> Result<(), DocsError> {
        if batch.is_empty() {
            return Ok(());
        }
        debug!(
            "applying {} operations planned against snapshot {} to {}",
            batch.len(),
            batch.origin(),
            self.document_id.masked()
        );
        self.gateway
            .batch_update(self.document_id, &batch.to_requests())?;
        Ok(())
    }
}

fn expect_heading(snapshot: &DocumentSnapshot, run: &CreateRun<'_>) -> Result<HeadingMatch, DocsError> {
    let at = snapshot.resolve(run.at)?;
    snapshot.heading_at(at, run.spec.heading).ok_or_else(|| {
        DocsError::malformed(format!(
            "heading {:?} missing at {} after {:?}",
            run.spec.heading, run.at, run.stage
        ))
    })
}

fn expect_table<'s>(
    snapshot: &'s DocumentSnapshot,
    heading: &HeadingMatch,
    run: &CreateRun<'_>,
) -> Result<&'s TableBlock, DocsError> {
    snapshot
        .table_after(heading.span.end_offset())
        .ok_or_else(|| {
            DocsError::malformed(format!(
                "table missing after heading {:?} at {} after {:?}",
                run.spec.heading, heading.span, run.stage
            ))
        })
}
