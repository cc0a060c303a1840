//! Static descriptors of the managed sections.

use tracker_core::SectionName;

/// What a sync does to a section that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePolicy {
    /// Delete and recreate on every sync.
    AlwaysFresh,
    /// Leave untouched once present.
    PreserveOnExists,
}

/// Where a section is created when it is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    BodyStart,
    After(SectionName),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionSpec {
    pub section: SectionName,
    pub range_name: &'static str,
    pub heading: &'static str,
    pub heading_style: &'static str,
    pub policy: UpdatePolicy,
    pub placement: Placement,
    /// Table position used for documents written before named ranges.
    pub legacy_table_index: usize,
    /// Heading texts that older documents used above the legacy table.
    pub legacy_headings: &'static [&'static str],
}

pub static METADATA: SectionSpec = SectionSpec {
    section: SectionName::Metadata,
    range_name: "GRANT_TRACKER_METADATA",
    heading: "Status",
    heading_style: "HEADING_1",
    policy: UpdatePolicy::AlwaysFresh,
    placement: Placement::BodyStart,
    legacy_table_index: 0,
    legacy_headings: &["Status", "Project Metadata"],
};

pub static APPROVALS: SectionSpec = SectionSpec {
    section: SectionName::Approvals,
    range_name: "GRANT_TRACKER_APPROVALS",
    heading: "Approvals",
    heading_style: "HEADING_2",
    policy: UpdatePolicy::PreserveOnExists,
    placement: Placement::After(SectionName::Metadata),
    legacy_table_index: 1,
    legacy_headings: &["Approvals"],
};

pub fn spec(section: SectionName) -> &'static SectionSpec {
    match section {
        SectionName::Metadata => &METADATA,
        SectionName::Approvals => &APPROVALS,
    }
}

impl SectionSpec {
    pub fn is_legacy_heading(&self, text: &str) -> bool {
        let text = text.trim();
        self.legacy_headings.iter().any(|h| *h == text)
    }
}
