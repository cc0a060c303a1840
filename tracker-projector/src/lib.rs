//! # tracker-projector
//!
//! Pure mapping from grant records to the rows shown in a tracker document's
//! managed sections. Nothing here performs I/O; the same input always
//! produces the same rows.
//!
//! ```rust
//! use tracker_core::GrantRecord;
//! use tracker_projector::{project_approvals, project_metadata};
//!
//! let mut grant = GrantRecord::new("PYPI-2026-Packaging");
//! grant.amount = "50000".to_string();
//! let rows = project_metadata(&grant);
//! assert_eq!(rows[4].value, "$50,000");
//!
//! let approvals = project_approvals(&["Ada".to_string()]);
//! assert_eq!(approvals[0].label, "Ada");
//! ```

pub mod fields;
pub mod format;

pub use fields::{project_approvals, project_metadata, METADATA_LABELS};
pub use format::{format_currency, format_tags};
