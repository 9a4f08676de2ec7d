//! Report data model.
//!
//! A report is one filled instance of a template for one patient. It carries
//! a frozen snapshot of the template taken at creation time (required for
//! legal reproducibility even if the template is edited later), the entered
//! and derived results, and the full workflow, QC, review, approval, release,
//! and amendment record.
//!
//! `workflow_history` is append-only: every transition adds exactly one
//! entry, and nothing ever removes or rewrites one.

use crate::template::Template;
use chrono::{DateTime, Utc};
use dxr_types::NonEmptyText;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Workflow status of a report.
///
/// Linear flow with one recurring branch:
/// `DRAFT → ENTERED → QC_CHECKED → REVIEWED → APPROVED → RELEASED`, with
/// `AMENDED` reachable from any finalized status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    Draft,
    Entered,
    QcChecked,
    Reviewed,
    Approved,
    Released,
    Amended,
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ReportStatus::Draft => "DRAFT",
            ReportStatus::Entered => "ENTERED",
            ReportStatus::QcChecked => "QC_CHECKED",
            ReportStatus::Reviewed => "REVIEWED",
            ReportStatus::Approved => "APPROVED",
            ReportStatus::Released => "RELEASED",
            ReportStatus::Amended => "AMENDED",
        };
        write!(f, "{name}")
    }
}

/// One entered or derived result value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultValue {
    Number(f64),
    Bool(bool),
    Text(String),
    Null,
}

impl ResultValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ResultValue::Null)
    }

    /// Numeric view of the value.
    ///
    /// Numeric-looking text is accepted (entry forms deliver strings), so
    /// `"7.2"` reads as `7.2`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ResultValue::Number(n) => Some(*n),
            ResultValue::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Display form used by the formatter.
    pub fn display(&self) -> String {
        match self {
            ResultValue::Number(n) => format_number(*n),
            ResultValue::Bool(b) => b.to_string(),
            ResultValue::Text(s) => s.clone(),
            ResultValue::Null => String::new(),
        }
    }
}

/// Formats a number without a trailing `.0` for whole values.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// One append-only workflow audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEntry {
    pub status: ReportStatus,
    pub at: DateTime<Utc>,
    pub by: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Outcome of a QC check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QcStatus {
    Passed,
    Failed,
}

/// Recorded QC gate result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QcRecord {
    pub status: QcStatus,
    pub checked_by: String,
    pub checked_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Recorded pathologist review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub reviewed_by: String,
    pub reviewed_at: DateTime<Utc>,
    #[serde(default)]
    pub reviewer_notes: Option<String>,
    /// Reviewer override of the automatic interpretation.
    #[serde(default)]
    pub manual_interpretation: Option<String>,
    #[serde(default)]
    pub impressions: Option<String>,
    #[serde(default)]
    pub recommendations: Option<String>,
}

/// Recorded approval / sign-off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub approved_by: String,
    pub approved_at: DateTime<Utc>,
    #[serde(default)]
    pub approver_designation: Option<String>,
    /// Opaque signature artifact; verification belongs to a collaborator.
    pub digital_signature: String,
    #[serde(default)]
    pub signature_verified: bool,
}

/// Recorded release to the patient / downstream consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseRecord {
    pub released_by: String,
    pub released_at: DateTime<Utc>,
    #[serde(default)]
    pub release_mode: Option<String>,
    pub visible_to_patient: bool,
}

/// Why a report is locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockReason {
    SignedOff,
}

/// One post-finalization correction, tracked with before/after values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Amendment {
    pub amendment_id: Uuid,
    pub amended_at: DateTime<Utc>,
    pub amended_by: String,
    /// Why the correction was made. Required and never blank.
    pub reason: NonEmptyText,
    pub previous_values: BTreeMap<String, ResultValue>,
    pub new_values: BTreeMap<String, ResultValue>,
    #[serde(default)]
    pub approved_by: Option<String>,
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
}

/// LOW / NORMAL / HIGH classification of one numeric result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RangeFlag {
    Low,
    Normal,
    High,
}

/// Automatic interpretation derived at entry time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoInterpretation {
    /// Per-field classification, only for fields with a declared range.
    pub flags: BTreeMap<String, RangeFlag>,
    /// One-line human-readable summary of the abnormal fields.
    pub summary: String,
}

/// Which side of the critical band was breached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CriticalKind {
    Low,
    High,
}

/// One critical-value breach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalValue {
    pub field: String,
    pub value: f64,
    pub threshold: f64,
    #[serde(rename = "type")]
    pub kind: CriticalKind,
    pub requires_notification: bool,
}

/// A collected specimen attached to a report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Specimen {
    pub specimen_type: String,
    #[serde(default)]
    pub collected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Rows entered against a repeatable section: section title → row entries.
pub type RepeatableSectionsData = BTreeMap<String, Vec<BTreeMap<String, ResultValue>>>;

/// One filled instance of a template for one patient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Human-readable identifier, `RPT{YY}{MM}{DD}{seq:03}`, sequence
    /// resetting daily per hospital.
    pub report_id: String,
    pub hospital_id: String,
    pub patient_id: String,
    #[serde(default)]
    pub order_item_id: Option<String>,

    /// Deep copy of the template at creation time. Never mutated.
    pub template_snapshot: Template,
    pub template_version: u32,

    pub status: ReportStatus,
    pub results: BTreeMap<String, ResultValue>,
    pub calculated_results: BTreeMap<String, Option<f64>>,
    #[serde(default)]
    pub auto_interpretation: Option<AutoInterpretation>,
    pub has_critical_values: bool,
    pub critical_values: Vec<CriticalValue>,
    #[serde(default)]
    pub specimens: Vec<Specimen>,
    #[serde(default)]
    pub repeatable_sections_data: RepeatableSectionsData,

    #[serde(default)]
    pub qc: Option<QcRecord>,
    #[serde(default)]
    pub review: Option<ReviewRecord>,
    #[serde(default)]
    pub approval: Option<ApprovalRecord>,
    #[serde(default)]
    pub release: Option<ReleaseRecord>,

    pub is_locked: bool,
    #[serde(default)]
    pub locked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub locked_by: Option<String>,
    #[serde(default)]
    pub lock_reason: Option<LockReason>,

    pub is_released: bool,
    pub is_amended: bool,
    pub amendment_count: u32,
    pub amendments: Vec<Amendment>,

    pub workflow_history: Vec<WorkflowEntry>,

    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

impl Report {
    /// Appends one workflow-history entry. The only sanctioned way to touch
    /// the history.
    pub fn append_history(
        &mut self,
        status: ReportStatus,
        by: impl Into<String>,
        notes: Option<String>,
    ) {
        self.workflow_history.push(WorkflowEntry {
            status,
            at: Utc::now(),
            by: by.into(),
            notes,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_value_as_number() {
        assert_eq!(ResultValue::Number(7.0).as_number(), Some(7.0));
        assert_eq!(ResultValue::Text("7.2".to_string()).as_number(), Some(7.2));
        assert_eq!(ResultValue::Text(" 12 ".to_string()).as_number(), Some(12.0));
        assert_eq!(ResultValue::Text("positive".to_string()).as_number(), None);
        assert_eq!(ResultValue::Null.as_number(), None);
        assert_eq!(ResultValue::Bool(true).as_number(), None);
    }

    #[test]
    fn test_result_value_serializes_untagged() {
        let json = serde_json::to_string(&ResultValue::Number(9.5)).unwrap();
        assert_eq!(json, "9.5");
        let json = serde_json::to_string(&ResultValue::Null).unwrap();
        assert_eq!(json, "null");

        let back: ResultValue = serde_json::from_str("\"reactive\"").unwrap();
        assert_eq!(back, ResultValue::Text("reactive".to_string()));
    }

    #[test]
    fn test_format_number_trims_whole_values() {
        assert_eq!(format_number(7.0), "7");
        assert_eq!(format_number(7.25), "7.25");
        assert_eq!(format_number(-3.0), "-3");
    }

    #[test]
    fn test_status_display_matches_wire_form() {
        assert_eq!(ReportStatus::QcChecked.to_string(), "QC_CHECKED");
        assert_eq!(
            serde_json::to_string(&ReportStatus::QcChecked).unwrap(),
            "\"QC_CHECKED\""
        );
    }
}
