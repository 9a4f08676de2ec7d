//! Report lifecycle engine.
//!
//! Owns the report entity and its workflow state machine:
//!
//! ```text
//! DRAFT → ENTERED → QC_CHECKED → REVIEWED → APPROVED → RELEASED
//!                                              └──────────┴→ AMENDED (recurring)
//! ```
//!
//! Result entry runs the fixed pipeline validate → calculate → interpret →
//! detect-critical, merges the outputs, and advances the state. Approval
//! locks the report; from then on `amend_report` is the only sanctioned
//! mutation path for results. Every transition appends exactly one
//! workflow-history entry.

use crate::config::CoreConfig;
use crate::critical::CriticalValueDetector;
use crate::error::{ReportError, ReportResult};
use crate::expression::ExpressionEvaluator;
use crate::external::PatientDirectory;
use crate::interpretation::RangeInterpreter;
use crate::notify::{Notification, NotificationQueue};
use crate::report::{
    Amendment, ApprovalRecord, LockReason, QcRecord, QcStatus, ReleaseRecord, Report,
    ReportStatus, ResultValue, ReviewRecord,
};
use crate::store::Store;
use crate::template::{FieldType, Template};
use chrono::Utc;
use dxr_types::NonEmptyText;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Reviewer inputs recorded at the review stage.
#[derive(Debug, Clone, Default)]
pub struct ReviewInput {
    pub reviewer_notes: Option<String>,
    /// Overrides the automatic interpretation on the rendered report.
    pub manual_interpretation: Option<String>,
    pub impressions: Option<String>,
    pub recommendations: Option<String>,
}

/// Orchestrates report creation, result entry, and workflow transitions.
pub struct ReportLifecycleEngine {
    cfg: Arc<CoreConfig>,
    store: Arc<Store>,
    patients: Arc<dyn PatientDirectory>,
    queue: Arc<NotificationQueue>,
    evaluator: ExpressionEvaluator,
    interpreter: RangeInterpreter,
    detector: CriticalValueDetector,
}

impl ReportLifecycleEngine {
    pub fn new(
        cfg: Arc<CoreConfig>,
        store: Arc<Store>,
        patients: Arc<dyn PatientDirectory>,
        queue: Arc<NotificationQueue>,
    ) -> Self {
        let evaluator = ExpressionEvaluator::new(cfg.calculation_precision());
        Self {
            cfg,
            store,
            patients,
            queue,
            evaluator,
            interpreter: RangeInterpreter::new(),
            detector: CriticalValueDetector::new(),
        }
    }

    /// Creates a DRAFT report from a template snapshot.
    ///
    /// Initialises `results[code] = null` for every entry field of the
    /// template and nothing else. The report id is `RPT{YY}{MM}{DD}{seq:03}`
    /// with the sequence allocated atomically per `(hospital, day)`.
    pub fn create_report(
        &self,
        template: &Template,
        patient_id: &str,
        hospital_id: &str,
        order_item_id: Option<String>,
        created_by: &str,
    ) -> ReportResult<Report> {
        let created_by = actor("created_by", created_by)?;

        // Existence check; also needed later for demographic range selection.
        self.patients.get_patient(patient_id)?;

        let now = Utc::now();
        let seq = self.store.next_report_seq(hospital_id, now.date_naive());
        let report_id = format!(
            "{}{}{:03}",
            self.cfg.report_id_prefix(),
            now.format("%y%m%d"),
            seq
        );

        let results: BTreeMap<String, ResultValue> = template
            .fields
            .iter()
            .map(|f| (f.code.clone(), ResultValue::Null))
            .collect();

        let mut report = Report {
            report_id,
            hospital_id: hospital_id.to_owned(),
            patient_id: patient_id.to_owned(),
            order_item_id,
            template_snapshot: template.clone(),
            template_version: template.version,
            status: ReportStatus::Draft,
            results,
            calculated_results: BTreeMap::new(),
            auto_interpretation: None,
            has_critical_values: false,
            critical_values: Vec::new(),
            specimens: Vec::new(),
            repeatable_sections_data: BTreeMap::new(),
            qc: None,
            review: None,
            approval: None,
            release: None,
            is_locked: false,
            locked_at: None,
            locked_by: None,
            lock_reason: None,
            is_released: false,
            is_amended: false,
            amendment_count: 0,
            amendments: Vec::new(),
            workflow_history: Vec::new(),
            created_at: now,
            created_by: created_by.clone(),
        };
        report.append_history(ReportStatus::Draft, created_by, None);

        self.store.insert_report(report.clone())?;
        Ok(report)
    }

    /// Enters (or re-enters) results and runs the derivation pipeline.
    ///
    /// Pipeline, in fixed order: validate → calculate → interpret →
    /// detect-critical → persist merged results → best-effort critical
    /// notification. The lock check and the merge-and-status write happen in
    /// one store transaction, so entry can never race a concurrent approval.
    ///
    /// # Errors
    ///
    /// `ReportError::Locked` on a locked report, `ReportError::Validation`
    /// for unknown fields, missing required fields, non-numeric or
    /// out-of-bounds numeric values. Per-field calculation failures do not
    /// error; the failed field is stored as `null`.
    pub fn update_results(
        &self,
        report_id: &str,
        entries: BTreeMap<String, ResultValue>,
        entered_by: &str,
    ) -> ReportResult<Report> {
        let entered_by = actor("entered_by", entered_by)?;
        let current = self.store.get_report(report_id)?;
        let patient = self.patients.get_patient(&current.patient_id)?;
        let sex = patient.sex;

        let updated = self.store.update_report(report_id, |report| {
            if report.is_locked {
                return Err(ReportError::Locked(format!(
                    "report {} is locked ({:?})",
                    report.report_id, report.lock_reason
                )));
            }

            let template = &report.template_snapshot;
            let merged = validate_results(template, &report.results, &entries)?;

            let calculated = self.evaluator.calculate(template, &merged);

            let mut numeric_view: BTreeMap<String, f64> = merged
                .iter()
                .filter_map(|(code, value)| value.as_number().map(|n| (code.clone(), n)))
                .collect();
            for (code, value) in &calculated {
                if let Some(n) = value {
                    numeric_view.insert(code.clone(), *n);
                }
            }

            let interpretation = self.interpreter.interpret(template, &numeric_view, sex);
            let findings = self.detector.detect(template, &numeric_view);

            report.results = merged;
            report.calculated_results = calculated;
            report.auto_interpretation = Some(interpretation);
            report.has_critical_values = findings.has_critical;
            report.critical_values = findings.critical_values;
            report.status = ReportStatus::Entered;
            report.append_history(ReportStatus::Entered, entered_by, None);
            Ok(())
        })?;

        // Best-effort: enqueueing never blocks or fails the save.
        if updated
            .critical_values
            .iter()
            .any(|v| v.requires_notification)
        {
            self.queue.enqueue(Notification::Critical {
                report_id: updated.report_id.clone(),
                patient_id: updated.patient_id.clone(),
                values: updated.critical_values.clone(),
            });
        }

        Ok(updated)
    }

    /// Records the QC gate outcome.
    ///
    /// PASSED advances to QC_CHECKED; FAILED records the check but leaves the
    /// report in ENTERED pending re-entry.
    pub fn perform_qc_check(
        &self,
        report_id: &str,
        qc_status: QcStatus,
        checked_by: &str,
        notes: Option<String>,
    ) -> ReportResult<Report> {
        let checked_by = actor("checked_by", checked_by)?;
        self.store.update_report(report_id, |report| {
            if report.status != ReportStatus::Entered {
                return Err(ReportError::InvalidState {
                    operation: "performQCCheck",
                    status: report.status,
                });
            }

            report.qc = Some(QcRecord {
                status: qc_status,
                checked_by: checked_by.clone(),
                checked_at: Utc::now(),
                notes: notes.clone(),
            });

            match qc_status {
                QcStatus::Passed => {
                    report.status = ReportStatus::QcChecked;
                    report.append_history(ReportStatus::QcChecked, checked_by, notes.clone());
                }
                QcStatus::Failed => {
                    tracing::debug!(report_id = %report.report_id, "QC failed, report stays in ENTERED");
                    report.append_history(
                        ReportStatus::Entered,
                        checked_by,
                        Some(notes.clone().map_or_else(
                            || "QC failed".to_string(),
                            |n| format!("QC failed: {n}"),
                        )),
                    );
                }
            }
            Ok(())
        })
    }

    /// Records the pathologist review, including any interpretation override.
    pub fn perform_review(
        &self,
        report_id: &str,
        input: ReviewInput,
        reviewed_by: &str,
    ) -> ReportResult<Report> {
        let reviewed_by = actor("reviewed_by", reviewed_by)?;
        self.store.update_report(report_id, |report| {
            if report.status != ReportStatus::QcChecked {
                return Err(ReportError::InvalidState {
                    operation: "performReview",
                    status: report.status,
                });
            }

            report.review = Some(ReviewRecord {
                reviewed_by: reviewed_by.clone(),
                reviewed_at: Utc::now(),
                reviewer_notes: input.reviewer_notes.clone(),
                manual_interpretation: input.manual_interpretation.clone(),
                impressions: input.impressions.clone(),
                recommendations: input.recommendations.clone(),
            });
            report.status = ReportStatus::Reviewed;
            report.append_history(ReportStatus::Reviewed, reviewed_by, None);
            Ok(())
        })
    }

    /// Approves and signs off the report, locking it against further entry.
    pub fn approve_report(
        &self,
        report_id: &str,
        approved_by: &str,
        approver_designation: Option<String>,
        digital_signature: String,
    ) -> ReportResult<Report> {
        let approved_by = actor("approved_by", approved_by)?;
        self.store.update_report(report_id, |report| {
            if report.status != ReportStatus::Reviewed {
                return Err(ReportError::InvalidState {
                    operation: "approveReport",
                    status: report.status,
                });
            }

            let now = Utc::now();
            report.approval = Some(ApprovalRecord {
                approved_by: approved_by.clone(),
                approved_at: now,
                approver_designation: approver_designation.clone(),
                digital_signature: digital_signature.clone(),
                signature_verified: false,
            });
            report.is_locked = true;
            report.locked_at = Some(now);
            report.locked_by = Some(approved_by.clone());
            report.lock_reason = Some(LockReason::SignedOff);
            report.status = ReportStatus::Approved;
            report.append_history(ReportStatus::Approved, approved_by, None);
            Ok(())
        })
    }

    /// Releases an approved report to the patient / downstream consumers and
    /// queues the delivery notification.
    pub fn release_report(
        &self,
        report_id: &str,
        released_by: &str,
        release_mode: Option<String>,
        visible_to_patient: bool,
    ) -> ReportResult<Report> {
        let released_by = actor("released_by", released_by)?;
        let updated = self.store.update_report(report_id, |report| {
            if report.status != ReportStatus::Approved {
                return Err(ReportError::InvalidState {
                    operation: "releaseReport",
                    status: report.status,
                });
            }

            report.release = Some(ReleaseRecord {
                released_by: released_by.clone(),
                released_at: Utc::now(),
                release_mode: release_mode.clone(),
                visible_to_patient,
            });
            report.is_released = true;
            report.status = ReportStatus::Released;
            report.append_history(ReportStatus::Released, released_by, None);
            Ok(())
        })?;

        self.queue.enqueue(Notification::ReportReady {
            report_id: updated.report_id.clone(),
            patient_id: updated.patient_id.clone(),
        });

        Ok(updated)
    }

    /// Amends a finalized report.
    ///
    /// The only sanctioned mutation path once a report is locked: appends an
    /// amendment carrying before/after values, merges the new values into
    /// `results`, increments `amendment_count`, and appends one history
    /// entry. Amended deltas are stored exactly as recorded; derived fields
    /// are not re-run outside the audit trail.
    pub fn amend_report(
        &self,
        report_id: &str,
        amended_by: &str,
        reason: &str,
        new_values: BTreeMap<String, ResultValue>,
        approved_by: Option<String>,
    ) -> ReportResult<Report> {
        let amended_by = actor("amended_by", amended_by)?;
        let reason = NonEmptyText::new(reason)?;
        let approved_by = approved_by
            .as_deref()
            .map(|a| actor("approved_by", a))
            .transpose()?;
        if new_values.is_empty() {
            return Err(ReportError::validation(
                "new_values",
                "amendment must change at least one field",
            ));
        }

        self.store.update_report(report_id, |report| {
            if !matches!(
                report.status,
                ReportStatus::Approved | ReportStatus::Released | ReportStatus::Amended
            ) {
                return Err(ReportError::InvalidState {
                    operation: "amendReport",
                    status: report.status,
                });
            }

            let template = &report.template_snapshot;
            let normalized = normalize_entries(template, &new_values)?;

            let previous_values: BTreeMap<String, ResultValue> = normalized
                .keys()
                .map(|code| {
                    let prior = report
                        .results
                        .get(code)
                        .cloned()
                        .unwrap_or(ResultValue::Null);
                    (code.clone(), prior)
                })
                .collect();

            let now = Utc::now();
            report.amendments.push(Amendment {
                amendment_id: Uuid::new_v4(),
                amended_at: now,
                amended_by: amended_by.clone(),
                reason: reason.clone(),
                previous_values,
                new_values: normalized.clone(),
                approved_by: approved_by.clone(),
                approved_at: approved_by.as_ref().map(|_| now),
            });
            for (code, value) in normalized {
                report.results.insert(code, value);
            }
            report.is_amended = true;
            report.amendment_count += 1;
            report.status = ReportStatus::Amended;
            report.append_history(ReportStatus::Amended, amended_by, Some(reason.to_string()));
            Ok(())
        })
    }

    /// Fetches a report by its human-readable id.
    pub fn get_report(&self, report_id: &str) -> ReportResult<Report> {
        self.store.get_report(report_id)
    }

    /// All reports for one patient.
    pub fn reports_for_patient(&self, patient_id: &str) -> Vec<Report> {
        self.store.find_reports(|r| r.patient_id == patient_id)
    }

    /// All reports of one hospital in a given status.
    pub fn reports_with_status(&self, hospital_id: &str, status: ReportStatus) -> Vec<Report> {
        self.store
            .find_reports(|r| r.hospital_id == hospital_id && r.status == status)
    }
}

/// Validates an actor identity (the `*_by` inputs). Every transition is
/// attributed to someone, so a blank actor is a field-named validation
/// failure; the stored value is the trimmed form.
fn actor(field: &'static str, value: &str) -> ReportResult<String> {
    let text = NonEmptyText::new(value)
        .map_err(|e| ReportError::validation(field, e.to_string()))?;
    Ok(text.as_str().to_owned())
}

/// Validates entries against the template and merges them over the current
/// results.
///
/// Checks, failing fast with a field-named error:
/// 1. every entered key names an entry field of the template
/// 2. numeric fields hold numeric values within their declared bounds
/// 3. every required field is present and non-null after the merge
fn validate_results(
    template: &Template,
    current: &BTreeMap<String, ResultValue>,
    entries: &BTreeMap<String, ResultValue>,
) -> ReportResult<BTreeMap<String, ResultValue>> {
    let normalized = normalize_entries(template, entries)?;

    let mut merged = current.clone();
    for (code, value) in normalized {
        merged.insert(code, value);
    }

    for field in &template.fields {
        if field.required {
            let missing = merged
                .get(&field.code)
                .map_or(true, |value| value.is_null());
            if missing {
                return Err(ReportError::validation(
                    &field.code,
                    format!("required field '{}' is missing", field.label),
                ));
            }
        }
    }

    Ok(merged)
}

/// Checks entry keys and value types against the template; numeric values
/// (including numeric text) are normalized to numbers and bounds-checked.
fn normalize_entries(
    template: &Template,
    entries: &BTreeMap<String, ResultValue>,
) -> ReportResult<BTreeMap<String, ResultValue>> {
    let mut normalized = BTreeMap::new();

    for (code, value) in entries {
        let Some(field) = template.field(code) else {
            return Err(ReportError::validation(
                code,
                "field is not defined by the report template",
            ));
        };

        if value.is_null() {
            normalized.insert(code.clone(), ResultValue::Null);
            continue;
        }

        if field.field_type == FieldType::Numeric {
            let Some(number) = value.as_number() else {
                return Err(ReportError::validation(
                    code,
                    "value must be numeric",
                ));
            };
            if let Some(bounds) = &field.validation {
                if let Some(min) = bounds.min {
                    if number < min {
                        return Err(ReportError::validation(
                            code,
                            format!("value {number} is below the minimum of {min}"),
                        ));
                    }
                }
                if let Some(max) = bounds.max {
                    if number > max {
                        return Err(ReportError::validation(
                            code,
                            format!("value {number} is above the maximum of {max}"),
                        ));
                    }
                }
            }
            normalized.insert(code.clone(), ResultValue::Number(number));
        } else {
            normalized.insert(code.clone(), value.clone());
        }
    }

    Ok(normalized)
}
