//! Shared persistent store for templates and reports.
//!
//! The store is the only shared resource in the subsystem; all cross-request
//! coordination happens here, inside single critical sections:
//!
//! - report-id sequence numbers are allocated increment-and-read, never
//!   count-then-insert
//! - report mutations run read-check-write under one lock, so a lock flag
//!   set by a concurrent approval is always observed
//! - the at-most-one-default-template invariant is maintained by
//!   clear-then-set inside one critical section
//!
//! The store is constructed by the host and injected into the services that
//! need it. No module-level singletons.

use crate::error::{ReportError, ReportResult};
use crate::report::Report;
use crate::template::Template;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Default)]
struct StoreInner {
    templates: HashMap<Uuid, Template>,
    reports: HashMap<String, Report>,
    /// Daily report sequence per hospital: `(hospital_id, date) → last used`.
    report_seq: HashMap<(String, NaiveDate), u32>,
}

/// In-memory realization of the engine's storage seam.
#[derive(Debug, Default)]
pub struct Store {
    inner: Mutex<StoreInner>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> MutexGuard<'_, StoreInner> {
        // A poisoned mutex means a panic mid-critical-section elsewhere; the
        // data itself is still consistent for our read-modify-write closures.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // --- templates ---

    /// Inserts a new template row.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Conflict` if the id is already present.
    pub fn insert_template(&self, template: Template) -> ReportResult<()> {
        let mut inner = self.locked();
        if inner.templates.contains_key(&template.id) {
            return Err(ReportError::Conflict(format!(
                "template id {} already exists",
                template.id
            )));
        }
        inner.templates.insert(template.id, template);
        Ok(())
    }

    /// Fetches a template row by id.
    pub fn get_template(&self, id: Uuid) -> ReportResult<Template> {
        self.locked()
            .templates
            .get(&id)
            .cloned()
            .ok_or_else(|| ReportError::NotFound(format!("template {id}")))
    }

    /// Returns all templates matching the predicate.
    pub fn find_templates(&self, predicate: impl Fn(&Template) -> bool) -> Vec<Template> {
        let mut matches: Vec<Template> = self
            .locked()
            .templates
            .values()
            .filter(|t| predicate(t))
            .cloned()
            .collect();
        matches.sort_by(|a, b| {
            a.template_code
                .as_str()
                .cmp(b.template_code.as_str())
                .then(a.version.cmp(&b.version))
        });
        matches
    }

    /// Applies a mutation to a template inside one critical section.
    ///
    /// The closure may fail; in that case nothing it wrote is kept because it
    /// operates on a scratch clone that is only stored back on success.
    pub fn update_template(
        &self,
        id: Uuid,
        mutate: impl FnOnce(&mut Template) -> ReportResult<()>,
    ) -> ReportResult<Template> {
        let mut inner = self.locked();
        let current = inner
            .templates
            .get(&id)
            .ok_or_else(|| ReportError::NotFound(format!("template {id}")))?;

        let mut scratch = current.clone();
        mutate(&mut scratch)?;
        let updated = scratch.clone();
        inner.templates.insert(id, scratch);
        Ok(updated)
    }

    /// Inserts a new version row, atomically moving default status from the
    /// previous version if it carried it.
    pub fn insert_template_version(
        &self,
        mut template: Template,
        previous_id: Uuid,
    ) -> ReportResult<Template> {
        let mut inner = self.locked();
        if inner.templates.contains_key(&template.id) {
            return Err(ReportError::Conflict(format!(
                "template id {} already exists",
                template.id
            )));
        }
        let previous = inner
            .templates
            .get_mut(&previous_id)
            .ok_or_else(|| ReportError::NotFound(format!("template {previous_id}")))?;
        if previous.is_default {
            previous.is_default = false;
            template.is_default = true;
        }
        let stored = template.clone();
        inner.templates.insert(template.id, template);
        Ok(stored)
    }

    /// Makes `id` the default for its `(category, hospital)` pair,
    /// clearing any previous default in the same critical section.
    pub fn set_default_template(&self, id: Uuid) -> ReportResult<Template> {
        let mut inner = self.locked();
        let target = inner
            .templates
            .get(&id)
            .ok_or_else(|| ReportError::NotFound(format!("template {id}")))?;
        let category = target.category.clone();
        let hospital_id = target.hospital_id.clone();

        let mut updated = None;
        for template in inner.templates.values_mut() {
            if template.category == category && template.hospital_id == hospital_id {
                template.is_default = template.id == id;
            }
            if template.id == id {
                updated = Some(template.clone());
            }
        }

        updated.ok_or_else(|| ReportError::NotFound(format!("template {id}")))
    }

    // --- reports ---

    /// Allocates the next report sequence number for `(hospital_id, date)`.
    ///
    /// Increment-and-read under the lock: concurrent callers on the same day
    /// can never observe the same number.
    pub fn next_report_seq(&self, hospital_id: &str, date: NaiveDate) -> u32 {
        let mut inner = self.locked();
        let counter = inner
            .report_seq
            .entry((hospital_id.to_owned(), date))
            .or_insert(0);
        *counter += 1;
        *counter
    }

    /// Inserts a new report.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Conflict` if the report id is already present.
    pub fn insert_report(&self, report: Report) -> ReportResult<()> {
        let mut inner = self.locked();
        if inner.reports.contains_key(&report.report_id) {
            return Err(ReportError::Conflict(format!(
                "report {} already exists",
                report.report_id
            )));
        }
        inner.reports.insert(report.report_id.clone(), report);
        Ok(())
    }

    /// Fetches a report by its human-readable id.
    pub fn get_report(&self, report_id: &str) -> ReportResult<Report> {
        self.locked()
            .reports
            .get(report_id)
            .cloned()
            .ok_or_else(|| ReportError::NotFound(format!("report {report_id}")))
    }

    /// Applies a mutation to a report inside one critical section and
    /// returns the stored result.
    ///
    /// The closure runs against a scratch clone; a failed closure leaves the
    /// stored report untouched. This is the read-check-write point where
    /// lock and state preconditions are enforced.
    pub fn update_report(
        &self,
        report_id: &str,
        mutate: impl FnOnce(&mut Report) -> ReportResult<()>,
    ) -> ReportResult<Report> {
        let mut inner = self.locked();
        let current = inner
            .reports
            .get(report_id)
            .ok_or_else(|| ReportError::NotFound(format!("report {report_id}")))?;

        let mut scratch = current.clone();
        mutate(&mut scratch)?;
        let updated = scratch.clone();
        inner.reports.insert(report_id.to_owned(), scratch);
        Ok(updated)
    }

    /// Returns all reports matching the predicate.
    pub fn find_reports(&self, predicate: impl Fn(&Report) -> bool) -> Vec<Report> {
        let mut matches: Vec<Report> = self
            .locked()
            .reports
            .values()
            .filter(|r| predicate(r))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.report_id.cmp(&b.report_id));
        matches
    }
}
