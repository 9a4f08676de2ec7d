//! Presentation-neutral report formatting.
//!
//! Turns a stored report into the display structure its template type calls
//! for: value rows for tabular panels, test/result/method entries for
//! qualitative panels, titled prose sections for narrative reports, and the
//! growth/organism/sensitivity layout for culture results. Rendering to PDF
//! or HTML belongs to the host; this module only decides WHAT appears.

use crate::external::Sex;
use crate::report::{format_number, RangeFlag, Report, ResultValue};
use crate::system_templates::{
    ANTIBIOTIC, ANTIBIOTIC_SENSITIVITY_SECTION, COLONY_COUNT, GROWTH_STATUS, ORGANISM_ISOLATED,
    SENSITIVITY,
};
use crate::template::{DemographicVariant, FieldType, Template, TemplateType};
use serde::Serialize;

/// One row of a tabular panel.
#[derive(Debug, Clone, Serialize)]
pub struct ResultRow {
    pub parameter: String,
    pub value: String,
    pub unit: Option<String>,
    /// Band for the patient's demographic variant, e.g. `12 - 16`.
    pub reference_range: Option<String>,
    /// `LOW` / `NORMAL` / `HIGH`, or `CRITICAL` when the value breached a
    /// critical threshold. Absent for fields without a declared range.
    pub interpretation: Option<String>,
}

/// One entry of a qualitative panel.
#[derive(Debug, Clone, Serialize)]
pub struct QualitativeEntry {
    pub test_name: String,
    pub result: String,
    pub method: Option<String>,
}

/// One titled prose block of a narrative report.
#[derive(Debug, Clone, Serialize)]
pub struct NarrativeSection {
    pub title: String,
    pub content: String,
}

/// One antibiotic row of a sensitivity panel.
#[derive(Debug, Clone, Serialize)]
pub struct SensitivityRow {
    pub antibiotic: String,
    pub sensitivity: String,
}

/// The template-type-specific body of a formatted report.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FormattedBody {
    Tabular {
        rows: Vec<ResultRow>,
    },
    Qualitative {
        entries: Vec<QualitativeEntry>,
    },
    Narrative {
        sections: Vec<NarrativeSection>,
    },
    CultureSensitivity {
        growth_status: String,
        organism_isolated: Option<String>,
        colony_count: Option<String>,
        antibiotic_sensitivity: Vec<SensitivityRow>,
    },
    Hybrid {
        rows: Vec<ResultRow>,
        sections: Vec<NarrativeSection>,
    },
}

/// Overall report-level verdict, worst finding wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallStatus {
    Normal,
    Abnormal,
    Critical,
}

/// Counts of the classified results plus the overall verdict.
#[derive(Debug, Clone, Serialize)]
pub struct InterpretationSummary {
    pub normal_count: usize,
    pub abnormal_count: usize,
    pub critical_count: usize,
    pub overall_status: OverallStatus,
}

/// A report shaped for display.
#[derive(Debug, Clone, Serialize)]
pub struct FormattedReport {
    pub report_id: String,
    pub title: String,
    pub category: String,
    pub status: String,
    pub body: FormattedBody,
    pub summary: InterpretationSummary,
    /// Reviewer override when present, otherwise the automatic summary line.
    pub interpretation: String,
    pub impressions: Option<String>,
    pub recommendations: Option<String>,
}

/// Builds [`FormattedReport`]s from stored reports.
#[derive(Debug, Clone, Default)]
pub struct ReportFormatter;

impl ReportFormatter {
    pub fn new() -> Self {
        Self
    }

    /// Formats a report for display.
    ///
    /// `sex` selects the demographic variant shown in the reference-range
    /// column; it must be the same patient attribute interpretation ran
    /// against. CLINICAL_NOTE templates format as narrative.
    pub fn format(&self, report: &Report, sex: Sex) -> FormattedReport {
        let template = &report.template_snapshot;

        let body = match template.template_type {
            TemplateType::Tabular => FormattedBody::Tabular {
                rows: self.rows(report, sex),
            },
            TemplateType::Qualitative => FormattedBody::Qualitative {
                entries: self.qualitative_entries(report),
            },
            TemplateType::Narrative | TemplateType::ClinicalNote => FormattedBody::Narrative {
                sections: self.narrative_sections(report),
            },
            TemplateType::CultureSensitivity => self.culture_body(report),
            TemplateType::Hybrid => FormattedBody::Hybrid {
                rows: self.rows(report, sex),
                sections: self.narrative_sections(report),
            },
        };

        let summary = summarize(report);
        let review = report.review.as_ref();
        let interpretation = review
            .and_then(|r| r.manual_interpretation.clone())
            .or_else(|| {
                report
                    .auto_interpretation
                    .as_ref()
                    .map(|a| a.summary.clone())
            })
            .unwrap_or_default();

        FormattedReport {
            report_id: report.report_id.clone(),
            title: template.name.clone(),
            category: template.category.clone(),
            status: report.status.to_string(),
            body,
            summary,
            interpretation,
            impressions: review.and_then(|r| r.impressions.clone()),
            recommendations: review.and_then(|r| r.recommendations.clone()),
        }
    }

    /// One row per entry field in template order, then one per calculated
    /// field. Null entry values render as empty cells.
    fn rows(&self, report: &Report, sex: Sex) -> Vec<ResultRow> {
        let template = &report.template_snapshot;
        let variant = DemographicVariant::from(sex);
        let mut rows = Vec::with_capacity(template.fields.len() + template.calculated_fields.len());

        for field in &template.fields {
            let value = report
                .results
                .get(&field.code)
                .map(ResultValue::display)
                .unwrap_or_default();
            rows.push(ResultRow {
                parameter: field.label.clone(),
                value,
                unit: field.unit.clone(),
                reference_range: range_text(template, &field.code, variant),
                interpretation: interpretation_text(report, &field.code),
            });
        }

        for calc in &template.calculated_fields {
            let value = report
                .calculated_results
                .get(&calc.code)
                .copied()
                .flatten()
                .map(format_number)
                .unwrap_or_default();
            rows.push(ResultRow {
                parameter: calc.label.clone().unwrap_or_else(|| calc.code.clone()),
                value,
                unit: calc.unit.clone(),
                reference_range: range_text(template, &calc.code, variant),
                interpretation: interpretation_text(report, &calc.code),
            });
        }

        rows
    }

    fn qualitative_entries(&self, report: &Report) -> Vec<QualitativeEntry> {
        let template = &report.template_snapshot;
        template
            .fields
            .iter()
            .map(|field| QualitativeEntry {
                test_name: field.label.clone(),
                result: report
                    .results
                    .get(&field.code)
                    .map(ResultValue::display)
                    .unwrap_or_default(),
                method: field.method.clone(),
            })
            .collect()
    }

    /// One section per text field that holds a value, in template order.
    fn narrative_sections(&self, report: &Report) -> Vec<NarrativeSection> {
        let template = &report.template_snapshot;
        template
            .fields
            .iter()
            .filter(|field| field.field_type == FieldType::Text)
            .filter_map(|field| {
                let value = report.results.get(&field.code)?;
                if value.is_null() {
                    return None;
                }
                Some(NarrativeSection {
                    title: field.label.clone(),
                    content: value.display(),
                })
            })
            .collect()
    }

    fn culture_body(&self, report: &Report) -> FormattedBody {
        let text_of = |code: &str| -> Option<String> {
            report
                .results
                .get(code)
                .filter(|v| !v.is_null())
                .map(ResultValue::display)
        };

        let antibiotic_sensitivity = report
            .repeatable_sections_data
            .get(ANTIBIOTIC_SENSITIVITY_SECTION)
            .map(|entries| {
                entries
                    .iter()
                    .map(|row| SensitivityRow {
                        antibiotic: row
                            .get(ANTIBIOTIC)
                            .map(ResultValue::display)
                            .unwrap_or_default(),
                        sensitivity: row
                            .get(SENSITIVITY)
                            .map(ResultValue::display)
                            .unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        FormattedBody::CultureSensitivity {
            growth_status: text_of(GROWTH_STATUS).unwrap_or_default(),
            organism_isolated: text_of(ORGANISM_ISOLATED),
            colony_count: text_of(COLONY_COUNT),
            antibiotic_sensitivity,
        }
    }
}

fn range_text(template: &Template, code: &str, variant: DemographicVariant) -> Option<String> {
    template
        .range_for(code, variant)
        .map(|band| format!("{} - {}", format_number(band.min), format_number(band.max)))
}

/// Display form of a field's classification; a critical breach outranks its
/// range flag.
fn interpretation_text(report: &Report, code: &str) -> Option<String> {
    if report.critical_values.iter().any(|cv| cv.field == code) {
        return Some("CRITICAL".to_string());
    }
    let flags = &report.auto_interpretation.as_ref()?.flags;
    flags.get(code).map(|flag| {
        match flag {
            RangeFlag::Low => "LOW",
            RangeFlag::Normal => "NORMAL",
            RangeFlag::High => "HIGH",
        }
        .to_string()
    })
}

/// Counts classified fields and derives the overall verdict. A field counted
/// critical is not double-counted abnormal.
fn summarize(report: &Report) -> InterpretationSummary {
    let critical_count = report.critical_values.len();
    let mut normal_count = 0;
    let mut abnormal_count = 0;

    if let Some(interpretation) = &report.auto_interpretation {
        for (code, flag) in &interpretation.flags {
            if report.critical_values.iter().any(|cv| &cv.field == code) {
                continue;
            }
            match flag {
                RangeFlag::Normal => normal_count += 1,
                RangeFlag::Low | RangeFlag::High => abnormal_count += 1,
            }
        }
    }

    let overall_status = if critical_count > 0 {
        OverallStatus::Critical
    } else if abnormal_count > 0 {
        OverallStatus::Abnormal
    } else {
        OverallStatus::Normal
    };

    InterpretationSummary {
        normal_count,
        abnormal_count,
        critical_count,
        overall_status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{
        AutoInterpretation, CriticalKind, CriticalValue, ReportStatus, ReviewRecord,
    };
    use crate::system_templates;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn empty_report(template: Template) -> Report {
        Report {
            report_id: "RPT260823001".to_string(),
            hospital_id: "H1".to_string(),
            patient_id: "P1".to_string(),
            order_item_id: None,
            template_version: template.version,
            template_snapshot: template,
            status: ReportStatus::Entered,
            results: BTreeMap::new(),
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
            created_at: Utc::now(),
            created_by: "tech.jane".to_string(),
        }
    }

    fn set_number(report: &mut Report, code: &str, value: f64) {
        report
            .results
            .insert(code.to_string(), ResultValue::Number(value));
    }

    fn set_text(report: &mut Report, code: &str, value: &str) {
        report
            .results
            .insert(code.to_string(), ResultValue::Text(value.to_string()));
    }

    fn cbc_report() -> Report {
        let templates = system_templates::system_templates();
        let cbc = templates
            .into_iter()
            .find(|t| t.template_code.as_str() == "CBC_DEFAULT")
            .unwrap();
        let mut report = empty_report(cbc);
        set_number(&mut report, "HB", 9.0);
        set_number(&mut report, "RBC", 4.8);
        set_number(&mut report, "WBC", 7.0);
        set_number(&mut report, "PLT", 250.0);
        report
            .calculated_results
            .insert("MCV".to_string(), Some(87.5));

        let mut flags = BTreeMap::new();
        flags.insert("HB".to_string(), RangeFlag::Low);
        flags.insert("WBC".to_string(), RangeFlag::Normal);
        flags.insert("PLT".to_string(), RangeFlag::Normal);
        flags.insert("MCV".to_string(), RangeFlag::Normal);
        report.auto_interpretation = Some(AutoInterpretation {
            flags,
            summary: "Outside reference range: HB (LOW)".to_string(),
        });
        report
    }

    #[test]
    fn test_tabular_rows_carry_range_and_flag() {
        let formatter = ReportFormatter::new();
        let formatted = formatter.format(&cbc_report(), Sex::Female);

        let FormattedBody::Tabular { rows } = formatted.body else {
            panic!("expected tabular body");
        };

        let hb = rows.iter().find(|r| r.parameter == "Haemoglobin").unwrap();
        assert_eq!(hb.value, "9");
        assert_eq!(hb.unit.as_deref(), Some("g/dL"));
        assert_eq!(hb.reference_range.as_deref(), Some("12 - 16"));
        assert_eq!(hb.interpretation.as_deref(), Some("LOW"));

        // Calculated fields appear after entry fields.
        let mcv = rows
            .iter()
            .find(|r| r.parameter == "Mean Corpuscular Volume")
            .unwrap();
        assert_eq!(mcv.value, "87.5");
        assert_eq!(mcv.interpretation.as_deref(), Some("NORMAL"));

        // HCT was never entered: empty cell, no flag.
        let hct = rows.iter().find(|r| r.parameter == "Haematocrit").unwrap();
        assert_eq!(hct.value, "");
        assert!(hct.interpretation.is_none());
    }

    #[test]
    fn test_reference_range_follows_demographic_variant() {
        let formatter = ReportFormatter::new();

        let male = formatter.format(&cbc_report(), Sex::Male);
        let FormattedBody::Tabular { rows } = male.body else {
            panic!("expected tabular body");
        };
        let rbc = rows
            .iter()
            .find(|r| r.parameter == "Red Blood Cells")
            .unwrap();
        assert_eq!(rbc.reference_range.as_deref(), Some("4.5 - 5.9"));

        let female = formatter.format(&cbc_report(), Sex::Female);
        let FormattedBody::Tabular { rows } = female.body else {
            panic!("expected tabular body");
        };
        let rbc = rows
            .iter()
            .find(|r| r.parameter == "Red Blood Cells")
            .unwrap();
        assert_eq!(rbc.reference_range.as_deref(), Some("4 - 5.2"));
    }

    #[test]
    fn test_critical_breach_outranks_range_flag() {
        let formatter = ReportFormatter::new();
        let mut report = cbc_report();
        set_number(&mut report, "HB", 7.0);
        report.has_critical_values = true;
        report.critical_values = vec![CriticalValue {
            field: "HB".to_string(),
            value: 7.0,
            threshold: 8.0,
            kind: CriticalKind::Low,
            requires_notification: true,
        }];

        let formatted = formatter.format(&report, Sex::Female);
        let FormattedBody::Tabular { rows } = formatted.body else {
            panic!("expected tabular body");
        };
        let hb = rows.iter().find(|r| r.parameter == "Haemoglobin").unwrap();
        assert_eq!(hb.interpretation.as_deref(), Some("CRITICAL"));

        assert_eq!(formatted.summary.critical_count, 1);
        // The critical field is not double-counted abnormal.
        assert_eq!(formatted.summary.abnormal_count, 0);
        assert_eq!(formatted.summary.normal_count, 3);
        assert_eq!(formatted.summary.overall_status, OverallStatus::Critical);
    }

    #[test]
    fn test_summary_precedence_without_criticals() {
        let formatter = ReportFormatter::new();
        let formatted = formatter.format(&cbc_report(), Sex::Female);

        assert_eq!(formatted.summary.abnormal_count, 1); // HB low
        assert_eq!(formatted.summary.normal_count, 3);
        assert_eq!(formatted.summary.critical_count, 0);
        assert_eq!(formatted.summary.overall_status, OverallStatus::Abnormal);
        assert_eq!(formatted.interpretation, "Outside reference range: HB (LOW)");
    }

    #[test]
    fn test_manual_interpretation_overrides_auto_summary() {
        let formatter = ReportFormatter::new();
        let mut report = cbc_report();
        report.review = Some(ReviewRecord {
            reviewed_by: "dr.rao".to_string(),
            reviewed_at: Utc::now(),
            reviewer_notes: None,
            manual_interpretation: Some("Mild anaemia, correlate clinically".to_string()),
            impressions: Some("Iron studies advised".to_string()),
            recommendations: None,
        });

        let formatted = formatter.format(&report, Sex::Female);
        assert_eq!(formatted.interpretation, "Mild anaemia, correlate clinically");
        assert_eq!(formatted.impressions.as_deref(), Some("Iron studies advised"));
    }

    #[test]
    fn test_qualitative_body_lists_test_result_method() {
        let templates = system_templates::system_templates();
        let serology = templates
            .into_iter()
            .find(|t| t.template_code.as_str() == "SEROLOGY_DEFAULT")
            .unwrap();
        let mut report = empty_report(serology);
        set_text(&mut report, "HBSAG", "Non-reactive");
        set_text(&mut report, "HIV_1_2", "Non-reactive");

        let formatted = ReportFormatter::new().format(&report, Sex::Male);
        let FormattedBody::Qualitative { entries } = formatted.body else {
            panic!("expected qualitative body");
        };

        assert_eq!(entries.len(), 3);
        let hbsag = &entries[0];
        assert_eq!(hbsag.test_name, "Hepatitis B Surface Antigen");
        assert_eq!(hbsag.result, "Non-reactive");
        assert_eq!(hbsag.method.as_deref(), Some("CMIA"));
        // VDRL never entered: present with an empty result.
        assert_eq!(entries[2].result, "");
    }

    #[test]
    fn test_narrative_body_keeps_filled_sections_in_order() {
        let templates = system_templates::system_templates();
        let imaging = templates
            .into_iter()
            .find(|t| t.template_code.as_str() == "XRAY_CHEST_DEFAULT")
            .unwrap();
        let mut report = empty_report(imaging);
        set_text(&mut report, "FINDINGS", "Lungs clear. No effusion.");
        set_text(&mut report, "IMPRESSION", "Normal chest radiograph.");

        let formatted = ReportFormatter::new().format(&report, Sex::Other);
        let FormattedBody::Narrative { sections } = formatted.body else {
            panic!("expected narrative body");
        };

        // TECHNIQUE was never entered so only two sections remain.
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].title, "Findings");
        assert_eq!(sections[0].content, "Lungs clear. No effusion.");
        assert_eq!(sections[1].title, "Impression");
    }

    #[test]
    fn test_clinical_note_formats_as_narrative() {
        let templates = system_templates::system_templates();
        let imaging = templates
            .into_iter()
            .find(|t| t.template_code.as_str() == "XRAY_CHEST_DEFAULT")
            .unwrap();
        let mut clinical = imaging;
        clinical.template_type = TemplateType::ClinicalNote;
        let mut report = empty_report(clinical);
        set_text(&mut report, "FINDINGS", "Stable.");

        let formatted = ReportFormatter::new().format(&report, Sex::Other);
        assert!(matches!(formatted.body, FormattedBody::Narrative { .. }));
    }

    #[test]
    fn test_culture_body_reads_repeatable_rows() {
        let templates = system_templates::system_templates();
        let culture = templates
            .into_iter()
            .find(|t| t.template_code.as_str() == "CULTURE_DEFAULT")
            .unwrap();
        let mut report = empty_report(culture);
        set_text(&mut report, GROWTH_STATUS, "Growth");
        set_text(&mut report, ORGANISM_ISOLATED, "E. coli");
        set_text(&mut report, COLONY_COUNT, ">100,000 CFU/mL");

        let rows = vec![
            BTreeMap::from([
                (
                    ANTIBIOTIC.to_string(),
                    ResultValue::Text("Amoxicillin".to_string()),
                ),
                (
                    SENSITIVITY.to_string(),
                    ResultValue::Text("Resistant".to_string()),
                ),
            ]),
            BTreeMap::from([
                (
                    ANTIBIOTIC.to_string(),
                    ResultValue::Text("Nitrofurantoin".to_string()),
                ),
                (
                    SENSITIVITY.to_string(),
                    ResultValue::Text("Sensitive".to_string()),
                ),
            ]),
        ];
        report
            .repeatable_sections_data
            .insert(ANTIBIOTIC_SENSITIVITY_SECTION.to_string(), rows);

        let formatted = ReportFormatter::new().format(&report, Sex::Female);
        let FormattedBody::CultureSensitivity {
            growth_status,
            organism_isolated,
            colony_count,
            antibiotic_sensitivity,
        } = formatted.body
        else {
            panic!("expected culture body");
        };

        assert_eq!(growth_status, "Growth");
        assert_eq!(organism_isolated.as_deref(), Some("E. coli"));
        assert_eq!(colony_count.as_deref(), Some(">100,000 CFU/mL"));
        assert_eq!(antibiotic_sensitivity.len(), 2);
        assert_eq!(antibiotic_sensitivity[1].antibiotic, "Nitrofurantoin");
        assert_eq!(antibiotic_sensitivity[1].sensitivity, "Sensitive");
    }

    #[test]
    fn test_hybrid_combines_rows_and_sections() {
        let templates = system_templates::system_templates();
        let mut hybrid = templates
            .into_iter()
            .find(|t| t.template_code.as_str() == "CBC_DEFAULT")
            .unwrap();
        hybrid.template_type = TemplateType::Hybrid;
        hybrid.fields.push(crate::template::FieldDefinition {
            code: "COMMENT".to_string(),
            label: "Comment".to_string(),
            field_type: FieldType::Text,
            unit: None,
            required: false,
            validation: None,
            method: None,
        });
        let mut report = empty_report(hybrid);
        set_number(&mut report, "HB", 14.0);
        set_text(&mut report, "COMMENT", "Film reviewed.");

        let formatted = ReportFormatter::new().format(&report, Sex::Female);
        let FormattedBody::Hybrid { rows, sections } = formatted.body else {
            panic!("expected hybrid body");
        };
        assert!(rows.iter().any(|r| r.parameter == "Haemoglobin"));
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].content, "Film reviewed.");
    }

    #[test]
    fn test_empty_report_summary_is_normal() {
        let templates = system_templates::system_templates();
        let cbc = templates
            .into_iter()
            .find(|t| t.template_code.as_str() == "CBC_DEFAULT")
            .unwrap();
        let report = empty_report(cbc);

        let formatted = ReportFormatter::new().format(&report, Sex::Female);
        assert_eq!(formatted.summary.overall_status, OverallStatus::Normal);
        assert_eq!(formatted.interpretation, "");
    }
}
