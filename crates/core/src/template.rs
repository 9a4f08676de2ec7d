//! Report template data model.
//!
//! A template is a reusable, versioned schema for one shape of diagnostic
//! report: its entry fields, derived (calculated) fields, reference ranges,
//! critical-value rules, and presentation config. Every structure here is an
//! explicit tagged type rather than schemaless JSON, so field access is
//! checked at compile time.
//!
//! Presentation config (`header_config`, `footer_config`, `styling`,
//! `print_config`) is opaque to the engine and passed through to rendering.

use chrono::{DateTime, Utc};
use dxr_types::TemplateCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// The display/entry shape of a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemplateType {
    Tabular,
    Qualitative,
    Narrative,
    CultureSensitivity,
    ClinicalNote,
    Hybrid,
}

/// Data type of an entry field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    Numeric,
    Text,
    Boolean,
    Select,
}

/// Entry-time numeric bounds for a field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NumericBounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// One entry field of a template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Field code, unique within the template, used as the key in results.
    pub code: String,
    /// Human-readable label shown on entry forms and printouts.
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub required: bool,
    /// Entry validation bounds, only meaningful for numeric fields.
    #[serde(default)]
    pub validation: Option<NumericBounds>,
    /// Assay method, shown alongside qualitative results.
    #[serde(default)]
    pub method: Option<String>,
}

/// A derived field computed from entered values via an arithmetic formula.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculatedField {
    pub code: String,
    #[serde(default)]
    pub label: Option<String>,
    /// Arithmetic over field codes, e.g. `(HB / RBC) * 10`.
    pub formula: String,
    #[serde(default)]
    pub unit: Option<String>,
}

/// Demographic variant a reference range applies to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DemographicVariant {
    All,
    Male,
    Female,
}

/// One reference band: `min ..= max` is NORMAL, boundary inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeBand {
    pub min: f64,
    pub max: f64,
}

/// Critical-value thresholds for one field.
///
/// A result strictly below `critical_low` or strictly above `critical_high`
/// is a critical value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriticalRule {
    #[serde(default)]
    pub critical_low: Option<f64>,
    #[serde(default)]
    pub critical_high: Option<f64>,
    #[serde(default)]
    pub requires_notification: bool,
}

/// A named group of fields for entry and display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub field_codes: Vec<String>,
    /// Repeatable sections collect a list of row entries (e.g. one row per
    /// antibiotic in a sensitivity panel).
    #[serde(default)]
    pub repeatable: bool,
}

/// Reference ranges for a template: field code → variant → band.
pub type ReferenceRanges = BTreeMap<String, BTreeMap<DemographicVariant, RangeBand>>;

/// Critical-value rules for a template: field code → rule.
pub type CriticalValueRules = BTreeMap<String, CriticalRule>;

/// A reusable report schema.
///
/// System templates (`is_system_template = true`, no `hospital_id`) are
/// seeded by the platform and immutable. Hospital templates are created
/// directly or cloned from a system template. Versioning is row-based:
/// [`version`](Template::version) increases monotonically and old rows stay
/// queryable because existing reports snapshot them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: Uuid,
    pub template_code: TemplateCode,
    pub version: u32,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub sub_category: Option<String>,
    pub template_type: TemplateType,
    pub fields: Vec<FieldDefinition>,
    #[serde(default)]
    pub calculated_fields: Vec<CalculatedField>,
    #[serde(default)]
    pub reference_ranges: ReferenceRanges,
    #[serde(default)]
    pub critical_value_rules: CriticalValueRules,
    #[serde(default)]
    pub sections: Vec<Section>,
    /// Test codes this template is bound to, used by the resolve chain.
    #[serde(default)]
    pub test_codes: Vec<String>,
    #[serde(default)]
    pub header_config: serde_json::Value,
    #[serde(default)]
    pub footer_config: serde_json::Value,
    #[serde(default)]
    pub styling: serde_json::Value,
    #[serde(default)]
    pub print_config: serde_json::Value,
    pub is_system_template: bool,
    #[serde(default)]
    pub hospital_id: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

impl Template {
    /// Looks up an entry field by code.
    pub fn field(&self, code: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.code == code)
    }

    /// Selects the reference band for a field and demographic variant.
    ///
    /// Prefers the exact variant, falling back to the `all` band. Returns
    /// `None` when the field has no declared range for either.
    pub fn range_for(&self, code: &str, variant: DemographicVariant) -> Option<RangeBand> {
        let variants = self.reference_ranges.get(code)?;
        variants
            .get(&variant)
            .or_else(|| variants.get(&DemographicVariant::All))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template_with_hb_ranges() -> Template {
        let mut template = crate::test_support::blank_template("CBC_TEST", TemplateType::Tabular);
        template.fields.push(FieldDefinition {
            code: "HB".to_string(),
            label: "Haemoglobin".to_string(),
            field_type: FieldType::Numeric,
            unit: Some("g/dL".to_string()),
            required: true,
            validation: None,
            method: None,
        });

        let mut hb = BTreeMap::new();
        hb.insert(DemographicVariant::Male, RangeBand { min: 13.0, max: 17.0 });
        hb.insert(DemographicVariant::All, RangeBand { min: 12.0, max: 16.0 });
        template.reference_ranges.insert("HB".to_string(), hb);
        template
    }

    #[test]
    fn test_range_for_prefers_exact_variant() {
        let template = template_with_hb_ranges();
        let band = template
            .range_for("HB", DemographicVariant::Male)
            .unwrap();
        assert_eq!(band.min, 13.0);
        assert_eq!(band.max, 17.0);
    }

    #[test]
    fn test_range_for_falls_back_to_all() {
        let template = template_with_hb_ranges();
        let band = template
            .range_for("HB", DemographicVariant::Female)
            .unwrap();
        assert_eq!(band.min, 12.0);
        assert_eq!(band.max, 16.0);
    }

    #[test]
    fn test_range_for_missing_field() {
        let template = template_with_hb_ranges();
        assert!(template.range_for("WBC", DemographicVariant::All).is_none());
    }

    #[test]
    fn test_field_lookup() {
        let template = template_with_hb_ranges();
        assert!(template.field("HB").is_some());
        assert!(template.field("PLT").is_none());
        assert_eq!(template.field("HB").unwrap().unit.as_deref(), Some("g/dL"));
    }
}
