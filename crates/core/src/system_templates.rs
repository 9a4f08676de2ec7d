//! Seeded system templates.
//!
//! One platform-owned default template per major category, covering every
//! display shape: a tabular blood panel, a qualitative serology panel, a
//! narrative imaging report, and a culture & sensitivity result. Hospitals
//! clone these to customise; the rows themselves are immutable.

use crate::template::{
    CalculatedField, CriticalRule, DemographicVariant, FieldDefinition, FieldType, NumericBounds,
    RangeBand, Section, Template, TemplateType,
};
use chrono::Utc;
use dxr_types::TemplateCode;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Field codes the culture & sensitivity formatter reads.
pub const GROWTH_STATUS: &str = "GROWTH_STATUS";
pub const ORGANISM_ISOLATED: &str = "ORGANISM_ISOLATED";
pub const COLONY_COUNT: &str = "COLONY_COUNT";
/// Repeatable section title and its row field codes.
pub const ANTIBIOTIC_SENSITIVITY_SECTION: &str = "ANTIBIOTIC_SENSITIVITY";
pub const ANTIBIOTIC: &str = "ANTIBIOTIC";
pub const SENSITIVITY: &str = "SENSITIVITY";

fn numeric_field(
    code: &str,
    label: &str,
    unit: &str,
    required: bool,
    min: f64,
    max: f64,
) -> FieldDefinition {
    FieldDefinition {
        code: code.to_string(),
        label: label.to_string(),
        field_type: FieldType::Numeric,
        unit: Some(unit.to_string()),
        required,
        validation: Some(NumericBounds {
            min: Some(min),
            max: Some(max),
        }),
        method: None,
    }
}

fn text_field(code: &str, label: &str, required: bool, method: Option<&str>) -> FieldDefinition {
    FieldDefinition {
        code: code.to_string(),
        label: label.to_string(),
        field_type: FieldType::Text,
        unit: None,
        required,
        validation: None,
        method: method.map(str::to_string),
    }
}

fn all_band(min: f64, max: f64) -> BTreeMap<DemographicVariant, RangeBand> {
    let mut bands = BTreeMap::new();
    bands.insert(DemographicVariant::All, RangeBand { min, max });
    bands
}

fn sex_bands(male: (f64, f64), female: (f64, f64)) -> BTreeMap<DemographicVariant, RangeBand> {
    let mut bands = BTreeMap::new();
    bands.insert(
        DemographicVariant::Male,
        RangeBand {
            min: male.0,
            max: male.1,
        },
    );
    bands.insert(
        DemographicVariant::Female,
        RangeBand {
            min: female.0,
            max: female.1,
        },
    );
    bands
}

fn base(code: &str, name: &str, category: &str, template_type: TemplateType) -> Template {
    Template {
        id: Uuid::new_v4(),
        template_code: TemplateCode::parse(code).expect("seed template codes are canonical"),
        version: 1,
        name: name.to_string(),
        category: category.to_string(),
        sub_category: None,
        template_type,
        fields: Vec::new(),
        calculated_fields: Vec::new(),
        reference_ranges: BTreeMap::new(),
        critical_value_rules: BTreeMap::new(),
        sections: Vec::new(),
        test_codes: Vec::new(),
        header_config: serde_json::Value::Null,
        footer_config: serde_json::Value::Null,
        styling: serde_json::Value::Null,
        print_config: serde_json::Value::Null,
        is_system_template: true,
        hospital_id: None,
        is_default: true,
        created_at: Utc::now(),
    }
}

fn cbc_default() -> Template {
    let mut t = base(
        "CBC_DEFAULT",
        "Complete Blood Count",
        "HEMATOLOGY",
        TemplateType::Tabular,
    );
    t.test_codes = vec!["CBC".to_string()];
    t.fields = vec![
        numeric_field("HB", "Haemoglobin", "g/dL", true, 0.0, 30.0),
        numeric_field("RBC", "Red Blood Cells", "million/µL", false, 0.0, 10.0),
        numeric_field("HCT", "Haematocrit", "%", false, 0.0, 80.0),
        numeric_field("WBC", "White Blood Cells", "10³/µL", true, 0.0, 200.0),
        numeric_field("PLT", "Platelets", "10³/µL", true, 0.0, 2000.0),
    ];
    t.calculated_fields = vec![
        CalculatedField {
            code: "MCV".to_string(),
            label: Some("Mean Corpuscular Volume".to_string()),
            formula: "(HCT / RBC) * 10".to_string(),
            unit: Some("fL".to_string()),
        },
        CalculatedField {
            code: "MCH".to_string(),
            label: Some("Mean Corpuscular Haemoglobin".to_string()),
            formula: "(HB / RBC) * 10".to_string(),
            unit: Some("pg".to_string()),
        },
    ];
    t.reference_ranges.insert("HB".to_string(), all_band(12.0, 16.0));
    t.reference_ranges
        .insert("RBC".to_string(), sex_bands((4.5, 5.9), (4.0, 5.2)));
    t.reference_ranges
        .insert("HCT".to_string(), sex_bands((40.0, 52.0), (36.0, 47.0)));
    t.reference_ranges.insert("WBC".to_string(), all_band(4.0, 11.0));
    t.reference_ranges
        .insert("PLT".to_string(), all_band(150.0, 410.0));
    t.reference_ranges.insert("MCV".to_string(), all_band(80.0, 100.0));

    t.critical_value_rules.insert(
        "HB".to_string(),
        CriticalRule {
            critical_low: Some(8.0),
            critical_high: Some(20.0),
            requires_notification: true,
        },
    );
    t.critical_value_rules.insert(
        "WBC".to_string(),
        CriticalRule {
            critical_low: Some(1.0),
            critical_high: Some(30.0),
            requires_notification: true,
        },
    );
    t.critical_value_rules.insert(
        "PLT".to_string(),
        CriticalRule {
            critical_low: Some(20.0),
            critical_high: Some(1000.0),
            requires_notification: true,
        },
    );
    t
}

fn serology_default() -> Template {
    let mut t = base(
        "SEROLOGY_DEFAULT",
        "Serology Panel",
        "SEROLOGY",
        TemplateType::Qualitative,
    );
    t.test_codes = vec!["HBSAG".to_string(), "HIV".to_string(), "VDRL".to_string()];
    t.fields = vec![
        text_field("HBSAG", "Hepatitis B Surface Antigen", true, Some("CMIA")),
        text_field("HIV_1_2", "HIV 1 & 2 Antibodies", true, Some("CMIA")),
        text_field("VDRL", "VDRL", false, Some("RPR")),
    ];
    t
}

fn imaging_default() -> Template {
    let mut t = base(
        "XRAY_CHEST_DEFAULT",
        "Chest X-Ray Report",
        "RADIOLOGY",
        TemplateType::Narrative,
    );
    t.test_codes = vec!["XRAY_CHEST".to_string()];
    t.fields = vec![
        text_field("TECHNIQUE", "Technique", false, None),
        text_field("FINDINGS", "Findings", true, None),
        text_field("IMPRESSION", "Impression", true, None),
    ];
    t
}

fn culture_default() -> Template {
    let mut t = base(
        "CULTURE_DEFAULT",
        "Culture & Sensitivity",
        "MICROBIOLOGY",
        TemplateType::CultureSensitivity,
    );
    t.test_codes = vec!["CULTURE".to_string()];
    t.fields = vec![
        text_field(GROWTH_STATUS, "Growth Status", true, None),
        text_field(ORGANISM_ISOLATED, "Organism Isolated", false, None),
        text_field(COLONY_COUNT, "Colony Count", false, None),
    ];
    t.sections = vec![Section {
        title: ANTIBIOTIC_SENSITIVITY_SECTION.to_string(),
        field_codes: vec![ANTIBIOTIC.to_string(), SENSITIVITY.to_string()],
        repeatable: true,
    }];
    t
}

/// All platform-owned default templates, one per seeded category.
pub fn system_templates() -> Vec<Template> {
    vec![
        cbc_default(),
        serology_default(),
        imaging_default(),
        culture_default(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_seed_is_a_system_default() {
        for template in system_templates() {
            assert!(template.is_system_template, "{}", template.template_code);
            assert!(template.is_default, "{}", template.template_code);
            assert!(template.hospital_id.is_none());
            assert_eq!(template.version, 1);
        }
    }

    #[test]
    fn test_seed_categories_are_distinct() {
        let templates = system_templates();
        let mut categories: Vec<&str> =
            templates.iter().map(|t| t.category.as_str()).collect();
        categories.sort_unstable();
        categories.dedup();
        assert_eq!(categories.len(), templates.len());
    }

    #[test]
    fn test_cbc_matches_reference_panel() {
        let cbc = cbc_default();
        assert_eq!(cbc.template_code.as_str(), "CBC_DEFAULT");

        let hb_band = cbc
            .range_for("HB", DemographicVariant::All)
            .unwrap();
        assert_eq!(hb_band.min, 12.0);
        assert_eq!(hb_band.max, 16.0);

        let hb_rule = cbc.critical_value_rules.get("HB").unwrap();
        assert_eq!(hb_rule.critical_low, Some(8.0));
        assert!(hb_rule.requires_notification);

        assert!(cbc.calculated_fields.iter().any(|c| c.code == "MCV"));
    }

    #[test]
    fn test_culture_template_declares_sensitivity_section() {
        let culture = culture_default();
        assert_eq!(culture.sections.len(), 1);
        let section = &culture.sections[0];
        assert!(section.repeatable);
        assert_eq!(section.title, ANTIBIOTIC_SENSITIVITY_SECTION);
    }
}
