//! Reference-range classification of numeric results.
//!
//! Every numeric result with a declared reference range is classified LOW,
//! NORMAL, or HIGH against the band for the patient's demographic variant.
//! Boundary values are NORMAL. Fields without a declared range are omitted
//! from the output, never defaulted to NORMAL.

use crate::external::Sex;
use crate::report::{AutoInterpretation, RangeFlag};
use crate::template::{DemographicVariant, RangeBand, Template};
use std::collections::BTreeMap;

impl From<Sex> for DemographicVariant {
    fn from(sex: Sex) -> Self {
        match sex {
            Sex::Male => DemographicVariant::Male,
            Sex::Female => DemographicVariant::Female,
            Sex::Other => DemographicVariant::All,
        }
    }
}

/// Classifies one value against one band. Boundary values are NORMAL.
pub fn classify(value: f64, band: RangeBand) -> RangeFlag {
    if value < band.min {
        RangeFlag::Low
    } else if value > band.max {
        RangeFlag::High
    } else {
        RangeFlag::Normal
    }
}

/// Classifies results against a template's reference ranges.
#[derive(Debug, Clone, Default)]
pub struct RangeInterpreter;

impl RangeInterpreter {
    pub fn new() -> Self {
        Self
    }

    /// Interprets every numeric value in `values` that has a declared range.
    ///
    /// `values` is the merged entered + calculated numeric view; demographic
    /// selection comes from the patient's `sex` (a required input, never
    /// inferred). Pure: the same inputs always produce the same output.
    pub fn interpret(
        &self,
        template: &Template,
        values: &BTreeMap<String, f64>,
        sex: Sex,
    ) -> AutoInterpretation {
        let variant = DemographicVariant::from(sex);
        let mut flags = BTreeMap::new();

        for (code, &value) in values {
            let Some(band) = template.range_for(code, variant) else {
                continue;
            };
            flags.insert(code.clone(), classify(value, band));
        }

        let abnormal: Vec<String> = flags
            .iter()
            .filter(|(_, flag)| **flag != RangeFlag::Normal)
            .map(|(code, flag)| {
                let direction = match flag {
                    RangeFlag::Low => "LOW",
                    RangeFlag::High => "HIGH",
                    RangeFlag::Normal => unreachable!(),
                };
                format!("{code} ({direction})")
            })
            .collect();

        let summary = if flags.is_empty() {
            "No results with declared reference ranges".to_string()
        } else if abnormal.is_empty() {
            "All results within reference range".to_string()
        } else {
            format!("Outside reference range: {}", abnormal.join(", "))
        };

        AutoInterpretation { flags, summary }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::TemplateType;

    fn cbc_template() -> Template {
        let mut template = crate::test_support::blank_template("CBC_TEST", TemplateType::Tabular);

        let mut hb = BTreeMap::new();
        hb.insert(DemographicVariant::All, RangeBand { min: 12.0, max: 16.0 });
        template.reference_ranges.insert("HB".to_string(), hb);

        let mut wbc = BTreeMap::new();
        wbc.insert(DemographicVariant::Male, RangeBand { min: 4.5, max: 11.0 });
        wbc.insert(
            DemographicVariant::Female,
            RangeBand { min: 4.0, max: 10.5 },
        );
        template.reference_ranges.insert("WBC".to_string(), wbc);
        template
    }

    fn values(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_classifies_low_normal_high() {
        let interpreter = RangeInterpreter::new();
        let template = cbc_template();

        let low = interpreter.interpret(&template, &values(&[("HB", 9.0)]), Sex::Other);
        assert_eq!(low.flags.get("HB"), Some(&RangeFlag::Low));

        let normal = interpreter.interpret(&template, &values(&[("HB", 14.0)]), Sex::Other);
        assert_eq!(normal.flags.get("HB"), Some(&RangeFlag::Normal));

        let high = interpreter.interpret(&template, &values(&[("HB", 17.5)]), Sex::Other);
        assert_eq!(high.flags.get("HB"), Some(&RangeFlag::High));
    }

    #[test]
    fn test_boundary_values_are_normal() {
        let interpreter = RangeInterpreter::new();
        let template = cbc_template();

        let lower = interpreter.interpret(&template, &values(&[("HB", 12.0)]), Sex::Other);
        assert_eq!(lower.flags.get("HB"), Some(&RangeFlag::Normal));

        let upper = interpreter.interpret(&template, &values(&[("HB", 16.0)]), Sex::Other);
        assert_eq!(upper.flags.get("HB"), Some(&RangeFlag::Normal));
    }

    #[test]
    fn test_demographic_variant_selection() {
        let interpreter = RangeInterpreter::new();
        let template = cbc_template();

        // 4.2 is below the male band (4.5-11.0) but inside the female band.
        let male = interpreter.interpret(&template, &values(&[("WBC", 4.2)]), Sex::Male);
        assert_eq!(male.flags.get("WBC"), Some(&RangeFlag::Low));

        let female = interpreter.interpret(&template, &values(&[("WBC", 4.2)]), Sex::Female);
        assert_eq!(female.flags.get("WBC"), Some(&RangeFlag::Normal));
    }

    #[test]
    fn test_sex_other_without_all_band_is_omitted() {
        let interpreter = RangeInterpreter::new();
        let template = cbc_template();

        // WBC declares only male/female bands; Other selects `all`, which is
        // absent, so the field is omitted rather than defaulted.
        let other = interpreter.interpret(&template, &values(&[("WBC", 4.2)]), Sex::Other);
        assert!(!other.flags.contains_key("WBC"));
    }

    #[test]
    fn test_fields_without_ranges_are_omitted() {
        let interpreter = RangeInterpreter::new();
        let template = cbc_template();

        let out = interpreter.interpret(&template, &values(&[("PLT", 250.0)]), Sex::Other);
        assert!(out.flags.is_empty());
        assert_eq!(out.summary, "No results with declared reference ranges");
    }

    #[test]
    fn test_summary_names_abnormal_fields() {
        let interpreter = RangeInterpreter::new();
        let template = cbc_template();

        let out = interpreter.interpret(
            &template,
            &values(&[("HB", 9.0), ("WBC", 12.5)]),
            Sex::Male,
        );
        assert_eq!(out.summary, "Outside reference range: HB (LOW), WBC (HIGH)");
    }
}
