//! Shared fixtures for unit tests.

use crate::template::{Template, TemplateType};
use chrono::Utc;
use dxr_types::TemplateCode;
use std::collections::BTreeMap;
use uuid::Uuid;

/// A minimal system template with no fields, ranges, or rules. Tests fill in
/// only what they exercise.
pub(crate) fn blank_template(code: &str, template_type: TemplateType) -> Template {
    Template {
        id: Uuid::new_v4(),
        template_code: TemplateCode::parse(code).unwrap(),
        version: 1,
        name: code.to_string(),
        category: "HEMATOLOGY".to_string(),
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
        is_default: false,
        created_at: Utc::now(),
    }
}
