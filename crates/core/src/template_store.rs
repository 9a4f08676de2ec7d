//! Template persistence and resolution.
//!
//! Owns the template side of the store: seeding system templates, resolving
//! the template for a test, hospital customisation (create, clone, update),
//! the at-most-one-default-per-`(category, hospital)` invariant, and
//! row-based versioning.

use crate::error::{ReportError, ReportResult};
use crate::store::Store;
use crate::system_templates::system_templates;
use crate::template::{
    CalculatedField, CriticalValueRules, FieldDefinition, ReferenceRanges, Section, Template,
    TemplateType,
};
use chrono::Utc;
use dxr_types::TemplateCode;
use std::sync::Arc;
use uuid::Uuid;

/// Input for creating a hospital template.
#[derive(Debug, Clone)]
pub struct NewTemplate {
    pub template_code: String,
    pub name: String,
    pub category: String,
    pub sub_category: Option<String>,
    pub template_type: TemplateType,
    pub fields: Vec<FieldDefinition>,
    pub calculated_fields: Vec<CalculatedField>,
    pub reference_ranges: ReferenceRanges,
    pub critical_value_rules: CriticalValueRules,
    pub sections: Vec<Section>,
    pub test_codes: Vec<String>,
    pub header_config: serde_json::Value,
    pub footer_config: serde_json::Value,
    pub styling: serde_json::Value,
    pub print_config: serde_json::Value,
}

/// Partial update of a hospital template. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct TemplateUpdate {
    pub name: Option<String>,
    pub sub_category: Option<Option<String>>,
    pub fields: Option<Vec<FieldDefinition>>,
    pub calculated_fields: Option<Vec<CalculatedField>>,
    pub reference_ranges: Option<ReferenceRanges>,
    pub critical_value_rules: Option<CriticalValueRules>,
    pub sections: Option<Vec<Section>>,
    pub test_codes: Option<Vec<String>>,
    pub header_config: Option<serde_json::Value>,
    pub footer_config: Option<serde_json::Value>,
    pub styling: Option<serde_json::Value>,
    pub print_config: Option<serde_json::Value>,
}

impl TemplateUpdate {
    fn apply(self, template: &mut Template) {
        if let Some(name) = self.name {
            template.name = name;
        }
        if let Some(sub_category) = self.sub_category {
            template.sub_category = sub_category;
        }
        if let Some(fields) = self.fields {
            template.fields = fields;
        }
        if let Some(calculated_fields) = self.calculated_fields {
            template.calculated_fields = calculated_fields;
        }
        if let Some(reference_ranges) = self.reference_ranges {
            template.reference_ranges = reference_ranges;
        }
        if let Some(critical_value_rules) = self.critical_value_rules {
            template.critical_value_rules = critical_value_rules;
        }
        if let Some(sections) = self.sections {
            template.sections = sections;
        }
        if let Some(test_codes) = self.test_codes {
            template.test_codes = test_codes;
        }
        if let Some(header_config) = self.header_config {
            template.header_config = header_config;
        }
        if let Some(footer_config) = self.footer_config {
            template.footer_config = footer_config;
        }
        if let Some(styling) = self.styling {
            template.styling = styling;
        }
        if let Some(print_config) = self.print_config {
            template.print_config = print_config;
        }
    }
}

/// Service for template management and resolution.
#[derive(Clone)]
pub struct TemplateService {
    store: Arc<Store>,
}

impl TemplateService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Seeds the platform-owned system templates. Idempotent by template
    /// code: already-seeded codes are skipped.
    pub fn seed_system_templates(&self) -> ReportResult<()> {
        for template in system_templates() {
            let code = template.template_code.clone();
            let exists = !self
                .store
                .find_templates(|t| t.is_system_template && t.template_code == code)
                .is_empty();
            if exists {
                continue;
            }
            self.store.insert_template(template)?;
        }
        Ok(())
    }

    /// Resolves the template to use for a test.
    ///
    /// Fallback chain: test-specific hospital template → category-default
    /// hospital template → system default for the category. Picks the
    /// highest version among test-specific matches.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::NotFound` only if the category itself is
    /// unknown (no system default seeded for it).
    pub fn resolve_template_for_test(
        &self,
        test_code: &str,
        category: &str,
        hospital_id: &str,
    ) -> ReportResult<Template> {
        let test_specific = self.store.find_templates(|t| {
            t.hospital_id.as_deref() == Some(hospital_id)
                && t.test_codes.iter().any(|c| c == test_code)
        });
        if let Some(template) = test_specific.into_iter().max_by_key(|t| t.version) {
            tracing::debug!(test_code, template = %template.template_code, "resolved test-specific hospital template");
            return Ok(template);
        }

        let hospital_default = self.store.find_templates(|t| {
            t.hospital_id.as_deref() == Some(hospital_id)
                && t.category == category
                && t.is_default
        });
        if let Some(template) = hospital_default.into_iter().max_by_key(|t| t.version) {
            tracing::debug!(test_code, template = %template.template_code, "resolved hospital category default");
            return Ok(template);
        }

        let system_default = self
            .store
            .find_templates(|t| t.is_system_template && t.category == category && t.is_default);
        if let Some(template) = system_default.into_iter().max_by_key(|t| t.version) {
            return Ok(template);
        }

        Err(ReportError::NotFound(format!(
            "no template for category '{category}'"
        )))
    }

    /// Creates a hospital-owned template.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Validation` for a malformed template code and
    /// `ReportError::Conflict` when the code is already taken within the
    /// hospital scope.
    pub fn create_template(&self, data: NewTemplate, hospital_id: &str) -> ReportResult<Template> {
        let code = TemplateCode::parse(&data.template_code).map_err(|e| {
            ReportError::validation("template_code", e.to_string())
        })?;

        self.ensure_code_free(&code, hospital_id)?;

        let template = Template {
            id: Uuid::new_v4(),
            template_code: code,
            version: 1,
            name: data.name,
            category: data.category,
            sub_category: data.sub_category,
            template_type: data.template_type,
            fields: data.fields,
            calculated_fields: data.calculated_fields,
            reference_ranges: data.reference_ranges,
            critical_value_rules: data.critical_value_rules,
            sections: data.sections,
            test_codes: data.test_codes,
            header_config: data.header_config,
            footer_config: data.footer_config,
            styling: data.styling,
            print_config: data.print_config,
            is_system_template: false,
            hospital_id: Some(hospital_id.to_owned()),
            is_default: false,
            created_at: Utc::now(),
        };
        self.store.insert_template(template.clone())?;
        Ok(template)
    }

    /// Clones a system template for a hospital.
    ///
    /// Copies the full structure, strips the system flag, and attaches the
    /// new owner. The clone starts at version 1 and is not a default.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Forbidden` if the source is not a system
    /// template, and `ReportError::Conflict` if the hospital already has a
    /// template with the same code.
    pub fn clone_template(&self, template_id: Uuid, hospital_id: &str) -> ReportResult<Template> {
        let source = self.store.get_template(template_id)?;
        if !source.is_system_template {
            return Err(ReportError::Forbidden(
                "only system templates can be cloned".to_string(),
            ));
        }

        self.ensure_code_free(&source.template_code, hospital_id)?;

        let mut clone = source;
        clone.id = Uuid::new_v4();
        clone.version = 1;
        clone.is_system_template = false;
        clone.hospital_id = Some(hospital_id.to_owned());
        clone.is_default = false;
        clone.created_at = Utc::now();

        self.store.insert_template(clone.clone())?;
        Ok(clone)
    }

    /// Applies a partial update to a hospital-owned template.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Forbidden` for system templates and for
    /// templates owned by another hospital.
    pub fn update_template(
        &self,
        template_id: Uuid,
        hospital_id: &str,
        changes: TemplateUpdate,
    ) -> ReportResult<Template> {
        let hospital_id = hospital_id.to_owned();
        self.store.update_template(template_id, move |template| {
            ensure_editable(template, &hospital_id)?;
            changes.apply(template);
            Ok(())
        })
    }

    /// Replaces only the sections of a template.
    pub fn update_sections(
        &self,
        template_id: Uuid,
        hospital_id: &str,
        sections: Vec<Section>,
    ) -> ReportResult<Template> {
        self.update_template(
            template_id,
            hospital_id,
            TemplateUpdate {
                sections: Some(sections),
                ..TemplateUpdate::default()
            },
        )
    }

    /// Replaces only the entry fields of a template.
    pub fn update_entry_fields(
        &self,
        template_id: Uuid,
        hospital_id: &str,
        fields: Vec<FieldDefinition>,
    ) -> ReportResult<Template> {
        self.update_template(
            template_id,
            hospital_id,
            TemplateUpdate {
                fields: Some(fields),
                ..TemplateUpdate::default()
            },
        )
    }

    /// Replaces only the styling config of a template.
    pub fn update_styling(
        &self,
        template_id: Uuid,
        hospital_id: &str,
        styling: serde_json::Value,
    ) -> ReportResult<Template> {
        self.update_template(
            template_id,
            hospital_id,
            TemplateUpdate {
                styling: Some(styling),
                ..TemplateUpdate::default()
            },
        )
    }

    /// Makes a hospital template the default for its `(category, hospital)`
    /// pair, atomically unsetting the previous default.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Forbidden` if the template belongs to another
    /// hospital or is system-owned.
    pub fn set_as_default(&self, template_id: Uuid, hospital_id: &str) -> ReportResult<Template> {
        let template = self.store.get_template(template_id)?;
        ensure_editable(&template, hospital_id)?;
        self.store.set_default_template(template_id)
    }

    /// Creates a new version row of a hospital template.
    ///
    /// The new row gets `version = previous.version + 1` and a fresh id; the
    /// old row remains queryable because existing reports snapshot it. If the
    /// previous version was the default, default status moves to the new row
    /// in the same transaction.
    pub fn create_new_version(
        &self,
        template_id: Uuid,
        hospital_id: &str,
        changes: TemplateUpdate,
    ) -> ReportResult<Template> {
        let previous = self.store.get_template(template_id)?;
        ensure_editable(&previous, hospital_id)?;

        let mut next = previous.clone();
        next.id = Uuid::new_v4();
        next.version = previous.version + 1;
        next.is_default = false;
        next.created_at = Utc::now();
        changes.apply(&mut next);

        self.store.insert_template_version(next, template_id)
    }

    /// Fetches a template by id.
    pub fn get_template(&self, template_id: Uuid) -> ReportResult<Template> {
        self.store.get_template(template_id)
    }

    /// Lists a hospital's templates plus the system templates visible to it.
    pub fn list_templates(&self, hospital_id: &str) -> Vec<Template> {
        self.store.find_templates(|t| {
            t.is_system_template || t.hospital_id.as_deref() == Some(hospital_id)
        })
    }

    fn ensure_code_free(&self, code: &TemplateCode, hospital_id: &str) -> ReportResult<()> {
        let taken = !self
            .store
            .find_templates(|t| {
                t.hospital_id.as_deref() == Some(hospital_id) && t.template_code == *code
            })
            .is_empty();
        if taken {
            return Err(ReportError::Conflict(format!(
                "template code '{code}' already exists for this hospital"
            )));
        }
        Ok(())
    }
}

fn ensure_editable(template: &Template, hospital_id: &str) -> ReportResult<()> {
    if template.is_system_template {
        return Err(ReportError::Forbidden(
            "system templates are immutable".to_string(),
        ));
    }
    if template.hospital_id.as_deref() != Some(hospital_id) {
        return Err(ReportError::Forbidden(
            "template belongs to another hospital".to_string(),
        ));
    }
    Ok(())
}
