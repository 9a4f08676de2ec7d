//! Critical-value detection.
//!
//! Compares results against per-field critical thresholds. Detection is a
//! pure function of `(template, results)`; notification dispatch is a
//! separate best-effort step performed by the caller after the save.

use crate::report::{CriticalKind, CriticalValue};
use crate::template::Template;
use std::collections::BTreeMap;

/// Outcome of a detection pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CriticalFindings {
    pub has_critical: bool,
    pub critical_values: Vec<CriticalValue>,
}

impl CriticalFindings {
    /// True if any breached rule requires clinician notification.
    pub fn notification_required(&self) -> bool {
        self.critical_values.iter().any(|v| v.requires_notification)
    }
}

/// Detects values past the template's critical thresholds.
#[derive(Debug, Clone, Default)]
pub struct CriticalValueDetector;

impl CriticalValueDetector {
    pub fn new() -> Self {
        Self
    }

    /// Flags every value strictly below `critical_low` or strictly above
    /// `critical_high`. Values inside the thresholds never appear.
    pub fn detect(
        &self,
        template: &Template,
        values: &BTreeMap<String, f64>,
    ) -> CriticalFindings {
        let mut critical_values = Vec::new();

        for (code, rule) in &template.critical_value_rules {
            let Some(&value) = values.get(code) else {
                continue;
            };

            if let Some(low) = rule.critical_low {
                if value < low {
                    critical_values.push(CriticalValue {
                        field: code.clone(),
                        value,
                        threshold: low,
                        kind: CriticalKind::Low,
                        requires_notification: rule.requires_notification,
                    });
                    continue;
                }
            }
            if let Some(high) = rule.critical_high {
                if value > high {
                    critical_values.push(CriticalValue {
                        field: code.clone(),
                        value,
                        threshold: high,
                        kind: CriticalKind::High,
                        requires_notification: rule.requires_notification,
                    });
                }
            }
        }

        CriticalFindings {
            has_critical: !critical_values.is_empty(),
            critical_values,
        }
    }
}
