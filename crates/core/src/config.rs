//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into the
//! engine services. The intent is to avoid reading process-wide environment
//! variables during request handling, which can lead to inconsistent
//! behaviour in multi-threaded runtimes and test harnesses.

use crate::error::{ReportError, ReportResult};

/// Engine configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    report_id_prefix: String,
    calculation_precision: u32,
    notification_queue_capacity: usize,
}

impl CoreConfig {
    /// Highest accepted `calculation_precision`; `f64` carries no useful
    /// decimal digits beyond this.
    pub const MAX_PRECISION: u32 = 10;

    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::InvalidInput` if the report-id prefix is empty
    /// or non-uppercase-alphabetic, the precision exceeds
    /// [`MAX_PRECISION`](Self::MAX_PRECISION), or the queue capacity is zero.
    pub fn new(
        report_id_prefix: String,
        calculation_precision: u32,
        notification_queue_capacity: usize,
    ) -> ReportResult<Self> {
        let prefix = report_id_prefix.trim();
        if prefix.is_empty() {
            return Err(ReportError::InvalidInput(
                "report_id_prefix cannot be empty".into(),
            ));
        }
        if !prefix.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(ReportError::InvalidInput(
                "report_id_prefix must contain only uppercase ASCII letters".into(),
            ));
        }
        if calculation_precision > Self::MAX_PRECISION {
            return Err(ReportError::InvalidInput(format!(
                "calculation_precision must be at most {}",
                Self::MAX_PRECISION
            )));
        }
        if notification_queue_capacity == 0 {
            return Err(ReportError::InvalidInput(
                "notification_queue_capacity must be at least 1".into(),
            ));
        }

        Ok(Self {
            report_id_prefix: prefix.to_owned(),
            calculation_precision,
            notification_queue_capacity,
        })
    }

    /// Prefix for human-readable report identifiers, e.g. `RPT` in
    /// `RPT260823001`.
    pub fn report_id_prefix(&self) -> &str {
        &self.report_id_prefix
    }

    /// Number of decimal places calculated results are rounded to.
    pub fn calculation_precision(&self) -> u32 {
        self.calculation_precision
    }

    /// Maximum number of undelivered notifications held in the outbox.
    pub fn notification_queue_capacity(&self) -> usize {
        self.notification_queue_capacity
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            report_id_prefix: "RPT".to_owned(),
            calculation_precision: 2,
            notification_queue_capacity: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = CoreConfig::default();
        assert_eq!(cfg.report_id_prefix(), "RPT");
        assert_eq!(cfg.calculation_precision(), 2);
        assert_eq!(cfg.notification_queue_capacity(), 256);
    }

    #[test]
    fn test_rejects_bad_prefix() {
        assert!(CoreConfig::new("".into(), 2, 16).is_err());
        assert!(CoreConfig::new("rpt".into(), 2, 16).is_err());
        assert!(CoreConfig::new("RPT1".into(), 2, 16).is_err());
    }

    #[test]
    fn test_rejects_zero_capacity() {
        assert!(CoreConfig::new("RPT".into(), 2, 0).is_err());
    }

    #[test]
    fn test_rejects_excessive_precision() {
        assert!(CoreConfig::new("RPT".into(), CoreConfig::MAX_PRECISION, 16).is_ok());
        assert!(CoreConfig::new("RPT".into(), CoreConfig::MAX_PRECISION + 1, 16).is_err());
        // i32 wrap in the rounding factor must be unreachable.
        assert!(CoreConfig::new("RPT".into(), u32::MAX, 16).is_err());
    }
}
