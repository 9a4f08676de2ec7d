//! # DXR Core
//!
//! Core business logic for the DXR diagnostic reporting system.
//!
//! This crate contains the template catalogue and the report workflow engine:
//! - Versioned report templates with reference ranges and critical-value rules
//! - Report lifecycle: entry, QC, review, approval, release, amendment
//! - Derived results via restricted arithmetic formulas
//! - Presentation-neutral formatting per template type
//!
//! **No API concerns**: Authentication, HTTP servers, or rendering surfaces
//! belong to the host application.

pub mod config;
pub mod critical;
pub mod error;
pub mod expression;
pub mod external;
pub mod formatter;
pub mod interpretation;
pub mod lifecycle;
pub mod notify;
pub mod report;
pub mod store;
pub mod system_templates;
pub mod template;
pub mod template_store;

#[cfg(test)]
mod test_support;

pub use config::CoreConfig;
pub use critical::{CriticalFindings, CriticalValueDetector};
pub use error::{ReportError, ReportResult};
pub use expression::{ExprError, ExpressionEvaluator};
pub use external::{OrderDirectory, OrderItem, PatientDetails, PatientDirectory, Sex};
pub use formatter::{FormattedBody, FormattedReport, InterpretationSummary, ReportFormatter};
pub use interpretation::RangeInterpreter;
pub use lifecycle::{ReportLifecycleEngine, ReviewInput};
pub use notify::{Notification, NotificationQueue, NotifyError, ReportNotifier};
pub use report::{Report, ReportStatus, ResultValue};
pub use store::Store;
pub use template::{Template, TemplateType};
pub use template_store::{NewTemplate, TemplateService, TemplateUpdate};
