//! Interfaces to external collaborators.
//!
//! The engine never reaches into patient, order, or delivery systems
//! directly. Hosts supply implementations of these traits; the engine only
//! consumes the narrow views defined here.

use crate::error::ReportResult;
use serde::{Deserialize, Serialize};

/// Patient sex as recorded in demographics.
///
/// Used by the range interpreter to select a demographic reference-range
/// variant. `Other` (and any sex without a matching variant) falls back to
/// the `all` band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
    Other,
}

/// The slice of patient demographics the engine needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientDetails {
    pub id: String,
    pub name: String,
    pub age: Option<u32>,
    pub sex: Sex,
}

/// Lookup of patient demographics, supplied by the host.
pub trait PatientDirectory: Send + Sync {
    /// Fetches the patient with the given identifier.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::NotFound` if the patient does not exist.
    fn get_patient(&self, patient_id: &str) -> ReportResult<PatientDetails>;
}

/// One orderable test item from a diagnostic order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub test_code: String,
    pub test_category: String,
    pub patient_id: String,
}

/// Lookup of diagnostic order items, supplied by the host.
pub trait OrderDirectory: Send + Sync {
    /// Fetches the order item with the given identifier.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::NotFound` if the order item does not exist.
    fn get_order_item(&self, order_item_id: &str) -> ReportResult<OrderItem>;
}
