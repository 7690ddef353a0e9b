//! Module for UDS (Unified diagnostic services - ISO14229)
//!
//! Only the services needed to identify and recode an ECU are provided. Each service is
//! implemented as methods on [DiagSession], prefixed with `uds_`.
//!
//! [DiagSession]: crate::session::DiagSession

use automotive_diag::uds::{UdsError, UdsErrorByte};

use crate::Standard;

mod data_by_identifier;
mod diagnostic_session_control;
mod security_access;

pub use automotive_diag::uds::UdsCommand;

/// Returns a human readable name of a UDS negative response code
pub fn lookup_uds_nrc(x: u8) -> String {
    match UdsErrorByte::from(x) {
        Standard(e) => format!("{e:?}"),
        other => format!("{other:?}"),
    }
}

/// Returns the [UdsError] of a negative response code, if it is one defined by ISO14229
pub fn get_description_of_ecu_error(error: u8) -> Option<UdsError> {
    match UdsErrorByte::from(error) {
        Standard(e) => Some(e),
        _ => None,
    }
}
