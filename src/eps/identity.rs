//! Identification records of the EPS

use std::fmt;

use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

use super::coding::CodingBlob;

/// Dataset file name of the only EPS variant whose coding layout is known,
/// exactly as the ECU reports it (including the terminator)
pub const SUPPORTED_DATASET: &[u8] = b"EV_SteerAssisMQB\0";

/// How the payload of an identifier is interpreted
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IdentifierKind {
    /// UTF-8 text
    Text,
    /// Raw bytes, shown as hex
    Binary,
}

/// Identifiers read from the EPS, in read order
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum EpsIdentifier {
    /// VW hardware part number (0xF191)
    #[strum(to_string = "Part No HW")]
    HardwarePartNumber,
    /// VW spare part number (0xF187)
    #[strum(to_string = "Part No SW")]
    SoftwarePartNumber,
    /// ECU software version (0xF189)
    #[strum(to_string = "SW version")]
    SoftwareVersion,
    /// System name / engine type (0xF197)
    #[strum(to_string = "Component")]
    SystemName,
    /// ASAM/ODX dataset file name (0xF19E)
    #[strum(to_string = "ASAM Dataset")]
    DatasetFile,
    /// ASAM/ODX dataset version (0xF1A2)
    #[strum(to_string = "Dataset version")]
    DatasetVersion,
    /// Coding (0x0600)
    #[strum(to_string = "Coding")]
    Coding,
}

impl EpsIdentifier {
    /// Data identifier code on the wire
    pub const fn did(self) -> u16 {
        match self {
            EpsIdentifier::HardwarePartNumber => 0xF191,
            EpsIdentifier::SoftwarePartNumber => 0xF187,
            EpsIdentifier::SoftwareVersion => 0xF189,
            EpsIdentifier::SystemName => 0xF197,
            EpsIdentifier::DatasetFile => 0xF19E,
            EpsIdentifier::DatasetVersion => 0xF1A2,
            EpsIdentifier::Coding => 0x0600,
        }
    }

    /// How the record should be decoded
    pub const fn kind(self) -> IdentifierKind {
        match self {
            EpsIdentifier::Coding => IdentifierKind::Binary,
            _ => IdentifierKind::Text,
        }
    }
}

/// Decoded value of an [IdentifierRecord]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierValue {
    /// Text record. Invalid UTF-8 is replaced, trailing terminators are removed
    Text(String),
    /// Binary record
    Binary(Vec<u8>),
}

impl fmt::Display for IdentifierValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentifierValue::Text(s) => f.write_str(s),
            IdentifierValue::Binary(b) => f.write_str(&crate::hex_string(b)),
        }
    }
}

/// Result of reading one identifier
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct IdentifierRecord {
    /// Identifier that was read
    #[cfg_attr(feature = "serde", serde(serialize_with = "serialize_did"))]
    pub identifier: EpsIdentifier,
    /// Payload exactly as the ECU returned it
    pub raw: Vec<u8>,
}

#[cfg(feature = "serde")]
fn serialize_did<S: serde::Serializer>(id: &EpsIdentifier, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u16(id.did())
}

impl IdentifierRecord {
    /// Decodes the payload according to the identifier's [IdentifierKind]
    pub fn value(&self) -> IdentifierValue {
        match self.identifier.kind() {
            IdentifierKind::Text => IdentifierValue::Text(
                String::from_utf8_lossy(&self.raw)
                    .trim_end_matches('\0')
                    .to_string(),
            ),
            IdentifierKind::Binary => IdentifierValue::Binary(self.raw.clone()),
        }
    }
}

/// Every identification record of the EPS. Only exists if every read succeeded
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct IdentitySet {
    records: Vec<IdentifierRecord>,
}

impl IdentitySet {
    /// Builds the set from records. Returns None unless there is exactly one record
    /// per [EpsIdentifier], in read order
    pub fn from_records(records: Vec<IdentifierRecord>) -> Option<Self> {
        let complete = records.len() == EpsIdentifier::iter().count()
            && records
                .iter()
                .zip(EpsIdentifier::iter())
                .all(|(r, id)| r.identifier == id);
        complete.then_some(Self { records })
    }

    /// Returns the record of an identifier
    pub fn record(&self, id: EpsIdentifier) -> &IdentifierRecord {
        // from_records guarantees one record per identifier, in declaration order
        &self.records[id as usize]
    }

    /// Every record, in read order
    pub fn records(&self) -> &[IdentifierRecord] {
        &self.records
    }

    /// Raw dataset file name, including any terminator
    pub fn dataset_raw(&self) -> &[u8] {
        &self.record(EpsIdentifier::DatasetFile).raw
    }

    /// Current coding of the EPS
    pub fn coding(&self) -> CodingBlob {
        CodingBlob::new(self.record(EpsIdentifier::Coding).raw.clone())
    }
}

impl fmt::Display for IdentitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for id in [
            EpsIdentifier::HardwarePartNumber,
            EpsIdentifier::SoftwarePartNumber,
            EpsIdentifier::SoftwareVersion,
            EpsIdentifier::SystemName,
            EpsIdentifier::Coding,
        ] {
            writeln!(f, "   {:<14}{}", format!("{id}:"), self.record(id).value())?;
        }
        write!(
            f,
            "   {:<14}{} version {}",
            format!("{}:", EpsIdentifier::DatasetFile),
            self.record(EpsIdentifier::DatasetFile).value(),
            self.record(EpsIdentifier::DatasetVersion).value()
        )
    }
}

/// Returns true only if the dataset file name is byte for byte [SUPPORTED_DATASET].
///
/// A different name, or the same name with a different terminator, means a coding layout
/// that must not be modified
pub fn is_variant_supported(identity: &IdentitySet) -> bool {
    identity.dataset_raw() == SUPPORTED_DATASET
}
