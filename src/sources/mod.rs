// 📥 Source Framework - one typed row per source schema, one shared address record
//
// Each schema decides three things:
// - Id extraction (native row id, hierarchical path id, synthetic key)
// - Validation (minimum fields; failing rows are skipped, not fatal)
// - Child entities (building key derivation, premises or not)
//
// Everything downstream consumes `AddressRecord` only.

pub mod bld_local;
pub mod ek_addr;
pub mod rtg_addr;

pub use bld_local::{BldLocalRow, BldLocalSource};
pub use ek_addr::{EkAddrRow, EkAddrSource};
pub use rtg_addr::{RtgAddrRow, RtgAddrSource};

use crate::entities::{NaturalKey, PremiseType};
use crate::error::{MigrationError, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs::File;
use std::path::Path;

// ============================================================================
// SOURCE KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    RtgAddr,
    BldLocal,
    EkAddr,
}

impl SourceKind {
    /// Run order used for "all"
    pub const ALL: [SourceKind; 3] = [SourceKind::BldLocal, SourceKind::EkAddr, SourceKind::RtgAddr];

    /// Registered data source name
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::RtgAddr => "rtg_addr",
            SourceKind::BldLocal => "bld_local",
            SourceKind::EkAddr => "ek_addr",
        }
    }

    /// Prefix of natural keys issued from this source
    pub fn code(&self) -> &'static str {
        match self {
            SourceKind::RtgAddr => "rtg",
            SourceKind::BldLocal => "bld_local",
            SourceKind::EkAddr => "ek_addr",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SourceKind::RtgAddr => "Registry export with hierarchical path ids",
            SourceKind::BldLocal => "Local buildings register",
            SourceKind::EkAddr => "Utility billing addresses",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "rtg_addr" => Some(SourceKind::RtgAddr),
            "bld_local" => Some(SourceKind::BldLocal),
            "ek_addr" => Some(SourceKind::EkAddr),
            _ => None,
        }
    }

    pub fn key(&self, id: impl Into<String>) -> NaturalKey {
        NaturalKey::Source {
            source: self.code().to_string(),
            id: id.into(),
        }
    }
}

// ============================================================================
// ADDRESS RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct AdminUnitRef {
    pub name: String,

    /// Source-issued id; absent units are keyed by name under their parent
    pub source_key: Option<NaturalKey>,
}

impl AdminUnitRef {
    pub fn named(name: &str) -> Self {
        AdminUnitRef {
            name: name.to_string(),
            source_key: None,
        }
    }

    pub fn keyed(name: &str, source_key: Option<NaturalKey>) -> Self {
        AdminUnitRef {
            name: name.to_string(),
            source_key,
        }
    }
}

/// Administrative ancestors below the country
#[derive(Debug, Clone, PartialEq)]
pub struct AdminChain {
    pub region: AdminUnitRef,
    pub district: AdminUnitRef,
    pub community: AdminUnitRef,
    pub city: AdminUnitRef,
    pub city_type: Option<String>,
    pub city_district: Option<AdminUnitRef>,
}

impl AdminChain {
    /// Hierarchy for sources that only cover the city of Dnipro
    pub fn dnipro() -> Self {
        AdminChain {
            region: AdminUnitRef::named("Дніпропетровська область"),
            district: AdminUnitRef::named("Дніпровський район"),
            community: AdminUnitRef::named("Дніпровська міська громада"),
            city: AdminUnitRef::named("Дніпро"),
            city_type: Some("м.".to_string()),
            city_district: None,
        }
    }
}

pub const DEFAULT_COUNTRY: &str = "Україна";
pub const DEFAULT_COUNTRY_CODE: &str = "UA";

#[derive(Debug, Clone, PartialEq)]
pub struct StreetFields {
    pub name: String,

    /// Raw street type (abbreviation or full form)
    pub street_type: String,

    /// Historical name, only when it differs from the current one
    pub old_name: Option<String>,
    pub source_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildingFields {
    /// Source-derived key; the row's building identity
    pub natural_key: String,
    pub number: String,
    pub corpus: Option<String>,
    pub postal_code: Option<String>,
    pub source_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PremiseFields {
    pub natural_key: String,
    pub number: String,
    pub premise_type: PremiseType,
    pub floor: Option<String>,
    pub entrance: Option<String>,
}

/// Fixed-shape record every pipeline step consumes
#[derive(Debug, Clone, PartialEq)]
pub struct AddressRecord {
    pub source: SourceKind,

    /// Row identifier used in logs and provenance
    pub row_key: String,
    pub line: usize,
    pub admin: AdminChain,
    pub street: Option<StreetFields>,
    pub building: Option<BuildingFields>,
    pub premise: Option<PremiseFields>,

    /// Raw source row kept for provenance
    pub payload: serde_json::Value,
}

/// One input row after decoding and validation
#[derive(Debug)]
pub struct SourceRow {
    pub line: usize,
    pub row_key: String,

    /// `Validation` errors mark skipped rows, `Parse` errors mark broken ones
    pub record: std::result::Result<AddressRecord, MigrationError>,
}

// ============================================================================
// TRAITS
// ============================================================================

/// Loads a source file into address records
pub trait AddressSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Fatal errors (`Io`, `Parse`) stop this source only
    fn load(&self, path: &Path) -> Result<Vec<SourceRow>>;

    fn version(&self) -> &str {
        "1.0.0"
    }
}

/// Raw row as read from a file, before validation
#[derive(Debug)]
pub enum RawRow<T> {
    Parsed { line: usize, row: T },

    /// Structurally unusable line that is skipped, e.g. a field-count mismatch
    Skipped { line: usize, reason: String },

    /// Line the decoder rejected
    Malformed { line: usize, reason: String },
}

/// Schema descriptor; every schema is an `AddressSource` through the blanket impl below
pub trait SourceSchema: Send + Sync {
    type Row: DeserializeOwned + Serialize;

    fn kind(&self) -> SourceKind;

    fn read_rows(&self, path: &Path) -> Result<Vec<RawRow<Self::Row>>> {
        read_csv_rows(SourceSchema::kind(self), path)
    }

    /// Natural identifier of the row
    fn row_key(&self, row: &Self::Row) -> String;

    /// Minimum-field predicate; the error is the skip reason
    fn validate(&self, row: &Self::Row) -> std::result::Result<(), String>;

    fn to_record(&self, row: &Self::Row, line: usize) -> AddressRecord;
}

impl<S: SourceSchema> AddressSource for S {
    fn kind(&self) -> SourceKind {
        SourceSchema::kind(self)
    }

    fn load(&self, path: &Path) -> Result<Vec<SourceRow>> {
        let rows = self.read_rows(path)?;

        Ok(rows
            .into_iter()
            .map(|raw| match raw {
                RawRow::Parsed { line, row } => {
                    let row_key = self.row_key(&row);
                    let record = match self.validate(&row) {
                        Ok(()) => Ok(self.to_record(&row, line)),
                        Err(reason) => Err(MigrationError::validation(row_key.clone(), reason)),
                    };
                    SourceRow { line, row_key, record }
                }
                RawRow::Skipped { line, reason } => SourceRow {
                    line,
                    row_key: format!("line {}", line),
                    record: Err(MigrationError::validation(format!("line {}", line), reason)),
                },
                RawRow::Malformed { line, reason } => SourceRow {
                    line,
                    row_key: format!("line {}", line),
                    record: Err(MigrationError::parse(SourceSchema::kind(self).name(), reason)),
                },
            })
            .collect())
    }
}

/// Factory: get the schema for a source
pub fn get_source(kind: SourceKind) -> Box<dyn AddressSource> {
    match kind {
        SourceKind::RtgAddr => Box::new(RtgAddrSource::new()),
        SourceKind::BldLocal => Box::new(BldLocalSource::new()),
        SourceKind::EkAddr => Box::new(EkAddrSource::new()),
    }
}

// ============================================================================
// SHARED READERS / HELPERS
// ============================================================================

/// Header-driven CSV export; undecodable rows become `Malformed`
pub fn read_csv_rows<T: DeserializeOwned>(kind: SourceKind, path: &Path) -> Result<Vec<RawRow<T>>> {
    let file = File::open(path).map_err(|source| MigrationError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(file);

    let headers = rdr
        .headers()
        .map_err(|e| MigrationError::parse(kind.name(), format!("unreadable header: {}", e)))?
        .clone();

    let mut rows = Vec::new();
    let mut record = StringRecord::new();
    loop {
        match rdr.read_record(&mut record) {
            Ok(false) => break,
            Ok(true) => {
                let line = record.position().map(|p| p.line() as usize).unwrap_or(0);
                rows.push(decode_row(&record, &headers, line));
            }
            Err(e) => {
                let line = e.position().map(|p| p.line() as usize).unwrap_or(0);
                rows.push(RawRow::Malformed {
                    line,
                    reason: e.to_string(),
                });
                if matches!(e.kind(), csv::ErrorKind::Io(_)) {
                    break;
                }
            }
        }
    }

    Ok(rows)
}

pub(crate) fn decode_row<T: DeserializeOwned>(record: &StringRecord, headers: &StringRecord, line: usize) -> RawRow<T> {
    match record.deserialize::<T>(Some(headers)) {
        Ok(row) => RawRow::Parsed { line, row },
        Err(e) => RawRow::Malformed {
            line,
            reason: e.to_string(),
        },
    }
}

/// `[NULL]`, blank and missing values all become `None`
pub(crate) fn nullable<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<String>, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty() && value != "[NULL]"))
}

pub(crate) fn present(value: &Option<String>) -> bool {
    value.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false)
}

pub(crate) fn payload<T: Serialize>(row: &T) -> serde_json::Value {
    serde_json::to_value(row).unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[derive(Debug, Deserialize)]
    struct Pair {
        #[serde(default, deserialize_with = "nullable")]
        a: Option<String>,
        #[serde(default, deserialize_with = "nullable")]
        b: Option<String>,
    }

    #[test]
    fn test_nullable_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "a,b").unwrap();
        writeln!(file, "[NULL], x ").unwrap();
        writeln!(file, ",").unwrap();

        let rows: Vec<RawRow<Pair>> = read_csv_rows(SourceKind::EkAddr, file.path()).unwrap();
        assert_eq!(rows.len(), 2);

        match &rows[0] {
            RawRow::Parsed { row, line } => {
                assert_eq!(row.a, None);
                assert_eq!(row.b.as_deref(), Some("x"));
                assert_eq!(*line, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
        match &rows[1] {
            RawRow::Parsed { row, .. } => assert!(row.a.is_none() && row.b.is_none()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = read_csv_rows::<Pair>(SourceKind::BldLocal, Path::new("/nonexistent/bld.csv")).unwrap_err();
        assert!(matches!(err, MigrationError::Io { .. }));
        assert!(err.is_source_fatal());
    }

    #[test]
    fn test_source_kind_names() {
        for kind in SourceKind::ALL {
            assert_eq!(SourceKind::parse(kind.name()), Some(kind));
            assert_eq!(get_source(kind).kind(), kind);
        }
        assert_eq!(SourceKind::RtgAddr.key("5"), NaturalKey::Source { source: "rtg".into(), id: "5".into() });
    }
}
