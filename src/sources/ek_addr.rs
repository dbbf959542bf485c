// ⚡ ek_addr - utility billing addresses
// No native ids: rows are keyed by their own address fields

use super::{
    nullable, payload, present, AddressRecord, AdminChain, AdminUnitRef, BuildingFields, PremiseFields, SourceKind,
    SourceSchema, StreetFields,
};
use crate::entities::PremiseType;
use crate::normalizer::{building_number, DEFAULT_STREET_TYPE};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EkAddrRow {
    #[serde(default, deserialize_with = "nullable")]
    pub district: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub street_type: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub street: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub build: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub corp: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub flat: Option<String>,
}

impl EkAddrRow {
    /// Non-empty address fields joined with `|`
    pub fn synthetic_key(&self) -> String {
        [&self.district, &self.street_type, &self.street, &self.build, &self.corp]
            .iter()
            .filter_map(|field| field.as_deref())
            .map(str::trim)
            .filter(|field| !field.is_empty())
            .collect::<Vec<_>>()
            .join("|")
    }
}

#[derive(Default)]
pub struct EkAddrSource;

impl EkAddrSource {
    pub fn new() -> Self {
        EkAddrSource
    }
}

impl SourceSchema for EkAddrSource {
    type Row = EkAddrRow;

    fn kind(&self) -> SourceKind {
        SourceKind::EkAddr
    }

    fn row_key(&self, row: &EkAddrRow) -> String {
        row.synthetic_key()
    }

    fn validate(&self, row: &EkAddrRow) -> std::result::Result<(), String> {
        if present(&row.street) || present(&row.build) {
            Ok(())
        } else {
            Err("missing street and building".to_string())
        }
    }

    fn to_record(&self, row: &EkAddrRow, line: usize) -> AddressRecord {
        let kind = SourceSchema::kind(self);
        let key = row.synthetic_key();

        let mut admin = AdminChain::dnipro();
        admin.city_district = row.district.as_deref().map(AdminUnitRef::named);

        let street = row.street.as_ref().map(|name| StreetFields {
            name: name.clone(),
            street_type: row.street_type.clone().unwrap_or_else(|| DEFAULT_STREET_TYPE.to_string()),
            old_name: None,
            source_code: None,
        });

        let building = row.build.as_deref().map(|number| BuildingFields {
            natural_key: kind.key(key.clone()).to_string(),
            number: building_number(number, row.corp.as_deref()),
            corpus: row.corp.clone(),
            postal_code: None,
            source_code: None,
        });

        let premise = match (&building, &row.flat) {
            (Some(_), Some(flat)) => Some(PremiseFields {
                natural_key: kind.key(format!("{}_{}", key, flat)).to_string(),
                number: flat.clone(),
                premise_type: PremiseType::Apartment,
                floor: None,
                entrance: None,
            }),
            _ => None,
        };

        AddressRecord {
            source: kind,
            row_key: key,
            line,
            admin,
            street,
            building,
            premise,
            payload: payload(row),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::AddressSource;
    use std::io::Write;

    fn row() -> EkAddrRow {
        EkAddrRow {
            district: Some("Самарський".into()),
            street_type: None,
            street: Some("Старий Шлях".into()),
            build: Some("192".into()),
            corp: None,
            flat: None,
        }
    }

    #[test]
    fn test_synthetic_key_skips_empty_fields() {
        assert_eq!(row().synthetic_key(), "Самарський|Старий Шлях|192");

        let mut full = row();
        full.street_type = Some("вул.".into());
        full.corp = Some("2".into());
        assert_eq!(full.synthetic_key(), "Самарський|вул.|Старий Шлях|192|2");
    }

    #[test]
    fn test_record_with_flat() {
        let mut row = row();
        row.flat = Some("12".into());

        let record = EkAddrSource::new().to_record(&row, 2);
        assert_eq!(record.building.as_ref().unwrap().natural_key, "ek_addr:Самарський|Старий Шлях|192");

        let premise = record.premise.unwrap();
        assert_eq!(premise.natural_key, "ek_addr:Самарський|Старий Шлях|192_12");
        assert_eq!(premise.premise_type, PremiseType::Apartment);
        assert_eq!(record.street.unwrap().street_type, DEFAULT_STREET_TYPE);
    }

    #[test]
    fn test_street_only_row_is_valid() {
        let source = EkAddrSource::new();
        let mut street_only = row();
        street_only.build = None;

        assert!(source.validate(&street_only).is_ok());
        assert!(source.to_record(&street_only, 2).building.is_none());
        assert!(source.validate(&EkAddrRow::default()).is_err());
    }

    #[test]
    fn test_load_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "district,street_type,street,build,corp,flat").unwrap();
        writeln!(file, "Самарський,,Старий Шлях,192,,").unwrap();
        writeln!(file, "Самарський,,,,,5").unwrap();

        let rows = EkAddrSource::new().load(file.path()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row_key, "Самарський|Старий Шлях|192");
        assert!(rows[0].record.is_ok());
        assert!(rows[1].record.is_err());
    }
}
