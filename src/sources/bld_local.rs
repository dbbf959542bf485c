// 🏢 bld_local - local buildings register
// One row per building, keyed by the register's objectid; never carries premises

use super::{
    nullable, payload, present, AddressRecord, AdminChain, AdminUnitRef, BuildingFields, SourceKind, SourceSchema,
    StreetFields,
};
use crate::normalizer::{building_number, ObjectKind, TextNormalizer};
use serde::{Deserialize, Serialize};

/// Street type used when the register leaves `type_ukr` empty
const DEFAULT_TYPE: &str = "ВУЛ.";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct BldLocalRow {
    #[serde(default, deserialize_with = "nullable")]
    pub objectid: Option<String>,

    /// Current full address, e.g. "Старий Шлях вул. 192"
    #[serde(default, deserialize_with = "nullable")]
    pub adres_n_uk: Option<String>,

    /// Previous full address: "<number> <old street name> <type>"
    #[serde(default, deserialize_with = "nullable")]
    pub adres_o_uk: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub street_ukr: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub type_ukr: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub raion: Option<String>,

    /// Building number
    #[serde(default, deserialize_with = "nullable")]
    pub l: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub id_street_rtg: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub id_bld_rtg: Option<String>,
}

pub struct BldLocalSource {
    normalizer: TextNormalizer,
}

impl BldLocalSource {
    pub fn new() -> Self {
        BldLocalSource {
            normalizer: TextNormalizer::new(),
        }
    }
}

impl Default for BldLocalSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Street name from a previous-address field: drop the leading number and trailing type
pub fn extract_old_name(address: &str) -> Option<String> {
    let tokens: Vec<&str> = address.split_whitespace().collect();
    let name = match tokens.len() {
        0 => return None,
        1 => tokens[0].to_string(),
        2 => tokens[1].to_string(),
        n => tokens[1..n - 1].join(" "),
    };
    Some(name)
}

impl SourceSchema for BldLocalSource {
    type Row = BldLocalRow;

    fn kind(&self) -> SourceKind {
        SourceKind::BldLocal
    }

    fn row_key(&self, row: &BldLocalRow) -> String {
        row.objectid.clone().unwrap_or_else(|| "-".to_string())
    }

    fn validate(&self, row: &BldLocalRow) -> std::result::Result<(), String> {
        if !present(&row.objectid) {
            return Err("missing objectid".to_string());
        }
        if !present(&row.adres_n_uk) && !present(&row.adres_o_uk) {
            return Err("missing address".to_string());
        }
        if !present(&row.street_ukr) {
            return Err("missing street_ukr".to_string());
        }
        if !present(&row.raion) {
            return Err("missing raion".to_string());
        }
        Ok(())
    }

    fn to_record(&self, row: &BldLocalRow, line: usize) -> AddressRecord {
        let kind = SourceSchema::kind(self);

        let mut admin = AdminChain::dnipro();
        admin.city_district = row.raion.as_deref().map(AdminUnitRef::named);

        let street = row.street_ukr.as_ref().map(|name| {
            let current = self.normalizer.normalize(name, ObjectKind::Street);
            StreetFields {
                name: name.clone(),
                street_type: row.type_ukr.clone().unwrap_or_else(|| DEFAULT_TYPE.to_string()),
                old_name: row
                    .adres_o_uk
                    .as_deref()
                    .and_then(extract_old_name)
                    .filter(|old| self.normalizer.normalize(old, ObjectKind::Street) != current),
                source_code: row.id_street_rtg.clone(),
            }
        });

        let building = row.l.as_deref().map(|number| BuildingFields {
            natural_key: kind.key(self.row_key(row)).to_string(),
            number: building_number(number, None),
            corpus: None,
            postal_code: None,
            source_code: row.id_bld_rtg.clone(),
        });

        AddressRecord {
            source: kind,
            row_key: self.row_key(row),
            line,
            admin,
            street,
            building,
            premise: None,
            payload: payload(row),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::AddressSource;
    use std::io::Write;

    fn row() -> BldLocalRow {
        BldLocalRow {
            objectid: Some("4411".into()),
            adres_n_uk: Some("Старий Шлях вул. 192".into()),
            adres_o_uk: Some("192 Кірова вул.".into()),
            street_ukr: Some("Старий Шлях".into()),
            type_ukr: None,
            raion: Some("Самарський".into()),
            l: Some("192".into()),
            id_street_rtg: Some("77".into()),
            id_bld_rtg: None,
        }
    }

    #[test]
    fn test_extract_old_name() {
        assert_eq!(extract_old_name("192 Кірова вул."), Some("Кірова".to_string()));
        assert_eq!(extract_old_name("12 Героїв Сталінграду просп."), Some("Героїв Сталінграду".to_string()));
        assert_eq!(extract_old_name("12 Кірова"), Some("Кірова".to_string()));
        assert_eq!(extract_old_name("Кірова"), Some("Кірова".to_string()));
        assert_eq!(extract_old_name("  "), None);
    }

    #[test]
    fn test_record_from_row() {
        let source = BldLocalSource::new();
        let record = source.to_record(&row(), 2);

        assert_eq!(record.admin.city.name, "Дніпро");
        assert_eq!(record.admin.city_district, Some(AdminUnitRef::named("Самарський")));

        let street = record.street.unwrap();
        assert_eq!(street.street_type, "ВУЛ.");
        assert_eq!(street.old_name.as_deref(), Some("Кірова"));
        assert_eq!(street.source_code.as_deref(), Some("77"));

        assert_eq!(record.building.unwrap().natural_key, "bld_local:4411");
        assert!(record.premise.is_none());
    }

    #[test]
    fn test_old_name_equal_to_current_is_dropped() {
        let mut row = row();
        row.adres_o_uk = Some("192 Старий  Шлях вул.".into());

        let record = BldLocalSource::new().to_record(&row, 2);
        assert_eq!(record.street.unwrap().old_name, None);
    }

    #[test]
    fn test_validation() {
        let source = BldLocalSource::new();
        assert!(source.validate(&row()).is_ok());

        let mut no_address = row();
        no_address.adres_n_uk = None;
        no_address.adres_o_uk = None;
        assert_eq!(source.validate(&no_address), Err("missing address".to_string()));

        let mut no_raion = row();
        no_raion.raion = Some(" ".into());
        assert!(source.validate(&no_raion).is_err());
    }

    #[test]
    fn test_load_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "objectid,adres_n_uk,adres_o_uk,street_ukr,type_ukr,raion,l,id_street_rtg,id_bld_rtg").unwrap();
        writeln!(file, "1,Робоча вул. 5,[NULL],Робоча,ВУЛ.,Чечелівський,5,,").unwrap();
        writeln!(file, "2,Робоча вул. 7,[NULL],Робоча,ВУЛ.,,7,,").unwrap();

        let rows = BldLocalSource::new().load(file.path()).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].record.is_ok());
        assert_eq!(rows[1].row_key, "2");
        assert!(matches!(rows[1].record, Err(crate::MigrationError::Validation { .. })));
    }
}
