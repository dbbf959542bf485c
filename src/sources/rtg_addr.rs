// 🗂️ rtg_addr - registry export with hierarchical path ids
// Pipe-delimited dump; the addr.rtg_addr section is located by its marker line

use super::{
    decode_row, nullable, payload, present, AddressRecord, AdminChain, AdminUnitRef, BuildingFields, PremiseFields,
    RawRow, SourceKind, SourceSchema, StreetFields,
};
use crate::entities::PremiseType;
use crate::error::{MigrationError, Result};
use crate::hierarchy::{HierarchyPath, Level};
use crate::normalizer::{building_number, ObjectKind, TextNormalizer, DEFAULT_STREET_TYPE};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const SECTION_MARKER: &str = "таблиця";
const SECTION_TABLE: &str = "addr.rtg_addr;";
const HEADER_PREFIX: &str = "id|path|";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RtgAddrRow {
    #[serde(default, deserialize_with = "nullable")]
    pub id: Option<String>,

    /// Dotted id path: country.region.district.community.city[.city_district...]
    #[serde(default, deserialize_with = "nullable")]
    pub path: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub tech_status: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub region: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub district: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub community: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub city_district: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub city_type: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub street: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub street_type: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub street_old: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub building: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub corp: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub flat: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub room: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub floor: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub entrance: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub postal_code: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub build_type_id: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub prem_type: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub apartment_type_id: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub date_created: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub date_modified: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub last_modified_by: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub owner_id: Option<String>,
}

impl RtgAddrRow {
    /// Row id without spaces or non-breaking spaces
    pub fn clean_id(&self) -> Option<String> {
        self.id
            .as_deref()
            .map(|id| id.chars().filter(|c| !c.is_whitespace() && *c != '\u{a0}').collect::<String>())
            .filter(|id| !id.is_empty())
    }
}

pub struct RtgAddrSource {
    normalizer: TextNormalizer,
}

impl RtgAddrSource {
    pub fn new() -> Self {
        RtgAddrSource {
            normalizer: TextNormalizer::new(),
        }
    }

    fn building_key(&self, path: &HierarchyPath, row: &RtgAddrRow, number: &str) -> String {
        let area = path
            .prefix(Level::City)
            .unwrap_or_else(|| self.normalizer.normalize(row.city.as_deref().unwrap_or(""), ObjectKind::City));

        let street = match row.street.as_deref() {
            Some(street) => format!(
                "{} {}",
                self.normalizer
                    .normalize(row.street_type.as_deref().unwrap_or(DEFAULT_STREET_TYPE), ObjectKind::StreetType),
                self.normalizer.normalize(street, ObjectKind::Street)
            ),
            None => "-".to_string(),
        };

        format!("{}|{}|{}", area, street, self.normalizer.normalize(number, ObjectKind::Building))
    }
}

impl Default for RtgAddrSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the addr.rtg_addr section of an export and decode its rows
pub fn parse_export(text: &str) -> Result<Vec<RawRow<RtgAddrRow>>> {
    let source = SourceKind::RtgAddr.name();
    let lines: Vec<&str> = text.lines().collect();

    let start = lines
        .iter()
        .position(|line| {
            let lower = line.to_lowercase();
            lower.contains(SECTION_MARKER) && lower.contains(SECTION_TABLE)
        })
        .ok_or_else(|| MigrationError::parse(source, format!("section {} not found", SECTION_TABLE)))?;

    let section = &lines[start + 1..];
    let end = section
        .iter()
        .position(|line| line.to_lowercase().contains(SECTION_MARKER))
        .unwrap_or(section.len());
    let section = &section[..end];

    let header_at = section
        .iter()
        .position(|line| line.contains(HEADER_PREFIX))
        .ok_or_else(|| MigrationError::parse(source, "header line not found"))?;
    let header = StringRecord::from(section[header_at].split('|').map(str::trim).collect::<Vec<_>>());

    // (1-based file line, text)
    let body: Vec<(usize, &str)> = section[header_at + 1..]
        .iter()
        .enumerate()
        .map(|(offset, line)| (start + header_at + offset + 3, line.trim_start()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('-'))
        .collect();

    let joined = body.iter().map(|(_, line)| *line).collect::<Vec<_>>().join("\n");
    let mut rdr = ReaderBuilder::new()
        .delimiter(b'|')
        .has_headers(false)
        .quoting(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(joined.as_bytes());

    let mut rows = Vec::with_capacity(body.len());
    for (result, (line, _)) in rdr.records().zip(body.iter()) {
        let line = *line;
        match result {
            Ok(record) if record.len() != header.len() => rows.push(RawRow::Skipped {
                line,
                reason: format!("expected {} fields, found {}", header.len(), record.len()),
            }),
            Ok(record) => rows.push(decode_row(&record, &header, line)),
            Err(e) => rows.push(RawRow::Malformed {
                line,
                reason: e.to_string(),
            }),
        }
    }

    Ok(rows)
}

impl SourceSchema for RtgAddrSource {
    type Row = RtgAddrRow;

    fn kind(&self) -> SourceKind {
        SourceKind::RtgAddr
    }

    fn read_rows(&self, path: &Path) -> Result<Vec<RawRow<RtgAddrRow>>> {
        let text = fs::read_to_string(path).map_err(|source| MigrationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        parse_export(&text)
    }

    fn row_key(&self, row: &RtgAddrRow) -> String {
        row.clean_id().unwrap_or_else(|| "-".to_string())
    }

    fn validate(&self, row: &RtgAddrRow) -> std::result::Result<(), String> {
        let required = [
            ("id", row.clean_id()),
            ("path", row.path.clone()),
            ("region", row.region.clone()),
            ("district", row.district.clone()),
            ("community", row.community.clone()),
            ("city", row.city.clone()),
        ];

        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| !present(value))
            .map(|(name, _)| *name)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(format!("missing {}", missing.join(", ")))
        }
    }

    fn to_record(&self, row: &RtgAddrRow, line: usize) -> AddressRecord {
        let kind = SourceSchema::kind(self);
        let path = HierarchyPath::parse(row.path.as_deref().unwrap_or(""));
        let unit = |name: &Option<String>, level: Level| {
            AdminUnitRef::keyed(name.as_deref().unwrap_or(""), path.get(level).map(|id| kind.key(id)))
        };

        let admin = AdminChain {
            region: unit(&row.region, Level::Region),
            district: unit(&row.district, Level::District),
            community: unit(&row.community, Level::Community),
            city: unit(&row.city, Level::City),
            city_type: row.city_type.clone(),
            city_district: row.city_district.as_deref().map(AdminUnitRef::named),
        };

        let street = row.street.as_ref().map(|name| {
            let current = self.normalizer.normalize(name, ObjectKind::Street);
            StreetFields {
                name: name.clone(),
                street_type: row.street_type.clone().unwrap_or_else(|| DEFAULT_STREET_TYPE.to_string()),
                old_name: row
                    .street_old
                    .clone()
                    .filter(|old| self.normalizer.normalize(old, ObjectKind::Street) != current),
                source_code: None,
            }
        });

        let building = row.building.as_deref().map(|raw| {
            let number = building_number(raw, row.corp.as_deref());
            BuildingFields {
                natural_key: kind.key(self.building_key(&path, row, &number)).to_string(),
                number,
                corpus: row.corp.clone(),
                postal_code: row.postal_code.clone(),
                source_code: row.clean_id(),
            }
        });

        let premise = building.as_ref().and_then(|_| {
            let (number, premise_type) = match (&row.flat, &row.room) {
                (Some(flat), _) => (flat.clone(), PremiseType::Apartment),
                (None, Some(room)) => (room.clone(), PremiseType::Room),
                (None, None) => return None,
            };
            Some(PremiseFields {
                natural_key: kind.key(self.row_key(row)).to_string(),
                number,
                premise_type,
                floor: row.floor.clone(),
                entrance: row.entrance.clone(),
            })
        });

        AddressRecord {
            source: kind,
            row_key: self.row_key(row),
            line,
            admin,
            street,
            building,
            premise,
            payload: payload(row),
        }
    }
}
