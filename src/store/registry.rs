//! Building registry: static reference data loaded once at startup from
//! `buildings.csv` (`id,name,rooftop_area_m2[,runoff_coefficient]`).
//!
//! The load validates every row and fails as a whole on the first problem;
//! serving a dashboard over partially-dropped reference data is worse than
//! refusing to start.

use core::fmt;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::Path;

use crate::models::{Building, DEFAULT_RUNOFF_COEFFICIENT};
use crate::store::csv;

#[derive(Debug)]
pub enum RegistryError {
    Io(String),
    /// The header row is missing or does not name the expected columns.
    Header(String),
    /// A data row failed validation. Rows are counted 1-based with the
    /// header as row 1; blank lines in the file are skipped, not counted.
    Row { row: usize, message: String },
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::Io(e) => write!(f, "registry file unreadable: {}", e),
            RegistryError::Header(e) => write!(f, "registry header invalid: {}", e),
            RegistryError::Row { row, message } => {
                write!(f, "registry row {}: {}", row, message)
            }
        }
    }
}

impl Error for RegistryError {}

#[derive(Debug, Clone)]
pub struct BuildingRegistry {
    buildings: Vec<Building>,
}

impl BuildingRegistry {
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let text = fs::read_to_string(path)
            .map_err(|e| RegistryError::Io(format!("{}: {}", path.display(), e)))?;
        Self::parse(&text)
    }

    /// Parse and validate registry CSV text. Kept separate from `load` so
    /// tests exercise validation without touching the filesystem.
    pub fn parse(text: &str) -> Result<Self, RegistryError> {
        let rows = csv::parse_rows(text);
        let mut iter = rows.into_iter();

        let header = iter
            .next()
            .ok_or_else(|| RegistryError::Header("file is empty".to_string()))?;
        let names: Vec<String> = header.iter().map(|h| h.trim().to_lowercase()).collect();
        if names.len() < 3
            || names[0] != "id"
            || names[1] != "name"
            || names[2] != "rooftop_area_m2"
        {
            return Err(RegistryError::Header(format!(
                "expected `id,name,rooftop_area_m2[,runoff_coefficient]`, got `{}`",
                header.join(",")
            )));
        }
        let has_coefficient_column = names.get(3).map(String::as_str) == Some("runoff_coefficient");
        if names.len() > 4 || (names.len() == 4 && !has_coefficient_column) {
            return Err(RegistryError::Header(format!(
                "unexpected columns after rooftop_area_m2: `{}`",
                names[3..].join(",")
            )));
        }

        let mut buildings: Vec<Building> = Vec::new();
        for (idx, row) in iter.enumerate() {
            let row_num = idx + 2; // 1-based, after the header
            let building = parse_row(&row, has_coefficient_column, row_num)?;
            if buildings.iter().any(|b| b.id == building.id) {
                return Err(RegistryError::Row {
                    row: row_num,
                    message: format!("duplicate building id `{}`", building.id),
                });
            }
            buildings.push(building);
        }

        Ok(BuildingRegistry { buildings })
    }

    /// All buildings in file order.
    pub fn buildings(&self) -> &[Building] {
        &self.buildings
    }

    pub fn get(&self, id: &str) -> Option<&Building> {
        self.buildings.iter().find(|b| b.id == id)
    }

    pub fn len(&self) -> usize {
        self.buildings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buildings.is_empty()
    }
}

fn parse_row(
    row: &[String],
    has_coefficient_column: bool,
    row_num: usize,
) -> Result<Building, RegistryError> {
    let err = |message: String| RegistryError::Row { row: row_num, message };

    let expected = if has_coefficient_column { 4 } else { 3 };
    if row.len() != expected {
        return Err(err(format!(
            "expected {} fields, got {}",
            expected,
            row.len()
        )));
    }

    let id = row[0].trim();
    if id.is_empty() {
        return Err(err("building id is empty".to_string()));
    }
    let name = row[1].trim();
    if name.is_empty() {
        return Err(err(format!("building `{}` has an empty name", id)));
    }

    let rooftop_area_m2: f64 = row[2]
        .trim()
        .parse()
        .map_err(|_| err(format!("rooftop_area_m2 is not a number: `{}`", row[2])))?;
    if !rooftop_area_m2.is_finite() || rooftop_area_m2 <= 0.0 {
        return Err(err(format!(
            "rooftop_area_m2 must be > 0, got {}",
            rooftop_area_m2
        )));
    }

    // A present-but-empty coefficient field also falls back to the default,
    // so a file with the column can leave it unset per building.
    let runoff_coefficient = match row.get(3).map(|s| s.trim()) {
        None | Some("") => DEFAULT_RUNOFF_COEFFICIENT,
        Some(raw) => {
            let c: f64 = raw
                .parse()
                .map_err(|_| err(format!("runoff_coefficient is not a number: `{}`", raw)))?;
            if !c.is_finite() || c <= 0.0 || c > 1.0 {
                return Err(err(format!(
                    "runoff_coefficient must be in (0, 1], got {}",
                    c
                )));
            }
            c
        }
    };

    Ok(Building {
        id: id.to_string(),
        name: name.to_string(),
        rooftop_area_m2,
        runoff_coefficient,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "id,name,rooftop_area_m2,runoff_coefficient\n\
                          B1,Main Library,500,0.85\n\
                          B2,Admin Block,320.5,\n\
                          B3,\"Hostel A, North Wing\",210,0.9\n";

    #[test]
    fn loads_valid_registry_in_file_order() {
        let reg = BuildingRegistry::parse(SAMPLE).unwrap();
        assert_eq!(reg.len(), 3);
        let ids: Vec<_> = reg.buildings().iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, ["B1", "B2", "B3"]);
        assert_eq!(reg.get("B1").unwrap().rooftop_area_m2, 500.0);
        assert_eq!(reg.get("B3").unwrap().name, "Hostel A, North Wing");
    }

    #[test]
    fn empty_coefficient_field_defaults_to_full_capture() {
        let reg = BuildingRegistry::parse(SAMPLE).unwrap();
        assert_eq!(reg.get("B2").unwrap().runoff_coefficient, 1.0);
    }

    #[test]
    fn coefficient_column_is_optional() {
        let reg =
            BuildingRegistry::parse("id,name,rooftop_area_m2\nB1,Main Library,500\n").unwrap();
        assert_eq!(reg.get("B1").unwrap().runoff_coefficient, 1.0);
    }

    #[test]
    fn unknown_id_is_absent_not_defaulted() {
        let reg = BuildingRegistry::parse(SAMPLE).unwrap();
        assert!(reg.get("B99").is_none());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let text = "id,name,rooftop_area_m2\nB1,A,100\nB1,B,200\n";
        let err = BuildingRegistry::parse(text).unwrap_err();
        assert!(matches!(err, RegistryError::Row { row: 3, .. }), "{err}");
    }

    #[test]
    fn error_position_counts_rows_not_file_lines() {
        // Blank lines are skipped by the parser and must not shift the
        // reported position: the duplicate is the second data row, row 3.
        let text = "id,name,rooftop_area_m2\n\nB1,A,100\n\n\nB1,B,200\n";
        let err = BuildingRegistry::parse(text).unwrap_err();
        assert!(matches!(err, RegistryError::Row { row: 3, .. }), "{err}");
        assert!(err.to_string().contains("row 3"));
    }

    #[test]
    fn rejects_non_positive_area() {
        for area in ["0", "-12", "NaN"] {
            let text = format!("id,name,rooftop_area_m2\nB1,A,{}\n", area);
            assert!(BuildingRegistry::parse(&text).is_err(), "area {}", area);
        }
    }

    #[test]
    fn rejects_coefficient_outside_unit_interval() {
        let text = "id,name,rooftop_area_m2,runoff_coefficient\nB1,A,100,1.2\n";
        assert!(BuildingRegistry::parse(text).is_err());
    }

    #[test]
    fn rejects_bad_header() {
        let err = BuildingRegistry::parse("building_name,area\nA,100\n").unwrap_err();
        assert!(matches!(err, RegistryError::Header(_)));
    }

    #[test]
    fn empty_file_fails_load() {
        assert!(BuildingRegistry::parse("").is_err());
    }
}
