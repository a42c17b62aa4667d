//! Dashboard data assembly: joins the building registry with the rainfall
//! log and derives harvested volumes on the fly. Estimates are never
//! persisted; this module recomputes them on every read.

use core::fmt;
use std::error::Error;
use std::fmt::{Display, Formatter};

use chrono::NaiveDate;
use serde::Serialize;

use crate::harvest::{self, HarvestError};
use crate::models::Building;
use crate::store::csv;
use crate::store::log::RainfallLog;
use crate::store::registry::BuildingRegistry;

#[derive(Debug)]
pub enum DashboardError {
    /// The requested building id is not in the registry. Surfaced to the
    /// viewer; never silently replaced by a zero-filled series.
    UnknownBuilding(String),
    /// Validated inputs failed the estimate anyway; indicates a store bug.
    Estimate(HarvestError),
}

impl Display for DashboardError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DashboardError::UnknownBuilding(id) => write!(f, "building not found: {}", id),
            DashboardError::Estimate(e) => write!(f, "estimate failed on stored data: {}", e),
        }
    }
}

impl Error for DashboardError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DashboardError::Estimate(e) => Some(e),
            _ => None,
        }
    }
}

impl From<HarvestError> for DashboardError {
    fn from(value: HarvestError) -> Self {
        DashboardError::Estimate(value)
    }
}

/// One dashboard row: a day's rainfall and the derived harvested volume.
#[derive(Debug, Clone, Serialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub rainfall_mm: f64,
    pub volume_litres: f64,
}

/// A rendered series for one building or for the whole campus.
#[derive(Debug, Clone, Serialize)]
pub struct Series {
    /// `Some` for a single building, `None` for the campus-wide view.
    pub building: Option<Building>,
    pub points: Vec<SeriesPoint>,
    pub total_volume_litres: f64,
    /// Mean over the days that have a measurement; `None` on an empty log.
    pub mean_rainfall_mm: Option<f64>,
}

/// A building's total over the whole log, for the comparison table.
#[derive(Debug, Clone, Serialize)]
pub struct BuildingTotal {
    pub id: String,
    pub name: String,
    pub total_volume_litres: f64,
}

/// Series for one building. Unknown ids fail; an empty log yields an empty
/// series (the presenter renders that as an explicit empty state).
pub fn building_series(
    registry: &BuildingRegistry,
    log: &RainfallLog,
    building_id: &str,
) -> Result<Series, DashboardError> {
    let building = registry
        .get(building_id)
        .ok_or_else(|| DashboardError::UnknownBuilding(building_id.to_string()))?;

    let mut points = Vec::with_capacity(log.len());
    for record in log.records() {
        let volume_litres = harvest::estimate(
            record.rainfall_mm,
            building.rooftop_area_m2,
            building.runoff_coefficient,
        )?;
        points.push(SeriesPoint {
            date: record.date,
            rainfall_mm: record.rainfall_mm,
            volume_litres,
        });
    }

    Ok(finish(Some(building.clone()), points))
}

/// Campus-wide series: per date, the measured rainfall and the volume summed
/// over every registered building.
pub fn campus_series(
    registry: &BuildingRegistry,
    log: &RainfallLog,
) -> Result<Series, DashboardError> {
    let mut points = Vec::with_capacity(log.len());
    for record in log.records() {
        let mut volume_litres = 0.0;
        for building in registry.buildings() {
            volume_litres += harvest::estimate(
                record.rainfall_mm,
                building.rooftop_area_m2,
                building.runoff_coefficient,
            )?;
        }
        points.push(SeriesPoint {
            date: record.date,
            rainfall_mm: record.rainfall_mm,
            volume_litres,
        });
    }

    Ok(finish(None, points))
}

/// Per-building totals over the whole log, registry order.
pub fn building_totals(
    registry: &BuildingRegistry,
    log: &RainfallLog,
) -> Result<Vec<BuildingTotal>, DashboardError> {
    let mut totals = Vec::with_capacity(registry.len());
    for building in registry.buildings() {
        let mut total = 0.0;
        for record in log.records() {
            total += harvest::estimate(
                record.rainfall_mm,
                building.rooftop_area_m2,
                building.runoff_coefficient,
            )?;
        }
        totals.push(BuildingTotal {
            id: building.id.clone(),
            name: building.name.clone(),
            total_volume_litres: total,
        });
    }
    Ok(totals)
}

fn finish(building: Option<Building>, points: Vec<SeriesPoint>) -> Series {
    let total_volume_litres = points.iter().map(|p| p.volume_litres).sum();
    let mean_rainfall_mm = if points.is_empty() {
        None
    } else {
        Some(points.iter().map(|p| p.rainfall_mm).sum::<f64>() / points.len() as f64)
    };
    Series {
        building,
        points,
        total_volume_litres,
        mean_rainfall_mm,
    }
}

/// The downloadable table: date, rainfall and derived volume as CSV.
pub fn series_csv(series: &Series) -> String {
    let mut buf: Vec<u8> = Vec::new();
    let header = ["date", "rainfall_mm", "volume_litres"]
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    let _ = csv::write_row(&mut buf, &header);
    for p in &series.points {
        let row = vec![
            p.date.format("%Y-%m-%d").to_string(),
            format!("{}", p.rainfall_mm),
            format!("{:.2}", p.volume_litres),
        ];
        let _ = csv::write_row(&mut buf, &row);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RainfallRecord;
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::path::PathBuf;

    fn registry() -> BuildingRegistry {
        BuildingRegistry::parse(
            "id,name,rooftop_area_m2,runoff_coefficient\n\
             B1,Main Library,500,\n\
             B2,Admin Block,200,0.5\n",
        )
        .unwrap()
    }

    fn log_with(days: &[(&str, f64)]) -> RainfallLog {
        let mut log = RainfallLog::load(&PathBuf::from(
            "nonexistent-dashboard-test-log.csv",
        ))
        .unwrap();
        for (date, mm) in days {
            log.upsert(RainfallRecord {
                date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
                rainfall_mm: *mm,
                source_fetched_at: Utc.with_ymd_and_hms(2024, 7, 1, 6, 0, 0).unwrap(),
            });
        }
        log
    }

    #[test]
    fn worked_example_500m2_at_10mm_is_5000_litres() {
        let series = building_series(&registry(), &log_with(&[("2024-07-01", 10.0)]), "B1").unwrap();
        assert_eq!(series.points.len(), 1);
        assert_eq!(series.points[0].volume_litres, 5000.0);
        assert_eq!(series.total_volume_litres, 5000.0);
    }

    #[test]
    fn runoff_coefficient_is_applied_per_building() {
        let series = building_series(&registry(), &log_with(&[("2024-07-01", 10.0)]), "B2").unwrap();
        // 10 mm * 200 m2 * 0.5
        assert_eq!(series.points[0].volume_litres, 1000.0);
    }

    #[test]
    fn unknown_building_is_not_found_not_zero_filled() {
        let err = building_series(&registry(), &log_with(&[]), "B99").unwrap_err();
        assert!(matches!(err, DashboardError::UnknownBuilding(id) if id == "B99"));
    }

    #[test]
    fn empty_log_yields_an_empty_series() {
        let series = building_series(&registry(), &log_with(&[]), "B1").unwrap();
        assert!(series.points.is_empty());
        assert_eq!(series.total_volume_litres, 0.0);
        assert_eq!(series.mean_rainfall_mm, None);
    }

    #[test]
    fn campus_series_sums_across_buildings() {
        let series = campus_series(&registry(), &log_with(&[("2024-07-01", 10.0)])).unwrap();
        // B1: 5000, B2: 1000
        assert_eq!(series.points[0].volume_litres, 6000.0);
    }

    #[test]
    fn summary_figures_cover_the_series() {
        let series = building_series(
            &registry(),
            &log_with(&[("2024-07-01", 10.0), ("2024-07-02", 0.0), ("2024-07-03", 5.0)]),
            "B1",
        )
        .unwrap();
        assert_eq!(series.total_volume_litres, 7500.0);
        assert_eq!(series.mean_rainfall_mm, Some(5.0));
    }

    #[test]
    fn totals_follow_registry_order() {
        let totals = building_totals(&registry(), &log_with(&[("2024-07-01", 10.0)])).unwrap();
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0].id, "B1");
        assert_eq!(totals[0].total_volume_litres, 5000.0);
        assert_eq!(totals[1].total_volume_litres, 1000.0);
    }

    #[test]
    fn csv_download_has_header_and_rows() {
        let series = building_series(&registry(), &log_with(&[("2024-07-01", 10.0)]), "B1").unwrap();
        let csv = series_csv(&series);
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("date,rainfall_mm,volume_litres"));
        assert_eq!(lines.next(), Some("2024-07-01,10,5000.00"));
    }
}
