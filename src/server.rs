//! Dashboard HTTP server.
//!
//! Read-only: every request re-reads the rainfall log from disk, so viewers
//! always see the latest ingested day and need no coordination with the
//! ingestion job (the log writer renames a complete file into place).
//!
//! Routes:
//! - `GET /`                dashboard page; `?building=ID` or `?b=TOKEN`
//! - `GET /api/series`      JSON series, same query parameters
//! - `GET /download`        CSV attachment, same query parameters

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use log::{error, info};
use serde::Deserialize;

use crate::config::Config;
use crate::services::dashboard::{self, DashboardError, Series};
use crate::store::log::RainfallLog;
use crate::store::registry::BuildingRegistry;
use crate::token;

#[derive(Clone)]
pub struct AppState {
    registry: Arc<BuildingRegistry>,
    log_path: Arc<PathBuf>,
}

/// Bind and serve until the process is stopped.
pub async fn serve(cfg: &Config, registry: BuildingRegistry) -> Result<(), String> {
    let state = AppState {
        registry: Arc::new(registry),
        log_path: Arc::new(cfg.rainfall_log_path()),
    };

    let listener = tokio::net::TcpListener::bind(cfg.listen_addr)
        .await
        .map_err(|e| format!("bind {} failed: {}", cfg.listen_addr, e))?;
    info!("Dashboard listening on http://{}", cfg.listen_addr);

    axum::serve(listener, router(state))
        .await
        .map_err(|e| format!("server error: {}", e))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(dashboard_page))
        .route("/api/series", get(api_series))
        .route("/download", get(download_csv))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
struct ViewParams {
    /// Building id, as picked in the selector.
    building: Option<String>,
    /// Access token, as carried by a scanned QR link.
    b: Option<String>,
}

/// How a request selected its view, after validation.
enum Selection {
    Campus,
    Building(String),
}

enum ViewError {
    NotFound(String),
    Storage(String),
    Internal(String),
}

impl ViewError {
    fn status(&self) -> StatusCode {
        match self {
            ViewError::NotFound(_) => StatusCode::NOT_FOUND,
            ViewError::Storage(_) | ViewError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &str {
        match self {
            ViewError::NotFound(m) | ViewError::Storage(m) | ViewError::Internal(m) => m,
        }
    }
}

impl From<DashboardError> for ViewError {
    fn from(value: DashboardError) -> Self {
        match value {
            DashboardError::UnknownBuilding(id) => {
                ViewError::NotFound(format!("building not found: {}", id))
            }
            DashboardError::Estimate(e) => ViewError::Internal(e.to_string()),
        }
    }
}

fn select(state: &AppState, params: &ViewParams) -> Result<Selection, ViewError> {
    if let Some(token_value) = params.b.as_deref() {
        return match token::resolve(&state.registry, token_value) {
            Some(building) => Ok(Selection::Building(building.id.clone())),
            None => Err(ViewError::NotFound(
                "no building matches this access token".to_string(),
            )),
        };
    }
    match params.building.as_deref() {
        None | Some("") | Some("all") => Ok(Selection::Campus),
        Some(id) => {
            if state.registry.get(id).is_some() {
                Ok(Selection::Building(id.to_string()))
            } else {
                Err(ViewError::NotFound(format!("building not found: {}", id)))
            }
        }
    }
}

fn load_log(state: &AppState) -> Result<RainfallLog, ViewError> {
    RainfallLog::load(&state.log_path)
        .map_err(|e| ViewError::Storage(format!("rainfall log unavailable: {}", e)))
}

fn load_series(state: &AppState, params: &ViewParams) -> Result<Series, ViewError> {
    let selection = select(state, params)?;
    let log = load_log(state)?;
    let series = match &selection {
        Selection::Campus => dashboard::campus_series(&state.registry, &log)?,
        Selection::Building(id) => dashboard::building_series(&state.registry, &log, id)?,
    };
    Ok(series)
}

async fn api_series(
    State(state): State<AppState>,
    Query(params): Query<ViewParams>,
) -> Response {
    match load_series(&state, &params) {
        Ok(series) => Json(series).into_response(),
        Err(e) => {
            if e.status().is_server_error() {
                error!("series request failed: {}", e.message());
            }
            (
                e.status(),
                Json(serde_json::json!({ "error": e.message() })),
            )
                .into_response()
        }
    }
}

async fn download_csv(
    State(state): State<AppState>,
    Query(params): Query<ViewParams>,
) -> Response {
    match load_series(&state, &params) {
        Ok(series) => {
            let stem = series
                .building
                .as_ref()
                .map(|b| b.id.as_str())
                .unwrap_or("campus");
            let filename = format!("{}_rainfall_data.csv", stem);
            (
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", filename),
                    ),
                ],
                dashboard::series_csv(&series),
            )
                .into_response()
        }
        Err(e) => (e.status(), e.message().to_string()).into_response(),
    }
}

async fn dashboard_page(
    State(state): State<AppState>,
    Query(params): Query<ViewParams>,
) -> Response {
    let rendered = (|| {
        let selection = select(&state, &params)?;
        let log = load_log(&state)?;
        let (series, totals) = match &selection {
            // The campus view also shows the per-building comparison.
            Selection::Campus => (
                dashboard::campus_series(&state.registry, &log)?,
                dashboard::building_totals(&state.registry, &log)?,
            ),
            Selection::Building(id) => (
                dashboard::building_series(&state.registry, &log, id)?,
                Vec::new(),
            ),
        };
        Ok::<_, ViewError>(render_page(&state.registry, &series, &totals))
    })();

    match rendered {
        Ok(page) => Html(page).into_response(),
        Err(e) => {
            if e.status().is_server_error() {
                error!("dashboard request failed: {}", e.message());
            }
            (e.status(), Html(render_error_page(e.message()))).into_response()
        }
    }
}

// ── HTML rendering ──
//
// Styling is deliberately minimal; the charts are inline SVG built
// server-side so the page needs no scripts.

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn render_error_page(message: &str) -> String {
    format!(
        "<!doctype html><html><head><title>Rainwater Harvesting</title></head>\
         <body><h1>Rainwater Harvesting Dashboard</h1>\
         <p>{}</p><p><a href=\"/\">Back to campus view</a></p></body></html>",
        html_escape(message)
    )
}

fn render_page(
    registry: &BuildingRegistry,
    series: &Series,
    totals: &[dashboard::BuildingTotal],
) -> String {
    let heading = match &series.building {
        Some(b) => format!("{} ({})", html_escape(&b.name), html_escape(&b.id)),
        None => "All buildings".to_string(),
    };
    let download_query = match &series.building {
        Some(b) => format!("?building={}", html_escape(&b.id)),
        None => String::new(),
    };

    let mut body = String::new();
    body.push_str("<h1>Rainwater Harvesting Dashboard</h1>");
    body.push_str(&render_selector(registry, series));
    body.push_str(&format!("<h2>{}</h2>", heading));

    if series.points.is_empty() {
        body.push_str("<p><em>No rainfall data yet. The ingestion job has not recorded any days.</em></p>");
    } else {
        let mean = series.mean_rainfall_mm.unwrap_or(0.0);
        body.push_str(&format!(
            "<p>Total water harvested: <strong>{:.0} L</strong> \
             &middot; Average daily rainfall: <strong>{:.2} mm</strong> \
             &middot; Days recorded: <strong>{}</strong></p>",
            series.total_volume_litres,
            mean,
            series.points.len()
        ));

        body.push_str("<h3>Daily rainfall (mm)</h3>");
        body.push_str(&svg_chart(series, |p| p.rainfall_mm));
        body.push_str("<h3>Harvested volume (litres)</h3>");
        body.push_str(&svg_chart(series, |p| p.volume_litres));

        body.push_str(&format!(
            "<p><a href=\"/download{}\">Download as CSV</a></p>",
            download_query
        ));
        body.push_str(&render_table(series));
    }

    if !totals.is_empty() {
        body.push_str(&render_totals(totals));
    }

    format!(
        "<!doctype html><html><head><meta charset=\"utf-8\">\
         <title>Rainwater Harvesting Dashboard</title></head>\
         <body>{}</body></html>",
        body
    )
}

fn render_selector(registry: &BuildingRegistry, series: &Series) -> String {
    let selected_id = series.building.as_ref().map(|b| b.id.as_str());
    let mut out = String::from("<nav><p>View: ");
    if selected_id.is_none() {
        out.push_str("<strong>All buildings</strong>");
    } else {
        out.push_str("<a href=\"/\">All buildings</a>");
    }
    for b in registry.buildings() {
        out.push_str(" | ");
        if selected_id == Some(b.id.as_str()) {
            out.push_str(&format!("<strong>{}</strong>", html_escape(&b.name)));
        } else {
            out.push_str(&format!(
                "<a href=\"/?building={}\">{}</a>",
                html_escape(&b.id),
                html_escape(&b.name)
            ));
        }
    }
    out.push_str("</p></nav>");
    out
}

fn render_table(series: &Series) -> String {
    let mut out = String::from(
        "<table border=\"1\" cellpadding=\"4\">\
         <tr><th>Date</th><th>Rainfall (mm)</th><th>Harvested (L)</th></tr>",
    );
    for p in &series.points {
        out.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{:.2}</td></tr>",
            p.date, p.rainfall_mm, p.volume_litres
        ));
    }
    out.push_str("</table>");
    out
}

fn render_totals(totals: &[dashboard::BuildingTotal]) -> String {
    let mut out = String::from(
        "<h3>Total harvested by building</h3>\
         <table border=\"1\" cellpadding=\"4\">\
         <tr><th>Building</th><th>Total harvested (L)</th></tr>",
    );
    for t in totals {
        out.push_str(&format!(
            "<tr><td><a href=\"/?building={}\">{}</a></td><td>{:.0}</td></tr>",
            html_escape(&t.id),
            html_escape(&t.name),
            t.total_volume_litres
        ));
    }
    out.push_str("</table>");
    out
}

/// One series as an inline SVG polyline, x spaced evenly per recorded day.
fn svg_chart(series: &Series, value: impl Fn(&dashboard::SeriesPoint) -> f64) -> String {
    const WIDTH: f64 = 640.0;
    const HEIGHT: f64 = 160.0;
    const PAD: f64 = 10.0;

    let values: Vec<f64> = series.points.iter().map(&value).collect();
    let max = values.iter().cloned().fold(0.0_f64, f64::max).max(1.0);

    let coords: Vec<String> = values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let x = if values.len() == 1 {
                WIDTH / 2.0
            } else {
                PAD + (WIDTH - 2.0 * PAD) * i as f64 / (values.len() - 1) as f64
            };
            let y = HEIGHT - PAD - (HEIGHT - 2.0 * PAD) * (v / max);
            format!("{:.1},{:.1}", x, y)
        })
        .collect();

    let shape = if coords.len() == 1 {
        // A single day renders as a dot; a polyline needs two points.
        let mut parts = coords[0].splitn(2, ',');
        let x = parts.next().unwrap_or("0");
        let y = parts.next().unwrap_or("0");
        format!("<circle cx=\"{}\" cy=\"{}\" r=\"3\" fill=\"teal\"/>", x, y)
    } else {
        format!(
            "<polyline points=\"{}\" fill=\"none\" stroke=\"teal\" stroke-width=\"2\"/>",
            coords.join(" ")
        )
    };

    format!(
        "<svg width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\" \
         style=\"border:1px solid #ccc\">{shape}</svg>",
        w = WIDTH as u32,
        h = HEIGHT as u32,
        shape = shape
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Building;
    use crate::services::dashboard::SeriesPoint;
    use chrono::NaiveDate;

    fn registry() -> BuildingRegistry {
        BuildingRegistry::parse("id,name,rooftop_area_m2\nB1,Main Library,500\n").unwrap()
    }

    fn point(date: &str, mm: f64, litres: f64) -> SeriesPoint {
        SeriesPoint {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            rainfall_mm: mm,
            volume_litres: litres,
        }
    }

    #[test]
    fn empty_series_renders_an_explicit_empty_state() {
        let series = Series {
            building: None,
            points: Vec::new(),
            total_volume_litres: 0.0,
            mean_rainfall_mm: None,
        };
        let page = render_page(&registry(), &series, &[]);
        assert!(page.contains("No rainfall data yet"));
        assert!(!page.contains("<svg"));
    }

    #[test]
    fn building_view_carries_chart_table_and_download() {
        let series = Series {
            building: Some(Building {
                id: "B1".to_string(),
                name: "Main Library".to_string(),
                rooftop_area_m2: 500.0,
                runoff_coefficient: 1.0,
            }),
            points: vec![point("2024-07-01", 10.0, 5000.0), point("2024-07-02", 2.0, 1000.0)],
            total_volume_litres: 6000.0,
            mean_rainfall_mm: Some(6.0),
        };
        let page = render_page(&registry(), &series, &[]);
        assert!(page.contains("<svg"));
        assert!(page.contains("/download?building=B1"));
        assert!(page.contains("2024-07-01"));
        assert!(page.contains("5000.00"));
    }

    #[test]
    fn markup_in_names_is_escaped() {
        assert_eq!(html_escape("<b>&\"x\""), "&lt;b&gt;&amp;&quot;x&quot;");
    }

    #[test]
    fn single_day_chart_renders_a_dot() {
        let series = Series {
            building: None,
            points: vec![point("2024-07-01", 10.0, 5000.0)],
            total_volume_litres: 5000.0,
            mean_rainfall_mm: Some(10.0),
        };
        let svg = svg_chart(&series, |p| p.rainfall_mm);
        assert!(svg.contains("<circle"));
    }
}
