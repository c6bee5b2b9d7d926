//! Output files: results table, Site Selection long format, logs, and input templates.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::geodesy::round_to;
use crate::models::{Facility, FacilityKind, SiteLog, SiteRecord, Site};
use crate::pipeline::{ResultSchema, SITE_COLUMNS};

/// Write the fixed-schema results table
pub fn write_results(path: &Path, schema: &ResultSchema, records: &[SiteRecord]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create results file {}", path.display()))?;
    schema
        .write_csv(file, records)
        .context("Failed to write results CSV")?;
    info!("Wrote {} result rows to {}", records.len(), path.display());
    Ok(())
}

/// Write per-site logs as a JSON array
pub fn write_logs(path: &Path, logs: &[SiteLog]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create log file {}", path.display()))?;
    serde_json::to_writer_pretty(file, logs).context("Failed to write logs")?;
    Ok(())
}

/// One destination of one site in the Site Selection format
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionRow {
    #[serde(rename = "Project ID")]
    pub project_id: String,
    #[serde(rename = "Project Name")]
    pub project_name: String,
    #[serde(rename = "Site ID")]
    pub site_id: String,
    #[serde(rename = "Site Name")]
    pub site_name: String,
    #[serde(rename = "LatitudeY")]
    pub latitude: f64,
    #[serde(rename = "LongitudeX")]
    pub longitude: f64,
    #[serde(rename = "Destination")]
    pub destination: String,
    #[serde(rename = "Destination group")]
    pub group: &'static str,
    #[serde(rename = "Distance (km)")]
    pub distance_km: Option<f64>,
    #[serde(rename = "Time (min)")]
    pub duration_min: Option<f64>,
    #[serde(rename = "Accessibility")]
    pub accessibility: u8,
    #[serde(rename = "NUTS3 Code")]
    pub nuts3_code: String,
}

/// Long format: one row per destination that was found
pub fn site_selection_rows(records: &[SiteRecord], reference_name: &str) -> Vec<SelectionRow> {
    let mut rows = Vec::new();
    for record in records {
        let row = |destination: &str,
                   group: &'static str,
                   distance: f64,
                   duration: Option<f64>,
                   accessibility: u8| SelectionRow {
            project_id: record.project_id.clone(),
            project_name: String::new(),
            site_id: record.site_id.clone(),
            site_name: record.site_name.clone(),
            latitude: record.latitude,
            longitude: record.longitude,
            destination: destination.to_string(),
            group,
            distance_km: Some(round_to(distance, 1)),
            duration_min: duration.map(|d| round_to(d, 1)),
            accessibility,
            nuts3_code: record
                .nuts3
                .found()
                .and_then(|n| n.code.clone())
                .unwrap_or_default(),
        };

        if let Some(a) = record.airport.found() {
            rows.push(row(&a.name, "Nearest Airport", a.distance_km, Some(a.duration_min), 1));
        }
        if let Some(s) = record.seaport.found() {
            rows.push(row(&s.name, "Inbound", s.distance_km, Some(s.duration_min), 0));
        }
        if let Some(h) = record.highway.found() {
            rows.push(row(&h.name, "Nearest Highway", h.distance_km, h.duration_min, 1));
        }
        if let Some(leg) = record.reference.found() {
            rows.push(row(reference_name, "Outbound", leg.distance_km, Some(leg.duration_min), 0));
        }
        if let Some(city) = record.city.found() {
            let mut r = row(&city.name, "Nearest City", 0.0, None, 1);
            r.distance_km = city.route.map(|leg| round_to(leg.distance_km, 1));
            r.duration_min = city.route.map(|leg| round_to(leg.duration_min, 1));
            rows.push(r);
        }
    }
    rows
}

pub fn write_site_selection<W: Write>(
    writer: W,
    records: &[SiteRecord],
    reference_name: &str,
) -> csv::Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for row in site_selection_rows(records, reference_name) {
        csv.serialize(row)?;
    }
    csv.flush()?;
    Ok(())
}

pub fn template_sites() -> Vec<Site> {
    vec![
        Site::new("P-20250101-01", "SK-20250101-01", "Example Plant A", 52.2297, 21.0122),
        Site::new("P-20250101-01", "SK-20250101-02", "Example Plant B", 48.1486, 17.1077),
        Site::new("P-20250101-02", "SK-20250102-01", "Example Plant C", 50.1109, 8.6821),
    ]
}

pub fn template_airports() -> Vec<Facility> {
    vec![
        Facility::new("Frankfurt Airport", Some("FRA"), 50.0379, 8.5622),
        Facility::new("Warsaw Chopin Airport", Some("WAW"), 52.1657, 20.9671),
        Facility::new("Vienna International Airport", Some("VIE"), 48.1103, 16.5697),
        Facility::new("Prague Vaclav Havel", Some("PRG"), 50.1008, 14.2600),
        Facility::new("Amsterdam Schiphol", Some("AMS"), 52.3105, 4.7683),
    ]
}

pub fn template_seaports() -> Vec<Facility> {
    vec![
        Facility::new("Rotterdam", Some("NLRTM"), 51.9490, 4.1420),
        Facility::new("Hamburg", Some("DEHAM"), 53.5461, 9.9661),
        Facility::new("Antwerp", Some("BEANR"), 51.2637, 4.3866),
        Facility::new("Gdynia", Some("PLGDY"), 54.5333, 18.5500),
        Facility::new("Valencia", Some("ESVLC"), 39.4400, -0.3167),
    ]
}

fn write_facility_template(path: &Path, kind: FacilityKind, facilities: &[Facility]) -> Result<()> {
    let mut csv = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    csv.write_record([kind.name_column(), kind.code_columns()[0], "Latitude", "Longitude"])?;
    for f in facilities {
        csv.write_record([
            f.name.clone(),
            f.code.clone().unwrap_or_default(),
            f.latitude.to_string(),
            f.longitude.to_string(),
        ])?;
    }
    csv.flush()?;
    Ok(())
}

/// Write example Sites, Airports and Seaports CSVs into `dir`
pub fn write_templates(dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create template directory {}", dir.display()))?;

    let sites_path = dir.join("Sites.csv");
    let mut csv = csv::Writer::from_path(&sites_path)
        .with_context(|| format!("Failed to create {}", sites_path.display()))?;
    csv.write_record(SITE_COLUMNS)?;
    for s in template_sites() {
        csv.write_record([
            s.project_id,
            s.site_id,
            s.name,
            s.latitude.to_string(),
            s.longitude.to_string(),
        ])?;
    }
    csv.flush()?;

    let airports_path = dir.join("Airports.csv");
    write_facility_template(&airports_path, FacilityKind::Airport, &template_airports())?;
    let seaports_path = dir.join("Seaports.csv");
    write_facility_template(&seaports_path, FacilityKind::Seaport, &template_seaports())?;

    info!("Wrote templates to {}", dir.display());
    Ok(vec![sites_path, airports_path, seaports_path])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CityLeg, HighwayLeg, Lookup, RegionEntry, RouteLeg, RoutedFacility};
    use crate::pipeline::{read_facilities, read_sites, RunOptions};

    fn record() -> SiteRecord {
        let mut record = SiteRecord::new("P-1", "S-1", "Plant A", 52.2297, 21.0122);
        record.airport = Lookup::Found(RoutedFacility {
            name: "Warsaw Chopin Airport".to_string(),
            code: Some("WAW".to_string()),
            distance_km: 9.84,
            duration_min: 14.26,
        });
        record.seaport = Lookup::Failed("all 3 routed candidates failed".to_string());
        record.highway = Lookup::Found(HighwayLeg {
            name: "Junction 5".to_string(),
            distance_km: 4.2,
            duration_min: None,
        });
        record.reference = Lookup::Found(RouteLeg {
            distance_km: 1140.04,
            duration_min: 660.0,
        });
        record.city = Lookup::Found(CityLeg {
            name: "Warsaw".to_string(),
            population: Some(1_860_000),
            route: None,
        });
        record.nuts3 = Lookup::Found(RegionEntry::new(None, Some("PL911".to_string())));
        record
    }

    #[test]
    fn test_site_selection_rows() {
        let rows = site_selection_rows(&[record()], "Bedburg, Germany");
        let groups: Vec<&str> = rows.iter().map(|r| r.group).collect();
        assert_eq!(
            groups,
            vec!["Nearest Airport", "Nearest Highway", "Outbound", "Nearest City"]
        );
        assert_eq!(rows[0].distance_km, Some(9.8));
        assert_eq!(rows[0].accessibility, 1);
        assert_eq!(rows[1].duration_min, None);
        assert_eq!(rows[2].destination, "Bedburg, Germany");
        assert_eq!(rows[2].accessibility, 0);
        assert_eq!(rows[3].distance_km, None);
        assert!(rows.iter().all(|r| r.nuts3_code == "PL911" && r.project_name.is_empty()));
    }

    #[test]
    fn test_site_selection_csv() {
        let mut out = Vec::new();
        write_site_selection(&mut out, &[record()], "Bedburg, Germany").unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("Project ID,Project Name,Site ID,Site Name,LatitudeY,LongitudeX,Destination,Destination group,Distance (km),Time (min),Accessibility,NUTS3 Code")
        );
        assert_eq!(
            lines.next(),
            Some("P-1,,S-1,Plant A,52.2297,21.0122,Warsaw Chopin Airport,Nearest Airport,9.8,14.3,1,PL911")
        );
        assert_eq!(lines.count(), 3);
    }

    #[test]
    fn test_templates_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_templates(dir.path()).unwrap();
        assert_eq!(paths.len(), 3);

        let sites = read_sites(File::open(&paths[0]).unwrap()).unwrap();
        assert_eq!(sites, template_sites());
        let airports = read_facilities(FacilityKind::Airport, File::open(&paths[1]).unwrap()).unwrap();
        assert_eq!(airports[0].code.as_deref(), Some("FRA"));
        let seaports = read_facilities(FacilityKind::Seaport, File::open(&paths[2]).unwrap()).unwrap();
        assert_eq!(seaports, template_seaports());
    }

    #[test]
    fn test_results_and_logs_files() {
        let dir = tempfile::tempdir().unwrap();
        let schema = ResultSchema::for_options(&RunOptions::default());
        let results = dir.path().join("results.csv");
        write_results(&results, &schema, &[record()]).unwrap();
        let text = std::fs::read_to_string(&results).unwrap();
        assert!(text.starts_with("Project ID,Site ID,Site Name"));
        assert_eq!(text.lines().count(), 2);

        let mut log = SiteLog::new("S-1");
        log.info("Nearest city: Warsaw (1,860,000 pop)");
        let logs = dir.path().join("logs.json");
        write_logs(&logs, &[log]).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&logs).unwrap()).unwrap();
        assert_eq!(value[0]["entries"][0]["kind"], "info");
    }
}
