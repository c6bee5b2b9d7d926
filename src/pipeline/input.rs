//! Reading and validating the input tables.
//!
//! Any malformed table rejects the whole run before a site is processed.

use std::io::Read;

use crate::error::ValidationError;
use crate::geodesy::Coordinate;
use crate::models::{Facility, FacilityKind, Site};

pub const SITE_COLUMNS: &[&str] = &["Project ID", "Site ID", "Site Name", "Latitude", "Longitude"];

/// Required columns of a facility table
pub fn facility_columns(kind: FacilityKind) -> [&'static str; 3] {
    [kind.name_column(), "Latitude", "Longitude"]
}

fn table_name(kind: FacilityKind) -> &'static str {
    match kind {
        FacilityKind::Airport => "Airports",
        FacilityKind::Seaport => "Seaports",
    }
}

/// Header-indexed view over a CSV table
struct Table {
    name: String,
    headers: Vec<String>,
    rows: Vec<csv::StringRecord>,
}

impl Table {
    fn read<R: Read>(name: &str, reader: R) -> Result<Self, ValidationError> {
        let mut csv = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);
        let invalid = |e: csv::Error| ValidationError::Invalid(format!("{}: {}", name, e));

        let headers = csv
            .headers()
            .map_err(invalid)?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();
        let rows = csv
            .records()
            .collect::<Result<Vec<_>, _>>()
            .map_err(invalid)?;

        Ok(Self {
            name: name.to_string(),
            headers,
            rows,
        })
    }

    fn require(&self, columns: &[&str]) -> Result<(), ValidationError> {
        let missing: Vec<String> = columns
            .iter()
            .filter(|c| !self.headers.iter().any(|h| h == *c))
            .map(|c| c.to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::MissingColumns {
                table: self.name.clone(),
                columns: missing,
            })
        }
    }

    fn get<'a>(&self, row: &'a csv::StringRecord, column: &str) -> Option<&'a str> {
        let idx = self.headers.iter().position(|h| h == column)?;
        row.get(idx).filter(|v| !v.is_empty())
    }

    fn number(&self, row_no: usize, row: &csv::StringRecord, column: &str) -> Result<f64, ValidationError> {
        let raw = self.get(row, column).unwrap_or("");
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ValidationError::NotNumeric {
                table: self.name.clone(),
                row: row_no,
                column: column.to_string(),
                value: raw.to_string(),
            })
    }

    fn coordinate(&self, row_no: usize, row: &csv::StringRecord) -> Result<Coordinate, ValidationError> {
        let lat = self.number(row_no, row, "Latitude")?;
        let lon = self.number(row_no, row, "Longitude")?;
        check_range(&self.name, row_no, lat, lon)?;
        Ok(Coordinate::new(lat, lon))
    }
}

fn check_range(table: &str, row: usize, lat: f64, lon: f64) -> Result<(), ValidationError> {
    if Coordinate::new(lat, lon).is_valid() {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            table: table.to_string(),
            row,
            lat,
            lon,
        })
    }
}

/// Read the Sites table
pub fn read_sites<R: Read>(reader: R) -> Result<Vec<Site>, ValidationError> {
    let table = Table::read("Sites", reader)?;
    table.require(SITE_COLUMNS)?;

    table
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let c = table.coordinate(i + 1, row)?;
            Ok(Site::new(
                table.get(row, "Project ID").unwrap_or(""),
                table.get(row, "Site ID").unwrap_or(""),
                table.get(row, "Site Name").unwrap_or(""),
                c.lat,
                c.lon,
            ))
        })
        .collect()
}

/// Read an Airports or Seaports table; the code comes from the first non-empty code column
pub fn read_facilities<R: Read>(kind: FacilityKind, reader: R) -> Result<Vec<Facility>, ValidationError> {
    let table = Table::read(table_name(kind), reader)?;
    table.require(&facility_columns(kind))?;

    table
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let c = table.coordinate(i + 1, row)?;
            let code = kind.code_columns().iter().find_map(|col| table.get(row, col));
            Ok(Facility::new(
                table.get(row, kind.name_column()).unwrap_or(""),
                code,
                c.lat,
                c.lon,
            ))
        })
        .collect()
}

/// Range-check already typed inputs (e.g. from a JSON request)
pub fn validate_inputs(
    sites: &[Site],
    airports: &[Facility],
    seaports: &[Facility],
) -> Result<(), ValidationError> {
    for (i, site) in sites.iter().enumerate() {
        check_range("Sites", i + 1, site.latitude, site.longitude)?;
    }
    for (kind, facilities) in [(FacilityKind::Airport, airports), (FacilityKind::Seaport, seaports)] {
        for (i, f) in facilities.iter().enumerate() {
            check_range(table_name(kind), i + 1, f.latitude, f.longitude)?;
        }
    }
    Ok(())
}
