//! Fixed result columns and their rendering.

use std::io::Write;

use serde_json::{Map, Value};

use super::RunOptions;
use crate::geodesy::round_to;
use crate::models::{Lookup, RegionEntry, SiteRecord};

/// Contributing region ids shown in the result row
pub const SHOWN_CATCHMENT_REGIONS: usize = 3;

/// One rendered cell. `Missing` is an empty CSV field and JSON `null`.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Integer(i64),
    Missing,
}

impl CellValue {
    fn text(value: Option<&str>) -> Self {
        value.map_or(CellValue::Missing, |v| CellValue::Text(v.to_string()))
    }

    /// Distances and durations are reported to one decimal
    fn tenths(value: Option<f64>) -> Self {
        value.map_or(CellValue::Missing, |v| CellValue::Number(round_to(v, 1)))
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, CellValue::Missing)
    }

    pub fn to_csv(&self) -> String {
        match self {
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => n.to_string(),
            CellValue::Integer(i) => i.to_string(),
            CellValue::Missing => String::new(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            CellValue::Text(s) => Value::String(s.clone()),
            CellValue::Number(n) => serde_json::Number::from_f64(*n).map_or(Value::Null, Value::Number),
            CellValue::Integer(i) => Value::from(*i),
            CellValue::Missing => Value::Null,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    ProjectId,
    SiteId,
    SiteName,
    Latitude,
    Longitude,
    AirportName,
    AirportCode,
    AirportDistance,
    AirportTime,
    SeaportName,
    SeaportDistance,
    SeaportTime,
    HighwayName,
    HighwayDistance,
    HighwayTime,
    Municipality,
    MunicipalityCode,
    County,
    CountyCode,
    Region,
    RegionCode,
    Nuts2Code,
    Nuts2Name,
    Nuts3Code,
    Nuts3Name,
    CatchmentPopulation,
    CatchmentUnemployed,
    CatchmentActive,
    CatchmentEmployed,
    CatchmentRegions,
    ReferenceDistance,
    ReferenceTime,
    CityName,
    CityPopulation,
    CityDistance,
    CityTime,
}

/// Column set for one run, derived from its feature flags
#[derive(Debug, Clone)]
pub struct ResultSchema {
    columns: Vec<Column>,
    reference_name: String,
    radius_label: String,
}

impl ResultSchema {
    pub fn for_options(options: &RunOptions) -> Self {
        use Column::*;

        let mut columns = vec![
            ProjectId,
            SiteId,
            SiteName,
            Latitude,
            Longitude,
            AirportName,
            AirportCode,
            AirportDistance,
            AirportTime,
            SeaportName,
            SeaportDistance,
            SeaportTime,
        ];
        if options.include_highway {
            columns.extend([HighwayName, HighwayDistance, HighwayTime]);
        }
        columns.extend([
            Municipality,
            MunicipalityCode,
            County,
            CountyCode,
            Region,
            RegionCode,
        ]);
        if options.enrich_nuts {
            columns.extend([Nuts2Code, Nuts2Name, Nuts3Code, Nuts3Name]);
        }
        if options.include_catchment {
            columns.extend([
                CatchmentPopulation,
                CatchmentUnemployed,
                CatchmentActive,
                CatchmentEmployed,
                CatchmentRegions,
            ]);
        }
        if options.include_reference {
            columns.extend([ReferenceDistance, ReferenceTime]);
        }
        if options.include_city {
            columns.extend([CityName, CityPopulation, CityDistance, CityTime]);
        }

        Self {
            columns,
            reference_name: options.reference.name.clone(),
            radius_label: options.radius_label(),
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn header(&self, column: Column) -> String {
        use Column::*;

        let fixed = match column {
            ProjectId => "Project ID",
            SiteId => "Site ID",
            SiteName => "Site Name",
            Latitude => "Latitude",
            Longitude => "Longitude",
            AirportName => "Nearest Airport",
            AirportCode => "Nearest Airport Code",
            AirportDistance => "Distance to Airport (km)",
            AirportTime => "Time to Airport (min)",
            SeaportName => "Nearest Seaport",
            SeaportDistance => "Distance to Seaport (km)",
            SeaportTime => "Time to Seaport (min)",
            HighwayName => "Nearest Highway Access",
            HighwayDistance => "Distance to Highway (km)",
            HighwayTime => "Time to Highway (min)",
            Municipality => "Municipality",
            MunicipalityCode => "Municipality Code",
            County => "County",
            CountyCode => "County Code",
            Region => "Region",
            RegionCode => "Region Code",
            Nuts2Code => "NUTS2 Code",
            Nuts2Name => "NUTS2 Name",
            Nuts3Code => "NUTS3 Code",
            Nuts3Name => "NUTS3 Name",
            CatchmentPopulation => return format!("Catchment Population ({}km)", self.radius_label),
            CatchmentUnemployed => return format!("Catchment Unemployed ({}km)", self.radius_label),
            CatchmentActive => return format!("Catchment Active Pop ({}km)", self.radius_label),
            CatchmentEmployed => return format!("Catchment Employed ({}km)", self.radius_label),
            CatchmentRegions => "Catchment NUTS3 Regions",
            ReferenceDistance => return format!("Distance to {} (km)", self.reference_name),
            ReferenceTime => return format!("Time to {} (min)", self.reference_name),
            CityName => "Nearest City (100k+)",
            CityPopulation => "City Population",
            CityDistance => "Distance to City (km)",
            CityTime => "Time to City (min)",
        };
        fixed.to_string()
    }

    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(|c| self.header(*c)).collect()
    }

    pub fn cell(&self, column: Column, record: &SiteRecord) -> CellValue {
        use Column::*;

        let region_name = |entry: &Lookup<RegionEntry>| {
            CellValue::text(entry.found().and_then(|e| e.name.as_deref()))
        };
        let region_code = |entry: &Lookup<RegionEntry>| {
            CellValue::text(entry.found().and_then(|e| e.code.as_deref()))
        };
        // All-zero catchments render as missing
        let catchment = record.catchment.found().filter(|c| c.is_available());

        match column {
            ProjectId => CellValue::Text(record.project_id.clone()),
            SiteId => CellValue::Text(record.site_id.clone()),
            SiteName => CellValue::Text(record.site_name.clone()),
            Latitude => CellValue::Number(record.latitude),
            Longitude => CellValue::Number(record.longitude),
            AirportName => CellValue::text(record.airport.found().map(|a| a.name.as_str())),
            AirportCode => CellValue::text(record.airport.found().and_then(|a| a.code.as_deref())),
            AirportDistance => CellValue::tenths(record.airport.found().map(|a| a.distance_km)),
            AirportTime => CellValue::tenths(record.airport.found().map(|a| a.duration_min)),
            SeaportName => CellValue::text(record.seaport.found().map(|s| s.name.as_str())),
            SeaportDistance => CellValue::tenths(record.seaport.found().map(|s| s.distance_km)),
            SeaportTime => CellValue::tenths(record.seaport.found().map(|s| s.duration_min)),
            HighwayName => CellValue::text(record.highway.found().map(|h| h.name.as_str())),
            HighwayDistance => CellValue::tenths(record.highway.found().map(|h| h.distance_km)),
            HighwayTime => CellValue::tenths(record.highway.found().and_then(|h| h.duration_min)),
            Municipality => region_name(&record.municipality),
            MunicipalityCode => region_code(&record.municipality),
            County => region_name(&record.county),
            CountyCode => region_code(&record.county),
            Region => region_name(&record.region),
            RegionCode => region_code(&record.region),
            Nuts2Code => region_code(&record.nuts2),
            Nuts2Name => region_name(&record.nuts2),
            Nuts3Code => region_code(&record.nuts3),
            Nuts3Name => region_name(&record.nuts3),
            CatchmentPopulation => catchment
                .map_or(CellValue::Missing, |c| CellValue::Integer(c.total_population)),
            CatchmentUnemployed => catchment
                .map_or(CellValue::Missing, |c| CellValue::Integer(c.unemployed_persons)),
            CatchmentActive => catchment
                .map_or(CellValue::Missing, |c| CellValue::Integer(c.active_population)),
            CatchmentEmployed => catchment
                .map_or(CellValue::Missing, |c| CellValue::Integer(c.employed_persons)),
            CatchmentRegions => catchment.map_or(CellValue::Missing, |c| {
                let shown: Vec<&str> = c
                    .regions
                    .iter()
                    .take(SHOWN_CATCHMENT_REGIONS)
                    .map(String::as_str)
                    .collect();
                CellValue::Text(shown.join(", "))
            }),
            ReferenceDistance => CellValue::tenths(record.reference.found().map(|r| r.distance_km)),
            ReferenceTime => CellValue::tenths(record.reference.found().map(|r| r.duration_min)),
            CityName => CellValue::text(record.city.found().map(|c| c.name.as_str())),
            CityPopulation => record
                .city
                .found()
                .and_then(|c| c.population)
                .map_or(CellValue::Missing, |p| CellValue::Integer(p as i64)),
            CityDistance => CellValue::tenths(
                record.city.found().and_then(|c| c.route).map(|r| r.distance_km),
            ),
            CityTime => CellValue::tenths(
                record.city.found().and_then(|c| c.route).map(|r| r.duration_min),
            ),
        }
    }

    pub fn row(&self, record: &SiteRecord) -> Vec<CellValue> {
        self.columns.iter().map(|c| self.cell(*c, record)).collect()
    }

    /// Row as a JSON object keyed by column header
    pub fn row_json(&self, record: &SiteRecord) -> Map<String, Value> {
        self.columns
            .iter()
            .map(|c| (self.header(*c), self.cell(*c, record).to_json()))
            .collect()
    }

    pub fn write_csv<W: Write>(&self, writer: W, records: &[SiteRecord]) -> csv::Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(self.headers())?;
        for record in records {
            csv.write_record(self.row(record).iter().map(CellValue::to_csv))?;
        }
        csv.flush()?;
        Ok(())
    }
}
