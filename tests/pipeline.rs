//! End-to-end batch runs against local boundary files and in-memory providers.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use roadscout::catchment::{CatchmentAggregator, Indicator, StatisticsError, StatisticsProvider};
use roadscout::config::DatasetsConfig;
use roadscout::error::PipelineError;
use roadscout::models::{
    Facility, FacilityKind, LogEntry, Lookup, RegionLevel, RouteLeg, Site, Step,
};
use roadscout::pip::{BoundarySource, FieldMapping, GeoJsonBoundaryProvider, RegionCatalog};
use roadscout::pipeline::{read_sites, CellValue, Column};
use roadscout::progress::CollectingObserver;
use roadscout::routing::{RouteCache, Router, RoutingError, RoutingProvider};
use roadscout::{BatchPipeline, Coordinate, ResultSchema, RunOptions};

/// 10 km of latitude
const TEN_KM: f64 = 10.0 / 111.195_08;

/// Scripted outcome for a destination, optionally only from one origin
type Script = (Option<Coordinate>, Coordinate, Result<RouteLeg, RoutingError>);

/// Haversine × 1.3 at 80 km/h, with scripted exceptions per destination
#[derive(Default)]
struct ScriptedRouter {
    calls: AtomicUsize,
    destinations: Mutex<Vec<(f64, f64)>>,
    scripted: Mutex<Vec<Script>>,
}

impl ScriptedRouter {
    fn script(&self, destination: Coordinate, result: Result<RouteLeg, RoutingError>) {
        self.scripted.lock().unwrap().push((None, destination, result));
    }

    fn script_from(
        &self,
        origin: Coordinate,
        destination: Coordinate,
        result: Result<RouteLeg, RoutingError>,
    ) {
        self.scripted
            .lock()
            .unwrap()
            .push((Some(origin), destination, result));
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn routed_to(&self, destination: Coordinate) -> bool {
        self.destinations
            .lock()
            .unwrap()
            .contains(&(destination.lat, destination.lon))
    }
}

#[async_trait]
impl RoutingProvider for ScriptedRouter {
    async fn route(&self, origin: Coordinate, destination: Coordinate) -> Result<RouteLeg, RoutingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.destinations
            .lock()
            .unwrap()
            .push((destination.lat, destination.lon));
        if let Some((_, _, result)) = self
            .scripted
            .lock()
            .unwrap()
            .iter()
            .find(|(o, d, _)| *d == destination && o.map_or(true, |o| o == origin))
        {
            return result.clone();
        }
        let km = origin.haversine_km(&destination) * 1.3;
        Ok(RouteLeg {
            distance_km: km,
            duration_min: km / 80.0 * 60.0,
        })
    }
}

struct TableStatistics {
    values: HashMap<Indicator, HashMap<String, f64>>,
}

#[async_trait]
impl StatisticsProvider for TableStatistics {
    async fn fetch(
        &self,
        indicator: Indicator,
        region_ids: &[String],
        _year: i32,
    ) -> Result<HashMap<String, f64>, StatisticsError> {
        Ok(self
            .values
            .get(&indicator)
            .map(|rows| {
                rows.iter()
                    .filter(|(k, _)| region_ids.contains(k))
                    .map(|(k, v)| (k.clone(), *v))
                    .collect()
            })
            .unwrap_or_default())
    }
}

fn square(code: &str, name: &str, lat: f64, lon: f64, half: f64) -> serde_json::Value {
    json!({
        "type": "Feature",
        "properties": { "NUTS_ID": code, "NAME_LATN": name, "CNTR_CODE": "DE" },
        "geometry": {
            "type": "Polygon",
            "coordinates": [[
                [lon - half, lat - half],
                [lon + half, lat - half],
                [lon + half, lat + half],
                [lon - half, lat + half],
                [lon - half, lat - half]
            ]]
        }
    })
}

fn write_collection(path: &Path, features: Vec<serde_json::Value>) {
    let collection = json!({ "type": "FeatureCollection", "features": features });
    std::fs::write(path, collection.to_string()).unwrap();
}

/// NUTS2 covering everything; two NUTS3 squares at the site and 10 km north of it
fn datasets(dir: &Path) -> DatasetsConfig {
    let nuts2 = dir.join("nuts2.geojson");
    let nuts3 = dir.join("nuts3.geojson");
    write_collection(&nuts2, vec![square("DE26", "Unterfranken", 50.0, 10.0, 2.0)]);
    write_collection(
        &nuts3,
        vec![
            square("DE262", "Schweinfurt", 50.0, 10.0, 0.02),
            square("DE26C", "Haßberge", 50.0 + TEN_KM, 10.0, 0.02),
        ],
    );

    DatasetsConfig {
        nuts2: BoundarySource::new(
            "NUTS2",
            &nuts2.to_string_lossy(),
            RegionLevel::Nuts2,
            FieldMapping::nuts(),
        ),
        nuts3: BoundarySource::new(
            "NUTS3",
            &nuts3.to_string_lossy(),
            RegionLevel::Nuts3,
            FieldMapping::nuts(),
        ),
        admin: Vec::new(),
    }
}

fn statistics() -> TableStatistics {
    let table = |rows: &[(&str, f64)]| -> HashMap<String, f64> {
        rows.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    };
    TableStatistics {
        values: HashMap::from([
            (Indicator::Population, table(&[("DE262", 100_000.0), ("DE26C", 50_000.0)])),
            (Indicator::Unemployed, table(&[("DE262", 5_000.0), ("DE26C", 2_000.0)])),
            (Indicator::ActivePopulation, table(&[("DE262", 60_000.0), ("DE26C", 30_000.0)])),
        ]),
    }
}

struct Harness {
    pipeline: BatchPipeline,
    router: Arc<ScriptedRouter>,
    observer: Arc<CollectingObserver>,
    _dir: tempfile::TempDir,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let router = Arc::new(ScriptedRouter::default());
    let observer = Arc::new(CollectingObserver::default());
    let pipeline = BatchPipeline::new(
        Router::new(router.clone(), RouteCache::new(None), observer.clone()),
        RegionCatalog::new(Arc::new(GeoJsonBoundaryProvider::new(reqwest::Client::new(), 1))),
        CatchmentAggregator::new(Arc::new(statistics())),
        datasets(dir.path()),
        observer.clone(),
    );
    Harness {
        pipeline,
        router,
        observer,
        _dir: dir,
    }
}

fn sites() -> Vec<Site> {
    vec![
        Site::new("P-1", "S-1", "Schweinfurt", 50.0, 10.0),
        Site::new("P-1", "S-2", "Bamberg", 49.8988, 10.9028),
    ]
}

fn airports() -> Vec<Facility> {
    vec![
        Facility::new("Frankfurt Airport", Some("FRA"), 50.0379, 8.5622),
        Facility::new("Nuremberg Airport", Some("NUE"), 49.4987, 11.0780),
        Facility::new("Munich Airport", Some("MUC"), 48.3538, 11.7861),
        Facility::new("Stuttgart Airport", Some("STR"), 48.6899, 9.2220),
        Facility::new("Leipzig/Halle Airport", Some("LEJ"), 51.4239, 12.2364),
    ]
}

fn seaports() -> Vec<Facility> {
    vec![
        Facility::new("Hamburg", Some("DEHAM"), 53.5461, 9.9661),
        Facility::new("Rotterdam", Some("NLRTM"), 51.9490, 4.1420),
    ]
}

fn options() -> RunOptions {
    RunOptions {
        include_highway: false,
        include_city: false,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_catchment_and_regions_end_to_end() {
    let mut h = harness();
    let output = h
        .pipeline
        .run(&sites()[..1], &airports(), &seaports(), &options())
        .await
        .unwrap();
    let record = &output.records[0];

    assert_eq!(record.nuts2.found().unwrap().code.as_deref(), Some("DE26"));
    assert_eq!(record.nuts3.found().unwrap().code.as_deref(), Some("DE262"));

    let catchment = record.catchment.found().unwrap();
    assert_eq!(catchment.total_population, 83_333);
    assert_eq!(catchment.unemployed_persons, 4_000);
    assert_eq!(catchment.regions, vec!["DE262", "DE26C"]);

    let schema = ResultSchema::for_options(&options());
    assert_eq!(schema.cell(Column::CatchmentRegions, record), CellValue::Text("DE262, DE26C".to_string()));
    assert_eq!(h.observer.messages(), vec!["Processed 1/1"]);
}

#[tokio::test]
async fn test_warm_cache_is_idempotent() {
    let mut h = harness();
    let first = h
        .pipeline
        .run(&sites(), &airports(), &seaports(), &options())
        .await
        .unwrap();
    let calls_after_first = h.router.calls();
    assert!(calls_after_first > 0);

    let second = h
        .pipeline
        .run(&sites(), &airports(), &seaports(), &options())
        .await
        .unwrap();

    assert_eq!(h.router.calls(), calls_after_first);
    assert_eq!(second.call_count, 0);
    let schema = ResultSchema::for_options(&options());
    for (a, b) in first.records.iter().zip(&second.records) {
        assert_eq!(schema.row(a), schema.row(b));
    }
}

#[tokio::test]
async fn test_only_top_k_are_routed() {
    let mut h = harness();
    let sites = sites();
    let site = &sites[..1];
    let airports = airports();
    // Stuttgart is far but has an implausibly short road route
    let stuttgart = airports[3].coordinate();
    h.router.script(
        stuttgart,
        Ok(RouteLeg {
            distance_km: 1.0,
            duration_min: 1.0,
        }),
    );

    let options = RunOptions {
        top_n: 2,
        include_reference: false,
        ..options()
    };
    let output = h.pipeline.run(site, &airports, &[], &options).await.unwrap();

    assert_eq!(h.router.calls(), 2);
    assert!(!h.router.routed_to(stuttgart));
    let airport = output.records[0].airport.found().unwrap();
    assert!(["FRA", "NUE"].contains(&airport.code.as_deref().unwrap()));
}

#[tokio::test]
async fn test_all_airports_fail_seaport_still_found() {
    let mut h = harness();
    for airport in airports() {
        h.router.script(airport.coordinate(), Err(RoutingError::Timeout));
    }

    let output = h
        .pipeline
        .run(&sites()[..1], &airports(), &seaports(), &options())
        .await
        .unwrap();
    let record = &output.records[0];

    assert!(matches!(record.airport, Lookup::Failed(_)));
    assert!(record.seaport.is_found());
    let schema = ResultSchema::for_options(&options());
    assert!(schema.cell(Column::AirportName, record).is_missing());
    assert!(!schema.cell(Column::SeaportName, record).is_missing());

    let airport_errors = output.logs[0]
        .errors()
        .filter(|e| matches!(e, LogEntry::Error { step: Step::Airport, .. }))
        .count();
    assert_eq!(airport_errors, 3);
}

#[tokio::test]
async fn test_quota_aborts_only_current_site() {
    let mut h = harness();
    let hamburg = seaports()[0].coordinate();
    let sites = vec![
        Site::new("P-1", "S-1", "Schweinfurt", 50.0, 10.0),
        Site::new("P-1", "S-3", "Haßberge", 50.0 + TEN_KM, 10.0),
    ];
    h.router
        .script_from(sites[0].coordinate(), hamburg, Err(RoutingError::QuotaExhausted));

    let output = h
        .pipeline
        .run(&sites, &airports(), &seaports(), &options())
        .await
        .unwrap();
    let schema = ResultSchema::for_options(&options());

    // First site stops at the seaport; earlier steps keep their values
    let first = &output.records[0];
    assert!(first.airport.is_found());
    assert!(first.nuts3.is_found());
    assert_eq!(first.reference, Lookup::Pending);
    assert_eq!(first.catchment, Lookup::Pending);
    for column in [
        Column::ReferenceDistance,
        Column::CatchmentPopulation,
        Column::CatchmentRegions,
    ] {
        assert!(schema.cell(column, first).is_missing(), "{:?}", column);
    }
    assert!(matches!(
        output.logs[0].entries.last(),
        Some(LogEntry::Abort { step: Step::Seaport, .. })
    ));

    // The next site in the same run is processed in full
    let second = &output.records[1];
    assert_eq!(second.nuts3.found().unwrap().code.as_deref(), Some("DE26C"));
    assert_eq!(second.seaport.found().unwrap().code.as_deref(), Some("DEHAM"));
    assert!(second.airport.is_found());
    assert!(second.reference.is_found());
    assert!(second.catchment.is_found());
    assert!(!schema.cell(Column::CatchmentPopulation, second).is_missing());
    assert!(!output.logs[1]
        .entries
        .iter()
        .any(|e| matches!(e, LogEntry::Abort { .. })));
    assert_eq!(
        h.observer.messages(),
        vec!["Processed 1/2", "Processed 2/2"]
    );
    assert!(h.router.routed_to(hamburg));
}

#[tokio::test]
async fn test_invalid_input_fails_before_processing() {
    let csv = "Project ID,Site ID,Site Name,Latitude,Longitude\nP-1,S-1,Plant,50.0,east\n";
    assert!(read_sites(csv.as_bytes()).is_err());

    let mut h = harness();
    let bad = vec![Facility::new("Nowhere", None, -95.0, 0.0)];
    let result = h.pipeline.run(&sites(), &bad, &[], &options()).await;

    assert!(matches!(result, Err(PipelineError::Validation(_))));
    assert_eq!(h.router.calls(), 0);
    assert!(h.observer.messages().is_empty());
    assert_eq!(FacilityKind::Airport.name_column(), "Airport Name");
}
