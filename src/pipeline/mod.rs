//! Batch orchestration: every enrichment step for every site, in order.

mod input;
mod options;
mod schema;

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catchment::CatchmentAggregator;
use crate::cities::CityDatabase;
use crate::config::DatasetsConfig;
use crate::error::PipelineError;
use crate::geocode::ReverseGeocoder;
use crate::geodesy::Coordinate;
use crate::highway::HighwayLocator;
use crate::models::{
    CityLeg, Facility, HighwayLeg, Lookup, RegionEntry, RegionLevel, RouteLeg, RoutedFacility,
    Site, SiteLog, SiteRecord, Step,
};
use crate::nearest::{Located, NearestNeighborResolver, Resolution};
use crate::pip::{DatasetSummary, RegionCatalog};
use crate::progress::ProgressObserver;
use crate::routing::{CacheStats, Router, RoutingError};

pub use input::{facility_columns, read_facilities, read_sites, validate_inputs, SITE_COLUMNS};
pub use options::RunOptions;
pub use schema::{CellValue, Column, ResultSchema, SHOWN_CATCHMENT_REGIONS};

/// Everything a run produced, in input order
#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    pub records: Vec<SiteRecord>,
    pub logs: Vec<SiteLog>,
    /// Provider calls issued during this run
    pub call_count: u64,
    pub cache: CacheStats,
}

/// Returned by a step when routing quota ran out; the site stops there
type StepOutcome = Result<(), RoutingError>;

/// Per-site enrichment over injected providers.
///
/// The route cache and dataset catalog live as long as the pipeline, so a
/// second run over the same sites is served from memory.
pub struct BatchPipeline {
    router: Router,
    catalog: RegionCatalog,
    catchment: CatchmentAggregator,
    datasets: DatasetsConfig,
    highway: Option<(Arc<dyn HighwayLocator>, f64)>,
    geocoder: Option<Arc<dyn ReverseGeocoder>>,
    cities: Option<(CityDatabase, f64)>,
    observer: Arc<dyn ProgressObserver>,
}

impl BatchPipeline {
    pub fn new(
        router: Router,
        catalog: RegionCatalog,
        catchment: CatchmentAggregator,
        datasets: DatasetsConfig,
        observer: Arc<dyn ProgressObserver>,
    ) -> Self {
        let mut router = router;
        router.set_observer(Arc::clone(&observer));
        Self {
            router,
            catalog,
            catchment,
            datasets,
            highway: None,
            geocoder: None,
            cities: None,
            observer,
        }
    }

    pub fn with_highway(mut self, locator: Arc<dyn HighwayLocator>, radius_km: f64) -> Self {
        self.highway = Some((locator, radius_km));
        self
    }

    pub fn with_geocoder(mut self, geocoder: Arc<dyn ReverseGeocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    pub fn with_cities(mut self, cities: CityDatabase, max_distance_km: f64) -> Self {
        self.cities = Some((cities, max_distance_km));
        self
    }

    pub fn set_observer(&mut self, observer: Arc<dyn ProgressObserver>) {
        self.router.set_observer(Arc::clone(&observer));
        self.observer = observer;
    }

    /// Evaluate a batch. Fails only on invalid input; per-site problems end up in the logs.
    pub async fn run(
        &mut self,
        sites: &[Site],
        airports: &[Facility],
        seaports: &[Facility],
        options: &RunOptions,
    ) -> Result<RunOutput, PipelineError> {
        validate_inputs(sites, airports, seaports)?;
        let pacing = options.rate_limiter()?;
        self.router.set_pacing(pacing);

        info!(
            "Evaluating {} sites against {} airports and {} seaports",
            sites.len(),
            airports.len(),
            seaports.len()
        );

        let total = sites.len();
        let mut records = Vec::with_capacity(total);
        let mut logs = Vec::with_capacity(total);

        for (i, site) in sites.iter().enumerate() {
            let (record, log) = self.process_site(site, airports, seaports, options).await;
            records.push(record);
            logs.push(log);
            self.observer
                .notify(&format!("Processed {}/{}", i + 1, total));
        }

        let output = RunOutput {
            records,
            logs,
            call_count: self.router.call_count(),
            cache: self.router.cache().stats(),
        };
        info!(
            "Run complete: {} provider calls, {} cached routes",
            output.call_count, output.cache.entries
        );
        Ok(output)
    }

    async fn process_site(
        &mut self,
        site: &Site,
        airports: &[Facility],
        seaports: &[Facility],
        options: &RunOptions,
    ) -> (SiteRecord, SiteLog) {
        let mut record = SiteRecord::new(
            &site.project_id,
            &site.site_id,
            &site.name,
            site.latitude,
            site.longitude,
        );
        let mut log = SiteLog::new(&site.site_id);
        debug!("Processing {} ({})", site.name, site.coordinate());

        for &step in Step::all() {
            let outcome = match step {
                Step::Regions => {
                    self.enrich_regions(site, &mut record, &mut log, options).await;
                    Ok(())
                }
                Step::Airport => {
                    let resolution = self.resolve(site, airports, options).await;
                    record_resolution(step, resolution, &mut record.airport, &mut log)
                }
                Step::Seaport => {
                    let resolution = self.resolve(site, seaports, options).await;
                    record_resolution(step, resolution, &mut record.seaport, &mut log)
                }
                Step::Highway => self.highway_step(site, &mut record, &mut log, options).await,
                Step::Reference => self.reference_step(site, &mut record, &mut log, options).await,
                Step::City => self.city_step(site, &mut record, &mut log, options).await,
                Step::Catchment => {
                    self.catchment_step(site, &mut record, &mut log, options).await;
                    Ok(())
                }
            };

            if let Err(e) = outcome {
                warn!("{}: {} aborted: {}", site.site_id, step, e);
                log.abort(step, format!("{}; remaining steps skipped", e));
                break;
            }
        }

        (record, log)
    }

    async fn resolve(&mut self, site: &Site, candidates: &[Facility], options: &RunOptions) -> Resolution {
        NearestNeighborResolver::new(options.top_n)
            .resolve(&mut self.router, site.coordinate(), candidates)
            .await
    }

    /// National admin units first, then reverse geocoding if nothing matched, then NUTS
    async fn enrich_regions(
        &mut self,
        site: &Site,
        record: &mut SiteRecord,
        log: &mut SiteLog,
        options: &RunOptions,
    ) {
        let point = site.coordinate();

        for source in &self.datasets.admin {
            let field = match source.level {
                RegionLevel::AdminRegion => &mut record.region,
                RegionLevel::AdminCounty => &mut record.county,
                RegionLevel::AdminMunicipality => &mut record.municipality,
                RegionLevel::Nuts2 | RegionLevel::Nuts3 => continue,
            };
            if field.is_found() {
                continue;
            }
            *field = match self.catalog.index(source).await {
                Some(index) => Lookup::from_option(
                    index
                        .lookup(point.lat, point.lon)
                        .map(|b| RegionEntry::from_area(&b.area)),
                ),
                None => {
                    log.error(Step::Regions, format!("{} dataset unavailable", source.name));
                    Lookup::Failed(format!("{} dataset unavailable", source.name))
                }
            };
        }

        let admin_hit = [&record.municipality, &record.county, &record.region]
            .iter()
            .any(|f| f.is_found());
        if !admin_hit && options.enrich_osm_admin {
            if let Some(geocoder) = &self.geocoder {
                match geocoder.reverse(point).await {
                    Ok(address) => {
                        let fill = |field: &mut Lookup<RegionEntry>, entry: RegionEntry| {
                            *field = if entry.is_empty() {
                                Lookup::NotFound
                            } else {
                                Lookup::Found(entry)
                            };
                        };
                        fill(&mut record.municipality, address.municipality);
                        fill(&mut record.county, address.county);
                        fill(&mut record.region, address.region);
                    }
                    Err(e) => {
                        log.error(Step::Regions, format!("Reverse geocoding failed: {}", e));
                        for field in [&mut record.municipality, &mut record.county, &mut record.region] {
                            *field = Lookup::Failed(e.to_string());
                        }
                    }
                }
            }
        }

        if options.enrich_nuts {
            for (source, field) in [
                (&self.datasets.nuts2, &mut record.nuts2),
                (&self.datasets.nuts3, &mut record.nuts3),
            ] {
                *field = match self.catalog.index(source).await {
                    Some(index) => Lookup::from_option(
                        index
                            .lookup(point.lat, point.lon)
                            .map(|b| RegionEntry::from_area(&b.area)),
                    ),
                    None => {
                        log.error(Step::Regions, format!("{} dataset unavailable", source.name));
                        Lookup::Failed(format!("{} dataset unavailable", source.name))
                    }
                };
            }
        }
    }

    async fn highway_step(
        &mut self,
        site: &Site,
        record: &mut SiteRecord,
        log: &mut SiteLog,
        options: &RunOptions,
    ) -> StepOutcome {
        if !options.include_highway {
            return Ok(());
        }
        let Some((locator, radius_km)) = self.highway.clone() else {
            return Ok(());
        };

        self.router.acquire_external().await;
        let access = match locator.nearest_access(site.coordinate(), radius_km).await {
            Ok(Some(access)) => access,
            Ok(None) => {
                log.info(format!("No highway access found within {}km", radius_km));
                record.highway = Lookup::NotFound;
                return Ok(());
            }
            Err(e) => {
                log.error(Step::Highway, format!("Highway lookup failed: {}", e));
                record.highway = Lookup::Failed(e.to_string());
                return Ok(());
            }
        };

        let name = access.display_name();
        match self.router.route(site.coordinate(), access.coordinate).await {
            Ok(leg) => {
                log.info(format!(
                    "Nearest highway: {}, {:.1} km, {:.0} min",
                    name, leg.distance_km, leg.duration_min
                ));
                record.highway = Lookup::Found(HighwayLeg {
                    name,
                    distance_km: leg.distance_km,
                    duration_min: Some(leg.duration_min),
                });
                Ok(())
            }
            Err(e) => {
                log.error(
                    Step::Highway,
                    format!(
                        "Routing to {} failed ({}); using straight-line distance {:.1} km",
                        name, e, access.straight_km
                    ),
                );
                record.highway = Lookup::Found(HighwayLeg {
                    name,
                    distance_km: crate::geodesy::round_to(access.straight_km, 2),
                    duration_min: None,
                });
                if e.is_fatal() {
                    Err(e)
                } else {
                    Ok(())
                }
            }
        }
    }

    async fn reference_step(
        &mut self,
        site: &Site,
        record: &mut SiteRecord,
        log: &mut SiteLog,
        options: &RunOptions,
    ) -> StepOutcome {
        if !options.include_reference {
            return Ok(());
        }
        let reference = &options.reference;
        match self.router.route(site.coordinate(), reference.coordinate()).await {
            Ok(leg) => {
                record.reference = Lookup::Found(leg);
                Ok(())
            }
            Err(e) => {
                log.error(
                    Step::Reference,
                    format!("Routing to {} failed: {}", reference.name, e),
                );
                record.reference = Lookup::Failed(e.to_string());
                if e.is_fatal() {
                    Err(e)
                } else {
                    Ok(())
                }
            }
        }
    }

    async fn city_step(
        &mut self,
        site: &Site,
        record: &mut SiteRecord,
        log: &mut SiteLog,
        options: &RunOptions,
    ) -> StepOutcome {
        if !options.include_city {
            return Ok(());
        }
        let Some((db, max_km)) = &self.cities else {
            return Ok(());
        };

        let Some((city, _)) = db.nearest(site.coordinate(), *max_km) else {
            log.info(format!("No nearby city found within {}km", max_km.trunc() as i64));
            record.city = Lookup::NotFound;
            return Ok(());
        };
        let (name, population, destination) = (city.name.clone(), city.population, city.coordinate());

        match self.router.route(site.coordinate(), destination).await {
            Ok(leg) => {
                log.info(format!(
                    "Nearest city: {} ({} pop), {:.1} km, {:.0} min",
                    name,
                    thousands(population),
                    leg.distance_km,
                    leg.duration_min
                ));
                record.city = Lookup::Found(CityLeg {
                    name,
                    population: Some(population),
                    route: Some(leg),
                });
                Ok(())
            }
            Err(e) => {
                log.error(Step::City, format!("Routing to {} failed: {}", name, e));
                record.city = Lookup::Found(CityLeg {
                    name,
                    population: Some(population),
                    route: None,
                });
                if e.is_fatal() {
                    Err(e)
                } else {
                    Ok(())
                }
            }
        }
    }

    async fn catchment_step(
        &mut self,
        site: &Site,
        record: &mut SiteRecord,
        log: &mut SiteLog,
        options: &RunOptions,
    ) {
        if !options.include_catchment {
            return;
        }
        let index = self.catalog.index(&self.datasets.nuts3).await;
        let result = self
            .catchment
            .try_aggregate(
                index.as_deref(),
                site.coordinate(),
                options.catchment_radius_km,
                options.stats_year,
            )
            .await;

        record.catchment = match result {
            Ok(catchment) => {
                log.info(format!(
                    "Catchment: {} people in {} regions within {}km ({})",
                    thousands(catchment.total_population.max(0) as u64),
                    catchment.regions.len(),
                    options.radius_label(),
                    catchment.data_year
                ));
                Lookup::Found(catchment)
            }
            Err(e) => {
                log.error(Step::Catchment, e.to_string());
                Lookup::Failed(e.to_string())
            }
        };
    }

    /// Drop every memoized route
    pub fn clear_cache(&mut self) {
        info!("Clearing {} cached routes", self.router.cache().len());
        self.router.clear_cache();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.router.cache().stats()
    }

    /// Forget loaded region datasets and load every configured one again
    pub async fn reload_datasets(&mut self) -> Vec<DatasetSummary> {
        let sources = self.datasets.all();
        self.catalog.reload(&sources).await
    }

    pub fn dataset_status(&self) -> Vec<DatasetSummary> {
        self.catalog.status()
    }

    /// One uncached routing call to check the provider is reachable
    pub async fn test_routing(&self, origin: Coordinate) -> Result<RouteLeg, RoutingError> {
        self.router.check_connection(origin).await
    }
}

/// Store a resolver outcome in its field and log every failed candidate
fn record_resolution(
    step: Step,
    resolution: Resolution,
    field: &mut Lookup<RoutedFacility>,
    log: &mut SiteLog,
) -> StepOutcome {
    for failure in resolution.failures.iter().filter(|f| !f.fatal) {
        log.error(step, format!("Routing to {} failed: {}", failure.name, failure.error));
    }

    *field = match (&resolution.best, resolution.failures.is_empty()) {
        (Some(best), _) => {
            log.info(format!(
                "Nearest {}: {}, {:.1} km, {:.0} min",
                step.label().to_lowercase(),
                best.name,
                best.distance_km,
                best.duration_min
            ));
            Lookup::Found(best.clone())
        }
        (None, true) => Lookup::NotFound,
        (None, false) => Lookup::Failed(format!(
            "all {} routed candidates failed",
            resolution.failures.len()
        )),
    };

    match resolution.aborted {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// `1234567` as `1,234,567`
fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catchment::testing::FakeStatistics;
    use crate::catchment::Indicator;
    use crate::cities::City;
    use crate::error::DatasetError;
    use crate::geocode::AdminAddress;
    use crate::highway::{AccessPoint, LocatorError};
    use crate::models::{LogEntry, RegionArea};
    use crate::pip::{BoundaryProvider, BoundarySource, FieldMapping, RegionBoundary};
    use crate::progress::CollectingObserver;
    use crate::routing::testing::FakeRouter;
    use crate::routing::RouteCache;
    use async_trait::async_trait;
    use geo::{polygon, MultiPolygon};

    struct SquareBoundaries;

    #[async_trait]
    impl BoundaryProvider for SquareBoundaries {
        async fn fetch(&self, source: &BoundarySource) -> Result<Vec<RegionBoundary>, DatasetError> {
            if source.location.contains("missing") {
                return Err(DatasetError::Parse {
                    message: "not found".to_string(),
                });
            }
            let square = polygon![
                (x: 9.5, y: 49.5),
                (x: 10.5, y: 49.5),
                (x: 10.5, y: 50.5),
                (x: 9.5, y: 50.5),
                (x: 9.5, y: 49.5),
            ];
            let code = match source.level {
                RegionLevel::Nuts2 => "DE26",
                RegionLevel::Nuts3 => "DE264",
                _ => "0601",
            };
            Ok(vec![RegionBoundary {
                area: RegionArea::new(code, &source.name, source.level),
                geometry: MultiPolygon(vec![square]),
            }])
        }
    }

    struct FixedHighway(Option<AccessPoint>);

    #[async_trait]
    impl HighwayLocator for FixedHighway {
        async fn nearest_access(
            &self,
            _site: Coordinate,
            _radius_km: f64,
        ) -> Result<Option<AccessPoint>, LocatorError> {
            Ok(self.0.clone())
        }
    }

    struct FixedGeocoder;

    #[async_trait]
    impl ReverseGeocoder for FixedGeocoder {
        async fn reverse(&self, _point: Coordinate) -> Result<AdminAddress, LocatorError> {
            Ok(AdminAddress {
                municipality: RegionEntry::new(Some("Schweinfurt".to_string()), None),
                county: RegionEntry::default(),
                region: RegionEntry::new(Some("Bayern".to_string()), Some("DE-BY".to_string())),
            })
        }
    }

    fn datasets(admin: &[(&str, RegionLevel)]) -> DatasetsConfig {
        DatasetsConfig {
            nuts2: BoundarySource::new("NUTS2", "nuts2", RegionLevel::Nuts2, FieldMapping::nuts()),
            nuts3: BoundarySource::new("NUTS3", "nuts3", RegionLevel::Nuts3, FieldMapping::nuts()),
            admin: admin
                .iter()
                .map(|(loc, level)| BoundarySource::new(loc, loc, *level, FieldMapping::prg()))
                .collect(),
        }
    }

    fn statistics() -> FakeStatistics {
        FakeStatistics::default()
            .with(Indicator::Population, 2023, &[("DE264", 120_000.0)])
            .with(Indicator::Unemployed, 2023, &[("DE264", 3_000.0)])
            .with(Indicator::ActivePopulation, 2023, &[("DE264", 70_000.0)])
    }

    fn pipeline(
        routing: Arc<FakeRouter>,
        admin: &[(&str, RegionLevel)],
        observer: Arc<CollectingObserver>,
    ) -> BatchPipeline {
        let router = Router::new(routing, RouteCache::new(None), observer.clone());
        BatchPipeline::new(
            router,
            RegionCatalog::new(Arc::new(SquareBoundaries)),
            CatchmentAggregator::new(Arc::new(statistics())),
            datasets(admin),
            observer,
        )
    }

    fn site() -> Site {
        Site::new("P-1", "S-1", "Plant", 50.0, 10.0)
    }

    fn airports() -> Vec<Facility> {
        vec![
            Facility::new("Frankfurt Airport", Some("FRA"), 50.0379, 8.5622),
            Facility::new("Nuremberg Airport", Some("NUE"), 49.4987, 11.0780),
        ]
    }

    fn seaports() -> Vec<Facility> {
        vec![Facility::new("Hamburg", Some("DEHAM"), 53.5461, 9.9661)]
    }

    #[tokio::test]
    async fn test_full_site() {
        let routing = Arc::new(FakeRouter::new());
        let observer = Arc::new(CollectingObserver::default());
        let mut pipeline = pipeline(routing.clone(), &[("gminy", RegionLevel::AdminMunicipality)], observer.clone())
            .with_highway(
                Arc::new(FixedHighway(Some(AccessPoint {
                    id: Some(1),
                    coordinate: Coordinate::new(50.05, 10.05),
                    name: None,
                    reference: Some("7".to_string()),
                    highway_type: "motorway_junction".to_string(),
                    straight_km: 6.6,
                }))),
                50.0,
            )
            .with_cities(
                CityDatabase::new(
                    vec![City {
                        name: "Würzburg".to_string(),
                        population: 127_000,
                        latitude: 49.7913,
                        longitude: 9.9534,
                        country: None,
                    }],
                    100_000,
                ),
                200.0,
            );

        let output = pipeline
            .run(&[site()], &airports(), &seaports(), &RunOptions::default())
            .await
            .unwrap();
        let record = &output.records[0];

        assert_eq!(record.municipality.found().unwrap().code.as_deref(), Some("0601"));
        assert_eq!(record.nuts3.found().unwrap().code.as_deref(), Some("DE264"));
        assert!(record.airport.is_found());
        assert_eq!(record.seaport.found().unwrap().name, "Hamburg");
        assert_eq!(record.highway.found().unwrap().name, "Junction 7");
        assert!(record.reference.is_found());
        assert_eq!(record.city.found().unwrap().population, Some(127_000));
        let catchment = record.catchment.found().unwrap();
        assert_eq!(catchment.total_population, 120_000);
        assert_eq!(catchment.employed_persons, 67_000);

        // 2 airports + 1 seaport + highway + reference + city
        assert_eq!(routing.calls(), 6);
        assert_eq!(output.call_count, 7);
        assert!(output.logs[0].errors().next().is_none());
        assert_eq!(observer.messages().last().map(String::as_str), Some("Processed 1/1"));
        assert!(output.logs[0].entries.iter().any(|e| matches!(
            e,
            LogEntry::Info { message } if message.starts_with("Nearest city: Würzburg (127,000 pop)")
        )));
    }

    #[tokio::test]
    async fn test_geocoder_fallback_and_missing_dataset() {
        let routing = Arc::new(FakeRouter::new());
        let observer = Arc::new(CollectingObserver::default());
        let mut pipeline = pipeline(routing, &[("missing-gminy", RegionLevel::AdminMunicipality)], observer)
            .with_geocoder(Arc::new(FixedGeocoder));
        let options = RunOptions {
            include_catchment: false,
            ..Default::default()
        };

        let output = pipeline.run(&[site()], &[], &[], &options).await.unwrap();
        let record = &output.records[0];

        assert_eq!(record.municipality.found().unwrap().name.as_deref(), Some("Schweinfurt"));
        assert_eq!(record.county, Lookup::NotFound);
        assert_eq!(record.region.found().unwrap().code.as_deref(), Some("DE-BY"));
        assert_eq!(record.airport, Lookup::NotFound);
        assert_eq!(record.catchment, Lookup::Pending);
        assert!(output.logs[0]
            .errors()
            .any(|e| matches!(e, LogEntry::Error { message, .. } if message.contains("missing-gminy"))));
    }

    #[tokio::test]
    async fn test_quota_aborts_remaining_steps() {
        let routing = Arc::new(FakeRouter::new());
        let site = site();
        // Nuremberg is the great-circle nearest and routed first
        let airport = airports().remove(1);
        routing.set(site.coordinate(), airport.coordinate(), Err(RoutingError::QuotaExhausted));
        let observer = Arc::new(CollectingObserver::default());
        let mut pipeline = pipeline(routing.clone(), &[], observer);

        let output = pipeline
            .run(&[site], &airports(), &seaports(), &RunOptions::default())
            .await
            .unwrap();
        let record = &output.records[0];

        assert!(record.nuts3.is_found());
        assert!(matches!(record.airport, Lookup::Failed(_)));
        assert_eq!(record.seaport, Lookup::Pending);
        assert_eq!(record.catchment, Lookup::Pending);
        assert_eq!(routing.calls(), 1);
        assert!(matches!(
            output.logs[0].entries.last(),
            Some(LogEntry::Abort { step: Step::Airport, .. })
        ));
    }

    #[tokio::test]
    async fn test_highway_routing_failure_keeps_straight_line() {
        let routing = Arc::new(FakeRouter::new());
        let access = AccessPoint {
            id: None,
            coordinate: Coordinate::new(50.1, 10.1),
            name: Some("Kreuz Schweinfurt".to_string()),
            reference: None,
            highway_type: "motorway_junction".to_string(),
            straight_km: 13.3456,
        };
        routing.set(
            site().coordinate(),
            access.coordinate,
            Err(RoutingError::NoRoute("unreachable".to_string())),
        );
        let observer = Arc::new(CollectingObserver::default());
        let mut pipeline = pipeline(routing, &[], observer)
            .with_highway(Arc::new(FixedHighway(Some(access))), 50.0);

        let output = pipeline
            .run(&[site()], &[], &[], &RunOptions::default())
            .await
            .unwrap();
        let highway = output.records[0].highway.found().unwrap().clone();
        assert_eq!(highway.name, "Kreuz Schweinfurt");
        assert_eq!(highway.distance_km, 13.35);
        assert_eq!(highway.duration_min, None);
        assert!(output.records[0].reference.is_found());
    }

    #[tokio::test]
    async fn test_invalid_site_fails_run() {
        let observer = Arc::new(CollectingObserver::default());
        let mut pipeline = pipeline(Arc::new(FakeRouter::new()), &[], observer.clone());
        let sites = vec![Site::new("P", "S", "Bad", 91.0, 0.0)];
        let result = pipeline.run(&sites, &[], &[], &RunOptions::default()).await;
        assert!(matches!(result, Err(PipelineError::Validation(_))));
        assert!(observer.messages().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_pause_fails_run() {
        let routing = Arc::new(FakeRouter::new());
        let observer = Arc::new(CollectingObserver::default());
        let mut pipeline = pipeline(routing.clone(), &[], observer.clone());
        let options = RunOptions {
            pause_every: 1,
            pause_secs: 1e20,
            ..Default::default()
        };
        let sites = vec![Site::new("P", "S", "Bedburg", 51.0, 6.57)];
        let result = pipeline.run(&sites, &[], &[], &options).await;
        assert!(matches!(result, Err(PipelineError::Validation(_))));
        assert!(observer.messages().is_empty());
        assert_eq!(routing.calls(), 0);
    }

    #[tokio::test]
    async fn test_operator_actions() {
        let routing = Arc::new(FakeRouter::new());
        let observer = Arc::new(CollectingObserver::default());
        let mut pipeline = pipeline(routing.clone(), &[("missing-gminy", RegionLevel::AdminMunicipality)], observer);

        let summaries = pipeline.reload_datasets().await;
        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries.iter().filter(|s| s.ready).count(), 2);
        assert_eq!(pipeline.dataset_status(), summaries);

        pipeline
            .run(&[site()], &airports(), &[], &RunOptions::default())
            .await
            .unwrap();
        assert!(pipeline.cache_stats().entries > 0);
        pipeline.clear_cache();
        assert_eq!(pipeline.cache_stats().entries, 0);

        let before = routing.calls();
        assert!(pipeline.test_routing(site().coordinate()).await.is_ok());
        assert_eq!(routing.calls(), before + 1);
        assert_eq!(pipeline.cache_stats().entries, 0);
    }

    #[test]
    fn test_thousands() {
        assert_eq!(thousands(0), "0");
        assert_eq!(thousands(999), "999");
        assert_eq!(thousands(1000), "1,000");
        assert_eq!(thousands(1_084_831), "1,084,831");
    }
}
