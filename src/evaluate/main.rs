//! Batch site evaluation from CSV inputs.
//!
//! Reads Sites, Airports and Seaports tables, runs every enrichment step,
//! and writes the results table plus per-site logs.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use roadscout::discord::DiscordWebhook;
use roadscout::export::{write_logs, write_results, write_site_selection, write_templates};
use roadscout::models::FacilityKind;
use roadscout::pipeline::{read_facilities, read_sites};
use roadscout::progress::{BarObserver, TracingObserver};
use roadscout::{Config, ResultSchema};

#[derive(Parser, Debug)]
#[command(name = "evaluate")]
#[command(about = "Evaluate candidate sites against transport and labor-market data")]
struct Args {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Sites CSV (Project ID, Site ID, Site Name, Latitude, Longitude)
    #[arg(long)]
    sites: Option<PathBuf>,

    /// Airports CSV (Airport Name, IATA/ICAO, Latitude, Longitude)
    #[arg(long)]
    airports: Option<PathBuf>,

    /// Seaports CSV (Seaport Name, UNLOCODE, Latitude, Longitude)
    #[arg(long)]
    seaports: Option<PathBuf>,

    /// Results CSV
    #[arg(short, long, default_value = "results.csv")]
    output: PathBuf,

    /// Per-site processing logs as JSON
    #[arg(long, default_value = "logs.json")]
    logs: PathBuf,

    /// Also write the Site Selection long format
    #[arg(long)]
    site_selection: Option<PathBuf>,

    /// Write example input files into this directory and exit
    #[arg(long)]
    write_templates: Option<PathBuf>,

    /// Route once from the reference location and exit
    #[arg(long)]
    test_routing: bool,

    /// Candidates routed per facility kind
    #[arg(long)]
    top_n: Option<usize>,

    /// Pause after every N provider calls (0 disables)
    #[arg(long)]
    pause_every: Option<u32>,

    /// Pause length in seconds
    #[arg(long)]
    pause_secs: Option<f64>,

    /// Catchment radius in km
    #[arg(long)]
    radius_km: Option<f64>,

    /// Statistics year
    #[arg(long)]
    stats_year: Option<i32>,

    /// City database CSV (name, population, latitude, longitude)
    #[arg(long)]
    cities: Option<PathBuf>,

    #[arg(long)]
    no_highway: bool,

    #[arg(long)]
    no_reference: bool,

    #[arg(long)]
    no_city: bool,

    #[arg(long)]
    no_catchment: bool,

    #[arg(long)]
    no_nuts: bool,

    /// Skip the reverse-geocoding fallback for admin units
    #[arg(long)]
    no_osm_admin: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        let run = &mut config.run;
        if let Some(n) = self.top_n {
            run.top_n = n;
        }
        if let Some(every) = self.pause_every {
            run.pause_every = every;
        }
        if let Some(secs) = self.pause_secs {
            run.pause_secs = secs;
        }
        if let Some(radius) = self.radius_km {
            run.catchment_radius_km = radius;
        }
        if let Some(year) = self.stats_year {
            run.stats_year = year;
        }
        run.include_highway &= !self.no_highway;
        run.include_reference &= !self.no_reference;
        run.include_city &= !self.no_city;
        run.include_catchment &= !self.no_catchment;
        run.enrich_nuts &= !self.no_nuts;
        run.enrich_osm_admin &= !self.no_osm_admin;

        if let Some(path) = &self.cities {
            config.cities.path = Some(path.clone());
        }
    }
}

fn open(path: &Option<PathBuf>, flag: &str) -> Result<File> {
    let path = path
        .as_ref()
        .with_context(|| format!("--{} is required", flag))?;
    File::open(path).with_context(|| format!("Failed to open {}", path.display()))
}

fn file_label(path: &Option<PathBuf>) -> String {
    path.as_deref()
        .and_then(Path::file_name)
        .and_then(|n| n.to_str())
        .unwrap_or("sites")
        .to_string()
}

/// Notifications never fail a run; a failed send is logged and reported as `false`
fn notification_sent(result: Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!("Discord notification failed: {}", e);
            false
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    if let Some(dir) = &args.write_templates {
        for path in write_templates(dir)? {
            println!("{}", path.display());
        }
        return Ok(());
    }

    let mut config = Config::load_or_default(args.config.as_deref())?;
    args.apply(&mut config);
    let options = config.run.clone();

    let mut pipeline = config.build_pipeline(Arc::new(TracingObserver))?;

    if args.test_routing {
        let origin = options.reference.coordinate();
        info!("Testing routing from {} ({})", options.reference.name, origin);
        match pipeline.test_routing(origin).await {
            Ok(leg) => {
                println!(
                    "Routing OK: {:.1} km, {:.0} min",
                    leg.distance_km, leg.duration_min
                );
                return Ok(());
            }
            Err(e) => anyhow::bail!("Routing test failed: {}", e),
        }
    }

    let sites = read_sites(open(&args.sites, "sites")?)?;
    let airports = read_facilities(FacilityKind::Airport, open(&args.airports, "airports")?)?;
    let seaports = read_facilities(FacilityKind::Seaport, open(&args.seaports, "seaports")?)?;
    info!(
        "Loaded {} sites, {} airports, {} seaports",
        sites.len(),
        airports.len(),
        seaports.len()
    );

    let discord = match &config.notifications.discord_webhook {
        Some(url) => Some(DiscordWebhook::new(
            url.clone(),
            config.http.client(config.http.routing_timeout_secs)?,
        )),
        None => None,
    };
    if let Some(ref dw) = discord {
        notification_sent(dw.run_started(&file_label(&args.sites), sites.len()).await);
    }

    let bar = Arc::new(BarObserver::new(sites.len() as u64));
    pipeline.set_observer(bar.clone());

    let output = match pipeline.run(&sites, &airports, &seaports, &options).await {
        Ok(output) => output,
        Err(e) => {
            error!("Run failed: {}", e);
            if let Some(ref dw) = discord {
                notification_sent(dw.run_failed(&e.to_string()).await);
            }
            return Err(e.into());
        }
    };
    bar.finish();

    let schema = ResultSchema::for_options(&options);
    write_results(&args.output, &schema, &output.records)?;
    write_logs(&args.logs, &output.logs)?;
    if let Some(path) = &args.site_selection {
        let file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        write_site_selection(file, &output.records, &options.reference.name)
            .context("Failed to write Site Selection CSV")?;
        info!("Wrote Site Selection format to {}", path.display());
    }

    let with_errors = output
        .logs
        .iter()
        .filter(|log| log.errors().next().is_some())
        .count();
    info!(
        "Done: {} sites ({} with errors), {} provider calls",
        output.records.len(),
        with_errors,
        output.call_count
    );

    if let Some(ref dw) = discord {
        notification_sent(dw.run_finished(&output).await);
    }

    Ok(())
}
