//! Hydrocast CLI - rainfall routing and discharge prediction

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use hydrocast_algorithms::hydrology::{travel_time, TravelTimeParams, TravelTimeRaster};
use hydrocast_algorithms::resample::{align_to, check_value_bounds, AlignParams};
use hydrocast_algorithms::terrain::{slowness_field, velocity_field, VelocityParams};
use hydrocast_core::io::{read_geotiff, read_geotiff_from_buffer, write_geotiff, GeoTiffOptions};
use hydrocast_core::Raster;
use hydrocast_forecast::{
    truncate_to_hour, BaselineCorrector, FlowEstimate, FlowRouter, ForecastConfig, Prediction,
};
use hydrocast_rainfall::{AnySource, RainfallCache, RainfallSource};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "hydrocast")]
#[command(author, version, about = "Rainfall routing and river discharge prediction", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Flow velocity (or slowness) from slope and flow accumulation
    Velocity {
        /// Slope raster in degrees
        slope: PathBuf,
        /// Flow accumulation raster (upstream cells)
        accumulation: PathBuf,
        /// Output file
        output: PathBuf,
        /// Write slowness (s/m) instead of velocity (m/s)
        #[arg(long)]
        slowness: bool,
        /// Accumulation at which a pixel becomes a channel
        #[arg(long, default_value = "100")]
        channel_threshold: f64,
    },
    /// Travel time to the outlet from a slowness raster
    TravelTime {
        /// Slowness raster (s/m)
        slowness: PathBuf,
        /// Output file (seconds)
        output: PathBuf,
        /// Outlet cell as 'row,col'
        #[arg(long, value_parser = parse_cell)]
        outlet: (usize, usize),
    },
    /// Resample a raster onto the grid of another
    Align {
        /// Raster to resample
        source: PathBuf,
        /// Raster whose grid is used
        template: PathBuf,
        /// Output file
        output: PathBuf,
        /// Samples per axis when reprojecting
        #[arg(long, default_value = "4")]
        samples: usize,
        /// Fail if any aligned value exceeds this
        #[arg(long)]
        max: Option<f64>,
    },
    /// List rainfall periods the configured source can serve
    Availability {
        /// Only show the most recent N periods
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Fetch rainfall for one period through the cache
    Rainfall {
        /// Period start, hour-aligned (e.g. 2026-01-13T06:00Z)
        #[arg(long, value_parser = parse_time)]
        start: DateTime<Utc>,
        /// Accumulation span in hours
        #[arg(long, default_value = "1")]
        span: u32,
        /// Save the GeoTIFF here instead of printing statistics
        output: Option<PathBuf>,
    },
    /// Inspect or empty the rainfall cache
    Cache {
        #[command(subcommand)]
        action: CacheCommands,
    },
    /// Routed rainfall flow arriving at the outlet
    Estimate {
        /// Arrival time (truncated to the hour)
        #[arg(long, value_parser = parse_time)]
        at: DateTime<Utc>,
        #[command(flatten)]
        routing: RoutingArgs,
        /// Print the full estimate as JSON
        #[arg(long)]
        json: bool,
    },
    /// Baseline-corrected discharge prediction
    Predict {
        /// Prediction time (truncated to the hour); defaults to now
        #[arg(long, value_parser = parse_time)]
        at: Option<DateTime<Utc>>,
        #[command(flatten)]
        routing: RoutingArgs,
        /// Print the full prediction as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// List cached entries, oldest first
    List,
    /// Remove every cached entry
    Clear,
}

/// Overrides for the routing section of the configuration
#[derive(Args)]
struct RoutingArgs {
    /// Travel-time raster (seconds)
    #[arg(long)]
    travel_time: Option<PathBuf>,
    /// Isochrone bin width in hours
    #[arg(long)]
    bin_hours: Option<u32>,
    /// Routing horizon in hours
    #[arg(long)]
    horizon_hours: Option<u32>,
}

impl RoutingArgs {
    fn apply(&self, config: &mut ForecastConfig) {
        if let Some(path) = &self.travel_time {
            config.travel_time_path = path.clone();
        }
        if let Some(h) = self.bin_hours {
            config.routing.bin_hours = h;
        }
        if let Some(h) = self.horizon_hours {
            config.routing.horizon_hours = h;
        }
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool, level: &str) -> Result<()> {
    let level = if verbose {
        Level::DEBUG
    } else {
        level
            .parse::<Level>()
            .with_context(|| format!("Invalid log level: {}", level))?
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Setting default subscriber failed")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn load_config(path: Option<&Path>) -> Result<ForecastConfig> {
    match path {
        Some(p) => ForecastConfig::load(p).context("Failed to load configuration"),
        None => Ok(ForecastConfig::default()),
    }
}

fn read_raster(path: &Path) -> Result<Raster<f64>> {
    let pb = spinner("Reading raster...");
    let raster: Raster<f64> = read_geotiff(path)
        .with_context(|| format!("Failed to read raster {}", path.display()))?;
    pb.finish_and_clear();
    info!("Input: {} x {}", raster.cols(), raster.rows());
    Ok(raster)
}

fn write_result(raster: &Raster<f64>, path: &Path) -> Result<()> {
    let pb = spinner("Writing output...");
    write_geotiff(raster, path, Some(GeoTiffOptions::default())).context("Failed to write output")?;
    pb.finish_and_clear();
    Ok(())
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

fn parse_cell(s: &str) -> std::result::Result<(usize, usize), String> {
    let (row, col) = s
        .split_once(',')
        .ok_or_else(|| format!("Cell must be 'row,col', got: {}", s))?;
    let row = row.trim().parse().map_err(|_| format!("Invalid row: {}", row))?;
    let col = col.trim().parse().map_err(|_| format!("Invalid col: {}", col))?;
    Ok((row, col))
}

/// RFC 3339, or a naive `YYYY-MM-DDTHH[:MM[:SS]]` taken as UTC
fn parse_time(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    let trimmed = s.trim_end_matches('Z');
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(t.and_utc());
        }
    }
    NaiveDateTime::parse_from_str(&format!("{trimmed}:00"), "%Y-%m-%dT%H:%M")
        .map(|t| t.and_utc())
        .map_err(|_| format!("Invalid time: {} (expected e.g. 2026-01-13T06:00Z)", s))
}

async fn open_cache(config: &ForecastConfig) -> Result<RainfallCache<AnySource>> {
    let source = config.rainfall.source().context("Failed to set up rainfall source")?;
    info!("Rainfall source: {}", source.name());
    RainfallCache::new(source, config.cache.options())
        .await
        .with_context(|| format!("Failed to open cache at {}", config.cache.dir.display()))
}

async fn build_router(config: &ForecastConfig) -> Result<FlowRouter<AnySource>> {
    let pb = spinner("Loading travel time...");
    let tt = TravelTimeRaster::from_file(&config.travel_time_path).with_context(|| {
        format!("Failed to read travel time {}", config.travel_time_path.display())
    })?;
    pb.finish_and_clear();
    info!(
        "Travel time: {} x {}, {} watershed cells",
        tt.raster().cols(),
        tt.raster().rows(),
        tt.watershed_cells()
    );

    let cache = open_cache(config).await?;
    FlowRouter::new(Arc::new(cache), Arc::new(tt), config.routing.params())
        .context("Invalid routing parameters")
}

fn print_estimate(estimate: &FlowEstimate) {
    println!("Arrival: {}", estimate.arrival);
    for bin in &estimate.bins {
        println!(
            "  [{:>2}h, {:>2}h)  {}  {:>7} cells  {:>14.1} m3",
            bin.start_hour, bin.end_hour, bin.period, bin.cells, bin.volume_m3
        );
    }
    println!("Total volume: {:.1} m3", estimate.total_volume_m3);
    println!("Routed rate: {:.1} m3/h", estimate.rate_m3h);
}

fn print_prediction(prediction: &Prediction) {
    let obs = &prediction.baseline.observation;
    println!(
        "Observed: {:.2} m3/s at {} (station {}, {})",
        obs.value, prediction.baseline.observed_at, obs.site.code, obs.site.river
    );
    println!("Baseline: {:.1} m3/h", prediction.baseline_m3h);
    println!("Rainfall contribution: {:.1} m3/h", prediction.rainfall_m3h);
    println!("Predicted discharge at {}: {:.2} m3/s", prediction.arrival, prediction.flow_m3s());
}

// ─── Main ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;
    setup_logging(cli.verbose, &config.log_level)?;

    match cli.command {
        // ── Rasters ──────────────────────────────────────────────────
        Commands::Info { input } => {
            let raster = read_raster(&input)?;
            let (rows, cols) = raster.shape();
            let bounds = raster.bounds();
            let stats = raster.statistics();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!("Cell size: {}", raster.cell_size());
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            if let Some(crs) = raster.crs() {
                println!("CRS: {}", crs);
            }
            if let Some(nodata) = raster.nodata() {
                println!("NoData: {}", nodata);
            }
            println!("\nStatistics:");
            if let Some(min) = stats.min {
                println!("  Min: {:.4}", min);
            }
            if let Some(max) = stats.max {
                println!("  Max: {:.4}", max);
            }
            if let Some(mean) = stats.mean {
                println!("  Mean: {:.4}", mean);
            }
            println!(
                "  Valid cells: {} ({:.1}%)",
                stats.valid_count,
                100.0 * stats.valid_count as f64 / raster.len() as f64
            );
        }

        Commands::Velocity {
            slope,
            accumulation,
            output,
            slowness,
            channel_threshold,
        } => {
            let slope = read_raster(&slope)?;
            let accumulation = read_raster(&accumulation)?;
            let params = VelocityParams {
                channel_accumulation: channel_threshold,
                ..Default::default()
            };
            let start = Instant::now();
            let (name, result) = if slowness {
                ("Slowness", slowness_field(&slope, &accumulation, params))
            } else {
                ("Velocity", velocity_field(&slope, &accumulation, params))
            };
            let result = result.context("Failed to compute velocity field")?;
            let elapsed = start.elapsed();
            write_result(&result, &output)?;
            done(name, &output, elapsed);
        }

        Commands::TravelTime {
            slowness,
            output,
            outlet,
        } => {
            let slowness = read_raster(&slowness)?;
            let start = Instant::now();
            let result = travel_time(&slowness, TravelTimeParams { outlet })
                .context("Failed to compute travel time")?;
            let elapsed = start.elapsed();
            write_result(&result, &output)?;
            done("Travel time", &output, elapsed);

            let tt = TravelTimeRaster::new(result).context("Invalid travel time")?;
            if let Some(max) = tt.max_seconds() {
                println!("  Longest travel time: {:.1} h", max / 3600.0);
            }
            println!("  Watershed cells: {}", tt.watershed_cells());
        }

        Commands::Align {
            source,
            template,
            output,
            samples,
            max,
        } => {
            let source = read_raster(&source)?;
            let template = read_raster(&template)?;
            let start = Instant::now();
            let aligned = align_to(&source, &template, AlignParams { samples_per_axis: samples })
                .context("Failed to align raster")?;
            if let Some(max) = max {
                check_value_bounds(&aligned, 0.0, max).context("Aligned values out of bounds")?;
            }
            let elapsed = start.elapsed();
            write_result(&aligned, &output)?;
            done("Aligned raster", &output, elapsed);
        }

        // ── Rainfall ─────────────────────────────────────────────────
        Commands::Availability { limit } => {
            let cache = open_cache(&config).await?;
            let pb = spinner("Listing rainfall...");
            let periods = cache.availability().await.context("Failed to list availability")?;
            pb.finish_and_clear();

            println!("{} periods available from {}", periods.len(), cache.source().name());
            let skip = limit.map_or(0, |n| periods.len().saturating_sub(n));
            for period in periods.iter().skip(skip) {
                println!("  {}  ({} -> {})", period, period.start(), period.end());
            }
        }

        Commands::Rainfall {
            start,
            span,
            output,
        } => {
            let cache = open_cache(&config).await?;
            let pb = spinner("Fetching rainfall...");
            let started = Instant::now();
            let bytes = cache
                .get_at(start, span)
                .await
                .context("Failed to fetch rainfall")?;
            pb.finish_and_clear();

            match output {
                Some(path) => {
                    std::fs::write(&path, &bytes).context("Failed to write output")?;
                    done("Rainfall", &path, started.elapsed());
                }
                None => {
                    let rain: Raster<f64> =
                        read_geotiff_from_buffer(&bytes).context("Failed to decode rainfall")?;
                    let stats = rain.statistics();
                    println!("Rainfall {}h from {}: {} x {}", span, start, rain.cols(), rain.rows());
                    if let (Some(min), Some(max), Some(mean)) = (stats.min, stats.max, stats.mean) {
                        println!("  Min: {:.2} mm  Max: {:.2} mm  Mean: {:.2} mm", min, max, mean);
                    }
                }
            }
        }

        Commands::Cache { action } => {
            let cache = open_cache(&config).await?;
            match action {
                CacheCommands::List => {
                    let entries = cache.entries().await.context("Failed to list cache")?;
                    println!("{} entries in {}", entries.len(), config.cache.dir.display());
                    for entry in entries {
                        println!("  {}  {:>10} bytes  {}", entry.key, entry.size, entry.modified_utc());
                    }
                }
                CacheCommands::Clear => {
                    let removed = cache.clear().await.context("Failed to clear cache")?;
                    println!("Removed {} entries", removed);
                }
            }
        }

        // ── Forecast ─────────────────────────────────────────────────
        Commands::Estimate { at, routing, json } => {
            routing.apply(&mut config);
            let router = build_router(&config).await?;
            let arrival = truncate_to_hour(at)?;

            let pb = spinner("Routing rainfall...");
            let estimate = router.estimate(arrival).await.context("Routing failed")?;
            pb.finish_and_clear();

            if json {
                println!("{}", serde_json::to_string_pretty(&estimate)?);
            } else {
                print_estimate(&estimate);
            }
        }

        Commands::Predict { at, routing, json } => {
            routing.apply(&mut config);
            let router = build_router(&config).await?;
            let client = config.baseline.client().context("Failed to set up hydrometry client")?;
            let corrector = BaselineCorrector::new(router, client, config.baseline.params())
                .context("Invalid baseline parameters")?;
            let arrival = truncate_to_hour(at.unwrap_or_else(Utc::now))?;

            let pb = spinner("Predicting discharge...");
            let prediction = corrector.predict(arrival).await.context("Prediction failed")?;
            pb.finish_and_clear();

            if json {
                println!("{}", serde_json::to_string_pretty(&prediction)?);
            } else {
                print_prediction(&prediction);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_times() {
        let expected = Utc.with_ymd_and_hms(2026, 1, 13, 6, 0, 0).unwrap();
        for s in [
            "2026-01-13T06:00:00Z",
            "2026-01-13T08:00:00+02:00",
            "2026-01-13T06:00:00",
            "2026-01-13T06:00Z",
            "2026-01-13T06",
        ] {
            assert_eq!(parse_time(s).unwrap(), expected, "{s}");
        }
        assert!(parse_time("yesterday").is_err());
    }

    #[test]
    fn parses_cells() {
        assert_eq!(parse_cell("12, 40").unwrap(), (12, 40));
        assert!(parse_cell("12").is_err());
        assert!(parse_cell("a,1").is_err());
    }

    #[test]
    fn routing_overrides() {
        let mut config = ForecastConfig::default();
        RoutingArgs {
            travel_time: Some(PathBuf::from("tt.tif")),
            bin_hours: Some(1),
            horizon_hours: None,
        }
        .apply(&mut config);
        assert_eq!(config.travel_time_path, PathBuf::from("tt.tif"));
        assert_eq!(config.routing.bin_hours, 1);
        assert_eq!(config.routing.horizon_hours, 24);
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
