// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use leadmap_core::backend::{Backend, ClusterQuery, NewTerritory, RecordQuery};
use leadmap_core::config::Config;
use leadmap_core::context;
use leadmap_core::filter::RecordFilter;
use leadmap_core::geo::{LatLng, Region};
use leadmap_core::markers::MarkerLayer;
use leadmap_core::session::{MapEvent, MapSession, MapSurface};
use leadmap_core::territory::{
    parse_wkt_polygon, validate_ring, AcquisitionMode, CountState, Territory, TerritoryId,
    DEFAULT_COLOR,
};
use leadmap_core::viewport::{Camera, CameraTarget};
use leadmap_core::zoom::{bucket_for, DisplayMode};
use log::info;
use serde::Deserialize;
use simplelog::{ColorChoice, LevelFilter, TermLogger, TerminalMode};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to leadmap.json
    #[arg(short, long, env = "LEADMAP_CONFIG")]
    config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the resolution bucket and display mode for a zoom level
    Bucket { zoom: f64 },
    /// Fetch cluster points for a zoom level
    Clusters {
        #[arg(long)]
        zoom: f64,
        /// Viewport as south,west,north,east
        #[arg(long, allow_hyphen_values = true)]
        bounds: Option<Region>,
    },
    /// Fetch individual records inside a region
    Records {
        /// Region as south,west,north,east
        #[arg(long, allow_hyphen_values = true)]
        bounds: Region,
        /// Filter as column:operator:value, repeatable
        #[arg(long = "filter")]
        filters: Vec<RecordFilter>,
    },
    /// Manage territories
    #[command(subcommand)]
    Territories(TerritoryCommands),
    /// Look up the boundary polygon of a zip code
    Zip { code: String },
    /// Replay a JSON script of map events against the backend
    Replay { script: PathBuf },
    /// Print the effective configuration
    Config {
        /// Write the configuration (without credentials) to the config path
        #[arg(long)]
        write: bool,
    },
}

#[derive(Subcommand)]
enum TerritoryCommands {
    /// List stored territories
    List {
        /// Case-insensitive name filter
        #[arg(long)]
        name: Option<String>,
    },
    /// Save a polygon given as "lat,lng;lat,lng;..."
    Save {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = DEFAULT_COLOR)]
        color: String,
        #[arg(long, allow_hyphen_values = true)]
        vertices: String,
    },
    /// Delete a territory by id
    Delete { id: String },
    /// Count records inside a stored territory
    Count { id: String },
}

/// One step of a replay script.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum Step {
    Camera {
        zoom: f64,
        bounds: Region,
    },
    Filters {
        filters: Vec<String>,
    },
    Draw {
        vertices: Vec<LatLng>,
    },
    Zip {
        code: String,
    },
    Submit {
        name: String,
        #[serde(default = "default_color")]
        color: String,
    },
    Select {
        id: String,
    },
    Delete {
        id: String,
    },
    Assign {
        owner: String,
    },
    Wait {
        ms: u64,
    },
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

impl Step {
    fn into_event(self) -> Result<Option<MapEvent>> {
        let event = match self {
            Step::Camera { zoom, bounds } => MapEvent::Idle(Camera::new(zoom, bounds)),
            Step::Filters { filters } => MapEvent::ApplyFilters(
                filters
                    .iter()
                    .map(|f| f.parse::<RecordFilter>())
                    .collect::<Result<_, _>>()?,
            ),
            Step::Draw { vertices } => MapEvent::DrawCompleted(vertices),
            Step::Zip { code } => MapEvent::SearchZip(code),
            Step::Submit { name, color } => MapEvent::SubmitTerritory { name, color },
            Step::Select { id } => MapEvent::SelectTerritory(TerritoryId::Stored(id)),
            Step::Delete { id } => MapEvent::DeleteTerritory(TerritoryId::Stored(id)),
            Step::Assign { owner } => MapEvent::AssignCandidate { owner },
            Step::Wait { .. } => return Ok(None),
        };
        Ok(Some(event))
    }
}

/// Prints what a map widget would draw.
struct ConsoleSurface;

impl MapSurface for ConsoleSurface {
    fn render_markers(&mut self, markers: &MarkerLayer) {
        println!(
            "markers: {} clusters, {} records",
            markers.cluster_count(),
            markers.record_count()
        );
    }

    fn render_territories(&mut self, territories: &[Territory]) {
        println!("territories: {}", territories.len());
    }

    fn render_candidate(&mut self, ring: &[LatLng]) {
        if !ring.is_empty() {
            println!("candidate polygon: {} vertices", ring.len());
        }
    }

    fn show_banner(&mut self, message: &str) {
        println!("! {}", message);
    }

    fn fit_bounds(&mut self, bounds: &Region) {
        println!("fit map to {}", bounds);
    }

    fn move_camera(&mut self, target: &CameraTarget) {
        println!(
            "move camera to {},{} zoom {}",
            target.center.lat, target.center.lng, target.zoom
        );
    }

    fn show_count(&mut self, id: &TerritoryId, state: &CountState) {
        match state {
            CountState::Loading => println!("territory {}: counting...", id),
            CountState::Loaded(n) => println!("territory {}: {} records", id, n),
            CountState::Failed => println!("territory {}: count failed", id),
        }
    }
}

fn parse_vertices(raw: &str) -> Result<Vec<LatLng>> {
    raw.split(';')
        .filter(|pair| !pair.trim().is_empty())
        .map(|pair| {
            let (lat, lng) = pair
                .split_once(',')
                .ok_or_else(|| anyhow!("vertex '{}' must be lat,lng", pair))?;
            Ok(LatLng::new(lat.trim().parse()?, lng.trim().parse()?))
        })
        .collect()
}

fn print_territory(t: &Territory) {
    let created = t
        .created_at
        .map(|at| at.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string());
    println!("{:>8}  {:<30} {}  {:>3} vertices  {}", t.id, t.name, t.color, t.ring.len(), created);
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    TermLogger::init(
        level,
        simplelog::Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )?;

    let config = Config::load(cli.config.as_deref())?;

    if let Commands::Config { write } = &cli.command {
        if *write {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            config.save(&path)?;
            println!("Wrote {}", path.display());
        }
        let mut shown = config.clone();
        if shown.backend.api_key.is_some() {
            shown.backend.api_key = Some("***".to_string());
        }
        println!("{}", serde_json::to_string_pretty(&shown)?);
        return Ok(());
    }

    if let Commands::Bucket { zoom } = &cli.command {
        let mode = match DisplayMode::for_zoom(*zoom, config.viewport.display_threshold) {
            DisplayMode::Clustered => "clustered",
            DisplayMode::Individual => "individual records",
        };
        println!("zoom {} -> bucket {} ({})", zoom, bucket_for(*zoom), mode);
        return Ok(());
    }

    let ctx = context::init(config)?;
    let backend = ctx.backend()?;
    info!("Using backend — url={}", ctx.config.backend.base_url);

    match cli.command {
        Commands::Clusters { zoom, bounds } => {
            let bucket = bucket_for(zoom);
            let query = ClusterQuery {
                bucket,
                bounds: if bucket.is_global() { None } else { bounds },
            };
            let points = backend.fetch_clusters(&query).await?;
            println!("{} clusters at bucket {}", points.len(), bucket);
            for p in &points {
                println!("{:>10.5} {:>11.5} {:>8}", p.latitude, p.longitude, p.count);
            }
        }
        Commands::Records { bounds, filters } => {
            let records = backend
                .fetch_records(&RecordQuery {
                    region: bounds,
                    filters,
                })
                .await?;
            println!("{} records", records.len());
            for r in &records {
                println!(
                    "{:>8} {:>10.5} {:>11.5} status={} owner={}",
                    r.id,
                    r.latitude,
                    r.longitude,
                    r.status,
                    r.assigned_owner.as_deref().unwrap_or("-")
                );
            }
        }
        Commands::Territories(TerritoryCommands::List { name }) => {
            let territories = backend.list_territories().await?;
            let query = name.unwrap_or_default().to_lowercase();
            for t in territories
                .iter()
                .filter(|t| t.name.to_lowercase().contains(&query))
            {
                print_territory(t);
            }
        }
        Commands::Territories(TerritoryCommands::Save {
            name,
            color,
            vertices,
        }) => {
            let ring = validate_ring(&parse_vertices(&vertices)?)?;
            let stored = backend
                .save_territory(&NewTerritory {
                    name,
                    color,
                    coordinates: ring,
                    zip_code: None,
                })
                .await?;
            print_territory(&stored);
        }
        Commands::Territories(TerritoryCommands::Delete { id }) => {
            backend.delete_territory(&TerritoryId::Stored(id.clone())).await?;
            println!("Deleted territory {}", id);
        }
        Commands::Territories(TerritoryCommands::Count { id }) => {
            let territories = backend.list_territories().await?;
            let territory = territories
                .iter()
                .find(|t| t.id == TerritoryId::Stored(id.clone()))
                .ok_or_else(|| anyhow!("No territory with id {}", id))?;
            let total = backend.territory_record_count(&territory.ring).await?;
            println!("{}: {} records", territory.name, total);
        }
        Commands::Zip { code } => {
            let wkt = backend.postal_boundary(code.trim()).await?;
            let ring = parse_wkt_polygon(&wkt)?;
            println!("zip {}: {} vertices", code.trim(), ring.len());
            if let Some(bounds) = Region::bounding(&ring) {
                println!("bounds {}", bounds);
            }
        }
        Commands::Replay { script } => {
            let raw = std::fs::read_to_string(&script)
                .with_context(|| format!("reading {}", script.display()))?;
            let steps: Vec<Step> = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", script.display()))?;
            replay(backend, steps, &ctx.config).await?;
        }
        Commands::Bucket { .. } | Commands::Config { .. } => {}
    }

    Ok(())
}

async fn replay<B: Backend + 'static>(backend: B, steps: Vec<Step>, config: &Config) -> Result<()> {
    let mut session = MapSession::new(backend, ConsoleSurface, config.viewport.clone());
    let mut events = Vec::with_capacity(steps.len() + 2);
    events.push((MapEvent::LoadTerritories, Duration::ZERO));
    for step in steps {
        match step {
            Step::Wait { ms } => {
                if let Some(last) = events.last_mut() {
                    last.1 += Duration::from_millis(ms);
                }
            }
            Step::Zip { .. } => {
                events.push((MapEvent::StartTerritory(AcquisitionMode::Zip), Duration::ZERO));
                if let Some(event) = step.into_event()? {
                    events.push((event, Duration::ZERO));
                }
            }
            step => {
                if let Some(event) = step.into_event()? {
                    events.push((event, Duration::ZERO));
                }
            }
        }
    }

    let (tx, rx) = mpsc::channel(events.len().max(1));
    let feeder = async move {
        for (event, pause) in events {
            if tx.send(event).await.is_err() {
                break;
            }
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        }
    };
    tokio::join!(session.run(rx), feeder);

    let stats = session.stats();
    println!(
        "replay finished: {} evaluations, {} cluster fetches, {} record fetches, {} stale",
        stats.evaluations, stats.cluster_fetches, stats.record_fetches, stats.stale_discarded
    );
    Ok(())
}
