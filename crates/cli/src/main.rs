//! VBI Compare CLI - collect volunteered and authoritative bathymetry

mod monitor;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use vbicompare_cloud::{TileDescriptor, TileScheme};
use vbicompare_collect::settings::ScriptFlavor;
use vbicompare_collect::{BatchBuilder, BatchInputs, Reporter, Settings, Sources};
use vbicompare_core::{CollectionRequest, DataSource, ProcessingMode, Region, SearchMethod};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "vbicompare")]
#[command(author, version, about = "Collect volunteered and authoritative bathymetry", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (TOML)
    #[arg(short, long, global = true, env = "VBICOMPARE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect NBS and DCDB data for a chart, vessel or area search
    Collect(CollectArgs),
    /// Build a reputation calculation script from two existing list files
    Batch {
        /// NBS list file
        #[arg(long)]
        nbs_list: PathBuf,
        /// DCDB list file
        #[arg(long)]
        dcdb_list: PathBuf,
        /// Output root; the run directory goes under <output>/reputation_calcs
        #[arg(short, long)]
        output: PathBuf,
        /// Run the script once written
        #[arg(long)]
        run: bool,
        /// Script flavor (overrides the config file)
        #[arg(long, value_enum)]
        flavor: Option<FlavorArg>,
    },
    /// List the BlueTopo tiles a tile-scheme GeoPackage has in an area
    Tiles {
        /// Tile-scheme GeoPackage
        gpkg: PathBuf,
        /// North-west corner, "lat, lon"
        #[arg(long, allow_hyphen_values = true)]
        nw: String,
        /// South-east corner, "lat, lon"
        #[arg(long, allow_hyphen_values = true)]
        se: String,
    },
}

#[derive(Args)]
struct CollectArgs {
    /// Primary data source
    #[arg(long, value_enum, default_value = "nbs")]
    primary: SourceArg,
    /// MCD chart names, comma separated (NBS primary)
    #[arg(long, value_delimiter = ',')]
    charts: Vec<String>,
    /// Vessel (platform) name; repeat for several (DCDB primary)
    #[arg(long)]
    vessel: Vec<String>,
    /// North-west corner "lat, lon"; repeat together with --se for several areas
    #[arg(long, allow_hyphen_values = true)]
    nw: Vec<String>,
    /// South-east corner "lat, lon"
    #[arg(long, allow_hyphen_values = true)]
    se: Vec<String>,
    /// Also collect the other source over the same ground
    #[arg(long)]
    secondary: bool,
    /// cloud: list s3:// URLs, local: download the files
    #[arg(long, value_enum, default_value = "cloud")]
    mode: ModeArg,
    /// Output root folder (no spaces)
    #[arg(short, long, env = "VBICOMPARE_OUTPUT")]
    output: PathBuf,
    /// Run the reputation calculation once both lists are written
    #[arg(long)]
    run_reputation: bool,
    /// Write the chart, tile and track outlines to this GeoJSON file
    #[arg(long)]
    footprints: Option<PathBuf>,
    /// Script flavor (overrides the config file)
    #[arg(long, value_enum)]
    flavor: Option<FlavorArg>,
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceArg {
    Nbs,
    Dcdb,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Cloud,
    Local,
}

#[derive(Clone, Copy, ValueEnum)]
enum FlavorArg {
    Bat,
    Sh,
}

impl From<SourceArg> for DataSource {
    fn from(s: SourceArg) -> Self {
        match s {
            SourceArg::Nbs => DataSource::Nbs,
            SourceArg::Dcdb => DataSource::Dcdb,
        }
    }
}

impl From<ModeArg> for ProcessingMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Cloud => ProcessingMode::Cloud,
            ModeArg::Local => ProcessingMode::Local,
        }
    }
}

impl From<FlavorArg> for ScriptFlavor {
    fn from(f: FlavorArg) -> Self {
        match f {
            FlavorArg::Bat => ScriptFlavor::Bat,
            FlavorArg::Sh => ScriptFlavor::Sh,
        }
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let builder = FmtSubscriber::builder()
        .with_target(false)
        .with_writer(std::io::stderr);

    let installed = if std::env::var_os("RUST_LOG").is_some() {
        tracing::subscriber::set_global_default(builder.with_env_filter(EnvFilter::from_default_env()).finish())
    } else {
        let level = if verbose { Level::DEBUG } else { Level::INFO };
        tracing::subscriber::set_global_default(builder.with_max_level(level).finish())
    };
    installed.context("setting default subscriber failed")
}

fn load_settings(config: Option<&PathBuf>, flavor: Option<FlavorArg>) -> Result<Settings> {
    let mut settings = Settings::load(config.map(PathBuf::as_path)).context("Failed to load config")?;
    if let Some(flavor) = flavor {
        settings.reputation.flavor = flavor.into();
    }
    Ok(settings)
}

/// Turn the arguments into a request, gathering every problem found.
fn build_request(args: &CollectArgs) -> std::result::Result<CollectionRequest, Vec<String>> {
    let mut problems = Vec::new();

    let given = [!args.charts.is_empty(), !args.vessel.is_empty(), !args.nw.is_empty() || !args.se.is_empty()];
    if given.iter().filter(|g| **g).count() > 1 {
        problems.push("Choose one search method: --charts, --vessel or --nw/--se".to_string());
    }

    let search = if !args.charts.is_empty() {
        SearchMethod::Charts(args.charts.clone())
    } else if !args.vessel.is_empty() {
        SearchMethod::Vessels(args.vessel.clone())
    } else {
        if args.nw.len() != args.se.len() {
            problems.push(format!(
                "Each --nw needs a matching --se ({} --nw, {} --se)",
                args.nw.len(),
                args.se.len()
            ));
        }
        let mut regions = Vec::new();
        for (n, (nw, se)) in args.nw.iter().zip(&args.se).enumerate() {
            match Region::from_corners(nw, se) {
                Ok(region) => regions.push(region),
                Err(e) => problems.extend(e.problems().into_iter().map(|p| format!("Area {}: {p}", n + 1))),
            }
        }
        SearchMethod::Area(regions)
    };

    let request = CollectionRequest {
        primary: args.primary.into(),
        search,
        secondary: args.secondary,
        mode: args.mode.into(),
        output_root: args.output.clone(),
        run_reputation: args.run_reputation,
    };

    // an unparsable area would also read as "no area given"
    let area_failed = !problems.is_empty() && matches!(request.search, SearchMethod::Area(ref r) if r.is_empty());
    if let Err(e) = request.validate() {
        problems.extend(
            e.problems()
                .into_iter()
                .filter(|p| !(area_failed && p.starts_with("Area search selected"))),
        );
    }

    if problems.is_empty() {
        Ok(request)
    } else {
        Err(problems)
    }
}

fn collect(args: CollectArgs, config: Option<&PathBuf>) -> Result<()> {
    let request = match build_request(&args) {
        Ok(request) => request,
        Err(problems) => {
            eprintln!("The request has {} problem(s):", problems.len());
            for p in &problems {
                eprintln!("  - {p}");
            }
            bail!("invalid request");
        }
    };

    let settings = load_settings(config, args.flavor)?;
    let sources = Sources::from_settings(&settings).context("Failed to set up data sources")?;

    info!(
        "Collecting {} by {} search into {}",
        request.primary,
        request.search.label(),
        request.output_root.display()
    );
    let start = Instant::now();
    let (handle, events) = vbicompare_collect::spawn(request, settings, sources);
    let footprints = monitor::watch(events)?;
    let outcome = handle
        .join()
        .map_err(|_| anyhow!("collection worker panicked"))?
        .context("Collection failed")?;

    if let Some(path) = &args.footprints {
        footprints.write_geojson(path)?;
        println!("Footprints saved to: {}", path.display());
    }

    let summary = &outcome.summary;
    if let Some(list) = &summary.nbs_list {
        println!("NBS list: {}", list.display());
    }
    if let Some(list) = &summary.dcdb_list {
        println!("DCDB list: {}", list.display());
    }
    if let Some(run) = &outcome.reputation {
        println!("Reputation script: {}", run.script_path.display());
    }
    if summary.cancelled {
        println!("Request cancelled; nothing further collected.");
    }
    println!("  Outlines: {}", footprints.summary());
    println!("  Processing time: {:.2?}", start.elapsed());
    Ok(())
}

fn batch(inputs: BatchInputs, output: PathBuf, run: bool, settings: Settings) -> Result<()> {
    for list in [&inputs.nbs_list, &inputs.dcdb_list] {
        if !list.is_file() {
            bail!("List file not found: {}", list.display());
        }
    }

    let builder = BatchBuilder::new(output, settings.reputation);
    let (tx, rx) = crossbeam_channel::unbounded();
    let handle = std::thread::spawn(move || {
        let mut reporter = Reporter::new(tx);
        let built = builder.build(&inputs, run, &mut reporter);
        if let Err(e) = &built {
            reporter.error(e.to_string());
            reporter.calc_fill();
        }
        reporter.finished();
        built
    });

    monitor::watch(rx)?;
    let prepared = handle
        .join()
        .map_err(|_| anyhow!("batch worker panicked"))?
        .context("Failed to build reputation script")?;
    println!("Reputation script: {}", prepared.script_path.display());
    Ok(())
}

fn tiles(gpkg: PathBuf, nw: &str, se: &str) -> Result<()> {
    let region = Region::from_corners(nw, se).map_err(|e| anyhow!(e.problems().join("; ")))?;
    let scheme = TileScheme::open(&gpkg).context("Failed to open tile scheme")?;
    let mut tiles = Vec::new();
    for part in region.split_at_antimeridian() {
        for tile in scheme.tiles_intersecting(&part.negative_buffer().bbox())? {
            if !tiles.iter().any(|t: &TileDescriptor| t.tile == tile.tile) {
                tiles.push(tile);
            }
        }
    }

    println!("Tile scheme: {} ({})", gpkg.display(), scheme.table_name());
    println!("Area: {region}");
    println!("{} tiles:", tiles.len());
    for tile in &tiles {
        let e = tile.extent;
        println!(
            "  {:<10} ({:.4}, {:.4}) - ({:.4}, {:.4})  {}",
            tile.tile,
            e.min_x,
            e.min_y,
            e.max_x,
            e.max_y,
            tile.geotiff_url.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Collect(args) => collect(args, cli.config.as_ref()),
        Commands::Batch {
            nbs_list,
            dcdb_list,
            output,
            run,
            flavor,
        } => {
            let settings = load_settings(cli.config.as_ref(), flavor)?;
            batch(BatchInputs { nbs_list, dcdb_list }, output, run, settings)
        }
        Commands::Tiles { gpkg, nw, se } => tiles(gpkg, &nw, &se),
    }
}
