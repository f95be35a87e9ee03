use clap::{Parser, Subcommand};
use picserve::config::{self, Overrides, ServiceConfig};
use picserve::imaging::{ResizeMode, RustTransformer, TransformParams, parse_size};
use picserve::service::ImageService;
use picserve::store::{DiskStore, ImageStore};
use picserve::{output, server};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

#[derive(Parser)]
#[command(name = "picserve")]
#[command(about = "Serve random photos, resized and filtered on demand")]
#[command(long_about = "\
Serve random photos, resized and filtered on demand

Every request gets a random image from the image directory, rendered to
the requested size as JPEG:

  GET /400                  400 wide, height from the aspect ratio
  GET /400/300              fit inside 400x300
  GET /400/300?resizemode=fill&grayscale=true&blur=2

Resize modes:
  fit    scale to fit inside the box, keeping the aspect ratio (default)
  fill   scale to cover the box, then crop from the center
  none   stretch to exactly the box

With a cache directory every rendition is stored once and served from
disk afterwards.

Run 'picserve gen-config' to generate a documented config file.")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct GlobalArgs {
    /// Config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory of source images
    #[arg(long, global = true)]
    image_dir: Option<PathBuf>,

    /// Directory for cached renditions (empty string disables caching)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Log level: off, error, warn, info, debug, trace
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(clap::Args)]
struct ServeArgs {
    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// TLS certificate (PEM)
    #[arg(long)]
    cert_file: Option<PathBuf>,

    /// TLS private key (PEM)
    #[arg(long)]
    cert_key_file: Option<PathBuf>,
}

#[derive(clap::Args)]
struct RenderArgs {
    /// Image key, relative to the image directory
    key: String,

    width: u32,

    /// Omit to derive from the aspect ratio
    height: Option<u32>,

    #[arg(long, default_value_t = 0.0)]
    blur: f64,

    #[arg(long)]
    grayscale: bool,

    /// none, fill or fit
    #[arg(long, default_value = "fit")]
    resize_mode: ResizeMode,

    /// Output file
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(clap::Args)]
struct WarmArgs {
    /// Comma-separated sizes, WIDTH or WIDTHxHEIGHT (e.g. 200,400x300)
    #[arg(long, value_delimiter = ',', required = true, value_parser = parse_size)]
    sizes: Vec<(u32, u32)>,

    /// none, fill or fit
    #[arg(long, default_value = "fit")]
    resize_mode: ResizeMode,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service
    Serve(ServeArgs),
    /// Validate the config and list the images that would be served
    Check,
    /// Render a single image to a file
    Render(RenderArgs),
    /// Pre-render every image at the given sizes into the cache
    Warm(WarmArgs),
    /// Delete every cached rendition
    ClearCache,
    /// Print a stock config file with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let Cli { global, command } = Cli::parse();
    let overrides = overrides(&global, &command);

    match command {
        Command::Serve(_) => {
            let config = load(&global, &overrides)?;
            let service = Arc::new(ImageService::from_config(&config)?);
            if service.store().is_empty() {
                warn!(
                    directory = %config.image_dir.display(),
                    "No images found; requests will fail until images are added"
                );
            }
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(server::serve(service, &config))?;
        }
        Command::Check => {
            let config = load(&global, &overrides)?;
            let service = ImageService::from_config(&config)?;
            let mut keys = service.store().keys();
            keys.sort();
            output::print_inventory(&config.image_dir, &keys);
            if keys.is_empty() {
                return Err(format!("no images found in {}", config.image_dir.display()).into());
            }
            println!("==> Configuration is valid");
        }
        Command::Render(args) => {
            let config = load(&global, &overrides)?;
            let service = ImageService::from_config(&config)?;
            let params = TransformParams::new(args.width, args.height.unwrap_or(0))
                .with_blur(args.blur)
                .with_grayscale(args.grayscale)
                .with_resize_mode(args.resize_mode);
            let bytes = service.serve(&args.key, &params)?;
            std::fs::write(&args.output, &bytes)?;
            println!("Wrote {} ({} bytes)", args.output.display(), bytes.len());
        }
        Command::Warm(args) => {
            let config = load(&global, &overrides)?;
            require_cache(&config)?;
            init_thread_pool(&config.processing);
            let service = ImageService::from_config(&config)?;
            let outcomes = service.warm(&args.sizes, args.resize_mode);
            output::print_warm_summary(&outcomes);
            output::print_stats(&service.stats());
        }
        Command::ClearCache => {
            let config = load(&global, &overrides)?;
            require_cache(&config)?;
            let cache = DiskStore::open(&config.cache_dir, Arc::new(RustTransformer::new()))?;
            let count = cache.count();
            cache.clear()?;
            println!(
                "Removed {} cached renditions from {}",
                count,
                config.cache_dir.display()
            );
        }
        Command::GenConfig => print!("{}", config::stock_config_toml()),
    }

    Ok(())
}

/// Resolve the config, install logging and create the working directories.
fn load(
    global: &GlobalArgs,
    overrides: &Overrides,
) -> Result<ServiceConfig, Box<dyn std::error::Error>> {
    let config = config::load_config(global.config.as_deref(), overrides)?;
    init_tracing(&config.log_level);
    config.prepare_directories()?;
    Ok(config)
}

/// Command-line values that override the config file.
fn overrides(global: &GlobalArgs, command: &Command) -> Overrides {
    let mut overrides = Overrides {
        image_dir: global.image_dir.clone(),
        cache_dir: global.cache_dir.clone(),
        log_level: global.log_level.clone(),
        ..Overrides::default()
    };
    if let Command::Serve(args) = command {
        overrides.port = args.port;
        overrides.cert_file = args.cert_file.clone();
        overrides.cert_key_file = args.cert_key_file.clone();
    }
    overrides
}

fn require_cache(config: &ServiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.cache_enabled() {
        Ok(())
    } else {
        Err("no cache directory configured (set cache_dir or pass --cache-dir)".into())
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level. Logs go to stderr so command output stays clean.
fn init_tracing(level: &str) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_ascii_lowercase()));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; the user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
