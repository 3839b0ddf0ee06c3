use clap::{Parser, Subcommand};
use skytoast::config::{self, PipelineConfig};
use skytoast::pipeline::{self, PipelineEvent, RunOptions};
use skytoast::toast::ToastBuilder;
use skytoast::{imaging, logging, output, rewrite};
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::thread::JoinHandle;

/// Shared arguments for commands that toast images.
#[derive(clap::Args, Clone)]
struct RunArgs {
    /// Source images (default: `inputs` from the config file)
    inputs: Vec<PathBuf>,

    /// Record per-image failures and continue with the next image
    #[arg(long)]
    keep_going: bool,
}

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "skytoast")]
#[command(about = "Turn equirectangular sky images into published TOAST pyramids")]
#[command(long_about = "\
Turn equirectangular sky images into published TOAST pyramids

Each input is tiled into a WorldWide Telescope TOAST pyramid, described by a
WTML manifest, and moved into the public directory:

  SPHEREx_LinesRB_equirectangular.tif
  └── SPHEREx_LinesRB_toast/
      ├── 0/0/0_0.png            # Root tile
      ├── 1/0/0_0.png ...        # One directory level per pyramid level
      ├── thumb.jpg              # 96×45 preview
      ├── index_rel.wtml         # Manifest with relative URLs
      └── index.wtml             # Manifest with URLs under /SPHEREx_LinesRB_toast/

The '_equirectangular' suffix is stripped from directory names by default,
so this input publishes as SPHEREx_LinesRB_toast/ and no longer as
SPHEREx_LinesRB_equirectangular_toast/. Set [naming] strip_suffix = \"\" to
keep the old directory names and URLs.

Pyramid depth follows the image size: the smallest depth whose deepest level
covers the longer image edge at the configured tile size.

Run 'skytoast gen-config' to generate a documented skytoast.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Publish directory (overrides `public_dir`)
    #[arg(long, global = true)]
    public_dir: Option<PathBuf>,

    /// Directory output is built in (overrides `work_dir`)
    #[arg(long, global = true)]
    work_dir: Option<PathBuf>,

    /// Show debug diagnostics on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Toast every input, rewrite manifests, publish
    Build {
        #[command(flatten)]
        run: RunArgs,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Toast every input and leave the output in the work directory
    Toast(RunArgs),
    /// Publish already-toasted output directories
    Publish {
        /// Output directories (default: those the configured inputs map to)
        dirs: Vec<PathBuf>,
    },
    /// Print the pyramid depth for an image edge length
    Depth {
        /// Longer edge of the source image in pixels
        longest_edge: u32,

        /// Tile edge in pixels (default: `[tiles].size` from the config file)
        #[arg(long)]
        tile_size: Option<u32>,
    },
    /// Print a stock skytoast.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    match &cli.command {
        Command::Build { run, json } => {
            let config = load_config(&cli, &run.inputs)?;
            let options = RunOptions {
                keep_going: run.keep_going,
                publish: true,
            };
            let report = run_pipeline(&config, options, !*json)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                output::print_report(&report);
            }
            check_report(&report)?;
        }
        Command::Toast(run) => {
            let config = load_config(&cli, &run.inputs)?;
            let options = RunOptions {
                keep_going: run.keep_going,
                publish: false,
            };
            let report = run_pipeline(&config, options, true)?;
            output::print_report(&report);
            check_report(&report)?;
        }
        Command::Publish { dirs } => {
            let config = load_config(&cli, &[])?;
            let dirs = if dirs.is_empty() {
                pipeline::plan(&config)?
                    .into_iter()
                    .map(|job| job.output_dir)
                    .collect()
            } else {
                dirs.clone()
            };
            let (tx, printer) = spawn_printer();
            let result = pipeline::publish_dirs(&dirs, config.public_dir(), Some(tx));
            join_printer(printer);
            result?;
        }
        Command::Depth {
            longest_edge,
            tile_size,
        } => {
            let tile_size = match tile_size {
                Some(size) => *size,
                None => load_config(&cli, &[])?.tiles.size,
            };
            if tile_size == 0 {
                return Err("tile size must be positive".into());
            }
            let depth = imaging::toast_depth(*longest_edge, tile_size);
            for line in output::format_depth(*longest_edge, tile_size, depth) {
                println!("{}", line);
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Load the config file and apply command-line overrides.
fn load_config(cli: &Cli, inputs: &[PathBuf]) -> Result<PipelineConfig, config::ConfigError> {
    let mut config = config::load_config(&cli.config)?;
    if !inputs.is_empty() {
        config.inputs = inputs
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
    }
    if let Some(dir) = &cli.public_dir {
        config.public_dir = dir.to_string_lossy().into_owned();
    }
    if let Some(dir) = &cli.work_dir {
        config.work_dir = dir.to_string_lossy().into_owned();
    }
    config.validate()?;
    Ok(config)
}

/// Run the pipeline with the native builder and the configured rewriter.
fn run_pipeline(
    config: &PipelineConfig,
    options: RunOptions,
    show_progress: bool,
) -> Result<pipeline::PipelineReport, Box<dyn std::error::Error>> {
    init_thread_pool(&config.processing);
    let builder = ToastBuilder::new(config.tiles.size)?;
    let rewriter = rewrite::from_config(&config.rewrite);

    let (tx, printer) = if show_progress {
        let (tx, printer) = spawn_printer();
        (Some(tx), Some(printer))
    } else {
        (None, None)
    };
    let result = pipeline::run(config, &builder, rewriter.as_ref(), options, tx);
    if let Some(printer) = printer {
        join_printer(printer);
    }
    Ok(result?)
}

fn spawn_printer() -> (Sender<PipelineEvent>, JoinHandle<()>) {
    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_pipeline_event(&event) {
                println!("{}", line);
            }
        }
    });
    (tx, printer)
}

fn join_printer(printer: JoinHandle<()>) {
    if printer.join().is_err() {
        eprintln!("progress printer panicked");
    }
}

/// Turn per-image failures recorded with `--keep-going` into a failing exit.
fn check_report(report: &pipeline::PipelineReport) -> Result<(), Box<dyn std::error::Error>> {
    match report.failed() {
        0 => Ok(()),
        n => Err(format!("{n} of {} images failed", report.images.len()).into()),
    }
}

/// Initialize the rayon thread pool based on processing config.
///
/// Capped at the number of available CPU cores; the config can lower it, not raise it.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
