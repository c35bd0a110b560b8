use clap::{Parser, Subcommand, ValueEnum};
use qrde::logger::init_tracing;
use qrde::tools::{StageTally, bench_limit_from_env, dataset_iter, dataset_root_from_env, smoke_from_env};
use qrde::{AppConfig, ConfigError, Image, ModelArtifacts, Pipeline, Reply, ReplyStyle};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::{debug, error};

#[derive(Parser)]
#[command(name = "qrtool", version, about = "qrde CLI tools")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum StyleArg {
    Plain,
    Forward,
}

impl From<StyleArg> for ReplyStyle {
    fn from(style: StyleArg) -> Self {
        match style {
            StyleArg::Plain => ReplyStyle::Plain,
            StyleArg::Forward => ReplyStyle::Forward,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Decode one image and print the reply a chat user would see
    Decode {
        #[arg(long)]
        image: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        /// Directory with the detector model files
        #[arg(long)]
        models: Option<PathBuf>,
        #[arg(long, value_enum)]
        style: Option<StyleArg>,
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Print the configured cascade
    Stages {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Validate the four detector model files
    CheckModels {
        #[arg(long)]
        models: PathBuf,
    },
    /// Run the cascade over a dataset and report per-stage hits
    ReadingRate {
        #[arg(long)]
        root: Option<PathBuf>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        smoke: bool,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        models: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let outcome = match cli.command {
        Command::Decode {
            image,
            config,
            models,
            style,
            timeout_ms,
        } => decode_cmd(&image, config.as_deref(), models, style, timeout_ms),
        Command::Stages { config } => stages_cmd(config.as_deref()),
        Command::CheckModels { models } => check_models_cmd(&models),
        Command::ReadingRate {
            root,
            limit,
            smoke,
            config,
            models,
        } => reading_rate_cmd(root, limit, smoke, config.as_deref(), models),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "qrtool failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&Path>, models: Option<PathBuf>) -> Result<AppConfig, ConfigError> {
    let mut config = match path {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    }
    .apply_env();
    if let Some(dir) = models {
        config.models_dir = Some(dir);
        config.models = None;
    }
    Ok(config)
}

fn decode_cmd(
    image: &Path,
    config: Option<&Path>,
    models: Option<PathBuf>,
    style: Option<StyleArg>,
    timeout_ms: Option<u64>,
) -> Result<(), ConfigError> {
    let config = load_config(config, models)?;
    let style = style.map(ReplyStyle::from).unwrap_or(config.reply_style);
    let service = config.build_service()?;

    let reply = match std::fs::read(image) {
        Ok(bytes) => {
            let ticket = service.submit(bytes);
            let outcome = match timeout_ms {
                Some(ms) => ticket.wait_timeout(Duration::from_millis(ms)),
                None => ticket.wait(),
            };
            match &outcome {
                Ok(result) => debug!(stage = ?result.stage(), attempts = result.attempts, "decode finished"),
                Err(err) => debug!(error = %err, "decode failed"),
            }
            Reply::for_outcome(&outcome, style)
        }
        Err(err) => {
            debug!(path = %image.display(), error = %err, "cannot read image file");
            Reply::missing_image()
        }
    };

    println!("{reply}");
    Ok(())
}

fn print_cascade(pipeline: &Pipeline) {
    for (i, stage) in pipeline.stages().iter().enumerate() {
        let chain: Vec<String> = stage.chain().iter().map(|t| t.to_string()).collect();
        let chain = if chain.is_empty() {
            "identity".to_string()
        } else {
            chain.join(" -> ")
        };
        println!(
            "  {}. {:<14} source={:<9} backend={:<8} {}",
            i + 1,
            stage.name(),
            stage.input(),
            stage.backend_name(),
            chain
        );
    }
    match pipeline.fallback() {
        Some(fallback) => println!(
            "  *  {:<14} source=last      backend={}",
            fallback.name(),
            fallback.backend_name()
        ),
        None => println!("  (no fallback)"),
    }
}

fn stages_cmd(config: Option<&Path>) -> Result<(), ConfigError> {
    let config = load_config(config, None)?;
    let pipeline = config.build_pipeline()?;
    println!("Decode cascade:");
    print_cascade(&pipeline);
    Ok(())
}

fn check_models_cmd(models: &Path) -> Result<(), ConfigError> {
    let artifacts = ModelArtifacts::from_dir(models);
    artifacts.validate()?;
    for (kind, path) in artifacts.entries() {
        println!("  ok  {kind:<30} {}", path.display());
    }
    Ok(())
}

fn reading_rate_cmd(
    root: Option<PathBuf>,
    limit: Option<usize>,
    smoke: bool,
    config: Option<&Path>,
    models: Option<PathBuf>,
) -> Result<(), ConfigError> {
    let root = root.unwrap_or_else(dataset_root_from_env);
    let limit = limit.or_else(bench_limit_from_env);
    let smoke = smoke || smoke_from_env();

    if !root.exists() {
        eprintln!("Dataset root not found: {}", root.display());
        return Ok(());
    }

    let images: Vec<PathBuf> = dataset_iter(&root, limit, smoke).collect();
    if images.is_empty() {
        println!("No images found under {}", root.display());
        return Ok(());
    }

    let pipeline = load_config(config, models)?.build_pipeline()?;
    let mut tally = StageTally::default();
    let mut total_elapsed = Duration::default();

    for (i, path) in images.iter().enumerate() {
        let image = match Image::open(path) {
            Ok(image) => image,
            Err(err) => {
                println!("  [{}] {} -> unreadable ({err})", i + 1, path.display());
                tally.record_rejected();
                continue;
            }
        };

        let start = Instant::now();
        let result = pipeline.run(&image);
        let elapsed = start.elapsed();
        total_elapsed += elapsed;

        println!(
            "  [{}] {} -> {} ({:.2?})",
            i + 1,
            path.display(),
            result.stage().unwrap_or("miss"),
            elapsed
        );
        tally.record(&result);
    }

    println!("\n{tally}");
    println!("Total time: {total_elapsed:.2?}");
    Ok(())
}
