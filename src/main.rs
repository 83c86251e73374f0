//! ferrite-style command line
//!
//! Run with:
//!   cargo run --release -- --content photo.jpg --style painting.jpg \
//!       --weights vgg19.safetensors --output out.png
//!
//! The weights file must hold the VGG-19 `features.{i}.weight` / `.bias`
//! tensors in f32. `--random-weights SEED` skips the checkpoint entirely,
//! which is only useful for smoke tests.
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, ValueHint};
use tracing::{error, info};

use ferrite_style::{
    imaging::{load_image, save_image},
    logging::init_tracing,
    vgg19_features, CompositeInit, FeatureExtractor, ImageShape, Result, StyleConfig,
    StyleTransfer,
};

#[derive(Parser)]
#[command(author, version, about = "Neural style transfer on a VGG-19 feature stack")]
struct Cli {
    /// Image whose structure is preserved
    #[arg(long, value_hint = ValueHint::FilePath)]
    content: PathBuf,

    /// Image whose texture and colours are imposed
    #[arg(long, value_hint = ValueHint::FilePath)]
    style: PathBuf,

    /// Where the stylized image is written
    #[arg(long, short, value_hint = ValueHint::FilePath)]
    output: PathBuf,

    #[command(flatten)]
    network: NetworkArgs,

    /// JSON run configuration; flags below override its fields
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Output size as HEIGHTxWIDTH
    #[arg(long)]
    shape: Option<ImageShape>,

    /// Train at this smaller HEIGHTxWIDTH first and upsample the result as the seed
    #[arg(long)]
    warmup: Option<ImageShape>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    lr: Option<f32>,

    /// Start from seeded noise instead of the content image
    #[arg(long)]
    noise_seed: Option<u64>,

    /// Directory for periodic snapshots
    #[arg(long, value_hint = ValueHint::DirPath)]
    snapshots: Option<PathBuf>,

    /// Write the effective configuration as JSON and continue
    #[arg(long, value_hint = ValueHint::FilePath)]
    dump_config: Option<PathBuf>,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct NetworkArgs {
    /// VGG-19 weights in safetensors format
    #[arg(long, value_hint = ValueHint::FilePath)]
    weights: Option<PathBuf>,

    /// A feature stack saved as JSON by this crate
    #[arg(long, value_hint = ValueHint::FilePath)]
    network: Option<PathBuf>,

    /// Seeded random VGG-19 weights
    #[arg(long)]
    random_weights: Option<u64>,
}

fn build_config(cli: &Cli) -> Result<StyleConfig> {
    let mut config = match &cli.config {
        Some(path) => StyleConfig::load_json(path)?,
        None => StyleConfig::default(),
    };
    if let Some(shape) = cli.shape {
        config.image_shape = shape;
    }
    if cli.warmup.is_some() {
        config.warmup_shape = cli.warmup;
    }
    if let Some(epochs) = cli.epochs {
        config.num_epochs = epochs;
    }
    if let Some(lr) = cli.lr {
        config.learning_rate = lr;
    }
    if let Some(seed) = cli.noise_seed {
        config.init = CompositeInit::Noise { seed };
    }
    config.validate()?;
    Ok(config)
}

fn load_network(args: &NetworkArgs) -> Result<FeatureExtractor> {
    let specs = vgg19_features();
    match (&args.weights, &args.network, args.random_weights) {
        (Some(path), _, _) => FeatureExtractor::load_safetensors(path, &specs),
        (_, Some(path), _) => FeatureExtractor::load_json(path),
        (_, _, Some(seed)) => FeatureExtractor::random(&specs, seed),
        // clap enforces exactly one source.
        (None, None, None) => FeatureExtractor::random(&specs, 0),
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = build_config(&cli)?;
    if let Some(path) = &cli.dump_config {
        config.save_json(path)?;
    }

    let extractor = load_network(&cli.network)?;
    info!(layers = extractor.depth(), "loaded feature extractor");

    let content = load_image(&cli.content)?;
    let style = load_image(&cli.style)?;

    let mut transfer = StyleTransfer::new(extractor, config)?;
    if let Some(dir) = cli.snapshots {
        transfer = transfer.with_snapshot_dir(dir);
    }
    let outcome = transfer.run(&content, &style)?;

    save_image(&outcome.image, &cli.output)?;
    if let Some(loss) = outcome.stages.last().and_then(|s| s.last_loss.as_ref()) {
        info!(total = loss.total, path = %cli.output.display(), "wrote stylized image");
    }
    Ok(())
}

fn main() -> ExitCode {
    if let Err(err) = init_tracing("info") {
        eprintln!("{err}");
    }
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
