use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::Parser;
use image::ImageFormat;

use tonematch::{Config, Corpus, ToneMatcher, codec};

#[derive(Parser)]
#[command(name = "tonematch")]
#[command(about = "Automatic photo tone correction against a reference corpus")]
struct Cli {
    /// Image to correct
    input: PathBuf,

    /// One diapason per stage (details zonal saturation luminance), each
    /// all, low, mid or high. Without them a set of variants is searched.
    diapasons: Vec<String>,

    /// Directory holding details.ref, zonal.ref, saturation.ref and luminance.ref
    #[arg(short, long, default_value = "references")]
    corpus: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    out: PathBuf,

    /// Output image format (file extension)
    #[arg(short, long, default_value = "png")]
    format: String,

    /// Skip the local details stage
    #[arg(long)]
    no_details: bool,

    /// Re-apply each variant's curves at working resolution before saving
    #[arg(long)]
    full_size: bool,

    /// Number of variants to write
    #[arg(long)]
    max_variants: Option<usize>,

    /// Worker threads (defaults to one per core)
    #[arg(short = 'j', long)]
    threads: Option<usize>,
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure the worker pool")?;
    }

    let Some(format) = ImageFormat::from_extension(&cli.format) else {
        bail!("unknown image format {:?}", cli.format);
    };
    let ext = format.extensions_str().first().copied().unwrap_or("png");

    let mut config = Config::default();
    config.details_enabled = !cli.no_details;
    if let Some(max) = cli.max_variants {
        config.variants.max_output = max;
    }

    let corpus = Corpus::load_dir(&cli.corpus)
        .with_context(|| format!("failed to load references from {}", cli.corpus.display()))?;
    let matcher = ToneMatcher::new(corpus, config);
    let source = codec::read_raster(&cli.input)
        .with_context(|| format!("failed to read {}", cli.input.display()))?;
    let name = stem(&cli.input);
    std::fs::create_dir_all(&cli.out)?;

    if cli.diapasons.is_empty() {
        let variants = matcher.variants(source.as_ref())?;
        for (index, variant) in variants.iter().enumerate() {
            let path = cli.out.join(format!("{index}_{name}_{}.{ext}", variant.label()));
            let raster = if cli.full_size {
                matcher.render(source.as_ref(), variant)?
            } else {
                variant.raster.clone()
            };
            std::fs::write(&path, codec::save_raster(raster.as_ref(), format)?)?;
            log::info!("wrote {} (rank {:.3})", path.display(), variant.rank());
        }
    } else {
        log::info!("selected diapasons {}", cli.diapasons.join(", "));
        let result = matcher.process_params(source.as_ref(), &cli.diapasons)?;
        let path = cli.out.join(format!("{name}_result.{ext}"));
        std::fs::write(&path, codec::save_raster(result.as_ref(), format)?)?;
        log::info!("wrote {}", path.display());
    }
    Ok(())
}
