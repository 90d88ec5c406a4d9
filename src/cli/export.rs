use std::path::PathBuf;

use clap::Args;

use heliostat::PipelineConfig;

#[derive(Args)]
pub struct ExportArgs {
    /// TOML config file; missing keys keep their defaults
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Directory for model.bin and model.h (overrides the config)
    #[arg(short, long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,
    /// Number of synthesized samples (default: 50000)
    #[arg(long)]
    pub samples: Option<usize>,
    /// Seed for the sample draws (default: 42)
    #[arg(long)]
    pub seed: Option<u64>,
    /// Held-out rows the exported policy is scored on (default: 5000)
    #[arg(long)]
    pub holdout: Option<usize>,
    /// Training epochs (default: 6)
    #[arg(long)]
    pub epochs: Option<usize>,
}

impl ExportArgs {
    /// Defaults, then the config file, then flags.
    pub fn resolve(&self) -> heliostat::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(dir) = &self.out_dir {
            config.output.dir = dir.clone();
        }
        if let Some(n) = self.samples {
            config.samples = n;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(n) = self.holdout {
            config.holdout = n;
        }
        if let Some(epochs) = self.epochs {
            config.train.epochs = epochs;
        }
        Ok(config)
    }
}

pub fn cmd_export(args: ExportArgs) {
    let config = args.resolve().unwrap_or_else(|e| super::fail(e));
    let outcome = heliostat::run(&config).unwrap_or_else(|e| super::fail(e));

    let art = &outcome.artifact;
    eprintln!(
        "  {} ({} bytes, blake3 {})",
        art.binary.display(),
        art.len,
        &art.digest.to_hex()[..16]
    );
    eprintln!("  {}", art.header.display());
    eprintln!("  {}", outcome.report);
    if outcome.input_clip_fraction > 0.0 {
        eprintln!(
            "warning: input params saturate {:.2}% of corpus features",
            outcome.input_clip_fraction * 100.0
        );
    }
}
