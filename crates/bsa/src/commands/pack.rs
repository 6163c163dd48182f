use bsa_archive::{Archive, ArchiveSettings, CompressionOptions, CompressionStrategy};
use clap::{Args, ValueEnum};
use miette::{miette, Context, Result};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Strategy {
    /// Smallest archive
    #[default]
    Size,
    /// Fastest packing
    Speed,
}

impl From<Strategy> for CompressionStrategy {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Size => CompressionStrategy::Size,
            Strategy::Speed => CompressionStrategy::Speed,
        }
    }
}

#[derive(Args)]
pub struct PackArgs {
    /// An input directory
    #[arg(short, long, value_name = "DIR")]
    directory: PathBuf,

    /// A target BSA file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// Store files without compressing them
    #[arg(long, default_value_t = false)]
    uncompressed: bool,

    /// Put the full path of each file in front of its data
    #[arg(long, default_value_t = false)]
    bstring_prefixed: bool,

    /// What to favor when compressing
    #[arg(long, value_enum, default_value_t)]
    strategy: Strategy,

    /// Skip verifying compressed data
    #[arg(long = "unsafe", default_value_t = false)]
    unsafe_mode: bool,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

impl PackArgs {
    pub fn handle(&self) -> Result<()> {
        if !self.overwrite && self.file.exists() {
            return Err(miette!("{} already exists", self.file.display()));
        }

        let settings = ArchiveSettings::builder()
            .default_compressed(!self.uncompressed)
            .bstring_prefixed(self.bstring_prefixed)
            .options(
                CompressionOptions::builder()
                    .strategy(self.strategy.into())
                    .unsafe_mode(self.unsafe_mode)
                    .build(),
            )
            .build();

        let archive = Archive::pack(&self.directory, settings)
            .context(format!("path: {}", &self.directory.display()))?;

        if archive.is_empty() {
            return Err(miette!("directory is empty"));
        }

        info!("creating {}", &self.file.display());
        archive
            .save(&self.file, true)
            .context(format!("creating {}", &self.file.display()))?;

        info!(
            "packed {} files into {} folders",
            archive.file_count(),
            archive.len()
        );
        Ok(())
    }
}
