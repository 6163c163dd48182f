use bsa_archive::Archive;
use clap::Args;
use miette::{miette, Context, Result};
use std::path::PathBuf;
use tracing::info;

#[derive(Args)]
pub struct RepackArgs {
    /// An input BSA file
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// A target BSA file
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Compute the header flags from the archive's settings instead of keeping the original ones
    #[arg(long, default_value_t = false)]
    recreate: bool,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

impl RepackArgs {
    pub fn handle(&self) -> Result<()> {
        if !self.overwrite && self.output.exists() {
            return Err(miette!("{} already exists", self.output.display()));
        }

        let archive =
            Archive::open(&self.input).context(format!("path: {}", &self.input.display()))?;

        info!("writing {}", &self.output.display());
        archive
            .save(&self.output, self.recreate)
            .context(format!("creating {}", &self.output.display()))?;

        Ok(())
    }
}
