use bsa_archive::{Archive, UnpackOptions};
use clap::Args;
use miette::{miette, Context, Result};
use std::{path::PathBuf, sync::mpsc, thread};
use tracing::info;

#[derive(Args)]
pub struct ExtractArgs {
    /// An input BSA file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// A target directory
    #[arg(short, long, value_name = "DIR")]
    directory: PathBuf,

    /// Number of files to extract at once, 0 uses every core
    #[arg(short, long, default_value_t = 0)]
    threads: usize,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

impl ExtractArgs {
    pub fn handle(&self) -> Result<()> {
        let archive =
            Archive::open(&self.file).context(format!("path: {}", &self.file.display()))?;

        let options = UnpackOptions::builder()
            .threads(self.threads)
            .overwrite(self.overwrite)
            .build();

        let (tx, rx) = mpsc::channel();
        let written = thread::scope(|scope| {
            let worker = scope.spawn(|| archive.unpack(&self.directory, &options, Some(tx)));

            for progress in rx {
                info!(
                    "{} done, {}/{}",
                    progress.file_name, progress.completed, progress.total
                );
            }

            worker
                .join()
                .map_err(|_| miette!("extraction thread panicked"))
        })?
        .context(format!("extracting into {}", &self.directory.display()))?;

        info!("extracted {} files", written);
        Ok(())
    }
}
