use bsa_archive::Archive;
use clap::Args;
use miette::{Context, Result};
use owo_colors::{OwoColorize, Stream::Stdout};
use std::path::PathBuf;

#[derive(Args)]
pub struct ListArgs {
    /// An input BSA file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,
}

impl ListArgs {
    pub fn handle(&self) -> Result<()> {
        let archive =
            Archive::open(&self.file).context(format!("path: {}", &self.file.display()))?;

        for folder in archive.folders() {
            println!(
                "{}",
                folder.path().if_supports_color(Stdout, |t| t.bold())
            );

            for file in folder.files() {
                let stored = match (file.is_compressed(), file.compressed_size()) {
                    (true, Some(size)) => format!("compressed, {size} stored"),
                    (true, None) => "compressed".to_owned(),
                    (false, _) => "raw".to_owned(),
                };
                println!(
                    "  {} {} bytes ({})",
                    file.name(),
                    file.size(),
                    stored.if_supports_color(Stdout, |t| t.dimmed())
                );
            }
        }

        println!(
            "{} folders, {} files",
            archive.len(),
            archive.file_count()
        );
        Ok(())
    }
}
