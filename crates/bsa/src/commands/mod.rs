pub mod extract;
pub mod list;
pub mod pack;
pub mod repack;

#[derive(clap::Subcommand)]
pub enum Commands {
    /// List the folders and files of a BSA file
    List(list::ListArgs),
    /// Extract a BSA file into a directory
    Extract(extract::ExtractArgs),
    /// Pack a directory into a BSA file
    Pack(pack::PackArgs),
    /// Read a BSA file and write it out again
    Repack(repack::RepackArgs),
}

impl Commands {
    pub fn handle(&self) -> miette::Result<()> {
        match self {
            Commands::List(list) => list.handle(),
            Commands::Extract(extract) => extract.handle(),
            Commands::Pack(pack) => pack.handle(),
            Commands::Repack(repack) => repack.handle(),
        }
    }
}
