//! Bulk operations between an archive and a directory tree

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use bon::Builder;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::archive::{Archive, ArchiveSettings};
use crate::error::{Error, Result};
use crate::file::File;
use crate::write::partial_path;

/// Options for extracting an archive into a directory
#[derive(Debug, Clone, Default, Builder)]
pub struct UnpackOptions {
    /// Number of worker threads, `0` picks one per core
    #[builder(default)]
    pub threads: usize,

    /// Replace files which already exist in the destination
    #[builder(default)]
    pub overwrite: bool,

    /// Set to stop handing out files to workers
    pub cancel: Option<Arc<AtomicBool>>,
}

/// Sent once for every file written during [`Archive::unpack`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackProgress {
    /// Full path of the file within the archive
    pub file_name: String,
    /// Files written so far, including this one
    pub completed: usize,
    /// Files being written in total
    pub total: usize,
}

/// Destination of a stored path below `root`, refusing anything that would land outside of it
fn destination(root: &Path, full_path: &str) -> Result<PathBuf> {
    let unsafe_path = || Error::UnsafePath(full_path.to_owned());

    if full_path.starts_with(['\\', '/']) || full_path.contains(':') {
        return Err(unsafe_path());
    }

    let mut path = root.to_path_buf();
    for part in full_path.split(['\\', '/']).filter(|p| !p.is_empty() && *p != ".") {
        let mut components = Path::new(part).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) => path.push(name),
            _ => return Err(unsafe_path()),
        }
    }

    Ok(path)
}

fn write_file(file: &File, path: &Path, overwrite: bool) -> Result<()> {
    if !overwrite && path.exists() {
        return Err(Error::IOError(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{} already exists", path.display()),
        )));
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let data = file.resolve()?;
    let partial = partial_path(path);
    let result = fs::write(&partial, data).and_then(|_| fs::rename(&partial, path));
    if result.is_err() {
        if let Err(error) = fs::remove_file(&partial) {
            warn!(%error, partial = %partial.display(), "unable to remove partial file");
        }
    }

    Ok(result?)
}

impl Archive {
    /// Decompress every file in parallel, caching the results
    ///
    /// Stops at the first file which fails to decompress.
    #[instrument(skip(self), fields(files = self.file_count()), err)]
    pub fn resolve_all(&self) -> Result<()> {
        let files: Vec<&File> = self.files().collect();
        files.into_par_iter().try_for_each(|file| file.resolve().map(|_| ()))
    }

    /// Copy every file into memory so the archive no longer depends on the file it was opened from
    #[instrument(skip(self), fields(files = self.file_count()), err)]
    pub fn detach(&mut self) -> Result<()> {
        let files: Vec<&mut File> = self.folders_mut().flat_map(|f| f.files_mut()).collect();
        files.into_par_iter().try_for_each(File::detach)
    }

    /// Extract every file below `dir`, returning how many were written
    ///
    /// Files are resolved and written by a pool of workers. Each completed file is reported on `progress`;
    /// a closed receiver is ignored. Setting the cancellation flag stops new files from being started and
    /// fails with [`Error::Cancelled`] once the files in flight are done.
    #[instrument(skip(self, dir, options, progress), fields(dir = %dir.as_ref().display()), err)]
    pub fn unpack(
        &self,
        dir: impl AsRef<Path>,
        options: &UnpackOptions,
        progress: Option<Sender<UnpackProgress>>,
    ) -> Result<usize> {
        let dir = dir.as_ref();
        let jobs = self
            .files()
            .map(|file| Ok((file, destination(dir, &file.full_path())?)))
            .collect::<Result<Vec<_>>>()?;

        let total = jobs.len();
        let completed = AtomicUsize::new(0);
        let pool = ThreadPoolBuilder::new().num_threads(options.threads).build()?;

        debug!(total, threads = pool.current_num_threads(), "unpacking");

        pool.install(|| {
            jobs.par_iter().try_for_each(|(file, path)| {
                let cancelled = options
                    .cancel
                    .as_ref()
                    .is_some_and(|flag| flag.load(Ordering::Relaxed));
                if cancelled {
                    return Err(Error::Cancelled);
                }

                write_file(file, path, options.overwrite)?;

                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(progress) = &progress {
                    let _ = progress.send(UnpackProgress {
                        file_name: file.full_path(),
                        completed: done,
                        total,
                    });
                }
                Ok(())
            })
        })?;

        info!(total, "unpacked archive");
        Ok(total)
    }

    /// Build an archive from a directory tree
    ///
    /// Every file in a sub-directory of `dir` becomes a file of the folder named by its relative directory.
    /// Files directly inside `dir` have no folder and are skipped, as are files with an empty stem.
    #[instrument(skip(dir, settings), fields(dir = %dir.as_ref().display()), err)]
    pub fn pack(dir: impl AsRef<Path>, settings: ArchiveSettings) -> Result<Archive> {
        let dir = dir.as_ref();
        let mut archive = Archive::new(settings);

        for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::IOError(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(dir)
                .map_err(|e| Error::CustomError(e.to_string()))?;
            let text = |p: &Path| {
                p.to_str()
                    .map(str::to_owned)
                    .ok_or_else(|| Error::CustomError(format!("{} is not valid unicode", p.display())))
            };

            let folder = match relative.parent() {
                Some(parent) if parent.as_os_str().is_empty() => None,
                Some(parent) => Some(text(parent)?.replace('/', "\\")),
                None => None,
            };
            let Some(folder) = folder else {
                warn!(file = %relative.display(), "skipping file outside of any folder");
                continue;
            };

            let name = entry
                .path()
                .file_name()
                .map(Path::new)
                .map(text)
                .transpose()?
                .unwrap_or_default();
            if name.is_empty() || name.rfind('.') == Some(0) {
                warn!(file = %relative.display(), "skipping file without a name");
                continue;
            }

            let data = fs::read(entry.path())?;
            archive.add_file(&folder, File::new(name, data, settings.default_compressed));
        }

        info!(
            folders = archive.len(),
            files = archive.file_count(),
            "packed directory"
        );
        Ok(archive)
    }
}
