//! Types for writing BSA archives
//!
//! Records are written before the data they point at, so an archive is written in two passes. The first emits
//! every structure with zeroed offsets while noting where each of them lives, the second seeks back and fills
//! them in.

use std::borrow::Cow;
use std::fs;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use binrw::BinWrite;
use byteorder::{LittleEndian, WriteBytesExt};
use rayon::prelude::*;
use tracing::{debug, instrument, warn};

use crate::archive::Archive;
use crate::error::{Error, Result};
use crate::file::File;
use crate::strings;
use crate::types::{
    ArchiveFlags, ArchiveHeader, FileFlags, FileRecord, FolderRecord, RECORD_OFFSET_FIELD,
};

/// A record offset that can only be filled in once the data it points at has been written
#[derive(Debug, Clone, Copy)]
struct PendingOffset {
    /// Position of the zeroed offset field, relative to the start of the archive
    placeholder: u64,
    /// Value to store there, known after the first pass
    target: Option<u32>,
}

/// Every offset left behind by the first pass, in the order the records were written
#[derive(Debug, Default)]
struct OffsetIndex {
    folders: Vec<PendingOffset>,
    files: Vec<PendingOffset>,
}

/// Stored bytes of a file, ready to be written
struct StoredPayload<'a> {
    prefix: Option<String>,
    data: Cow<'a, [u8]>,
    compressed: bool,
}

impl StoredPayload<'_> {
    fn len(&self) -> Result<u32> {
        let prefix = match &self.prefix {
            Some(name) => 1 + strings::encoded_len(name)?,
            None => 0,
        };
        u32::try_from(prefix + self.data.len()).map_err(|_| Error::ArchiveTooLarge)
    }
}

fn position(offset: u64) -> Result<u32> {
    u32::try_from(offset).map_err(|_| Error::ArchiveTooLarge)
}

fn total_name_length<'a>(names: impl Iterator<Item = &'a str>) -> Result<u32> {
    let mut total = 0u64;
    for name in names {
        total += strings::encoded_len(name)? as u64 + 1;
    }
    position(total)
}

/// BSA archive generator
///
/// ```
/// # fn doit() -> bsa_archive::error::Result<()>
/// # {
/// use std::io::Cursor;
/// use bsa_archive::{Archive, ArchiveSettings, ArchiveWriter, File};
///
/// let mut archive = Archive::new(ArchiveSettings::default());
/// archive.add_file("textures\\armor", File::new("helmet.dds", b"0123456789".to_vec(), false));
///
/// // We use a buffer here, though you'd normally use `Archive::save`
/// let buffer = ArchiveWriter::new(Cursor::new(Vec::new()), &archive, false)?.finish()?;
/// assert_eq!(buffer.get_ref().len(), 105);
/// # Ok(())
/// # }
/// # doit().unwrap();
/// ```
pub struct ArchiveWriter<'a, W: Write + Seek> {
    inner: W,
    base: u64,
    archive: &'a Archive,
    header: ArchiveHeader,
}

impl<'a, W: Write + Seek> ArchiveWriter<'a, W> {
    /// Prepare to write `archive` at the current position of `inner`.
    ///
    /// The header of an archive that was read from disk is reused, unless `recreate` is set or the archive
    /// never had one.
    pub fn new(mut inner: W, archive: &'a Archive, recreate: bool) -> Result<ArchiveWriter<'a, W>> {
        let base = inner.stream_position()?;

        let (archive_flags, file_flags) = match archive.header().filter(|_| !recreate) {
            Some(header) => (header.archive_flags, header.file_flags),
            None => (
                archive.settings().flags(),
                FileFlags::from_names(archive.files().map(File::name)),
            ),
        };

        let header = ArchiveHeader {
            archive_flags,
            file_flags,
            folder_count: u32::try_from(archive.len()).map_err(|_| Error::ArchiveTooLarge)?,
            file_count: u32::try_from(archive.file_count()).map_err(|_| Error::ArchiveTooLarge)?,
            total_folder_name_length: total_name_length(archive.folders().map(|f| f.path()))?,
            total_file_name_length: total_name_length(archive.files().map(File::name))?,
            ..Default::default()
        };

        Ok(ArchiveWriter {
            inner,
            base,
            archive,
            header,
        })
    }

    /// Header that will be written
    pub fn header(&self) -> &ArchiveHeader {
        &self.header
    }

    /// Write the archive and return the inner writer, positioned at the end of the archive
    #[instrument(skip(self), fields(folders = self.header.folder_count, files = self.header.file_count), err)]
    pub fn finish(mut self) -> Result<W> {
        let payloads = self.prepare_payloads()?;
        let index = self.write_layout(&payloads)?;
        self.patch_offsets(&index)?;

        self.inner.seek(SeekFrom::End(0))?;
        self.inner.flush()?;
        Ok(self.inner)
    }

    fn stream_position(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()? - self.base)
    }

    /// Compress every file that needs it, in parallel, before anything is written
    fn prepare_payloads(&self) -> Result<Vec<StoredPayload<'a>>> {
        let default_compressed = self.header.archive_flags.contains(ArchiveFlags::COMPRESSED);
        let prefixed = self
            .header
            .archive_flags
            .contains(ArchiveFlags::BSTRING_PREFIXED);
        let options = self.archive.settings().options;

        if default_compressed != self.archive.settings().default_compressed {
            debug!(
                default_compressed,
                "archive header overrides the default compression of its settings"
            );
        }

        let files: Vec<&'a File> = self.archive.files().collect();
        files
            .into_par_iter()
            .map(|file| {
                Ok(StoredPayload {
                    prefix: prefixed.then(|| file.full_path()),
                    data: file.stored_payload(&options)?,
                    compressed: file.is_compressed(),
                })
            })
            .collect()
    }

    /// First pass: header, records, names and payloads, with every offset left at zero
    fn write_layout(&mut self, payloads: &[StoredPayload]) -> Result<OffsetIndex> {
        let archive = self.archive;
        let default_compressed = self.header.archive_flags.contains(ArchiveFlags::COMPRESSED);
        let bias = self.header.total_file_name_length;
        let mut index = OffsetIndex::default();

        self.header.write(&mut self.inner)?;

        for folder in archive.folders() {
            let placeholder = self.stream_position()? + u64::from(RECORD_OFFSET_FIELD);
            FolderRecord {
                hash: folder.hash(),
                count: u32::try_from(folder.len()).map_err(|_| Error::ArchiveTooLarge)?,
                offset: 0,
            }
            .write(&mut self.inner)?;

            index.folders.push(PendingOffset {
                placeholder,
                target: None,
            });
        }

        let mut payload_iter = payloads.iter();
        for (folder, pending) in archive.folders().zip(index.folders.iter_mut()) {
            let block = self.stream_position()?;
            pending.target = Some(
                position(block)?
                    .checked_add(bias)
                    .ok_or(Error::ArchiveTooLarge)?,
            );
            strings::write_bzstring(&mut self.inner, folder.path())?;

            for file in folder.files() {
                let payload = payload_iter.next().ok_or_else(|| {
                    Error::CustomError(format!("no payload prepared for {}", file.full_path()))
                })?;

                let placeholder = self.stream_position()? + u64::from(RECORD_OFFSET_FIELD);
                FileRecord {
                    hash: file.hash(),
                    size: FileRecord::encode_size(
                        payload.len()?,
                        payload.compressed != default_compressed,
                    )?,
                    offset: 0,
                }
                .write(&mut self.inner)?;

                index.files.push(PendingOffset {
                    placeholder,
                    target: None,
                });
            }
        }

        for file in archive.files() {
            strings::write_cstring(&mut self.inner, file.name())?;
        }

        for (payload, pending) in payloads.iter().zip(index.files.iter_mut()) {
            pending.target = Some(position(self.stream_position()?)?);
            if let Some(name) = &payload.prefix {
                strings::write_bstring(&mut self.inner, name)?;
            }
            self.inner.write_all(&payload.data)?;
        }

        Ok(index)
    }

    /// Second pass: seek back to every placeholder and write the offset it was waiting for
    fn patch_offsets(&mut self, index: &OffsetIndex) -> Result<()> {
        for pending in index.folders.iter().chain(&index.files) {
            let target = pending.target.ok_or_else(|| {
                Error::CustomError(format!(
                    "offset at {:#x} was never resolved",
                    pending.placeholder
                ))
            })?;

            self.inner
                .seek(SeekFrom::Start(self.base + pending.placeholder))?;
            self.inner.write_u32::<LittleEndian>(target)?;
        }
        Ok(())
    }
}

/// Sibling of `path` that output is written to before it is moved into place
pub(crate) fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    path.with_file_name(name)
}

impl Archive {
    /// Write the archive to `path`.
    ///
    /// The archive is first written next to `path` and only moved over it once complete, so a failed save
    /// leaves no output behind, and an archive may be saved over the file it was opened from.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()), err)]
    pub fn save(&self, path: impl AsRef<Path>, recreate: bool) -> Result<()> {
        let path = path.as_ref();
        let partial = partial_path(path);

        let result = fs::File::create(&partial)
            .map_err(Error::from)
            .and_then(|file| self.write(BufWriter::new(file), recreate))
            .and_then(|writer| writer.into_inner().map_err(|e| Error::from(e.into_error())))
            .and_then(|file| file.sync_all().map_err(Error::from))
            .and_then(|_| fs::rename(&partial, path).map_err(Error::from));

        if result.is_err() {
            if let Err(error) = fs::remove_file(&partial) {
                warn!(%error, partial = %partial.display(), "unable to remove partial archive");
            }
        }

        result
    }

    /// Write the archive to `writer`, returning it positioned at the end of the archive
    pub fn write<W: Write + Seek>(&self, writer: W, recreate: bool) -> Result<W> {
        ArchiveWriter::new(writer, self, recreate)?.finish()
    }
}
