//! Types for reading BSA archives
//!

use std::collections::BTreeMap;
use std::fs;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;
use tracing::{debug, instrument, warn};

use crate::archive::{Archive, ArchiveSettings};
use crate::compression::CompressionOptions;
use crate::error::{Error, Result};
use crate::file::File;
use crate::folder::{Folder, HashKey};
use crate::hash;
use crate::strings;
use crate::types::{ArchiveFlags, ArchiveHeader, FileRecord, FolderRecord, RECORD_SIZE};

/// Read-only bytes of an archive, shared by every file read from it
pub(crate) enum ArchiveView {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for ArchiveView {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            ArchiveView::Mapped(map) => map,
            ArchiveView::Owned(bytes) => bytes,
        }
    }
}

/// A folder record along with the name and file records it points at
struct FolderBlock {
    path: String,
    record: FolderRecord,
    files: Vec<FileRecord>,
}

struct ArchiveReader {
    view: Arc<ArchiveView>,
    header: ArchiveHeader,
}

impl ArchiveReader {
    fn new(view: Arc<ArchiveView>) -> Result<ArchiveReader> {
        let header = ArchiveHeader::decode(&view)?;

        let named = ArchiveFlags::NAMED_FOLDERS | ArchiveFlags::NAMED_FILES;
        if !header.archive_flags.contains(named) {
            return Err(Error::CorruptArchive(format!(
                "archive flags {:?} lack folder or file names",
                header.archive_flags
            )));
        }

        Ok(ArchiveReader { view, header })
    }

    fn window(&self, offset: u64, what: &str) -> Result<&[u8]> {
        usize::try_from(offset)
            .ok()
            .and_then(|offset| self.view.get(offset..))
            .ok_or_else(|| {
                Error::CorruptArchive(format!("{what} at {offset:#x} is past the end of the archive"))
            })
    }

    fn read_folders(&self) -> Result<Vec<FolderBlock>> {
        let bias = u64::from(self.header.total_file_name_length);

        (0..self.header.folder_count)
            .map(|i| {
                let position = u64::from(self.header.offset) + u64::from(i) * u64::from(RECORD_SIZE);
                let record = FolderRecord::decode(self.window(position, "folder record")?)?;

                let block = u64::from(record.offset).checked_sub(bias).ok_or_else(|| {
                    Error::CorruptArchive(format!(
                        "folder record {i} points at {:#x}, before the end of the file name table",
                        record.offset
                    ))
                })?;

                let (path, consumed) = strings::read_bzstring(self.window(block, "folder name")?)?;
                if hash::hash_folder(&path) != record.hash {
                    warn!(%path, hash = record.hash, "folder hash does not match its name");
                }

                let mut position = block + consumed as u64;
                let files = (0..record.count)
                    .map(|_| {
                        let file = FileRecord::decode(self.window(position, "file record")?)?;
                        position += u64::from(RECORD_SIZE);
                        Ok(file)
                    })
                    .collect::<Result<Vec<_>>>()?;

                Ok(FolderBlock {
                    path,
                    record,
                    files,
                })
            })
            .collect()
    }

    fn read_file_names(&self) -> Result<Vec<String>> {
        let start = self.header.file_names_offset();
        let length = self.header.total_file_name_length as usize;
        let table = self
            .window(start, "file name table")?
            .get(..length)
            .ok_or_else(|| {
                Error::CorruptArchive(format!(
                    "file name table of {length} bytes at {start:#x} is past the end of the archive"
                ))
            })?;

        let expected = self.header.file_count as usize;
        let mut names = Vec::new();
        let mut cursor = 0;
        while names.len() < expected {
            let (name, consumed) = strings::read_cstring(&table[cursor..]).map_err(|_| {
                Error::CorruptArchive(format!(
                    "file name table ran out after {} of {expected} names",
                    names.len()
                ))
            })?;
            cursor += consumed;
            names.push(name);
        }

        if cursor != length {
            warn!(
                used = cursor,
                declared = length,
                "file name table is longer than its names"
            );
        }

        Ok(names)
    }

    fn file(
        &self,
        folder: &str,
        name: String,
        record: &FileRecord,
        settings: &ArchiveSettings,
    ) -> Result<File> {
        let hash = hash::hash_file(&name);
        if hash != record.hash {
            warn!(folder, %name, hash = record.hash, "file hash does not match its name");
        }

        let compressed = settings.default_compressed ^ record.compression_toggled();
        let mut offset = record.offset as usize;
        let mut len = record.stored_len() as usize;

        if settings.bstring_prefixed {
            let prefix = self
                .view
                .get(offset)
                .map(|&length| 1 + length as usize)
                .ok_or_else(|| {
                    Error::CorruptArchive(format!(
                        "name prefix of {folder}\\{name} at {offset:#x} is past the end of the archive"
                    ))
                })?;

            len = len.checked_sub(prefix).ok_or_else(|| {
                Error::CorruptArchive(format!(
                    "name prefix of {folder}\\{name} is longer than its payload"
                ))
            })?;
            offset += prefix;
        }

        File::mapped(folder, name, hash, self.view.clone(), offset, len, compressed)
    }

    fn read(self, options: CompressionOptions) -> Result<Archive> {
        let flags = self.header.archive_flags;
        let settings = ArchiveSettings {
            default_compressed: flags.contains(ArchiveFlags::COMPRESSED),
            bstring_prefixed: flags.contains(ArchiveFlags::BSTRING_PREFIXED),
            options,
        };

        let blocks = self.read_folders()?;
        let record_count: usize = blocks.iter().map(|b| b.files.len()).sum();
        if record_count != self.header.file_count as usize {
            return Err(Error::CorruptArchive(format!(
                "folders hold {record_count} files but the header declares {}",
                self.header.file_count
            )));
        }

        let mut names = self.read_file_names()?.into_iter();
        let mut folders: BTreeMap<HashKey, Folder> = BTreeMap::new();

        for block in blocks {
            // stored hashes that disagree with their names were reported while reading the records
            let hash = hash::hash_folder(&block.path);
            let key = HashKey::with_hash(hash, &block.path);
            if folders.contains_key(&key) {
                warn!(path = %block.path, "folder appears more than once, merging");
            }
            let folder = folders
                .entry(key)
                .or_insert_with(|| Folder::with_hash(block.path.clone(), hash));

            for record in &block.files {
                let name = names.next().ok_or_else(|| {
                    Error::CorruptArchive("more file records than file names".into())
                })?;
                let file = self.file(&block.path, name, record, &settings)?;
                if let Some(replaced) = folder.insert(file) {
                    warn!(file = %replaced.full_path(), "file appears more than once, keeping the last");
                }
            }
        }

        debug!(
            folders = folders.len(),
            files = record_count,
            ?settings,
            "read archive"
        );

        Ok(Archive::from_parts(folders, settings, self.header))
    }
}

impl Archive {
    /// Open an archive, mapping it into memory
    ///
    /// Payloads stay in the mapping until they are resolved. The mapping is released once the archive and
    /// every file read from it are dropped.
    pub fn open(path: impl AsRef<Path>) -> Result<Archive> {
        Self::open_with(path, CompressionOptions::default())
    }

    /// Open an archive, using `options` when it is written again
    #[instrument(skip(path), fields(path = %path.as_ref().display()), err)]
    pub fn open_with(path: impl AsRef<Path>, options: CompressionOptions) -> Result<Archive> {
        let file = fs::File::open(path.as_ref())?;

        // SAFETY: the mapping is only ever read. Truncating the archive on disk while it is open is not
        // supported.
        let map = unsafe { Mmap::map(&file)? };

        ArchiveReader::new(Arc::new(ArchiveView::Mapped(map)))?.read(options)
    }

    /// Read an archive held in memory
    pub fn from_bytes(bytes: Vec<u8>, options: CompressionOptions) -> Result<Archive> {
        ArchiveReader::new(Arc::new(ArchiveView::Owned(bytes)))?.read(options)
    }
}
