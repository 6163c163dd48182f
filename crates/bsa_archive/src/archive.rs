//! The in-memory archive tree

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use bon::Builder;

use crate::compression::CompressionOptions;
use crate::error::{Error, FileNotFoundError, Result};
use crate::file::File;
use crate::folder::{Folder, HashKey};
use crate::types::{ArchiveFlags, ArchiveHeader};

/// Archive wide settings used when writing
///
/// ```
/// use bsa_archive::ArchiveSettings;
///
/// let settings = ArchiveSettings::builder()
///     .default_compressed(true)
///     .build();
/// assert!(!settings.bstring_prefixed);
/// ```
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Builder)]
pub struct ArchiveSettings {
    /// Files are compressed unless they say otherwise
    #[builder(default)]
    pub default_compressed: bool,

    /// Payloads start with the full path of their file
    #[builder(default)]
    pub bstring_prefixed: bool,

    /// How payloads are compressed
    #[builder(default)]
    pub options: CompressionOptions,
}

impl ArchiveSettings {
    /// Archive flags written when the header is recreated
    pub fn flags(&self) -> ArchiveFlags {
        let mut flags = ArchiveFlags::NAMED_FOLDERS | ArchiveFlags::NAMED_FILES;
        flags.set(ArchiveFlags::COMPRESSED, self.default_compressed);
        flags.set(ArchiveFlags::BSTRING_PREFIXED, self.bstring_prefixed);
        flags
    }
}

/// A BSA archive: folders of files, ordered by hash
///
/// ```
/// # fn doit() -> bsa_archive::error::Result<()> {
/// use bsa_archive::{Archive, ArchiveSettings, File};
///
/// let mut archive = Archive::new(ArchiveSettings::default());
/// archive.add_file("textures\\armor", File::new("helmet.dds", b"0123456789".to_vec(), false));
///
/// let file = archive.by_name("textures\\armor\\helmet.dds")?;
/// assert_eq!(file.resolve()?, b"0123456789");
/// # Ok(())
/// # }
/// # doit().unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct Archive {
    folders: BTreeMap<HashKey, Folder>,
    settings: ArchiveSettings,
    header: Option<ArchiveHeader>,
}

impl Archive {
    /// Create an empty archive
    pub fn new(settings: ArchiveSettings) -> Archive {
        Archive {
            folders: BTreeMap::new(),
            settings,
            header: None,
        }
    }

    pub(crate) fn from_parts(
        folders: BTreeMap<HashKey, Folder>,
        settings: ArchiveSettings,
        header: ArchiveHeader,
    ) -> Archive {
        Archive {
            folders,
            settings,
            header: Some(header),
        }
    }

    /// Settings used when writing the archive
    pub fn settings(&self) -> &ArchiveSettings {
        &self.settings
    }

    /// Mutable access to the settings used when writing the archive
    pub fn settings_mut(&mut self) -> &mut ArchiveSettings {
        &mut self.settings
    }

    /// Header the archive was read with, if it was read from disk
    pub fn header(&self) -> Option<&ArchiveHeader> {
        self.header.as_ref()
    }

    /// Number of folders in the archive
    pub fn len(&self) -> usize {
        self.folders.len()
    }

    /// Whether the archive holds no folders
    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }

    /// Number of files across all folders
    pub fn file_count(&self) -> usize {
        self.folders.values().map(Folder::len).sum()
    }

    /// Folders in ascending hash order
    pub fn folders(&self) -> impl Iterator<Item = &Folder> {
        self.folders.values()
    }

    /// Mutable access to the folders in ascending hash order
    pub fn folders_mut(&mut self) -> impl Iterator<Item = &mut Folder> {
        self.folders.values_mut()
    }

    /// Look up a folder by path, ignoring case
    pub fn folder(&self, path: &str) -> Option<&Folder> {
        self.folders.get(&HashKey::folder(path))
    }

    /// Look up a folder by path for modification, ignoring case
    pub fn folder_mut(&mut self, path: &str) -> Option<&mut Folder> {
        self.folders.get_mut(&HashKey::folder(path))
    }

    /// Add a folder, returning any folder it replaced
    pub fn insert(&mut self, folder: Folder) -> Option<Folder> {
        self.folders
            .insert(HashKey::with_hash(folder.hash(), folder.path()), folder)
    }

    /// Remove a folder and all of its files
    pub fn remove(&mut self, path: &str) -> Option<Folder> {
        self.folders.remove(&HashKey::folder(path))
    }

    /// Add a file to the folder at `path`, creating the folder when missing.
    ///
    /// Returns any file with the same name that was replaced.
    pub fn add_file(&mut self, path: &str, file: File) -> Option<File> {
        let folder = match self.folders.entry(HashKey::folder(path)) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(Folder::new(path)),
        };
        folder.insert(file)
    }

    /// Every file, folder by folder, in the order they are written
    pub fn files(&self) -> impl Iterator<Item = &File> {
        self.folders.values().flat_map(Folder::files)
    }

    /// Find a file by its full path, `folder\name`, ignoring case
    pub fn by_name(&self, full_path: &str) -> Result<&File> {
        let normalized = full_path.replace('/', "\\");
        let Some((path, name)) = normalized.rsplit_once('\\') else {
            return Err(Error::FileNotFound(FileNotFoundError::Name(
                full_path.to_owned(),
            )));
        };

        let folder = self
            .folder(path)
            .ok_or_else(|| Error::FileNotFound(FileNotFoundError::Folder(path.to_owned())))?;
        folder.by_name(name)
    }
}
