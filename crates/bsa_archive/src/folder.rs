//! Folders of an archive and the key they are ordered by

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::{Error, FileNotFoundError, Result};
use crate::file::File;
use crate::hash;

/// Sort key of folders and files
///
/// Entries are written in ascending hash order. Distinct names may share a hash, so the lower-cased name
/// breaks ties to keep the order total and stable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HashKey {
    /// Hash of the name
    pub hash: u64,
    name: Box<str>,
}

impl HashKey {
    /// Key of a folder path
    pub fn folder(path: &str) -> HashKey {
        HashKey {
            hash: hash::hash_folder(path),
            name: normalize(path).into(),
        }
    }

    /// Key of a file name
    pub fn file(name: &str) -> HashKey {
        HashKey {
            hash: hash::hash_file(name),
            name: normalize(name).into(),
        }
    }

    pub(crate) fn with_hash(hash: u64, name: &str) -> HashKey {
        HashKey {
            hash,
            name: normalize(name).into(),
        }
    }
}

impl Ord for HashKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.hash
            .cmp(&other.hash)
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl PartialOrd for HashKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn normalize(name: &str) -> String {
    name.to_ascii_lowercase().replace('/', "\\")
}

/// A named collection of files
///
/// Files are kept in the order they are written to disk, and looked up case-insensitively.
#[derive(Debug, Clone)]
pub struct Folder {
    path: Box<str>,
    hash: u64,
    files: BTreeMap<HashKey, File>,
}

impl Folder {
    /// Create an empty folder. Forward slashes in `path` are stored as backslashes.
    pub fn new(path: &str) -> Folder {
        let path = path.replace('/', "\\");
        Folder {
            hash: hash::hash_folder(&path),
            path: path.into(),
            files: BTreeMap::new(),
        }
    }

    pub(crate) fn with_hash(path: String, hash: u64) -> Folder {
        Folder {
            path: path.into(),
            hash,
            files: BTreeMap::new(),
        }
    }

    /// Path of the folder, with backslash separators
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Hash of the folder path
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Number of files in the folder
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the folder holds no files
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Files in ascending hash order
    pub fn files(&self) -> impl Iterator<Item = &File> {
        self.files.values()
    }

    /// Mutable access to the files in ascending hash order
    pub fn files_mut(&mut self) -> impl Iterator<Item = &mut File> {
        self.files.values_mut()
    }

    /// Look up a file by name, ignoring case
    pub fn get(&self, name: &str) -> Option<&File> {
        self.files.get(&HashKey::file(name))
    }

    /// Look up a file by name for modification, ignoring case
    pub fn get_mut(&mut self, name: &str) -> Option<&mut File> {
        self.files.get_mut(&HashKey::file(name))
    }

    /// Look up a file by name, failing with [`Error::FileNotFound`] when missing
    pub fn by_name(&self, name: &str) -> Result<&File> {
        self.get(name)
            .ok_or_else(|| Error::FileNotFound(FileNotFoundError::Name(name.to_owned())))
    }

    /// Add a file, returning any file it replaced
    pub fn insert(&mut self, mut file: File) -> Option<File> {
        file.set_folder(&self.path);
        self.files
            .insert(HashKey::with_hash(file.hash(), file.name()), file)
    }

    /// Remove a file by name, ignoring case
    pub fn remove(&mut self, name: &str) -> Option<File> {
        self.files.remove(&HashKey::file(name))
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::file::File;
    use crate::folder::{Folder, HashKey};
    use crate::hash;

    #[test]
    fn files_are_ordered_by_hash() {
        let mut folder = Folder::new("meshes/clutter");
        for name in ["zebra.nif", "apple.nif", "mango.dds", "kiwi.kf"] {
            folder.insert(File::new(name, Vec::new(), false));
        }

        let hashes: Vec<u64> = folder.files().map(|f| f.hash()).collect();
        let mut sorted = hashes.clone();
        sorted.sort_unstable();

        assert_eq!(hashes, sorted);
        assert_eq!(folder.path(), "meshes\\clutter");
        assert_eq!(folder.hash(), hash::hash_folder("meshes\\clutter"));
    }

    #[test]
    fn lookup_ignores_case() {
        let mut folder = Folder::new("textures");
        folder.insert(File::new("Helmet.DDS", b"x".to_vec(), false));

        assert!(folder.get("helmet.dds").is_some());
        assert_eq!(folder.by_name("HELMET.dds").map(|f| f.path()).ok(), Some("textures"));
        assert!(folder.by_name("missing.dds").is_err());
        assert!(folder.remove("helmet.DDS").is_some());
        assert!(folder.is_empty());
    }

    #[test]
    fn insert_replaces_same_name() {
        let mut folder = Folder::new("textures");
        assert!(folder.insert(File::new("a.dds", b"1".to_vec(), false)).is_none());
        assert!(folder.insert(File::new("A.dds", b"2".to_vec(), false)).is_some());
        assert_eq!(folder.len(), 1);
    }

    #[test]
    fn equal_hashes_are_ordered_by_name() {
        let first = HashKey::with_hash(7, "b");
        let second = HashKey::with_hash(7, "a");
        assert!(second < first);
        assert!(HashKey::with_hash(6, "z") < second);
    }
}
