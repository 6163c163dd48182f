//! Files stored inside a folder of an archive

use std::borrow::Cow;
use std::fmt::{self, Debug};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tracing::instrument;

use crate::compression::{self, CompressionOptions};
use crate::error::{Error, Result};
use crate::hash;
use crate::read::ArchiveView;

/// Where the bytes of a file come from
#[derive(Clone)]
pub(crate) enum Payload {
    /// Uncompressed bytes held in memory
    Resident(Vec<u8>),

    /// Bytes stored in a read archive, not yet copied out of it
    Mapped {
        view: Arc<ArchiveView>,
        offset: usize,
        len: usize,
        compressed: bool,
    },
}

/// A single file of an archive
///
/// Files opened from an archive keep a shared handle to the archive's mapping and only pull their bytes out of
/// it when [`File::resolve`] is first called. Decompressed data is cached, so every later call returns the same
/// bytes.
pub struct File {
    name: Box<str>,
    folder: Box<str>,
    hash: u64,
    compressed: bool,
    size: u64,
    payload: Payload,
    resolved: OnceLock<Vec<u8>>,
    /// Held while decompressing so concurrent callers wait for the first one
    resolving: Mutex<()>,
}

impl Clone for File {
    fn clone(&self) -> File {
        File {
            name: self.name.clone(),
            folder: self.folder.clone(),
            hash: self.hash,
            compressed: self.compressed,
            size: self.size,
            payload: self.payload.clone(),
            resolved: self.resolved.clone(),
            resolving: Mutex::new(()),
        }
    }
}

impl Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("File")
            .field("name", &self.name)
            .field("folder", &self.folder)
            .field("hash", &format_args!("{:#018x}", self.hash))
            .field("compressed", &self.compressed)
            .field("size", &self.size)
            .field("compressed_size", &self.compressed_size())
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl File {
    /// Create a file from uncompressed bytes.
    ///
    /// `compressed` decides how the file is stored once the archive is written.
    pub fn new(name: impl Into<String>, data: Vec<u8>, compressed: bool) -> File {
        let name: Box<str> = name.into().into_boxed_str();
        File {
            hash: hash::hash_file(&name),
            name,
            folder: "".into(),
            compressed,
            size: data.len() as u64,
            payload: Payload::Resident(data),
            resolved: OnceLock::new(),
            resolving: Mutex::new(()),
        }
    }

    /// Create a file backed by a region of a read archive
    pub(crate) fn mapped(
        folder: &str,
        name: String,
        hash: u64,
        view: Arc<ArchiveView>,
        offset: usize,
        len: usize,
        compressed: bool,
    ) -> Result<File> {
        let stored = offset
            .checked_add(len)
            .and_then(|end| view.get(offset..end))
            .ok_or_else(|| {
                Error::CorruptArchive(format!(
                    "payload of {folder}\\{name} at {offset:#x}+{len:#x} is past the end of the archive"
                ))
            })?;

        let size = if compressed {
            u64::from(compression::original_size(&name, stored).map_err(|_| {
                Error::CorruptArchive(format!(
                    "compressed payload of {folder}\\{name} is shorter than its size prefix"
                ))
            })?)
        } else {
            len as u64
        };

        Ok(File {
            name: name.into_boxed_str(),
            folder: folder.into(),
            hash,
            compressed,
            size,
            payload: Payload::Mapped {
                view,
                offset,
                len,
                compressed,
            },
            resolved: OnceLock::new(),
            resolving: Mutex::new(()),
        })
    }

    /// Get the name of the file
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the path of the folder holding this file
    pub fn path(&self) -> &str {
        &self.folder
    }

    /// Get the folder path and name joined with a backslash
    ///
    /// # Warnings
    ///
    /// It is dangerous to use this name directly when extracting an archive.
    /// It may contain an absolute path or break out of the current directory (`..\runtime`).
    /// [`crate::Archive::unpack`] rejects such paths.
    pub fn full_path(&self) -> String {
        if self.folder.is_empty() {
            self.name.to_string()
        } else {
            format!("{}\\{}", self.folder, self.name)
        }
    }

    /// Hash of the file name
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Whether the file is (or will be) stored compressed
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Change how the file is stored the next time the archive is written
    pub fn set_compressed(&mut self, compressed: bool) {
        self.compressed = compressed;
    }

    /// Get the size of the file, in bytes, when uncompressed
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Get the size of the file, in bytes, as stored in the archive it was read from
    ///
    /// Includes the original size prefix of compressed payloads. Files which were not read from an archive
    /// return [`None`].
    pub fn compressed_size(&self) -> Option<u64> {
        match &self.payload {
            Payload::Resident(_) => None,
            Payload::Mapped { len, .. } => Some(*len as u64),
        }
    }

    /// Whether the bytes of this file are available without touching the archive
    pub fn is_resolved(&self) -> bool {
        match &self.payload {
            Payload::Resident(_) => true,
            Payload::Mapped { compressed, .. } => !compressed || self.resolved.get().is_some(),
        }
    }

    /// Get the uncompressed bytes of the file
    ///
    /// Uncompressed payloads are borrowed straight from the archive's mapping. Compressed payloads are
    /// decompressed on first access and cached.
    #[instrument(skip(self), fields(file = %self.name), err)]
    pub fn resolve(&self) -> Result<&[u8]> {
        match &self.payload {
            Payload::Resident(data) => Ok(data),
            Payload::Mapped {
                view,
                offset,
                len,
                compressed,
            } => {
                let stored = &view[*offset..*offset + *len];
                if !compressed {
                    return Ok(stored);
                }

                if let Some(data) = self.resolved.get() {
                    return Ok(data);
                }

                // a panic while decompressing leaves nothing cached, so a poisoned lock is still usable
                let _guard = self.resolving.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(data) = self.resolved.get() {
                    return Ok(data);
                }

                let data = compression::decompress(&self.full_path(), stored)?;
                Ok(self.resolved.get_or_init(|| data))
            }
        }
    }

    /// Copy the bytes of this file into memory, releasing its handle on the archive mapping
    pub fn detach(&mut self) -> Result<()> {
        if let Payload::Mapped { .. } = self.payload {
            let data = self.resolve()?.to_vec();
            self.payload = Payload::Resident(data);
            self.resolved = OnceLock::new();
        }
        Ok(())
    }

    /// Bytes to store for this file, compressed according to [`File::is_compressed`]
    ///
    /// Stored bytes are reused as they are when their compression already matches.
    pub(crate) fn stored_payload(&self, options: &CompressionOptions) -> Result<Cow<'_, [u8]>> {
        if let Payload::Mapped {
            view,
            offset,
            len,
            compressed,
        } = &self.payload
        {
            if *compressed == self.compressed {
                return Ok(Cow::Borrowed(&view[*offset..*offset + *len]));
            }
        }

        let data = self.resolve()?;
        if self.compressed {
            Ok(Cow::Owned(compression::compress(
                &self.full_path(),
                data,
                options,
            )?))
        } else {
            Ok(Cow::Borrowed(data))
        }
    }

    pub(crate) fn set_folder(&mut self, folder: &str) {
        self.folder = folder.into();
    }
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use pretty_assertions::assert_eq;

    use crate::compression::{self, CompressionOptions};
    use crate::error::{Error, Result};
    use crate::file::File;
    use crate::hash;
    use crate::read::ArchiveView;

    fn view_with(stored: &[u8]) -> Arc<ArchiveView> {
        let mut bytes = vec![0xAA; 8];
        bytes.extend_from_slice(stored);
        Arc::new(ArchiveView::Owned(bytes))
    }

    #[test]
    fn resident_file() -> Result<()> {
        let file = File::new("Helmet.dds", b"0123456789".to_vec(), false);
        assert_eq!(file.name(), "Helmet.dds");
        assert_eq!(file.hash(), hash::hash_file("helmet.dds"));
        assert_eq!(file.size(), 10);
        assert_eq!(file.compressed_size(), None);
        assert!(file.is_resolved());
        assert_eq!(file.resolve()?, b"0123456789");
        Ok(())
    }

    #[test]
    fn mapped_uncompressed_file_borrows() -> Result<()> {
        let view = view_with(b"hello");
        let file = File::mapped("docs", "a.txt".into(), 0, view, 8, 5, false)?;
        assert_eq!(file.full_path(), "docs\\a.txt");
        assert_eq!(file.size(), 5);
        assert_eq!(file.compressed_size(), Some(5));
        assert_eq!(file.resolve()?, b"hello");
        Ok(())
    }

    #[test]
    fn mapped_compressed_file_resolves_once() -> Result<()> {
        let stored = compression::compress("a.txt", b"hello hello hello", &Default::default())?;
        let file = File::mapped("docs", "a.txt".into(), 0, view_with(&stored), 8, stored.len(), true)?;

        assert_eq!(file.size(), 17);
        assert!(!file.is_resolved());

        let first = file.resolve()?.as_ptr();
        assert!(file.is_resolved());
        assert_eq!(file.resolve()?, b"hello hello hello");
        assert_eq!(file.resolve()?.as_ptr(), first);
        Ok(())
    }

    #[test]
    fn concurrent_resolves_share_one_copy() -> Result<()> {
        let data = b"shared payload ".repeat(512);
        let stored = compression::compress("a.txt", &data, &Default::default())?;
        let file = File::mapped("docs", "a.txt".into(), 0, view_with(&stored), 8, stored.len(), true)?;
        let barrier = Barrier::new(8);

        let pointers = thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        file.resolve().map(|bytes| bytes.as_ptr() as usize)
                    })
                })
                .collect();
            workers
                .into_iter()
                .map(|worker| worker.join().unwrap())
                .collect::<Result<Vec<_>>>()
        })?;

        assert!(pointers.iter().all(|&p| p == pointers[0]));
        assert_eq!(file.resolve()?, data.as_slice());
        Ok(())
    }

    #[test]
    fn mapped_file_out_of_bounds() {
        let result = File::mapped("docs", "a.txt".into(), 0, view_with(b"abc"), 8, 10, false);
        assert!(matches!(result, Err(Error::CorruptArchive(_))));
    }

    #[test]
    fn corrupt_payload_only_fails_that_file() -> Result<()> {
        let view = view_with(&[0x04, 0x00, 0x00, 0x00, 0xDE, 0xAD, b'o', b'k']);
        let broken = File::mapped("d", "broken.bin".into(), 0, view.clone(), 8, 6, true)?;
        let fine = File::mapped("d", "fine.bin".into(), 0, view, 14, 2, false)?;

        assert!(matches!(
            broken.resolve(),
            Err(Error::CompressionFailure { .. })
        ));
        assert_eq!(fine.resolve()?, b"ok");
        Ok(())
    }

    #[test]
    fn stored_payload_reuses_matching_bytes() -> Result<()> {
        let stored = compression::compress("a.txt", b"aaaaaaaaaaaaaaaa", &Default::default())?;
        let mut file = File::mapped("d", "a.txt".into(), 0, view_with(&stored), 8, stored.len(), true)?;

        let options = CompressionOptions::default();
        assert_eq!(file.stored_payload(&options)?.as_ref(), stored.as_slice());

        file.set_compressed(false);
        assert_eq!(file.stored_payload(&options)?.as_ref(), b"aaaaaaaaaaaaaaaa");
        Ok(())
    }

    #[test]
    fn detach_copies_bytes() -> Result<()> {
        let view = view_with(b"hello");
        let mut file = File::mapped("docs", "a.txt".into(), 0, view.clone(), 8, 5, false)?;
        file.detach()?;
        assert_eq!(Arc::strong_count(&view), 1);
        assert_eq!(file.resolve()?, b"hello");
        Ok(())
    }
}
