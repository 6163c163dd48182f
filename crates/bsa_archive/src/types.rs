//! Base types for structure of BSA file.

use std::io::Cursor;

use binrw::{BinRead, BinWrite};
use bitflags::bitflags;

use crate::error::{Error, Result};

/// The only archive version this crate reads and writes (Fallout 3 / New Vegas)
pub const SUPPORTED_VERSION: u32 = 0x68;

/// Size of [`ArchiveHeader`] on disk, also the offset of the first folder record
pub const HEADER_SIZE: u32 = 0x24;

/// Size of a [`FolderRecord`] or [`FileRecord`] on disk
pub const RECORD_SIZE: u32 = 0x10;

/// Offset of the `offset` field within a folder or file record
pub const RECORD_OFFSET_FIELD: u32 = 0x0C;

/// Bit of a file record's size flipping the archive's default compression for that file
pub const SIZE_COMPRESSION_TOGGLE: u32 = 0x4000_0000;

/// Bits of a file record's size holding the stored length
pub const SIZE_MASK: u32 = 0x3FFF_FFFF;

bitflags! {
    /// Archive wide flags stored in the header
    #[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
    pub struct ArchiveFlags: u32 {
        /// Folder records are followed by their names
        const NAMED_FOLDERS = 0x1;
        /// The file name table is present
        const NAMED_FILES = 0x2;
        /// Files are compressed unless their record says otherwise
        const COMPRESSED = 0x4;
        /// Each payload starts with the file's full path as a BString
        const BSTRING_PREFIXED = 0x100;
    }
}

bitflags! {
    /// Summary of the kinds of files an archive holds, derived from their extensions
    #[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
    pub struct FileFlags: u32 {
        /// `.nif`
        const NIF = 0x1;
        /// `.dds`
        const DDS = 0x2;
        /// `.xml`
        const XML = 0x4;
        /// `.wav`
        const WAV = 0x8;
        /// `.mp3`, `.ogg`
        const OGG = 0x10;
        /// `.txt`, `.html`, `.bat`, `.scc`
        const TXT = 0x20;
        /// `.spt`
        const SPT = 0x40;
        /// `.tex`, `.fnt`
        const TEX = 0x80;
        /// `.ctl`, `.dlodsettings`
        const CTL = 0x100;
    }
}

impl FileFlags {
    /// Flag for a file name, by its extension
    pub fn from_extension(name: &str) -> FileFlags {
        let extension = match name.rfind('.') {
            Some(i) => name[i..].to_ascii_lowercase(),
            None => return FileFlags::empty(),
        };

        match extension.as_str() {
            ".nif" => FileFlags::NIF,
            ".dds" => FileFlags::DDS,
            ".xml" => FileFlags::XML,
            ".wav" => FileFlags::WAV,
            ".mp3" | ".ogg" => FileFlags::OGG,
            ".txt" | ".html" | ".bat" | ".scc" => FileFlags::TXT,
            ".spt" => FileFlags::SPT,
            ".tex" | ".fnt" => FileFlags::TEX,
            ".ctl" | ".dlodsettings" => FileFlags::CTL,
            _ => FileFlags::empty(),
        }
    }

    /// Union of the flags of every name
    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> FileFlags {
        names
            .into_iter()
            .fold(FileFlags::empty(), |flags, name| flags | FileFlags::from_extension(name))
    }
}

/// BSA file header
///
/// Defines the header of the BSA file which always starts with "BSA\0".
/// All data is stored in little endian format
#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq)]
#[brw(magic = b"BSA\0", little)]
pub struct ArchiveHeader {
    /// Format version, [`SUPPORTED_VERSION`] for archives this crate understands
    pub version: u32,

    /// Size of this header, which is also where the folder records begin
    pub offset: u32,

    /// Archive wide flags
    #[br(map = ArchiveFlags::from_bits_retain)]
    #[bw(map = |flags: &ArchiveFlags| flags.bits())]
    pub archive_flags: ArchiveFlags,

    /// The number of folders stored in the file
    pub folder_count: u32,

    /// The number of files stored in the file
    pub file_count: u32,

    /// Bytes used by all folder names, each counted with its terminator
    pub total_folder_name_length: u32,

    /// Bytes used by the file name table, each name counted with its terminator
    pub total_file_name_length: u32,

    /// Kinds of files present in the archive
    #[br(map = FileFlags::from_bits_retain)]
    #[bw(map = |flags: &FileFlags| flags.bits())]
    pub file_flags: FileFlags,
}

impl Default for ArchiveHeader {
    fn default() -> Self {
        Self {
            version: SUPPORTED_VERSION,
            offset: HEADER_SIZE,
            archive_flags: ArchiveFlags::NAMED_FOLDERS | ArchiveFlags::NAMED_FILES,
            folder_count: Default::default(),
            file_count: Default::default(),
            total_folder_name_length: Default::default(),
            total_file_name_length: Default::default(),
            file_flags: Default::default(),
        }
    }
}

impl ArchiveHeader {
    /// Decode and validate a header from the start of `window`
    pub fn decode(window: &[u8]) -> Result<ArchiveHeader> {
        if window.len() >= 4 && &window[..4] != b"BSA\0" {
            return Err(Error::BadMagic);
        }

        let header: ArchiveHeader = decode_record(window, "archive header", HEADER_SIZE)?;
        if header.version != SUPPORTED_VERSION {
            return Err(Error::UnsupportedVersion(header.version));
        }
        if header.offset != HEADER_SIZE {
            return Err(Error::CorruptArchive(format!(
                "header size is {:#x}, expected {HEADER_SIZE:#x}",
                header.offset
            )));
        }

        Ok(header)
    }

    /// Position of the flat file name table
    pub fn file_names_offset(&self) -> u64 {
        u64::from(self.offset)
            + u64::from(self.folder_count) * u64::from(RECORD_SIZE)
            + u64::from(self.total_folder_name_length)
            + u64::from(self.folder_count)
            + u64::from(self.file_count) * u64::from(RECORD_SIZE)
    }
}

/// BSA folder record
///
/// Points at the folder's name and file record block
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct FolderRecord {
    /// Hash of the folder path
    pub hash: u64,

    /// The number of files in the folder
    pub count: u32,

    /// Position of the folder's file record block, biased by the total file name length
    pub offset: u32,
}

impl FolderRecord {
    /// Decode a folder record from the start of `window`
    pub fn decode(window: &[u8]) -> Result<FolderRecord> {
        decode_record(window, "folder record", RECORD_SIZE)
    }
}

/// BSA file record
///
/// Defines an entry in the BSA file
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct FileRecord {
    /// Hash of the file name
    pub hash: u64,

    /// Stored length, with [`SIZE_COMPRESSION_TOGGLE`] set when the file differs from the archive default
    pub size: u32,

    /// Offset to the payload from the start of the file
    pub offset: u32,
}

impl FileRecord {
    /// Decode a file record from the start of `window`
    pub fn decode(window: &[u8]) -> Result<FileRecord> {
        decode_record(window, "file record", RECORD_SIZE)
    }

    /// Encode a stored length and whether compression is flipped relative to the archive
    pub fn encode_size(length: u32, toggled: bool) -> Result<u32> {
        if length & !SIZE_MASK != 0 {
            return Err(Error::ArchiveTooLarge);
        }
        Ok(if toggled {
            length | SIZE_COMPRESSION_TOGGLE
        } else {
            length
        })
    }

    /// Number of payload bytes stored in the archive
    pub fn stored_len(&self) -> u32 {
        self.size & SIZE_MASK
    }

    /// Whether this file is stored with the opposite of the archive's default compression
    pub fn compression_toggled(&self) -> bool {
        self.size & SIZE_COMPRESSION_TOGGLE != 0
    }
}

fn decode_record<T>(window: &[u8], record: &'static str, size: u32) -> Result<T>
where
    T: for<'a> BinRead<Args<'a> = ()>,
{
    let size = size as usize;
    if window.len() < size {
        return Err(Error::TruncatedRecord {
            record,
            expected: size,
            available: window.len(),
        });
    }

    Ok(T::read_le(&mut Cursor::new(&window[..size]))?)
}
