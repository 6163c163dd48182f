//! This library handles reading from and creating **BSA** files used by *Fallout 3* and *Fallout: New Vegas*.
//!
//! # BSA Archive Format Documentation
//!
//! A BSA archive stores a two level tree of folders and files within a single file. Folders and files are
//! identified by a 64-bit hash of their name (see [`hash`]) and are always stored in ascending hash order.
//! BSA files are typically identified with the `.bsa` extension.
//!
//! ## File Structure
//!
//! An archive consists of a header, the folder records, a block per folder holding its name and file
//! records, the file name table, and finally the file data.
//!
//! | Offset (bytes) | Field                  | Description                                                |
//! |----------------|------------------------|------------------------------------------------------------|
//! | 0x0000         | Magic number           | 4 bytes: "BSA\0"                                           |
//! | 0x0004         | Version                | 4 bytes: Fixed value 0x68                                  |
//! | 0x0008         | Header Size            | 4 bytes: Fixed value 0x24, where the folder records start  |
//! | 0x000C         | Archive Flags          | 4 bytes: See below                                         |
//! | 0x0010         | Folder Count           | 4 bytes: Number of folders in the archive                  |
//! | 0x0014         | File Count             | 4 bytes: Number of files in the archive                    |
//! | 0x0018         | Total Folder Name Len. | 4 bytes: Bytes of all folder names, with terminators       |
//! | 0x001C         | Total File Name Len.   | 4 bytes: Bytes of the file name table                      |
//! | 0x0020         | File Flags             | 4 bytes: Kinds of files present, by extension              |
//!
//! ### Header
//!
//! - **Archive Flags**:
//!   - `0x001`: Folder names are stored
//!   - `0x002`: File names are stored
//!   - `0x004`: Files are compressed by default
//!   - `0x100`: Each file's data starts with its full path
//! - **File Flags**: One bit for each known extension (`.nif`, `.dds`, `.xml`, `.wav`, ...), see
//!   [`types::FileFlags`]. Only used by the game as a hint.
//!
//! ### Folder Records
//!
//! One 16 byte record per folder directly follows the header.
//!
//! | Offset (bytes) | Field                  | Description                                             |
//! |----------------|------------------------|---------------------------------------------------------|
//! | 0x0000         | Hash                   | 8 bytes: Hash of the folder path                        |
//! | 0x0008         | Count                  | 4 bytes: Number of files in the folder                  |
//! | 0x000C         | Offset                 | 4 bytes: Position of the folder's block                 |
//!
//! The offset is the absolute position of the folder's block *plus* the total file name length.
//!
//! ### Folder Blocks
//!
//! Each block holds the folder path as a length prefixed, NUL terminated string followed by one 16 byte
//! record per file:
//!
//! | Offset (bytes) | Field                  | Description                                             |
//! |----------------|------------------------|---------------------------------------------------------|
//! | 0x0000         | Hash                   | 8 bytes: Hash of the file name                          |
//! | 0x0008         | Size                   | 4 bytes: Stored length of the data                      |
//! | 0x000C         | Offset                 | 4 bytes: Absolute position of the data                  |
//!
//! Bit `0x40000000` of the size flips the archive's default compression for that file.
//!
//! ### File Name Table
//!
//! Every file name, NUL terminated, in the same order as the file records. Names are matched to records by
//! position only.
//!
//! ### File Data
//!
//! Compressed files start with the 4 byte length of the uncompressed data, followed by a zlib stream.
//! Archives with the `0x100` flag put the file's full path, as a length prefixed string, in front of that.
//!
//! ## Additional Information
//!
//! - **File Extension**: `.bsa`
//! - **Endianness**: Little-endian for all multi-byte integers
//! - **Text Encoding**: Windows-1252
//!

pub mod archive;
pub mod compression;
pub mod error;
pub mod file;
pub mod folder;
pub mod hash;
pub mod read;
pub mod strings;
pub mod types;
pub mod unpack;
pub mod write;

pub use archive::{Archive, ArchiveSettings};
pub use compression::{CompressionOptions, CompressionStrategy};
pub use file::File;
pub use folder::{Folder, HashKey};
pub use unpack::{UnpackOptions, UnpackProgress};
pub use write::ArchiveWriter;
