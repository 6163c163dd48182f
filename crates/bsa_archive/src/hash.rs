//! Folder and file name hashing.
//!
//! Each hash packs four characters of the normalized name, its length, and a rolling checksum into 64 bits:
//!
//! | Bits    | Field                                              |
//! |---------|----------------------------------------------------|
//! | 0..8    | last character                                     |
//! | 8..16   | second to last character (names of 3+ characters)  |
//! | 16..24  | length, truncated to a byte                        |
//! | 24..32  | first character                                    |
//! | 32..64  | checksum of the middle characters (and extension)  |
//!
//! Names are lower-cased and `/` is treated as `\` before hashing, so hashes are case-insensitive.
//! File hashes are taken over the stem, with the extension folded into the checksum and, for a handful of
//! well known extensions, into the character bytes.

use std::borrow::Cow;

use crate::strings;

/// Extensions which adjust the character bytes of a file hash, indexed by their adjustment
const EXTENSION_TABLE: [&[u8]; 6] = [b"", b".nif", b".kf", b".dds", b".wav", b".adp"];

fn normalize(name: &[u8]) -> Vec<u8> {
    name.iter()
        .map(|&b| match b {
            b'/' => b'\\',
            _ => b.to_ascii_lowercase(),
        })
        .collect()
}

fn checksum(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |crc, &b| u32::from(b).wrapping_add(crc.wrapping_mul(0x1003F)))
}

fn four_cc(extension: &[u8]) -> u32 {
    let mut bytes = [0u8; 4];
    bytes
        .iter_mut()
        .zip(extension)
        .for_each(|(dst, &src)| *dst = src);
    u32::from_le_bytes(bytes)
}

fn pack(last: u8, last2: u8, length: u8, first: u8, crc: u32) -> u64 {
    u64::from(last)
        | u64::from(last2) << 8
        | u64::from(length) << 16
        | u64::from(first) << 24
        | u64::from(crc) << 32
}

fn parts(name: &[u8]) -> (u8, u8, u8, u8, u32) {
    let len = name.len();
    let (first, last) = match (name.first(), name.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => (0, 0),
    };
    let last2 = if len >= 3 { name[len - 2] } else { 0 };
    // the length byte wraps for long names, and the checksum is gated on the wrapped value
    let length = len as u8;
    let crc = if length > 3 { checksum(&name[1..len - 2]) } else { 0 };

    (last, last2, length, first, crc)
}

/// Hash the raw bytes of a folder path
pub fn hash_folder_bytes(path: &[u8]) -> u64 {
    let (last, last2, length, first, crc) = parts(&normalize(path));
    pack(last, last2, length, first, crc)
}

/// Hash the raw bytes of a file name. Any leading folder components are ignored.
pub fn hash_file_bytes(name: &[u8]) -> u64 {
    let mut name = normalize(name);
    if let Some(pos) = name.iter().rposition(|&b| b == b'\\') {
        name.drain(..=pos);
    }

    let (stem, extension) = match name.iter().rposition(|&b| b == b'.') {
        Some(split) => name.split_at(split),
        None => (name.as_slice(), &b""[..]),
    };

    if stem.is_empty() || stem.len() >= 260 || extension.len() >= 16 {
        return 0;
    }

    let (mut last, mut last2, length, mut first, crc) = parts(stem);
    let crc = crc.wrapping_add(checksum(extension));

    let cc = four_cc(extension);
    if let Some(i) = EXTENSION_TABLE.iter().position(|&e| four_cc(e) == cc) {
        let i = i as u32;
        first = (u32::from(first) + 32 * (i & 0xFC)) as u8;
        last = (u32::from(last) + ((i & 0xFE) << 6)) as u8;
        last2 = (u32::from(last2) + (i << 7)) as u8;
    }

    pack(last, last2, length, first, crc)
}

fn as_bytes(text: &str) -> Cow<'_, [u8]> {
    // hashing never fails; unmappable characters hash as their replacement bytes
    strings::encode(text).unwrap_or(Cow::Borrowed(text.as_bytes()))
}

/// Hash a folder path such as `textures\armor`
pub fn hash_folder(path: &str) -> u64 {
    hash_folder_bytes(&as_bytes(path))
}

/// Hash a file name such as `helmet.dds`
pub fn hash_file(name: &str) -> u64 {
    hash_file_bytes(&as_bytes(name))
}

/// Compute the hash of a name as either a folder or a file
pub fn hash(name: &str, is_folder: bool) -> u64 {
    if is_folder {
        hash_folder(name)
    } else {
        hash_file(name)
    }
}
