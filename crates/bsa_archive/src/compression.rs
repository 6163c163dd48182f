//! Payload compression and decompression handling.
//!
//! A compressed payload is stored as the 4 byte little endian length of the original data, followed by a zlib
//! stream. Only that prefix and the stored length are visible to the format, so the encoder settings may change
//! freely without affecting compatibility.

use std::io::{Read, Write};

use bon::Builder;
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use tracing::instrument;

use crate::error::{Error, Result};

/// Length of the original size prefix in front of compressed data
pub const ORIGINAL_SIZE_LEN: usize = 4;

/// What the encoder should favor when compressing payloads
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum CompressionStrategy {
    /// Smallest output, slowest encoding
    #[default]
    Size,

    /// Fastest encoding, larger output
    Speed,
}

impl CompressionStrategy {
    fn level(self) -> Compression {
        match self {
            CompressionStrategy::Size => Compression::best(),
            CompressionStrategy::Speed => Compression::fast(),
        }
    }
}

/// Options for how payloads are compressed when an archive is written
///
/// ```
/// use bsa_archive::compression::{CompressionOptions, CompressionStrategy};
///
/// let options = CompressionOptions::builder()
///     .strategy(CompressionStrategy::Speed)
///     .unsafe_mode(true)
///     .build();
/// assert!(options.unsafe_mode);
/// ```
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Builder)]
pub struct CompressionOptions {
    /// Trade off between output size and encoding speed
    #[builder(default)]
    pub strategy: CompressionStrategy,

    /// Skip decompressing freshly compressed data to verify it
    #[builder(default)]
    pub unsafe_mode: bool,
}

/// Compress `data` into the stored layout: original size prefix followed by a zlib stream.
///
/// Unless [`CompressionOptions::unsafe_mode`] is set, the output is decompressed again and compared against
/// the input before it is returned.
#[instrument(skip(data, options), fields(size = data.len()), err)]
pub fn compress(name: &str, data: &[u8], options: &CompressionOptions) -> Result<Vec<u8>> {
    let original_size = u32::try_from(data.len()).map_err(|_| Error::ArchiveTooLarge)?;

    let mut out = Vec::with_capacity(ORIGINAL_SIZE_LEN + data.len() / 2);
    out.write_u32::<LittleEndian>(original_size)?;

    let mut encoder = ZlibEncoder::new(out, options.strategy.level());
    encoder.write_all(data)?;
    let out = encoder.finish()?;

    if !options.unsafe_mode {
        let verified = decompress(name, &out)?;
        if verified != data {
            return Err(Error::CompressionFailure {
                name: name.to_owned(),
                reason: "compressed output does not round trip".into(),
            });
        }
    }

    Ok(out)
}

/// Original size recorded in front of a compressed payload
pub fn original_size(name: &str, stored: &[u8]) -> Result<u32> {
    if stored.len() < ORIGINAL_SIZE_LEN {
        return Err(Error::CompressionFailure {
            name: name.to_owned(),
            reason: format!("payload of {} bytes is missing its size prefix", stored.len()),
        });
    }
    Ok(LittleEndian::read_u32(stored))
}

/// Decompress a stored payload, checking the output against its original size prefix
#[instrument(skip(stored), fields(size = stored.len()), err)]
pub fn decompress(name: &str, stored: &[u8]) -> Result<Vec<u8>> {
    let expected = original_size(name, stored)? as usize;

    let mut out = Vec::with_capacity(expected);
    ZlibDecoder::new(&stored[ORIGINAL_SIZE_LEN..])
        .take(expected as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| Error::CompressionFailure {
            name: name.to_owned(),
            reason: e.to_string(),
        })?;

    if out.len() != expected {
        return Err(Error::CompressionFailure {
            name: name.to_owned(),
            reason: format!("expected {} bytes, decompressed {}", expected, out.len()),
        });
    }

    Ok(out)
}
