//! Length prefixed and NUL terminated string codecs.
//!
//! Every name stored in a BSA is Windows-1252 text. Three layouts are used:
//!
//! - **BString**: one length byte followed by that many bytes
//! - **BZString**: a BString whose payload always ends with a NUL
//! - **CString**: bytes up to and including a NUL terminator
//!
//! Readers work on a borrowed byte window and report how many bytes they consumed, so they never read past
//! the declared length or terminator.

use std::borrow::Cow;
use std::io::Write;

use byteorder::WriteBytesExt;
use encoding_rs::WINDOWS_1252;

use crate::error::{Error, Result};

/// Encode text as Windows-1252, failing if any character has no mapping
pub fn encode(text: &str) -> Result<Cow<'_, [u8]>> {
    let (bytes, _, had_errors) = WINDOWS_1252.encode(text);
    if had_errors {
        return Err(Error::UnencodableName(text.to_owned()));
    }
    Ok(bytes)
}

/// Decode Windows-1252 bytes. Every byte value has a mapping so this cannot fail.
pub fn decode(bytes: &[u8]) -> String {
    WINDOWS_1252.decode_without_bom_handling(bytes).0.into_owned()
}

/// Number of bytes `text` occupies once encoded, without any prefix or terminator
pub fn encoded_len(text: &str) -> Result<usize> {
    encode(text).map(|b| b.len())
}

/// Read a BString from the start of `window`, returning the text and the bytes consumed
pub fn read_bstring(window: &[u8]) -> Result<(String, usize)> {
    let Some(&length) = window.first() else {
        return Err(Error::TruncatedRecord {
            record: "bstring",
            expected: 1,
            available: 0,
        });
    };

    let end = 1 + length as usize;
    let Some(bytes) = window.get(1..end) else {
        return Err(Error::TruncatedRecord {
            record: "bstring",
            expected: end,
            available: window.len(),
        });
    };

    Ok((decode(bytes), end))
}

/// Read a BZString, dropping the trailing terminator(s) from the returned text
pub fn read_bzstring(window: &[u8]) -> Result<(String, usize)> {
    let (mut text, consumed) = read_bstring(window)?;
    let trimmed = text.trim_end_matches('\0').len();
    text.truncate(trimmed);
    Ok((text, consumed))
}

/// Read a CString from the start of `window`, returning the text and the bytes consumed including the NUL
pub fn read_cstring(window: &[u8]) -> Result<(String, usize)> {
    match window.iter().position(|&b| b == 0) {
        Some(end) => Ok((decode(&window[..end]), end + 1)),
        None => Err(Error::TruncatedRecord {
            record: "cstring",
            expected: window.len() + 1,
            available: window.len(),
        }),
    }
}

/// Write `text` as a BString
pub fn write_bstring<W: Write>(writer: &mut W, text: &str) -> Result<()> {
    let bytes = encode(text)?;
    let length = u8::try_from(bytes.len()).map_err(|_| Error::NameTooLong(text.to_owned()))?;
    writer.write_u8(length)?;
    writer.write_all(&bytes)?;
    Ok(())
}

/// Write `text` as a BString, appending a terminator unless it already ends with one
pub fn write_bzstring<W: Write>(writer: &mut W, text: &str) -> Result<()> {
    if text.ends_with('\0') {
        write_bstring(writer, text)
    } else {
        write_bstring(writer, &format!("{text}\0"))
    }
}

/// Write `text` followed by a NUL terminator
pub fn write_cstring<W: Write>(writer: &mut W, text: &str) -> Result<()> {
    writer.write_all(&encode(text)?)?;
    writer.write_u8(0)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::Result;

    #[test]
    fn read_bstring_stops_at_length() -> Result<()> {
        let input = [0x03, b'a', b'b', b'c', b'd', b'e'];
        assert_eq!(read_bstring(&input)?, ("abc".to_string(), 4));
        Ok(())
    }

    #[test]
    fn read_bstring_truncated() {
        let input = [0x05, b'a', b'b'];
        assert!(matches!(
            read_bstring(&input),
            Err(Error::TruncatedRecord {
                expected: 6,
                available: 3,
                ..
            })
        ));
        assert!(read_bstring(&[]).is_err());
    }

    #[test]
    fn read_bzstring_strips_terminator() -> Result<()> {
        let input = [0x04, b'a', b'b', b'c', 0x00, 0xFF];
        assert_eq!(read_bzstring(&input)?, ("abc".to_string(), 5));
        Ok(())
    }

    #[test]
    fn read_cstring_consumes_terminator() -> Result<()> {
        let input = [b'a', b'.', b'd', b'd', b's', 0x00, b'b', 0x00];
        assert_eq!(read_cstring(&input)?, ("a.dds".to_string(), 6));
        assert_eq!(read_cstring(&input[6..])?, ("b".to_string(), 2));
        Ok(())
    }

    #[test]
    fn read_cstring_without_terminator() {
        assert!(read_cstring(b"abc").is_err());
    }

    #[test]
    fn write_bzstring_appends_single_terminator() -> Result<()> {
        let mut plain = Vec::new();
        write_bzstring(&mut plain, "abc")?;
        assert_eq!(plain, vec![0x04, b'a', b'b', b'c', 0x00]);

        let mut terminated = Vec::new();
        write_bzstring(&mut terminated, "abc\0")?;
        assert_eq!(terminated, plain);
        Ok(())
    }

    #[test]
    fn write_cstring_terminates() -> Result<()> {
        let mut actual = Vec::new();
        write_cstring(&mut actual, "x.nif")?;
        assert_eq!(actual, b"x.nif\0".to_vec());
        Ok(())
    }

    #[test]
    fn windows_1252_round_trip() -> Result<()> {
        let mut actual = Vec::new();
        write_bstring(&mut actual, "María")?;
        assert_eq!(actual, vec![0x05, b'M', b'a', b'r', 0xED, b'a']);
        assert_eq!(read_bstring(&actual)?.0, "María");
        Ok(())
    }

    #[test]
    fn unencodable_and_oversized_names() -> Result<()> {
        let mut sink = Vec::new();
        assert!(matches!(
            write_cstring(&mut sink, "日本"),
            Err(Error::UnencodableName(_))
        ));
        assert!(matches!(
            write_bstring(&mut sink, &"a".repeat(256)),
            Err(Error::NameTooLong(_))
        ));

        let longest = "a".repeat(255);
        write_bstring(&mut sink, &longest)?;
        let error = write_bstring(&mut sink, &format!("{longest}b"))
            .err()
            .map(|e| e.to_string());
        assert!(error.is_some_and(|e| e.ends_with("is longer than 255 bytes")));
        Ok(())
    }
}
