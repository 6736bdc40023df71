//! Printable-binary rendering of keys, used by cut-point dumps, key files and
//! bad-record descriptors.
//!
//! Printable ASCII (`0x20..=0x7E`) is kept as is, except the backslash; every
//! other byte is written as `\xHH`.

use std::fmt::Write;

use rangeload_common::{Result, error::Error};

pub fn to_printable(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        if (0x20..=0x7E).contains(&b) && b != b'\\' {
            out.push(b as char);
        } else {
            let _ = write!(out, "\\x{b:02X}");
        }
    }
    out
}

pub fn from_printable(s: &str) -> Result<Vec<u8>> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        let hex = bytes
            .get(i + 1..i + 4)
            .filter(|esc| esc[0] == b'x')
            .and_then(|esc| std::str::from_utf8(&esc[1..]).ok())
            .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            .ok_or_else(|| Error::invalid_format("printable key", format!("bad escape at {i}")))?;
        out.push(hex);
        i += 4;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_printable() {
        assert_eq!(to_printable(b"abc 123"), "abc 123");
        assert_eq!(to_printable(&[0x00, b'a', 0xFF]), "\\x00a\\xFF");
        assert_eq!(to_printable(b"a\\b"), "a\\x5Cb");
        assert_eq!(to_printable(b"\n"), "\\x0A");
    }

    #[test]
    fn test_from_printable() {
        let key = [0u8, 1, b'k', b'\\', 0x7F, 0x80, b'x'];
        assert_eq!(from_printable(&to_printable(&key)).unwrap(), key);
        assert_eq!(from_printable("\\x0a").unwrap(), vec![0x0A]);
        assert!(from_printable("\\x0").is_err());
        assert!(from_printable("\\y00").is_err());
        assert!(from_printable("\\xZZ").is_err());
    }
}
