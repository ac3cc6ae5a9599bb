//! Firmware image sources.
//!
//! An image is an ordered list of text lines, each a one-character marker
//! followed by hex digit pairs (e.g. an Intel-HEX file). Lines are shipped
//! verbatim; record types are not interpreted.

use crate::error::{Error, Result};
use log::debug;
use std::fs;
use std::path::Path;

/// Anything that can produce the ordered lines of an image.
pub trait ImageSource {
    /// Lines of the image, in transmission order.
    fn lines(&self) -> Result<Vec<String>>;
}

/// Hex image held in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HexImage {
    lines: Vec<String>,
}

impl HexImage {
    /// Build an image from text lines. Blank lines are skipped and
    /// surrounding whitespace (including `\r`) is trimmed.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            lines: lines
                .into_iter()
                .map(|l| l.as_ref().trim().to_string())
                .filter(|l| !l.is_empty())
                .collect(),
        }
    }

    /// Parse an image from file contents.
    pub fn parse(text: &str) -> Self {
        Self::from_lines(text.lines())
    }

    /// Load an image from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| Error::InvalidImage(format!("{}: {e}", path.display())))?;
        let image = Self::parse(&text);
        debug!("Loaded {} lines from {}", image.len(), path.display());
        Ok(image)
    }

    /// Number of lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the image has no lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Payload bytes implied by the lines (hex pairs after the marker).
    pub fn byte_count(&self) -> usize {
        self.lines
            .iter()
            .map(|l| l.len().saturating_sub(1) / 2)
            .sum()
    }
}

impl ImageSource for HexImage {
    fn lines(&self) -> Result<Vec<String>> {
        Ok(self.lines.clone())
    }
}

impl ImageSource for [String] {
    fn lines(&self) -> Result<Vec<String>> {
        Ok(self.to_vec())
    }
}

impl ImageSource for Vec<String> {
    fn lines(&self) -> Result<Vec<String>> {
        Ok(self.clone())
    }
}

impl ImageSource for [&str] {
    fn lines(&self) -> Result<Vec<String>> {
        Ok(self.iter().map(|l| (*l).to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_parse_skips_blank_lines() {
        let image = HexImage::parse(":10000000AABB\r\n\r\n  :0300000102  \n");
        assert_eq!(image.len(), 2);
        assert_eq!(
            image.lines().unwrap(),
            vec![":10000000AABB".to_string(), ":0300000102".to_string()]
        );
    }

    #[test]
    fn test_byte_count() {
        let image = HexImage::from_lines([":0102", ":030405"]);
        assert_eq!(image.byte_count(), 5);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, ":0A0B0C").unwrap();
        writeln!(file, ":0D0E0F").unwrap();

        let image = HexImage::from_file(file.path()).unwrap();
        assert_eq!(image.len(), 2);
        assert!(!image.is_empty());
    }

    #[test]
    fn test_from_missing_file() {
        let err = HexImage::from_file("/nonexistent/firmware.hex").unwrap_err();
        assert!(matches!(err, Error::InvalidImage(_)));
    }

    #[test]
    fn test_slice_sources() {
        let lines: &[&str] = &[":010203"];
        assert_eq!(lines.lines().unwrap(), vec![":010203".to_string()]);
    }
}
