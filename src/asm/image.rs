//! Hex image format for 4004 programs.
//!
//! A plain text format:
//! - Bytes written as two hex digits, separated by whitespace
//! - Any number of bytes per line
//! - `;` starts a comment that runs to the end of the line
//! - Blank lines are ignored
//!
//! The first byte is loaded at address 0.

use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// Bytes per line in saved images.
const BYTES_PER_LINE: usize = 8;

/// Parse image text into bytes.
pub fn parse_image(text: &str) -> Result<Vec<u8>, ImageError> {
    let mut bytes = Vec::new();

    for (line_num, line) in text.lines().enumerate() {
        let data = line.split(';').next().unwrap_or_default();

        for token in data.split_whitespace() {
            if token.len() != 2 {
                return Err(ImageError::Parse {
                    line: line_num + 1,
                    message: format!("expected two hex digits, found '{token}'"),
                });
            }
            let byte = u8::from_str_radix(token, 16).map_err(|_| ImageError::Parse {
                line: line_num + 1,
                message: format!("invalid hex byte '{token}'"),
            })?;
            bytes.push(byte);
        }
    }

    Ok(bytes)
}

/// Render bytes as image text, with each line's nibble address noted in
/// a trailing comment.
pub fn format_image(bytes: &[u8]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "; i4004 program image");
    let _ = writeln!(out, "; {} bytes", bytes.len());
    out.push('\n');

    for (row, chunk) in bytes.chunks(BYTES_PER_LINE).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02X}")).collect();
        let _ = writeln!(out, "{:<23} ; {:03X}", hex.join(" "), row * BYTES_PER_LINE * 2);
    }

    out
}

/// Load an image file from disk.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<Vec<u8>, ImageError> {
    let text = std::fs::read_to_string(path.as_ref())?;
    parse_image(&text)
}

/// Save bytes to an image file.
pub fn save_image<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<(), ImageError> {
    let mut file = std::fs::File::create(path.as_ref())?;
    file.write_all(format_image(bytes).as_bytes())?;
    Ok(())
}

/// Errors that can occur reading or writing images.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_comments() {
        let text = "; header\n\n20 0C ; FIM\nd3 f2\n";
        assert_eq!(parse_image(text).unwrap(), vec![0x20, 0x0C, 0xD3, 0xF2]);
    }

    #[test]
    fn test_parse_errors_report_line() {
        match parse_image("00\n0G\n") {
            Err(ImageError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(parse_image("123"), Err(ImageError::Parse { line: 1, .. })));
    }

    #[test]
    fn test_format_then_parse() {
        let bytes: Vec<u8> = (0..20).collect();
        let text = format_image(&bytes);
        assert!(text.contains("; 010"));
        assert_eq!(parse_image(&text).unwrap(), bytes);
    }

    #[test]
    fn test_file_round_trip() {
        let path = std::env::temp_dir().join(format!("i4004-image-{}.hex", std::process::id()));
        save_image(&path, &[0x40, 0x00]).unwrap();
        assert_eq!(load_image(&path).unwrap(), vec![0x40, 0x00]);
        let _ = std::fs::remove_file(&path);
    }
}
