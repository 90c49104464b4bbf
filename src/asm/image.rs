//! ROM image files.
//!
//! Two formats are accepted:
//! - raw binary (any extension other than `.hex`), one byte per ROM word
//! - hex text (`.hex`): whitespace-separated hex bytes, `;` comments and
//!   blank lines ignored

use crate::cpu::memory::ROM_SIZE;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// Load a ROM image from disk, choosing the format by extension.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<Vec<u8>, ImageError> {
    let path = path.as_ref();
    let is_hex = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("hex"));

    let image = if is_hex {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ImageError::IoError(e.to_string()))?;
        parse_hex(&text)?
    } else {
        std::fs::read(path).map_err(|e| ImageError::IoError(e.to_string()))?
    };

    if image.len() > ROM_SIZE {
        return Err(ImageError::TooLarge(image.len()));
    }

    Ok(image)
}

/// Parse hex text into bytes.
pub fn parse_hex(text: &str) -> Result<Vec<u8>, ImageError> {
    let mut bytes = Vec::new();

    for (line_num, line) in text.lines().enumerate() {
        // Skip comments
        let data = match line.find(';') {
            Some(idx) => &line[..idx],
            None => line,
        };

        for token in data.split_whitespace() {
            let digits = token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token);
            let byte = u8::from_str_radix(digits, 16).map_err(|_| ImageError::ParseError {
                line: line_num + 1,
                message: format!("invalid hex byte '{}'", token),
            })?;
            bytes.push(byte);
        }
    }

    Ok(bytes)
}

/// Render bytes as hex text, 16 per line with an address comment.
pub fn format_hex(image: &[u8]) -> String {
    let mut out = String::new();
    out.push_str("; 4004 ROM image\n");
    out.push_str(&format!("; {} bytes\n\n", image.len()));

    for (row, chunk) in image.chunks(16).enumerate() {
        let line: Vec<String> = chunk.iter().map(|b| format!("{:02X}", b)).collect();
        out.push_str(&format!("{} ; {:03X}\n", line.join(" "), row * 16));
    }

    out
}

/// Save bytes as a hex text image.
pub fn save_hex<P: AsRef<Path>>(path: P, image: &[u8]) -> Result<(), ImageError> {
    let mut file = std::fs::File::create(path.as_ref())
        .map_err(|e| ImageError::IoError(e.to_string()))?;
    file.write_all(format_hex(image).as_bytes())
        .map_err(|e| ImageError::IoError(e.to_string()))
}

/// Errors that can occur while reading or writing images.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("parse error on line {line}: {message}")]
    ParseError { line: usize, message: String },

    #[error("image of {0} bytes does not fit in ROM")]
    TooLarge(usize),
}
