//! Output naming.
//!
//! Output names are derived from the input *name*, not its content: two
//! different files uploaded under the same name map to the same output.

use chrono::{Datelike, NaiveDate};
use cq_core::QualityLevel;
use sha2::{Digest, Sha256};

/// Hex characters kept from the digest.
const HASH_LEN: usize = 16;

/// First 16 hex characters of the SHA-256 of `input_file`.
pub fn input_hash(input_file: &str) -> String {
    let digest = Sha256::digest(input_file.as_bytes());
    hex::encode(&digest[..HASH_LEN / 2])
}

/// Container/extension for a format identifier: the part before any `-`.
pub fn extension_for(format: &str) -> String {
    format
        .trim()
        .split('-')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// `<hash>[-<quality>].<extension>`; the suffix appears only when the task
/// names a quality.
pub fn output_file_name(input_file: &str, format: &str, quality: Option<QualityLevel>) -> String {
    let hash = input_hash(input_file);
    let ext = extension_for(format);
    match quality {
        Some(q) => format!("{hash}-{q}.{ext}"),
        None => format!("{hash}.{ext}"),
    }
}

/// Dated output directory name, `YYYY-M-D` without zero padding.
pub fn dated_dir_name(date: NaiveDate) -> String {
    format!("{}-{}-{}", date.year(), date.month(), date.day())
}
