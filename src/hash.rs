use crate::error::EngineError;
use image::imageops::FilterType;
use std::io::Cursor;

/// Perceptual (difference) hash of raw image bytes as a 16-digit hex string.
///
/// Pipeline: decode, grayscale, resize to 9x8 with a fixed triangle filter,
/// emit one bit per horizontal gradient (left pixel brighter than right).
/// Same bytes always produce the same hash; dedup depends on that.
pub fn perceptual_hash(bytes: &[u8]) -> Result<String, EngineError> {
    let img = decode(bytes)?;
    let gray = img.resize_exact(9, 8, FilterType::Triangle).to_luma8();

    let mut bits: u64 = 0;
    let mut i = 0;
    for y in 0..8 {
        for x in 0..8 {
            let left = gray.get_pixel(x, y).0[0];
            let right = gray.get_pixel(x + 1, y).0[0];
            if left > right {
                bits |= 1u64 << i;
            }
            i += 1;
        }
    }
    Ok(format!("{bits:016x}"))
}

/// Average hash: 8x8 grayscale, one bit per pixel above the mean brightness.
pub fn average_hash(bytes: &[u8]) -> Result<String, EngineError> {
    let img = decode(bytes)?;
    let gray = img.resize_exact(8, 8, FilterType::Triangle).to_luma8();

    let mut px = [0u8; 64];
    let mut sum: u64 = 0;
    for (i, p) in gray.pixels().enumerate() {
        px[i] = p.0[0];
        sum += p.0[0] as u64;
    }
    let avg = (sum / 64) as u8;

    let mut bits: u64 = 0;
    for (i, &v) in px.iter().enumerate() {
        if v > avg {
            bits |= 1u64 << i;
        }
    }
    Ok(format!("{bits:016x}"))
}

fn decode(bytes: &[u8]) -> Result<image::DynamicImage, EngineError> {
    image::io::Reader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| EngineError::Decode(e.to_string()))?
        .decode()
        .map_err(|e| EngineError::Decode(e.to_string()))
}

/// Hamming distance between two hex-encoded hashes.
///
/// Returns `None` when the strings are not comparable (different lengths or
/// non-hex characters). Hashes from different algorithms/versions coexist
/// during migration, so incomparable means "never a match", not an error.
pub fn hamming_distance(a: &str, b: &str) -> Option<u32> {
    if a.len() != b.len() {
        return None;
    }
    let mut distance = 0u32;
    for (ca, cb) in a.chars().zip(b.chars()) {
        let va = ca.to_digit(16)?;
        let vb = cb.to_digit(16)?;
        distance += (va ^ vb).count_ones();
    }
    Some(distance)
}
