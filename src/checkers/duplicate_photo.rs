//! Duplicate-photo detection: the same photo showing up on two different
//! listings is the classic sign of a scraped or fabricated posting.
//!
//! Compares every hashed image of the listing under evaluation against the
//! hashed images of all other ACTIVE/DRAFT listings. That pairwise scan is
//! O(n*m) and fine for the catalog sizes this runs against today; past that,
//! hash-prefix bucketing is the known fix (the matching semantics must not
//! change).

use super::parse_params;
use crate::error::EngineResult;
use crate::hash::hamming_distance;
use crate::model::Finding;
use crate::store::Store;
use serde::Deserialize;

/// Violation records stay small: only the first few matches are persisted.
const MAX_REPORTED_MATCHES: usize = 5;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DuplicatePhotoParams {
    /// Maximum Hamming distance still counted as "the same photo".
    pub hash_threshold: u32,
    /// Informational only; shown in the admin UI next to the threshold.
    pub min_similarity: f64,
}

impl Default for DuplicatePhotoParams {
    fn default() -> Self {
        DuplicatePhotoParams {
            hash_threshold: 5,
            min_similarity: 0.9,
        }
    }
}

pub async fn check(
    store: &Store,
    listing_id: &str,
    params: &serde_json::Value,
) -> EngineResult<Option<Finding>> {
    let params: DuplicatePhotoParams = parse_params("duplicate_photo", params)?;

    let own_hashes: Vec<(i64, String)> = store
        .images_for_listing(listing_id)?
        .into_iter()
        .filter_map(|img| img.perceptual_hash.map(|h| (img.id, h)))
        .collect();
    if own_hashes.is_empty() {
        // Nothing hashed yet (or no photos at all); nothing to compare.
        return Ok(None);
    }

    let candidates = store.other_listing_hashes(listing_id)?;

    let mut match_count: u64 = 0;
    let mut matches = Vec::new();
    for (_own_id, own_hash) in &own_hashes {
        for (other_listing, other_image, other_hash) in &candidates {
            // Incomparable hashes (length mismatch, migration leftovers)
            // are never a match.
            let Some(distance) = hamming_distance(own_hash, other_hash) else {
                continue;
            };
            if distance <= params.hash_threshold {
                match_count += 1;
                if matches.len() < MAX_REPORTED_MATCHES {
                    matches.push(serde_json::json!({
                        "listingId": other_listing,
                        "imageId": other_image,
                        "distance": distance,
                    }));
                }
            }
        }
    }

    if match_count == 0 {
        return Ok(None);
    }

    log::debug!("Listing {listing_id}: {match_count} duplicate photo match(es)");
    Ok(Some(Finding::new(serde_json::json!({
        "matchCount": match_count,
        "matches": matches,
    }))))
}
