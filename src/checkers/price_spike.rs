//! Regional price-spike detection: a listing priced far off the mean of its
//! comparables (same city, district and category, exact match) is either a
//! bait posting or a typo; both deserve review.
//!
//! Grades its own findings: a deviation past 100% is CRITICAL regardless of
//! the rule's configured severity, because magnitude matters here in a way
//! it does not for a fixed-severity rule like duplicate photo.

use super::parse_params;
use crate::error::EngineResult;
use crate::model::{Finding, Severity};
use crate::store::Store;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PriceSpikeParams {
    /// Deviations within this band (either direction) are normal market
    /// spread, not findings.
    pub deviation_percent: f64,
    /// Below this many comparables there is no baseline to judge against.
    pub min_comparables: usize,
}

impl Default for PriceSpikeParams {
    fn default() -> Self {
        PriceSpikeParams {
            deviation_percent: 50.0,
            min_comparables: 3,
        }
    }
}

pub async fn check(
    store: &Store,
    listing_id: &str,
    params: &serde_json::Value,
) -> EngineResult<Option<Finding>> {
    let params: PriceSpikeParams = parse_params("price_spike", params)?;

    let Some(listing) = store.get_listing(listing_id)? else {
        return Ok(None);
    };

    let prices = store.comparable_prices(
        &listing.city,
        &listing.district,
        &listing.category,
        listing_id,
    )?;
    if prices.len() < params.min_comparables {
        log::debug!(
            "Listing {listing_id}: only {} comparable(s) in {} {}, skipping price check",
            prices.len(),
            listing.city,
            listing.district
        );
        return Ok(None);
    }

    let mean = prices.iter().sum::<i64>() as f64 / prices.len() as f64;
    if mean <= 0.0 {
        return Ok(None);
    }

    let deviation = (listing.price as f64 - mean) / mean * 100.0;
    if deviation.abs() <= params.deviation_percent {
        return Ok(None);
    }

    let severity = if deviation > 100.0 {
        Severity::Critical
    } else {
        Severity::High
    };
    let details = serde_json::json!({
        "listingPrice": listing.price,
        "averagePrice": mean.round() as i64,
        "deviationPercent": (deviation * 10.0).round() / 10.0,
        "comparableCount": prices.len(),
        "district": listing.district,
    });
    log::debug!(
        "Listing {listing_id}: price deviates {deviation:.1}% from {} comparables",
        prices.len()
    );
    Ok(Some(Finding::with_severity(details, severity)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Listing, ListingStatus};

    fn seed(store: &Store, id: &str, price: i64, district: &str) {
        store
            .insert_listing(&Listing {
                id: id.to_string(),
                seller_id: format!("seller-{id}"),
                title: format!("매물 {id}"),
                price,
                city: "서울".into(),
                district: district.into(),
                category: "아파트".into(),
                contact_phone: None,
                status: ListingStatus::Active,
            })
            .unwrap();
    }

    #[tokio::test]
    async fn too_few_comparables_is_never_a_finding() {
        let store = Store::open_in_memory().unwrap();
        // Wildly overpriced, but only two comparables.
        seed(&store, "L1", 1_000_000_000, "강남구");
        seed(&store, "L2", 10_000_000, "강남구");
        seed(&store, "L3", 10_000_000, "강남구");

        let finding = check(&store, "L1", &serde_json::Value::Null).await.unwrap();
        assert!(finding.is_none());
    }

    #[tokio::test]
    async fn deviation_within_band_is_normal_spread() {
        let store = Store::open_in_memory().unwrap();
        seed(&store, "L1", 14_000_000, "강남구"); // +40% over the 10M mean
        seed(&store, "L2", 10_000_000, "강남구");
        seed(&store, "L3", 10_000_000, "강남구");
        seed(&store, "L4", 10_000_000, "강남구");

        let finding = check(&store, "L1", &serde_json::Value::Null).await.unwrap();
        assert!(finding.is_none());
    }

    #[tokio::test]
    async fn deviation_of_exactly_one_hundred_is_high() {
        let store = Store::open_in_memory().unwrap();
        seed(&store, "L1", 20_000_000, "강남구"); // exactly +100%
        seed(&store, "L2", 10_000_000, "강남구");
        seed(&store, "L3", 10_000_000, "강남구");
        seed(&store, "L4", 10_000_000, "강남구");

        let finding = check(&store, "L1", &serde_json::Value::Null)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(finding.computed_severity, Some(Severity::High));
        assert_eq!(finding.details["deviationPercent"], 100.0);
    }

    #[tokio::test]
    async fn deviation_past_one_hundred_is_critical() {
        let store = Store::open_in_memory().unwrap();
        seed(&store, "L1", 20_010_000, "강남구"); // +100.1%
        seed(&store, "L2", 10_000_000, "강남구");
        seed(&store, "L3", 10_000_000, "강남구");
        seed(&store, "L4", 10_000_000, "강남구");

        let finding = check(&store, "L1", &serde_json::Value::Null)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(finding.computed_severity, Some(Severity::Critical));
        assert_eq!(finding.details["deviationPercent"], 100.1);
    }

    #[tokio::test]
    async fn underpricing_fires_too() {
        let store = Store::open_in_memory().unwrap();
        seed(&store, "L1", 2_000_000, "강남구"); // -80%
        seed(&store, "L2", 10_000_000, "강남구");
        seed(&store, "L3", 10_000_000, "강남구");
        seed(&store, "L4", 10_000_000, "강남구");

        let finding = check(&store, "L1", &serde_json::Value::Null)
            .await
            .unwrap()
            .unwrap();
        // Negative deviation never exceeds +100%, so HIGH.
        assert_eq!(finding.computed_severity, Some(Severity::High));
        assert_eq!(finding.details["deviationPercent"], -80.0);
    }

    #[tokio::test]
    async fn other_districts_are_not_comparables() {
        let store = Store::open_in_memory().unwrap();
        seed(&store, "L1", 100_000_000, "강남구");
        seed(&store, "L2", 10_000_000, "서초구");
        seed(&store, "L3", 10_000_000, "서초구");
        seed(&store, "L4", 10_000_000, "서초구");

        let finding = check(&store, "L1", &serde_json::Value::Null).await.unwrap();
        assert!(finding.is_none());
    }

    #[tokio::test]
    async fn details_carry_the_baseline() {
        let store = Store::open_in_memory().unwrap();
        seed(&store, "L1", 100_000_000, "송파구");
        for i in 0..4 {
            seed(&store, &format!("C{i}"), 40_000_000, "송파구");
        }

        let finding = check(&store, "L1", &serde_json::Value::Null)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(finding.details["listingPrice"], 100_000_000);
        assert_eq!(finding.details["averagePrice"], 40_000_000);
        assert_eq!(finding.details["deviationPercent"], 150.0);
        assert_eq!(finding.details["comparableCount"], 4);
        assert_eq!(finding.details["district"], "송파구");
        assert_eq!(finding.computed_severity, Some(Severity::Critical));
    }
}
