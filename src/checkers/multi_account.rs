//! Multi-account contact correlation: one phone number fronting several
//! seller accounts is how banned sellers come back and how broker rings
//! spread inventory across throwaway accounts.

use super::parse_params;
use crate::error::EngineResult;
use crate::model::{Finding, Severity};
use crate::store::Store;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;

lazy_static! {
    static ref NON_DIGIT: Regex = Regex::new(r"[^0-9]").unwrap();
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MultiAccountParams {
    /// One other account on the phone is tolerated at the default of 1
    /// (family members posting for each other happens); past that it is a
    /// finding.
    pub max_accounts_per_phone: usize,
}

impl Default for MultiAccountParams {
    fn default() -> Self {
        MultiAccountParams {
            max_accounts_per_phone: 1,
        }
    }
}

/// Phones arrive as "010-1234-5678", "+82 10 1234 5678" or bare digits;
/// compare digits only.
pub fn normalize_phone(raw: &str) -> String {
    NON_DIGIT.replace_all(raw, "").into_owned()
}

pub async fn check(
    store: &Store,
    listing_id: &str,
    params: &serde_json::Value,
) -> EngineResult<Option<Finding>> {
    let params: MultiAccountParams = parse_params("multi_account", params)?;

    let Some(listing) = store.get_listing(listing_id)? else {
        return Ok(None);
    };
    let phone = match listing.contact_phone.as_deref() {
        Some(p) if !p.trim().is_empty() => normalize_phone(p),
        _ => return Ok(None),
    };
    if phone.is_empty() {
        return Ok(None);
    }

    // Stored phones keep whatever formatting the seller typed; both sides
    // of the comparison go through the same normalization.
    let shared_listings: Vec<(String, String)> = store
        .listings_with_contact_phone(&listing.seller_id)?
        .into_iter()
        .filter(|(_, _, candidate)| normalize_phone(candidate) == phone)
        .map(|(listing_id, seller_id, _)| (listing_id, seller_id))
        .collect();
    let distinct_sellers: HashSet<&str> =
        shared_listings.iter().map(|(_, s)| s.as_str()).collect();
    if distinct_sellers.len() <= params.max_accounts_per_phone {
        return Ok(None);
    }

    let duplicate_users: Vec<String> = store
        .users_with_profile_phone(&listing.seller_id)?
        .into_iter()
        .filter(|(_, p)| normalize_phone(p) == phone)
        .map(|(id, _)| id)
        .collect();

    // Severity counts duplicate accounts, not posting volume: one ring
    // member with many listings is still one duplicate seller.
    let total = distinct_sellers.len() + duplicate_users.len();
    let severity = if total >= 3 {
        Severity::Critical
    } else {
        Severity::Medium
    };
    let duplicate_listings: Vec<serde_json::Value> = shared_listings
        .iter()
        .map(|(lid, sid)| serde_json::json!({ "listingId": lid, "sellerId": sid }))
        .collect();
    log::debug!(
        "Listing {listing_id}: phone shared by {} other seller(s), {} profile match(es)",
        distinct_sellers.len(),
        duplicate_users.len()
    );
    Ok(Some(Finding::with_severity(
        serde_json::json!({
            "duplicateListings": duplicate_listings,
            "duplicateUsers": duplicate_users,
            "totalDuplicates": total,
        }),
        severity,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Listing, ListingStatus, User};

    fn seed_listing(store: &Store, id: &str, seller: &str, phone: Option<&str>) {
        store
            .insert_listing(&Listing {
                id: id.to_string(),
                seller_id: seller.to_string(),
                title: format!("매물 {id}"),
                price: 5_000_000,
                city: "부산".into(),
                district: "해운대구".into(),
                category: "중고차".into(),
                contact_phone: phone.map(|p| p.to_string()),
                status: ListingStatus::Active,
            })
            .unwrap();
    }

    #[test]
    fn phone_normalization_strips_formatting() {
        assert_eq!(normalize_phone("010-1234-5678"), "01012345678");
        assert_eq!(normalize_phone("+82 10 1234 5678"), "821012345678");
        assert_eq!(normalize_phone("01012345678"), "01012345678");
    }

    #[tokio::test]
    async fn no_phone_means_no_finding() {
        let store = Store::open_in_memory().unwrap();
        seed_listing(&store, "L1", "U1", None);

        let finding = check(&store, "L1", &serde_json::Value::Null).await.unwrap();
        assert!(finding.is_none());
    }

    #[tokio::test]
    async fn one_other_seller_is_within_tolerance() {
        let store = Store::open_in_memory().unwrap();
        seed_listing(&store, "L1", "U1", Some("01012345678"));
        seed_listing(&store, "L2", "U2", Some("01012345678"));

        let finding = check(&store, "L1", &serde_json::Value::Null).await.unwrap();
        assert!(finding.is_none());
    }

    #[tokio::test]
    async fn two_other_sellers_is_a_finding() {
        let store = Store::open_in_memory().unwrap();
        seed_listing(&store, "L1", "U1", Some("01012345678"));
        seed_listing(&store, "L2", "U2", Some("01012345678"));
        seed_listing(&store, "L3", "U3", Some("01012345678"));

        let finding = check(&store, "L1", &serde_json::Value::Null)
            .await
            .unwrap()
            .expect("two other sellers must fire");
        assert_eq!(finding.details["totalDuplicates"], 2);
        assert_eq!(finding.computed_severity, Some(Severity::Medium));
    }

    #[tokio::test]
    async fn three_or_more_duplicates_is_critical() {
        let store = Store::open_in_memory().unwrap();
        seed_listing(&store, "L1", "U1", Some("01012345678"));
        seed_listing(&store, "L2", "U2", Some("01012345678"));
        seed_listing(&store, "L3", "U3", Some("01012345678"));
        store
            .insert_user(&User {
                id: "U9".into(),
                name: "박영희".into(),
                phone: Some("01012345678".into()),
                email: None,
                violation_count: 0,
            })
            .unwrap();

        let finding = check(&store, "L1", &serde_json::Value::Null)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(finding.details["totalDuplicates"], 3);
        assert_eq!(finding.computed_severity, Some(Severity::Critical));
        assert_eq!(finding.details["duplicateUsers"][0], "U9");
    }

    #[tokio::test]
    async fn formatted_phones_still_match() {
        let store = Store::open_in_memory().unwrap();
        // Stored exactly as typed, formatting included.
        seed_listing(&store, "L1", "U1", Some("010-1234-5678"));
        seed_listing(&store, "L2", "U2", Some("010-1234-5678"));
        seed_listing(&store, "L3", "U3", Some("(010) 1234 5678"));

        let finding = check(&store, "L1", &serde_json::Value::Null)
            .await
            .unwrap()
            .expect("two other sellers share the phone regardless of formatting");
        assert_eq!(finding.details["totalDuplicates"], 2);
        assert_eq!(finding.computed_severity, Some(Severity::Medium));
    }

    #[tokio::test]
    async fn user_profile_phones_match_across_formats() {
        let store = Store::open_in_memory().unwrap();
        seed_listing(&store, "L1", "U1", Some("01012345678"));
        seed_listing(&store, "L2", "U2", Some("010.1234.5678"));
        seed_listing(&store, "L3", "U3", Some("010 1234 5678"));
        store
            .insert_user(&User {
                id: "U9".into(),
                name: "박영희".into(),
                phone: Some("010-1234-5678".into()),
                email: None,
                violation_count: 0,
            })
            .unwrap();

        let finding = check(&store, "L1", &serde_json::Value::Null)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(finding.details["totalDuplicates"], 3);
        assert_eq!(finding.computed_severity, Some(Severity::Critical));
        assert_eq!(finding.details["duplicateUsers"][0], "U9");
    }

    #[tokio::test]
    async fn listing_volume_does_not_inflate_severity() {
        let store = Store::open_in_memory().unwrap();
        seed_listing(&store, "L1", "U1", Some("01012345678"));
        seed_listing(&store, "L2", "U2", Some("01012345678"));
        seed_listing(&store, "L3", "U2", Some("01012345678"));
        seed_listing(&store, "L4", "U3", Some("01012345678"));
        seed_listing(&store, "L5", "U3", Some("01012345678"));

        let finding = check(&store, "L1", &serde_json::Value::Null)
            .await
            .unwrap()
            .unwrap();
        // Two duplicate accounts with two listings each: MEDIUM, the
        // details still enumerate every shared listing.
        assert_eq!(finding.details["totalDuplicates"], 2);
        assert_eq!(finding.computed_severity, Some(Severity::Medium));
        assert_eq!(
            finding.details["duplicateListings"].as_array().unwrap().len(),
            4
        );
    }

    #[tokio::test]
    async fn own_other_listings_do_not_count() {
        let store = Store::open_in_memory().unwrap();
        seed_listing(&store, "L1", "U1", Some("01012345678"));
        seed_listing(&store, "L2", "U1", Some("01012345678"));
        seed_listing(&store, "L3", "U1", Some("01012345678"));

        let finding = check(&store, "L1", &serde_json::Value::Null).await.unwrap();
        assert!(finding.is_none());
    }

    #[tokio::test]
    async fn sold_listings_do_not_count() {
        let store = Store::open_in_memory().unwrap();
        seed_listing(&store, "L1", "U1", Some("01012345678"));
        for (id, seller) in [("L2", "U2"), ("L3", "U3")] {
            store
                .insert_listing(&Listing {
                    id: id.to_string(),
                    seller_id: seller.to_string(),
                    title: "팔림".into(),
                    price: 1,
                    city: "부산".into(),
                    district: "해운대구".into(),
                    category: "중고차".into(),
                    contact_phone: Some("01012345678".into()),
                    status: ListingStatus::Sold,
                })
                .unwrap();
        }

        let finding = check(&store, "L1", &serde_json::Value::Null).await.unwrap();
        assert!(finding.is_none());
    }
}
