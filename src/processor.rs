//! Violation processor: turns a batch of findings into durable state
//! (violation rows, listing status escalation, the seller's counter) and
//! returns the side effects (notification, email) for the caller to
//! dispatch fire-and-forget. Keeping effects out of this module keeps the
//! escalation logic testable without any delivery plumbing.

use crate::error::EngineResult;
use crate::model::{ListingStatus, Violation};
use crate::notify::{fraud_alert_email, fraud_alert_notification, SELLER_DASHBOARD_LINK};
use crate::store::Store;

/// Listings are hidden outright once the seller accumulates this many
/// violations (prior history plus the current batch).
const HIDE_THRESHOLD: i64 = 3;
/// Below the hide threshold, a high-severity finding or a second violation
/// sends the listing to manual verification.
const PENDING_THRESHOLD: i64 = 2;

/// A side effect the caller owes the outside world. Failures over there
/// must never fail the job or roll back what `process` wrote.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Notify {
        user_id: String,
        title: String,
        message: String,
        link: String,
        source_type: String,
        source_id: String,
    },
    Email {
        to: String,
        subject: String,
        html: String,
    },
}

#[derive(Debug, Default)]
pub struct Outcome {
    /// Status the listing was escalated to, if it moved.
    pub new_status: Option<ListingStatus>,
    /// Seller's violation total after this batch.
    pub total_violations: i64,
    pub effects: Vec<Effect>,
}

pub struct ViolationProcessor {
    store: Store,
}

impl ViolationProcessor {
    pub fn new(store: Store) -> Self {
        ViolationProcessor { store }
    }

    /// Persist a batch of findings and apply the escalation policy.
    ///
    /// Step order matters: the escalation decision reads the counter as it
    /// was *before* this batch, so a concurrent job cannot double-count,
    /// and the counter increment lands after the status write it justified.
    /// An empty batch touches nothing.
    pub async fn process(
        &self,
        listing_id: &str,
        violations: &[Violation],
    ) -> EngineResult<Outcome> {
        if violations.is_empty() {
            return Ok(Outcome::default());
        }

        // A listing or seller deleted between enqueue and processing is an
        // expected race, not an error.
        let Some(listing) = self.store.get_listing(listing_id)? else {
            log::debug!("Listing {listing_id} vanished before processing, skipping");
            return Ok(Outcome::default());
        };
        let Some(seller) = self.store.get_user(&listing.seller_id)? else {
            log::debug!(
                "Seller {} of listing {listing_id} vanished, skipping",
                listing.seller_id
            );
            return Ok(Outcome::default());
        };

        // Append-only audit trail: every finding gets its own row, repeat
        // offenses included.
        for v in violations {
            self.store.insert_violation(
                listing_id,
                &listing.seller_id,
                v.rule_id,
                v.severity,
                &v.details,
            )?;
        }

        let has_high_severity = violations.iter().any(|v| v.severity.is_high_or_critical());
        let total_violations = seller.violation_count + violations.len() as i64;

        let target = if total_violations >= HIDE_THRESHOLD {
            Some(ListingStatus::Hidden)
        } else if has_high_severity || total_violations >= PENDING_THRESHOLD {
            Some(ListingStatus::PendingVerification)
        } else {
            None
        };

        let mut new_status = None;
        if let Some(target) = target {
            // One-way escalation: never move a listing back down, even if a
            // re-run computes a milder target than what is already set.
            if escalation_rank(target) > escalation_rank(listing.status) {
                self.store.set_listing_status(listing_id, target)?;
                log::info!(
                    "Listing {listing_id} escalated {} -> {} ({} total violations)",
                    listing.status.as_str(),
                    target.as_str(),
                    total_violations
                );
                new_status = Some(target);
            }
        }

        self.store
            .increment_violation_count(&listing.seller_id, violations.len() as i64)?;

        let mut effects = Vec::new();
        let (title, message) = fraud_alert_notification(&listing.title, violations.len());
        effects.push(Effect::Notify {
            user_id: listing.seller_id.clone(),
            title,
            message,
            link: SELLER_DASHBOARD_LINK.to_string(),
            source_type: "FRAUD_VIOLATION".to_string(),
            source_id: listing_id.to_string(),
        });
        if let Some(email) = seller.email.as_deref() {
            let (subject, html) = fraud_alert_email(&seller.name, &listing.title, violations.len());
            effects.push(Effect::Email {
                to: email.to_string(),
                subject,
                html,
            });
        }

        Ok(Outcome {
            new_status,
            total_violations,
            effects,
        })
    }
}

fn escalation_rank(status: ListingStatus) -> u8 {
    match status {
        ListingStatus::Hidden => 2,
        ListingStatus::PendingVerification => 1,
        _ => 0,
    }
}
