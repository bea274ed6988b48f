//! Rule engine: loads the active rule set and runs the checker for each
//! rule against one listing. A misbehaving rule is logged and skipped;
//! one broken rule must never keep the others from running.

use crate::checkers::{duplicate_photo, multi_account, price_spike};
use crate::error::EngineResult;
use crate::model::{RuleType, Violation};
use crate::store::Store;

pub struct RuleEngine {
    store: Store,
}

impl RuleEngine {
    pub fn new(store: Store) -> Self {
        RuleEngine { store }
    }

    /// Evaluate every active rule against a listing and return the findings,
    /// each bound to the rule that produced it. A checker's computed severity
    /// wins over the rule's configured severity.
    pub async fn evaluate(&self, listing_id: &str) -> EngineResult<Vec<Violation>> {
        let rules = self.store.active_rules()?;
        let mut violations = Vec::new();

        for rule in rules {
            let result = match rule.rule_type {
                RuleType::DuplicatePhoto => {
                    duplicate_photo::check(&self.store, listing_id, &rule.parameters).await
                }
                RuleType::PriceSpike => {
                    price_spike::check(&self.store, listing_id, &rule.parameters).await
                }
                RuleType::MultiAccountContact => {
                    multi_account::check(&self.store, listing_id, &rule.parameters).await
                }
            };

            match result {
                Ok(Some(finding)) => {
                    let severity = finding.computed_severity.unwrap_or(rule.severity);
                    log::info!(
                        "Rule '{}' ({}) fired on listing {listing_id} with severity {}",
                        rule.name,
                        rule.rule_type,
                        severity.as_str()
                    );
                    violations.push(Violation {
                        rule_id: rule.id,
                        rule_type: rule.rule_type,
                        severity,
                        details: finding.details,
                    });
                }
                Ok(None) => {
                    log::debug!("Rule '{}' found nothing on listing {listing_id}", rule.name);
                }
                Err(e) => {
                    // Isolation: the failure belongs to this rule alone.
                    log::warn!(
                        "Rule '{}' errored on listing {listing_id}, continuing with remaining rules: {e}",
                        rule.name
                    );
                }
            }
        }

        Ok(violations)
    }
}
