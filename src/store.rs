use crate::error::{EngineError, EngineResult};
use crate::model::{
    FraudRule, FraudViolation, Listing, ListingImage, ListingStatus, RuleType, Severity, User,
    ViolationResolution,
};
use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

/// SQLite-backed store exposing exactly the reads and writes the fraud
/// engine needs. The listing service owns everything else about these
/// tables; this module is the engine's minimal contract with the database.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(db_path: &str) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create data directory: {}", parent.display()))?;
            }
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {db_path}"))?;
        let store = Store {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let store = Store {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Shared connection handle for the job queue, which lives in the same
    /// database file.
    pub fn handle(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS fraud_rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                rule_type TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                parameters TEXT NOT NULL DEFAULT '{}',
                severity TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1
            );
            CREATE TABLE IF NOT EXISTS listings (
                id TEXT PRIMARY KEY,
                seller_id TEXT NOT NULL,
                title TEXT NOT NULL,
                price INTEGER NOT NULL,
                city TEXT NOT NULL,
                district TEXT NOT NULL,
                category TEXT NOT NULL,
                contact_phone TEXT,
                status TEXT NOT NULL DEFAULT 'ACTIVE'
            );
            CREATE TABLE IF NOT EXISTS listing_images (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                listing_id TEXT NOT NULL,
                file_path TEXT,
                perceptual_hash TEXT
            );
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                phone TEXT,
                email TEXT,
                violation_count INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS fraud_violations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                listing_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                rule_id INTEGER NOT NULL,
                severity TEXT NOT NULL,
                details TEXT NOT NULL DEFAULT '{}',
                resolution TEXT,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                message TEXT NOT NULL,
                link TEXT NOT NULL DEFAULT '',
                source_type TEXT NOT NULL DEFAULT '',
                source_id TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_images_listing ON listing_images(listing_id);
            CREATE INDEX IF NOT EXISTS idx_listings_phone ON listings(contact_phone);
            CREATE INDEX IF NOT EXISTS idx_listings_area
                ON listings(city, district, category);
            CREATE INDEX IF NOT EXISTS idx_violations_listing
                ON fraud_violations(listing_id);",
        )
        .context("Failed to initialize schema")?;
        Ok(())
    }

    // ---- rules -------------------------------------------------------

    /// Active rules, in id order. Rows with a rule type this build does not
    /// know are skipped with a warning so an old binary keeps evaluating the
    /// rules it understands.
    pub fn active_rules(&self) -> EngineResult<Vec<FraudRule>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, rule_type, name, description, parameters, severity, is_active
             FROM fraud_rules WHERE is_active = 1 ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut rules = Vec::new();
        for row in rows {
            let (id, rule_type, name, description, parameters, severity) = row?;
            let rule_type = match RuleType::from_str(&rule_type) {
                Ok(rt) => rt,
                Err(e) => {
                    log::warn!("Skipping rule {id} ('{name}'): {e}");
                    continue;
                }
            };
            let severity = Severity::from_str(&severity).unwrap_or_else(|e| {
                log::warn!("Rule {id} has bad severity ({e}), defaulting to MEDIUM");
                Severity::Medium
            });
            let parameters =
                serde_json::from_str(&parameters).unwrap_or(serde_json::Value::Null);
            rules.push(FraudRule {
                id,
                rule_type,
                name,
                description,
                parameters,
                severity,
                is_active: true,
            });
        }
        Ok(rules)
    }

    pub fn insert_rule(
        &self,
        rule_type: RuleType,
        name: &str,
        description: &str,
        parameters: &serde_json::Value,
        severity: Severity,
        is_active: bool,
    ) -> EngineResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO fraud_rules (rule_type, name, description, parameters, severity, is_active)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                rule_type.to_string(),
                name,
                description,
                parameters.to_string(),
                severity.as_str(),
                is_active as i64
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn rule_count(&self) -> EngineResult<i64> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row("SELECT COUNT(*) FROM fraud_rules", [], |row| row.get(0))?;
        Ok(count)
    }

    // ---- listings ----------------------------------------------------

    pub fn get_listing(&self, id: &str) -> EngineResult<Option<Listing>> {
        let conn = self.conn.lock().unwrap();
        let listing = conn
            .query_row(
                "SELECT id, seller_id, title, price, city, district, category,
                        contact_phone, status
                 FROM listings WHERE id = ?",
                params![id],
                |row| {
                    Ok(Listing {
                        id: row.get(0)?,
                        seller_id: row.get(1)?,
                        title: row.get(2)?,
                        price: row.get(3)?,
                        city: row.get(4)?,
                        district: row.get(5)?,
                        category: row.get(6)?,
                        contact_phone: row.get(7)?,
                        status: parse_status(row.get::<_, String>(8)?),
                    })
                },
            )
            .optional()?;
        Ok(listing)
    }

    pub fn insert_listing(&self, listing: &Listing) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO listings
             (id, seller_id, title, price, city, district, category, contact_phone, status)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                listing.id,
                listing.seller_id,
                listing.title,
                listing.price,
                listing.city,
                listing.district,
                listing.category,
                listing.contact_phone,
                listing.status.as_str()
            ],
        )?;
        Ok(())
    }

    pub fn set_listing_status(&self, id: &str, status: ListingStatus) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE listings SET status = ? WHERE id = ?",
            params![status.as_str(), id],
        )?;
        Ok(())
    }

    /// Prices of ACTIVE listings sharing city + district + category,
    /// excluding the listing under evaluation. Exact categorical match.
    pub fn comparable_prices(
        &self,
        city: &str,
        district: &str,
        category: &str,
        exclude_listing: &str,
    ) -> EngineResult<Vec<i64>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT price FROM listings
             WHERE city = ? AND district = ? AND category = ?
               AND status = 'ACTIVE' AND id != ?",
        )?;
        let prices = stmt
            .query_map(params![city, district, category, exclude_listing], |row| {
                row.get(0)
            })?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(prices)
    }

    /// Other sellers' listings (active, draft or pending) that carry any
    /// contact phone, phone in stored form. Sellers type phones with
    /// arbitrary formatting, so equality is decided on a normalized form by
    /// the caller, not in SQL.
    pub fn listings_with_contact_phone(
        &self,
        exclude_seller: &str,
    ) -> EngineResult<Vec<(String, String, String)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, seller_id, contact_phone FROM listings
             WHERE contact_phone IS NOT NULL AND seller_id != ?
               AND status IN ('ACTIVE', 'DRAFT', 'PENDING_VERIFICATION')",
        )?;
        let rows = stmt
            .query_map(params![exclude_seller], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ---- images ------------------------------------------------------

    pub fn images_for_listing(&self, listing_id: &str) -> EngineResult<Vec<ListingImage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, listing_id, perceptual_hash FROM listing_images WHERE listing_id = ?",
        )?;
        let images = stmt
            .query_map(params![listing_id], |row| {
                Ok(ListingImage {
                    id: row.get(0)?,
                    listing_id: row.get(1)?,
                    perceptual_hash: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(images)
    }

    /// Hashed images belonging to *other* listings currently ACTIVE or
    /// DRAFT: the duplicate-photo candidate set. Full scan; fine while the
    /// catalog is small (see checkers::duplicate_photo).
    pub fn other_listing_hashes(
        &self,
        exclude_listing: &str,
    ) -> EngineResult<Vec<(String, i64, String)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT i.listing_id, i.id, i.perceptual_hash
             FROM listing_images i
             JOIN listings l ON l.id = i.listing_id
             WHERE i.perceptual_hash IS NOT NULL
               AND i.listing_id != ?
               AND l.status IN ('ACTIVE', 'DRAFT')",
        )?;
        let rows = stmt
            .query_map(params![exclude_listing], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn insert_image(
        &self,
        listing_id: &str,
        file_path: Option<&str>,
        perceptual_hash: Option<&str>,
    ) -> EngineResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO listing_images (listing_id, file_path, perceptual_hash) VALUES (?, ?, ?)",
            params![listing_id, file_path, perceptual_hash],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Images of a listing still waiting for a hash, with the file to read.
    pub fn unhashed_images(&self, listing_id: &str) -> EngineResult<Vec<(i64, String)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, file_path FROM listing_images
             WHERE listing_id = ? AND perceptual_hash IS NULL AND file_path IS NOT NULL",
        )?;
        let rows = stmt
            .query_map(params![listing_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn set_image_hash(&self, image_id: i64, hash: &str) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE listing_images SET perceptual_hash = ? WHERE id = ?",
            params![hash, image_id],
        )?;
        Ok(())
    }

    // ---- users -------------------------------------------------------

    pub fn get_user(&self, id: &str) -> EngineResult<Option<User>> {
        let conn = self.conn.lock().unwrap();
        let user = conn
            .query_row(
                "SELECT id, name, phone, email, violation_count FROM users WHERE id = ?",
                params![id],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        phone: row.get(2)?,
                        email: row.get(3)?,
                        violation_count: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    pub fn insert_user(&self, user: &User) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO users (id, name, phone, email, violation_count)
             VALUES (?, ?, ?, ?, ?)",
            params![user.id, user.name, user.phone, user.email, user.violation_count],
        )?;
        Ok(())
    }

    /// Other user accounts with any profile phone, phone in stored form.
    /// Same contract as `listings_with_contact_phone`: the caller normalizes
    /// before comparing.
    pub fn users_with_profile_phone(
        &self,
        exclude_user: &str,
    ) -> EngineResult<Vec<(String, String)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT id, phone FROM users WHERE phone IS NOT NULL AND id != ?")?;
        let rows = stmt
            .query_map(params![exclude_user], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Atomic counter bump. Read-modify-write would lose updates under
    /// concurrent jobs; the increment happens inside the database.
    pub fn increment_violation_count(&self, user_id: &str, by: i64) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE users SET violation_count = violation_count + ? WHERE id = ?",
            params![by, user_id],
        )?;
        Ok(())
    }

    // ---- violations --------------------------------------------------

    /// Append-only. Repeat offenses each leave their own row; there is
    /// deliberately no dedup key here.
    pub fn insert_violation(
        &self,
        listing_id: &str,
        user_id: &str,
        rule_id: i64,
        severity: Severity,
        details: &serde_json::Value,
    ) -> EngineResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO fraud_violations
             (listing_id, user_id, rule_id, severity, details, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                listing_id,
                user_id,
                rule_id,
                severity.as_str(),
                details.to_string(),
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn violation_count_for_listing(&self, listing_id: &str) -> EngineResult<i64> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM fraud_violations WHERE listing_id = ?",
            params![listing_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Violation history for a listing, newest first. The admin review
    /// surface and the scan CLI read this.
    pub fn violations_for_listing(&self, listing_id: &str) -> EngineResult<Vec<FraudViolation>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, listing_id, user_id, rule_id, severity, details, resolution, created_at
             FROM fraud_violations WHERE listing_id = ? ORDER BY id DESC",
        )?;
        let rows = stmt.query_map(params![listing_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        let mut violations = Vec::new();
        for row in rows {
            let (id, listing_id, user_id, rule_id, severity, details, resolution, created_at) =
                row?;
            violations.push(FraudViolation {
                id,
                listing_id,
                user_id,
                rule_id,
                severity: Severity::from_str(&severity).unwrap_or(Severity::Medium),
                details: serde_json::from_str(&details).unwrap_or(serde_json::Value::Null),
                resolution: resolution.and_then(|r| ViolationResolution::from_str(&r).ok()),
                created_at: DateTime::parse_from_rfc3339(&created_at)
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            });
        }
        Ok(violations)
    }

    /// Admin review path. APPROVE resets the listing to ACTIVE, the only
    /// backward status transition in the system.
    pub fn resolve_violation(
        &self,
        violation_id: i64,
        resolution: ViolationResolution,
    ) -> EngineResult<()> {
        let listing_id: Option<String> = {
            let conn = self.conn.lock().unwrap();
            conn.query_row(
                "SELECT listing_id FROM fraud_violations WHERE id = ?",
                params![violation_id],
                |row| row.get(0),
            )
            .optional()?
        };
        let listing_id = listing_id.ok_or(EngineError::NotFound {
            entity: "violation",
            id: violation_id.to_string(),
        })?;

        {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "UPDATE fraud_violations SET resolution = ? WHERE id = ?",
                params![resolution.as_str(), violation_id],
            )?;
        }
        if resolution == ViolationResolution::Approve {
            self.set_listing_status(&listing_id, ListingStatus::Active)?;
        }
        Ok(())
    }

    // ---- notifications -----------------------------------------------

    pub fn insert_notification(
        &self,
        user_id: &str,
        title: &str,
        message: &str,
        link: &str,
        source_type: &str,
        source_id: &str,
    ) -> EngineResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO notifications
             (user_id, title, message, link, source_type, source_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                user_id,
                title,
                message,
                link,
                source_type,
                source_id,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn notification_count_for_user(&self, user_id: &str) -> EngineResult<i64> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn parse_status(s: String) -> ListingStatus {
    ListingStatus::from_str(&s).unwrap_or_else(|e| {
        log::warn!("Bad listing status in store ({e}), treating as ACTIVE");
        ListingStatus::Active
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(id: &str, seller: &str) -> Listing {
        Listing {
            id: id.to_string(),
            seller_id: seller.to_string(),
            title: format!("매물 {id}"),
            price: 50_000_000,
            city: "서울".to_string(),
            district: "강남구".to_string(),
            category: "아파트".to_string(),
            contact_phone: Some("01012345678".to_string()),
            status: ListingStatus::Active,
        }
    }

    #[test]
    fn increment_is_cumulative() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_user(&User {
                id: "U1".into(),
                name: "김철수".into(),
                phone: None,
                email: None,
                violation_count: 0,
            })
            .unwrap();
        store.increment_violation_count("U1", 2).unwrap();
        store.increment_violation_count("U1", 3).unwrap();
        assert_eq!(store.get_user("U1").unwrap().unwrap().violation_count, 5);
    }

    #[test]
    fn active_rules_skips_unknown_types() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_rule(
                RuleType::PriceSpike,
                "price",
                "",
                &serde_json::json!({}),
                Severity::High,
                true,
            )
            .unwrap();
        // A rule type from a newer deployment this binary does not know.
        {
            let conn = store.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO fraud_rules (rule_type, name, severity, is_active)
                 VALUES ('GEO_VELOCITY', 'future rule', 'HIGH', 1)",
                [],
            )
            .unwrap();
        }
        let rules = store.active_rules().unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].rule_type, RuleType::PriceSpike);
    }

    #[test]
    fn inactive_rules_are_not_loaded() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_rule(
                RuleType::PriceSpike,
                "off",
                "",
                &serde_json::json!({}),
                Severity::High,
                false,
            )
            .unwrap();
        assert!(store.active_rules().unwrap().is_empty());
    }

    #[test]
    fn comparable_prices_match_exact_area_and_exclude_self() {
        let store = Store::open_in_memory().unwrap();
        store.insert_listing(&listing("L1", "U1")).unwrap();
        store.insert_listing(&listing("L2", "U2")).unwrap();
        let mut other_district = listing("L3", "U3");
        other_district.district = "서초구".to_string();
        store.insert_listing(&other_district).unwrap();
        let mut hidden = listing("L4", "U4");
        hidden.status = ListingStatus::Hidden;
        store.insert_listing(&hidden).unwrap();

        let prices = store
            .comparable_prices("서울", "강남구", "아파트", "L1")
            .unwrap();
        assert_eq!(prices.len(), 1);
    }

    #[test]
    fn phone_candidates_keep_stored_form_and_exclude_the_seller() {
        let store = Store::open_in_memory().unwrap();
        store.insert_listing(&listing("L1", "U1")).unwrap();
        let mut formatted = listing("L2", "U2");
        formatted.contact_phone = Some("010-1234-5678".to_string());
        store.insert_listing(&formatted).unwrap();
        let mut sold = listing("L3", "U3");
        sold.status = ListingStatus::Sold;
        store.insert_listing(&sold).unwrap();
        let mut no_phone = listing("L4", "U4");
        no_phone.contact_phone = None;
        store.insert_listing(&no_phone).unwrap();

        let rows = store.listings_with_contact_phone("U1").unwrap();
        assert_eq!(rows.len(), 1);
        // The stored formatting survives; normalization is the caller's job.
        assert_eq!(rows[0].2, "010-1234-5678");
    }

    #[test]
    fn user_phone_candidates_exclude_self_and_phoneless() {
        let store = Store::open_in_memory().unwrap();
        for (id, phone) in [("U1", Some("010-1234-5678")), ("U2", Some("01012345678")), ("U3", None)] {
            store
                .insert_user(&User {
                    id: id.into(),
                    name: "김철수".into(),
                    phone: phone.map(String::from),
                    email: None,
                    violation_count: 0,
                })
                .unwrap();
        }

        let rows = store.users_with_profile_phone("U1").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], ("U2".to_string(), "01012345678".to_string()));
    }

    #[test]
    fn duplicate_photo_candidates_exclude_own_and_unhashed() {
        let store = Store::open_in_memory().unwrap();
        store.insert_listing(&listing("L1", "U1")).unwrap();
        store.insert_listing(&listing("L2", "U2")).unwrap();
        store.insert_image("L1", None, Some("aa")).unwrap();
        store.insert_image("L2", None, Some("bb")).unwrap();
        store.insert_image("L2", None, None).unwrap();

        let candidates = store.other_listing_hashes("L1").unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].0, "L2");
    }

    #[test]
    fn violation_trail_is_newest_first_with_resolution() {
        let store = Store::open_in_memory().unwrap();
        store.insert_listing(&listing("L1", "U1")).unwrap();
        let first = store
            .insert_violation("L1", "U1", 1, Severity::Low, &serde_json::json!({}))
            .unwrap();
        let second = store
            .insert_violation("L1", "U1", 2, Severity::High, &serde_json::json!({}))
            .unwrap();
        store
            .resolve_violation(first, ViolationResolution::Reject)
            .unwrap();

        let trail = store.violations_for_listing("L1").unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].id, second);
        assert_eq!(trail[0].resolution, None);
        assert_eq!(trail[1].resolution, Some(ViolationResolution::Reject));
        assert_eq!(trail[1].severity, Severity::Low);
    }

    #[test]
    fn approve_resets_listing_status() {
        let store = Store::open_in_memory().unwrap();
        let mut l = listing("L1", "U1");
        l.status = ListingStatus::Hidden;
        store.insert_listing(&l).unwrap();
        let vid = store
            .insert_violation("L1", "U1", 1, Severity::High, &serde_json::json!({}))
            .unwrap();

        store
            .resolve_violation(vid, ViolationResolution::Approve)
            .unwrap();
        assert_eq!(
            store.get_listing("L1").unwrap().unwrap().status,
            ListingStatus::Active
        );
    }

    #[test]
    fn reject_keeps_listing_hidden() {
        let store = Store::open_in_memory().unwrap();
        let mut l = listing("L1", "U1");
        l.status = ListingStatus::Hidden;
        store.insert_listing(&l).unwrap();
        let vid = store
            .insert_violation("L1", "U1", 1, Severity::High, &serde_json::json!({}))
            .unwrap();

        store
            .resolve_violation(vid, ViolationResolution::Reject)
            .unwrap();
        assert_eq!(
            store.get_listing("L1").unwrap().unwrap().status,
            ListingStatus::Hidden
        );
    }
}
