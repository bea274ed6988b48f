use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Rule types the engine knows how to check. Closed set: adding a checker
/// means adding a variant here, and the compiler walks you through the
/// dispatch sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleType {
    DuplicatePhoto,
    PriceSpike,
    MultiAccountContact,
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuleType::DuplicatePhoto => "DUPLICATE_PHOTO",
            RuleType::PriceSpike => "PRICE_SPIKE",
            RuleType::MultiAccountContact => "MULTI_ACCOUNT_CONTACT",
        };
        f.write_str(s)
    }
}

impl FromStr for RuleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DUPLICATE_PHOTO" => Ok(RuleType::DuplicatePhoto),
            "PRICE_SPIKE" => Ok(RuleType::PriceSpike),
            "MULTI_ACCOUNT_CONTACT" => Ok(RuleType::MultiAccountContact),
            other => Err(format!("unknown rule type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn is_high_or_critical(self) -> bool {
        self >= Severity::High
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(Severity::Low),
            "MEDIUM" => Ok(Severity::Medium),
            "HIGH" => Ok(Severity::High),
            "CRITICAL" => Ok(Severity::Critical),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// Administrator-configured detection rule. Read-only to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudRule {
    pub id: i64,
    pub rule_type: RuleType,
    pub name: String,
    pub description: String,
    /// Checker-specific knobs (thresholds, counts). Deserialized by the
    /// matching checker at evaluation time.
    pub parameters: serde_json::Value,
    pub severity: Severity,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingStatus {
    Draft,
    Active,
    PendingVerification,
    Hidden,
    Sold,
}

impl ListingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ListingStatus::Draft => "DRAFT",
            ListingStatus::Active => "ACTIVE",
            ListingStatus::PendingVerification => "PENDING_VERIFICATION",
            ListingStatus::Hidden => "HIDDEN",
            ListingStatus::Sold => "SOLD",
        }
    }
}

impl FromStr for ListingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(ListingStatus::Draft),
            "ACTIVE" => Ok(ListingStatus::Active),
            "PENDING_VERIFICATION" => Ok(ListingStatus::PendingVerification),
            "HIDDEN" => Ok(ListingStatus::Hidden),
            "SOLD" => Ok(ListingStatus::Sold),
            other => Err(format!("unknown listing status '{other}'")),
        }
    }
}

/// The fields of a listing the engine reads. The listing service owns the
/// rest; this subsystem only ever transitions `status` forward
/// (ACTIVE -> PENDING_VERIFICATION -> HIDDEN).
#[derive(Debug, Clone)]
pub struct Listing {
    pub id: String,
    pub seller_id: String,
    pub title: String,
    pub price: i64,
    pub city: String,
    pub district: String,
    pub category: String,
    pub contact_phone: Option<String>,
    pub status: ListingStatus,
}

#[derive(Debug, Clone)]
pub struct ListingImage {
    pub id: i64,
    pub listing_id: String,
    /// Set by the image-processing worker once the upload has been hashed.
    pub perceptual_hash: Option<String>,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub violation_count: i64,
}

/// What a checker found. `computed_severity` is set by checkers that grade
/// their own findings (price spike, multi-account); duplicate photo inherits
/// the configured rule severity.
#[derive(Debug, Clone)]
pub struct Finding {
    pub details: serde_json::Value,
    pub computed_severity: Option<Severity>,
}

impl Finding {
    pub fn new(details: serde_json::Value) -> Self {
        Finding {
            details,
            computed_severity: None,
        }
    }

    pub fn with_severity(details: serde_json::Value, severity: Severity) -> Self {
        Finding {
            details,
            computed_severity: Some(severity),
        }
    }
}

/// A finding bound to the rule instance that produced it. This is what the
/// engine hands to the violation processor.
#[derive(Debug, Clone)]
pub struct Violation {
    pub rule_id: i64,
    pub rule_type: RuleType,
    pub severity: Severity,
    pub details: serde_json::Value,
}

/// Append-only audit row. The engine writes these and never touches them
/// again; resolution is the admin surface's column.
#[derive(Debug, Clone)]
pub struct FraudViolation {
    pub id: i64,
    pub listing_id: String,
    pub user_id: String,
    pub rule_id: i64,
    pub severity: Severity,
    pub details: serde_json::Value,
    pub resolution: Option<ViolationResolution>,
    pub created_at: DateTime<Utc>,
}

/// Admin review outcome. APPROVE is the only path that moves a listing's
/// status backward; the engine itself never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationResolution {
    Approve,
    Reject,
    RequestMoreInfo,
}

impl ViolationResolution {
    pub fn as_str(self) -> &'static str {
        match self {
            ViolationResolution::Approve => "APPROVE",
            ViolationResolution::Reject => "REJECT",
            ViolationResolution::RequestMoreInfo => "REQUEST_MORE_INFO",
        }
    }
}

impl FromStr for ViolationResolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "APPROVE" => Ok(ViolationResolution::Approve),
            "REJECT" => Ok(ViolationResolution::Reject),
            "REQUEST_MORE_INFO" => Ok(ViolationResolution::RequestMoreInfo),
            other => Err(format!("unknown resolution '{other}'")),
        }
    }
}
