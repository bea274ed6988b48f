pub mod checkers;
pub mod config;
pub mod engine;
pub mod error;
pub mod hash;
pub mod model;
pub mod notify;
pub mod processor;
pub mod queue;
pub mod store;
pub mod worker;

pub use config::Config;
pub use engine::RuleEngine;
pub use error::{EngineError, EngineResult};
pub use model::{Finding, FraudRule, Listing, ListingStatus, RuleType, Severity, Violation};
pub use processor::{Effect, Outcome, ViolationProcessor};
pub use queue::{JobQueue, Topic};
pub use store::Store;
pub use worker::{enqueue_fraud_detection, TriggeredBy, Worker};
