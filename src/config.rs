use crate::model::{RuleType, Severity};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_path: String,
    /// How often idle topic workers look for new jobs.
    pub poll_interval_ms: u64,
    /// First-retry delay; doubles per attempt.
    pub backoff_base_secs: u64,
    /// Active jobs older than this are assumed orphaned by a dead worker
    /// and re-queued.
    pub stale_job_secs: u64,
    /// Provider throughput cap for the email topic.
    pub emails_per_second: u32,
    pub topics: TopicsConfig,
    /// Rules installed on first start when the rule table is empty.
    /// Administrators manage them in the database afterwards.
    pub seed_rules: Vec<RuleSeed>,
}

/// Per-topic worker budget. Concurrency reflects the resource each topic
/// stresses: DB-heavy fraud jobs stay low, email is wide but rate-limited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    pub concurrency: usize,
    pub max_attempts: u32,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicsConfig {
    pub fraud_detection: QueueSettings,
    pub image_processing: QueueSettings,
    pub email_notification: QueueSettings,
    pub report_generation: QueueSettings,
    pub settlement_processing: QueueSettings,
    pub document_cleanup: QueueSettings,
    pub etl_aggregation: QueueSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSeed {
    pub rule_type: RuleType,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub parameters: serde_json::Value,
    pub severity: Severity,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: "/var/lib/listing-guard/listing-guard.db".to_string(),
            poll_interval_ms: 500,
            backoff_base_secs: 30,
            stale_job_secs: 600,
            emails_per_second: 14,
            topics: TopicsConfig {
                fraud_detection: QueueSettings {
                    concurrency: 2,
                    max_attempts: 3,
                    timeout_seconds: 60,
                },
                image_processing: QueueSettings {
                    concurrency: 4,
                    max_attempts: 3,
                    timeout_seconds: 120,
                },
                email_notification: QueueSettings {
                    concurrency: 10,
                    max_attempts: 5,
                    timeout_seconds: 30,
                },
                report_generation: QueueSettings {
                    concurrency: 1,
                    max_attempts: 2,
                    timeout_seconds: 300,
                },
                settlement_processing: QueueSettings {
                    concurrency: 1,
                    max_attempts: 3,
                    timeout_seconds: 300,
                },
                document_cleanup: QueueSettings {
                    concurrency: 1,
                    max_attempts: 2,
                    timeout_seconds: 120,
                },
                etl_aggregation: QueueSettings {
                    concurrency: 1,
                    max_attempts: 2,
                    timeout_seconds: 600,
                },
            },
            seed_rules: vec![
                RuleSeed {
                    rule_type: RuleType::DuplicatePhoto,
                    name: "중복 사진 탐지".to_string(),
                    description: "다른 매물과 동일한 사진을 쓰는 매물을 탐지합니다".to_string(),
                    parameters: serde_json::json!({ "hashThreshold": 5, "minSimilarity": 0.9 }),
                    severity: Severity::High,
                },
                RuleSeed {
                    rule_type: RuleType::PriceSpike,
                    name: "이상 가격 탐지".to_string(),
                    description: "같은 지역·카테고리 평균에서 크게 벗어난 가격을 탐지합니다"
                        .to_string(),
                    parameters: serde_json::json!({ "deviationPercent": 50, "minComparables": 3 }),
                    severity: Severity::High,
                },
                RuleSeed {
                    rule_type: RuleType::MultiAccountContact,
                    name: "다중 계정 탐지".to_string(),
                    description: "하나의 연락처를 여러 판매자 계정이 쓰는 경우를 탐지합니다"
                        .to_string(),
                    parameters: serde_json::json!({ "maxAccountsPerPhone": 1 }),
                    severity: Severity::Medium,
                },
            ],
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn settings_for(&self, topic: crate::queue::Topic) -> &QueueSettings {
        use crate::queue::Topic;
        match topic {
            Topic::FraudDetection => &self.topics.fraud_detection,
            Topic::ImageProcessing => &self.topics.image_processing,
            Topic::EmailNotification => &self.topics.email_notification,
            Topic::ReportGeneration => &self.topics.report_generation,
            Topic::SettlementProcessing => &self.topics.settlement_processing,
            Topic::DocumentCleanup => &self.topics.document_cleanup,
            Topic::EtlAggregation => &self.topics.etl_aggregation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Topic;

    #[test]
    fn default_config_round_trips_through_yaml() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.database_path, config.database_path);
        assert_eq!(parsed.seed_rules.len(), 3);
        assert_eq!(parsed.emails_per_second, 14);
    }

    #[test]
    fn every_topic_has_settings() {
        let config = Config::default();
        for topic in Topic::ALL {
            let s = config.settings_for(topic);
            assert!(s.concurrency >= 1);
            assert!(s.max_attempts >= 1);
        }
    }

    #[test]
    fn seed_rules_cover_each_rule_type_once() {
        let config = Config::default();
        let mut types: Vec<_> = config.seed_rules.iter().map(|r| r.rule_type).collect();
        types.sort_by_key(|t| t.to_string());
        types.dedup();
        assert_eq!(types.len(), 3);
    }
}
