use crate::{env_or_default, env_parse, env_required, ConfigError, FromEnv};

/// Kafka consumer configuration
#[derive(Clone, Debug)]
pub struct KafkaConfig {
    /// Broker addresses (bootstrap servers)
    pub brokers: Vec<String>,
    /// Consumer group identifier
    pub group_id: String,
    /// Topic carrying event envelopes
    pub topic: String,
    /// Client identifier reported to the broker
    pub client_id: String,
    /// Where a new consumer group starts reading ("latest" or "earliest")
    pub auto_offset_reset: String,
    pub session_timeout_ms: u64,
    /// How long startup waits for topic metadata before giving up
    pub metadata_timeout_ms: u64,
}

impl KafkaConfig {
    pub fn new(brokers: Vec<String>, group_id: String, topic: String) -> Self {
        Self {
            brokers,
            group_id,
            topic,
            client_id: "email-service".to_string(),
            auto_offset_reset: "latest".to_string(),
            session_timeout_ms: 6000,
            metadata_timeout_ms: 10_000,
        }
    }

    /// Comma-joined broker list in the form librdkafka expects
    pub fn bootstrap_servers(&self) -> String {
        self.brokers.join(",")
    }
}

fn split_brokers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(String::from)
        .collect()
}

impl FromEnv for KafkaConfig {
    /// Reads:
    /// - KAFKA_BROKERS: comma-separated, defaults to localhost:9092
    /// - KAFKA_GROUP_ID: defaults to email-group
    /// - KAFKA_TOPIC: required
    /// - KAFKA_CLIENT_ID: defaults to email-service
    /// - KAFKA_AUTO_OFFSET_RESET: defaults to latest
    fn from_env() -> Result<Self, ConfigError> {
        let brokers = split_brokers(&env_or_default("KAFKA_BROKERS", "localhost:9092"));
        if brokers.is_empty() {
            return Err(ConfigError::ParseError {
                key: "KAFKA_BROKERS".to_string(),
                details: "no broker addresses given".to_string(),
            });
        }

        let auto_offset_reset = env_or_default("KAFKA_AUTO_OFFSET_RESET", "latest");
        if !matches!(auto_offset_reset.as_str(), "latest" | "earliest") {
            return Err(ConfigError::ParseError {
                key: "KAFKA_AUTO_OFFSET_RESET".to_string(),
                details: format!("expected 'latest' or 'earliest', got '{}'", auto_offset_reset),
            });
        }

        Ok(Self {
            brokers,
            group_id: env_or_default("KAFKA_GROUP_ID", "email-group"),
            topic: env_required("KAFKA_TOPIC")?,
            client_id: env_or_default("KAFKA_CLIENT_ID", "email-service"),
            auto_offset_reset,
            session_timeout_ms: env_parse("KAFKA_SESSION_TIMEOUT_MS", 6000)?,
            metadata_timeout_ms: env_parse("KAFKA_METADATA_TIMEOUT_MS", 10_000)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kafka_config_defaults() {
        temp_env::with_vars(
            [
                ("KAFKA_TOPIC", Some("notifications")),
                ("KAFKA_BROKERS", None),
                ("KAFKA_GROUP_ID", None),
                ("KAFKA_CLIENT_ID", None),
                ("KAFKA_AUTO_OFFSET_RESET", None),
            ],
            || {
                let config = KafkaConfig::from_env().unwrap();
                assert_eq!(config.brokers, vec!["localhost:9092".to_string()]);
                assert_eq!(config.group_id, "email-group");
                assert_eq!(config.client_id, "email-service");
                assert_eq!(config.topic, "notifications");
                assert_eq!(config.auto_offset_reset, "latest");
            },
        );
    }

    #[test]
    fn test_kafka_config_broker_list() {
        temp_env::with_vars(
            [
                ("KAFKA_TOPIC", Some("notifications")),
                ("KAFKA_BROKERS", Some("kafka-0:9092, kafka-1:9092,,")),
            ],
            || {
                let config = KafkaConfig::from_env().unwrap();
                assert_eq!(config.brokers.len(), 2);
                assert_eq!(config.bootstrap_servers(), "kafka-0:9092,kafka-1:9092");
            },
        );
    }

    #[test]
    fn test_kafka_config_topic_required() {
        temp_env::with_var_unset("KAFKA_TOPIC", || {
            let err = KafkaConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("KAFKA_TOPIC"));
        });
    }

    #[test]
    fn test_kafka_config_rejects_unknown_offset_reset() {
        temp_env::with_vars(
            [
                ("KAFKA_TOPIC", Some("notifications")),
                ("KAFKA_AUTO_OFFSET_RESET", Some("beginning")),
            ],
            || {
                let err = KafkaConfig::from_env().unwrap_err();
                assert!(err.to_string().contains("KAFKA_AUTO_OFFSET_RESET"));
            },
        );
    }
}
