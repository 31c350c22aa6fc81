//! Service configuration.
//!
//! All settings come from the environment with reference-deployment
//! defaults, so a bare `bookstock` run against a local broker just works.

use anyhow::{Context, Result};
use std::time::Duration;

/// Topic carrying stock-change events in the reference deployment.
pub const DEFAULT_TOPIC: &str = "topic_rental";

/// Runtime configuration for the adapter service.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Kafka bootstrap servers (`KAFKA_BROKERS`, default `localhost:9092`).
    pub brokers: String,
    /// Consumer group id (`KAFKA_GROUP_ID`, default `book-inventory`).
    pub group_id: String,
    /// Topic to subscribe to (`KAFKA_TOPIC`, default `topic_rental`).
    pub topic: String,
    /// Poll timeout (`POLL_TIMEOUT_SECS`, default 3).
    pub poll_timeout: Duration,
}

impl ServiceConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error when a supplied value does not parse (currently
    /// only `POLL_TIMEOUT_SECS`).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let brokers = lookup("KAFKA_BROKERS").unwrap_or_else(|| "localhost:9092".to_string());
        let group_id = lookup("KAFKA_GROUP_ID").unwrap_or_else(|| "book-inventory".to_string());
        let topic = lookup("KAFKA_TOPIC").unwrap_or_else(|| DEFAULT_TOPIC.to_string());
        let poll_timeout = match lookup("POLL_TIMEOUT_SECS") {
            None => Duration::from_secs(3),
            Some(raw) => Duration::from_secs(
                raw.parse()
                    .with_context(|| format!("POLL_TIMEOUT_SECS is not a number: '{raw}'"))?,
            ),
        };

        Ok(Self {
            brokers,
            group_id,
            topic,
            poll_timeout,
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        move |key| map.get(key).map(ToString::to_string)
    }

    #[test]
    fn defaults_match_reference_deployment() {
        let config = ServiceConfig::from_lookup(lookup_from(&[])).expect("defaults");
        assert_eq!(config.brokers, "localhost:9092");
        assert_eq!(config.group_id, "book-inventory");
        assert_eq!(config.topic, DEFAULT_TOPIC);
        assert_eq!(config.poll_timeout, Duration::from_secs(3));
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = ServiceConfig::from_lookup(lookup_from(&[
            ("KAFKA_BROKERS", "kafka-1:9092,kafka-2:9092"),
            ("KAFKA_GROUP_ID", "inventory-eu"),
            ("KAFKA_TOPIC", "topic_rental_eu"),
            ("POLL_TIMEOUT_SECS", "10"),
        ]))
        .expect("overrides");

        assert_eq!(config.brokers, "kafka-1:9092,kafka-2:9092");
        assert_eq!(config.group_id, "inventory-eu");
        assert_eq!(config.topic, "topic_rental_eu");
        assert_eq!(config.poll_timeout, Duration::from_secs(10));
    }

    #[test]
    fn unparsable_timeout_is_rejected() {
        let result = ServiceConfig::from_lookup(lookup_from(&[("POLL_TIMEOUT_SECS", "soon")]));
        assert!(result.is_err());
    }
}
