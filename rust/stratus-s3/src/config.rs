use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::S3Error;

const MIB: usize = 1024 * 1024;

/// Tunables for a [`Client`](crate::Client) and the buckets it opens.
///
/// Durations are (de)serialized as whole milliseconds. Missing fields take
/// their default value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service host; buckets are addressed as `<bucket>.<service_host>`
    pub service_host: String,
    /// Service name used in the signing scope
    pub service: String,
    /// URL scheme
    pub scheme: String,
    /// Attempts per logical operation, first attempt included
    pub max_attempts: u32,
    /// Temporary redirects followed per exchange
    pub max_redirects: u32,
    /// Sleep before the second attempt
    #[serde(with = "millis")]
    pub initial_delay: Duration,
    /// Amount the sleep grows by after the first retry
    #[serde(with = "millis")]
    pub initial_step: Duration,
    /// Amount the step itself grows by after each retry
    #[serde(with = "millis")]
    pub step_growth: Duration,
    /// Granularity at which sleeping retries notice cancellation
    #[serde(with = "millis")]
    pub cancel_poll_interval: Duration,
    /// Objects larger than this are uploaded in parts
    pub multipart_threshold: usize,
    /// Size of each part but the last
    pub part_size: usize,
    /// Timeout applied by the HTTP transport to a single exchange
    #[serde(with = "millis")]
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_host: "s3.amazonaws.com".into(),
            service: "s3".into(),
            scheme: "https".into(),
            max_attempts: 8,
            max_redirects: 5,
            initial_delay: Duration::from_secs(1),
            initial_step: Duration::from_secs(2),
            step_growth: Duration::from_secs(1),
            cancel_poll_interval: Duration::from_millis(200),
            multipart_threshold: 10 * MIB,
            part_size: 6 * MIB,
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl Config {
    /// Check that the values describe a usable client.
    pub fn validate(&self) -> Result<(), S3Error> {
        if self.max_attempts == 0 {
            return Err(S3Error::Configuration(
                "max_attempts must be at least 1".into(),
            ));
        }
        if self.part_size == 0 {
            return Err(S3Error::Configuration("part_size must not be zero".into()));
        }
        if self.part_size > self.multipart_threshold {
            return Err(S3Error::Configuration(format!(
                "part_size ({}) must not exceed multipart_threshold ({})",
                self.part_size, self.multipart_threshold
            )));
        }
        if self.cancel_poll_interval.is_zero() {
            return Err(S3Error::Configuration(
                "cancel_poll_interval must not be zero".into(),
            ));
        }
        if self.service_host.is_empty() {
            return Err(S3Error::Configuration("service_host must be set".into()));
        }
        Ok(())
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn it_defaults_to_the_reference_values() {
        let config = Config::default();
        assert_eq!(config.max_attempts, 8);
        assert_eq!(config.max_redirects, 5);
        assert_eq!(config.multipart_threshold, 10 * 1024 * 1024);
        assert_eq!(config.part_size, 6 * 1024 * 1024);
        assert_eq!(config.cancel_poll_interval, Duration::from_millis(200));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn it_reads_partial_json_with_millisecond_durations() -> anyhow::Result<()> {
        let config: Config = serde_json::from_str(
            r#"{"service_host":"storage.example.com","initial_delay":250,"max_attempts":3}"#,
        )?;
        assert_eq!(config.service_host, "storage.example.com");
        assert_eq!(config.initial_delay, Duration::from_millis(250));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.part_size, 6 * 1024 * 1024);

        let json = serde_json::to_value(&config)?;
        assert_eq!(json["initial_delay"], 250);
        Ok(())
    }

    #[test]
    fn it_rejects_unusable_values() {
        let config = Config {
            part_size: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(S3Error::Configuration(_))));

        let config = Config {
            max_attempts: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(S3Error::Configuration(_))));

        let config = Config {
            part_size: 11 * 1024 * 1024,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(S3Error::Configuration(_))));
    }
}
