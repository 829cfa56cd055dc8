use serde::{Deserialize, Serialize};

use crate::registry::DEFAULT_PREFIX;

/// Propagation settings, usually loaded once at start-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationConfig {
    /// Prefix of every propagated HTTP header.
    pub http_prefix: String,
    /// Prefix of every propagated gRPC metadata key.
    pub metadata_prefix: String,
    /// Whether the deadline travels with the values.
    pub deadline: bool,
    /// `"rfc3339"` or a `time` format description.
    pub time_format: String,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            http_prefix: DEFAULT_PREFIX.to_string(),
            metadata_prefix: DEFAULT_PREFIX.to_string(),
            deadline: true,
            time_format: "rfc3339".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_uses_defaults_for_missing_fields() {
        let cfg: PropagationConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, PropagationConfig::default());
        assert_eq!(cfg.http_prefix, "X-Go-Context-");
        assert!(cfg.deadline);
    }

    #[test]
    fn partial_deserialization() {
        let json = r#"{"http_prefix": "Z-", "deadline": false}"#;
        let cfg: PropagationConfig = serde_json::from_str(json).unwrap();

        assert_eq!(cfg.http_prefix, "Z-");
        assert_eq!(cfg.metadata_prefix, DEFAULT_PREFIX);
        assert!(!cfg.deadline);
        assert_eq!(cfg.time_format, "rfc3339");
    }
}
