//! Location Config Model

use serde::{Deserialize, Serialize};

/// Default poll interval when the setup tool does not provide one
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;

/// Per-location identity and connection settings
///
/// Written by the setup tool, read once by the agent at startup.
/// Every field defaults to empty so that a missing field surfaces as a
/// validation error instead of a parse error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationConfig {
    #[serde(default)]
    pub location_id: String,
    #[serde(default)]
    pub location_name: String,
    /// Base URL of the central order service
    #[serde(default)]
    pub server_url: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// `tcp://host:port`, `host:port`, or an OS printer queue name
    #[serde(default)]
    pub printer_name: String,
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_default_to_blank() {
        let config: LocationConfig = serde_json::from_str(r#"{"locationName":"Kadikoy"}"#).unwrap();
        assert_eq!(config.location_id, "");
        assert_eq!(config.server_url, "");
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
    }

    #[test]
    fn test_camel_case_wire_names() {
        let config = LocationConfig {
            location_id: "loc-1".to_string(),
            location_name: "Kadikoy".to_string(),
            server_url: "https://orders.example.com".to_string(),
            poll_interval_ms: 3000,
            printer_name: "tcp://192.168.1.50:9100".to_string(),
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["locationId"], "loc-1");
        assert_eq!(json["pollIntervalMs"], 3000);
        assert_eq!(json["printerName"], "tcp://192.168.1.50:9100");
    }
}
