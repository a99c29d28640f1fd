//! Request and response types for the Particle cloud API

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::DistroVersions;

const UNKNOWN: &str = "Unknown";

/// Device details as returned by `GET /devices/{id}`
///
/// The body is kept verbatim; only a few fields are interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceInfo(Value);

impl DeviceInfo {
    pub fn new(body: Value) -> Self {
        Self(body)
    }

    /// Get a top-level field rendered as text
    ///
    /// Numbers and booleans are formatted; `null` and missing fields are `None`.
    pub fn text(&self, key: &str) -> Option<String> {
        self.0.get(key).and_then(value_text)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Firmware and OS versions merged from the cloud and the local distro file
///
/// Every field falls back to `"Unknown"` on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDetails {
    pub firmware_version: String,
    pub product_id: String,
    pub platform_id: String,
    pub distro_stack: String,
    pub distro_version: String,
    pub distro_variant: String,
    pub ubuntu_source: String,
    pub quectel_firmware: String,
    pub syscon_firmware: String,
}

impl VersionDetails {
    /// Merge a device info response with the local distro document
    pub fn merge(device_info: &DeviceInfo, distro: &DistroVersions) -> Self {
        let cloud = |key: &str| device_info.text(key).unwrap_or_else(unknown);
        let local = |section: &str, key: &str| {
            distro
                .get(section, key)
                .and_then(value_text)
                .unwrap_or_else(unknown)
        };

        Self {
            firmware_version: cloud("firmware_version"),
            product_id: cloud("product_id"),
            platform_id: cloud("platform_id"),
            distro_stack: local("distro", "stack"),
            distro_version: local("distro", "version"),
            distro_variant: local("distro", "variant"),
            ubuntu_source: local("src", "ubuntu_20_04"),
            quectel_firmware: local("src", "quectel_bp_fw"),
            syscon_firmware: local("src", "syscon_firmware"),
        }
    }

    /// Field names and values, in declaration order
    pub fn fields(&self) -> [(&'static str, &str); 9] {
        [
            ("firmware_version", self.firmware_version.as_str()),
            ("product_id", self.product_id.as_str()),
            ("platform_id", self.platform_id.as_str()),
            ("distro_stack", self.distro_stack.as_str()),
            ("distro_version", self.distro_version.as_str()),
            ("distro_variant", self.distro_variant.as_str()),
            ("ubuntu_source", self.ubuntu_source.as_str()),
            ("quectel_firmware", self.quectel_firmware.as_str()),
            ("syscon_firmware", self.syscon_firmware.as_str()),
        ]
    }
}

fn unknown() -> String {
    UNKNOWN.to_string()
}

/// Form body of an event publish request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishRequest {
    pub name: String,
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub as_device_id: Option<String>,
    pub private: bool,
    pub ttl: u32,
}

/// What happened to a published event
#[derive(Debug, Clone, PartialEq)]
pub enum PublishOutcome {
    /// Sent to the cloud; carries the response body unchanged
    Sent(Value),
    /// Dropped locally because the SDK runs in emulation mode
    Dropped,
}

impl PublishOutcome {
    pub fn is_dropped(&self) -> bool {
        matches!(self, Self::Dropped)
    }

    pub fn response(&self) -> Option<&Value> {
        match self {
            Self::Sent(body) => Some(body),
            Self::Dropped => None,
        }
    }
}

/// Which events endpoint publishes go to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PublishEndpoint {
    /// Product-scoped when a product id is configured, device-scoped otherwise
    #[default]
    Auto,
    /// `POST {base}/devices/events`
    Device,
    /// `POST {base}/products/{product_id}/events`
    Product,
}

/// Error body returned by the cloud API
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub info: Option<String>,
}

impl ErrorResponse {
    pub fn message(&self) -> Option<String> {
        self.error_description
            .clone()
            .or_else(|| self.info.clone())
            .or_else(|| self.error.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_merge_all_present() {
        let info = DeviceInfo::new(json!({
            "firmware_version": "5.6.0",
            "product_id": 32,
            "platform_id": 32
        }));
        let details = VersionDetails::merge(&info, &DistroVersions::emulated());

        assert_eq!(details.firmware_version, "5.6.0");
        assert_eq!(details.product_id, "32");
        assert_eq!(details.platform_id, "32");
        assert_eq!(details.distro_stack, "emulated-stack");
        assert_eq!(details.distro_version, "0.0.1-emulated");
        assert_eq!(details.distro_variant, "emulated");
        assert_eq!(details.ubuntu_source, "mock-image");
        assert_eq!(details.quectel_firmware, "mock-fw");
        assert_eq!(details.syscon_firmware, "mock-syscon");
    }

    #[test]
    fn test_merge_fields_default_independently() {
        let info = DeviceInfo::new(json!({"platform_id": 6, "firmware_version": null}));
        let distro = DistroVersions::new(json!({
            "distro": {"version": "1.2.3"},
            "src": {"syscon_firmware": "sc-9"}
        }));
        let details = VersionDetails::merge(&info, &distro);

        let unknown: Vec<&str> = details
            .fields()
            .iter()
            .filter(|(_, v)| *v == "Unknown")
            .map(|(k, _)| *k)
            .collect();
        assert_eq!(
            unknown,
            vec![
                "firmware_version",
                "product_id",
                "distro_stack",
                "distro_variant",
                "ubuntu_source",
                "quectel_firmware",
            ]
        );
        assert_eq!(details.platform_id, "6");
        assert_eq!(details.distro_version, "1.2.3");
        assert_eq!(details.syscon_firmware, "sc-9");
    }

    #[test]
    fn test_publish_request_form_omits_missing_device() {
        let request = PublishRequest {
            name: "temp".into(),
            data: "21.5".into(),
            as_device_id: None,
            private: true,
            ttl: 60,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({"name": "temp", "data": "21.5", "private": true, "ttl": 60})
        );
    }

    #[test]
    fn test_error_response_message_preference() {
        let body: ErrorResponse =
            serde_json::from_value(json!({"error": "invalid_token", "error_description": "expired"}))
                .unwrap();
        assert_eq!(body.message().as_deref(), Some("expired"));
    }
}
