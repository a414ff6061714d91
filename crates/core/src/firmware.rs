//! Firmware catalogue and target-server identity types.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// FirmwareVersion
// ---------------------------------------------------------------------------

/// One entry of the firmware catalogue.
///
/// Each firmware package ships separate bundles for blade and rack
/// hardware; a server reports the bundle version it is running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareVersion {
    pub name: String,
    #[serde(default)]
    pub blade_bundle_version: Option<String>,
    #[serde(default)]
    pub rack_bundle_version: Option<String>,
}

impl FirmwareVersion {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blade_bundle_version: None,
            rack_bundle_version: None,
        }
    }

    /// Whether a server reporting `current_version` already runs this package.
    pub fn is_installed(&self, current_version: &str) -> bool {
        self.name == current_version
            || self.rack_bundle_version.as_deref() == Some(current_version)
            || self.blade_bundle_version.as_deref() == Some(current_version)
    }
}

/// Names of all catalogue entries, in catalogue order.
pub fn version_names(catalogue: &[FirmwareVersion]) -> Vec<String> {
    catalogue.iter().map(|fw| fw.name.clone()).collect()
}

// ---------------------------------------------------------------------------
// Server search
// ---------------------------------------------------------------------------

/// Field used to look a server up in the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchCriteria {
    Name,
    SerialNumber,
    Location,
}

impl SearchCriteria {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::SerialNumber => "serial_number",
            Self::Location => "location",
        }
    }
}

impl std::str::FromStr for SearchCriteria {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(Self::Name),
            "serial_number" => Ok(Self::SerialNumber),
            "location" => Ok(Self::Location),
            other => Err(CoreError::Validation(format!(
                "Unknown search criteria '{other}'. Must be one of: name, serial_number, location"
            ))),
        }
    }
}

/// Inventory record of a server that can receive a firmware upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub domain: String,
    /// Display label, e.g. `"Server server1"`.
    pub usr_lbl: String,
    #[serde(default)]
    pub dn: String,
    pub serial: String,
    /// Site / location name.
    #[serde(default)]
    pub name: String,
    /// Firmware version currently installed.
    pub version: String,
}

impl ServerInfo {
    /// Short server name: the second word of the display label.
    ///
    /// Falls back to the whole label when it has a single word.
    pub fn server_name(&self) -> &str {
        self.usr_lbl
            .split_whitespace()
            .nth(1)
            .unwrap_or(self.usr_lbl.trim())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn server(label: &str) -> ServerInfo {
        ServerInfo {
            domain: "central".into(),
            usr_lbl: label.into(),
            dn: "DN123456".into(),
            serial: "SN123".into(),
            name: "TLV".into(),
            version: "4.2.0".into(),
        }
    }

    #[test]
    fn server_name_is_second_word_of_label() {
        assert_eq!(server("Server server1").server_name(), "server1");
    }

    #[test]
    fn server_name_falls_back_to_label() {
        assert_eq!(server("server1").server_name(), "server1");
    }

    #[test]
    fn installed_matches_any_bundle() {
        let fw = FirmwareVersion {
            name: "4.2.2".into(),
            blade_bundle_version: Some("4.2.1".into()),
            rack_bundle_version: Some("4.2.1b".into()),
        };
        assert!(fw.is_installed("4.2.1"));
        assert!(fw.is_installed("4.2.1b"));
        assert!(fw.is_installed("4.2.2"));
        assert!(!fw.is_installed("4.2.0"));
    }

    #[test]
    fn catalogue_entry_deserializes_without_bundles() {
        let fw: FirmwareVersion = serde_json::from_str(r#"{"name": "4.1"}"#).unwrap();
        assert_eq!(fw, FirmwareVersion::new("4.1"));
    }

    #[test]
    fn search_criteria_parse() {
        assert_eq!("serial_number".parse::<SearchCriteria>().unwrap(), SearchCriteria::SerialNumber);
        assert!("rack".parse::<SearchCriteria>().is_err());
    }
}
