//! Device announcement parsing and derived accessors (spec §3, §6).

/// Parsed `A`-frame announcement payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_type: String,
    pub firmware_version: String,
    pub serial_number: String,
}

impl DeviceInfo {
    /// Parses `VelocitySP-v<fw>-<model>-<serial> <n1> <n2> <n3>`. Falls back
    /// to the raw first whitespace-separated token with `"Unknown"` fields
    /// if the dash-split prefix doesn't match.
    pub fn parse(payload: &str) -> Self {
        let first_token = payload.split_whitespace().next().unwrap_or("");
        let parts: Vec<&str> = first_token.split('-').collect();

        if parts.first() == Some(&"VelocitySP") && parts.len() >= 4 {
            DeviceInfo {
                firmware_version: parts[1].strip_prefix('v').unwrap_or(parts[1]).to_string(),
                device_type: parts[2].to_string(),
                serial_number: parts[3].to_string(),
            }
        } else {
            DeviceInfo {
                device_type: first_token.to_string(),
                firmware_version: "Unknown".to_string(),
                serial_number: "Unknown".to_string(),
            }
        }
    }

    /// Port count derived from `device_type` by case-insensitive substring
    /// match (spec §6).
    pub fn port_count(&self) -> u32 {
        let ty = self.device_type.to_ascii_lowercase();
        if ty.contains("9662") {
            2
        } else if ty.contains("9668") {
            8
        } else if ty.contains("9692") {
            12
        } else {
            2
        }
    }
}
