//! Watcher configuration management

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    pub watch: WatchSettings,
    pub usb: UsbSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchSettings {
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsbSettings {
    /// Watch every attached device
    #[serde(default)]
    pub match_all: bool,
    /// Specific devices to watch (0xVID:0xPID format)
    #[serde(default)]
    pub filters: Vec<String>,
    /// Device class codes to watch
    #[serde(default)]
    pub classes: Vec<u8>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            watch: WatchSettings {
                log_level: "info".to_string(),
            },
            usb: UsbSettings {
                match_all: true,
                filters: Vec::new(),
                classes: Vec::new(),
            },
        }
    }
}

impl WatchConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/usb-hotplug/watch.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: WatchConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("usb-hotplug").join("watch.toml")
        } else {
            PathBuf::from(".config/usb-hotplug/watch.toml")
        }
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.watch.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.watch.log_level,
                valid_levels.join(", ")
            ));
        }

        // Validate USB filters (VID:PID format)
        for filter in &self.usb.filters {
            parse_filter(filter)?;
        }

        Ok(())
    }
}

/// Parse a USB device filter pattern (VID:PID) into its vendor and product IDs
pub fn parse_filter(filter: &str) -> Result<(u16, u16)> {
    let parts: Vec<&str> = filter.split(':').collect();
    if parts.len() != 2 {
        return Err(anyhow!(
            "Invalid filter format '{}', expected VID:PID (e.g., '0x04f9:0x0042')",
            filter
        ));
    }

    let vendor_id = parse_hex_id(parts[0], "VID")?;
    let product_id = parse_hex_id(parts[1], "PID")?;
    Ok((vendor_id, product_id))
}

/// Parse a hex ID (VID or PID)
fn parse_hex_id(id: &str, name: &str) -> Result<u16> {
    if !id.starts_with("0x") && !id.starts_with("0X") {
        return Err(anyhow!(
            "Invalid {} '{}', must start with '0x' (e.g., '0x1234')",
            name,
            id
        ));
    }

    let hex_part = &id[2..];
    if hex_part.is_empty() || hex_part.len() > 4 {
        return Err(anyhow!(
            "Invalid {} '{}', hex part must be 1-4 digits",
            name,
            id
        ));
    }

    u16::from_str_radix(hex_part, 16)
        .map_err(|_| anyhow!("Invalid {} '{}', not a valid hex number", name, id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WatchConfig::default();
        assert_eq!(config.watch.log_level, "info");
        assert!(config.usb.match_all);
        assert!(config.usb.filters.is_empty());
        assert!(config.usb.classes.is_empty());
    }

    #[test]
    fn test_parse_filter_valid() {
        assert_eq!(parse_filter("0x1234:0x5678").unwrap(), (0x1234, 0x5678));
        assert_eq!(parse_filter("0xABCD:0xEF01").unwrap(), (0xabcd, 0xef01));
        assert_eq!(parse_filter("0x1:0x2").unwrap(), (0x1, 0x2));
    }

    #[test]
    fn test_parse_filter_invalid() {
        assert!(parse_filter("1234:5678").is_err());
        assert!(parse_filter("0x1234").is_err());
        assert!(parse_filter("0x1234:0x5678:0x9abc").is_err());
        assert!(parse_filter("0xGHIJ:0x5678").is_err());
        assert!(parse_filter("0x12345:0x5678").is_err());
        assert!(parse_filter("0x1234:*").is_err());
        assert!(parse_filter("*:0x5678").is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = WatchConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: WatchConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.watch.log_level, parsed.watch.log_level);
        assert_eq!(config.usb.match_all, parsed.usb.match_all);
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = WatchConfig::default();
        assert!(config.validate().is_ok());

        config.watch.log_level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.watch.log_level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_filter() {
        let mut config = WatchConfig::default();
        config.usb.filters.push("0x04f9:0x0042".to_string());
        assert!(config.validate().is_ok());

        config.usb.filters.push("garbage".to_string());
        assert!(config.validate().is_err());
    }
}
