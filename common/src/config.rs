use serde::{Deserialize, Serialize};

use crate::{history::HISTORY_CAPACITY, paths::TEMPLATE_FILE};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub interval_ms: u64,
    pub history_capacity: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 600_000,
            history_capacity: HISTORY_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub http_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            http_port: 80,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub template_path: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            template_path: TEMPLATE_FILE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HardwareConfig {
    pub i2c_sda: i32,
    pub i2c_scl: i32,
    pub i2c_baudrate_hz: u32,
    pub bmp280_address: u8,
    pub sht4x_address: u8,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            i2c_sda: 32,
            i2c_scl: 33,
            i2c_baudrate_hz: 100_000,
            bmp280_address: 0x76,
            sht4x_address: 0x44,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub sampling: SamplingConfig,
    pub network: NetworkConfig,
    pub report: ReportConfig,
    pub hardware: HardwareConfig,
}

impl SamplingConfig {
    pub fn sanitize(&mut self) {
        self.interval_ms = self.interval_ms.clamp(1_000, 86_400_000);
        self.history_capacity = self.history_capacity.clamp(1, 10_000);
    }
}

impl NetworkConfig {
    pub fn sanitize(&mut self) {
        if self.http_port == 0 {
            self.http_port = 80;
        }
    }
}

impl HardwareConfig {
    pub fn sanitize(&mut self) {
        self.i2c_baudrate_hz = self.i2c_baudrate_hz.clamp(10_000, 1_000_000);

        // 7-bit addressing only.
        if self.bmp280_address > 0x7f {
            self.bmp280_address = 0x76;
        }
        if self.sht4x_address > 0x7f {
            self.sht4x_address = 0x44;
        }
    }
}

impl StationConfig {
    pub fn sanitize(&mut self) {
        self.sampling.sanitize();
        self.network.sanitize();
        self.hardware.sanitize();
        if self.report.template_path.trim().is_empty() {
            self.report.template_path = TEMPLATE_FILE.to_string();
        }
    }

    pub fn from_json(raw: &[u8]) -> Result<Self, serde_json::Error> {
        let mut config: StationConfig = serde_json::from_slice(raw)?;
        config.sanitize();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_match_device_wiring() {
        let config = StationConfig::default();

        assert_eq!(config.sampling.interval_ms, 600_000);
        assert_eq!(config.sampling.history_capacity, 300);
        assert_eq!(config.report.template_path, "/graph.html");
        assert_eq!(config.network.http_port, 80);
        assert_eq!(config.hardware, HardwareConfig::default());
        assert_eq!(config.hardware.bmp280_address, 0x76);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            StationConfig::from_json(br#"{"sampling":{"interval_ms":5000},"network":{"http_port":8080}}"#)
                .unwrap();

        assert_eq!(config.sampling.interval_ms, 5_000);
        assert_eq!(config.sampling.history_capacity, 300);
        assert_eq!(config.network.http_port, 8080);
        assert_eq!(config.report.template_path, "/graph.html");
    }

    #[test]
    fn sanitize_clamps_out_of_range_values() {
        let mut config = StationConfig::default();
        config.sampling.interval_ms = 10;
        config.sampling.history_capacity = 0;
        config.network.http_port = 0;
        config.report.template_path = " ".to_string();
        config.hardware.sht4x_address = 0x90;

        config.sanitize();

        assert_eq!(config.sampling.interval_ms, 1_000);
        assert_eq!(config.sampling.history_capacity, 1);
        assert_eq!(config.network.http_port, 80);
        assert_eq!(config.report.template_path, "/graph.html");
        assert_eq!(config.hardware.sht4x_address, 0x44);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(StationConfig::from_json(b"{\"sampling\":").is_err());
    }
}
