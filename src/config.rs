//! Process-wide configuration.
//!
//! Loaded once at startup from a JSON file (or defaulted to the loopback
//! demo topology) and passed by reference into each coordinator's
//! constructor; nothing in the library reads ambient global state.

use std::time::Duration;

use serde::Deserialize;

use crate::protocol::{SCENARIO_BASELINE, SCENARIO_SECURE_ECU, SCENARIO_SECURE_INFOTAINMENT};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// C&C fan-out channel: one bind per coordinator role, and the
    /// subscriber set every sender delivers to.
    pub commander_bind: String,
    pub director_bind: String,
    pub kiosk_bind: String,
    pub cc_subscribers: Vec<String>,
    /// Kiosk external request server port.
    pub kiosk_port: u16,
    /// Hack-payload point-to-point channel (infotainment side door).
    pub info_bind: String,
    pub info_peer: String,
    pub info_allowlist: Vec<String>,
    pub info_denylist: Vec<String>,
    /// OTA server URL per scenario.
    pub ota_url_baseline: String,
    pub ota_url_secure_infotainment: String,
    pub ota_url_secure_ecu: String,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            commander_bind: "127.0.0.1:5030".to_string(),
            director_bind: "127.0.0.1:5031".to_string(),
            kiosk_bind: "127.0.0.1:5032".to_string(),
            cc_subscribers: vec![
                "127.0.0.1:5030".to_string(),
                "127.0.0.1:5031".to_string(),
                "127.0.0.1:5032".to_string(),
            ],
            kiosk_port: 5091,
            info_bind: "127.0.0.1:5050".to_string(),
            info_peer: "127.0.0.1:5051".to_string(),
            info_allowlist: vec!["127.0.0.1".to_string()],
            info_denylist: Vec::new(),
            ota_url_baseline: "http://10.88.88.11:5050".to_string(),
            ota_url_secure_infotainment: "http://10.88.88.21:5050".to_string(),
            ota_url_secure_ecu: "http://10.88.88.31:5050".to_string(),
        }
    }
}

impl NetConfig {
    pub fn ota_url(&self, scenario: u32) -> Option<&str> {
        match scenario {
            SCENARIO_BASELINE => Some(&self.ota_url_baseline),
            SCENARIO_SECURE_INFOTAINMENT => Some(&self.ota_url_secure_infotainment),
            SCENARIO_SECURE_ECU => Some(&self.ota_url_secure_ecu),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// READY announce cadence in the commander's steady state.
    pub ready_announce_interval_ms: u64,
    /// Short per-tick C&C receive timeout (commander).
    pub cc_timeout_ms: u64,
    /// Poll loop period for the synchronous coordinators.
    pub poll_period_ms: u64,
    /// Director: C&C receive timeout raced against the scenario deadline.
    pub director_cc_timeout_ms: u64,
    /// Director: scenario deadline before a forced restart.
    pub scenario_timeout_ms: u64,
    /// Director: how long autonomous driving holds before handing back.
    pub autopilot_hold_ms: u64,
    /// Director: bounded simulator restart attempts before escalating.
    pub max_restart_attempts: u8,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            ready_announce_interval_ms: 10_000,
            cc_timeout_ms: 100,
            poll_period_ms: 1_000,
            director_cc_timeout_ms: 20_000,
            scenario_timeout_ms: 180_000,
            autopilot_hold_ms: 20_000,
            max_restart_attempts: 3,
        }
    }
}

impl TimingConfig {
    pub fn ready_announce_interval(&self) -> Duration {
        Duration::from_millis(self.ready_announce_interval_ms)
    }

    pub fn cc_timeout(&self) -> Duration {
        Duration::from_millis(self.cc_timeout_ms)
    }

    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poll_period_ms)
    }

    pub fn director_cc_timeout(&self) -> Duration {
        Duration::from_millis(self.director_cc_timeout_ms)
    }

    pub fn scenario_timeout(&self) -> Duration {
        Duration::from_millis(self.scenario_timeout_ms)
    }

    pub fn autopilot_hold(&self) -> Duration {
        Duration::from_millis(self.autopilot_hold_ms)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub net: NetConfig,
    pub timing: TimingConfig,
}

impl Config {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TARGET_1;

    #[test]
    fn test_defaults_cover_every_scenario() {
        let config = Config::default();
        assert!(config.net.ota_url(SCENARIO_BASELINE).is_some());
        assert!(config.net.ota_url(SCENARIO_SECURE_INFOTAINMENT).is_some());
        assert!(config.net.ota_url(SCENARIO_SECURE_ECU).is_some());
        assert_eq!(config.net.ota_url(TARGET_1), None);
    }

    #[test]
    fn test_partial_file_fills_from_defaults() {
        let parsed: Config =
            serde_json::from_str(r#"{"net": {"kiosk_port": 6001}, "timing": {"cc_timeout_ms": 50}}"#)
                .unwrap();
        assert_eq!(parsed.net.kiosk_port, 6001);
        assert_eq!(parsed.net.commander_bind, NetConfig::default().commander_bind);
        assert_eq!(parsed.timing.cc_timeout_ms, 50);
        assert_eq!(parsed.timing.max_restart_attempts, 3);
    }
}
