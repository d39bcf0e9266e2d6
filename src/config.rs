use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use thiserror::Error;

use crate::game::BattleMode;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("port cannot be 0")]
    ZeroPort,
    #[error("{0} must be at least 1")]
    ZeroLimit(&'static str),
    #[error("max_connections_per_ip ({per_ip}) exceeds max_connections ({total})")]
    PerIpAboveTotal { per_ip: usize, total: usize },
    #[error("default battle mode {0:?} is not available")]
    UnknownMode(String),
}

/// How a connection schedules its handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// One task per command; no ordering between handlers
    #[default]
    Concurrent,
    /// One worker per connection; handlers run in arrival order
    Strict,
}

impl FromStr for DispatchMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "concurrent" => Ok(DispatchMode::Concurrent),
            "strict" => Ok(DispatchMode::Strict),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Maximum number of battles in the registry
    pub max_battles: usize,
    /// Capacity of battles created without an explicit limit
    pub max_players_per_battle: usize,
    pub max_connections: usize,
    pub max_connections_per_ip: usize,
    /// Bytes buffered without a delimiter before the connection is dropped
    pub max_frame_size: usize,
    pub dispatch_mode: DispatchMode,
    /// Decrypt inbound frames
    pub protocol_encryption: bool,
    pub tank_activation_delay_ms: u64,
    pub self_destruct_delay_ms: u64,
    pub mine_arming_delay_ms: u64,
    /// 0 disables periodic bonus drops
    pub bonus_spawn_interval_secs: u64,
    pub gold_drop_delay_secs: u64,
    /// Persistent battle created at startup
    pub default_battle_title: String,
    pub default_battle_map: String,
    pub default_battle_mode: String,
    pub maps_path: Option<String>,
    pub garage_path: Option<String>,
    pub metrics_port: u16,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 1337,
            max_battles: 100,
            max_players_per_battle: 16,
            max_connections: 1000,
            max_connections_per_ip: 8,
            max_frame_size: crate::game::constants::net::MAX_FRAME_SIZE,
            dispatch_mode: DispatchMode::Concurrent,
            protocol_encryption: true,
            tank_activation_delay_ms: 1500,
            self_destruct_delay_ms: 10_000,
            mine_arming_delay_ms: crate::game::constants::mines::ACTIVATION_TIME_MS,
            bonus_spawn_interval_secs: 30,
            gold_drop_delay_secs: 20,
            default_battle_title: "For newbies".to_string(),
            default_battle_map: "map_sandbox".to_string(),
            default_battle_mode: "DM".to_string(),
            maps_path: None,
            garage_path: None,
            metrics_port: 9090,
            log_format: LogFormat::Pretty,
        }
    }
}

/// Parse `name` into `target`, keeping the default on bad input
fn read_env<T: FromStr>(name: &str, target: &mut T) {
    if let Ok(raw) = std::env::var(name) {
        match raw.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!("Invalid {} '{}', using default", name, raw),
        }
    }
}

fn read_flag(name: &str, target: &mut bool) {
    if let Ok(raw) = std::env::var(name) {
        match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => *target = true,
            "0" | "false" | "no" | "off" => *target = false,
            _ => tracing::warn!("Invalid {} '{}', using default", name, raw),
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        read_env("BIND_ADDRESS", &mut config.bind_address);
        read_env("PORT", &mut config.port);
        read_env("MAX_BATTLES", &mut config.max_battles);
        read_env("MAX_PLAYERS_PER_BATTLE", &mut config.max_players_per_battle);
        read_env("MAX_CONNECTIONS", &mut config.max_connections);
        read_env("MAX_CONNECTIONS_PER_IP", &mut config.max_connections_per_ip);
        read_env("MAX_FRAME_SIZE", &mut config.max_frame_size);
        read_env("DISPATCH_MODE", &mut config.dispatch_mode);
        read_flag("PROTOCOL_ENCRYPTION", &mut config.protocol_encryption);
        read_env("TANK_ACTIVATION_DELAY_MS", &mut config.tank_activation_delay_ms);
        read_env("SELF_DESTRUCT_DELAY_MS", &mut config.self_destruct_delay_ms);
        read_env("MINE_ARMING_DELAY_MS", &mut config.mine_arming_delay_ms);
        read_env("BONUS_SPAWN_INTERVAL_SECS", &mut config.bonus_spawn_interval_secs);
        read_env("GOLD_DROP_DELAY_SECS", &mut config.gold_drop_delay_secs);
        read_env("DEFAULT_BATTLE_TITLE", &mut config.default_battle_title);
        read_env("DEFAULT_BATTLE_MAP", &mut config.default_battle_map);
        read_env("DEFAULT_BATTLE_MODE", &mut config.default_battle_mode);
        read_env("METRICS_PORT", &mut config.metrics_port);

        if let Ok(path) = std::env::var("MAPS_PATH") {
            config.maps_path = Some(path);
        }
        if let Ok(path) = std::env::var("GARAGE_PATH") {
            config.garage_path = Some(path);
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            config.log_format = if format.eq_ignore_ascii_case("json") {
                LogFormat::Json
            } else {
                LogFormat::Pretty
            };
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        for (name, value) in [
            ("max_battles", self.max_battles),
            ("max_players_per_battle", self.max_players_per_battle),
            ("max_connections", self.max_connections),
            ("max_connections_per_ip", self.max_connections_per_ip),
            ("max_frame_size", self.max_frame_size),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroLimit(name));
            }
        }
        if self.max_connections_per_ip > self.max_connections {
            return Err(ConfigError::PerIpAboveTotal {
                per_ip: self.max_connections_per_ip,
                total: self.max_connections,
            });
        }
        self.default_mode()?;
        Ok(())
    }

    pub fn default_mode(&self) -> Result<BattleMode, ConfigError> {
        BattleMode::from_key(&self.default_battle_mode)
            .ok_or_else(|| ConfigError::UnknownMode(self.default_battle_mode.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 1337);
        assert_eq!(config.max_battles, 100);
        assert_eq!(config.dispatch_mode, DispatchMode::Concurrent);
        assert!(config.protocol_encryption);
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.default_mode(), Ok(BattleMode::Deathmatch));
    }

    #[test]
    fn test_load_or_default() {
        let config = ServerConfig::load_or_default();
        assert!(config.port > 0);
    }

    #[test]
    fn test_dispatch_mode_parse() {
        assert_eq!("STRICT".parse(), Ok(DispatchMode::Strict));
        assert_eq!("concurrent".parse(), Ok(DispatchMode::Concurrent));
        assert!("parallel".parse::<DispatchMode>().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_limits() {
        let config = ServerConfig {
            max_connections_per_ip: 10,
            max_connections: 5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::PerIpAboveTotal { .. })));

        let config = ServerConfig {
            max_battles: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroLimit("max_battles")));

        let config = ServerConfig {
            default_battle_mode: "RACE".into(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::UnknownMode(_))));
    }
}
