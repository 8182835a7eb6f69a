use std::collections::BTreeMap;
use std::path::Path;

use admission::QueueConfig;
use net::channels::{CATEGORY_GAMEPLAY, CATEGORY_LOGIN};
use net::IntakeConfig;
use players::DirectoryConfig;
use world::{MapId, Position, WorldConfig};

/// Flat section-qualified configuration view: a `[server]` table's `port`
/// key becomes `server_port`. Collaborators consume this accessor contract;
/// the file format behind it is TOML, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    values: BTreeMap<String, String>,
}

impl Settings {
    /// Load from an optional TOML file. A missing path yields empty
    /// settings, so every consumer falls back to its defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, String> {
        match path {
            Some(path) if path.exists() => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| format!("read {}: {}", path.display(), e))?;
                Self::from_toml_str(&text)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, String> {
        let value: toml::Value = toml::from_str(text).map_err(|e| e.to_string())?;
        let mut values = BTreeMap::new();
        flatten("", &value, &mut values);
        Ok(Self { values })
    }

    pub fn get_str(&self, key: &str, default: &str) -> String {
        self.values
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    pub fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.parsed(key, default)
    }

    pub fn get_i64(&self, key: &str, default: i64) -> i64 {
        self.parsed(key, default)
    }

    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        self.parsed(key, default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.parsed(key, default)
    }

    /// Comma-joined list values (`world_maps = ["1:a.map", "2:b.map"]`).
    pub fn get_list(&self, key: &str) -> Vec<String> {
        match self.values.get(key) {
            Some(raw) if !raw.is_empty() => {
                raw.split(',').map(|s| s.trim().to_string()).collect()
            }
            _ => Vec::new(),
        }
    }

    fn parsed<T: std::str::FromStr + Copy>(&self, key: &str, default: T) -> T {
        match self.values.get(key) {
            Some(raw) => match raw.parse() {
                Ok(value) => value,
                Err(_) => {
                    tracing::warn!(key, %raw, "unparseable setting, using default");
                    default
                }
            },
            None => default,
        }
    }
}

fn flatten(prefix: &str, value: &toml::Value, out: &mut BTreeMap<String, String>) {
    match value {
        toml::Value::Table(table) => {
            for (key, value) in table {
                let qualified = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}_{}", prefix, key)
                };
                flatten(&qualified, value, out);
            }
        }
        toml::Value::Array(items) => {
            let joined = items
                .iter()
                .map(scalar_to_string)
                .collect::<Vec<_>>()
                .join(",");
            out.insert(prefix.to_string(), joined);
        }
        other => {
            out.insert(prefix.to_string(), scalar_to_string(other));
        }
    }
}

fn scalar_to_string(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Typed configuration assembled from `Settings`, consumed by the wiring in
/// `main` and the `GameServer`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
    pub world_name: String,
    /// `"<map_id>:<path>"` entries, resolved relative to `base_path`.
    pub maps: Vec<String>,
    pub base_path: String,
    pub max_players: usize,
    pub tick_ms: u64,
    pub auto_save: bool,
    pub save_interval_secs: u64,
    pub inactivity_secs: u64,
    pub inactivity_check_secs: u64,
    pub item_decay_secs: u64,
    pub loot_lock_secs: u64,
    pub spawn_map: u16,
    pub spawn_x: i32,
    pub spawn_y: i32,
    pub max_connections: usize,
    pub max_connections_per_ip: usize,
    pub queue_max_size: usize,
    pub queue_backpressure: f64,
    pub queue_login_quota: usize,
    pub queue_gameplay_quota: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl ServerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            bind_addr: settings.get_str("server_bind", "0.0.0.0"),
            port: settings.get_u64("server_port", 4000) as u16,
            world_name: settings.get_str("world_name", "world"),
            maps: settings.get_list("world_maps"),
            base_path: settings.get_str("server_data_dir", "data"),
            max_players: settings.get_u64("players_max", 1000) as usize,
            tick_ms: settings.get_u64("tick_interval_ms", 10),
            auto_save: settings.get_bool("players_auto_save", true),
            save_interval_secs: settings.get_u64("players_save_interval_secs", 60),
            inactivity_secs: settings.get_u64("players_inactivity_secs", 600),
            inactivity_check_secs: settings.get_u64("players_inactivity_check_secs", 30),
            item_decay_secs: settings.get_u64("world_item_decay_secs", 180),
            loot_lock_secs: settings.get_u64("world_loot_lock_secs", 60),
            spawn_map: settings.get_u64("world_spawn_map", 1) as u16,
            spawn_x: settings.get_i64("world_spawn_x", 0) as i32,
            spawn_y: settings.get_i64("world_spawn_y", 0) as i32,
            max_connections: settings.get_u64("net_max_connections", 1000) as usize,
            max_connections_per_ip: settings.get_u64("net_max_connections_per_ip", 5) as usize,
            queue_max_size: settings.get_u64("queue_max_size", 4096) as usize,
            queue_backpressure: settings.get_f64("queue_backpressure_threshold", 0.8),
            queue_login_quota: settings.get_u64("queue_login_quota", 256) as usize,
            queue_gameplay_quota: settings.get_u64("queue_gameplay_quota", 2048) as usize,
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    pub fn to_world_config(&self) -> WorldConfig {
        WorldConfig {
            item_decay_ms: self.item_decay_secs * 1000,
            loot_lock_ms: self.loot_lock_secs * 1000,
        }
    }

    pub fn to_directory_config(&self) -> DirectoryConfig {
        DirectoryConfig {
            max_players: self.max_players,
            inactivity_ms: self.inactivity_secs * 1000,
            spawn_map: MapId(self.spawn_map),
            spawn_position: Position::new(self.spawn_x, self.spawn_y),
        }
    }

    pub fn to_queue_config(&self) -> QueueConfig {
        QueueConfig {
            max_size: self.queue_max_size,
            backpressure_threshold: self.queue_backpressure,
            category_quotas: BTreeMap::from([
                (CATEGORY_LOGIN, self.queue_login_quota),
                (CATEGORY_GAMEPLAY, self.queue_gameplay_quota),
            ]),
            max_wait: None,
        }
    }

    pub fn to_intake_config(&self) -> IntakeConfig {
        IntakeConfig {
            addr: self.listen_addr(),
            max_connections: self.max_connections,
            max_connections_per_ip: self.max_connections_per_ip,
        }
    }
}

/// CLI parsing for the launcher: `--config <path>` only.
pub fn config_path_from_args(args: &[String]) -> Result<Option<String>, String> {
    let mut path = None;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => match args.get(i + 1) {
                Some(value) => {
                    path = Some(value.clone());
                    i += 2;
                }
                None => return Err("--config requires a path argument".to_string()),
            },
            other => return Err(format!("unknown argument: {}", other)),
        }
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_when_no_file() {
        let settings = Settings::load(None).unwrap();
        let config = ServerConfig::from_settings(&settings);
        assert_eq!(config.port, 4000);
        assert_eq!(config.tick_ms, 10);
        assert_eq!(config.max_players, 1000);
        assert!(config.auto_save);
        assert!(config.maps.is_empty());
    }

    #[test]
    fn missing_file_is_defaults_not_error() {
        let settings = Settings::load(Some(Path::new("/tmp/no_such_config_9371.toml"))).unwrap();
        assert_eq!(settings.get_u64("server_port", 4000), 4000);
    }

    #[test]
    fn section_keys_are_flattened() {
        let settings = Settings::from_toml_str(
            r#"
[server]
port = 5000
bind = "127.0.0.1"

[world]
name = "midgard"
maps = ["1:maps/overworld.map", "2:maps/cave.map"]

[players]
max = 64
auto_save = false
"#,
        )
        .unwrap();

        assert_eq!(settings.get_u64("server_port", 0), 5000);
        assert_eq!(settings.get_str("server_bind", ""), "127.0.0.1");
        assert_eq!(settings.get_str("world_name", ""), "midgard");
        assert_eq!(
            settings.get_list("world_maps"),
            vec!["1:maps/overworld.map".to_string(), "2:maps/cave.map".to_string()]
        );
        assert!(!settings.get_bool("players_auto_save", true));

        let config = ServerConfig::from_settings(&settings);
        assert_eq!(config.listen_addr(), "127.0.0.1:5000");
        assert_eq!(config.world_name, "midgard");
        assert_eq!(config.max_players, 64);
        assert_eq!(config.maps.len(), 2);
    }

    #[test]
    fn unparseable_value_falls_back_to_default() {
        let settings = Settings::from_toml_str("[server]\nport = \"not a number\"").unwrap();
        assert_eq!(settings.get_u64("server_port", 4000), 4000);
    }

    #[test]
    fn load_from_file() {
        let mut f = NamedTempFile::new().unwrap();
        write!(
            f,
            r#"
[tick]
interval_ms = 25

[queue]
max_size = 128
backpressure_threshold = 0.5
"#
        )
        .unwrap();

        let settings = Settings::load(Some(f.path())).unwrap();
        let config = ServerConfig::from_settings(&settings);
        assert_eq!(config.tick_ms, 25);
        assert_eq!(config.queue_max_size, 128);
        assert!((config.queue_backpressure - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn derived_configs_carry_values_through() {
        let settings = Settings::from_toml_str(
            r#"
[world]
item_decay_secs = 30
spawn_map = 2
spawn_x = 7
spawn_y = 9

[players]
max = 5
"#,
        )
        .unwrap();
        let config = ServerConfig::from_settings(&settings);

        assert_eq!(config.to_world_config().item_decay_ms, 30_000);
        let directory = config.to_directory_config();
        assert_eq!(directory.max_players, 5);
        assert_eq!(directory.spawn_map, MapId(2));
        assert_eq!(directory.spawn_position, Position::new(7, 9));
        let queue = config.to_queue_config();
        assert_eq!(queue.category_quotas[&admission::CategoryId(1)], 256);
    }

    #[test]
    fn cli_config_flag() {
        let args: Vec<String> = ["prog", "--config", "server.toml"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            config_path_from_args(&args).unwrap(),
            Some("server.toml".to_string())
        );

        let bad: Vec<String> = ["prog", "--wat"].iter().map(|s| s.to_string()).collect();
        assert!(config_path_from_args(&bad).is_err());
    }
}
