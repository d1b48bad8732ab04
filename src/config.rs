use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::clock::TimeControl;
use crate::core::error::ConfigError;
use crate::core::game::Side;
use crate::core::lobby::DEFAULT_HANDSHAKE_TIMEOUT;
use crate::history::JsonRecordStore;

/// Named time controls offered at setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// 1 minute + 1 second
    Bullet,
    /// 3 minutes + 2 seconds
    Blitz,
    /// 15 minutes + 10 seconds
    Rapid,
    /// Minutes and increment given explicitly
    Custom,
}

impl Preset {
    /// `(minutes, increment)`; `None` for custom.
    pub fn minutes_and_increment(self) -> Option<(u32, u32)> {
        match self {
            Preset::Bullet => Some((1, 1)),
            Preset::Blitz => Some((3, 2)),
            Preset::Rapid => Some((15, 10)),
            Preset::Custom => None,
        }
    }
}

const CUSTOM_DEFAULT_MINUTES: u32 = 5;

/// Longest base time accepted per side: one day.
pub const MAX_MINUTES: u32 = 24 * 60;
pub const MAX_INCREMENT_SECONDS: u32 = 60 * 60;

/// Contents of `config.toml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub name: Option<String>,
    pub time_control: Option<Preset>,
    pub minutes: Option<u32>,
    pub increment: Option<u32>,
    pub white_minutes: Option<u32>,
    pub black_minutes: Option<u32>,
    pub handshake_timeout_secs: Option<u64>,
    pub history_path: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub log_filter: Option<String>,
}

impl FileConfig {
    /// `<config dir>/lanchess/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("lanchess").join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    /// Loads `explicit` if given, else the default file if it exists, else nothing.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }
}

/// Values given on the command line; they win over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub name: Option<String>,
    pub preset: Option<Preset>,
    pub minutes: Option<u32>,
    pub increment: Option<u32>,
    pub history: Option<PathBuf>,
    pub no_history: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub name: String,
    pub preset: Preset,
    pub time_control: TimeControl,
    pub handshake_timeout: Duration,
    /// `None` keeps records in memory only.
    pub history_path: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub log_filter: String,
}

impl Config {
    pub fn resolve(file: FileConfig, overrides: &Overrides) -> Result<Self, ConfigError> {
        // A preset named on the command line replaces the file's whole time control.
        let (requested, minutes, increment) = match overrides.preset {
            Some(preset) => (Some(preset), overrides.minutes, overrides.increment),
            None => (
                file.time_control,
                overrides.minutes.or(file.minutes),
                overrides.increment.or(file.increment),
            ),
        };

        // Explicit minutes or increment start from the preset and make it custom.
        let explicit = minutes.is_some() || increment.is_some();
        let chosen = requested.unwrap_or(if explicit { Preset::Custom } else { Preset::Blitz });
        let (base_minutes, base_increment) = chosen
            .minutes_and_increment()
            .unwrap_or((CUSTOM_DEFAULT_MINUTES, 0));
        let minutes = minutes.unwrap_or(base_minutes);
        let increment = increment.unwrap_or(base_increment);
        let preset = if explicit { Preset::Custom } else { chosen };

        let white_minutes = file.white_minutes.unwrap_or(minutes);
        let black_minutes = file.black_minutes.unwrap_or(minutes);
        if white_minutes == 0 || black_minutes == 0 {
            return Err(ConfigError::Invalid {
                reason: "each side needs at least 1 minute".into(),
            });
        }
        if white_minutes > MAX_MINUTES || black_minutes > MAX_MINUTES {
            return Err(ConfigError::Invalid {
                reason: format!("at most {MAX_MINUTES} minutes per side"),
            });
        }
        if increment > MAX_INCREMENT_SECONDS {
            return Err(ConfigError::Invalid {
                reason: format!("increment is capped at {MAX_INCREMENT_SECONDS} seconds"),
            });
        }
        let time_control = TimeControl::checked(white_minutes, black_minutes, increment)
            .ok_or_else(|| ConfigError::Invalid {
                reason: "time control does not fit in seconds".into(),
            })?;

        let handshake_timeout = match file.handshake_timeout_secs {
            Some(0) => {
                return Err(ConfigError::Invalid {
                    reason: "handshake_timeout_secs must be at least 1".into(),
                })
            }
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_HANDSHAKE_TIMEOUT,
        };

        let history_path = if overrides.no_history {
            None
        } else {
            overrides
                .history
                .clone()
                .or(file.history_path)
                .or_else(JsonRecordStore::default_path)
        };

        Ok(Self {
            name: overrides
                .name
                .clone()
                .or(file.name)
                .unwrap_or_else(|| "Player".to_string()),
            preset,
            time_control,
            handshake_timeout,
            history_path,
            log_file: file.log_file.or_else(default_log_file),
            log_filter: file.log_filter.unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn default_log_file() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("lanchess").join("lanchess.log"))
}

/// What a finished game remembers about how it was set up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSettings {
    pub mode: String,
    pub time_control: TimeControl,
    pub white_name: String,
    pub black_name: String,
}

impl GameSettings {
    pub fn online(
        time_control: TimeControl,
        local_role: Side,
        local_name: &str,
        peer_name: Option<&str>,
    ) -> Self {
        let peer_name = peer_name.unwrap_or("Opponent").to_string();
        let (white_name, black_name) = match local_role {
            Side::White => (local_name.to_string(), peer_name),
            Side::Black => (peer_name, local_name.to_string()),
        };
        Self {
            mode: "online".to_string(),
            time_control,
            white_name,
            black_name,
        }
    }

    pub fn name_of(&self, side: Side) -> &str {
        match side {
            Side::White => &self.white_name,
            Side::Black => &self.black_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_blitz() {
        let config = Config::resolve(FileConfig::default(), &Overrides::default()).unwrap();
        assert_eq!(config.preset, Preset::Blitz);
        assert_eq!(config.time_control, TimeControl::new(3, 2));
        assert_eq!(config.handshake_timeout, DEFAULT_HANDSHAKE_TIMEOUT);
        assert_eq!(config.name, "Player");
    }

    #[test]
    fn file_values_and_cli_overrides() {
        let file: FileConfig = toml::from_str(
            r#"
            name = "alice"
            time_control = "rapid"
            handshake_timeout_secs = 5
            history_path = "/tmp/games.json"
            "#,
        )
        .unwrap();
        let overrides = Overrides {
            preset: Some(Preset::Bullet),
            no_history: true,
            ..Default::default()
        };

        let config = Config::resolve(file, &overrides).unwrap();
        assert_eq!(config.name, "alice");
        assert_eq!(config.time_control, TimeControl::new(1, 1));
        assert_eq!(config.handshake_timeout, Duration::from_secs(5));
        assert_eq!(config.history_path, None);
    }

    #[test]
    fn explicit_minutes_imply_custom_with_odds() {
        let file = FileConfig {
            black_minutes: Some(2),
            ..Default::default()
        };
        let overrides = Overrides {
            minutes: Some(10),
            increment: Some(3),
            ..Default::default()
        };
        let config = Config::resolve(file, &overrides).unwrap();
        assert_eq!(config.preset, Preset::Custom);
        assert_eq!(config.time_control, TimeControl::with_odds(10, 2, 3));
    }

    #[test]
    fn rejects_zero_minutes_and_unknown_keys() {
        let overrides = Overrides {
            preset: Some(Preset::Custom),
            minutes: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            Config::resolve(FileConfig::default(), &overrides),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(toml::from_str::<FileConfig>("colour = \"red\"").is_err());
    }

    #[test]
    fn explicit_values_win_over_a_named_preset() {
        let overrides = Overrides {
            preset: Some(Preset::Blitz),
            increment: Some(5),
            ..Default::default()
        };
        let config = Config::resolve(FileConfig::default(), &overrides).unwrap();
        assert_eq!(config.preset, Preset::Custom);
        assert_eq!(config.time_control, TimeControl::new(3, 5));

        let overrides = Overrides {
            preset: Some(Preset::Rapid),
            minutes: Some(20),
            ..Default::default()
        };
        let config = Config::resolve(FileConfig::default(), &overrides).unwrap();
        assert_eq!(config.time_control, TimeControl::new(20, 10));

        // File minutes still refine a preset picked in the file.
        let file = FileConfig {
            time_control: Some(Preset::Bullet),
            minutes: Some(2),
            ..Default::default()
        };
        let config = Config::resolve(file, &Overrides::default()).unwrap();
        assert_eq!(config.preset, Preset::Custom);
        assert_eq!(config.time_control, TimeControl::new(2, 1));
    }

    #[test]
    fn rejects_time_controls_too_large_to_count() {
        for minutes in [80_000_000, MAX_MINUTES + 1] {
            let overrides = Overrides {
                minutes: Some(minutes),
                ..Default::default()
            };
            assert!(matches!(
                Config::resolve(FileConfig::default(), &overrides),
                Err(ConfigError::Invalid { .. })
            ));
        }

        let file = FileConfig {
            white_minutes: Some(u32::MAX),
            ..Default::default()
        };
        assert!(Config::resolve(file, &Overrides::default()).is_err());

        let overrides = Overrides {
            increment: Some(MAX_INCREMENT_SECONDS + 1),
            ..Default::default()
        };
        assert!(Config::resolve(FileConfig::default(), &overrides).is_err());

        let overrides = Overrides {
            minutes: Some(MAX_MINUTES),
            ..Default::default()
        };
        let config = Config::resolve(FileConfig::default(), &overrides).unwrap();
        assert_eq!(config.time_control.white_seconds, MAX_MINUTES * 60);
    }

    #[test]
    fn settings_place_names_by_role() {
        let settings = GameSettings::online(TimeControl::new(3, 2), Side::Black, "bob", Some("alice"));
        assert_eq!(settings.name_of(Side::White), "alice");
        assert_eq!(settings.name_of(Side::Black), "bob");

        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["mode"], "online");
        assert_eq!(json["timeControl"]["incrementSeconds"], 2);
    }
}
