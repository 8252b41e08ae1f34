use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Registry key of the machine to boot.
    pub machine: String,
    /// Directory holding system ROM images.
    pub rom_dir: String,
    #[serde(default)]
    pub last_image_path: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            machine: "vz300".to_string(),
            rom_dir: "roms".to_string(),
            last_image_path: None,
        }
    }
}

impl Settings {
    /// Get the config file path relative to the executable
    pub fn config_path() -> PathBuf {
        let mut path = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));
        path.push("config.json");
        path
    }

    /// Load settings from config.json, falling back to defaults on error
    pub fn load() -> Self {
        let path = Self::config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => settings,
                Err(e) => {
                    eprintln!(
                        "Warning: Failed to parse config.json: {}. Using defaults.",
                        e
                    );
                    Self::default()
                }
            },
            Err(_) => {
                // File doesn't exist or can't be read, use defaults
                Self::default()
            }
        }
    }

    /// Save settings to config.json immediately
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let path = Self::config_path();
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(&path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.machine, "vz300");
        assert_eq!(settings.rom_dir, "roms");
        assert_eq!(settings.last_image_path, None);
    }

    #[test]
    fn test_settings_serialization() {
        let settings = Settings::default();
        let json = serde_json::to_string(&settings).expect("Failed to serialize");
        let deserialized: Settings = serde_json::from_str(&json).expect("Failed to deserialize");
        assert_eq!(deserialized.machine, settings.machine);
        assert_eq!(deserialized.rom_dir, settings.rom_dir);
    }

    #[test]
    fn test_settings_save_load() {
        let test_dir = std::env::temp_dir().join("retro8_test_settings");
        fs::create_dir_all(&test_dir).unwrap();
        let test_config = test_dir.join("test_config.json");

        let settings = Settings {
            machine: "vz200".to_string(),
            rom_dir: "/opt/vz/roms".to_string(),
            last_image_path: Some("/games/invaders.vz".to_string()),
        };

        let contents = serde_json::to_string_pretty(&settings).unwrap();
        fs::write(&test_config, contents).unwrap();

        let loaded_contents = fs::read_to_string(&test_config).unwrap();
        let loaded: Settings = serde_json::from_str(&loaded_contents).unwrap();

        assert_eq!(loaded.machine, "vz200");
        assert_eq!(loaded.last_image_path, Some("/games/invaders.vz".to_string()));

        fs::remove_dir_all(&test_dir).unwrap();
    }
}
