use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde_json::Value;

use crate::FuelCalcError;
use crate::fuel::FuelSettings;

const CONFIG_DIR_NAME: &str = "fuelcalc";
const CONFIG_FILE_NAME: &str = "config.json";

/// Location of the settings file in the user's configuration directory.
pub fn default_config_path() -> Result<PathBuf, FuelCalcError> {
    Ok(dirs::config_dir()
        .ok_or(FuelCalcError::NoConfigDir)?
        .join(CONFIG_DIR_NAME)
        .join(CONFIG_FILE_NAME))
}

/// Loads the settings, falling back to the default for every field that is missing or
/// cannot be parsed. Never fails: a missing or unreadable file gives the defaults.
pub fn load_settings(config_path: &Path) -> FuelSettings {
    if !config_path.exists() {
        debug!("No config file at {}, using defaults", config_path.display());
        return FuelSettings::default();
    }

    let content = match std::fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Could not read config file {}: {}", config_path.display(), e);
            return FuelSettings::default();
        }
    };

    match serde_json::from_str::<Value>(&content) {
        Ok(value) => settings_from_value(&value),
        Err(e) => {
            warn!("Could not parse config file {}: {}", config_path.display(), e);
            FuelSettings::default()
        }
    }
}

fn settings_from_value(value: &Value) -> FuelSettings {
    let defaults = FuelSettings::default();

    let green_flag_only = field(value, "green_flag", |v| match v {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.trim().to_lowercase().parse::<bool>().ok(),
        _ => None,
    })
    .unwrap_or(defaults.green_flag_only);

    let lap_offset = field(value, "lap_offset", |v| match v {
        Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<i32>().ok(),
        _ => None,
    })
    .unwrap_or(defaults.lap_offset);

    let fuel_multiplier = field(value, "fuel_mult", |v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
    .filter(|m| m.is_finite() && *m > 0.)
    .unwrap_or(defaults.fuel_multiplier);

    FuelSettings {
        green_flag_only,
        lap_offset,
        fuel_multiplier,
    }
}

fn field<T>(value: &Value, key: &str, parse: impl Fn(&Value) -> Option<T>) -> Option<T> {
    let raw = value.get(key)?;
    let parsed = parse(raw);
    if parsed.is_none() {
        warn!("Invalid value for {key} in config file: {raw}, using default");
    }
    parsed
}

/// Writes the settings, replacing the previous file.
pub fn save_settings(config_path: &Path, settings: &FuelSettings) -> Result<(), FuelCalcError> {
    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .map_err(|e| FuelCalcError::ConfigIOError { source: e })?;
        }
    }

    let file = std::fs::File::create(config_path)
        .map_err(|e| FuelCalcError::ConfigIOError { source: e })?;
    serde_json::to_writer_pretty(file, settings)
        .map_err(|e| FuelCalcError::ConfigSerializeError { source: e })
}
