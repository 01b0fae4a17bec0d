use crate::infrastructure::error::EngineError;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([(
        APP_JSON,
        serde_json::json!({
            "schema": 1,
            "appName": "DayRoll",
            "timezone": "UTC"
        }),
    )])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), EngineError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, EngineError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| EngineError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(EngineError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

/// App-level fallback timezone, used when the user's profile carries none.
pub fn read_default_timezone(config_dir: &Path) -> Result<Option<String>, EngineError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    Ok(app
        .get("timezone")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned))
}
