use crate::errors::{AppError, AppResult};
use crate::models::AppSettings;
use std::path::Path;

/// Reads settings from `path`, layering the file's keys over the defaults.
/// A missing file yields the defaults.
pub fn load_settings(path: &Path) -> AppResult<AppSettings> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "settings file not found; using defaults");
            return Ok(AppSettings::default());
        }
        Err(error) => return Err(error.into()),
    };

    let update: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|error| AppError::Config(format!("{}: {}", path.display(), error)))?;
    apply_settings_update(AppSettings::default(), update)
}

pub fn apply_settings_update(current: AppSettings, update: serde_json::Value) -> AppResult<AppSettings> {
    if !update.is_object() {
        return Err(AppError::Config("settings must be a JSON object".to_string()));
    }
    let mut merged = serde_json::to_value(current)?;
    merge_json(&mut merged, update);
    let settings: AppSettings = serde_json::from_value(merged)?;
    validate_settings(&settings)?;
    Ok(settings)
}

fn validate_settings(settings: &AppSettings) -> AppResult<()> {
    if settings.worker_executable.trim().is_empty() {
        return Err(AppError::Config("workerExecutable cannot be empty".to_string()));
    }
    if settings.worker_script.trim().is_empty() {
        return Err(AppError::Config("workerScript cannot be empty".to_string()));
    }
    if settings.output_extension.contains(['/', '\\']) || settings.output_name_prefix.contains(['/', '\\']) {
        return Err(AppError::Config(
            "outputNamePrefix and outputExtension cannot contain path separators".to_string(),
        ));
    }
    if settings.worker_timeout_seconds == Some(0) {
        return Err(AppError::Config("workerTimeoutSeconds must be positive".to_string()));
    }
    Ok(())
}

fn merge_json(target: &mut serde_json::Value, update: serde_json::Value) {
    match (target, update) {
        (serde_json::Value::Object(target_map), serde_json::Value::Object(update_map)) => {
            for (key, value) in update_map {
                merge_json(target_map.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (target, update) => {
            *target = update;
        }
    }
}
