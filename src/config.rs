//! Runtime configuration.
//!
//! Settings start from an environment profile (`APP_ENV`), then environment
//! variables override individual fields. `main` loads `.env` through
//! `dotenvy` before calling [`Settings::from_env`] and applies CLI flags last.

use crate::expand_path;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Environment profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Environment {
    #[default]
    Development,
    Production,
    Testing,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Testing => "testing",
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            "testing" | "test" => Ok(Environment::Testing),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

/// How sessions reach the automation endpoint.
#[derive(Debug, Clone)]
pub struct AutomationSettings {
    /// COM ProgID.
    pub application_name: String,
    /// Upper bound on waiting for a session worker reply.
    pub timeout: Duration,
    pub max_sessions: usize,
    /// Folder with the project's `.lsp` routines, appended to the support path.
    pub lisp_path: PathBuf,
    /// Pause after launching a new endpoint.
    pub launch_settle: Duration,
    /// Pause after adding a document.
    pub document_settle: Duration,
}

impl AutomationSettings {
    pub fn timeout_secs(&self) -> u64 {
        self.timeout.as_secs()
    }
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            application_name: "AutoCAD.Application".to_string(),
            timeout: Duration::from_secs(30),
            max_sessions: 5,
            lisp_path: absolute(Path::new("lisp")),
            launch_settle: Duration::from_secs(5),
            document_settle: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawingDefaults {
    pub layer_color: i32,
    pub line_type: String,
    pub line_weight: f64,
    pub text_height: f64,
}

impl Default for DrawingDefaults {
    fn default() -> Self {
        Self {
            layer_color: 7,
            line_type: "Continuous".to_string(),
            line_weight: 0.25,
            text_height: 2.5,
        }
    }
}

/// Minimum dimensions checked before drawing.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildingCode {
    pub min_door_width: f64,
    pub min_window_width: f64,
    pub min_room_area: f64,
    /// Not enforced yet.
    pub max_wall_height: f64,
}

impl Default for BuildingCode {
    fn default() -> Self {
        Self {
            min_door_width: 32.0,
            min_window_width: 24.0,
            min_room_area: 70.0,
            max_wall_height: 12.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub environment: Environment,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    /// `None` disables the file log.
    pub log_file: Option<PathBuf>,
    pub allowed_origins: Vec<String>,
    pub automation: AutomationSettings,
    pub drawing: DrawingDefaults,
    pub building_code: BuildingCode,
}

impl Settings {
    /// Profile defaults, without consulting the environment.
    pub fn for_environment(environment: Environment) -> Self {
        let mut settings = Self {
            environment,
            host: "127.0.0.1".to_string(),
            port: 5000,
            log_level: "debug".to_string(),
            log_file: Some(PathBuf::from("acad_mcp.log")),
            allowed_origins: vec![
                "http://localhost".to_string(),
                "http://127.0.0.1".to_string(),
            ],
            automation: AutomationSettings::default(),
            drawing: DrawingDefaults::default(),
            building_code: BuildingCode::default(),
        };
        match environment {
            Environment::Development => {}
            Environment::Production => settings.log_level = "warn".to_string(),
            Environment::Testing => {
                settings.log_file = None;
                settings.automation.launch_settle = Duration::ZERO;
                settings.automation.document_settle = Duration::ZERO;
            }
        }
        settings
    }

    /// Profile from `APP_ENV`, overridden by process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Settings::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let environment = match lookup("APP_ENV") {
            Some(value) => value.parse().map_err(|reason| ConfigError::Invalid {
                key: "APP_ENV",
                value,
                reason,
            })?,
            None => Environment::default(),
        };
        let mut settings = Self::for_environment(environment);
        settings.apply_overrides(lookup)?;
        Ok(settings)
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(host) = lookup("HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.port = parse_var("PORT", port)?;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.log_level = level.to_ascii_lowercase();
        }
        if let Some(file) = lookup("LOG_FILE") {
            self.log_file = (!file.trim().is_empty()).then(|| expand_path(&file));
        }
        if let Some(origins) = lookup("ALLOWED_ORIGINS") {
            self.allowed_origins = parse_origins(&origins);
        }
        if let Some(name) = lookup("ACAD_APPLICATION_NAME") {
            self.automation.application_name = name;
        }
        if let Some(secs) = lookup("ACAD_TIMEOUT_SECS") {
            self.automation.timeout = Duration::from_secs(parse_var("ACAD_TIMEOUT_SECS", secs)?);
        }
        if let Some(max) = lookup("ACAD_MAX_INSTANCES") {
            self.automation.max_sessions = parse_var("ACAD_MAX_INSTANCES", max)?;
        }
        if let Some(path) = lookup("ACAD_LISP_PATH") {
            self.automation.lisp_path = absolute(&expand_path(&path));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
        value,
    })
}

/// Split a comma-separated origin list, dropping blanks and trailing slashes.
pub fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|origin| origin.trim().trim_end_matches('/'))
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn development_defaults() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.environment, Environment::Development);
        assert_eq!(settings.bind_addr(), "127.0.0.1:5000");
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.automation.application_name, "AutoCAD.Application");
        assert_eq!(settings.automation.timeout, Duration::from_secs(30));
        assert_eq!(settings.automation.max_sessions, 5);
        assert!(settings.automation.lisp_path.is_absolute());
        assert!(settings.automation.lisp_path.ends_with("lisp"));
        assert_eq!(settings.drawing.layer_color, 7);
        assert_eq!(settings.building_code.min_door_width, 32.0);
    }

    #[test]
    fn profiles() {
        let prod = Settings::for_environment(Environment::Production);
        assert_eq!(prod.log_level, "warn");
        let test = Settings::for_environment(Environment::Testing);
        assert_eq!(test.automation.launch_settle, Duration::ZERO);
        assert!(test.log_file.is_none());
    }

    #[test]
    fn overrides() {
        let settings = Settings::from_lookup(lookup(&[
            ("APP_ENV", "production"),
            ("PORT", "8080"),
            ("ACAD_TIMEOUT_SECS", "5"),
            ("ACAD_MAX_INSTANCES", "2"),
            ("ACAD_LISP_PATH", "/opt/lisp"),
            ("ALLOWED_ORIGINS", "http://a.test/, ,http://b.test"),
            ("LOG_FILE", ""),
        ]))
        .unwrap();
        assert_eq!(settings.environment, Environment::Production);
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.automation.timeout_secs(), 5);
        assert_eq!(settings.automation.max_sessions, 2);
        assert_eq!(settings.automation.lisp_path, PathBuf::from("/opt/lisp"));
        assert_eq!(settings.allowed_origins, vec!["http://a.test", "http://b.test"]);
        assert!(settings.log_file.is_none());
    }

    #[test]
    fn invalid_values_are_reported() {
        let err = Settings::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));
        assert!(Settings::from_lookup(lookup(&[("APP_ENV", "staging")])).is_err());
    }
}
