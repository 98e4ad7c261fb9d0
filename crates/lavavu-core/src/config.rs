//! Session configuration
//!
//! Startup options for a session, loadable from TOML or JSON, with the
//! `LV_*` environment overrides and translation to the canonical argument
//! vector the backend's `run` expects.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::{LavaVuError, LavaVuResult};
use crate::input::ClosePolicy;

/// Initial time step: a single step or a start/end range
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimestepOption {
    Single(i32),
    Range(i32, i32),
}

/// How the render bridge schedules backend calls
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Calls run inline on the caller's thread
    Direct,
    /// A dedicated render thread
    #[default]
    Thread,
    /// A render task on the ambient tokio runtime
    Async,
}

/// Startup options for a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Database or state file to open
    pub database: Option<PathBuf>,
    /// Initial figure
    pub figure: Option<String>,
    pub timestep: Option<TimestepOption>,
    /// Output and interactive resolution
    pub resolution: Option<(u32, u32)>,
    /// Anti-alias supersampling factor
    pub quality: u32,
    pub hidden: bool,
    pub interactive: bool,
    /// Cache time step data
    pub cache: bool,
    pub verbose: bool,
    /// Run the backend's init script
    pub initscript: bool,
    /// Write an image and quit
    pub writeimage: bool,
    /// Backend web server port, 0 for none
    pub port: u16,
    /// Script lines appended to the arguments
    pub script: Vec<String>,
    /// Extra raw arguments
    pub arglist: Vec<String>,
    /// Initial global property assignments
    pub properties: serde_json::Map<String, Value>,
    /// Send non-blocking commands through the background queue
    pub queue: bool,
    pub mode: SessionMode,
    /// Behaviour when a hosted window is closed
    pub close_policy: ClosePolicy,
    /// Static assets for the interactive viewer
    pub html_path: Option<PathBuf>,
    /// Print failing test images as data URLs
    pub echo_fail: bool,
    /// Validate property names against the schema
    pub validate: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            database: None,
            figure: None,
            timestep: None,
            resolution: None,
            quality: 2,
            hidden: true,
            interactive: false,
            cache: false,
            verbose: false,
            initscript: false,
            writeimage: false,
            port: 0,
            script: Vec::new(),
            arglist: Vec::new(),
            properties: serde_json::Map::new(),
            queue: false,
            mode: SessionMode::Thread,
            close_policy: ClosePolicy::Quit,
            html_path: None,
            echo_fail: false,
            validate: true,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: SessionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.resolution = Some((width, height));
        self
    }

    pub fn with_property(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(name.to_string(), value.into());
        self
    }

    /// Load configuration from a TOML string
    pub fn from_toml(text: &str) -> LavaVuResult<Self> {
        toml::from_str(text).map_err(|e| LavaVuError::InvalidConfig(e.to_string()))
    }

    /// Serialize configuration to TOML
    pub fn to_toml(&self) -> LavaVuResult<String> {
        toml::to_string_pretty(self).map_err(|e| LavaVuError::InvalidConfig(e.to_string()))
    }

    pub fn from_json(text: &str) -> LavaVuResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a `.toml` or `.json` file
    pub fn load(path: &Path) -> LavaVuResult<Self> {
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&text),
            _ => Self::from_toml(&text),
        }
    }

    /// Per-user config file, `~/.config/lavavu/config.toml` on Linux
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("lavavu").join("config.toml"))
    }

    /// The user config file if present, else defaults
    pub fn load_user() -> LavaVuResult<Self> {
        match Self::user_config_path().filter(|p| p.exists()) {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Apply `LV_ARGS`, `LV_ECHO_FAIL` and `LV_QUALITY` from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply environment overrides through a lookup function
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(args) = lookup("LV_ARGS") {
            let mut extra: Vec<String> = args.split_whitespace().map(str::to_string).collect();
            extra.append(&mut self.arglist);
            self.arglist = extra;
        }
        if let Some(flag) = lookup("LV_ECHO_FAIL") {
            self.echo_fail = matches!(flag.trim(), "1" | "true" | "yes");
        }
        if let Some(quality) = lookup("LV_QUALITY").and_then(|q| q.trim().parse().ok()) {
            self.quality = quality;
        }
    }

    /// Translate the options to the backend's argument vector
    pub fn to_argv(&self) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();
        if !self.initscript {
            args.push("-S".into());
        }
        if self.verbose {
            args.push("-v".into());
        }
        if !self.interactive {
            args.push("-a".into());
        }
        if self.hidden {
            args.push("-h".into());
        }
        if self.cache {
            args.push("-c1".into());
        }
        args.push(format!("-z{}", self.quality));
        match self.timestep {
            Some(TimestepOption::Single(step)) => args.push(format!("-{}", step)),
            Some(TimestepOption::Range(start, end)) => {
                args.push(format!("-{}", start));
                args.push(format!("-{}", end));
            }
            None => {}
        }
        args.push(format!("-p{}", self.port));
        if let Some(database) = &self.database {
            args.push(database.display().to_string());
        }
        if let Some(figure) = &self.figure {
            args.push(format!("-f{}", figure));
        }
        if let Some((w, h)) = self.resolution {
            args.push(format!("-x{},{}", w, h));
            args.push(format!("-r{},{}", w, h));
        }
        if self.writeimage {
            args.push("-I".into());
        }
        args.extend(self.script.iter().cloned());
        args.extend(self.arglist.iter().cloned());
        for (key, value) in &self.properties {
            match value {
                Value::String(s) => args.push(format!("{}=\"{}\"", key, s)),
                other => args.push(format!("{}={}", key, other)),
            }
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_default_argv() {
        let argv = SessionConfig::default().to_argv();
        assert_eq!(argv, vec!["-S", "-a", "-h", "-z2", "-p0"]);
    }

    #[test]
    fn test_full_argv() {
        let mut config = SessionConfig::default()
            .with_resolution(320, 200)
            .with_property("title", "hi")
            .with_property("border", json!(0));
        config.timestep = Some(TimestepOption::Range(2, 5));
        config.database = Some(PathBuf::from("data.gldb"));
        config.figure = Some("1".into());
        config.script = vec!["zoom 2".into()];
        let argv = config.to_argv();
        let pos = |s: &str| argv.iter().position(|a| a == s).unwrap();
        assert!(pos("-2") < pos("-5"));
        assert!(pos("data.gldb") < pos("-f1"));
        assert!(argv.contains(&"-x320,200".to_string()));
        assert!(argv.contains(&"-r320,200".to_string()));
        assert!(argv.contains(&"title=\"hi\"".to_string()));
        assert!(argv.contains(&"border=0".to_string()));
        assert_eq!(argv.last().map(String::as_str), Some("title=\"hi\""));
    }

    #[test]
    fn test_apply_env() {
        let env: HashMap<&str, &str> = [
            ("LV_ARGS", "-v -x10,10"),
            ("LV_ECHO_FAIL", "1"),
            ("LV_QUALITY", "4"),
        ]
        .into_iter()
        .collect();
        let mut config = SessionConfig::default();
        config.arglist = vec!["zoom 2".into()];
        config.apply_env_with(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.arglist, vec!["-v", "-x10,10", "zoom 2"]);
        assert!(config.echo_fail);
        assert_eq!(config.quality, 4);
        assert!(config.to_argv().contains(&"-z4".to_string()));
    }

    #[test]
    fn test_toml_roundtrip() {
        let text = r#"
            quality = 3
            mode = "direct"
            timestep = [1, 4]
            resolution = [800, 600]

            [properties]
            background = "white"
        "#;
        let config = SessionConfig::from_toml(text).unwrap();
        assert_eq!(config.quality, 3);
        assert_eq!(config.mode, SessionMode::Direct);
        assert_eq!(config.timestep, Some(TimestepOption::Range(1, 4)));
        assert_eq!(config.resolution, Some((800, 600)));
        assert!(config.hidden);

        let again = SessionConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(again.properties["background"], json!("white"));
    }
}
