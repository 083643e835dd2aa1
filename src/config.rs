use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::path::{DEFAULT_SEARCH_PATH, SearchPath, USER_TOS_ROOT};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Application directory name used under the user config and cache dirs
pub const APP_NAME: &str = "conda-tos";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub tos: TosConfig,

    #[serde(default)]
    pub channels: ChannelConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TosConfig {
    /// Default write location for acceptances/rejections
    #[serde(default = "default_tos_root")]
    pub root: String,

    #[serde(default = "default_cache_timeout_secs")]
    pub cache_timeout_secs: u64,

    /// Accept every pending ToS without prompting
    #[serde(default)]
    pub auto_accept: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChannelConfig {
    /// Active channels when none are given on the command line
    #[serde(default = "default_channels")]
    pub channels: Vec<String>,

    #[serde(default = "default_channel_alias")]
    pub channel_alias: String,

    #[serde(default = "default_multichannels")]
    pub multichannels: HashMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: f64,

    /// Deadline for a whole request, from connect to the last body byte
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: f64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PathsConfig {
    /// Roots appended after the built-in search path
    #[serde(default)]
    pub extra_search_path: Vec<String>,

    /// Overrides the per-user cache directory
    #[serde(default)]
    pub cache_dir: Option<String>,
}

fn default_tos_root() -> String {
    USER_TOS_ROOT.to_string()
}

fn default_cache_timeout_secs() -> u64 {
    24 * 60 * 60
}

fn default_channels() -> Vec<String> {
    vec!["defaults".to_string()]
}

fn default_channel_alias() -> String {
    "https://conda.anaconda.org".to_string()
}

fn default_multichannels() -> HashMap<String, Vec<String>> {
    let mut defaults = vec![
        "https://repo.anaconda.com/pkgs/main".to_string(),
        "https://repo.anaconda.com/pkgs/r".to_string(),
    ];
    if cfg!(windows) {
        defaults.push("https://repo.anaconda.com/pkgs/msys2".to_string());
    }
    HashMap::from([("defaults".to_string(), defaults)])
}

fn default_connect_timeout_secs() -> f64 {
    9.15
}

fn default_request_timeout_secs() -> f64 {
    60.0
}

impl Default for TosConfig {
    fn default() -> Self {
        Self {
            root: default_tos_root(),
            cache_timeout_secs: default_cache_timeout_secs(),
            auto_accept: false,
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            channels: default_channels(),
            channel_alias: default_channel_alias(),
            multichannels: default_multichannels(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tos: TosConfig::default(),
            channels: ChannelConfig::default(),
            http: HttpConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Config {
    pub fn load(config_path: Option<&str>, env: &Environment) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Add config file sources in order of precedence (lower to higher)
        if config_path.is_none() {
            if let Some(user_config) = env.expand(&format!("~/.config/{APP_NAME}/config")) {
                builder = builder.add_source(
                    config::File::with_name(&user_config.to_string_lossy()).required(false),
                );
            }
        }

        // Custom config path (if specified via --config)
        if let Some(path) = config_path {
            builder = builder.add_source(
                config::File::with_name(path)
                    .required(true)
                    .format(config::FileFormat::Toml),
            );
        }

        // Environment variables (highest precedence)
        builder = builder.add_source(
            config::Environment::with_prefix("CONDA_TOS")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().map_err(|e| Error::Config {
            msg: format!("Failed to load configuration: {}", e),
        })?;

        config.try_deserialize().map_err(|e| Error::Config {
            msg: format!("Failed to deserialize configuration: {}", e),
        })
    }
}

/// Resolved runtime settings, derived once from [`Config`] and [`Environment`]
#[derive(Debug, Clone)]
pub struct Settings {
    pub search_path: SearchPath,
    pub cache_dir: PathBuf,
    pub default_tos_root: PathBuf,
    pub cache_timeout: Duration,
    pub auto_accept: bool,
    pub ci: bool,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Settings {
    pub fn new(config: &Config, env: &Environment) -> Result<Self> {
        let templates = DEFAULT_SEARCH_PATH
            .iter()
            .map(|t| t.to_string())
            .chain(config.paths.extra_search_path.iter().cloned());
        let search_path = SearchPath::from_templates(templates, env);

        let cache_dir = match &config.paths.cache_dir {
            Some(dir) => env.expand(dir).ok_or_else(|| Error::Config {
                msg: format!("cache_dir ({dir}) references an unset variable"),
            })?,
            None => env
                .cache_home()
                .map(|dir| dir.join(APP_NAME))
                .ok_or_else(|| Error::Config {
                    msg: "unable to determine the user cache directory".to_string(),
                })?,
        };

        let default_tos_root = env.expand(&config.tos.root).ok_or_else(|| Error::Config {
            msg: format!("tos.root ({}) references an unset variable", config.tos.root),
        })?;

        Ok(Self {
            search_path,
            cache_dir,
            default_tos_root,
            cache_timeout: Duration::from_secs(config.tos.cache_timeout_secs),
            auto_accept: config.tos.auto_accept,
            ci: env.is_ci(),
            connect_timeout: secs(config.http.connect_timeout_secs, "connect_timeout_secs")?,
            request_timeout: secs(config.http.request_timeout_secs, "request_timeout_secs")?,
        })
    }
}

fn secs(value: f64, name: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(value).map_err(|e| Error::Config {
        msg: format!("http.{name} ({value}) is not a valid duration: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.tos.cache_timeout_secs, 86400);
        assert!(!config.tos.auto_accept);
        assert_eq!(config.channels.channels, vec!["defaults"]);
        assert!(config.channels.multichannels.contains_key("defaults"));
    }

    #[test]
    fn test_http_timeouts() {
        let settings = Settings::new(
            &Config::default(),
            &Environment::default().with_home("/h").with_cache_home("/h/.cache"),
        )
        .unwrap();
        assert!((settings.connect_timeout.as_secs_f64() - 9.15).abs() < 1e-6);
        assert_eq!(settings.request_timeout, Duration::from_secs(60));

        let mut config = Config::default();
        config.http.request_timeout_secs = -1.0;
        let env = Environment::default().with_home("/h").with_cache_home("/c");
        let err = Settings::new(&config, &env).unwrap_err();
        assert!(err.to_string().contains("request_timeout_secs"));
    }

    #[test]
    fn test_settings_from_environment() {
        let env = Environment::from_vars([("CONDA_PREFIX", "/opt/env"), ("CI", "true")])
            .with_home("/home/u")
            .with_cache_home("/home/u/.cache");
        let settings = Settings::new(&Config::default(), &env).unwrap();

        assert_eq!(settings.cache_dir, PathBuf::from("/home/u/.cache/conda-tos"));
        assert_eq!(settings.default_tos_root, PathBuf::from("/home/u/.conda/tos"));
        assert_eq!(settings.cache_timeout, Duration::from_secs(86400));
        assert!(settings.ci);
        assert!(
            settings
                .search_path
                .roots()
                .contains(&PathBuf::from("/opt/env/conda-meta/tos"))
        );
    }

    #[test]
    fn test_settings_without_cache_home_fails() {
        let env = Environment::from_vars([("HOME", "/root")]).with_home("/root");
        let err = Settings::new(&Config::default(), &env).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_settings_cache_dir_override() {
        let mut config = Config::default();
        config.paths.cache_dir = Some("$TMPDIR/tos-cache".to_string());
        let env = Environment::from_vars([("TMPDIR", "/tmp")]).with_home("/root");
        let settings = Settings::new(&config, &env).unwrap();
        assert_eq!(settings.cache_dir, PathBuf::from("/tmp/tos-cache"));
    }
}
