//! Process environment captured once at startup.
//!
//! Everything downstream (path templates, cache directory, CI detection) reads
//! from an [`Environment`] value instead of the live process environment, so
//! tests can build one from a plain list of variables.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Boolean CI variables, honoured when set to a truthy value
const CI_BOOLEAN_VARS: &[&str] = &[
    "APPVEYOR",
    "BITRISE_IO",
    "BUDDY",
    "BUILDKITE",
    "CI",
    "CIRCLECI",
    "CIRRUS_CI",
    "CONCOURSE_CI",
    "DRONE",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "SAIL_CI",
    "SEMAPHORE",
    "TF_BUILD",
    "TRAVIS",
    "WERCKER",
    "WOODPECKER_CI",
];

/// CI variables whose mere presence marks a CI run
const CI_PRESENCE_VARS: &[&str] = &[
    "BAMBOO_BUILDKEY",
    "CODEBUILD_BUILD_ID",
    "HEROKU_TEST_RUN_ID",
    "JENKINS_URL",
    "TEAMCITY_VERSION",
];

/// Build variables some CI systems set inside containers without setting `CI`
const PARTIAL_CI_VARS: &[&str] = &[
    "AZURE_HTTP_USER_AGENT",
    "BUILD_ID",
    "BUILD_NUMBER",
    "BUILD_URL",
    "BUILDKITE_BUILD_ID",
    "CIRCLE_BUILD_NUM",
    "CIRCLE_PROJECT_REPONAME",
    "GITHUB_JOB",
    "GITHUB_REPOSITORY",
    "GITHUB_WORKFLOW",
    "GITLAB_PROJECT_ID",
    "GITLAB_USER_ID",
    "JOB_NAME",
    "RUNNER_ARCH",
    "RUNNER_OS",
    "WORKSPACE",
];

#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
    home: Option<PathBuf>,
    cache_home: Option<PathBuf>,
}

impl Environment {
    /// Snapshot the current process environment
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars().collect(),
            home: dirs::home_dir(),
            cache_home: dirs::cache_dir(),
        }
    }

    /// Build an environment from explicit variables (no home, no cache dir)
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            home: None,
            cache_home: None,
        }
    }

    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    pub fn with_cache_home(mut self, cache_home: impl Into<PathBuf>) -> Self {
        self.cache_home = Some(cache_home.into());
        self
    }

    /// Value of a variable; empty values count as unset
    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn home(&self) -> Option<&Path> {
        self.home.as_deref()
    }

    pub fn cache_home(&self) -> Option<&Path> {
        self.cache_home.as_deref()
    }

    /// Expand `~` and `$VAR`/`${VAR}` references in a path template.
    ///
    /// Returns `None` when the template references an unset variable or `~`
    /// without a known home directory.
    pub fn expand(&self, template: &str) -> Option<PathBuf> {
        let mut out = String::with_capacity(template.len());

        let rest = if template == "~" {
            out.push_str(&self.home()?.to_string_lossy());
            ""
        } else if let Some(rest) = template.strip_prefix("~/") {
            out.push_str(&self.home()?.to_string_lossy());
            out.push('/');
            rest
        } else {
            template
        };

        let mut chars = rest.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '$' {
                out.push(c);
                continue;
            }
            let name: String = if chars.peek() == Some(&'{') {
                chars.next();
                let name: String = chars.by_ref().take_while(|&c| c != '}').collect();
                name
            } else {
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                name
            };
            if name.is_empty() {
                out.push('$');
                continue;
            }
            out.push_str(self.var(&name)?);
        }

        Some(PathBuf::from(out))
    }

    /// Whether we are running under a CI system
    pub fn is_ci(&self) -> bool {
        // an explicit falsy value on any boolean variable wins
        if CI_BOOLEAN_VARS
            .iter()
            .filter_map(|name| self.var(name))
            .any(|value| boolify(value) == Some(false))
        {
            return false;
        }

        if CI_BOOLEAN_VARS
            .iter()
            .filter_map(|name| self.var(name))
            .any(|value| boolify(value) == Some(true))
        {
            return true;
        }

        CI_PRESENCE_VARS.iter().any(|name| self.var(name).is_some()) || self.in_ci_container()
    }

    fn in_ci_container(&self) -> bool {
        self.var("CONTAINER").is_some()
            && PARTIAL_CI_VARS.iter().any(|name| self.var(name).is_some())
    }
}

/// Loose boolean parsing of environment values
fn boolify(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" | "none" | "null" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_variables_and_home() {
        let env = Environment::from_vars([("CONDA_PREFIX", "/opt/env")]).with_home("/home/u");

        assert_eq!(
            env.expand("$CONDA_PREFIX/conda-meta/tos"),
            Some(PathBuf::from("/opt/env/conda-meta/tos"))
        );
        assert_eq!(
            env.expand("${CONDA_PREFIX}/tos"),
            Some(PathBuf::from("/opt/env/tos"))
        );
        assert_eq!(env.expand("~/.conda/tos"), Some(PathBuf::from("/home/u/.conda/tos")));
        assert_eq!(env.expand("/etc/conda/tos"), Some(PathBuf::from("/etc/conda/tos")));
    }

    #[test]
    fn test_expand_unset_variable_is_none() {
        let env = Environment::from_vars([("EMPTY", "")]);
        assert_eq!(env.expand("$CONDATOS"), None);
        assert_eq!(env.expand("$EMPTY/tos"), None);
        assert_eq!(env.expand("~/.conda/tos"), None);
    }

    #[test]
    fn test_ci_detection() {
        assert!(Environment::from_vars([("CI", "true")]).is_ci());
        assert!(Environment::from_vars([("GITHUB_ACTIONS", "1")]).is_ci());
        assert!(Environment::from_vars([("JENKINS_URL", "http://ci")]).is_ci());
        assert!(!Environment::from_vars([("HOME", "/root")]).is_ci());
    }

    #[test]
    fn test_ci_explicit_false_wins() {
        let env = Environment::from_vars([("CI", "false"), ("GITHUB_ACTIONS", "true")]);
        assert!(!env.is_ci());
    }

    #[test]
    fn test_ci_container_needs_partial_vars() {
        assert!(!Environment::from_vars([("CONTAINER", "podman")]).is_ci());
        assert!(Environment::from_vars([("CONTAINER", "podman"), ("BUILD_ID", "42")]).is_ci());
    }
}
