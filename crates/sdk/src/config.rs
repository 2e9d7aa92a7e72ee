use std::{
    env, fs, io,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Vendor namespace used when no explicit family is given.
pub const DEFAULT_FAMILY: &str = "ferrum";

const DEFAULT_REGION: &str = "aws-us-east-1";
const VENDOR_DOMAIN: &str = "ferrum.io";

/// Fully resolved connection settings for one product.
///
/// Built once by [`Settings::resolve`] and treated as immutable afterwards;
/// every request layer call borrows it read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub token: String,
    pub project_id: String,
    pub host: String,
    pub scheme: String,
    pub port: u16,
    pub api_version: String,
    pub user_agent: String,
}

/// A sparse set of settings: only the fields present in a source replace
/// values already resolved from earlier sources.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsOverlay {
    pub token: Option<String>,
    pub project_id: Option<String>,
    pub host: Option<String>,
    pub scheme: Option<String>,
    pub port: Option<u16>,
    pub api_version: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid product id '{0}': expected '<family>_<product>'")]
    InvalidProductId(String),

    #[error("invalid JSON in {}: {message}", .path.display())]
    InvalidConfigFile { path: PathBuf, message: String },

    #[error("could not read {}: {source}", .path.display())]
    UnreadableConfigFile { path: PathBuf, source: io::Error },

    #[error("environment variable {var} is not a valid port: {source}")]
    InvalidPort {
        var: String,
        source: std::num::ParseIntError,
    },
}

impl Settings {
    /// Resolves the settings for a `<family>_<product>` identifier.
    ///
    /// Starts from the built-in preset for the product (or a synthesized
    /// default for unknown products) and layers four override passes on
    /// top, later passes winning per field:
    ///
    /// 1. `$HOME/.<family>.json`
    /// 2. `<FAMILY>_*` environment variables
    /// 3. `<FAMILY>_<PRODUCT>_*` environment variables
    /// 4. `<family>.json` in the current working directory
    ///
    /// Missing config files are skipped; malformed files, malformed port
    /// variables, and malformed product ids are fatal.
    pub fn resolve(product_id: &str) -> Result<Self, ConfigError> {
        let (family, product) = split_product_id(product_id)?;

        let mut settings = preset(product);

        if let Some(home) = dirs::home_dir() {
            settings.apply_config_file(family, product, &home.join(format!(".{family}.json")))?;
        }
        settings.apply(&env_overlay(&format!("{}_", family.to_uppercase()))?);
        settings.apply(&env_overlay(&format!(
            "{}_{}_",
            family.to_uppercase(),
            product.to_uppercase()
        ))?);
        settings.apply_config_file(family, product, Path::new(&format!("{family}.json")))?;

        Ok(settings)
    }

    /// Like [`Settings::resolve`], with one caller-supplied overlay applied
    /// after every other source. Explicit settings always win.
    pub fn resolve_with(
        product_id: &str,
        overrides: &SettingsOverlay,
    ) -> Result<Self, ConfigError> {
        let mut settings = Self::resolve(product_id)?;
        settings.apply(overrides);
        Ok(settings)
    }

    /// Applies one JSON config file: its top-level fields first, then the
    /// fields of an optional nested `<family>_<product>` object, so a single
    /// file can hold shared settings plus per-product overrides.
    ///
    /// A file that does not exist is skipped.
    pub fn apply_config_file(
        &mut self,
        family: &str,
        product: &str,
        path: &Path,
    ) -> Result<(), ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(source) => {
                return Err(ConfigError::UnreadableConfigFile {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let invalid = |message: String| ConfigError::InvalidConfigFile {
            path: path.to_path_buf(),
            message,
        };

        let document: Value =
            serde_json::from_str(&contents).map_err(|err| invalid(err.to_string()))?;
        if !document.is_object() {
            return Err(invalid("expected a top-level JSON object".to_string()));
        }

        let overlay: SettingsOverlay =
            serde_json::from_value(document.clone()).map_err(|err| invalid(err.to_string()))?;
        self.apply(&overlay);

        if let Some(nested) = document.get(format!("{family}_{product}")) {
            let overlay: SettingsOverlay =
                serde_json::from_value(nested.clone()).map_err(|err| invalid(err.to_string()))?;
            self.apply(&overlay);
        }

        Ok(())
    }

    fn apply(&mut self, overlay: &SettingsOverlay) {
        if let Some(token) = &overlay.token {
            self.token = token.clone();
        }
        if let Some(project_id) = &overlay.project_id {
            self.project_id = project_id.clone();
        }
        if let Some(host) = &overlay.host {
            self.host = host.clone();
        }
        if let Some(scheme) = &overlay.scheme {
            self.scheme = scheme.clone();
        }
        if let Some(port) = overlay.port {
            self.port = port;
        }
        if let Some(api_version) = &overlay.api_version {
            self.api_version = api_version.clone();
        }
        if let Some(user_agent) = &overlay.user_agent {
            self.user_agent = user_agent.clone();
        }
    }
}

// Product ids look like "ferrum_mq" rather than "mq" so that settings for
// several families can coexist in one file or environment.
fn split_product_id(product_id: &str) -> Result<(&str, &str), ConfigError> {
    match product_id.split_once('_') {
        Some((family, product)) if !family.is_empty() && !product.is_empty() => {
            Ok((family, product))
        }
        _ => Err(ConfigError::InvalidProductId(product_id.to_string())),
    }
}

fn preset(product: &str) -> Settings {
    let base = Settings {
        token: String::new(),
        project_id: String::new(),
        host: format!("{product}-{DEFAULT_REGION}.{VENDOR_DOMAIN}"),
        scheme: "https".to_string(),
        port: 443,
        api_version: "1".to_string(),
        user_agent: concat!("ferrum ", env!("CARGO_PKG_VERSION")).to_string(),
    };

    match product {
        "mq" => Settings {
            user_agent: concat!("ferrum/mq ", env!("CARGO_PKG_VERSION")).to_string(),
            ..base
        },
        "cache" => Settings {
            user_agent: concat!("ferrum/cache ", env!("CARGO_PKG_VERSION")).to_string(),
            ..base
        },
        "worker" => Settings {
            api_version: "2".to_string(),
            user_agent: concat!("ferrum/worker ", env!("CARGO_PKG_VERSION")).to_string(),
            ..base
        },
        _ => base,
    }
}

fn env_overlay(prefix: &str) -> Result<SettingsOverlay, ConfigError> {
    let port = match non_empty_var(&format!("{prefix}PORT")) {
        Some(raw) => Some(raw.parse::<u16>().map_err(|source| ConfigError::InvalidPort {
            var: format!("{prefix}PORT"),
            source,
        })?),
        None => None,
    };

    Ok(SettingsOverlay {
        token: non_empty_var(&format!("{prefix}TOKEN")),
        project_id: non_empty_var(&format!("{prefix}PROJECT_ID")),
        host: non_empty_var(&format!("{prefix}HOST")),
        scheme: non_empty_var(&format!("{prefix}SCHEME")),
        port,
        api_version: non_empty_var(&format!("{prefix}API_VERSION")),
        user_agent: None,
    })
}

// An exported-but-empty variable counts as unset.
fn non_empty_var(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_synthesized_default_for_unknown_product() {
        let settings = Settings::resolve("acme_undefined").unwrap();
        assert_eq!(settings.host, "undefined-aws-us-east-1.ferrum.io");
        assert_eq!(settings.scheme, "https");
        assert_eq!(settings.port, 443);
        assert_eq!(settings.api_version, "1");
        assert!(!settings.user_agent.is_empty());
    }

    #[test]
    fn test_builtin_presets() {
        let mq = Settings::resolve("acme_mq").unwrap();
        assert_eq!(mq.host, "mq-aws-us-east-1.ferrum.io");
        assert_eq!(mq.api_version, "1");

        let worker = Settings::resolve("acme_worker").unwrap();
        assert_eq!(worker.host, "worker-aws-us-east-1.ferrum.io");
        assert_eq!(worker.api_version, "2");

        let cache = Settings::resolve("acme_cache").unwrap();
        assert_eq!(cache.host, "cache-aws-us-east-1.ferrum.io");
        assert_eq!(cache.port, 443);
    }

    #[test]
    fn test_invalid_product_ids() {
        for bad in ["ferrum", "_mq", "mq_", ""] {
            assert!(matches!(
                Settings::resolve(bad),
                Err(ConfigError::InvalidProductId(_))
            ));
        }
    }

    #[test]
    fn test_product_id_splits_on_first_underscore() {
        let settings = Settings::resolve("acme_push_mq").unwrap();
        assert_eq!(settings.host, "push_mq-aws-us-east-1.ferrum.io");
    }

    #[test]
    fn test_global_env_overrides_preset() {
        env::set_var("ENVFAM_TOKEN", "env-token");
        env::set_var("ENVFAM_PORT", "8080");

        let settings = Settings::resolve("envfam_mq").unwrap();
        assert_eq!(settings.token, "env-token");
        assert_eq!(settings.port, 8080);
        // untouched fields keep preset values
        assert_eq!(settings.host, "mq-aws-us-east-1.ferrum.io");

        env::remove_var("ENVFAM_TOKEN");
        env::remove_var("ENVFAM_PORT");
    }

    #[test]
    fn test_product_env_overrides_global_env() {
        env::set_var("ENVPROD_TOKEN", "global-token");
        env::set_var("ENVPROD_MQ_TOKEN", "product-token");

        let settings = Settings::resolve("envprod_mq").unwrap();
        assert_eq!(settings.token, "product-token");

        env::remove_var("ENVPROD_TOKEN");
        env::remove_var("ENVPROD_MQ_TOKEN");
    }

    #[test]
    fn test_empty_env_var_is_ignored() {
        env::set_var("ENVEMPTY_HOST", "");

        let settings = Settings::resolve("envempty_mq").unwrap();
        assert_eq!(settings.host, "mq-aws-us-east-1.ferrum.io");

        env::remove_var("ENVEMPTY_HOST");
    }

    #[test]
    fn test_unparseable_env_port_is_fatal() {
        env::set_var("ENVBAD_PORT", "not-a-port");

        let err = Settings::resolve("envbad_mq").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPort { .. }));

        env::remove_var("ENVBAD_PORT");
    }

    #[test]
    fn test_explicit_overlay_wins_over_env() {
        env::set_var("ENVMAN_HOST", "env.example.com");

        let overrides = SettingsOverlay {
            host: Some("explicit.example.com".to_string()),
            ..SettingsOverlay::default()
        };
        let settings = Settings::resolve_with("envman_mq", &overrides).unwrap();
        assert_eq!(settings.host, "explicit.example.com");

        env::remove_var("ENVMAN_HOST");
    }

    #[test]
    fn test_config_file_sparse_merge() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "acme.json", r#"{"host": "example.com"}"#);

        let mut settings = preset("mq");
        settings.token = "keep-me".to_string();
        settings.apply_config_file("acme", "mq", &path).unwrap();

        assert_eq!(settings.host, "example.com");
        assert_eq!(settings.token, "keep-me");
        assert_eq!(settings.port, 443);
    }

    #[test]
    fn test_config_file_nested_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "acme.json",
            r#"{"host": "a.example.com", "acme_mq": {"host": "b.example.com", "port": 9090}}"#,
        );

        let mut settings = preset("mq");
        settings.apply_config_file("acme", "mq", &path).unwrap();
        assert_eq!(settings.host, "b.example.com");
        assert_eq!(settings.port, 9090);

        // a different product only sees the top-level fields
        let mut settings = preset("cache");
        settings.apply_config_file("acme", "cache", &path).unwrap();
        assert_eq!(settings.host, "a.example.com");
        assert_eq!(settings.port, 443);
    }

    #[test]
    fn test_missing_config_file_is_skipped() {
        let mut settings = preset("mq");
        let before = settings.clone();
        settings
            .apply_config_file("acme", "mq", Path::new("/nonexistent/acme.json"))
            .unwrap();
        assert_eq!(settings, before);
    }

    #[test]
    fn test_malformed_config_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "acme.json", "{not json");

        let mut settings = preset("mq");
        let err = settings.apply_config_file("acme", "mq", &path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConfigFile { .. }));
    }

    #[test]
    fn test_out_of_range_file_port_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "acme.json", r#"{"port": 70000}"#);

        let mut settings = preset("mq");
        let err = settings.apply_config_file("acme", "mq", &path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConfigFile { .. }));
    }

    #[test]
    fn test_file_pass_overrides_env_pass() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "acme.json", r#"{"token": "file-token"}"#);

        // same order resolve() uses: env overlay first, then the local file
        let mut settings = preset("mq");
        settings.apply(&SettingsOverlay {
            token: Some("env-token".to_string()),
            ..SettingsOverlay::default()
        });
        settings.apply_config_file("acme", "mq", &path).unwrap();
        assert_eq!(settings.token, "file-token");
    }

    #[test]
    fn test_user_agent_only_from_files_and_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "acme.json", r#"{"user_agent": "custom-agent"}"#);

        let mut settings = preset("mq");
        settings.apply_config_file("acme", "mq", &path).unwrap();
        assert_eq!(settings.user_agent, "custom-agent");
    }
}
