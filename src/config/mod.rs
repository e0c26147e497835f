pub mod enhance;
pub mod types;

use anyhow::{Context, Result};
use std::path::Path;

pub use types::{ApiConfig, CacheConfig, Config, EngineConfig, LogConfig, ReaperConfig, StoreConfig};

pub fn load_config(path: &str) -> Result<Config> {
    let raw = std::fs::read_to_string(Path::new(path))
        .with_context(|| format!("failed to read config '{}'", path))?;
    parse_config(&raw)
}

/// 展开环境变量、解析 YAML 并校验
pub fn parse_config(raw: &str) -> Result<Config> {
    let content = enhance::expand_env_vars(raw);
    let config: Config = if content.trim().is_empty() {
        Config::default()
    } else {
        serde_yml::from_str(&content)?
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_config_with_env_expansion() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::env::set_var("RB_CONFIG_TEST_SECRET", "s3cret");
        std::fs::write(
            &path,
            "api:\n  port: 9100\n  secret: ${RB_CONFIG_TEST_SECRET}\nengine:\n  max_cname_depth: 4\nstore:\n  snapshot_path: /tmp/records.json\n",
        )
        .unwrap();

        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.api.port, 9100);
        assert_eq!(config.api.listen, "127.0.0.1");
        assert_eq!(config.api.secret.as_deref(), Some("s3cret"));
        assert_eq!(config.engine.max_cname_depth, 4);
        assert_eq!(config.engine.default_ttl_secs, 3600);
        assert!(config.reaper.enabled);
        assert_eq!(
            config.store.snapshot_path.as_deref(),
            Some(Path::new("/tmp/records.json"))
        );
        std::env::remove_var("RB_CONFIG_TEST_SECRET");
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.log.level, "info");
        assert_eq!(config.cache.max_entries, 10_000);
        assert!(config.store.snapshot_path.is_none());
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(parse_config("engine:\n  max_cname_depth: 0\n").is_err());
        assert!(parse_config("engine:\n  default_ttl_secs: 30\n").is_err());
        assert!(parse_config("reaper:\n  interval_secs: 0\n").is_err());
        assert!(parse_config("reaper:\n  enabled: false\n  interval_secs: 0\n").is_ok());
        assert!(parse_config("api:\n  secret: \"  \"\n").is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_config("/nonexistent/recordbook.yaml").is_err());
    }
}
