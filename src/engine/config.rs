use serde::Deserialize;

use crate::core::types::{API_VERSION_MAJOR, API_VERSION_MINOR};
use crate::{BridgeError, BridgeResult};

/// Settings passed by the host to `init_engine` as TOML bytes.
///
/// ```toml
/// api_version = "1.0"
/// max_live_benchmarks = 1
/// log_filter = "bench_bridge=debug"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// `"major.minor"` the host was compiled against.
    #[serde(default)]
    pub api_version: Option<String>,
    /// Cap on simultaneously live benchmark instances. Unlimited when unset.
    #[serde(default)]
    pub max_live_benchmarks: Option<usize>,
    #[serde(default)]
    pub log_filter: Option<String>,
}

impl EngineConfig {
    /// Empty input yields the defaults.
    pub fn from_bytes(bytes: &[u8]) -> BridgeResult<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| BridgeError::invalid_args(format!("engine config is not UTF-8: {e}")))?;
        let text = text.trim_end_matches('\0');
        if text.trim().is_empty() {
            return Ok(EngineConfig::default());
        }
        let cfg: EngineConfig = toml::from_str(text)?;
        Ok(cfg)
    }

    /// Rejects a host expecting a different major or minor API version.
    pub fn check_api_version(&self) -> BridgeResult<()> {
        let Some(requested) = self.api_version.as_deref() else {
            return Ok(());
        };
        let mut parts = requested.trim().split('.');
        let parse = |s: Option<&str>| -> BridgeResult<u64> {
            s.and_then(|v| v.parse::<u64>().ok()).ok_or_else(|| {
                BridgeError::invalid_args(format!("malformed api_version '{requested}'"))
            })
        };
        let major = parse(parts.next())?;
        let minor = parse(parts.next())?;
        if major != API_VERSION_MAJOR || minor != API_VERSION_MINOR {
            return Err(BridgeError::critical(format!(
                "API version mismatch: host expects {major}.{minor}, backend provides {API_VERSION_MAJOR}.{API_VERSION_MINOR}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(EngineConfig::from_bytes(b"").unwrap(), EngineConfig::default());
        assert_eq!(EngineConfig::from_bytes(b"\0").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_parse_fields() {
        let cfg = EngineConfig::from_bytes(
            b"api_version = \"1.0\"\nmax_live_benchmarks = 2\nlog_filter = \"debug\"\n",
        )
        .unwrap();
        assert_eq!(cfg.max_live_benchmarks, Some(2));
        assert_eq!(cfg.log_filter.as_deref(), Some("debug"));
        cfg.check_api_version().unwrap();
    }

    #[test]
    fn test_unknown_field_is_invalid_args() {
        let err = EngineConfig::from_bytes(b"threads = 4").unwrap_err();
        assert_eq!(err.code(), crate::ECODE_INVALID_ARGS);
    }

    #[test]
    fn test_version_mismatch_is_critical() {
        let cfg = EngineConfig {
            api_version: Some("2.0".into()),
            ..Default::default()
        };
        assert!(cfg.check_api_version().unwrap_err().is_critical());

        let cfg = EngineConfig {
            api_version: Some("one".into()),
            ..Default::default()
        };
        assert!(!cfg.check_api_version().unwrap_err().is_critical());
    }
}
