use kiln_base::KilnResult;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Settings of a `ResourceManager`, usually read from a json file next to the game data.
///
/// ```json
/// { "worker_thread_count": 2, "block_timeout_ms": 5000 }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceManagerConfig {
    /// Decode threads to spawn. Zero means all decoding happens inside `pop_event()`.
    pub worker_thread_count: usize,
    /// Upper bound on how long a blocking load waits, when the load itself gives no timeout
    pub block_timeout_ms: Option<u64>,
}

impl Default for ResourceManagerConfig {
    fn default() -> Self {
        ResourceManagerConfig {
            worker_thread_count: 1,
            block_timeout_ms: None,
        }
    }
}

impl ResourceManagerConfig {
    /// No worker threads, everything is decoded on the calling thread
    pub fn synchronous() -> Self {
        ResourceManagerConfig {
            worker_thread_count: 0,
            ..Default::default()
        }
    }

    pub fn block_timeout(&self) -> Option<Duration> {
        self.block_timeout_ms.map(Duration::from_millis)
    }

    pub fn from_json_str(json: &str) -> KilnResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> KilnResult<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&json)?;
        log::info!("Loaded resource manager config {:?}", config);
        Ok(config)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let config = ResourceManagerConfig::from_json_str("{}").unwrap();
        assert_eq!(config, ResourceManagerConfig::default());
        assert_eq!(config.worker_thread_count, 1);
        assert_eq!(config.block_timeout(), None);
    }

    #[test]
    fn parse_all_fields() {
        let config = ResourceManagerConfig::from_json_str(
            r#"{ "worker_thread_count": 0, "block_timeout_ms": 250 }"#,
        )
        .unwrap();
        assert_eq!(config, ResourceManagerConfig::synchronous().with_timeout(250));
        assert_eq!(config.block_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn bad_json_is_an_error() {
        assert!(ResourceManagerConfig::from_json_str("{ \"worker_thread_count\": -1 }").is_err());
        assert!(ResourceManagerConfig::from_file("/no/such/kiln.json").is_err());
    }

    impl ResourceManagerConfig {
        fn with_timeout(
            mut self,
            block_timeout_ms: u64,
        ) -> Self {
            self.block_timeout_ms = Some(block_timeout_ms);
            self
        }
    }
}
