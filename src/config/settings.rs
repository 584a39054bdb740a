use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::env;
use std::sync::RwLock;

pub static GLOBAL_CONFIG: Lazy<Config> = Lazy::new(Config::new);

/// Falls back to the coordinator port when NODE_ID is unset.
const DEFAULT_NODE_ID: &str = "5000";

const NODE_ID_KEY: &str = "NODE_ID";

/// Process-wide configuration. The NODE_ID environment variable selects the
/// per-node file suffix and the TCP port; there is no other configuration.
pub struct Config {
    inner: RwLock<HashMap<String, String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Config {
        let node_id = env::var(NODE_ID_KEY).unwrap_or_else(|_| String::from(DEFAULT_NODE_ID));

        let mut map = HashMap::new();
        map.insert(String::from(NODE_ID_KEY), node_id);

        Config {
            inner: RwLock::new(map),
        }
    }

    pub fn get_node_id(&self) -> String {
        let inner = self
            .inner
            .read()
            .expect("Failed to acquire read lock on config - this should never happen");
        inner
            .get(NODE_ID_KEY)
            .expect("Node id should always be present in config")
            .clone()
    }

    /// Listen address derived from the node id.
    pub fn get_node_addr(&self) -> String {
        format!("localhost:{}", self.get_node_id())
    }
}
