use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::ops::Range;
use std::path::Path;
use std::sync::RwLock;

use log::warn;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use toml::Value;

#[derive(Debug, PartialEq)]
pub enum ConfigError {
    KeyNotFound(String),
    TypeMismatch { path: String, expected: &'static str },
    Io(String),
    Parse(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::KeyNotFound(path) => write!(f, "config key not found: {}", path),
            Self::TypeMismatch { path, expected } => {
                write!(f, "config key {} is not a {}", path, expected)
            }
            Self::Io(msg) => write!(f, "cannot read config file: {}", msg),
            Self::Parse(msg) => write!(f, "cannot parse config file: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Hierarchical key/value store backed by a parsed TOML document.  Paths are
/// slash-separated ("section/subsection/key"); leaves are typed.
#[derive(Debug, Clone)]
pub struct ConfigTree {
    root: Value,
}

impl ConfigTree {
    pub fn empty() -> Self {
        ConfigTree {
            root: Value::Table(Default::default()),
        }
    }

    pub fn from_str(text: &str) -> Result<Self, ConfigError> {
        let root = text
            .parse::<Value>()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(ConfigTree { root })
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_str(&text)
    }

    fn lookup(&self, path: &str) -> Option<&Value> {
        let mut node = &self.root;
        for elem in path.split('/') {
            node = node.as_table()?.get(elem)?;
        }
        Some(node)
    }

    /// Returns the subtree at `path`, used to deserialize section structs.
    pub fn section(&self, path: &str) -> Option<&Value> {
        self.lookup(path)
    }

    pub fn get_bool(&self, path: &str) -> Result<bool, ConfigError> {
        match self.lookup(path) {
            None => Err(ConfigError::KeyNotFound(path.to_string())),
            Some(v) => v.as_bool().ok_or(ConfigError::TypeMismatch {
                path: path.to_string(),
                expected: "bool",
            }),
        }
    }

    pub fn get_int(&self, path: &str) -> Result<i64, ConfigError> {
        match self.lookup(path) {
            None => Err(ConfigError::KeyNotFound(path.to_string())),
            Some(v) => v.as_integer().ok_or(ConfigError::TypeMismatch {
                path: path.to_string(),
                expected: "integer",
            }),
        }
    }

    pub fn get_float(&self, path: &str) -> Result<f64, ConfigError> {
        match self.lookup(path) {
            None => Err(ConfigError::KeyNotFound(path.to_string())),
            Some(v) => v
                .as_float()
                .or_else(|| v.as_integer().map(|i| i as f64))
                .ok_or(ConfigError::TypeMismatch {
                    path: path.to_string(),
                    expected: "float",
                }),
        }
    }

    pub fn get_str(&self, path: &str) -> Result<String, ConfigError> {
        match self.lookup(path) {
            None => Err(ConfigError::KeyNotFound(path.to_string())),
            Some(v) => v
                .as_str()
                .map(str::to_string)
                .ok_or(ConfigError::TypeMismatch {
                    path: path.to_string(),
                    expected: "string",
                }),
        }
    }

    pub fn get_bool_or(&self, path: &str, default: bool) -> bool {
        Self::or_default(self.get_bool(path), default)
    }

    pub fn get_int_or(&self, path: &str, default: i64) -> i64 {
        Self::or_default(self.get_int(path), default)
    }

    pub fn get_float_or(&self, path: &str, default: f64) -> f64 {
        Self::or_default(self.get_float(path), default)
    }

    pub fn get_str_or(&self, path: &str, default: &str) -> String {
        Self::or_default(self.get_str(path), default.to_string())
    }

    // A default only papers over a missing key; a key of the wrong type is a
    // malformed config and fatal.
    fn or_default<T>(result: Result<T, ConfigError>, default: T) -> T {
        match result {
            Ok(v) => v,
            Err(ConfigError::KeyNotFound(_)) => default,
            Err(e) => panic!("{}", e),
        }
    }
}

pub trait Config: DeserializeOwned + Default {
    fn from_section(section: Option<&Value>) -> Self {
        match section {
            Some(value) => value.clone().try_into().expect("cannot deserialize config"),
            None => {
                warn!("config section not found");
                Self::default()
            }
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GeneralConfig {
    pub total_tiles: u32,
    pub process_count: u32,
    pub enable_performance_modeling: bool,
}

impl Config for GeneralConfig {}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            total_tiles: 4,
            process_count: 1,
            enable_performance_modeling: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PerfConfig {
    pub core_model: String,
    pub pep_model: String,
    /// Core clock in GHz.
    pub frequency: f64,
    /// Fixed costs of the inter-tile operations queued by the user API.
    pub recv_cost: u64,
    pub sync_cost: u64,
    pub spawn_cost: u64,
    pub branch_predictor: BranchPredictorConfig,
    pub iocoom: IocoomConfig,
}

impl Config for PerfConfig {}

impl Default for PerfConfig {
    fn default() -> Self {
        Self {
            core_model: "simple".to_string(),
            pep_model: "none".to_string(),
            frequency: 1.0,
            recv_cost: 50,
            sync_cost: 20,
            spawn_cost: 100,
            branch_predictor: BranchPredictorConfig::default(),
            iocoom: IocoomConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BranchPredictorConfig {
    pub kind: String,
    pub size: usize,
    pub mispredict_penalty: u64,
}

impl Config for BranchPredictorConfig {}

impl Default for BranchPredictorConfig {
    fn default() -> Self {
        Self {
            kind: "none".to_string(),
            size: 1024,
            mispredict_penalty: 14,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct IocoomConfig {
    pub outstanding_loads: usize,
    pub store_buffer_entries: usize,
}

impl Config for IocoomConfig {}

impl Default for IocoomConfig {
    fn default() -> Self {
        Self {
            outstanding_loads: 4,
            store_buffer_entries: 8,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct McpConfig {
    pub max_buffer_size: usize,
}

impl Config for McpConfig {}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: 256 * 1024,
        }
    }
}

/// Static placement of the fleet: C tiles split into contiguous per-process
/// slices, the remainder going to the earlier processes.  The first tile of
/// each slice hosts that process's LCP; the globally last tile hosts the MCP.
#[derive(Debug, Clone, Copy)]
pub struct Topology {
    pub total_tiles: u32,
    pub process_count: u32,
}

impl Topology {
    pub fn new(total_tiles: u32, process_count: u32) -> Self {
        assert!(process_count >= 1, "need at least one process");
        assert!(
            total_tiles / process_count >= 2,
            "need at least two tiles per process"
        );
        Topology {
            total_tiles,
            process_count,
        }
    }

    pub fn tile_range(&self, proc: u32) -> Range<u32> {
        assert!(proc < self.process_count, "process id out of range");
        let base = self.total_tiles / self.process_count;
        let rem = self.total_tiles % self.process_count;
        let extra = proc.min(rem);
        let start = proc * base + extra;
        let len = base + if proc < rem { 1 } else { 0 };
        start..start + len
    }

    pub fn process_of_tile(&self, tile: u32) -> u32 {
        assert!(tile < self.total_tiles, "tile id out of range");
        (0..self.process_count)
            .find(|&p| self.tile_range(p).contains(&tile))
            .expect("contiguous slices cover all tiles")
    }

    pub fn lcp_tile(&self, proc: u32) -> u32 {
        self.tile_range(proc).start
    }

    pub fn mcp_tile(&self) -> u32 {
        self.total_tiles - 1
    }

    pub fn is_app_tile(&self, tile: u32) -> bool {
        tile != self.mcp_tile() && self.lcp_tile(self.process_of_tile(tile)) != tile
    }

    pub fn app_tile_count(&self) -> u32 {
        (0..self.total_tiles).filter(|&t| self.is_app_tile(t)).count() as u32
    }
}

/// Fully resolved configuration threaded explicitly through every
/// constructor, plus the process-wide comm-id map the control plane installs.
pub struct SimConfig {
    pub tree: ConfigTree,
    pub general: GeneralConfig,
    pub perf: PerfConfig,
    pub mcp: McpConfig,
    pub topology: Topology,
    comm_map: RwLock<HashMap<i32, i32>>,
}

impl SimConfig {
    pub fn new(tree: ConfigTree) -> Self {
        let general = GeneralConfig::from_section(tree.section("general"));
        let perf = PerfConfig::from_section(tree.section("perf_model"));
        let mcp = McpConfig::from_section(tree.section("mcp"));
        let topology = Topology::new(general.total_tiles, general.process_count);
        SimConfig {
            tree,
            general,
            perf,
            mcp,
            topology,
            comm_map: RwLock::new(HashMap::new()),
        }
    }

    pub fn for_testing(total_tiles: u32, process_count: u32) -> Self {
        let mut config = SimConfig::new(ConfigTree::empty());
        config.general.total_tiles = total_tiles;
        config.general.process_count = process_count;
        config.topology = Topology::new(total_tiles, process_count);
        config
    }

    pub fn performance_modeling_enabled(&self) -> bool {
        self.general.enable_performance_modeling
    }

    pub fn update_comm_map(&self, comm_id: i32, tile_id: i32) {
        self.comm_map
            .write()
            .expect("comm map lock poisoned")
            .insert(comm_id, tile_id);
    }

    pub fn tile_for_comm_id(&self, comm_id: i32) -> Option<i32> {
        self.comm_map
            .read()
            .expect("comm map lock poisoned")
            .get(&comm_id)
            .copied()
    }

    pub fn comm_id_for_tile(&self, tile_id: i32) -> Option<i32> {
        self.comm_map
            .read()
            .expect("comm map lock poisoned")
            .iter()
            .find(|(_, &t)| t == tile_id)
            .map(|(&c, _)| c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_getters_and_defaults() {
        let tree = ConfigTree::from_str(
            "[general]\n\
             total_tiles = 6\n\
             [perf_model]\n\
             frequency = 2.5\n\
             core_model = \"magic\"\n",
        )
        .expect("parse");
        assert_eq!(tree.get_int("general/total_tiles"), Ok(6));
        assert_eq!(tree.get_float("perf_model/frequency"), Ok(2.5));
        assert_eq!(tree.get_str("perf_model/core_model").as_deref(), Ok("magic"));
        assert_eq!(tree.get_int_or("general/process_count", 1), 1);
        assert!(matches!(
            tree.get_bool("general/total_tiles"),
            Err(ConfigError::TypeMismatch { .. })
        ));
        assert!(matches!(
            tree.get_int("no/such/key"),
            Err(ConfigError::KeyNotFound(_))
        ));
    }

    #[test]
    fn integer_promotes_to_float() {
        let tree = ConfigTree::from_str("[perf_model]\nfrequency = 3\n").expect("parse");
        assert_eq!(tree.get_float("perf_model/frequency"), Ok(3.0));
    }

    #[test]
    fn sections_deserialize_with_defaults() {
        let tree = ConfigTree::from_str("[general]\ntotal_tiles = 8\n").expect("parse");
        let general = GeneralConfig::from_section(tree.section("general"));
        assert_eq!(general.total_tiles, 8);
        assert_eq!(general.process_count, 1);
        let perf = PerfConfig::from_section(tree.section("perf_model"));
        assert_eq!(perf.core_model, "simple");
    }

    #[test]
    fn topology_slices_are_contiguous() {
        let topo = Topology::new(7, 2);
        assert_eq!(topo.tile_range(0), 0..4);
        assert_eq!(topo.tile_range(1), 4..7);
        assert_eq!(topo.process_of_tile(3), 0);
        assert_eq!(topo.process_of_tile(4), 1);
        assert_eq!(topo.lcp_tile(1), 4);
        assert_eq!(topo.mcp_tile(), 6);
        assert!(!topo.is_app_tile(0));
        assert!(!topo.is_app_tile(6));
        assert!(topo.is_app_tile(5));
        assert_eq!(topo.app_tile_count(), 4);
    }

    #[test]
    fn comm_map_round_trip() {
        let config = SimConfig::for_testing(4, 1);
        assert_eq!(config.tile_for_comm_id(0), None);
        config.update_comm_map(0, 2);
        assert_eq!(config.tile_for_comm_id(0), Some(2));
        assert_eq!(config.comm_id_for_tile(2), Some(0));
    }
}
