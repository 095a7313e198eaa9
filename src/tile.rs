use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::thread::{self, ThreadId};

use log::debug;

use crate::config::SimConfig;
use crate::perf::instruction::{Instruction, InstructionType};
use crate::perf::model::{CoreKind, CorePerfModel, CorePerfSummary};
use crate::transport::{Network, Transport};

/// Unit of simulated hardware: a main core, an optional PEP core, and a
/// network endpoint.
pub struct Tile {
    id: u32,
    network: Network,
    main_model: Arc<CorePerfModel>,
    pep_model: Option<Arc<CorePerfModel>>,
}

impl Tile {
    pub fn new(id: u32, transport: Arc<Transport>, config: &SimConfig) -> Self {
        let network = Network::new(id, transport);
        let main_model =
            CorePerfModel::create(id, CoreKind::Main, config).expect("main core model");
        let pep_model = CorePerfModel::create(id, CoreKind::Pep, config);
        Tile {
            id,
            network,
            main_model,
            pep_model,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn main_model(&self) -> &Arc<CorePerfModel> {
        &self.main_model
    }

    pub fn pep_model(&self) -> Option<&Arc<CorePerfModel>> {
        self.pep_model.as_ref()
    }

    pub fn enable_models(&self) {
        if self.main_model.is_mcp_tile() {
            return;
        }
        self.main_model.enable();
        if let Some(pep) = &self.pep_model {
            pep.enable();
        }
    }

    pub fn disable_models(&self) {
        self.main_model.disable();
        if let Some(pep) = &self.pep_model {
            pep.disable();
        }
    }

    pub fn reset_models(&self) {
        self.main_model.reset();
        if let Some(pep) = &self.pep_model {
            pep.reset();
        }
    }

    /// Feeds an inter-tile operation to both cores of this tile; the models
    /// decide whether it contributes to their cycle counts.
    pub fn queue_intertile_instruction(&self, itype: InstructionType, cost: u64) {
        self.main_model
            .queue_dynamic_instruction(Instruction::new(itype, cost, Vec::new()));
        self.main_model.iterate();
        if let Some(pep) = &self.pep_model {
            pep.queue_dynamic_instruction(Instruction::new(itype, cost, Vec::new()));
            pep.iterate();
        }
    }

    pub fn summaries(&self) -> Vec<CorePerfSummary> {
        let mut out = vec![self.main_model.summary()];
        if let Some(pep) = &self.pep_model {
            out.push(pep.summary());
        }
        out
    }
}

/// Owns every tile of the fleet and the OS-thread-to-tile bindings.
pub struct TileManager {
    config: Arc<SimConfig>,
    tiles: Vec<Arc<Tile>>,
    bindings: RwLock<HashMap<ThreadId, u32>>,
}

impl TileManager {
    pub fn new(config: Arc<SimConfig>, transport: &Arc<Transport>) -> Self {
        let tiles = (0..config.topology.total_tiles)
            .map(|id| Arc::new(Tile::new(id, transport.clone(), &config)))
            .collect();
        TileManager {
            config,
            tiles,
            bindings: RwLock::new(HashMap::new()),
        }
    }

    pub fn tile(&self, id: u32) -> Arc<Tile> {
        self.tiles
            .get(id as usize)
            .unwrap_or_else(|| panic!("tile id out of range: {}", id))
            .clone()
    }

    pub fn tiles(&self) -> &[Arc<Tile>] {
        &self.tiles
    }

    pub fn bind_current_thread(&self, tile_id: u32) {
        assert!(
            (tile_id as usize) < self.tiles.len(),
            "tile id out of range: {}",
            tile_id
        );
        debug!("binding thread {:?} to tile {}", thread::current().id(), tile_id);
        self.bindings
            .write()
            .expect("tile binding lock poisoned")
            .insert(thread::current().id(), tile_id);
    }

    pub fn unbind_current_thread(&self) {
        self.bindings
            .write()
            .expect("tile binding lock poisoned")
            .remove(&thread::current().id());
    }

    pub fn current_tile(&self) -> Option<Arc<Tile>> {
        let id = *self
            .bindings
            .read()
            .expect("tile binding lock poisoned")
            .get(&thread::current().id())?;
        Some(self.tile(id))
    }

    pub fn first_app_tile(&self) -> u32 {
        (0..self.config.topology.total_tiles)
            .find(|&t| self.config.topology.is_app_tile(t))
            .expect("topology has no application tiles")
    }

    /// Registers the calling OS thread as the primary simulated thread.
    pub fn initialize_thread(&self) -> u32 {
        let tile = self.first_app_tile();
        self.bind_current_thread(tile);
        tile
    }

    pub fn enable_models_for_process(&self, proc: u32) {
        for id in self.config.topology.tile_range(proc) {
            self.tile(id).enable_models();
        }
    }

    pub fn disable_models_for_process(&self, proc: u32) {
        for id in self.config.topology.tile_range(proc) {
            self.tile(id).disable_models();
        }
    }

    pub fn reset_models_for_process(&self, proc: u32) {
        for id in self.config.topology.tile_range(proc) {
            self.tile(id).reset_models();
        }
    }

    pub fn summaries(&self) -> Vec<CorePerfSummary> {
        self.tiles.iter().flat_map(|t| t.summaries()).collect()
    }
}
