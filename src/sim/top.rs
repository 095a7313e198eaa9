use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle};

use log::info;

use crate::config::SimConfig;
use crate::control::lcp::{self, Lcp};
use crate::control::mcp::{self, Mcp, McpSummary};
use crate::control::message::{LcpMessage, WireWriter};
use crate::control::thread_manager::ThreadManager;
use crate::control::{FinishFlag, ShutdownState};
use crate::sim::summary;
use crate::tile::TileManager;
use crate::transport::{NodeId, Transport};

struct ControlPlane {
    mcp_finished: Arc<FinishFlag>,
    mcp_handle: Option<JoinHandle<McpSummary>>,
    lcp_finished: Vec<Arc<FinishFlag>>,
    lcp_handles: Vec<JoinHandle<()>>,
    done: bool,
}

/// Owns the simulated fleet: tiles with their performance models, the
/// transport, the thread manager, and the MCP/LCP control threads.
pub struct Simulator {
    config: Arc<SimConfig>,
    transport: Arc<Transport>,
    tiles: Arc<TileManager>,
    thread_manager: Arc<ThreadManager>,
    shutdown: Arc<ShutdownState>,
    models_barrier: OnceLock<u32>,
    control: Mutex<ControlPlane>,
}

impl Simulator {
    pub fn new(config: SimConfig) -> Arc<Simulator> {
        let config = Arc::new(config);
        let topology = config.topology;
        let transport = Arc::new(Transport::new(&topology));
        let tiles = Arc::new(TileManager::new(config.clone(), &transport));
        let thread_manager = Arc::new(ThreadManager::new(
            config.clone(),
            transport.clone(),
            tiles.clone(),
        ));
        let shutdown = Arc::new(ShutdownState::new(topology.process_count - 1));

        let mcp_finished = Arc::new(FinishFlag::new());
        let mcp = Mcp::new(
            config.clone(),
            transport.clone(),
            tiles.clone(),
            mcp_finished.clone(),
        );
        let mcp_handle = thread::Builder::new()
            .name("mcp".to_string())
            .spawn(move || mcp.run())
            .expect("failed to spawn mcp thread");

        let mut lcp_finished = Vec::new();
        let mut lcp_handles = Vec::new();
        for proc in 0..topology.process_count {
            let finished = Arc::new(FinishFlag::new());
            let lcp = Lcp::new(
                proc,
                transport.take_endpoint(NodeId::Global(proc)),
                transport.clone(),
                config.clone(),
                tiles.clone(),
                thread_manager.clone(),
                shutdown.clone(),
                finished.clone(),
            );
            lcp_handles.push(
                thread::Builder::new()
                    .name(format!("lcp-{}", proc))
                    .spawn(move || lcp.run())
                    .expect("failed to spawn lcp thread"),
            );
            lcp_finished.push(finished);
        }

        info!(
            "simulator up: {} tiles across {} processes",
            topology.total_tiles, topology.process_count
        );

        Arc::new(Simulator {
            config,
            transport,
            tiles,
            thread_manager,
            shutdown,
            models_barrier: OnceLock::new(),
            control: Mutex::new(ControlPlane {
                mcp_finished,
                mcp_handle: Some(mcp_handle),
                lcp_finished,
                lcp_handles,
                done: false,
            }),
        })
    }

    pub fn config(&self) -> &Arc<SimConfig> {
        &self.config
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    pub fn tiles(&self) -> &Arc<TileManager> {
        &self.tiles
    }

    pub fn thread_manager(&self) -> &Arc<ThreadManager> {
        &self.thread_manager
    }

    /// The application-wide barrier gating the model toggles; set once by
    /// the primary thread.
    pub fn set_models_barrier(&self, handle: u32) {
        self.models_barrier
            .set(handle)
            .expect("models barrier initialized twice");
    }

    pub fn models_barrier(&self) -> Option<u32> {
        self.models_barrier.get().copied()
    }

    /// Cooperative teardown: reaps workload threads, runs the cross-process
    /// finish handshake, stops the MCP and every LCP, and writes the run
    /// summary.  Idempotent.
    pub fn finish(&self) {
        let mut control = self.control.lock().expect("control plane lock poisoned");
        if control.done {
            return;
        }
        control.done = true;

        info!("simulator finishing");
        self.thread_manager.join_os_threads();
        self.thread_manager.clear_entries();

        let finished_msg = WireWriter::new(LcpMessage::SimulatorFinished as i32).finish();
        for proc in 1..self.config.topology.process_count {
            self.transport.global_send(proc, finished_msg.clone());
        }
        self.shutdown.wait_all();
        self.tiles.disable_models_for_process(0);

        for tile in self.tiles.tiles() {
            tile.main_model().recompute_average_frequency();
            if let Some(pep) = tile.pep_model() {
                pep.recompute_average_frequency();
            }
        }

        mcp::finish(&self.transport, &self.config, &control.mcp_finished);
        let mcp_summary = control
            .mcp_handle
            .take()
            .expect("mcp handle present until finish")
            .join()
            .expect("mcp thread panicked");

        for proc in 0..self.config.topology.process_count {
            lcp::finish(&self.transport, proc, &control.lcp_finished[proc as usize]);
        }
        for handle in control.lcp_handles.drain(..) {
            handle.join().expect("lcp thread panicked");
        }

        self.tiles.unbind_current_thread();
        summary::write_summary(self.tiles.summaries(), mcp_summary);
    }
}
