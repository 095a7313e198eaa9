use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};

use log::{debug, info};

use crate::config::SimConfig;
use crate::control::message::{
    LcpMessage, ThreadJoinRequest, ThreadSpawnRequest, WireReader, WireWriter,
};
use crate::tile::TileManager;
use crate::transport::{NetMatch, NetPacket, PacketType, Transport};

/// A spawnable workload entry; the argument comes from the spawn request.
pub type ThreadEntry = Arc<dyn Fn(u64) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ThreadStatus {
    Idle,
    Running,
    Exited,
}

struct ThreadState {
    status: ThreadStatus,
    end_time: u64,
    joiner: Option<i32>,
}

/// Cross-process thread lifecycle.  Process 0's LCP runs the master paths;
/// every process's LCP runs the slave spawn path for its own tiles.
pub struct ThreadManager {
    config: Arc<SimConfig>,
    transport: Arc<Transport>,
    tiles: Arc<TileManager>,
    entries: RwLock<Vec<ThreadEntry>>,
    master: Mutex<Vec<ThreadState>>,
    os_threads: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadManager {
    pub fn new(
        config: Arc<SimConfig>,
        transport: Arc<Transport>,
        tiles: Arc<TileManager>,
    ) -> Self {
        let mut states: Vec<ThreadState> = (0..config.topology.total_tiles)
            .map(|_| ThreadState {
                status: ThreadStatus::Idle,
                end_time: 0,
                joiner: None,
            })
            .collect();
        // The primary application thread occupies the first app tile.
        let primary = tiles.first_app_tile();
        states[primary as usize].status = ThreadStatus::Running;
        ThreadManager {
            config,
            transport,
            tiles,
            entries: RwLock::new(Vec::new()),
            master: Mutex::new(states),
            os_threads: Mutex::new(Vec::new()),
        }
    }

    pub fn register_entry(&self, entry: ThreadEntry) -> i32 {
        let mut entries = self.entries.write().expect("entry table lock poisoned");
        entries.push(entry);
        (entries.len() - 1) as i32
    }

    /// Dropped at teardown so closures capturing the simulator do not keep
    /// it alive in a cycle.
    pub fn clear_entries(&self) {
        self.entries.write().expect("entry table lock poisoned").clear();
    }

    // -- requester side, called on a bound workload thread

    /// Blocks until the master has placed and started the thread; returns
    /// the tile it runs on.
    pub fn spawn_thread(&self, func_id: i32, arg: u64) -> i32 {
        let tile = self
            .tiles
            .current_tile()
            .expect("calling thread is not bound to a tile");
        let request = ThreadSpawnRequest {
            requester: tile.id() as i32,
            destination: -1,
            func_id,
            arg,
            start_time: tile.main_model().cycle_count(),
        };
        self.transport.global_send(
            0,
            request.encode(LcpMessage::ThreadSpawnRequestFromRequester),
        );
        let master_tile = self.config.topology.lcp_tile(0) as i32;
        let reply = tile.network().net_recv(
            &NetMatch::on_types(&[PacketType::Response]).from_sender(master_tile),
        );
        WireReader::new(&reply.data).get_i32()
    }

    /// Blocks until the target thread has exited; returns its end time.
    pub fn join_thread(&self, target: i32) -> u64 {
        let tile = self
            .tiles
            .current_tile()
            .expect("calling thread is not bound to a tile");
        let request = ThreadJoinRequest {
            requester: tile.id() as i32,
            target,
        };
        self.transport.global_send(0, request.encode());
        let master_tile = self.config.topology.lcp_tile(0) as i32;
        let reply = tile.network().net_recv(
            &NetMatch::on_types(&[PacketType::Response]).from_sender(master_tile),
        );
        WireReader::new(&reply.data).get_u64()
    }

    // -- master paths, called on process 0's LCP thread

    pub fn master_spawn_thread(&self, mut request: ThreadSpawnRequest) {
        let destination = {
            let mut states = self.lock_master();
            let tile = (0..self.config.topology.total_tiles)
                .find(|&t| {
                    self.config.topology.is_app_tile(t)
                        && states[t as usize].status == ThreadStatus::Idle
                })
                .expect("no idle application tile for thread spawn");
            states[tile as usize] = ThreadState {
                status: ThreadStatus::Running,
                end_time: 0,
                joiner: None,
            };
            tile
        };
        request.destination = destination as i32;
        debug!(
            "spawning func {} for tile {} on tile {}",
            request.func_id, request.requester, destination
        );
        let proc = self.config.topology.process_of_tile(destination);
        self.transport
            .global_send(proc, request.encode(LcpMessage::ThreadSpawnRequestFromMaster));
    }

    pub fn slave_spawn_thread(&self, request: ThreadSpawnRequest) {
        let entry = {
            let entries = self.entries.read().expect("entry table lock poisoned");
            entries
                .get(request.func_id as usize)
                .unwrap_or_else(|| panic!("unknown thread entry: {}", request.func_id))
                .clone()
        };
        let tiles = self.tiles.clone();
        let transport = self.transport.clone();
        let destination = request.destination;
        let arg = request.arg;
        let start_time = request.start_time;
        let handle = thread::Builder::new()
            .name(format!("tile-{}", destination))
            .spawn(move || {
                tiles.bind_current_thread(destination as u32);
                let tile = tiles.tile(destination as u32);
                tile.main_model().set_cycle_count(start_time);
                entry(arg);
                tile.main_model().recompute_average_frequency();
                let end_time = tile.main_model().cycle_count();
                let mut w = WireWriter::new(LcpMessage::ThreadExit as i32);
                w.put_i32(destination);
                w.put_u64(end_time);
                transport.global_send(0, w.finish());
                tiles.unbind_current_thread();
            })
            .expect("failed to spawn simulated thread");
        self.os_threads
            .lock()
            .expect("os thread table lock poisoned")
            .push(handle);
        self.transport
            .global_send(0, request.encode(LcpMessage::ThreadSpawnReplyFromSlave));
    }

    pub fn master_spawn_thread_reply(&self, request: ThreadSpawnRequest) {
        self.transport.net_send(NetPacket::new(
            PacketType::Response,
            self.config.topology.lcp_tile(0) as i32,
            request.requester,
            request.destination.to_le_bytes().to_vec(),
        ));
    }

    pub fn master_on_thread_exit(&self, tile: i32, end_time: u64) {
        info!("thread on tile {} exited at cycle {}", tile, end_time);
        let joiner = {
            let mut states = self.lock_master();
            let state = &mut states[tile as usize];
            assert_eq!(
                state.status,
                ThreadStatus::Running,
                "exit from tile {} with no running thread",
                tile
            );
            state.end_time = end_time;
            match state.joiner.take() {
                Some(joiner) => {
                    state.status = ThreadStatus::Idle;
                    Some(joiner)
                }
                None => {
                    state.status = ThreadStatus::Exited;
                    None
                }
            }
        };
        if let Some(joiner) = joiner {
            self.reply_join(joiner, end_time);
        }
    }

    pub fn master_join_thread(&self, request: ThreadJoinRequest) {
        let reply = {
            let mut states = self.lock_master();
            let state = &mut states[request.target as usize];
            match state.status {
                ThreadStatus::Exited => {
                    state.status = ThreadStatus::Idle;
                    Some(state.end_time)
                }
                ThreadStatus::Running => {
                    assert!(
                        state.joiner.is_none(),
                        "tile {} already has a joiner",
                        request.target
                    );
                    state.joiner = Some(request.requester);
                    None
                }
                ThreadStatus::Idle => {
                    panic!("join on tile {} with no thread", request.target)
                }
            }
        };
        if let Some(end_time) = reply {
            self.reply_join(request.requester, end_time);
        }
    }

    fn reply_join(&self, requester: i32, end_time: u64) {
        self.transport.net_send(NetPacket::new(
            PacketType::Response,
            self.config.topology.lcp_tile(0) as i32,
            requester,
            end_time.to_le_bytes().to_vec(),
        ));
    }

    /// Reaps every OS thread spawned on behalf of the workload.
    pub fn join_os_threads(&self) {
        let handles: Vec<_> = self
            .os_threads
            .lock()
            .expect("os thread table lock poisoned")
            .drain(..)
            .collect();
        for handle in handles {
            handle.join().expect("simulated thread panicked");
        }
    }

    fn lock_master(&self) -> std::sync::MutexGuard<'_, Vec<ThreadState>> {
        self.master.lock().expect("master state lock poisoned")
    }
}
