use std::sync::Arc;

use log::{debug, info, trace};
use num_traits::FromPrimitive;

use crate::config::SimConfig;
use crate::control::message::{
    CommMapUpdate, LcpMessage, ThreadJoinRequest, ThreadSpawnRequest, WireReader, WireWriter,
};
use crate::control::thread_manager::ThreadManager;
use crate::control::{FinishFlag, ShutdownState};
use crate::tile::TileManager;
use crate::transport::{Endpoint, NetPacket, PacketType, Transport};

/// Per-process control loop: blocks on the process's global endpoint and
/// dispatches on the leading i32 message type.  Holds no locks across a
/// receive.
pub struct Lcp {
    proc_num: u32,
    endpoint: Endpoint,
    transport: Arc<Transport>,
    config: Arc<SimConfig>,
    tiles: Arc<TileManager>,
    thread_manager: Arc<ThreadManager>,
    shutdown: Arc<ShutdownState>,
    finished: Arc<FinishFlag>,
}

impl Lcp {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        proc_num: u32,
        endpoint: Endpoint,
        transport: Arc<Transport>,
        config: Arc<SimConfig>,
        tiles: Arc<TileManager>,
        thread_manager: Arc<ThreadManager>,
        shutdown: Arc<ShutdownState>,
        finished: Arc<FinishFlag>,
    ) -> Self {
        Lcp {
            proc_num,
            endpoint,
            transport,
            config,
            tiles,
            thread_manager,
            shutdown,
            finished,
        }
    }

    pub fn run(mut self) {
        info!("lcp {} started", self.proc_num);
        while !self.process_packet() {}
        self.finished.signal();
        info!("lcp {} finished", self.proc_num);
    }

    /// Returns true when the loop should exit.
    fn process_packet(&mut self) -> bool {
        let frame = self.endpoint.recv();
        let mut reader = WireReader::new(&frame);
        let raw = reader.get_i32();
        let msg = LcpMessage::from_i32(raw)
            .unwrap_or_else(|| panic!("unexpected lcp message type: {}", raw));
        trace!("lcp {}: received {:?}", self.proc_num, msg);

        match msg {
            LcpMessage::Quit => return true,

            LcpMessage::CommIdUpdate => {
                let update = CommMapUpdate::decode(&mut reader);
                debug!(
                    "lcp {}: comm_id {} -> tile {}",
                    self.proc_num, update.comm_id, update.tile_id
                );
                self.config.update_comm_map(update.comm_id, update.tile_id);
                // No ack on the direct path.
            }

            LcpMessage::CommMapUpdateFromMcp => {
                let update = CommMapUpdate::decode(&mut reader);
                self.config.update_comm_map(update.comm_id, update.tile_id);
                self.ack_mcp();
            }

            LcpMessage::SimulatorFinished => self.handle_simulator_finished(),

            LcpMessage::SimulatorFinishedAck => self.shutdown.process_done(),

            LcpMessage::ThreadSpawnRequestFromRequester => self
                .thread_manager
                .master_spawn_thread(ThreadSpawnRequest::decode(&mut reader)),

            LcpMessage::ThreadSpawnRequestFromMaster => self
                .thread_manager
                .slave_spawn_thread(ThreadSpawnRequest::decode(&mut reader)),

            LcpMessage::ThreadSpawnReplyFromSlave => self
                .thread_manager
                .master_spawn_thread_reply(ThreadSpawnRequest::decode(&mut reader)),

            LcpMessage::ThreadExit => {
                let tile = reader.get_i32();
                let end_time = reader.get_u64();
                self.thread_manager.master_on_thread_exit(tile, end_time);
            }

            LcpMessage::ThreadJoinRequest => self
                .thread_manager
                .master_join_thread(ThreadJoinRequest::decode(&mut reader)),
        }
        false
    }

    fn ack_mcp(&self) {
        self.transport.net_send(NetPacket::new(
            PacketType::Response,
            self.config.topology.lcp_tile(self.proc_num) as i32,
            self.config.topology.mcp_tile() as i32,
            Vec::new(),
        ));
    }

    fn handle_simulator_finished(&self) {
        self.tiles.disable_models_for_process(self.proc_num);
        let ack = WireWriter::new(LcpMessage::SimulatorFinishedAck as i32).finish();
        self.transport.global_send(0, ack);
    }
}

/// Sends Quit to a process's LCP and blocks until the loop has exited.
pub fn finish(transport: &Transport, proc_num: u32, finished: &FinishFlag) {
    debug!("sending lcp {} quit message", proc_num);
    transport.global_send(proc_num, WireWriter::new(LcpMessage::Quit as i32).finish());
    finished.wait();
}
