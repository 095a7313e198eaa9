use std::sync::Arc;

use log::{debug, info, trace};
use num_traits::FromPrimitive;
use serde::Serialize;

use crate::config::SimConfig;
use crate::control::message::{CommMapUpdate, LcpMessage, McpMessage, WireReader, WireWriter};
use crate::control::sync_server::{SyncServer, SyncSummary};
use crate::control::syscall_server::SyscallServer;
use crate::control::FinishFlag;
use crate::tile::TileManager;
use crate::transport::{NetMatch, NetPacket, PacketType, Transport};

/// Accumulates the utilization reports the analytical network model feeds
/// through the MCP.
#[derive(Debug, Default)]
struct AnalyticalServer {
    utilization_sum: f64,
    updates: u64,
}

impl AnalyticalServer {
    fn update(&mut self, utilization: f64) {
        self.utilization_sum += utilization;
        self.updates += 1;
    }

    fn average(&self) -> f64 {
        if self.updates == 0 {
            0.0
        } else {
            self.utilization_sum / self.updates as f64
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct McpSummary {
    pub sync: SyncSummary,
    pub syscalls: u64,
    pub utilization_updates: u64,
    pub average_utilization: f64,
}

/// Global singleton loop on the MCP tile.  Serializes sync operations,
/// syscalls, and fleet-wide map updates; each received packet is fully
/// handled before the next receive.
pub struct Mcp {
    config: Arc<SimConfig>,
    transport: Arc<Transport>,
    tiles: Arc<TileManager>,
    sync_server: SyncServer,
    syscall_server: SyscallServer,
    analytical_server: AnalyticalServer,
    finished: Arc<FinishFlag>,
}

impl Mcp {
    pub fn new(
        config: Arc<SimConfig>,
        transport: Arc<Transport>,
        tiles: Arc<TileManager>,
        finished: Arc<FinishFlag>,
    ) -> Self {
        let mcp_tile = config.topology.mcp_tile();
        let sync_server = SyncServer::new(transport.clone(), mcp_tile);
        let syscall_server =
            SyscallServer::new(transport.clone(), mcp_tile, config.mcp.max_buffer_size);
        Mcp {
            config,
            transport,
            tiles,
            sync_server,
            syscall_server,
            analytical_server: AnalyticalServer::default(),
            finished,
        }
    }

    fn mcp_tile(&self) -> u32 {
        self.config.topology.mcp_tile()
    }

    pub fn run(mut self) -> McpSummary {
        info!("mcp started on tile {}", self.mcp_tile());
        let filter = NetMatch::on_types(&[PacketType::Request, PacketType::System]);
        loop {
            let packet = self.tiles.tile(self.mcp_tile()).network().net_recv(&filter);
            let mut reader = WireReader::new(&packet.data);
            let raw = reader.get_i32();
            let msg = McpMessage::from_i32(raw)
                .unwrap_or_else(|| panic!("unhandled mcp message type: {}", raw));
            trace!("mcp: {:?} from tile {}", msg, packet.sender);

            match msg {
                McpMessage::SysCall => {
                    self.syscall_server.handle_syscall(packet.sender, &mut reader)
                }
                McpMessage::Quit => {
                    debug!("mcp quit message received");
                    break;
                }
                McpMessage::MutexInit => self.sync_server.mutex_init(packet.sender),
                McpMessage::MutexLock => self.sync_server.mutex_lock(packet.sender, &mut reader),
                McpMessage::MutexUnlock => {
                    self.sync_server.mutex_unlock(packet.sender, &mut reader)
                }
                McpMessage::CondInit => self.sync_server.cond_init(packet.sender),
                McpMessage::CondWait => self.sync_server.cond_wait(packet.sender, &mut reader),
                McpMessage::CondSignal => self.sync_server.cond_signal(packet.sender, &mut reader),
                McpMessage::CondBroadcast => {
                    self.sync_server.cond_broadcast(packet.sender, &mut reader)
                }
                McpMessage::BarrierInit => {
                    self.sync_server.barrier_init(packet.sender, &mut reader)
                }
                McpMessage::BarrierWait => {
                    self.sync_server.barrier_wait(packet.sender, &mut reader)
                }
                McpMessage::UtilizationUpdate => {
                    self.analytical_server.update(reader.get_f64())
                }
                McpMessage::BroadcastCommMapUpdate => {
                    let update = CommMapUpdate::decode(&mut reader);
                    self.broadcast_comm_map_update(update);
                }
                McpMessage::ResetCacheCounters | McpMessage::DisableCacheCounters => {
                    // No memory hierarchy is modeled; honor the round-trip
                    // contract.
                    debug!("mcp: {:?} acked without a cache model", msg);
                    self.ack(packet.sender);
                }
            }
        }
        self.finished.signal();
        info!("mcp finished");
        McpSummary {
            sync: self.sync_server.summary(),
            syscalls: self.syscall_server.handled(),
            utilization_updates: self.analytical_server.updates,
            average_utilization: self.analytical_server.average(),
        }
    }

    fn ack(&self, tile: i32) {
        self.transport.net_send(NetPacket::new(
            PacketType::Response,
            self.mcp_tile() as i32,
            tile,
            0u32.to_le_bytes().to_vec(),
        ));
    }

    /// Retypes the update for the LCPs and sends it to one process at a
    /// time, waiting for that process's ack before moving on.  This
    /// serializes fleet-wide map updates and is the global ordering point.
    fn broadcast_comm_map_update(&self, update: CommMapUpdate) {
        let frame = update.encode(LcpMessage::CommMapUpdateFromMcp as i32);
        let filter = NetMatch::on_types(&[PacketType::Response]);
        let tile = self.tiles.tile(self.mcp_tile());
        for proc in 0..self.config.topology.process_count {
            debug!("comm map broadcast to process {}", proc);
            self.transport.global_send(proc, frame.clone());
            let _ack = tile.network().net_recv(&filter);
        }
    }

    /// Sends a packet to every tile in turn.  Unlike the process broadcast,
    /// deliveries are not acknowledged.
    pub fn broadcast_packet(&self, packet_type: PacketType, data: &[u8]) {
        for tile in 0..self.config.topology.total_tiles {
            self.transport.net_send(NetPacket::new(
                packet_type,
                self.mcp_tile() as i32,
                tile as i32,
                data.to_vec(),
            ));
        }
    }
}

/// Sends Quit to the MCP and blocks until the loop has exited.
pub fn finish(transport: &Transport, config: &SimConfig, finished: &FinishFlag) {
    debug!("sending mcp quit message");
    let mcp_tile = config.topology.mcp_tile() as i32;
    transport.net_send(NetPacket::new(
        PacketType::System,
        mcp_tile,
        mcp_tile,
        WireWriter::new(McpMessage::Quit as i32).finish(),
    ));
    finished.wait();
}
