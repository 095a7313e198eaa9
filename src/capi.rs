//! User-level API presented to instrumented workloads.  Every entry resolves
//! the calling OS thread to its simulated tile and talks to the control
//! plane over the simulated network; there are no global singletons, the
//! simulator context is passed explicitly.

use std::sync::Arc;

use crate::control::message::{McpMessage, WireWriter};
use crate::perf::instruction::InstructionType;
use crate::sim::top::Simulator;
use crate::tile::Tile;
use crate::transport::{NetMatch, NetPacket, PacketType};

fn current_tile(sim: &Simulator) -> Arc<Tile> {
    sim.tiles()
        .current_tile()
        .expect("calling thread is not bound to a tile")
}

/// Round trip to the MCP; blocks until the response packet arrives.
fn mcp_call(sim: &Simulator, packet_type: PacketType, data: Vec<u8>) -> NetPacket {
    let tile = current_tile(sim);
    let mcp_tile = sim.config().topology.mcp_tile() as i32;
    tile.network().net_send(mcp_tile, packet_type, data);
    tile.network()
        .net_recv(&NetMatch::on_types(&[PacketType::Response]).from_sender(mcp_tile))
}

fn queue_sync_instruction(sim: &Simulator) {
    current_tile(sim)
        .queue_intertile_instruction(InstructionType::Sync, sim.config().perf.sync_cost);
}

/// Registers the calling OS thread as the primary simulated thread.
pub fn initialize_thread(sim: &Simulator) -> u32 {
    sim.tiles().initialize_thread()
}

/// Binds this thread's tile to the user-visible endpoint `rank`.  The
/// mapping is installed fleet-wide through the MCP broadcast path; pair with
/// a barrier before the first send so every process has observed it.
pub fn capi_initialize(sim: &Simulator, rank: i32) {
    let tile = current_tile(sim);
    let update = crate::control::message::CommMapUpdate {
        comm_id: rank,
        tile_id: tile.id() as i32,
    };
    let data = update.encode(McpMessage::BroadcastCommMapUpdate as i32);
    let mcp_tile = sim.config().topology.mcp_tile() as i32;
    tile.network().net_send(mcp_tile, PacketType::Request, data);
}

/// The endpoint bound to the calling thread, if any.
pub fn capi_rank(sim: &Simulator) -> Option<i32> {
    let tile = current_tile(sim);
    sim.config().comm_id_for_tile(tile.id() as i32)
}

/// Blocking send to another endpoint over the simulated network.
pub fn message_send_w(sim: &Simulator, send_endpoint: i32, receive_endpoint: i32, buffer: &[u8]) {
    let tile = current_tile(sim);
    assert_eq!(
        sim.config().tile_for_comm_id(send_endpoint),
        Some(tile.id() as i32),
        "send endpoint {} does not belong to the calling thread",
        send_endpoint
    );
    let dest = sim
        .config()
        .tile_for_comm_id(receive_endpoint)
        .unwrap_or_else(|| panic!("unknown receive endpoint: {}", receive_endpoint));
    tile.network()
        .net_send(dest, PacketType::App, buffer.to_vec());
}

/// Blocking receive; `buffer` must match the sent size exactly.
pub fn message_receive_w(
    sim: &Simulator,
    send_endpoint: i32,
    receive_endpoint: i32,
    buffer: &mut [u8],
) {
    let tile = current_tile(sim);
    assert_eq!(
        sim.config().tile_for_comm_id(receive_endpoint),
        Some(tile.id() as i32),
        "receive endpoint {} does not belong to the calling thread",
        receive_endpoint
    );
    let src = sim
        .config()
        .tile_for_comm_id(send_endpoint)
        .unwrap_or_else(|| panic!("unknown send endpoint: {}", send_endpoint));
    let packet = tile
        .network()
        .net_recv(&NetMatch::on_types(&[PacketType::App]).from_sender(src));
    assert_eq!(
        packet.data.len(),
        buffer.len(),
        "message size mismatch on receive"
    );
    buffer.copy_from_slice(&packet.data);
    tile.queue_intertile_instruction(InstructionType::Recv, sim.config().perf.recv_cost);
}

/// Asks the master to place and start a registered entry; returns the tile
/// the new thread runs on.
pub fn spawn_thread(sim: &Simulator, func_id: i32, arg: u64) -> i32 {
    current_tile(sim)
        .queue_intertile_instruction(InstructionType::Spawn, sim.config().perf.spawn_cost);
    sim.thread_manager().spawn_thread(func_id, arg)
}

/// Blocks until the thread on `tile` exits; returns its end time.
pub fn join_thread(sim: &Simulator, tile: i32) -> u64 {
    sim.thread_manager().join_thread(tile)
}

// -- sync primitives, thin clients of the MCP sync server

pub fn mutex_init(sim: &Simulator) -> u32 {
    let reply = mcp_call(
        sim,
        PacketType::Request,
        WireWriter::new(McpMessage::MutexInit as i32).finish(),
    );
    u32::from_le_bytes(reply.data[..4].try_into().expect("handle reply"))
}

pub fn mutex_lock(sim: &Simulator, mutex: u32) {
    queue_sync_instruction(sim);
    let mut w = WireWriter::new(McpMessage::MutexLock as i32);
    w.put_u32(mutex);
    mcp_call(sim, PacketType::Request, w.finish());
}

pub fn mutex_unlock(sim: &Simulator, mutex: u32) {
    queue_sync_instruction(sim);
    let mut w = WireWriter::new(McpMessage::MutexUnlock as i32);
    w.put_u32(mutex);
    mcp_call(sim, PacketType::Request, w.finish());
}

pub fn cond_init(sim: &Simulator) -> u32 {
    let reply = mcp_call(
        sim,
        PacketType::Request,
        WireWriter::new(McpMessage::CondInit as i32).finish(),
    );
    u32::from_le_bytes(reply.data[..4].try_into().expect("handle reply"))
}

/// Atomically releases `mutex` and parks on `cond`; returns with the mutex
/// reacquired.
pub fn cond_wait(sim: &Simulator, cond: u32, mutex: u32) {
    queue_sync_instruction(sim);
    let mut w = WireWriter::new(McpMessage::CondWait as i32);
    w.put_u32(cond);
    w.put_u32(mutex);
    mcp_call(sim, PacketType::Request, w.finish());
}

pub fn cond_signal(sim: &Simulator, cond: u32) {
    queue_sync_instruction(sim);
    let mut w = WireWriter::new(McpMessage::CondSignal as i32);
    w.put_u32(cond);
    mcp_call(sim, PacketType::Request, w.finish());
}

pub fn cond_broadcast(sim: &Simulator, cond: u32) {
    queue_sync_instruction(sim);
    let mut w = WireWriter::new(McpMessage::CondBroadcast as i32);
    w.put_u32(cond);
    mcp_call(sim, PacketType::Request, w.finish());
}

pub fn barrier_init(sim: &Simulator, count: u32) -> u32 {
    let mut w = WireWriter::new(McpMessage::BarrierInit as i32);
    w.put_u32(count);
    let reply = mcp_call(sim, PacketType::Request, w.finish());
    u32::from_le_bytes(reply.data[..4].try_into().expect("handle reply"))
}

pub fn barrier_wait(sim: &Simulator, barrier: u32) {
    queue_sync_instruction(sim);
    let mut w = WireWriter::new(McpMessage::BarrierWait as i32);
    w.put_u32(barrier);
    mcp_call(sim, PacketType::Request, w.finish());
}

// -- model toggles, gated by an application-wide barrier so every process
//    observes the same transition point

/// Creates the barrier behind the model toggles; call once from the primary
/// thread before any worker reaches `enable_models`.
pub fn init_models(sim: &Simulator) {
    let target = sim.config().topology.app_tile_count();
    let handle = barrier_init(sim, target);
    sim.set_models_barrier(handle);
}

fn models_barrier(sim: &Simulator) -> u32 {
    sim.models_barrier()
        .expect("models barrier not initialized; call init_models first")
}

fn toggle_process_models(sim: &Simulator, toggle: impl Fn(u32)) {
    let barrier = models_barrier(sim);
    barrier_wait(sim, barrier);
    let tile = current_tile(sim);
    let topology = sim.config().topology;
    let proc = topology.process_of_tile(tile.id());
    let first_app = topology.tile_range(proc).find(|&t| topology.is_app_tile(t));
    if first_app == Some(tile.id()) {
        toggle(proc);
    }
    barrier_wait(sim, barrier);
}

pub fn enable_models(sim: &Simulator) {
    toggle_process_models(sim, |proc| sim.tiles().enable_models_for_process(proc));
}

pub fn disable_models(sim: &Simulator) {
    toggle_process_models(sim, |proc| sim.tiles().disable_models_for_process(proc));
}

pub fn reset_models(sim: &Simulator) {
    toggle_process_models(sim, |proc| sim.tiles().reset_models_for_process(proc));
}

// -- cache counter round trips; kept for workloads that expect the acks

pub fn reset_cache_counters(sim: &Simulator) {
    let reply = mcp_call(
        sim,
        PacketType::System,
        WireWriter::new(McpMessage::ResetCacheCounters as i32).finish(),
    );
    assert_eq!(reply.data.len(), 4, "malformed cache counter ack");
}

pub fn disable_cache_counters(sim: &Simulator) {
    let reply = mcp_call(
        sim,
        PacketType::System,
        WireWriter::new(McpMessage::DisableCacheCounters as i32).finish(),
    );
    assert_eq!(reply.data.len(), 4, "malformed cache counter ack");
}
