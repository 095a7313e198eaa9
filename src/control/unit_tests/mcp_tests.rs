use std::sync::Arc;

use crate::config::SimConfig;
use crate::control::mcp::Mcp;
use crate::control::message::{LcpMessage, McpMessage, WireReader, WireWriter};
use crate::control::FinishFlag;
use crate::tile::TileManager;
use crate::transport::{NetMatch, PacketType, Transport};

#[test]
fn core_broadcast_reaches_every_tile_unacked() {
    let config = Arc::new(SimConfig::for_testing(4, 1));
    let transport = Arc::new(Transport::new(&config.topology));
    let tiles = Arc::new(TileManager::new(config.clone(), &transport));
    let mcp = Mcp::new(
        config.clone(),
        transport,
        tiles.clone(),
        Arc::new(FinishFlag::new()),
    );

    let data = WireWriter::new(McpMessage::ResetCacheCounters as i32).finish();
    mcp.broadcast_packet(PacketType::System, &data);

    let filter = NetMatch::on_types(&[PacketType::System]);
    for tile in tiles.tiles() {
        let packet = tile
            .network()
            .try_net_recv(&filter)
            .expect("broadcast delivery");
        assert_eq!(packet.sender, config.topology.mcp_tile() as i32);
        let mut reader = WireReader::new(&packet.data);
        assert_eq!(reader.get_i32(), McpMessage::ResetCacheCounters as i32);
    }
}

#[test]
fn message_enums_survive_the_wire() {
    use num_traits::FromPrimitive;

    let frame = WireWriter::new(McpMessage::BarrierWait as i32).finish();
    let mut reader = WireReader::new(&frame);
    assert_eq!(
        McpMessage::from_i32(reader.get_i32()),
        Some(McpMessage::BarrierWait)
    );
    assert_eq!(McpMessage::from_i32(99), None);
    assert_eq!(
        LcpMessage::from_i32(LcpMessage::ThreadExit as i32),
        Some(LcpMessage::ThreadExit)
    );
    assert_eq!(LcpMessage::from_i32(-1), None);
}
