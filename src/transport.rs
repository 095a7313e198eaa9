use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::trace;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::config::Topology;

/// Transport address: one endpoint per tile for typed packets, one raw
/// endpoint per process for its LCP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeId {
    Tile(u32),
    Global(u32),
}

/// Reliable in-order point-to-point frame delivery between nodes.  Senders
/// are shared; each endpoint's receiver is taken exactly once by the loop or
/// tile that owns it.
pub struct Transport {
    senders: HashMap<NodeId, Sender<Vec<u8>>>,
    receivers: Mutex<HashMap<NodeId, Receiver<Vec<u8>>>>,
}

impl Transport {
    pub fn new(topology: &Topology) -> Self {
        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();
        let nodes = (0..topology.total_tiles)
            .map(NodeId::Tile)
            .chain((0..topology.process_count).map(NodeId::Global));
        for node in nodes {
            let (tx, rx) = unbounded();
            senders.insert(node, tx);
            receivers.insert(node, rx);
        }
        Transport {
            senders,
            receivers: Mutex::new(receivers),
        }
    }

    pub fn take_endpoint(&self, node: NodeId) -> Endpoint {
        let rx = self
            .receivers
            .lock()
            .expect("endpoint table lock poisoned")
            .remove(&node)
            .unwrap_or_else(|| panic!("endpoint {:?} already taken", node));
        Endpoint { node, rx }
    }

    fn send_frame(&self, node: NodeId, frame: Vec<u8>) {
        self.senders
            .get(&node)
            .unwrap_or_else(|| panic!("no such transport node: {:?}", node))
            .send(frame)
            .expect("transport send failed: endpoint gone");
    }

    /// Raw control frame to a process's LCP.
    pub fn global_send(&self, proc: u32, frame: Vec<u8>) {
        self.send_frame(NodeId::Global(proc), frame);
    }

    /// Typed packet to the receiver tile's endpoint.
    pub fn net_send(&self, packet: NetPacket) {
        let node = NodeId::Tile(packet.receiver as u32);
        self.send_frame(node, packet.encode());
    }
}

pub struct Endpoint {
    node: NodeId,
    rx: Receiver<Vec<u8>>,
}

impl Endpoint {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn recv(&self) -> Vec<u8> {
        self.rx
            .recv()
            .expect("transport receive failed: channel closed")
    }

    pub fn try_recv(&self) -> Option<Vec<u8>> {
        match self.rx.try_recv() {
            Ok(frame) => Some(frame),
            Err(crossbeam_channel::TryRecvError::Empty) => None,
            Err(crossbeam_channel::TryRecvError::Disconnected) => {
                panic!("transport receive failed: channel closed")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum PacketType {
    Request = 0,
    System = 1,
    Response = 2,
    App = 3,
}

/// On-wire: `{u32 type}{i32 sender}{i32 receiver}{u32 len}{data}`,
/// little-endian.
#[derive(Debug, Clone)]
pub struct NetPacket {
    pub packet_type: PacketType,
    pub sender: i32,
    pub receiver: i32,
    pub data: Vec<u8>,
}

impl NetPacket {
    pub fn new(packet_type: PacketType, sender: i32, receiver: i32, data: Vec<u8>) -> Self {
        NetPacket {
            packet_type,
            sender,
            receiver,
            data,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(16 + self.data.len());
        frame.extend_from_slice(&(self.packet_type as u32).to_le_bytes());
        frame.extend_from_slice(&self.sender.to_le_bytes());
        frame.extend_from_slice(&self.receiver.to_le_bytes());
        frame.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
        frame.extend_from_slice(&self.data);
        frame
    }

    pub fn decode(frame: &[u8]) -> NetPacket {
        assert!(frame.len() >= 16, "malformed packet: truncated header");
        let word = |at: usize| -> [u8; 4] { frame[at..at + 4].try_into().expect("sized above") };
        let packet_type = PacketType::from_u32(u32::from_le_bytes(word(0)))
            .expect("malformed packet: unknown packet type");
        let sender = i32::from_le_bytes(word(4));
        let receiver = i32::from_le_bytes(word(8));
        let len = u32::from_le_bytes(word(12)) as usize;
        assert_eq!(frame.len(), 16 + len, "malformed packet: bad payload length");
        NetPacket {
            packet_type,
            sender,
            receiver,
            data: frame[16..].to_vec(),
        }
    }
}

/// Receive filter; an empty list is a wildcard.
#[derive(Debug, Clone, Default)]
pub struct NetMatch {
    pub types: Vec<PacketType>,
    pub senders: Vec<i32>,
}

impl NetMatch {
    pub fn on_types(types: &[PacketType]) -> Self {
        NetMatch {
            types: types.to_vec(),
            senders: Vec::new(),
        }
    }

    pub fn from_sender(mut self, sender: i32) -> Self {
        self.senders.push(sender);
        self
    }

    fn matches(&self, packet: &NetPacket) -> bool {
        (self.types.is_empty() || self.types.contains(&packet.packet_type))
            && (self.senders.is_empty() || self.senders.contains(&packet.sender))
    }
}

/// Per-tile typed endpoint.  Packets that do not match the current receive
/// filter are parked and rechecked first on the next receive.
pub struct Network {
    tile_id: u32,
    transport: Arc<Transport>,
    endpoint: Endpoint,
    pending: Mutex<VecDeque<NetPacket>>,
}

impl Network {
    pub fn new(tile_id: u32, transport: Arc<Transport>) -> Self {
        let endpoint = transport.take_endpoint(NodeId::Tile(tile_id));
        Network {
            tile_id,
            transport,
            endpoint,
            pending: Mutex::new(VecDeque::new()),
        }
    }

    pub fn tile_id(&self) -> u32 {
        self.tile_id
    }

    pub fn net_send(&self, receiver: i32, packet_type: PacketType, data: Vec<u8>) {
        self.transport.net_send(NetPacket::new(
            packet_type,
            self.tile_id as i32,
            receiver,
            data,
        ));
    }

    /// Blocks until a packet matching the filter arrives.
    pub fn net_recv(&self, filter: &NetMatch) -> NetPacket {
        {
            let mut pending = self.pending.lock().expect("pending queue lock poisoned");
            if let Some(at) = pending.iter().position(|p| filter.matches(p)) {
                return pending.remove(at).expect("position just found");
            }
        }
        loop {
            let packet = NetPacket::decode(&self.endpoint.recv());
            if filter.matches(&packet) {
                return packet;
            }
            trace!(
                "tile {}: deferring {:?} packet from {}",
                self.tile_id,
                packet.packet_type,
                packet.sender
            );
            self.pending
                .lock()
                .expect("pending queue lock poisoned")
                .push_back(packet);
        }
    }

    /// Non-blocking variant of `net_recv`.
    pub fn try_net_recv(&self, filter: &NetMatch) -> Option<NetPacket> {
        {
            let mut pending = self.pending.lock().expect("pending queue lock poisoned");
            if let Some(at) = pending.iter().position(|p| filter.matches(p)) {
                return pending.remove(at);
            }
        }
        while let Some(frame) = self.endpoint.try_recv() {
            let packet = NetPacket::decode(&frame);
            if filter.matches(&packet) {
                return Some(packet);
            }
            self.pending
                .lock()
                .expect("pending queue lock poisoned")
                .push_back(packet);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Topology;

    #[test]
    fn packet_round_trips_through_wire_format() {
        let packet = NetPacket::new(PacketType::Request, 3, 7, vec![1, 2, 3, 4, 5]);
        let decoded = NetPacket::decode(&packet.encode());
        assert_eq!(decoded.packet_type, PacketType::Request);
        assert_eq!(decoded.sender, 3);
        assert_eq!(decoded.receiver, 7);
        assert_eq!(decoded.data, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn non_matching_packets_are_deferred() {
        let topology = Topology::new(4, 1);
        let transport = Arc::new(Transport::new(&topology));
        let net = Network::new(1, transport.clone());

        net.net_send(1, PacketType::App, vec![9]);
        net.net_send(1, PacketType::Response, vec![8]);

        let response = net.net_recv(&NetMatch::on_types(&[PacketType::Response]));
        assert_eq!(response.data, vec![8]);
        // The deferred App packet is delivered on the next receive.
        let app = net.net_recv(&NetMatch::on_types(&[PacketType::App]));
        assert_eq!(app.data, vec![9]);
    }

    #[test]
    fn sender_filter_applies() {
        let topology = Topology::new(4, 1);
        let transport = Arc::new(Transport::new(&topology));
        let net = Network::new(2, transport.clone());

        transport.net_send(NetPacket::new(PacketType::App, 0, 2, vec![0]));
        transport.net_send(NetPacket::new(PacketType::App, 1, 2, vec![1]));

        let from_one = net.net_recv(&NetMatch::on_types(&[PacketType::App]).from_sender(1));
        assert_eq!(from_one.sender, 1);
        let from_zero = net.net_recv(&NetMatch::on_types(&[PacketType::App]));
        assert_eq!(from_zero.sender, 0);
    }

    #[test]
    fn global_frames_reach_the_process_endpoint() {
        let topology = Topology::new(4, 2);
        let transport = Transport::new(&topology);
        let endpoint = transport.take_endpoint(NodeId::Global(1));
        transport.global_send(1, vec![42]);
        assert_eq!(endpoint.recv(), vec![42]);
    }

    #[test]
    #[should_panic(expected = "already taken")]
    fn endpoints_are_taken_once() {
        let topology = Topology::new(4, 1);
        let transport = Transport::new(&topology);
        let _first = transport.take_endpoint(NodeId::Tile(0));
        let _second = transport.take_endpoint(NodeId::Tile(0));
    }
}
