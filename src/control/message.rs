use num_derive::FromPrimitive;

/// Control messages dispatched by the per-process LCP loop.  The wire form
/// is `{i32 msg_type}{payload}`, little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum LcpMessage {
    Quit = 0,
    CommIdUpdate = 1,
    SimulatorFinished = 2,
    SimulatorFinishedAck = 3,
    ThreadSpawnRequestFromRequester = 4,
    ThreadSpawnRequestFromMaster = 5,
    ThreadSpawnReplyFromSlave = 6,
    ThreadExit = 7,
    ThreadJoinRequest = 8,
    /// The retyped form of `McpMessage::BroadcastCommMapUpdate`: installs the
    /// mapping and acks the MCP, unlike the ack-less direct `CommIdUpdate`.
    CommMapUpdateFromMcp = 9,
}

/// Requests served by the global MCP loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum McpMessage {
    SysCall = 0,
    Quit = 1,
    MutexInit = 2,
    MutexLock = 3,
    MutexUnlock = 4,
    CondInit = 5,
    CondWait = 6,
    CondSignal = 7,
    CondBroadcast = 8,
    BarrierInit = 9,
    BarrierWait = 10,
    UtilizationUpdate = 11,
    BroadcastCommMapUpdate = 12,
    ResetCacheCounters = 13,
    DisableCacheCounters = 14,
}

/// Little-endian payload writer.  Every message starts with its i32 type.
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new(msg_type: i32) -> Self {
        let mut writer = WireWriter { buf: Vec::new() };
        writer.put_i32(msg_type);
        writer
    }

    pub fn put_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Little-endian payload reader; short reads are malformed payloads and
/// fatal.
pub struct WireReader<'a> {
    buf: &'a [u8],
    at: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        WireReader { buf, at: 0 }
    }

    fn take(&mut self, n: usize) -> &'a [u8] {
        assert!(self.at + n <= self.buf.len(), "malformed payload: short read");
        let slice = &self.buf[self.at..self.at + n];
        self.at += n;
        slice
    }

    pub fn get_i32(&mut self) -> i32 {
        i32::from_le_bytes(self.take(4).try_into().expect("sized take"))
    }

    pub fn get_u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take(4).try_into().expect("sized take"))
    }

    pub fn get_i64(&mut self) -> i64 {
        i64::from_le_bytes(self.take(8).try_into().expect("sized take"))
    }

    pub fn get_u64(&mut self) -> u64 {
        u64::from_le_bytes(self.take(8).try_into().expect("sized take"))
    }

    pub fn get_f64(&mut self) -> f64 {
        f64::from_le_bytes(self.take(8).try_into().expect("sized take"))
    }

    pub fn get_bytes(&mut self, n: usize) -> &'a [u8] {
        self.take(n)
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommMapUpdate {
    pub comm_id: i32,
    pub tile_id: i32,
}

impl CommMapUpdate {
    pub fn encode(&self, msg_type: i32) -> Vec<u8> {
        let mut w = WireWriter::new(msg_type);
        w.put_i32(self.comm_id);
        w.put_i32(self.tile_id);
        w.finish()
    }

    pub fn decode(reader: &mut WireReader) -> Self {
        CommMapUpdate {
            comm_id: reader.get_i32(),
            tile_id: reader.get_i32(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadSpawnRequest {
    pub requester: i32,
    /// Tile the master picked; -1 until assigned.
    pub destination: i32,
    pub func_id: i32,
    pub arg: u64,
    /// Requester's cycle count at the time of the spawn; seeds the spawned
    /// thread's clock.
    pub start_time: u64,
}

impl ThreadSpawnRequest {
    pub fn encode(&self, msg_type: LcpMessage) -> Vec<u8> {
        let mut w = WireWriter::new(msg_type as i32);
        w.put_i32(self.requester);
        w.put_i32(self.destination);
        w.put_i32(self.func_id);
        w.put_u64(self.arg);
        w.put_u64(self.start_time);
        w.finish()
    }

    pub fn decode(reader: &mut WireReader) -> Self {
        ThreadSpawnRequest {
            requester: reader.get_i32(),
            destination: reader.get_i32(),
            func_id: reader.get_i32(),
            arg: reader.get_u64(),
            start_time: reader.get_u64(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadJoinRequest {
    pub requester: i32,
    pub target: i32,
}

impl ThreadJoinRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::new(LcpMessage::ThreadJoinRequest as i32);
        w.put_i32(self.requester);
        w.put_i32(self.target);
        w.finish()
    }

    pub fn decode(reader: &mut WireReader) -> Self {
        ThreadJoinRequest {
            requester: reader.get_i32(),
            target: reader.get_i32(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_request_round_trips() {
        let req = ThreadSpawnRequest {
            requester: 1,
            destination: -1,
            func_id: 3,
            arg: 0xdead_beef,
            start_time: 1234,
        };
        let frame = req.encode(LcpMessage::ThreadSpawnRequestFromRequester);
        let mut reader = WireReader::new(&frame);
        assert_eq!(
            reader.get_i32(),
            LcpMessage::ThreadSpawnRequestFromRequester as i32
        );
        assert_eq!(ThreadSpawnRequest::decode(&mut reader), req);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    #[should_panic(expected = "short read")]
    fn short_payload_is_fatal() {
        let mut reader = WireReader::new(&[1, 2]);
        reader.get_i32();
    }
}
