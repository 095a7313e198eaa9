use std::io::{self, Write};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::control::message::WireReader;
use crate::transport::{NetPacket, PacketType, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum SyscallNumber {
    Time = 0,
    Write = 1,
}

/// Marshalling endpoint for syscalls the workload routes through the MCP.
/// Payloads are staged through a fixed scratch buffer; every call is acked
/// with its i64 return value.
pub struct SyscallServer {
    transport: Arc<Transport>,
    mcp_tile: u32,
    scratch: Vec<u8>,
    handled: u64,
}

impl SyscallServer {
    pub fn new(transport: Arc<Transport>, mcp_tile: u32, max_buffer_size: usize) -> Self {
        SyscallServer {
            transport,
            mcp_tile,
            scratch: vec![0; max_buffer_size],
            handled: 0,
        }
    }

    pub fn handle_syscall(&mut self, sender: i32, reader: &mut WireReader) {
        let number = reader.get_i32();
        let number = SyscallNumber::from_i32(number)
            .unwrap_or_else(|| panic!("unknown syscall number: {}", number));
        debug!("syscall {:?} from tile {}", number, sender);
        let ret = match number {
            SyscallNumber::Time => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as i64)
                .unwrap_or(0),
            SyscallNumber::Write => self.handle_write(reader),
        };
        self.handled += 1;
        self.transport.net_send(NetPacket::new(
            PacketType::Response,
            self.mcp_tile as i32,
            sender,
            ret.to_le_bytes().to_vec(),
        ));
    }

    fn handle_write(&mut self, reader: &mut WireReader) -> i64 {
        let fd = reader.get_i32();
        let len = reader.get_u32() as usize;
        assert!(
            len <= self.scratch.len(),
            "syscall payload exceeds scratch buffer"
        );
        let bytes = reader.get_bytes(len);
        self.scratch[..len].copy_from_slice(bytes);
        let written = match fd {
            1 => io::stdout().write(&self.scratch[..len]),
            2 => io::stderr().write(&self.scratch[..len]),
            other => panic!("write syscall to unsupported fd: {}", other),
        };
        written.map(|n| n as i64).unwrap_or(-1)
    }

    pub fn handled(&self) -> u64 {
        self.handled
    }
}
