use std::collections::VecDeque;
use std::sync::Arc;

use log::debug;
use serde::Serialize;

use crate::control::message::WireReader;
use crate::transport::{NetPacket, PacketType, Transport};

struct SimMutex {
    owner: Option<i32>,
    waiters: VecDeque<i32>,
}

struct SimCond {
    /// Waiting tile together with the mutex it must reacquire.
    waiters: VecDeque<(i32, u32)>,
}

struct SimBarrier {
    target: u32,
    arrived: u32,
    waiters: VecDeque<i32>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SyncSummary {
    pub mutexes: u64,
    pub conds: u64,
    pub barriers: u64,
    pub lock_acquisitions: u64,
    pub contended_locks: u64,
    pub barrier_releases: u64,
}

/// Owns the mutex/cond/barrier state for the whole fleet.  Only the MCP
/// thread mutates it, so the state machines themselves need no locking;
/// replies go out as `Response` packets to the requester's tile.
pub struct SyncServer {
    transport: Arc<Transport>,
    mcp_tile: u32,
    mutexes: Vec<SimMutex>,
    conds: Vec<SimCond>,
    barriers: Vec<SimBarrier>,
    summary: SyncSummary,
}

impl SyncServer {
    pub fn new(transport: Arc<Transport>, mcp_tile: u32) -> Self {
        SyncServer {
            transport,
            mcp_tile,
            mutexes: Vec::new(),
            conds: Vec::new(),
            barriers: Vec::new(),
            summary: SyncSummary::default(),
        }
    }

    /// Acks carry a single u32: the fresh handle for the init operations,
    /// zero otherwise.
    fn reply(&self, tile: i32, value: u32) {
        self.transport.net_send(NetPacket::new(
            PacketType::Response,
            self.mcp_tile as i32,
            tile,
            value.to_le_bytes().to_vec(),
        ));
    }

    // -- mutex

    pub fn mutex_init(&mut self, sender: i32) {
        let handle = self.mutexes.len() as u32;
        self.mutexes.push(SimMutex {
            owner: None,
            waiters: VecDeque::new(),
        });
        self.summary.mutexes += 1;
        debug!("mutex {} created for tile {}", handle, sender);
        self.reply(sender, handle);
    }

    fn mutex(&mut self, handle: u32) -> &mut SimMutex {
        self.mutexes
            .get_mut(handle as usize)
            .unwrap_or_else(|| panic!("unknown mutex handle: {}", handle))
    }

    pub fn mutex_lock(&mut self, sender: i32, reader: &mut WireReader) {
        let handle = reader.get_u32();
        let mutex = self.mutex(handle);
        if mutex.owner.is_none() {
            mutex.owner = Some(sender);
            self.summary.lock_acquisitions += 1;
            self.reply(sender, 0);
        } else {
            mutex.waiters.push_back(sender);
            self.summary.contended_locks += 1;
        }
    }

    pub fn mutex_unlock(&mut self, sender: i32, reader: &mut WireReader) {
        let handle = reader.get_u32();
        self.release_mutex(handle, sender);
        self.reply(sender, 0);
    }

    /// Ownership transfer without the unlocker's ack; shared with the
    /// condition-variable wait path.
    fn release_mutex(&mut self, handle: u32, sender: i32) {
        let mutex = self.mutex(handle);
        assert_eq!(
            mutex.owner,
            Some(sender),
            "mutex {} unlocked by tile {} which does not own it",
            handle,
            sender
        );
        match mutex.waiters.pop_front() {
            Some(next) => {
                mutex.owner = Some(next);
                self.summary.lock_acquisitions += 1;
                self.reply(next, 0);
            }
            None => mutex.owner = None,
        }
    }

    /// Hands the mutex to a woken waiter, or parks it on the mutex queue.
    fn reacquire_mutex(&mut self, handle: u32, waiter: i32) {
        let mutex = self.mutex(handle);
        if mutex.owner.is_none() {
            mutex.owner = Some(waiter);
            self.summary.lock_acquisitions += 1;
            self.reply(waiter, 0);
        } else {
            mutex.waiters.push_back(waiter);
            self.summary.contended_locks += 1;
        }
    }

    // -- condition variable

    pub fn cond_init(&mut self, sender: i32) {
        let handle = self.conds.len() as u32;
        self.conds.push(SimCond {
            waiters: VecDeque::new(),
        });
        self.summary.conds += 1;
        self.reply(sender, handle);
    }

    fn cond(&mut self, handle: u32) -> &mut SimCond {
        self.conds
            .get_mut(handle as usize)
            .unwrap_or_else(|| panic!("unknown cond handle: {}", handle))
    }

    pub fn cond_wait(&mut self, sender: i32, reader: &mut WireReader) {
        let cond_handle = reader.get_u32();
        let mutex_handle = reader.get_u32();
        self.cond(cond_handle); // validate before mutating the mutex
        self.release_mutex(mutex_handle, sender);
        self.cond(cond_handle).waiters.push_back((sender, mutex_handle));
        // No reply: the waiter sleeps until signaled and the mutex is back.
    }

    pub fn cond_signal(&mut self, sender: i32, reader: &mut WireReader) {
        let handle = reader.get_u32();
        if let Some((waiter, mutex_handle)) = self.cond(handle).waiters.pop_front() {
            self.reacquire_mutex(mutex_handle, waiter);
        }
        self.reply(sender, 0);
    }

    pub fn cond_broadcast(&mut self, sender: i32, reader: &mut WireReader) {
        let handle = reader.get_u32();
        let woken: Vec<_> = self.cond(handle).waiters.drain(..).collect();
        for (waiter, mutex_handle) in woken {
            self.reacquire_mutex(mutex_handle, waiter);
        }
        self.reply(sender, 0);
    }

    // -- barrier

    pub fn barrier_init(&mut self, sender: i32, reader: &mut WireReader) {
        let target = reader.get_u32();
        assert!(target > 0, "barrier target must be > 0");
        let handle = self.barriers.len() as u32;
        self.barriers.push(SimBarrier {
            target,
            arrived: 0,
            waiters: VecDeque::new(),
        });
        self.summary.barriers += 1;
        self.reply(sender, handle);
    }

    pub fn barrier_wait(&mut self, sender: i32, reader: &mut WireReader) {
        let handle = reader.get_u32();
        let barrier = self
            .barriers
            .get_mut(handle as usize)
            .unwrap_or_else(|| panic!("unknown barrier handle: {}", handle));
        barrier.arrived += 1;
        barrier.waiters.push_back(sender);
        if barrier.arrived == barrier.target {
            let released: Vec<_> = barrier.waiters.drain(..).collect();
            barrier.arrived = 0;
            self.summary.barrier_releases += 1;
            for tile in released {
                self.reply(tile, 0);
            }
        }
    }

    pub fn summary(&self) -> SyncSummary {
        self.summary
    }
}
