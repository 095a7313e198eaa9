pub mod lcp;
pub mod mcp;
pub mod message;
pub mod sync_server;
pub mod syscall_server;
pub mod thread_manager;

#[cfg(test)]
mod unit_tests;

use std::sync::{Condvar, Mutex};

/// Signaled by a control loop when it observes its Quit message, so
/// `finish()` can block instead of busy-yielding.
pub struct FinishFlag {
    state: Mutex<bool>,
    cond: Condvar,
}

impl FinishFlag {
    pub fn new() -> Self {
        FinishFlag {
            state: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    pub fn signal(&self) {
        let mut done = self.state.lock().expect("finish flag lock poisoned");
        *done = true;
        self.cond.notify_all();
    }

    pub fn wait(&self) {
        let mut done = self.state.lock().expect("finish flag lock poisoned");
        while !*done {
            done = self.cond.wait(done).expect("finish flag lock poisoned");
        }
    }
}

impl Default for FinishFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts the simulator-finished acks from the other processes.
pub struct ShutdownState {
    remaining: Mutex<u32>,
    cond: Condvar,
}

impl ShutdownState {
    pub fn new(outstanding: u32) -> Self {
        ShutdownState {
            remaining: Mutex::new(outstanding),
            cond: Condvar::new(),
        }
    }

    pub fn process_done(&self) {
        let mut remaining = self.remaining.lock().expect("shutdown lock poisoned");
        assert!(*remaining > 0, "more finish acks than processes");
        *remaining -= 1;
        if *remaining == 0 {
            self.cond.notify_all();
        }
    }

    pub fn wait_all(&self) {
        let mut remaining = self.remaining.lock().expect("shutdown lock poisoned");
        while *remaining > 0 {
            remaining = self.cond.wait(remaining).expect("shutdown lock poisoned");
        }
    }
}

pub use lcp::Lcp;
pub use mcp::{Mcp, McpSummary};
pub use message::{LcpMessage, McpMessage};
pub use sync_server::{SyncServer, SyncSummary};
pub use syscall_server::SyscallServer;
pub use thread_manager::{ThreadEntry, ThreadManager};
