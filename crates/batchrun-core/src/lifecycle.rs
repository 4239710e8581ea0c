//! Teardown guard: no tracked process outlives its pool.

use std::thread;

use tracing::{debug, info};

use crate::pool::ProcessPool;
use crate::process::Launcher;

impl<L: Launcher> ProcessPool<L> {
    /// Wait for every tracked process to exit.
    ///
    /// Waits out a drain loop owned by another caller first, then runs a full
    /// drain over whatever is left. Repeats until the pool is idle and empty,
    /// so a drain claimed by someone else between the two steps cannot leave
    /// handles behind. Calling it on an empty pool returns at once.
    pub fn shutdown(&self) {
        loop {
            if self.is_draining() {
                debug!("Shutdown waiting for in-progress drain");
                while self.is_draining() {
                    thread::sleep(self.poll_interval());
                }
            }

            let outstanding = self.active_count();
            if outstanding == 0 {
                return;
            }
            info!(outstanding, "Waiting for outstanding processes before shutdown");
            self.drain(true);
        }
    }
}

impl<L: Launcher> Drop for ProcessPool<L> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
