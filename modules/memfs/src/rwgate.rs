use std::sync::{Condvar, Mutex};

/// A manually acquired/released reader-writer gate: any number of shared
/// holders, or exactly one exclusive holder, never both. Unlike a plain
/// `RwLock`, acquire and release are separate calls with no guard tying
/// them together — which is exactly the shape [`vfs_core::FileOps`]'s
/// `exlock`/`exunlock`/`shlock`/`shunlock` hooks need, since the core calls
/// them as two independent dispatch steps bracketing a driver callout
/// rather than handing the driver a scope to hold a guard across.
pub struct RwGate {
    // > 0: that many shared holders. -1: one exclusive holder. 0: free.
    state: Mutex<i32>,
    idle: Condvar,
}

impl RwGate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(0),
            idle: Condvar::new(),
        }
    }

    pub fn acquire_shared(&self) {
        let mut state = self.state.lock().unwrap();
        while *state < 0 {
            state = self.idle.wait(state).unwrap();
        }
        *state += 1;
    }

    pub fn release_shared(&self) {
        let mut state = self.state.lock().unwrap();
        *state -= 1;
        if *state == 0 {
            self.idle.notify_all();
        }
    }

    pub fn acquire_exclusive(&self) {
        let mut state = self.state.lock().unwrap();
        while *state != 0 {
            state = self.idle.wait(state).unwrap();
        }
        *state = -1;
    }

    pub fn release_exclusive(&self) {
        let mut state = self.state.lock().unwrap();
        *state = 0;
        self.idle.notify_all();
    }
}

impl Default for RwGate {
    fn default() -> Self {
        Self::new()
    }
}
