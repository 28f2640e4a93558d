use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::channel::{Channel, ChannelTable};
use crate::lock;

/// Drives the periodic liveness sweep for one multiplexing socket.
///
/// A dedicated thread wakes on a fixed cadence, snapshots the channel
/// table, withholds heartbeats from non-responsive channels and emits
/// them for everyone else. Sweeps never overlap; stopping is permanent
/// and joined, so no tick runs after `stop` returns.
pub(crate) struct HeartbeatSupervisor {
    stop: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl HeartbeatSupervisor {
    pub fn start(
        socket_id: u64,
        table: ChannelTable,
        interval: Duration,
        debug_interval: Duration,
    ) -> std::io::Result<Self> {
        let stop = Arc::new((Mutex::new(false), Condvar::new()));
        let thread_stop = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name(format!("rpcmux-heartbeat-{socket_id}"))
            .spawn(move || run(socket_id, table, interval, debug_interval, thread_stop))?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Stop the supervisor permanently. Blocks until the thread exits;
    /// an in-flight sweep finishes first.
    pub fn stop(&mut self) {
        let (stop_lock, cvar) = &*self.stop;
        *lock(stop_lock) = true;
        cvar.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for HeartbeatSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    socket_id: u64,
    table: ChannelTable,
    interval: Duration,
    debug_interval: Duration,
    stop: Arc<(Mutex<bool>, Condvar)>,
) {
    let (stop_lock, cvar) = &*stop;
    let mut next_debug = Instant::now() + debug_interval;

    let mut stopped = lock(stop_lock);
    loop {
        let (guard, wait) = cvar
            .wait_timeout(stopped, interval)
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        stopped = guard;
        if *stopped {
            return;
        }
        if !wait.timed_out() {
            // Spurious wakeup.
            continue;
        }

        drop(stopped);
        sweep(socket_id, &table, Instant::now(), &mut next_debug, debug_interval);
        stopped = lock(stop_lock);
        if *stopped {
            return;
        }
    }
}

/// One heartbeat tick over the channel table.
pub(crate) fn sweep(
    socket_id: u64,
    table: &ChannelTable,
    now: Instant,
    next_debug: &mut Instant,
    debug_interval: Duration,
) {
    // Snapshot, then act without the lock: a channel closing itself as a
    // side effect of the sweep must not corrupt the iteration.
    let channels: Vec<Arc<dyn Channel>> = lock(table).values().cloned().collect();

    for channel in &channels {
        if channel.is_non_responsive(now) {
            debug!(
                socket = socket_id,
                channel = channel.id(),
                "withholding heartbeat from non-responsive channel"
            );
        } else {
            channel.send_heartbeat();
        }
    }

    // Throttled diagnostics; never affects routing or liveness.
    if now >= *next_debug {
        *next_debug = now + debug_interval;
        let open = lock(table).len();
        if open > 0 {
            debug!(socket = socket_id, channels = open, "open channel count");
        }
    }
}
