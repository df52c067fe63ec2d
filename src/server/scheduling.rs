//! Real-time priority for the mix thread
//!
//! The strongest class the OS lets us have is tried first and the first one that
//! sticks wins.  Nothing fails if none of them work, the mix just runs at normal
//! priority (and the load report will show it).
use log::{info, warn};
use std::{fmt, thread, time::Duration};
use thread_priority::*;

use crate::common::{box_error::BoxError, BLOCK_MICROS};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SchedulingTier {
    /// SCHED_DEADLINE with the block period
    Deadline,
    /// round robin real-time at the top priority
    Realtime,
    /// best we could do is raise the normal priority
    Raised,
    Normal,
}

impl fmt::Display for SchedulingTier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            SchedulingTier::Deadline => "deadline",
            SchedulingTier::Realtime => "realtime round robin",
            SchedulingTier::Raised => "raised priority",
            SchedulingTier::Normal => "normal priority",
        };
        write!(f, "{}", name)
    }
}

/// deadline parameters for one block: half the period to do the work
pub fn block_deadline() -> (Duration, Duration, Duration) {
    let period = Duration::from_micros(BLOCK_MICROS as u64);
    (period / 2, period, period)
}

#[cfg(target_os = "linux")]
fn try_deadline() -> bool {
    let (runtime, deadline, period) = block_deadline();
    let priority = ThreadPriority::Deadline {
        runtime,
        deadline,
        period,
        flags: DeadlineFlags::RESET_ON_FORK,
    };
    let policy = ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Deadline);
    match set_thread_priority_and_policy(thread_native_id(), priority, policy) {
        Ok(()) => true,
        Err(e) => {
            warn!("deadline scheduling refused: {:?}", e);
            false
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn try_deadline() -> bool {
    false
}

#[cfg(unix)]
fn try_realtime() -> bool {
    let policy = ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::RoundRobin);
    match set_thread_priority_and_policy(thread_native_id(), ThreadPriority::Max, policy) {
        Ok(()) => true,
        Err(e) => {
            warn!("realtime scheduling refused: {:?}", e);
            false
        }
    }
}

#[cfg(not(unix))]
fn try_realtime() -> bool {
    false
}

/// Promote the calling thread as far as the OS allows.  Call once from the thread
/// itself.
pub fn promote_current_thread() -> SchedulingTier {
    let tier = if try_deadline() {
        SchedulingTier::Deadline
    } else if try_realtime() {
        SchedulingTier::Realtime
    } else if set_current_thread_priority(ThreadPriority::Max).is_ok() {
        SchedulingTier::Raised
    } else {
        SchedulingTier::Normal
    };
    info!("mix thread scheduling: {}", tier);
    tier
}

/// Spawn a named thread that promotes itself before running `body`
pub fn spawn_realtime<F>(name: &str, body: F) -> Result<thread::JoinHandle<()>, BoxError>
where
    F: FnOnce(SchedulingTier) + Send + 'static,
{
    let builder = ThreadBuilder::default().name(name.to_string());
    let handle = builder.spawn(move |_result| {
        let tier = promote_current_thread();
        body(tier);
    })?;
    Ok(handle)
}
