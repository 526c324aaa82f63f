// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
// Priority setup for the real-time render callback thread.
use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{info, warn};

const DEFAULT_CALLBACK_THREAD_PRIORITY: u8 = 70;

/// Priority for the render callback thread, overridable with
/// `LOOPTRACK_THREAD_PRIORITY` (0-99).
pub fn callback_thread_priority() -> ThreadPriority {
    std::env::var("LOOPTRACK_THREAD_PRIORITY")
        .ok()
        .and_then(|v| v.parse::<u8>().ok())
        .filter(|n| *n < 100)
        .and_then(|n| ThreadPriorityValue::try_from(n).ok())
        .or_else(|| ThreadPriorityValue::try_from(DEFAULT_CALLBACK_THREAD_PRIORITY).ok())
        .map(ThreadPriority::Crossplatform)
        .unwrap_or(ThreadPriority::Max)
}

/// Real-time scheduling is on unless `LOOPTRACK_DISABLE_RT_AUDIO` is set to a truthy value.
pub fn rt_audio_enabled() -> bool {
    !std::env::var("LOOPTRACK_DISABLE_RT_AUDIO")
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

/// Raises the priority of the calling thread once. Meant to be called from
/// inside the device callback, which runs on a thread the backend owns.
pub fn configure_callback_thread(priority: ThreadPriority, rt_audio: bool, done: &mut bool) {
    if *done {
        return;
    }
    *done = true;

    if let Err(e) = set_current_thread_priority(priority) {
        warn!(error = ?e, "Failed to raise render thread priority");
    }

    #[cfg(unix)]
    if rt_audio {
        use thread_priority::unix::{
            set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
            ThreadSchedulePolicy,
        };
        match set_thread_priority_and_policy(
            thread_native_id(),
            priority,
            ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
        ) {
            Ok(()) => info!("Enabled SCHED_FIFO for render thread"),
            Err(e) => warn!(error = ?e, "Failed to enable SCHED_FIFO for render thread"),
        }
    }

    #[cfg(not(unix))]
    let _ = rt_audio;
}
