//! Cooperative thread-priority hint for the dispatcher thread.

/// Ask the OS to favor the current thread.
///
/// The dispatcher serializes every control message in the driver, so it runs
/// slightly above default priority where the platform allows it. Levels map
/// to real-time policies on Linux and QoS classes on macOS; elsewhere this is
/// a no-op. Failures are silent: elevated scheduling classes need privileges
/// the embedding process may not have, and the dispatcher is correct without
/// them.
pub fn set_thread_priority(priority: i32) {
    #[cfg(target_os = "linux")]
    {
        use libc::{
            pthread_self, pthread_setschedparam, sched_param, SCHED_FIFO, SCHED_OTHER, SCHED_RR,
        };
        use std::mem;

        let (policy, sched_priority) = if priority >= 3 {
            (SCHED_FIFO, 90)
        } else if priority == 2 {
            (SCHED_FIFO, 70)
        } else if priority == 1 {
            (SCHED_RR, 30)
        } else {
            (SCHED_OTHER, 0)
        };

        unsafe {
            let mut param: sched_param = mem::zeroed();
            param.sched_priority = sched_priority;
            let thread = pthread_self();
            let _ = pthread_setschedparam(thread, policy, &param);
        }
    }
    #[cfg(target_os = "macos")]
    {
        // macOS has no numeric thread priorities; map levels to QoS classes.
        const QOS_CLASS_USER_INITIATED: u32 = 0x19;
        const QOS_CLASS_UTILITY: u32 = 0x15;
        const QOS_CLASS_BACKGROUND: u32 = 0x09;

        let qos_class = if priority >= 2 {
            QOS_CLASS_USER_INITIATED
        } else if priority == 1 {
            QOS_CLASS_UTILITY
        } else {
            QOS_CLASS_BACKGROUND
        };

        unsafe {
            extern "C" {
                fn pthread_set_qos_class_self_np(qos_class: u32, relative_priority: i32) -> i32;
            }
            let _ = pthread_set_qos_class_self_np(qos_class, 0);
        }
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        let _ = priority;
    }
}
