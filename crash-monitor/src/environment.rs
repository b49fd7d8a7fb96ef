/// Facts about the process that decide which monitors may be enabled.
///
/// These are only queried when [`crate::Coordinator::activate_monitors`] is
/// called, changes in between activations are not noticed.
pub trait Environment: Send + Sync {
    /// Whether a debugger is currently attached to the process
    fn is_debugger_attached(&self) -> bool;

    /// Whether something outside of the coordinator's own exception policy
    /// requires that only async signal safe monitors run
    fn requires_async_safety(&self) -> bool {
        false
    }
}

/// The [`Environment`] of the current process
#[derive(Copy, Clone, Debug, Default)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    #[inline]
    fn is_debugger_attached(&self) -> bool {
        is_being_traced()
    }
}

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        fn is_being_traced() -> bool {
            match std::fs::read_to_string("/proc/self/status") {
                Ok(status) => tracer_pid(&status).is_some_and(|pid| pid != 0),
                Err(err) => {
                    log::debug!("unable to read /proc/self/status: {err}");
                    false
                }
            }
        }

        /// Retrieves the pid of the process tracing us, 0 if there is none
        fn tracer_pid(status: &str) -> Option<u32> {
            status
                .lines()
                .find_map(|line| line.strip_prefix("TracerPid:"))
                .and_then(|pid| pid.trim().parse().ok())
        }
    } else if #[cfg(target_os = "windows")] {
        #[inline]
        fn is_being_traced() -> bool {
            // SAFETY: syscall
            unsafe { windows_sys::Win32::System::Diagnostics::Debug::IsDebuggerPresent() != 0 }
        }
    } else {
        // TODO: check for P_TRACED via sysctl(KERN_PROC_PID) on macOS
        #[inline]
        fn is_being_traced() -> bool {
            false
        }
    }
}

#[cfg(all(test, any(target_os = "linux", target_os = "android")))]
mod test {
    use super::tracer_pid;

    #[test]
    fn parses_tracer_pid() {
        let status = "Name:\tcargo\nState:\tR (running)\nTracerPid:\t4242\nUid:\t1000\n";
        assert_eq!(tracer_pid(status), Some(4242));

        let status = "Name:\tcargo\nTracerPid:\t0\n";
        assert_eq!(tracer_pid(status), Some(0));

        assert_eq!(tracer_pid("Name:\tcargo\n"), None);
    }
}
