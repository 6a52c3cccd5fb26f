//! Scoped suppression of core dumps while key material is live in
//! memory. Only the driver ever constructs one of these - the spec calls
//! this out as process-wide global state that must not be toggled from
//! more than one place concurrently.

#[cfg(unix)]
mod imp {
    use tracing::warn;

    /// RAII guard: disables `RLIMIT_CORE` (both soft and hard limit set to
    /// zero) on construction, restores whatever limit was previously in
    /// effect on drop. A no-op `setrlimit` failure is logged, not fatal -
    /// a backup that can't suppress core dumps should still run, just with
    /// a weaker guarantee about secrets never hitting disk via a crash
    /// dump.
    pub struct RlimitCoreGuard {
        previous: Option<libc::rlimit>,
    }

    impl RlimitCoreGuard {
        pub fn disable() -> Self {
            let mut current = libc::rlimit {
                rlim_cur: 0,
                rlim_max: 0,
            };
            let got_current = unsafe { libc::getrlimit(libc::RLIMIT_CORE, &mut current) } == 0;

            let zero = libc::rlimit {
                rlim_cur: 0,
                rlim_max: 0,
            };
            if unsafe { libc::setrlimit(libc::RLIMIT_CORE, &zero) } != 0 {
                warn!("rlimit: failed to disable core dumps, continuing without that guarantee");
                return Self { previous: None };
            }

            Self {
                previous: got_current.then_some(current),
            }
        }
    }

    impl Drop for RlimitCoreGuard {
        fn drop(&mut self) {
            if let Some(previous) = self.previous {
                unsafe {
                    libc::setrlimit(libc::RLIMIT_CORE, &previous);
                }
            }
        }
    }
}

#[cfg(not(unix))]
mod imp {
    /// Non-Unix targets have no `RLIMIT_CORE` concept; this is a no-op
    /// that still gives callers a value to hold for the right scope.
    pub struct RlimitCoreGuard;

    impl RlimitCoreGuard {
        pub fn disable() -> Self {
            Self
        }
    }
}

pub use imp::RlimitCoreGuard;

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn disable_then_drop_does_not_panic() {
        let guard = RlimitCoreGuard::disable();
        drop(guard);
    }
}
