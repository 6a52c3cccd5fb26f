//! Process-wide random byte source used for salts, IV padding, and
//! `SecureBuffer` scrub material.
//!
//! Mirrors the original's degradation chain (CSPRNG -> `/dev/urandom` ->
//! last-resort) but never aborts the process the way the C implementation
//! did on total failure: the spec asks for a graceful low-grade fallback
//! with a loud warning instead, since a backup tool aborting mid-run is
//! worse than one that salts weakly once in a blue moon.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

/// Set the first (and only the first) time the low-grade fallback fires,
/// so callers that care (the driver, mostly) can surface it once instead
/// of on every single random pull.
static DEGRADED: AtomicBool = AtomicBool::new(false);

thread_local! {
    static FALLBACK_STATE: Cell<u64> = Cell::new(0x9e3779b97f4a7c15);
}

/// True if this process has ever fallen back to the low-grade generator.
pub fn is_degraded() -> bool {
    DEGRADED.load(Ordering::Relaxed)
}

/// Fill `dst` with random bytes, trying strong sources first.
pub fn random_bytes(dst: &mut [u8]) {
    if getrandom::getrandom(dst).is_ok() {
        return;
    }
    if fill_from_dev_urandom(dst) {
        return;
    }
    fill_low_grade(dst);
}

pub fn random_byte() -> u8 {
    let mut b = [0u8; 1];
    random_bytes(&mut b);
    b[0]
}

#[cfg(unix)]
fn fill_from_dev_urandom(dst: &mut [u8]) -> bool {
    use std::io::Read;
    match std::fs::File::open("/dev/urandom") {
        Ok(mut f) => f.read_exact(dst).is_ok(),
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn fill_from_dev_urandom(_dst: &mut [u8]) -> bool {
    false
}

/// Last-resort xorshift64* stream, seeded from whatever entropy the
/// process startup environment gives us (time, pid, stack address). Not
/// cryptographically sound; only ever reached if both better sources are
/// unavailable, which in practice means a badly sandboxed environment.
fn fill_low_grade(dst: &mut [u8]) {
    if !DEGRADED.swap(true, Ordering::Relaxed) {
        warn!("csprng: falling back to low-grade random source, salts and IV padding will be weak");
    }
    FALLBACK_STATE.with(|state| {
        let mut x = state.get();
        if x == 0x9e3779b97f4a7c15 {
            // Stir the default seed with some process-local entropy so
            // repeated processes don't produce identical streams.
            let stack_addr = &x as *const u64 as u64;
            let pid = std::process::id() as u64;
            x ^= stack_addr.rotate_left(17) ^ pid.wrapping_mul(0x2545F4914F6CDD1D);
        }
        for byte in dst.iter_mut() {
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            *byte = (x.wrapping_mul(0x2545F4914F6CDD1D) >> 56) as u8;
        }
        state.set(x);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_requested_length() {
        let mut buf = [0u8; 37];
        random_bytes(&mut buf);
        // Extremely unlikely to be all zero if anything is actually filling it.
        assert!(buf.iter().any(|&b| b != 0));
    }

    #[test]
    fn low_grade_fallback_is_deterministic_per_seed_state() {
        let mut a = [0u8; 16];
        let mut b = [0u8; 16];
        fill_low_grade(&mut a);
        fill_low_grade(&mut b);
        assert_ne!(a, b, "successive pulls from the fallback stream shouldn't repeat");
    }
}
