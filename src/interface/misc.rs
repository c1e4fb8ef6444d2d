// Misc functions for interface
// Random, locks, etc.

use std::fs::File;
use std::io::Read;

pub use parking_lot::{Condvar as RustCondvar, Mutex as RustMutex, MutexGuard as RustMutexGuard};
pub use std::collections::HashMap as RustHashMap;
pub use std::sync::{Arc as RustRfc, Weak as RustWeak};
pub use std::time::{Duration as RustDuration, Instant as RustInstant};

const HOST_RANDOM_PATH: &str = "/dev/urandom";

// Probe the host entropy source once; used to decide how /dev/random is served
pub fn host_random_available() -> bool {
    File::open(HOST_RANDOM_PATH).is_ok()
}

// Fill the buffer with bytes from the host entropy source
pub fn fillrandom(buf: &mut [u8]) -> std::io::Result<usize> {
    let mut f = File::open(HOST_RANDOM_PATH)?;
    f.read_exact(buf)?;
    Ok(buf.len())
}

