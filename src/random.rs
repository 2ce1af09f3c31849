//! Random bytes for picking ephemeral ports.
//!
//! Bytes are served from a pool refilled from the first readable entropy device.
//! When no device can be read, the pool is filled from a non-cryptographic generator
//! seeded with the current time and the process ID.
use std::cmp::min;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, warn};
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};

use crate::config::DEFAULT_RANDOM_DEVICES;
use crate::error::RandomError;

/// Size of the internal pool, in bytes.
pub const POOL_SIZE: usize = 2048;
/// Largest request accepted by [`RandomByteSource::fill`].
pub const MAX_REQUEST: usize = 0xFFFF;

static DEGRADED: AtomicBool = AtomicBool::new(false);

/// Whether any source in this process had to fall back to the seeded generator.
pub fn degraded() -> bool {
    DEGRADED.load(Ordering::Relaxed)
}

pub struct RandomByteSource {
    devices: Vec<PathBuf>,
    fallback: Option<SmallRng>,
    pool: Box<[u8; POOL_SIZE]>,
    left: usize,
}

impl RandomByteSource {
    pub fn new(devices: Vec<PathBuf>) -> Self {
        Self {
            devices,
            fallback: None,
            pool: Box::new([0u8; POOL_SIZE]),
            left: 0,
        }
    }

    /// Fill `buffer` with random bytes.
    pub fn fill(&mut self, buffer: &mut [u8]) -> Result<(), RandomError> {
        if buffer.len() > MAX_REQUEST {
            return Err(RandomError::InvalidSize(buffer.len()));
        }
        let mut filled = 0;
        while filled < buffer.len() {
            if self.left == 0 {
                self.refill();
            }
            let count = min(self.left, buffer.len() - filled);
            let start = POOL_SIZE - self.left;
            buffer[filled..filled + count].copy_from_slice(&self.pool[start..start + count]);
            self.left -= count;
            filled += count;
        }
        Ok(())
    }

    pub fn next_u16(&mut self) -> Result<u16, RandomError> {
        let mut bytes = [0u8; 2];
        self.fill(&mut bytes)?;
        Ok(u16::from_ne_bytes(bytes))
    }

    fn refill(&mut self) {
        if !self.read_devices() {
            if !DEGRADED.swap(true, Ordering::Relaxed) {
                warn!(
                    "cannot read any of {:?}, using a time-seeded generator",
                    self.devices
                );
            }
            self.fallback
                .get_or_insert_with(|| SmallRng::seed_from_u64(fallback_seed()))
                .fill_bytes(self.pool.as_mut_slice());
        }
        self.left = POOL_SIZE;
    }

    fn read_devices(&mut self) -> bool {
        for path in &self.devices {
            let result = File::open(path).and_then(|mut file| file.read_exact(&mut *self.pool));
            match result {
                Ok(_) => return true,
                Err(error) => debug!("{}: {}", path.display(), error),
            }
        }
        false
    }
}

impl Default for RandomByteSource {
    fn default() -> Self {
        Self::new(DEFAULT_RANDOM_DEVICES.iter().map(PathBuf::from).collect())
    }
}

fn fallback_seed() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (now.as_secs() ^ now.subsec_micros() as u64) ^ process::id() as u64
}
