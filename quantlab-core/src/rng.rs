//! Deterministic RNG derivation.
//!
//! A master seed expands into per-(run, label) sub-seeds via BLAKE3, so the
//! same configuration yields identical random streams regardless of thread
//! scheduling or derivation order. This is the only source of randomness
//! permitted inside the simulation loop.

use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Debug, Clone)]
pub struct SeedHierarchy {
    master_seed: u64,
}

impl SeedHierarchy {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Derive a deterministic sub-seed for (run, label).
    pub fn sub_seed(&self, run_id: &str, label: &str) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(run_id.as_bytes());
        hasher.update(label.as_bytes());
        let hash = hasher.finalize();
        u64::from_le_bytes(
            hash.as_bytes()[..8]
                .try_into()
                .expect("blake3 output shorter than 8 bytes"),
        )
    }

    /// A seeded `StdRng` for (run, label).
    pub fn rng_for(&self, run_id: &str, label: &str) -> StdRng {
        StdRng::seed_from_u64(self.sub_seed(run_id, label))
    }
}
