use std::sync::Mutex;

use al_core::core::RandomSource;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Process-wide random source for holdout shuffling.
pub struct StdRandom {
    rng: Mutex<StdRng>,
}

impl StdRandom {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            rng: Mutex::new(rng),
        }
    }
}

impl RandomSource for StdRandom {
    fn next_index(&self, bound: usize) -> usize {
        if bound <= 1 {
            return 0;
        }
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.random_range(0..bound)
    }
}
