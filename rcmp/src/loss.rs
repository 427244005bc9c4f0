//! Acknowledgment loss simulator.
//!
//! The receiver asks a [`LossSimulator`] before every acknowledgment it is
//! about to send; a `true` answer means the acknowledgment is silently
//! withheld, which drives the sender into its timeout-and-rewind path.
//! Probability and seed are injectable so tests can run deterministically.

use rand::distr::Bernoulli;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::TransferError;

#[derive(Debug, Clone)]
pub struct LossSimulator {
    /// `None` never withholds.
    drop: Option<Bernoulli>,
    rng: StdRng,
}

impl LossSimulator {
    /// Withhold with probability `probability`, drawing from `rng`.
    pub fn new(probability: f64, rng: StdRng) -> Result<Self, TransferError> {
        let drop = Bernoulli::new(probability).map_err(|_| {
            TransferError::InvalidConfig(format!(
                "drop probability {probability} is outside [0, 1]"
            ))
        })?;
        Ok(Self {
            drop: Some(drop),
            rng,
        })
    }

    /// Seeded from `seed` when given, from the OS otherwise.
    pub fn with_seed(probability: f64, seed: Option<u64>) -> Result<Self, TransferError> {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self::new(probability, rng)
    }

    /// Never withholds anything.
    pub fn disabled() -> Self {
        Self {
            drop: None,
            rng: StdRng::seed_from_u64(0),
        }
    }

    /// Decide the fate of one acknowledgment.
    pub fn should_withhold(&mut self) -> bool {
        match self.drop {
            Some(drop) => self.rng.sample(drop),
            None => false,
        }
    }
}
