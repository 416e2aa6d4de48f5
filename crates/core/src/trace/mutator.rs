//! Seeded random bit-flip mutator.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::model::{EncodedInstruction, InsnWidth, TraceAddress};
use crate::trace::Mutator;

/// Settings for [`RandomBitMutator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MutatorConfig {
    /// RNG seed; the same seed reproduces the same variants.
    pub seed: u64,
    /// Probability in `0.0..=1.0` that a retired instruction is mutated.
    pub rate: f64,
}

impl Default for MutatorConfig {
    fn default() -> Self {
        Self { seed: 0, rate: 0.1 }
    }
}

/// Flips a single random bit of selected instructions.
///
/// The two width-discriminant bits are never touched, so a compact encoding
/// stays compact and a standard one stays standard. Within one run every PC is
/// mutated at most once: revisiting a PC with the same original word returns the
/// replacement chosen on the first visit. The RNG stream is not rewound by
/// [`Mutator::reset_history`], so successive variants differ.
#[derive(Debug)]
pub struct RandomBitMutator {
    rng: StdRng,
    rate: f64,
    history: HashMap<TraceAddress, (EncodedInstruction, EncodedInstruction)>,
}

impl RandomBitMutator {
    pub fn new(config: &MutatorConfig) -> Self {
        let rate = if config.rate.is_finite() { config.rate.clamp(0.0, 1.0) } else { 0.0 };
        Self { rng: StdRng::seed_from_u64(config.seed), rate, history: HashMap::new() }
    }

    /// Number of PCs remembered since the last reset.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    fn flip_bit(&mut self, insn: EncodedInstruction) -> EncodedInstruction {
        let bits = match insn.width() {
            InsnWidth::Compact => 16,
            InsnWidth::Standard => 32,
        };
        let bit = self.rng.gen_range(2..bits);
        EncodedInstruction::new(insn.raw() ^ (1u32 << bit))
    }
}

impl Mutator for RandomBitMutator {
    fn mutate(&mut self, insn: EncodedInstruction, pc: TraceAddress) -> EncodedInstruction {
        if let Some((original, replacement)) = self.history.get(&pc) {
            if *original == insn {
                return *replacement;
            }
        }

        let replacement = if self.rng.gen_bool(self.rate) { self.flip_bit(insn) } else { insn };
        self.history.insert(pc, (insn, replacement));
        replacement
    }

    fn reset_history(&mut self) {
        self.history.clear();
    }
}
