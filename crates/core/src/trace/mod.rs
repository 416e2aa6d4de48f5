//! Trace capture: collaborator interfaces and the sparse instruction map.
//!
//! The stepper (an instruction-set simulator) owns execution order entirely;
//! capture only asks for whatever was retired last, lets the mutator rewrite
//! it and records the result by address.

use std::collections::BTreeMap;

use tracing::debug;

use crate::model::{EncodedInstruction, TraceAddress};

pub mod mutator;
pub mod replay;

pub use mutator::{MutatorConfig, RandomBitMutator};
pub use replay::{Retired, TraceDirSession, TraceError, TraceReplayStepper};

/// Processor model that can be advanced one retired instruction at a time.
///
/// State persists across calls for the lifetime of one input program.
pub trait Stepper {
    /// Program counter of the most recently retired instruction.
    fn current_pc(&self) -> TraceAddress;
    /// Instruction word of the most recently retired instruction.
    fn current_insn(&self) -> EncodedInstruction;
    /// Advance by exactly `n` retired instructions.
    fn advance(&mut self, n: u64);
}

/// Mutation engine rewriting retired instructions.
pub trait Mutator {
    /// Return a (possibly unchanged) replacement for `insn` retired at `pc`.
    fn mutate(&mut self, insn: EncodedInstruction, pc: TraceAddress) -> EncodedInstruction;
    /// Clear any history carried between runs. Called once per variant before stepping.
    fn reset_history(&mut self);
}

/// Address-indexed mutated encodings for one run (one program x one variant).
///
/// Keys are unique (last write for an address wins) and iteration is always in
/// ascending address order regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SparseInstructionMap {
    entries: BTreeMap<TraceAddress, EncodedInstruction>,
}

impl SparseInstructionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `insn` at `addr`, returning the value it replaced, if any.
    pub fn insert(
        &mut self,
        addr: TraceAddress,
        insn: EncodedInstruction,
    ) -> Option<EncodedInstruction> {
        self.entries.insert(addr, insn)
    }

    pub fn get(&self, addr: TraceAddress) -> Option<EncodedInstruction> {
        self.entries.get(&addr).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in ascending address order.
    pub fn iter(&self) -> impl Iterator<Item = (TraceAddress, EncodedInstruction)> + '_ {
        self.entries.iter().map(|(addr, insn)| (*addr, *insn))
    }

    /// Lowest and highest recorded addresses.
    pub fn span(&self) -> Option<(TraceAddress, TraceAddress)> {
        let first = self.entries.keys().next()?;
        let last = self.entries.keys().next_back()?;
        Some((*first, *last))
    }
}

impl FromIterator<(TraceAddress, EncodedInstruction)> for SparseInstructionMap {
    fn from_iter<I: IntoIterator<Item = (TraceAddress, EncodedInstruction)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (addr, insn) in iter {
            map.insert(addr, insn);
        }
        map
    }
}

/// Drive `stepper` for `budget` retired instructions, mutating each one.
///
/// Each iteration observes the last retired state before advancing. A revisited
/// address keeps only its most recent mutation.
pub fn capture<S, M>(stepper: &mut S, mutator: &mut M, budget: u64) -> SparseInstructionMap
where
    S: Stepper + ?Sized,
    M: Mutator + ?Sized,
{
    let mut map = SparseInstructionMap::new();
    let mut revisits = 0u64;
    let mut mutated = 0u64;

    for _ in 0..budget {
        let pc = stepper.current_pc();
        let insn = stepper.current_insn();
        let replacement = mutator.mutate(insn, pc);
        if replacement != insn {
            mutated += 1;
        }
        if map.insert(pc, replacement).is_some() {
            revisits += 1;
        }
        stepper.advance(1);
    }

    if let Some((low, high)) = map.span() {
        debug!(budget, addresses = map.len(), revisits, mutated, "captured {low:#x}..={high:#x}");
    }
    map
}
