// Deterministic pseudo-random number generator for the simulation.
//
// Implements the minstd linear-congruential generator
// (Park & Miller, multiplier 48271, modulus 2^31 - 1). This is a
// hand-rolled implementation with zero external dependencies: the broadcast
// stream must be byte-identical across runs and platforms for a given seed,
// so the generator's constants and stepping are pinned here rather than
// delegated to an RNG crate whose algorithm could change under us.
//
// Convention: the generator advances its state on every draw and returns
// the new state (`state = state * 48271 % 2147483647`). A seed congruent to
// zero is replaced with 1; zero is the multiplier's fixed point and would
// pin every draw at 0.
//
// **Critical constraint: determinism.** Every method must produce identical
// output given the same prior state, regardless of platform or optimization
// level. No floating point, no stdlib RNG, no other source of
// non-determinism belongs in this module.

const MULTIPLIER: u64 = 48_271;
const MODULUS: u64 = 2_147_483_647;

/// Minstd generator — the server's sole source of randomness.
///
/// Robot spawns, respawns, and initial block placement all draw from one
/// instance seeded from the command line, so the whole game is a pure
/// function of `(settings, seed, commands)`.
#[derive(Clone, Debug)]
pub struct Minstd {
    state: u64,
}

impl Minstd {
    /// Create a generator from a 32-bit seed.
    pub fn new(seed: u32) -> Self {
        let state = u64::from(seed) % MODULUS;
        Self {
            state: if state == 0 { 1 } else { state },
        }
    }

    /// Advance the generator and return the next value.
    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state * MULTIPLIER % MODULUS;
        self.state as u32
    }
}
