//! Seeded pseudo-random number generator
//!
//! Randomized strategies must stay pure functions of their inputs, so every
//! draw comes from a generator rebuilt from (strategy seed, round).

/// xorshift64* generator
///
/// Deterministic: same seed + stream = same sequence
#[derive(Clone, Debug)]
pub struct SeededRng {
    state: u64,
}

impl SeededRng {
    /// Create a generator from a 64-bit seed and a stream index
    pub fn new(seed: u64, stream: u32) -> Self {
        let mut state = seed ^ 0x6a09_e667_f3bc_c908;
        state ^= (stream as u64).wrapping_mul(0x517c_c1b7_2722_0a95);
        if state == 0 {
            // xorshift never leaves the all-zero state
            state = 0x9e37_79b9_7f4a_7c15;
        }

        let mut rng = Self { state };
        for _ in 0..8 {
            rng.next_u64();
        }
        rng
    }

    /// Generator dedicated to one round of play
    pub fn for_round(seed: u64, round: u32) -> Self {
        Self::new(seed, round)
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state ^= self.state >> 12;
        self.state ^= self.state << 25;
        self.state ^= self.state >> 27;
        self.state.wrapping_mul(0x2545_f491_4f6c_dd1d)
    }

    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    /// Value in 0..100
    pub fn next_percent(&mut self) -> u8 {
        (self.next_u32() % 100) as u8
    }
}

/// FNV-1a over a byte string; used to derive strategy seeds from text.
pub fn fingerprint(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes.iter().fold(OFFSET, |hash, &b| (hash ^ b as u64).wrapping_mul(PRIME))
}
