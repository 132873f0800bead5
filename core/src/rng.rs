//! Random sources for weighted draws.
//!
//! RULE: Selection code never reaches for an ambient RNG. Every draw is
//! handed a `RandomSource`, so production uses OS entropy and tests
//! replay seeded or scripted streams.
//!
//! Sources produce raw 64-bit words. Mapping a word onto `[0, n)` goes
//! through `uniform_below`, which rejects words from the biased tail
//! instead of reducing them with a bare `%`.

use chrono::Utc;
use log::warn;
use rand::{rngs::OsRng, RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;
use serde::{Deserialize, Serialize};

/// Which generator produced a draw. Recorded on every result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RandomSourceKind {
    OsEntropy,
    /// OS entropy failed; a clock-seeded PCG stream took over.
    PseudoFallback,
    Seeded,
    Scripted,
}

impl RandomSourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OsEntropy => "os_entropy",
            Self::PseudoFallback => "pseudo_fallback",
            Self::Seeded => "seeded",
            Self::Scripted => "scripted",
        }
    }
}

pub trait RandomSource {
    /// Draw a raw word, uniform over the full `u64` range.
    fn next_u64(&mut self) -> u64;

    fn kind(&self) -> RandomSourceKind;

    /// Uniform integer in `[0, n)`, free of modulo bias.
    ///
    /// Words at or above `floor(2^64 / n) * n` are discarded and redrawn.
    /// Returns 0 when `n == 0`.
    fn uniform_below(&mut self, n: u64) -> u64 {
        if n == 0 {
            return 0;
        }
        let n = u128::from(n);
        let limit = ((1u128 << 64) / n) * n;
        loop {
            let word = u128::from(self.next_u64());
            if word < limit {
                // word % n < n <= u64::MAX
                return (word % n) as u64;
            }
        }
    }
}

// ── OS entropy with fallback ────────────────────────────────────────────────

/// Cryptographically strong source backed by the operating system.
///
/// If the OS generator ever errors, the source switches to a PCG stream
/// seeded from the wall clock for the rest of its life and reports
/// `RandomSourceKind::PseudoFallback` from then on.
#[derive(Default)]
pub struct EntropySource {
    fallback: Option<Pcg64Mcg>,
}

impl EntropySource {
    pub fn new() -> Self {
        Self::default()
    }

    fn fallback_stream(&mut self) -> &mut Pcg64Mcg {
        self.fallback.get_or_insert_with(|| {
            let nanos = Utc::now()
                .timestamp_nanos_opt()
                .unwrap_or_else(|| Utc::now().timestamp_micros());
            Pcg64Mcg::seed_from_u64(nanos as u64)
        })
    }
}

impl RandomSource for EntropySource {
    fn next_u64(&mut self) -> u64 {
        if self.fallback.is_none() {
            let mut bytes = [0u8; 8];
            match OsRng.try_fill_bytes(&mut bytes) {
                Ok(()) => return u64::from_le_bytes(bytes),
                Err(e) => warn!("OS entropy unavailable ({e}); falling back to pseudo-random stream"),
            }
        }
        self.fallback_stream().next_u64()
    }

    fn kind(&self) -> RandomSourceKind {
        if self.fallback.is_some() {
            RandomSourceKind::PseudoFallback
        } else {
            RandomSourceKind::OsEntropy
        }
    }
}

// ── Seeded ──────────────────────────────────────────────────────────────────

/// Deterministic PCG stream derived from a master seed and a stream index.
/// Distinct stream indices give independent, reproducible streams.
pub struct SeededSource {
    inner: Pcg64Mcg,
}

impl SeededSource {
    pub fn new(master_seed: u64, stream: u64) -> Self {
        let derived_seed = master_seed ^ stream.wrapping_mul(0x9e37_79b9_7f4a_7c15);
        Self {
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }
}

impl RandomSource for SeededSource {
    fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    fn kind(&self) -> RandomSourceKind {
        RandomSourceKind::Seeded
    }
}

// ── Scripted ────────────────────────────────────────────────────────────────

/// Replays a fixed list of words, wrapping around at the end.
/// An empty script yields zeros.
pub struct ScriptedSource {
    words: Vec<u64>,
    cursor: usize,
}

impl ScriptedSource {
    pub fn new(words: impl Into<Vec<u64>>) -> Self {
        Self {
            words: words.into(),
            cursor: 0,
        }
    }

    /// Number of words consumed so far.
    pub fn consumed(&self) -> usize {
        self.cursor
    }
}

impl RandomSource for ScriptedSource {
    fn next_u64(&mut self) -> u64 {
        if self.words.is_empty() {
            return 0;
        }
        let word = self.words[self.cursor % self.words.len()];
        self.cursor += 1;
        word
    }

    fn kind(&self) -> RandomSourceKind {
        RandomSourceKind::Scripted
    }
}
