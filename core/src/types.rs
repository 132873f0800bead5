//! Shared primitive types and scale constants used across the crate.

/// A probability expressed as an exact fixed-point integer.
/// One percent is `UNITS_PER_PERCENT` units.
pub type Weight = u64;

/// Opaque identifier of a reward candidate, unique within a draw-set.
pub type CandidateId = String;

/// Identifier of a player account.
pub type PlayerId = String;

/// Identifier of a gacha packet.
pub type PacketId = String;

/// Number of fractional percent digits carried exactly.
pub const FRACTION_DIGITS: usize = 7;

/// Fixed-point units per 1%.
pub const UNITS_PER_PERCENT: Weight = 10_000_000;

/// 100% in fixed-point units.
pub const HUNDRED_PERCENT: Weight = 100 * UNITS_PER_PERCENT;
