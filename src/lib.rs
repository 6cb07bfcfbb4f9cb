//! Crate root: public surface, core error type, and protocol-wide invariants
//!
//! This module is the single canonical entry-point for downstream users of
//! the library. It centralizes the crate-wide error type and re-exports the
//! submodules that implement the Phase-Cycled Provider Lane (PCPL) scheme: a
//! deterministic per-cycle token-derivation engine in which exactly one of
//! `x` provider lanes is the emitter at every cycle `t`, and every lane's
//! token is folded into an append-only chained seed.
//!
//! ## Invariants
//!
//! - **Determinism.** Every function in this crate except [`device::device_cycle`]
//!   is a pure function of its inputs. `device_cycle` additionally mutates the
//!   passed [`device::DeviceState`] deterministically. Two conforming
//!   implementations given identical inputs must produce byte-identical
//!   digests, tokens, and post-cycle seeds.
//! - **1-of-`x`.** At every cycle exactly one lane's independently recomputed
//!   token matches the device's committed token, and that lane is the one the
//!   permutation schedule selected.
//! - **No partial failure.** Every fallible operation either completes and
//!   (for `device_cycle`) commits its mutation, or returns `Err` and leaves
//!   state untouched. We **forbid unsafe** throughout the crate.
//!
//! These invariants are enforced by design across the submodules below. If
//! any invariant is violated at runtime, the failure mode is a precise
//! [`PcplError`], never UB.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

/// Tagged, length-prefixed encoding and variable-output keyed hashing (BLAKE2b).
pub mod hashing;
/// Structural primes, modulus, and size-constant derivation (fixed or generated mode).
pub mod params;
/// Per-cycle phase residues, cross products, and the phase digest.
pub mod phase;
/// Per-block lane permutation schedule (lexicographic `x=4` fast path + general Fisher-Yates).
pub mod permutation;
/// Modular multi-exponentiation over a lane's bouquets.
pub mod bouquet;
/// Compound generation modes, deterministic counter-mode PRNG, and prime pools.
pub mod compound;
/// Per-lane provider secrets (the three bouquets).
pub mod secrets;
/// Device cycle, lane token derivation, and the chained seed.
pub mod device;
/// Fixture builder: derives provider secrets and initial device state from a seed.
pub mod fixture;
/// Re-runs cycles to check the 1-of-`x` property, round coverage, and chaining divergence.
pub mod validator;

// ============================================================================
// Crate-wide error type
// ============================================================================

/// Errors surfaced by this crate, grouped by the kind of failure: bad
/// caller input, malformed encoding, an arithmetic invariant violation, or
/// a failed cross-check assertion.
///
/// Every fallible public function returns `Result<_, PcplError>`. Nothing is
/// recovered internally: a cycle either completes and mutates state, or it
/// raises and leaves state untouched.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum PcplError {
    /// A structural parameter is out of range or inconsistent (e.g. `x < 2`,
    /// non-distinct `{P,Q,R}`, `gcd(M,x) != 1`, a malformed compound config).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// The hashing primitive was fed an unsupported part or an out-of-range
    /// output length.
    #[error("encoding error: {0}")]
    EncodingError(String),
    /// A modular-arithmetic precondition failed, e.g. a compound congruent to
    /// zero modulo `M`.
    #[error("arithmetic error: {0}")]
    ArithmeticError(String),
    /// The validator observed a violated invariant: wrong match set, wrong
    /// per-block emission counts, an invalid permutation, or a chaining
    /// check that failed to diverge.
    #[error("assertion failure: {0}")]
    AssertionFailure(String),
}

pub use crate::device::DeviceState;
pub use crate::params::{Params, PrimeMode};
pub use crate::phase::Phase;
pub use crate::secrets::ProviderSecrets;
