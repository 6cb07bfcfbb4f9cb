//! Per-block permutation schedule
//!
//! `permutation_for_block(B)` picks the lane-emission order for block `B`'s
//! `x` cycles from `(perm_key, B, phi_block)`. Two paths:
//!
//! - **`x = 4` fast path.** A 4-byte digest selects one of the 24
//!   permutations of `{0,1,2,3}` out of a `const` lexicographic table. The
//!   table's ordering is load-bearing: it must match
//!   `itertools.permutations(range(4))`'s lexicographic enumeration byte for
//!   byte, or cross-implementation digests would diverge even though both
//!   sides picked "permutation #`k`".
//! - **General path.** A keyed Fisher-Yates shuffle seeded from a 32-byte
//!   digest, swapping from `x-1` down to `1`.
//!
//! Both paths are pure functions; `sorted(output) == 0..x` is a structural
//! invariant checked by the validator and exercised in tests here.

use crate::hashing::{h, Part};
use crate::params::Params;
use crate::PcplError;

/// The 24 permutations of `{0,1,2,3}`, in lexicographic order. Must match
/// `itertools.permutations(range(4))` from the original reference
/// implementation exactly; this ordering is part of the cross-implementation
/// contract, not an implementation detail.
pub const PERM_TABLE_24: [[u8; 4]; 24] = [
    [0, 1, 2, 3],
    [0, 1, 3, 2],
    [0, 2, 1, 3],
    [0, 2, 3, 1],
    [0, 3, 1, 2],
    [0, 3, 2, 1],
    [1, 0, 2, 3],
    [1, 0, 3, 2],
    [1, 2, 0, 3],
    [1, 2, 3, 0],
    [1, 3, 0, 2],
    [1, 3, 2, 0],
    [2, 0, 1, 3],
    [2, 0, 3, 1],
    [2, 1, 0, 3],
    [2, 1, 3, 0],
    [2, 3, 0, 1],
    [2, 3, 1, 0],
    [3, 0, 1, 2],
    [3, 0, 2, 1],
    [3, 1, 0, 2],
    [3, 1, 2, 0],
    [3, 2, 0, 1],
    [3, 2, 1, 0],
];

/// Compute the lane-emission order `π_B` for block `B`.
///
/// `phi_block` must be `phase_clock(B * params.x, params).phi` — the caller
/// threads it through rather than this function recomputing the phase clock,
/// so callers that already have the block's phase (e.g. the validator,
/// replaying cycles) don't pay for it twice.
///
/// # Errors
/// Returns [`PcplError::EncodingError`] only if the underlying hash calls
/// fail, which cannot happen for the fixed, in-range output lengths used
/// here; the `Result` exists to keep the fallible hashing primitive's error
/// type threaded through rather than panicking on an internal invariant.
#[tracing::instrument(level = "trace", skip(params, perm_key, phi_block))]
pub fn permutation_for_block(
    b: u64,
    params: &Params,
    perm_key: &[u8; 32],
    phi_block: &[u8; 32],
) -> Result<Vec<usize>, PcplError> {
    if params.x == 4 {
        let digest = h(
            &[
                Part::bytes(perm_key.as_slice()),
                Part::int(u128::from(b)),
                Part::bytes(phi_block.as_slice()),
                Part::ascii("PERM"),
            ],
            4,
        )?;
        let raw = u32::from_be_bytes(digest.try_into().expect("h(.., 4) returns 4 bytes"));
        let perm_id = (raw % 24) as usize;
        return Ok(PERM_TABLE_24[perm_id].iter().map(|&v| v as usize).collect());
    }

    let mut perm: Vec<usize> = (0..params.x).collect();
    let seed = h(
        &[
            Part::bytes(perm_key.as_slice()),
            Part::int(u128::from(b)),
            Part::bytes(phi_block.as_slice()),
            Part::ascii("PERMSEED"),
        ],
        32,
    )?;

    for k in (1..params.x).rev() {
        let draw = h(
            &[Part::bytes(seed.as_slice()), Part::int(k as u128), Part::ascii("R")],
            8,
        )?;
        let raw = u64::from_be_bytes(draw.try_into().expect("h(.., 8) returns 8 bytes"));
        let r = (raw % (k as u64 + 1)) as usize;
        perm.swap(k, r);
    }
    Ok(perm)
}
