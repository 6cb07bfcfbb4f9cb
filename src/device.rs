//! Lane token derivation and the device cycle
//!
//! [`lane_token`] is the pure per-lane derivation pipeline: evaluate the
//! three bouquets against the phase's cross products, fold them into a KDF
//! digest, bind the cycle index and phase digest, and truncate to
//! `token_bits`. [`device_cycle`] drives one cycle end to end: pick this
//! cycle's emitting lane from the block's permutation, derive its token,
//! overwrite that lane's slot in `W`, and fold the whole `W` vector (plus
//! adjacent products) into the chained seed `S`.
//!
//! `device_cycle` has no partial-failure path: everything is computed into
//! locals first, and `state` is mutated only once every fallible step has
//! already succeeded.

use crate::hashing::{h, trunc_bits, Part};
use crate::params::Params;
use crate::permutation::permutation_for_block;
use crate::phase::{phase_clock, Phase};
use crate::secrets::ProviderSecrets;
use crate::PcplError;

/// The mutable per-device state threaded through successive cycles.
///
/// `device_cycle` takes `&mut DeviceState`, so Rust's borrow checker enforces
/// the no-aliasing requirement: only one cycle can be in flight against a
/// given device at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceState {
    /// Current token held by each of the `x` lanes.
    pub w: Vec<u128>,
    /// The chained seed, `params.seed_bytes` long.
    pub s: Vec<u8>,
    /// Secret key driving the per-block permutation schedule.
    pub perm_key: [u8; 32],
    /// Each lane's immutable secret material, indexed the same as `w`.
    pub secrets: Vec<ProviderSecrets>,
}

fn fixed_width_be(value: u128, width: usize) -> Result<Vec<u8>, PcplError> {
    let full = value.to_be_bytes();
    let significant = &full[16 - width.min(16)..];
    if width > 16 {
        let mut out = vec![0u8; width - 16];
        out.extend_from_slice(&full);
        return Ok(out);
    }
    if full[..16 - width].iter().any(|&b| b != 0) {
        return Err(PcplError::EncodingError(format!(
            "value {value} does not fit in {width} bytes"
        )));
    }
    Ok(significant.to_vec())
}

/// Derive the token for lane `secrets` at cycle `t` under the already
/// computed `phase`.
///
/// # Errors
/// Propagates [`PcplError`] from bouquet evaluation (a compound congruent
/// to zero mod `M`) or from the underlying hash calls.
pub fn lane_token(
    t: u64,
    phase: &Phase,
    params: &Params,
    secrets: &ProviderSecrets,
) -> Result<u128, PcplError> {
    let ea = crate::bouquet::eval_bouquet(&secrets.bouquet_a, phase.a, phase.u1, params)?;
    let eb = crate::bouquet::eval_bouquet(&secrets.bouquet_b, phase.b, phase.u2, params)?;
    let ec = crate::bouquet::eval_bouquet(&secrets.bouquet_c, phase.c, phase.u3, params)?;

    let kdf = h(
        &[
            Part::int(ea),
            Part::int(eb),
            Part::int(ec),
            Part::bytes(phase.phi.as_slice()),
            Part::ascii("KDF"),
        ],
        32,
    )?;

    let th_len = params.tokenization_out_len();
    let tok_hash = h(
        &[
            Part::bytes(kdf.as_slice()),
            Part::int(u128::from(t)),
            Part::bytes(phase.phi.as_slice()),
            Part::ascii("TOK"),
        ],
        th_len,
    )?;

    trunc_bits(&tok_hash, params.token_bits)
}

/// Run cycle `t` against `state`, returning the emitting lane index and its
/// freshly derived token.
///
/// # Errors
/// Returns [`PcplError::InvalidParameter`] if `state.w`/`state.secrets`
/// don't have exactly `params.x` entries, or propagates any error from
/// [`lane_token`] or the permutation schedule. On error, `state` is left
/// entirely unmodified.
#[tracing::instrument(level = "trace", skip(params, state))]
pub fn device_cycle(
    t: u64,
    params: &Params,
    state: &mut DeviceState,
) -> Result<(usize, u128), PcplError> {
    if state.w.len() != params.x || state.secrets.len() != params.x {
        tracing::error!(t, expected = params.x, got_w = state.w.len(), got_secrets = state.secrets.len(), "device state lane count mismatch");
        return Err(PcplError::InvalidParameter(format!(
            "DeviceState has {} lanes but params.x is {}",
            state.w.len(),
            params.x
        )));
    }

    let phase = phase_clock(t, params);
    let block = t / params.x as u64;
    let block_phase = phase_clock(block * params.x as u64, params);
    let perm = permutation_for_block(block, params, &state.perm_key, &block_phase.phi)?;
    let idx = perm[(t % params.x as u64) as usize];

    let token = lane_token(t, &phase, params, &state.secrets[idx])?;

    let mut new_w = state.w.clone();
    new_w[idx] = token;

    // new_w[i] holds a raw token, which may be as wide as `token_bits` bits
    // (up to the full u128 range) and is not pre-reduced mod `M`; mod_mul
    // reduces both operands before multiplying so this can't overflow even
    // when a token is much larger than `M`.
    let mut chain_products = Vec::with_capacity(params.x - 1);
    for i in 0..params.x - 1 {
        chain_products.push(crate::params::mod_mul(new_w[i], new_w[i + 1], params.m));
    }

    let mut parts = Vec::with_capacity(2 + params.x + (params.x - 1) + 1);
    parts.push(Part::bytes(state.s.as_slice()));
    for &w in &new_w {
        parts.push(Part::bytes(fixed_width_be(w, params.token_bytes)?));
    }
    for &cp in &chain_products {
        parts.push(Part::bytes(fixed_width_be(cp, params.mod_bytes)?));
    }
    parts.push(Part::bytes(phase.phi.as_slice()));
    parts.push(Part::ascii("EVOLVE"));

    let new_s = h(&parts, params.seed_bytes)?;

    state.w = new_w;
    state.s = new_s;
    tracing::trace!(t, idx, "cycle committed");
    Ok((idx, token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compound::{build_compound_config, CompoundMode};
    use crate::fixture::build_fixture;
    use crate::params::{build_params, PrimeMode};

    fn fixture(x: usize, token_bits: u32, seed: u64) -> (Vec<ProviderSecrets>, DeviceState, Params) {
        let params = build_params(x, token_bits, PrimeMode::Fixed, seed).unwrap();
        let cfg =
            build_compound_config(seed, &params, 3, 2, CompoundMode::Classic, 0, 1, 3, 0, 0, "P")
                .unwrap();
        let (secrets, state) = build_fixture(&params, seed, &cfg).unwrap();
        (secrets, state, params)
    }

    #[test]
    fn cycle_changes_exactly_one_lane() {
        let (_secrets, mut state, params) = fixture(4, 128, 1337);
        let before = state.w.clone();
        let (idx, token) = device_cycle(0, &params, &mut state).unwrap();
        for (i, (&before_w, &after_w)) in before.iter().zip(state.w.iter()).enumerate() {
            if i == idx {
                assert_eq!(after_w, token);
            } else {
                assert_eq!(before_w, after_w);
            }
        }
    }

    #[test]
    fn seed_evolves_and_has_expected_length() {
        let (_secrets, mut state, params) = fixture(4, 128, 7);
        let before_s = state.s.clone();
        device_cycle(0, &params, &mut state).unwrap();
        assert_ne!(before_s, state.s);
        assert_eq!(state.s.len(), params.seed_bytes);
    }

    #[test]
    fn single_match_property_holds() {
        let (secrets, mut state, params) = fixture(4, 128, 99);
        for t in 0..40u64 {
            let (idx, _token) = device_cycle(t, &params, &mut state).unwrap();
            let phase = phase_clock(t, &params);
            let matches: Vec<usize> = secrets
                .iter()
                .enumerate()
                .filter(|(_, s)| {
                    lane_token(t, &phase, &params, s).unwrap() == state.w[idx]
                })
                .map(|(i, _)| i)
                .collect();
            assert_eq!(matches, vec![idx]);
        }
    }

    #[test]
    fn rejects_mismatched_lane_count() {
        let (_secrets, mut state, params) = fixture(4, 128, 1);
        state.w.pop();
        state.secrets.pop();
        let err = device_cycle(0, &params, &mut state).unwrap_err();
        assert!(matches!(err, PcplError::InvalidParameter(_)));
    }

    #[test]
    fn fixed_width_be_rejects_overflow() {
        assert!(fixed_width_be(256, 1).is_err());
        assert_eq!(fixed_width_be(255, 1).unwrap(), vec![255]);
        assert_eq!(fixed_width_be(0, 2).unwrap(), vec![0, 0]);
    }

    /// Scenario E: at `token_bits = 1`, tokens live in `{0, 1}` and the whole
    /// pipeline still runs without error; the truncated bits are far too
    /// narrow for the single-match property to hold reliably (two lanes can
    /// land on the same 1-bit token by chance), so this only checks the
    /// structural properties that hold unconditionally: every token is in
    /// range, and `device_cycle` always overwrites exactly the selected lane.
    #[test]
    fn scenario_e_single_bit_tokens_stay_in_range() {
        let (_secrets, mut state, params) = fixture(4, 1, 4242);
        for &w in &state.w {
            assert!(w == 0 || w == 1);
        }
        for t in 0..20u64 {
            let before = state.w.clone();
            let (idx, token) = device_cycle(t, &params, &mut state).unwrap();
            assert!(token == 0 || token == 1);
            assert_eq!(state.w[idx], token);
            for (i, (&b, &a)) in before.iter().zip(state.w.iter()).enumerate() {
                if i != idx {
                    assert_eq!(b, a);
                }
            }
        }
    }
}
