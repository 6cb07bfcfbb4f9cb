//! Fixture builder: turn `(params, seed, compound_cfg)` into a ready-to-run
//! simulation
//!
//! [`build_fixture`] is the only place a [`crate::device::DeviceState`] gets
//! constructed. It draws each lane's [`ProviderSecrets`], a permutation key,
//! an initial chained seed, and an initial token vector `W` — all from one
//! deterministic PRNG stream seeded from the caller's `seed`, so that the
//! whole fixture is reproducible byte for byte given the same inputs.

use crate::compound::{CompoundConfig, Prng};
use crate::device::DeviceState;
use crate::hashing::{h, trunc_bits, Part};
use crate::params::Params;
use crate::secrets::{generate_provider_secrets, ProviderSecrets};
use crate::PcplError;

/// Build a fresh set of provider secrets and an initial device state.
///
/// Follows spec §4.8's ordering exactly: seed the PRNG (step 1), draw every
/// lane's secrets from it (step 2), then draw 32 bytes of seed material off
/// the *same* stream (step 3) — matching the original reference's
/// `rng.getrandbits(256)` call off the same `random.Random` instance used for
/// compound generation. Drawing the seed material independently of the
/// stream would make this fixture unreproducible by a spec-literal
/// implementation, even though it would remain internally self-consistent.
///
/// # Errors
/// Propagates [`PcplError::InvalidParameter`] from compound/secret
/// generation, or [`PcplError::EncodingError`]/[`PcplError::ArithmeticError`]
/// from the underlying hash calls.
pub fn build_fixture(
    params: &Params,
    seed: u64,
    compound_cfg: &CompoundConfig,
) -> Result<(Vec<ProviderSecrets>, DeviceState), PcplError> {
    let mut prng = Prng::new(seed, "FIXTURE");

    let mut secrets = Vec::with_capacity(params.x);
    for _ in 0..params.x {
        secrets.push(generate_provider_secrets(&mut prng, compound_cfg, params)?);
    }

    let seed_material: [u8; 32] = prng
        .next_bytes(32)
        .try_into()
        .expect("next_bytes(32) returns exactly 32 bytes");

    let perm_key: [u8; 32] = h(&[Part::bytes(seed_material.as_slice()), Part::ascii("PERMKEY")], 32)?
        .try_into()
        .expect("h(.., 32) returns exactly 32 bytes");

    let s = h(
        &[Part::bytes(seed_material.as_slice()), Part::ascii("SEED")],
        params.seed_bytes,
    )?;

    let th_len = params.tokenization_out_len();
    let mut w = Vec::with_capacity(params.x);
    for i in 0..params.x {
        let digest = h(
            &[
                Part::bytes(seed_material.as_slice()),
                Part::ascii("W"),
                Part::int(i as u128),
            ],
            th_len,
        )?;
        w.push(trunc_bits(&digest, params.token_bits)?);
    }

    let state = DeviceState {
        w,
        s,
        perm_key,
        secrets: secrets.clone(),
    };
    Ok((secrets, state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compound::{build_compound_config, CompoundMode};
    use crate::params::{build_params, PrimeMode};

    fn setup(x: usize, seed: u64) -> (Params, CompoundConfig) {
        let params = build_params(x, 128, PrimeMode::Fixed, seed).unwrap();
        let cfg =
            build_compound_config(seed, &params, 4, 2, CompoundMode::Classic, 0, 1, 3, 0, 0, "P")
                .unwrap();
        (params, cfg)
    }

    #[test]
    fn fixture_has_expected_shape() {
        let (params, cfg) = setup(4, 1337);
        let (secrets, state) = build_fixture(&params, 1337, &cfg).unwrap();
        assert_eq!(secrets.len(), 4);
        assert_eq!(state.w.len(), 4);
        assert_eq!(state.secrets.len(), 4);
        assert_eq!(state.s.len(), params.seed_bytes);
        for &token in &state.w {
            assert!(1u128.checked_shl(params.token_bits).map_or(true, |bound| token < bound));
        }
    }

    #[test]
    fn deterministic_given_same_seed() {
        let (params, cfg) = setup(4, 42);
        let (secrets_1, state_1) = build_fixture(&params, 42, &cfg).unwrap();
        let (secrets_2, state_2) = build_fixture(&params, 42, &cfg).unwrap();
        assert_eq!(secrets_1, secrets_2);
        assert_eq!(state_1, state_2);
    }

    #[test]
    fn distinct_seeds_usually_diverge() {
        let (params, cfg) = setup(4, 1);
        let (_s1, state_1) = build_fixture(&params, 1, &cfg).unwrap();
        let (_s2, state_2) = build_fixture(&params, 2, &cfg).unwrap();
        assert_ne!(state_1, state_2);
    }

    /// The 32-byte seed material is drawn off the *same* PRNG stream used for
    /// lane secrets (spec §4.8 steps 1-3), not an independent hash of the
    /// caller's seed: changing how much of the stream secret generation
    /// consumes (here, `num_compounds`) must shift the derived `perm_key`/`S`/
    /// `W`, since they're drawn from whatever's left in the stream afterward.
    #[test]
    fn seed_material_is_drawn_from_the_shared_prng_stream() {
        let params = build_params(4, 128, PrimeMode::Fixed, 7).unwrap();
        let cfg_a =
            build_compound_config(7, &params, 3, 2, CompoundMode::Classic, 0, 1, 3, 0, 0, "P")
                .unwrap();
        let cfg_b =
            build_compound_config(7, &params, 9, 2, CompoundMode::Classic, 0, 1, 3, 0, 0, "P")
                .unwrap();
        let (_secrets_a, state_a) = build_fixture(&params, 7, &cfg_a).unwrap();
        let (_secrets_b, state_b) = build_fixture(&params, 7, &cfg_b).unwrap();
        assert_ne!(state_a.perm_key, state_b.perm_key);
        assert_ne!(state_a.s, state_b.s);
        assert_ne!(state_a.w, state_b.w);
    }
}
