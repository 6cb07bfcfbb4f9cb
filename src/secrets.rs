//! Per-provider secret material: three bouquets of compounds
//!
//! A provider's secret is three ordered lists of compounds — bouquets `A`,
//! `B`, `C` — evaluated against the phase cross products `u1 = a*b`,
//! `u2 = b*c`, `u3 = c*a` respectively (see [`crate::bouquet`]). Each
//! compound is stored already reduced modulo the structural modulus `M`:
//! this crate carries no arbitrary-precision integer type, so a compound's
//! "true" value (an exact product of small primes) is folded into its
//! residue mod `M` at generation time rather than ever being materialized in
//! full. That's a sound substitution because every place a compound is used
//! — as a multi-exponentiation base — cares only about its value mod `M`.

use serde::{Deserialize, Serialize};

use crate::compound::{generate_compound, CompoundConfig, Prng};
use crate::params::Params;
use crate::PcplError;

/// One provider's bouquets, each a sequence of already-reduced-mod-`M`
/// compound residues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSecrets {
    /// Bouquet evaluated against `u1`.
    pub bouquet_a: Vec<u128>,
    /// Bouquet evaluated against `u2`.
    pub bouquet_b: Vec<u128>,
    /// Bouquet evaluated against `u3`.
    pub bouquet_c: Vec<u128>,
}

/// Draw a fresh [`ProviderSecrets`] from `prng`, using `cfg` to generate each
/// bouquet's `cfg.num_compounds` compounds.
///
/// # Errors
/// Returns [`PcplError::InvalidParameter`] if `cfg.num_compounds == 0`; this
/// is also checked by [`crate::compound::build_compound_config`], so callers
/// that built `cfg` through that constructor cannot trigger it here.
pub fn generate_provider_secrets(
    prng: &mut Prng,
    cfg: &CompoundConfig,
    params: &Params,
) -> Result<ProviderSecrets, PcplError> {
    if cfg.num_compounds == 0 {
        return Err(PcplError::InvalidParameter(
            "num_compounds must be positive".to_string(),
        ));
    }
    let mut draw_bouquet = |prng: &mut Prng| {
        (0..cfg.num_compounds)
            .map(|_| generate_compound(prng, cfg, params))
            .collect::<Vec<u128>>()
    };
    Ok(ProviderSecrets {
        bouquet_a: draw_bouquet(prng),
        bouquet_b: draw_bouquet(prng),
        bouquet_c: draw_bouquet(prng),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compound::{build_compound_config, CompoundMode};
    use crate::params::{build_params, PrimeMode};

    fn setup() -> (Params, CompoundConfig) {
        let params = build_params(4, 128, PrimeMode::Fixed, 0).unwrap();
        let cfg =
            build_compound_config(1, &params, 5, 2, CompoundMode::Classic, 0, 1, 3, 0, 0, "P")
                .unwrap();
        (params, cfg)
    }

    #[test]
    fn bouquets_have_expected_length() {
        let (params, cfg) = setup();
        let mut prng = Prng::new(10, "secrets");
        let secrets = generate_provider_secrets(&mut prng, &cfg, &params).unwrap();
        assert_eq!(secrets.bouquet_a.len(), 5);
        assert_eq!(secrets.bouquet_b.len(), 5);
        assert_eq!(secrets.bouquet_c.len(), 5);
    }

    #[test]
    fn distinct_providers_usually_diverge() {
        let (params, cfg) = setup();
        let mut prng_1 = Prng::new(10, "secrets");
        let mut prng_2 = Prng::new(11, "secrets");
        let a = generate_provider_secrets(&mut prng_1, &cfg, &params).unwrap();
        let b = generate_provider_secrets(&mut prng_2, &cfg, &params).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn sequential_draws_from_one_stream_are_reproducible() {
        let (params, cfg) = setup();
        let mut prng_1 = Prng::new(42, "fixture");
        let mut prng_2 = Prng::new(42, "fixture");
        let providers_1: Vec<_> = (0..3)
            .map(|_| generate_provider_secrets(&mut prng_1, &cfg, &params).unwrap())
            .collect();
        let providers_2: Vec<_> = (0..3)
            .map(|_| generate_provider_secrets(&mut prng_2, &cfg, &params).unwrap())
            .collect();
        assert_eq!(providers_1, providers_2);
    }
}
