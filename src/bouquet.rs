//! Bouquet evaluation: modular multi-exponentiation
//!
//! `eval_bouquet(bouquet, xres, u, params)` folds a lane's ordered sequence
//! of compounds into a single residue mod `M`:
//!
//! ```text
//! acc = 1 mod M
//! for j, compound in enumerate(bouquet):
//!     base = compound mod M        (error if base == 0)
//!     exp  = H(xres, u, j, "EXP", out_len=32) mod (M - 1)
//!     acc  = acc * base^exp mod M
//! ```
//!
//! A compound here is already stored mod `M` (see [`crate::secrets`]'s
//! documentation of the `u128`-residue representation), so
//! "`base = compound mod M`" is a no-op in this implementation and the lazy
//! zero-check is the only work left to do at evaluation time.

use crate::hashing::{bytes_mod_u128, h, Part};
use crate::params::{mod_pow, Params};
use crate::PcplError;

/// Fold `bouquet` into a single mod-`M` residue at phase residue `xres` and
/// cross product `u`.
///
/// # Errors
/// Returns [`PcplError::ArithmeticError`] if any compound is congruent to
/// zero modulo `M` (checked lazily, compound by compound: a zero base has
/// no well-defined role as an exponentiation base).
pub fn eval_bouquet(
    bouquet: &[u128],
    xres: u128,
    u: u128,
    params: &Params,
) -> Result<u128, PcplError> {
    let mut acc = 1u128 % params.m;
    for (j, &compound) in bouquet.iter().enumerate() {
        let base = compound % params.m;
        if base == 0 {
            return Err(PcplError::ArithmeticError(format!(
                "compound at index {j} is congruent to 0 mod M; choose different primes"
            )));
        }
        let exp_digest = h(
            &[
                Part::int(xres),
                Part::int(u),
                Part::int(j as u128),
                Part::ascii("EXP"),
            ],
            32,
        )?;
        let exponent = bytes_mod_u128(&exp_digest, params.m - 1);
        acc = crate::params::mod_mul(acc, mod_pow(base, exponent, params.m), params.m);
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{build_params, PrimeMode};

    #[test]
    fn empty_bouquet_is_identity() {
        let params = build_params(4, 128, PrimeMode::Fixed, 0).unwrap();
        let result = eval_bouquet(&[], 5, 7, &params).unwrap();
        assert_eq!(result, 1 % params.m);
    }

    #[test]
    fn deterministic_given_same_inputs() {
        let params = build_params(4, 128, PrimeMode::Fixed, 0).unwrap();
        let bouquet = vec![15u128, 21, 35];
        let a = eval_bouquet(&bouquet, 10, 20, &params).unwrap();
        let b = eval_bouquet(&bouquet, 10, 20, &params).unwrap();
        assert_eq!(a, b);
        assert!(a < params.m);
    }

    #[test]
    fn zero_residue_compound_is_rejected() {
        let params = build_params(4, 128, PrimeMode::Fixed, 0).unwrap();
        let bouquet = vec![params.m, params.m * 2];
        let err = eval_bouquet(&bouquet, 1, 1, &params).unwrap_err();
        assert!(matches!(err, PcplError::ArithmeticError(_)));
    }

    #[test]
    fn different_phase_inputs_usually_diverge() {
        let params = build_params(4, 128, PrimeMode::Fixed, 0).unwrap();
        let bouquet = vec![999u128, 1001, 1003];
        let a = eval_bouquet(&bouquet, 1, 2, &params).unwrap();
        let b = eval_bouquet(&bouquet, 3, 4, &params).unwrap();
        assert_ne!(a, b);
    }
}
