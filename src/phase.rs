//! Phase clock: per-cycle residues, cross products, and the phase digest
//!
//! `phase_clock(t)` is a pure, total function of `(t, params)`. It has no
//! state and cannot fail for any `t` — there is no `Result` in its
//! signature.

use serde::{Deserialize, Serialize};

use crate::hashing::{h, Part};
use crate::params::Params;

/// The derived phase for one cycle `t`: three residues, their pairwise
/// cross products mod `M`, and the 32-byte domain-separated digest `φ` that
/// binds them all together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    /// `(a0 + t) mod P`.
    pub a: u128,
    /// `(b0 + t) mod Q`.
    pub b: u128,
    /// `(c0 + t) mod R`.
    pub c: u128,
    /// `(a * b) mod M`.
    pub u1: u128,
    /// `(b * c) mod M`.
    pub u2: u128,
    /// `(c * a) mod M`.
    pub u3: u128,
    /// 32-byte phase digest binding the tuple above.
    pub phi: [u8; 32],
}

/// Compute the phase for cycle `t` under `params`.
///
/// This never fails: every residue is reduced modulo a positive prime, and
/// the digest call uses a fixed, in-range output length.
#[must_use]
#[tracing::instrument(level = "trace", skip(params))]
pub fn phase_clock(t: u64, params: &Params) -> Phase {
    let t = u128::from(t);
    let a = (params.a0 + t) % params.p;
    let b = (params.b0 + t) % params.q;
    let c = (params.c0 + t) % params.r;

    // a, b, c are residues mod P, Q, R respectively, not mod M, and each of
    // P, Q, R may itself be close to the full u128 range in Generated mode;
    // mod_mul reduces both operands mod M before multiplying so this can't
    // overflow, and (a*b) mod M == ((a mod M)*(b mod M)) mod M regardless of
    // how large a and b are.
    let u1 = crate::params::mod_mul(a, b, params.m);
    let u2 = crate::params::mod_mul(b, c, params.m);
    let u3 = crate::params::mod_mul(c, a, params.m);

    let digest = h(
        &[
            Part::int(a),
            Part::int(b),
            Part::int(c),
            Part::int(u1),
            Part::int(u2),
            Part::int(u3),
            Part::ascii("PHASE"),
        ],
        32,
    )
    .expect("phase digest: fixed 32-byte output is always in range");

    let mut phi = [0u8; 32];
    phi.copy_from_slice(&digest);

    Phase {
        a,
        b,
        c,
        u1,
        u2,
        u3,
        phi,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{build_params, PrimeMode};

    #[test]
    fn deterministic_across_calls() {
        let params = build_params(4, 128, PrimeMode::Fixed, 0).unwrap();
        let a = phase_clock(12345, &params);
        let b = phase_clock(12345, &params);
        assert_eq!(a, b);
    }

    #[test]
    fn residues_are_in_range() {
        let params = build_params(4, 128, PrimeMode::Fixed, 0).unwrap();
        for t in [0u64, 1, 2, 999_999, 1_000_050] {
            let phase = phase_clock(t, &params);
            assert!(phase.a < params.p);
            assert!(phase.b < params.q);
            assert!(phase.c < params.r);
            assert!(phase.u1 < params.m);
            assert!(phase.u2 < params.m);
            assert!(phase.u3 < params.m);
        }
    }

    #[test]
    fn period_is_lcm_of_small_generated_primes() {
        // Structural oracle: phase_clock(t + period).phi == phase_clock(t).phi
        // where period = lcm(P,Q,R). Keep the primes small so the period is
        // small enough to test directly.
        let mode = crate::params::PrimeMode::Generated {
            prime_bits: 8,
            modulus_bits: 16,
        };
        let params = build_params(3, 32, mode, 7).unwrap();

        fn gcd(a: u128, b: u128) -> u128 {
            if b == 0 {
                a
            } else {
                gcd(b, a % b)
            }
        }
        fn lcm(a: u128, b: u128) -> u128 {
            a / gcd(a, b) * b
        }
        let period = lcm(lcm(params.p, params.q), params.r);
        if period < 5_000 {
            let a = phase_clock(10, &params);
            let b = phase_clock(10 + period as u64, &params);
            assert_eq!(a.phi, b.phi);
            assert_eq!(a, b);
        }
    }
}
