//! Structural parameters: primes `P, Q, R`, modulus `M`, and size constants
//!
//! `Params` is a small, validated, immutable bundle that every other module
//! takes by reference. Two modes are supported:
//!
//! - [`PrimeMode::Fixed`]: `P`, `Q`, `R` are the first primes at or above
//!   fixed floors (coprime with `x`), and `M = 2^61 - 1` (a known Mersenne
//!   prime).
//! - [`PrimeMode::Generated`]: `P`, `Q`, `R`, `M` are drawn deterministically
//!   from a user seed via the crate's counter-mode PRNG
//!   ([`crate::compound::Prng`]) and tested for primality with Miller-Rabin.
//!
//! All arithmetic here fits in `u128`: `M^2 < 2^122` is a standing invariant,
//! enforced at construction by capping every generated prime (`P`, `Q`, `R`,
//! `M`) at [`MAX_GENERATED_BITS`] bits — so every modular multiplication
//! downstream — bouquet evaluation, modular exponentiation, chain products,
//! and `is_prime`'s own Miller-Rabin witnesses — can widen to `u128` and
//! reduce without ever needing arbitrary-precision integers or risking
//! silent overflow.

use serde::{Deserialize, Serialize};

use crate::compound::Prng;
use crate::PcplError;

/// Largest bit width this crate will generate a prime at, for `P`, `Q`, `R`,
/// or `M`. `mod_mul`/`mod_pow`/`is_prime` widen every modular product through
/// a native `u128` multiply, so a modulus must satisfy `modulus^2 < 2^128`;
/// this bound (61 bits, matching fixed-mode `M = 2^61 - 1`) keeps every
/// modulus's square comfortably inside `u128` with headroom to spare (the
/// module doc's `M^2 < 2^122` invariant), rather than merely avoiding the
/// literal `u128` overflow boundary.
pub const MAX_GENERATED_BITS: u32 = 61;

/// How the structural primes `P, Q, R` and modulus `M` are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrimeMode {
    /// Fixed, well-known constants.
    Fixed,
    /// Deterministically generated from a seed at a chosen bit width.
    Generated {
        /// Bit width of each of `P`, `Q`, `R` (must be `>= 8`).
        prime_bits: u32,
        /// Bit width of `M` (must be `>= 16`).
        modulus_bits: u32,
    },
}

/// Immutable, validated structural parameters shared by every module.
///
/// Invariant (checked at construction): `{P, Q, R}` are three distinct
/// primes, each coprime with `x`; `M` is coprime with `x`; `token_bytes <= 64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    /// Number of provider lanes (`x >= 2`).
    pub x: usize,
    /// First structural prime.
    pub p: u128,
    /// Second structural prime.
    pub q: u128,
    /// Third structural prime.
    pub r: u128,
    /// Modulus for cross products, bouquet evaluation, and chain products.
    pub m: u128,
    /// Initial offset for the `a` residue (fixed at 1 by the scheme).
    pub a0: u128,
    /// Initial offset for the `b` residue (fixed at 2 by the scheme).
    pub b0: u128,
    /// Initial offset for the `c` residue (fixed at 3 by the scheme).
    pub c0: u128,
    /// Token size in bits (`> 0`).
    pub token_bits: u32,
    /// `ceil(token_bits / 8)`, always `<= 64`.
    pub token_bytes: usize,
    /// Length of the chained seed `S`, in bytes (default 32).
    pub seed_bytes: usize,
    /// `ceil(log2(M) / 8)`, the fixed width used to encode chain products.
    pub mod_bytes: usize,
}

impl Params {
    /// `th_len` used by [`crate::device::lane_token`]'s tokenization hash:
    /// `max(32, token_bytes)`.
    #[must_use]
    pub fn tokenization_out_len(&self) -> usize {
        self.token_bytes.max(32)
    }
}

/// Build [`Params`] for `x` lanes and a `token_bits`-wide token, per `mode`.
///
/// # Errors
/// Returns [`PcplError::InvalidParameter`] if `x < 2`, `token_bits == 0`,
/// `token_bits > 128`, `token_bytes > 64`, `{P,Q,R}` are not three distinct
/// primes coprime with `x`, or `gcd(M, x) != 1`.
pub fn build_params(x: usize, token_bits: u32, mode: PrimeMode, seed: u64) -> Result<Params, PcplError> {
    if x < 2 {
        return Err(PcplError::InvalidParameter(format!(
            "x must be at least 2, got {x}"
        )));
    }
    if token_bits == 0 {
        return Err(PcplError::InvalidParameter(
            "token_bits must be positive".to_string(),
        ));
    }
    // W is stored as Vec<u128> and trunc_bits caps its output at 128 bits;
    // reject wider tokens here instead of failing downstream in
    // build_fixture/lane_token.
    if token_bits > 128 {
        return Err(PcplError::InvalidParameter(format!(
            "token_bits must be at most 128 (W is stored as u128), got {token_bits}"
        )));
    }
    let token_bytes = ((token_bits + 7) / 8) as usize;
    if token_bytes > 64 {
        return Err(PcplError::InvalidParameter(format!(
            "token_bits too large for blake2b truncation: {token_bits} bits -> {token_bytes} bytes"
        )));
    }

    let (p, q, r, m) = match mode {
        PrimeMode::Fixed => {
            let p = next_prime_avoiding(1_000_003, x as u128);
            let q = next_prime_avoiding(1_000_033, x as u128);
            let r = next_prime_avoiding(1_000_037, x as u128);
            let m = (1u128 << 61) - 1;
            (p, q, r, m)
        }
        PrimeMode::Generated {
            prime_bits,
            modulus_bits,
        } => {
            if prime_bits < 8 || prime_bits > MAX_GENERATED_BITS {
                return Err(PcplError::InvalidParameter(format!(
                    "prime_bits must be in [8, {MAX_GENERATED_BITS}], got {prime_bits}"
                )));
            }
            if modulus_bits < 16 || modulus_bits > MAX_GENERATED_BITS {
                return Err(PcplError::InvalidParameter(format!(
                    "modulus_bits must be in [16, {MAX_GENERATED_BITS}], got {modulus_bits}"
                )));
            }
            let mut prng = Prng::new(seed, "PARAMS_PRIMES");
            let p = generate_prime(&mut prng, prime_bits, x as u128, &[])?;
            let q = generate_prime(&mut prng, prime_bits, x as u128, &[p])?;
            let r = generate_prime(&mut prng, prime_bits, x as u128, &[p, q])?;
            let m = generate_prime(&mut prng, modulus_bits, x as u128, &[p, q, r])?;
            (p, q, r, m)
        }
    };

    if [p, q, r].iter().collect::<std::collections::HashSet<_>>().len() != 3 {
        return Err(PcplError::InvalidParameter(
            "P, Q, R must be three distinct primes".to_string(),
        ));
    }
    if gcd(m, x as u128) != 1 {
        return Err(PcplError::InvalidParameter(format!(
            "M must be coprime with x (M={m}, x={x})"
        )));
    }

    let mod_bytes = ((bit_length(m) + 7) / 8).max(1) as usize;

    Ok(Params {
        x,
        p,
        q,
        r,
        m,
        a0: 1,
        b0: 2,
        c0: 3,
        token_bits,
        token_bytes,
        seed_bytes: 32,
        mod_bytes,
    })
}

fn bit_length(mut value: u128) -> u32 {
    let mut bits = 0u32;
    while value > 0 {
        bits += 1;
        value >>= 1;
    }
    bits
}

/// Euclid's algorithm.
#[must_use]
pub fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

/// Smallest prime `>= start` that is coprime with `avoid`.
fn next_prime_avoiding(start: u128, avoid: u128) -> u128 {
    let mut candidate = start;
    loop {
        if is_prime(candidate) && gcd(candidate, avoid) == 1 {
            return candidate;
        }
        candidate += 1;
    }
}

/// Deterministically draw a `bits`-wide prime from `prng`, coprime with
/// `avoid` and distinct from every value in `excluded`.
///
/// `bits` must be at most [`MAX_GENERATED_BITS`]: beyond that, a candidate's
/// own square can overflow the `u128` arithmetic `mod_mul`/`mod_pow` (and
/// therefore `is_prime`'s Miller-Rabin test) rely on, making primality
/// testing itself unsound.
fn generate_prime(
    prng: &mut Prng,
    bits: u32,
    avoid: u128,
    excluded: &[u128],
) -> Result<u128, PcplError> {
    if bits == 0 || bits > MAX_GENERATED_BITS {
        return Err(PcplError::InvalidParameter(format!(
            "prime bit width out of range: {bits} (must be <= {MAX_GENERATED_BITS})"
        )));
    }
    // Top bit set, odd (matches the reference's candidate discipline).
    let top_bit = 1u128 << (bits - 1);
    let mask = (1u128 << bits) - 1;
    loop {
        let mut candidate = prng.next_u128() & mask;
        candidate |= top_bit;
        candidate |= 1;
        if is_prime(candidate) && gcd(candidate, avoid) == 1 && !excluded.contains(&candidate) {
            return Ok(candidate);
        }
    }
}

/// Deterministic Miller-Rabin primality test with a fixed witness set
/// sufficient for correctness on all integers below `2^64` (and used here,
/// conservatively, up to the `u128` domain this crate works in).
///
/// Witnesses: `{2,3,5,7,11,13,17,19,23,29,31,37}`.
#[must_use]
pub fn is_prime(n: u128) -> bool {
    const WITNESSES: [u128; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];
    if n < 2 {
        return false;
    }
    for &wp in &WITNESSES {
        if n == wp {
            return true;
        }
        if n % wp == 0 {
            return false;
        }
    }
    let mut d = n - 1;
    let mut s = 0u32;
    while d % 2 == 0 {
        d /= 2;
        s += 1;
    }
    'witness: for &a in &WITNESSES {
        if a >= n {
            continue;
        }
        let mut x = mod_pow(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 0..s.saturating_sub(1) {
            x = mod_mul(x, x, n);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// `(base * other) mod modulus`, widening through `u128`'s own multiply since
/// `modulus^2 < 2^122` is a standing crate invariant for every `modulus` this
/// function is called with.
#[must_use]
pub fn mod_mul(base: u128, other: u128, modulus: u128) -> u128 {
    debug_assert!(modulus > 0);
    (base % modulus).wrapping_mul(other % modulus) % modulus
}

/// Modular exponentiation by repeated squaring, `base^exp mod modulus`.
#[must_use]
pub fn mod_pow(mut base: u128, mut exp: u128, modulus: u128) -> u128 {
    if modulus == 1 {
        return 0;
    }
    let mut acc = 1u128 % modulus;
    base %= modulus;
    while exp > 0 {
        if exp & 1 == 1 {
            acc = mod_mul(acc, base, modulus);
        }
        base = mod_mul(base, base, modulus);
        exp >>= 1;
    }
    acc
}
