//! Compound generation: five modes, a small prime pool, and the crate's
//! deterministic PRNG
//!
//! Fixture generation needs a source of randomness that two independent
//! implementations can reproduce byte-for-byte from the same seed, which
//! rules out a platform RNG. This uses a seeded counter-mode expansion over
//! the hash primitive instead. [`Prng`] is that expansion: it draws
//! successive 32-byte blocks `H(seed_material, "PRNG", k)` for
//! `k = 0, 1, 2, ...` and serves bytes out of them in order, refilling on
//! demand. Every compound/pool/permutation-key/seed-material draw anywhere
//! in this crate's fixture builder goes through this one generator.
//!
//! [`CompoundConfig`] and [`CompoundMode`] describe how a lane's bouquets are
//! populated: each compound is built from small prime factors and folded
//! **mod `M`** as it's built (see [`crate::bouquet`]'s module doc for why
//! this is equivalent to carrying the exact arbitrary-precision integer and
//! reducing only at the end).

use serde::{Deserialize, Serialize};

use crate::hashing::{bytes_mod_u128, h, Part};
use crate::params::{is_prime, mod_mul, mod_pow, Params, MAX_GENERATED_BITS};
use crate::PcplError;

/// Default small-prime pool, matching the original reference's fixed pool
/// (`examples/original_source/demo/pcpl_cycle_test.py`'s `PRIME_POOL`).
pub const DEFAULT_PRIME_POOL: [u128; 18] = [
    3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67,
];

/// Deterministic counter-mode stream over the crate's hashing primitive.
///
/// This is the crate's one source of pseudo-randomness, used exclusively by
/// the fixture builder and (in `Generated` prime mode) parameter derivation
/// — never inside the per-cycle derivation path itself, which must remain a
/// pure function of already-built `Params`/`ProviderSecrets`.
pub struct Prng {
    seed_material: [u8; 32],
    counter: u64,
    block: Vec<u8>,
    pos: usize,
}

impl Prng {
    /// Seed a stream from `(seed, label)`: `seed_material = H(seed, label)`,
    /// then blocks are `H(seed_material, "PRNG", k)` for increasing `k`.
    #[must_use]
    pub fn new(seed: u64, label: &str) -> Self {
        let seed_material = h(&[Part::int(u128::from(seed)), Part::ascii(label)], 32)
            .expect("fixed 32-byte digest is always in range");
        Self::from_material(
            seed_material
                .try_into()
                .expect("h(.., 32) returns exactly 32 bytes"),
        )
    }

    /// Seed a stream directly from 32 bytes of seed material (used when the
    /// caller has already derived the material itself, e.g. the fixture
    /// builder's `seed_material` draw).
    #[must_use]
    pub fn from_material(seed_material: [u8; 32]) -> Self {
        Self {
            seed_material,
            counter: 0,
            block: Vec::new(),
            pos: 0,
        }
    }

    fn refill(&mut self) {
        let block = h(
            &[
                Part::bytes(self.seed_material.as_slice()),
                Part::ascii("PRNG"),
                Part::int(u128::from(self.counter)),
            ],
            32,
        )
        .expect("fixed 32-byte digest is always in range");
        self.counter += 1;
        self.block = block;
        self.pos = 0;
    }

    /// Draw `n` pseudo-random bytes from the stream.
    pub fn next_bytes(&mut self, n: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            if self.pos >= self.block.len() {
                self.refill();
            }
            let take = (n - out.len()).min(self.block.len() - self.pos);
            out.extend_from_slice(&self.block[self.pos..self.pos + take]);
            self.pos += take;
        }
        out
    }

    /// Draw a uniform `u128` over the full range (used as a wide raw draw,
    /// e.g. prime-candidate generation).
    pub fn next_u128(&mut self) -> u128 {
        let bytes = self.next_bytes(16);
        u128::from_be_bytes(bytes.try_into().expect("next_bytes(16) returns 16 bytes"))
    }

    /// Draw a uniform integer in the inclusive range `[lo, hi]`.
    pub fn uniform_range(&mut self, lo: u128, hi: u128) -> u128 {
        assert!(hi >= lo, "uniform_range: hi must be >= lo");
        let span = hi - lo + 1;
        let draw = self.next_bytes(16);
        lo + bytes_mod_u128(&draw, span)
    }

    /// Draw one element of `pool` uniformly at random.
    pub fn choice<'a, T>(&mut self, pool: &'a [T]) -> &'a T {
        assert!(!pool.is_empty(), "choice: pool must be nonempty");
        let idx = self.uniform_range(0, (pool.len() - 1) as u128);
        &pool[idx as usize]
    }

    /// Draw a pseudo-random value in `[0.0, 1.0)`, used by `CompoundMode::Blend`.
    pub fn unit_interval(&mut self) -> f64 {
        let raw = u64::from_be_bytes(
            self.next_bytes(8)
                .try_into()
                .expect("next_bytes(8) returns 8 bytes"),
        );
        (raw as f64) / ((u64::MAX as f64) + 1.0)
    }
}

/// How a single compound is constructed from the prime pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompoundMode {
    /// Product of `primes_per_compound` pool draws, each to a uniform
    /// exponent in `[exponent_min, exponent_max]`.
    Classic,
    /// One pool prime raised to an exponent in `[max(2, exponent_min), exponent_max]`.
    PrimePower,
    /// Product of two independent pool draws (exponent 1 each).
    Semiprime,
    /// A classic compound plus a uniform integer in `[1, offset_max]` (a
    /// no-op when `offset_max == 0`).
    Offset,
    /// Randomly selects among the other four modes per draw, weighted
    /// `0.50 / 0.20 / 0.15 / 0.15` for classic / prime-power / semiprime / offset.
    Blend,
}

/// Immutable configuration describing how every compound in a fixture is
/// generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompoundConfig {
    /// Number of compounds per bouquet.
    pub num_compounds: usize,
    /// Prime factors multiplied together per `Classic`/`Offset` compound.
    pub primes_per_compound: usize,
    /// Generation mode.
    pub mode: CompoundMode,
    /// Inclusive upper bound for `CompoundMode::Offset`'s additive term
    /// (`0` disables the offset).
    pub offset_max: u128,
    /// Inclusive lower bound for exponents.
    pub exponent_min: u32,
    /// Inclusive upper bound for exponents.
    pub exponent_max: u32,
    /// The pool compounds are drawn from; must be nonempty.
    pub prime_pool: Vec<u128>,
}

/// Build a [`CompoundConfig`], optionally generating its own prime pool.
///
/// If `compound_prime_bits > 0`, a pool of `pool_size` distinct primes of
/// `compound_prime_bits` bits (excluding `params.m`) is generated
/// deterministically from `H(seed, pool_label)` interpreted as a PRNG seed.
/// Otherwise [`DEFAULT_PRIME_POOL`] is used.
///
/// # Errors
/// Returns [`PcplError::InvalidParameter`] if `num_compounds == 0`,
/// `primes_per_compound == 0`, `exponent_min > exponent_max`, or the
/// resulting pool would be empty.
#[allow(clippy::too_many_arguments)]
pub fn build_compound_config(
    seed: u64,
    params: &Params,
    num_compounds: usize,
    primes_per_compound: usize,
    mode: CompoundMode,
    offset_max: u128,
    exponent_min: u32,
    exponent_max: u32,
    compound_prime_bits: u32,
    pool_size: usize,
    pool_label: &str,
) -> Result<CompoundConfig, PcplError> {
    if num_compounds == 0 {
        return Err(PcplError::InvalidParameter(
            "num_compounds must be positive".to_string(),
        ));
    }
    if primes_per_compound == 0 {
        return Err(PcplError::InvalidParameter(
            "primes_per_compound must be positive".to_string(),
        ));
    }
    if exponent_min > exponent_max {
        return Err(PcplError::InvalidParameter(format!(
            "exponent_min ({exponent_min}) must be <= exponent_max ({exponent_max})"
        )));
    }

    let prime_pool = if compound_prime_bits > 0 {
        generate_prime_pool(seed, pool_label, compound_prime_bits, pool_size, params.m)?
    } else {
        DEFAULT_PRIME_POOL.to_vec()
    };
    if prime_pool.is_empty() {
        return Err(PcplError::InvalidParameter(
            "prime_pool must be nonempty".to_string(),
        ));
    }

    Ok(CompoundConfig {
        num_compounds,
        primes_per_compound,
        mode,
        offset_max,
        exponent_min,
        exponent_max,
        prime_pool,
    })
}

fn generate_prime_pool(
    seed: u64,
    pool_label: &str,
    bits: u32,
    pool_size: usize,
    avoid: u128,
) -> Result<Vec<u128>, PcplError> {
    // `is_prime` below widens modulo the candidate itself, so the same
    // MAX_GENERATED_BITS bound params::generate_prime enforces applies here.
    if bits == 0 || bits > MAX_GENERATED_BITS {
        return Err(PcplError::InvalidParameter(format!(
            "compound_prime_bits out of range: {bits} (must be <= {MAX_GENERATED_BITS})"
        )));
    }
    let seed_digest = h(&[Part::int(u128::from(seed)), Part::ascii(pool_label)], 8)?;
    let prng_seed = u64::from_be_bytes(
        seed_digest
            .try_into()
            .expect("h(.., 8) returns exactly 8 bytes"),
    );
    let mut prng = Prng::new(prng_seed, "COMPOUND_POOL");

    let top_bit = 1u128 << (bits - 1);
    let mask = (1u128 << bits) - 1;
    let mut pool = Vec::with_capacity(pool_size);
    while pool.len() < pool_size {
        let mut candidate = prng.next_u128() & mask;
        candidate |= top_bit;
        candidate |= 1;
        if candidate != avoid && is_prime(candidate) && !pool.contains(&candidate) {
            pool.push(candidate);
        }
    }
    Ok(pool)
}

/// Raise `base` to `exp` and fold the result mod `m` into `acc`, i.e.
/// `acc = acc * base^exp mod m`.
fn fold_prime_power(acc: u128, base: u128, exp: u32, m: u128) -> u128 {
    mod_mul(acc, mod_pow(base % m, u128::from(exp), m), m)
}

/// Draw one compound under `cfg`, returning its residue mod `params.m`.
///
/// The compound is folded mod `M` as it is built rather than materialized as
/// an exact arbitrary-precision integer.
pub fn generate_compound(prng: &mut Prng, cfg: &CompoundConfig, params: &Params) -> u128 {
    match cfg.mode {
        CompoundMode::Classic => generate_classic(prng, cfg, params.m),
        CompoundMode::PrimePower => generate_prime_power(prng, cfg, params.m),
        CompoundMode::Semiprime => generate_semiprime(prng, cfg, params.m),
        CompoundMode::Offset => generate_offset(prng, cfg, params.m),
        CompoundMode::Blend => {
            let roll = prng.unit_interval();
            if roll < 0.5 {
                generate_classic(prng, cfg, params.m)
            } else if roll < 0.7 {
                generate_prime_power(prng, cfg, params.m)
            } else if roll < 0.85 {
                generate_semiprime(prng, cfg, params.m)
            } else {
                generate_offset(prng, cfg, params.m)
            }
        }
    }
}

fn generate_classic(prng: &mut Prng, cfg: &CompoundConfig, m: u128) -> u128 {
    let mut acc = 1u128 % m;
    for _ in 0..cfg.primes_per_compound {
        let prime = *prng.choice(&cfg.prime_pool);
        let exp = prng.uniform_range(u128::from(cfg.exponent_min), u128::from(cfg.exponent_max));
        acc = fold_prime_power(acc, prime, exp as u32, m);
    }
    acc
}

fn generate_prime_power(prng: &mut Prng, cfg: &CompoundConfig, m: u128) -> u128 {
    let prime = *prng.choice(&cfg.prime_pool);
    let lo = cfg.exponent_min.max(2);
    let hi = lo.max(cfg.exponent_max);
    let exp = prng.uniform_range(u128::from(lo), u128::from(hi));
    fold_prime_power(1u128 % m, prime, exp as u32, m)
}

fn generate_semiprime(prng: &mut Prng, cfg: &CompoundConfig, m: u128) -> u128 {
    let a = *prng.choice(&cfg.prime_pool);
    let b = *prng.choice(&cfg.prime_pool);
    mod_mul(a % m, b % m, m)
}

fn generate_offset(prng: &mut Prng, cfg: &CompoundConfig, m: u128) -> u128 {
    let classic = generate_classic(prng, cfg, m);
    if cfg.offset_max == 0 {
        return classic;
    }
    let offset = prng.uniform_range(1, cfg.offset_max);
    (classic + offset % m) % m
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{build_params, PrimeMode};

    fn params() -> Params {
        build_params(4, 128, PrimeMode::Fixed, 0).unwrap()
    }

    fn cfg(mode: CompoundMode, params: &Params) -> CompoundConfig {
        build_compound_config(1337, params, 4, 3, mode, 5, 1, 3, 0, 0, "POOL").unwrap()
    }

    #[test]
    fn prng_is_deterministic() {
        let mut a = Prng::new(42, "x");
        let mut b = Prng::new(42, "x");
        assert_eq!(a.next_bytes(100), b.next_bytes(100));
    }

    #[test]
    fn prng_refills_across_block_boundary() {
        let mut prng = Prng::new(1, "boundary");
        let long = prng.next_bytes(100);
        assert_eq!(long.len(), 100);
        // Different labels/seeds must (almost surely) diverge.
        let mut other = Prng::new(2, "boundary");
        assert_ne!(long, other.next_bytes(100));
    }

    #[test]
    fn all_modes_produce_in_range_residues() {
        let p = params();
        for mode in [
            CompoundMode::Classic,
            CompoundMode::PrimePower,
            CompoundMode::Semiprime,
            CompoundMode::Offset,
            CompoundMode::Blend,
        ] {
            let c = cfg(mode, &p);
            let mut prng = Prng::new(7, "gen");
            for _ in 0..20 {
                let v = generate_compound(&mut prng, &c, &p);
                assert!(v < p.m);
            }
        }
    }

    #[test]
    fn deterministic_compound_stream() {
        let p = params();
        let c = cfg(CompoundMode::Classic, &p);
        let mut a = Prng::new(99, "stream");
        let mut b = Prng::new(99, "stream");
        let va: Vec<u128> = (0..10).map(|_| generate_compound(&mut a, &c, &p)).collect();
        let vb: Vec<u128> = (0..10).map(|_| generate_compound(&mut b, &c, &p)).collect();
        assert_eq!(va, vb);
    }

    #[test]
    fn generated_pool_excludes_m_and_is_distinct() {
        let p = params();
        let pool = generate_prime_pool(5, "POOL", 16, 6, p.m).unwrap();
        assert_eq!(pool.len(), 6);
        let unique: std::collections::HashSet<_> = pool.iter().collect();
        assert_eq!(unique.len(), pool.len());
        assert!(pool.iter().all(|&v| v != p.m && is_prime(v)));
    }

    #[test]
    fn rejects_bad_exponent_range() {
        let p = params();
        let err = build_compound_config(1, &p, 4, 3, CompoundMode::Classic, 0, 5, 2, 0, 0, "P")
            .unwrap_err();
        assert!(matches!(err, PcplError::InvalidParameter(_)));
    }

    /// Scenario F: `--compound-mode semiprime` with `--compound-prime-bits=16`
    /// exercises the generated prime pool path together with the semiprime
    /// compound shape, and invariants still hold (residues stay in range,
    /// generation is deterministic given the same seed).
    #[test]
    fn scenario_f_semiprime_with_generated_pool() {
        let p = params();
        let cfg = build_compound_config(
            2024,
            &p,
            4,
            2,
            CompoundMode::Semiprime,
            0,
            1,
            3,
            16,
            12,
            "POOL",
        )
        .unwrap();
        assert_eq!(cfg.prime_pool.len(), 12);
        assert!(cfg.prime_pool.iter().all(|&v| is_prime(v) && v != p.m));

        let mut a = Prng::new(7, "scenario-f");
        let mut b = Prng::new(7, "scenario-f");
        for _ in 0..10 {
            let va = generate_compound(&mut a, &cfg, &p);
            let vb = generate_compound(&mut b, &cfg, &p);
            assert_eq!(va, vb);
            assert!(va < p.m);
        }
    }
}
