//! Minimal CLI driver for the phase-cycled lane simulation
//!
//! Builds parameters, a fixture, and runs `cycles` cycles through the
//! validator, printing a short summary. Exit code 0 on success, nonzero on
//! any assertion failure.

#![forbid(unsafe_code)]

use std::env;

use pcpl_core::compound::{build_compound_config, CompoundMode};
use pcpl_core::device::device_cycle;
use pcpl_core::fixture::build_fixture;
use pcpl_core::params::{build_params, PrimeMode};
use pcpl_core::validator::{validate_chaining, validate_cycles, validate_permutation};

fn parse_flag(args: &[String], key: &str) -> Option<String> {
    let mut it = args.iter();
    while let Some(a) = it.next() {
        if a == key {
            return it.next().cloned();
        }
    }
    None
}

fn has_flag(args: &[String], key: &str) -> bool {
    args.iter().any(|a| a == key)
}

fn parse_u64(args: &[String], key: &str, default: u64) -> u64 {
    parse_flag(args, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_usize(args: &[String], key: &str, default: usize) -> usize {
    parse_flag(args, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_u32(args: &[String], key: &str, default: u32) -> u32 {
    parse_flag(args, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_u128(args: &[String], key: &str, default: u128) -> u128 {
    parse_flag(args, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_compound_mode(args: &[String]) -> CompoundMode {
    match parse_flag(args, "--compound-mode").as_deref() {
        Some("prime-power") => CompoundMode::PrimePower,
        Some("semiprime") => CompoundMode::Semiprime,
        Some("offset") => CompoundMode::Offset,
        Some("blend") => CompoundMode::Blend,
        _ => CompoundMode::Classic,
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .try_init();
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let verbose = has_flag(&args, "--verbose");
    init_tracing(verbose);

    let x = parse_usize(&args, "--x", 4);
    let cycles = parse_u64(&args, "--cycles", 200);
    let seed = parse_u64(&args, "--seed", 1337);
    let token_bits = parse_u32(&args, "--token-bits", 128);
    let no_chaining_check = has_flag(&args, "--no-chaining-check");

    let prime_mode = match parse_flag(&args, "--prime-mode").as_deref() {
        Some("generated") => PrimeMode::Generated {
            prime_bits: parse_u32(&args, "--prime-bits", 48),
            modulus_bits: parse_u32(&args, "--modulus-bits", 61),
        },
        _ => PrimeMode::Fixed,
    };

    let compound_mode = parse_compound_mode(&args);
    let compound_count = parse_usize(&args, "--compound-count", 8);
    let compound_primes = parse_usize(&args, "--compound-primes", 3);
    let compound_offset = parse_u128(&args, "--compound-offset", 0);
    let compound_prime_bits = parse_u32(&args, "--compound-prime-bits", 0);
    let compound_pool_size = parse_usize(&args, "--compound-pool-size", 32);

    tracing::info!(x, cycles, seed, token_bits, ?prime_mode, "building parameters");
    let params = build_params(x, token_bits, prime_mode, seed)?;

    if has_flag(&args, "--show-params") {
        println!("{}", serde_json::to_string_pretty(&params)?);
    }

    let compound_cfg = build_compound_config(
        seed,
        &params,
        compound_count,
        compound_primes,
        compound_mode,
        compound_offset,
        1,
        3,
        compound_prime_bits,
        compound_pool_size,
        "POOL",
    )?;

    tracing::info!("building fixture");
    let (secrets, mut state) = build_fixture(&params, seed, &compound_cfg)?;

    tracing::info!(cycles, "validating permutation schedule");
    validate_permutation(&params, &state.perm_key, cycles)?;

    tracing::info!(cycles, "running and validating cycles");
    validate_cycles(&params, &secrets, &mut state, cycles)?;

    if !no_chaining_check {
        tracing::info!("running chaining divergence check");
        validate_chaining(&params, seed, &compound_cfg)?;
    }

    // Emit a terse trace of the first and last few cycles by re-running from
    // a fresh fixture; validate_cycles above already consumed `state`.
    let (_secrets, mut trace_state) = build_fixture(&params, seed, &compound_cfg)?;
    let preview = cycles.min(5);
    for t in 0..preview {
        let (idx, token) = device_cycle(t, &params, &mut trace_state)?;
        println!("t={t} idx={idx} token={token}");
    }

    println!("ok: {cycles} cycles, x={x}, no assertion failures");
    Ok(())
}
