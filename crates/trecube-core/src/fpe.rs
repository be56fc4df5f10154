//! Format-preserving shuffles of `[0, n)`.
//!
//! [`thorp`] is keyed and invertible. [`swap_or_not`] and
//! [`sometimes_recurse`] draw their round keys fresh from the caller's
//! randomness on each call, so they cannot be undone and only serve
//! benchmarking.

use rug::Integer;
use trecube_types::{Result, TrecubeError};

use crate::keys::ShuffleKey;
use crate::random::RandomSource;

fn check_domain(x: &Integer, n: &Integer) -> Result<()> {
    if *n < 1 {
        return Err(TrecubeError::Configuration(format!(
            "shuffle domain must be non-empty, got {}",
            n
        )));
    }
    if *x < 0 || x >= n {
        return Err(TrecubeError::InvalidMessage(format!(
            "{} is outside the shuffle domain [0, {})",
            x, n
        )));
    }
    Ok(())
}

/// The Thorp round needs an even domain; odd domains are extended by the
/// single point `n`, which each round walks past.
fn padded_domain(n: &Integer) -> Integer {
    if n.is_even() {
        n.clone()
    } else {
        Integer::from(n + 1u32)
    }
}

fn thorp_round(x: &Integer, m: &Integer, bit: bool) -> Integer {
    let mut y = x.clone();
    y <<= 1;
    if y >= *m {
        y -= m;
        if !bit {
            y += 1;
        }
    } else if bit {
        y += 1;
    }
    y
}

fn inverse_thorp_round(y: &Integer, m: &Integer, bit: bool) -> Integer {
    let mut x = y.clone();
    if y.is_odd() != bit {
        x += m;
    }
    x >>= 1;
    x
}

/// Keyed Thorp shuffle of `x` over `[0, n)` for `rounds` rounds; round `i`
/// uses key bit `i`.
pub fn thorp(x: &Integer, n: &Integer, rounds: u64, key: &ShuffleKey) -> Result<Integer> {
    check_domain(x, n)?;
    key.ensure_rounds(rounds)?;

    let m = padded_domain(n);
    let mut y = x.clone();
    for i in 0..rounds {
        let bit = key.bit(i);
        y = thorp_round(&y, &m, bit);
        if y == *n {
            y = thorp_round(&y, &m, bit);
        }
    }
    Ok(y)
}

/// Inverse of [`thorp`] under the same key and round count.
pub fn inverse_thorp(y: &Integer, n: &Integer, rounds: u64, key: &ShuffleKey) -> Result<Integer> {
    check_domain(y, n)?;
    key.ensure_rounds(rounds)?;

    let m = padded_domain(n);
    let mut x = y.clone();
    for i in (0..rounds).rev() {
        let bit = key.bit(i);
        x = inverse_thorp_round(&x, &m, bit);
        if x == *n {
            x = inverse_thorp_round(&x, &m, bit);
        }
    }
    Ok(x)
}

/// Swap-or-not: each round, with probability 1/2, maps `x` to `K - x mod n`
/// for a fresh uniform `K`.
pub fn swap_or_not(x: &Integer, n: &Integer, rounds: u64, rng: &mut RandomSource) -> Result<Integer> {
    check_domain(x, n)?;

    let mut y = x.clone();
    for _ in 0..rounds {
        if rng.next_bit() {
            let k = rng.uniform_below(n)?;
            y = Integer::from(&k - &y);
            if y < 0 {
                y += n;
            }
        }
    }
    Ok(y)
}

/// Sometimes-recurse over swap-or-not: results landing in the lower half of
/// the current domain are shuffled again within that half.
///
/// Recursion stops once the half would be a single point. The current value
/// is returned as is at that point, not reset to 0, so small domains keep
/// more than one output.
pub fn sometimes_recurse(
    x: &Integer,
    n: &Integer,
    rounds: u64,
    rng: &mut RandomSource,
) -> Result<Integer> {
    let mut bound = n.clone();
    let mut y = swap_or_not(x, &bound, rounds, rng)?;
    loop {
        let half = Integer::from(&bound >> 1u32);
        if half <= 1 || y >= half {
            return Ok(y);
        }
        bound = half;
        y = swap_or_not(&y, &bound, rounds, rng)?;
    }
}
