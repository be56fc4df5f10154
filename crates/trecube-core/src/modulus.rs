use rug::Integer;
use rug::integer::IsPrime;
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info, instrument};
use trecube_types::{Result, TrecubeError};

use crate::config::PuzzleConfig;
use crate::random::RandomSource;

/// Smallest safe prime size: 5 is the first odd prime congruent to 2 mod 3.
pub const MIN_SAFE_PRIME_BITS: u32 = 3;

/// Bits of every factor drawn for a product modulus.
pub const POOL_PRIME_BITS: u32 = 32;

// Bits of multiplier headroom required between a known prime and the target.
const MULTIPLIER_SLACK_BITS: u32 = 24;

const SMALL_PRIMES: [u32; 23] = [
    5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89, 97,
];

/// A prime of the form `multiplier * 2^exponent + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownPrime {
    pub multiplier: u64,
    pub exponent: u32,
    pub offset: i64,
}

impl KnownPrime {
    const fn pseudo_mersenne(exponent: u32, offset: i64) -> Self {
        KnownPrime {
            multiplier: 1,
            exponent,
            offset,
        }
    }

    pub fn value(&self) -> Integer {
        let mut value = Integer::from(self.multiplier) << self.exponent;
        value += self.offset;
        value
    }

    pub fn bits(&self) -> u32 {
        self.value().significant_bits()
    }
}

/// Proven primes used as the large factor `q` of Pocklington candidates,
/// sorted by size. Mersenne primes plus the SafeCurves field primes.
pub const KNOWN_PRIMES: &[KnownPrime] = &[
    KnownPrime::pseudo_mersenne(61, -1),
    KnownPrime::pseudo_mersenne(89, -1),
    KnownPrime::pseudo_mersenne(107, -1),
    KnownPrime::pseudo_mersenne(127, -1),
    KnownPrime::pseudo_mersenne(130, -5),
    KnownPrime::pseudo_mersenne(221, -3),
    KnownPrime::pseudo_mersenne(251, -9),
    KnownPrime::pseudo_mersenne(255, -19),
    KnownPrime::pseudo_mersenne(382, -105),
    KnownPrime::pseudo_mersenne(383, -187),
    KnownPrime::pseudo_mersenne(414, -17),
    KnownPrime::pseudo_mersenne(511, -187),
    KnownPrime::pseudo_mersenne(521, -1),
    KnownPrime::pseudo_mersenne(607, -1),
    KnownPrime::pseudo_mersenne(1279, -1),
    KnownPrime::pseudo_mersenne(2203, -1),
    KnownPrime::pseudo_mersenne(2281, -1),
    KnownPrime::pseudo_mersenne(3217, -1),
    KnownPrime::pseudo_mersenne(4253, -1),
    KnownPrime::pseudo_mersenne(4423, -1),
    KnownPrime::pseudo_mersenne(9689, -1),
    KnownPrime::pseudo_mersenne(9941, -1),
    KnownPrime::pseudo_mersenne(11213, -1),
    KnownPrime::pseudo_mersenne(19937, -1),
    KnownPrime::pseudo_mersenne(21701, -1),
    KnownPrime::pseudo_mersenne(23209, -1),
    KnownPrime::pseudo_mersenne(44497, -1),
    KnownPrime::pseudo_mersenne(86243, -1),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModulusKind {
    SafePrime,
    PrimePower { exponent: u32 },
    Product { factors: usize, two_power: u32 },
}

/// Which family of modulus to build, and how large.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModulusRequest {
    SafePrime { bits: u32 },
    PrimePower { secpar: u32, bits: u32 },
    Product { nprimes: usize, bits: u32 },
}

/// A modulus `N` on which cubing is a bijection of the units, together with
/// the trapdoor exponent `b = 3^-1 mod phi(N)`.
#[derive(Clone)]
pub struct CubingModulus {
    modulus: Integer,
    trapdoor: Integer,
    kind: ModulusKind,
}

impl fmt::Debug for CubingModulus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CubingModulus")
            .field("bits", &self.bits())
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl CubingModulus {
    pub fn modulus(&self) -> &Integer {
        &self.modulus
    }

    /// Secret exponent; whoever holds it opens puzzles without the delay.
    pub fn trapdoor(&self) -> &Integer {
        &self.trapdoor
    }

    pub fn kind(&self) -> ModulusKind {
        self.kind
    }

    pub fn bits(&self) -> u32 {
        self.modulus.significant_bits()
    }

    pub fn cube(&self, x: &Integer) -> Result<Integer> {
        pow_mod(x, &Integer::from(3), &self.modulus)
    }

    pub fn cube_root(&self, x: &Integer) -> Result<Integer> {
        pow_mod(x, &self.trapdoor, &self.modulus)
    }

    /// Checks `(x^3)^b == x` for `checks` random units `x`.
    pub fn check_trapdoor(&self, rng: &mut RandomSource, checks: u32) -> Result<()> {
        if self.modulus <= 2 {
            return Ok(());
        }
        let mut verified = 0u32;
        let mut drawn = 0u32;
        while verified < checks {
            drawn += 1;
            if drawn > checks.saturating_mul(64) {
                return Err(TrecubeError::ArithmeticInvariant(
                    "no units found to check the trapdoor against".into(),
                ));
            }
            let x = rng.random_message(&self.modulus)?;
            if !is_unit(&x, &self.modulus) {
                continue;
            }
            if self.cube_root(&self.cube(&x)?)? != x {
                return Err(TrecubeError::ArithmeticInvariant(format!(
                    "trapdoor does not invert cubing for a {}-bit {:?} modulus",
                    self.bits(),
                    self.kind
                )));
            }
            verified += 1;
        }
        Ok(())
    }
}

pub(crate) fn pow_mod(base: &Integer, exponent: &Integer, modulus: &Integer) -> Result<Integer> {
    base.pow_mod_ref(exponent, modulus)
        .map(Integer::from)
        .ok_or_else(|| {
            TrecubeError::ArithmeticInvariant("modular exponentiation is undefined".into())
        })
}

pub(crate) fn is_unit(x: &Integer, modulus: &Integer) -> bool {
    Integer::from(x.gcd_ref(modulus)) == 1
}

/// Builds the requested modulus family. Product moduli draw their factors
/// from a [`SampledPrimePool`].
pub fn construct(
    request: ModulusRequest,
    rng: &mut RandomSource,
    config: &PuzzleConfig,
) -> Result<CubingModulus> {
    match request {
        ModulusRequest::SafePrime { bits } => construct_safe_prime(bits, config),
        ModulusRequest::PrimePower { secpar, bits } => {
            construct_prime_power(secpar, bits, rng, config)
        }
        ModulusRequest::Product { nprimes, bits } => {
            let mut pool = SampledPrimePool::new(config);
            construct_product_modulus(nprimes, bits, &mut pool, rng, config)
        }
    }
}

/// Deterministically builds a prime `p` of exactly `bits` bits with
/// `p ≡ 2 (mod 3)`, and `b = (2p - 1) / 3`.
///
/// Large sizes are certified with Pocklington's criterion over a known prime
/// factor of `p - 1`; sizes below `config.pocklington_min_bits` use a direct
/// probable-prime search.
#[instrument(skip(config))]
pub fn construct_safe_prime(bits: u32, config: &PuzzleConfig) -> Result<CubingModulus> {
    if bits < MIN_SAFE_PRIME_BITS {
        return Err(TrecubeError::Configuration(format!(
            "safe primes need at least {} bits, requested {}",
            MIN_SAFE_PRIME_BITS, bits
        )));
    }
    config.validate()?;

    let p = search_safe_prime(bits, config)?;
    let modulus = safe_prime_modulus(p, config)?;
    info!(bits = modulus.bits(), "constructed safe prime modulus");
    Ok(modulus)
}

/// Pairs `p` with `b = (2p - 1) / 3` and checks the pair on units drawn from
/// a source seeded by `p` itself, keeping construction deterministic.
fn safe_prime_modulus(p: Integer, config: &PuzzleConfig) -> Result<CubingModulus> {
    let trapdoor = safe_prime_trapdoor(&p)?;
    let mut rng = RandomSource::from_seed(p.to_u64_wrapping());
    let modulus = CubingModulus {
        modulus: p,
        trapdoor,
        kind: ModulusKind::SafePrime,
    };
    modulus.check_trapdoor(&mut rng, config.trapdoor_checks)?;
    Ok(modulus)
}

fn safe_prime_trapdoor(p: &Integer) -> Result<Integer> {
    if p.mod_u(3) != 2 {
        return Err(TrecubeError::ArithmeticInvariant(format!(
            "prime {} is not 2 mod 3, cubing is not invertible",
            p
        )));
    }
    let mut b = Integer::from(p);
    b <<= 1;
    b -= 1;
    b.div_exact_u_mut(3);
    Ok(b)
}

fn search_safe_prime(bits: u32, config: &PuzzleConfig) -> Result<Integer> {
    if bits < config.pocklington_min_bits {
        return direct_prime_search(bits, config);
    }

    // q > sqrt(p) is what makes Pocklington's criterion a proof.
    let q_bits = (bits + 1).div_ceil(2) + 1;
    let q = match known_prime_for(q_bits, bits) {
        Some(known) => {
            debug!(q_bits = known.bits(), "using known prime factor");
            known.value()
        }
        None => search_safe_prime(q_bits, config)?,
    };
    pocklington_search(bits, &q, config)
}

fn known_prime_for(min_bits: u32, target_bits: u32) -> Option<&'static KnownPrime> {
    KNOWN_PRIMES.iter().find(|known| {
        let bits = known.bits();
        bits >= min_bits && bits + MULTIPLIER_SLACK_BITS <= target_bits
    })
}

/// Smallest prime `p ≡ 5 (mod 6)` in `[2^(bits-1), 2^bits)`.
fn direct_prime_search(bits: u32, config: &PuzzleConfig) -> Result<Integer> {
    let upper = Integer::from(1u32) << bits;
    let mut candidate = Integer::from(1u32) << (bits - 1);
    let rem = candidate.mod_u(6);
    candidate += (11 - rem) % 6;

    let mut attempts = 0u64;
    while candidate < upper {
        attempts += 1;
        if attempts > config.max_prime_candidates {
            break;
        }
        if candidate.is_probably_prime(config.primality_reps) != IsPrime::No {
            debug!(bits, attempts, "direct prime search succeeded");
            return Ok(candidate);
        }
        candidate += 6;
    }
    Err(TrecubeError::SearchExhausted {
        what: "direct prime search",
        attempts,
    })
}

/// Walks multipliers `m` upward from `2^(bits-1) / q`, keeping `p = m*q + 1`
/// at `2 mod 3`, until Pocklington certifies `p`.
fn pocklington_search(bits: u32, q: &Integer, config: &PuzzleConfig) -> Result<Integer> {
    let lower = Integer::from(1u32) << (bits - 1);
    let upper = Integer::from(1u32) << bits;

    // m even keeps p odd; m ≡ q (mod 3) gives m*q ≡ 1 (mod 3).
    let residue = if q.mod_u(3) == 1 { 4 } else { 2 };
    let mut m = Integer::from(&lower + q);
    m -= 1;
    m /= q;
    let rem = m.mod_u(6);
    m += (residue + 6 - rem) % 6;

    let mut p = Integer::from(&m * q) + 1u32;
    let step = Integer::from(q * 6u32);
    let mut attempts = 0u64;

    while p < upper {
        attempts += 1;
        if attempts > config.max_prime_candidates {
            break;
        }
        if !has_small_factor(&p) && passes_pocklington(&p, &m)? {
            debug!(bits, attempts, "pocklington search succeeded");
            return Ok(p);
        }
        m += 6;
        p += &step;
    }
    Err(TrecubeError::SearchExhausted {
        what: "pocklington prime search",
        attempts,
    })
}

fn has_small_factor(p: &Integer) -> bool {
    SMALL_PRIMES
        .iter()
        .any(|&small| p.is_divisible_u(small) && *p != small)
}

/// Pocklington with witness 2: `2^(p-1) ≡ 1 (mod p)` and
/// `gcd(2^m - 1, p) = 1`, where `p - 1 = m*q` for a prime `q > sqrt(p)`.
fn passes_pocklington(p: &Integer, m: &Integer) -> Result<bool> {
    let two = Integer::from(2);
    let p_minus_one = Integer::from(p - 1u32);
    if pow_mod(&two, &p_minus_one, p)? != 1 {
        return Ok(false);
    }
    let mut witness = pow_mod(&two, m, p)?;
    witness -= 1;
    Ok(Integer::from(witness.gcd_ref(p)) == 1)
}

/// Uniform prime of exactly `bits` bits with `p ≡ 2 (mod 3)`, drawn by
/// sampling `p = 6t + 5` and rejecting composites.
pub fn random_prime_2mod3(
    bits: u32,
    rng: &mut RandomSource,
    config: &PuzzleConfig,
) -> Result<Integer> {
    if bits < MIN_SAFE_PRIME_BITS {
        return Err(TrecubeError::Configuration(format!(
            "random primes need at least {} bits, requested {}",
            MIN_SAFE_PRIME_BITS, bits
        )));
    }
    let mut lo = Integer::from(1u32) << (bits - 1);
    lo -= 5;
    let lo = if lo < 0 { Integer::new() } else { (lo + 5u32) / 6u32 };
    let mut hi = Integer::from(1u32) << bits;
    hi -= 6;
    hi /= 6u32;
    let span = Integer::from(&hi - &lo) + 1u32;

    for attempt in 1..=config.max_prime_candidates {
        let mut candidate = rng.uniform_below(&span)?;
        candidate += &lo;
        candidate *= 6u32;
        candidate += 5u32;
        if candidate.is_probably_prime(config.primality_reps) != IsPrime::No {
            debug!(bits, attempt, "sampled prime 2 mod 3");
            return Ok(candidate);
        }
    }
    Err(TrecubeError::SearchExhausted {
        what: "random prime sampling",
        attempts: config.max_prime_candidates,
    })
}

/// `N = p^k` for a random `secpar`-bit prime `p ≡ 2 (mod 3)`, with `k` the
/// smallest power reaching `bits` (one extra factor if the power falls short
/// by more than `k/2` bits).
#[instrument(skip(rng, config))]
pub fn construct_prime_power(
    secpar: u32,
    bits: u32,
    rng: &mut RandomSource,
    config: &PuzzleConfig,
) -> Result<CubingModulus> {
    if secpar < MIN_SAFE_PRIME_BITS {
        return Err(TrecubeError::Configuration(format!(
            "prime power base needs at least {} bits, requested {}",
            MIN_SAFE_PRIME_BITS, secpar
        )));
    }
    let mut k = bits.div_ceil(secpar);
    if k <= 1 {
        return Err(TrecubeError::Configuration(format!(
            "prime power is a trivial power (secpar={}, bits={})",
            secpar, bits
        )));
    }
    config.validate()?;

    let p = random_prime_2mod3(secpar, rng, config)?;
    let power = Integer::from(p.pow_ref(k));
    if power.significant_bits() < bits.saturating_sub(k / 2) {
        k += 1;
    }

    let modulus = prime_power_from_base(&p, k)?;
    modulus.check_trapdoor(rng, config.trapdoor_checks)?;
    info!(
        bits = modulus.bits(),
        exponent = k,
        "constructed prime power modulus"
    );
    Ok(modulus)
}

/// Assembles `N = p^k` and its trapdoor. `p` must be a prime `≡ 2 (mod 3)`.
///
/// `phi(p^k) ≡ 2^(k-1) (mod 3)`, so `(1 + k mod 2) * phi(N) ≡ 2 (mod 3)` and
/// `b = (1 + (1 + k mod 2) * phi(N)) / 3` is exact.
pub fn prime_power_from_base(p: &Integer, k: u32) -> Result<CubingModulus> {
    if *p <= 2 || p.mod_u(3) != 2 {
        return Err(TrecubeError::Configuration(format!(
            "prime power base {} must be an odd prime 2 mod 3",
            p
        )));
    }
    if k == 0 {
        return Err(TrecubeError::Configuration(
            "prime power exponent must be positive".into(),
        ));
    }

    let modulus = Integer::from(p.pow_ref(k));
    let lower_power = Integer::from(p.pow_ref(k - 1));
    let phi = Integer::from(&modulus - &lower_power);
    let trapdoor = parity_trapdoor(phi, k)?;

    Ok(CubingModulus {
        modulus,
        trapdoor,
        kind: ModulusKind::PrimePower { exponent: k },
    })
}

fn parity_trapdoor(mut phi: Integer, k: u32) -> Result<Integer> {
    phi *= 1 + k % 2;
    phi += 1;
    if !phi.is_divisible_u(3) {
        return Err(TrecubeError::ArithmeticInvariant(
            "closed-form trapdoor is not divisible by 3".into(),
        ));
    }
    phi.div_exact_u_mut(3);
    Ok(phi)
}

/// Source of the small factors of a product modulus.
pub trait PrimePool {
    /// `count` distinct primes `p > 2^31` with `p ≡ 2 (mod 3)`.
    fn draw(&mut self, count: usize, rng: &mut RandomSource) -> Result<Vec<u32>>;
}

/// Samples pool primes on demand instead of reading a precomputed table.
pub struct SampledPrimePool {
    config: PuzzleConfig,
}

impl SampledPrimePool {
    pub fn new(config: &PuzzleConfig) -> Self {
        SampledPrimePool {
            config: config.clone(),
        }
    }
}

impl PrimePool for SampledPrimePool {
    fn draw(&mut self, count: usize, rng: &mut RandomSource) -> Result<Vec<u32>> {
        let mut primes = BTreeSet::new();
        let mut draws = 0u64;
        while primes.len() < count {
            draws += 1;
            if draws > self.config.max_prime_candidates {
                return Err(TrecubeError::SearchExhausted {
                    what: "prime pool draw",
                    attempts: draws - 1,
                });
            }
            let prime = random_prime_2mod3(POOL_PRIME_BITS, rng, &self.config)?;
            let prime = prime.to_u32().ok_or_else(|| {
                TrecubeError::ArithmeticInvariant("pool prime exceeds 32 bits".into())
            })?;
            primes.insert(prime);
        }
        Ok(primes.into_iter().collect())
    }
}

/// `N = (p_1 * ... * p_n) * 2^k` with `k` filling the requested bit length.
#[instrument(skip(pool, rng, config))]
pub fn construct_product_modulus(
    nprimes: usize,
    bits: u32,
    pool: &mut dyn PrimePool,
    rng: &mut RandomSource,
    config: &PuzzleConfig,
) -> Result<CubingModulus> {
    if nprimes == 0 {
        return Err(TrecubeError::Configuration(
            "product modulus needs at least one odd prime".into(),
        ));
    }
    let factor_bits = (nprimes as u64) * POOL_PRIME_BITS as u64;
    if factor_bits + 2 > bits as u64 {
        return Err(TrecubeError::Configuration(format!(
            "{} pool primes leave no room for a power of two in {} bits",
            nprimes, bits
        )));
    }
    config.validate()?;

    let factors = pool.draw(nprimes, rng)?;
    if factors.len() != nprimes {
        return Err(TrecubeError::Configuration(format!(
            "prime pool returned {} primes, expected {}",
            factors.len(),
            nprimes
        )));
    }
    let odd_part = factors
        .iter()
        .fold(Integer::from(1u32), |acc, &p| acc * p);
    let k = bits - odd_part.significant_bits();
    if k <= 1 {
        return Err(TrecubeError::Configuration(format!(
            "power of two exponent {} is degenerate",
            k
        )));
    }

    let modulus = product_from_factors(&factors, k)?;
    modulus.check_trapdoor(rng, config.trapdoor_checks)?;
    info!(
        bits = modulus.bits(),
        factors = nprimes,
        two_power = k,
        "constructed product modulus"
    );
    Ok(modulus)
}

/// Assembles `N = (p_1 * ... * p_n) * 2^k` and its trapdoor. The factors must
/// be distinct odd primes `≡ 2 (mod 3)`.
pub fn product_from_factors(factors: &[u32], k: u32) -> Result<CubingModulus> {
    if factors.is_empty() || k == 0 {
        return Err(TrecubeError::Configuration(
            "product modulus needs odd factors and a positive power of two".into(),
        ));
    }
    let distinct: BTreeSet<u32> = factors.iter().copied().collect();
    if distinct.len() != factors.len() {
        return Err(TrecubeError::Configuration(
            "product modulus factors must be distinct".into(),
        ));
    }
    if let Some(bad) = factors.iter().find(|&&p| p <= 2 || p % 3 != 2) {
        return Err(TrecubeError::Configuration(format!(
            "factor {} is not an odd prime 2 mod 3",
            bad
        )));
    }

    let mut modulus = Integer::from(1u32);
    let mut phi = Integer::from(1u32);
    for &p in factors {
        modulus *= p;
        phi *= p - 1;
    }
    modulus <<= k;
    phi <<= k - 1;
    let trapdoor = parity_trapdoor(phi, k)?;

    Ok(CubingModulus {
        modulus,
        trapdoor,
        kind: ModulusKind::Product {
            factors: factors.len(),
            two_power: k,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PuzzleConfig {
        PuzzleConfig::default()
    }

    #[test]
    fn test_known_primes_are_prime_and_sorted() {
        let mut previous = 0;
        for known in KNOWN_PRIMES.iter().take_while(|k| k.exponent <= 607) {
            let value = known.value();
            assert_ne!(value.is_probably_prime(20), IsPrime::No, "{:?}", known);
            assert!(known.bits() > previous);
            previous = known.bits();
        }
    }

    #[test]
    fn test_toy_safe_prime() {
        let modulus = construct_safe_prime(4, &config()).unwrap();
        assert_eq!(*modulus.modulus(), 11);
        assert_eq!(*modulus.trapdoor(), 7);
        assert_eq!(modulus.kind(), ModulusKind::SafePrime);

        let c = modulus.cube(&Integer::from(2)).unwrap();
        assert_eq!(c, 8);
        assert_eq!(modulus.cube_root(&c).unwrap(), 2);
    }

    #[test]
    fn test_safe_prime_checks_its_trapdoor() {
        let config = PuzzleConfig {
            trapdoor_checks: 16,
            ..config()
        };
        // 35 = 5 * 7 is 2 mod 3, but b = 23 is no inverse of 3 mod phi(35) = 24.
        assert!(matches!(
            safe_prime_modulus(Integer::from(35), &config),
            Err(TrecubeError::ArithmeticInvariant(_))
        ));

        let modulus = safe_prime_modulus(Integer::from(11), &config).unwrap();
        assert_eq!(*modulus.trapdoor(), 7);
    }

    #[test]
    fn test_smallest_safe_prime() {
        let modulus = construct_safe_prime(3, &config()).unwrap();
        assert_eq!(*modulus.modulus(), 5);
        assert_eq!(*modulus.trapdoor(), 3);
    }

    #[test]
    fn test_safe_prime_too_small() {
        for bits in 0..MIN_SAFE_PRIME_BITS {
            assert!(matches!(
                construct_safe_prime(bits, &config()),
                Err(TrecubeError::Configuration(_))
            ));
        }
    }

    #[test]
    fn test_pocklington_safe_prime() {
        let modulus = construct_safe_prime(256, &config()).unwrap();
        let p = modulus.modulus();
        assert_eq!(p.significant_bits(), 256);
        assert_eq!(p.mod_u(3), 2);
        assert_ne!(p.is_probably_prime(30), IsPrime::No);

        let phi = Integer::from(p - 1u32);
        let check = Integer::from(modulus.trapdoor() * 3u32) % &phi;
        assert_eq!(check, 1);
    }

    #[test]
    fn test_safe_prime_is_deterministic() {
        let a = construct_safe_prime(128, &config()).unwrap();
        let b = construct_safe_prime(128, &config()).unwrap();
        assert_eq!(a.modulus(), b.modulus());
    }

    #[test]
    fn test_pocklington_rejects_composite() {
        // 91 = 7 * 13, 90 = 6 * 15
        assert!(!passes_pocklington(&Integer::from(91), &Integer::from(6)).unwrap());
        // 23 = 2 * 11 + 1
        assert!(passes_pocklington(&Integer::from(23), &Integer::from(2)).unwrap());
    }

    #[test]
    fn test_prime_power_trapdoor_matches_phi() {
        for (p, k) in [(5u32, 2u32), (11, 3), (17, 4), (23, 5)] {
            let base = Integer::from(p);
            let modulus = prime_power_from_base(&base, k).unwrap();
            let phi = Integer::from(base.pow_ref(k - 1)) * (p - 1);
            let check = Integer::from(modulus.trapdoor() * 3u32) % &phi;
            assert_eq!(check, 1, "p={} k={}", p, k);
            assert_eq!(modulus.kind(), ModulusKind::PrimePower { exponent: k });
        }
    }

    #[test]
    fn test_prime_power_rejects_bad_base() {
        assert!(prime_power_from_base(&Integer::from(7), 2).is_err());
        assert!(prime_power_from_base(&Integer::from(2), 2).is_err());
        assert!(prime_power_from_base(&Integer::from(5), 0).is_err());
    }

    #[test]
    fn test_construct_prime_power() {
        let mut rng = RandomSource::from_seed(42);
        let modulus = construct_prime_power(64, 256, &mut rng, &config()).unwrap();
        let ModulusKind::PrimePower { exponent } = modulus.kind() else {
            panic!("unexpected kind {:?}", modulus.kind());
        };
        assert!(exponent == 4 || exponent == 5);
        assert!(modulus.bits() >= 256 - exponent / 2);
    }

    #[test]
    fn test_trivial_prime_power_rejected() {
        let mut rng = RandomSource::from_seed(1);
        let err = construct_prime_power(256, 200, &mut rng, &config()).unwrap_err();
        assert!(matches!(err, TrecubeError::Configuration(_)));
    }

    #[test]
    fn test_product_trapdoor_matches_phi() {
        let factors = [5u32, 11, 17, 23];
        for k in 1..6u32 {
            let modulus = product_from_factors(&factors, k).unwrap();
            let phi = Integer::from(4u32 * 10 * 16 * 22) << (k - 1);
            let check = Integer::from(modulus.trapdoor() * 3u32) % &phi;
            assert_eq!(check, 1, "k={}", k);
            assert_eq!(*modulus.modulus(), Integer::from(5u32 * 11 * 17 * 23) << k);
        }
    }

    #[test]
    fn test_product_rejects_bad_factors() {
        assert!(product_from_factors(&[5, 5], 3).is_err());
        assert!(product_from_factors(&[7], 3).is_err());
        assert!(product_from_factors(&[], 3).is_err());
        assert!(product_from_factors(&[5], 0).is_err());
    }

    #[test]
    fn test_sampled_pool() {
        let mut rng = RandomSource::from_seed(9);
        let mut pool = SampledPrimePool::new(&config());
        let primes = pool.draw(6, &mut rng).unwrap();
        assert_eq!(primes.len(), 6);
        for p in primes {
            assert!(p > 1 << 31);
            assert_eq!(p % 3, 2);
            assert_ne!(Integer::from(p).is_probably_prime(30), IsPrime::No);
        }
    }

    #[test]
    fn test_construct_product_modulus() {
        let mut rng = RandomSource::from_seed(3);
        let mut pool = SampledPrimePool::new(&config());
        let modulus =
            construct_product_modulus(4, 512, &mut pool, &mut rng, &config()).unwrap();
        assert_eq!(modulus.bits(), 512);
        let ModulusKind::Product { factors, two_power } = modulus.kind() else {
            panic!("unexpected kind {:?}", modulus.kind());
        };
        assert_eq!(factors, 4);
        assert_eq!(modulus.modulus().find_one(0), Some(two_power));
    }

    #[test]
    fn test_product_without_room_rejected() {
        let mut rng = RandomSource::from_seed(3);
        let mut pool = SampledPrimePool::new(&config());
        let err = construct_product_modulus(8, 256, &mut pool, &mut rng, &config()).unwrap_err();
        assert!(matches!(err, TrecubeError::Configuration(_)));
    }

    #[test]
    fn test_check_trapdoor_catches_wrong_exponent() {
        let broken = CubingModulus {
            modulus: Integer::from(11),
            trapdoor: Integer::from(5),
            kind: ModulusKind::SafePrime,
        };
        let mut rng = RandomSource::from_seed(0);
        assert!(matches!(
            broken.check_trapdoor(&mut rng, 8),
            Err(TrecubeError::ArithmeticInvariant(_))
        ));
    }

    #[test]
    fn test_debug_hides_trapdoor() {
        let modulus = construct_safe_prime(4, &config()).unwrap();
        let shown = format!("{:?}", modulus);
        assert!(shown.contains("bits: 4"));
        assert!(!shown.contains("trapdoor"));
    }

    #[test]
    fn test_exhausted_search_is_reported() {
        let tight = PuzzleConfig {
            max_prime_candidates: 1,
            ..PuzzleConfig::default()
        };
        match direct_prime_search(24, &tight) {
            Ok(p) => assert_ne!(p.is_probably_prime(30), IsPrime::No),
            Err(err) => assert!(matches!(
                err,
                TrecubeError::SearchExhausted { attempts: 1, .. }
            )),
        }
    }
}
