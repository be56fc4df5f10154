use rug::Integer;
use trecube_core::modulus::construct_safe_prime;
use trecube_core::{
    ChainParams, CubingPuzzle, PuzzleConfig, RandomSource, RoundKey, TrapdoorOpener,
};

#[test]
fn test_basic_functionality() {
    let config = PuzzleConfig::default();

    // Toy modulus: 11 is the smallest 4-bit prime 2 mod 3, b = (2*11 - 1) / 3.
    let modulus = construct_safe_prime(4, &config).unwrap();
    assert_eq!(*modulus.modulus(), Integer::from(11));
    assert_eq!(*modulus.trapdoor(), Integer::from(7));

    let params = ChainParams::new(3, 2).unwrap();
    let puzzle = CubingPuzzle::new(modulus.modulus(), params, config).unwrap();
    let mut rng = RandomSource::from_seed(42);
    let key = RoundKey::generate(&params, &mut rng);

    let c = puzzle.delay(&Integer::from(4), &key).unwrap();
    let opener = TrapdoorOpener::new(&puzzle, modulus.trapdoor());
    assert_eq!(opener.open(&c, &key).unwrap(), 4);
}
