use std::time::Instant;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;
use trecube_core::modulus::construct;
use trecube_core::{
    ChainParams, CubingPuzzle, ModulusRequest, PuzzleConfig, RandomSource, RoundKey,
    TrapdoorOpener,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("trecube_core=info,trecube=info")),
        )
        .init();

    let config = PuzzleConfig::default();
    let mut rng = RandomSource::from_entropy();

    let requests = [
        ModulusRequest::SafePrime { bits: 1024 },
        ModulusRequest::PrimePower { secpar: 128, bits: 1024 },
        ModulusRequest::Product { nprimes: 8, bits: 1024 },
    ];

    for request in requests {
        let start = Instant::now();
        let modulus = construct(request, &mut rng, &config)?;
        info!(?request, elapsed = ?start.elapsed(), "modulus ready");

        for rounds in [0u64, 50, 1024] {
            let params = ChainParams::new(rounds, 100)?;
            let puzzle = CubingPuzzle::new(modulus.modulus(), params, config.clone())?;
            let key = RoundKey::generate(&params, &mut rng);
            let message = rng.random_unit(modulus.modulus())?;

            let start = Instant::now();
            let ciphertext = puzzle.delay(&message, &key)?;
            let delay_time = start.elapsed();

            let start = Instant::now();
            let opened = TrapdoorOpener::new(&puzzle, modulus.trapdoor()).open(&ciphertext, &key)?;
            let open_time = start.elapsed();

            anyhow::ensure!(opened == message, "round trip failed for {:?}", request);
            info!(
                rounds,
                chain = params.chain_length(),
                ?delay_time,
                ?open_time,
                "delay/open round trip"
            );
        }
    }

    Ok(())
}
