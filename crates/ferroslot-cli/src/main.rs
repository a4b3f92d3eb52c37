#![doc = include_str!("../README.md")]

mod config;
mod telemetry;

use std::io::{self, BufWriter, Write};
use std::sync::Arc;

use clap::Parser;
use config::{CliArgs, CliConfig, OutputFormat};
use ferroslot::{
    AlgorithmKind, AtomicSequence, IdGeneratorService, MAX_BATCH_SIZE, MemoryCoordinator,
    SequenceSource, Strategy, SystemClock, TimeSource, WorkerRegistry,
};
use telemetry::init_telemetry;

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = CliConfig::try_from(args)?;

    init_telemetry()?;
    log_startup_info(&config);

    let coordinator = MemoryCoordinator::new();
    let registry = coordinator.client(config.registry.node_path());

    let sequence: Option<Arc<dyn SequenceSource>> = match config.algorithm {
        AlgorithmKind::ClassicSnowflake => None,
        AlgorithmKind::FlaggedCounter => Some(Arc::new(AtomicSequence::default())),
    };
    let strategy = Strategy::new(config.algorithm, sequence)?;
    let service =
        IdGeneratorService::new(registry, strategy, SystemClock::with_epoch(config.epoch));

    service.init()?;
    let result = print_ids(&service, &config);
    service.close();
    result
}

fn print_ids<R, T>(service: &IdGeneratorService<R, T>, config: &CliConfig) -> anyhow::Result<()>
where
    R: WorkerRegistry + 'static,
    T: TimeSource + Clone + Send + Sync + 'static,
{
    let mut out = BufWriter::new(io::stdout().lock());

    match config.format {
        OutputFormat::Raw => {
            let mut remaining = config.count;
            while remaining > 0 {
                let batch = remaining.min(MAX_BATCH_SIZE);
                // `batch` is bounded by `MAX_BATCH_SIZE`.
                for id in service.next_ids(batch as i64)? {
                    writeln!(out, "{id}")?;
                }
                remaining -= batch;
            }
        }
        OutputFormat::String => {
            for _ in 0..config.count {
                writeln!(out, "{}", service.next_string_id()?)?;
            }
        }
        OutputFormat::Fixed => {
            for _ in 0..config.count {
                writeln!(out, "{}", service.next_fixed_string_id()?)?;
            }
        }
    }

    out.flush()?;
    Ok(())
}

fn log_startup_info(_config: &CliConfig) {
    if cfg!(debug_assertions) {
        #[cfg(feature = "tracing")]
        tracing::info!("Issuing ids with full config: {:#?}", _config);
    } else {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Issuing {} {} ids under {}",
            _config.count,
            _config.algorithm,
            _config.registry.node_path()
        );
    }
}
