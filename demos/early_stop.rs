//! Early-stop demonstration
//!
//! An endless producer feeds a doubling transform; the consumer bails out
//! after twenty items. The consumer's stop request shuts the whole pipeline
//! down, so the bounded join below returns instead of hanging on the
//! still-blocked upstream stages.
//!
//! Usage: cargo run --example early_stop

use conveyor::{FnConsumer, IterProducer, Pipeline, PipelineConfig};
use env_logger::Env;
use log::info;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("debug")).init();

    let config = PipelineConfig::new("counter").with_capacity(4);
    let running = Pipeline::new(config)?.start(
        IterProducer::new(0u64..),
        |x| x * 2,
        FnConsumer::new(|x| {
            info!("received {}", x);
            x < 38
        }),
    )?;

    let report = running.join_timeout(Duration::from_secs(5))?;
    print!("{}", report.format());
    Ok(())
}
