//! hashflow - sign a sequence of integers with the staged hash pipeline
//!
//! Runs fan-2 → fan-6 → sort-join over the inputs with MD5/CRC-32 and prints
//! the combined value.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use hashflow::config::{GateConfig, ItemFailurePolicy, OrderPolicy, PipelineConfig, QueueCapacity};
use hashflow::gate::{HashGate, Md5Crc32};
use hashflow::observability::{init_tracing, LogFormat};
use hashflow::pipeline::signer_pipeline;

#[derive(Parser)]
#[command(name = "hashflow")]
#[command(about = "Sign integers with a concurrent staged hash pipeline")]
#[command(version)]
struct Cli {
    /// Integers to sign (default: 0..count)
    inputs: Vec<i64>,

    /// Sign 0..count when no inputs are given
    #[arg(short = 'n', long, default_value_t = 2)]
    count: i64,

    /// Print the full run report as JSON instead of the bare signature
    #[arg(long)]
    json: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogArg::Pretty)]
    log_format: LogArg,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Ceiling on concurrent primitive calls
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Ceiling on concurrent digest calls
    #[arg(long)]
    digest_max_concurrent: Option<usize>,

    /// Capacity of each inter-stage queue (0 = unbounded)
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Maximum items a fan-out stage processes at once
    #[arg(long)]
    max_items_in_flight: Option<usize>,

    /// Order in which fan-out stages emit items
    #[arg(long, value_enum)]
    order: Option<OrderArg>,

    /// Fail the run on the first failed item instead of skipping it
    #[arg(long)]
    fail_fast: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogArg {
    Pretty,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum OrderArg {
    Completion,
    Input,
}

impl Cli {
    /// Environment first, flags override.
    fn pipeline_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::from_env();
        if let Some(n) = self.queue_capacity {
            config.queue_capacity = if n == 0 {
                QueueCapacity::Unbounded
            } else {
                QueueCapacity::Bounded(n)
            };
        }
        if let Some(n) = self.max_items_in_flight {
            config.max_items_in_flight = n;
        }
        match self.order {
            Some(OrderArg::Completion) => config.order = OrderPolicy::Completion,
            Some(OrderArg::Input) => config.order = OrderPolicy::Input,
            None => {}
        }
        if self.fail_fast {
            config.failure_policy = ItemFailurePolicy::FailFast;
        }
        config
    }

    fn gate_config(&self) -> GateConfig {
        let mut config = GateConfig::from_env();
        if let Some(n) = self.max_concurrent {
            config.max_concurrent = n;
        }
        if let Some(n) = self.digest_max_concurrent {
            config.digest_max_concurrent = n;
        }
        config
    }

    fn values(&self) -> Vec<i64> {
        if self.inputs.is_empty() {
            (0..self.count).collect()
        } else {
            self.inputs.clone()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = match cli.log_format {
        LogArg::Pretty => LogFormat::Pretty,
        LogArg::Json => LogFormat::Json,
    };
    let directive = if cli.debug { "hashflow=debug" } else { "hashflow=warn" };
    init_tracing(format, directive)?;

    let gate = Arc::new(HashGate::new(Arc::new(Md5Crc32), cli.gate_config()));
    let pipeline =
        signer_pipeline(gate.clone(), cli.pipeline_config()).context("Failed to build pipeline")?;

    let run = pipeline
        .run(cli.values())
        .await
        .context("Pipeline run failed")?;

    if cli.json {
        let mut report = run.to_json();
        report["gate"] = gate.metrics().to_json();
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", run.single_text()?);
    }

    for failure in &run.failures {
        tracing::warn!(
            stage = %failure.stage,
            item = failure.item,
            error = %failure.error,
            "item skipped"
        );
    }
    Ok(())
}
