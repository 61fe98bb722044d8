// =============================================================================
// Minute Bars — Main Entry Point
// =============================================================================
//
// Streams live trades into a three-stage pipeline:
//
//   ingest (+ minute timer) ──Queue₁──▶ N writers ──Queue₂──▶ calculator
//
// Writers persist every trade; the calculator builds one-minute candlesticks
// and a 15-minute volume-weighted moving average per symbol.  The run ends on
// Ctrl+C, when the hour limit is reached, or when a worker fails.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod market_data;
mod pipeline;
mod runtime_config;
mod storage;
mod types;

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::market_data::SymbolRegistry;
use crate::pipeline::{
    run_ingest, CalculatorReport, CalculatorSinks, CalculatorStage, DirectiveTimer, IngestStage,
    PipelineContext, ShutdownReason, WriterReport, WriterStage,
};
use crate::runtime_config::{PipelineConfig, DEFAULT_CONFIG_PATH};
use crate::storage::OutputLayout;

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Minute Bars — starting up");
    let started = Instant::now();

    let config_path =
        std::env::var("PIPELINE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let mut config = PipelineConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %format!("{e:#}"), "Failed to load config, using defaults");
        PipelineConfig::default()
    });
    config.apply_env_overrides();

    // A single optional argument overrides the API key.
    if let Some(key) = std::env::args().nth(1).filter(|k| !k.trim().is_empty()) {
        config.api_key = key.trim().to_string();
    }
    if config.api_key.is_empty() {
        bail!("no API key: pass it as the first argument or set FINNHUB_API_KEY");
    }
    config.validate()?;

    info!(
        symbols = config.symbols.len(),
        writers = config.writer_count,
        queue_capacity = config.queue_capacity,
        hour_limit = config.hour_limit,
        output_dir = %config.output_dir.display(),
        "Configured pipeline"
    );

    // ── 2. Open every output file before any worker exists ───────────────
    let registry = Arc::new(SymbolRegistry::new(config.symbols.iter().cloned())?);

    let layout = OutputLayout::new(config.output_dir.clone());
    layout.ensure_dirs()?;
    let trade_logs = Arc::new(layout.open_trade_logs(&registry)?);
    let writer_delays = (0..config.writer_count)
        .map(|i| layout.open_writer_delays(i))
        .collect::<Result<Vec<_>>>()?;
    let calc_sinks = CalculatorSinks {
        candlesticks: layout.open_candlesticks(&registry)?,
        moving_avg: layout.open_moving_avg(&registry)?,
        delays: layout.open_calculator_delays()?,
    };
    info!(
        root = %layout.root().display(),
        symbols = trade_logs.len(),
        "Output files opened"
    );

    // ── 3. Shared pipeline context ───────────────────────────────────────
    let ctx = Arc::new(PipelineContext::new(
        registry.clone(),
        config.queue_capacity,
        config.writer_count,
    ));

    // ── 4. Worker threads ────────────────────────────────────────────────
    let mut writers: Vec<JoinHandle<Result<WriterReport>>> = Vec::new();
    for (id, delays) in writer_delays.into_iter().enumerate() {
        let stage = WriterStage::new(id, ctx.clone(), trade_logs.clone(), delays);
        let handle = thread::Builder::new()
            .name(format!("writer-{id}"))
            .spawn(move || stage.run())
            .with_context(|| format!("failed to spawn writer {id}"))?;
        writers.push(handle);
    }

    let calculator_stage = CalculatorStage::new(ctx.clone(), calc_sinks);
    let calculator: JoinHandle<Result<CalculatorReport>> = thread::Builder::new()
        .name("calculator".into())
        .spawn(move || calculator_stage.run())
        .context("failed to spawn calculator")?;

    // ── 5. Async producers ───────────────────────────────────────────────
    let ingest = tokio::spawn(run_ingest(
        IngestStage::new(ctx.clone()),
        config.endpoint.clone(),
        config.api_key.clone(),
        config.reconnect.policy(),
    ));
    let timer = tokio::spawn(DirectiveTimer::new(ctx.clone(), config.hour_limit).run());

    info!("All stages running. Press Ctrl+C to stop.");

    // ── 6. Wait for a stop condition ─────────────────────────────────────
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("failed to listen for Ctrl+C")?;
            warn!("Interrupt received — draining pipeline");
            ctx.begin_shutdown(ShutdownReason::Interrupt);
        }
        _ = ctx.shutdown.cancelled() => {}
    }
    let reason = ctx.shutdown.reason();
    info!(reason = ?reason, "Shutdown in progress");

    // ── 7. Drain and join ────────────────────────────────────────────────
    let ingest_report = ingest.await.context("ingest task failed")?;
    timer.await.context("timer task failed")?;

    let mut failures = 0usize;
    let mut writer_reports = Vec::new();
    for (id, handle) in writers.into_iter().enumerate() {
        match join_worker(handle).await {
            Ok(report) => writer_reports.push(report),
            Err(e) => {
                error!(writer = id, error = %format!("{e:#}"), "writer ended with an error");
                failures += 1;
            }
        }
    }
    // Every writer has exited; a panicked one never got to close Queue₂.
    ctx.calc_queue.close();

    if let Err(e) = trade_logs.flush_all() {
        error!(error = %format!("{e:#}"), "failed to flush trade logs");
        failures += 1;
    }

    let calculator_report = match join_worker(calculator).await {
        Ok(report) => Some(report),
        Err(e) => {
            error!(error = %format!("{e:#}"), "calculator ended with an error");
            failures += 1;
            None
        }
    };

    // ── 8. Run summary ───────────────────────────────────────────────────
    info!(
        elapsed_secs = started.elapsed().as_secs_f64(),
        accepted = ingest_report.accepted,
        decoded = ingest_report.decoded,
        dropped = ingest_report.dropped,
        connections = ingest_report.connections,
        "Ingest summary"
    );
    for r in &writer_reports {
        info!(
            writer = r.writer,
            trades = r.trades_logged,
            directives = r.directives_forwarded,
            rejected = r.rejected,
            "Writer summary"
        );
    }
    if let Some(r) = &calculator_report {
        info!(
            trades = r.trades_applied,
            minutes = r.minutes_flushed,
            candles = r.candles_written,
            "Calculator summary"
        );
    }

    if failures > 0 || reason == Some(ShutdownReason::WorkerFailure) {
        bail!("pipeline stopped after {failures} worker failure(s)");
    }
    info!("Minute Bars shut down complete.");
    Ok(())
}

/// Join a worker thread without blocking the runtime.
async fn join_worker<T: Send + 'static>(handle: JoinHandle<Result<T>>) -> Result<T> {
    tokio::task::spawn_blocking(move || handle.join())
        .await
        .context("join task failed")?
        .map_err(|_| anyhow!("worker thread panicked"))?
}
