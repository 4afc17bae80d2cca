//! Fossilizer service
//!
//! Reads one hex digest per line on stdin and prints the evidence of every
//! fossilized leaf as a JSON line on stdout. Settings come from the
//! `FOSSILIZER_*` environment variables; logs go to stderr.

use std::{future::Future, io, sync::Arc};

use anyhow::{Context, Result};
use fossil_batch::{Config, DummyAnchor, Fossil, Fossilizer};
use fossil_types::Id32;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = Config::from_env();
    let (fossilizer, fossils) = Fossilizer::start_subscribed(config, Arc::new(DummyAnchor::new()))
        .await
        .context("failed to start fossilizer")?;

    let info = fossilizer.info();
    info!(
        name = %info.name,
        version = %info.version,
        network = %info.network,
        max_leaves = fossilizer.config().max_leaves,
        "fossilizer ready"
    );

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    run(fossilizer, fossils, stdin, stdout, tokio::signal::ctrl_c()).await?;
    Ok(())
}

/// Submit the digests read from `input` until it ends or `interrupt`
/// fires, then shut down. Every published result is written to `output`,
/// including those of batches still in flight when reading stopped.
async fn run<R, W>(
    fossilizer: Fossilizer,
    fossils: mpsc::UnboundedReceiver<Fossil>,
    input: R,
    output: W,
    interrupt: impl Future<Output = io::Result<()>>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let printer = tokio::spawn(print_evidence(fossils, output));

    let input = tokio::select! {
        res = read_leaves(&fossilizer, input) => res,
        res = interrupt => {
            info!("interrupted, shutting down");
            res.context("failed to listen for ctrl-c")
        }
    };
    if let Err(err) = &input {
        error!(error = %err, "stopped reading input");
    }

    let shutdown = fossilizer.shutdown().await;
    // Last sender goes with the fossilizer, which ends the printer.
    drop(fossilizer);
    printer.await.context("evidence printer panicked")??;

    input?;
    shutdown.context("shutdown did not complete")
}

async fn read_leaves<R>(fossilizer: &Fossilizer, input: R) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut line_number = 0usize;

    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        line_number += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.parse::<Id32>() {
            Ok(leaf) => {
                fossilizer.submit(leaf)?;
            }
            Err(err) => warn!(line = line_number, error = %err, "skipping invalid digest"),
        }
    }

    info!(lines = line_number, "end of input");
    Ok(())
}

async fn print_evidence<W>(
    mut fossils: mpsc::UnboundedReceiver<Fossil>,
    mut output: W,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(fossil) = fossils.recv().await {
        let mut line = fossil.evidence.to_json()?;
        line.push('\n');
        output.write_all(line.as_bytes()).await?;
    }
    output.flush().await?;
    Ok(())
}
