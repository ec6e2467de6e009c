//! Process lifecycle: resolve credentials, connect, run one command, shut down

use crate::auth::{AuthInputs, AuthResolver};
use crate::cli::{Cli, Command};
use crate::commands::{self, backup::BackupOptions, StopSignal};
use crate::config::CliConfig;
use crate::error::CliResult;
use crate::mqtt_span;
use crate::purge::PurgeThrottler;
use crate::record::BackupWriter;
use crate::terminal::TerminalTitle;
use crate::transport::mqtt::Session;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn, Instrument};

/// Run the parsed command line to completion
pub async fn run(cli: Cli) -> CliResult<()> {
    let working_dir = std::env::current_dir()?;
    let config = CliConfig::load(cli.config.as_deref(), &working_dir)?;

    let inputs = AuthInputs {
        broker_url: cli.url.clone(),
        jwt: cli.jwt.clone(),
        home: std::env::var_os("HOME").map(PathBuf::from),
        working_dir,
    };
    let connection = AuthResolver::new(&config).resolve(&inputs)?;

    let mut title = TerminalTitle::set(&cli.command.title());
    let (stop_tx, stop) = StopSignal::channel();
    spawn_stop_trigger(stop_tx, cli.timeout.map(Duration::from_secs));
    if !cli.command.is_one_shot() && cli.timeout.is_none() {
        info!("{} runs until interrupted", cli.command.name());
    }

    let mut session = Session::connect(&connection, &config.session);

    let mut waiting = stop.clone();
    let ready = tokio::select! {
        ready = session.ready() => Some(ready),
        _ = waiting.stopped() => None,
    };

    let result = match ready {
        Some(Ok(())) => {
            let span = mqtt_span!(command = cli.command.name());
            execute(&mut session, cli.command, &config, stop)
                .instrument(span)
                .await
        }
        Some(Err(e)) => Err(e.into()),
        None => {
            info!("Stopped before the broker accepted the connection");
            Ok(())
        }
    };

    session.shutdown().await?;
    title.restore();
    result
}

async fn execute(
    session: &mut Session,
    command: Command,
    config: &CliConfig,
    stop: StopSignal,
) -> CliResult<()> {
    match command {
        Command::Sub { filter } => {
            let mut deliveries = session.take_deliveries()?;
            let mut out = tokio::io::stdout();
            let printed =
                commands::sub::run(&*session, &mut deliveries, stop, &filter, &mut out).await?;
            info!("Printed {} messages", printed);
        }
        Command::Clear { filter } => {
            let mut deliveries = session.take_deliveries()?;
            let cleared = commands::clear::run(&*session, &mut deliveries, stop, &filter).await?;
            info!("Cleared {} retained messages", cleared);
        }
        Command::Backup {
            filter,
            file,
            include_live,
        } => {
            let mut deliveries = session.take_deliveries()?;
            let mut writer = BackupWriter::open(&file).await?;
            let written = commands::backup::run(
                &*session,
                &mut deliveries,
                stop,
                &filter,
                &mut writer,
                BackupOptions { include_live },
            )
            .await?;
            info!("Backed up {} messages to {}", written, file.display());
        }
        Command::Stress { rate } => {
            let topic = commands::stress::default_topic();
            commands::stress::run(&*session, stop, &topic, rate).await?;
        }
        Command::Pub {
            topic,
            message,
            retain,
            qos,
        } => {
            until_stopped(
                stop,
                commands::publish::run(&*session, &topic, &message, retain, qos),
            )
            .await?;
        }
        Command::Restore { file } => {
            if let Some(summary) =
                until_stopped(stop, commands::restore::run(&*session, file.as_deref())).await?
            {
                if summary.malformed > 0 || summary.failed > 0 {
                    warn!(
                        "Restored {} messages, skipped {} malformed lines, {} publishes failed",
                        summary.published, summary.malformed, summary.failed
                    );
                }
            }
        }
        Command::Purge { file } => {
            let throttler = PurgeThrottler::new(config.purge_delay());
            if let Some(report) = until_stopped(
                stop,
                commands::purge::run(&*session, &throttler, file.as_deref()),
            )
            .await?
            {
                if report.failed > 0 {
                    warn!(
                        "Cleared {} topics, {} clears failed",
                        report.cleared, report.failed
                    );
                }
            }
        }
    }

    Ok(())
}

/// Race a one-shot command against the stop signal. `None` means interrupted.
async fn until_stopped<T, F>(mut stop: StopSignal, command: F) -> CliResult<Option<T>>
where
    F: Future<Output = CliResult<T>>,
{
    tokio::select! {
        result = command => result.map(Some),
        _ = stop.stopped() => {
            warn!("Interrupted before the command finished");
            Ok(None)
        }
    }
}

/// Fire the stop signal on SIGINT/SIGTERM or when the batch timeout elapses
fn spawn_stop_trigger(stop_tx: watch::Sender<bool>, timeout: Option<Duration>) {
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown_signal() => info!("Received shutdown signal"),
            _ = batch_timeout(timeout) => info!("Batch timeout elapsed"),
        }
        let _ = stop_tx.send(true);
    });
}

async fn batch_timeout(timeout: Option<Duration>) {
    match timeout {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CliError;

    #[tokio::test]
    async fn test_until_stopped_returns_result() {
        let (_tx, stop) = StopSignal::channel();
        let value = until_stopped(stop, async { Ok::<_, CliError>(7) })
            .await
            .unwrap();
        assert_eq!(value, Some(7));
    }

    #[tokio::test]
    async fn test_until_stopped_interrupts() {
        let (tx, stop) = StopSignal::channel();
        tx.send(true).unwrap();
        let value = until_stopped(stop, std::future::pending::<CliResult<()>>())
            .await
            .unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_batch_timeout_fires_stop() {
        let (tx, mut stop) = StopSignal::channel();
        spawn_stop_trigger(tx, Some(Duration::from_millis(10)));
        tokio::time::timeout(Duration::from_secs(2), stop.stopped())
            .await
            .unwrap();
    }
}
