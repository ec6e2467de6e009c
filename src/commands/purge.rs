//! `purge [file]`: clear a list of exact topics without subscribing

use crate::error::CliResult;
use crate::purge::{PurgeReport, PurgeThrottler};
use crate::transport::Broker;
use std::path::Path;
use tokio::io::BufReader;
use tracing::info;

/// Purge the topics listed in `source`, or on stdin when no file is given
pub async fn run<B: Broker>(
    broker: &B,
    throttler: &PurgeThrottler,
    source: Option<&Path>,
) -> CliResult<PurgeReport> {
    let report = match source {
        Some(path) => {
            info!("Purging topics listed in {}", path.display());
            let file = tokio::fs::File::open(path).await?;
            throttler.drain(broker, BufReader::new(file)).await?
        }
        None => {
            info!("Purging topics read from stdin");
            throttler
                .drain(broker, BufReader::new(tokio::io::stdin()))
                .await?
        }
    };

    info!(
        cleared = report.cleared,
        failed = report.failed,
        skipped = report.skipped,
        "Purge finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CliError;
    use crate::testing::MockBroker;
    use std::io::Write;
    use std::time::Duration;

    #[tokio::test]
    async fn test_purges_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "a/b").unwrap();
        writeln!(file, "c").unwrap();

        let broker = MockBroker::new();
        let throttler = PurgeThrottler::new(Duration::from_millis(1));
        let report = run(&broker, &throttler, Some(file.path())).await.unwrap();

        assert_eq!(report.cleared, 2);
        assert_eq!(broker.get_published().await.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let broker = MockBroker::new();
        let result = run(
            &broker,
            &PurgeThrottler::default(),
            Some(Path::new("/nonexistent/topics.txt")),
        )
        .await;
        assert!(matches!(result, Err(CliError::Io(_))));
    }
}
