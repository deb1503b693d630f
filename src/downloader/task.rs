use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::transport::{TransferError, Transport};
use crate::utils::gate::GatePermit;

const FALLBACK_FILENAME: &str = "file";

/// One requested download: where to fetch from and which directory to put it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDescriptor {
    pub locator: String,
    pub destination: PathBuf,
}

/// Terminal state of a transfer task.
#[derive(Debug)]
pub enum Outcome {
    Success {
        locator: String,
        path: PathBuf,
        bytes: u64,
    },
    TransferFailed {
        locator: String,
        source: TransferError,
    },
    SinkOpenFailed {
        locator: String,
        path: PathBuf,
        source: io::Error,
    },
}

impl Outcome {
    pub fn locator(&self) -> &str {
        match self {
            Outcome::Success { locator, .. }
            | Outcome::TransferFailed { locator, .. }
            | Outcome::SinkOpenFailed { locator, .. } => locator,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success {
                locator,
                path,
                bytes,
            } => write!(f, "{} -> {} ({} bytes)", locator, path.display(), bytes),
            Outcome::TransferFailed { locator, source } => {
                write!(f, "Failed to download file from URL: {} ({})", locator, source)
            }
            Outcome::SinkOpenFailed { path, source, .. } => write!(
                f,
                "Failed to open file for writing: {} ({})",
                path.display(),
                source
            ),
        }
    }
}

/// Name of the file a locator is saved as: everything after the last `/`,
/// the whole locator when it has no `/`, or `"file"` for an empty locator.
///
/// The result is not validated. A trailing `/` yields an empty name, so the
/// target is the destination directory itself and opening it fails. No
/// percent-decoding and no query stripping; distinct locators may map to the
/// same name.
pub fn derive_filename(locator: &str) -> &str {
    match locator.rsplit_once('/') {
        Some((_, tail)) => tail,
        None if locator.is_empty() => FALLBACK_FILENAME,
        None => locator,
    }
}

pub fn target_path(destination: &Path, locator: &str) -> PathBuf {
    destination.join(derive_filename(locator))
}

/// Carries one [`TaskDescriptor`] to an [`Outcome`].
#[derive(Debug)]
pub struct TransferTask {
    locator: String,
    target: PathBuf,
    timeout: Option<Duration>,
}

impl TransferTask {
    pub fn new(descriptor: TaskDescriptor, timeout: Option<Duration>) -> Self {
        let target = target_path(&descriptor.destination, &descriptor.locator);
        Self {
            locator: descriptor.locator,
            target,
            timeout,
        }
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Runs the transfer while holding `permit`. The unit goes back to the
    /// gate before the outcome is returned, whatever the outcome is.
    pub async fn run(self, permit: GatePermit, transport: Arc<dyn Transport>) -> Outcome {
        let outcome = self.transfer(transport.as_ref()).await;
        permit.release();
        report(&outcome);
        outcome
    }

    async fn transfer(self, transport: &dyn Transport) -> Outcome {
        let mut sink = match File::create(&self.target).await {
            Ok(file) => file,
            Err(source) => {
                return Outcome::SinkOpenFailed {
                    locator: self.locator,
                    path: self.target,
                    source,
                };
            }
        };

        let fetch = transport.fetch(&self.locator, &mut sink);
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fetch)
                .await
                .unwrap_or(Err(TransferError::TimedOut(limit))),
            None => fetch.await,
        };
        let result = match result {
            Ok(bytes) => sink.flush().await.map(|_| bytes).map_err(TransferError::from),
            Err(err) => Err(err),
        };

        match result {
            Ok(bytes) => Outcome::Success {
                locator: self.locator,
                path: self.target,
                bytes,
            },
            Err(source) => Outcome::TransferFailed {
                locator: self.locator,
                source,
            },
        }
    }
}

fn report(outcome: &Outcome) {
    match outcome {
        Outcome::Success {
            locator,
            path,
            bytes,
        } => tracing::info!(%locator, path = %path.display(), bytes, "download finished"),
        Outcome::TransferFailed { locator, source } => {
            tracing::warn!(%locator, error = %source, "Failed to download file from URL")
        }
        Outcome::SinkOpenFailed { path, source, .. } => tracing::error!(
            locator = %outcome.locator(),
            path = %path.display(),
            error = %source,
            "Failed to open file for writing"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::StubTransport;
    use crate::utils::gate::{Capacity, Gate};

    fn descriptor(dir: &Path, locator: &str) -> TaskDescriptor {
        TaskDescriptor {
            locator: locator.to_string(),
            destination: dir.to_path_buf(),
        }
    }

    #[test]
    fn test_derive_filename() {
        assert_eq!(derive_filename("https://host/path/to/report.csv"), "report.csv");
        assert_eq!(derive_filename("report.csv"), "report.csv");
        assert_eq!(derive_filename(""), "file");
        assert_eq!(derive_filename("https://host/dir/"), "");
        assert_eq!(
            derive_filename("https://host/a%20b.txt?x=1"),
            "a%20b.txt?x=1"
        );
    }

    #[test]
    fn test_target_path_joins_destination() {
        let path = target_path(Path::new("/tmp/out"), "https://a.test/x.bin");
        assert_eq!(path, PathBuf::from("/tmp/out/x.bin"));
    }

    #[tokio::test]
    async fn test_run_writes_file_and_releases_unit() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Gate::new(Capacity::new(1));
        let transport: Arc<dyn Transport> = Arc::new(StubTransport::new(4096));

        let task = TransferTask::new(descriptor(dir.path(), "https://a.test/x.bin"), None);
        let permit = gate.acquire().await.unwrap();
        let outcome = task.run(permit, transport).await;

        match outcome {
            Outcome::Success { path, bytes, .. } => {
                assert_eq!(bytes, 4096);
                assert_eq!(path, dir.path().join("x.bin"));
                assert_eq!(std::fs::metadata(&path).unwrap().len(), 4096);
            }
            other => panic!("Expected Success, got {:?}", other),
        }
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test]
    async fn test_run_truncates_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x.bin"), vec![1u8; 10_000]).unwrap();
        let gate = Gate::new(Capacity::new(1));
        let transport: Arc<dyn Transport> = Arc::new(StubTransport::new(10));

        let task = TransferTask::new(descriptor(dir.path(), "https://a.test/x.bin"), None);
        let outcome = task.run(gate.acquire().await.unwrap(), transport).await;

        assert!(outcome.is_success());
        assert_eq!(std::fs::metadata(dir.path().join("x.bin")).unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_sink_open_failure_skips_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let gate = Gate::new(Capacity::new(1));
        let stub = Arc::new(StubTransport::new(16));
        let transport: Arc<dyn Transport> = stub.clone();

        let task = TransferTask::new(descriptor(&missing, "https://a.test/x.bin"), None);
        let outcome = task.run(gate.acquire().await.unwrap(), transport).await;

        match outcome {
            Outcome::SinkOpenFailed { path, .. } => assert_eq!(path, missing.join("x.bin")),
            other => panic!("Expected SinkOpenFailed, got {:?}", other),
        }
        assert_eq!(stub.calls(), 0);
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test]
    async fn test_trailing_slash_targets_directory_and_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Gate::new(Capacity::new(1));
        let stub = Arc::new(StubTransport::new(16));
        let transport: Arc<dyn Transport> = stub.clone();

        let task = TransferTask::new(descriptor(dir.path(), "https://host/dir/"), None);
        let outcome = task.run(gate.acquire().await.unwrap(), transport).await;

        match &outcome {
            Outcome::SinkOpenFailed { path, .. } => assert_eq!(path, &dir.path().join("")),
            other => panic!("Expected SinkOpenFailed, got {:?}", other),
        }
        assert_eq!(outcome.locator(), "https://host/dir/");
        assert_eq!(stub.calls(), 0);
        assert!(!dir.path().join("file").exists());
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test]
    async fn test_transfer_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Gate::new(Capacity::new(1));
        let transport: Arc<dyn Transport> =
            Arc::new(StubTransport::new(16).failing("https://a.test/bad.bin"));

        let task = TransferTask::new(descriptor(dir.path(), "https://a.test/bad.bin"), None);
        let outcome = task.run(gate.acquire().await.unwrap(), transport).await;

        match &outcome {
            Outcome::TransferFailed { locator, source } => {
                assert_eq!(locator, "https://a.test/bad.bin");
                assert!(matches!(source, TransferError::Status(500)));
            }
            other => panic!("Expected TransferFailed, got {:?}", other),
        }
        assert_eq!(outcome.locator(), "https://a.test/bad.bin");
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test]
    async fn test_timeout_releases_unit() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Gate::new(Capacity::new(1));
        let transport: Arc<dyn Transport> =
            Arc::new(StubTransport::new(16).delay(Duration::from_secs(30)));

        let task = TransferTask::new(
            descriptor(dir.path(), "https://a.test/slow.bin"),
            Some(Duration::from_millis(50)),
        );
        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            task.run(gate.acquire().await.unwrap(), transport),
        )
        .await
        .unwrap();

        match outcome {
            Outcome::TransferFailed { source, .. } => {
                assert!(matches!(source, TransferError::TimedOut(_)))
            }
            other => panic!("Expected TransferFailed, got {:?}", other),
        }
        assert_eq!(gate.available(), 1);
    }
}
