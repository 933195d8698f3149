// m3-net/src/fetch.rs
//! Bounded-concurrency fetch pipeline.
//!
//! The pipeline turns a list of fetchables into requests for the files that
//! are missing from a directory, runs at most `concurrency` transfers at a
//! time and reports each finished request on a completion stream in the
//! order the requests finish.
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use m3_common::error::{M3Error, Result};
use m3_common::pipeline::{FetchCompletion, TransferStats};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::checksum::{file_digest, Checksum, HashAlgorithm};

/// Anything that can be resolved to a URL, a stable filename and a checksum.
pub trait Fetchable {
    fn url(&self) -> &str;

    /// Deterministic target filename, relative to the fetch directory.
    fn filename(&self) -> &str;

    fn checksum(&self) -> &Checksum;

    fn algorithm(&self) -> HashAlgorithm {
        self.checksum().algorithm
    }
}

/// Performs the byte transfer for one request, writing into `staging`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn transfer(&self, request: &FetchRequest, staging: &Path) -> Result<TransferStats>;
}

/// Decoded digest a transfer must match before it is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedDigest {
    pub algorithm: HashAlgorithm,
    pub digest: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub filename: String,
    pub url: String,
    pub destination: PathBuf,
    pub checksum: Option<ExpectedDigest>,
    pub remove_on_error: bool,
}

impl FetchRequest {
    pub fn for_fetchable<F: Fetchable + ?Sized>(item: &F, dir: &Path) -> Self {
        let checksum = expected_digest(item.checksum(), item.filename());
        Self {
            filename: item.filename().to_string(),
            url: item.url().to_string(),
            destination: dir.join(item.filename()),
            checksum,
            remove_on_error: true,
        }
    }

    /// Sibling path the transfer writes to before the verified bytes are
    /// moved to `destination`.
    pub fn staging_path(&self) -> PathBuf {
        let name = self
            .destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.filename.clone());
        self.destination.with_file_name(format!(".{name}.download"))
    }

    fn completion_failure(&self, error: M3Error, stats: TransferStats) -> FetchCompletion {
        FetchCompletion::failure(
            self.filename.clone(),
            self.destination.clone(),
            error,
            stats,
        )
    }
}

fn expected_digest(checksum: &Checksum, filename: &str) -> Option<ExpectedDigest> {
    if checksum.is_empty() {
        return None;
    }
    match checksum.decode() {
        Some(digest) => Some(ExpectedDigest {
            algorithm: checksum.algorithm,
            digest,
        }),
        None => {
            debug!(
                "Checksum for {} is not valid hex ('{}'); fetching without verification",
                filename, checksum.hex
            );
            None
        }
    }
}

/// The completion stream of a started fetch plus the number of requests
/// submitted to it. The stream yields exactly `submitted` records.
#[derive(Debug)]
pub struct FetchBatch {
    pub completions: mpsc::UnboundedReceiver<FetchCompletion>,
    pub submitted: usize,
}

impl FetchBatch {
    /// Drains the stream. Records arrive in completion order.
    pub async fn collect(mut self) -> Vec<FetchCompletion> {
        let mut records = Vec::with_capacity(self.submitted);
        while let Some(record) = self.completions.recv().await {
            records.push(record);
        }
        records
    }
}

/// True when the canonical file of `item` exists in `dir`.
pub fn is_present<F: Fetchable + ?Sized>(item: &F, dir: &Path) -> bool {
    dir.join(item.filename()).exists()
}

/// Fetchables whose canonical filename is absent from `dir`, first
/// occurrence wins for duplicate filenames.
pub fn need_list<'a, F: Fetchable>(items: &'a [F], dir: &Path) -> Vec<&'a F> {
    let mut seen = HashSet::new();
    items
        .iter()
        .filter(|item| seen.insert(item.filename().to_string()))
        .filter(|item| !is_present(*item, dir))
        .collect()
}

/// Starts fetching every item missing from `dir` and returns immediately
/// with the completion stream and the submitted count. Must be called from
/// within a Tokio runtime.
pub fn fetch_all<F: Fetchable>(
    items: &[F],
    dir: &Path,
    concurrency: usize,
    transport: Arc<dyn Transport>,
) -> Result<FetchBatch> {
    let requests: Vec<FetchRequest> = need_list(items, dir)
        .into_iter()
        .map(|item| FetchRequest::for_fetchable(item, dir))
        .collect();
    debug!(
        "{} of {} items need fetching into {}",
        requests.len(),
        items.len(),
        dir.display()
    );
    if !requests.is_empty() {
        fs::create_dir_all(dir).map_err(|e| {
            M3Error::IoError(format!(
                "Failed to create directory {}: {}",
                dir.display(),
                e
            ))
        })?;
    }
    Ok(submit(requests, concurrency, transport))
}

/// Runs prepared requests through a worker pool of `concurrency` slots.
pub fn submit(
    requests: Vec<FetchRequest>,
    concurrency: usize,
    transport: Arc<dyn Transport>,
) -> FetchBatch {
    let submitted = requests.len();
    let (tx, rx) = mpsc::unbounded_channel();
    if submitted == 0 {
        return FetchBatch {
            completions: rx,
            submitted,
        };
    }

    let slots = Arc::new(Semaphore::new(concurrency.max(1)));
    tokio::spawn(async move {
        let mut tasks = JoinSet::new();
        for request in requests {
            let slots = Arc::clone(&slots);
            let transport = Arc::clone(&transport);
            let tx = tx.clone();
            tasks.spawn(async move {
                let _permit = match slots.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        let failure = request.completion_failure(
                            M3Error::Generic(format!("Worker pool closed: {e}")),
                            TransferStats::default(),
                        );
                        let _ = tx.send(failure);
                        return;
                    }
                };
                let completion = run_isolated(request, transport).await;
                if tx.send(completion).is_err() {
                    debug!("Completion stream receiver dropped; discarding record");
                }
            });
        }
        drop(tx);
        while let Some(result) = tasks.join_next().await {
            if let Err(join_error) = result {
                error!("Fetch slot task failed: {}", join_error);
            }
        }
    });

    FetchBatch {
        completions: rx,
        submitted,
    }
}

/// Runs one request in its own task so a panic still produces a failure
/// record for that filename.
async fn run_isolated(request: FetchRequest, transport: Arc<dyn Transport>) -> FetchCompletion {
    let filename = request.filename.clone();
    let destination = request.destination.clone();
    let staging = request.staging_path();
    let remove_on_error = request.remove_on_error;
    match tokio::spawn(execute(request, transport)).await {
        Ok(completion) => completion,
        Err(join_error) => {
            let message = if join_error.is_panic() {
                get_panic_message(join_error.into_panic())
            } else {
                "task cancelled".to_string()
            };
            error!("Fetch of {} aborted: {}", filename, message);
            if remove_on_error {
                remove_quietly(&staging);
            }
            FetchCompletion::failure(
                filename,
                destination,
                M3Error::Generic(format!("fetch task aborted: {message}")),
                TransferStats::default(),
            )
        }
    }
}

/// Transfers, verifies and moves one file into place.
pub async fn execute(request: FetchRequest, transport: Arc<dyn Transport>) -> FetchCompletion {
    let staging = request.staging_path();
    debug!("Fetching {} from {}", request.filename, request.url);

    if let Some(parent) = request.destination.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            return request.completion_failure(
                M3Error::IoError(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                )),
                TransferStats::default(),
            );
        }
    }

    let stats = match transport.transfer(&request, &staging).await {
        Ok(stats) => stats,
        Err(e) => {
            error!("Download of {} from {} failed: {}", request.filename, request.url, e);
            if request.remove_on_error {
                remove_quietly(&staging);
            }
            return request.completion_failure(e, TransferStats::default());
        }
    };

    if let Err(e) = accept(&request, &staging) {
        error!("Rejected {}: {}", request.filename, e);
        if request.remove_on_error {
            remove_quietly(&staging);
        }
        return request.completion_failure(e, stats);
    }

    debug!(
        "Fetched {} ({} bytes)",
        request.destination.display(),
        stats.bytes_transferred
    );
    FetchCompletion::success(request.filename.clone(), request.destination.clone(), stats)
}

fn accept(request: &FetchRequest, staging: &Path) -> Result<()> {
    match &request.checksum {
        Some(expected) => {
            let actual = file_digest(staging, expected.algorithm)?;
            if actual != expected.digest {
                return Err(M3Error::ChecksumMismatch(format!(
                    "{}: expected {}:{}, got {}",
                    request.filename,
                    expected.algorithm,
                    hex::encode(&expected.digest),
                    hex::encode(&actual)
                )));
            }
        }
        None => warn!(
            "Skipping checksum verification for {} - none provided.",
            request.filename
        ),
    }
    fs::rename(staging, &request.destination).map_err(|e| {
        M3Error::IoError(format!(
            "Failed to move temp file {} to {}: {}",
            staging.display(),
            request.destination.display(),
            e
        ))
    })
}

fn remove_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

pub(crate) fn get_panic_message(e: Box<dyn std::any::Any + Send>) -> String {
    match e.downcast_ref::<&'static str>() {
        Some(s) => (*s).to_string(),
        None => match e.downcast_ref::<String>() {
            Some(s) => s.clone(),
            None => "Unknown panic payload".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::{bytes_checksum, HashAlgorithm};

    struct Item {
        url: String,
        filename: String,
        checksum: Checksum,
    }

    impl Fetchable for Item {
        fn url(&self) -> &str {
            &self.url
        }
        fn filename(&self) -> &str {
            &self.filename
        }
        fn checksum(&self) -> &Checksum {
            &self.checksum
        }
    }

    fn item(name: &str, hex: &str) -> Item {
        Item {
            url: format!("https://example.org/{name}"),
            filename: name.to_string(),
            checksum: Checksum::new(HashAlgorithm::Sha256, hex),
        }
    }

    #[test]
    fn request_carries_decoded_checksum() {
        let sum = bytes_checksum(b"abc", HashAlgorithm::Sha256);
        let request = FetchRequest::for_fetchable(&item("a.jar", &sum), Path::new("/tmp/mods"));
        assert_eq!(request.destination, PathBuf::from("/tmp/mods/a.jar"));
        assert_eq!(request.checksum.unwrap().digest, hex::decode(sum).unwrap());
        assert!(request.remove_on_error);
    }

    #[test]
    fn undecodable_checksum_is_dropped() {
        let request = FetchRequest::for_fetchable(&item("a.jar", "not-hex"), Path::new("mods"));
        assert!(request.checksum.is_none());
        let request = FetchRequest::for_fetchable(&item("a.jar", ""), Path::new("mods"));
        assert!(request.checksum.is_none());
    }

    #[test]
    fn staging_path_is_hidden_sibling() {
        let request = FetchRequest::for_fetchable(&item("sub/x.cfg", ""), Path::new("config"));
        assert_eq!(request.staging_path(), PathBuf::from("config/sub/.x.cfg.download"));
    }

    #[test]
    fn need_list_skips_present_and_duplicate_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.jar"), b"b").unwrap();
        let items = vec![item("a.jar", ""), item("b.jar", ""), item("a.jar", "")];
        let needed: Vec<&str> = need_list(&items, dir.path())
            .into_iter()
            .map(|i| i.filename())
            .collect();
        assert_eq!(needed, vec!["a.jar"]);
    }

    #[tokio::test]
    async fn nothing_to_fetch_yields_closed_stream() {
        struct Never;
        #[async_trait]
        impl Transport for Never {
            async fn transfer(&self, _: &FetchRequest, _: &Path) -> Result<TransferStats> {
                unreachable!("no request should be submitted")
            }
        }
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.jar"), b"a").unwrap();
        let batch = fetch_all(&[item("a.jar", "")], dir.path(), 2, Arc::new(Never)).unwrap();
        assert_eq!(batch.submitted, 0);
        assert!(batch.collect().await.is_empty());
    }

    #[tokio::test]
    async fn rejected_transfer_keeps_existing_destination() {
        struct Wrong;
        #[async_trait]
        impl Transport for Wrong {
            async fn transfer(&self, _: &FetchRequest, staging: &Path) -> Result<TransferStats> {
                fs::write(staging, b"tampered")?;
                Ok(TransferStats {
                    bytes_transferred: 8,
                    total_size: Some(8),
                })
            }
        }
        let dir = tempfile::tempdir().unwrap();
        let sum = bytes_checksum(b"good", HashAlgorithm::Sha256);
        let request = FetchRequest::for_fetchable(&item("a.jar", &sum), dir.path());
        fs::write(&request.destination, b"kept").unwrap();

        let completion = execute(request.clone(), Arc::new(Wrong)).await;

        assert!(matches!(completion.error, Some(M3Error::ChecksumMismatch(_))));
        assert_eq!(fs::read(&request.destination).unwrap(), b"kept");
        assert!(!request.staging_path().exists());
    }
}
