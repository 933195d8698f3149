use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use m3_common::error::{M3Error, Result};
use m3_common::model::{RawMod, RawModSet};
use m3_common::pipeline::{FetchSummary, TransferStats};
use m3_core::{ModSet, Resolver};
use m3_net::checksum::{bytes_checksum, HashAlgorithm};
use m3_net::fetch::{FetchRequest, Fetchable, Transport};
use tempfile::TempDir;

/// Serves bytes from memory and records how many transfers overlapped.
#[derive(Default)]
struct MemoryTransport {
    bodies: HashMap<String, Vec<u8>>,
    delays: HashMap<String, u64>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl MemoryTransport {
    fn serve(mut self, url: &str, body: &[u8]) -> Self {
        self.bodies.insert(url.to_string(), body.to_vec());
        self
    }

    fn slow(mut self, url: &str, millis: u64) -> Self {
        self.delays.insert(url.to_string(), millis);
        self
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn transfer(&self, request: &FetchRequest, staging: &Path) -> Result<TransferStats> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let millis = self.delays.get(&request.url).copied().unwrap_or(25);
        tokio::time::sleep(Duration::from_millis(millis)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let body = self.bodies.get(&request.url).ok_or_else(|| {
            M3Error::DownloadError(
                request.filename.clone(),
                request.url.clone(),
                "404 Not Found".to_string(),
            )
        })?;
        fs::write(staging, body)?;
        Ok(TransferStats {
            bytes_transferred: body.len() as u64,
            total_size: Some(body.len() as u64),
        })
    }
}

fn raw(name: &str, content: &[u8]) -> RawMod {
    RawMod {
        name: name.into(),
        version: "1.0".into(),
        checksum: bytes_checksum(content, HashAlgorithm::Sha256),
        url: format!("https://mods.example.org/{name}.jar"),
        curse: String::new(),
    }
}

#[tokio::test]
async fn fetches_only_missing_mods_within_concurrency_limit() {
    let dir = TempDir::new().unwrap();
    let raw_set = RawModSet {
        ignore: Vec::new(),
        items: vec![
            raw("alpha", b"alpha"),
            raw("beta", b"beta"),
            raw("gamma", b"gamma"),
            raw("delta", b"delta"),
            raw("epsilon", b"epsilon"),
        ],
    };
    let resolved = ModSet::from_raw(&raw_set, &Resolver::default());
    assert!(resolved.is_complete());
    let set = resolved.set;

    // alpha and beta are already in place.
    fs::write(dir.path().join(set.items[0].filename()), b"alpha").unwrap();
    fs::write(dir.path().join(set.items[1].filename()), b"beta").unwrap();

    // delta is served with the wrong bytes, epsilon not at all.
    let transport = Arc::new(
        MemoryTransport::default()
            .serve("https://mods.example.org/gamma.jar", b"gamma")
            .serve("https://mods.example.org/delta.jar", b"corrupted"),
    );

    let (report, batch) = set.fetch_to(dir.path(), 2, transport.clone()).unwrap();
    assert!(report.is_clean());
    assert_eq!(batch.submitted, 3);

    let records = batch.collect().await;
    assert_eq!(records.len(), 3);
    assert_eq!(transport.peak.load(Ordering::SeqCst), 2);
    assert_eq!(transport.calls.load(Ordering::SeqCst), 3);

    let mut summary = FetchSummary::default();
    for record in &records {
        summary.record(record);
        let path = dir.path().join(&record.filename);
        if record.is_success() {
            assert!(path.exists());
        } else {
            assert!(!path.exists(), "{} left behind", record.filename);
        }
    }
    assert_eq!(summary.fetched, 1);
    assert_eq!(summary.failed.len(), 2);

    let gamma = &set.items[2];
    assert_eq!(fs::read(dir.path().join(gamma.filename())).unwrap(), b"gamma");
    let delta_record = records
        .iter()
        .find(|r| r.filename == set.items[3].filename())
        .unwrap();
    assert!(matches!(
        delta_record.error,
        Some(M3Error::ChecksumMismatch(_))
    ));

    let leftovers: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".download"))
        .collect();
    assert!(leftovers.is_empty());
    assert_eq!(set.need_count(dir.path()), 2);
}

#[tokio::test]
async fn concurrency_of_zero_still_makes_progress() {
    let dir = TempDir::new().unwrap();
    let raw_set = RawModSet {
        ignore: Vec::new(),
        items: vec![raw("solo", b"solo")],
    };
    let set = ModSet::from_raw(&raw_set, &Resolver::default()).set;
    let transport = Arc::new(MemoryTransport::default().serve("https://mods.example.org/solo.jar", b"solo"));

    let (_, batch) = set.fetch_to(&dir.path().join("mods"), 0, transport).unwrap();
    let records = batch.collect().await;
    assert_eq!(records.len(), 1);
    assert!(records[0].is_success());
    assert_eq!(set.need_count(&dir.path().join("mods")), 0);
}

#[tokio::test]
async fn records_arrive_in_completion_order() {
    let dir = TempDir::new().unwrap();
    let raw_set = RawModSet {
        ignore: Vec::new(),
        items: vec![raw("slow", b"slow"), raw("medium", b"medium"), raw("fast", b"fast")],
    };
    let set = ModSet::from_raw(&raw_set, &Resolver::default()).set;
    let transport = Arc::new(
        MemoryTransport::default()
            .serve("https://mods.example.org/slow.jar", b"slow")
            .serve("https://mods.example.org/medium.jar", b"medium")
            .serve("https://mods.example.org/fast.jar", b"fast")
            .slow("https://mods.example.org/slow.jar", 300)
            .slow("https://mods.example.org/medium.jar", 150)
            .slow("https://mods.example.org/fast.jar", 5),
    );

    let (_, batch) = set.fetch_to(dir.path(), 3, transport.clone()).unwrap();
    let records = batch.collect().await;

    let order: Vec<&str> = records.iter().map(|r| r.filename.as_str()).collect();
    assert_eq!(
        order,
        vec![
            set.items[2].filename(),
            set.items[1].filename(),
            set.items[0].filename()
        ]
    );
    assert!(records.iter().all(|r| r.is_success()));
    assert_eq!(transport.peak.load(Ordering::SeqCst), 3);
}
