//! Shared test support: a temp-dir environment, a deterministic fingerprint
//! calculator, and a recording handler.

#![allow(dead_code)]

use phloem_catalog::{
    Catalog, CatalogError, CatalogFile, Fingerprint, FingerprintKind, Fingerprints, Folder,
};
use phloem_scan::{
    FingerprintCalculator, Handler, Opener, ScanOptions, ScanPipeline, Scanner,
};
use phloem_vfs::{path as vpath, NativeVfs};
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub struct TestEnv {
    pub temp: TempDir,
    pub root: PathBuf,
    pub catalog: Catalog,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("temp dir");
        let root = temp.path().join("lib");
        fs::create_dir_all(&root).expect("create root");
        let catalog = Catalog::open(temp.path().join("catalog.sqlite3")).expect("open catalog");
        Self {
            temp,
            root,
            catalog,
        }
    }

    pub fn root_str(&self) -> String {
        vpath::normalize(&self.root)
    }

    /// Absolute scanner path for a root-relative entry.
    pub fn abs(&self, rel: &str) -> String {
        vpath::normalize(&self.root.join(rel))
    }

    pub fn write_file(&self, rel: &str, content: &[u8]) -> PathBuf {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, content).expect("write file");
        path
    }

    pub fn set_mtime(&self, rel: &str, unix_secs: i64) {
        let path = self.root.join(rel);
        filetime::set_file_mtime(&path, filetime::FileTime::from_unix_time(unix_secs, 0))
            .expect("set mtime");
    }

    pub fn folder(&self, path: &str) -> Option<Folder> {
        self.catalog
            .with_read_txn::<_, CatalogError, _>(|ctx| ctx.folders().find_by_path(path, true))
            .expect("folder lookup")
    }

    pub fn file(&self, path: &str) -> Option<CatalogFile> {
        self.catalog
            .with_read_txn::<_, CatalogError, _>(|ctx| ctx.files().find_by_path(path, true))
            .expect("file lookup")
    }
}

/// FNV-1a over the file contents, hex encoded. Stable across runs, cheap,
/// and collision-free for the handful of distinct payloads used in tests.
pub fn digest(data: &[u8]) -> String {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in data {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    format!("{hash:016x}")
}

/// Computes an oshash-style digest of the contents, plus an MD5-style digest
/// when enabled. With `use_existing`, already-present kinds are kept as-is.
#[derive(Default)]
pub struct StubCalculator {
    with_md5: AtomicBool,
}

impl StubCalculator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_md5(&self, enabled: bool) {
        self.with_md5.store(enabled, Ordering::SeqCst);
    }
}

impl FingerprintCalculator for StubCalculator {
    fn calculate(
        &self,
        file: &CatalogFile,
        opener: &dyn Opener,
        use_existing: bool,
    ) -> phloem_scan::Result<Fingerprints> {
        let want_md5 = self.with_md5.load(Ordering::SeqCst);

        let mut fingerprints = if use_existing {
            file.fingerprints.clone()
        } else {
            Fingerprints::default()
        };

        let have_oshash = fingerprints.get(&FingerprintKind::Oshash).is_some();
        let have_md5 = fingerprints.get(&FingerprintKind::Md5).is_some();
        if have_oshash && (!want_md5 || have_md5) {
            return Ok(fingerprints);
        }

        let mut reader = opener.open()?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;

        if !have_oshash {
            fingerprints.set(Fingerprint::new(FingerprintKind::Oshash, digest(&data)));
        }
        if want_md5 && !have_md5 {
            fingerprints.set(Fingerprint::new(
                FingerprintKind::Md5,
                format!("md5-{}", digest(&data)),
            ));
        }
        Ok(fingerprints)
    }
}

/// Records every handler invocation as `(path, old_path)`.
#[derive(Clone, Default)]
pub struct RecordingHandler {
    events: Arc<Mutex<Vec<(String, Option<String>)>>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, Option<String>)> {
        self.events.lock().unwrap().clone()
    }
}

impl Handler for RecordingHandler {
    fn handle(
        &self,
        _ctx: &phloem_catalog::TxnContext<'_>,
        file: &CatalogFile,
        old: Option<&CatalogFile>,
    ) -> phloem_scan::Result<()> {
        self.events
            .lock()
            .unwrap()
            .push((file.path.clone(), old.map(|o| o.path.clone())));
        Ok(())
    }
}

pub fn default_options(env: &TestEnv) -> ScanOptions {
    ScanOptions {
        roots: vec![env.root_str()],
        zip_extensions: vec!["zip".to_string()],
        rescan: false,
        parallelism: 2,
    }
}

pub fn pipeline_with(
    calculator: Arc<StubCalculator>,
    handler: &RecordingHandler,
) -> ScanPipeline {
    let mut pipeline = ScanPipeline::new(calculator);
    pipeline.handlers.push(Box::new(handler.clone()));
    pipeline
}

pub fn scanner(env: &TestEnv, options: ScanOptions, pipeline: ScanPipeline) -> Scanner {
    Scanner::new(
        env.catalog.clone(),
        Arc::new(NativeVfs::new()),
        options,
        pipeline,
    )
}
