//! End-to-end scanner scenarios against a real catalog and filesystem.

mod common;

use common::{default_options, digest, pipeline_with, scanner, RecordingHandler, StubCalculator, TestEnv};
use phloem_catalog::{CatalogError, FingerprintKind, ImageInfo, MediaInfo};
use phloem_scan::{CancelToken, Decorator, FileFilter, PathPrefixFilter, ScanError};
use phloem_vfs::Vfs;
use std::fs;
use std::io::Write;

fn scan(scanner: &phloem_scan::Scanner) -> phloem_scan::ScanReport {
    scanner.scan(&CancelToken::new()).expect("scan")
}

// ============================================================================
// Core scenarios
// ============================================================================

#[test]
fn s1_new_file_under_new_folder() {
    let env = TestEnv::new();
    env.write_file("a/x.mp4", &[7u8; 100]);
    env.set_mtime("a/x.mp4", 1_700_000_000);

    let calculator = StubCalculator::new();
    let handler = RecordingHandler::new();
    let s = scanner(&env, default_options(&env), pipeline_with(calculator, &handler));

    let report = scan(&s);
    assert_eq!(report.stats.files_new, 1);
    assert_eq!(report.stats.files_discovered, 1);
    assert_eq!(report.stats.folders_new, 2, "root and subfolder are created");
    assert_eq!(report.stats.errors, 0);
    assert!(report.errors.is_empty());

    let root = env.folder(&env.root_str()).expect("root folder row");
    let sub = env.folder(&env.abs("a")).expect("subfolder row");
    assert_eq!(sub.parent_folder_id, root.id);

    let file = env.file(&env.abs("a/x.mp4")).expect("file row");
    assert_eq!(file.size, 100);
    assert_eq!(file.mod_time.timestamp(), 1_700_000_000);
    assert_eq!(file.parent_folder_id, sub.id.unwrap());
    assert_eq!(file.zip_file_id, None);
    assert_eq!(
        file.fingerprints.get(&FingerprintKind::Oshash),
        Some(digest(&[7u8; 100]).as_str())
    );

    assert_eq!(handler.events(), vec![(env.abs("a/x.mp4"), None)]);
}

#[test]
fn s2_rescan_without_changes_is_a_noop() {
    let env = TestEnv::new();
    env.write_file("a/x.mp4", &[7u8; 100]);

    let calculator = StubCalculator::new();
    let handler = RecordingHandler::new();
    let s = scanner(&env, default_options(&env), pipeline_with(calculator, &handler));

    scan(&s);
    let before = env.file(&env.abs("a/x.mp4")).unwrap();

    let report = scan(&s);
    assert_eq!(report.stats.files_new, 0);
    assert_eq!(report.stats.files_updated, 0);
    assert_eq!(report.stats.files_renamed, 0);
    assert_eq!(report.stats.files_unchanged, 1);
    assert_eq!(report.stats.folders_new, 0);
    assert_eq!(report.stats.folders_updated, 0);

    let after = env.file(&env.abs("a/x.mp4")).unwrap();
    assert_eq!(after.updated_at, before.updated_at, "no write may occur");
    // no handler-required filters are configured, so handlers stay quiet
    assert_eq!(handler.events().len(), 1);
}

#[test]
fn s3_moved_file_keeps_identity() {
    let env = TestEnv::new();
    env.write_file("a/x.mp4", b"stable contents");

    let calculator = StubCalculator::new();
    let handler = RecordingHandler::new();
    let s = scanner(&env, default_options(&env), pipeline_with(calculator, &handler));
    scan(&s);

    let original = env.file(&env.abs("a/x.mp4")).unwrap();

    fs::create_dir_all(env.root.join("b")).unwrap();
    fs::rename(env.root.join("a/x.mp4"), env.root.join("b/x.mp4")).unwrap();

    let report = scan(&s);
    assert_eq!(report.stats.files_renamed, 1);
    assert_eq!(report.stats.files_new, 0);
    assert_eq!(report.stats.folders_new, 1, "only the new b/ folder is created");

    assert!(env.file(&env.abs("a/x.mp4")).is_none(), "old path row is gone");
    let moved = env.file(&env.abs("b/x.mp4")).expect("repathed row");
    assert_eq!(moved.id, original.id);
    assert_eq!(moved.created_at, original.created_at);

    let b_folder = env.folder(&env.abs("b")).expect("new folder row");
    assert_eq!(moved.parent_folder_id, b_folder.id.unwrap());

    let last = handler.events().pop().unwrap();
    assert_eq!(last, (env.abs("b/x.mp4"), Some(env.abs("a/x.mp4"))));
}

#[test]
fn s4_content_change_replaces_fingerprints_and_drops_stale_md5() {
    let env = TestEnv::new();
    env.write_file("a/x.mp4", &[1u8; 100]);
    env.set_mtime("a/x.mp4", 1_700_000_000);

    let calculator = StubCalculator::new();
    calculator.set_md5(true);
    let handler = RecordingHandler::new();
    let s = scanner(
        &env,
        default_options(&env),
        pipeline_with(calculator.clone(), &handler),
    );
    scan(&s);

    let before = env.file(&env.abs("a/x.mp4")).unwrap();
    assert!(before.fingerprints.get(&FingerprintKind::Md5).is_some());

    // New contents, no fresh MD5 computed this time.
    calculator.set_md5(false);
    env.write_file("a/x.mp4", &[2u8; 101]);
    env.set_mtime("a/x.mp4", 1_700_000_100);

    let report = scan(&s);
    assert_eq!(report.stats.files_updated, 1);

    let after = env.file(&env.abs("a/x.mp4")).unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(after.size, 101);
    assert_eq!(after.mod_time.timestamp(), 1_700_000_100);
    assert_eq!(
        after.fingerprints.get(&FingerprintKind::Oshash),
        Some(digest(&[2u8; 101]).as_str())
    );
    assert_eq!(
        after.fingerprints.get(&FingerprintKind::Md5),
        None,
        "stale checksum must be dropped"
    );

    let last = handler.events().pop().unwrap();
    assert_eq!(last, (env.abs("a/x.mp4"), Some(env.abs("a/x.mp4"))));
}

// ============================================================================
// Archives
// ============================================================================

fn write_zip(env: &TestEnv, rel: &str, members: &[(&str, &[u8])]) {
    let path = env.root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let file = fs::File::create(&path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    for (name, data) in members {
        writer
            .start_file(name.to_string(), zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap();
}

#[test]
fn s5_zip_containment_and_zip_rename() {
    let env = TestEnv::new();
    write_zip(&env, "pack.zip", &[("inside/y.jpg", b"jpegdata")]);

    let calculator = StubCalculator::new();
    let handler = RecordingHandler::new();
    let s = scanner(&env, default_options(&env), pipeline_with(calculator, &handler));
    let report = scan(&s);
    assert_eq!(
        report.stats.folders_new, 3,
        "root, archive root and inner folder are created"
    );

    let pack = env.file(&env.abs("pack.zip")).expect("archive file row");
    let pack_id = pack.id.unwrap();

    let pack_folder = env.folder(&env.abs("pack.zip")).expect("archive root folder");
    assert_eq!(pack_folder.zip_file_id, Some(pack_id));

    let inside = env.folder(&env.abs("pack.zip/inside")).expect("inner folder");
    assert_eq!(inside.zip_file_id, Some(pack_id));
    assert_eq!(inside.parent_folder_id, pack_folder.id);

    let inner = env.file(&env.abs("pack.zip/inside/y.jpg")).expect("inner file");
    assert_eq!(inner.zip_file_id, Some(pack_id));
    assert_eq!(inner.parent_folder_id, inside.id.unwrap());
    assert_eq!(
        inner.fingerprints.get(&FingerprintKind::Oshash),
        Some(digest(b"jpegdata").as_str())
    );

    // Renaming the archive repaths the whole contained hierarchy while every
    // id and zip_file_id stays put.
    fs::rename(env.root.join("pack.zip"), env.root.join("archive.zip")).unwrap();
    let report = scan(&s);
    assert_eq!(report.stats.files_renamed, 1);

    let renamed = env.file(&env.abs("archive.zip")).expect("renamed archive");
    assert_eq!(renamed.id, Some(pack_id));
    assert!(env.file(&env.abs("pack.zip")).is_none());

    let moved_folder = env.folder(&env.abs("archive.zip")).expect("moved root folder");
    assert_eq!(moved_folder.id, pack_folder.id);
    assert_eq!(moved_folder.zip_file_id, Some(pack_id));

    let moved_inside = env.folder(&env.abs("archive.zip/inside")).expect("moved inner");
    assert_eq!(moved_inside.id, inside.id);

    let moved_inner = env
        .file(&env.abs("archive.zip/inside/y.jpg"))
        .expect("moved inner file");
    assert_eq!(moved_inner.id, inner.id);
    assert_eq!(moved_inner.zip_file_id, Some(pack_id));
    assert!(env.file(&env.abs("pack.zip/inside/y.jpg")).is_none());

    // A further unchanged scan leaves the archive contents alone.
    let report = scan(&s);
    assert_eq!(report.stats.files_unchanged, 1);
    assert!(env.file(&env.abs("archive.zip/inside/y.jpg")).is_some());
}

#[test]
fn fingerprint_match_across_archive_scope_is_not_a_rename() {
    let env = TestEnv::new();
    env.write_file("y.jpg", b"same payload");

    let calculator = StubCalculator::new();
    let handler = RecordingHandler::new();
    let s = scanner(&env, default_options(&env), pipeline_with(calculator, &handler));
    scan(&s);
    let loose = env.file(&env.abs("y.jpg")).unwrap();

    fs::remove_file(env.root.join("y.jpg")).unwrap();
    write_zip(&env, "pack.zip", &[("y.jpg", b"same payload")]);

    scan(&s);

    let contained = env.file(&env.abs("pack.zip/y.jpg")).expect("archived copy");
    assert_ne!(
        contained.id, loose.id,
        "rename detection must not cross the archive boundary"
    );
    // The stale loose row is left for the cleaner.
    assert!(env.file(&env.abs("y.jpg")).is_some());
}

// ============================================================================
// Folder moves
// ============================================================================

#[test]
fn folder_move_repairs_descendants() {
    let env = TestEnv::new();
    env.write_file("one/sub/deep/x.mp4", b"folder move payload");

    let calculator = StubCalculator::new();
    let handler = RecordingHandler::new();
    let s = scanner(&env, default_options(&env), pipeline_with(calculator, &handler));
    scan(&s);

    let sub = env.folder(&env.abs("one/sub")).unwrap();
    let deep = env.folder(&env.abs("one/sub/deep")).unwrap();
    let file = env.file(&env.abs("one/sub/deep/x.mp4")).unwrap();

    fs::create_dir_all(env.root.join("two")).unwrap();
    fs::rename(env.root.join("one/sub"), env.root.join("two/sub")).unwrap();

    let report = scan(&s);
    assert_eq!(
        report.stats.folders_new, 2,
        "two/ is created and the moved sub/ reports new"
    );

    let moved_sub = env.folder(&env.abs("two/sub")).expect("moved folder");
    assert_eq!(moved_sub.id, sub.id);
    assert!(env.folder(&env.abs("one/sub")).is_none());

    let moved_deep = env.folder(&env.abs("two/sub/deep")).expect("repaired child");
    assert_eq!(moved_deep.id, deep.id);

    let moved_file = env.file(&env.abs("two/sub/deep/x.mp4")).expect("moved file");
    assert_eq!(moved_file.id, file.id);
    assert!(env.file(&env.abs("one/sub/deep/x.mp4")).is_none());
}

// ============================================================================
// Filters
// ============================================================================

#[test]
fn library_path_change_is_treated_as_move() {
    let env = TestEnv::new();
    env.write_file("a/x.mp4", b"library payload");

    let calculator = StubCalculator::new();
    let handler = RecordingHandler::new();

    let mut pipeline = pipeline_with(calculator.clone(), &handler);
    pipeline
        .scan_filters
        .push(Box::new(PathPrefixFilter::new([env.abs("a")])));
    let s = scanner(&env, default_options(&env), pipeline);
    scan(&s);
    let original = env.file(&env.abs("a/x.mp4")).unwrap();

    // The library moves from a/ to b/; the old copy stays on disk but is no
    // longer inside any configured library path.
    env.write_file("b/x.mp4", b"library payload");

    let mut pipeline = pipeline_with(calculator, &handler);
    pipeline
        .scan_filters
        .push(Box::new(PathPrefixFilter::new([env.abs("b")])));
    let s = scanner(&env, default_options(&env), pipeline);
    let report = scan(&s);

    assert_eq!(report.stats.files_renamed, 1);
    let moved = env.file(&env.abs("b/x.mp4")).expect("repathed row");
    assert_eq!(moved.id, original.id);
    assert!(env.file(&env.abs("a/x.mp4")).is_none());
}

struct AcceptAllFiles;

impl FileFilter for AcceptAllFiles {
    fn accept(&self, _file: &phloem_catalog::CatalogFile) -> bool {
        true
    }
}

struct RejectAllFiles;

impl FileFilter for RejectAllFiles {
    fn accept(&self, _file: &phloem_catalog::CatalogFile) -> bool {
        false
    }
}

#[test]
fn handler_required_filters_gate_unchanged_files() {
    let env = TestEnv::new();
    env.write_file("a/x.mp4", b"gate payload");

    let calculator = StubCalculator::new();
    let handler = RecordingHandler::new();
    let s = scanner(
        &env,
        default_options(&env),
        pipeline_with(calculator.clone(), &handler),
    );
    scan(&s);
    assert_eq!(handler.events().len(), 1);

    // A rejecting filter leaves the unchanged file alone.
    let mut pipeline = pipeline_with(calculator.clone(), &handler);
    pipeline.handler_required_filters.push(Box::new(RejectAllFiles));
    let s = scanner(&env, default_options(&env), pipeline);
    let report = scan(&s);
    assert_eq!(report.stats.files_unchanged, 1);
    assert_eq!(handler.events().len(), 1);

    // An accepting filter forces the handler chain for the unchanged file.
    let mut pipeline = pipeline_with(calculator, &handler);
    pipeline.handler_required_filters.push(Box::new(AcceptAllFiles));
    let s = scanner(&env, default_options(&env), pipeline);
    let report = scan(&s);
    assert_eq!(report.stats.files_updated, 1);

    let last = handler.events().pop().unwrap();
    assert_eq!(last, (env.abs("a/x.mp4"), None));
}

// ============================================================================
// Decorators
// ============================================================================

struct JpegProbe;

impl Decorator for JpegProbe {
    fn decorate(
        &self,
        _vfs: &dyn Vfs,
        mut file: phloem_catalog::CatalogFile,
    ) -> phloem_scan::Result<phloem_catalog::CatalogFile> {
        file.media = Some(MediaInfo::Image(ImageInfo {
            format: "jpeg".to_string(),
            width: 1920,
            height: 1080,
        }));
        Ok(file)
    }

    fn is_missing_metadata(&self, _vfs: &dyn Vfs, file: &phloem_catalog::CatalogFile) -> bool {
        file.media.is_none()
    }
}

#[test]
fn missing_metadata_is_repaired_in_place() {
    let env = TestEnv::new();
    env.write_file("a/y.jpg", b"image payload");

    let calculator = StubCalculator::new();
    let handler = RecordingHandler::new();

    // First scan predates the decorator, leaving the row without metadata.
    let s = scanner(
        &env,
        default_options(&env),
        pipeline_with(calculator.clone(), &handler),
    );
    scan(&s);
    assert!(env.file(&env.abs("a/y.jpg")).unwrap().media.is_none());

    let mut pipeline = pipeline_with(calculator.clone(), &handler);
    pipeline.decorators.push(Box::new(JpegProbe));
    let s = scanner(&env, default_options(&env), pipeline);
    let report = scan(&s);
    assert_eq!(report.stats.files_updated, 1);

    let repaired = env.file(&env.abs("a/y.jpg")).unwrap();
    assert_eq!(
        repaired.media,
        Some(MediaInfo::Image(ImageInfo {
            format: "jpeg".to_string(),
            width: 1920,
            height: 1080,
        }))
    );

    // With metadata in place the next scan is quiet again.
    let mut pipeline = pipeline_with(calculator, &handler);
    pipeline.decorators.push(Box::new(JpegProbe));
    let s = scanner(&env, default_options(&env), pipeline);
    let report = scan(&s);
    assert_eq!(report.stats.files_unchanged, 1);
    assert_eq!(report.stats.files_updated, 0);
}

struct FailOnBad;

impl Decorator for FailOnBad {
    fn decorate(
        &self,
        _vfs: &dyn Vfs,
        file: phloem_catalog::CatalogFile,
    ) -> phloem_scan::Result<phloem_catalog::CatalogFile> {
        if file.basename.ends_with(".bad") {
            return Err(ScanError::external(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "unreadable container",
            )));
        }
        Ok(file)
    }

    fn is_missing_metadata(&self, _vfs: &dyn Vfs, _file: &phloem_catalog::CatalogFile) -> bool {
        false
    }
}

#[test]
fn decorator_failure_skips_only_that_file() {
    let env = TestEnv::new();
    env.write_file("a/good.mp4", b"good payload");
    env.write_file("a/oops.bad", b"bad payload");

    let calculator = StubCalculator::new();
    let handler = RecordingHandler::new();
    let mut pipeline = pipeline_with(calculator, &handler);
    pipeline.decorators.push(Box::new(FailOnBad));
    let s = scanner(&env, default_options(&env), pipeline);

    let report = scan(&s);
    assert_eq!(report.stats.files_new, 1);
    assert_eq!(report.stats.errors, 1);
    assert!(report.errors.iter().any(|(path, _)| path == &env.abs("a/oops.bad")));

    assert!(env.file(&env.abs("a/good.mp4")).is_some());
    assert!(
        env.file(&env.abs("a/oops.bad")).is_none(),
        "no partial state may be persisted"
    );
}

// ============================================================================
// Concurrency, cancellation, symlinks
// ============================================================================

#[test]
fn cancelled_scan_processes_nothing() {
    let env = TestEnv::new();
    env.write_file("a/x.mp4", b"cancel payload");

    let calculator = StubCalculator::new();
    let handler = RecordingHandler::new();
    let s = scanner(&env, default_options(&env), pipeline_with(calculator, &handler));

    let token = CancelToken::new();
    token.cancel();
    let report = s.scan(&token).unwrap();

    assert_eq!(report.stats.files_discovered, 0);
    assert!(env.file(&env.abs("a/x.mp4")).is_none());
}

#[cfg(unix)]
#[test]
fn symlink_size_is_target_size() {
    let env = TestEnv::new();
    let target = env.temp.path().join("target.bin");
    fs::write(&target, vec![0u8; 4096]).unwrap();
    std::os::unix::fs::symlink(&target, env.root.join("link.mp4")).unwrap();

    let calculator = StubCalculator::new();
    let handler = RecordingHandler::new();
    let s = scanner(&env, default_options(&env), pipeline_with(calculator, &handler));
    scan(&s);

    let file = env.file(&env.abs("link.mp4")).expect("symlink row");
    assert_eq!(file.size, 4096);
}

#[test]
fn parallel_scan_is_idempotent() {
    let env = TestEnv::new();
    for dir in 0..3 {
        for i in 0..10 {
            env.write_file(
                &format!("d{dir}/f{i}.mp4"),
                format!("payload {dir}/{i}").as_bytes(),
            );
        }
    }

    let calculator = StubCalculator::new();
    let handler = RecordingHandler::new();
    let mut options = default_options(&env);
    options.parallelism = 4;
    let s = scanner(&env, options, pipeline_with(calculator, &handler));

    let first = scan(&s);
    assert_eq!(first.stats.files_new, 30);
    assert_eq!(first.stats.errors, 0);
    assert_eq!(handler.events().len(), 30);

    let second = scan(&s);
    assert_eq!(second.stats.files_new, 0);
    assert_eq!(second.stats.files_renamed, 0);
    assert_eq!(second.stats.files_updated, 0);
    assert_eq!(second.stats.files_unchanged, 30);
    assert_eq!(handler.events().len(), 30);
}

#[test]
fn forced_rescan_reprocesses_unchanged_files() {
    let env = TestEnv::new();
    env.write_file("a/x.mp4", b"rescan payload");

    let calculator = StubCalculator::new();
    let handler = RecordingHandler::new();
    let s = scanner(
        &env,
        default_options(&env),
        pipeline_with(calculator.clone(), &handler),
    );
    scan(&s);
    let before = env.file(&env.abs("a/x.mp4")).unwrap();

    let mut options = default_options(&env);
    options.rescan = true;
    let s = scanner(&env, options, pipeline_with(calculator, &handler));
    let report = scan(&s);

    assert_eq!(report.stats.files_updated, 1);
    let after = env.file(&env.abs("a/x.mp4")).unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(handler.events().len(), 2);
}

#[test]
fn parent_integrity_holds_after_scans() {
    let env = TestEnv::new();
    env.write_file("a/b/c/x.mp4", b"integrity 1");
    env.write_file("a/b/y.mp4", b"integrity 2");
    env.write_file("z.mp4", b"integrity 3");

    let calculator = StubCalculator::new();
    let handler = RecordingHandler::new();
    let s = scanner(&env, default_options(&env), pipeline_with(calculator, &handler));
    scan(&s);

    for rel in ["a/b/c/x.mp4", "a/b/y.mp4", "z.mp4"] {
        let file = env.file(&env.abs(rel)).expect("file row");
        let parent = env
            .catalog
            .with_read_txn::<_, CatalogError, _>(|ctx| {
                ctx.folders().find_by_id(file.parent_folder_id)
            })
            .unwrap()
            .expect("parent row exists");
        assert_eq!(
            phloem_vfs::path::parent(&file.path).unwrap(),
            parent.path,
            "file path must sit directly under its parent folder"
        );
        assert_eq!(parent.zip_file_id, file.zip_file_id);
    }
}
