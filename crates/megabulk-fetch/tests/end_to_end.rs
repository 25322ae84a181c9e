mod common;

use std::path::PathBuf;
use std::sync::Arc;

use common::*;
use megabulk_crypto::verify_file;
use megabulk_fetch::{Error, Scheduler, TaskStatus, Tier};
use tempfile::tempdir;

#[tokio::test]
async fn test_single_file_downloads_and_verifies() {
    let dir = tempdir().unwrap();
    let file = shared_file("FILE1", ROOT, "movie.bin", content(200_000, 1));
    let world = World::new(root_folder("Share"), std::slice::from_ref(&file));
    let source = StaticSource::new(proxies(3));

    let scheduler = Scheduler::prepare(
        &credential(),
        dir.path(),
        MockConnector(world.clone()),
        source.clone(),
        options(),
    )
    .await
    .unwrap();
    assert_eq!(scheduler.tasks().len(), 1);
    assert_eq!(scheduler.status(0), TaskStatus::Waiting);

    let report = scheduler.run().await.unwrap();
    assert_eq!(report.downloaded, 1);
    assert!(report.is_success());
    assert_eq!(scheduler.status(0), TaskStatus::Downloaded);

    let task = &scheduler.tasks()[0];
    assert_eq!(task.relative_path(), PathBuf::from("Share/movie.bin"));
    let layout = task.layout();
    assert_eq!(std::fs::read(layout.final_path()).unwrap(), file.plaintext);
    assert!(!layout.part_path().exists());
    assert!(!layout.verifying_marker().exists());
    assert!(layout.downloaded_marker().exists());

    let verified = verify_file(
        &layout.final_path(),
        &file.params.key,
        &file.params.nonce,
        &file.params.tag,
        |_| {},
    )
    .unwrap();
    assert_eq!(verified, 200_000);

    let streams = world.streams();
    assert_eq!(streams.len(), 1);
    assert_eq!((streams[0].start, streams[0].end), (0, 199_999));
    assert!(streams[0].proxy.is_some());

    let snapshot = scheduler.snapshot();
    assert_eq!(snapshot.downloaded, 1);
    assert_eq!(snapshot.bytes_downloaded, 200_000);
    assert_eq!(snapshot.bytes_verified, 200_000);
    assert_eq!(snapshot.proxies.total(), 3);
}

#[tokio::test]
async fn test_second_run_skips_finished_files() {
    let dir = tempdir().unwrap();
    let file = shared_file("FILE1", ROOT, "a.bin", content(50_000, 2));
    let world = World::new(root_folder("Share"), std::slice::from_ref(&file));

    let first = Scheduler::prepare(
        &credential(),
        dir.path(),
        MockConnector(world.clone()),
        StaticSource::new(proxies(2)),
        options(),
    )
    .await
    .unwrap();
    first.run().await.unwrap();

    let second = Scheduler::prepare(
        &credential(),
        dir.path(),
        MockConnector(world.clone()),
        StaticSource::new(proxies(2)),
        options(),
    )
    .await
    .unwrap();
    assert_eq!(second.status(0), TaskStatus::AlreadyDownloaded);

    let report = second.run().await.unwrap();
    assert_eq!(report.already_downloaded, 1);
    assert_eq!(world.streams().len(), 1);
}

#[tokio::test]
async fn test_many_files_under_transfer_cap() {
    let dir = tempdir().unwrap();
    let files: Vec<_> = (0..8)
        .map(|i| shared_file(&format!("F{i}"), ROOT, &format!("part{i}.bin"), content(30_000 + i * 1_000, i as u8)))
        .collect();
    let world = World::new(root_folder("Share"), &files);

    let scheduler = Scheduler::prepare(
        &credential(),
        dir.path(),
        MockConnector(world.clone()),
        StaticSource::new(proxies(5)),
        options().max_transferring(2),
    )
    .await
    .unwrap();
    let report = scheduler.run().await.unwrap();
    assert_eq!(report.downloaded, 8);

    for (task, file) in scheduler.tasks().iter().zip(&files) {
        assert_eq!(std::fs::read(task.layout().final_path()).unwrap(), file.plaintext);
    }
}

#[tokio::test]
async fn test_zero_size_file() {
    let dir = tempdir().unwrap();
    let file = shared_file("EMPTY", ROOT, "empty.txt", Vec::new());
    let world = World::new(root_folder("Share"), std::slice::from_ref(&file));

    let scheduler = Scheduler::prepare(
        &credential(),
        dir.path(),
        MockConnector(world.clone()),
        StaticSource::new(proxies(1)),
        options(),
    )
    .await
    .unwrap();
    assert_eq!(scheduler.status(0), TaskStatus::Verifying);

    let report = scheduler.run().await.unwrap();
    assert_eq!(report.downloaded, 1);
    assert!(world.streams().is_empty());
    assert_eq!(std::fs::metadata(scheduler.tasks()[0].layout().final_path()).unwrap().len(), 0);
}

#[tokio::test]
async fn test_corrupted_storage_fails_after_retries() {
    let dir = tempdir().unwrap();
    let mut file = shared_file("BAD", ROOT, "bad.bin", content(20_000, 3));
    file.ciphertext[100] ^= 0xff;
    let world = World::new(root_folder("Share"), std::slice::from_ref(&file));

    let scheduler = Scheduler::prepare(
        &credential(),
        dir.path(),
        MockConnector(world.clone()),
        StaticSource::new(proxies(2)),
        options().max_integrity_failures(2),
    )
    .await
    .unwrap();
    let report = scheduler.run().await.unwrap();

    assert_eq!(report.downloaded, 0);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].path, PathBuf::from("Share/bad.bin"));
    assert!(report.failed[0].reason.contains("integrity"));
    assert_eq!(world.streams().len(), 3);

    let layout = scheduler.tasks()[0].layout();
    assert!(!layout.final_path().exists());
    assert!(!layout.verifying_marker().exists());
}

#[tokio::test]
async fn test_rate_limited_proxy_is_cooled_down() {
    let dir = tempdir().unwrap();
    let file = shared_file("FILE1", ROOT, "a.bin", content(10_000, 4));
    let world = World::new(root_folder("Share"), std::slice::from_ref(&file));
    let pool_proxies = proxies(2);
    world.throttled.lock().unwrap().push(pool_proxies[0].to_string());

    let scheduler = Scheduler::prepare(
        &credential(),
        dir.path(),
        MockConnector(world.clone()),
        StaticSource::new(pool_proxies.clone()),
        options().workers(1).max_probing(1),
    )
    .await
    .unwrap();
    let report = scheduler.run().await.unwrap();
    assert_eq!(report.downloaded, 1);

    assert_eq!(world.streams()[0].proxy.as_deref(), Some(pool_proxies[1].to_string().as_str()));
    assert_eq!(scheduler.pool().tier_of(&pool_proxies[1]), Some(Tier::Working));
    assert_ne!(scheduler.pool().tier_of(&pool_proxies[0]), Some(Tier::Working));
}

#[tokio::test]
async fn test_refused_item_fails_without_blaming_the_proxy() {
    let dir = tempdir().unwrap();
    let files = [
        shared_file("KEPT", ROOT, "kept.bin", content(10_000, 6)),
        shared_file("GONE", ROOT, "gone.bin", content(10_000, 7)),
    ];
    let mut world = World::new(root_folder("Share"), &files);
    // listed, but the provider answers "not found" for its download url
    Arc::get_mut(&mut world).unwrap().ciphertext.remove("GONE");
    let pool_proxies = proxies(1);

    let scheduler = Scheduler::prepare(
        &credential(),
        dir.path(),
        MockConnector(world.clone()),
        StaticSource::new(pool_proxies.clone()),
        options().workers(1).max_probing(1),
    )
    .await
    .unwrap();
    let report = scheduler.run().await.unwrap();

    assert_eq!(report.downloaded, 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].path, PathBuf::from("Share/gone.bin"));
    assert!(report.failed[0].reason.contains("-9"), "{}", report.failed[0].reason);
    assert_eq!(scheduler.pool().tier_of(&pool_proxies[0]), Some(Tier::Working));
    assert_eq!(std::fs::read(dir.path().join("Share/kept.bin")).unwrap(), files[0].plaintext);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_proxy_sources_abort_the_run() {
    let dir = tempdir().unwrap();
    let file = shared_file("FILE1", ROOT, "a.bin", content(10_000, 5));
    let world = World::new(root_folder("Share"), std::slice::from_ref(&file));
    let source = StaticSource::new(Vec::new());

    let scheduler = Scheduler::prepare(
        &credential(),
        dir.path(),
        MockConnector(world.clone()),
        source.clone(),
        options().max_refill_attempts(3),
    )
    .await
    .unwrap();

    let result = scheduler.run().await;
    assert!(matches!(result, Err(Error::ProxyExhaustion { attempts: 3 })), "{result:?}");
    assert_eq!(scheduler.status(0), TaskStatus::Waiting);
    assert!(world.streams().is_empty());
}
