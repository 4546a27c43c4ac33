//! Priming over the daemon: the priming cursor lives server side

#![cfg(all(unix, feature = "daemon"))]

use searchprime::search::FileSearchProvider;
use searchprime::server::{IndexServer, RemoteBackend};
use searchprime::service::memory::MemoryItem;
use searchprime::service::{CachePolicy, MemoryIndex, ServiceRegistry};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    index: Arc<MemoryIndex>,
    backend: Arc<RemoteBackend>,
    server: Option<thread::JoinHandle<()>>,
}

impl Harness {
    fn start() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let socket = dir.path().join("searchprime.sock");

        let index = MemoryIndex::new(
            vec![
                MemoryItem::file("/home/u/docs/report.txt").with_contents("annual report"),
                MemoryItem::file("/home/u/docs/plan.txt").with_contents("project plan"),
                MemoryItem::file("/home/u/music/song.mp3"),
            ],
            &["/home/u/docs"],
        );

        let server = IndexServer::with_socket(index.clone(), &socket);
        let listener = server.bind().expect("bind");
        let handle = thread::spawn(move || server.serve(listener).expect("serve"));

        Self {
            _dir: dir,
            index,
            backend: RemoteBackend::new(socket),
            server: Some(handle),
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = self.backend.shutdown();
        if let Some(handle) = self.server.take() {
            let _ = handle.join();
        }
    }
}

#[test]
fn test_remote_prime_and_search() {
    let harness = Harness::start();
    harness.backend.ping().unwrap();

    let registry = ServiceRegistry::new(harness.backend.clone(), CachePolicy::cached());
    let mut provider = FileSearchProvider::from_registry(&registry, 1).unwrap();

    provider.prepare(&["/home/u/docs"], &[]).unwrap();
    let results = provider.search("report").unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].url, "file:/home/u/docs/report.txt");

    assert_eq!(provider.count_all().unwrap(), 3);

    let stats = harness.index.stats();
    assert_eq!(stats.reused_plans, 1);
    assert_eq!(stats.outstanding_rows, 0);
}

#[test]
fn test_remote_crawl_scope() {
    let harness = Harness::start();
    let registry = ServiceRegistry::new(harness.backend.clone(), CachePolicy::cached());

    assert!(registry.is_path_included_in_index("/home/u/docs/plan.txt").unwrap());
    assert!(!registry.is_path_included_in_index("/home/u/music").unwrap());
}

#[test]
fn test_dropping_provider_closes_server_cursor() {
    let harness = Harness::start();
    {
        let mut provider =
            FileSearchProvider::new(searchprime::query::QueryExecutor::new(harness.backend.clone()));
        provider.prepare(&["/home/u"], &[]).unwrap();
        assert_eq!(harness.backend.status().unwrap().open_cursors, 1);
    }

    // the close request completes before the socket is dropped
    assert_eq!(harness.backend.status().unwrap().open_cursors, 0);
    assert_eq!(harness.backend.status().unwrap().items, 3);
}

#[test]
fn test_server_error_surfaces_as_execution_failure() {
    let harness = Harness::start();
    let mut provider =
        FileSearchProvider::new(searchprime::query::QueryExecutor::new(harness.backend.clone()));

    let err = provider.prepare(&["/home/it's"], &[]).unwrap_err();
    assert!(matches!(err, searchprime::SearchError::QueryExecutionFailed { .. }));
    assert!(!provider.is_prepared());
}
