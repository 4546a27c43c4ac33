//! End-to-end priming and search against a crawled directory tree

use searchprime::query::{QueryExecutor, RowEnumerator};
use searchprime::search::{FileSearchProvider, SearchOptions};
use searchprime::service::{CachePolicy, MemoryIndex, ServiceRegistry};
use searchprime::SearchError;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// docs/ and desk/ with a scratch folder under docs/ that gets excluded
fn create_tree() -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let root = dir.path();

    let files = [
        ("docs/report-2024.txt", "quarterly report for the board"),
        ("docs/budget.csv", "line,amount\nrent,1200"),
        ("docs/tmp/report-draft.txt", "unfinished report"),
        ("desk/notes.md", "remember the report deadline"),
        ("desk/todo.txt", "buy milk"),
        ("other/report.txt", "out of scope report"),
    ];
    for (path, contents) in files {
        let full = root.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, contents).unwrap();
    }

    dir
}

fn scope(root: &Path, sub: &str) -> String {
    root.join(sub).to_string_lossy().into_owned()
}

fn crawl(root: &Path) -> Arc<MemoryIndex> {
    let mut seen = 0;
    let index = MemoryIndex::crawl(&[root], |_| seen += 1).expect("crawl");
    assert_eq!(seen, 6);
    index
}

#[test]
fn test_prepare_then_search_respects_scope() {
    let dir = create_tree();
    let index = crawl(dir.path());
    let mut provider = FileSearchProvider::new(QueryExecutor::new(index.clone()));

    provider
        .prepare(
            &[scope(dir.path(), "docs"), scope(dir.path(), "desk")],
            &[scope(dir.path(), "docs/tmp")],
        )
        .unwrap();

    let mut names: Vec<String> = provider
        .search("report")
        .unwrap()
        .into_iter()
        .filter_map(|r| r.path().map(|p| p.rsplit('/').next().unwrap_or(p).to_string()))
        .collect();
    names.sort();

    assert_eq!(names, vec!["notes.md", "report-2024.txt"]);
    assert_eq!(index.stats().reused_plans, 1);
    assert_eq!(index.stats().outstanding_rows, 0);
}

#[test]
fn test_reprime_switches_scope() {
    let dir = create_tree();
    let index = crawl(dir.path());
    let mut provider = FileSearchProvider::new(QueryExecutor::new(index.clone()));

    provider.prepare(&[scope(dir.path(), "desk")], &[]).unwrap();
    assert_eq!(provider.search("milk").unwrap().len(), 1);

    provider.prepare(&[scope(dir.path(), "docs")], &[]).unwrap();
    assert!(provider.search("milk").unwrap().is_empty());
    assert_eq!(index.stats().open_cursors, 1);
}

#[test]
fn test_unbounded_scope_and_count() {
    let dir = create_tree();
    let index = crawl(dir.path());
    let mut provider = FileSearchProvider::with_enumerator(QueryExecutor::new(index), RowEnumerator::new(2));

    provider.prepare::<String>(&[], &[]).unwrap();
    assert_eq!(provider.search("report").unwrap().len(), 4);
    assert_eq!(
        provider
            .search_with_options("report", &SearchOptions::limit(2))
            .unwrap()
            .len(),
        2
    );
    assert_eq!(provider.count_all().unwrap(), 6);
}

#[test]
fn test_registry_backed_provider() {
    let dir = create_tree();
    let index = MemoryIndex::crawl(&[dir.path().join("docs")], |_| {}).unwrap();
    let registry = ServiceRegistry::new(index, CachePolicy::cached());

    assert!(registry
        .is_path_included_in_index(&scope(dir.path(), "docs/budget.csv"))
        .unwrap());
    assert!(!registry
        .is_path_included_in_index(&scope(dir.path(), "desk"))
        .unwrap());

    let mut provider = FileSearchProvider::from_registry(&registry, 0).unwrap();
    assert!(matches!(provider.search("x"), Err(SearchError::NotPrimed)));
    provider.prepare(&[scope(dir.path(), "docs")], &[]).unwrap();
    assert!(provider.is_prepared());
    assert_eq!(provider.search("rent").unwrap().len(), 1);
}

#[test]
fn test_reuse_unsupported_fails_search_not_prepare() {
    let dir = create_tree();
    let index = crawl(dir.path());
    index.set_reuse_supported(false);
    let mut provider = FileSearchProvider::new(QueryExecutor::new(index));

    provider.prepare(&[scope(dir.path(), "docs")], &[]).unwrap();
    assert!(matches!(
        provider.search("report"),
        Err(SearchError::ReuseTokenUnavailable(_))
    ));
}
