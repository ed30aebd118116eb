//! Workspace sandbox integration tests: path safety, limits, ordering,
//! and the read/write/delete round-trips.

mod common;

use common::TestEnv;
use fileward::workspace::{FsLimits, WriteMode};
use fileward::WorkspaceError;

#[test]
fn write_then_read_round_trips() {
    let env = TestEnv::new();
    env.ws
        .write_file("notes.txt", "hello world", WriteMode::Overwrite)
        .expect("write");
    let content = env.ws.read_file("notes.txt").expect("read");
    assert_eq!(content, "hello world");
}

#[test]
fn overwrite_is_idempotent() {
    let env = TestEnv::new();
    env.ws
        .write_file("x.txt", "same", WriteMode::Overwrite)
        .expect("first write");
    env.ws
        .write_file("x.txt", "same", WriteMode::Overwrite)
        .expect("second write");
    assert_eq!(env.ws.read_file("x.txt").expect("read"), "same");
}

#[test]
fn append_concatenates() {
    let env = TestEnv::new();
    env.ws
        .write_file("log.txt", "one", WriteMode::Overwrite)
        .expect("write");
    env.ws
        .write_file("log.txt", "two", WriteMode::Append)
        .expect("append");
    assert_eq!(env.ws.read_file("log.txt").expect("read"), "onetwo");
}

#[test]
fn delete_removes_file() {
    let env = TestEnv::new();
    env.ws
        .write_file("gone.txt", "x", WriteMode::Overwrite)
        .expect("write");
    assert!(env.ws.exists("gone.txt").expect("exists"));
    env.ws.delete_file("gone.txt").expect("delete");
    assert!(!env.ws.exists("gone.txt").expect("exists"));
    assert!(matches!(
        env.ws.read_file("gone.txt"),
        Err(WorkspaceError::FileNotFound { .. })
    ));
}

#[test]
fn listings_are_newest_first() {
    let env = TestEnv::new();
    env.write_file("oldest.txt", "1");
    env.write_file("middle.txt", "2");
    env.write_file("newest.txt", "3");

    let files = env.ws.list_files().expect("list");
    assert_eq!(files, vec!["newest.txt", "middle.txt", "oldest.txt"]);
}

#[test]
fn list_all_is_superset_of_files_and_directories() {
    let env = TestEnv::new();
    env.write_file("a.txt", "a");
    env.mkdir("dir1");
    env.mkdir("dir2");
    env.write_file("b.py", "b");

    let files = env.ws.list_files().expect("files");
    let dirs = env.ws.list_directories().expect("dirs");
    let all = env.ws.list_all().expect("all");

    for f in &files {
        assert!(all.contains(f), "list_all missing file {f}");
    }
    for d in &dirs {
        assert!(all.contains(&format!("{d}/")), "list_all missing dir {d}/");
    }
    assert_eq!(all.len(), files.len() + dirs.len());
}

#[test]
fn hidden_entries_are_skipped_in_listings() {
    let env = TestEnv::new();
    env.write_file("visible.txt", "v");
    env.write_file(".hidden", "h");
    env.mkdir(".git");

    let files = env.ws.list_files().expect("files");
    assert_eq!(files, vec!["visible.txt"]);
    assert!(env.ws.list_directories().expect("dirs").is_empty());
}

#[test]
fn recursive_listing_skips_excluded_directories() {
    let env = TestEnv::new();
    env.write_file("top.txt", "t");
    env.write_file("src/deep/inner.rs", "i");
    env.write_file(".secret/creds.txt", "c");
    env.write_file("__pycache__/mod.pyc", "p");

    let files = env.ws.list_files_recursive().expect("recursive");
    assert!(files.contains(&"top.txt".to_string()));
    assert!(files.iter().any(|f| f.ends_with("inner.rs")));
    assert!(!files.iter().any(|f| f.contains(".secret")));
    assert!(!files.iter().any(|f| f.contains("__pycache__")));
}

#[test]
fn tree_sorts_directories_before_files() {
    let env = TestEnv::new();
    env.write_file("zebra.txt", "z");
    env.mkdir("alpha");
    env.write_file("alpha/inner.txt", "i");
    env.mkdir("beta");

    let tree = env.ws.list_tree().expect("tree");
    let lines: Vec<&str> = tree.lines().collect();
    // Header, then alpha/ (with child), beta/, then zebra.txt last.
    assert!(lines[0].ends_with('/'));
    let alpha_pos = lines.iter().position(|l| l.contains("alpha/")).unwrap();
    let beta_pos = lines.iter().position(|l| l.contains("beta/")).unwrap();
    let zebra_pos = lines.iter().position(|l| l.contains("zebra.txt")).unwrap();
    assert!(alpha_pos < beta_pos);
    assert!(beta_pos < zebra_pos);
    assert!(tree.contains("└── ") || tree.contains("├── "));
}

#[test]
fn empty_workspace_tree_shows_placeholder() {
    let env = TestEnv::new();
    let tree = env.ws.list_tree().expect("tree");
    assert!(tree.contains("(empty)"));
}

// ─── Boundary behaviors ─────────────────────────────────────────────────────

#[test]
fn invalid_filenames_are_rejected() {
    let env = TestEnv::new();
    for bad in ["", "   ", "a/b.txt", "a\\b.txt", "c:drive", ".", ".."] {
        let result = env.ws.read_file(bad);
        assert!(
            matches!(result, Err(WorkspaceError::InvalidFilename { .. })),
            "expected InvalidFilename for {bad:?}, got {result:?}"
        );
    }
}

#[test]
fn read_size_cap_is_exact() {
    let env = TestEnv::with_limits(FsLimits {
        max_read: 8,
        max_write: 1024,
        rate_limit: 100,
    });
    env.write_file("exact.txt", "12345678");
    env.write_file("over.txt", "123456789");

    assert_eq!(env.ws.read_file("exact.txt").expect("at limit"), "12345678");
    let err = env.ws.read_file("over.txt").unwrap_err();
    assert!(matches!(err, WorkspaceError::SizeLimitExceeded { .. }));
    assert_eq!(err.code(), "SIZE_LIMIT_EXCEEDED");
}

#[test]
fn write_size_cap_is_exact() {
    let env = TestEnv::with_limits(FsLimits {
        max_read: 1024,
        max_write: 8,
        rate_limit: 100,
    });
    assert!(env
        .ws
        .write_file("ok.txt", "12345678", WriteMode::Overwrite)
        .is_ok());
    let err = env
        .ws
        .write_file("no.txt", "123456789", WriteMode::Overwrite)
        .unwrap_err();
    assert!(matches!(err, WorkspaceError::SizeLimitExceeded { .. }));
    // No partial write is visible on failure.
    assert!(!env.ws.exists("no.txt").expect("exists"));
}

#[test]
fn eleventh_operation_in_a_second_is_rate_limited() {
    let env = TestEnv::new(); // default rate_limit = 10
    for i in 0..10 {
        env.ws.list_files().unwrap_or_else(|e| panic!("op {i} failed: {e}"));
    }
    let err = env.ws.list_files().unwrap_err();
    assert!(matches!(err, WorkspaceError::RateLimit { .. }));
    assert!(err.to_string().to_lowercase().contains("rate limit"));
}

#[test]
fn traversal_via_relative_path_is_blocked() {
    let env = TestEnv::new();
    for attempt in ["../escape.txt", "a/../../escape.txt", "/etc/passwd"] {
        let result = env.ws.read_file_by_path(attempt);
        assert!(
            matches!(
                result,
                Err(WorkspaceError::PathTraversal { .. })
                    | Err(WorkspaceError::InvalidFilename { .. })
            ),
            "expected traversal rejection for {attempt:?}, got {result:?}"
        );
    }
}

#[test]
fn read_by_path_reaches_subdirectories() {
    let env = TestEnv::new();
    env.write_file("sub/inner.txt", "nested content");
    assert_eq!(
        env.ws.read_file_by_path("sub/inner.txt").expect("read"),
        "nested content"
    );
}

#[cfg(unix)]
#[test]
fn symlinks_are_denied() {
    let env = TestEnv::new();
    env.write_file("real.txt", "real");
    std::os::unix::fs::symlink(env.dir.path().join("real.txt"), env.dir.path().join("link.txt"))
        .expect("symlink");

    let err = env.ws.read_file("link.txt").unwrap_err();
    assert!(matches!(err, WorkspaceError::Symlink { .. }));
    assert_eq!(err.code(), "SYMLINK_DENIED");
}

#[cfg(unix)]
#[test]
fn symlinked_parent_directories_are_denied() {
    let env = TestEnv::new();
    env.write_file("realdir/file.txt", "x");
    std::os::unix::fs::symlink(env.dir.path().join("realdir"), env.dir.path().join("linkdir"))
        .expect("symlink dir");

    let err = env.ws.read_file_by_path("linkdir/file.txt").unwrap_err();
    assert!(matches!(err, WorkspaceError::Symlink { .. }));
}

// ─── Discovery helpers ──────────────────────────────────────────────────────

#[test]
fn find_largest_file_reports_name_and_size() {
    let env = TestEnv::new();
    env.write_file("small.txt", &"s".repeat(20));
    env.write_file("medium.txt", &"m".repeat(70));
    env.write_file("large.txt", &"l".repeat(250));

    let (name, size) = env
        .ws
        .find_largest_file()
        .expect("largest")
        .expect("some file");
    assert_eq!(name, "large.txt");
    assert_eq!(size, 250);
}

#[test]
fn read_newest_file_returns_latest_content() {
    let env = TestEnv::new();
    env.write_file("first.txt", "first");
    env.write_file("second.txt", "second");

    let (name, content) = env
        .ws
        .read_newest_file()
        .expect("newest")
        .expect("some file");
    assert_eq!(name, "second.txt");
    assert_eq!(content, "second");
}

#[test]
fn find_files_by_pattern_is_case_insensitive() {
    let env = TestEnv::new();
    env.write_file("Report_Q1.txt", "r");
    env.write_file("notes.md", "n");

    let matches = env.ws.find_files_by_pattern("report").expect("pattern");
    assert_eq!(matches, vec!["Report_Q1.txt"]);
    assert!(env
        .ws
        .find_files_by_pattern("zzz")
        .expect("pattern")
        .is_empty());
}

#[test]
fn find_file_by_name_searches_subdirectories() {
    let env = TestEnv::new();
    env.write_file("src/lib/target.txt", "t");
    let found = env
        .ws
        .find_file_by_name("target.txt")
        .expect("find")
        .expect("found");
    assert!(found.ends_with("target.txt"));
    assert!(found.contains("src"));
    assert!(env
        .ws
        .find_file_by_name("absent.txt")
        .expect("find")
        .is_none());
}

#[test]
fn file_info_reports_metadata() {
    let env = TestEnv::new();
    env.write_file("info.txt", "line one\nline two\n");
    let info = env.ws.file_info("info.txt").expect("info");
    assert_eq!(info.name, "info.txt");
    assert_eq!(info.size, 18);
    assert_eq!(info.lines, 2);
    assert!(info.preview.contains("line one"));
}

#[test]
fn sample_files_truncates_and_bounds() {
    let env = TestEnv::new();
    env.write_file("a.txt", &"a".repeat(100));
    env.write_file("b.txt", &"b".repeat(100));
    env.write_file("c.txt", &"c".repeat(100));

    let sample = env.ws.sample_files(2, 10).expect("sample");
    assert_eq!(sample.len(), 2);
    for (_, content) in &sample {
        assert_eq!(content.len(), 10);
    }
}
