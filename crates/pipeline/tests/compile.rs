//! End-to-end compiler tests over temporary content trees.

use std::path::Path;
use std::time::Duration;

use mdflow_pipeline::{ChangeKind, Compiler, Config, OutcomeStatus};

fn test_config(root: &Path) -> Config {
    Config {
        content_dir: root.join("content"),
        output_dir: root.join("content"),
        project_root: root.to_path_buf(),
        watch: false,
        hot_reload: false,
        debounce_ms: 50,
        ..Config::default()
    }
}

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap_or_else(|e| panic!("mkdir: {e}"));
    }
    std::fs::write(path, content).unwrap_or_else(|e| panic!("write: {e}"));
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|e| panic!("read {}: {e}", path.display()))
}

#[test]
fn compiles_a_tree_and_mirrors_structure() {
    let temp = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
    let root = temp.path();
    write(
        &root.join("content/post.md"),
        "---\ntitle: \"Hello: World\"\ntags: [a, b, c]\n---\n\n# Post\n\nInline $x^2$ math.\n",
    );
    write(&root.join("content/sub/nested.md"), "# Nested\n\nplain body\n");

    let mut compiler = Compiler::new(test_config(root));
    let summary = compiler.compile_all().unwrap_or_else(|e| panic!("{e}"));

    assert_eq!(summary.total, 2);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.skipped, 0);
    assert!(summary.is_success());

    let post = read(&root.join("content/post.mdx"));
    assert!(post.starts_with("---\ntitle: \"Hello: World\"\ntags: [a, b, c]\n---\n\n"));
    assert!(post.contains("<span className=\"math-inline\">{String.raw`x^2`}</span>"));

    let nested = read(&root.join("content/sub/nested.mdx"));
    assert!(nested.contains("# Nested"));
}

#[test]
fn mermaid_block_becomes_component_invocation() {
    let temp = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
    let root = temp.path();
    write(
        &root.join("content/graph.md"),
        "```mermaid\ngraph TD\nA-->B\n```\n",
    );

    let mut compiler = Compiler::new(test_config(root));
    let summary = compiler.compile_all().unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(summary.succeeded, 1);

    let output = read(&root.join("content/graph.mdx"));
    assert!(output.contains("<Mermaid code={`graph TD\nA-->B`} />"), "{output}");
}

#[test]
fn second_run_skips_unchanged_files() {
    let temp = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
    let root = temp.path();
    write(&root.join("content/a.md"), "# A\n");
    write(&root.join("content/b.md"), "# B\n");

    let mut compiler = Compiler::new(test_config(root));
    let first = compiler.compile_all().unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(first.succeeded, 2);

    let second = compiler.compile_all().unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(second.total, 2);
    assert_eq!(second.succeeded, 0);
    assert_eq!(second.skipped, 2);
}

#[test]
fn changed_file_recompiles_while_unchanged_skips() {
    let temp = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
    let root = temp.path();
    write(&root.join("content/a.md"), "# A\n");
    write(&root.join("content/b.md"), "# B\n");

    let mut compiler = Compiler::new(test_config(root));
    compiler.compile_all().unwrap_or_else(|e| panic!("{e}"));

    std::thread::sleep(Duration::from_millis(20));
    write(&root.join("content/a.md"), "# A updated\n");

    let summary = compiler.compile_all().unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 0);

    let changed: Vec<_> = summary
        .files
        .iter()
        .filter(|f| f.status == OutcomeStatus::Success)
        .collect();
    assert!(changed[0].source.ends_with("a.md"));
    assert!(read(&root.join("content/a.mdx")).contains("# A updated"));
}

#[test]
fn one_failing_file_does_not_abort_the_batch() {
    let temp = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
    let root = temp.path();
    // Unbalanced brackets make the mermaid block invalid.
    write(
        &root.join("content/bad.md"),
        "```mermaid\ngraph TD\nA[Start-->B\n```\n",
    );
    write(&root.join("content/good.md"), "# Fine\n");

    let mut compiler = Compiler::new(test_config(root));
    let summary = compiler.compile_all().unwrap_or_else(|e| panic!("{e}"));

    assert_eq!(summary.total, 2);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert!(!summary.is_success());

    // The failing file still produced output (an error placeholder).
    let bad = read(&root.join("content/bad.mdx"));
    assert!(bad.contains("Mermaid Error:"), "{bad}");

    let failed: Vec<_> = summary
        .files
        .iter()
        .filter(|f| f.status == OutcomeStatus::Error)
        .collect();
    assert_eq!(failed.len(), 1);
    assert!(!failed[0].errors.is_empty());
}

#[test]
fn table_mismatch_warns_but_compiles() {
    let temp = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
    let root = temp.path();
    write(
        &root.join("content/table.md"),
        "| a | b | c |\n|---|---|---|\n| 1 | 2 |\n",
    );

    let mut compiler = Compiler::new(test_config(root));
    let summary = compiler.compile_all().unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 0);
    assert!(summary.warnings > 0);
}

#[test]
fn get_stats_reflects_lifecycle() {
    let temp = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
    let root = temp.path();
    write(&root.join("content/a.md"), "# A\n");

    let mut compiler = Compiler::new(test_config(root));
    assert!(!compiler.get_stats().initialized);

    compiler.compile_all().unwrap_or_else(|e| panic!("{e}"));
    let stats = compiler.get_stats();
    assert!(stats.initialized);
    assert_eq!(stats.tracked_files, 1);
    let transformer = stats.transformer.expect("transformer stats");
    assert_eq!(
        transformer.enabled,
        vec!["standard", "mermaid", "image", "math", "tables"]
    );

    compiler.destroy();
    assert!(!compiler.get_stats().initialized);
    assert_eq!(compiler.get_stats().tracked_files, 0);
}

#[test]
fn missing_content_dir_fails_the_run_not_the_process() {
    let temp = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
    let mut config = test_config(temp.path());
    config.content_dir = temp.path().join("does-not-exist");
    let mut compiler = Compiler::new(config);
    let err = compiler.compile_all().expect_err("expected scan failure");
    assert!(err.to_string().contains("does not exist"), "{err}");
}

#[test]
fn watch_mode_recompiles_changed_files() {
    let temp = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
    let root = temp.path();
    write(&root.join("content/live.md"), "# v1\n");

    let mut config = test_config(root);
    config.watch = true;
    config.hot_reload = true;

    let mut compiler = Compiler::new(config);
    compiler.compile_all().unwrap_or_else(|e| panic!("{e}"));
    assert!(read(&root.join("content/live.mdx")).contains("# v1"));

    let reload_events = std::sync::Arc::new(std::sync::Mutex::new(Vec::<ChangeKind>::new()));
    if let Some(manager) = compiler.hot_reload_manager() {
        let seen = std::sync::Arc::clone(&reload_events);
        // Keep the listener alive for the whole test.
        let handle = manager.add_listener(Box::new(move |event| {
            if let Ok(mut events) = seen.lock() {
                events.push(event.kind);
            }
        }));
        std::mem::forget(handle);
    }

    compiler.start_watching().unwrap_or_else(|e| panic!("{e}"));
    assert!(compiler.get_stats().watching);

    std::thread::sleep(Duration::from_millis(200));
    write(&root.join("content/live.md"), "# v2\n");

    // Wait (generously) for the debounced recompile to land.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    let output = root.join("content/live.mdx");
    let mut recompiled = false;
    while std::time::Instant::now() < deadline {
        if read(&output).contains("# v2") {
            recompiled = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    assert!(recompiled, "watch mode never recompiled the file");

    compiler.destroy();
    assert!(!compiler.get_stats().watching);
}
