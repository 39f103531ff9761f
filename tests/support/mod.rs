// ABOUTME: Test support utilities.
// ABOUTME: Provides stub stages, layout and git fixtures for integration tests.

use std::path::Path;
use std::sync::Arc;

use easydep::layout::PathLayout;
use easydep::release::Release;

#[allow(dead_code)]
pub mod stages;

/// Create a release descriptor with test defaults.
#[allow(dead_code)]
pub fn release(id: u64, tag_name: &str) -> Release {
    Release {
        id,
        tag_name: tag_name.to_string(),
        owner: "acme".to_string(),
        repo_name: "webapp".to_string(),
        body: None,
    }
}

/// Create a layout rooted in the given directory and make sure it exists.
#[allow(dead_code)]
pub fn layout(root: &Path) -> Arc<PathLayout> {
    let layout = PathLayout::new(root, "current").expect("layout should accept temp root");
    layout.create_if_missing().expect("root should be creatable");
    Arc::new(layout)
}

/// Write a script into the `.easydep` directory of a release directory.
#[allow(dead_code)]
pub fn write_script(dir: &Path, name: &str, body: &str) {
    let script_dir = dir.join(".easydep");
    std::fs::create_dir_all(&script_dir).expect("script dir should be creatable");
    std::fs::write(script_dir.join(name), body).expect("script should be writable");
}

/// Run a git command in the given directory, panicking on failure.
#[allow(dead_code)]
pub fn run_git(dir: &Path, args: &[&str]) {
    let output = std::process::Command::new("git")
        .args([
            "-c",
            "user.name=test",
            "-c",
            "user.email=test@example.com",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git should be runnable");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Capture the stdout of a git command in the given directory.
#[allow(dead_code)]
pub fn run_git_capture(dir: &Path, args: &[&str]) -> String {
    let output = std::process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git should be runnable");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Initialize a repository with one commit and tag per `(tag, content)`
/// entry, writing `content` into `app.txt` before each commit.
#[allow(dead_code)]
pub fn init_tagged_repo(dir: &Path, tags: &[(&str, &str)]) {
    std::fs::create_dir_all(dir).expect("repo dir should be creatable");
    run_git(dir, &["init", "--initial-branch=main"]);
    for (tag, content) in tags {
        std::fs::write(dir.join("app.txt"), content).expect("content should be writable");
        run_git(dir, &["add", "."]);
        run_git(dir, &["commit", "-m", &format!("release {tag}")]);
        run_git(dir, &["tag", tag]);
    }
}

/// Wait until `predicate` holds, failing the test after a few seconds.
#[allow(dead_code)]
pub async fn wait_until(what: &str, mut predicate: impl FnMut() -> bool) {
    for _ in 0..100 {
        if predicate() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    panic!("timed out waiting for {what}");
}
