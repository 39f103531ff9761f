// ABOUTME: Integration tests for the git CLI wrapper against local repositories.
// ABOUTME: Exercises the cache clone, remote rewrite, tag fetch and hard reset cycle.

mod support;

use easydep::fsutil;
use easydep::git;

/// Test: a cache clone without checkout plus copy and reset materializes
/// the tagged content, mirroring the repo-init and checkout stages.
#[tokio::test]
async fn clone_copy_and_reset_materialize_the_tag() {
    let tmp = tempfile::tempdir().unwrap();
    let upstream = tmp.path().join("upstream");
    support::init_tagged_repo(&upstream, &[("v1", "content of v1"), ("v2", "content of v2")]);

    // clone into the cache without a working tree
    let cache = tmp.path().join("cache");
    git::clone_no_checkout(&upstream.to_string_lossy(), &cache)
        .await
        .unwrap();
    assert!(!cache.join("app.txt").exists(), "cache has no working tree");

    // copy the cache into a release directory and reset to the tag
    let release_dir = tmp.path().join("100");
    fsutil::copy_dir_recursive(&cache, &release_dir).unwrap();
    git::fetch_tags_prune(&release_dir).await.unwrap();
    git::reset_hard(&release_dir, "v1").await.unwrap();
    assert_eq!(
        std::fs::read_to_string(release_dir.join("app.txt")).unwrap(),
        "content of v1"
    );

    git::reset_hard(&release_dir, "v2").await.unwrap();
    assert_eq!(
        std::fs::read_to_string(release_dir.join("app.txt")).unwrap(),
        "content of v2"
    );
}

/// Test: tags created after the initial clone are picked up by a fetch.
#[tokio::test]
async fn fetch_picks_up_new_upstream_tags() {
    let tmp = tempfile::tempdir().unwrap();
    let upstream = tmp.path().join("upstream");
    support::init_tagged_repo(&upstream, &[("v1", "first")]);

    let clone = tmp.path().join("clone");
    git::clone_no_checkout(&upstream.to_string_lossy(), &clone)
        .await
        .unwrap();

    // a new release appears upstream
    std::fs::write(upstream.join("app.txt"), "second").unwrap();
    support::run_git(&upstream, &["add", "."]);
    support::run_git(&upstream, &["commit", "-m", "release v2"]);
    support::run_git(&upstream, &["tag", "v2"]);

    git::fetch_tags_prune(&clone).await.unwrap();
    git::reset_hard(&clone, "v2").await.unwrap();
    assert_eq!(
        std::fs::read_to_string(clone.join("app.txt")).unwrap(),
        "second"
    );
}

/// Test: rewriting the origin URL takes effect for subsequent fetches.
#[tokio::test]
async fn set_remote_url_rewrites_origin() {
    let tmp = tempfile::tempdir().unwrap();
    let first_upstream = tmp.path().join("first");
    let second_upstream = tmp.path().join("second");
    support::init_tagged_repo(&first_upstream, &[("v1", "from first")]);
    support::init_tagged_repo(&second_upstream, &[("v2", "from second")]);

    let clone = tmp.path().join("clone");
    git::clone_no_checkout(&first_upstream.to_string_lossy(), &clone)
        .await
        .unwrap();

    git::set_remote_url(&clone, &second_upstream.to_string_lossy())
        .await
        .unwrap();
    assert_eq!(
        support::run_git_capture(&clone, &["remote", "get-url", "origin"]),
        second_upstream.to_string_lossy()
    );

    git::fetch_tags_prune(&clone).await.unwrap();
    git::reset_hard(&clone, "v2").await.unwrap();
    assert_eq!(
        std::fs::read_to_string(clone.join("app.txt")).unwrap(),
        "from second"
    );
}

/// Test: failed git commands surface stderr in the error.
#[tokio::test]
async fn reset_to_unknown_revision_reports_the_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let upstream = tmp.path().join("upstream");
    support::init_tagged_repo(&upstream, &[("v1", "content")]);

    let err = git::reset_hard(&upstream, "no-such-tag").await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("reset"), "unexpected error: {message}");
}
