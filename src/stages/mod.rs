// ABOUTME: Deployment pipeline stages and the chains composed from them.
// ABOUTME: The deploy chain prepares and activates a release, the rollback chain only re-points the symlink.

mod checkout;
mod deploy_script;
mod lifecycle_bridge;
mod repo_init;
mod retention;
mod symlink_flip;
mod tag_acceptance;
mod workdir_cleanup;

pub use checkout::Checkout;
pub use deploy_script::DeployScript;
pub use lifecycle_bridge::LifecycleScriptBridge;
pub use repo_init::RepoInit;
pub use retention::RetentionCleanup;
pub use symlink_flip::SymlinkFlip;
pub use tag_acceptance::TagAcceptance;
pub use workdir_cleanup::WorkdirCleanup;

use std::sync::Arc;

use crate::config::Settings;
use crate::layout::PathLayout;
use crate::pipeline::Stage;
use crate::source::RepoFetcher;

/// The full forward deployment chain, in execution order.
pub fn deploy_chain(
    settings: &Settings,
    layout: Arc<PathLayout>,
    fetcher: Arc<dyn RepoFetcher>,
) -> Vec<Arc<dyn Stage>> {
    vec![
        Arc::new(TagAcceptance::new(
            settings.labels.clone(),
            settings.body_pattern.clone(),
        )),
        Arc::new(RepoInit::new(Arc::clone(&layout), fetcher)),
        Arc::new(Checkout),
        Arc::new(LifecycleScriptBridge),
        Arc::new(WorkdirCleanup),
        Arc::new(DeployScript),
        Arc::new(SymlinkFlip::new(
            Arc::clone(&layout),
            settings.additional_symlinks.clone(),
        )),
        Arc::new(RetentionCleanup::new(layout, settings.max_stored_releases)),
    ]
}

/// The rollback chain: an already-prepared release directory only needs the
/// current symlink re-pointed at it.
pub fn rollback_chain(
    layout: Arc<PathLayout>,
    additional_symlinks: Vec<(String, std::path::PathBuf)>,
) -> Vec<Arc<dyn Stage>> {
    vec![Arc::new(SymlinkFlip::new(layout, additional_symlinks))]
}
