// ABOUTME: Release descriptor handed from the release feed to the deployment pipeline.
// ABOUTME: The numeric id is the canonical ordering key across deployments.

/// A published release of the source repository.
///
/// The `id` is assigned by the release feed, unique and monotonically
/// increasing for newer releases. It orders deployments and names the
/// per-release directory on disk. The optional `body` may carry a small
/// structured configuration evaluated during tag acceptance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub id: u64,
    pub tag_name: String,
    pub owner: String,
    pub repo_name: String,
    pub body: Option<String>,
}
