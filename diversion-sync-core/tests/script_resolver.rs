use std::sync::Arc;

use diversion_sync_core::contract::{MockRemoteGateway, PathEntry};
use diversion_sync_core::error::GatewayError;
use diversion_sync_core::resolver::{
    resolve_script_in_tree, resolve_script_path, ResolvedScript, ScriptNaming,
};
use diversion_sync_core::tree::RevisionTree;

fn naming() -> ScriptNaming {
    ScriptNaming::default()
}

#[test]
fn test_configured_path_is_returned_verbatim_even_if_absent() {
    let listing = vec![PathEntry::file("Jenkinsfile")];
    let resolved = resolve_script_path(
        &listing,
        Some("ci/does-not-exist.groovy"),
        "build",
        "Jenkinsfile",
        &naming(),
    );
    assert_eq!(
        resolved,
        ResolvedScript::Configured("ci/does-not-exist.groovy".into())
    );
}

#[test]
fn test_blank_configured_path_is_ignored() {
    let listing = vec![PathEntry::file("Jenkinsfile")];
    let resolved = resolve_script_path(&listing, Some("  "), "", "Jenkinsfile", &naming());
    assert_eq!(resolved, ResolvedScript::Detected("Jenkinsfile".into()));
}

#[test]
fn test_job_script_wins_over_default_name() {
    let listing = vec![
        PathEntry::file("Jenkinsfile"),
        PathEntry::file("pipelines/nightly.groovy"),
        PathEntry::file("nightly"),
    ];
    let resolved = resolve_script_path(&listing, None, "nightly", "jenkinsfile", &naming());
    assert_eq!(
        resolved,
        ResolvedScript::Detected("pipelines/nightly.groovy".into())
    );
}

#[test]
fn test_bare_job_name_before_default_name() {
    let listing = vec![PathEntry::file("Jenkinsfile"), PathEntry::file("ci/nightly")];
    let resolved = resolve_script_path(&listing, None, "nightly", "Jenkinsfile", &naming());
    assert_eq!(resolved, ResolvedScript::Detected("ci/nightly".into()));
}

#[test]
fn test_suffix_match_respects_segment_boundary() {
    let listing = vec![PathEntry::file("ci/my-nightly.groovy")];
    let resolved = resolve_script_path(&listing, None, "nightly", "Jenkinsfile", &naming());
    assert_eq!(resolved, ResolvedScript::Fallback("nightly.groovy".into()));
}

#[test]
fn test_first_match_in_listing_order() {
    let listing = vec![
        PathEntry::file("b/Jenkinsfile"),
        PathEntry::file("a/Jenkinsfile"),
    ];
    let resolved = resolve_script_path(&listing, None, "", "Jenkinsfile", &naming());
    assert_eq!(resolved.path(), "b/Jenkinsfile");
}

#[test]
fn test_non_default_request_is_used_as_is() {
    let listing = vec![PathEntry::file("Jenkinsfile")];
    let resolved = resolve_script_path(&listing, None, "nightly", "ci/release.groovy", &naming());
    assert_eq!(
        resolved,
        ResolvedScript::AsRequested("ci/release.groovy".into())
    );
}

#[test]
fn test_custom_extension() {
    let naming = ScriptNaming {
        default_name: "Jenkinsfile".into(),
        extension: "jenkins".into(),
    };
    let listing = vec![PathEntry::file("deploy.jenkins")];
    let resolved = resolve_script_path(&listing, None, "deploy", "Jenkinsfile", &naming);
    assert_eq!(resolved.into_path(), "deploy.jenkins");
}

#[tokio::test]
async fn test_failed_listing_falls_back_to_constructed_name() {
    let mut gateway = MockRemoteGateway::new();
    gateway
        .expect_list_paths()
        .times(1)
        .returning(|_, _| Err(GatewayError::Unauthorized("token expired".into())));
    let tree = RevisionTree::new(Arc::new(gateway), "dv.repo.1", "main");

    let resolved = resolve_script_in_tree(&tree, None, "nightly", "Jenkinsfile", &naming()).await;
    assert_eq!(resolved, ResolvedScript::Fallback("nightly.groovy".into()));
}

#[tokio::test]
async fn test_configured_path_skips_listing() {
    let mut gateway = MockRemoteGateway::new();
    gateway.expect_list_paths().times(0);
    let tree = RevisionTree::new(Arc::new(gateway), "dv.repo.1", "main");

    let resolved =
        resolve_script_in_tree(&tree, Some("ci/build.groovy"), "nightly", "Jenkinsfile", &naming())
            .await;
    assert_eq!(resolved.path(), "ci/build.groovy");
}
