use diversion_sync_core::contract::{Author, Branch, Commit, MockRemoteGateway};
use diversion_sync_core::error::GatewayError;
use diversion_sync_core::polling::{poll, PollOutcome};
use diversion_sync_core::revision::{head_revision, HeadRevision, RecordedState, RevisionState};

fn gateway_at(head: &'static str) -> MockRemoteGateway {
    let mut gateway = MockRemoteGateway::new();
    gateway.expect_get_branch().returning(move |_, name| {
        Ok(Branch {
            id: "dv.branch.1".into(),
            name: name.to_string(),
            head_commit_id: Some(head.to_string()),
        })
    });
    gateway
}

#[tokio::test]
async fn test_equal_head_is_no_changes() {
    let gateway = gateway_at("dv.commit.5");
    let baseline = RecordedState::from(RevisionState::new("dv.commit.5", 50));

    let outcome = poll(&gateway, "dv.repo.1", "main", Some(&baseline)).await;
    assert_eq!(outcome, PollOutcome::NoChanges);
    assert!(!outcome.should_trigger());
}

#[tokio::test]
async fn test_different_head_is_changed() {
    let gateway = gateway_at("dv.commit.6");
    let baseline = RecordedState::from(RevisionState::new("dv.commit.5", 50));

    let outcome = poll(&gateway, "dv.repo.1", "main", Some(&baseline)).await;
    assert_eq!(outcome, PollOutcome::Changed);
    assert!(outcome.should_trigger());
}

#[tokio::test]
async fn test_missing_or_foreign_baseline_is_unknown() {
    let gateway = gateway_at("dv.commit.6");

    assert_eq!(
        poll(&gateway, "dv.repo.1", "main", None).await,
        PollOutcome::Unknown
    );

    let foreign = RecordedState::Foreign { scm: "git".into() };
    let outcome = poll(&gateway, "dv.repo.1", "main", Some(&foreign)).await;
    assert_eq!(outcome, PollOutcome::Unknown);
    assert!(outcome.should_trigger());
}

#[tokio::test]
async fn test_composite_baseline_compares_its_revision() {
    let gateway = gateway_at("dv.commit.5");
    let baseline = RecordedState::Composite {
        states: vec![
            RecordedState::Foreign { scm: "git".into() },
            RecordedState::from(RevisionState::new("dv.commit.5", 50)),
        ],
    };

    assert_eq!(
        poll(&gateway, "dv.repo.1", "main", Some(&baseline)).await,
        PollOutcome::NoChanges
    );
}

#[tokio::test]
async fn test_gateway_failure_suppresses_trigger() {
    let mut gateway = MockRemoteGateway::new();
    gateway
        .expect_get_branch()
        .returning(|_, _| Err(GatewayError::TransportFailure("503".into())));

    let baseline = RecordedState::from(RevisionState::new("dv.commit.5", 50));
    assert_eq!(
        poll(&gateway, "dv.repo.1", "main", Some(&baseline)).await,
        PollOutcome::NoChanges
    );
    assert_eq!(
        poll(&gateway, "dv.repo.1", "main", None).await,
        PollOutcome::NoChanges
    );
}

#[tokio::test]
async fn test_headless_branch_falls_back_to_feed() {
    let mut gateway = MockRemoteGateway::new();
    gateway.expect_get_branch().returning(|_, _| {
        Ok(Branch {
            id: "dv.branch.1".into(),
            name: "main".into(),
            head_commit_id: None,
        })
    });
    gateway
        .expect_list_commits()
        .returning(|_, _| Ok(vec![]));

    let baseline = RecordedState::from(RevisionState::new("dv.commit.5", 50));
    assert_eq!(
        poll(&gateway, "dv.repo.1", "main", Some(&baseline)).await,
        PollOutcome::NoChanges
    );
}

#[tokio::test]
async fn test_head_revision_reports_branch_pointer() {
    let mut gateway = gateway_at("dv.commit.6");
    gateway.expect_list_commits().times(0);

    let head = head_revision(&gateway, "dv.repo.1", "main").await.unwrap();
    assert_eq!(
        head,
        HeadRevision {
            branch_id: "dv.branch.1".into(),
            branch_name: "main".into(),
            commit_id: "dv.commit.6".into(),
        }
    );
}

#[tokio::test]
async fn test_head_revision_of_headless_branch_uses_newest_commit() {
    let mut gateway = MockRemoteGateway::new();
    gateway.expect_get_branch().returning(|_, _| {
        Ok(Branch {
            id: "dv.branch.2".into(),
            name: "release".into(),
            head_commit_id: Some(String::new()),
        })
    });
    gateway
        .expect_list_commits()
        .withf(|_, limit| *limit == 1)
        .times(1)
        .returning(|_, _| {
            Ok(vec![Commit {
                id: "dv.commit.9".into(),
                created_at: 90,
                message: "newest".into(),
                author: Author::default(),
                branch_id: None,
                parent_ids: vec![],
                changed_paths: vec![],
            }])
        });

    let head = head_revision(&gateway, "dv.repo.1", "release").await.unwrap();
    assert_eq!(head.branch_name, "release");
    assert_eq!(head.commit_id, "dv.commit.9");
}

#[tokio::test]
async fn test_head_revision_of_empty_repository_is_not_found() {
    let mut gateway = MockRemoteGateway::new();
    gateway.expect_get_branch().returning(|_, _| {
        Ok(Branch {
            id: "dv.branch.2".into(),
            name: "main".into(),
            head_commit_id: None,
        })
    });
    gateway.expect_list_commits().returning(|_, _| Ok(vec![]));

    let err = head_revision(&gateway, "dv.repo.1", "main").await.unwrap_err();
    assert!(matches!(err, GatewayError::NotFound(_)));
}
