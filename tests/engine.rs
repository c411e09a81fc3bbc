// ABOUTME: Integration tests for the deployment engine against a fake orchestrator.
// ABOUTME: Covers validation, sanitization, cancellation, per-target serialization, and deletion.

mod support;

use stackwright::deploy::{
    CreateRequest, DeployError, DeployErrorKind, DeploymentEvent, DeploymentStatus, LogLevel,
    REDACTED,
};
use stackwright::target::Target;
use std::time::Duration;
use support::*;

const PROBED: &str = r#"
slug: status
template: "services: {}"
health_check:
  path: /healthz
  port: 8080
"#;

fn wiki_request(target: &str) -> CreateRequest {
    CreateRequest::new("wiki", node(target)).config(wiki_values())
}

mod create {
    use super::*;

    #[tokio::test]
    async fn missing_required_option_persists_nothing() {
        let h = Harness::new(&[WIKI], FakeOrchestrator::default());

        let err = h
            .engine
            .create(CreateRequest::new("wiki", node(NODE_1)).config(values(&[("domain", "wiki.example")])))
            .await
            .unwrap_err();

        assert!(matches!(&err, DeployError::MissingOptions(names) if names == &["admin_password"]));
        assert_eq!(err.kind(), DeployErrorKind::Validation);
        assert!(h.engine.list(&node(NODE_1)).is_empty());
        assert_eq!(h.orchestrator.deploy_count(), 0);
    }

    #[tokio::test]
    async fn unrenderable_template_is_rejected_up_front() {
        let h = Harness::new(&[BROKEN], FakeOrchestrator::default());

        let err = h
            .engine
            .create(CreateRequest::new("broken", node(NODE_1)))
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::Template(_)));
        assert_eq!(err.kind(), DeployErrorKind::Validation);
        assert!(h.engine.list(&node(NODE_1)).is_empty());
    }

    #[tokio::test]
    async fn unknown_recipe_and_target_are_not_found() {
        let h = Harness::new(&[WIKI], FakeOrchestrator::default());

        let err = h
            .engine
            .create(CreateRequest::new("nope", node(NODE_1)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), DeployErrorKind::NotFound);

        let err = h.engine.create(wiki_request("node-9")).await.unwrap_err();
        assert!(matches!(err, DeployError::TargetNotFound(_)));
    }

    #[tokio::test]
    async fn offline_target_is_rejected() {
        let h = Harness::new(&[WIKI], FakeOrchestrator::default());
        let mut offline = Target::new("node-3", "10.0.0.3", 22);
        offline.online = false;
        h.targets.insert(offline);

        let err = h.engine.create(wiki_request("node-3")).await.unwrap_err();

        assert!(matches!(err, DeployError::TargetOffline(_)));
        assert_eq!(err.kind(), DeployErrorKind::Connection);
    }

    #[tokio::test]
    async fn created_row_starts_validating_with_sanitized_config() {
        let h = Harness::new(&[WIKI], FakeOrchestrator::with_delay(Duration::from_secs(5)));

        let row = h.engine.create(wiki_request(NODE_1)).await.unwrap();

        assert_eq!(row.status, DeploymentStatus::Validating);
        assert!(row.stack_name.as_str().starts_with("wiki-"));
        assert_eq!(row.config["admin_password"], REDACTED);
        assert_eq!(row.config["domain"], "wiki.example");

        h.engine.cancel(&row.id).unwrap();
        finish(&h.engine, &row.id).await;
    }
}

mod execution {
    use super::*;

    #[tokio::test]
    async fn successful_deployment_reaches_running() {
        let h = Harness::new(&[WIKI], FakeOrchestrator::default());
        let mut events = h.broadcaster.subscribe();

        let row = h.engine.create(wiki_request(NODE_1)).await.unwrap();
        let done = finish(&h.engine, &row.id).await;

        assert_eq!(done.status, DeploymentStatus::Running);
        assert!(done.deployed_at.is_some());
        assert!(done.error_details.is_empty());

        // The orchestrator sees real values; the stored row never does.
        let spec = &h.orchestrator.specs()[0];
        assert_eq!(spec.host, "10.0.0.1:22");
        assert_eq!(spec.env["ADMIN_PASSWORD"], "hunter2-secret");
        assert!(spec.manifest.contains("hunter2-secret"));
        assert!(spec.working_dir.ends_with(done.stack_name.as_str()));
        assert!(!done.manifest.contains("hunter2-secret"));
        assert!(done.manifest.contains(REDACTED));
        assert!(done.manifest.contains("wiki.example"));
        assert_eq!(done.config["admin_password"], REDACTED);

        let mut statuses = Vec::new();
        while let Ok(message) = events.try_recv() {
            if let DeploymentEvent::Status { status, .. } = message.event {
                statuses.push(status);
            }
        }
        assert_eq!(
            statuses,
            vec![
                DeploymentStatus::Validating,
                DeploymentStatus::Preparing,
                DeploymentStatus::Deploying,
                DeploymentStatus::HealthCheck,
                DeploymentStatus::Running,
            ]
        );
        assert!(h.orchestrator.cleanups().is_empty());
    }

    #[tokio::test]
    async fn http_probe_runs_from_the_target() {
        let h = Harness::new(&[PROBED], FakeOrchestrator::default());
        h.executor.on("curl", "200");

        let row = h
            .engine
            .create(CreateRequest::new("status", node(NODE_1)))
            .await
            .unwrap();
        let done = finish(&h.engine, &row.id).await;

        assert_eq!(done.status, DeploymentStatus::Running);
        let probes = h.executor.commands_containing("curl");
        assert_eq!(probes.len(), 1);
        assert!(probes[0].contains("http://127.0.0.1:8080/healthz"));
        assert_eq!(h.executor.hosts(), vec!["10.0.0.1:22".to_string()]);
        assert!(done.logs.iter().any(|l| l.message.contains("HTTP probe returned 200")));
    }

    #[tokio::test]
    async fn failed_http_probe_is_only_a_warning() {
        let h = Harness::new(&[PROBED], FakeOrchestrator::default());
        h.executor.on("curl", "503");

        let row = h
            .engine
            .create(CreateRequest::new("status", node(NODE_1)))
            .await
            .unwrap();
        let done = finish(&h.engine, &row.id).await;

        assert_eq!(done.status, DeploymentStatus::Running);
        assert!(
            done.logs
                .iter()
                .any(|l| l.level == LogLevel::Warn && l.message.contains("/healthz"))
        );
    }

    #[tokio::test]
    async fn deploy_failure_fails_and_cleans_up() {
        let orchestrator = FakeOrchestrator::default();
        orchestrator.fail_deploys("pull access denied");
        let h = Harness::new(&[WIKI], orchestrator);

        let row = h.engine.create(wiki_request(NODE_1)).await.unwrap();
        let done = finish(&h.engine, &row.id).await;

        assert_eq!(done.status, DeploymentStatus::Failed);
        assert!(done.error_details.contains("pull access denied"));
        let cleanups = h.orchestrator.cleanups();
        assert_eq!(cleanups.len(), 1);
        assert!(matches!(
            &cleanups[0],
            Call::Cleanup { stack, working_dir: Some(_), .. } if stack == done.stack_name.as_str()
        ));
    }

    #[tokio::test]
    async fn stack_not_running_fails_without_cleanup() {
        let orchestrator = FakeOrchestrator::default();
        orchestrator.set_running(false);
        let h = Harness::new(&[WIKI], orchestrator);

        let row = h.engine.create(wiki_request(NODE_1)).await.unwrap();
        let done = finish(&h.engine, &row.id).await;

        assert_eq!(done.status, DeploymentStatus::Failed);
        assert!(done.error_details.contains("no stack is running"));
        assert!(h.orchestrator.cleanups().is_empty());
    }
}

mod cancellation {
    use super::*;

    #[tokio::test]
    async fn cancel_during_deploy_fails_and_cleans_up() {
        let h = Harness::new(&[WIKI], FakeOrchestrator::with_delay(Duration::from_secs(30)));

        let row = h.engine.create(wiki_request(NODE_1)).await.unwrap();
        assert!(
            eventually(|| {
                h.orchestrator.deploy_count() == 1
                    && h.engine.get(&row.id).map(|r| r.status) == Some(DeploymentStatus::Deploying)
            })
            .await
        );

        h.engine.cancel(&row.id).unwrap();
        let done = finish(&h.engine, &row.id).await;

        assert_eq!(done.status, DeploymentStatus::Failed);
        assert!(done.error_details.contains("cancelled"));
        assert_eq!(h.orchestrator.cleanups().len(), 1);
        assert!(!h.engine.is_in_flight(&row.id));
    }

    #[tokio::test]
    async fn cancel_during_health_check_fails_and_cleans_up() {
        let h = Harness::new(&[WIKI], FakeOrchestrator::default());
        h.orchestrator.delay_health_checks(Duration::from_secs(30));

        let row = h.engine.create(wiki_request(NODE_1)).await.unwrap();
        assert!(
            eventually(|| {
                h.orchestrator.health_checks() == 1
                    && h.engine.get(&row.id).map(|r| r.status) == Some(DeploymentStatus::HealthCheck)
            })
            .await
        );

        h.engine.cancel(&row.id).unwrap();
        let done = finish(&h.engine, &row.id).await;

        assert_eq!(done.status, DeploymentStatus::Failed);
        assert!(done.error_details.contains("cancelled"));
        assert_eq!(h.orchestrator.cleanups().len(), 1);
    }

    #[tokio::test]
    async fn cancel_during_http_check_fails_and_cleans_up() {
        let h = Harness::new(&[PROBED], FakeOrchestrator::default());
        h.executor.stall_on("curl");

        let row = h
            .engine
            .create(CreateRequest::new("status", node(NODE_1)))
            .await
            .unwrap();
        assert!(eventually(|| h.executor.commands_containing("curl").len() == 1).await);

        h.engine.cancel(&row.id).unwrap();
        let done = finish(&h.engine, &row.id).await;

        assert_eq!(done.status, DeploymentStatus::Failed);
        assert!(done.error_details.contains("cancelled"));
        assert!(done.deployed_at.is_none());
        assert_eq!(h.orchestrator.cleanups().len(), 1);
    }

    #[tokio::test]
    async fn cancel_after_terminal_is_a_conflict() {
        let h = Harness::new(&[WIKI], FakeOrchestrator::default());

        let row = h.engine.create(wiki_request(NODE_1)).await.unwrap();
        finish(&h.engine, &row.id).await;

        let err = h.engine.cancel(&row.id).unwrap_err();
        assert_eq!(err.kind(), DeployErrorKind::Conflict);
    }

    #[tokio::test]
    async fn cancel_unknown_deployment_is_not_found() {
        let h = Harness::new(&[WIKI], FakeOrchestrator::default());
        let err = h
            .engine
            .cancel(&stackwright::types::DeploymentId::new("missing"))
            .unwrap_err();
        assert_eq!(err.kind(), DeployErrorKind::NotFound);
    }

    #[tokio::test]
    async fn queued_deployment_can_be_cancelled_before_the_lock() {
        let h = Harness::new(&[WIKI], FakeOrchestrator::with_delay(Duration::from_secs(30)));

        let first = h.engine.create(wiki_request(NODE_1)).await.unwrap();
        assert!(eventually(|| h.orchestrator.deploy_count() == 1).await);
        let second = h.engine.create(wiki_request(NODE_1)).await.unwrap();

        h.engine.cancel(&second.id).unwrap();
        let done = finish(&h.engine, &second.id).await;
        assert_eq!(done.status, DeploymentStatus::Failed);
        assert!(done.error_details.contains("cancelled"));
        assert_eq!(h.orchestrator.deploy_count(), 1);

        h.engine.cancel(&first.id).unwrap();
        finish(&h.engine, &first.id).await;
    }
}

mod concurrency {
    use super::*;

    #[tokio::test]
    async fn same_target_deployments_are_serialized() {
        let h = Harness::new(&[WIKI], FakeOrchestrator::with_delay(Duration::from_millis(100)));

        let a = h.engine.create(wiki_request(NODE_1)).await.unwrap();
        let b = h.engine.create(wiki_request(NODE_1)).await.unwrap();
        let (a, b) = tokio::join!(finish(&h.engine, &a.id), finish(&h.engine, &b.id));

        assert_eq!(a.status, DeploymentStatus::Running);
        assert_eq!(b.status, DeploymentStatus::Running);
        assert_ne!(a.stack_name, b.stack_name);
        assert_eq!(h.orchestrator.max_concurrent_on("10.0.0.1:22"), 1);
    }

    #[tokio::test]
    async fn different_targets_deploy_in_parallel() {
        let h = Harness::new(&[WIKI], FakeOrchestrator::with_delay(Duration::from_millis(300)));

        let a = h.engine.create(wiki_request(NODE_1)).await.unwrap();
        let b = h.engine.create(wiki_request(NODE_2)).await.unwrap();
        let (a, b) = tokio::join!(finish(&h.engine, &a.id), finish(&h.engine, &b.id));

        assert_eq!(a.status, DeploymentStatus::Running);
        assert_eq!(b.status, DeploymentStatus::Running);
        assert_eq!(h.orchestrator.max_concurrent(), 2);
    }
}

mod deletion {
    use super::*;

    #[tokio::test]
    async fn delete_while_in_flight_is_a_conflict() {
        let h = Harness::new(&[WIKI], FakeOrchestrator::with_delay(Duration::from_secs(30)));

        let row = h.engine.create(wiki_request(NODE_1)).await.unwrap();
        assert!(eventually(|| h.orchestrator.deploy_count() == 1).await);

        let err = h.engine.delete(&row.id).await.unwrap_err();
        assert!(matches!(err, DeployError::InFlight(_)));
        assert_eq!(err.kind(), DeployErrorKind::Conflict);
        assert!(h.engine.get(&row.id).is_some());

        h.engine.cancel(&row.id).unwrap();
        finish(&h.engine, &row.id).await;
        h.engine.delete(&row.id).await.unwrap();
        assert!(h.engine.get(&row.id).is_none());
    }

    #[tokio::test]
    async fn delete_removes_stack_and_row() {
        let h = Harness::new(&[WIKI], FakeOrchestrator::default());

        let row = h.engine.create(wiki_request(NODE_1)).await.unwrap();
        let done = finish(&h.engine, &row.id).await;
        h.engine.delete(&row.id).await.unwrap();

        assert!(h.engine.get(&row.id).is_none());
        assert_eq!(
            h.orchestrator.cleanups(),
            vec![Call::Cleanup {
                host: "10.0.0.1:22".into(),
                stack: done.stack_name.to_string(),
                working_dir: None,
            }]
        );

        let err = h.engine.delete(&row.id).await.unwrap_err();
        assert_eq!(err.kind(), DeployErrorKind::NotFound);
    }
}
