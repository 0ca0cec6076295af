#![allow(clippy::missing_panics_doc)]

mod common;

use barops::error::DeployStage;
use barops::{DeployOptions, DeploymentOrchestrator, OpsError, ServiceGraph};
use barops_cloud::{AccessBinding, ResourceKind, Subject};

use common::{container_id, container_url, settings, FakeCloud, FakeImages};

const SECRET: &str = "e6q0secret";

fn options() -> DeployOptions {
    DeployOptions {
        tag: "20261018120000".into(),
        ..DeployOptions::default()
    }
}

#[tokio::test]
async fn test_full_deploy_wires_gateway_and_bot() {
    let cloud = FakeCloud::new();
    let images = FakeImages::default();
    let graph = ServiceGraph::bartender();
    let settings = settings();

    let ledger = DeploymentOrchestrator::new(&cloud, &images, &graph, &settings, options())
        .run(SECRET)
        .await
        .unwrap();

    let gateway_deploys = cloud.deploys_of("bartender-gateway");
    let bot_deploys = cloud.deploys_of("bartender-telegram");
    assert_eq!(gateway_deploys.len(), 2);
    assert_eq!(bot_deploys.len(), 1);
    assert_eq!(cloud.state().deploys.len(), 8);

    let gateway_url = container_url("bartender-gateway");
    let bot_url = container_url("bartender-telegram");

    assert_eq!(gateway_deploys[0].environment["TELEGRAM_SERVICE_URL"], "");
    assert_eq!(gateway_deploys[1].environment["TELEGRAM_SERVICE_URL"], bot_url);
    assert_eq!(bot_deploys[0].environment["GATEWAY_URL"], gateway_url);
    assert_eq!(
        bot_deploys[0].environment["WEBHOOK_URL"],
        format!("{gateway_url}/telegram/webhook")
    );
    assert_eq!(bot_deploys[0].environment["TELEGRAM_TOKEN"], "TEST");
    assert_eq!(
        cloud.deploys_of("bartender-rag")[0].environment["SECRET_ID"],
        SECRET
    );

    assert!(ledger.is_converged());
    assert_eq!(ledger.get("gateway").unwrap().deploy_count, 2);

    // Backfill reuses the image built for the initial deploy
    assert_eq!(images.builds.lock().unwrap().len(), 7);
    assert_eq!(images.pushes.lock().unwrap().len(), 7);
    assert_eq!(gateway_deploys[0].image, gateway_deploys[1].image);
    assert_eq!(cloud.state().registry_auth, 1);
}

#[tokio::test]
async fn test_grants_are_applied() {
    let cloud = FakeCloud::new();
    let images = FakeImages::default();
    let graph = ServiceGraph::bartender();
    let settings = settings();

    DeploymentOrchestrator::new(&cloud, &images, &graph, &settings, options())
        .run(SECRET)
        .await
        .unwrap();

    let state = cloud.state();
    let sa = Subject::ServiceAccount("aje-bartender-runner".into());
    assert!(state.bindings["b1gfolder"].contains(&AccessBinding {
        role: "container-registry.images.puller".into(),
        subject: sa.clone(),
    }));
    assert!(state.bindings[SECRET].contains(&AccessBinding {
        role: "lockbox.payloadViewer".into(),
        subject: sa,
    }));
    for svc in graph.services() {
        let id = container_id(&format!("bartender-{}", svc.name));
        assert_eq!(
            state.bindings[&id],
            vec![AccessBinding {
                role: "serverless.containers.invoker".into(),
                subject: Subject::AllUsers,
            }]
        );
    }
}

#[tokio::test]
async fn test_second_run_creates_nothing_and_keeps_urls() {
    let cloud = FakeCloud::new();
    let images = FakeImages::default();
    let graph = ServiceGraph::bartender();
    let settings = settings();

    let first = DeploymentOrchestrator::new(&cloud, &images, &graph, &settings, options())
        .run(SECRET)
        .await
        .unwrap();
    let creates_after_first = cloud.state().creates.clone();
    let bindings_after_first = cloud.state().bindings.clone();

    let second = DeploymentOrchestrator::new(&cloud, &images, &graph, &settings, options())
        .run(SECRET)
        .await
        .unwrap();

    assert_eq!(cloud.state().creates, creates_after_first);
    assert_eq!(cloud.state().bindings, bindings_after_first);
    // 7 containers, the service account and the registry
    assert_eq!(creates_after_first.len(), 9);

    for svc in graph.services() {
        assert_eq!(first.url(&svc.name), second.url(&svc.name));
        assert!(second.url(&svc.name).is_some());
    }
}

#[tokio::test]
async fn test_first_failure_stops_the_run() {
    let cloud = FakeCloud::new();
    cloud.fail_deploy_of("bartender-rag");
    let images = FakeImages::default();
    let graph = ServiceGraph::bartender();
    let settings = settings();

    let err = DeploymentOrchestrator::new(&cloud, &images, &graph, &settings, options())
        .run(SECRET)
        .await
        .unwrap_err();

    match &err {
        OpsError::Deploy { service, stage, .. } => {
            assert_eq!(service, "rag");
            assert_eq!(*stage, DeployStage::Revision);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.exit_code(), 13);

    assert!(cloud.deploys_of("bartender-gateway").is_empty());
    assert!(cloud.deploys_of("bartender-telegram").is_empty());
    assert_eq!(cloud.state().deploys.len(), 4);
}

#[tokio::test]
async fn test_build_failure_exits_with_build_code() {
    let cloud = FakeCloud::new();
    let images = FakeImages {
        failing_build: Some("yandex".into()),
        ..FakeImages::default()
    };
    let graph = ServiceGraph::bartender();
    let settings = settings();

    let err = DeploymentOrchestrator::new(&cloud, &images, &graph, &settings, options())
        .run(SECRET)
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), 10);
    assert!(cloud.deploys_of("bartender-yandex").is_empty());
    assert_eq!(cloud.state().deploys.len(), 2);
}

#[tokio::test]
async fn test_only_gateway_uses_existing_peer_urls() {
    let cloud = FakeCloud::new();
    let images = FakeImages::default();
    let graph = ServiceGraph::bartender();
    let settings = settings();

    DeploymentOrchestrator::new(&cloud, &images, &graph, &settings, options())
        .run(SECRET)
        .await
        .unwrap();
    let deploys_before = cloud.state().deploys.len();

    let only = DeployOptions {
        only: Some(vec!["gateway".into()]),
        ..options()
    };
    let ledger = DeploymentOrchestrator::new(&cloud, &images, &graph, &settings, only)
        .run(SECRET)
        .await
        .unwrap();

    let gateway_deploys = cloud.deploys_of("bartender-gateway");
    assert_eq!(cloud.state().deploys.len(), deploys_before + 1);
    assert_eq!(
        gateway_deploys.last().unwrap().environment["TELEGRAM_SERVICE_URL"],
        container_url("bartender-telegram")
    );
    assert_eq!(
        gateway_deploys.last().unwrap().environment["RAG_SERVICE_URL"],
        container_url("bartender-rag")
    );
    assert!(ledger.is_converged());
}

#[tokio::test]
async fn test_dry_run_touches_nothing() {
    let cloud = FakeCloud::new();
    let images = FakeImages::default();
    let graph = ServiceGraph::bartender();
    let settings = settings();

    let dry = DeployOptions {
        dry_run: true,
        ..options()
    };
    DeploymentOrchestrator::new(&cloud, &images, &graph, &settings, dry)
        .run("")
        .await
        .unwrap();

    let state = cloud.state();
    assert!(state.calls.is_empty());
    assert!(state.creates.is_empty());
    assert!(images.builds.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_build_only_pushes_without_deploying() {
    let cloud = FakeCloud::new();
    let images = FakeImages::default();
    let graph = ServiceGraph::bartender();
    let settings = settings();

    let build_only = DeployOptions {
        build_only: true,
        only: Some(vec!["rag".into(), "gateway".into()]),
        ..options()
    };
    DeploymentOrchestrator::new(&cloud, &images, &graph, &settings, build_only)
        .run("")
        .await
        .unwrap();

    assert!(cloud.state().deploys.is_empty());
    assert_eq!(
        *images.pushes.lock().unwrap(),
        vec![
            "cr.yandex/crp-bartender-registry/rag:20261018120000".to_string(),
            "cr.yandex/crp-bartender-registry/gateway:20261018120000".to_string(),
        ]
    );
    assert_eq!(
        cloud.state().creates,
        vec![(ResourceKind::Registry, "bartender-registry".to_string())]
    );
}

#[tokio::test]
async fn test_pinned_registry_is_not_looked_up() {
    let cloud = FakeCloud::new();
    let images = FakeImages::default();
    let graph = ServiceGraph::bartender();
    let mut settings = settings();
    settings.registry_id = Some("crpPINNED".into());

    DeploymentOrchestrator::new(&cloud, &images, &graph, &settings, options())
        .run(SECRET)
        .await
        .unwrap();

    assert!(!cloud
        .state()
        .creates
        .iter()
        .any(|(kind, _)| *kind == ResourceKind::Registry));
    assert!(images
        .pushes
        .lock()
        .unwrap()
        .iter()
        .all(|i| i.starts_with("cr.yandex/crpPINNED/")));
}

#[tokio::test]
async fn test_unknown_service_in_selection_is_rejected() {
    let cloud = FakeCloud::new();
    let images = FakeImages::default();
    let graph = ServiceGraph::bartender();
    let settings = settings();

    let bad = DeployOptions {
        only: Some(vec!["frontend".into()]),
        ..options()
    };
    let err = DeploymentOrchestrator::new(&cloud, &images, &graph, &settings, bad)
        .run(SECRET)
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::Graph(_)));
    assert_eq!(err.exit_code(), 5);
    assert!(cloud.state().calls.is_empty());
}
