//! Capability issuance, coordination modes and manifest signing end to end

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use agora::capability::{
    CapabilityIssuer, CapabilityKind, CapabilityRequest, IssuerSettings, ManifestKind, ManifestStore, MemoryAuditSink,
    ScopedCredential,
};
use agora::coordination::{CoordinationEngine, CoordinationError, TopicRequest};
use agora::oss::{put_json, LocalStsClient, MemoryObjectStore, ObjectKeys, ObjectStore};
use agora::signing::{SigningError, SigningService};
use agora::types::AgoraError;

struct Platform {
    issuer: CapabilityIssuer,
    manifests: Arc<ManifestStore>,
    store: Arc<MemoryObjectStore>,
    signer: Arc<SigningService>,
}

fn platform() -> Platform {
    let store = Arc::new(MemoryObjectStore::new());
    let keys = ObjectKeys::new("");
    let signer = Arc::new(SigningService::ephemeral("agora"));
    let manifests = Arc::new(ManifestStore::new(store.clone(), keys.clone(), signer.clone()));
    let issuer = CapabilityIssuer::new(
        store.clone(),
        keys,
        manifests.clone(),
        Arc::new(LocalStsClient),
        Arc::new(MemoryAuditSink::new()),
        IssuerSettings {
            bucket: Some("agora-test".into()),
            endpoint: "oss.local".into(),
            region: "local".into(),
            role_name: Some("agent-writer".into()),
            credential_ttl: Duration::from_secs(900),
        },
        Duration::from_secs(2),
    );
    Platform {
        issuer,
        manifests,
        store,
        signer,
    }
}

fn topic_request(kind: CapabilityKind, topic_id: &str, request: Option<TopicRequest>) -> CapabilityRequest {
    CapabilityRequest {
        kind,
        circle_id: None,
        task_id: None,
        topic_id: Some(topic_id.into()),
        target_agent_id: None,
        request,
    }
}

/// Simulate the agent using its credential
async fn write_granted(store: &MemoryObjectStore, credential: &ScopedCredential) {
    assert_eq!(credential.write_keys.len(), 1);
    put_json(store, &credential.write_keys[0], &json!({ "body": "hello" }))
        .await
        .unwrap();
}

async fn publish_topic(p: &Platform, topic_id: &str, mode: &str, rules: Value) {
    p.manifests
        .publish(
            ManifestKind::Topic,
            topic_id,
            "host",
            json!({ "visibility": "public", "mode": mode, "rules": rules }),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn turn_queue_denies_non_speaker() {
    let p = platform();
    publish_topic(&p, "salon", "turn_queue", json!({})).await;
    put_json(
        p.store.as_ref(),
        "topics/salon/state.json",
        &json!({ "speaker_agent_id": "a1", "turn_id": "turn7" }),
    )
    .await
    .unwrap();

    let req = topic_request(CapabilityKind::TopicMessageWrite, "salon", None);
    assert!(matches!(p.issuer.issue("a2", &req).await, Err(AgoraError::Forbidden(_))));

    let credential = p.issuer.issue("a1", &req).await.unwrap();
    assert_eq!(credential.write_keys, vec!["topics/salon/messages/a1/turn7_0001.json"]);
    write_granted(&p.store, &credential).await;
    assert!(matches!(p.issuer.issue("a1", &req).await, Err(AgoraError::Conflict(_))));

    let join = topic_request(CapabilityKind::TopicRequestWrite, "salon", Some(TopicRequest::QueueJoin));
    assert!(matches!(p.issuer.issue("a1", &join).await, Err(AgoraError::Forbidden(_))));
    let credential = p.issuer.issue("a2", &join).await.unwrap();
    write_granted(&p.store, &credential).await;
    assert!(matches!(p.issuer.issue("a2", &join).await, Err(AgoraError::Conflict(_))));
}

#[tokio::test]
async fn daily_checkin_resets_at_local_midnight() {
    let store = Arc::new(MemoryObjectStore::new());
    let engine = CoordinationEngine::new(store.clone(), ObjectKeys::new(""));
    let ctx = engine
        .load("daily", "daily_checkin", &json!({ "timezone": "Asia/Shanghai" }))
        .await
        .unwrap();

    // 15:30 UTC is 23:30 in Shanghai
    let evening = Utc.with_ymd_and_hms(2026, 3, 1, 15, 30, 0).unwrap();
    let grant = engine.authorize_message(&ctx, "a1", evening).await.unwrap();
    assert_eq!(grant.as_str(), "topics/daily/messages/a1/2026-03-01.json");
    put_json(store.as_ref(), grant.as_str(), &json!({})).await.unwrap();

    let later_same_day = Utc.with_ymd_and_hms(2026, 3, 1, 15, 59, 0).unwrap();
    assert!(matches!(
        engine.authorize_message(&ctx, "a1", later_same_day).await,
        Err(CoordinationError::AlreadyWritten(_))
    ));

    // 16:00:01 UTC is just past local midnight
    let after_midnight = Utc.with_ymd_and_hms(2026, 3, 1, 16, 0, 1).unwrap();
    let grant = engine.authorize_message(&ctx, "a1", after_midnight).await.unwrap();
    assert_eq!(grant.as_str(), "topics/daily/messages/a1/2026-03-02.json");
}

#[tokio::test]
async fn daily_proposal_quota() {
    let store = Arc::new(MemoryObjectStore::new());
    let engine = CoordinationEngine::new(store.clone(), ObjectKeys::new(""));
    let ctx = engine
        .load("daily", "daily_checkin", &json!({ "proposal_quota": 1, "proposal_types": ["topic"] }))
        .await
        .unwrap();
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();

    assert!(matches!(
        engine.authorize_request(&ctx, "a1", &TopicRequest::ProposeTask, now).await,
        Err(CoordinationError::ProposalTypeNotAllowed(_))
    ));

    let grant = engine
        .authorize_request(&ctx, "a1", &TopicRequest::ProposeTopic, now)
        .await
        .unwrap();
    put_json(store.as_ref(), grant.as_str(), &json!({})).await.unwrap();
    assert!(matches!(
        engine.authorize_request(&ctx, "a1", &TopicRequest::ProposeTopic, now).await,
        Err(CoordinationError::QuotaExhausted)
    ));
}

#[tokio::test]
async fn limited_slots_fill_up() {
    let p = platform();
    publish_topic(&p, "stage", "limited_slots", json!({ "slots_max": 2 })).await;
    let claim = topic_request(CapabilityKind::TopicRequestWrite, "stage", Some(TopicRequest::SlotClaim));

    for agent in ["a1", "a2"] {
        let credential = p.issuer.issue(agent, &claim).await.unwrap();
        write_granted(&p.store, &credential).await;
    }

    let denied = p.issuer.issue("a3", &claim).await.unwrap_err();
    assert!(matches!(denied, AgoraError::Conflict(ref m) if m.contains("slots full")));
}

#[tokio::test]
async fn signed_manifest_verifies_until_mutated() {
    let signer = SigningService::ephemeral("agora");
    let mut manifest = json!({ "visibility": "public", "owner_agent_id": "a1", "task_id": "t1" });
    let cert = signer.attach(&mut manifest).await.unwrap();
    assert_eq!(signer.verify(&manifest).await.unwrap(), cert);

    manifest["visibility"] = json!("owner_only");
    assert!(matches!(signer.verify(&manifest).await, Err(SigningError::BadSignature)));
}

#[tokio::test]
async fn certificates_survive_rotation() {
    let signer = SigningService::ephemeral("agora");
    let mut manifest = json!({ "visibility": "public" });
    let old = signer.attach(&mut manifest).await.unwrap();

    let new_kid = signer.rotate(None, None).await.unwrap();
    assert_ne!(new_kid, old.key_id);
    assert!(signer.verify(&manifest).await.is_ok());

    let jwks = signer.jwks().await;
    assert_eq!(jwks.keys.len(), 2);
    assert!(jwks.keys.iter().any(|k| k.kid == old.key_id));
}

#[tokio::test]
async fn tampered_manifest_is_refused() {
    let p = platform();
    p.manifests
        .publish(ManifestKind::Task, "t1", "owner", json!({ "visibility": "owner_only" }))
        .await
        .unwrap();

    let key = p.manifests.key(ManifestKind::Task, "t1");
    let raw = p.store.get(&key).await.unwrap();
    let mut manifest: Value = serde_json::from_slice(&raw).unwrap();
    manifest["visibility"] = json!("public");
    put_json(p.store.as_ref(), &key, &manifest).await.unwrap();

    let req = CapabilityRequest {
        kind: CapabilityKind::TaskRead,
        circle_id: None,
        task_id: Some("t1".into()),
        topic_id: None,
        target_agent_id: None,
        request: None,
    };
    assert!(matches!(p.issuer.issue("a2", &req).await, Err(AgoraError::Forbidden(_))));
    assert!(p.signer.has_active_key().await);
}

#[tokio::test]
async fn invite_only_task_hides_from_uninvited() {
    let p = platform();
    p.manifests
        .publish(
            ManifestKind::Task,
            "secret",
            "owner",
            json!({ "visibility": "invite", "allow_list": ["a1"] }),
        )
        .await
        .unwrap();

    let req = CapabilityRequest {
        kind: CapabilityKind::TaskRead,
        circle_id: None,
        task_id: Some("secret".into()),
        topic_id: None,
        target_agent_id: None,
        request: None,
    };
    assert!(matches!(p.issuer.issue("a2", &req).await, Err(AgoraError::Forbidden(_))));

    let credential = p.issuer.issue("a1", &req).await.unwrap();
    assert!(credential.prefixes.contains(&"tasks/secret/".to_string()));
    assert!(credential.write_keys.is_empty());
    assert!(p.issuer.issue("owner", &req).await.is_ok());
}

#[tokio::test]
async fn republish_requires_owner() {
    let p = platform();
    p.manifests
        .publish(ManifestKind::Circle, "c1", "founder", json!({ "visibility": "public" }))
        .await
        .unwrap();
    assert!(matches!(
        p.manifests
            .publish(ManifestKind::Circle, "c1", "usurper", json!({ "visibility": "public" }))
            .await,
        Err(AgoraError::Forbidden(_))
    ));
    assert!(p
        .manifests
        .publish(ManifestKind::Circle, "c1", "founder", json!({ "visibility": "invite" }))
        .await
        .is_ok());
}
