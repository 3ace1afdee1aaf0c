//! Lease scenarios against the in-memory work store

use std::sync::Arc;
use std::time::Duration;

use agora::types::AgoraError;
use agora::work::{MemoryWorkStore, NewWorkItem, WorkItemScheduler, WorkItemStatus};

fn scheduler() -> Arc<WorkItemScheduler> {
    Arc::new(WorkItemScheduler::new(
        Arc::new(MemoryWorkStore::new()),
        Duration::from_secs(60),
        Duration::from_secs(2),
    ))
}

fn item(run_id: &str) -> NewWorkItem {
    NewWorkItem {
        run_id: run_id.into(),
        stage: "review".into(),
        kind: "critique".into(),
        ..Default::default()
    }
}

fn agents(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("agent-{}", i)).collect()
}

#[tokio::test]
async fn concurrent_claims_have_exactly_one_winner() {
    let s = scheduler();
    let offered = agents(16);
    let work = s.create(item("run-1"), &offered).await.unwrap();

    let mut handles = Vec::new();
    for agent in offered.clone() {
        let s = s.clone();
        let id = work.id.clone();
        handles.push(tokio::spawn(async move { (agent.clone(), s.claim(&id, &agent).await) }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        let (agent, result) = handle.await.unwrap();
        match result {
            Ok(claimed) => {
                assert_eq!(claimed.lease.agent_id, agent);
                winners.push(agent);
            }
            Err(AgoraError::Conflict(_)) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(winners.len(), 1);

    let view = s.get(&work.id, &winners[0]).await.unwrap();
    assert_eq!(view.work_item.status, WorkItemStatus::Claimed);
}

#[tokio::test]
async fn claim_next_skips_taken_items() {
    let s = scheduler();
    let both = vec!["alice".to_string(), "bob".to_string()];
    let first = s.create(item("run-1"), &both).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = s.create(item("run-1"), &both).await.unwrap();

    let alice = s.claim_next("alice").await.unwrap().unwrap();
    assert_eq!(alice.work_item.id, first.id);

    let bob = s.claim_next("bob").await.unwrap().unwrap();
    assert_eq!(bob.work_item.id, second.id);

    assert!(s.claim_next("bob").await.unwrap().is_none());
}

#[tokio::test]
async fn only_the_holder_completes() {
    let s = scheduler();
    let work = s.create(item("run-1"), &agents(2)).await.unwrap();
    s.claim(&work.id, "agent-0").await.unwrap();

    assert!(matches!(
        s.complete(&work.id, "agent-1").await,
        Err(AgoraError::Forbidden(_))
    ));

    let done = s.complete(&work.id, "agent-0").await.unwrap();
    assert_eq!(done.status, WorkItemStatus::Completed);

    assert!(matches!(s.claim(&work.id, "agent-1").await, Err(AgoraError::Conflict(_))));
    assert!(matches!(s.complete(&work.id, "agent-0").await, Err(AgoraError::Conflict(_))));
}

#[tokio::test]
async fn unoffered_agent_cannot_claim() {
    let s = scheduler();
    let work = s.create(item("run-1"), &["alice".to_string()]).await.unwrap();
    assert!(s.claim(&work.id, "mallory").await.is_err());
    assert!(s.list_offers("mallory", 10).await.unwrap().is_empty());
    assert_eq!(s.list_offers("alice", 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn released_agent_items_are_offered_again() {
    let s = scheduler();
    let work = s.create(item("run-1"), &agents(2)).await.unwrap();
    s.claim(&work.id, "agent-0").await.unwrap();

    assert_eq!(s.release_agent("agent-0").await.unwrap(), 1);
    let claimed = s.claim(&work.id, "agent-1").await.unwrap();
    assert_eq!(claimed.lease.agent_id, "agent-1");
}

#[test]
fn scheduled_items_are_not_claimable_before_promotion() {
    let s = scheduler();
    let mut future = item("run-2");
    future.scheduled_at = Some(chrono::Utc::now() + chrono::Duration::hours(2));

    let created = tokio_test::block_on(s.create(future, &["alice".to_string()])).unwrap();
    assert_eq!(created.status, WorkItemStatus::Scheduled);

    let result = tokio_test::block_on(s.claim(&created.id, "alice"));
    assert!(matches!(result, Err(AgoraError::Conflict(_))));
    assert_eq!(tokio_test::block_on(s.promote_scheduled()).unwrap(), 0);
}
