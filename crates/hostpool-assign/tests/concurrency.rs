//! Concurrent provisioning against a shared store.
//!
//! Many threads race for the same small pool; the team counts must never
//! exceed their caps and every committed assignment must be accounted for.

use std::sync::Arc;
use std::thread;

use hostpool_assign::{AssignError, AssignmentEngine, ProvisionOutcome, transaction};
use hostpool_core::EngineConfig;
use hostpool_state::*;

fn server(id: &str, max: u32) -> Server {
    Server {
        id: id.to_string(),
        tier: Tier::Pro,
        provider: "aws".to_string(),
        region: "us-east-1".to_string(),
        specs: ServerSpecs {
            cpu_cores: 8,
            memory_gb: 32,
            storage_gb: 500,
        },
        status: ServerStatus::Active,
        utilization: Utilization {
            cpu_pct: 10.0,
            mem_pct: 10.0,
            storage_pct: 10.0,
        },
        sampled_at: 1,
        assigned_team_count: 0,
        max_team_count: max,
        hourly_cost: 0.2,
        revision: 0,
        created_at: 0,
        updated_at: 0,
    }
}

fn web() -> ResourceSpec {
    ResourceSpec {
        kind: ResourceKind::App,
        name: "web".to_string(),
    }
}

#[test]
fn racing_commits_never_exceed_cap() {
    let store = StateStore::open_in_memory().unwrap();
    store.insert_server(&server("s1", 3)).unwrap();
    let rule = store.put_rule(&AssignmentRule::default_for(Tier::Pro)).unwrap();
    let snapshot = store.get_server("s1").unwrap().unwrap();

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let store = store.clone();
            let snapshot = snapshot.clone();
            let rule = rule.clone();
            thread::spawn(move || {
                transaction::commit(&store, &format!("team-{i}"), &snapshot, &rule, &web())
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let committed = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(AssignError::CapacityExceeded(_))))
        .count();

    assert_eq!(committed, 3);
    assert_eq!(rejected, 13);
    let s1 = store.get_server("s1").unwrap().unwrap();
    assert_eq!(s1.assigned_team_count, 3);
    assert_eq!(store.list_active_assignments_for_server("s1").unwrap().len(), 3);
}

#[test]
fn parallel_provisioning_fills_pool_exactly() {
    let store = StateStore::open_in_memory().unwrap();
    for (id, max) in [("s1", 2), ("s2", 3), ("s3", 1)] {
        store.insert_server(&server(id, max)).unwrap();
    }
    let engine = Arc::new(AssignmentEngine::new(
        store.clone(),
        EngineConfig {
            max_commit_retries: 32,
            ..EngineConfig::default()
        },
    ));

    let handles: Vec<_> = (0..12)
        .map(|i| {
            let engine = engine.clone();
            thread::spawn(move || engine.provision(&format!("team-{i}"), Tier::Pro, &web()))
        })
        .collect();

    let mut provisioned = 0;
    let mut turned_away = 0;
    for handle in handles {
        match handle.join().unwrap() {
            Ok(ProvisionOutcome::Provisioned(_)) => provisioned += 1,
            Ok(ProvisionOutcome::NoEligibleServer { .. }) => turned_away += 1,
            // Retries exhausted while the last slots were contested.
            Err(e) if e.is_retryable() => turned_away += 1,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    assert_eq!(provisioned, 6);
    assert_eq!(turned_away, 6);
    for s in store.list_servers(Tier::Pro).unwrap() {
        assert_eq!(s.assigned_team_count, s.max_team_count, "{} not full", s.id);
    }
}

#[test]
fn concurrent_release_and_provision_keep_counts_consistent() {
    let store = StateStore::open_in_memory().unwrap();
    store.insert_server(&server("s1", 4)).unwrap();
    let engine = AssignmentEngine::new(store.clone(), EngineConfig::default());

    let initial: Vec<Assignment> = (0..4)
        .map(|i| {
            engine
                .provision(&format!("old-{i}"), Tier::Pro, &web())
                .unwrap()
                .assignment()
                .cloned()
                .unwrap()
        })
        .collect();

    let releasers: Vec<_> = initial
        .into_iter()
        .map(|a| {
            let engine = engine.clone();
            thread::spawn(move || engine.release(&a.id).map(|_| ()))
        })
        .collect();
    let provisioners: Vec<_> = (0..4)
        .map(|i| {
            let engine = engine.clone();
            thread::spawn(move || engine.provision(&format!("new-{i}"), Tier::Pro, &web()).map(|_| ()))
        })
        .collect();

    for h in releasers {
        h.join().unwrap().unwrap();
    }
    for h in provisioners {
        let _ = h.join().unwrap();
    }

    let active = store.list_active_assignments_for_server("s1").unwrap().len() as u32;
    let s1 = store.get_server("s1").unwrap().unwrap();
    assert_eq!(s1.assigned_team_count, active);
    assert!(s1.assigned_team_count <= 4);
}

#[test]
fn lost_race_without_retries_is_surfaced() {
    let store = StateStore::open_in_memory().unwrap();
    store.insert_server(&server("s1", 1)).unwrap();
    let engine = AssignmentEngine::new(
        store.clone(),
        EngineConfig {
            max_commit_retries: 0,
            ..EngineConfig::default()
        },
    );

    // Fill the only slot in a write transaction that stays open until the
    // engine has taken its snapshot.
    let (ready_tx, ready_rx) = std::sync::mpsc::channel();
    let writer = {
        let store = store.clone();
        thread::spawn(move || {
            store.transact(|scope| {
                scope.adjust_team_count("s1", 1)?;
                let _ = ready_tx.send(());
                thread::sleep(std::time::Duration::from_millis(300));
                Ok::<_, StateError>(())
            })
        })
    };
    ready_rx.recv().unwrap();

    let result = engine.provision("team-late", Tier::Pro, &web());
    writer.join().unwrap().unwrap();

    assert!(matches!(result, Err(AssignError::CapacityExceeded(_))), "{result:?}");
    assert!(store.list_active_assignments_for_team("team-late").unwrap().is_empty());
    assert_eq!(store.get_server("s1").unwrap().unwrap().assigned_team_count, 1);
}
