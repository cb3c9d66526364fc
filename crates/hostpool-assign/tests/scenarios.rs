//! End-to-end provisioning scenarios on an on-disk store.

use hostpool_assign::{AssignmentEngine, ProvisionOutcome};
use hostpool_core::EngineConfig;
use hostpool_state::*;

fn server(id: &str, tier: Tier, region: &str, cpu: f64) -> Server {
    Server {
        id: id.to_string(),
        tier,
        provider: "aws".to_string(),
        region: region.to_string(),
        specs: ServerSpecs {
            cpu_cores: 4,
            memory_gb: 16,
            storage_gb: 200,
        },
        status: ServerStatus::Active,
        utilization: Utilization {
            cpu_pct: cpu,
            mem_pct: 20.0,
            storage_pct: 20.0,
        },
        sampled_at: 1,
        assigned_team_count: 0,
        max_team_count: 20,
        hourly_cost: 0.1,
        revision: 0,
        created_at: 0,
        updated_at: 0,
    }
}

fn app() -> ResourceSpec {
    ResourceSpec {
        kind: ResourceKind::App,
        name: "storefront".to_string(),
    }
}

fn open_engine(dir: &tempfile::TempDir) -> AssignmentEngine {
    let store = StateStore::open(&dir.path().join("hostpool.redb")).unwrap();
    AssignmentEngine::new(store, EngineConfig::default())
}

#[test]
fn free_tier_threshold_leaves_one_candidate() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(&dir);
    for (id, cpu) in [("server1", 18.0), ("server2", 32.0), ("server3", 45.0)] {
        engine.store().insert_server(&server(id, Tier::Free, "us-east-1", cpu)).unwrap();
    }
    let mut rule = AssignmentRule::default_for(Tier::Free);
    rule.resource_thresholds.cpu_pct = 25.0;
    engine.update_rule(&rule).unwrap();

    assert_eq!(engine.preview(Tier::Free).unwrap().eligible, vec!["server1"]);
    let outcome = engine.provision("team-a", Tier::Free, &app()).unwrap();
    assert_eq!(outcome.assignment().unwrap().server_id, "server1");
}

#[test]
fn region_preference_falls_back_when_region_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(&dir);
    engine.store().insert_server(&server("use-1", Tier::Pro, "us-east-1", 40.0)).unwrap();
    engine.store().insert_server(&server("use-2", Tier::Pro, "us-east-1", 15.0)).unwrap();

    let mut rule = AssignmentRule::default_for(Tier::Pro);
    rule.assignment_strategy = AssignmentStrategy::RegionBased;
    rule.region_preference = Some("eu-west-1".to_string());
    engine.update_rule(&rule).unwrap();

    let preview = engine.preview(Tier::Pro).unwrap();
    assert!(preview.region_fallback);
    assert_eq!(preview.policy, Some(AssignmentStrategy::LowestUsage));

    let outcome = engine.provision("team-a", Tier::Pro, &app()).unwrap();
    assert_eq!(outcome.assignment().unwrap().server_id, "use-2");
}

#[test]
fn dedicated_pool_runs_out() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(&dir);
    for id in ["ent-1", "ent-2"] {
        engine.store().insert_server(&server(id, Tier::Enterprise, "us-east-1", 5.0)).unwrap();
    }
    let mut rule = AssignmentRule::default_for(Tier::Enterprise);
    rule.assignment_strategy = AssignmentStrategy::Dedicated;
    rule.max_teams_per_server = 1;
    engine.update_rule(&rule).unwrap();

    let a = engine.provision("acme", Tier::Enterprise, &app()).unwrap();
    let b = engine.provision("globex", Tier::Enterprise, &app()).unwrap();
    assert_ne!(
        a.assignment().unwrap().server_id,
        b.assignment().unwrap().server_id
    );

    let c = engine.provision("initech", Tier::Enterprise, &app()).unwrap();
    assert_eq!(c, ProvisionOutcome::NoEligibleServer { tier: Tier::Enterprise });
}

#[test]
fn cost_limit_caps_new_servers() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(&dir);
    // 0.1/h each = 72/month.
    engine.store().insert_server(&server("p1", Tier::Pro, "us-east-1", 10.0)).unwrap();
    engine.store().insert_server(&server("p2", Tier::Pro, "us-east-1", 20.0)).unwrap();

    let mut rule = AssignmentRule::default_for(Tier::Pro);
    rule.max_teams_per_server = 1;
    rule.cost_limit_monthly = 100.0;
    engine.update_rule(&rule).unwrap();

    let first = engine.provision("team-a", Tier::Pro, &app()).unwrap();
    assert_eq!(first.assignment().unwrap().server_id, "p1");
    // Opening p2 would bring the tier to 144/month.
    let second = engine.provision("team-b", Tier::Pro, &app()).unwrap();
    assert_eq!(second, ProvisionOutcome::NoEligibleServer { tier: Tier::Pro });
}

#[test]
fn assignments_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let id = {
        let engine = open_engine(&dir);
        engine.store().insert_server(&server("p1", Tier::Pro, "us-east-1", 10.0)).unwrap();
        let outcome = engine.provision("team-a", Tier::Pro, &app()).unwrap();
        outcome.assignment().unwrap().id.clone()
    };

    let engine = open_engine(&dir);
    let again = engine.provision("team-a", Tier::Pro, &app()).unwrap();
    assert!(matches!(again, ProvisionOutcome::Existing(ref a) if a.id == id));

    engine.release(&id).unwrap();
    assert_eq!(engine.store().get_server("p1").unwrap().unwrap().assigned_team_count, 0);
}
