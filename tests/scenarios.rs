//! End-to-end scenarios S1–S6 from `spec.md` §8, driven against a
//! wired-together `Core` instead of any single engine in isolation.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tokio::sync::Mutex as TokioMutex;

use cogcore::atom::{AtomType, TruthValue};
use cogcore::atomspace::AtomSpace;
use cogcore::ecan::{Ecan, EcanConfig};
use cogcore::pln::PlnConfig;
use cogcore::scheduler::{CoreServices, Plugin, Scheduler, SchedulerConfig};
use cogcore::{Core, CoreConfig, Knowledge};

// S1 — Deduction chain.
#[tokio::test]
async fn s1_deduction_chain_produces_expected_truth_value() {
    let core = Core::new(CoreConfig::default()).await;
    core.add_knowledge(Knowledge::Rule {
        antecedent: "A",
        consequent: "B",
        tv: Some(TruthValue::new(0.9, 0.8)),
    })
    .await
    .unwrap();
    core.add_knowledge(Knowledge::Rule {
        antecedent: "B",
        consequent: "C",
        tv: Some(TruthValue::new(0.7, 0.6)),
    })
    .await
    .unwrap();

    let run = core.run_inference(1).await;
    assert_eq!(run.total_inferences, 1);

    let graph = core.graph().lock().await;
    let a = graph.find_node(AtomType::ConceptNode, "A").unwrap();
    let c = graph.find_node(AtomType::ConceptNode, "C").unwrap();
    let ac = graph.find_link(AtomType::ImplicationLink, &[a, c]).expect("A->C inferred");
    let tv = graph.get(ac).unwrap().tv;
    assert!((tv.strength - 0.63).abs() < 1e-9);
    assert!((tv.confidence - 0.3504).abs() < 1e-6);
    core.shutdown().await;
}

// S2 — Focus cap.
#[tokio::test]
async fn s2_focus_keeps_top_n_highest_sti() {
    let core = Core::new(CoreConfig {
        ecan: EcanConfig { max_af: 3, ..EcanConfig::default() },
        ..CoreConfig::default()
    })
    .await;

    let mut ids = Vec::new();
    for name in ["c0", "c1", "c2", "c3", "c4"] {
        ids.push(core.add_knowledge(Knowledge::Concept { name, tv: None }).await.unwrap());
    }
    let amounts = [10, 20, 30, 40, 50];
    for (&id, &amount) in ids.iter().zip(amounts.iter()) {
        let mut ecan = core.ecan().lock().await;
        let mut graph = core.graph().lock().await;
        ecan.stimulate(&mut graph, id, amount).unwrap();
    }

    core.run_ecan_cycle().await;

    let graph = core.graph().lock().await;
    assert!(graph.focus_ids().len() <= 3);
    let focus_stis: Vec<i64> = graph.focus().iter().map(|a| a.av.sti).collect();
    assert!(focus_stis.iter().all(|&s| s >= 30 - 5)); // decay/rent may shave a little
    core.shutdown().await;
}

// S3 — Structural de-duplication.
#[tokio::test]
async fn s3_add_link_twice_returns_same_id_and_size_increments_once() {
    let mut space = AtomSpace::new();
    let a = space.add_node(AtomType::ConceptNode, Some("a"), None).unwrap().id;
    let b = space.add_node(AtomType::ConceptNode, Some("b"), None).unwrap().id;
    let size_before = space.size();

    let l1 = space.add_link(AtomType::ListLink, vec![a, b], None).unwrap();
    let after_first = space.size();
    let l2 = space.add_link(AtomType::ListLink, vec![a, b], None).unwrap();
    let after_second = space.size();

    assert_eq!(l1.id, l2.id);
    assert_eq!(after_first, size_before + 1);
    assert_eq!(after_second, after_first);
}

// S4 — Incoming-set on remove.
#[tokio::test]
async fn s4_incoming_set_updates_on_remove() {
    let mut space = AtomSpace::new();
    let a = space.add_node(AtomType::ConceptNode, Some("a"), None).unwrap().id;
    let b = space.add_node(AtomType::ConceptNode, Some("b"), None).unwrap().id;
    let l = space.add_link(AtomType::ListLink, vec![a, b], None).unwrap();

    assert!(space.incoming_of(a).contains(&l.id));
    space.remove(l.id);
    assert!(!space.incoming_of(a).contains(&l.id));
}

// S5 — Scheduler priority.

/// Records the `label` from its parameters into a shared log on
/// completion, so the test can assert dispatch/completion order instead
/// of just final job state.
struct Recording {
    log: std::sync::Arc<TokioMutex<Vec<String>>>,
}
#[async_trait]
impl Plugin for Recording {
    fn name(&self) -> &str {
        "recording"
    }
    async fn execute(&self, _services: std::sync::Arc<CoreServices>, parameters: JsonValue) -> Result<JsonValue, String> {
        let label = parameters.get("label").and_then(|v| v.as_str()).unwrap_or("?").to_string();
        self.log.lock().await.push(label);
        Ok(json!({ "ok": true }))
    }
}

fn bare_services() -> CoreServices {
    CoreServices {
        graph: std::sync::Arc::new(TokioMutex::new(AtomSpace::new())),
        ecan: std::sync::Arc::new(TokioMutex::new(Ecan::with_seed(EcanConfig::default(), 1))),
        pln_config: std::sync::Arc::new(PlnConfig::default()),
    }
}

#[tokio::test]
async fn s5_jobs_of_equal_capacity_dispatch_highest_priority_first() {
    let mut config = SchedulerConfig::default();
    config.max_concurrent_jobs = 1;
    let scheduler = Scheduler::new(bare_services(), config);
    let log: std::sync::Arc<TokioMutex<Vec<String>>> = std::sync::Arc::new(TokioMutex::new(Vec::new()));
    scheduler
        .register_plugin("recording", std::sync::Arc::new(Recording { log: log.clone() }), 0, true)
        .await;

    let low = scheduler.enqueue("recording", json!({ "label": "low" }), 1, None, 0).await.unwrap();
    let mid = scheduler.enqueue("recording", json!({ "label": "mid" }), 2, None, 0).await.unwrap();
    let high = scheduler.enqueue("recording", json!({ "label": "high" }), 3, None, 0).await.unwrap();

    for _ in 0..3 {
        scheduler.tick().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    for id in [low, mid, high] {
        let snap = scheduler.job(id).await.unwrap();
        assert!(matches!(snap.state, cogcore::scheduler::JobState::Completed));
    }

    let order = log.lock().await.clone();
    assert_eq!(order, vec!["high".to_string(), "mid".to_string(), "low".to_string()]);
}

// S6 — Timeout.
struct NeverCompletes;
#[async_trait]
impl Plugin for NeverCompletes {
    fn name(&self) -> &str {
        "never"
    }
    async fn execute(&self, _services: std::sync::Arc<CoreServices>, _parameters: JsonValue) -> Result<JsonValue, String> {
        loop {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
    }
}

#[tokio::test]
async fn s6_job_exceeding_timeout_fails_within_small_multiple_of_deadline() {
    let scheduler = Scheduler::new(bare_services(), SchedulerConfig::default());
    scheduler
        .register_plugin("never", std::sync::Arc::new(NeverCompletes), 0, true)
        .await;
    let id = scheduler
        .enqueue("never", json!({}), 0, Some(Duration::from_millis(50)), 0)
        .await
        .unwrap();

    scheduler.tick().await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let snap = scheduler.job(id).await.unwrap();
    assert!(matches!(snap.state, cogcore::scheduler::JobState::Failed));
    assert!(snap.timed_out);
}
