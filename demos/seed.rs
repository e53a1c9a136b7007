//! A small runnable demonstration of a wired-together `Core`: build a toy
//! concept ontology, drive one ECAN cycle, then one PLN inference pass.
//!
//! Not part of the core's contract (`spec.md` §9 — the core has no
//! hosting application); callers here type structured commands, never
//! free text, since NL parsing is an explicit Non-goal.

use cogcore::atom::TruthValue;
use cogcore::ecan::EcanConfig;
use cogcore::{Core, CoreConfig, Knowledge};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let core = Core::new(CoreConfig {
        ecan: EcanConfig::default(),
        ..CoreConfig::default()
    })
    .await;

    let loaded = load_toy_ontology(&core).await;
    println!("\u{25c8} cogcore seed demo");
    println!("  {loaded} atoms loaded from toy ontology.");
    {
        let graph = core.graph().lock().await;
        println!("  AtomSpace: {} total atoms", graph.size());
    }

    for (name, amount) in [("cat", 40), ("mammal", 25), ("animal", 10)] {
        let id = core
            .add_knowledge(Knowledge::Concept { name, tv: None })
            .await
            .unwrap();
        let mut ecan = core.ecan().lock().await;
        let mut graph = core.graph().lock().await;
        ecan.stimulate(&mut graph, id, amount).unwrap();
    }

    let cycle = core.run_ecan_cycle().await;
    println!(
        "\n\u{2605} ECAN cycle {} \u{2014} rent {}, decay {}, focus {:?}",
        cycle.cycles_run, cycle.rent_collected, cycle.decay_collected, cycle.new_focus
    );

    let run = core.run_inference(5).await;
    println!(
        "\n\u{2295} PLN inference \u{2014} {} iterations, {} new edges",
        run.iterations, run.total_inferences
    );
    for result in &run.results {
        if result.is_new {
            println!("  {} \u{2192} conclusion {} {}", result.rule, result.conclusion, result.tv);
        }
    }

    core.shutdown().await;
}

/// Biological taxonomy, grounded in the teacher's own seed ontology but
/// trimmed to what this demo exercises.
async fn load_toy_ontology(core: &Core) -> usize {
    let concepts: &[(&str, f64, f64)] = &[
        ("thing", 0.99, 0.99),
        ("animal", 0.95, 0.90),
        ("mammal", 0.95, 0.90),
        ("bird", 0.95, 0.90),
        ("cat", 0.90, 0.85),
        ("eagle", 0.90, 0.85),
    ];
    for &(name, s, c) in concepts {
        core.add_knowledge(Knowledge::Concept { name, tv: Some(TruthValue::new(s, c)) })
            .await
            .unwrap();
    }

    let links: &[(&str, &str, f64, f64)] = &[
        ("animal", "thing", 0.99, 0.95),
        ("mammal", "animal", 0.95, 0.90),
        ("bird", "animal", 0.95, 0.90),
        ("cat", "mammal", 0.95, 0.90),
        ("eagle", "bird", 0.95, 0.90),
    ];
    for &(antecedent, consequent, s, c) in links {
        core.add_knowledge(Knowledge::Rule {
            antecedent,
            consequent,
            tv: Some(TruthValue::new(s, c)),
        })
        .await
        .unwrap();
    }

    let graph = core.graph().lock().await;
    graph.size()
}
