//! cogcore — a typed hypergraph knowledge store, an economic
//! attention-allocation engine (ECAN), a probabilistic inference engine
//! (PLN), and a plugin scheduler ("CogServer"), wired together behind a
//! single [`Core`] facade.
//!
//! Each module stands on its own (`atom`, `atomspace`, `ecan`, `pln`,
//! `scheduler`); `Core` is the composition root a caller reaches for when
//! it wants the four subsystems sharing one graph. Hosting concerns —
//! HTTP routing, conversation-id multiplexing, natural-language parsing,
//! persistence — are out of scope; see `DESIGN.md`.

pub mod atom;
pub mod atomspace;
pub mod ecan;
pub mod error;
pub mod pln;
pub mod scheduler;

use std::sync::Arc;

use tokio::sync::Mutex;

use atomspace::AtomSpace;
use ecan::{CycleReport, Ecan, EcanConfig};
use error::CoreResult;
use pln::{InferRunResult, PlnConfig};
use scheduler::{CoreServices, Scheduler, SchedulerConfig};

/// Every tunable exposed by the three engines, constructor-time per
/// `spec.md` §6 ("Configuration"). `Default` matches the Glossary.
#[derive(Debug, Clone, Default)]
pub struct CoreConfig {
    pub ecan: EcanConfig,
    pub pln: PlnConfig,
    pub scheduler: SchedulerConfig,
}

/// One cognitive instance: a graph plus its ECAN, PLN, and scheduler.
/// `spec.md` §9 — no process-wide cognitive state; a caller hosting many
/// conversations constructs one `Core` per conversation id and discards
/// it on shutdown.
pub struct Core {
    graph: Arc<Mutex<AtomSpace>>,
    ecan: Arc<Mutex<Ecan>>,
    pln_config: Arc<PlnConfig>,
    scheduler: Scheduler,
}

impl Core {
    pub async fn new(config: CoreConfig) -> Self {
        Self::with_ecan(Ecan::new(config.ecan), config.pln, config.scheduler).await
    }

    /// Construct with a caller-supplied `Ecan` (e.g. `Ecan::with_seed` for
    /// deterministic tests of the probabilistic phases).
    pub async fn with_ecan(ecan: Ecan, pln_config: PlnConfig, scheduler_config: SchedulerConfig) -> Self {
        let graph = Arc::new(Mutex::new(AtomSpace::new()));
        let ecan = Arc::new(Mutex::new(ecan));
        let pln_config = Arc::new(pln_config);
        let services = CoreServices {
            graph: graph.clone(),
            ecan: ecan.clone(),
            pln_config: pln_config.clone(),
        };
        let scheduler = Scheduler::with_builtin_plugins(services, scheduler_config).await;
        Self {
            graph,
            ecan,
            pln_config,
            scheduler,
        }
    }

    pub fn graph(&self) -> Arc<Mutex<AtomSpace>> {
        self.graph.clone()
    }

    pub fn ecan(&self) -> Arc<Mutex<Ecan>> {
        self.ecan.clone()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Runs one ECAN cycle directly, bypassing the scheduler queue.
    pub async fn run_ecan_cycle(&self) -> CycleReport {
        let mut graph = self.graph.lock().await;
        let mut ecan = self.ecan.lock().await;
        ecan.run_cycle(&mut graph)
    }

    /// Runs PLN inference directly, bypassing the scheduler queue.
    pub async fn run_inference(&self, max_iterations: u32) -> InferRunResult {
        let mut graph = self.graph.lock().await;
        pln::infer(&mut graph, &self.pln_config, max_iterations)
    }

    pub async fn shutdown(&self) {
        self.scheduler.stop().await;
    }
}

/// Categorical knowledge shapes a caller adds without hand-constructing
/// atom types itself (`spec.md` §9, "Dynamic dispatch of knowledge
/// encoding") — a tagged variant dispatching to a small set of
/// constructors, not a polymorphic class hierarchy. Free-text parsing of
/// "subject predicate object" strings stays a caller concern; this takes
/// already-structured triples.
pub enum Knowledge<'a> {
    Concept { name: &'a str, tv: Option<atom::TruthValue> },
    Fact { predicate: &'a str, subject: &'a str, object: &'a str, tv: Option<atom::TruthValue> },
    Rule { antecedent: &'a str, consequent: &'a str, tv: Option<atom::TruthValue> },
    Goal { name: &'a str, tv: Option<atom::TruthValue> },
    Procedure { name: &'a str, tv: Option<atom::TruthValue> },
}

impl Core {
    /// Dispatches a [`Knowledge`] variant to its atom-type construction
    /// and returns the id of the resulting top-level atom.
    pub async fn add_knowledge(&self, knowledge: Knowledge<'_>) -> CoreResult<atom::AtomId> {
        use atom::AtomType;
        let mut graph = self.graph.lock().await;
        match knowledge {
            Knowledge::Concept { name, tv } => Ok(graph.add_node(AtomType::ConceptNode, Some(name), tv)?.id),
            Knowledge::Fact { predicate, subject, object, tv } => {
                let pred = graph.add_node(AtomType::PredicateNode, Some(predicate), None)?.id;
                let subj = graph.add_node(AtomType::ConceptNode, Some(subject), None)?.id;
                let obj = graph.add_node(AtomType::ConceptNode, Some(object), None)?.id;
                let list = graph.add_link(AtomType::ListLink, vec![subj, obj], None)?.id;
                Ok(graph.add_link(AtomType::EvaluationLink, vec![pred, list], tv)?.id)
            }
            Knowledge::Rule { antecedent, consequent, tv } => {
                let a = graph.add_node(AtomType::ConceptNode, Some(antecedent), None)?.id;
                let b = graph.add_node(AtomType::ConceptNode, Some(consequent), None)?.id;
                Ok(graph.add_link(AtomType::ImplicationLink, vec![a, b], tv)?.id)
            }
            Knowledge::Goal { name, tv } => Ok(graph.add_node(AtomType::GoalNode, Some(name), tv)?.id),
            Knowledge::Procedure { name, tv } => Ok(graph.add_node(AtomType::ProcedureNode, Some(name), tv)?.id),
        }
    }
}
