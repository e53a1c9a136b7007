//! Atom & value types — immutable identity, mutable truth/attention values.
//!
//! An atom is either a *node* (arity 0, optional name) or a *link* (arity
//! ≥ 1, an ordered sequence of outgoing atom references). Equality of
//! atoms is by identifier; structural de-duplication in the graph store
//! keys nodes on `(type, name)` and links on `(type, outgoing)`.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub type AtomId = u64;

/// The closed set of atom type tags. The wire-contract string for each
/// variant is its `Display`/`serde` name, matching `spec.md` §6 exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AtomType {
    // Nodes
    ConceptNode,
    PredicateNode,
    SchemaNode,
    ProcedureNode,
    GroundedPredicateNode,
    GroundedSchemaNode,
    VariableNode,
    TypedVariableNode,
    NumberNode,
    WordNode,
    DocumentNode,
    SentenceNode,
    PhraseNode,
    AnchorNode,
    TypeNode,
    TypeInhNode,
    ContextNode,
    TimeNode,
    TemporalNode,
    GoalNode,
    PlanNode,
    ActionNode,
    TaskNode,
    AgentNode,
    CognitiveProcessNode,
    EpisodicMemoryNode,
    SemanticMemoryNode,
    WorkingMemoryNode,
    RewardNode,
    MotivationNode,
    PLNRuleNode,
    PLNFormulaNode,
    PatternNode,

    // Links
    ListLink,
    SetLink,
    MemberLink,
    InheritanceLink,
    SimilarityLink,
    SubsetLink,
    AndLink,
    OrLink,
    NotLink,
    ImplicationLink,
    EquivalenceLink,
    EvaluationLink,
    ExecutionLink,
    ForAllLink,
    ExistsLink,
    AtTimeLink,
    BeforeLink,
    AfterLink,
    DuringLink,
    AtLocationLink,
    ContextLink,
    BindLink,
    GetLink,
    SatisfyLink,
    PlusLink,
    MinusLink,
    TimesLink,
    DivideLink,
    CondLink,
    ReferenceLink,
    AssociativeLink,
    SequentialLink,
    HebbianLink,
    AsymmetricHebbianLink,
    SymmetricHebbianLink,
    AttentionLink,
    EconomicLink,
    PatternLink,
    FrequentPatternLink,
    LearningLink,
    FeedbackLink,
}

impl AtomType {
    /// Nodes have arity 0; links have arity ≥ 1.
    pub fn is_node(self) -> bool {
        !self.is_link()
    }

    pub fn is_link(self) -> bool {
        use AtomType::*;
        !matches!(
            self,
            ConceptNode
                | PredicateNode
                | SchemaNode
                | ProcedureNode
                | GroundedPredicateNode
                | GroundedSchemaNode
                | VariableNode
                | TypedVariableNode
                | NumberNode
                | WordNode
                | DocumentNode
                | SentenceNode
                | PhraseNode
                | AnchorNode
                | TypeNode
                | TypeInhNode
                | ContextNode
                | TimeNode
                | TemporalNode
                | GoalNode
                | PlanNode
                | ActionNode
                | TaskNode
                | AgentNode
                | CognitiveProcessNode
                | EpisodicMemoryNode
                | SemanticMemoryNode
                | WorkingMemoryNode
                | RewardNode
                | MotivationNode
                | PLNRuleNode
                | PLNFormulaNode
                | PatternNode
        )
    }
}

impl fmt::Display for AtomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// `(strength, confidence)`, both clamped to `[0, 1]` on assignment.
/// `confidence == 0` is "vacuous" — the strength carries no evidential
/// weight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TruthValue {
    pub strength: f64,
    pub confidence: f64,
}

impl TruthValue {
    pub fn new(strength: f64, confidence: f64) -> Self {
        Self {
            strength: strength.clamp(0.0, 1.0),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn is_vacuous(&self) -> bool {
        self.confidence == 0.0
    }
}

impl Default for TruthValue {
    fn default() -> Self {
        Self::new(0.5, 0.0)
    }
}

impl fmt::Display for TruthValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3})", self.strength, self.confidence)
    }
}

/// `(STI, LTI, VLTI)`. STI is signed and bounded by `[minSTI, maxSTI]`;
/// LTI is non-negative; VLTI is a sticky boolean that protects an atom
/// from ECAN forgetting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttentionValue {
    pub sti: i64,
    pub lti: i64,
    pub vlti: bool,
}

impl AttentionValue {
    pub fn new(sti: i64, lti: i64, vlti: bool) -> Self {
        Self {
            sti,
            lti: lti.max(0),
            vlti,
        }
    }
}

impl Default for AttentionValue {
    fn default() -> Self {
        Self {
            sti: 0,
            lti: 0,
            vlti: false,
        }
    }
}

/// A single atom in the hypergraph. Only `tv`, `av`, and `metadata` are
/// mutable after creation — identity, type, name, and outgoing sequence
/// are fixed for the atom's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Atom {
    pub id: AtomId,
    pub atom_type: AtomType,
    pub name: Option<String>,
    pub outgoing: Vec<AtomId>,
    pub tv: TruthValue,
    pub av: AttentionValue,
    pub metadata: HashMap<String, JsonValue>,
    pub created_at: DateTime<Utc>,
}

impl Atom {
    pub fn new_node(id: AtomId, atom_type: AtomType, name: Option<&str>, tv: TruthValue) -> Self {
        Self {
            id,
            atom_type,
            name: name.map(|n| n.to_string()),
            outgoing: Vec::new(),
            tv,
            av: AttentionValue::default(),
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn new_link(id: AtomId, atom_type: AtomType, outgoing: Vec<AtomId>, tv: TruthValue) -> Self {
        Self {
            id,
            atom_type,
            name: None,
            outgoing,
            tv,
            av: AttentionValue::default(),
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn arity(&self) -> usize {
        self.outgoing.len()
    }

    /// The structural de-duplication key for a node: `(type, name)`.
    pub fn node_key(atom_type: AtomType, name: &str) -> (AtomType, String) {
        (atom_type, name.to_string())
    }

    /// The structural de-duplication key for a link: `(type, outgoing)`.
    pub fn link_key(atom_type: AtomType, outgoing: &[AtomId]) -> (AtomType, Vec<AtomId>) {
        (atom_type, outgoing.to_vec())
    }
}

/// Wire form of an atom, per `spec.md` §6: `{id, type, name, outgoing,
/// tv, av, timestamp}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtomExport {
    pub id: AtomId,
    #[serde(rename = "type")]
    pub atom_type: AtomType,
    pub name: Option<String>,
    pub outgoing: Vec<AtomId>,
    pub tv: TruthValue,
    pub av: AttentionValue,
    pub timestamp: DateTime<Utc>,
}

impl From<&Atom> for AtomExport {
    fn from(atom: &Atom) -> Self {
        Self {
            id: atom.id,
            atom_type: atom.atom_type,
            name: atom.name.clone(),
            outgoing: atom.outgoing.clone(),
            tv: atom.tv,
            av: atom.av,
            timestamp: atom.created_at,
        }
    }
}
