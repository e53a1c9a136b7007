//! The graph store — indexed storage of nodes and links, incoming sets,
//! the attentional-focus set, and pattern query.
//!
//! All operations are O(1) amortised except `by_type`/`by_name` (O(result
//! size)), `query` (O(|graph|) worst case), and `remove` (O(arity +
//! |incoming(id)|)).

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::atom::{Atom, AtomExport, AtomId, AtomType, TruthValue};
use crate::error::{CoreError, CoreResult};

/// A conjunction of optional predicates; every supplied field must match.
#[derive(Debug, Clone, Default)]
pub struct QueryPattern {
    pub atom_type: Option<AtomType>,
    pub name: Option<String>,
    pub arity: Option<usize>,
}

impl QueryPattern {
    pub fn matches(&self, atom: &Atom) -> bool {
        if let Some(t) = self.atom_type {
            if atom.atom_type != t {
                return false;
            }
        }
        if let Some(ref n) = self.name {
            if atom.name.as_deref() != Some(n.as_str()) {
                return false;
            }
        }
        if let Some(a) = self.arity {
            if atom.arity() != a {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphStatistics {
    pub total: usize,
    pub node_count: usize,
    pub link_count: usize,
    pub type_distribution: Vec<(AtomType, usize)>,
    pub focus_size: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticCheck {
    pub name: String,
    pub passed: bool,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsReport {
    pub checks: Vec<DiagnosticCheck>,
    pub all_healthy: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphExport {
    pub atoms: Vec<AtomExport>,
    pub size: usize,
    pub timestamp: chrono::DateTime<Utc>,
}

/// The typed hypergraph knowledge store.
pub struct AtomSpace {
    atoms: HashMap<AtomId, Atom>,
    next_id: AtomId,
    node_index: HashMap<(AtomType, String), AtomId>,
    link_index: HashMap<(AtomType, Vec<AtomId>), AtomId>,
    name_index: HashMap<String, HashSet<AtomId>>,
    type_index: HashMap<AtomType, HashSet<AtomId>>,
    incoming: HashMap<AtomId, HashSet<AtomId>>,
    focus: HashSet<AtomId>,
}

impl Default for AtomSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomSpace {
    pub fn new() -> Self {
        Self {
            atoms: HashMap::new(),
            next_id: 1,
            node_index: HashMap::new(),
            link_index: HashMap::new(),
            name_index: HashMap::new(),
            type_index: HashMap::new(),
            incoming: HashMap::new(),
            focus: HashSet::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.atoms.len()
    }

    pub fn has(&self, id: AtomId) -> bool {
        self.atoms.contains_key(&id)
    }

    pub fn get(&self, id: AtomId) -> Option<&Atom> {
        self.atoms.get(&id)
    }

    pub fn get_mut(&mut self, id: AtomId) -> Option<&mut Atom> {
        self.atoms.get_mut(&id)
    }

    fn allocate_id(&mut self) -> AtomId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Add or retrieve a node. A supplied truth value on re-add overwrites
    /// unconditionally (per spec invariant 1); omit it to leave the
    /// existing atom's truth value untouched.
    pub fn add_node(
        &mut self,
        atom_type: AtomType,
        name: Option<&str>,
        tv: Option<TruthValue>,
    ) -> CoreResult<Atom> {
        if atom_type.is_link() {
            return Err(CoreError::InvalidArgument(format!(
                "{atom_type} is a link type, not a node type"
            )));
        }

        if let Some(name) = name {
            let key = Atom::node_key(atom_type, name);
            if let Some(&id) = self.node_index.get(&key) {
                if let Some(tv) = tv {
                    if let Some(atom) = self.atoms.get_mut(&id) {
                        atom.tv = tv;
                    }
                }
                return Ok(self.atoms[&id].clone());
            }

            let id = self.allocate_id();
            let atom = Atom::new_node(id, atom_type, Some(name), tv.unwrap_or_default());
            self.atoms.insert(id, atom.clone());
            self.node_index.insert(key, id);
            self.name_index.entry(name.to_string()).or_default().insert(id);
            self.type_index.entry(atom_type).or_default().insert(id);
            Ok(atom)
        } else {
            // Anonymous nodes are never structurally deduplicated.
            let id = self.allocate_id();
            let atom = Atom::new_node(id, atom_type, None, tv.unwrap_or_default());
            self.atoms.insert(id, atom.clone());
            self.type_index.entry(atom_type).or_default().insert(id);
            Ok(atom)
        }
    }

    /// Add or retrieve a link. Every id in `outgoing` must already exist
    /// in the graph, and `outgoing` must be non-empty (arity ≥ 1).
    pub fn add_link(
        &mut self,
        atom_type: AtomType,
        outgoing: Vec<AtomId>,
        tv: Option<TruthValue>,
    ) -> CoreResult<Atom> {
        if atom_type.is_node() {
            return Err(CoreError::InvalidArgument(format!(
                "{atom_type} is a node type, not a link type"
            )));
        }
        if outgoing.is_empty() {
            return Err(CoreError::InvalidArgument(
                "link outgoing sequence must be non-empty".to_string(),
            ));
        }
        for &target in &outgoing {
            if !self.atoms.contains_key(&target) {
                return Err(CoreError::InvalidArgument(format!(
                    "unknown-reference: outgoing atom {target} does not exist"
                )));
            }
        }

        let key = Atom::link_key(atom_type, &outgoing);
        if let Some(&id) = self.link_index.get(&key) {
            if let Some(tv) = tv {
                if let Some(atom) = self.atoms.get_mut(&id) {
                    atom.tv = tv;
                }
            }
            return Ok(self.atoms[&id].clone());
        }

        let id = self.allocate_id();
        let atom = Atom::new_link(id, atom_type, outgoing.clone(), tv.unwrap_or_default());
        self.atoms.insert(id, atom.clone());
        self.link_index.insert(key, id);
        self.type_index.entry(atom_type).or_default().insert(id);
        for target in outgoing {
            self.incoming.entry(target).or_default().insert(id);
        }
        Ok(atom)
    }

    pub fn find_node(&self, atom_type: AtomType, name: &str) -> Option<AtomId> {
        self.node_index.get(&Atom::node_key(atom_type, name)).copied()
    }

    pub fn find_link(&self, atom_type: AtomType, outgoing: &[AtomId]) -> Option<AtomId> {
        self.link_index.get(&Atom::link_key(atom_type, outgoing)).copied()
    }

    /// Removes an atom, pruning it out of the outgoing sequence of every
    /// link that referenced it (dangling-id pruning, `spec.md` §9.3). A
    /// link whose outgoing becomes empty as a result is itself removed,
    /// applied recursively. Returns whether `id` existed.
    pub fn remove(&mut self, id: AtomId) -> bool {
        if !self.atoms.contains_key(&id) {
            return false;
        }

        let mut queue = VecDeque::from([id]);
        let mut removed_any = false;

        while let Some(cur) = queue.pop_front() {
            let Some(atom) = self.atoms.remove(&cur) else {
                continue;
            };
            removed_any = true;

            if let Some(ref name) = atom.name {
                self.node_index.remove(&Atom::node_key(atom.atom_type, name));
                if let Some(set) = self.name_index.get_mut(name) {
                    set.remove(&cur);
                    if set.is_empty() {
                        self.name_index.remove(name);
                    }
                }
            }
            if atom.atom_type.is_link() {
                self.link_index.remove(&Atom::link_key(atom.atom_type, &atom.outgoing));
            }
            if let Some(set) = self.type_index.get_mut(&atom.atom_type) {
                set.remove(&cur);
            }
            self.focus.remove(&cur);

            // Atoms that referenced `cur` in their outgoing sequence.
            let referencers = self.incoming.remove(&cur).unwrap_or_default();

            // Unwire `cur` from the incoming sets of its own targets.
            for &target in &atom.outgoing {
                if let Some(set) = self.incoming.get_mut(&target) {
                    set.remove(&cur);
                }
            }

            for r in referencers {
                let Some(ratom) = self.atoms.get(&r) else { continue };
                let old_outgoing = ratom.outgoing.clone();
                let new_outgoing: Vec<AtomId> =
                    old_outgoing.iter().copied().filter(|&x| x != cur).collect();
                if new_outgoing.len() == old_outgoing.len() {
                    continue;
                }
                if new_outgoing.is_empty() {
                    debug!(atom = r, "cascading removal after dangling-id pruning emptied outgoing");
                    queue.push_back(r);
                    continue;
                }
                let rtype = ratom.atom_type;
                self.link_index.remove(&Atom::link_key(rtype, &old_outgoing));
                self.link_index.insert(Atom::link_key(rtype, &new_outgoing), r);
                if let Some(ratom_mut) = self.atoms.get_mut(&r) {
                    ratom_mut.outgoing = new_outgoing;
                }
            }
        }

        removed_any
    }

    pub fn by_type(&self, atom_type: AtomType) -> Vec<AtomId> {
        let mut ids: Vec<_> = self
            .type_index
            .get(&atom_type)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    pub fn by_name(&self, name: &str) -> Vec<AtomId> {
        let mut ids: Vec<_> = self
            .name_index
            .get(name)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    pub fn incoming_of(&self, id: AtomId) -> Vec<AtomId> {
        let mut ids: Vec<_> = self
            .incoming
            .get(&id)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    pub fn all(&self) -> Vec<AtomId> {
        let mut ids: Vec<_> = self.atoms.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn all_atoms(&self) -> Vec<&Atom> {
        let mut atoms: Vec<_> = self.atoms.values().collect();
        atoms.sort_by_key(|a| a.id);
        atoms
    }

    pub fn add_to_focus(&mut self, id: AtomId) -> CoreResult<()> {
        if !self.atoms.contains_key(&id) {
            return Err(CoreError::AtomNotFound(id));
        }
        self.focus.insert(id);
        Ok(())
    }

    pub fn remove_from_focus(&mut self, id: AtomId) {
        self.focus.remove(&id);
    }

    pub fn clear_focus(&mut self) {
        self.focus.clear();
    }

    pub fn is_in_focus(&self, id: AtomId) -> bool {
        self.focus.contains(&id)
    }

    pub fn focus_ids(&self) -> &HashSet<AtomId> {
        &self.focus
    }

    pub fn focus_size(&self) -> usize {
        self.focus.len()
    }

    /// Ordered (STI descending, id ascending as tiebreak) snapshot of the
    /// attentional-focus set.
    pub fn focus(&self) -> Vec<&Atom> {
        let mut atoms: Vec<_> = self.focus.iter().filter_map(|id| self.atoms.get(id)).collect();
        atoms.sort_by(|a, b| b.av.sti.cmp(&a.av.sti).then(a.id.cmp(&b.id)));
        atoms
    }

    pub fn query(&self, pattern: &QueryPattern) -> Vec<&Atom> {
        let mut atoms: Vec<_> = self.atoms.values().filter(|a| pattern.matches(a)).collect();
        atoms.sort_by_key(|a| a.id);
        atoms
    }

    pub fn statistics(&self) -> GraphStatistics {
        let node_count = self.atoms.values().filter(|a| a.atom_type.is_node()).count();
        let link_count = self.atoms.len() - node_count;
        let mut type_distribution: Vec<(AtomType, usize)> = self
            .type_index
            .iter()
            .map(|(&t, ids)| (t, ids.len()))
            .filter(|(_, c)| *c > 0)
            .collect();
        type_distribution.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| format!("{:?}", a.0).cmp(&format!("{:?}", b.0))));
        GraphStatistics {
            total: self.atoms.len(),
            node_count,
            link_count,
            type_distribution,
            focus_size: self.focus.len(),
        }
    }

    /// Structural health checks: truth-value validity, orphan references,
    /// type diversity, self-inheritance loops. Grounded on the teacher's
    /// `tikkun` self-repair diagnostics.
    pub fn diagnostics(&self) -> DiagnosticsReport {
        let mut checks = Vec::new();

        let count = self.size();
        checks.push(DiagnosticCheck {
            name: "atoms>0".into(),
            passed: count > 0,
            detail: Some(format!("{count} atoms")),
        });

        let invalid_tvs = self
            .atoms
            .values()
            .filter(|a| !(0.0..=1.0).contains(&a.tv.strength) || !(0.0..=1.0).contains(&a.tv.confidence))
            .count();
        checks.push(DiagnosticCheck {
            name: "tvs-valid".into(),
            passed: invalid_tvs == 0,
            detail: (invalid_tvs > 0).then(|| format!("{invalid_tvs} invalid")),
        });

        let orphans: usize = self
            .atoms
            .values()
            .filter(|a| a.atom_type.is_link())
            .flat_map(|a| &a.outgoing)
            .filter(|id| !self.atoms.contains_key(id))
            .count();
        checks.push(DiagnosticCheck {
            name: "no-orphans".into(),
            passed: orphans == 0,
            detail: (orphans > 0).then(|| format!("{orphans} orphan refs")),
        });

        let types = self.statistics().type_distribution.len();
        checks.push(DiagnosticCheck {
            name: "has-types".into(),
            passed: types >= 1,
            detail: Some(format!("{types} types")),
        });

        let self_loops = self
            .atoms
            .values()
            .filter(|a| a.atom_type.is_link() && a.outgoing.len() == 2 && a.outgoing[0] == a.outgoing[1])
            .count();
        checks.push(DiagnosticCheck {
            name: "no-self-inherit".into(),
            passed: self_loops == 0,
            detail: (self_loops > 0).then(|| format!("{self_loops} self-loops")),
        });

        let incoming_consistent = self.atoms.values().all(|a| {
            a.outgoing
                .iter()
                .all(|target| self.incoming.get(target).map(|s| s.contains(&a.id)).unwrap_or(false))
        });
        checks.push(DiagnosticCheck {
            name: "incoming-consistent".into(),
            passed: incoming_consistent,
            detail: None,
        });

        let all_healthy = checks.iter().all(|c| c.passed);
        DiagnosticsReport { checks, all_healthy }
    }

    /// Two-pass export/import per `spec.md` §6: create all atoms by id,
    /// then re-link outgoing references. Unknown ids in `outgoing` are
    /// dropped silently during import.
    pub fn export(&self) -> GraphExport {
        let mut atoms: Vec<AtomExport> = self.atoms.values().map(AtomExport::from).collect();
        atoms.sort_by_key(|a| a.id);
        GraphExport {
            size: atoms.len(),
            atoms,
            timestamp: Utc::now(),
        }
    }

    pub fn import(export: GraphExport) -> Self {
        let mut space = Self::new();
        let known_ids: HashSet<AtomId> = export.atoms.iter().map(|a| a.id).collect();

        // Pass 1: create all atoms by id.
        for a in &export.atoms {
            let atom = Atom {
                id: a.id,
                atom_type: a.atom_type,
                name: a.name.clone(),
                outgoing: Vec::new(),
                tv: a.tv,
                av: a.av,
                metadata: HashMap::new(),
                created_at: a.timestamp,
            };
            if let Some(ref name) = atom.name {
                space.node_index.insert(Atom::node_key(atom.atom_type, name), atom.id);
                space.name_index.entry(name.clone()).or_default().insert(atom.id);
            }
            space.type_index.entry(atom.atom_type).or_default().insert(atom.id);
            space.next_id = space.next_id.max(atom.id + 1);
            space.atoms.insert(atom.id, atom);
        }

        // Pass 2: re-link outgoing references, dropping unknown ids.
        for a in &export.atoms {
            if a.outgoing.is_empty() {
                continue;
            }
            let outgoing: Vec<AtomId> = a.outgoing.iter().copied().filter(|id| known_ids.contains(id)).collect();
            if outgoing.is_empty() {
                continue;
            }
            for &target in &outgoing {
                space.incoming.entry(target).or_default().insert(a.id);
            }
            space.link_index.insert(Atom::link_key(a.atom_type, &outgoing), a.id);
            if let Some(atom) = space.atoms.get_mut(&a.id) {
                atom.outgoing = outgoing;
            }
        }

        space
    }
}
