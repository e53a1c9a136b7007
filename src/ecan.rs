//! ECAN — the Economic Attention Network.
//!
//! Treats short-term importance (STI) as a conserved quantity: rent and
//! decay move STI between atoms and an internal pool; spreading is
//! internal-only (it never touches the pool); forgetting removes atoms
//! outright and re-credits their STI to the pool. One `run_cycle` call
//! executes the six phases of `spec.md` §4.C in order.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, trace};

use crate::atom::{AtomId, AtomType, TruthValue};
use crate::atomspace::AtomSpace;
use crate::error::CoreResult;

#[derive(Debug, Clone)]
pub struct EcanConfig {
    pub max_af: usize,
    pub min_sti: i64,
    pub max_sti: i64,
    pub rent_amount: i64,
    pub decay_rate: f64,
    pub diffusion_rate: f64,
    pub spread_probability: f64,
    pub hebbian_learning_rate: f64,
    pub initial_sti_pool: i64,
    pub initial_lti_pool: i64,
}

impl Default for EcanConfig {
    fn default() -> Self {
        Self {
            max_af: 100,
            min_sti: -1000,
            max_sti: 1000,
            rent_amount: 1,
            decay_rate: 0.01,
            diffusion_rate: 0.2,
            spread_probability: 0.1,
            hebbian_learning_rate: 0.1,
            initial_sti_pool: 10_000,
            initial_lti_pool: 10_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub rent_collected: i64,
    pub decay_collected: i64,
    pub spread_transfers: usize,
    pub new_focus: Vec<AtomId>,
    pub forgotten: Vec<AtomId>,
    pub sti_pool: i64,
    pub lti_pool: i64,
    pub cycles_run: u64,
    pub avg_focus_size: f64,
}

/// The attention-allocation engine. Owns the STI/LTI pools and the RNG
/// driving the probabilistic spreading and forgetting phases.
pub struct Ecan {
    config: EcanConfig,
    sti_pool: i64,
    lti_pool: i64,
    rng: StdRng,
    cycles_run: u64,
    avg_focus_size: f64,
}

impl Ecan {
    pub fn new(config: EcanConfig) -> Self {
        let sti_pool = config.initial_sti_pool;
        let lti_pool = config.initial_lti_pool;
        Self {
            config,
            sti_pool,
            lti_pool,
            rng: StdRng::from_entropy(),
            cycles_run: 0,
            avg_focus_size: 0.0,
        }
    }

    /// Construct with a caller-supplied RNG seed, for deterministic tests
    /// of the probabilistic spreading/forgetting phases.
    pub fn with_seed(config: EcanConfig, seed: u64) -> Self {
        let sti_pool = config.initial_sti_pool;
        let lti_pool = config.initial_lti_pool;
        Self {
            config,
            sti_pool,
            lti_pool,
            rng: StdRng::seed_from_u64(seed),
            cycles_run: 0,
            avg_focus_size: 0.0,
        }
    }

    pub fn config(&self) -> &EcanConfig {
        &self.config
    }

    pub fn sti_pool(&self) -> i64 {
        self.sti_pool
    }

    pub fn lti_pool(&self) -> i64 {
        self.lti_pool
    }

    pub fn cycles_run(&self) -> u64 {
        self.cycles_run
    }

    fn clamp_sti(&self, sti: i64) -> i64 {
        sti.clamp(self.config.min_sti, self.config.max_sti)
    }

    /// Adds `amount` to the target's STI, clamped at `maxSTI` (and, per
    /// invariant 4, at `minSTI`). Deducts `amount` from the pool, clamped
    /// at 0.
    pub fn stimulate(&mut self, space: &mut AtomSpace, id: AtomId, amount: i64) -> CoreResult<i64> {
        let atom = space.get_mut(id).ok_or(crate::error::CoreError::AtomNotFound(id))?;
        let new_sti = self.clamp_sti(atom.av.sti + amount);
        atom.av.sti = new_sti;
        self.sti_pool = (self.sti_pool - amount).max(0);
        Ok(new_sti)
    }

    /// Ensures a `HebbianLink` exists between `a` and `b` (order is
    /// unordered for this link type) and strengthens it: strength moves
    /// proportionally toward 1 by `hebbianLearningRate`; confidence rises
    /// by a flat `0.1 * hebbianLearningRate`.
    pub fn hebbian(&mut self, space: &mut AtomSpace, a: AtomId, b: AtomId) -> CoreResult<AtomId> {
        let existing = space
            .find_link(AtomType::HebbianLink, &[a, b])
            .or_else(|| space.find_link(AtomType::HebbianLink, &[b, a]));

        let id = match existing {
            Some(id) => id,
            None => space.add_link(AtomType::HebbianLink, vec![a, b], Some(TruthValue::new(0.0, 0.0)))?.id,
        };

        let atom = space.get_mut(id).expect("hebbian link just created or found");
        let rate = self.config.hebbian_learning_rate;
        let new_strength = atom.tv.strength + rate * (1.0 - atom.tv.strength);
        let new_confidence = atom.tv.confidence + 0.1 * rate;
        atom.tv = TruthValue::new(new_strength, new_confidence);
        Ok(id)
    }

    /// Runs one ECAN cycle: rent, decay, spreading, focus update,
    /// forgetting, statistics. Per-atom errors are swallowed — a single
    /// bad atom never aborts the cycle.
    pub fn run_cycle(&mut self, space: &mut AtomSpace) -> CycleReport {
        let mut report = CycleReport::default();

        self.phase_rent(space, &mut report);
        self.phase_decay(space, &mut report);
        self.phase_spreading(space, &mut report);
        self.phase_focus_update(space, &mut report);
        self.phase_forgetting(space, &mut report);

        self.cycles_run += 1;
        let n = self.cycles_run as f64;
        self.avg_focus_size += (report.new_focus.len() as f64 - self.avg_focus_size) / n;

        report.sti_pool = self.sti_pool;
        report.lti_pool = self.lti_pool;
        report.cycles_run = self.cycles_run;
        report.avg_focus_size = self.avg_focus_size;
        report
    }

    fn phase_rent(&mut self, space: &mut AtomSpace, report: &mut CycleReport) {
        let focus_ids: Vec<AtomId> = space.focus_ids().iter().copied().collect();
        for id in focus_ids {
            let Some(atom) = space.get_mut(id) else { continue };
            let before = atom.av.sti;
            let after = self.clamp_sti(before - self.config.rent_amount);
            atom.av.sti = after;
            let collected = before - after;
            self.sti_pool += collected;
            report.rent_collected += collected;
        }
    }

    fn phase_decay(&mut self, space: &mut AtomSpace, report: &mut CycleReport) {
        for id in space.all() {
            let Some(atom) = space.get_mut(id) else { continue };
            if atom.av.sti <= 0 {
                continue;
            }
            let delta = ((atom.av.sti as f64) * self.config.decay_rate).trunc() as i64;
            if delta == 0 {
                continue;
            }
            atom.av.sti = self.clamp_sti(atom.av.sti - delta);
            self.sti_pool += delta;
            report.decay_collected += delta;
        }
    }

    fn phase_spreading(&mut self, space: &mut AtomSpace, report: &mut CycleReport) {
        let focus_ids: Vec<AtomId> = space.focus_ids().iter().copied().collect();
        for id in focus_ids {
            let Some(atom) = space.get(id) else { continue };
            let sti = atom.av.sti;
            if sti <= 2 * self.config.min_sti {
                continue;
            }
            let budget = sti as f64 * self.config.diffusion_rate;
            if budget < 1.0 {
                continue;
            }
            let is_link = atom.atom_type.is_link();
            let outgoing = atom.outgoing.clone();
            let mut neighbours: HashSet<AtomId> = space.incoming_of(id).into_iter().collect();
            if is_link {
                neighbours.extend(outgoing);
            }
            if neighbours.is_empty() {
                continue;
            }
            let per = budget / neighbours.len() as f64;
            let mut total_sent = 0i64;
            let mut neighbour_ids: Vec<AtomId> = neighbours.into_iter().collect();
            neighbour_ids.sort_unstable();
            for nb in neighbour_ids {
                if !self.rng.gen_bool(self.config.spread_probability) {
                    continue;
                }
                let amount = per.round() as i64;
                if amount == 0 {
                    continue;
                }
                if let Some(receiver) = space.get_mut(nb) {
                    receiver.av.sti = self.clamp_sti(receiver.av.sti + amount);
                }
                total_sent += amount;
                report.spread_transfers += 1;
            }
            if total_sent != 0 {
                if let Some(source) = space.get_mut(id) {
                    source.av.sti = self.clamp_sti(source.av.sti - total_sent);
                }
            }
        }
    }

    fn phase_focus_update(&mut self, space: &mut AtomSpace, report: &mut CycleReport) {
        space.clear_focus();
        let min_sti = self.config.min_sti;
        let mut candidates: Vec<(AtomId, i64)> = space
            .all_atoms()
            .into_iter()
            .filter(|a| a.av.sti >= min_sti)
            .map(|a| (a.id, a.av.sti))
            .collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        candidates.truncate(self.config.max_af);
        for (id, _) in &candidates {
            let _ = space.add_to_focus(*id);
        }
        report.new_focus = candidates.into_iter().map(|(id, _)| id).collect();
    }

    fn phase_forgetting(&mut self, space: &mut AtomSpace, report: &mut CycleReport) {
        let threshold = 2 * self.config.min_sti;
        let candidates: Vec<AtomId> = space
            .all_atoms()
            .into_iter()
            .filter(|a| a.av.lti == 0 && !a.av.vlti && a.av.sti < threshold)
            .map(|a| a.id)
            .collect();

        for id in candidates {
            if !self.rng.gen_bool(0.1) {
                continue;
            }
            let Some(atom) = space.get(id) else { continue };
            let sti = atom.av.sti;
            if space.remove(id) {
                self.sti_pool += sti.max(0);
                report.forgotten.push(id);
                trace!(atom = id, "forgotten by ECAN");
            }
        }
        if !report.forgotten.is_empty() {
            debug!(count = report.forgotten.len(), "ECAN forgetting pass removed atoms");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::AtomType;

    fn seeded(config: EcanConfig) -> Ecan {
        Ecan::with_seed(config, 7)
    }

    #[test]
    fn stimulate_by_zero_leaves_sti_unchanged() {
        let mut space = AtomSpace::new();
        let a = space.add_node(AtomType::ConceptNode, Some("a"), None).unwrap().id;
        let mut ecan = seeded(EcanConfig::default());
        ecan.stimulate(&mut space, a, 0).unwrap();
        assert_eq!(space.get(a).unwrap().av.sti, 0);
    }

    #[test]
    fn stimulate_huge_amount_clamps_at_max_sti() {
        let mut space = AtomSpace::new();
        let a = space.add_node(AtomType::ConceptNode, Some("a"), None).unwrap().id;
        let mut ecan = seeded(EcanConfig::default());
        ecan.stimulate(&mut space, a, 1_000_000).unwrap();
        assert_eq!(space.get(a).unwrap().av.sti, ecan.config().max_sti);
    }

    #[test]
    fn focus_cap_keeps_only_top_n() {
        let mut space = AtomSpace::new();
        let mut ecan = seeded(EcanConfig {
            max_af: 3,
            ..EcanConfig::default()
        });
        let ids: Vec<AtomId> = (0..5)
            .map(|i| space.add_node(AtomType::ConceptNode, Some(&format!("c{i}")), None).unwrap().id)
            .collect();
        let amounts = [10, 20, 30, 40, 50];
        for (id, amount) in ids.iter().zip(amounts.iter()) {
            ecan.stimulate(&mut space, *id, *amount).unwrap();
        }
        ecan.run_cycle(&mut space);
        assert!(space.focus_ids().len() <= 3);
        for id in space.focus_ids() {
            assert!(space.get(*id).unwrap().av.sti >= ecan.config().min_sti);
        }
    }

    #[test]
    fn sti_always_within_bounds_after_cycle() {
        let mut space = AtomSpace::new();
        let mut ecan = seeded(EcanConfig::default());
        let a = space.add_node(AtomType::ConceptNode, Some("a"), None).unwrap().id;
        ecan.stimulate(&mut space, a, 5000).unwrap();
        for _ in 0..10 {
            ecan.run_cycle(&mut space);
            for id in space.all() {
                if let Some(atom) = space.get(id) {
                    assert!(atom.av.sti >= ecan.config().min_sti);
                    assert!(atom.av.sti <= ecan.config().max_sti);
                }
            }
        }
    }

    #[test]
    fn hebbian_link_strengthens_toward_one() {
        let mut space = AtomSpace::new();
        let mut ecan = seeded(EcanConfig::default());
        let a = space.add_node(AtomType::ConceptNode, Some("a"), None).unwrap().id;
        let b = space.add_node(AtomType::ConceptNode, Some("b"), None).unwrap().id;
        let id1 = ecan.hebbian(&mut space, a, b).unwrap();
        let s1 = space.get(id1).unwrap().tv.strength;
        ecan.hebbian(&mut space, b, a).unwrap();
        let s2 = space.get(id1).unwrap().tv.strength;
        assert!(s2 > s1);
    }
}
