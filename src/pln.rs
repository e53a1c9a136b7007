//! PLN — Probabilistic Logic Networks.
//!
//! A small registry of forward-chaining inference rules over
//! `ImplicationLink`/`EvaluationLink` edges. Each rule enumerates
//! candidate conclusions from *all* ordered premise pairs matching its
//! pattern (`spec.md` §9.2 resolves the reference's half-enumeration as a
//! bug: both `(i, j)` and `(j, i)` are checked).

use serde::Serialize;
use tracing::debug;

use crate::atom::{AtomId, AtomType, TruthValue};
use crate::atomspace::AtomSpace;

#[derive(Debug, Clone)]
pub struct PlnConfig {
    pub min_confidence: f64,
    pub strength_threshold: f64,
    /// Reserved: not yet used to bound chain length, exposed for forward
    /// compatibility per `spec.md` §4.D.
    pub max_inference_depth: u32,
    pub revision_inflation_factor: f64,
    pub default_strength: f64,
    pub default_confidence: f64,
    /// `spec.md` §9.1: the reference overwrites a pre-existing identical
    /// conclusion edge's truth value. Set to `false` to apply the
    /// Revision formula instead (the spec's suggested stricter mode).
    pub overwrite_on_conflict: bool,
}

impl Default for PlnConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.01,
            strength_threshold: 0.1,
            max_inference_depth: 10,
            revision_inflation_factor: 1.2,
            default_strength: 0.5,
            default_confidence: 0.0,
            overwrite_on_conflict: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InferenceResult {
    pub rule: String,
    pub premises: Vec<AtomId>,
    pub conclusion: AtomId,
    pub tv: TruthValue,
    pub is_new: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct InferRunResult {
    pub results: Vec<InferenceResult>,
    pub iterations: u32,
    pub total_inferences: usize,
}

struct Candidate {
    rule: &'static str,
    premises: Vec<AtomId>,
    link_type: AtomType,
    outgoing: Vec<AtomId>,
    tv: TruthValue,
}

/// Same middle term: same atom id, or — for nodes — equal `(type, name)`.
fn same_referent(space: &AtomSpace, x: AtomId, y: AtomId) -> bool {
    if x == y {
        return true;
    }
    match (space.get(x), space.get(y)) {
        (Some(ax), Some(ay)) => ax.atom_type == ay.atom_type && ax.name.is_some() && ax.name == ay.name,
        _ => false,
    }
}

fn implication_edges(space: &AtomSpace) -> Vec<(AtomId, AtomId, AtomId, TruthValue)> {
    space
        .by_type(AtomType::ImplicationLink)
        .into_iter()
        .filter_map(|id| {
            let atom = space.get(id)?;
            if atom.outgoing.len() == 2 {
                Some((id, atom.outgoing[0], atom.outgoing[1], atom.tv))
            } else {
                None
            }
        })
        .map(|(id, a, b, tv)| (a, b, id, tv))
        .collect()
}

/// Deduction: `A→B (s1,c1)`, `B→C (s2,c2)` ⊢ `A→C`.
/// strength = s1·s2, confidence = c1·c2·(1 − s1 + s1·s2).
fn deduction_candidates(space: &AtomSpace) -> Vec<Candidate> {
    let edges = implication_edges(space);
    let mut out = Vec::new();
    for &(a, b, ab_id, tv_ab) in &edges {
        for &(b2, c, bc_id, tv_bc) in &edges {
            if ab_id == bc_id || !same_referent(space, b, b2) {
                continue;
            }
            let (s1, c1) = (tv_ab.strength, tv_ab.confidence);
            let (s2, c2) = (tv_bc.strength, tv_bc.confidence);
            let tv = TruthValue::new(s1 * s2, c1 * c2 * (1.0 - s1 + s1 * s2));
            out.push(Candidate {
                rule: "deduction",
                premises: vec![ab_id, bc_id],
                link_type: AtomType::ImplicationLink,
                outgoing: vec![a, c],
                tv,
            });
        }
    }
    out
}

/// Induction: `A→B (s1,c1)`, `A→C (s2,c2)` ⊢ `C→B`.
/// strength = s2, confidence = c1·c2·s1.
fn induction_candidates(space: &AtomSpace) -> Vec<Candidate> {
    let edges = implication_edges(space);
    let mut out = Vec::new();
    for &(a, b, ab_id, tv_ab) in &edges {
        for &(a2, c, ac_id, tv_ac) in &edges {
            if ab_id == ac_id || !same_referent(space, a, a2) {
                continue;
            }
            let (s1, c1) = (tv_ab.strength, tv_ab.confidence);
            let (s2, c2) = (tv_ac.strength, tv_ac.confidence);
            let tv = TruthValue::new(s2, c1 * c2 * s1);
            out.push(Candidate {
                rule: "induction",
                premises: vec![ab_id, ac_id],
                link_type: AtomType::ImplicationLink,
                outgoing: vec![c, b],
                tv,
            });
        }
    }
    out
}

/// Abduction: `A→B (s1,c1)`, `C→B (s2,c2)` ⊢ `A→C`.
/// strength = s1·s2, confidence = c1·c2.
fn abduction_candidates(space: &AtomSpace) -> Vec<Candidate> {
    let edges = implication_edges(space);
    let mut out = Vec::new();
    for &(a, b, ab_id, tv_ab) in &edges {
        for &(c, b2, cb_id, tv_cb) in &edges {
            if ab_id == cb_id || !same_referent(space, b, b2) {
                continue;
            }
            let (s1, c1) = (tv_ab.strength, tv_ab.confidence);
            let (s2, c2) = (tv_cb.strength, tv_cb.confidence);
            let tv = TruthValue::new(s1 * s2, c1 * c2);
            out.push(Candidate {
                rule: "abduction",
                premises: vec![ab_id, cb_id],
                link_type: AtomType::ImplicationLink,
                outgoing: vec![a, c],
                tv,
            });
        }
    }
    out
}

/// Modus ponens: `A→B (s1,c1)`, an `EvaluationLink[A]` asserting `A` with
/// `s2 > 0.5` and `c2 ≥ minConfidence` ⊢ `EvaluationLink[B]` asserting
/// `B`, strength = s1·s2, confidence = c1·c2.
fn modus_ponens_candidates(space: &AtomSpace, config: &PlnConfig) -> Vec<Candidate> {
    let edges = implication_edges(space);
    let assertions: Vec<(AtomId, AtomId, TruthValue)> = space
        .by_type(AtomType::EvaluationLink)
        .into_iter()
        .filter_map(|id| {
            let atom = space.get(id)?;
            if atom.outgoing.len() == 1 {
                Some((id, atom.outgoing[0], atom.tv))
            } else {
                None
            }
        })
        .collect();

    let mut out = Vec::new();
    for &(a, b, ab_id, tv_ab) in &edges {
        for &(eval_id, asserted, tv_eval) in &assertions {
            if !same_referent(space, a, asserted) {
                continue;
            }
            if tv_eval.strength <= 0.5 || tv_eval.confidence < config.min_confidence {
                continue;
            }
            let (s1, c1) = (tv_ab.strength, tv_ab.confidence);
            let (s2, c2) = (tv_eval.strength, tv_eval.confidence);
            let tv = TruthValue::new(s1 * s2, c1 * c2);
            out.push(Candidate {
                rule: "modus_ponens",
                premises: vec![ab_id, eval_id],
                link_type: AtomType::EvaluationLink,
                outgoing: vec![b],
                tv,
            });
        }
    }
    out
}

/// Symmetric revision of two truth values for the same statement.
/// `revise(tv1, tv2) == revise(tv2, tv1)` up to floating tolerance.
pub fn revise(tv1: TruthValue, tv2: TruthValue, inflation_factor: f64) -> TruthValue {
    let (s1, c1) = (tv1.strength, tv1.confidence);
    let (s2, c2) = (tv2.strength, tv2.confidence);
    let denom = c1 + c2 - c1 * c2;
    let strength = if denom.abs() < f64::EPSILON {
        0.0
    } else {
        (s1 * c1 + s2 * c2 - s1 * s2 * c1 * c2) / denom
    };
    let confidence = (denom * inflation_factor).min(1.0);
    TruthValue::new(strength, confidence)
}

/// Runs forward-chaining PLN for up to `max_iterations` passes over the
/// rule registry (deterministic order: deduction, induction, abduction,
/// modus ponens). Stops early once a pass produces zero new inferences.
pub fn infer(space: &mut AtomSpace, config: &PlnConfig, max_iterations: u32) -> InferRunResult {
    let mut results = Vec::new();
    let mut iterations = 0;
    let mut total_inferences = 0;

    for _ in 0..max_iterations.max(1) {
        iterations += 1;
        let mut candidates = Vec::new();
        candidates.extend(deduction_candidates(space));
        candidates.extend(induction_candidates(space));
        candidates.extend(abduction_candidates(space));
        candidates.extend(modus_ponens_candidates(space, config));

        let mut produced_this_pass = 0;
        for candidate in candidates {
            if candidate.tv.confidence < config.min_confidence || candidate.tv.strength < config.strength_threshold {
                continue;
            }

            let existing = space.find_link(candidate.link_type, &candidate.outgoing);
            let final_tv = match existing {
                Some(old_id) if !config.overwrite_on_conflict => {
                    let old_tv = space.get(old_id).map(|a| a.tv).unwrap_or_default();
                    revise(old_tv, candidate.tv, config.revision_inflation_factor)
                }
                _ => candidate.tv,
            };

            match space.add_link(candidate.link_type, candidate.outgoing.clone(), Some(final_tv)) {
                Ok(atom) => {
                    let is_new = existing.is_none();
                    if is_new {
                        produced_this_pass += 1;
                        total_inferences += 1;
                    }
                    results.push(InferenceResult {
                        rule: candidate.rule.to_string(),
                        premises: candidate.premises,
                        conclusion: atom.id,
                        tv: atom.tv,
                        is_new,
                    });
                }
                Err(err) => {
                    debug!(rule = candidate.rule, error = %err, "PLN candidate skipped");
                }
            }
        }

        if produced_this_pass == 0 {
            break;
        }
    }

    InferRunResult {
        results,
        iterations,
        total_inferences,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concept(space: &mut AtomSpace, name: &str) -> AtomId {
        space.add_node(AtomType::ConceptNode, Some(name), None).unwrap().id
    }

    #[test]
    fn deduction_chain_matches_scenario_s1() {
        let mut space = AtomSpace::new();
        let a = concept(&mut space, "A");
        let b = concept(&mut space, "B");
        let c = concept(&mut space, "C");
        space
            .add_link(AtomType::ImplicationLink, vec![a, b], Some(TruthValue::new(0.9, 0.8)))
            .unwrap();
        space
            .add_link(AtomType::ImplicationLink, vec![b, c], Some(TruthValue::new(0.7, 0.6)))
            .unwrap();

        let config = PlnConfig::default();
        let run = infer(&mut space, &config, 1);

        let ac_id = space.find_link(AtomType::ImplicationLink, &[a, c]).expect("A->C inferred");
        let tv = space.get(ac_id).unwrap().tv;
        assert!((tv.strength - 0.63).abs() < 1e-9);
        assert!((tv.confidence - 0.3504).abs() < 1e-9);
        assert_eq!(run.total_inferences, 1);
    }

    #[test]
    fn empty_graph_completes_in_one_iteration() {
        let mut space = AtomSpace::new();
        let config = PlnConfig::default();
        let run = infer(&mut space, &config, 10);
        assert_eq!(run.iterations, 1);
        assert_eq!(run.total_inferences, 0);
    }

    #[test]
    fn revision_is_symmetric() {
        let tv1 = TruthValue::new(0.8, 0.6);
        let tv2 = TruthValue::new(0.3, 0.9);
        let r1 = revise(tv1, tv2, 1.2);
        let r2 = revise(tv2, tv1, 1.2);
        assert!((r1.strength - r2.strength).abs() < 1e-9);
        assert!((r1.confidence - r2.confidence).abs() < 1e-9);
    }

    #[test]
    fn deduction_confidence_monotonic_in_premise_confidence() {
        let mut low = AtomSpace::new();
        let a = concept(&mut low, "A");
        let b = concept(&mut low, "B");
        let c = concept(&mut low, "C");
        low.add_link(AtomType::ImplicationLink, vec![a, b], Some(TruthValue::new(0.9, 0.5))).unwrap();
        low.add_link(AtomType::ImplicationLink, vec![b, c], Some(TruthValue::new(0.7, 0.5))).unwrap();
        infer(&mut low, &PlnConfig::default(), 1);
        let low_conf = low.get(low.find_link(AtomType::ImplicationLink, &[a, c]).unwrap()).unwrap().tv.confidence;

        let mut high = AtomSpace::new();
        let a2 = concept(&mut high, "A");
        let b2 = concept(&mut high, "B");
        let c2 = concept(&mut high, "C");
        high.add_link(AtomType::ImplicationLink, vec![a2, b2], Some(TruthValue::new(0.9, 0.9))).unwrap();
        high.add_link(AtomType::ImplicationLink, vec![b2, c2], Some(TruthValue::new(0.7, 0.9))).unwrap();
        infer(&mut high, &PlnConfig::default(), 1);
        let high_conf = high.get(high.find_link(AtomType::ImplicationLink, &[a2, c2]).unwrap()).unwrap().tv.confidence;

        assert!(high_conf >= low_conf);
    }

    #[test]
    fn modus_ponens_derives_consequent_assertion() {
        let mut space = AtomSpace::new();
        let a = concept(&mut space, "raining");
        let b = concept(&mut space, "wet-ground");
        space
            .add_link(AtomType::ImplicationLink, vec![a, b], Some(TruthValue::new(0.9, 0.9)))
            .unwrap();
        space
            .add_link(AtomType::EvaluationLink, vec![a], Some(TruthValue::new(0.95, 0.9)))
            .unwrap();

        infer(&mut space, &PlnConfig::default(), 1);
        let eval_b = space.find_link(AtomType::EvaluationLink, &[b]);
        assert!(eval_b.is_some());
    }
}
