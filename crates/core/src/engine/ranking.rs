//! Deterministic ordering: score, then the tie-break policy inside near-equal clusters.

use crate::domain::entity::CanonicalKey;
use crate::domain::recommendation::ScoreComponents;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub key: CanonicalKey,
    pub team: Option<String>,
    pub opponent: Option<String>,
    pub score: ScoreComponents,
}

impl Candidate {
    /// Same game, opposite sidelines.
    fn opposes(&self, other: &Candidate) -> bool {
        match (&self.team, &self.opponent, &other.team, &other.opponent) {
            (Some(t), Some(o), Some(ot), Some(oo)) => {
                t.eq_ignore_ascii_case(oo) && o.eq_ignore_ascii_case(ot)
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Posture {
    /// Protect the lead: prefer low variance.
    Favorite,
    /// Chase points: prefer high ceiling.
    Underdog,
    Even,
}

impl Posture {
    pub fn from_margin(margin: Option<f64>, favorite_threshold: f64) -> Self {
        match margin {
            Some(m) if m > favorite_threshold => Posture::Favorite,
            Some(m) if m < 0.0 => Posture::Underdog,
            _ => Posture::Even,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    /// Index into the candidate slice.
    pub index: usize,
    pub correlated_with: Option<CanonicalKey>,
}

fn by_score(a: &Candidate, b: &Candidate) -> Ordering {
    b.score
        .median
        .total_cmp(&a.score.median)
        .then_with(|| a.key.cmp(&b.key))
}

fn by_posture(posture: Posture, a: &Candidate, b: &Candidate) -> Ordering {
    match posture {
        Posture::Favorite => a.score.spread().total_cmp(&b.score.spread()),
        Posture::Underdog => b.score.ceiling.total_cmp(&a.score.ceiling),
        Posture::Even => Ordering::Equal,
    }
}

/// Orders candidates by median score. Candidates within `band` points of their cluster's leader
/// are near-equal and are ordered by: correlated pairing (when enabled), then posture, then score.
pub fn rank(
    candidates: &[Candidate],
    posture: Posture,
    band: f64,
    pair_correlated: bool,
) -> Vec<Placement> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|a, b| by_score(&candidates[*a], &candidates[*b]));

    let mut clusters: Vec<Vec<usize>> = Vec::new();
    for idx in order {
        let joins = clusters.last().is_some_and(|cluster| {
            let leader = &candidates[cluster[0]];
            leader.score.median - candidates[idx].score.median <= band
        });
        match clusters.last_mut() {
            Some(cluster) if joins => cluster.push(idx),
            _ => clusters.push(vec![idx]),
        }
    }

    let mut placed: Vec<Placement> = Vec::with_capacity(candidates.len());
    for mut remaining in clusters {
        while !remaining.is_empty() {
            let partner = |idx: usize| -> Option<CanonicalKey> {
                if !pair_correlated {
                    return None;
                }
                placed
                    .iter()
                    .map(|p| &candidates[p.index])
                    .find(|p| p.opposes(&candidates[idx]))
                    .map(|p| p.key.clone())
            };

            let mut best = 0;
            let mut best_partner = partner(remaining[0]);
            for pos in 1..remaining.len() {
                let this_partner = partner(remaining[pos]);
                let a = &candidates[remaining[pos]];
                let b = &candidates[remaining[best]];
                let ord = best_partner
                    .is_some()
                    .cmp(&this_partner.is_some())
                    .then_with(|| by_posture(posture, a, b))
                    .then_with(|| by_score(a, b));
                if ord == Ordering::Less {
                    best = pos;
                    best_partner = this_partner;
                }
            }

            let index = remaining.remove(best);
            placed.push(Placement {
                index,
                correlated_with: best_partner,
            });
        }
    }
    placed
}

/// Position (within `order`) of the high-variance alternative: the widest floor-to-ceiling range
/// behind the leader, provided it is at least as wide as the leader's. Falls back to the leader
/// itself when nothing behind it is more volatile.
pub fn chaos_pick(candidates: &[Candidate], order: &[Placement]) -> Option<usize> {
    let leader_spread = candidates[order.first()?.index].score.spread();
    let pick = order
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, p)| {
            let spread = candidates[p.index].score.spread();
            spread > 0.0 && spread >= leader_spread
        })
        .max_by(|(pa, a), (pb, b)| {
            let (a, b) = (&candidates[a.index].score, &candidates[b.index].score);
            a.spread()
                .total_cmp(&b.spread())
                .then_with(|| a.ceiling.total_cmp(&b.ceiling))
                .then_with(|| pb.cmp(pa))
        })
        .map_or(0, |(pos, _)| pos);
    Some(pick)
}
