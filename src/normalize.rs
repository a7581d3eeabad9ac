//! Greedy single-link color clustering.
//!
//! The first remaining color seeds a cluster and absorbs every other remaining
//! color closer than the threshold (CIE76 ΔE). Clusters are never re-centered,
//! so the result depends on input order: the same ordering always gives the same
//! mapping, a different ordering may not.

use crate::color::{lab_distance, rgb_to_lab, Rgb};
use palette::{white_point::D65, Lab};
use std::collections::HashMap;

pub const MIN_THRESHOLD: f32 = 1.0;
pub const MAX_THRESHOLD: f32 = 20.0;

/// Map every input color to the seed of the cluster it joined.
pub fn normalize(colors: &[Rgb], threshold: f32) -> HashMap<Rgb, Rgb> {
    let mut remaining: Vec<(Rgb, Lab<D65, f32>)> = Vec::with_capacity(colors.len());
    for color in colors {
        if !remaining.iter().any(|(c, _)| c == color) {
            remaining.push((*color, rgb_to_lab(*color)));
        }
    }

    let mut mapping = HashMap::with_capacity(remaining.len());
    let mut cursor = 0usize;
    while cursor < remaining.len() {
        let (seed, seed_lab) = remaining[cursor];
        mapping.insert(seed, seed);
        cursor += 1;

        let mut idx = cursor;
        while idx < remaining.len() {
            let (candidate, candidate_lab) = remaining[idx];
            if lab_distance(seed_lab, candidate_lab) < threshold {
                mapping.insert(candidate, seed);
                remaining.remove(idx);
            } else {
                idx += 1;
            }
        }
    }

    mapping
}

/// Group the mapping back into clusters: representative → members (representative first).
pub fn clusters(mapping: &HashMap<Rgb, Rgb>) -> Vec<(Rgb, Vec<Rgb>)> {
    let mut grouped = HashMap::<Rgb, Vec<Rgb>>::new();
    for (member, representative) in mapping {
        grouped.entry(*representative).or_default().push(*member);
    }
    let mut out = grouped
        .into_iter()
        .map(|(representative, mut members)| {
            members.sort_by_key(|m| (*m != representative, *m));
            (representative, members)
        })
        .collect::<Vec<_>>();
    out.sort_by_key(|(representative, _)| *representative);
    out
}

/// Map a 0..1 control level to a ΔE threshold.
pub fn threshold_from_level(level: f32) -> f32 {
    let level = if level.is_nan() { 0.0 } else { level.clamp(0.0, 1.0) };
    MIN_THRESHOLD + (MAX_THRESHOLD - MIN_THRESHOLD) * level
}
