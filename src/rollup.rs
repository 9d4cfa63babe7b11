// Outlier-trimmed average unit cost per part revision.
//
// For each part the sample is its most recent closed jobs (at most
// `SAMPLE_SIZE`), ranked by unit cost. The cheapest and the most expensive
// job are dropped and the rest are averaged per revision. A sample of one or
// two jobs therefore leaves nothing to average and the revision's average
// stays `None`.
use crate::types::{CostRollupRecord, CostSample, PartMaster};
use std::cmp::Ordering;
use std::collections::HashMap;

pub const SAMPLE_SIZE: usize = 10;
/// Years of closed jobs the sample is drawn from.
pub const ROLLUP_YEARS: u32 = 5;

/// Jobs that survive the trim for one part, in ascending unit-cost order.
///
/// `samples` must already be ordered most recent first.
pub fn trimmed_sample(samples: &[&CostSample]) -> Vec<CostSample> {
    let mut sample: Vec<CostSample> = samples
        .iter()
        .take(SAMPLE_SIZE)
        .map(|s| (*s).clone())
        .collect();
    if sample.len() < 2 {
        return Vec::new();
    }
    // Equal costs rank the more recent job first.
    sample.sort_by(|a, b| {
        a.unit_cost
            .partial_cmp(&b.unit_cost)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.release_date.cmp(&a.release_date))
    });
    sample.pop();
    sample.remove(0);
    sample
}

/// Join the trimmed averages onto the item-master rows.
///
/// Both inputs may cover many parts; `samples` must be ordered by part then
/// release date descending, as the sampling query returns them.
pub fn compute_rollup(masters: &[PartMaster], samples: &[CostSample]) -> Vec<CostRollupRecord> {
    let mut by_part: HashMap<&str, Vec<&CostSample>> = HashMap::new();
    for s in samples {
        by_part.entry(s.part_number.as_str()).or_default().push(s);
    }

    // (part, revision) -> (sum, count)
    let mut acc: HashMap<(String, String), (f64, usize)> = HashMap::new();
    for part_samples in by_part.values() {
        for kept in trimmed_sample(part_samples) {
            let e = acc
                .entry((kept.part_number, kept.revision))
                .or_insert((0.0, 0));
            e.0 += kept.unit_cost;
            e.1 += 1;
        }
    }

    masters
        .iter()
        .map(|m| {
            let key = (m.part_number.clone(), m.revision.clone());
            let (average_cost, job_count) = match acc.get(&key) {
                Some((sum, n)) if *n > 0 => (Some(sum / *n as f64), *n),
                _ => (None, 0),
            };
            CostRollupRecord {
                part_number: m.part_number.clone(),
                revision: m.revision.clone(),
                description: m.description.clone(),
                standard_cost: m.standard_cost,
                average_cost,
                job_count,
            }
        })
        .collect()
}
