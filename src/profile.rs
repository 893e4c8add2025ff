use std::collections::{HashMap, HashSet};

use log::debug;
use rayon::prelude::*;
use serde::Serialize;

use crate::abundance_matrix::{CollapsedRow, CollapsedTable};
use crate::colormap::SEQUENTIAL;
use crate::error::{Result, TaxaplotError};

// Name used when a lineage skips the rough level of a joint plot
const UNASSIGNED: &str = "unassigned";

/// Thresholds for a single-level profile
#[derive(Debug, Clone, Copy)]
pub struct ProfileParams {
    /// Minimum mean relative abundance for a group to be shown
    pub threshold: f64,
    /// Maximum number of groups to show
    pub count: usize,
}

impl Default for ProfileParams {
    fn default() -> Self {
        Self {
            threshold: 0.01,
            count: 8,
        }
    }
}

/// Thresholds for a joint (rough/fine) profile
#[derive(Debug, Clone, Copy)]
pub struct JointParams {
    pub lo_thresh: f64,
    pub hi_thresh: f64,
    pub lo_count: usize,
    pub hi_count: usize,
}

impl Default for JointParams {
    fn default() -> Self {
        Self {
            lo_thresh: 0.01,
            hi_thresh: 0.01,
            lo_count: 4,
            hi_count: 5,
        }
    }
}

/// A displayed group with its stacking bounds
#[derive(Debug, Clone, Serialize)]
pub struct ProfileGroup {
    pub label: String,
    /// Rough group of a joint profile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rough: Option<String>,
    pub mean: f64,
    pub values: Vec<f64>,
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
}

/// The top groups, stacked in display order
#[derive(Debug, Clone, Serialize)]
pub struct StackedProfile {
    pub samples: Vec<String>,
    pub groups: Vec<ProfileGroup>,
}

impl StackedProfile {
    pub fn labels(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.label.as_str()).collect()
    }

    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    /// `(rough, label)` pairs for joint colouring.
    pub fn rough_pairs(&self) -> Vec<(String, String)> {
        self.groups
            .iter()
            .map(|g| {
                (
                    g.rough.clone().unwrap_or_else(|| g.label.clone()),
                    g.label.clone(),
                )
            })
            .collect()
    }
}

struct PendingGroup {
    label: String,
    rough: Option<String>,
    mean: f64,
    values: Vec<f64>,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

// Extends colliding labels with the nearest ancestor that tells them apart.
// `lineages` lists each group's non-empty ancestors, nearest first.
fn disambiguate(labels: &mut [String], lineages: &[Vec<String>]) {
    let mut collisions: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, label) in labels.iter().enumerate() {
        collisions.entry(label.clone()).or_default().push(i);
    }

    for members in collisions.into_values().filter(|m| m.len() > 1) {
        let depth = members
            .iter()
            .map(|&i| lineages[i].len())
            .max()
            .unwrap_or(0);
        let split = (0..depth).find(|&d| {
            let prefixes: HashSet<&[String]> = members
                .iter()
                .map(|&i| &lineages[i][..lineages[i].len().min(d + 1)])
                .collect();
            prefixes.len() == members.len()
        });

        match split {
            Some(d) => {
                let single: HashSet<Option<&String>> =
                    members.iter().map(|&i| lineages[i].get(d)).collect();
                for &i in &members {
                    let context = if single.len() == members.len() {
                        lineages[i].get(d).cloned().unwrap_or_default()
                    } else {
                        let mut path: Vec<&str> = lineages[i]
                            .iter()
                            .take(d + 1)
                            .map(String::as_str)
                            .collect();
                        path.reverse();
                        path.join(" / ")
                    };
                    if !context.is_empty() {
                        labels[i] = format!("{} ({})", labels[i], context);
                    }
                }
            }
            // Same lineage all the way up; number them
            None => {
                for (n, &i) in members.iter().enumerate() {
                    labels[i] = format!("{} #{}", labels[i], n + 1);
                }
            }
        }
    }
}

// Non-empty names above `level`, nearest first
fn ancestors(row: &CollapsedRow, level: usize) -> Vec<String> {
    (0..level)
        .rev()
        .map(|l| row.name_at(l))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

// Orders samples by the first group and accumulates the bounds down the groups
fn stack_groups(samples: &[String], pending: Vec<PendingGroup>) -> StackedProfile {
    let mut order: Vec<usize> = (0..samples.len()).collect();
    if let Some(first) = pending.first() {
        order.sort_by(|&a, &b| first.values[b].total_cmp(&first.values[a]));
    }

    let mut running = vec![0.0; samples.len()];
    let groups = pending
        .into_iter()
        .map(|group| {
            let values: Vec<f64> = order.iter().map(|&i| group.values[i]).collect();
            let lower = running.clone();
            for (acc, v) in running.iter_mut().zip(&values) {
                *acc += v;
            }
            ProfileGroup {
                label: group.label,
                rough: group.rough,
                mean: group.mean,
                values,
                upper: running.clone(),
                lower,
            }
        })
        .collect();

    StackedProfile {
        samples: order.iter().map(|&i| samples[i].clone()).collect(),
        groups,
    }
}

/// Gets the top groups of a single taxonomic level.
///
/// Groups are ranked by their mean across samples; a group is shown when its
/// mean exceeds `threshold` and it is within the first `count`.
pub fn profile_one_level(
    collapsed: &CollapsedTable,
    level: usize,
    params: &ProfileParams,
) -> Result<StackedProfile> {
    let means: Vec<f64> = collapsed.rows.par_iter().map(|row| row.mean()).collect();

    let mut order: Vec<usize> = (0..collapsed.rows.len()).collect();
    order.sort_by(|&a, &b| means[b].total_cmp(&means[a]));

    let top: Vec<usize> = order
        .into_iter()
        .enumerate()
        .filter(|&(rank, idx)| means[idx] > params.threshold && rank < params.count)
        .map(|(_, idx)| idx)
        .collect();

    if top.is_empty() {
        return Err(TaxaplotError::EmptyProfile {
            level,
            threshold: params.threshold,
        });
    }
    debug!("Level {}: {} of {} groups shown", level, top.len(), collapsed.rows.len());

    let mut labels: Vec<String> = top
        .iter()
        .map(|&i| collapsed.rows[i].name_at(level).to_string())
        .collect();
    let lineages: Vec<Vec<String>> = top
        .iter()
        .map(|&i| ancestors(&collapsed.rows[i], level))
        .collect();
    disambiguate(&mut labels, &lineages);

    let pending = top
        .iter()
        .zip(labels)
        .map(|(&i, label)| PendingGroup {
            label,
            rough: None,
            mean: means[i],
            values: collapsed.rows[i].values.clone(),
        })
        .collect();

    Ok(stack_groups(&collapsed.samples, pending))
}

/// Generates a profile that uses two levels to define grouping.
///
/// `collapsed` is the table collapsed to the fine level `hi`. Rough groups
/// (level `lo`) are ranked by their summed abundance and fine groups are
/// ranked within them; fine groups that miss their thresholds are pooled into
/// an `other <rough>` group at the end of their rough group.
pub fn profile_joint_levels(
    collapsed: &CollapsedTable,
    lo: usize,
    hi: usize,
    params: &JointParams,
) -> Result<StackedProfile> {
    if lo >= hi {
        return Err(TaxaplotError::InvalidArgument(format!(
            "rough level {} must be coarser than fine level {}",
            lo, hi
        )));
    }
    if collapsed.level != hi {
        return Err(TaxaplotError::InvalidArgument(format!(
            "table is collapsed to level {}, expected fine level {}",
            collapsed.level, hi
        )));
    }
    if params.lo_count > SEQUENTIAL.len() {
        return Err(TaxaplotError::InvalidArgument(format!(
            "at most {} rough groups can be shown",
            SEQUENTIAL.len()
        )));
    }

    let mean_hi: Vec<f64> = collapsed.rows.par_iter().map(|row| row.mean()).collect();
    let rough: Vec<&str> = collapsed
        .rows
        .iter()
        .map(|row| match row.name_at(lo) {
            "" => UNASSIGNED,
            name => name,
        })
        .collect();

    let mut rough_means: HashMap<&str, f64> = HashMap::new();
    for (name, m) in rough.iter().zip(&mean_hi) {
        *rough_means.entry(*name).or_default() += m;
    }
    let mean_lo: Vec<f64> = rough.iter().map(|name| rough_means[name]).collect();

    let mut order: Vec<usize> = (0..collapsed.rows.len()).collect();
    order.sort_by(|&a, &b| {
        mean_lo[b]
            .total_cmp(&mean_lo[a])
            .then_with(|| rough[a].cmp(rough[b]))
            .then_with(|| mean_hi[b].total_cmp(&mean_hi[a]))
    });

    // Rough groups are contiguous in `order`; walk them one at a time
    let mut pending = Vec::new();
    let mut lineages = Vec::new();
    let mut count_lo = 0;
    let mut start = 0;
    while start < order.len() {
        let group_name = rough[order[start]];
        let end = order[start..]
            .iter()
            .position(|&i| rough[i] != group_name)
            .map_or(order.len(), |offset| start + offset);
        count_lo += 1;

        let group_mean = mean_lo[order[start]];
        if group_mean > params.lo_thresh && count_lo <= params.lo_count {
            let mut other: Option<Vec<f64>> = None;
            for (count_hi, &i) in order[start..end].iter().enumerate() {
                let row = &collapsed.rows[i];
                if mean_hi[i] > params.hi_thresh && count_hi < params.hi_count {
                    pending.push(PendingGroup {
                        label: row.name_at(hi).to_string(),
                        rough: Some(group_name.to_string()),
                        mean: mean_hi[i],
                        values: row.values.clone(),
                    });
                    lineages.push(ancestors(row, hi));
                } else {
                    let acc = other.get_or_insert_with(|| vec![0.0; row.values.len()]);
                    for (a, v) in acc.iter_mut().zip(&row.values) {
                        *a += v;
                    }
                }
            }
            if let Some(values) = other {
                pending.push(PendingGroup {
                    label: format!("other {}", group_name),
                    rough: Some(group_name.to_string()),
                    mean: mean(&values),
                    values,
                });
                lineages.push(Vec::new());
            }
        }

        start = end;
    }

    if pending.is_empty() {
        return Err(TaxaplotError::EmptyProfile {
            level: lo,
            threshold: params.lo_thresh,
        });
    }
    debug!(
        "Joint levels {}/{}: {} groups from {} rough groups",
        lo,
        hi,
        pending.len(),
        count_lo.min(params.lo_count)
    );

    let mut labels: Vec<String> = pending.iter().map(|g| g.label.clone()).collect();
    disambiguate(&mut labels, &lineages);
    for (group, label) in pending.iter_mut().zip(labels) {
        group.label = label;
    }

    Ok(stack_groups(&collapsed.samples, pending))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn row(path: &[&str], values: &[f64]) -> CollapsedRow {
        CollapsedRow {
            path: path.iter().map(|p| Some(p.to_string())).collect(),
            values: values.to_vec(),
        }
    }

    fn table(level: usize, samples: &[&str], rows: Vec<CollapsedRow>) -> CollapsedTable {
        CollapsedTable {
            level,
            samples: samples.iter().map(|s| s.to_string()).collect(),
            rows,
        }
    }

    fn phyla() -> CollapsedTable {
        table(
            1,
            &["S1", "S2", "S3"],
            vec![
                row(&["k__X", "p__A"], &[0.7, 0.0, 0.3]),
                row(&["k__X", "p__B"], &[0.2, 0.8, 0.1]),
                row(&["k__X", "p__C"], &[0.095, 0.195, 0.595]),
                row(&["k__X", "p__D"], &[0.005, 0.005, 0.005]),
            ],
        )
    }

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < EPS, "{:?} != {:?}", actual, expected);
        }
    }

    #[test]
    fn test_threshold_drops_rare_groups() {
        let profile = profile_one_level(&phyla(), 1, &ProfileParams::default()).unwrap();
        assert_eq!(profile.labels(), vec!["p__B", "p__A", "p__C"]);
        for group in &profile.groups {
            assert!(group.mean > 0.01);
        }
    }

    #[test]
    fn test_count_limits_groups_and_orders_samples() {
        let params = ProfileParams {
            threshold: 0.01,
            count: 2,
        };
        let profile = profile_one_level(&phyla(), 1, &params).unwrap();
        assert_eq!(profile.labels(), vec!["p__B", "p__A"]);
        // Samples follow the most abundant group, descending
        assert_eq!(profile.samples, vec!["S2", "S1", "S3"]);

        let b = &profile.groups[0];
        assert_close(&b.lower, &[0.0, 0.0, 0.0]);
        assert_close(&b.upper, &[0.8, 0.2, 0.1]);

        let a = &profile.groups[1];
        assert_close(&a.values, &[0.0, 0.7, 0.3]);
        assert_close(&a.lower, &[0.8, 0.2, 0.1]);
        assert_close(&a.upper, &[0.8, 0.9, 0.4]);
    }

    #[test]
    fn test_bounds_are_consistent() {
        let profile = profile_one_level(&phyla(), 1, &ProfileParams::default()).unwrap();
        for group in &profile.groups {
            for i in 0..profile.num_samples() {
                assert!((group.upper[i] - group.lower[i] - group.values[i]).abs() < EPS);
            }
        }
        for pair in profile.groups.windows(2) {
            assert_close(&pair[1].lower, &pair[0].upper);
        }
    }

    #[test]
    fn test_nothing_above_threshold() {
        let params = ProfileParams {
            threshold: 0.9,
            count: 8,
        };
        let err = profile_one_level(&phyla(), 1, &params).unwrap_err();
        assert!(matches!(err, TaxaplotError::EmptyProfile { level: 1, .. }));
    }

    #[test]
    fn test_colliding_labels_get_parent() {
        let collapsed = table(
            2,
            &["S1"],
            vec![
                row(&["k__X", "p__A", "g__unknown"], &[0.5]),
                row(&["k__X", "p__B", "g__unknown"], &[0.3]),
                row(&["k__X", "p__B", "g__Known"], &[0.2]),
            ],
        );
        let profile = profile_one_level(&collapsed, 2, &ProfileParams::default()).unwrap();
        assert_eq!(
            profile.labels(),
            vec!["g__unknown (p__A)", "g__unknown (p__B)", "g__Known"]
        );
    }

    #[test]
    fn test_colliding_labels_walk_up_shared_parents() {
        let collapsed = table(
            3,
            &["S1"],
            vec![
                row(&["k__X", "p__A", "c__uncultured", "g__uncultured"], &[0.6]),
                row(&["k__X", "p__B", "c__uncultured", "g__uncultured"], &[0.4]),
            ],
        );
        let profile = profile_one_level(&collapsed, 3, &ProfileParams::default()).unwrap();
        assert_eq!(
            profile.labels(),
            vec!["g__uncultured (p__A)", "g__uncultured (p__B)"]
        );
    }

    #[test]
    fn test_colliding_labels_with_mixed_parents() {
        let mut labels = vec!["g__u".to_string(), "g__u".to_string(), "g__u".to_string()];
        let lineages: Vec<Vec<String>> = [
            ["c__1", "p__A"],
            ["c__1", "p__B"],
            ["c__2", "p__A"],
        ]
        .iter()
        .map(|l| l.iter().map(|s| s.to_string()).collect())
        .collect();
        disambiguate(&mut labels, &lineages);
        assert_eq!(
            labels,
            vec!["g__u (p__A / c__1)", "g__u (p__B / c__1)", "g__u (p__A / c__2)"]
        );
    }

    fn genera() -> CollapsedTable {
        table(
            2,
            &["S1", "S2"],
            vec![
                row(&["k__X", "p__A", "g__a1"], &[0.5, 0.3]),
                row(&["k__X", "p__A", "g__a2"], &[0.1, 0.1]),
                row(&["k__X", "p__A", "g__a3"], &[0.005, 0.005]),
                row(&["k__X", "p__B", "g__b1"], &[0.2, 0.4]),
                row(&["k__X", "p__B", "g__b2"], &[0.195, 0.195]),
            ],
        )
    }

    #[test]
    fn test_joint_profile_pools_other() {
        let profile = profile_joint_levels(&genera(), 1, 2, &JointParams::default()).unwrap();
        assert_eq!(
            profile.labels(),
            vec!["g__a1", "g__a2", "other p__A", "g__b1", "g__b2"]
        );
        assert_eq!(profile.groups[2].rough.as_deref(), Some("p__A"));
        assert_close(&profile.groups[2].values, &[0.005, 0.005]);

        let last = profile.groups.last().unwrap();
        assert_close(&last.upper, &[1.0, 1.0]);
    }

    #[test]
    fn test_joint_profile_fine_count() {
        let params = JointParams {
            hi_count: 1,
            ..JointParams::default()
        };
        let profile = profile_joint_levels(&genera(), 1, 2, &params).unwrap();
        assert_eq!(
            profile.labels(),
            vec!["g__a1", "other p__A", "g__b1", "other p__B"]
        );
        assert_close(&profile.groups[1].values, &[0.105, 0.105]);
        assert_eq!(
            profile.rough_pairs()[3],
            ("p__B".to_string(), "other p__B".to_string())
        );
    }

    #[test]
    fn test_joint_profile_rough_count() {
        let params = JointParams {
            lo_count: 1,
            ..JointParams::default()
        };
        let profile = profile_joint_levels(&genera(), 1, 2, &params).unwrap();
        assert!(profile
            .groups
            .iter()
            .all(|g| g.rough.as_deref() == Some("p__A")));
    }

    #[test]
    fn test_joint_profile_separates_same_named_genera() {
        let collapsed = table(
            3,
            &["S1", "S2"],
            vec![
                row(&["k__X", "p__A", "f__X", "g__uncultured"], &[0.4, 0.3]),
                row(&["k__X", "p__A", "f__Y", "g__uncultured"], &[0.3, 0.3]),
                row(&["k__X", "p__B", "f__Z", "g__b"], &[0.3, 0.4]),
            ],
        );
        let profile = profile_joint_levels(&collapsed, 1, 3, &JointParams::default()).unwrap();
        assert_eq!(
            profile.labels(),
            vec!["g__uncultured (f__X)", "g__uncultured (f__Y)", "g__b"]
        );
    }

    #[test]
    fn test_joint_profile_rejects_bad_levels() {
        assert!(profile_joint_levels(&genera(), 2, 2, &JointParams::default()).is_err());
        assert!(profile_joint_levels(&genera(), 0, 1, &JointParams::default()).is_err());

        let params = JointParams {
            lo_count: 7,
            ..JointParams::default()
        };
        assert!(profile_joint_levels(&genera(), 1, 2, &params).is_err());
    }
}
