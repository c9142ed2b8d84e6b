//! Spatially grouped, class-stratified fold assignment.
//!
//! Groups (one per digitized region) are the atomic unit: every row of a
//! group lands in the same fold. Within each class the groups are spread so
//! that fold counts differ by at most one, which puts every class with at
//! least `k` groups into every fold.
use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::SpatialCvError;
use crate::sample_table::GroupSummary;

/// What to do when a class has fewer groups than folds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoveragePolicy {
    /// Keep `k`; the short class is spread over as many folds as it can fill.
    #[default]
    Degrade,
    /// Lower `k` to the smallest per-class group count (never below 2).
    ReduceFolds,
    /// Fail with [`SpatialCvError::InsufficientGroups`].
    Error,
}

/// Non-fatal conditions met while assigning folds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoldWarning {
    /// The class cannot be present in every fold.
    InsufficientGroups { class: String, groups: usize, k: usize },
    FoldsReduced { requested: usize, used: usize },
}

/// Per-fold composition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldSummary {
    pub fold: usize,
    pub n_groups: usize,
    pub n_rows: usize,
    /// Groups per class in this fold
    pub class_groups: BTreeMap<String, usize>,
}

/// Mapping from group id to fold index in `[0, k)`.
#[derive(Debug, Clone, PartialEq)]
pub struct FoldAssignment {
    k: usize,
    folds: HashMap<String, usize>,
    warnings: Vec<FoldWarning>,
}

impl FoldAssignment {
    /// Number of folds actually used.
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn fold_of(&self, group_id: &str) -> Option<usize> {
        self.folds.get(group_id).copied()
    }

    pub fn warnings(&self) -> &[FoldWarning] {
        &self.warnings
    }

    /// True when some class could not be spread over every fold.
    pub fn is_degraded(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, FoldWarning::InsufficientGroups { .. }))
    }

    /// Group ids of one fold, sorted.
    pub fn groups_in_fold(&self, fold: usize) -> Vec<&str> {
        let mut groups: Vec<&str> = self
            .folds
            .iter()
            .filter(|(_, &f)| f == fold)
            .map(|(g, _)| g.as_str())
            .collect();
        groups.sort_unstable();
        groups
    }

    /// (group id, fold) pairs sorted by group id.
    pub fn to_sorted_vec(&self) -> Vec<(String, usize)> {
        let mut pairs: Vec<(String, usize)> = self.folds.iter().map(|(g, &f)| (g.clone(), f)).collect();
        pairs.sort();
        pairs
    }

    pub fn summaries(&self, groups: &[GroupSummary]) -> Vec<FoldSummary> {
        let mut out: Vec<FoldSummary> = (0..self.k)
            .map(|fold| FoldSummary {
                fold,
                n_groups: 0,
                n_rows: 0,
                class_groups: BTreeMap::new(),
            })
            .collect();
        for g in groups {
            if let Some(fold) = self.fold_of(&g.group_id) {
                let s = &mut out[fold];
                s.n_groups += 1;
                s.n_rows += g.n_rows;
                *s.class_groups.entry(g.class_label.clone()).or_insert(0) += 1;
            }
        }
        out
    }
}

/// Stratified group k-fold generator.
///
/// Assignment is a pure function of (group set, k, seed, policy): input
/// order does not matter because groups are sorted by id before the seeded
/// shuffle.
#[derive(Debug, Clone)]
pub struct StratifiedGroupFolds {
    n_folds: usize,
    seed: u64,
    policy: CoveragePolicy,
}

impl StratifiedGroupFolds {
    pub fn new(n_folds: usize, seed: u64) -> Self {
        Self {
            n_folds,
            seed,
            policy: CoveragePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: CoveragePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn assign(&self, groups: &[GroupSummary]) -> Result<FoldAssignment> {
        if self.n_folds < 2 {
            return Err(SpatialCvError::InvalidFoldCount { k: self.n_folds }.into());
        }
        if groups.is_empty() {
            return Err(SpatialCvError::EmptySampleTable.into());
        }

        let mut by_class: BTreeMap<&str, Vec<&GroupSummary>> = BTreeMap::new();
        let mut seen: HashMap<&str, &str> = HashMap::new();
        for g in groups {
            if seen.insert(g.group_id.as_str(), g.class_label.as_str()).is_some() {
                return Err(SpatialCvError::InconsistentGroup {
                    group: g.group_id.clone(),
                }
                .into());
            }
            by_class.entry(g.class_label.as_str()).or_default().push(g);
        }

        let mut warnings = Vec::new();
        let k = self.resolve_fold_count(&by_class, &mut warnings)?;
        if groups.len() < k {
            return Err(SpatialCvError::TooFewGroups {
                groups: groups.len(),
                k,
            }
            .into());
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut fold_rows = vec![0usize; k];
        let mut fold_groups = vec![0usize; k];
        let mut folds: HashMap<String, usize> = HashMap::with_capacity(groups.len());

        // Classes that can cover every fold go first, so the short classes
        // fall into whatever folds end up lightest.
        let (full, short): (Vec<_>, Vec<_>) = by_class.into_iter().partition(|(_, gs)| gs.len() >= k);

        for (class, mut members) in full.into_iter().chain(short) {
            let degraded = members.len() < k;
            if degraded {
                log::warn!(
                    "Class '{}' has {} groups for {} folds; it will be missing from {} fold(s)",
                    class,
                    members.len(),
                    k,
                    k - members.len()
                );
                warnings.push(FoldWarning::InsufficientGroups {
                    class: class.to_string(),
                    groups: members.len(),
                    k,
                });
            }

            members.sort_by(|a, b| a.group_id.cmp(&b.group_id));
            members.shuffle(&mut rng);
            // Largest groups first so row counts even out; stable, so the
            // shuffle still decides between equal sizes.
            members.sort_by(|a, b| b.n_rows.cmp(&a.n_rows));

            let mut class_count = vec![0usize; k];
            for g in members {
                let fold = (0..k)
                    .min_by_key(|&f| {
                        // A short class still gets distinct folds; among those
                        // it prefers the ones with the fewest groups overall.
                        let load = if degraded { fold_groups[f] } else { 0 };
                        (class_count[f], load, fold_rows[f], f)
                    })
                    .unwrap_or(0);
                class_count[fold] += 1;
                fold_groups[fold] += 1;
                fold_rows[fold] += g.n_rows;
                folds.insert(g.group_id.clone(), fold);
            }
        }

        log::debug!(
            "Assigned {} groups to {} folds; rows per fold: {:?}",
            groups.len(),
            k,
            fold_rows
        );

        Ok(FoldAssignment { k, folds, warnings })
    }

    fn resolve_fold_count(
        &self,
        by_class: &BTreeMap<&str, Vec<&GroupSummary>>,
        warnings: &mut Vec<FoldWarning>,
    ) -> Result<usize> {
        let Some((class, members)) = by_class.iter().min_by_key(|(_, gs)| gs.len()) else {
            return Ok(self.n_folds);
        };
        let smallest = members.len();
        if smallest >= self.n_folds {
            return Ok(self.n_folds);
        }

        match self.policy {
            CoveragePolicy::Degrade => Ok(self.n_folds),
            CoveragePolicy::Error => Err(SpatialCvError::InsufficientGroups {
                class: class.to_string(),
                groups: smallest,
                k: self.n_folds,
            }
            .into()),
            CoveragePolicy::ReduceFolds => {
                let used = smallest.max(2);
                log::warn!(
                    "Reducing fold count from {} to {} (class '{}' has {} groups)",
                    self.n_folds,
                    used,
                    class,
                    smallest
                );
                warnings.push(FoldWarning::FoldsReduced {
                    requested: self.n_folds,
                    used,
                });
                Ok(used)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(id: &str, class: &str, n_rows: usize) -> GroupSummary {
        GroupSummary {
            group_id: id.to_string(),
            class_label: class.to_string(),
            n_rows,
        }
    }

    #[test]
    fn every_group_gets_exactly_one_fold() {
        let groups: Vec<_> = (0..12).map(|i| group(&format!("g{}", i), if i % 2 == 0 { "a" } else { "b" }, 10 + i)).collect();
        let assignment = StratifiedGroupFolds::new(3, 1).assign(&groups).unwrap();
        for g in &groups {
            let f = assignment.fold_of(&g.group_id).unwrap();
            assert!(f < 3);
        }
        let total: usize = (0..3).map(|f| assignment.groups_in_fold(f).len()).sum();
        assert_eq!(total, 12);
        assert!(assignment.warnings().is_empty());
    }

    #[test]
    fn input_order_does_not_change_assignment() {
        let groups: Vec<_> = (0..9).map(|i| group(&format!("g{}", i), "a", 5)).collect();
        let mut reversed = groups.clone();
        reversed.reverse();
        let folds = StratifiedGroupFolds::new(3, 9);
        assert_eq!(folds.assign(&groups).unwrap(), folds.assign(&reversed).unwrap());
    }

    #[test]
    fn invalid_fold_count_is_an_error() {
        let groups = vec![group("g1", "a", 1), group("g2", "a", 1)];
        assert!(StratifiedGroupFolds::new(1, 0).assign(&groups).is_err());
    }

    #[test]
    fn duplicate_group_id_is_an_error() {
        let groups = vec![group("g1", "a", 1), group("g1", "b", 1)];
        assert!(StratifiedGroupFolds::new(2, 0).assign(&groups).is_err());
    }

    #[test]
    fn too_few_groups_overall_is_an_error() {
        let groups = vec![group("g1", "a", 1), group("g2", "b", 1)];
        let err = StratifiedGroupFolds::new(3, 0).assign(&groups).unwrap_err();
        assert_eq!(
            err.downcast_ref::<SpatialCvError>(),
            Some(&SpatialCvError::TooFewGroups { groups: 2, k: 3 })
        );
    }
}
