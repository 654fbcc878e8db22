//! Multivariate-normal mixture clustering with automatic model order.
//!
//! Starting from one global component, each round tries splitting every
//! component along its first principal axis and deleting every component,
//! each on a cloned mixture, and commits the single candidate with the best
//! entropy fitness. The search ends when no candidate improves on the
//! running best by more than `entropy_precision`. Finally components whose
//! density overlap reaches `merge_overlap` are merged by moment matching.

use tracing::{debug, info};

use dmkit_core::{
    Dataset, DmError, Named, NominalColumn, RealColumn, RealKind, Result, Sample, Summarizable,
};
use dmkit_stats::{
    Analysis, Distribution, Mixture, MultiNormal, Normal, PrinComp, PrinCompConfig,
};

// ── Configuration ──────────────────────────────────────────────────────────

/// Configuration for [`Clustering`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClusteringConfig {
    /// Upper bound on the number of clusters; at least 2.
    pub max_clusters: usize,
    /// Minimum standard deviation of a cluster along any axis.
    pub min_sd: f64,
    /// Whether `min_sd` is a fraction of each column's own SD.
    pub sd_is_relative: bool,
    /// Fitness improvement required to accept a split or a deletion.
    pub entropy_precision: f64,
    /// Overlap at which two final clusters are merged.
    pub merge_overlap: f64,
    /// Cap on split/delete rounds.
    pub max_iterations: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            max_clusters: 5,
            min_sd: 0.1,
            sd_is_relative: true,
            entropy_precision: 1e-3,
            merge_overlap: 0.45,
            max_iterations: 10_000,
        }
    }
}

impl ClusteringConfig {
    fn validate(&self) -> Result<()> {
        if self.max_clusters < 2 {
            return Err(DmError::InvalidInput(
                "clustering: max_clusters must be >= 2".into(),
            ));
        }
        if !(self.min_sd >= 0.0) || !self.min_sd.is_finite() {
            return Err(DmError::InvalidInput(
                "clustering: min_sd must be finite and >= 0".into(),
            ));
        }
        if !(self.entropy_precision >= 0.0) {
            return Err(DmError::InvalidInput(
                "clustering: entropy_precision must be >= 0".into(),
            ));
        }
        if !(0.0..=0.5).contains(&self.merge_overlap) {
            return Err(DmError::InvalidInput(
                "clustering: merge_overlap must lie in [0, 0.5]".into(),
            ));
        }
        Ok(())
    }
}

// ── Clustering ─────────────────────────────────────────────────────────────

/// A fitted mixture of multivariate normals over a real feature space.
#[derive(Debug, Clone)]
pub struct Clustering<'a> {
    analysis: Analysis<'a>,
    variance_min: Vec<f64>,
    mixture: Mixture<MultiNormal>,
}

impl<'a> Clustering<'a> {
    /// Run the full structural search.
    ///
    /// A sample on which even the single global component cannot be fitted
    /// yields a clustering with one unparameterized cluster.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid configuration or mismatched columns.
    pub fn new(sample: Sample, space: Vec<&'a RealColumn>, config: &ClusteringConfig) -> Result<Self> {
        config.validate()?;
        let variance_min = variance_floor(&sample, &space, config)?;
        let analysis = Analysis::space(sample, space)?;
        let n = analysis.n_rows();
        let d = analysis.dim();

        let mut mixture = Mixture::new();
        mixture.add_component(
            MultiNormal::new(d).with_variance_min(variance_min.clone())?,
            1.0,
            n,
        );
        let fitted = match mixture.estimate(&analysis) {
            Ok(()) => mixture.is_parameterized(),
            Err(DmError::Degenerate(_)) => false,
            Err(e) => return Err(e),
        };

        let mut clustering = Self {
            analysis,
            variance_min,
            mixture,
        };
        if !fitted {
            debug!("global cluster cannot be fitted");
            return Ok(clustering);
        }
        clustering.search(config)?;
        clustering.merge_overlapping(config.merge_overlap)?;
        info!(
            clusters = clustering.mixture.len(),
            fitness = clustering.fitness(),
            "clustering finished"
        );
        Ok(clustering)
    }

    fn search(&mut self, config: &ClusteringConfig) -> Result<()> {
        let mut best = self.mixture.fitness(&self.analysis)?;
        for round in 0..config.max_iterations {
            let mut best_work: Option<Mixture<MultiNormal>> = None;
            let k = self.mixture.len();

            if k < config.max_clusters {
                for i in 0..k {
                    let mut work = self.mixture.clone();
                    self.split(&mut work, i)?;
                    if let Some(f) = self.evaluate(&mut work, "split", i, best, config)? {
                        best = f;
                        best_work = Some(work);
                    }
                }
            }

            if k >= 2 {
                for i in 0..k {
                    let mut work = self.mixture.clone();
                    if !work.delete_component(i) {
                        continue;
                    }
                    if let Some(f) = self.evaluate(&mut work, "delete", i, best, config)? {
                        best = f;
                        best_work = Some(work);
                    }
                }
            }

            match best_work {
                Some(work) => {
                    debug!(round, clusters = work.len(), fitness = best, "candidate committed");
                    self.mixture = work;
                }
                None => break,
            }
        }
        Ok(())
    }

    /// Run EM on a candidate; `Some(fitness)` if it beats `best` by more
    /// than the precision. Degenerate candidates are discarded.
    fn evaluate(
        &self,
        work: &mut Mixture<MultiNormal>,
        kind: &'static str,
        component: usize,
        best: f64,
        config: &ClusteringConfig,
    ) -> Result<Option<f64>> {
        match work.estimate(&self.analysis) {
            Ok(()) => {}
            Err(DmError::Degenerate(reason)) => {
                debug!(kind, component, %reason, "candidate discarded");
                return Ok(None);
            }
            Err(e) => return Err(e),
        }
        if !work.is_parameterized() {
            debug!(kind, component, "candidate discarded: unparameterized");
            return Ok(None);
        }
        let fitness = work.fitness(&self.analysis)?;
        let accepted = fitness < best - config.entropy_precision;
        debug!(kind, component, fitness, accepted, "candidate evaluated");
        Ok(accepted.then_some(fitness))
    }

    /// Halve component `i` and hand the rows on the positive side of its
    /// first principal axis to a new component.
    fn split(&self, work: &mut Mixture<MultiNormal>, i: usize) -> Result<()> {
        let names: Vec<String> = self
            .analysis
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let config = PrinCompConfig {
            out_dim_max: 1,
            ..Default::default()
        };
        let old = &mut work.components_mut()[i];
        old.probability /= 2.0;
        let probability = old.probability;
        let pc = PrinComp::from_multi_normal(&old.distribution, names, &config)?;

        let d = self.analysis.dim();
        let fresh = MultiNormal::new(d).with_variance_min(self.variance_min.clone())?;
        work.add_component(fresh, probability, self.analysis.n_rows());
        let new_index = work.len() - 1;

        for (row, _) in self.analysis.sample().iter() {
            let projection = if pc.out_dim() == 1 {
                pc.project_row(&self.analysis, row)?.map_or(0.0, |p| p[0])
            } else {
                0.0
            };
            let components = work.components_mut();
            if projection < 0.0 {
                components[new_index].posteriors[row] = 0.0;
            } else {
                components[new_index].posteriors[row] = components[i].posteriors[row];
                components[i].posteriors[row] = 0.0;
            }
        }
        Ok(())
    }

    fn merge_overlapping(&mut self, threshold: f64) -> Result<()> {
        'scan: loop {
            let k = self.mixture.len();
            for i in 0..k {
                for j in (i + 1)..k {
                    if self.mixture.overlap(&self.analysis, i, j)? >= threshold {
                        debug!(i, j, "merging overlapping clusters");
                        self.merge(i, j)?;
                        continue 'scan;
                    }
                }
            }
            return Ok(());
        }
    }

    /// Replace cluster `i` by the moment-matched union of `i` and `j`, then
    /// drop `j`.
    pub fn merge(&mut self, i: usize, j: usize) -> Result<()> {
        let k = self.mixture.len();
        if i == j || i >= k || j >= k {
            return Err(DmError::InvalidInput(format!(
                "clustering: cannot merge clusters {} and {} of {}",
                i, j, k
            )));
        }
        let (a, b) = (self.mixture.component(i), self.mixture.component(j));
        let merged = MultiNormal::merged(&a.distribution, a.probability, &b.distribution, b.probability)?;
        self.mixture.components_mut()[i].distribution = merged;
        self.mixture.merge_components(i, j)
    }

    /// Copy with every flagged cluster merged into the first flagged one.
    pub fn with_merged(&self, to_merge: &[bool]) -> Result<Clustering<'a>> {
        if to_merge.len() != self.out_dim() {
            return Err(DmError::DimensionMismatch {
                expected: self.out_dim(),
                found: to_merge.len(),
            });
        }
        let mut out = self.clone();
        if let Some(first) = to_merge.iter().position(|&m| m) {
            for j in ((first + 1)..to_merge.len()).rev() {
                if to_merge[j] {
                    out.merge(first, j)?;
                }
            }
        }
        Ok(out)
    }

    // ── Accessors ──────────────────────────────────────────────────────────

    pub fn mixture(&self) -> &Mixture<MultiNormal> {
        &self.mixture
    }

    pub fn analysis(&self) -> &Analysis<'a> {
        &self.analysis
    }

    /// Per-dimension variance floor.
    pub fn variance_min(&self) -> &[f64] {
        &self.variance_min
    }

    /// Number of clusters.
    pub fn out_dim(&self) -> usize {
        self.mixture.len()
    }

    pub fn cluster(&self, i: usize) -> &MultiNormal {
        &self.mixture.component(i).distribution
    }

    pub fn fitness(&self) -> f64 {
        self.mixture.fitness(&self.analysis).unwrap_or(f64::NAN)
    }

    /// `1 − mean(max posterior)`.
    pub fn confusion(&self) -> f64 {
        self.mixture.confusion(&self.analysis)
    }

    /// Density overlap of clusters `i` and `j`; an error for an unknown index.
    pub fn overlap(&self, i: usize, j: usize) -> Result<f64> {
        self.mixture.overlap(&self.analysis, i, j)
    }

    fn max_posterior(&self, row: usize) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (i, c) in self.mixture.components().iter().enumerate() {
            let p = c.posteriors[row];
            if p.is_nan() {
                continue;
            }
            if best.map_or(true, |(_, b)| p > b) {
                best = Some((i, p));
            }
        }
        best
    }

    // ── Output columns ─────────────────────────────────────────────────────

    /// One probability column per cluster, named `Cluster<i>` (made unique
    /// against `ds`). Rows outside the sample are missing.
    pub fn create_space(&self, ds: &Dataset) -> Result<Vec<RealColumn>> {
        let n = self.analysis.n_rows();
        let mut out = Vec::with_capacity(self.out_dim());
        for (i, c) in self.mixture.components().iter().enumerate() {
            let name = ds.find_new_column_name(&format!("Cluster{}", i + 1));
            let mut col = RealColumn::new(name, RealKind::Probability, n);
            for (row, _) in self.analysis.sample().iter() {
                col.set(row, Some(c.posteriors[row].clamp(0.0, 1.0)))?;
            }
            out.push(col);
        }
        Ok(out)
    }

    /// Nominal column with categories `C1`, `C2`, ...: each sampled row gets
    /// its most probable cluster, or stays missing when that probability is
    /// below `prob_min`.
    pub fn create_nominal_column(&self, name: &str, prob_min: f64) -> Result<NominalColumn> {
        if !(0.0..=1.0).contains(&prob_min) {
            return Err(DmError::InvalidInput(format!(
                "clustering: prob_min {} is not a probability",
                prob_min
            )));
        }
        let mut col = NominalColumn::new(name, self.analysis.n_rows());
        for i in 0..self.out_dim() {
            col.category_index(&format!("C{}", i + 1));
        }
        for (row, _) in self.analysis.sample().iter() {
            if let Some((best, p)) = self.max_posterior(row) {
                if p >= prob_min {
                    col.set(row, Some(best))?;
                }
            }
        }
        Ok(col)
    }

    /// Probability column holding each sampled row's maximal posterior.
    pub fn create_prob_column(&self, name: &str) -> Result<RealColumn> {
        let mut col = RealColumn::new(name, RealKind::Probability, self.analysis.n_rows());
        for (row, _) in self.analysis.sample().iter() {
            let p = self.max_posterior(row).map_or(0.0, |(_, p)| p);
            col.set(row, Some(p.clamp(0.0, 1.0)))?;
        }
        Ok(col)
    }

    /// Relabel rows of clusters that overlap by at least `confused_max`
    /// (transitively) with the smallest label of their group, and sum their
    /// probabilities into `prob`. Categories are then compacted and renamed
    /// `C1`, `C2`, ... Returns whether anything was merged.
    pub fn merge_close(
        &self,
        nominal: &mut NominalColumn,
        prob: &mut RealColumn,
        confused_max: f64,
    ) -> Result<bool> {
        let k = self.out_dim();
        let mut parent: Vec<usize> = (0..k).collect();
        fn root(parent: &mut [usize], mut x: usize) -> usize {
            while parent[x] != x {
                parent[x] = parent[parent[x]];
                x = parent[x];
            }
            x
        }
        for i in 0..k {
            for j in 0..i {
                if self.overlap(i, j)? >= confused_max {
                    let (ri, rj) = (root(&mut parent, i), root(&mut parent, j));
                    parent[ri.max(rj)] = ri.min(rj);
                }
            }
        }
        let groups: Vec<usize> = (0..k).map(|i| root(&mut parent, i)).collect();
        let merged = (0..k).any(|i| groups[i] != i);
        if !merged {
            return Ok(false);
        }

        for (row, _) in self.analysis.sample().iter() {
            let category = match nominal.get(row) {
                Some(c) if c < k => c,
                _ => continue,
            };
            let main = groups[category];
            let members = (0..k).filter(|&i| groups[i] == main);
            if members.clone().count() < 2 {
                continue;
            }
            let p: f64 = members
                .map(|i| self.mixture.component(i).posteriors[row])
                .sum();
            nominal.set(row, Some(main))?;
            prob.set(row, Some(p.clamp(0.0, 1.0)))?;
        }
        nominal.delete_empty_categories();
        let names = (1..=nominal.n_categories()).map(|i| format!("C{}", i)).collect();
        nominal.rename_categories(names)?;
        Ok(true)
    }
}

/// `variance_min[i] = (sd_i or 1)² · min_sd²`.
fn variance_floor(
    sample: &Sample,
    space: &[&RealColumn],
    config: &ClusteringConfig,
) -> Result<Vec<f64>> {
    let rel = config.min_sd * config.min_sd;
    space
        .iter()
        .map(|col| {
            if !config.sd_is_relative {
                return Ok(rel);
            }
            let analysis = Analysis::real(sample.clone(), col)?;
            let mut normal = Normal::new();
            normal.estimate(&analysis)?;
            let var = if normal.is_parameterized() {
                normal.scale() * normal.scale()
            } else {
                debug!(column = col.name(), "no spread for relative variance floor");
                0.0
            };
            Ok(var * rel)
        })
        .collect()
}

impl Summarizable for Clustering<'_> {
    fn summary(&self) -> String {
        let mut s = format!(
            "Clustering: {} clusters, fitness {:.4}, confusion {:.3}",
            self.out_dim(),
            self.fitness(),
            self.confusion()
        );
        for (i, c) in self.mixture.components().iter().enumerate() {
            let mn = &c.distribution;
            let mu: Vec<String> = mn.mu().iter().map(|m| format!("{:.3}", m)).collect();
            s.push_str(&format!(
                "\n  C{}: p={:.3} mu=[{}]",
                i + 1,
                c.probability,
                mu.join(", ")
            ));
            if mn.dim() == 1 {
                s.push_str(&format!(" sd={:.3}", mn.sigma()[(0, 0)].sqrt()));
            }
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmkit_core::Column;
    use dmkit_stats::Univariate;

    const TOL: f64 = 1e-6;

    fn blobs_1d(n: usize, gap: f64) -> RealColumn {
        let mut g = Normal::standard();
        g.set_seed(5);
        let mut values = g.simulate(n);
        g.set_seed(6);
        values.extend(g.simulate(n).into_iter().map(|v| v + gap));
        RealColumn::from_reals("x", &values).unwrap()
    }

    #[test]
    fn two_blobs_give_two_clusters() {
        let x = blobs_1d(500, 10.0);
        let c = Clustering::new(Sample::uniform(x.len()), vec![&x], &ClusteringConfig::default())
            .unwrap();
        assert_eq!(c.out_dim(), 2, "{}", c.summary());
        let m0 = c.cluster(0).mu()[0];
        let m1 = c.cluster(1).mu()[0];
        assert!(m0.abs() < 0.2, "m0 = {}", m0);
        assert!((m1 - 10.0).abs() < 0.2, "m1 = {}", m1);
        let p = c.mixture().probabilities();
        assert!((p[0] - 0.5).abs() < 0.02);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < TOL);
        assert!(c.confusion() < 0.01);
    }

    #[test]
    fn single_blob_stays_single() {
        let mut g = Normal::standard();
        g.set_seed(9);
        let values = g.simulate(400);
        let x = RealColumn::from_reals("x", &values).unwrap();
        let c = Clustering::new(Sample::uniform(400), vec![&x], &ClusteringConfig::default())
            .unwrap();
        assert_eq!(c.out_dim(), 1);
    }

    #[test]
    fn two_dimensional_blobs() {
        let mut g = Normal::standard();
        g.set_seed(21);
        let mut xs = g.simulate(300);
        let mut ys = g.simulate(300);
        xs.extend(g.simulate(300).into_iter().map(|v| v + 8.0));
        ys.extend(g.simulate(300).into_iter().map(|v| v - 8.0));
        let x = RealColumn::from_reals("x", &xs).unwrap();
        let y = RealColumn::from_reals("y", &ys).unwrap();
        let c = Clustering::new(Sample::uniform(600), vec![&x, &y], &ClusteringConfig::default())
            .unwrap();
        assert_eq!(c.out_dim(), 2);
        let mu = c.cluster(1).mu();
        assert!((mu[0] - 8.0).abs() < 0.3 && (mu[1] + 8.0).abs() < 0.3);
    }

    #[test]
    fn output_columns() {
        let x = blobs_1d(100, 10.0);
        let mut ds = Dataset::with_rows(x.len());
        ds.add_column(Column::Real(x)).unwrap();
        let (space, nominal, prob) = {
            let c = Clustering::new(
                ds.sample(),
                ds.space(&["x"]).unwrap(),
                &ClusteringConfig::default(),
            )
            .unwrap();
            (
                c.create_space(&ds).unwrap(),
                c.create_nominal_column("cluster", 0.5).unwrap(),
                c.create_prob_column("cluster_prob").unwrap(),
            )
        };
        assert_eq!(space.len(), 2);
        assert_eq!(space[0].name(), "Cluster1");
        assert_eq!(nominal.categories(), &["C1".to_string(), "C2".to_string()]);
        assert_eq!(nominal.label(0), Some("C1"));
        assert_eq!(nominal.label(150), Some("C2"));
        assert!(prob.get(0).unwrap() > 0.99);
        for col in space {
            ds.add_column(Column::Real(col)).unwrap();
        }
        ds.add_column(Column::Nominal(nominal)).unwrap();
        assert!(ds.real("Cluster2").is_ok());
    }

    #[test]
    fn merge_keeps_probability_mass() {
        let x = blobs_1d(200, 10.0);
        let c = Clustering::new(Sample::uniform(x.len()), vec![&x], &ClusteringConfig::default())
            .unwrap();
        assert_eq!(c.out_dim(), 2);
        let merged = c.with_merged(&[true, true]).unwrap();
        assert_eq!(merged.out_dim(), 1);
        assert!((merged.mixture().component(0).probability - 1.0).abs() < TOL);
        let mu = merged.cluster(0).mu()[0];
        assert!((mu - 5.0).abs() < 0.3);
        assert!(merged.cluster(0).sigma()[(0, 0)] > 20.0);
        for row in 0..x.len() {
            assert!((merged.mixture().component(0).posteriors[row] - 1.0).abs() < TOL);
        }
        assert!(c.with_merged(&[true]).is_err());
    }

    #[test]
    fn final_merge_phase_joins_overlapping_clusters() {
        let x = blobs_1d(200, 10.0);
        let sample = Sample::uniform(x.len());
        let separate = Clustering::new(sample.clone(), vec![&x], &ClusteringConfig::default())
            .unwrap();
        assert_eq!(separate.out_dim(), 2);

        let config = ClusteringConfig {
            merge_overlap: 0.0,
            ..Default::default()
        };
        let joined = Clustering::new(sample, vec![&x], &config).unwrap();
        assert_eq!(joined.out_dim(), separate.out_dim() - 1);
        let p = joined.mixture().probabilities();
        assert!((p.iter().sum::<f64>() - 1.0).abs() < TOL);
        for row in 0..x.len() {
            let total: f64 = joined
                .mixture()
                .components()
                .iter()
                .map(|c| c.posteriors[row])
                .sum();
            assert!((total - 1.0).abs() < TOL, "row {} sums to {}", row, total);
        }
        // moment-matched union of the two blobs
        assert!((joined.cluster(0).mu()[0] - 5.0).abs() < 0.3);
        assert!(joined.cluster(0).sigma()[(0, 0)] > 20.0);
    }

    #[test]
    fn overlap_rejects_unknown_cluster() {
        let x = blobs_1d(100, 10.0);
        let c = Clustering::new(Sample::uniform(x.len()), vec![&x], &ClusteringConfig::default())
            .unwrap();
        assert!(c.overlap(0, 1).unwrap() < 0.01);
        assert!(matches!(c.overlap(0, c.out_dim()), Err(DmError::InvalidInput(_))));
    }

    #[test]
    fn merge_close_relabels_confused_clusters() {
        let x = blobs_1d(200, 10.0);
        let c = Clustering::new(Sample::uniform(x.len()), vec![&x], &ClusteringConfig::default())
            .unwrap();
        let mut nominal = c.create_nominal_column("cl", 0.0).unwrap();
        let mut prob = c.create_prob_column("p").unwrap();
        assert!(!c.merge_close(&mut nominal, &mut prob, 0.4).unwrap());
        assert!(c.merge_close(&mut nominal, &mut prob, 0.0).unwrap());
        assert_eq!(nominal.n_categories(), 1);
        assert!((prob.get(0).unwrap() - 1.0).abs() < TOL);
    }

    #[test]
    fn variance_floor_is_relative() {
        let x = RealColumn::from_reals("x", &[0.0, 2.0, 0.0, 2.0]).unwrap();
        let config = ClusteringConfig {
            min_sd: 0.5,
            ..Default::default()
        };
        let c = Clustering::new(Sample::uniform(4), vec![&x], &config).unwrap();
        assert!((c.variance_min()[0] - 0.25).abs() < TOL);
        let absolute = ClusteringConfig {
            min_sd: 0.5,
            sd_is_relative: false,
            ..Default::default()
        };
        let c = Clustering::new(Sample::uniform(4), vec![&x], &absolute).unwrap();
        assert!((c.variance_min()[0] - 0.25).abs() < TOL);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let x = RealColumn::from_reals("x", &[0.0, 1.0]).unwrap();
        let config = ClusteringConfig {
            max_clusters: 1,
            ..Default::default()
        };
        assert!(Clustering::new(Sample::uniform(2), vec![&x], &config).is_err());
    }

    #[test]
    fn empty_sample_leaves_one_unfitted_cluster() {
        let x = RealColumn::from_reals("x", &[1.0, 2.0]).unwrap();
        let c = Clustering::new(
            Sample::new(vec![0.0, 0.0]).unwrap(),
            vec![&x],
            &ClusteringConfig::default(),
        )
        .unwrap();
        assert_eq!(c.out_dim(), 1);
        assert!(!c.mixture().is_parameterized());
    }
}
