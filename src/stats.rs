use crate::algorithm::{EnrichmentScore, EnrichmentScoreTrait};
use crate::data::GeneSetCollection;
use crate::utils::{Metric, Statistic};
use itertools::izip;
use rayon::prelude::*;
use tracing::debug;

/// Per-term statistics straight out of the permutation procedure.
#[derive(Debug, Clone, Default)]
pub struct GseaSummary {
    pub term: String,
    pub es: f64,
    pub nes: f64,
    pub pval: f64, // Nominal Pvalue
    pub fwerp: f64, // FWER Pvalue
    pub fdr: f64, // FDR q value. adjusted FDR
    pub run_es: Vec<f64>,
    pub hits: Vec<usize>, // indices of genes that matches, in ranked order
    pub esnull: Vec<f64>,
}

impl GseaSummary {
    fn normalize(&mut self) -> Vec<f64> {
        let e: f64 = self.es;
        let tmp: Vec<f64> = if e >= 0.0 {
            self.esnull.iter().copied().filter(|&x| x >= 0.0).collect()
        } else {
            self.esnull.iter().copied().filter(|&x| x < 0.0).collect()
        };

        // When input a rare causes of an extreamly screwed null distribution. e.g.
        // es = - 27, esnull = [13, 24, 57, 88]
        // nes will be NaN. a tricky fixed here: set n_mean as itself
        let n_mean = if !tmp.is_empty() {
            tmp.iter().sum::<f64>() / (tmp.len() as f64)
        } else {
            e
        };
        let scale = |x: f64| {
            if n_mean == 0.0 {
                0.0
            } else if x >= 0.0 {
                x / n_mean
            } else {
                -1.0 * x / n_mean
            }
        };
        self.nes = scale(e);
        // normalized esnull, kept only for FDR/FWER
        self.esnull.iter().map(|&x| scale(x)).collect()
    }

    fn pval(&mut self) {
        let (deno, nomi) = if self.es < 0.0 {
            (
                self.esnull.iter().filter(|&x| *x < 0.0).count(),
                self.esnull.iter().filter(|&x| x < &self.es).count(),
            )
        } else {
            (
                self.esnull.iter().filter(|&x| *x >= 0.0).count(),
                self.esnull.iter().filter(|&x| x >= &self.es).count(),
            )
        };
        self.pval = if deno == 0 {
            1.0
        } else {
            (nomi as f64) / (deno as f64)
        };
    }
}

/// Permutation-based GSEA over a whole gene-set collection.
#[derive(Debug, Clone)]
pub struct GseaResult {
    pub summaries: Vec<GseaSummary>,
    /// gene names in ranked order (descending metric)
    pub ranking: Vec<String>,
    /// observed ranking metric, same order as `ranking`
    pub rank_metric: Vec<f64>,
    weight: f64,
    min_size: usize,
    max_size: usize,
    nperm: usize,
    nes_concat: Vec<f64>,
    nesnull_concat: Vec<f64>,
    seed: u64,
}

impl GseaResult {
    pub fn new(weight: f64, max_size: usize, min_size: usize, nperm: usize, seed: u64) -> Self {
        GseaResult {
            summaries: Vec::new(),
            ranking: Vec::new(),
            rank_metric: Vec::new(),
            weight,
            max_size,
            min_size,
            nperm,
            nes_concat: Vec::new(),
            nesnull_concat: Vec::new(),
            seed,
        }
    }

    fn in_bounds(&self, size: usize, n_genes: usize) -> bool {
        size >= self.min_size && size <= self.max_size && size > 0 && size < n_genes
    }

    pub fn stat(&mut self, summary: &mut [GseaSummary]) {
        self.nes_concat.clear();
        self.nesnull_concat.clear();

        summary.iter_mut().for_each(|g| {
            g.pval();
            let mut nesnull = g.normalize();
            self.nes_concat.push(g.nes);
            self.nesnull_concat.append(&mut nesnull);
        });
        let fwerps: Vec<f64> = self.fwer_pval();
        let fdrs = self.fdr();
        for (p, q, g) in izip!(fwerps, fdrs, summary) {
            g.fdr = q;
            g.fwerp = p;
        }
        self.nes_concat.clear();
        self.nesnull_concat.clear();
    }

    pub fn fdr(&mut self) -> Vec<f64> {
        // sort ascending in place, then binary search
        self.nesnull_concat.sort_unstable_by(|a, b| a.total_cmp(b));
        let (indices, nes_sorted) = self.nes_concat.as_slice().argsort(true);

        // partition_point returns the index of the first element of the second partition
        let all_idx = self.nesnull_concat.partition_point(|x| *x < 0.0);
        let nes_idx = nes_sorted.partition_point(|x| *x < 0.0);

        let mut fdrs: Vec<f64> = nes_sorted
            .iter()
            .map(|&e| {
                let (nes_higher, all_higher, all_pos, nes_pos) = if e < 0.0 {
                    (
                        nes_sorted.partition_point(|x| *x < e) + 1, // include itself
                        self.nesnull_concat.partition_point(|x| *x < e),
                        all_idx,
                        nes_idx,
                    )
                } else {
                    (
                        nes_sorted.len() - nes_sorted.partition_point(|x| *x < e),
                        self.nesnull_concat.len() - self.nesnull_concat.partition_point(|x| *x < e),
                        self.nesnull_concat.len() - all_idx,
                        nes_sorted.len() - nes_idx,
                    )
                };
                if all_pos == 0 || nes_pos == 0 {
                    return 1.0;
                }
                let pi_norm = (all_higher as f64) / (all_pos as f64);
                let pi_obs = (nes_higher as f64) / (nes_pos as f64);
                (pi_norm / pi_obs).min(1.0)
            })
            .collect();

        self.adjust_fdr(&mut fdrs, nes_idx);
        let mut fdr_orig_order: Vec<f64> = vec![0.0; fdrs.len()];
        indices.iter().zip(fdrs.iter()).for_each(|(&i, &v)| {
            fdr_orig_order[i] = v;
        });
        fdr_orig_order
    }

    /// # adjust fdr q-values
    /// see line 880:  https://github.com/GSEA-MSigDB/GSEA_R/blob/master/R/GSEA.R
    /// - fdrs:  Corresponds to the ascending order of NES.
    /// - partition_point_idx: the index of the first non-negative NES
    /// q-values become monotone moving away from zero on both sides.
    fn adjust_fdr(&self, fdrs: &mut [f64], partition_point_idx: usize) {
        if partition_point_idx < fdrs.len() {
            let mut min_fdr = fdrs[partition_point_idx];
            for k in partition_point_idx + 1..fdrs.len() {
                min_fdr = min_fdr.min(fdrs[k]);
                fdrs[k] = min_fdr;
            }
        }
        if partition_point_idx > 0 {
            let mut min_fdr = fdrs[partition_point_idx - 1];
            for k in (0..partition_point_idx).rev() {
                min_fdr = min_fdr.min(fdrs[k]);
                fdrs[k] = min_fdr;
            }
        }
    }

    /// Compute FWER p-vals
    /// line 788: https://github.com/GSEA-MSigDB/GSEA_R/blob/master/R/GSEA.R
    fn fwer_pval(&self) -> Vec<f64> {
        if self.nperm == 0 {
            return vec![1.0; self.nes_concat.len()];
        }
        // nesnull is a [n_genesets, n_perm] matrix, row-major
        let mut max_nes_pos = vec![0.0; self.nperm];
        let mut min_nes_neg = vec![0.0; self.nperm];
        self.nesnull_concat.iter().enumerate().for_each(|(i, &e)| {
            let idx = i % self.nperm;
            if e >= 0.0 {
                max_nes_pos[idx] = e.max(max_nes_pos[idx]);
            } else {
                min_nes_neg[idx] = e.min(min_nes_neg[idx]);
            }
        });

        self.nes_concat
            .par_iter()
            .map(|e| {
                if e < &0.0 {
                    let deno = min_nes_neg.iter().filter(|&x| x < &0.0).count();
                    if deno == 0 {
                        return 1.0;
                    }
                    (min_nes_neg.iter().filter(|&x| x < e).count() as f64) / (deno as f64)
                } else {
                    (max_nes_pos.iter().filter(|&x| x >= e).count() as f64)
                        / (max_nes_pos.len() as f64)
                }
            })
            .collect()
    }
}

/// impl pipelines
impl GseaResult {
    /// phenotype permutation GSEA. `gene_exp` is [n_genes][n_samples].
    pub fn gsea(
        &mut self,
        genes: &[String],
        group: &[bool],
        gene_exp: &[Vec<f64>],
        gmt: &GeneSetCollection,
        method: Metric,
    ) {
        let mut es = EnrichmentScore::new(genes, self.nperm, self.seed);
        let sorted_metric: Vec<(Vec<usize>, Vec<f64>)> =
            es.phenotype_permutation(gene_exp, group, method);
        let n_genes = genes.len();

        let mut summ = Vec::<GseaSummary>::new();
        for (term, gset) in gmt.sets.iter() {
            let tag = es.gene.isin(gset);
            // hit index of the observed ranking
            let tag_new: Vec<f64> = sorted_metric[0].0.iter().map(|&i| tag[i]).collect();
            let gidx = es.hit_index(&tag_new);
            if !self.in_bounds(gidx.len(), n_genes) {
                debug!(term = %term, size = gidx.len(), "gene set filtered by size");
                continue;
            }
            let run_es: Vec<Vec<f64>> = sorted_metric
                .par_iter()
                .map(|(indices, gm)| {
                    let weighted_gm: Vec<f64> = gm.iter().map(|x| x.abs().powf(self.weight)).collect();
                    let tag_new: Vec<f64> = indices.iter().map(|&i| tag[i]).collect();
                    es.running_enrichment_score(&weighted_gm, &tag_new)
                })
                .collect();
            let ess: Vec<f64> = run_es.par_iter().map(|r| es.select_es(r)).collect();
            summ.push(GseaSummary {
                term: term.to_string(),
                es: ess[0],
                run_es: run_es[0].to_owned(),
                hits: gidx,
                esnull: ess[1..].to_owned(),
                ..Default::default()
            });
        }
        self.stat(&mut summ);
        self.summaries = summ;
        let (indices, metric) = &sorted_metric[0];
        self.ranking = indices.iter().map(|&i| genes[i].clone()).collect();
        self.rank_metric = metric.clone();
    }

    /// gene permutation GSEA. `genes`/`metric` must already be sorted descending
    /// and free of duplicated genes.
    pub fn prerank(&mut self, genes: &[String], metric: &[f64], gmt: &GeneSetCollection) {
        let weighted_metric: Vec<f64> = metric.iter().map(|x| x.abs().powf(self.weight)).collect();
        let mut es = EnrichmentScore::new(genes, self.nperm, self.seed);
        let gperm = es.gene_permutation(); // only record gene idx here
        let n_genes = genes.len();
        let mut summ = Vec::<GseaSummary>::new();

        for (term, gset) in gmt.sets.iter() {
            let gtag = es.gene.isin(gset);
            let gidx = es.hit_index(&gtag);
            if !self.in_bounds(gidx.len(), n_genes) {
                debug!(term = %term, size = gidx.len(), "gene set filtered by size");
                continue;
            }
            let tag_indicators: Vec<Vec<f64>> = gperm.par_iter().map(|de| de.isin(&gidx)).collect();
            let (ess, run_es) = es.enrichment_score_gene(&weighted_metric, &tag_indicators);
            summ.push(GseaSummary {
                term: term.to_string(),
                es: ess[0],
                run_es,
                hits: gidx,
                esnull: ess[1..].to_owned(),
                ..Default::default()
            });
        }
        self.stat(&mut summ);
        self.summaries = summ;
        self.ranking = genes.to_vec();
        self.rank_metric = metric.to_vec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection() -> GeneSetCollection {
        GeneSetCollection {
            sets: vec![
                ("TOP".into(), vec!["G0".into(), "G1".into(), "G2".into(), "G3".into()]),
                ("BOTTOM".into(), vec!["G16".into(), "G17".into(), "G18".into(), "G19".into()]),
                ("TINY".into(), vec!["G5".into()]),
                ("ABSENT".into(), vec!["X1".into(), "X2".into(), "X3".into()]),
            ],
        }
    }

    #[test]
    fn test_prerank() {
        let genes: Vec<String> = (0..20).map(|i| format!("G{i}")).collect();
        let metric: Vec<f64> = (0..20).map(|i| 10.0 - i as f64).collect();
        let mut gsea = GseaResult::new(1.0, 500, 3, 50, 123);
        gsea.prerank(&genes, &metric, &collection());
        let terms: Vec<&str> = gsea.summaries.iter().map(|s| s.term.as_str()).collect();
        assert_eq!(terms, vec!["TOP", "BOTTOM"]);
        let top = &gsea.summaries[0];
        let bottom = &gsea.summaries[1];
        assert!(top.es > 0.9);
        assert!(bottom.es < -0.9);
        assert_eq!(top.hits, vec![0, 1, 2, 3]);
        for s in &gsea.summaries {
            assert!((0.0..=1.0).contains(&s.pval));
            assert!((0.0..=1.0).contains(&s.fdr));
            assert!((0.0..=1.0).contains(&s.fwerp));
            assert_eq!(s.esnull.len(), 50);
            assert_eq!(s.run_es.len(), 20);
        }
        assert_eq!(gsea.ranking, genes);
    }

    #[test]
    fn test_gsea_deterministic() {
        let genes: Vec<String> = (0..20).map(|i| format!("G{i}")).collect();
        // first genes up in the positive class, last genes down
        let gene_exp: Vec<Vec<f64>> = (0..20)
            .map(|i| {
                let shift = 10.0 - i as f64;
                vec![5.0 + shift, 5.2 + shift, 4.9 + shift, 5.0, 5.1, 4.8]
            })
            .collect();
        let group = vec![true, true, true, false, false, false];
        let run = || {
            let mut g = GseaResult::new(1.0, 500, 3, 20, 7);
            g.gsea(&genes, &group, &gene_exp, &collection(), Metric::Signal2Noise);
            g
        };
        let a = run();
        let b = run();
        assert_eq!(a.summaries.len(), 2);
        for (x, y) in a.summaries.iter().zip(b.summaries.iter()) {
            assert_eq!(x.term, y.term);
            assert_eq!(x.es, y.es);
            assert_eq!(x.pval, y.pval);
        }
        assert_eq!(a.ranking.len(), 20);
        assert_eq!(a.ranking[0], "G0");
        assert!(a.summaries[0].es > 0.0);
    }

    #[test]
    fn fdr_is_monotone_and_bounded() {
        let mut r = GseaResult::new(1.0, 500, 1, 4, 0);
        r.nes_concat = vec![2.0, 1.0, -1.5];
        r.nesnull_concat = vec![
            0.5, 1.1, -0.2, 0.9, // term 0
            0.8, -1.0, 1.3, 0.2, // term 1
            -0.4, -1.7, 0.3, -0.9, // term 2
        ];
        let q = r.fdr();
        assert_eq!(q.len(), 3);
        assert!(q.iter().all(|x| (0.0..=1.0).contains(x)));
        // the larger NES never has a larger q-value
        assert!(q[0] <= q[1]);
    }
}
