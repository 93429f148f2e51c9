use crate::utils::DynamicEnum;
use crate::utils::{Metric, Statistic};
use rand::rngs::SmallRng; // use SmallRng intestad of StdRng to speedup shuffling
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;

pub trait EnrichmentScoreTrait {
    /// full running enrichment score curve
    fn running_enrichment_score(&self, metric: &[f64], tag_indicator: &[f64]) -> Vec<f64>;
    /// fast GSEA, only the ES value is returned
    fn fast_random_walk(&self, metric: &[f64], tag_indicator: &[f64]) -> f64;
    /// calculate ranking metric per gene, not sorted
    fn calculate_metric(&self, data: &[Vec<f64>], group: &[bool], method: Metric) -> Vec<f64>;
}

/// Weights of the hit steps. Falls back to equal weights when every hit has a zero metric.
fn hit_weights(metric: &[f64], tag_indicator: &[f64]) -> (Vec<f64>, f64) {
    let correl: Vec<f64> = tag_indicator
        .iter()
        .zip(metric.iter())
        .map(|(&b, &v)| b * v)
        .collect();
    let sum: f64 = correl.iter().sum();
    if sum > 0.0 {
        (correl, sum)
    } else {
        let k: f64 = tag_indicator.iter().sum();
        (tag_indicator.to_vec(), k)
    }
}

/// standard deviation floor used by the class-comparison metrics
fn floored_std(mean: f64, std: f64) -> f64 {
    let floor = if mean == 0.0 { 0.2 } else { 0.2 * mean.abs() };
    std.max(floor)
}

#[derive(Debug)]
pub struct EnrichmentScore {
    pub gene: DynamicEnum<String>, // gene names
    nperm: usize,                  // number of permutations, plus one for the observed record
    rng: SmallRng,
}

impl EnrichmentScoreTrait for EnrichmentScore {
    fn running_enrichment_score(&self, metric: &[f64], tag_indicator: &[f64]) -> Vec<f64> {
        let n: f64 = tag_indicator.len() as f64;
        let n_hit: f64 = tag_indicator.iter().sum();
        let n_miss: f64 = n - n_hit;
        let norm_notag: f64 = if n_miss > 0.0 { 1.0 / n_miss } else { 0.0 };
        let (sum_correl_tag, total) = hit_weights(metric, tag_indicator);
        let norm_tag: f64 = if total > 0.0 { 1.0 / total } else { 0.0 };
        // cumsum()
        sum_correl_tag
            .iter()
            .zip(tag_indicator.iter())
            .map(|(&c, &b)| c * norm_tag - (1.0 - b) * norm_notag)
            .scan(0.0, |acc, x| {
                *acc += x;
                Some(*acc)
            })
            .collect()
    }

    /// see here: https://github.com/ctlab/fgsea/blob/master/src/esCalculation.cpp
    fn fast_random_walk(&self, metric: &[f64], tag_indicator: &[f64]) -> f64 {
        // tag_indicator and metric must be sorted
        let (weights, ns) = hit_weights(metric, tag_indicator);
        let n: f64 = metric.len() as f64;
        let k: f64 = tag_indicator.iter().sum::<f64>();
        if ns <= 0.0 {
            return 0.0;
        }
        let q1: f64 = if n > k { 1.0 / (n - k) } else { 0.0 };
        let q2: f64 = 1.0 / ns;
        let mut res: f64 = 0.0; // running_es
        let mut cur: f64 = 0.0;
        let mut last: f64 = -1.0;
        for (pos, &t) in tag_indicator.iter().enumerate() {
            if t <= 0.0 {
                continue;
            }
            let pos = pos as f64;
            cur -= q1 * (pos - last - 1.0);
            if cur.abs() > res.abs() {
                res = cur;
            }
            cur += q2 * weights[pos as usize];
            if cur.abs() > res.abs() {
                res = cur;
            }
            last = pos;
        }
        // the tail after the last hit only moves toward zero
        res
    }

    fn calculate_metric(&self, data: &[Vec<f64>], group: &[bool], method: Metric) -> Vec<f64> {
        data.iter()
            .map(|vec| {
                let mut pos: Vec<f64> = Vec::new();
                let mut neg: Vec<f64> = Vec::new();
                vec.iter().zip(group.iter()).for_each(|(&x, &b)| {
                    if b {
                        pos.push(x);
                    } else {
                        neg.push(x);
                    }
                });
                let pos_len = pos.len() as f64;
                let neg_len = neg.len() as f64;
                let (pos_mean, pos_std) = pos.as_slice().stat(1);
                let (neg_mean, neg_std) = neg.as_slice().stat(1);
                let pos_std = floored_std(pos_mean, pos_std);
                let neg_std = floored_std(neg_mean, neg_std);
                match method {
                    Metric::Signal2Noise => (pos_mean - neg_mean) / (pos_std + neg_std),
                    Metric::AbsSignal2Noise => ((pos_mean - neg_mean) / (pos_std + neg_std)).abs(),
                    Metric::Ttest => {
                        (pos_mean - neg_mean)
                            / (pos_std * pos_std / pos_len + neg_std * neg_std / neg_len).sqrt()
                    }
                    Metric::RatioOfClasses => pos_mean / neg_mean,
                    Metric::Log2RatioOfClasses => (pos_mean / neg_mean).log2(),
                    Metric::DiffOfClasses => pos_mean - neg_mean,
                }
            })
            .collect()
    }
}

impl EnrichmentScore {
    pub fn new(gene: &[String], nperm: usize, seed: u64) -> Self {
        EnrichmentScore {
            gene: DynamicEnum::from(gene),
            nperm: nperm + 1, // add 1 to kept track of original record
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn hit_index(&self, tag_indicator: &[f64]) -> Vec<usize> {
        tag_indicator
            .iter()
            .enumerate()
            .filter_map(|(i, &t)| if t > 0.0 { Some(i) } else { None })
            .collect()
    }

    /// ES is the running-sum extreme with the largest magnitude
    pub fn select_es(&self, run_es: &[f64]) -> f64 {
        let max = run_es.iter().fold(f64::MIN, |a, b| a.max(*b));
        let min = run_es.iter().fold(f64::MAX, |a, b| a.min(*b));
        if max.abs() > min.abs() {
            max
        } else {
            min
        }
    }

    /// phenotype permutation procedure
    /// shuffling group labels and calculate the new ranking metric
    /// return a vector of argsorted tuples (indices, sorted_metric), descending.
    /// element 0 is the observed labelling.
    /// data - 2d vector [m_genes, n_samples]
    pub fn phenotype_permutation(
        &mut self,
        data: &[Vec<f64>],
        group: &[bool],
        method: Metric,
    ) -> Vec<(Vec<usize>, Vec<f64>)> {
        let mut group_nperm = vec![group.to_vec(); self.nperm];
        for g in group_nperm.iter_mut().skip(1) {
            g.shuffle(&mut self.rng);
        }
        group_nperm
            .par_iter()
            .map(|group_rng| {
                let m = self.calculate_metric(data, group_rng, method);
                m.as_slice().argsort(false)
            })
            .collect()
    }

    /// gene permutation procedure.
    /// shufling the genes in the given ranking metric, use for prerank.
    /// only kept record of gene indexes of original order to accerrlate the shuffling
    pub fn gene_permutation(&mut self) -> Vec<DynamicEnum<usize>> {
        let vec: Vec<usize> = (0..self.gene.size()).collect();
        let mut orig: DynamicEnum<usize> = DynamicEnum::from(&vec);
        let mut gperm: Vec<DynamicEnum<usize>> = Vec::with_capacity(self.nperm);
        gperm.push(orig.clone());
        for _ in 1..self.nperm {
            orig.shuffle(&mut self.rng);
            gperm.push(orig.clone());
        }
        gperm
    }

    /// gene_set permutation procedure.
    /// return (enrichment_scores, running_es) where element 0 of the scores is the observed ES
    pub fn enrichment_score_gene(
        &self,
        metric: &[f64],
        tag_indicators: &[Vec<f64>],
    ) -> (Vec<f64>, Vec<f64>) {
        let es: Vec<f64> = tag_indicators
            .par_iter()
            .map(|tag| self.fast_random_walk(metric, tag))
            .collect();
        let run_es = self.running_enrichment_score(metric, &tag_indicators[0]);
        (es, run_es)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn genes(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("G{i}")).collect()
    }

    #[test]
    fn running_es_matches_random_walk() {
        let es = EnrichmentScore::new(&genes(10), 0, 0);
        let metric = vec![9.0, 4.0, 3.0, 2.0, 1.0, 0.5, 0.1, 0.1, 0.05, 0.01];
        let tag = vec![1.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0];
        let run = es.running_enrichment_score(&metric, &tag);
        assert_eq!(run.len(), 10);
        // the curve returns to zero at the end
        assert!(run[9].abs() < 1e-12);
        let fast = es.fast_random_walk(&metric, &tag);
        assert!((es.select_es(&run) - fast).abs() < 1e-12);
        assert!(fast > 0.0);
    }

    #[test]
    fn all_zero_hits_do_not_produce_nan() {
        let es = EnrichmentScore::new(&genes(4), 0, 0);
        let metric = vec![1.0, 0.0, 0.0, -1.0];
        let tag = vec![0.0, 1.0, 1.0, 0.0];
        let run = es.running_enrichment_score(&metric, &tag);
        assert!(run.iter().all(|x| x.is_finite()));
        assert!(es.fast_random_walk(&metric, &tag).is_finite());
    }

    #[test]
    fn signal_to_noise_with_std_floor() {
        let es = EnrichmentScore::new(&genes(2), 0, 0);
        let data = vec![vec![2.0, 2.0, 1.0, 1.0], vec![1.0, 3.0, 1.0, 1.0]];
        let group = vec![true, true, false, false];
        let m = es.calculate_metric(&data, &group, Metric::Signal2Noise);
        // constant classes: std floored at 0.2*|mean|
        assert!((m[0] - 1.0 / (0.4 + 0.2)).abs() < 1e-12);
        assert!(m[1].is_finite());
    }

    #[test]
    fn permutations_are_seeded() {
        let data = vec![vec![1.0, 2.0, 3.0, 4.0]; 3];
        let group = vec![true, true, false, false];
        let mut a = EnrichmentScore::new(&genes(3), 5, 42);
        let mut b = EnrichmentScore::new(&genes(3), 5, 42);
        let pa = a.phenotype_permutation(&data, &group, Metric::DiffOfClasses);
        let pb = b.phenotype_permutation(&data, &group, Metric::DiffOfClasses);
        assert_eq!(pa.len(), 6);
        assert_eq!(pa, pb);
        let ga: Vec<Vec<usize>> = a.gene_permutation().iter().map(|d| d.get_vec().clone()).collect();
        let gb: Vec<Vec<usize>> = b.gene_permutation().iter().map(|d| d.get_vec().clone()).collect();
        assert_eq!(ga, gb);
        assert_eq!(ga[0], vec![0, 1, 2]);
    }
}
