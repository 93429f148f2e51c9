//! Enrichment engine: turns a ranked (or rankable) dataset and a gene-set
//! collection into per-term statistics.
//!
//! The orchestration only talks to [`EnrichmentEngine`]; [`PermutationEngine`]
//! is the native implementation built on [`GseaResult`].
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::data::{ExpressionDataset, GeneSetCollection, PhenotypeLabels, RankedList};
use crate::error::{GseaError, Result};
use crate::stats::{GseaResult, GseaSummary};
use crate::utils::Metric;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisMode {
    Phenotype,
    Prerank,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineParams {
    pub nperm: usize,
    pub min_size: usize,
    pub max_size: usize,
    pub weight: f64,
    pub method: Metric,
    pub seed: u64,
    pub threads: usize,
}

/// One tested term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermResult {
    pub term: String,
    pub es: f64,
    pub nes: f64,
    pub pval: f64,
    pub fdr: f64,
    pub fwerp: f64,
    /// running enrichment score over the ranked gene axis
    pub res: Vec<f64>,
    /// positions in the ranking that belong to the term
    pub hits: Vec<usize>,
    pub lead_genes: Vec<String>,
    pub tag_pct: String,
    pub gene_pct: String,
}

/// Expression rows of every leading-edge gene.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HeatmapMatrix {
    pub genes: Vec<String>,
    pub samples: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

impl HeatmapMatrix {
    pub fn row(&self, gene: &str) -> Option<&[f64]> {
        self.genes
            .iter()
            .position(|g| g == gene)
            .map(|i| self.values[i].as_slice())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnrichmentResult {
    /// ordered by |NES| descending, then term name
    pub terms: Vec<TermResult>,
    /// gene names in ranked order
    pub ranking: Vec<String>,
    /// ranking metric, aligned with `ranking`
    pub rank_metric: Vec<f64>,
    /// phenotype mode only
    pub heatmap: Option<HeatmapMatrix>,
}

impl EnrichmentResult {
    pub fn term(&self, name: &str) -> Option<&TermResult> {
        self.terms.iter().find(|t| t.term == name)
    }

    pub fn records(&self) -> Vec<ResultRecord> {
        self.terms.iter().map(ResultRecord::from).collect()
    }
}

/// Row of the result table as printed on stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    #[serde(rename = "Term")]
    pub term: String,
    #[serde(rename = "ES")]
    pub es: f64,
    #[serde(rename = "NES")]
    pub nes: f64,
    #[serde(rename = "NOM p-val")]
    pub pval: f64,
    #[serde(rename = "FDR q-val")]
    pub fdr: f64,
    #[serde(rename = "FWER p-val")]
    pub fwerp: f64,
    #[serde(rename = "Tag %")]
    pub tag_pct: String,
    #[serde(rename = "Gene %")]
    pub gene_pct: String,
    #[serde(rename = "Lead_genes")]
    pub lead_genes: String,
}

impl From<&TermResult> for ResultRecord {
    fn from(t: &TermResult) -> Self {
        ResultRecord {
            term: t.term.clone(),
            es: t.es,
            nes: t.nes,
            pval: t.pval,
            fdr: t.fdr,
            fwerp: t.fwerp,
            tag_pct: t.tag_pct.clone(),
            gene_pct: t.gene_pct.clone(),
            lead_genes: t.lead_genes.join(";"),
        }
    }
}

pub trait EnrichmentEngine {
    /// Phenotype-permutation GSEA on an expression matrix.
    fn phenotype(
        &self,
        data: &ExpressionDataset,
        labels: &PhenotypeLabels,
        gene_sets: &GeneSetCollection,
        params: &EngineParams,
    ) -> Result<EnrichmentResult>;

    /// Gene-permutation GSEA on a ranked list.
    fn prerank(
        &self,
        rnk: &RankedList,
        gene_sets: &GeneSetCollection,
        params: &EngineParams,
    ) -> Result<EnrichmentResult>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PermutationEngine;

impl PermutationEngine {
    fn pool(threads: usize) -> Result<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .build()
            .map_err(|e| GseaError::Engine(e.to_string()))
    }
}

impl EnrichmentEngine for PermutationEngine {
    fn phenotype(
        &self,
        data: &ExpressionDataset,
        labels: &PhenotypeLabels,
        gene_sets: &GeneSetCollection,
        params: &EngineParams,
    ) -> Result<EnrichmentResult> {
        let group = labels.positive_mask();
        if group.len() != data.n_samples() {
            return Err(GseaError::Engine(format!(
                "{} labels for {} samples",
                group.len(),
                data.n_samples()
            )));
        }
        let mut gsea = GseaResult::new(
            params.weight,
            params.max_size,
            params.min_size,
            params.nperm,
            params.seed,
        );
        Self::pool(params.threads)?.install(|| {
            gsea.gsea(&data.genes, &group, &data.values, gene_sets, params.method)
        });
        let mut result = assemble(gsea)?;
        result.heatmap = Some(leading_edge_matrix(&result.terms, data));
        info!(terms = result.terms.len(), "phenotype permutation GSEA finished");
        Ok(result)
    }

    fn prerank(
        &self,
        rnk: &RankedList,
        gene_sets: &GeneSetCollection,
        params: &EngineParams,
    ) -> Result<EnrichmentResult> {
        let mut gsea = GseaResult::new(
            params.weight,
            params.max_size,
            params.min_size,
            params.nperm,
            params.seed,
        );
        Self::pool(params.threads)?
            .install(|| gsea.prerank(&rnk.genes, &rnk.scores, gene_sets));
        let result = assemble(gsea)?;
        info!(terms = result.terms.len(), "prerank GSEA finished");
        Ok(result)
    }
}

/// Position of the ES peak in the running curve: first maximum for ES >= 0,
/// first minimum otherwise.
fn peak_index(res: &[f64], es: f64) -> usize {
    let mut idx = 0;
    for (i, &v) in res.iter().enumerate() {
        let better = if es >= 0.0 { v > res[idx] } else { v < res[idx] };
        if better {
            idx = i;
        }
    }
    idx
}

fn term_result(s: GseaSummary, ranking: &[String]) -> TermResult {
    let n = s.run_es.len().max(1);
    let peak = peak_index(&s.run_es, s.es);
    let lead: Vec<usize> = if s.es >= 0.0 {
        s.hits.iter().copied().filter(|&h| h <= peak).collect()
    } else {
        s.hits.iter().copied().filter(|&h| h >= peak).collect()
    };
    let gene_frac = if s.es >= 0.0 {
        (peak + 1) as f64 / n as f64
    } else {
        (n - peak) as f64 / n as f64
    };
    TermResult {
        tag_pct: format!("{}/{}", lead.len(), s.hits.len()),
        gene_pct: format!("{:.2}%", gene_frac * 100.0),
        lead_genes: lead.iter().map(|&i| ranking[i].clone()).collect(),
        term: s.term,
        es: s.es,
        nes: s.nes,
        pval: s.pval,
        fdr: s.fdr,
        fwerp: s.fwerp,
        res: s.run_es,
        hits: s.hits,
    }
}

fn assemble(gsea: GseaResult) -> Result<EnrichmentResult> {
    if gsea.summaries.is_empty() {
        return Err(GseaError::Engine(
            "No gene sets passed through filtering condition".to_string(),
        ));
    }
    let GseaResult {
        summaries,
        ranking,
        rank_metric,
        ..
    } = gsea;
    let mut terms: Vec<TermResult> = summaries
        .into_iter()
        .map(|s| term_result(s, &ranking))
        .collect();
    terms.sort_by(|a, b| {
        b.nes
            .abs()
            .total_cmp(&a.nes.abs())
            .then_with(|| a.term.cmp(&b.term))
    });
    Ok(EnrichmentResult {
        terms,
        ranking,
        rank_metric,
        heatmap: None,
    })
}

fn leading_edge_matrix(terms: &[TermResult], data: &ExpressionDataset) -> HeatmapMatrix {
    let rows: HashMap<&str, usize> = data
        .genes
        .iter()
        .enumerate()
        .map(|(i, g)| (g.as_str(), i))
        .collect();
    let mut mat = HeatmapMatrix {
        samples: data.samples.clone(),
        ..Default::default()
    };
    for gene in terms.iter().flat_map(|t| t.lead_genes.iter()) {
        if mat.genes.contains(gene) {
            continue;
        }
        if let Some(&i) = rows.get(gene.as_str()) {
            mat.genes.push(gene.clone());
            mat.values.push(data.values[i].clone());
        }
    }
    mat
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(threads: usize) -> EngineParams {
        EngineParams {
            nperm: 30,
            min_size: 3,
            max_size: 100,
            weight: 1.0,
            method: Metric::Signal2Noise,
            seed: 7,
            threads,
        }
    }

    fn gene_sets() -> GeneSetCollection {
        GeneSetCollection {
            sets: vec![
                ("UP".into(), vec!["G0".into(), "G1".into(), "G2".into(), "G4".into()]),
                ("DOWN".into(), vec!["G15".into(), "G17".into(), "G18".into(), "G19".into()]),
                ("MIXED".into(), vec!["G3".into(), "G9".into(), "G12".into()]),
            ],
        }
    }

    fn dataset() -> ExpressionDataset {
        let genes: Vec<String> = (0..20).map(|i| format!("G{i}")).collect();
        let values = (0..20)
            .map(|i| {
                let s = 10.0 - i as f64;
                vec![6.0 + s, 6.3 + s, 5.8 + s, 6.1 + s, 6.0, 6.2, 5.9, 6.1]
            })
            .collect();
        ExpressionDataset {
            descriptions: vec![String::new(); genes.len()],
            genes,
            samples: (1..=8).map(|i| format!("S{i}")).collect(),
            values,
        }
    }

    fn labels() -> PhenotypeLabels {
        PhenotypeLabels {
            classes: vec!["TUMOR".into(), "NORMAL".into()],
            labels: ["TUMOR", "TUMOR", "TUMOR", "TUMOR", "NORMAL", "NORMAL", "NORMAL", "NORMAL"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    fn ranked() -> RankedList {
        RankedList {
            genes: (0..20).map(|i| format!("G{i}")).collect(),
            scores: (0..20).map(|i| 3.0 - 0.3 * i as f64).collect(),
        }
    }

    #[test]
    fn prerank_result_is_consistent() {
        let res = PermutationEngine
            .prerank(&ranked(), &gene_sets(), &params(2))
            .unwrap();
        assert_eq!(res.terms.len(), 3);
        assert!(res.heatmap.is_none());
        for w in res.terms.windows(2) {
            assert!(w[0].nes.abs() >= w[1].nes.abs());
        }
        for t in &res.terms {
            assert_eq!(t.res.len(), res.rank_metric.len());
            assert!(t.hits.iter().all(|&h| h < res.rank_metric.len()));
            assert!(t.lead_genes.iter().all(|g| res.ranking.contains(g)));
            assert!(!t.lead_genes.is_empty());
        }
        let up = res.term("UP").unwrap();
        assert!(up.es > 0.0);
        assert_eq!(up.lead_genes, vec!["G0", "G1", "G2", "G4"]);
        assert_eq!(up.tag_pct, "4/4");
        assert_eq!(up.gene_pct, "25.00%");
        let down = res.term("DOWN").unwrap();
        assert!(down.es < 0.0);
        assert_eq!(down.lead_genes, vec!["G15", "G17", "G18", "G19"]);
    }

    #[test]
    fn phenotype_result_carries_heatmap() {
        let data = dataset();
        let res = PermutationEngine
            .phenotype(&data, &labels(), &gene_sets(), &params(2))
            .unwrap();
        let heat = res.heatmap.as_ref().unwrap();
        assert_eq!(heat.samples, data.samples);
        for t in &res.terms {
            for g in &t.lead_genes {
                assert!(heat.row(g).is_some());
            }
        }
        assert_eq!(res.ranking[0], "G0");
    }

    #[test]
    fn thread_count_does_not_change_results() {
        let data = dataset();
        let a = PermutationEngine
            .phenotype(&data, &labels(), &gene_sets(), &params(1))
            .unwrap();
        let b = PermutationEngine
            .phenotype(&data, &labels(), &gene_sets(), &params(4))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn nothing_passes_size_filter() {
        let mut p = params(1);
        p.min_size = 10;
        let err = PermutationEngine
            .prerank(&ranked(), &gene_sets(), &p)
            .unwrap_err();
        assert!(err.to_string().contains("No gene sets passed"));
    }

    #[test]
    fn records_use_table_column_names() {
        let res = PermutationEngine
            .prerank(&ranked(), &gene_sets(), &params(1))
            .unwrap();
        let json = serde_json::to_value(res.records()).unwrap();
        let first = &json.as_array().unwrap()[0];
        for key in ["Term", "ES", "NES", "NOM p-val", "FDR q-val", "FWER p-val", "Tag %", "Gene %", "Lead_genes"] {
            assert!(first.get(key).is_some(), "missing {key}");
        }
    }
}
