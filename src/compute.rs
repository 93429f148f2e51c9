//! Compute phase: validate inputs, remap identifiers, run the engine and
//! persist the analysis for later plot invocations.
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::checkpoint::{self, AnalysisState};
use crate::data::ChipMapping;
use crate::engine::{AnalysisMode, EngineParams, EnrichmentEngine, EnrichmentResult};
use crate::error::Result;
use crate::remap::{self, chip_arg, RemapMode};
use crate::utils::Metric;
use crate::validate::{self, FileClass};

/// Phenotype-permutation run.
#[derive(Debug, Clone)]
pub struct GseaJob {
    pub gene_sets: PathBuf,
    pub permutations: i64,
    pub min_size: i64,
    pub max_size: i64,
    pub expression: PathBuf,
    pub phenotypes: PathBuf,
    pub remap: String,
    pub chip: String,
    pub method: Metric,
    pub weight: f64,
    pub seed: u64,
    pub threads: usize,
}

/// Gene-permutation run on a ranked list.
#[derive(Debug, Clone)]
pub struct PrerankJob {
    pub gene_sets: PathBuf,
    pub permutations: i64,
    pub ranked: PathBuf,
    pub remap: String,
    pub chip: String,
    pub min_size: i64,
    pub max_size: i64,
    pub weight: f64,
    pub seed: u64,
    pub threads: usize,
}

/// Chip table for `remap`/`chip` arguments; `None` when no remap is requested.
fn resolve_chip(remap_arg: &str, chip: &str) -> Result<(RemapMode, Option<ChipMapping>)> {
    let mode = RemapMode::from_arg(remap_arg);
    let chip_path = chip_arg(chip);
    if mode == RemapMode::None {
        if let Some(p) = chip_path {
            debug!(chip = p, "remap not requested, chip file ignored");
        }
        return Ok((mode, None));
    }
    let Some(p) = chip_path else {
        // remap_* raises the configuration error
        return Ok((mode, None));
    };
    let chip = validate::load_chip(Path::new(p))?;
    Ok((mode, Some(chip)))
}

pub fn run_gsea(job: &GseaJob, engine: &dyn EnrichmentEngine, ckpt: &Path) -> Result<AnalysisState> {
    validate::check_extension(&job.expression, FileClass::ExpressionMatrix)?;
    validate::check_extension(&job.gene_sets, FileClass::GeneSetCollection)?;
    validate::check_extension(&job.phenotypes, FileClass::PhenotypeLabels)?;

    let data = validate::load_expression(&job.expression)?;
    let nperm = validate::check_permutations(job.permutations)?;
    let (min_size, max_size) = validate::check_size_bounds(job.min_size, job.max_size)?;

    let (mode, chip) = resolve_chip(&job.remap, &job.chip)?;
    let mut data = remap::remap_expression(data, mode, chip.as_ref())?;
    let dropped = data.dedup_keep_first();
    if dropped > 0 {
        info!(dropped, "duplicated identifiers removed from expression set");
    }

    let gene_sets = validate::load_gene_sets(&job.gene_sets)?;
    let labels = validate::load_phenotypes(&job.phenotypes)?;
    validate::check_phenotypes(&labels, &data)?;

    let params = EngineParams {
        nperm,
        min_size,
        max_size,
        weight: job.weight,
        method: job.method,
        seed: job.seed,
        threads: job.threads,
    };
    info!(
        genes = data.n_genes(),
        sets = gene_sets.len(),
        nperm,
        "running phenotype permutation GSEA"
    );
    let result = engine.phenotype(&data, &labels, &gene_sets, &params)?;
    persist(AnalysisMode::Phenotype, params, result, ckpt)
}

pub fn run_prerank(job: &PrerankJob, engine: &dyn EnrichmentEngine, ckpt: &Path) -> Result<AnalysisState> {
    validate::check_extension(&job.gene_sets, FileClass::GeneSetCollection)?;
    validate::check_extension(&job.ranked, FileClass::RankedList)?;

    let rnk = validate::load_ranked_list(&job.ranked)?;
    let nperm = validate::check_permutations(job.permutations)?;
    let (min_size, max_size) = validate::check_size_bounds(job.min_size, job.max_size)?;

    let (mode, chip) = resolve_chip(&job.remap, &job.chip)?;
    let mut rnk = remap::remap_ranked(rnk, mode, chip.as_ref())?;
    rnk.sort_descending();
    let dropped = rnk.dedup_keep_first();
    if dropped > 0 {
        info!(dropped, "duplicated identifiers removed from ranked list");
    }

    let gene_sets = validate::load_gene_sets(&job.gene_sets)?;

    let params = EngineParams {
        nperm,
        min_size,
        max_size,
        weight: job.weight,
        method: Metric::Signal2Noise,
        seed: job.seed,
        threads: job.threads,
    };
    info!(
        genes = rnk.len(),
        sets = gene_sets.len(),
        nperm,
        "running prerank GSEA"
    );
    let result = engine.prerank(&rnk, &gene_sets, &params)?;
    persist(AnalysisMode::Prerank, params, result, ckpt)
}

fn persist(
    mode: AnalysisMode,
    params: EngineParams,
    result: EnrichmentResult,
    ckpt: &Path,
) -> Result<AnalysisState> {
    let state = AnalysisState {
        mode,
        params,
        result,
    };
    checkpoint::save(&state, ckpt)?;
    Ok(state)
}

/// Print the result table as one JSON array, one object per term.
pub fn write_records<W: Write>(mut out: W, result: &EnrichmentResult) -> Result<()> {
    serde_json::to_writer(&mut out, &result.records())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ExpressionDataset, GeneSetCollection, PhenotypeLabels, RankedList};
    use crate::engine::PermutationEngine;
    use crate::error::{GseaError, ValidationError};
    use std::cell::Cell;
    use std::fs;

    /// Engine that records whether it was reached.
    #[derive(Default)]
    struct CountingEngine {
        calls: Cell<usize>,
    }

    impl EnrichmentEngine for CountingEngine {
        fn phenotype(
            &self,
            _: &ExpressionDataset,
            _: &PhenotypeLabels,
            _: &GeneSetCollection,
            _: &EngineParams,
        ) -> Result<EnrichmentResult> {
            self.calls.set(self.calls.get() + 1);
            Ok(EnrichmentResult::default())
        }
        fn prerank(&self, rnk: &RankedList, _: &GeneSetCollection, _: &EngineParams) -> Result<EnrichmentResult> {
            self.calls.set(self.calls.get() + 1);
            Ok(EnrichmentResult {
                ranking: rnk.genes.clone(),
                rank_metric: rnk.scores.clone(),
                ..Default::default()
            })
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let mut gct = String::from("#1.2\n12\t6\nNAME\tDescription\tA1\tA2\tA3\tB1\tB2\tB3\n");
            for i in 0..12 {
                let s = 6.0 - i as f64;
                gct.push_str(&format!(
                    "P{i}\tna\t{}\t{}\t{}\t5.0\t5.2\t4.9\n",
                    5.0 + s,
                    5.3 + s,
                    4.8 + s
                ));
            }
            fs::write(dir.path().join("data.gct"), gct).unwrap();
            fs::write(
                dir.path().join("labels.cls"),
                "6 2 1\n# A B\nA A A B B B\n",
            )
            .unwrap();
            fs::write(
                dir.path().join("sets.gmt"),
                "UP\tna\tG0\tG1\tG2\tG3\nDOWN\tna\tG8\tG9\tG10\tG11\n",
            )
            .unwrap();
            let mut chip = String::from("Probe Set ID\tGene Symbol\tGene Title\n");
            for i in 0..12 {
                chip.push_str(&format!("P{i}\tG{i}\tgene {i}\n"));
            }
            fs::write(dir.path().join("platform.chip"), chip).unwrap();
            let mut rnk = String::new();
            for i in (0..12).rev() {
                rnk.push_str(&format!("G{i}\t{}\n", 6.0 - i as f64));
            }
            fs::write(dir.path().join("genes.rnk"), rnk).unwrap();
            Fixture { dir }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }

        fn gsea_job(&self) -> GseaJob {
            GseaJob {
                gene_sets: self.path("sets.gmt"),
                permutations: 20,
                min_size: 2,
                max_size: 50,
                expression: self.path("data.gct"),
                phenotypes: self.path("labels.cls"),
                remap: "Remap_Only".into(),
                chip: self.path("platform.chip").display().to_string(),
                method: Metric::Signal2Noise,
                weight: 1.0,
                seed: 7,
                threads: 2,
            }
        }

        fn prerank_job(&self) -> PrerankJob {
            PrerankJob {
                gene_sets: self.path("sets.gmt"),
                permutations: 20,
                ranked: self.path("genes.rnk"),
                remap: "none".into(),
                chip: "null".into(),
                min_size: 2,
                max_size: 50,
                weight: 1.0,
                seed: 6,
                threads: 2,
            }
        }
    }

    #[test]
    fn phenotype_run_writes_checkpoint() {
        let fx = Fixture::new();
        let ckpt = fx.path("session.ckpt");
        let state = run_gsea(&fx.gsea_job(), &PermutationEngine, &ckpt).unwrap();
        assert_eq!(state.mode, AnalysisMode::Phenotype);
        assert_eq!(state.result.terms.len(), 2);
        assert!(state.result.heatmap.is_some());
        assert_eq!(checkpoint::load(&ckpt).unwrap(), state);

        let mut buf = Vec::new();
        write_records(&mut buf, &state.result).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 2);
    }

    #[test]
    fn zero_permutations_fail_before_the_engine() {
        let fx = Fixture::new();
        let ckpt = fx.path("session.ckpt");
        let engine = CountingEngine::default();
        let mut job = fx.gsea_job();
        job.permutations = 0;
        let err = run_gsea(&job, &engine, &ckpt).unwrap_err();
        assert_eq!(err.to_string(), "The number of permutations must be positive.");
        assert_eq!(engine.calls.get(), 0);
        assert!(!ckpt.exists());
    }

    #[test]
    fn extension_is_checked_before_parameters() {
        let fx = Fixture::new();
        let engine = CountingEngine::default();
        let mut job = fx.gsea_job();
        job.permutations = 0;
        job.phenotypes = fx.path("labels.txt");
        let err = run_gsea(&job, &engine, &fx.path("s.ckpt")).unwrap_err();
        assert!(matches!(
            err,
            GseaError::Validation(ValidationError::WrongExtension { .. })
        ));
    }

    #[test]
    fn min_above_max_is_rejected() {
        let fx = Fixture::new();
        let mut job = fx.gsea_job();
        job.min_size = 10;
        job.max_size = 5;
        let err = run_gsea(&job, &CountingEngine::default(), &fx.path("s.ckpt")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Max gene set size must be greater than min gene set size."
        );
    }

    #[test]
    fn remap_without_chip_is_a_configuration_error() {
        let fx = Fixture::new();
        let mut job = fx.gsea_job();
        job.chip = "null".into();
        let err = run_gsea(&job, &CountingEngine::default(), &fx.path("s.ckpt")).unwrap_err();
        assert!(matches!(err, GseaError::Configuration(_)));
        assert_eq!(err.to_string(), "If remap selected, a chip must be selected too.");
    }

    #[test]
    fn prerank_list_reaches_engine_sorted() {
        let fx = Fixture::new();
        let ckpt = fx.path("session.ckpt");
        let engine = CountingEngine::default();
        let state = run_prerank(&fx.prerank_job(), &engine, &ckpt).unwrap();
        assert_eq!(engine.calls.get(), 1);
        assert_eq!(state.mode, AnalysisMode::Prerank);
        assert_eq!(state.result.ranking[0], "G0");
        assert!(state
            .result
            .rank_metric
            .windows(2)
            .all(|w| w[0] >= w[1]));
        assert!(ckpt.exists());
    }

    #[test]
    fn prerank_end_to_end() {
        let fx = Fixture::new();
        let state = run_prerank(&fx.prerank_job(), &PermutationEngine, &fx.path("p.ckpt")).unwrap();
        assert!(state.result.heatmap.is_none());
        let up = state.result.term("UP").unwrap();
        assert!(up.es > 0.0);
        let down = state.result.term("DOWN").unwrap();
        assert!(down.es < 0.0);
    }
}
