//! Routes a plot request to its data assembly, then exports the chart in
//! every requested format.
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use statrs::statistics::Statistics;
use tracing::{debug, info, warn};

use super::chart::{
    Chart, DotChart, DotRow, EnrichmentChart, EnrichmentTrace, HeatmapChart, IouChart, WordCloudChart,
};
use super::render::{ImageFormat, Renderer};
use super::request::{PlotRequest, SetSource, StatColumn};
use crate::checkpoint::AnalysisState;
use crate::data::GeneSetCollection;
use crate::error::{GseaError, Result, ValidationError};

/// p/q columns: rows above this value are left out of a dotplot.
pub const DOTPLOT_CUTOFF: f64 = 0.25;
/// Word clouds keep this many of the most frequent words.
pub const MAX_WORDS: usize = 200;

/// What a plot invocation has at hand besides the request itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlotContext<'a> {
    pub state: Option<&'a AnalysisState>,
    /// re-read collection used to resolve bare term names for intersection-over-union
    pub gene_sets: Option<&'a GeneSetCollection>,
}

impl<'a> PlotContext<'a> {
    fn state(&self) -> Result<&'a AnalysisState> {
        self.state.ok_or_else(|| {
            GseaError::Configuration("this plot needs a saved analysis".to_string())
        })
    }
}

impl PlotRequest {
    /// Whether the saved analysis must be restored for this request. Word
    /// clouds never read it; intersection-over-union only does for bare term
    /// names when no gene set file is at hand to resolve them.
    pub fn needs_analysis(&self, have_gene_sets: bool) -> bool {
        match self {
            PlotRequest::Wordcloud { .. } => false,
            PlotRequest::IntersectionOverUnion { sets, .. } => {
                !have_gene_sets && sets.iter().any(|s| matches!(s, SetSource::Term(_)))
            }
            _ => true,
        }
    }
}

/// Build the chart and write it to `<base>.<ext>` for each format.
pub fn dispatch(
    request: &PlotRequest,
    ctx: PlotContext<'_>,
    renderer: &dyn Renderer,
    base: &Path,
    formats: &[ImageFormat],
) -> Result<Vec<PathBuf>> {
    let chart = assemble(request, ctx)?;
    export(&chart, request.size().pixels(), renderer, base, formats)
}

pub fn assemble(request: &PlotRequest, ctx: PlotContext<'_>) -> Result<Chart> {
    match request {
        PlotRequest::Enrichment { terms, .. } => enrichment_chart(ctx.state()?, terms).map(Chart::Enrichment),
        PlotRequest::Dotplot { column, terms, .. } => Ok(Chart::Dot(dot_chart(ctx.state()?, *column, terms))),
        PlotRequest::Heatmap { term, lead_genes, .. } => {
            heatmap_chart(ctx.state()?, term, lead_genes).map(Chart::Heatmap)
        }
        PlotRequest::IntersectionOverUnion { sets, .. } => {
            let resolved = resolve_sets(sets, ctx)?;
            Ok(Chart::Iou(iou_chart(&resolved)))
        }
        PlotRequest::Wordcloud { source, .. } => {
            let text = fs::read_to_string(source)?;
            Ok(Chart::WordCloud(WordCloudChart {
                words: word_counts(&text),
            }))
        }
    }
}

fn output_path(base: &Path, format: ImageFormat) -> PathBuf {
    let mut p = base.as_os_str().to_owned();
    p.push(".");
    p.push(format.extension());
    PathBuf::from(p)
}

/// Render `chart` once per format. A failure removes every file this call wrote.
pub fn export(
    chart: &Chart,
    size: (u32, u32),
    renderer: &dyn Renderer,
    base: &Path,
    formats: &[ImageFormat],
) -> Result<Vec<PathBuf>> {
    let mut written: Vec<PathBuf> = Vec::new();
    let mut seen = HashSet::new();
    for &format in formats {
        if !seen.insert(format) {
            continue;
        }
        if format.is_vector() && !chart.supports_vector() {
            warn!(format = format.extension(), "word clouds are raster only, skipping");
            continue;
        }
        let path = output_path(base, format);
        if let Err(e) = renderer.render(chart, size, format, &path) {
            let _ = fs::remove_file(&path);
            for p in &written {
                let _ = fs::remove_file(p);
            }
            return Err(e);
        }
        info!(path = %path.display(), "plot written");
        written.push(path);
    }
    if written.is_empty() {
        warn!("no output format left for this plot, nothing written");
    }
    Ok(written)
}

fn enrichment_chart(state: &AnalysisState, terms: &[String]) -> Result<EnrichmentChart> {
    if terms.is_empty() {
        return Err(ValidationError::MalformedArgument("no term selected".to_string()).into());
    }
    let traces = terms
        .iter()
        .map(|name| {
            let t = state
                .result
                .term(name)
                .ok_or_else(|| ValidationError::UnknownTerm(name.clone()))?;
            Ok(EnrichmentTrace {
                term: t.term.clone(),
                nes: t.nes,
                pval: t.pval,
                fdr: t.fdr,
                res: t.res.clone(),
                hits: t.hits.clone(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(EnrichmentChart {
        traces,
        rank_metric: state.result.rank_metric.clone(),
    })
}

fn dot_chart(state: &AnalysisState, column: StatColumn, terms: &[String]) -> DotChart {
    let wanted: HashSet<&str> = terms.iter().map(String::as_str).collect();
    let matched: Vec<_> = state
        .result
        .terms
        .iter()
        .filter(|t| wanted.contains(t.term.as_str()))
        .collect();
    if matched.len() < wanted.len() {
        warn!(
            requested = wanted.len(),
            matched = matched.len(),
            "some dotplot terms are not in the saved analysis"
        );
    }
    let rows = matched
        .into_iter()
        .filter(|t| !column.is_probability() || column.value(t) <= DOTPLOT_CUTOFF)
        .map(|t| {
            let v = column.value(t);
            DotRow {
                term: t.term.clone(),
                nes: t.nes,
                color: if column.is_probability() {
                    -v.max(1e-10).log10()
                } else {
                    v
                },
                gene_ratio: if t.hits.is_empty() {
                    0.0
                } else {
                    t.lead_genes.len() as f64 / t.hits.len() as f64
                },
            }
        })
        .collect();
    DotChart {
        title: format!("{} dotplot", column.name()),
        column,
        rows,
    }
}

/// Row-wise z-scores with the sample standard deviation. Constant rows become 0.
pub fn zscore_rows(values: &[Vec<f64>]) -> Vec<Vec<f64>> {
    values
        .iter()
        .map(|row| {
            let mean = row.iter().mean();
            let sd = row.iter().std_dev();
            if !sd.is_finite() || sd == 0.0 {
                vec![0.0; row.len()]
            } else {
                row.iter().map(|v| (v - mean) / sd).collect()
            }
        })
        .collect()
}

fn heatmap_chart(state: &AnalysisState, term: &str, lead_genes: &[String]) -> Result<HeatmapChart> {
    let matrix = state.result.heatmap.as_ref().ok_or_else(|| {
        ValidationError::InvalidParameter(
            "The saved analysis has no expression matrix; heatmaps need a phenotype permutation run."
                .to_string(),
        )
    })?;
    let mut genes = Vec::new();
    let mut values = Vec::new();
    for g in lead_genes {
        match matrix.row(g) {
            Some(row) => {
                genes.push(g.clone());
                values.push(row.to_vec());
            }
            None => debug!(gene = %g, "gene not in the saved expression matrix"),
        }
    }
    if genes.is_empty() {
        return Err(ValidationError::InvalidParameter(format!(
            "None of the leading-edge genes of '{term}' are in the saved expression matrix."
        ))
        .into());
    }
    Ok(HeatmapChart {
        title: term.to_string(),
        genes,
        samples: matrix.samples.clone(),
        z: zscore_rows(&values),
    })
}

fn resolve_sets(sets: &[SetSource], ctx: PlotContext<'_>) -> Result<Vec<(String, Vec<String>)>> {
    let mut resolved = Vec::with_capacity(sets.len());
    for s in sets {
        match s {
            SetSource::Explicit { term, genes } => resolved.push((term.clone(), genes.clone())),
            SetSource::Term(term) => {
                let genes = match ctx.gene_sets {
                    Some(gmt) => gmt.get(term).map(<[String]>::to_vec),
                    None => ctx.state()?.result.term(term).map(|t| t.lead_genes.clone()),
                };
                let genes = genes.ok_or_else(|| ValidationError::UnknownTerm(term.clone()))?;
                resolved.push((term.clone(), genes));
            }
        }
    }
    Ok(resolved)
}

/// Pairwise Jaccard index. The diagonal is 1 by definition.
pub fn jaccard_matrix(sets: &[Vec<String>]) -> Vec<Vec<f64>> {
    let sets: Vec<HashSet<&str>> = sets
        .iter()
        .map(|s| s.iter().map(String::as_str).collect())
        .collect();
    let n = sets.len();
    let mut m = vec![vec![0.0; n]; n];
    for i in 0..n {
        m[i][i] = 1.0;
        for j in 0..i {
            let inter = sets[i].intersection(&sets[j]).count();
            let union = sets[i].union(&sets[j]).count();
            let v = if union == 0 { 0.0 } else { inter as f64 / union as f64 };
            m[i][j] = v;
            m[j][i] = v;
        }
    }
    m
}

fn iou_chart(sets: &[(String, Vec<String>)]) -> IouChart {
    let genes: Vec<Vec<String>> = sets.iter().map(|(_, g)| g.clone()).collect();
    IouChart {
        labels: (0..sets.len()).map(|i| format!("G{i}")).collect(),
        terms: sets.iter().map(|(t, _)| t.clone()).collect(),
        matrix: jaccard_matrix(&genes),
    }
}

/// Word frequencies of free text, most frequent first (ties alphabetical).
/// A JSON array of strings is joined first; `_`, `;` and `,` separate words.
pub fn word_counts(text: &str) -> Vec<(String, usize)> {
    let joined = match serde_json::from_str::<Vec<String>>(text.trim()) {
        Ok(items) => items.join(" "),
        Err(_) => text.to_string(),
    };
    let normalised = joined.replace(['_', ';', ','], " ");
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for w in normalised.split_whitespace() {
        *counts.entry(w).or_insert(0) += 1;
    }
    let mut words: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(w, n)| (w.to_string(), n))
        .collect();
    words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    words.truncate(MAX_WORDS);
    words
}
