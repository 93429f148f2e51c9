//! Plot requests as parsed from the command line.
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

use crate::engine::TermResult;
use crate::error::{GseaError, Result, ValidationError};
use crate::units::{Canonical, FigureSize, Unit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlotKind {
    EnrichmentPlot,
    Dotplot,
    Heatmap,
    IntersectionOverUnion,
    Wordcloud,
}

impl FromStr for PlotKind {
    type Err = GseaError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "enrichment-plot" => Ok(PlotKind::EnrichmentPlot),
            "dotplot" => Ok(PlotKind::Dotplot),
            "heatmap" => Ok(PlotKind::Heatmap),
            "intersection-over-union" => Ok(PlotKind::IntersectionOverUnion),
            "wordcloud" => Ok(PlotKind::Wordcloud),
            other => Err(GseaError::UnsupportedPlotKind(other.to_string())),
        }
    }
}

/// Result column a dotplot is coloured by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatColumn {
    Es,
    Nes,
    NomPval,
    FdrQval,
    FwerPval,
}

impl StatColumn {
    pub fn name(self) -> &'static str {
        match self {
            StatColumn::Es => "ES",
            StatColumn::Nes => "NES",
            StatColumn::NomPval => "NOM p-val",
            StatColumn::FdrQval => "FDR q-val",
            StatColumn::FwerPval => "FWER p-val",
        }
    }

    pub fn is_probability(self) -> bool {
        matches!(
            self,
            StatColumn::NomPval | StatColumn::FdrQval | StatColumn::FwerPval
        )
    }

    pub fn value(self, t: &TermResult) -> f64 {
        match self {
            StatColumn::Es => t.es,
            StatColumn::Nes => t.nes,
            StatColumn::NomPval => t.pval,
            StatColumn::FdrQval => t.fdr,
            StatColumn::FwerPval => t.fwerp,
        }
    }
}

impl FromStr for StatColumn {
    type Err = ValidationError;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ES" => Ok(StatColumn::Es),
            "NES" => Ok(StatColumn::Nes),
            "NOM p-val" => Ok(StatColumn::NomPval),
            "FDR q-val" => Ok(StatColumn::FdrQval),
            "FWER p-val" => Ok(StatColumn::FwerPval),
            other => Err(ValidationError::UnknownColumn(other.to_string())),
        }
    }
}

/// Gene list given either as a JSON array or as a `;`-joined string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum GeneList {
    List(Vec<String>),
    Joined(String),
}

impl GeneList {
    fn into_vec(self) -> Vec<String> {
        match self {
            GeneList::List(v) => v,
            GeneList::Joined(s) => s
                .split(';')
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct HeatmapRow {
    #[serde(rename = "Term")]
    term: String,
    #[serde(rename = "Lead_genes")]
    lead_genes: GeneList,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SetArg {
    Name(String),
    Explicit {
        #[serde(alias = "Term")]
        term: String,
        #[serde(alias = "Lead_genes")]
        lead_genes: GeneList,
    },
}

/// One gene set of an intersection-over-union request.
#[derive(Debug, Clone, PartialEq)]
pub enum SetSource {
    /// resolved from the saved analysis or a gene-set file
    Term(String),
    Explicit { term: String, genes: Vec<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlotRequest {
    Enrichment {
        terms: Vec<String>,
        size: FigureSize,
    },
    Dotplot {
        column: StatColumn,
        terms: Vec<String>,
        size: FigureSize,
    },
    Heatmap {
        term: String,
        lead_genes: Vec<String>,
        size: FigureSize,
    },
    IntersectionOverUnion {
        sets: Vec<SetSource>,
        size: FigureSize,
    },
    Wordcloud {
        source: PathBuf,
        size: FigureSize,
    },
}

impl PlotRequest {
    pub fn kind(&self) -> PlotKind {
        match self {
            PlotRequest::Enrichment { .. } => PlotKind::EnrichmentPlot,
            PlotRequest::Dotplot { .. } => PlotKind::Dotplot,
            PlotRequest::Heatmap { .. } => PlotKind::Heatmap,
            PlotRequest::IntersectionOverUnion { .. } => PlotKind::IntersectionOverUnion,
            PlotRequest::Wordcloud { .. } => PlotKind::Wordcloud,
        }
    }

    pub fn size(&self) -> FigureSize {
        match self {
            PlotRequest::Enrichment { size, .. }
            | PlotRequest::Dotplot { size, .. }
            | PlotRequest::Heatmap { size, .. }
            | PlotRequest::IntersectionOverUnion { size, .. }
            | PlotRequest::Wordcloud { size, .. } => *size,
        }
    }

    /// Parse `<kind> <args>...`. The kind is checked first so an unknown kind
    /// is reported whatever follows it.
    pub fn parse(kind: &str, args: &[String]) -> Result<Self> {
        let kind: PlotKind = kind.parse()?;
        let (lead, size_args) = match kind {
            PlotKind::Dotplot => split_args(args, 2)?,
            _ => split_args(args, 1)?,
        };
        let canonical = match kind {
            PlotKind::Wordcloud => Canonical::Pixels,
            _ => Canonical::Inches,
        };
        let size = parse_size(size_args, canonical)?;
        let request = match kind {
            PlotKind::EnrichmentPlot => PlotRequest::Enrichment {
                terms: parse_terms(&lead[0])?,
                size,
            },
            PlotKind::Dotplot => PlotRequest::Dotplot {
                column: lead[0].parse()?,
                terms: parse_terms(&lead[1])?,
                size,
            },
            PlotKind::Heatmap => {
                let row: HeatmapRow = serde_json::from_str(&lead[0])?;
                PlotRequest::Heatmap {
                    term: row.term,
                    lead_genes: row.lead_genes.into_vec(),
                    size,
                }
            }
            PlotKind::IntersectionOverUnion => {
                let raw: Vec<SetArg> = serde_json::from_str(&lead[0])?;
                if raw.is_empty() {
                    return Err(ValidationError::MalformedArgument(
                        "at least one gene set is needed".to_string(),
                    )
                    .into());
                }
                let sets = raw
                    .into_iter()
                    .map(|s| match s {
                        SetArg::Name(t) => SetSource::Term(t),
                        SetArg::Explicit { term, lead_genes } => SetSource::Explicit {
                            term,
                            genes: lead_genes.into_vec(),
                        },
                    })
                    .collect();
                PlotRequest::IntersectionOverUnion { sets, size }
            }
            PlotKind::Wordcloud => PlotRequest::Wordcloud {
                source: PathBuf::from(&lead[0]),
                size,
            },
        };
        Ok(request)
    }
}

/// Split into `n` leading arguments and the trailing `<width> <height> [unit]`.
fn split_args(args: &[String], n: usize) -> Result<(&[String], &[String])> {
    if args.len() < n + 2 || args.len() > n + 3 {
        return Err(ValidationError::MalformedArgument(format!(
            "expected {} argument(s) followed by <width> <height> [unit], got {} argument(s)",
            n,
            args.len()
        ))
        .into());
    }
    Ok(args.split_at(n))
}

fn parse_size(args: &[String], canonical: Canonical) -> Result<FigureSize> {
    let number = |s: &str| {
        s.trim().parse::<f64>().map_err(|_| {
            GseaError::from(ValidationError::MalformedArgument(format!(
                "'{s}' is not a number"
            )))
        })
    };
    let width = number(&args[0])?;
    let height = number(&args[1])?;
    let unit: Unit = match args.get(2) {
        Some(u) => u.parse()?,
        None => Unit::Unspecified,
    };
    FigureSize::new(width, height, unit, canonical)
}

fn parse_terms(arg: &str) -> Result<Vec<String>> {
    let terms: Vec<String> = serde_json::from_str(arg)?;
    Ok(terms)
}
