//! Data slices handed to a [`Renderer`](super::render::Renderer), one per plot kind.
use super::request::StatColumn;

/// Running-score trace of one term.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentTrace {
    pub term: String,
    pub nes: f64,
    pub pval: f64,
    pub fdr: f64,
    pub res: Vec<f64>,
    pub hits: Vec<usize>,
}

/// One trace draws the classic three-panel plot; several traces are overlaid.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentChart {
    pub traces: Vec<EnrichmentTrace>,
    pub rank_metric: Vec<f64>,
}

impl EnrichmentChart {
    pub fn is_overlay(&self) -> bool {
        self.traces.len() > 1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DotRow {
    pub term: String,
    pub nes: f64,
    /// colour value: the column itself, or -log10 of it for p/q columns
    pub color: f64,
    /// leading-edge genes over hits, in [0, 1]
    pub gene_ratio: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DotChart {
    pub title: String,
    pub column: StatColumn,
    pub rows: Vec<DotRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapChart {
    pub title: String,
    pub genes: Vec<String>,
    pub samples: Vec<String>,
    /// row z-scores, [genes][samples]
    pub z: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IouChart {
    /// short codes `G0`, `G1`, ...
    pub labels: Vec<String>,
    pub terms: Vec<String>,
    /// full symmetric Jaccard matrix; cells above the diagonal are masked when drawn
    pub matrix: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WordCloudChart {
    /// (word, count), most frequent first
    pub words: Vec<(String, usize)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Chart {
    Enrichment(EnrichmentChart),
    Dot(DotChart),
    Heatmap(HeatmapChart),
    Iou(IouChart),
    WordCloud(WordCloudChart),
}

impl Chart {
    /// Word clouds only go to raster files.
    pub fn supports_vector(&self) -> bool {
        !matches!(self, Chart::WordCloud(_))
    }
}
