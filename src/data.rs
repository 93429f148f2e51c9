//! In-memory forms of the input files. Each value is read once per compute
//! invocation and dropped after the engine call.
use std::collections::HashMap;

/// Expression matrix: rows are probes/genes, columns are samples.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExpressionDataset {
    pub genes: Vec<String>,
    pub descriptions: Vec<String>,
    pub samples: Vec<String>,
    /// [n_genes][n_samples]
    pub values: Vec<Vec<f64>>,
}

impl ExpressionDataset {
    pub fn n_genes(&self) -> usize {
        self.genes.len()
    }
    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    /// Drop rows whose identifier was already seen. Returns how many were dropped.
    pub fn dedup_keep_first(&mut self) -> usize {
        let before = self.genes.len();
        let mut seen = std::collections::HashSet::with_capacity(before);
        let keep: Vec<bool> = self.genes.iter().map(|g| seen.insert(g.clone())).collect();
        let mut flags = keep.iter();
        self.genes.retain(|_| *flags.next().unwrap_or(&false));
        let mut flags = keep.iter();
        self.descriptions.retain(|_| *flags.next().unwrap_or(&false));
        let mut flags = keep.iter();
        self.values.retain(|_| *flags.next().unwrap_or(&false));
        before - self.genes.len()
    }
}

/// Ordered (identifier, score) pairs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RankedList {
    pub genes: Vec<String>,
    pub scores: Vec<f64>,
}

impl RankedList {
    pub fn len(&self) -> usize {
        self.genes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    /// Sort by score, highest first. Ties keep their input order.
    pub fn sort_descending(&mut self) {
        let mut pairs: Vec<(String, f64)> = self
            .genes
            .drain(..)
            .zip(self.scores.drain(..))
            .collect();
        pairs.sort_by(|a, b| b.1.total_cmp(&a.1));
        let (genes, scores) = pairs.into_iter().unzip();
        self.genes = genes;
        self.scores = scores;
    }

    /// Drop repeated identifiers, keeping the first occurrence. Returns how many were dropped.
    pub fn dedup_keep_first(&mut self) -> usize {
        let before = self.genes.len();
        let mut seen = std::collections::HashSet::with_capacity(before);
        let mut genes = Vec::with_capacity(before);
        let mut scores = Vec::with_capacity(before);
        for (g, s) in self.genes.drain(..).zip(self.scores.drain(..)) {
            if seen.insert(g.clone()) {
                genes.push(g);
                scores.push(s);
            }
        }
        self.genes = genes;
        self.scores = scores;
        before - self.genes.len()
    }
}

/// Probe id -> gene symbol. `None` marks a probe with no symbol.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChipMapping {
    pub symbols: HashMap<String, Option<String>>,
}

impl ChipMapping {
    pub fn symbol(&self, probe: &str) -> Option<&str> {
        self.symbols.get(probe).and_then(|s| s.as_deref())
    }
    pub fn len(&self) -> usize {
        self.symbols.len()
    }
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Gene-set term -> member genes, in file order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeneSetCollection {
    pub sets: Vec<(String, Vec<String>)>,
}

impl GeneSetCollection {
    pub fn get(&self, term: &str) -> Option<&[String]> {
        self.sets
            .iter()
            .find(|(t, _)| t == term)
            .map(|(_, g)| g.as_slice())
    }
    pub fn len(&self) -> usize {
        self.sets.len()
    }
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

/// Class labels aligned with the expression matrix sample columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PhenotypeLabels {
    /// class names as declared on the `#` line; the first one is the positive class
    pub classes: Vec<String>,
    pub labels: Vec<String>,
}

impl PhenotypeLabels {
    /// true for samples of the positive (first declared) class
    pub fn positive_mask(&self) -> Vec<bool> {
        let pos = self.classes.first().map(String::as_str).unwrap_or_default();
        self.labels.iter().map(|l| l == pos).collect()
    }
}
