//! Input validation. Every loader checks, in order: file extension, tabular
//! layout, missing cells, numeric cells. The first violated rule is reported.
use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info};

use crate::data::{ChipMapping, ExpressionDataset, GeneSetCollection, PhenotypeLabels, RankedList};
use crate::error::ValidationError;
use crate::utils::FileReader;

type VResult<T> = std::result::Result<T, ValidationError>;

/// Cell spellings treated as "no value".
const MISSING: &[&str] = &["", "NA", "NaN", "nan", "N/A", "NULL", "null"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    ExpressionMatrix,
    GeneSetCollection,
    PhenotypeLabels,
    RankedList,
    ChipMapping,
}

impl FileClass {
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            FileClass::ExpressionMatrix => &["gct", "res", "pcl", "txt"],
            FileClass::GeneSetCollection => &["gmt", "gmx"],
            FileClass::PhenotypeLabels => &["cls"],
            FileClass::RankedList => &["rnk"],
            FileClass::ChipMapping => &["chip"],
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FileClass::ExpressionMatrix => "expression set",
            FileClass::GeneSetCollection => "gene set",
            FileClass::PhenotypeLabels => "phenotype labels",
            FileClass::RankedList => "ranked list",
            FileClass::ChipMapping => "chip platform",
        }
    }

    fn unparsable(self, detail: impl Into<String>) -> ValidationError {
        ValidationError::Unparsable {
            class: self.label(),
            detail: detail.into(),
        }
    }
    fn missing(self) -> ValidationError {
        ValidationError::MissingValues { class: self.label() }
    }
    fn non_numeric(self) -> ValidationError {
        ValidationError::NonNumeric { class: self.label() }
    }
}

pub fn is_missing(cell: &str) -> bool {
    MISSING.contains(&cell.trim())
}

/// Reject a path whose extension is not allowed for `class`. Never touches the file.
pub fn check_extension(path: &Path, class: FileClass) -> VResult<()> {
    let ok = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| class.extensions().contains(&e))
        .unwrap_or(false);
    if ok {
        return Ok(());
    }
    let allowed = class
        .extensions()
        .iter()
        .map(|e| format!(".{e}"))
        .collect::<Vec<_>>()
        .join(", ");
    Err(ValidationError::WrongExtension {
        class: class.label(),
        allowed,
    })
}

/// drop empty trailing cells past `width` (trailing tabs)
fn trim_ragged(mut row: Vec<String>, width: usize) -> Vec<String> {
    while row.len() > width && row.last().map(|c| c.trim().is_empty()).unwrap_or(false) {
        row.pop();
    }
    row
}

/// Expression matrix: two preamble lines, a header, then
/// `identifier <TAB> description <TAB> sample values...`.
pub fn load_expression(path: &Path) -> VResult<ExpressionDataset> {
    let class = FileClass::ExpressionMatrix;
    check_extension(path, class)?;
    let mut rdr = FileReader::new();
    rdr.read_csv(path, b'\t', 2, true, None)
        .map_err(|e| class.unparsable(e.to_string()))?;
    let width = rdr.header.len();
    if width < 3 {
        return Err(class.unparsable("expected an identifier, a description and at least one sample column"));
    }
    if rdr.record.is_empty() {
        return Err(class.unparsable("no data rows"));
    }
    let rows: Vec<Vec<String>> = rdr
        .record
        .into_iter()
        .map(|r| trim_ragged(r, width))
        .collect();
    for (i, row) in rows.iter().enumerate() {
        if row.len() > width {
            return Err(class.unparsable(format!(
                "data row {} has {} fields, header has {}",
                i + 1,
                row.len(),
                width
            )));
        }
    }
    // missing values anywhere come before numeric conversion
    let any_missing = rows.iter().any(|row| {
        row.first().map(|id| is_missing(id)).unwrap_or(true)
            || row.len() < width
            || row[2..].iter().any(|c| is_missing(c))
    });
    if any_missing {
        return Err(class.missing());
    }
    let mut data = ExpressionDataset {
        samples: rdr.header[2..].to_vec(),
        ..Default::default()
    };
    for row in rows {
        let values = row[2..]
            .iter()
            .map(|c| c.trim().parse::<f64>())
            .collect::<Result<Vec<f64>, _>>()
            .map_err(|_| class.non_numeric())?;
        data.genes.push(row[0].trim().to_string());
        data.descriptions.push(row[1].clone());
        data.values.push(values);
    }
    info!(
        genes = data.n_genes(),
        samples = data.n_samples(),
        "expression set loaded"
    );
    Ok(data)
}

/// Ranked list: `identifier <TAB> score`, no header, `#` comments allowed.
pub fn load_ranked_list(path: &Path) -> VResult<RankedList> {
    let class = FileClass::RankedList;
    check_extension(path, class)?;
    let mut rdr = FileReader::new();
    rdr.read_csv(path, b'\t', 0, false, Some(b'#'))
        .map_err(|e| class.unparsable(e.to_string()))?;
    if rdr.record.is_empty() {
        return Err(class.unparsable("no data rows"));
    }
    let rows: Vec<Vec<String>> = rdr.record.into_iter().map(|r| trim_ragged(r, 2)).collect();
    if let Some(i) = rows.iter().position(|r| r.len() > 2) {
        return Err(class.unparsable(format!("row {} has more than two columns", i + 1)));
    }
    if rows
        .iter()
        .any(|r| r.len() < 2 || is_missing(&r[0]) || is_missing(&r[1]))
    {
        return Err(class.missing());
    }
    let mut rnk = RankedList::default();
    for row in rows {
        let score = row[1]
            .trim()
            .parse::<f64>()
            .map_err(|_| class.non_numeric())?;
        rnk.genes.push(row[0].trim().to_string());
        rnk.scores.push(score);
    }
    info!(genes = rnk.len(), "ranked list loaded");
    Ok(rnk)
}

/// Chip mapping: header row, `probe <TAB> symbol <TAB> ...`.
/// A probe without a symbol is kept as unmapped; a row without a probe id is an error.
pub fn load_chip(path: &Path) -> VResult<ChipMapping> {
    let class = FileClass::ChipMapping;
    check_extension(path, class)?;
    let mut rdr = FileReader::new();
    rdr.read_csv(path, b'\t', 0, true, None)
        .map_err(|e| class.unparsable(e.to_string()))?;
    let width = rdr.header.len();
    if width < 2 {
        return Err(class.unparsable("expected a probe id and a gene symbol column"));
    }
    let mut chip = ChipMapping::default();
    for (i, row) in rdr.record.into_iter().enumerate() {
        let row = trim_ragged(row, width);
        if row.len() > width {
            return Err(class.unparsable(format!(
                "data row {} has {} fields, header has {}",
                i + 1,
                row.len(),
                width
            )));
        }
        let probe = match row.first() {
            Some(p) if !is_missing(p) => p.trim().to_string(),
            _ => return Err(class.missing()),
        };
        let symbol = row
            .get(1)
            .filter(|s| !is_missing(s))
            .map(|s| s.trim().to_string());
        if chip.symbols.contains_key(&probe) {
            debug!(probe = %probe, "duplicate probe id in chip file, keeping first");
            continue;
        }
        chip.symbols.insert(probe, symbol);
    }
    info!(probes = chip.len(), "chip mapping loaded");
    Ok(chip)
}

/// `.gmt` (one set per line) or `.gmx` (one set per column).
pub fn load_gene_sets(path: &Path) -> VResult<GeneSetCollection> {
    let class = FileClass::GeneSetCollection;
    check_extension(path, class)?;
    let mut rdr = FileReader::new();
    rdr.read_table(path, Some('\t'), false)
        .map_err(|e| class.unparsable(e.to_string()))?;
    let is_gmx = path.extension().and_then(|e| e.to_str()) == Some("gmx");
    let raw: Vec<(String, Vec<String>)> = if is_gmx {
        parse_gmx(&rdr.record).map_err(|d| class.unparsable(d))?
    } else {
        parse_gmt(&rdr.record).map_err(|d| class.unparsable(d))?
    };
    let mut gmt = GeneSetCollection::default();
    let mut terms = HashSet::new();
    for (term, genes) in raw {
        if !terms.insert(term.clone()) {
            debug!(term = %term, "duplicate gene set term, keeping first");
            continue;
        }
        let mut seen = HashSet::new();
        let genes: Vec<String> = genes.into_iter().filter(|g| seen.insert(g.clone())).collect();
        gmt.sets.push((term, genes));
    }
    if gmt.is_empty() {
        return Err(class.unparsable("no gene sets"));
    }
    info!(sets = gmt.len(), "gene sets loaded");
    Ok(gmt)
}

fn parse_gmt(records: &[Vec<String>]) -> std::result::Result<Vec<(String, Vec<String>)>, String> {
    records
        .iter()
        .enumerate()
        .map(|(i, r)| {
            if r.len() < 2 || r[0].trim().is_empty() {
                return Err(format!("line {} needs a term name and a description", i + 1));
            }
            let genes = r[2..]
                .iter()
                .map(|g| g.trim())
                .filter(|g| !g.is_empty())
                .map(str::to_string)
                .collect();
            Ok((r[0].trim().to_string(), genes))
        })
        .collect()
}

fn parse_gmx(records: &[Vec<String>]) -> std::result::Result<Vec<(String, Vec<String>)>, String> {
    if records.len() < 2 {
        return Err("expected a term row and a description row".to_string());
    }
    let terms = &records[0];
    let mut sets: Vec<(String, Vec<String>)> = Vec::with_capacity(terms.len());
    for (col, term) in terms.iter().enumerate() {
        let term = term.trim();
        if term.is_empty() {
            continue;
        }
        let genes = records[2..]
            .iter()
            .filter_map(|r| r.get(col))
            .map(|g| g.trim())
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect();
        sets.push((term.to_string(), genes));
    }
    Ok(sets)
}

/// `.cls`: `nSamples nClasses 1`, `# classA classB`, then one label per sample.
pub fn load_phenotypes(path: &Path) -> VResult<PhenotypeLabels> {
    let class = FileClass::PhenotypeLabels;
    check_extension(path, class)?;
    let mut rdr = FileReader::new();
    rdr.read_table(path, None, false)
        .map_err(|e| class.unparsable(e.to_string()))?;
    if rdr.record.len() < 3 {
        return Err(class.unparsable("expected three lines"));
    }
    let dims = rdr.record[0]
        .iter()
        .take(2)
        .map(|x| x.parse::<usize>())
        .collect::<Result<Vec<usize>, _>>()
        .map_err(|_| class.unparsable("first line must hold the sample and class counts"))?;
    if dims.len() < 2 {
        return Err(class.unparsable("first line must hold the sample and class counts"));
    }
    let (n_samples, n_classes) = (dims[0], dims[1]);

    let class_line = &rdr.record[1];
    if class_line.first().map(|s| !s.starts_with('#')).unwrap_or(true) {
        return Err(class.unparsable("second line must start with '#'"));
    }
    let mut classes: Vec<String> = class_line
        .iter()
        .flat_map(|s| s.trim_start_matches('#').split_whitespace())
        .map(str::to_string)
        .collect();
    let labels: Vec<String> = rdr.record[2..].iter().flatten().cloned().collect();
    if labels.len() != n_samples {
        return Err(class.unparsable(format!(
            "header declares {} samples but {} labels were found",
            n_samples,
            labels.len()
        )));
    }
    if classes.is_empty() {
        // class names are optional; fall back to first appearance order
        for l in &labels {
            if !classes.contains(l) {
                classes.push(l.clone());
            }
        }
    }
    let labels = if !classes.is_empty() && labels.iter().all(|l| !classes.contains(l)) {
        relabel_by_class(labels, &classes)
    } else {
        labels
    };
    if let Some(l) = labels.iter().find(|l| !classes.contains(l)) {
        return Err(class.unparsable(format!("label '{l}' is not a declared class")));
    }
    if classes.len() != n_classes {
        return Err(class.unparsable(format!(
            "header declares {} classes but {} were named",
            n_classes,
            classes.len()
        )));
    }
    Ok(PhenotypeLabels { classes, labels })
}

/// Broad files may label samples by class index (`0 0 0 1 1 1`) rather than
/// by name. Integer labels map to the `#` names by index; other tokens map
/// by order of first appearance. Values beyond the named classes are kept.
fn relabel_by_class(labels: Vec<String>, classes: &[String]) -> Vec<String> {
    let indices: Option<Vec<usize>> = labels.iter().map(|l| l.parse().ok()).collect();
    if let Some(idx) = indices {
        if idx.iter().all(|&i| i < classes.len()) {
            return idx.into_iter().map(|i| classes[i].clone()).collect();
        }
    }
    let mut seen: Vec<&str> = Vec::new();
    labels
        .iter()
        .map(|l| {
            let k = match seen.iter().position(|s| *s == l.as_str()) {
                Some(k) => k,
                None => {
                    seen.push(l.as_str());
                    seen.len() - 1
                }
            };
            classes.get(k).cloned().unwrap_or_else(|| l.clone())
        })
        .collect()
}

/// Phenotype-permutation mode needs one label per sample and exactly two classes.
pub fn check_phenotypes(labels: &PhenotypeLabels, data: &ExpressionDataset) -> VResult<()> {
    if labels.labels.len() != data.n_samples() {
        return Err(ValidationError::InvalidParameter(format!(
            "The phenotype labels file lists {} samples but the expression set has {}.",
            labels.labels.len(),
            data.n_samples()
        )));
    }
    let distinct: HashSet<&String> = labels.labels.iter().collect();
    if labels.classes.len() != 2 || distinct.len() != 2 {
        return Err(ValidationError::InvalidParameter(format!(
            "Phenotype permutation needs exactly two classes, found {}.",
            distinct.len()
        )));
    }
    Ok(())
}

pub fn check_permutations(n: i64) -> VResult<usize> {
    if n <= 0 {
        return Err(ValidationError::InvalidParameter(
            "The number of permutations must be positive.".to_string(),
        ));
    }
    Ok(n as usize)
}

pub fn check_size_bounds(min: i64, max: i64) -> VResult<(usize, usize)> {
    if min < 0 {
        return Err(ValidationError::InvalidParameter(
            "Min gene set size must be non-negative.".to_string(),
        ));
    }
    if max < 0 {
        return Err(ValidationError::InvalidParameter(
            "Max gene set size must be non-negative.".to_string(),
        ));
    }
    if min > max {
        return Err(ValidationError::InvalidParameter(
            "Max gene set size must be greater than min gene set size.".to_string(),
        ));
    }
    Ok((min as usize, max as usize))
}
