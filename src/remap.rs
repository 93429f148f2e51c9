//! Translate platform probe identifiers into gene symbols through a chip mapping.
use std::collections::HashSet;

use tracing::{debug, info};

use crate::data::{ChipMapping, ExpressionDataset, RankedList};
use crate::error::{GseaError, Result};

/// Remap argument value meaning "leave identifiers alone".
pub const REMAP_NONE: &str = "none";
/// Chip argument value meaning "no chip file supplied".
pub const CHIP_NOT_SUPPLIED: &str = "null";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemapMode {
    None,
    Remap,
}

impl RemapMode {
    pub fn from_arg(arg: &str) -> Self {
        if arg == REMAP_NONE {
            RemapMode::None
        } else {
            RemapMode::Remap
        }
    }
}

/// Chip argument: `None` for the sentinel or an empty string.
pub fn chip_arg(arg: &str) -> Option<&str> {
    let arg = arg.trim();
    if arg.is_empty() || arg == CHIP_NOT_SUPPLIED {
        None
    } else {
        Some(arg)
    }
}

fn require_chip(chip: Option<&ChipMapping>) -> Result<&ChipMapping> {
    chip.ok_or_else(|| {
        GseaError::Configuration("If remap selected, a chip must be selected too.".to_string())
    })
}

/// Inner join of the expression rows against the chip. Unmapped probes and rows
/// with non-finite values are dropped; a symbol seen twice keeps its first row.
pub fn remap_expression(
    data: ExpressionDataset,
    mode: RemapMode,
    chip: Option<&ChipMapping>,
) -> Result<ExpressionDataset> {
    if mode == RemapMode::None {
        return Ok(data);
    }
    let chip = require_chip(chip)?;
    let total = data.n_genes();
    let mut out = ExpressionDataset {
        samples: data.samples,
        ..Default::default()
    };
    let mut seen = HashSet::new();
    let (mut unmapped, mut incomplete, mut duplicated) = (0usize, 0usize, 0usize);
    for ((probe, desc), values) in data
        .genes
        .into_iter()
        .zip(data.descriptions)
        .zip(data.values)
    {
        let Some(symbol) = chip.symbol(&probe) else {
            unmapped += 1;
            continue;
        };
        if values.len() != out.samples.len() || values.iter().any(|v| !v.is_finite()) {
            incomplete += 1;
            continue;
        }
        if !seen.insert(symbol.to_string()) {
            debug!(probe = %probe, symbol, "symbol already mapped, dropping probe");
            duplicated += 1;
            continue;
        }
        out.genes.push(symbol.to_string());
        out.descriptions.push(desc);
        out.values.push(values);
    }
    info!(
        total,
        kept = out.n_genes(),
        unmapped,
        incomplete,
        duplicated,
        "expression set remapped"
    );
    Ok(out)
}

/// Same join for a ranked list. The result is re-sorted by score and, for a symbol
/// reached by several probes, only its highest score survives.
pub fn remap_ranked(
    rnk: RankedList,
    mode: RemapMode,
    chip: Option<&ChipMapping>,
) -> Result<RankedList> {
    if mode == RemapMode::None {
        return Ok(rnk);
    }
    let chip = require_chip(chip)?;
    let total = rnk.len();
    let mut out = RankedList::default();
    for (probe, score) in rnk.genes.into_iter().zip(rnk.scores) {
        match chip.symbol(&probe) {
            Some(symbol) if score.is_finite() => {
                out.genes.push(symbol.to_string());
                out.scores.push(score);
            }
            _ => continue,
        }
    }
    let joined = out.len();
    out.sort_descending();
    let duplicated = out.dedup_keep_first();
    info!(
        total,
        kept = out.len(),
        unmapped = total - joined,
        duplicated,
        "ranked list remapped"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chip() -> ChipMapping {
        let mut c = ChipMapping::default();
        c.symbols.insert("p1".into(), Some("TP53".into()));
        c.symbols.insert("p2".into(), Some("MYC".into()));
        c.symbols.insert("p3".into(), None);
        c.symbols.insert("p4".into(), Some("TP53".into()));
        c
    }

    fn dataset() -> ExpressionDataset {
        ExpressionDataset {
            genes: vec!["p1", "p2", "p3", "p9", "p4"]
                .into_iter()
                .map(String::from)
                .collect(),
            descriptions: vec![String::new(); 5],
            samples: vec!["S1".into(), "S2".into()],
            values: vec![
                vec![1.0, 2.0],
                vec![3.0, f64::NAN],
                vec![5.0, 6.0],
                vec![7.0, 8.0],
                vec![9.0, 10.0],
            ],
        }
    }

    #[test]
    fn passthrough_without_remap() {
        let d = dataset();
        let out = remap_expression(d.clone(), RemapMode::None, None).unwrap();
        assert_eq!(out.genes, d.genes);
    }

    #[test]
    fn remap_without_chip_is_configuration_error() {
        let err = remap_expression(dataset(), RemapMode::Remap, None).unwrap_err();
        assert!(matches!(err, GseaError::Configuration(_)));
        let err = remap_ranked(RankedList::default(), RemapMode::Remap, None).unwrap_err();
        assert!(matches!(err, GseaError::Configuration(_)));
    }

    #[test]
    fn unmapped_rows_are_dropped_not_nulled() {
        let c = chip();
        let out = remap_expression(dataset(), RemapMode::Remap, Some(&c)).unwrap();
        // p2 has NaN, p3 has no symbol, p9 is unknown, p4 repeats TP53
        assert_eq!(out.genes, vec!["TP53"]);
        assert_eq!(out.values, vec![vec![1.0, 2.0]]);
        let targets: HashSet<&str> = c.symbols.values().flatten().map(String::as_str).collect();
        assert!(out.genes.iter().all(|g| targets.contains(g.as_str())));
    }

    #[test]
    fn ranked_keeps_highest_score_per_symbol() {
        let rnk = RankedList {
            genes: vec!["p1", "p2", "p4", "p3"].into_iter().map(String::from).collect(),
            scores: vec![-1.0, 0.5, 2.0, 9.0],
        };
        let out = remap_ranked(rnk, RemapMode::Remap, Some(&chip())).unwrap();
        assert_eq!(out.genes, vec!["TP53", "MYC"]);
        assert_eq!(out.scores, vec![2.0, 0.5]);
    }

    #[test]
    fn remap_mode_args() {
        assert_eq!(RemapMode::from_arg("none"), RemapMode::None);
        assert_eq!(RemapMode::from_arg("Remap_Only"), RemapMode::Remap);
        assert_eq!(chip_arg("null"), None);
        assert_eq!(chip_arg(" a.chip "), Some("a.chip"));
    }
}
