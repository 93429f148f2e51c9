use itertools::Itertools;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::hash::Hash;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

/// Ranking metric used in phenotype-permutation mode.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Signal2Noise,
    AbsSignal2Noise,
    Ttest,
    RatioOfClasses,
    Log2RatioOfClasses,
    DiffOfClasses,
}

impl FromStr for Metric {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "signal_to_noise" | "s2n" => Ok(Metric::Signal2Noise),
            "abs_signal_to_noise" | "abs_s2n" => Ok(Metric::AbsSignal2Noise),
            "t_test" => Ok(Metric::Ttest),
            "ratio_of_classes" => Ok(Metric::RatioOfClasses),
            "log2_ratio_of_classes" => Ok(Metric::Log2RatioOfClasses),
            "diff_of_classes" => Ok(Metric::DiffOfClasses),
            other => Err(format!("unknown ranking method '{other}'")),
        }
    }
}

pub trait Statistic {
    fn mean(&self) -> f64;
    fn stat(&self, ddof: usize) -> (f64, f64);
    fn argsort(&self, ascending: bool) -> (Vec<usize>, Vec<f64>);
}

impl Statistic for &[f64] {
    /// caculate mean
    fn mean(&self) -> f64 {
        let sum = self.iter().sum::<f64>();
        sum / self.len() as f64
    }
    /// return (mean, std)
    fn stat(&self, ddof: usize) -> (f64, f64) {
        let count = self.len();
        let mean = self.mean();
        let variance = self
            .iter()
            .map(|&value| {
                let diff = mean - value;
                diff * diff
            })
            .sum::<f64>()
            / (count.saturating_sub(ddof) as f64);
        (mean, variance.sqrt())
    }
    /// stable argsort. NaN sorts last in ascending order
    fn argsort(&self, ascending: bool) -> (Vec<usize>, Vec<f64>) {
        let sorted: Vec<(usize, f64)> = self
            .iter()
            .copied()
            .enumerate()
            .sorted_by(|a, b| {
                if ascending {
                    a.1.total_cmp(&b.1)
                } else {
                    b.1.total_cmp(&a.1)
                }
            })
            .collect();
        sorted.into_iter().unzip()
    }
}

/// Dynamic Enum: bidirectional element <-> index lookup
#[derive(Debug, Clone)]
pub struct DynamicEnum<T> {
    elt_to_idx: HashMap<T, usize>,
    idx_to_elt: Vec<T>,
}

impl<T> DynamicEnum<T>
where
    T: Eq + Hash + Clone,
{
    /// construct from vec. Input must not contain duplicates
    pub fn from(vec: &[T]) -> Self {
        let v2m: HashMap<T, usize> = vec
            .iter()
            .enumerate()
            .map(|(i, v)| (v.clone(), i))
            .collect();
        DynamicEnum {
            elt_to_idx: v2m,
            idx_to_elt: vec.to_vec(),
        }
    }
    pub fn index_of(&self, element: &T) -> Option<&usize> {
        self.elt_to_idx.get(element)
    }
    /// indicator of whether each element is in the given elements (0: absent, 1: present)
    pub fn isin(&self, elements: &[T]) -> Vec<f64> {
        let mut tag_indicator: Vec<f64> = vec![0.0; self.idx_to_elt.len()];
        elements.iter().for_each(|e| {
            if let Some(&idx) = self.index_of(e) {
                tag_indicator[idx] = 1.0;
            }
        });
        tag_indicator
    }
    pub fn size(&self) -> usize {
        self.idx_to_elt.len()
    }
    pub fn get_vec(&self) -> &Vec<T> {
        &self.idx_to_elt
    }
    /// inplace shuffle
    pub fn shuffle<R>(&mut self, rng: &mut R)
    where
        R: Rng + ?Sized,
    {
        self.idx_to_elt.shuffle(rng);
        self.idx_to_elt.iter().enumerate().for_each(|(i, e)| {
            self.elt_to_idx.insert(e.clone(), i);
        });
    }
}

/// Raw tabular text: an optional header line and string records.
#[derive(Debug, Default)]
pub struct FileReader {
    pub header: Vec<String>,
    pub record: Vec<Vec<String>>,
}

impl FileReader {
    pub fn new() -> Self {
        FileReader::default()
    }

    /// Read a delimited file with the csv crate.
    /// `skip`: leading lines dropped before the header (or the first record).
    /// Rows are not required to have equal length; callers decide what a ragged row means.
    pub fn read_csv(
        &mut self,
        file_path: &Path,
        delimiter: u8,
        skip: usize,
        header: bool,
        comment: Option<u8>,
    ) -> Result<(), csv::Error> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .comment(comment)
            .from_path(file_path)?;
        let mut records = rdr.records().skip(skip);
        if header {
            if let Some(h) = records.next() {
                self.header = h?.iter().map(|x| x.to_string()).collect();
            }
        }
        for result in records {
            let record = result?;
            self.record.push(record.iter().map(|x| x.to_string()).collect());
        }
        Ok(())
    }

    /// Read a line-oriented file. `None` delimiter splits on any whitespace.
    /// Empty lines are dropped.
    pub fn read_table(
        &mut self,
        file_path: &Path,
        delimiter: Option<char>,
        header: bool,
    ) -> std::io::Result<()> {
        let input = File::open(file_path)?;
        let buffered = BufReader::new(input);
        for line in buffered.lines() {
            let line = line?;
            let line = line.trim_end_matches(['\r', '\n']);
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<String> = match delimiter {
                Some(d) => line.split(d).map(|x| x.to_string()).collect(),
                None => line.split_whitespace().map(|x| x.to_string()).collect(),
            };
            if header && self.header.is_empty() && self.record.is_empty() {
                self.header = fields;
            } else {
                self.record.push(fields);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use std::io::Write;

    #[test]
    fn test_dynum() {
        let vec = vec!["A", "B", "C", "D"];
        let mut dynum = DynamicEnum::from(&vec);
        assert_eq!(*dynum.index_of(&"C").unwrap(), 2);
        assert_eq!(dynum.size(), 4);
        assert_eq!(dynum.isin(&["B", "D", "Z"]), vec![0.0, 1.0, 0.0, 1.0]);
        let mut rng = SmallRng::seed_from_u64(3);
        dynum.shuffle(&mut rng);
        for (i, e) in dynum.get_vec().iter().enumerate() {
            assert_eq!(*dynum.index_of(e).unwrap(), i);
        }
    }

    #[test]
    fn test_argsort_descending_with_nan() {
        let v = vec![0.5, f64::NAN, 2.0, -1.0];
        let (idx, vals) = v.as_slice().argsort(true);
        assert_eq!(idx, vec![3, 0, 2, 1]);
        assert!(vals[3].is_nan());
        let (idx, _) = v.as_slice().argsort(false);
        assert_eq!(idx[0], 1); // NaN is the largest under total ordering
        assert_eq!(&idx[1..], &[2, 0, 3]);
    }

    #[test]
    fn test_stat() {
        let v = [1.0, 2.0, 3.0, 4.0];
        let (m, s) = v.as_slice().stat(1);
        assert!((m - 2.5).abs() < 1e-12);
        assert!((s - 1.2909944487358056).abs() < 1e-12);
    }

    #[test]
    fn test_rdr_skip_and_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.gct");
        let mut f = File::create(&path).unwrap();
        write!(f, "#1.2\n2\t2\nNAME\tDescription\tS1\tS2\ng1\tna\t1\t2\ng2\tna\t3\n").unwrap();
        let mut rdr = FileReader::new();
        rdr.read_csv(&path, b'\t', 2, true, None).unwrap();
        assert_eq!(rdr.header, vec!["NAME", "Description", "S1", "S2"]);
        assert_eq!(rdr.record.len(), 2);
        assert_eq!(rdr.record[1].len(), 3);
    }
}
