//! Labels, weights, query boundaries and initial scores of a dataset.
//!
//! Weights, queries and initial scores may come from side files next to the
//! data file (`<data>.weight`, `<data>.query`, `<data>.init`) or from data
//! columns. Side files describe the whole file, so partitioned loads subset
//! them in [`Metadata::check_or_partition`].

use crate::core::error::{LightGBMError, Result};
use crate::core::types::{DataSize, Label};
use crate::core::utils::{BinaryReader, BinaryWriter, Common};
use std::fs;
use std::path::Path;

/// Per-row side information of a dataset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    num_data: DataSize,
    label: Vec<Label>,
    weights: Vec<Label>,
    query_boundaries: Vec<DataSize>,
    /// Per-row query ids set from a data column, folded into boundaries later
    queries: Vec<DataSize>,
    /// Class-major initial scores: `init_score[k * num_data + i]`
    init_score: Vec<f64>,
    weight_load_from_file: bool,
    query_load_from_file: bool,
    init_score_load_from_file: bool,
}

fn read_lines(path: &Path) -> Result<Option<Vec<String>>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path)?;
    Ok(Some(
        text.lines()
            .map(|l| Common::trim(l).to_string())
            .filter(|l| !l.is_empty())
            .collect(),
    ))
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the side files of `data_filename`.
    ///
    /// `initscore_file` overrides `<data>.init` when not empty.
    pub fn init_from_file(&mut self, data_filename: &str, initscore_file: &str) -> Result<()> {
        self.load_weights(data_filename)?;
        self.load_query_boundaries(data_filename)?;
        self.load_initial_score(data_filename, initscore_file)?;
        Ok(())
    }

    /// Allocate per-row storage. Weight or query columns (`>= 0`) take
    /// precedence over side files.
    pub fn init(&mut self, num_data: DataSize, weight_idx: i32, query_idx: i32) {
        self.num_data = num_data;
        self.label = vec![0.0; num_data as usize];
        if weight_idx >= 0 {
            if !self.weights.is_empty() {
                log::info!("Using weights in data file, ignoring the additional weights file");
            }
            self.weights = vec![0.0; num_data as usize];
            self.weight_load_from_file = false;
        }
        if query_idx >= 0 {
            if !self.query_boundaries.is_empty() {
                log::info!("Using query id in data file, ignoring the additional query file");
                self.query_boundaries.clear();
            }
            self.queries = vec![0; num_data as usize];
            self.query_load_from_file = false;
        }
    }

    fn load_weights(&mut self, data_filename: &str) -> Result<()> {
        let path = format!("{}.weight", data_filename);
        if let Some(lines) = read_lines(Path::new(&path))? {
            log::info!("Loading weights...");
            self.weights = lines
                .iter()
                .map(|l| Common::atof(l).map(|v| v as Label))
                .collect::<Result<_>>()?;
            self.weight_load_from_file = true;
        }
        Ok(())
    }

    fn load_query_boundaries(&mut self, data_filename: &str) -> Result<()> {
        let path = format!("{}.query", data_filename);
        if let Some(lines) = read_lines(Path::new(&path))? {
            log::info!("Loading query boundaries...");
            let mut boundaries = Vec::with_capacity(lines.len() + 1);
            boundaries.push(0);
            for line in &lines {
                let cnt = Common::atoi_and_check(line).ok_or_else(|| {
                    LightGBMError::data_loading(format!("bad query size \"{}\" in {}", line, path))
                })?;
                let last = boundaries.last().copied().unwrap_or(0);
                boundaries.push(last + cnt);
            }
            self.query_boundaries = boundaries;
            self.query_load_from_file = true;
        }
        Ok(())
    }

    /// Read per-class initial scores, one tab-separated line per row
    pub fn load_initial_score(&mut self, data_filename: &str, initscore_file: &str) -> Result<()> {
        let path = if initscore_file.is_empty() {
            format!("{}.init", data_filename)
        } else {
            initscore_file.to_string()
        };
        if !Path::new(&path).exists() {
            if !initscore_file.is_empty() {
                return Err(LightGBMError::data_loading(format!(
                    "Initial score file {} doesn't exist",
                    path
                )));
            }
            return Ok(());
        }
        log::info!("Loading initial scores...");
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(false)
            .from_path(&path)?;
        let mut rows: Vec<Vec<f64>> = Vec::new();
        for record in reader.records() {
            let record = record?;
            let row = record
                .iter()
                .filter(|s| !s.is_empty())
                .map(Common::atof)
                .collect::<Result<Vec<f64>>>()?;
            rows.push(row);
        }
        let num_line = rows.len();
        let num_class = rows.first().map_or(0, Vec::len);
        let mut init_score = vec![0.0; num_line * num_class];
        for (i, row) in rows.iter().enumerate() {
            for (k, &v) in row.iter().enumerate() {
                init_score[k * num_line + i] = v;
            }
        }
        self.init_score = init_score;
        self.init_score_load_from_file = true;
        Ok(())
    }

    /// Validate side-file sizes against the data, or subset them to the
    /// rows this worker keeps.
    pub fn check_or_partition(&mut self, num_all_data: DataSize, used_data_indices: &[DataSize]) -> Result<()> {
        if !self.queries.is_empty() {
            self.queries_to_boundaries();
        }
        if used_data_indices.is_empty() {
            if !self.weights.is_empty() && self.weights.len() != self.num_data as usize {
                return Err(LightGBMError::data_loading("Weights size doesn't match data size"));
            }
            if let Some(&last) = self.query_boundaries.last() {
                if last != self.num_data {
                    return Err(LightGBMError::data_loading("Query size doesn't match data size"));
                }
            }
            if !self.init_score.is_empty()
                && (self.num_data == 0 || self.init_score.len() % self.num_data as usize != 0)
            {
                return Err(LightGBMError::data_loading("Initial score size doesn't match data size"));
            }
            return Ok(());
        }

        let num_used = used_data_indices.len();
        if self.weight_load_from_file {
            if self.weights.len() != num_all_data as usize {
                return Err(LightGBMError::data_loading("Weights size doesn't match data size"));
            }
            self.weights = used_data_indices
                .iter()
                .map(|&i| self.weights[i as usize])
                .collect();
            self.weight_load_from_file = false;
        }

        if self.query_load_from_file && !self.query_boundaries.is_empty() {
            let num_queries = self.query_boundaries.len() - 1;
            if self.query_boundaries[num_queries] != num_all_data {
                return Err(LightGBMError::data_loading("Query size doesn't match data size"));
            }
            let mut boundaries = vec![0];
            let mut data_idx = 0usize;
            for qid in 0..num_queries {
                if data_idx >= num_used {
                    break;
                }
                let start = self.query_boundaries[qid];
                let end = self.query_boundaries[qid + 1];
                let len = (end - start) as usize;
                let first = used_data_indices[data_idx];
                if first > start {
                    continue;
                }
                if first < start
                    || num_used < data_idx + len
                    || used_data_indices[data_idx + len - 1] != end - 1
                {
                    return Err(LightGBMError::data_loading(
                        "Data partition error, data didn't match queries",
                    ));
                }
                data_idx += len;
                let last = boundaries.last().copied().unwrap_or(0);
                boundaries.push(last + len as DataSize);
            }
            self.query_boundaries = boundaries;
            self.query_load_from_file = false;
        }

        if self.init_score_load_from_file && !self.init_score.is_empty() {
            let num_all = num_all_data as usize;
            if num_all == 0 || self.init_score.len() % num_all != 0 {
                return Err(LightGBMError::data_loading("Initial score size doesn't match data size"));
            }
            let num_class = self.init_score.len() / num_all;
            let mut partitioned = vec![0.0; num_class * num_used];
            for k in 0..num_class {
                for (i, &idx) in used_data_indices.iter().enumerate() {
                    partitioned[k * num_used + i] = self.init_score[k * num_all + idx as usize];
                }
            }
            self.init_score = partitioned;
            self.init_score_load_from_file = false;
        }
        self.num_data = num_used as DataSize;
        Ok(())
    }

    /// Consecutive equal query ids form one query
    fn queries_to_boundaries(&mut self) {
        let mut boundaries = vec![0];
        let mut last_qid: Option<DataSize> = None;
        for (i, &qid) in self.queries.iter().enumerate() {
            if last_qid.map_or(false, |q| q != qid) {
                boundaries.push(i as DataSize);
            }
            last_qid = Some(qid);
        }
        if !self.queries.is_empty() {
            boundaries.push(self.queries.len() as DataSize);
        }
        self.query_boundaries = boundaries;
        self.queries.clear();
    }

    /// Keep only the labels of `used_indices`
    pub fn partition_label(&mut self, used_indices: &[DataSize]) {
        self.label = used_indices.iter().map(|&i| self.label[i as usize]).collect();
        self.num_data = used_indices.len() as DataSize;
    }

    #[inline]
    pub fn set_label_at(&mut self, idx: DataSize, value: f64) {
        self.label[idx as usize] = value as Label;
    }

    #[inline]
    pub fn set_weight_at(&mut self, idx: DataSize, value: f64) {
        self.weights[idx as usize] = value as Label;
    }

    #[inline]
    pub fn set_query_at(&mut self, idx: DataSize, value: f64) {
        self.queries[idx as usize] = value as DataSize;
    }

    /// Whether a weight column feeds `set_weight_at`
    pub fn has_weight_column(&self) -> bool {
        !self.weight_load_from_file && !self.weights.is_empty()
    }

    /// Whether a query column feeds `set_query_at`
    pub fn has_query_column(&self) -> bool {
        !self.queries.is_empty()
    }

    /// Replace the initial scores (class-major)
    pub fn set_init_score(&mut self, init_score: Vec<f64>) -> Result<()> {
        if !init_score.is_empty()
            && (self.num_data == 0 || init_score.len() % self.num_data as usize != 0)
        {
            return Err(LightGBMError::dimension_mismatch(
                format!("a multiple of {}", self.num_data),
                init_score.len().to_string(),
            ));
        }
        self.init_score = init_score;
        self.init_score_load_from_file = false;
        Ok(())
    }

    pub fn num_data(&self) -> DataSize {
        self.num_data
    }

    pub fn label(&self) -> &[Label] {
        &self.label
    }

    /// Row weights, `None` when unweighted
    pub fn weights(&self) -> Option<&[Label]> {
        if self.weights.is_empty() {
            None
        } else {
            Some(&self.weights)
        }
    }

    /// Query boundaries, `None` without queries
    pub fn query_boundaries(&self) -> Option<&[DataSize]> {
        if self.query_boundaries.is_empty() {
            None
        } else {
            Some(&self.query_boundaries)
        }
    }

    pub fn num_queries(&self) -> usize {
        self.query_boundaries.len().saturating_sub(1)
    }

    /// Initial scores, `None` when absent
    pub fn init_score(&self) -> Option<&[f64]> {
        if self.init_score.is_empty() {
            None
        } else {
            Some(&self.init_score)
        }
    }

    /// Serialized size in bytes
    pub fn sizes_in_byte(&self) -> usize {
        4 * 3
            + 4 * self.label.len()
            + 4 * self.weights.len()
            + 4 * self.query_boundaries.len()
    }

    /// Write counts, labels, weights and query boundaries
    pub fn write_to(&self, writer: &mut dyn BinaryWriter) -> Result<()> {
        writer.write_i32(self.num_data)?;
        writer.write_i32(self.weights.len() as i32)?;
        writer.write_i32(self.num_queries() as i32)?;
        for &v in &self.label {
            writer.write_f32(v)?;
        }
        for &v in &self.weights {
            writer.write_f32(v)?;
        }
        for &v in &self.query_boundaries {
            writer.write_i32(v)?;
        }
        Ok(())
    }

    /// Read a block written by [`Metadata::write_to`].
    ///
    /// Weights and queries are treated as file-level data, so a later
    /// partition subsets them.
    pub fn load_from_memory(buf: &[u8]) -> Result<Self> {
        let mut reader = BinaryReader::new(buf, "meta data");
        let num_data = reader.read_i32()?;
        let num_weights = reader.read_count()?;
        let num_queries = reader.read_count()?;
        if num_data < 0 {
            return Err(LightGBMError::format("meta data has a negative row count"));
        }
        let label = (0..num_data)
            .map(|_| reader.read_f32())
            .collect::<Result<Vec<_>>>()?;
        let weights = (0..num_weights)
            .map(|_| reader.read_f32())
            .collect::<Result<Vec<_>>>()?;
        let query_boundaries = if num_queries > 0 {
            reader.read_i32_vec(num_queries + 1)?
        } else {
            Vec::new()
        };
        Ok(Metadata {
            num_data,
            weight_load_from_file: !weights.is_empty(),
            query_load_from_file: !query_boundaries.is_empty(),
            label,
            weights,
            query_boundaries,
            ..Metadata::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_ids_to_boundaries() {
        let mut meta = Metadata::new();
        meta.init(6, -1, 1);
        for (i, q) in [3.0, 3.0, 1.0, 1.0, 1.0, 8.0].iter().enumerate() {
            meta.set_query_at(i as DataSize, *q);
        }
        meta.check_or_partition(6, &[]).unwrap();
        assert_eq!(meta.query_boundaries(), Some(&[0, 2, 5, 6][..]));
        assert_eq!(meta.num_queries(), 3);
    }

    #[test]
    fn test_side_files() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("train.txt");
        let data = data.to_str().unwrap();
        fs::write(format!("{}.weight", data), "1\n2\n0.5\n1\n").unwrap();
        fs::write(format!("{}.query", data), "2\n2\n").unwrap();
        fs::write(format!("{}.init", data), "0.1\t1\n0.2\t2\n0.3\t3\n0.4\t4\n").unwrap();

        let mut meta = Metadata::new();
        meta.init_from_file(data, "").unwrap();
        meta.init(4, -1, -1);
        meta.check_or_partition(4, &[]).unwrap();
        assert_eq!(meta.weights(), Some(&[1.0, 2.0, 0.5, 1.0][..]));
        assert_eq!(meta.query_boundaries(), Some(&[0, 2, 4][..]));
        // class-major layout
        assert_eq!(meta.init_score().unwrap(), &[0.1, 0.2, 0.3, 0.4, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_partition_by_whole_queries() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("train.txt");
        let data = data.to_str().unwrap();
        fs::write(format!("{}.query", data), "2\n3\n1\n").unwrap();
        fs::write(format!("{}.weight", data), "1\n2\n3\n4\n5\n6\n").unwrap();

        let mut meta = Metadata::new();
        meta.init_from_file(data, "").unwrap();
        meta.init(3, -1, -1);
        meta.check_or_partition(6, &[2, 3, 4]).unwrap();
        assert_eq!(meta.query_boundaries(), Some(&[0, 3][..]));
        assert_eq!(meta.weights(), Some(&[3.0, 4.0, 5.0][..]));

        let mut meta = Metadata::new();
        meta.init_from_file(data, "").unwrap();
        meta.init(2, -1, -1);
        // rows 1 and 2 straddle two queries
        assert!(meta.check_or_partition(6, &[1, 2]).is_err());
    }

    #[test]
    fn test_size_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("train.txt");
        let data = data.to_str().unwrap();
        fs::write(format!("{}.weight", data), "1\n2\n").unwrap();
        let mut meta = Metadata::new();
        meta.init_from_file(data, "").unwrap();
        meta.init(3, -1, -1);
        assert!(meta.check_or_partition(3, &[]).is_err());
    }

    #[test]
    fn test_binary_block() {
        let mut meta = Metadata::new();
        meta.init(3, 0, -1);
        for i in 0..3 {
            meta.set_label_at(i, f64::from(i));
            meta.set_weight_at(i, 0.5);
        }
        let mut buf: Vec<u8> = Vec::new();
        meta.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), meta.sizes_in_byte());
        let back = Metadata::load_from_memory(&buf).unwrap();
        assert_eq!(back.label(), meta.label());
        assert_eq!(back.weights(), meta.weights());
        assert!(Metadata::load_from_memory(&buf[..buf.len() - 2]).is_err());
    }
}
