//! Line-oriented reading of text data files.
//!
//! Every read skips the header line when the file has one, strips trailing
//! `\r` and ignores empty lines. Line indices count data lines only.

use crate::core::error::{LightGBMError, Result};
use crate::core::types::DataSize;
use crate::core::utils::Random;
use std::fs::File;
use std::io::{BufRead, BufReader};

/// Lines handed to a process callback at once
const CHUNK_SIZE: usize = 1 << 16;

/// Reader over one text data file.
#[derive(Debug, Clone)]
pub struct TextReader {
    filename: String,
    has_header: bool,
    first_line: String,
}

impl TextReader {
    /// Open `filename`; the first line is kept for header and format detection.
    pub fn new(filename: &str, has_header: bool) -> Result<Self> {
        let mut reader = TextReader {
            filename: filename.to_string(),
            has_header,
            first_line: String::new(),
        };
        let mut first = String::new();
        reader.for_each_raw_line(|line| {
            first = line.to_string();
            Ok(false)
        })?;
        reader.first_line = first;
        Ok(reader)
    }

    /// The header line, or the first data line without a header
    pub fn first_line(&self) -> &str {
        &self.first_line
    }

    fn open(&self) -> Result<BufReader<File>> {
        let file = File::open(&self.filename).map_err(|e| {
            LightGBMError::data_loading(format!("Could not open data file {}: {}", self.filename, e))
        })?;
        Ok(BufReader::new(file))
    }

    /// Visit non-empty lines, header included, until `f` returns false
    fn for_each_raw_line<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&str) -> Result<bool>,
    {
        let reader = self.open()?;
        for line in reader.lines() {
            let line = line?;
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            if !f(line)? {
                break;
            }
        }
        Ok(())
    }

    /// Visit data lines with their index
    fn for_each_line<F>(&self, mut f: F) -> Result<usize>
    where
        F: FnMut(usize, &str) -> Result<()>,
    {
        let mut skip_header = self.has_header;
        let mut idx = 0usize;
        self.for_each_raw_line(|line| {
            if skip_header {
                skip_header = false;
                return Ok(true);
            }
            f(idx, line)?;
            idx += 1;
            Ok(true)
        })?;
        Ok(idx)
    }

    /// Number of data lines
    pub fn count_line(&self) -> Result<usize> {
        self.for_each_line(|_, _| Ok(()))
    }

    /// Up to `n` data lines from the start of the file
    pub fn read_first_lines(&self, n: usize) -> Result<Vec<String>> {
        let mut lines = Vec::with_capacity(n);
        let mut skip_header = self.has_header;
        self.for_each_raw_line(|line| {
            if skip_header {
                skip_header = false;
                return Ok(true);
            }
            if lines.len() < n {
                lines.push(line.to_string());
            }
            Ok(lines.len() < n)
        })?;
        Ok(lines)
    }

    pub fn read_all_lines(&self) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        self.for_each_line(|_, line| {
            lines.push(line.to_string());
            Ok(())
        })?;
        Ok(lines)
    }

    /// Keep lines accepted by `filter`, recording their indices in
    /// `used_indices`. Returns the kept lines and the total line count.
    pub fn read_and_filter_lines<F>(
        &self,
        mut filter: F,
        used_indices: &mut Vec<DataSize>,
    ) -> Result<(Vec<String>, usize)>
    where
        F: FnMut(usize) -> Result<bool>,
    {
        used_indices.clear();
        let mut lines = Vec::new();
        let total = self.for_each_line(|idx, line| {
            if filter(idx)? {
                used_indices.push(idx as DataSize);
                lines.push(line.to_string());
            }
            Ok(())
        })?;
        Ok((lines, total))
    }

    /// Reservoir sample of up to `sample_cnt` lines, in reservoir order.
    /// Returns the sample and the total line count.
    pub fn sample_from_file(&self, random: &mut Random, sample_cnt: usize) -> Result<(Vec<String>, usize)> {
        let mut sampled: Vec<String> = Vec::with_capacity(sample_cnt);
        let total = self.for_each_line(|idx, line| {
            reservoir_push(&mut sampled, random, sample_cnt, idx, line);
            Ok(())
        })?;
        Ok((sampled, total))
    }

    /// Reservoir sample over the lines accepted by `filter`, whose indices
    /// go to `used_indices`. Returns the sample and the total line count.
    pub fn sample_and_filter_from_file<F>(
        &self,
        mut filter: F,
        used_indices: &mut Vec<DataSize>,
        random: &mut Random,
        sample_cnt: usize,
    ) -> Result<(Vec<String>, usize)>
    where
        F: FnMut(usize) -> Result<bool>,
    {
        used_indices.clear();
        let mut sampled: Vec<String> = Vec::with_capacity(sample_cnt);
        let total = self.for_each_line(|idx, line| {
            if filter(idx)? {
                let cur = used_indices.len();
                used_indices.push(idx as DataSize);
                reservoir_push(&mut sampled, random, sample_cnt, cur, line);
            }
            Ok(())
        })?;
        Ok((sampled, total))
    }

    /// Feed every line to `process(start_idx, chunk)` in chunks.
    /// Returns the number of lines.
    pub fn read_all_and_process_parallel<F>(&self, mut process: F) -> Result<usize>
    where
        F: FnMut(usize, &[String]) -> Result<()>,
    {
        let mut chunk: Vec<String> = Vec::with_capacity(CHUNK_SIZE);
        let mut start = 0usize;
        let total = self.for_each_line(|_, line| {
            chunk.push(line.to_string());
            if chunk.len() == CHUNK_SIZE {
                process(start, &chunk)?;
                start += chunk.len();
                chunk.clear();
            }
            Ok(())
        })?;
        if !chunk.is_empty() {
            process(start, &chunk)?;
        }
        Ok(total)
    }

    /// Like [`TextReader::read_all_and_process_parallel`] but only for the
    /// lines in `used_indices` (ascending); `start_idx` counts used lines.
    pub fn read_part_and_process_parallel<F>(&self, used_indices: &[DataSize], mut process: F) -> Result<usize>
    where
        F: FnMut(usize, &[String]) -> Result<()>,
    {
        let mut chunk: Vec<String> = Vec::with_capacity(CHUNK_SIZE.min(used_indices.len()));
        let mut start = 0usize;
        let mut next = 0usize;
        let total = self.for_each_line(|idx, line| {
            if next < used_indices.len() && used_indices[next] as usize == idx {
                next += 1;
                chunk.push(line.to_string());
                if chunk.len() == CHUNK_SIZE {
                    process(start, &chunk)?;
                    start += chunk.len();
                    chunk.clear();
                }
            }
            Ok(())
        })?;
        if !chunk.is_empty() {
            process(start, &chunk)?;
        }
        Ok(total)
    }
}

fn reservoir_push(sampled: &mut Vec<String>, random: &mut Random, sample_cnt: usize, idx: usize, line: &str) {
    if sampled.len() < sample_cnt {
        sampled.push(line.to_string());
    } else {
        let pos = random.next_int(0, idx as i32 + 1) as usize;
        if pos < sample_cnt {
            sampled[pos] = line.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(content: &str) -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, content).unwrap();
        (dir, path.to_str().unwrap().to_string())
    }

    #[test]
    fn test_header_and_crlf() {
        let (_dir, path) = write("y,a\r\n1,2\r\n\r\n3,4\r\n");
        let reader = TextReader::new(&path, true).unwrap();
        assert_eq!(reader.first_line(), "y,a");
        assert_eq!(reader.read_all_lines().unwrap(), vec!["1,2", "3,4"]);
        assert_eq!(reader.count_line().unwrap(), 2);
    }

    #[test]
    fn test_filter_records_indices() {
        let (_dir, path) = write("0\n1\n2\n3\n4\n");
        let reader = TextReader::new(&path, false).unwrap();
        let mut used = Vec::new();
        let (lines, total) = reader.read_and_filter_lines(|i| Ok(i % 2 == 0), &mut used).unwrap();
        assert_eq!(total, 5);
        assert_eq!(used, vec![0, 2, 4]);
        assert_eq!(lines, vec!["0", "2", "4"]);
    }

    #[test]
    fn test_sample_keeps_at_most_k() {
        let content: String = (0..100).map(|i| format!("{}\n", i)).collect();
        let (_dir, path) = write(&content);
        let reader = TextReader::new(&path, false).unwrap();
        let mut random = Random::with_seed(1);
        let (sampled, total) = reader.sample_from_file(&mut random, 10).unwrap();
        assert_eq!(total, 100);
        assert_eq!(sampled.len(), 10);
    }

    #[test]
    fn test_read_part_in_order() {
        let (_dir, path) = write("a\nb\nc\nd\n");
        let reader = TextReader::new(&path, false).unwrap();
        let mut seen = Vec::new();
        reader
            .read_part_and_process_parallel(&[1, 3], |start, chunk| {
                seen.push((start, chunk.to_vec()));
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec![(0, vec!["b".to_string(), "d".to_string()])]);
    }
}
