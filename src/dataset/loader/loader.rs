//! Loading datasets from text, binary files and in-memory matrices.
//!
//! Text loads resolve the column roles from the header, sample rows to find
//! bin boundaries, and then push every row into the binned layout. With more
//! than one machine the rows are partitioned by rank unless the data is
//! pre-partitioned, and bin mappers are computed per feature slice and
//! exchanged with an all-gather.

use crate::config::Config;
use crate::core::error::{LightGBMError, Result};
use crate::core::feature_group::FeatureGroup;
use crate::core::meta::{PredictFunction, BINARY_FILE_TOKEN, K_EPSILON};
use crate::core::network::Network;
use crate::core::types::{DataSize, Label};
use crate::core::utils::{read_sized_block, Common, Random, Threading};
use crate::dataset::binning::{find_bins_for_features, BinMapper, BinParams};
use crate::dataset::dataset::{Dataset, GroupBinEntry};
use crate::dataset::loader::parser::{create_parser, Parser};
use crate::dataset::loader::text_reader::TextReader;
use crate::dataset::metadata::Metadata;
use ndarray::ArrayView2;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

const NAME_PREFIX: &str = "name:";
/// Rows handled by one worker block during feature extraction
const MIN_ROWS_PER_BLOCK: usize = 512;
/// Rows parsed at once from in-memory text before their lines are freed
const MEMORY_CHUNK_ROWS: usize = 1 << 14;

/// Worker-local output of feature extraction, merged in block order.
#[derive(Debug, Default)]
struct RowScratch {
    bins: Vec<GroupBinEntry>,
    labels: Vec<(DataSize, f64)>,
    weights: Vec<(DataSize, f64)>,
    queries: Vec<(DataSize, f64)>,
    init_rows: Vec<DataSize>,
    init_scores: Vec<f64>,
}

impl RowScratch {
    fn clear(&mut self) {
        self.bins.clear();
        self.labels.clear();
        self.weights.clear();
        self.queries.clear();
        self.init_rows.clear();
        self.init_scores.clear();
    }
}

/// Builds [`Dataset`]s according to a [`Config`].
pub struct DatasetLoader {
    config: Config,
    network: Arc<dyn Network>,
    predict_fun: Option<PredictFunction>,
    num_class: usize,
    random: Random,
    label_idx: i32,
    weight_idx: i32,
    group_idx: i32,
    ignore_features: HashSet<usize>,
    categorical_features: HashSet<usize>,
    feature_names: Vec<String>,
}

impl std::fmt::Debug for DatasetLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetLoader")
            .field("label_idx", &self.label_idx)
            .field("weight_idx", &self.weight_idx)
            .field("group_idx", &self.group_idx)
            .field("num_class", &self.num_class)
            .finish()
    }
}

fn parse_column_index(value: &str, what: &str) -> Result<i32> {
    Common::atoi_and_check(value).ok_or_else(|| {
        LightGBMError::config(format!(
            "{} is not a number, if you want to use a column name, please add the prefix \"name:\" to the column name",
            what
        ))
    })
}

impl DatasetLoader {
    /// Loader for `filename`, whose header (if any) resolves named columns.
    ///
    /// `predict_fun` computes warm-start scores for `num_class` classes.
    pub fn new(
        config: &Config,
        predict_fun: Option<PredictFunction>,
        num_class: usize,
        filename: &str,
        network: Arc<dyn Network>,
    ) -> Result<Self> {
        let mut loader = DatasetLoader {
            config: config.clone(),
            network,
            predict_fun,
            num_class: num_class.max(1),
            random: Random::with_seed(config.data_random_seed),
            label_idx: 0,
            weight_idx: -1,
            group_idx: -1,
            ignore_features: HashSet::new(),
            categorical_features: HashSet::new(),
            feature_names: Vec::new(),
        };
        loader.set_header(filename)?;
        Ok(loader)
    }

    /// Loader without a data file to read a header from
    pub fn without_header(config: &Config, network: Arc<dyn Network>) -> Result<Self> {
        Self::new(config, None, 1, "", network)
    }

    pub fn label_idx(&self) -> i32 {
        self.label_idx
    }

    pub fn weight_idx(&self) -> i32 {
        self.weight_idx
    }

    pub fn group_idx(&self) -> i32 {
        self.group_idx
    }

    pub fn ignore_features(&self) -> &HashSet<usize> {
        &self.ignore_features
    }

    pub fn categorical_features(&self) -> &HashSet<usize> {
        &self.categorical_features
    }

    /// Resolve label, weight, group, ignore and categorical columns
    fn set_header(&mut self, filename: &str) -> Result<()> {
        let config = &self.config;
        let mut name2idx: HashMap<String, usize> = HashMap::new();
        if !filename.is_empty() && config.has_header {
            let reader = TextReader::new(filename, true)?;
            self.feature_names = Common::split_delimiters(reader.first_line(), "\t,")
                .iter()
                .map(|s| Common::trim(s).to_string())
                .collect();
        }

        if !config.label_column.is_empty() {
            if let Some(name) = config.label_column.strip_prefix(NAME_PREFIX) {
                let pos = self.feature_names.iter().position(|n| n == name).ok_or_else(|| {
                    LightGBMError::config(format!("Could not find label column {} in data file", name))
                })?;
                self.label_idx = pos as i32;
                log::info!("Using column {} as label", name);
            } else {
                self.label_idx = parse_column_index(&config.label_column, "label_column")?;
                log::info!("Using column number {} as label", self.label_idx);
            }
        }
        if !self.feature_names.is_empty() {
            let label = self.label_idx as usize;
            if label < self.feature_names.len() {
                self.feature_names.remove(label);
            }
            for (i, name) in self.feature_names.iter().enumerate() {
                name2idx.insert(name.clone(), i);
            }
        }

        let lookup = |name: &str, role: &str| -> Result<usize> {
            name2idx.get(name).copied().ok_or_else(|| {
                LightGBMError::config(format!("Could not find {} column {} in data file", role, name))
            })
        };

        if !config.ignore_column.is_empty() {
            if let Some(names) = config.ignore_column.strip_prefix(NAME_PREFIX) {
                for name in Common::split(names, ',') {
                    let idx = lookup(&name, "ignore")?;
                    self.ignore_features.insert(idx);
                }
            } else {
                for token in Common::split(&config.ignore_column, ',') {
                    let idx = parse_column_index(&token, "ignore_column")?;
                    if idx >= 0 {
                        self.ignore_features.insert(idx as usize);
                    }
                }
            }
        }

        if !config.weight_column.is_empty() {
            self.weight_idx = match config.weight_column.strip_prefix(NAME_PREFIX) {
                Some(name) => lookup(name, "weight")? as i32,
                None => parse_column_index(&config.weight_column, "weight_column")?,
            };
            log::info!("Using column number {} as weight", self.weight_idx);
            if self.weight_idx >= 0 {
                self.ignore_features.insert(self.weight_idx as usize);
            }
        }

        if !config.group_column.is_empty() {
            self.group_idx = match config.group_column.strip_prefix(NAME_PREFIX) {
                Some(name) => lookup(name, "group")? as i32,
                None => parse_column_index(&config.group_column, "group_column")?,
            };
            log::info!("Using column number {} as group/query id", self.group_idx);
            if self.group_idx >= 0 {
                self.ignore_features.insert(self.group_idx as usize);
            }
        }

        if !config.categorical_column.is_empty() {
            if let Some(names) = config.categorical_column.strip_prefix(NAME_PREFIX) {
                for name in Common::split(names, ',') {
                    let idx = lookup(&name, "categorical")?;
                    self.categorical_features.insert(idx);
                }
            } else {
                for token in Common::split(&config.categorical_column, ',') {
                    let idx = parse_column_index(&token, "categorical_column")?;
                    if idx >= 0 {
                        self.categorical_features.insert(idx as usize);
                    }
                }
            }
        }

        if config.is_parallel() && !config.is_pre_partition && self.group_idx >= 0 {
            return Err(LightGBMError::config(
                "Using a query id without pre-partitioning the data file is not supported for parallel training. Please use an additional query file or pre-partition the data",
            ));
        }
        Ok(())
    }

    /// Load a training dataset, partitioned by the network rank when needed
    pub fn load_from_file(&mut self, filename: &str, initscore_file: &str) -> Result<Dataset> {
        let start = Instant::now();
        let rank = self.network.rank();
        let num_machines = self.network.num_machines();
        let dataset = match Self::check_can_load_from_bin(filename)? {
            Some(bin_filename) => self.load_from_binary_file(filename, &bin_filename, rank, num_machines)?,
            None => {
                let parser = create_parser(filename, self.config.has_header, self.label_idx)?;
                let mut metadata = Metadata::new();
                metadata.init_from_file(filename, initscore_file)?;
                let mut used_data_indices: Vec<DataSize> = Vec::new();
                let mut dataset = if !self.config.two_round {
                    let (text_data, num_global_data) = self.load_text_data_to_memory(
                        filename,
                        &metadata,
                        rank,
                        num_machines,
                        &mut used_data_indices,
                    )?;
                    let num_data = text_data.len() as DataSize;
                    let sample_data = self.sample_text_data_from_memory(&text_data);
                    let mut dataset =
                        self.construct_bin_mappers_from_text_data(&sample_data, parser.as_ref(), num_data)?;
                    metadata.init(num_data, self.weight_idx, self.group_idx);
                    dataset.metadata = metadata;
                    self.extract_features_from_memory(text_data, parser.as_ref(), &mut dataset)?;
                    dataset.metadata.check_or_partition(num_global_data as DataSize, &used_data_indices)?;
                    dataset
                } else {
                    let (sample_data, num_global_data) = self.sample_text_data_from_file(
                        filename,
                        &metadata,
                        rank,
                        num_machines,
                        &mut used_data_indices,
                    )?;
                    let num_data = if used_data_indices.is_empty() {
                        num_global_data
                    } else {
                        used_data_indices.len()
                    } as DataSize;
                    let mut dataset =
                        self.construct_bin_mappers_from_text_data(&sample_data, parser.as_ref(), num_data)?;
                    metadata.init(num_data, self.weight_idx, self.group_idx);
                    dataset.metadata = metadata;
                    self.extract_features_from_file(filename, parser.as_ref(), &used_data_indices, &mut dataset)?;
                    dataset.metadata.check_or_partition(num_global_data as DataSize, &used_data_indices)?;
                    dataset
                };
                dataset.data_filename = filename.to_string();
                dataset.label_idx = self.label_idx;
                dataset.finish_load();
                dataset
            }
        };
        Self::check_dataset(&dataset)?;
        log::info!(
            "Finished loading data in {:.6} seconds",
            start.elapsed().as_secs_f64()
        );
        log::info!(
            "Number of data: {}, number of used features: {}",
            dataset.num_data(),
            dataset.num_features()
        );
        Ok(dataset)
    }

    /// Load validation data binned like `train_data`, never partitioned
    pub fn load_from_file_align_with_other_dataset(
        &mut self,
        filename: &str,
        initscore_file: &str,
        train_data: &Dataset,
    ) -> Result<Dataset> {
        if let Some(bin_filename) = Self::check_can_load_from_bin(filename)? {
            return self.load_from_binary_file(filename, &bin_filename, 0, 1);
        }
        let parser = create_parser(filename, self.config.has_header, self.label_idx)?;
        let mut metadata = Metadata::new();
        metadata.init_from_file(filename, initscore_file)?;
        let mut dataset = if !self.config.two_round {
            let text_data = TextReader::new(filename, self.config.has_header)?.read_all_lines()?;
            let num_data = text_data.len() as DataSize;
            let mut dataset = train_data.create_valid(num_data);
            metadata.init(num_data, self.weight_idx, self.group_idx);
            dataset.metadata = metadata;
            self.extract_features_from_memory(text_data, parser.as_ref(), &mut dataset)?;
            dataset
        } else {
            let num_data = TextReader::new(filename, self.config.has_header)?.count_line()? as DataSize;
            let mut dataset = train_data.create_valid(num_data);
            metadata.init(num_data, self.weight_idx, self.group_idx);
            dataset.metadata = metadata;
            self.extract_features_from_file(filename, parser.as_ref(), &[], &mut dataset)?;
            dataset
        };
        let num_data = dataset.num_data;
        dataset.metadata.check_or_partition(num_data, &[])?;
        dataset.data_filename = filename.to_string();
        dataset.finish_load();
        Ok(dataset)
    }

    /// Build a dataset from rows of raw feature values
    pub fn construct_from_matrix(&mut self, values: ArrayView2<'_, f64>, labels: &[Label]) -> Result<Dataset> {
        let (num_rows, num_cols) = values.dim();
        if labels.len() != num_rows {
            return Err(LightGBMError::dimension_mismatch(
                format!("{} labels", num_rows),
                labels.len().to_string(),
            ));
        }
        let sample_cnt = self.config.bin_construct_sample_cnt.min(num_rows);
        let sample_indices = self.random.sample(num_rows, sample_cnt);
        let mut sample_values: Vec<Vec<f64>> = vec![Vec::new(); num_cols];
        let mut sample_rows: Vec<Vec<usize>> = vec![Vec::new(); num_cols];
        for (s, &row) in sample_indices.iter().enumerate() {
            for (col, &v) in values.row(row).iter().enumerate() {
                if v.abs() > K_EPSILON || v.is_nan() {
                    sample_values[col].push(v);
                    sample_rows[col].push(s);
                }
            }
        }
        let num_data = num_rows as DataSize;
        let bin_mappers = self.find_bin_mappers(&sample_values, sample_indices.len(), num_data)?;
        let mut dataset =
            Dataset::construct(bin_mappers, &sample_rows, sample_indices.len(), num_data, &self.config)?;
        if !self.feature_names.is_empty() {
            dataset.set_feature_names(self.feature_names.clone())?;
        }
        dataset.metadata.init(num_data, -1, -1);
        for (i, &l) in labels.iter().enumerate() {
            dataset.metadata.set_label_at(i as DataSize, f64::from(l));
        }

        let mut scratch: Vec<Vec<GroupBinEntry>> = Vec::new();
        {
            let ds = &dataset;
            Threading::for_loop_with_scratch(
                0,
                num_rows,
                MIN_ROWS_PER_BLOCK,
                &mut scratch,
                Vec::new,
                |buf, _, start, end| -> Result<()> {
                    for row in start..end {
                        for (col, &v) in values.row(row).iter().enumerate() {
                            if let Some(inner) = ds.inner_feature_index(col) {
                                if let Some((g, gb)) = ds.group_bin_for_value(inner, v) {
                                    buf.push((g, row as DataSize, gb));
                                }
                            }
                        }
                    }
                    Ok(())
                },
            )?;
        }
        for buf in &scratch {
            dataset.push_group_bins(buf);
        }
        dataset.metadata.check_or_partition(num_data, &[])?;
        dataset.finish_load();
        Self::check_dataset(&dataset)?;
        Ok(dataset)
    }

    /// Path of a binary dataset for `filename`: `<filename>.bin` first, then
    /// `filename` itself. `None` when neither starts with the binary token.
    pub fn check_can_load_from_bin(filename: &str) -> Result<Option<String>> {
        let candidates = [format!("{}.bin", filename), filename.to_string()];
        for candidate in candidates {
            if !Path::new(&candidate).is_file() {
                continue;
            }
            let mut file = File::open(&candidate)?;
            let mut buf = vec![0u8; BINARY_FILE_TOKEN.len()];
            let mut read = 0usize;
            while read < buf.len() {
                let n = file.read(&mut buf[read..])?;
                if n == 0 {
                    break;
                }
                read += n;
            }
            if read == buf.len() && buf == BINARY_FILE_TOKEN.as_bytes() {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// Read a binary dataset, keeping this rank's rows unless pre-partitioned
    pub fn load_from_binary_file(
        &mut self,
        data_filename: &str,
        bin_filename: &str,
        rank: usize,
        num_machines: usize,
    ) -> Result<Dataset> {
        let file = File::open(bin_filename).map_err(|e| {
            LightGBMError::data_loading(format!("Could not read binary data from {}: {}", bin_filename, e))
        })?;
        let mut reader = BufReader::new(file);

        let mut token = vec![0u8; BINARY_FILE_TOKEN.len()];
        reader
            .read_exact(&mut token)
            .map_err(|_| LightGBMError::format("Input file is not LightGBM binary file"))?;
        if token != BINARY_FILE_TOKEN.as_bytes() {
            return Err(LightGBMError::format("Input file is not LightGBM binary file"));
        }

        let header = read_sized_block(&mut reader, "Binary file header")?;
        let mut dataset = Dataset::from_header(&header)?;
        let meta = read_sized_block(&mut reader, "meta data")?;
        let mut metadata = Metadata::load_from_memory(&meta)?;

        let num_global_data = dataset.num_data;
        let mut used_data_indices: Vec<DataSize> = Vec::new();
        let partitioned = !self.config.is_pre_partition && num_machines > 1;
        if partitioned {
            {
                let mut filter = self.partition_filter(&metadata, rank, num_machines);
                for i in 0..num_global_data as usize {
                    if filter(i)? {
                        used_data_indices.push(i as DataSize);
                    }
                }
            }
            dataset.num_data = used_data_indices.len() as DataSize;
            metadata.partition_label(&used_data_indices);
        }

        let used = if partitioned {
            Some(&used_data_indices[..])
        } else {
            None
        };
        for g in 0..dataset.group_feature_start.len() {
            let blob = read_sized_block(&mut reader, "Binary file feature group")?;
            let group = FeatureGroup::read_from(&blob, num_global_data, used)?;
            dataset.check_loaded_group(g, &group)?;
            dataset.feature_groups.push(group);
        }
        metadata.check_or_partition(num_global_data, &used_data_indices)?;
        dataset.metadata = metadata;
        dataset.data_filename = data_filename.to_string();
        Ok(dataset)
    }

    /// Row filter assigning rows, or whole queries, to ranks.
    ///
    /// Every worker draws the same sequence, so each row is kept by exactly
    /// one rank.
    fn partition_filter<'a>(
        &'a mut self,
        metadata: &'a Metadata,
        rank: usize,
        num_machines: usize,
    ) -> impl FnMut(usize) -> Result<bool> + 'a {
        let random = &mut self.random;
        let boundaries = metadata.query_boundaries();
        let num_queries = metadata.num_queries();
        let mut next_qid = 0usize;
        let mut query_end: DataSize = 0;
        let mut is_query_used = false;
        move |line_idx: usize| -> Result<bool> {
            match boundaries {
                None => Ok(random.next_short(0, num_machines as i32) == rank as i32),
                Some(qb) => {
                    while line_idx as DataSize >= query_end {
                        if next_qid >= num_queries {
                            return Err(LightGBMError::data_loading(
                                "Current query exceeds the range of the query file, please ensure the query file is correct",
                            ));
                        }
                        is_query_used = random.next_short(0, num_machines as i32) == rank as i32;
                        query_end = qb[next_qid + 1];
                        next_qid += 1;
                    }
                    Ok(is_query_used)
                }
            }
        }
    }

    /// Read the whole text file, keeping only this rank's rows when needed.
    /// Returns the kept lines and the global line count.
    fn load_text_data_to_memory(
        &mut self,
        filename: &str,
        metadata: &Metadata,
        rank: usize,
        num_machines: usize,
        used_data_indices: &mut Vec<DataSize>,
    ) -> Result<(Vec<String>, usize)> {
        let reader = TextReader::new(filename, self.config.has_header)?;
        used_data_indices.clear();
        if num_machines == 1 || self.config.is_pre_partition {
            let lines = reader.read_all_lines()?;
            let total = lines.len();
            Ok((lines, total))
        } else {
            let filter = self.partition_filter(metadata, rank, num_machines);
            reader.read_and_filter_lines(filter, used_data_indices)
        }
    }

    fn sample_text_data_from_memory(&mut self, data: &[String]) -> Vec<String> {
        let sample_cnt = self.config.bin_construct_sample_cnt.min(data.len());
        self.random
            .sample(data.len(), sample_cnt)
            .into_iter()
            .map(|i| data[i].clone())
            .collect()
    }

    /// Reservoir-sample the file, partitioning rows by rank when needed.
    /// Returns the sample and the global line count.
    fn sample_text_data_from_file(
        &mut self,
        filename: &str,
        metadata: &Metadata,
        rank: usize,
        num_machines: usize,
        used_data_indices: &mut Vec<DataSize>,
    ) -> Result<(Vec<String>, usize)> {
        let reader = TextReader::new(filename, self.config.has_header)?;
        let sample_cnt = self.config.bin_construct_sample_cnt;
        used_data_indices.clear();
        if num_machines == 1 || self.config.is_pre_partition {
            reader.sample_from_file(&mut self.random, sample_cnt)
        } else {
            // partition draws and sample draws use separate streams
            let mut sample_random = self.random.clone();
            let filter = self.partition_filter(metadata, rank, num_machines);
            reader.sample_and_filter_from_file(filter, used_data_indices, &mut sample_random, sample_cnt)
        }
    }

    /// Find bin mappers for every raw column, split across the workers when
    /// training is distributed
    fn find_bin_mappers(
        &self,
        sample_values: &[Vec<f64>],
        num_sample: usize,
        num_data: DataSize,
    ) -> Result<Vec<Option<BinMapper>>> {
        let filter_cnt = if num_data > 0 {
            (f64::from(self.config.min_data_in_leaf) * num_sample as f64 / f64::from(num_data)) as usize
        } else {
            0
        };
        let params = BinParams {
            max_bin: self.config.max_bin,
            min_data_in_bin: self.config.min_data_in_bin,
            filter_cnt,
            use_missing: self.config.use_missing,
            zero_as_missing: self.config.zero_as_missing,
        };
        let num_total = sample_values.len().max(self.feature_names.len());
        let num_machines = self.network.num_machines();
        if num_machines == 1 {
            return Ok(find_bins_for_features(
                sample_values,
                0..num_total,
                num_sample,
                params,
                &self.categorical_features,
                &self.ignore_features,
            ));
        }

        let rank = self.network.rank();
        let total = self.network.global_sync_up_by_min_i32(num_total as i32)?.max(0) as usize;
        let step = ((total + num_machines - 1) / num_machines).max(1);
        let start: Vec<usize> = (0..num_machines).map(|i| (i * step).min(total)).collect();
        let len: Vec<usize> = (0..num_machines)
            .map(|i| step.min(total - start[i]))
            .collect();

        let local: Vec<BinMapper> = find_bins_for_features(
            sample_values,
            start[rank]..start[rank] + len[rank],
            num_sample,
            params,
            &self.categorical_features,
            &self.ignore_features,
        )
        .into_iter()
        .map(Option::unwrap_or_default)
        .collect();
        let local_max = local.iter().map(BinMapper::num_bin).max().unwrap_or(1);
        let max_num_bin = self.network.global_sync_up_by_max_i32(local_max)?.max(1) as usize;
        let type_size = BinMapper::size_for_specific_bin(max_num_bin);

        let mut input = vec![0u8; type_size * len[rank]];
        for (i, mapper) in local.iter().enumerate() {
            mapper.copy_to(&mut input[i * type_size..(i + 1) * type_size])?;
        }
        let block_start: Vec<usize> = start.iter().map(|s| s * type_size).collect();
        let block_len: Vec<usize> = len.iter().map(|l| l * type_size).collect();
        let mut output = vec![0u8; total * type_size];
        self.network.allgather(&input, &block_start, &block_len, &mut output)?;

        (0..total)
            .map(|i| {
                if self.ignore_features.contains(&i) {
                    Ok(None)
                } else {
                    BinMapper::copy_from(&output[i * type_size..(i + 1) * type_size]).map(Some)
                }
            })
            .collect()
    }

    /// Parse the sample, find bin mappers and build the empty dataset layout
    fn construct_bin_mappers_from_text_data(
        &self,
        sample_data: &[String],
        parser: &dyn Parser,
        num_data: DataSize,
    ) -> Result<Dataset> {
        let mut sample_values: Vec<Vec<f64>> = Vec::new();
        let mut sample_rows: Vec<Vec<usize>> = Vec::new();
        let mut features: Vec<(i32, f64)> = Vec::new();
        let mut label = 0.0;
        for (i, line) in sample_data.iter().enumerate() {
            parser.parse_one_line(line, &mut features, &mut label)?;
            for &(idx, v) in &features {
                if idx < 0 {
                    continue;
                }
                let idx = idx as usize;
                if idx >= sample_values.len() {
                    sample_values.resize_with(idx + 1, Vec::new);
                    sample_rows.resize_with(idx + 1, Vec::new);
                }
                if v.abs() > K_EPSILON || v.is_nan() {
                    sample_values[idx].push(v);
                    sample_rows[idx].push(i);
                }
            }
        }

        let bin_mappers = self.find_bin_mappers(&sample_values, sample_data.len(), num_data)?;
        let num_total_features = bin_mappers.len();
        sample_rows.resize_with(num_total_features, Vec::new);
        let mut dataset =
            Dataset::construct(bin_mappers, &sample_rows, sample_data.len(), num_data, &self.config)?;
        if !self.feature_names.is_empty() {
            if self.feature_names.len() != num_total_features {
                return Err(LightGBMError::dataset(format!(
                    "Size of feature name error, should be {}, got {}",
                    num_total_features,
                    self.feature_names.len()
                )));
            }
            dataset.set_feature_names(self.feature_names.clone())?;
        }
        Ok(dataset)
    }

    /// Parse `lines` (rows `start_row..`) into worker-local scratch
    fn process_lines(
        &self,
        lines: &[String],
        start_row: usize,
        parser: &dyn Parser,
        dataset: &Dataset,
        scratch: &mut Vec<RowScratch>,
    ) -> Result<usize> {
        let weight_idx = self.weight_idx;
        let group_idx = self.group_idx;
        let num_class = self.num_class;
        let predict_fun = self.predict_fun.as_ref();
        let num_total_features = dataset.num_total_features();
        Threading::for_loop_with_scratch(
            0,
            lines.len(),
            MIN_ROWS_PER_BLOCK,
            scratch,
            RowScratch::default,
            |buf, _, start, end| -> Result<()> {
                let mut features: Vec<(i32, f64)> = Vec::new();
                let mut label = 0.0;
                let mut scores = vec![0.0; num_class];
                for (i, line) in lines.iter().enumerate().take(end).skip(start) {
                    let row = (start_row + i) as DataSize;
                    parser.parse_one_line(line, &mut features, &mut label)?;
                    buf.labels.push((row, label));
                    if let Some(f) = predict_fun {
                        scores.iter_mut().for_each(|s| *s = 0.0);
                        f(&features, &mut scores);
                        buf.init_rows.push(row);
                        buf.init_scores.extend_from_slice(&scores);
                    }
                    for &(idx, v) in &features {
                        if idx < 0 || idx as usize >= num_total_features {
                            continue;
                        }
                        match dataset.inner_feature_index(idx as usize) {
                            Some(inner) => {
                                if let Some((g, gb)) = dataset.group_bin_for_value(inner, v) {
                                    buf.bins.push((g, row, gb));
                                }
                            }
                            None => {
                                if idx == weight_idx {
                                    buf.weights.push((row, v));
                                } else if idx == group_idx {
                                    buf.queries.push((row, v));
                                }
                            }
                        }
                    }
                }
                Ok(())
            },
        )
    }

    /// Move scratch of the first `n_block` blocks into the dataset, in block order
    fn merge_scratch(
        dataset: &mut Dataset,
        scratch: &mut [RowScratch],
        n_block: usize,
        num_class: usize,
        init_score: &mut [f64],
    ) {
        let num_data = dataset.num_data() as usize;
        for buf in scratch.iter_mut().take(n_block) {
            dataset.push_group_bins(&buf.bins);
            let metadata = dataset.metadata_mut();
            for &(row, label) in &buf.labels {
                metadata.set_label_at(row, label);
            }
            for &(row, w) in &buf.weights {
                metadata.set_weight_at(row, w);
            }
            for &(row, q) in &buf.queries {
                metadata.set_query_at(row, q);
            }
            for (j, &row) in buf.init_rows.iter().enumerate() {
                for k in 0..num_class {
                    init_score[k * num_data + row as usize] = buf.init_scores[j * num_class + k];
                }
            }
            buf.clear();
        }
    }

    fn extract_features_from_memory(
        &self,
        mut text_data: Vec<String>,
        parser: &dyn Parser,
        dataset: &mut Dataset,
    ) -> Result<()> {
        self.extract_features_in_chunks(&mut text_data, MEMORY_CHUNK_ROWS, parser, dataset)
    }

    /// Parse `text_data` `chunk_rows` lines at a time, emptying each line
    /// once its chunk is merged into `dataset`.
    fn extract_features_in_chunks(
        &self,
        text_data: &mut [String],
        chunk_rows: usize,
        parser: &dyn Parser,
        dataset: &mut Dataset,
    ) -> Result<()> {
        let num_data = dataset.num_data() as usize;
        let mut init_score = self.init_score_buffer(num_data);
        let mut scratch: Vec<RowScratch> = Vec::new();
        for (c, chunk) in text_data.chunks_mut(chunk_rows.max(1)).enumerate() {
            let n_block = self.process_lines(chunk, c * chunk_rows.max(1), parser, dataset, &mut scratch)?;
            Self::merge_scratch(dataset, &mut scratch, n_block, self.num_class, &mut init_score);
            for line in chunk.iter_mut() {
                drop(std::mem::take(line));
            }
        }
        if self.predict_fun.is_some() {
            dataset.metadata_mut().set_init_score(init_score)?;
        }
        Ok(())
    }

    fn extract_features_from_file(
        &self,
        filename: &str,
        parser: &dyn Parser,
        used_data_indices: &[DataSize],
        dataset: &mut Dataset,
    ) -> Result<()> {
        let num_data = dataset.num_data() as usize;
        let mut init_score = self.init_score_buffer(num_data);
        let mut scratch: Vec<RowScratch> = Vec::new();
        let reader = TextReader::new(filename, self.config.has_header)?;
        let mut process = |start: usize, lines: &[String]| -> Result<()> {
            let n_block = self.process_lines(lines, start, parser, dataset, &mut scratch)?;
            Self::merge_scratch(dataset, &mut scratch, n_block, self.num_class, &mut init_score);
            Ok(())
        };
        if used_data_indices.is_empty() {
            reader.read_all_and_process_parallel(&mut process)?;
        } else {
            reader.read_part_and_process_parallel(used_data_indices, &mut process)?;
        }
        if self.predict_fun.is_some() {
            dataset.metadata_mut().set_init_score(init_score)?;
        }
        Ok(())
    }

    fn init_score_buffer(&self, num_data: usize) -> Vec<f64> {
        if self.predict_fun.is_some() {
            vec![0.0; num_data * self.num_class]
        } else {
            Vec::new()
        }
    }

    /// Reject datasets training cannot use
    pub fn check_dataset(dataset: &Dataset) -> Result<()> {
        if dataset.num_data() <= 0 {
            return Err(LightGBMError::dataset(format!(
                "Data file {} is empty",
                dataset.data_filename()
            )));
        }
        if dataset.feature_groups().is_empty() {
            return Err(LightGBMError::dataset(format!(
                "No usable features in data file {}",
                dataset.data_filename()
            )));
        }
        if dataset.feature_names().len() != dataset.num_total_features() {
            return Err(LightGBMError::dataset(format!(
                "Size of feature name error, should be {}, got {}",
                dataset.num_total_features(),
                dataset.feature_names().len()
            )));
        }
        let mut last_group = -1i32;
        let mut last_sub_feature = -1i32;
        for i in 0..dataset.num_features() {
            let group = dataset.feature2group[i];
            let sub_feature = dataset.feature2subfeature[i];
            let ordered = group > last_group || (group == last_group && sub_feature > last_sub_feature);
            if !ordered {
                return Err(LightGBMError::dataset("feature in dataset should order by group"));
            }
            last_group = group;
            last_sub_feature = sub_feature;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::network::{LocalNetwork, ThreadNetwork};
    use ndarray::Array2;
    use std::fs;

    fn local() -> Arc<dyn Network> {
        Arc::new(LocalNetwork)
    }

    fn write_csv(rows: usize) -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.csv");
        let mut content = String::from("y,a,b,c\n");
        for i in 0..rows {
            let a = i as f64;
            let b = if i % 3 == 0 { 0.0 } else { (i % 7) as f64 };
            content.push_str(&format!("{},{},{},{}\n", i % 2, a, b, i % 4));
        }
        fs::write(&path, content).unwrap();
        (dir, path.to_str().unwrap().to_string())
    }

    fn config() -> Config {
        Config {
            has_header: true,
            min_data_in_leaf: 1,
            min_data_in_bin: 1,
            ..Config::default()
        }
    }

    #[test]
    fn test_named_columns() {
        let (_dir, path) = write_csv(10);
        let named = Config {
            label_column: "name:b".into(),
            weight_column: "name:c".into(),
            ..config()
        };
        let loader = DatasetLoader::new(&named, None, 1, &path, local()).unwrap();
        assert_eq!(loader.label_idx(), 2);
        // c is column 2 once the label is removed
        assert_eq!(loader.weight_idx(), 2);
        assert!(loader.ignore_features().contains(&2));

        let missing = Config {
            label_column: "name:zzz".into(),
            ..config()
        };
        assert!(DatasetLoader::new(&missing, None, 1, &path, local()).is_err());
    }

    #[test]
    fn test_load_text_in_memory_and_two_round_agree() {
        let (_dir, path) = write_csv(200);
        let mut loader = DatasetLoader::new(&config(), None, 1, &path, local()).unwrap();
        let ds = loader.load_from_file(&path, "").unwrap();
        assert_eq!(ds.num_data(), 200);
        assert_eq!(ds.num_total_features(), 3);
        assert_eq!(ds.feature_names(), &["a".to_string(), "b".to_string(), "c".to_string()]);
        assert_eq!(ds.metadata().label()[3], 1.0);

        let two_round = Config {
            two_round: true,
            ..config()
        };
        let mut loader = DatasetLoader::new(&two_round, None, 1, &path, local()).unwrap();
        let ds2 = loader.load_from_file(&path, "").unwrap();
        assert_eq!(ds2.num_data(), 200);
        assert_eq!(ds2.metadata().label(), ds.metadata().label());
        for inner in 0..ds.num_features() {
            for row in [0, 17, 199] {
                assert_eq!(
                    ds.feature_bin_mapper(inner).bin_to_value(ds.feature_bin(inner, row)),
                    ds2.feature_bin_mapper(inner).bin_to_value(ds2.feature_bin(inner, row))
                );
            }
        }
    }

    #[test]
    fn test_chunked_extraction_frees_lines() {
        let (_dir, path) = write_csv(50);
        let mut loader = DatasetLoader::new(&config(), None, 1, &path, local()).unwrap();
        let full = loader.load_from_file(&path, "").unwrap();

        let parser = create_parser(&path, true, loader.label_idx()).unwrap();
        let mut lines = TextReader::new(&path, true).unwrap().read_all_lines().unwrap();
        let mut ds = loader
            .construct_bin_mappers_from_text_data(&lines, parser.as_ref(), 50)
            .unwrap();
        let mut metadata = Metadata::new();
        metadata.init(50, loader.weight_idx, loader.group_idx);
        ds.metadata = metadata;
        loader
            .extract_features_in_chunks(&mut lines, 7, parser.as_ref(), &mut ds)
            .unwrap();
        ds.finish_load();

        assert!(lines.iter().all(String::is_empty));
        assert_eq!(ds.metadata().label(), full.metadata().label());
        for inner in 0..full.num_features() {
            for row in 0..50 {
                assert_eq!(
                    ds.feature_bin_mapper(inner).bin_to_value(ds.feature_bin(inner, row)),
                    full.feature_bin_mapper(inner).bin_to_value(full.feature_bin(inner, row))
                );
            }
        }
    }

    #[test]
    fn test_warm_start_scores() {
        let (_dir, path) = write_csv(20);
        let predict: PredictFunction = Arc::new(|features: &[(i32, f64)], out: &mut [f64]| {
            out[0] = features.iter().map(|p| p.1).sum();
        });
        let mut loader = DatasetLoader::new(&config(), Some(predict), 1, &path, local()).unwrap();
        let ds = loader.load_from_file(&path, "").unwrap();
        let init = ds.metadata().init_score().unwrap();
        // row 4: a=4, b=4, c=0
        assert_eq!(init[4], 8.0);
    }

    #[test]
    fn test_construct_from_matrix() {
        let values = Array2::from_shape_fn((50, 2), |(i, j)| (i * (j + 1)) as f64);
        let labels: Vec<Label> = (0..50).map(|i| i as Label).collect();
        let mut loader = DatasetLoader::without_header(&config(), local()).unwrap();
        let ds = loader.construct_from_matrix(values.view(), &labels).unwrap();
        assert_eq!(ds.num_data(), 50);
        assert_eq!(ds.num_features(), 2);
        assert!(loader.construct_from_matrix(values.view(), &labels[..3]).is_err());
    }

    #[test]
    fn test_distributed_bins_match_local() {
        let (_dir, path) = write_csv(120);
        let cfg = Config {
            num_machines: 2,
            is_pre_partition: true,
            ..config()
        };
        let mut single = DatasetLoader::new(&config(), None, 1, &path, local()).unwrap();
        let expected = single.load_from_file(&path, "").unwrap();

        let handles: Vec<_> = ThreadNetwork::group(2)
            .into_iter()
            .map(|net| {
                let cfg = cfg.clone();
                let path = path.clone();
                std::thread::spawn(move || {
                    let mut loader = DatasetLoader::new(&cfg, None, 1, &path, Arc::new(net)).unwrap();
                    loader.load_from_file(&path, "").unwrap()
                })
            })
            .collect();
        for handle in handles {
            let ds = handle.join().unwrap();
            assert_eq!(ds.num_features(), expected.num_features());
            for inner in 0..ds.num_features() {
                assert_eq!(ds.feature_bin_mapper(inner), expected.feature_bin_mapper(inner));
            }
        }
    }

    #[test]
    fn test_rows_are_split_between_ranks() {
        let (_dir, path) = write_csv(100);
        let cfg = Config {
            num_machines: 2,
            ..config()
        };
        let handles: Vec<_> = ThreadNetwork::group(2)
            .into_iter()
            .map(|net| {
                let cfg = cfg.clone();
                let path = path.clone();
                std::thread::spawn(move || {
                    let mut loader = DatasetLoader::new(&cfg, None, 1, &path, Arc::new(net)).unwrap();
                    loader.load_from_file(&path, "").unwrap().num_data()
                })
            })
            .collect();
        let total: DataSize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 100);
    }
}
