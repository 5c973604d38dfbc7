//! Binned, grouped training data.
//!
//! A [`Dataset`] owns the feature groups built by the loader together with
//! the maps between raw columns, used features and groups. Inner feature
//! indices are assigned group by group, so features are always ordered by
//! `(group, sub-feature)`.

use crate::config::Config;
use crate::core::error::{LightGBMError, Result};
use crate::core::feature_group::FeatureGroup;
use crate::core::meta::BINARY_FILE_TOKEN;
use crate::core::types::DataSize;
use crate::core::utils::{BinaryReader, BinaryWriter};
use crate::dataset::binning::BinMapper;
use crate::dataset::metadata::Metadata;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::ops::Range;
use std::path::Path;

/// Largest group-bin count a bundle of sparse features may reach
const MAX_BUNDLE_BIN: usize = 256;

/// Main dataset structure for training and validation
#[derive(Debug)]
pub struct Dataset {
    pub(crate) data_filename: String,
    pub(crate) num_data: DataSize,
    pub(crate) num_total_features: usize,
    pub(crate) label_idx: i32,
    pub(crate) feature_groups: Vec<FeatureGroup>,
    /// Raw column to inner feature index, -1 for unused columns
    pub(crate) used_feature_map: Vec<i32>,
    /// Inner feature index to raw column
    pub(crate) real_feature_idx: Vec<i32>,
    pub(crate) feature2group: Vec<i32>,
    pub(crate) feature2subfeature: Vec<i32>,
    /// Prefix sums of group bin counts, `num_groups + 1` entries
    pub(crate) group_bin_boundaries: Vec<u64>,
    pub(crate) group_feature_start: Vec<i32>,
    pub(crate) group_feature_cnt: Vec<i32>,
    pub(crate) feature_names: Vec<String>,
    pub(crate) metadata: Metadata,
}

/// Group bins pushed for one row: `(group, row, group_bin)`
pub type GroupBinEntry = (u32, DataSize, u32);

fn group_bin_count(mapper: &BinMapper) -> usize {
    let n = mapper.num_bin() as usize;
    if mapper.default_bin() == 0 {
        n - 1
    } else {
        n
    }
}

/// Greedily bundle sparse features that never co-occur on the sampled rows.
///
/// Features are given as raw column indices; each group lists its members
/// in raw column order.
fn find_groups(
    features: &[usize],
    bin_mappers: &[Option<BinMapper>],
    sample_non_zero_rows: &[Vec<usize>],
    num_sample_rows: usize,
    enable_bundle: bool,
    sparse_threshold: f64,
) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut marks: Vec<Vec<bool>> = Vec::new();
    let mut group_bins: Vec<usize> = Vec::new();
    let mut bundlable: Vec<bool> = Vec::new();

    for &f in features {
        let Some(mapper) = bin_mappers[f].as_ref() else {
            continue;
        };
        let bins = group_bin_count(mapper);
        let rows = sample_non_zero_rows.get(f).map_or(&[][..], Vec::as_slice);
        let is_sparse = enable_bundle && mapper.sparse_rate() >= sparse_threshold;
        if is_sparse {
            let target = (0..groups.len()).find(|&g| {
                bundlable[g]
                    && group_bins[g] + bins <= MAX_BUNDLE_BIN
                    && rows.iter().all(|&r| !marks[g][r])
            });
            if let Some(g) = target {
                groups[g].push(f);
                group_bins[g] += bins;
                for &r in rows {
                    marks[g][r] = true;
                }
                continue;
            }
        }
        let mut mark = vec![false; if is_sparse { num_sample_rows } else { 0 }];
        if is_sparse {
            for &r in rows {
                if r < mark.len() {
                    mark[r] = true;
                }
            }
        }
        groups.push(vec![f]);
        marks.push(mark);
        group_bins.push(1 + bins);
        bundlable.push(is_sparse);
    }
    groups
}

impl Dataset {
    /// Build the empty binned layout from per-column mappers.
    ///
    /// `bin_mappers[f]` is `None` for ignored columns; trivial mappers are
    /// dropped. `sample_non_zero_rows[f]` lists the sample rows where column
    /// `f` is non-zero and drives feature bundling.
    pub fn construct(
        bin_mappers: Vec<Option<BinMapper>>,
        sample_non_zero_rows: &[Vec<usize>],
        num_sample_rows: usize,
        num_data: DataSize,
        config: &Config,
    ) -> Result<Self> {
        let num_total_features = bin_mappers.len();
        let used: Vec<usize> = (0..num_total_features)
            .filter(|&f| bin_mappers[f].as_ref().map_or(false, |m| !m.is_trivial()))
            .collect();
        if used.is_empty() {
            log::warn!("There are no meaningful features, as all feature values are constant.");
        }
        let groups = find_groups(
            &used,
            &bin_mappers,
            sample_non_zero_rows,
            num_sample_rows,
            config.enable_bundle,
            config.sparse_threshold,
        );

        let mut dataset = Dataset {
            data_filename: String::new(),
            num_data,
            num_total_features,
            label_idx: 0,
            feature_groups: Vec::with_capacity(groups.len()),
            used_feature_map: vec![-1; num_total_features],
            real_feature_idx: Vec::with_capacity(used.len()),
            feature2group: Vec::with_capacity(used.len()),
            feature2subfeature: Vec::with_capacity(used.len()),
            group_bin_boundaries: vec![0],
            group_feature_start: Vec::with_capacity(groups.len()),
            group_feature_cnt: Vec::with_capacity(groups.len()),
            feature_names: (0..num_total_features).map(|i| format!("Column_{}", i)).collect(),
            metadata: Metadata::new(),
        };

        let mut mappers = bin_mappers;
        for (g, members) in groups.iter().enumerate() {
            dataset.group_feature_start.push(dataset.real_feature_idx.len() as i32);
            dataset.group_feature_cnt.push(members.len() as i32);
            let mut group_mappers = Vec::with_capacity(members.len());
            for (sub, &f) in members.iter().enumerate() {
                dataset.used_feature_map[f] = dataset.real_feature_idx.len() as i32;
                dataset.real_feature_idx.push(f as i32);
                dataset.feature2group.push(g as i32);
                dataset.feature2subfeature.push(sub as i32);
                let mapper = mappers[f].take().ok_or_else(|| {
                    LightGBMError::internal(format!("feature {} bundled twice", f))
                })?;
                group_mappers.push(mapper);
            }
            let group = FeatureGroup::new(group_mappers, num_data, config.sparse_threshold);
            let last = dataset.group_bin_boundaries.last().copied().unwrap_or(0);
            dataset
                .group_bin_boundaries
                .push(last + group.num_total_bin() as u64);
            dataset.feature_groups.push(group);
        }
        log::debug!(
            "Constructed {} feature groups from {} used features",
            dataset.feature_groups.len(),
            dataset.real_feature_idx.len()
        );
        Ok(dataset)
    }

    /// Empty dataset for `num_data` rows binned exactly like `self`
    pub fn create_valid(&self, num_data: DataSize) -> Dataset {
        Dataset {
            data_filename: String::new(),
            num_data,
            num_total_features: self.num_total_features,
            label_idx: self.label_idx,
            feature_groups: self
                .feature_groups
                .iter()
                .map(|g| g.empty_like(num_data))
                .collect(),
            used_feature_map: self.used_feature_map.clone(),
            real_feature_idx: self.real_feature_idx.clone(),
            feature2group: self.feature2group.clone(),
            feature2subfeature: self.feature2subfeature.clone(),
            group_bin_boundaries: self.group_bin_boundaries.clone(),
            group_feature_start: self.group_feature_start.clone(),
            group_feature_cnt: self.group_feature_cnt.clone(),
            feature_names: self.feature_names.clone(),
            metadata: Metadata::new(),
        }
    }

    /// Whether `other` is binned exactly like `self`
    pub fn check_align(&self, other: &Dataset) -> bool {
        self.num_features() == other.num_features()
            && self.num_total_features == other.num_total_features
            && self.label_idx == other.label_idx
            && self.used_feature_map == other.used_feature_map
            && (0..self.num_features()).all(|i| self.feature_bin_mapper(i) == other.feature_bin_mapper(i))
    }

    pub fn num_data(&self) -> DataSize {
        self.num_data
    }

    /// Number of used (non-trivial) features
    pub fn num_features(&self) -> usize {
        self.real_feature_idx.len()
    }

    /// Number of raw feature columns, label excluded
    pub fn num_total_features(&self) -> usize {
        self.num_total_features
    }

    pub fn label_idx(&self) -> i32 {
        self.label_idx
    }

    pub fn data_filename(&self) -> &str {
        &self.data_filename
    }

    pub fn num_groups(&self) -> usize {
        self.feature_groups.len()
    }

    pub fn feature_groups(&self) -> &[FeatureGroup] {
        &self.feature_groups
    }

    pub fn feature_group(&self, group: usize) -> &FeatureGroup {
        &self.feature_groups[group]
    }

    /// Inner features stored in `group`
    pub fn group_feature_range(&self, group: usize) -> Range<usize> {
        let start = self.group_feature_start[group] as usize;
        start..start + self.group_feature_cnt[group] as usize
    }

    pub fn group_bin_boundaries(&self) -> &[u64] {
        &self.group_bin_boundaries
    }

    /// Total group bins over all groups
    pub fn num_total_bin(&self) -> usize {
        self.group_bin_boundaries.last().copied().unwrap_or(0) as usize
    }

    #[inline]
    pub fn feature_to_group(&self, inner: usize) -> usize {
        self.feature2group[inner] as usize
    }

    #[inline]
    pub fn feature_to_sub_feature(&self, inner: usize) -> usize {
        self.feature2subfeature[inner] as usize
    }

    /// Raw column of an inner feature
    #[inline]
    pub fn real_feature_index(&self, inner: usize) -> usize {
        self.real_feature_idx[inner] as usize
    }

    /// Inner feature of a raw column, `None` when the column is unused
    #[inline]
    pub fn inner_feature_index(&self, raw: usize) -> Option<usize> {
        match self.used_feature_map.get(raw) {
            Some(&i) if i >= 0 => Some(i as usize),
            _ => None,
        }
    }

    pub fn used_feature_map(&self) -> &[i32] {
        &self.used_feature_map
    }

    pub fn feature_bin_mapper(&self, inner: usize) -> &BinMapper {
        self.feature_groups[self.feature_to_group(inner)].bin_mapper(self.feature_to_sub_feature(inner))
    }

    /// Bin of inner feature `inner` at `row`
    #[inline]
    pub fn feature_bin(&self, inner: usize, row: DataSize) -> u32 {
        self.feature_groups[self.feature_to_group(inner)]
            .feature_bin(self.feature_to_sub_feature(inner), row)
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Replace the raw column names. Spaces are not allowed in names.
    pub fn set_feature_names(&mut self, names: Vec<String>) -> Result<()> {
        if names.len() != self.num_total_features {
            return Err(LightGBMError::dimension_mismatch(
                format!("{} feature names", self.num_total_features),
                names.len().to_string(),
            ));
        }
        self.feature_names = names
            .into_iter()
            .map(|n| {
                if n.contains(' ') {
                    log::warn!("Find whitespaces in feature_names, replace with underlines");
                    n.replace(' ', "_")
                } else {
                    n
                }
            })
            .collect();
        Ok(())
    }

    /// Bin descriptions of every raw column, `none` for unused ones
    pub fn feature_infos(&self) -> Vec<String> {
        (0..self.num_total_features)
            .map(|raw| match self.inner_feature_index(raw) {
                Some(inner) => self.feature_bin_mapper(inner).bin_info_string(),
                None => "none".to_string(),
            })
            .collect()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Group and group bin for `value` of inner feature `inner`, `None`
    /// when the value falls in the feature's default bin
    #[inline]
    pub fn group_bin_for_value(&self, inner: usize, value: f64) -> Option<(u32, u32)> {
        let group = self.feature_to_group(inner);
        self.feature_groups[group]
            .group_bin_for_value(self.feature_to_sub_feature(inner), value)
            .map(|gb| (group as u32, gb))
    }

    /// Store group bins computed by [`Dataset::group_bin_for_value`]
    pub fn push_group_bins(&mut self, entries: &[GroupBinEntry]) {
        for &(group, row, gb) in entries {
            self.feature_groups[group as usize].push_group_bin(row, gb);
        }
    }

    /// Map and store one raw value
    pub fn push_value(&mut self, inner: usize, row: DataSize, value: f64) {
        let group = self.feature_to_group(inner);
        let sub = self.feature_to_sub_feature(inner);
        self.feature_groups[group].push_data(sub, row, value);
    }

    /// Seal every group after all rows are pushed
    pub fn finish_load(&mut self) {
        for group in &mut self.feature_groups {
            group.finish_load();
        }
    }

    fn header_bytes(&self) -> Result<Vec<u8>> {
        let mut buf: Vec<u8> = Vec::new();
        buf.write_i32(self.num_data)?;
        buf.write_i32(self.num_features() as i32)?;
        buf.write_i32(self.num_total_features as i32)?;
        buf.write_i32(self.label_idx)?;
        for &v in &self.used_feature_map {
            buf.write_i32(v)?;
        }
        buf.write_i32(self.feature_groups.len() as i32)?;
        for v in self
            .real_feature_idx
            .iter()
            .chain(&self.feature2group)
            .chain(&self.feature2subfeature)
        {
            buf.write_i32(*v)?;
        }
        for &v in &self.group_bin_boundaries {
            buf.write_u64(v)?;
        }
        for v in self.group_feature_start.iter().chain(&self.group_feature_cnt) {
            buf.write_i32(*v)?;
        }
        for name in &self.feature_names {
            buf.write_i32(name.len() as i32)?;
            buf.write_bytes(name.as_bytes())?;
        }
        Ok(buf)
    }

    /// Parse a header block. The result has no groups and empty metadata.
    pub(crate) fn from_header(buf: &[u8]) -> Result<Dataset> {
        let mut reader = BinaryReader::new(buf, "Binary file header");
        let num_data = reader.read_i32()?;
        let num_features = reader.read_count()?;
        let num_total_features = reader.read_count()?;
        let label_idx = reader.read_i32()?;
        let used_feature_map = reader.read_i32_vec(num_total_features)?;
        let num_groups = reader.read_count()?;
        let real_feature_idx = reader.read_i32_vec(num_features)?;
        let feature2group = reader.read_i32_vec(num_features)?;
        let feature2subfeature = reader.read_i32_vec(num_features)?;
        let group_bin_boundaries = (0..=num_groups)
            .map(|_| reader.read_u64())
            .collect::<Result<Vec<_>>>()?;
        let group_feature_start = reader.read_i32_vec(num_groups)?;
        let group_feature_cnt = reader.read_i32_vec(num_groups)?;
        let mut feature_names = Vec::with_capacity(num_total_features);
        for _ in 0..num_total_features {
            let len = reader.read_count()?;
            let bytes = reader.read_bytes(len)?;
            let name = std::str::from_utf8(bytes)
                .map_err(|_| LightGBMError::format("feature name is not valid UTF-8"))?;
            feature_names.push(name.to_string());
        }
        if reader.remaining() != 0 {
            return Err(LightGBMError::format(format!(
                "Binary file header has {} trailing bytes",
                reader.remaining()
            )));
        }
        let dataset = Dataset {
            data_filename: String::new(),
            num_data,
            num_total_features,
            label_idx,
            feature_groups: Vec::with_capacity(num_groups),
            used_feature_map,
            real_feature_idx,
            feature2group,
            feature2subfeature,
            group_bin_boundaries,
            group_feature_start,
            group_feature_cnt,
            feature_names,
            metadata: Metadata::new(),
        };
        dataset.check_layout()?;
        Ok(dataset)
    }

    /// Cross-check the feature maps of a parsed header.
    ///
    /// Groups must hold contiguous runs of inner features in order, and the
    /// raw to inner maps must be inverse to each other.
    fn check_layout(&self) -> Result<()> {
        let num_features = self.real_feature_idx.len();
        let num_groups = self.group_feature_start.len();
        let bad = |what: String| Err(LightGBMError::format(format!("Binary file header is inconsistent: {}", what)));
        if self.num_data < 0 {
            return bad(format!("negative num_data {}", self.num_data));
        }
        let mut next_start = 0i64;
        for g in 0..num_groups {
            let (start, cnt) = (self.group_feature_start[g], self.group_feature_cnt[g]);
            if i64::from(start) != next_start || cnt <= 0 {
                return bad(format!("group {} covers features [{}, {}+{})", g, start, start, cnt));
            }
            next_start += i64::from(cnt);
        }
        if next_start != num_features as i64 {
            return bad(format!("groups cover {} of {} features", next_start, num_features));
        }
        for j in 0..num_features {
            let g = self.feature2group[j];
            if g < 0 || g as usize >= num_groups {
                return bad(format!("feature {} is in group {} of {}", j, g, num_groups));
            }
            let g = g as usize;
            if i64::from(self.feature2subfeature[j]) != j as i64 - i64::from(self.group_feature_start[g]) {
                return bad(format!("feature {} has sub-feature {} in group {}", j, self.feature2subfeature[j], g));
            }
            let real = self.real_feature_idx[j];
            if real < 0
                || real as usize >= self.num_total_features
                || self.used_feature_map[real as usize] != j as i32
            {
                return bad(format!("feature {} maps to column {}", j, real));
            }
        }
        for (i, &inner) in self.used_feature_map.iter().enumerate() {
            if inner < -1 || inner >= num_features as i32 {
                return bad(format!("column {} maps to feature {}", i, inner));
            }
        }
        if self.group_bin_boundaries.first() != Some(&0)
            || self.group_bin_boundaries.windows(2).any(|w| w[0] > w[1])
        {
            return bad("group bin boundaries are not increasing from 0".to_string());
        }
        Ok(())
    }

    /// Check a group blob read from a binary file against the header
    pub(crate) fn check_loaded_group(&self, g: usize, group: &FeatureGroup) -> Result<()> {
        let expected = self.group_feature_cnt[g] as usize;
        if group.num_feature() != expected {
            return Err(LightGBMError::format(format!(
                "feature group {} holds {} features, header says {}",
                g,
                group.num_feature(),
                expected
            )));
        }
        let bins = self.group_bin_boundaries[g + 1] - self.group_bin_boundaries[g];
        if group.num_total_bin() as u64 != bins {
            return Err(LightGBMError::format(format!(
                "feature group {} has {} bins, header says {}",
                g,
                group.num_total_bin(),
                bins
            )));
        }
        Ok(())
    }

    /// Write the token, the header, the metadata and every group
    pub fn write_binary<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_bytes(BINARY_FILE_TOKEN.as_bytes())?;
        writer.write_sized_block(&self.header_bytes()?)?;
        let mut meta: Vec<u8> = Vec::with_capacity(self.metadata.sizes_in_byte());
        self.metadata.write_to(&mut meta)?;
        writer.write_sized_block(&meta)?;
        for group in &self.feature_groups {
            let mut blob: Vec<u8> = Vec::with_capacity(group.sizes_in_byte());
            group.write_to(&mut blob)?;
            writer.write_sized_block(&blob)?;
        }
        Ok(())
    }

    /// Save to `bin_filename`, or `<data>.bin` when `None`.
    ///
    /// An existing file is left alone.
    pub fn save_binary_file(&self, bin_filename: Option<&str>) -> Result<()> {
        let path = match bin_filename {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => format!("{}.bin", self.data_filename),
        };
        if Path::new(&path).exists() {
            log::warn!("File {} exists, cannot save binary to it", path);
            return Ok(());
        }
        let file = File::create(&path).map_err(|e| {
            LightGBMError::data_loading(format!("Cannot write binary data to {}: {}", path, e))
        })?;
        let mut writer = BufWriter::new(file);
        log::info!("Saving data to binary file {}", path);
        self.write_binary(&mut writer)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::BinType;

    fn mapper(values: &[f64], total: usize) -> BinMapper {
        BinMapper::find_bin(values, total, 32, 1, 0, BinType::Numerical, true, false)
    }

    #[test]
    fn test_sparse_features_bundle_when_disjoint() {
        let config = Config::default();
        // columns 0 and 1 are sparse and disjoint, column 2 is dense
        let mappers = vec![
            Some(mapper(&[1.0], 10)),
            Some(mapper(&[2.0], 10)),
            Some(mapper(&(1..=10).map(f64::from).collect::<Vec<_>>(), 10)),
        ];
        let non_zero = vec![vec![0], vec![5], (0..10).collect()];
        let ds = Dataset::construct(mappers, &non_zero, 10, 10, &config).unwrap();
        assert_eq!(ds.num_features(), 3);
        assert_eq!(ds.num_groups(), 2);
        assert_eq!(ds.feature_to_group(0), ds.feature_to_group(1));
        assert_eq!(ds.group_feature_range(0), 0..2);
        assert_eq!(ds.inner_feature_index(2), Some(2));
    }

    #[test]
    fn test_trivial_and_ignored_columns_are_unused() {
        let config = Config::default();
        let mappers = vec![None, Some(mapper(&[], 10)), Some(mapper(&[1.0, 2.0, 3.0], 3))];
        let ds = Dataset::construct(mappers, &[vec![], vec![], vec![0, 1, 2]], 3, 3, &config).unwrap();
        assert_eq!(ds.used_feature_map(), &[-1, -1, 0]);
        assert_eq!(ds.real_feature_index(0), 2);
        assert_eq!(ds.feature_infos()[0], "none");
    }

    #[test]
    fn test_header_round_trip() {
        let config = Config {
            enable_bundle: false,
            ..Config::default()
        };
        let mappers = vec![Some(mapper(&[1.0, 2.0], 4)), Some(mapper(&[3.0, 4.0], 4))];
        let mut ds = Dataset::construct(mappers, &[vec![0, 1], vec![2, 3]], 4, 4, &config).unwrap();
        ds.set_feature_names(vec!["a b".into(), "c".into()]).unwrap();
        let header = ds.header_bytes().unwrap();
        let back = Dataset::from_header(&header).unwrap();
        assert_eq!(back.feature_names(), &["a_b".to_string(), "c".to_string()]);
        assert_eq!(back.group_bin_boundaries, ds.group_bin_boundaries);
        assert_eq!(back.feature2group, ds.feature2group);
        assert!(Dataset::from_header(&header[..header.len() - 1]).is_err());
    }

    #[test]
    fn test_inconsistent_header_is_format_error() {
        let config = Config {
            enable_bundle: false,
            ..Config::default()
        };
        let mappers = vec![Some(mapper(&[1.0, 2.0], 4)), Some(mapper(&[3.0, 4.0], 4))];
        let ds = Dataset::construct(mappers, &[vec![0, 1], vec![2, 3]], 4, 4, &config).unwrap();

        let mut bad_group = ds.create_valid(4);
        bad_group.feature2group[1] = 7;
        let mut bad_sub = ds.create_valid(4);
        bad_sub.feature2subfeature[1] = 1;
        let mut bad_map = ds.create_valid(4);
        bad_map.used_feature_map[0] = 5;
        let mut bad_cover = ds.create_valid(4);
        bad_cover.group_feature_cnt[1] = 2;
        for corrupt in [bad_group, bad_sub, bad_map, bad_cover] {
            let header = corrupt.header_bytes().unwrap();
            let err = Dataset::from_header(&header).unwrap_err();
            assert!(matches!(err, LightGBMError::Format { .. }), "{}", err);
        }
    }

    #[test]
    fn test_group_blob_must_match_header() {
        let config = Config::default();
        let mappers = vec![
            Some(mapper(&[1.0], 10)),
            Some(mapper(&[2.0], 10)),
            Some(mapper(&(1..=10).map(f64::from).collect::<Vec<_>>(), 10)),
        ];
        let non_zero = vec![vec![0], vec![5], (0..10).collect()];
        let ds = Dataset::construct(mappers, &non_zero, 10, 10, &config).unwrap();
        assert!(ds.check_loaded_group(0, &ds.feature_groups[0]).is_ok());
        assert!(ds.check_loaded_group(1, &ds.feature_groups[1]).is_ok());
        assert!(matches!(
            ds.check_loaded_group(1, &ds.feature_groups[0]),
            Err(LightGBMError::Format { .. })
        ));
    }
}
