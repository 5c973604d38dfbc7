//! Decision tree model.
//!
//! Nodes are stored in flat arrays. Internal nodes are indexed from 0 and
//! leaves are referenced from child arrays as `!leaf` (negative values).
//! A split keeps the left child at the split leaf's index and creates the
//! right child as a new leaf.

use crate::core::error::{LightGBMError, Result};
use crate::core::meta::is_zero;
use crate::core::types::{DataSize, MissingType};
use crate::core::utils::Common;
use crate::dataset::Dataset;
use rayon::prelude::*;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt::Write as _;

/// Mask for categorical decision type
const CATEGORICAL_MASK: i8 = 1;
/// Mask for default left decision type
const DEFAULT_LEFT_MASK: i8 = 2;

/// Element of a TreeSHAP decision path.
#[derive(Debug, Clone, Copy, Default)]
struct PathElement {
    feature_index: i32,
    zero_fraction: f64,
    one_fraction: f64,
    pweight: f64,
}

/// A single regression tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    max_leaves: i32,
    num_leaves: i32,
    shrinkage: f64,
    num_cat: i32,

    /// Children of internal nodes, negative values are leaves
    left_child: Vec<i32>,
    right_child: Vec<i32>,
    /// Split feature as inner (used feature) index
    split_feature_inner: Vec<i32>,
    /// Split feature as raw column index
    split_feature: Vec<i32>,
    threshold_in_bin: Vec<u32>,
    threshold: Vec<f64>,
    /// Bit 0 categorical, bit 1 default left, bits 2-3 missing type
    decision_type: Vec<i8>,
    split_gain: Vec<f32>,

    leaf_parent: Vec<i32>,
    leaf_value: Vec<f64>,
    leaf_weight: Vec<f64>,
    leaf_count: Vec<DataSize>,
    leaf_depth: Vec<i32>,

    internal_value: Vec<f64>,
    internal_weight: Vec<f64>,
    internal_count: Vec<DataSize>,

    /// Offsets into `cat_threshold`, one entry per categorical split plus one
    cat_boundaries: Vec<i32>,
    /// Bitsets over raw category values
    cat_threshold: Vec<u32>,
    cat_boundaries_inner: Vec<i32>,
    /// Bitsets over bins
    cat_threshold_inner: Vec<u32>,
}

#[inline]
fn missing_type_bits(missing_type: MissingType) -> i8 {
    match missing_type {
        MissingType::None => 0,
        MissingType::Zero => 1,
        MissingType::NaN => 2,
    }
}

impl Tree {
    /// Create a single-leaf tree that can grow up to `max_leaves` leaves.
    pub fn new(max_leaves: i32) -> Self {
        let max_leaves = max_leaves.max(1);
        let nodes = (max_leaves - 1) as usize;
        let leaves = max_leaves as usize;
        let mut leaf_parent = vec![0; leaves];
        leaf_parent[0] = -1;
        Tree {
            max_leaves,
            num_leaves: 1,
            shrinkage: 1.0,
            num_cat: 0,
            left_child: vec![0; nodes],
            right_child: vec![0; nodes],
            split_feature_inner: vec![0; nodes],
            split_feature: vec![0; nodes],
            threshold_in_bin: vec![0; nodes],
            threshold: vec![0.0; nodes],
            decision_type: vec![0; nodes],
            split_gain: vec![0.0; nodes],
            leaf_parent,
            leaf_value: vec![0.0; leaves],
            leaf_weight: vec![0.0; leaves],
            leaf_count: vec![0; leaves],
            leaf_depth: vec![0; leaves],
            internal_value: vec![0.0; nodes],
            internal_weight: vec![0.0; nodes],
            internal_count: vec![0; nodes],
            cat_boundaries: vec![0],
            cat_threshold: Vec::new(),
            cat_boundaries_inner: vec![0],
            cat_threshold_inner: Vec::new(),
        }
    }

    /// Tree with one leaf that always outputs `value`.
    pub fn constant(value: f64) -> Self {
        let mut tree = Tree::new(2);
        tree.leaf_value[0] = value;
        tree
    }

    /// Split `leaf` on a numerical feature.
    ///
    /// The left child keeps index `leaf`; the returned index is the new
    /// right leaf.
    #[allow(clippy::too_many_arguments)]
    pub fn split(
        &mut self,
        leaf: usize,
        feature: usize,
        real_feature: usize,
        threshold_bin: u32,
        threshold_double: f64,
        left_value: f64,
        right_value: f64,
        left_cnt: DataSize,
        right_cnt: DataSize,
        left_weight: f64,
        right_weight: f64,
        gain: f32,
        missing_type: MissingType,
        default_left: bool,
    ) -> usize {
        self.split_common(
            leaf,
            feature,
            real_feature,
            left_value,
            right_value,
            left_cnt,
            right_cnt,
            left_weight,
            right_weight,
            gain,
        );
        let node = (self.num_leaves - 1) as usize;
        let mut decision = 0i8;
        if default_left {
            decision |= DEFAULT_LEFT_MASK;
        }
        decision |= missing_type_bits(missing_type) << 2;
        self.decision_type[node] = decision;
        self.threshold_in_bin[node] = threshold_bin;
        self.threshold[node] = threshold_double;
        self.num_leaves += 1;
        (self.num_leaves - 1) as usize
    }

    /// Split `leaf` on a categorical feature. Rows whose bin is in
    /// `threshold_bin` (raw category in `threshold`) go left.
    #[allow(clippy::too_many_arguments)]
    pub fn split_categorical(
        &mut self,
        leaf: usize,
        feature: usize,
        real_feature: usize,
        threshold_bin: &[u32],
        threshold: &[u32],
        left_value: f64,
        right_value: f64,
        left_cnt: DataSize,
        right_cnt: DataSize,
        left_weight: f64,
        right_weight: f64,
        gain: f32,
        missing_type: MissingType,
    ) -> usize {
        self.split_common(
            leaf,
            feature,
            real_feature,
            left_value,
            right_value,
            left_cnt,
            right_cnt,
            left_weight,
            right_weight,
            gain,
        );
        let node = (self.num_leaves - 1) as usize;
        self.decision_type[node] = CATEGORICAL_MASK | (missing_type_bits(missing_type) << 2);
        self.threshold_in_bin[node] = self.num_cat as u32;
        self.threshold[node] = f64::from(self.num_cat);
        self.num_cat += 1;

        let bits = Common::construct_bitset(threshold);
        let last = self.cat_boundaries.last().copied().unwrap_or(0);
        self.cat_boundaries.push(last + bits.len() as i32);
        self.cat_threshold.extend_from_slice(&bits);

        let bits_inner = Common::construct_bitset(threshold_bin);
        let last = self.cat_boundaries_inner.last().copied().unwrap_or(0);
        self.cat_boundaries_inner.push(last + bits_inner.len() as i32);
        self.cat_threshold_inner.extend_from_slice(&bits_inner);

        self.num_leaves += 1;
        (self.num_leaves - 1) as usize
    }

    #[allow(clippy::too_many_arguments)]
    fn split_common(
        &mut self,
        leaf: usize,
        feature: usize,
        real_feature: usize,
        left_value: f64,
        right_value: f64,
        left_cnt: DataSize,
        right_cnt: DataSize,
        left_weight: f64,
        right_weight: f64,
        gain: f32,
    ) {
        let new_node = (self.num_leaves - 1) as usize;
        let new_leaf = self.num_leaves as usize;

        let parent = self.leaf_parent[leaf];
        if parent >= 0 {
            let parent = parent as usize;
            if self.left_child[parent] == !(leaf as i32) {
                self.left_child[parent] = new_node as i32;
            } else {
                self.right_child[parent] = new_node as i32;
            }
        }

        self.split_feature_inner[new_node] = feature as i32;
        self.split_feature[new_node] = real_feature as i32;
        self.split_gain[new_node] = gain;
        self.left_child[new_node] = !(leaf as i32);
        self.right_child[new_node] = !(new_leaf as i32);

        self.leaf_parent[leaf] = new_node as i32;
        self.leaf_parent[new_leaf] = new_node as i32;

        self.internal_value[new_node] = self.leaf_value[leaf];
        self.internal_weight[new_node] = self.leaf_weight[leaf];
        self.internal_count[new_node] = left_cnt + right_cnt;

        self.leaf_value[leaf] = if left_value.is_nan() { 0.0 } else { left_value };
        self.leaf_weight[leaf] = left_weight;
        self.leaf_count[leaf] = left_cnt;
        self.leaf_value[new_leaf] = if right_value.is_nan() { 0.0 } else { right_value };
        self.leaf_weight[new_leaf] = right_weight;
        self.leaf_count[new_leaf] = right_cnt;

        self.leaf_depth[new_leaf] = self.leaf_depth[leaf] + 1;
        self.leaf_depth[leaf] += 1;
    }

    #[inline]
    pub fn num_leaves(&self) -> usize {
        self.num_leaves as usize
    }

    #[inline]
    pub fn max_leaves(&self) -> usize {
        self.max_leaves as usize
    }

    #[inline]
    pub fn shrinkage(&self) -> f64 {
        self.shrinkage
    }

    #[inline]
    pub fn leaf_output(&self, leaf: usize) -> f64 {
        self.leaf_value[leaf]
    }

    pub fn set_leaf_output(&mut self, leaf: usize, output: f64) {
        self.leaf_value[leaf] = output;
    }

    pub fn leaf_count(&self, leaf: usize) -> DataSize {
        self.leaf_count[leaf]
    }

    pub fn leaf_depth(&self, leaf: usize) -> i32 {
        self.leaf_depth[leaf]
    }

    /// Parent node of `leaf`, `None` for the root leaf of a one-leaf tree
    pub fn leaf_parent(&self, leaf: usize) -> Option<usize> {
        let p = self.leaf_parent[leaf];
        (p >= 0).then_some(p as usize)
    }

    /// Raw column index split on by internal node `node`
    pub fn split_feature(&self, node: usize) -> usize {
        self.split_feature[node] as usize
    }

    pub fn split_feature_inner(&self, node: usize) -> usize {
        self.split_feature_inner[node] as usize
    }

    pub fn split_gain(&self, node: usize) -> f64 {
        f64::from(self.split_gain[node])
    }

    pub fn threshold(&self, node: usize) -> f64 {
        self.threshold[node]
    }

    /// Deepest leaf depth
    pub fn max_depth(&self) -> i32 {
        self.leaf_depth[..self.num_leaves as usize]
            .iter()
            .copied()
            .max()
            .unwrap_or(0)
    }

    /// Multiply every output by `rate`.
    pub fn shrink(&mut self, rate: f64) {
        let leaves = self.num_leaves as usize;
        for v in &mut self.leaf_value[..leaves] {
            *v *= rate;
        }
        for v in &mut self.internal_value[..leaves - 1] {
            *v *= rate;
        }
        self.shrinkage *= rate;
    }

    /// Add `val` to every output.
    pub fn add_bias(&mut self, val: f64) {
        let leaves = self.num_leaves as usize;
        for v in &mut self.leaf_value[..leaves] {
            *v += val;
        }
        for v in &mut self.internal_value[..leaves - 1] {
            *v += val;
        }
        self.shrinkage = 1.0;
    }

    #[inline]
    fn is_categorical(&self, node: usize) -> bool {
        self.decision_type[node] & CATEGORICAL_MASK != 0
    }

    #[inline]
    fn default_left(&self, node: usize) -> bool {
        self.decision_type[node] & DEFAULT_LEFT_MASK != 0
    }

    #[inline]
    fn missing_type(&self, node: usize) -> MissingType {
        match (self.decision_type[node] >> 2) & 3 {
            1 => MissingType::Zero,
            2 => MissingType::NaN,
            _ => MissingType::None,
        }
    }

    /// Child reached from `node` for raw value `fval`.
    #[inline]
    fn decision(&self, fval: f64, node: usize) -> i32 {
        if self.is_categorical(node) {
            self.categorical_decision(fval, node)
        } else {
            self.numerical_decision(fval, node)
        }
    }

    #[inline]
    fn numerical_decision(&self, fval: f64, node: usize) -> i32 {
        let missing_type = self.missing_type(node);
        let mut fval = fval;
        if fval.is_nan() && missing_type != MissingType::NaN {
            fval = 0.0;
        }
        let to_default = match missing_type {
            MissingType::Zero => is_zero(fval),
            MissingType::NaN => fval.is_nan(),
            MissingType::None => false,
        };
        let go_left = if to_default {
            self.default_left(node)
        } else {
            fval <= self.threshold[node]
        };
        if go_left {
            self.left_child[node]
        } else {
            self.right_child[node]
        }
    }

    #[inline]
    fn categorical_decision(&self, fval: f64, node: usize) -> i32 {
        if fval.is_nan() || fval < 0.0 {
            return self.right_child[node];
        }
        let cat_idx = self.threshold_in_bin[node] as usize;
        let start = self.cat_boundaries[cat_idx] as usize;
        let end = self.cat_boundaries[cat_idx + 1] as usize;
        if Common::find_in_bitset(&self.cat_threshold[start..end], fval as u32) {
            self.left_child[node]
        } else {
            self.right_child[node]
        }
    }

    /// Child reached from `node` for bin `fval` of the split feature.
    #[inline]
    fn decision_inner(&self, fval: u32, node: usize, default_bin: u32, max_bin: u32) -> i32 {
        if self.is_categorical(node) {
            let cat_idx = self.threshold_in_bin[node] as usize;
            let start = self.cat_boundaries_inner[cat_idx] as usize;
            let end = self.cat_boundaries_inner[cat_idx + 1] as usize;
            return if Common::find_in_bitset(&self.cat_threshold_inner[start..end], fval) {
                self.left_child[node]
            } else {
                self.right_child[node]
            };
        }
        let to_default = match self.missing_type(node) {
            MissingType::Zero => fval == default_bin,
            MissingType::NaN => fval == max_bin,
            MissingType::None => false,
        };
        let go_left = if to_default {
            self.default_left(node)
        } else {
            fval <= self.threshold_in_bin[node]
        };
        if go_left {
            self.left_child[node]
        } else {
            self.right_child[node]
        }
    }

    /// Leaf index for a dense row of raw feature values.
    pub fn get_leaf(&self, features: &[f64]) -> usize {
        if self.num_leaves <= 1 {
            return 0;
        }
        let mut node = 0i32;
        while node >= 0 {
            let n = node as usize;
            let fval = features
                .get(self.split_feature[n] as usize)
                .copied()
                .unwrap_or(0.0);
            node = self.decision(fval, n);
        }
        (!node) as usize
    }

    /// Output for a dense row of raw feature values.
    #[inline]
    pub fn predict(&self, features: &[f64]) -> f64 {
        self.leaf_value[self.get_leaf(features)]
    }

    #[inline]
    pub fn predict_leaf_index(&self, features: &[f64]) -> usize {
        self.get_leaf(features)
    }

    /// Per-node default and max bin of the split feature in `dataset`.
    fn node_bins(&self, dataset: &Dataset) -> Result<Vec<(u32, u32)>> {
        (0..(self.num_leaves - 1) as usize)
            .map(|node| {
                let inner = self.split_feature_inner[node] as usize;
                if inner >= dataset.num_features() {
                    return Err(LightGBMError::index_out_of_bounds(inner, dataset.num_features()));
                }
                let mapper = dataset.feature_bin_mapper(inner);
                Ok((mapper.default_bin(), (mapper.num_bin() - 1) as u32))
            })
            .collect()
    }

    fn leaf_by_bins(&self, dataset: &Dataset, row: DataSize, node_bins: &[(u32, u32)]) -> usize {
        let mut node = 0i32;
        while node >= 0 {
            let n = node as usize;
            let fval = dataset.feature_bin(self.split_feature_inner[n] as usize, row);
            let (default_bin, max_bin) = node_bins[n];
            node = self.decision_inner(fval, n, default_bin, max_bin);
        }
        (!node) as usize
    }

    /// Leaf reached by `row` of a binned dataset.
    pub fn get_leaf_by_bins(&self, dataset: &Dataset, row: DataSize) -> Result<usize> {
        if self.num_leaves <= 1 {
            return Ok(0);
        }
        let node_bins = self.node_bins(dataset)?;
        Ok(self.leaf_by_bins(dataset, row, &node_bins))
    }

    /// Add this tree's output to `score` for every row of `dataset`.
    pub fn add_prediction_to_score(&self, dataset: &Dataset, score: &mut [f64]) -> Result<()> {
        if self.num_leaves <= 1 {
            let v = self.leaf_value[0];
            if v != 0.0 {
                score.par_iter_mut().for_each(|s| *s += v);
            }
            return Ok(());
        }
        let node_bins = self.node_bins(dataset)?;
        score.par_iter_mut().enumerate().for_each(|(row, s)| {
            *s += self.leaf_value[self.leaf_by_bins(dataset, row as DataSize, &node_bins)];
        });
        Ok(())
    }

    /// Like [`Tree::add_prediction_to_score`] for the rows in `indices` only.
    pub fn add_prediction_to_score_by_indices(
        &self,
        dataset: &Dataset,
        indices: &[DataSize],
        score: &mut [f64],
    ) -> Result<()> {
        if self.num_leaves <= 1 {
            let v = self.leaf_value[0];
            if v != 0.0 {
                for &i in indices {
                    score[i as usize] += v;
                }
            }
            return Ok(());
        }
        let node_bins = self.node_bins(dataset)?;
        for &i in indices {
            score[i as usize] += self.leaf_value[self.leaf_by_bins(dataset, i, &node_bins)];
        }
        Ok(())
    }

    fn data_count(&self, node: i32) -> f64 {
        if node >= 0 {
            f64::from(self.internal_count[node as usize])
        } else {
            f64::from(self.leaf_count[(!node) as usize])
        }
    }

    /// Mean output weighted by training counts.
    pub fn expected_value(&self) -> f64 {
        if self.num_leaves <= 1 {
            return self.leaf_value[0];
        }
        let total = f64::from(self.internal_count[0]);
        if total <= 0.0 {
            return 0.0;
        }
        (0..self.num_leaves as usize)
            .map(|i| f64::from(self.leaf_count[i]) / total * self.leaf_value[i])
            .sum()
    }

    /// SHAP contributions of `features` added to `output`, which holds one
    /// slot per raw feature plus a final slot for the expected value.
    pub fn predict_contrib(&self, features: &[f64], output: &mut [f64]) {
        if let Some(last) = output.last_mut() {
            *last += self.expected_value();
        }
        if self.num_leaves > 1 {
            let max_path_len = (self.max_depth() + 1) as usize;
            let mut path = vec![PathElement::default(); max_path_len * (max_path_len + 1) / 2];
            self.tree_shap(features, output, 0, 0, &mut path, 0, 1.0, 1.0, -1);
        }
    }

    /// Recursive TreeSHAP. The path of the current call starts at
    /// `parent_offset + unique_depth` in `path`.
    #[allow(clippy::too_many_arguments)]
    fn tree_shap(
        &self,
        features: &[f64],
        phi: &mut [f64],
        node: i32,
        unique_depth: usize,
        path: &mut [PathElement],
        parent_offset: usize,
        parent_zero_fraction: f64,
        parent_one_fraction: f64,
        parent_feature_index: i32,
    ) {
        let offset = parent_offset + unique_depth;
        if unique_depth > 0 {
            path.copy_within(parent_offset..parent_offset + unique_depth, offset);
        }
        let mut unique_depth = unique_depth;
        {
            let unique_path = &mut path[offset..];
            extend_path(
                unique_path,
                unique_depth,
                parent_zero_fraction,
                parent_one_fraction,
                parent_feature_index,
            );
        }

        if node < 0 {
            let unique_path = &path[offset..];
            let leaf_value = self.leaf_value[(!node) as usize];
            for i in 1..=unique_depth {
                let w = unwound_path_sum(unique_path, unique_depth, i);
                let el = unique_path[i];
                if let Some(p) = phi.get_mut(el.feature_index as usize) {
                    *p += w * (el.one_fraction - el.zero_fraction) * leaf_value;
                }
            }
            return;
        }

        let n = node as usize;
        let split_feature = self.split_feature[n];
        let fval = features.get(split_feature as usize).copied().unwrap_or(0.0);
        let hot = self.decision(fval, n);
        let cold = if hot == self.left_child[n] {
            self.right_child[n]
        } else {
            self.left_child[n]
        };
        let w = self.data_count(node);
        let hot_zero_fraction = self.data_count(hot) / w;
        let cold_zero_fraction = self.data_count(cold) / w;
        let mut incoming_zero_fraction = 1.0;
        let mut incoming_one_fraction = 1.0;

        // undo an earlier split on the same feature so it can be redone here
        let found = (0..=unique_depth).find(|&i| path[offset + i].feature_index == split_feature);
        if let Some(path_index) = found {
            incoming_zero_fraction = path[offset + path_index].zero_fraction;
            incoming_one_fraction = path[offset + path_index].one_fraction;
            unwind_path(&mut path[offset..], unique_depth, path_index);
            unique_depth -= 1;
        }

        self.tree_shap(
            features,
            phi,
            hot,
            unique_depth + 1,
            path,
            offset,
            hot_zero_fraction * incoming_zero_fraction,
            incoming_one_fraction,
            split_feature,
        );
        self.tree_shap(
            features,
            phi,
            cold,
            unique_depth + 1,
            path,
            offset,
            cold_zero_fraction * incoming_zero_fraction,
            0.0,
            split_feature,
        );
    }

    /// Text block of the model file, without the leading `Tree=` line.
    pub fn to_string(&self) -> String {
        let nodes = (self.num_leaves - 1) as usize;
        let leaves = self.num_leaves as usize;
        let mut s = String::new();
        let _ = writeln!(s, "num_leaves={}", self.num_leaves);
        let _ = writeln!(s, "num_cat={}", self.num_cat);
        let _ = writeln!(s, "split_feature={}", Common::join(&self.split_feature[..nodes], " "));
        let _ = writeln!(s, "split_gain={}", Common::join(&self.split_gain[..nodes], " "));
        let _ = writeln!(s, "threshold={}", Common::join_doubles(&self.threshold[..nodes], " "));
        let _ = writeln!(s, "decision_type={}", Common::join(&self.decision_type[..nodes], " "));
        let _ = writeln!(s, "left_child={}", Common::join(&self.left_child[..nodes], " "));
        let _ = writeln!(s, "right_child={}", Common::join(&self.right_child[..nodes], " "));
        let _ = writeln!(s, "leaf_value={}", Common::join_doubles(&self.leaf_value[..leaves], " "));
        let _ = writeln!(s, "leaf_weight={}", Common::join_doubles(&self.leaf_weight[..leaves], " "));
        let _ = writeln!(s, "leaf_count={}", Common::join(&self.leaf_count[..leaves], " "));
        let _ = writeln!(s, "internal_value={}", Common::join_doubles(&self.internal_value[..nodes], " "));
        let _ = writeln!(s, "internal_weight={}", Common::join_doubles(&self.internal_weight[..nodes], " "));
        let _ = writeln!(s, "internal_count={}", Common::join(&self.internal_count[..nodes], " "));
        if self.num_cat > 0 {
            let _ = writeln!(s, "cat_boundaries={}", Common::join(&self.cat_boundaries, " "));
            let _ = writeln!(s, "cat_threshold={}", Common::join(&self.cat_threshold, " "));
        }
        let _ = writeln!(s, "shrinkage={}", Common::double_to_str(self.shrinkage));
        s.push('\n');
        s
    }

    /// Parse a block written by [`Tree::to_string`]. Unknown keys are ignored.
    ///
    /// A loaded tree predicts on raw values only; its inner feature indices
    /// equal the raw ones and carry no bin thresholds.
    pub fn from_string(text: &str) -> Result<Self> {
        let mut kv: HashMap<&str, &str> = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if let Some((k, v)) = line.split_once('=') {
                kv.entry(k.trim()).or_insert_with(|| v.trim());
            }
        }
        let num_leaves: i32 = kv
            .get("num_leaves")
            .ok_or_else(|| LightGBMError::model("Tree model string format error, should contain num_leaves field"))?
            .parse()
            .map_err(|_| LightGBMError::model("Tree model string format error, bad num_leaves"))?;
        if num_leaves < 1 {
            return Err(LightGBMError::model(format!("invalid num_leaves {}", num_leaves)));
        }
        let num_cat: i32 = match kv.get("num_cat") {
            Some(v) => v
                .parse()
                .map_err(|_| LightGBMError::model("Tree model string format error, bad num_cat"))?,
            None => 0,
        };
        let nodes = (num_leaves - 1) as usize;
        let leaves = num_leaves as usize;

        let mut tree = Tree::new(num_leaves.max(2));
        tree.num_leaves = num_leaves;
        tree.num_cat = num_cat;
        tree.leaf_value = parse_field(&kv, "leaf_value", leaves, true)?;
        tree.leaf_weight = parse_field(&kv, "leaf_weight", leaves, false)?;
        tree.leaf_count = parse_field(&kv, "leaf_count", leaves, false)?;
        if let Some(v) = kv.get("shrinkage") {
            tree.shrinkage = Common::atof(v)?;
        }
        if nodes == 0 {
            return Ok(tree);
        }

        tree.split_feature = parse_field(&kv, "split_feature", nodes, true)?;
        tree.split_feature_inner = tree.split_feature.clone();
        tree.split_gain = parse_field(&kv, "split_gain", nodes, false)?;
        tree.threshold = parse_field(&kv, "threshold", nodes, true)?;
        tree.decision_type = parse_field(&kv, "decision_type", nodes, true)?;
        tree.left_child = parse_field(&kv, "left_child", nodes, true)?;
        tree.right_child = parse_field(&kv, "right_child", nodes, true)?;
        tree.internal_value = parse_field(&kv, "internal_value", nodes, false)?;
        tree.internal_weight = parse_field(&kv, "internal_weight", nodes, false)?;
        tree.internal_count = parse_field(&kv, "internal_count", nodes, false)?;
        tree.threshold_in_bin = vec![0; nodes];

        if num_cat > 0 {
            tree.cat_boundaries = parse_field(&kv, "cat_boundaries", num_cat as usize + 1, true)?;
            let total = tree.cat_boundaries.last().copied().unwrap_or(0).max(0) as usize;
            tree.cat_threshold = parse_field(&kv, "cat_threshold", total, true)?;
            tree.cat_boundaries_inner = tree.cat_boundaries.clone();
            tree.cat_threshold_inner = tree.cat_threshold.clone();
        }
        for node in 0..nodes {
            if tree.is_categorical(node) {
                let cat_idx = tree.threshold[node] as i32;
                if cat_idx < 0 || cat_idx >= num_cat {
                    return Err(LightGBMError::model(format!(
                        "categorical split {} refers to missing bitset {}",
                        node, cat_idx
                    )));
                }
                tree.threshold_in_bin[node] = cat_idx as u32;
            }
            for child in [tree.left_child[node], tree.right_child[node]] {
                let ok = if child >= 0 {
                    (child as usize) < nodes
                } else {
                    ((!child) as usize) < leaves
                };
                if !ok {
                    return Err(LightGBMError::model(format!("node {} has invalid child {}", node, child)));
                }
            }
        }
        tree.leaf_parent = vec![-1; leaves];
        tree.leaf_depth = vec![0; leaves];
        tree.recompute_leaf_structure(0, -1, 0, 0)?;
        Ok(tree)
    }

    fn recompute_leaf_structure(&mut self, node: i32, parent: i32, depth: i32, visited: usize) -> Result<()> {
        if visited > self.num_leaves as usize {
            return Err(LightGBMError::model("tree structure contains a cycle"));
        }
        if node < 0 {
            let leaf = (!node) as usize;
            self.leaf_parent[leaf] = parent;
            self.leaf_depth[leaf] = depth;
            return Ok(());
        }
        let n = node as usize;
        let (left, right) = (self.left_child[n], self.right_child[n]);
        self.recompute_leaf_structure(left, node, depth + 1, visited + 1)?;
        self.recompute_leaf_structure(right, node, depth + 1, visited + 1)
    }

    /// JSON form used by model dumps.
    pub fn to_json(&self) -> Value {
        let structure = if self.num_leaves <= 1 {
            json!({
                "leaf_value": self.leaf_value[0],
                "leaf_count": self.leaf_count[0],
            })
        } else {
            self.node_to_json(0)
        };
        json!({
            "num_leaves": self.num_leaves,
            "num_cat": self.num_cat,
            "shrinkage": self.shrinkage,
            "tree_structure": structure,
        })
    }

    fn node_to_json(&self, index: i32) -> Value {
        if index < 0 {
            let leaf = (!index) as usize;
            return json!({
                "leaf_index": leaf,
                "leaf_value": self.leaf_value[leaf],
                "leaf_weight": self.leaf_weight[leaf],
                "leaf_count": self.leaf_count[leaf],
            });
        }
        let n = index as usize;
        let (threshold, decision) = if self.is_categorical(n) {
            let cats: Vec<String> = self.categories_of(n).iter().map(|c| c.to_string()).collect();
            (Value::from(cats.join("||")), "==")
        } else {
            (Value::from(Common::avoid_inf(self.threshold[n])), "<=")
        };
        let missing = match self.missing_type(n) {
            MissingType::None => "None",
            MissingType::Zero => "Zero",
            MissingType::NaN => "NaN",
        };
        json!({
            "split_index": n,
            "split_feature": self.split_feature[n],
            "split_gain": Common::avoid_inf(f64::from(self.split_gain[n])),
            "threshold": threshold,
            "decision_type": decision,
            "default_left": self.default_left(n),
            "missing_type": missing,
            "internal_value": self.internal_value[n],
            "internal_weight": self.internal_weight[n],
            "internal_count": self.internal_count[n],
            "left_child": self.node_to_json(self.left_child[n]),
            "right_child": self.node_to_json(self.right_child[n]),
        })
    }

    /// Raw categories going left at categorical node `node`
    fn categories_of(&self, node: usize) -> Vec<u32> {
        let cat_idx = self.threshold_in_bin[node] as usize;
        let start = self.cat_boundaries[cat_idx] as usize;
        let end = self.cat_boundaries[cat_idx + 1] as usize;
        let mut cats = Vec::new();
        for (word, bits) in self.cat_threshold[start..end].iter().enumerate() {
            for bit in 0..32u32 {
                if (bits >> bit) & 1 != 0 {
                    cats.push(word as u32 * 32 + bit);
                }
            }
        }
        cats
    }

    /// C++ source of `PredictTree<index>` (or `PredictTree<index>Leaf`).
    pub fn to_if_else(&self, index: usize, predict_leaf_index: bool) -> String {
        let suffix = if predict_leaf_index { "Leaf" } else { "" };
        let mut s = String::new();
        let _ = write!(s, "double PredictTree{}{}(const double* arr) {{ ", index, suffix);
        if self.num_leaves <= 1 {
            if predict_leaf_index {
                s.push_str("return 0;");
            } else {
                let _ = write!(s, "return {};", Common::double_to_str(self.leaf_value[0]));
            }
        } else {
            if self.num_cat > 0 {
                let _ = write!(
                    s,
                    "static const uint32_t cat_threshold[] = {{{}}}; int int_fval = 0; ",
                    Common::join(&self.cat_threshold, ", ")
                );
            }
            s.push_str("double fval = 0.0; ");
            s.push_str(&self.node_to_if_else(0, predict_leaf_index));
        }
        s.push_str(" }\n");
        s
    }

    fn node_to_if_else(&self, index: i32, predict_leaf_index: bool) -> String {
        if index < 0 {
            let leaf = (!index) as usize;
            return if predict_leaf_index {
                format!("return {};", leaf)
            } else {
                format!("return {};", Common::double_to_str(self.leaf_value[leaf]))
            };
        }
        let n = index as usize;
        let mut s = format!("fval = arr[{}]; ", self.split_feature[n]);
        if self.is_categorical(n) {
            s.push_str(&self.categorical_decision_if_else(n));
        } else {
            s.push_str(&self.numerical_decision_if_else(n));
        }
        s.push_str(&self.node_to_if_else(self.left_child[n], predict_leaf_index));
        s.push_str(" } else { ");
        s.push_str(&self.node_to_if_else(self.right_child[n], predict_leaf_index));
        s.push_str(" }");
        s
    }

    fn numerical_decision_if_else(&self, node: usize) -> String {
        let threshold = Common::double_to_str(self.threshold[node]);
        let default_left = self.default_left(node);
        match self.missing_type(node) {
            MissingType::None => format!("if (std::isnan(fval)) fval = 0.0; if (fval <= {}) {{ ", threshold),
            MissingType::Zero => {
                if default_left {
                    format!(
                        "if (std::isnan(fval) || std::fabs(fval) <= 1e-35 || fval <= {}) {{ ",
                        threshold
                    )
                } else {
                    format!(
                        "if (!std::isnan(fval) && std::fabs(fval) > 1e-35 && fval <= {}) {{ ",
                        threshold
                    )
                }
            }
            MissingType::NaN => {
                if default_left {
                    format!("if (std::isnan(fval) || fval <= {}) {{ ", threshold)
                } else {
                    format!("if (!std::isnan(fval) && fval <= {}) {{ ", threshold)
                }
            }
        }
    }

    fn categorical_decision_if_else(&self, node: usize) -> String {
        let cat_idx = self.threshold_in_bin[node] as usize;
        let start = self.cat_boundaries[cat_idx];
        let len = self.cat_boundaries[cat_idx + 1] - start;
        format!(
            "int_fval = std::isnan(fval) ? -1 : static_cast<int>(fval); \
             if (int_fval >= 0 && int_fval < {} && ((cat_threshold[{} + int_fval / 32] >> (int_fval & 31)) & 1)) {{ ",
            32 * len,
            start
        )
    }
}

fn parse_field<T>(kv: &HashMap<&str, &str>, key: &str, expected: usize, required: bool) -> Result<Vec<T>>
where
    T: std::str::FromStr + Clone + Default,
{
    match kv.get(key) {
        Some(v) => {
            let values: Vec<T> = Common::string_to_array(v, ' ')?;
            if values.len() != expected {
                return Err(LightGBMError::model(format!(
                    "Tree model field {} has {} values, expected {}",
                    key,
                    values.len(),
                    expected
                )));
            }
            Ok(values)
        }
        None if required => Err(LightGBMError::model(format!(
            "Tree model string format error, should contain {} field",
            key
        ))),
        None => Ok(vec![T::default(); expected]),
    }
}

fn extend_path(
    unique_path: &mut [PathElement],
    unique_depth: usize,
    zero_fraction: f64,
    one_fraction: f64,
    feature_index: i32,
) {
    unique_path[unique_depth] = PathElement {
        feature_index,
        zero_fraction,
        one_fraction,
        pweight: if unique_depth == 0 { 1.0 } else { 0.0 },
    };
    let depth = (unique_depth + 1) as f64;
    for i in (0..unique_depth).rev() {
        unique_path[i + 1].pweight += one_fraction * unique_path[i].pweight * (i + 1) as f64 / depth;
        unique_path[i].pweight = zero_fraction * unique_path[i].pweight * (unique_depth - i) as f64 / depth;
    }
}

fn unwind_path(unique_path: &mut [PathElement], unique_depth: usize, path_index: usize) {
    let one_fraction = unique_path[path_index].one_fraction;
    let zero_fraction = unique_path[path_index].zero_fraction;
    let mut next_one_portion = unique_path[unique_depth].pweight;
    let depth = (unique_depth + 1) as f64;
    for i in (0..unique_depth).rev() {
        if one_fraction != 0.0 {
            let tmp = unique_path[i].pweight;
            unique_path[i].pweight = next_one_portion * depth / ((i + 1) as f64 * one_fraction);
            next_one_portion = tmp - unique_path[i].pweight * zero_fraction * (unique_depth - i) as f64 / depth;
        } else {
            unique_path[i].pweight = unique_path[i].pweight * depth / (zero_fraction * (unique_depth - i) as f64);
        }
    }
    for i in path_index..unique_depth {
        unique_path[i].feature_index = unique_path[i + 1].feature_index;
        unique_path[i].zero_fraction = unique_path[i + 1].zero_fraction;
        unique_path[i].one_fraction = unique_path[i + 1].one_fraction;
    }
}

fn unwound_path_sum(unique_path: &[PathElement], unique_depth: usize, path_index: usize) -> f64 {
    let one_fraction = unique_path[path_index].one_fraction;
    let zero_fraction = unique_path[path_index].zero_fraction;
    let mut next_one_portion = unique_path[unique_depth].pweight;
    let depth = (unique_depth + 1) as f64;
    let mut total = 0.0;
    for i in (0..unique_depth).rev() {
        if one_fraction != 0.0 {
            let tmp = next_one_portion * depth / ((i + 1) as f64 * one_fraction);
            total += tmp;
            next_one_portion = unique_path[i].pweight - tmp * zero_fraction * ((unique_depth - i) as f64 / depth);
        } else {
            total += (unique_path[i].pweight / zero_fraction) / ((unique_depth - i) as f64 / depth);
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// x0 <= 1.5 splits the root; the right side splits on x1 <= 0.5.
    fn two_split_tree() -> Tree {
        let mut tree = Tree::new(4);
        let right = tree.split(0, 0, 0, 1, 1.5, -1.0, 1.0, 6, 4, 6.0, 4.0, 3.0, MissingType::NaN, true);
        assert_eq!(right, 1);
        tree.split(1, 1, 1, 0, 0.5, 0.5, 2.0, 1, 3, 1.0, 3.0, 1.0, MissingType::None, false);
        tree
    }

    #[test]
    fn test_split_layout() {
        let tree = two_split_tree();
        assert_eq!(tree.num_leaves(), 3);
        assert_eq!(tree.left_child[0], !0);
        assert_eq!(tree.right_child[0], 1);
        assert_eq!(tree.left_child[1], !1);
        assert_eq!(tree.right_child[1], !2);
        assert_eq!(tree.leaf_depth(0), 1);
        assert_eq!(tree.leaf_depth(2), 2);
        assert_eq!(tree.leaf_parent(2), Some(1));
        assert_eq!(tree.max_depth(), 2);
    }

    #[test]
    fn test_numerical_decisions() {
        let tree = two_split_tree();
        assert_eq!(tree.predict(&[1.0, 9.0]), -1.0);
        assert_eq!(tree.predict(&[2.0, 0.0]), 0.5);
        assert_eq!(tree.predict(&[2.0, 3.0]), 2.0);
        // NaN follows default_left at the root
        assert_eq!(tree.predict(&[f64::NAN, 3.0]), -1.0);
        // NaN is zero under missing type None
        assert_eq!(tree.predict(&[2.0, f64::NAN]), 0.5);
        assert_eq!(tree.predict_leaf_index(&[2.0, 3.0]), 2);
    }

    #[test]
    fn test_zero_missing_goes_default() {
        let mut tree = Tree::new(2);
        tree.split(0, 0, 0, 0, -1.0, 1.0, 2.0, 1, 1, 1.0, 1.0, 1.0, MissingType::Zero, true);
        assert_eq!(tree.predict(&[0.0]), 1.0);
        assert_eq!(tree.predict(&[f64::NAN]), 1.0);
        assert_eq!(tree.predict(&[-3.0]), 1.0);
        assert_eq!(tree.predict(&[3.0]), 2.0);
    }

    #[test]
    fn test_categorical_decisions() {
        let mut tree = Tree::new(2);
        tree.split_categorical(0, 0, 0, &[1], &[5, 40], 1.0, 2.0, 1, 1, 1.0, 1.0, 1.0, MissingType::None);
        assert_eq!(tree.predict(&[5.0]), 1.0);
        assert_eq!(tree.predict(&[40.0]), 1.0);
        assert_eq!(tree.predict(&[6.0]), 2.0);
        assert_eq!(tree.predict(&[-5.0]), 2.0);
        assert_eq!(tree.predict(&[f64::NAN]), 2.0);
        assert_eq!(tree.predict(&[1000.0]), 2.0);
    }

    #[test]
    fn test_shrink_and_bias() {
        let mut tree = two_split_tree();
        tree.shrink(0.1);
        assert_relative_eq!(tree.predict(&[2.0, 3.0]), 0.2);
        assert_relative_eq!(tree.shrinkage(), 0.1);
        tree.add_bias(1.0);
        assert_relative_eq!(tree.predict(&[2.0, 3.0]), 1.2);
    }

    #[test]
    fn test_string_round_trip() {
        let mut tree = two_split_tree();
        tree.split_categorical(0, 2, 3, &[2], &[7], 0.25, -0.75, 3, 3, 3.0, 3.0, 0.5, MissingType::None);
        tree.shrink(0.3);
        let text = tree.to_string();
        let loaded = Tree::from_string(&text).unwrap();
        assert_eq!(loaded.to_string(), text);
        for row in [[2.0, 3.0, 0.0, 7.0], [1.0, 0.0, 0.0, 7.0], [1.0, 0.0, 0.0, 8.0], [f64::NAN; 4]] {
            assert_eq!(loaded.predict(&row).to_bits(), tree.predict(&row).to_bits());
        }
    }

    #[test]
    fn test_from_string_rejects_bad_input() {
        assert!(Tree::from_string("num_cat=0\n").is_err());
        let text = two_split_tree().to_string().replace("left_child=-1 -2", "left_child=-1");
        assert!(Tree::from_string(&text).is_err());
        let text = two_split_tree().to_string().replace("right_child=1 -3", "right_child=1 -9");
        assert!(Tree::from_string(&text).is_err());
    }

    #[test]
    fn test_shap_sums_to_prediction() {
        let tree = two_split_tree();
        for row in [[1.0, 0.0], [2.0, 0.0], [2.0, 3.0]] {
            let mut contrib = vec![0.0; 3];
            tree.predict_contrib(&row, &mut contrib);
            let total: f64 = contrib.iter().sum();
            assert_relative_eq!(total, tree.predict(&row), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_json_and_if_else() {
        let tree = two_split_tree();
        let value = tree.to_json();
        assert_eq!(value["num_leaves"], 3);
        assert_eq!(value["tree_structure"]["split_feature"], 0);
        assert_eq!(value["tree_structure"]["right_child"]["left_child"]["leaf_index"], 1);
        let code = tree.to_if_else(7, false);
        assert!(code.starts_with("double PredictTree7(const double* arr)"));
        assert!(tree.to_if_else(7, true).contains("PredictTree7Leaf"));
    }
}
