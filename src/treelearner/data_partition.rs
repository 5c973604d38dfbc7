//! Row indices grouped by leaf.
//!
//! Each leaf owns a contiguous range of `indices`. Splitting a leaf is a
//! stable partition of its range, so indices stay ascending inside every
//! leaf, which the sparse histogram walk relies on.

use crate::core::types::DataSize;
use crate::core::utils::Threading;

const MIN_BLOCK_SIZE: usize = 512;

/// Leaf-to-rows mapping used while growing one tree.
#[derive(Debug, Clone)]
pub struct DataPartition {
    num_data: DataSize,
    leaf_begin: Vec<DataSize>,
    leaf_count: Vec<DataSize>,
    indices: Vec<DataSize>,
    temp: Vec<DataSize>,
    /// In-bag rows, `None` when every row is used
    used_data_indices: Option<Vec<DataSize>>,
}

impl DataPartition {
    pub fn new(num_data: DataSize, num_leaves: usize) -> Self {
        DataPartition {
            num_data,
            leaf_begin: vec![0; num_leaves],
            leaf_count: vec![0; num_leaves],
            indices: vec![0; num_data as usize],
            temp: vec![0; num_data as usize],
            used_data_indices: None,
        }
    }

    /// Restrict the next trees to `indices` (ascending), or to every row.
    pub fn set_used_data_indices(&mut self, indices: Option<&[DataSize]>) {
        self.used_data_indices = indices.map(<[DataSize]>::to_vec);
    }

    /// Put every used row into leaf 0.
    pub fn init(&mut self) {
        self.leaf_begin.iter_mut().for_each(|v| *v = 0);
        self.leaf_count.iter_mut().for_each(|v| *v = 0);
        match &self.used_data_indices {
            Some(used) => {
                self.indices[..used.len()].copy_from_slice(used);
                self.leaf_count[0] = used.len() as DataSize;
            }
            None => {
                for (i, v) in self.indices.iter_mut().enumerate() {
                    *v = i as DataSize;
                }
                self.leaf_count[0] = self.num_data;
            }
        }
    }

    /// Rows of `leaf`
    pub fn indices_on_leaf(&self, leaf: usize) -> &[DataSize] {
        let begin = self.leaf_begin[leaf] as usize;
        &self.indices[begin..begin + self.leaf_count[leaf] as usize]
    }

    pub fn leaf_count(&self, leaf: usize) -> DataSize {
        self.leaf_count[leaf]
    }

    /// Split `leaf` into itself (rows where `go_left` holds) and
    /// `right_leaf`. Returns the left count.
    pub fn split<F>(&mut self, leaf: usize, right_leaf: usize, go_left: F) -> DataSize
    where
        F: Fn(DataSize) -> bool + Send + Sync,
    {
        let begin = self.leaf_begin[leaf] as usize;
        let cnt = self.leaf_count[leaf] as usize;
        let rows = &self.indices[begin..begin + cnt];
        let left_cnt = Threading::stable_partition(cnt, MIN_BLOCK_SIZE, &mut self.temp[..cnt], |_, s, e, left, right| {
            for &row in &rows[s..e] {
                if go_left(row) {
                    left.push(row);
                } else {
                    right.push(row);
                }
            }
        });
        self.indices[begin..begin + cnt].copy_from_slice(&self.temp[..cnt]);
        let left_cnt = left_cnt as DataSize;
        self.leaf_count[leaf] = left_cnt;
        self.leaf_begin[right_leaf] = begin as DataSize + left_cnt;
        self.leaf_count[right_leaf] = cnt as DataSize - left_cnt;
        left_cnt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_and_split() {
        let mut partition = DataPartition::new(10, 3);
        partition.init();
        assert_eq!(partition.leaf_count(0), 10);
        let left = partition.split(0, 1, |row| row % 2 == 1);
        assert_eq!(left, 5);
        assert_eq!(partition.indices_on_leaf(0), &[1, 3, 5, 7, 9]);
        assert_eq!(partition.indices_on_leaf(1), &[0, 2, 4, 6, 8]);
        partition.split(1, 2, |row| row < 4);
        assert_eq!(partition.indices_on_leaf(1), &[0, 2]);
        assert_eq!(partition.indices_on_leaf(2), &[4, 6, 8]);
    }

    #[test]
    fn test_bagged_rows() {
        let mut partition = DataPartition::new(10, 2);
        partition.set_used_data_indices(Some(&[2, 3, 7]));
        partition.init();
        assert_eq!(partition.indices_on_leaf(0), &[2, 3, 7]);
        partition.set_used_data_indices(None);
        partition.init();
        assert_eq!(partition.leaf_count(0), 10);
    }
}
