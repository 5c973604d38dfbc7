//! Block partitioned parallel loops on top of Rayon.
//!
//! A range is cut into at most `num_threads` contiguous blocks and each block
//! is handed to one task together with its block index. Callers use the block
//! index to address worker-local scratch buffers, so no locking is needed in
//! the loop bodies.

use crate::core::types::DataSize;
use rayon::prelude::*;

/// Partitioning helpers for parallel loops.
#[derive(Debug)]
pub struct Threading;

impl Threading {
    /// Number of blocks and block size for `cnt` items with at least
    /// `min_cnt_per_block` items per block.
    pub fn block_info(num_threads: usize, cnt: usize, min_cnt_per_block: usize) -> (usize, usize) {
        let min_cnt = min_cnt_per_block.max(1);
        let n_block = num_threads.max(1).min((cnt + min_cnt - 1) / min_cnt).max(1);
        if n_block > 1 {
            (n_block, (cnt + n_block - 1) / n_block)
        } else {
            (1, cnt)
        }
    }

    /// Block layout using the current Rayon pool size.
    pub fn block_info_default(cnt: usize, min_cnt_per_block: usize) -> (usize, usize) {
        Self::block_info(rayon::current_num_threads(), cnt, min_cnt_per_block)
    }

    /// Runs `inner_fun(block_idx, start, end)` over `[start, end)` in parallel.
    ///
    /// Returns the number of blocks that were used.
    pub fn for_loop<F>(start: usize, end: usize, min_block_size: usize, inner_fun: F) -> usize
    where
        F: Fn(usize, usize, usize) + Send + Sync,
    {
        let (n_block, block_size) = Self::block_info_default(end.saturating_sub(start), min_block_size);
        (0..n_block).into_par_iter().for_each(|i| {
            let inner_start = start + block_size * i;
            let inner_end = end.min(inner_start + block_size);
            if inner_start < inner_end {
                inner_fun(i, inner_start, inner_end);
            }
        });
        n_block
    }

    /// Like [`Threading::for_loop`] but each block owns `scratch[block_idx]`
    /// mutably and may fail.
    pub fn for_loop_with_scratch<T, F, E>(
        start: usize,
        end: usize,
        min_block_size: usize,
        scratch: &mut Vec<T>,
        make: impl Fn() -> T,
        inner_fun: F,
    ) -> std::result::Result<usize, E>
    where
        T: Send,
        E: Send,
        F: Fn(&mut T, usize, usize, usize) -> std::result::Result<(), E> + Send + Sync,
    {
        let (n_block, block_size) = Self::block_info_default(end.saturating_sub(start), min_block_size);
        while scratch.len() < n_block {
            scratch.push(make());
        }
        scratch[..n_block]
            .par_iter_mut()
            .enumerate()
            .try_for_each(|(i, buf)| {
                let inner_start = start + block_size * i;
                let inner_end = end.min(inner_start + block_size);
                if inner_start < inner_end {
                    inner_fun(buf, i, inner_start, inner_end)
                } else {
                    Ok(())
                }
            })?;
        Ok(n_block)
    }

    /// Parallel stable partition of `[0, cnt)` into `out`.
    ///
    /// `split_block(block_idx, start, end, left, right)` sorts the items of
    /// one block into its `left` and `right` buffers. Left items of all
    /// blocks come first in block order, then the right items, each block
    /// placed at its prefix-sum offset. Returns the number of left items.
    pub fn stable_partition<F>(cnt: usize, min_block_size: usize, out: &mut [DataSize], split_block: F) -> usize
    where
        F: Fn(usize, usize, usize, &mut Vec<DataSize>, &mut Vec<DataSize>) + Send + Sync,
    {
        let (n_block, block_size) = Self::block_info_default(cnt, min_block_size);
        let parts: Vec<(Vec<DataSize>, Vec<DataSize>)> = (0..n_block)
            .into_par_iter()
            .map(|i| {
                let start = block_size * i;
                let end = cnt.min(start + block_size);
                let mut left = Vec::new();
                let mut right = Vec::new();
                if start < end {
                    left.reserve(end - start);
                    right.reserve(end - start);
                    split_block(i, start, end, &mut left, &mut right);
                }
                (left, right)
            })
            .collect();
        let left_cnt: usize = parts.iter().map(|(l, _)| l.len()).sum();
        let mut left_offset = 0;
        let mut right_offset = left_cnt;
        for (left, right) in &parts {
            out[left_offset..left_offset + left.len()].copy_from_slice(left);
            left_offset += left.len();
            out[right_offset..right_offset + right.len()].copy_from_slice(right);
            right_offset += right.len();
        }
        left_cnt
    }
}
