/*!
 * Copyright (c) 2016 Microsoft Corporation. All rights reserved.
 * Licensed under the MIT License. See LICENSE file in the project root for license information.
 */

//! Collective communication used by distributed training.
//!
//! The loader and the application only need an all-gather over byte blocks
//! and scalar min/max reductions, so the seam is the [`Network`] trait and the
//! handle is passed explicitly. All collectives are blocking: every worker
//! must issue the same calls in the same order, otherwise the group hangs.

use crate::core::error::{LightGBMError, Result};
use std::sync::{Arc, Condvar, Mutex};

/// Blocking collective operations over a fixed group of workers.
pub trait Network: Send + Sync {
    /// Rank of this worker in `0..num_machines()`
    fn rank(&self) -> usize;

    /// Number of workers in the group
    fn num_machines(&self) -> usize;

    /// Gather variable blocks from every worker.
    ///
    /// Worker `i` contributes `input[..block_len[i]]`, which lands at
    /// `output[block_start[i]..block_start[i] + block_len[i]]` on every worker.
    fn allgather(
        &self,
        input: &[u8],
        block_start: &[usize],
        block_len: &[usize],
        output: &mut [u8],
    ) -> Result<()>;

    /// Minimum of `value` over all workers
    fn global_sync_up_by_min_i32(&self, value: i32) -> Result<i32> {
        let all = gather_scalars(self, &value.to_le_bytes())?;
        Ok(all
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .fold(value, i32::min))
    }

    /// Maximum of `value` over all workers
    fn global_sync_up_by_max_i32(&self, value: i32) -> Result<i32> {
        let all = gather_scalars(self, &value.to_le_bytes())?;
        Ok(all
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .fold(value, i32::max))
    }

    /// Minimum of `value` over all workers
    fn global_sync_up_by_min_f64(&self, value: f64) -> Result<f64> {
        let all = gather_scalars(self, &value.to_le_bytes())?;
        let mut out = value;
        for c in all.chunks_exact(8) {
            let mut b = [0u8; 8];
            b.copy_from_slice(c);
            out = out.min(f64::from_le_bytes(b));
        }
        Ok(out)
    }
}

fn gather_scalars<N: Network + ?Sized>(net: &N, bytes: &[u8]) -> Result<Vec<u8>> {
    let n = net.num_machines();
    let size = bytes.len();
    let block_start: Vec<usize> = (0..n).map(|i| i * size).collect();
    let block_len = vec![size; n];
    let mut output = vec![0u8; size * n];
    net.allgather(bytes, &block_start, &block_len, &mut output)?;
    Ok(output)
}

/// Single-machine network: every collective is the identity.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalNetwork;

impl Network for LocalNetwork {
    fn rank(&self) -> usize {
        0
    }

    fn num_machines(&self) -> usize {
        1
    }

    fn allgather(
        &self,
        input: &[u8],
        block_start: &[usize],
        block_len: &[usize],
        output: &mut [u8],
    ) -> Result<()> {
        let (start, len) = (block_start[0], block_len[0]);
        if input.len() < len || output.len() < start + len {
            return Err(LightGBMError::network("allgather buffer is too small"));
        }
        output[start..start + len].copy_from_slice(&input[..len]);
        Ok(())
    }
}

#[derive(Debug)]
struct HubState {
    generation: u64,
    arrived: usize,
    slots: Vec<Vec<u8>>,
    results: Arc<Vec<Vec<u8>>>,
}

#[derive(Debug)]
struct Hub {
    num_machines: usize,
    state: Mutex<HubState>,
    turn: Condvar,
}

/// In-process worker group connected through shared memory.
///
/// Each handle is one worker; hand one to each thread. Collectives rendezvous
/// on a generation counter, so a worker that runs ahead blocks until every
/// peer has joined the same round.
#[derive(Debug, Clone)]
pub struct ThreadNetwork {
    rank: usize,
    hub: Arc<Hub>,
}

impl ThreadNetwork {
    /// Create `num_machines` connected handles, ordered by rank.
    pub fn group(num_machines: usize) -> Vec<ThreadNetwork> {
        let hub = Arc::new(Hub {
            num_machines,
            state: Mutex::new(HubState {
                generation: 0,
                arrived: 0,
                slots: vec![Vec::new(); num_machines],
                results: Arc::new(Vec::new()),
            }),
            turn: Condvar::new(),
        });
        (0..num_machines)
            .map(|rank| ThreadNetwork {
                rank,
                hub: Arc::clone(&hub),
            })
            .collect()
    }

    fn exchange(&self, data: Vec<u8>) -> Result<Arc<Vec<Vec<u8>>>> {
        let poisoned = |_| LightGBMError::network("a peer worker panicked during a collective call");
        let mut st = self.hub.state.lock().map_err(poisoned)?;
        let generation = st.generation;
        st.slots[self.rank] = data;
        st.arrived += 1;
        if st.arrived == self.hub.num_machines {
            let gathered: Vec<Vec<u8>> = st.slots.iter_mut().map(std::mem::take).collect();
            st.results = Arc::new(gathered);
            st.arrived = 0;
            st.generation += 1;
            self.hub.turn.notify_all();
            return Ok(Arc::clone(&st.results));
        }
        while st.generation == generation {
            st = self.hub.turn.wait(st).map_err(poisoned)?;
        }
        Ok(Arc::clone(&st.results))
    }
}

impl Network for ThreadNetwork {
    fn rank(&self) -> usize {
        self.rank
    }

    fn num_machines(&self) -> usize {
        self.hub.num_machines
    }

    fn allgather(
        &self,
        input: &[u8],
        block_start: &[usize],
        block_len: &[usize],
        output: &mut [u8],
    ) -> Result<()> {
        let n = self.hub.num_machines;
        if block_start.len() != n || block_len.len() != n {
            return Err(LightGBMError::network(format!(
                "allgather expects {} blocks, got {}",
                n,
                block_len.len()
            )));
        }
        let len = block_len[self.rank];
        if input.len() < len {
            return Err(LightGBMError::network("allgather input is shorter than its block"));
        }
        let gathered = self.exchange(input[..len].to_vec())?;
        for (i, block) in gathered.iter().enumerate() {
            let start = block_start[i];
            if block.len() != block_len[i] || output.len() < start + block.len() {
                return Err(LightGBMError::network(format!(
                    "worker {} sent {} bytes for a block of {}",
                    i,
                    block.len(),
                    block_len[i]
                )));
            }
            output[start..start + block.len()].copy_from_slice(block);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_local_network_is_identity() {
        let net = LocalNetwork;
        assert_eq!(net.global_sync_up_by_min_i32(5).unwrap(), 5);
        assert_eq!(net.global_sync_up_by_max_i32(-3).unwrap(), -3);
        let mut out = vec![0u8; 4];
        net.allgather(&[1, 2], &[1], &[2], &mut out).unwrap();
        assert_eq!(out, vec![0, 1, 2, 0]);
    }

    #[test]
    fn test_thread_network_reductions() {
        let handles: Vec<_> = ThreadNetwork::group(4)
            .into_iter()
            .map(|net| {
                thread::spawn(move || {
                    let r = net.rank() as i32;
                    let min = net.global_sync_up_by_min_i32(10 - r).unwrap();
                    let max = net.global_sync_up_by_max_i32(r * r).unwrap();
                    let fmin = net.global_sync_up_by_min_f64(0.5 + r as f64).unwrap();
                    (min, max, fmin)
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), (7, 9, 0.5));
        }
    }

    #[test]
    fn test_thread_network_allgather_blocks() {
        let handles: Vec<_> = ThreadNetwork::group(3)
            .into_iter()
            .map(|net| {
                thread::spawn(move || {
                    let rank = net.rank();
                    let block_len = vec![2usize, 3, 1];
                    let block_start = vec![0usize, 2, 5];
                    let input: Vec<u8> = vec![rank as u8 + 1; block_len[rank]];
                    let mut output = vec![0u8; 6];
                    net.allgather(&input, &block_start, &block_len, &mut output).unwrap();
                    output
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), vec![1, 1, 2, 2, 2, 3]);
        }
    }
}
