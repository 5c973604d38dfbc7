/*!
 * Copyright (c) 2016 Microsoft Corporation. All rights reserved.
 * Licensed under the MIT License. See LICENSE file in the project root for license information.
 */

use rand::Rng;
use std::collections::BTreeSet;

/// Linear congruential generator used for sampling, bagging and data
/// partitioning.
///
/// Every worker of a distributed job must draw identical sequences, so the
/// generator is always seeded explicitly from the synchronized config seeds.
#[derive(Debug, Clone)]
pub struct Random {
    x: u32,
}

impl Random {
    /// Generator seeded from the thread-local entropy source.
    pub fn from_entropy() -> Self {
        let seed: u32 = rand::thread_rng().gen_range(0..=65536);
        Random { x: seed }
    }

    /// Generator with a specific seed.
    pub fn with_seed(seed: i32) -> Self {
        Random { x: seed as u32 }
    }

    /// Random integer in `[lower_bound, upper_bound)` from the 15-bit stream.
    pub fn next_short(&mut self, lower_bound: i32, upper_bound: i32) -> i32 {
        self.rand_int16() % (upper_bound - lower_bound) + lower_bound
    }

    /// Random integer in `[lower_bound, upper_bound)` from the 31-bit stream.
    pub fn next_int(&mut self, lower_bound: i32, upper_bound: i32) -> i32 {
        self.rand_int32() % (upper_bound - lower_bound) + lower_bound
    }

    /// Random float in `[0.0, 1.0)`.
    pub fn next_float(&mut self) -> f32 {
        self.rand_int16() as f32 / 32768.0
    }

    /// Sample `k` distinct indices from `0..n`, returned in increasing order.
    pub fn sample(&mut self, n: usize, k: usize) -> Vec<usize> {
        if k > n || k == 0 {
            return Vec::new();
        }
        if k == n {
            return (0..n).collect();
        }
        let mut ret = Vec::with_capacity(k);
        if k > 1 && k as f64 > n as f64 / (k as f64).log2() {
            // dense case: one pass with a decreasing acceptance probability
            for i in 0..n {
                let prob = (k - ret.len()) as f64 / (n - i) as f64;
                if (self.next_float() as f64) < prob {
                    ret.push(i);
                }
            }
        } else {
            // Floyd's algorithm
            let mut picked = BTreeSet::new();
            for r in (n - k)..n {
                let v = self.next_int(0, r as i32 + 1) as usize;
                if !picked.insert(v) {
                    picked.insert(r);
                }
            }
            ret.extend(picked);
        }
        ret
    }

    fn rand_int16(&mut self) -> i32 {
        self.x = self.x.wrapping_mul(214013).wrapping_add(2531011);
        ((self.x >> 16) & 0x7FFF) as i32
    }

    fn rand_int32(&mut self) -> i32 {
        self.x = self.x.wrapping_mul(214013).wrapping_add(2531011);
        (self.x & 0x7FFF_FFFF) as i32
    }
}

impl Default for Random {
    fn default() -> Self {
        Self::from_entropy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_same_seed_same_stream() {
        let mut rng1 = Random::with_seed(123456789);
        let mut rng2 = Random::with_seed(123456789);
        for _ in 0..16 {
            assert_eq!(rng1.next_int(0, 100), rng2.next_int(0, 100));
            assert_eq!(rng1.next_short(0, 7), rng2.next_short(0, 7));
        }
    }

    #[test]
    fn test_first_draw_of_seed_zero() {
        // x1 = 2531011, (x1 >> 16) & 0x7FFF = 38
        let mut rng = Random::with_seed(0);
        assert_eq!(rng.next_short(0, 1000), 38);
    }

    #[test]
    fn test_bounds() {
        let mut rng = Random::with_seed(42);
        for _ in 0..200 {
            let s = rng.next_short(10, 20);
            assert!((10..20).contains(&s));
            let f = rng.next_float();
            assert!((0.0..1.0).contains(&f));
        }
    }

    #[test]
    fn test_sample_edge_cases() {
        let mut rng = Random::with_seed(42);
        assert!(rng.sample(5, 10).is_empty());
        assert!(rng.sample(5, 0).is_empty());
        assert_eq!(rng.sample(5, 5), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_sample_sorted_unique() {
        let mut rng = Random::with_seed(7);
        for &(n, k) in &[(10usize, 3usize), (1000, 900), (50, 2)] {
            let result = rng.sample(n, k);
            assert!(result.windows(2).all(|w| w[0] < w[1]));
            let unique: HashSet<_> = result.iter().collect();
            assert_eq!(unique.len(), result.len());
            assert!(result.iter().all(|&v| v < n));
        }
        // the sparse branch always yields exactly k
        assert_eq!(rng.sample(1000, 3).len(), 3);
    }
}
