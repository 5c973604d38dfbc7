/*!
 * Copyright (c) 2016 Microsoft Corporation. All rights reserved.
 * Licensed under the MIT License. See LICENSE file in the project root for license information.
 */

use crate::core::error::{LightGBMError, Result};
use std::fmt;
use std::str::FromStr;

/// String, array and bitset helpers shared by the parsers and model I/O.
#[derive(Debug)]
pub struct Common;

impl Common {
    /// Trims whitespace and control characters from both ends of a string.
    pub fn trim(s: &str) -> &str {
        s.trim_matches(&[' ', '\x0C', '\n', '\r', '\t', '\x0B'][..])
    }

    /// Splits by one delimiter, dropping empty segments.
    pub fn split(s: &str, delimiter: char) -> Vec<String> {
        s.split(delimiter)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Splits on any of the characters in `delimiters`, dropping empty segments.
    pub fn split_delimiters(s: &str, delimiters: &str) -> Vec<String> {
        s.split(|c| delimiters.contains(c))
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Parses a whole string as an `i32`, surrounding whitespace allowed.
    pub fn atoi_and_check(s: &str) -> Option<i32> {
        Self::trim(s).parse::<i32>().ok()
    }

    /// Parses a float the way data files spell them, including `na`, `nan`,
    /// `null`, `inf` and `-inf` in any case.
    pub fn atof(s: &str) -> Result<f64> {
        let t = Self::trim(s);
        if t.is_empty() {
            return Ok(0.0);
        }
        if let Ok(v) = t.parse::<f64>() {
            return Ok(v);
        }
        match t.to_ascii_lowercase().as_str() {
            "na" | "nan" | "null" | "none" => Ok(f64::NAN),
            "inf" | "+inf" | "infinity" => Ok(f64::INFINITY),
            "-inf" | "-infinity" => Ok(f64::NEG_INFINITY),
            _ => Err(LightGBMError::data_loading(format!(
                "cannot parse \"{}\" as a number",
                t
            ))),
        }
    }

    /// Joins values with a delimiter using their `Display` form.
    ///
    /// `f64` displays as the shortest string that parses back to the same
    /// bits, so numeric arrays survive a text round trip exactly.
    pub fn join<T: fmt::Display>(arr: &[T], delimiter: &str) -> String {
        let mut out = String::new();
        for (i, v) in arr.iter().enumerate() {
            if i > 0 {
                out.push_str(delimiter);
            }
            out.push_str(&v.to_string());
        }
        out
    }

    /// Shortest round-trip text for a double, in exponent form when the
    /// plain form would be very long.
    pub fn double_to_str(v: f64) -> String {
        let a = v.abs();
        if v != 0.0 && v.is_finite() && !(1e-5..1e16).contains(&a) {
            format!("{:e}", v)
        } else {
            v.to_string()
        }
    }

    /// Joins doubles with [`Common::double_to_str`].
    pub fn join_doubles(arr: &[f64], delimiter: &str) -> String {
        arr.iter()
            .map(|&v| Self::double_to_str(v))
            .collect::<Vec<_>>()
            .join(delimiter)
    }

    /// Parses a delimited list of values.
    pub fn string_to_array<T>(s: &str, delimiter: char) -> Result<Vec<T>>
    where
        T: FromStr,
    {
        s.split(delimiter)
            .filter(|p| !p.is_empty())
            .map(|p| {
                Self::trim(p).parse::<T>().map_err(|_| {
                    LightGBMError::model(format!("cannot parse \"{}\" in array \"{}\"", p, s))
                })
            })
            .collect()
    }

    /// Numerically stable softmax in place.
    pub fn softmax(input: &mut [f64]) {
        if input.is_empty() {
            return;
        }
        let max_val = input.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut sum = 0.0;
        for v in input.iter_mut() {
            *v = (*v - max_val).exp();
            sum += *v;
        }
        for v in input.iter_mut() {
            *v /= sum;
        }
    }

    /// Clamps to `±1e300` and maps NaN to zero.
    pub fn avoid_inf(x: f64) -> f64 {
        if x.is_nan() {
            0.0
        } else {
            x.clamp(-1e300, 1e300)
        }
    }

    /// Bitset with the given positions set.
    pub fn construct_bitset(vals: &[u32]) -> Vec<u32> {
        let mut bitset = Vec::new();
        for &val in vals {
            let i1 = (val / 32) as usize;
            if bitset.len() <= i1 {
                bitset.resize(i1 + 1, 0);
            }
            bitset[i1] |= 1u32 << (val % 32);
        }
        bitset
    }

    /// Whether `pos` is set in the bitset.
    pub fn find_in_bitset(bits: &[u32], pos: u32) -> bool {
        let i1 = (pos / 32) as usize;
        i1 < bits.len() && (bits[i1] >> (pos % 32)) & 1 != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_delimiters() {
        assert_eq!(
            Common::split_delimiters("a,b\tc,,d", "\t,"),
            vec!["a", "b", "c", "d"]
        );
        assert_eq!(Common::split("1,,2", ','), vec!["1", "2"]);
    }

    #[test]
    fn test_atof_spellings() {
        assert_eq!(Common::atof(" 1.5 ").unwrap(), 1.5);
        assert!(Common::atof("NA").unwrap().is_nan());
        assert_eq!(Common::atof("-inf").unwrap(), f64::NEG_INFINITY);
        assert_eq!(Common::atof("").unwrap(), 0.0);
        assert!(Common::atof("abc").is_err());
    }

    #[test]
    fn test_join_round_trip_is_exact() {
        let values = vec![0.1, 1.0 / 3.0, -2.5e-300, 12345.678901234567];
        let text = Common::join_doubles(&values, " ");
        assert!(text.contains("e-300"));
        let back: Vec<f64> = Common::string_to_array(&text, ' ').unwrap();
        assert_eq!(values, back);
    }

    #[test]
    fn test_softmax() {
        let mut v = vec![1000.0, 1000.0];
        Common::softmax(&mut v);
        assert!((v[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_bitset() {
        let bits = Common::construct_bitset(&[1, 33, 64]);
        assert_eq!(bits.len(), 3);
        assert!(Common::find_in_bitset(&bits, 33));
        assert!(!Common::find_in_bitset(&bits, 2));
        assert!(!Common::find_in_bitset(&bits, 500));
    }
}
