//! Batch inference with a trained model.
//!
//! A [`Predictor`] binds a model to one output mode. Each worker thread
//! keeps one dense feature buffer, so predicting a row never allocates its
//! feature vector and never takes a lock.

use crate::boosting::GBDT;
use crate::core::error::{LightGBMError, Result};
use crate::core::meta::PredictFunction;
use crate::core::utils::Common;
use crate::dataset::loader::{create_parser, TextReader};
use crate::prediction::prediction_early_stop::{create_prediction_early_stop_instance, PredictionEarlyStopConfig};
use log::{info, warn};
use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

/// What a prediction writes for each row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictMode {
    /// Converted output, e.g. probabilities
    Normal,
    /// Sum of tree outputs
    RawScore,
    /// Leaf index in every tree
    LeafIndex,
    /// Per-feature contributions and expected value
    Contrib,
}

thread_local! {
    /// Dense features of the row being predicted on this thread, all zero
    /// between rows
    static FEATURE_BUFFER: RefCell<Vec<f64>> = const { RefCell::new(Vec::new()) };
}

/// Copy sparse pairs into `buf`, ignoring features the model never saw.
fn copy_to_buffer(features: &[(i32, f64)], buf: &mut [f64]) {
    for &(idx, value) in features {
        if idx >= 0 && (idx as usize) < buf.len() {
            buf[idx as usize] = value;
        }
    }
}

/// Undo [`copy_to_buffer`]: zero the touched slots, or everything when more
/// than half of the buffer was touched.
fn clear_buffer(features: &[(i32, f64)], buf: &mut [f64]) {
    if features.len() > buf.len() / 2 {
        buf.fill(0.0);
    } else {
        for &(idx, _) in features {
            if idx >= 0 && (idx as usize) < buf.len() {
                buf[idx as usize] = 0.0;
            }
        }
    }
}

/// Run `f` on this thread's feature buffer, at least `num_feature` long.
fn with_feature_buffer<R>(num_feature: usize, f: impl FnOnce(&mut [f64]) -> R) -> R {
    FEATURE_BUFFER.with(|cell| {
        let mut buf = cell.borrow_mut();
        if buf.len() < num_feature {
            buf.resize(num_feature, 0.0);
        }
        f(&mut buf[..num_feature])
    })
}

/// Prediction over text files or in-memory matrices.
pub struct Predictor {
    boosting: Arc<GBDT>,
    mode: PredictMode,
    num_pred_one_row: usize,
    num_feature: usize,
    predict_fun: PredictFunction,
}

impl std::fmt::Debug for Predictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Predictor")
            .field("mode", &self.mode)
            .field("num_pred_one_row", &self.num_pred_one_row)
            .field("num_feature", &self.num_feature)
            .finish()
    }
}

impl Predictor {
    /// Bind `boosting` for prediction with the first `num_iteration`
    /// iterations (all when non-positive).
    ///
    /// Leaf index output wins over contributions, which win over raw scores.
    /// Early stopping is used only when `early_stop` is set and the model's
    /// objective tolerates approximate outputs.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mut boosting: GBDT,
        num_iteration: i32,
        is_raw_score: bool,
        is_predict_leaf_index: bool,
        is_predict_contrib: bool,
        early_stop: bool,
        early_stop_freq: i32,
        early_stop_margin: f64,
    ) -> Result<Self> {
        let early_stop_type = if early_stop && !boosting.need_accurate_prediction() {
            if boosting.num_class() == 1 {
                "binary"
            } else {
                "multiclass"
            }
        } else {
            "none"
        };
        let early_stop_config = PredictionEarlyStopConfig::new()
            .with_margin_threshold(early_stop_margin)
            .with_round_period(early_stop_freq.max(1));
        let early_stop = Arc::new(create_prediction_early_stop_instance(early_stop_type, &early_stop_config)?);

        boosting.init_predict(num_iteration);
        let num_pred_one_row = boosting.num_predict_one_row(num_iteration, is_predict_leaf_index, is_predict_contrib);
        let num_feature = (boosting.max_feature_idx() + 1).max(0) as usize;
        let boosting = Arc::new(boosting);
        let mode = if is_predict_leaf_index {
            PredictMode::LeafIndex
        } else if is_predict_contrib {
            PredictMode::Contrib
        } else if is_raw_score {
            PredictMode::RawScore
        } else {
            PredictMode::Normal
        };

        let model = Arc::clone(&boosting);
        let predict_fun: PredictFunction = Arc::new(move |features: &[(i32, f64)], output: &mut [f64]| {
            with_feature_buffer(num_feature, |buf| {
                copy_to_buffer(features, buf);
                match mode {
                    PredictMode::Normal => model.predict(buf, output, &early_stop),
                    PredictMode::RawScore => model.predict_raw(buf, output, &early_stop),
                    PredictMode::LeafIndex => model.predict_leaf_index(buf, output),
                    PredictMode::Contrib => model.predict_contrib(buf, output, &early_stop),
                }
                clear_buffer(features, buf);
            })
        });

        Ok(Predictor {
            boosting,
            mode,
            num_pred_one_row,
            num_feature,
            predict_fun,
        })
    }

    /// Row predict callback, shareable with the dataset loader
    pub fn get_predict_function(&self) -> PredictFunction {
        Arc::clone(&self.predict_fun)
    }

    pub fn boosting(&self) -> &GBDT {
        &self.boosting
    }

    pub fn mode(&self) -> PredictMode {
        self.mode
    }

    /// Values written per row
    pub fn num_pred_one_row(&self) -> usize {
        self.num_pred_one_row
    }

    /// Predict one sparse row.
    pub fn predict_row(&self, features: &[(i32, f64)]) -> Vec<f64> {
        let mut output = vec![0.0; self.num_pred_one_row];
        (self.predict_fun)(features, &mut output);
        output
    }

    /// Predict every row of a dense matrix, one output row per input row.
    pub fn predict_matrix(&self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        if data.ncols() > self.num_feature {
            warn!(
                "Input has {} columns, the model uses only the first {}",
                data.ncols(),
                self.num_feature
            );
        }
        let rows: Vec<Vec<f64>> = data
            .outer_iter()
            .into_par_iter()
            .map(|row| {
                let features: Vec<(i32, f64)> = row
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| **v != 0.0)
                    .map(|(j, &v)| (j as i32, v))
                    .collect();
                self.predict_row(&features)
            })
            .collect();
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        Array2::from_shape_vec((data.nrows(), self.num_pred_one_row), flat)
            .map_err(|e| LightGBMError::prediction(format!("cannot shape prediction output: {}", e)))
    }

    /// Column remapping from a header line to model feature indices, or
    /// `None` when the columns already line up.
    ///
    /// Header columns without a matching model feature are dropped.
    fn header_remap(&self, header: &str) -> Option<Vec<i32>> {
        let mut names = Common::split_delimiters(header, "\t,");
        let label_idx = self.boosting.label_idx();
        if label_idx >= 0 && (label_idx as usize) < names.len() {
            names.remove(label_idx as usize);
        }
        let model_index: HashMap<&str, usize> = self
            .boosting
            .feature_names()
            .iter()
            .enumerate()
            .map(|(j, name)| (name.as_str(), j))
            .collect();
        let mut need_adjust = false;
        let remap: Vec<i32> = names
            .iter()
            .enumerate()
            .map(|(i, name)| match model_index.get(name.trim()) {
                Some(&j) => {
                    need_adjust |= i != j;
                    j as i32
                }
                None => {
                    need_adjust = true;
                    -1
                }
            })
            .collect();
        if need_adjust {
            info!("Reordering input columns to match the model's feature names");
            Some(remap)
        } else {
            None
        }
    }

    /// Predict every line of `data_filename` and write one tab separated
    /// line per row to `result_filename`, in input order.
    pub fn predict(&self, data_filename: &str, result_filename: &str, has_header: bool) -> Result<()> {
        let parser = create_parser(data_filename, has_header, self.boosting.label_idx())?;
        let reader = TextReader::new(data_filename, has_header)?;
        let remap = if has_header {
            self.header_remap(reader.first_line())
        } else {
            None
        };

        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_path(result_filename)?;

        let parse_and_predict = |line: &String| -> Result<Vec<f64>> {
            let mut features = Vec::new();
            let mut label = 0.0;
            parser.parse_one_line(line, &mut features, &mut label)?;
            if let Some(remap) = remap.as_ref() {
                features = features
                    .into_iter()
                    .filter_map(|(idx, v)| match remap.get(idx as usize) {
                        Some(&j) if j >= 0 => Some((j, v)),
                        _ => None,
                    })
                    .collect();
            }
            Ok(self.predict_row(&features))
        };

        let total = reader.read_all_and_process_parallel(|_, lines| {
            let results: Vec<Vec<f64>> = lines.par_iter().map(&parse_and_predict).collect::<Result<_>>()?;
            for row in results {
                writer.write_record(row.iter().map(|&v| Common::double_to_str(v)))?;
            }
            Ok(())
        })?;
        writer.flush()?;
        info!("Finished prediction of {} rows, results written to {}", total, result_filename);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = "tree\nversion=v2\nnum_class=1\nnum_tree_per_iteration=1\nlabel_index=0\n\
max_feature_idx=1\nfeature_names=a b\nfeature_infos=[0:10] [0:10]\n\nTree=0\nnum_leaves=2\n\
split_feature=1\nsplit_gain=1\nthreshold=5\ndecision_type=0\nleft_child=-1\nright_child=-2\n\
leaf_value=-1 1\nleaf_count=5 5\ninternal_value=0\ninternal_count=10\nshrinkage=1\n\n\n";

    fn model() -> GBDT {
        let mut gbdt = GBDT::new();
        assert!(gbdt.load_model_from_string(MODEL));
        gbdt
    }

    #[test]
    fn test_predict_row_uses_positions() {
        let predictor = Predictor::new(model(), -1, true, false, false, false, 1, 0.0).unwrap();
        assert_eq!(predictor.predict_row(&[(1, 7.0)]), vec![1.0]);
        assert_eq!(predictor.predict_row(&[(0, 7.0)]), vec![-1.0]);
        // same row twice gives the same answer
        assert_eq!(predictor.predict_row(&[(1, 7.0)]), vec![1.0]);
        assert_eq!(predictor.predict_row(&[]), vec![-1.0]);
    }

    #[test]
    fn test_leaf_index_mode() {
        let predictor = Predictor::new(model(), -1, false, true, false, false, 1, 0.0).unwrap();
        assert_eq!(predictor.mode(), PredictMode::LeafIndex);
        assert_eq!(predictor.predict_row(&[(1, 9.0)]), vec![1.0]);
    }

    #[test]
    fn test_predict_matrix() {
        let predictor = Predictor::new(model(), -1, true, false, false, false, 1, 0.0).unwrap();
        let data = Array2::from_shape_vec((3, 2), vec![0.0, 1.0, 0.0, 6.0, 3.0, 9.0]).unwrap();
        let out = predictor.predict_matrix(data.view()).unwrap();
        assert_eq!(out.shape(), &[3, 1]);
        assert_eq!(out.column(0).to_vec(), vec![-1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_models_of_different_width_share_a_thread() {
        let wide = MODEL
            .replace("max_feature_idx=1", "max_feature_idx=3")
            .replace("feature_names=a b", "feature_names=a b c d")
            .replace("feature_infos=[0:10] [0:10]", "feature_infos=[0:10] [0:10] [0:10] [0:10]");
        let mut gbdt = GBDT::new();
        assert!(gbdt.load_model_from_string(&wide));
        let wide = Predictor::new(gbdt, -1, true, false, false, false, 1, 0.0).unwrap();
        let narrow = Predictor::new(model(), -1, true, false, false, false, 1, 0.0).unwrap();

        assert_eq!(wide.predict_row(&[(1, 7.0), (3, 2.0)]), vec![1.0]);
        assert_eq!(narrow.predict_row(&[(0, 1.0)]), vec![-1.0]);
        assert_eq!(wide.predict_row(&[(3, 2.0)]), vec![-1.0]);
        with_feature_buffer(4, |buf| assert!(buf.iter().all(|&v| v == 0.0)));
    }

    #[test]
    fn test_parallel_rows_are_repeatable() {
        let predictor = Predictor::new(model(), -1, true, false, false, false, 1, 0.0).unwrap();
        let rows: Vec<Vec<(i32, f64)>> = (0..2000).map(|i| vec![(1, (i % 11) as f64)]).collect();
        let first: Vec<Vec<f64>> = rows.par_iter().map(|r| predictor.predict_row(r)).collect();
        let second: Vec<Vec<f64>> = rows.par_iter().rev().map(|r| predictor.predict_row(r)).collect();
        let second: Vec<Vec<f64>> = second.into_iter().rev().collect();
        assert_eq!(first, second);
        for (row, out) in rows.iter().zip(&first) {
            let expected = if row[0].1 <= 5.0 { -1.0 } else { 1.0 };
            assert_eq!(out, &vec![expected]);
        }
    }

    #[test]
    fn test_buffer_clear_heuristic() {
        let mut buf = vec![0.0; 6];
        let few = [(1, 2.0), (4, 3.0)];
        copy_to_buffer(&few, &mut buf);
        assert_eq!(buf, vec![0.0, 2.0, 0.0, 0.0, 3.0, 0.0]);
        clear_buffer(&few, &mut buf);
        assert!(buf.iter().all(|&v| v == 0.0));
        let many = [(0, 1.0), (1, 1.0), (2, 1.0), (3, 1.0), (9, 1.0)];
        copy_to_buffer(&many, &mut buf);
        clear_buffer(&many, &mut buf);
        assert!(buf.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_file_prediction_with_reordered_header() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data.csv");
        let out = dir.path().join("out.txt");
        // columns b and a swapped relative to the model
        std::fs::write(&data, "label,b,a\n0,7,1\n1,2,9\n").unwrap();
        let predictor = Predictor::new(model(), -1, true, false, false, false, 1, 0.0).unwrap();
        predictor
            .predict(data.to_str().unwrap(), out.to_str().unwrap(), true)
            .unwrap();
        let text = std::fs::read_to_string(&out).unwrap();
        assert_eq!(text, "1\n-1\n");
    }
}
