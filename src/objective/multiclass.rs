//! Multiclass objectives.

use crate::core::error::{LightGBMError, Result};
use crate::core::types::{DataSize, Label, Score};
use crate::core::utils::Common;
use crate::dataset::Metadata;
use crate::objective::binary::BinaryLogloss;
use crate::objective::ObjectiveFunction;
use rayon::prelude::*;

fn check_num_class(num_class: usize) -> Result<()> {
    if num_class == 0 {
        return Err(LightGBMError::invalid_parameter(
            "num_class",
            "0",
            "number of classes should be at least 1",
        ));
    }
    Ok(())
}

/// Softmax cross entropy over `num_class` scores per row.
#[derive(Debug, Clone)]
pub struct MulticlassSoftmax {
    num_class: usize,
    num_data: usize,
    label_int: Vec<usize>,
    weights: Option<Vec<Label>>,
}

impl MulticlassSoftmax {
    pub fn new(num_class: usize) -> Result<Self> {
        check_num_class(num_class)?;
        Ok(MulticlassSoftmax {
            num_class,
            num_data: 0,
            label_int: Vec::new(),
            weights: None,
        })
    }
}

impl ObjectiveFunction for MulticlassSoftmax {
    fn init(&mut self, metadata: &Metadata, num_data: DataSize) -> Result<()> {
        self.num_data = num_data as usize;
        self.label_int = metadata.label()[..self.num_data]
            .iter()
            .map(|&l| {
                let k = l as i32;
                if k < 0 || k as usize >= self.num_class {
                    Err(LightGBMError::dataset(format!(
                        "Label must be in [0, {}), but found {} in label",
                        self.num_class, k
                    )))
                } else {
                    Ok(k as usize)
                }
            })
            .collect::<Result<_>>()?;
        self.weights = metadata.weights().map(<[Label]>::to_vec);
        Ok(())
    }

    fn get_gradients(&self, score: &[f64], gradients: &mut [Score], hessians: &mut [Score]) {
        let n = self.num_data;
        let k_total = self.num_class;
        // one row per task, each writes its own class-major slots
        let rows: Vec<(usize, Vec<(Score, Score)>)> = (0..n)
            .into_par_iter()
            .map(|i| {
                let mut rec: Vec<f64> = (0..k_total).map(|k| score[n * k + i]).collect();
                Common::softmax(&mut rec);
                let w = self.weights.as_ref().map_or(1.0, |w| f64::from(w[i]));
                let out = rec
                    .iter()
                    .enumerate()
                    .map(|(k, &p)| {
                        let g = if self.label_int[i] == k { p - 1.0 } else { p };
                        ((g * w) as Score, (2.0 * p * (1.0 - p) * w) as Score)
                    })
                    .collect();
                (i, out)
            })
            .collect();
        for (i, out) in rows {
            for (k, (g, h)) in out.into_iter().enumerate() {
                gradients[n * k + i] = g;
                hessians[n * k + i] = h;
            }
        }
    }

    fn name(&self) -> &'static str {
        "multiclass"
    }

    fn convert_output(&self, input: &[f64], output: &mut [f64]) {
        output[..self.num_class].copy_from_slice(&input[..self.num_class]);
        Common::softmax(&mut output[..self.num_class]);
    }

    fn to_model_string(&self) -> String {
        format!("{} num_class:{}", self.name(), self.num_class)
    }

    fn skip_empty_class(&self) -> bool {
        true
    }

    fn num_model_per_iteration(&self) -> usize {
        self.num_class
    }

    fn num_predict_one_row(&self) -> usize {
        self.num_class
    }

    fn need_accurate_prediction(&self) -> bool {
        false
    }

    fn class_need_train(&self, class_id: usize) -> bool {
        self.label_int.is_empty() || self.label_int.iter().any(|&k| k == class_id)
    }
}

/// One binary log loss per class.
#[derive(Debug, Clone)]
pub struct MulticlassOva {
    num_class: usize,
    num_data: usize,
    sigmoid: f64,
    binary_loss: Vec<BinaryLogloss>,
}

impl MulticlassOva {
    pub fn new(num_class: usize, sigmoid: f64) -> Result<Self> {
        check_num_class(num_class)?;
        let binary_loss = (0..num_class)
            .map(|k| BinaryLogloss::one_vs_rest(sigmoid, k as i32))
            .collect::<Result<_>>()?;
        Ok(MulticlassOva {
            num_class,
            num_data: 0,
            sigmoid,
            binary_loss,
        })
    }
}

impl ObjectiveFunction for MulticlassOva {
    fn init(&mut self, metadata: &Metadata, num_data: DataSize) -> Result<()> {
        self.num_data = num_data as usize;
        for loss in &mut self.binary_loss {
            loss.init(metadata, num_data)?;
        }
        Ok(())
    }

    fn get_gradients(&self, score: &[f64], gradients: &mut [Score], hessians: &mut [Score]) {
        let n = self.num_data;
        for ((loss, (g, h)), s) in self
            .binary_loss
            .iter()
            .zip(gradients.chunks_mut(n).zip(hessians.chunks_mut(n)))
            .zip(score.chunks(n))
        {
            loss.get_gradients(s, g, h);
        }
    }

    fn name(&self) -> &'static str {
        "multiclassova"
    }

    fn convert_output(&self, input: &[f64], output: &mut [f64]) {
        for k in 0..self.num_class {
            output[k] = 1.0 / (1.0 + (-self.sigmoid * input[k]).exp());
        }
    }

    fn to_model_string(&self) -> String {
        format!("{} num_class:{} sigmoid:{}", self.name(), self.num_class, self.sigmoid)
    }

    fn skip_empty_class(&self) -> bool {
        true
    }

    fn num_model_per_iteration(&self) -> usize {
        self.num_class
    }

    fn num_predict_one_row(&self) -> usize {
        self.num_class
    }

    fn need_accurate_prediction(&self) -> bool {
        false
    }

    fn class_need_train(&self, class_id: usize) -> bool {
        self.binary_loss[class_id].class_need_train(0)
    }

    fn class_default_output(&self, class_id: usize) -> f64 {
        self.binary_loss[class_id].class_default_output(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn metadata(labels: &[f64]) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.init(labels.len() as DataSize, -1, -1);
        for (i, &l) in labels.iter().enumerate() {
            metadata.set_label_at(i as DataSize, l);
        }
        metadata
    }

    #[test]
    fn test_softmax_gradients_are_class_major() {
        let mut objective = MulticlassSoftmax::new(3).unwrap();
        objective.init(&metadata(&[0.0, 2.0]), 2).unwrap();
        let score = vec![0.0; 6];
        let mut g = vec![0.0; 6];
        let mut h = vec![0.0; 6];
        objective.get_gradients(&score, &mut g, &mut h);
        let third = 1.0 / 3.0;
        // row 0 is class 0, row 1 is class 2
        assert_relative_eq!(g[0], (third - 1.0) as f32);
        assert_relative_eq!(g[1], third as f32);
        assert_relative_eq!(g[4], third as f32);
        assert_relative_eq!(g[5], (third - 1.0) as f32);
        assert_relative_eq!(h[2], (2.0 * third * (1.0 - third)) as f32);
        assert!(!objective.class_need_train(1));
        assert!(objective.class_need_train(2));
    }

    #[test]
    fn test_softmax_rejects_out_of_range_label() {
        let mut objective = MulticlassSoftmax::new(2).unwrap();
        assert!(objective.init(&metadata(&[0.0, 2.0]), 2).is_err());
    }

    #[test]
    fn test_ova_convert_and_empty_class() {
        let mut objective = MulticlassOva::new(3, 1.0).unwrap();
        objective.init(&metadata(&[0.0, 1.0, 0.0]), 3).unwrap();
        assert!(objective.class_need_train(0));
        assert!(!objective.class_need_train(2));
        assert!(objective.class_default_output(2) < -30.0);
        let mut out = [0.0; 3];
        objective.convert_output(&[0.0, 0.0, 0.0], &mut out);
        assert_relative_eq!(out[1], 0.5);
    }
}
