//! Gradient boosting over decision trees.
//!
//! [`GBDT`] drives training iterations and prediction over its trees, and
//! [`ScoreUpdater`] keeps per-dataset scores current as trees are added.

pub mod gbdt;
pub mod score_updater;

pub use gbdt::GBDT;
pub use score_updater::ScoreUpdater;

use crate::core::error::{LightGBMError, Result};
use crate::core::types::BoostingType;
use log::info;
use std::path::Path;

/// Boosting type named on the first line of a model file
pub fn boosting_type_from_model_file<P: AsRef<Path>>(filename: P) -> Result<BoostingType> {
    let text = read_model_file(filename.as_ref())?;
    match text.lines().next().map(str::trim) {
        Some("tree") => Ok(BoostingType::Gbdt),
        other => Err(LightGBMError::model(format!(
            "Unknown model format or submodel type in model file {}: {:?}",
            filename.as_ref().display(),
            other
        ))),
    }
}

fn read_model_file(filename: &Path) -> Result<String> {
    std::fs::read_to_string(filename)
        .map_err(|e| LightGBMError::model(format!("cannot read model file {}: {}", filename.display(), e)))
}

/// Boosting object of `boosting_type`, loaded from `filename` when given.
pub fn create_boosting(boosting_type: BoostingType, filename: Option<&str>) -> Result<GBDT> {
    let mut boosting = match boosting_type {
        BoostingType::Gbdt => GBDT::new(),
    };
    if let Some(filename) = filename.filter(|f| !f.is_empty()) {
        let file_type = boosting_type_from_model_file(filename)?;
        if file_type != boosting_type {
            return Err(LightGBMError::model(format!(
                "Model file {} holds a {:?} model, expected {:?}",
                filename, file_type, boosting_type
            )));
        }
        let text = read_model_file(Path::new(filename))?;
        if !boosting.load_model_from_string(&text) {
            return Err(LightGBMError::model(format!("Failed to load model file {}", filename)));
        }
        info!("Loaded model from {}", filename);
    }
    Ok(boosting)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MODEL: &str = "tree\nversion=v2\nnum_class=1\nnum_tree_per_iteration=1\nlabel_index=0\n\
max_feature_idx=0\nfeature_names=Column_0\nfeature_infos=none\n\nTree=0\nnum_leaves=1\n\
split_feature=\nsplit_gain=\nthreshold=\ndecision_type=\nleft_child=\nright_child=\n\
leaf_parent=-1\nleaf_value=0.25\nleaf_count=0\ninternal_value=\ninternal_count=\nshrinkage=1\n\n\n";

    #[test]
    fn test_create_boosting_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MODEL.as_bytes()).unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let boosting = create_boosting(BoostingType::Gbdt, Some(&path)).unwrap();
        assert_eq!(boosting.number_of_total_model(), 1);
        assert_eq!(boosting.models()[0].leaf_output(0), 0.25);
    }

    #[test]
    fn test_rejects_unknown_submodel() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"forest\nnum_class=1\n").unwrap();
        let path = file.path().to_str().unwrap().to_string();
        assert!(create_boosting(BoostingType::Gbdt, Some(&path)).is_err());
        assert!(create_boosting(BoostingType::Gbdt, None).is_ok());
    }
}
