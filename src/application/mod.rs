//! Command-line driven tasks: training, prediction and model conversion.
//!
//! [`Application`] turns a [`Config`] into a run of one task. Training
//! loads the data, builds objective, metrics and the boosting engine and
//! saves the model; prediction and conversion start from a model file.

use crate::boosting::{create_boosting, GBDT};
use crate::config::{args_to_map, Config};
use crate::core::error::{LightGBMError, Result};
use crate::core::network::Network;
use crate::core::types::TaskType;
use crate::dataset::{Dataset, DatasetLoader};
use crate::metrics::{create_metrics, Metric};
use crate::objective::create_objective;
use crate::prediction::Predictor;
use log::{debug, info};
use std::sync::Arc;
use std::time::Instant;

/// Configure the global rayon pool; 0 uses every core.
///
/// The global pool can be built only once per process, later calls keep
/// the existing pool.
pub fn set_num_threads(num_threads: usize) {
    let num_threads = if num_threads == 0 { num_cpus::get() } else { num_threads };
    if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(num_threads).build_global() {
        debug!("Keeping the existing thread pool: {}", e);
    }
}

/// Config from `key=value` arguments.
///
/// A `config` argument names a parameter file (`key=value` lines, `.json`
/// or `.toml`); arguments given directly take precedence over it.
pub fn load_parameters<I, S>(args: I) -> Result<Config>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut params = args_to_map(args);
    let mut config = match params.remove("config") {
        Some(path) if !path.is_empty() => Config::load_from_file(&path)?,
        _ => Config::default(),
    };
    config.apply_params(&params)?;
    config.validate()?;
    Ok(config)
}

/// One training, prediction or conversion run.
pub struct Application {
    config: Config,
    network: Arc<dyn Network>,
    train_data: Option<Arc<Dataset>>,
    train_metrics: Vec<Box<dyn Metric>>,
    valid_datas: Vec<Arc<Dataset>>,
    valid_metrics: Vec<Vec<Box<dyn Metric>>>,
    boosting: Option<GBDT>,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("task", &self.config.task)
            .field("num_valid", &self.valid_datas.len())
            .field("boosting", &self.boosting)
            .finish()
    }
}

impl Application {
    pub fn new(config: Config, network: Arc<dyn Network>) -> Result<Self> {
        if config.data.is_empty() && config.task != TaskType::ConvertModel {
            return Err(LightGBMError::config("No training/prediction data, application quit"));
        }
        set_num_threads(config.num_threads);
        Ok(Application {
            config,
            network,
            train_data: None,
            train_metrics: Vec::new(),
            valid_datas: Vec::new(),
            valid_metrics: Vec::new(),
            boosting: None,
        })
    }

    /// Application for command-line style arguments
    pub fn from_args<I, S>(args: I, network: Arc<dyn Network>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(load_parameters(args)?, network)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The boosting engine after training
    pub fn boosting(&self) -> Option<&GBDT> {
        self.boosting.as_ref()
    }

    pub fn run(&mut self) -> Result<()> {
        match self.config.task {
            TaskType::Train => {
                self.init_train()?;
                self.train()
            }
            TaskType::Predict => self.predict(),
            TaskType::ConvertModel => self.convert_model(),
        }
    }

    /// Agree on seeds and feature fraction across machines.
    fn sync_distributed_params(&mut self) -> Result<()> {
        if self.config.num_machines <= 1 {
            return Ok(());
        }
        let network = &self.network;
        self.config.data_random_seed = network.global_sync_up_by_min_i32(self.config.data_random_seed)?;
        self.config.feature_fraction_seed = network.global_sync_up_by_min_i32(self.config.feature_fraction_seed)?;
        self.config.bagging_seed = network.global_sync_up_by_min_i32(self.config.bagging_seed)?;
        self.config.feature_fraction = network.global_sync_up_by_min_f64(self.config.feature_fraction)?;
        Ok(())
    }

    fn load_data(&mut self, warm_start: Option<&Predictor>) -> Result<()> {
        let start = Instant::now();
        let predict_fun = warm_start.map(Predictor::get_predict_function);
        let config = &self.config;
        let mut loader = DatasetLoader::new(
            config,
            predict_fun,
            config.num_tree_per_iteration(),
            &config.data,
            Arc::clone(&self.network),
        )?;
        let train_data = loader.load_from_file(&config.data, &config.initscore_filename)?;
        if config.is_save_binary_file {
            train_data.save_binary_file(None)?;
        }
        let train_data = Arc::new(train_data);
        if config.is_provide_training_metric {
            self.train_metrics = create_metrics(config, train_data.metadata(), train_data.num_data())?;
        }

        // validation data is useless without metrics to evaluate on it
        if !config.metric.is_empty() {
            for (i, valid) in config.valid.iter().enumerate() {
                let init_score = config.valid_init_score.get(i).map_or("", String::as_str);
                let valid_data = loader.load_from_file_align_with_other_dataset(valid, init_score, &train_data)?;
                if config.is_save_binary_file {
                    valid_data.save_binary_file(None)?;
                }
                self.valid_metrics
                    .push(create_metrics(config, valid_data.metadata(), valid_data.num_data())?);
                self.valid_datas.push(Arc::new(valid_data));
            }
        }
        self.train_data = Some(train_data);
        info!("Finished loading data in {:.6} seconds", start.elapsed().as_secs_f64());
        Ok(())
    }

    fn init_train(&mut self) -> Result<()> {
        self.sync_distributed_params()?;
        let mut boosting = create_boosting(self.config.boosting_type, None)?;

        let warm_start = if self.config.input_model.is_empty() {
            None
        } else {
            let loaded = create_boosting(self.config.boosting_type, Some(&self.config.input_model))?;
            if loaded.number_of_total_model() > 0 {
                info!("Continued training from {}", self.config.input_model);
                Some(Predictor::new(loaded, -1, true, false, false, false, 1, 0.0)?)
            } else {
                None
            }
        };
        self.load_data(warm_start.as_ref())?;

        let train_data = self
            .train_data
            .clone()
            .ok_or_else(|| LightGBMError::training("training data is not loaded"))?;
        let mut objective = create_objective(&self.config)?;
        objective.init(train_data.metadata(), train_data.num_data())?;
        boosting.init(
            &self.config,
            train_data,
            Some(objective),
            std::mem::take(&mut self.train_metrics),
        )?;
        let valid_metrics = std::mem::take(&mut self.valid_metrics);
        for (valid_data, metrics) in self.valid_datas.iter().zip(valid_metrics) {
            boosting.add_valid_dataset(Arc::clone(valid_data), metrics)?;
        }
        if let Some(predictor) = warm_start.as_ref() {
            boosting.merge_from(predictor.boosting());
        }
        self.boosting = Some(boosting);
        info!("Finished initializing training");
        Ok(())
    }

    fn train(&mut self) -> Result<()> {
        info!("Started training...");
        let boosting = self
            .boosting
            .as_mut()
            .ok_or_else(|| LightGBMError::training("boosting is not initialized"))?;
        boosting.train(self.config.snapshot_freq, &self.config.output_model)?;
        if self.config.convert_model_language == "cpp" {
            boosting.save_model_to_if_else(-1, &self.config.convert_model)?;
        }
        info!("Finished training");
        Ok(())
    }

    fn predict(&mut self) -> Result<()> {
        let config = &self.config;
        let boosting = create_boosting(config.boosting_type, Some(&config.input_model))?;
        let predictor = Predictor::new(
            boosting,
            config.num_iteration_predict,
            config.predict_raw_score,
            config.predict_leaf_index,
            config.predict_contrib,
            config.pred_early_stop,
            config.pred_early_stop_freq,
            config.pred_early_stop_margin,
        )?;
        predictor.predict(&config.data, &config.output_result, config.has_header)?;
        info!("Finished prediction");
        Ok(())
    }

    fn convert_model(&mut self) -> Result<()> {
        let boosting = create_boosting(self.config.boosting_type, Some(&self.config.input_model))?;
        boosting.save_model_to_if_else(-1, &self.config.convert_model)?;
        info!("Finished converting model to {}", self.config.convert_model);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::network::LocalNetwork;

    #[test]
    fn test_missing_data_is_fatal() {
        let config = Config::default();
        assert!(Application::new(config, Arc::new(LocalNetwork)).is_err());
        let convert = Config { task: TaskType::ConvertModel, ..Config::default() };
        assert!(Application::new(convert, Arc::new(LocalNetwork)).is_ok());
    }

    #[test]
    fn test_arguments_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.conf");
        std::fs::write(&path, "num_trees = 7\nlearning_rate = 0.3 # comment\n").unwrap();
        let config = load_parameters([
            format!("config={}", path.display()),
            "eta=0.05".to_string(),
        ])
        .unwrap();
        assert_eq!(config.num_iterations, 7);
        assert_eq!(config.learning_rate, 0.05);
    }

    #[test]
    fn test_train_predict_and_convert() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("train.csv");
        let mut text = String::new();
        for i in 0..60 {
            let label = if i % 3 == 0 { 1 } else { 0 };
            text.push_str(&format!("{},{},{}\n", label, i % 3, i % 7));
        }
        std::fs::write(&data, text).unwrap();
        let model = dir.path().join("model.txt");
        let result = dir.path().join("pred.txt");
        let code = dir.path().join("model.cpp");
        let network: Arc<dyn Network> = Arc::new(LocalNetwork);

        let mut train = Application::from_args(
            [
                format!("data={}", data.display()),
                "objective=binary".to_string(),
                "num_iterations=5".to_string(),
                "min_data_in_leaf=5".to_string(),
                "min_data_in_bin=1".to_string(),
                "metric=binary_logloss".to_string(),
                format!("output_model={}", model.display()),
            ],
            Arc::clone(&network),
        )
        .unwrap();
        train.run().unwrap();
        assert!(std::fs::read_to_string(&model).unwrap().starts_with("tree\n"));

        let mut predict = Application::from_args(
            [
                "task=predict".to_string(),
                format!("data={}", data.display()),
                format!("input_model={}", model.display()),
                format!("output_result={}", result.display()),
            ],
            Arc::clone(&network),
        )
        .unwrap();
        predict.run().unwrap();
        let lines: Vec<f64> = std::fs::read_to_string(&result)
            .unwrap()
            .lines()
            .map(|l| l.parse().unwrap())
            .collect();
        assert_eq!(lines.len(), 60);
        assert!(lines[0] > lines[1]);

        let mut convert = Application::from_args(
            [
                "task=convert_model".to_string(),
                format!("input_model={}", model.display()),
                format!("convert_model={}", code.display()),
            ],
            network,
        )
        .unwrap();
        convert.run().unwrap();
        assert!(std::fs::read_to_string(&code).unwrap().contains("namespace LightGBM"));
    }
}
