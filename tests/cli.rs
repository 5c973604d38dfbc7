//! Command-line style runs through `Application`.

mod common;

use common::*;
use lightgbm_engine::application::Application;
use lightgbm_engine::core::network::{LocalNetwork, Network};
use std::path::Path;
use std::sync::Arc;

fn run(args: Vec<String>) {
    let network: Arc<dyn Network> = Arc::new(LocalNetwork);
    Application::from_args(args, network).unwrap().run().unwrap();
}

fn count_trees(model: &Path) -> usize {
    std::fs::read_to_string(model)
        .unwrap()
        .lines()
        .filter(|l| l.starts_with("Tree="))
        .count()
}

#[test]
fn continued_training_appends_to_input_model() {
    let dir = tempfile::tempdir().unwrap();
    let (features, labels) = regression_data(300, 4, 11);
    let data = write_csv(dir.path(), "train.csv", &features, &labels, false);
    let first = dir.path().join("first.txt");
    let second = dir.path().join("second.txt");

    let base = |iterations: usize, output: &Path| {
        vec![
            format!("data={}", data.display()),
            "objective=regression".to_string(),
            format!("num_iterations={}", iterations),
            "min_data_in_leaf=10".to_string(),
            format!("output_model={}", output.display()),
        ]
    };

    run(base(3, &first));
    assert_eq!(count_trees(&first), 3);

    let mut args = base(2, &second);
    args.push(format!("input_model={}", first.display()));
    run(args);
    assert_eq!(count_trees(&second), 5);

    // the loaded trees come first, unchanged
    let first_text = std::fs::read_to_string(&first).unwrap();
    let second_text = std::fs::read_to_string(&second).unwrap();
    let block = |text: &str, i: usize| -> String {
        let start = text.find(&format!("Tree={}\n", i)).unwrap();
        let rest = &text[start..];
        let end = rest[1..].find("\nTree=").map_or(rest.len(), |e| e + 1);
        rest[..end].lines().filter(|l| !l.is_empty()).collect::<Vec<_>>().join("\n")
    };
    assert_eq!(block(&first_text, 0), block(&second_text, 0));
}

#[test]
fn config_file_drives_training() {
    let dir = tempfile::tempdir().unwrap();
    let (features, labels) = binary_data(200, 3, 5);
    let data = write_csv(dir.path(), "train.csv", &features, &labels, true);
    let model = dir.path().join("model.txt");
    let conf = dir.path().join("train.conf");
    std::fs::write(
        &conf,
        format!(
            "task = train\nobjective = binary\ndata = {}\nheader = true\nnum_trees = 4\noutput_model = {}\n",
            data.display(),
            model.display()
        ),
    )
    .unwrap();

    run(vec![format!("config={}", conf.display())]);
    assert_eq!(count_trees(&model), 4);
    let text = std::fs::read_to_string(&model).unwrap();
    assert!(text.contains("objective=binary"));
    assert!(text.contains("feature_names=f0 f1 f2"));
}
