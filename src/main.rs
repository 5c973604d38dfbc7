use anyhow::Context;
use lightgbm_engine::application::Application;
use lightgbm_engine::core::network::LocalNetwork;
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    lightgbm_engine::init_logging();
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("usage: lightgbm config=<file> [key=value ...]");
        std::process::exit(1);
    }
    let mut app = Application::from_args(&args, Arc::new(LocalNetwork)).context("failed to set up the application")?;
    let task = app.config().task;
    app.run().with_context(|| format!("task {} failed", task))?;
    Ok(())
}
