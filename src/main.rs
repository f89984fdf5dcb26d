mod app;
mod cli;
mod config;
mod error;
mod gcloud;
mod history;
mod index;
mod llm;
mod ops;
mod output;
mod prompt;
mod rank;
mod refine;
mod render;
mod synonyms;
mod tree;
mod validate;

use anyhow::Result;

fn main() -> Result<()> {
    env_logger::init();
    app::run()
}
