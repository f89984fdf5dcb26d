use clap::Parser;

/// Command-line interface definition for gcmd.
#[derive(Parser, Debug, Clone)]
#[command(name = "gcmd")]
#[command(version)]
#[command(
    about = "Tell it what you want from Google Cloud; it answers with one gcloud command",
    long_about = None
)]
pub struct Cli {
    /// Initialize the default config file with placeholder values
    #[arg(long)]
    pub init: bool,

    /// Re-export the gcloud CLI tree and rebuild the command index
    #[arg(long)]
    pub reindex: bool,

    /// Number of ranked candidates to return
    #[arg(long, value_name = "N")]
    pub topk: Option<usize>,

    /// Print why the command was chosen
    #[arg(long)]
    pub explain: bool,

    /// Check the suggestion against `gcloud ... --help` and refine it on failure
    #[arg(long)]
    pub validate: bool,

    /// Emit the result as JSON instead of the human layout
    #[arg(long)]
    pub json: bool,

    /// Upper bound on validate-and-refine attempts
    #[arg(long, value_name = "N")]
    pub max_attempts: Option<u32>,

    /// Minimum normalized score a candidate must reach
    #[arg(long, value_name = "X")]
    pub min_score: Option<f64>,

    /// Natural language description of the gcloud operation you want
    #[arg(required_unless_present_any = ["init", "reindex"])]
    pub prompt: Option<String>,
}
