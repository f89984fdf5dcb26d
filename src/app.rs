use crate::cli::Cli;
use crate::config::{self, find_global_config_path, load_global_config, resolve_ai_config};
use crate::error::EnvironmentError;
use crate::gcloud::{GcloudCli, ToolRunner, HELP_TIMEOUT_SECS};
use crate::history::{self, GenerationRecord};
use crate::index;
use crate::llm::{CommandGenerator, HttpCommandGenerator};
use crate::ops;
use crate::output::{self, Alternative, GenerationOutcome};
use crate::rank::{self, RankOptions, DEFAULT_MIN_SCORE, DEFAULT_TOP_K};
use crate::refine::{self, RefineOptions, DEFAULT_MAX_ATTEMPTS};
use crate::render;
use crate::synonyms::SynonymTables;
use crate::tree;
use anyhow::Result;
use clap::Parser;
use log::debug;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub exit_code: i32,
    pub generated_command: Option<String>,
    pub score: Option<f64>,
    pub validated: bool,
    pub attempts: u32,
    pub notes: Option<String>,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let generator = HttpCommandGenerator::new()?;
    let exit_code = run_and_log(cli, &generator, || Ok(GcloudCli::locate()?));
    std::process::exit(exit_code);
}

fn run_and_log<G, R, F>(cli: Cli, generator: &G, locate_runner: F) -> i32
where
    G: CommandGenerator,
    R: ToolRunner,
    F: FnOnce() -> Result<R>,
{
    let argv: Vec<String> = env::args().collect();

    let mut summary = RunSummary::default();
    let exit_code = match run_core(&cli, generator, locate_runner) {
        Ok(res) => {
            summary = res;
            summary.exit_code
        }
        Err(err) => {
            eprintln!("Error: {:#}", err);
            summary.notes = Some(err.to_string());
            exit_code_for(&err)
        }
    };

    let record = GenerationRecord {
        ts: history::now_iso_ts(),
        argv,
        prompt: cli.prompt.clone(),
        generated_command: summary.generated_command.clone(),
        score: summary.score,
        validated: summary.validated,
        attempts: summary.attempts,
        exit_code,
        notes: summary.notes,
    };
    if let Err(err) = history::write_record(&record) {
        eprintln!("Warning: failed to write history: {:#}", err);
    }

    exit_code
}

/// Missing gcloud and an unparseable CLI tree are environment failures, not
/// usage errors; they exit 2.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<EnvironmentError>().is_some() {
        2
    } else {
        1
    }
}

fn run_core<G, R, F>(cli: &Cli, generator: &G, locate_runner: F) -> Result<RunSummary>
where
    G: CommandGenerator,
    R: ToolRunner,
    F: FnOnce() -> Result<R>,
{
    let global_config_path = find_global_config_path();

    if cli.init {
        ops::init_global_config(&global_config_path)?;
        return Ok(RunSummary {
            notes: Some("init".to_string()),
            ..RunSummary::default()
        });
    }

    let global_cfg = load_global_config(&global_config_path)?;
    let defaults = global_cfg.defaults.clone().unwrap_or_default();

    let runner = locate_runner()?;
    let cache_dir = config::gcmd_cache_dir();
    let tree = tree::load(&runner, &cache_dir, cli.reindex)?;
    let synonyms = SynonymTables::builtin();
    let index = index::obtain(&tree, &synonyms, &cache_dir, cli.reindex)?;

    let Some(prompt) = cli.prompt.as_deref() else {
        println!(
            "Re-indexed {} gcloud commands ({}).",
            index.records.len(),
            index.tool_version
        );
        return Ok(RunSummary {
            notes: Some("reindex".to_string()),
            ..RunSummary::default()
        });
    };

    let options = RankOptions {
        top_k: cli.topk.or(defaults.top_k).unwrap_or(DEFAULT_TOP_K).max(1),
        min_score: cli
            .min_score
            .or(defaults.min_score)
            .unwrap_or(DEFAULT_MIN_SCORE),
        ..RankOptions::default()
    };

    let ranked = rank::rank(&index, prompt, &synonyms, &options);
    debug!("{} candidates at or above the threshold", ranked.len());

    let Some(primary) = ranked.first() else {
        eprintln!(
            "No confident match for '{}'. Nothing was generated; try rephrasing or lowering --min-score.",
            prompt
        );
        return Ok(RunSummary {
            notes: Some("no confident match".to_string()),
            ..RunSummary::default()
        });
    };

    let rendered = render::render(primary.record, prompt);
    let alternatives: Vec<Alternative> = ranked[1..]
        .iter()
        .map(|candidate| Alternative {
            command: render::render(candidate.record, prompt),
            score: candidate.score,
        })
        .collect();
    let explanation = output::build_explanation(primary);

    let (command, validated, attempts, note) = if cli.validate {
        let ai = resolve_ai_config(global_cfg.ai.clone())?;
        let refine_options = RefineOptions {
            max_attempts: cli
                .max_attempts
                .or(defaults.max_attempts)
                .unwrap_or(DEFAULT_MAX_ATTEMPTS),
            help_timeout: Duration::from_secs(
                defaults.help_timeout_secs.unwrap_or(HELP_TIMEOUT_SECS),
            ),
        };
        let outcome = refine::refine(
            generator,
            &runner,
            ai.as_ref(),
            prompt,
            primary.record,
            &rendered,
            &refine_options,
        );
        (
            outcome.command,
            outcome.validated,
            outcome.attempts,
            outcome.note,
        )
    } else {
        (rendered, false, 0, None)
    };

    let outcome = GenerationOutcome {
        command,
        alternatives,
        explanation,
        validated,
        note,
    };

    if cli.json {
        println!("{}", output::json_text(&outcome)?);
    } else {
        println!("{}", output::human_text(&outcome, cli.explain));
    }
    if let Some(note) = &outcome.note {
        eprintln!("not validated: {}", note);
    }

    Ok(RunSummary {
        exit_code: 0,
        generated_command: Some(outcome.command.clone()),
        score: Some(primary.score),
        validated: outcome.validated,
        attempts,
        notes: outcome.note,
    })
}
