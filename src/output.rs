use crate::rank::RankedCandidate;
use anyhow::Result;
use serde::Serialize;

/// A runner-up command shown under `# Alternatives`.
#[derive(Debug, Clone)]
pub struct Alternative {
    pub command: String,
    pub score: f64,
}

/// Everything one run produced, in printing order. `note` explains an
/// unvalidated result and goes to stderr, never into the command output.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub command: String,
    pub alternatives: Vec<Alternative>,
    pub explanation: String,
    pub validated: bool,
    pub note: Option<String>,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    command: &'a str,
    variants: Vec<&'a str>,
    explanation: &'a str,
    validated: bool,
}

/// Ranking rationale for the picked candidate, one fact per line.
pub fn build_explanation(candidate: &RankedCandidate) -> String {
    let record = candidate.record;
    let mut lines = Vec::new();

    let mut picked = String::from("gcloud ");
    if let Some(prefix) = record.release.prefix() {
        picked.push_str(prefix);
        picked.push(' ');
    }
    picked.push_str(&record.path_string());
    lines.push(format!(
        "Picked: {} (release: {})",
        picked,
        record.release.name()
    ));

    if !record.help.is_empty() {
        lines.push(format!("About: {}", record.help));
    }
    if !record.positionals.is_empty() {
        lines.push(format!("Positionals: {}", record.positionals.join(", ")));
    }

    let useful: Vec<&str> = record
        .flags
        .iter()
        .map(|f| f.name.as_str())
        .filter(|name| {
            matches!(
                *name,
                "--region" | "--zone" | "--location" | "--project" | "--format"
            )
        })
        .collect();
    if !useful.is_empty() {
        lines.push(format!("Useful flags: {}", useful.join(", ")));
    }

    lines.push(format!("Matched: {}", candidate.match_summary()));
    lines.join("\n")
}

/// The stdout text for a run: primary command first, then the optional
/// alternatives and explanation sections.
pub fn human_text(outcome: &GenerationOutcome, explain: bool) -> String {
    let mut text = outcome.command.clone();

    if !outcome.alternatives.is_empty() {
        text.push_str("\n\n# Alternatives");
        for alt in &outcome.alternatives {
            text.push_str(&format!("\n- {}    # score={:.3}", alt.command, alt.score));
        }
    }

    if explain {
        text.push_str("\n\n# Explanation\n");
        text.push_str(&outcome.explanation);
    }

    text
}

pub fn json_text(outcome: &GenerationOutcome) -> Result<String> {
    let report = JsonReport {
        command: &outcome.command,
        variants: outcome
            .alternatives
            .iter()
            .map(|a| a.command.as_str())
            .collect(),
        explanation: &outcome.explanation,
        validated: outcome.validated,
    };
    Ok(serde_json::to_string_pretty(&report)?)
}
