use crate::index::IndexRecord;
use crate::tree::FlagSpec;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

lazy_static! {
    /// Zone names look like europe-west1-b: region plus a one-letter suffix.
    static ref ZONE_RE: Regex = Regex::new(r"\b[a-z]+-[a-z]+\d+-[a-z]\b").unwrap();
    /// Region names look like europe-west1. Inside a zone name this pattern
    /// also matches the region prefix, so zone spans are excluded first.
    static ref REGION_RE: Regex = Regex::new(r"\b[a-z]+-[a-z]+\d+\b").unwrap();
}

/// Location literals confidently recognized in the prompt. A zone never
/// doubles as a region; deriving the region would be inference, and
/// placeholders are the contract for anything not stated.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PromptLiterals {
    pub zone: Option<String>,
    pub region: Option<String>,
}

pub fn extract_literals(prompt: &str) -> PromptLiterals {
    let lowered = prompt.to_lowercase();

    let zone_spans: Vec<(usize, usize)> = ZONE_RE
        .find_iter(&lowered)
        .map(|m| (m.start(), m.end()))
        .collect();
    let zone = zone_spans
        .first()
        .map(|&(start, end)| lowered[start..end].to_string());

    let region = REGION_RE
        .find_iter(&lowered)
        .find(|m| {
            !zone_spans
                .iter()
                .any(|&(start, end)| m.start() >= start && m.end() <= end)
        })
        .map(|m| m.as_str().to_string());

    PromptLiterals { zone, region }
}

const MAX_POSITIONALS: usize = 2;

/// Flags worth suggesting whenever the command accepts them, in this order.
const PREFERRED_FLAGS: &[&str] = &["--region", "--zone", "--location"];

/// Renders one record into a complete command line. Identifier values are
/// uppercase placeholders; only recognized zone/region literals from the
/// prompt are filled in. Pure function of record and prompt.
pub fn render(record: &IndexRecord, prompt: &str) -> String {
    let literals = extract_literals(prompt);

    let mut parts: Vec<String> = vec!["gcloud".to_string()];
    if let Some(prefix) = record.release.prefix() {
        parts.push(prefix.to_string());
    }
    parts.extend(record.path.iter().cloned());

    // A couple of positionals are enough to show the shape.
    for positional in record.positionals.iter().take(MAX_POSITIONALS) {
        parts.push(format!("<{}>", positional));
    }

    let mut emitted: HashSet<&str> = HashSet::new();

    for flag in record.flags.iter().filter(|f| f.required) {
        parts.push(render_flag(flag, &literals));
        emitted.insert(flag.name.as_str());
    }

    for name in PREFERRED_FLAGS {
        if emitted.contains(name) {
            continue;
        }
        if let Some(flag) = record.flag(name) {
            parts.push(render_flag(flag, &literals));
            emitted.insert(flag.name.as_str());
        }
    }

    // gcloud-wide flags, accepted everywhere.
    if !emitted.contains("--project") {
        parts.push("--project=<PROJECT_ID>".to_string());
    }
    if !emitted.contains("--format") {
        parts.push("--format=json".to_string());
    }

    parts.join(" ")
}

fn render_flag(flag: &FlagSpec, literals: &PromptLiterals) -> String {
    if !flag.takes_value {
        return flag.name.clone();
    }

    let literal = match flag.name.as_str() {
        "--zone" => literals.zone.as_deref(),
        "--region" => literals.region.as_deref(),
        // A regional service's location is the region string verbatim.
        "--location" => literals.region.as_deref(),
        _ => None,
    };

    match literal {
        Some(value) => format!("{}={}", flag.name, value),
        None => format!("{}={}", flag.name, placeholder_for(&flag.name)),
    }
}

/// `--project` becomes `<PROJECT_ID>`; any other flag name is uppercased,
/// `--foo-bar` -> `<FOO_BAR>`.
pub fn placeholder_for(flag_name: &str) -> String {
    if flag_name == "--project" {
        return "<PROJECT_ID>".to_string();
    }
    let body = flag_name
        .trim_start_matches('-')
        .to_uppercase()
        .replace('-', "_");
    format!("<{}>", body)
}
