use crate::gcloud::ToolRunner;
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;

/// Flags accepted by every gcloud command, regardless of what the per-command
/// help lists.
pub const GCLOUD_WIDE_FLAGS: &[&str] = &[
    "--account",
    "--billing-project",
    "--configuration",
    "--format",
    "--help",
    "--impersonate-service-account",
    "--project",
    "--quiet",
    "--verbosity",
];

lazy_static! {
    static ref FLAG_RE: Regex = Regex::new(r"--[a-z0-9][a-z0-9\-]*").unwrap();
}

/// Outcome of checking one rendered command against live help output.
/// `valid` is true only when every flag in the command is accounted for.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub valid: bool,
    pub unknown_flags: Vec<String>,
    pub raw_help: String,
}

/// The help probe itself failed, so nothing is known about the command
/// either way. Callers must report this as "unvalidated", never as valid.
#[derive(Debug, Clone, Error)]
#[error("validation unavailable: {reason}")]
pub struct ValidationUnavailable {
    pub reason: String,
}

/// Path tokens of a rendered command: everything after `gcloud` up to the
/// first flag or placeholder, including any beta/alpha prefix.
pub fn invocation_path(command: &str) -> Option<Vec<String>> {
    let tokens = shell_words::split(command).ok()?;
    let mut iter = tokens.into_iter();
    if iter.next()?.as_str() != "gcloud" {
        return None;
    }
    let path: Vec<String> = iter
        .take_while(|t| !t.starts_with('-') && !t.starts_with('<'))
        .collect();
    if path.is_empty() {
        None
    } else {
        Some(path)
    }
}

/// Same as `invocation_path` with the release prefix dropped, for comparing
/// against index paths.
pub fn index_path_of(command: &str) -> Option<Vec<String>> {
    let mut path = invocation_path(command)?;
    if matches!(path.first().map(String::as_str), Some("beta") | Some("alpha")) {
        path.remove(0);
    }
    if path.is_empty() {
        None
    } else {
        Some(path)
    }
}

/// Flag names used in a command, `=value` parts stripped, in order of first
/// appearance.
pub fn command_flags(command: &str) -> Vec<String> {
    let tokens = shell_words::split(command).unwrap_or_default();
    let mut flags = Vec::new();
    for token in tokens {
        if let Some(stripped) = token.strip_prefix("--") {
            let name = format!("--{}", stripped.split('=').next().unwrap_or(stripped));
            if !flags.contains(&name) {
                flags.push(name);
            }
        }
    }
    flags
}

/// Runs `gcloud <path> --help` and compares the command's flags against the
/// accepted set parsed from the help text. The action itself is never run.
pub fn validate(
    runner: &dyn ToolRunner,
    command: &str,
    help_timeout: Duration,
) -> Result<ValidationResult, ValidationUnavailable> {
    let path = invocation_path(command).ok_or_else(|| ValidationUnavailable {
        reason: format!("no command path could be parsed from '{}'", command),
    })?;

    let raw_help = runner
        .help_text(&path, help_timeout)
        .map_err(|err| ValidationUnavailable {
            reason: err.to_string(),
        })?;

    let accepted = accepted_flags(&raw_help);
    let mut unknown_flags: Vec<String> = command_flags(command)
        .into_iter()
        .filter(|flag| !accepted.contains(flag))
        .collect();
    unknown_flags.sort_unstable();
    unknown_flags.dedup();

    if !unknown_flags.is_empty() {
        debug!(
            "help for '{}' does not list: {}",
            path.join(" "),
            unknown_flags.join(", ")
        );
    }

    Ok(ValidationResult {
        valid: unknown_flags.is_empty(),
        unknown_flags,
        raw_help,
    })
}

/// Collects accepted flags from the help text: every `--flag` token inside
/// sections whose ALL-CAPS header mentions FLAGS or ARGUMENTS, falling back
/// to a whole-text scan when the help has no such sections, plus the
/// gcloud-wide set.
fn accepted_flags(help_text: &str) -> BTreeSet<String> {
    let mut accepted: BTreeSet<String> =
        GCLOUD_WIDE_FLAGS.iter().map(|f| f.to_string()).collect();

    let mut in_flag_section = false;
    let mut saw_flag_section = false;
    for line in help_text.lines() {
        if let Some(header) = section_header(line) {
            in_flag_section = header.contains("FLAGS") || header.contains("ARGUMENTS");
            saw_flag_section |= in_flag_section;
            continue;
        }
        if in_flag_section {
            for m in FLAG_RE.find_iter(line) {
                accepted.insert(m.as_str().to_string());
            }
        }
    }

    if !saw_flag_section {
        for m in FLAG_RE.find_iter(help_text) {
            accepted.insert(m.as_str().to_string());
        }
    }

    accepted
}

fn section_header(line: &str) -> Option<&str> {
    if line.starts_with(' ') || line.starts_with('\t') {
        return None;
    }
    let trimmed = line.trim();
    if trimmed.is_empty()
        || !trimmed
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_whitespace() || c == '_')
    {
        return None;
    }
    Some(trimmed)
}
