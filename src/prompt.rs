use crate::index::IndexRecord;
use crate::validate::GCLOUD_WIDE_FLAGS;

/// A failed attempt and its validation error, fed back into the next
/// generation round.
#[derive(Debug, Clone)]
pub struct PreviousAttempt {
    pub command: String,
    pub error: String,
}

pub fn build_system_prompt() -> String {
    "You are an expert in Google Cloud Platform and the gcloud CLI. \
Generate exactly one syntactically correct gcloud command for the user's request.\n\
\n\
CRITICAL RULES:\n\
1. Output ONLY the gcloud command, nothing else\n\
2. Keep the given command path exactly as provided; never invent groups or subcommands\n\
3. Use only flags from the accepted flag list\n\
4. Use uppercase angle-bracket placeholders for values you do not know, \
e.g. <PROJECT_ID>, <SERVICE>, <REGION>\n\
5. Do NOT add explanations, markdown, or code blocks"
        .to_string()
}

/// Assembles the user message: the request, the authoritative command shape
/// from the index, and the previous failure when refining.
pub fn build_user_prompt(
    request: &str,
    record: &IndexRecord,
    rendered: &str,
    previous: Option<&PreviousAttempt>,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    parts.push(format!("Request:\n{}", request.trim()));

    let mut command_line = String::from("gcloud");
    if let Some(prefix) = record.release.prefix() {
        command_line.push(' ');
        command_line.push_str(prefix);
    }
    command_line.push(' ');
    command_line.push_str(&record.path_string());
    parts.push(format!("Command path (do not change):\n{}", command_line));

    if !record.positionals.is_empty() {
        parts.push(format!("Positionals: {}", record.positionals.join(", ")));
    }

    let mut flags_listing = String::from("Accepted flags for this command:\n");
    for flag in &record.flags {
        flags_listing.push_str(&format!("- {}\n", flag.name));
    }
    flags_listing.push_str(&format!(
        "Plus the gcloud-wide flags: {}",
        GCLOUD_WIDE_FLAGS.join(", ")
    ));
    parts.push(flags_listing);

    parts.push(format!("Current draft:\n{}", rendered));

    if let Some(attempt) = previous {
        parts.push(format!(
            "PREVIOUS ATTEMPT FAILED.\nCommand:\n{}\nValidation error:\n{}\n\
Correct the command and try again.",
            attempt.command, attempt.error
        ));
    }

    parts.join("\n\n").trim().to_string()
}
