use crate::config::EffectiveAiConfig;
use crate::gcloud::{ToolRunner, HELP_TIMEOUT_SECS};
use crate::index::IndexRecord;
use crate::llm::CommandGenerator;
use crate::prompt::PreviousAttempt;
use crate::validate;
use log::{debug, warn};
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct RefineOptions {
    pub max_attempts: u32,
    pub help_timeout: Duration,
}

impl Default for RefineOptions {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            help_timeout: Duration::from_secs(HELP_TIMEOUT_SECS),
        }
    }
}

/// Result of the refinement loop. `validated` is true only when the final
/// command passed a help probe; a false value always comes with a note.
#[derive(Debug, Clone)]
pub struct RefineOutcome {
    pub command: String,
    pub validated: bool,
    pub attempts: u32,
    pub note: Option<String>,
}

enum Verdict {
    Valid,
    Rejected { description: String, unknown: usize },
    OffPath { description: String },
    Unavailable { reason: String },
}

/// Validates the rendered draft and, while attempts remain, feeds each
/// failure back to the generator for a corrected command. Every attempt costs
/// one help probe; generation failures and unavailable probes consume the
/// budget like any other failure. The returned command always sits on the
/// chosen index path, never on one invented by the generator.
pub fn refine(
    generator: &dyn CommandGenerator,
    runner: &dyn ToolRunner,
    ai: Option<&EffectiveAiConfig>,
    request: &str,
    record: &IndexRecord,
    rendered: &str,
    options: &RefineOptions,
) -> RefineOutcome {
    let budget = options.max_attempts.max(1);
    let mut current = rendered.to_string();
    let mut previous: Option<PreviousAttempt> = None;
    // On-path commands that failed, with their unknown-flag counts. Off-path
    // replies are never recorded here, so the fallback cannot leak one.
    let mut tried: Vec<(String, usize)> = Vec::new();
    let mut last_unavailable: Option<String> = None;
    let mut no_generator = false;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        debug!("validation attempt {}/{}: {}", attempts, budget, current);

        let mut regenerate = true;
        match check(runner, record, &current, options.help_timeout) {
            Verdict::Valid => {
                return RefineOutcome {
                    command: current,
                    validated: true,
                    attempts,
                    note: None,
                };
            }
            Verdict::Rejected {
                description,
                unknown,
            } => {
                tried.push((current.clone(), unknown));
                previous = Some(PreviousAttempt {
                    command: current.clone(),
                    error: description,
                });
            }
            Verdict::OffPath { description } => {
                previous = Some(PreviousAttempt {
                    command: current.clone(),
                    error: description,
                });
            }
            Verdict::Unavailable { reason } => {
                // The probe said nothing about the command itself; retry it
                // instead of regenerating.
                tried.push((current.clone(), usize::MAX));
                last_unavailable = Some(reason);
                regenerate = false;
            }
        }

        if attempts >= budget {
            break;
        }

        if regenerate {
            let Some(ai) = ai else {
                no_generator = true;
                break;
            };
            match generator.generate(ai, request, record, rendered, previous.as_ref()) {
                Ok(reply) => {
                    debug!("generator proposed: {}", reply);
                    current = reply;
                }
                Err(err) => {
                    warn!("command generation failed: {:#}", err);
                }
            }
        }
    }

    // Prefer the attempt with the fewest unknown flags, earliest first.
    // Unavailable probes carry no count and sort last.
    let (command, unknown) = tried
        .iter()
        .min_by_key(|(_, unknown)| *unknown)
        .map(|(command, unknown)| (command.clone(), *unknown))
        .unwrap_or_else(|| (rendered.to_string(), usize::MAX));

    let note = if no_generator {
        Some("no AI generator configured; the draft could not be refined".to_string())
    } else if unknown == usize::MAX {
        Some(format!(
            "validation unavailable: {}",
            last_unavailable.unwrap_or_else(|| "help probe failed".to_string())
        ))
    } else {
        Some(format!("still failing validation after {} attempts", attempts))
    };

    RefineOutcome {
        command,
        validated: false,
        attempts,
        note,
    }
}

fn check(
    runner: &dyn ToolRunner,
    record: &IndexRecord,
    command: &str,
    help_timeout: Duration,
) -> Verdict {
    match validate::index_path_of(command) {
        Some(path) if path == record.path => {}
        _ => {
            return Verdict::OffPath {
                description: format!(
                    "the command path changed; it must stay exactly '{}'",
                    pinned_command_path(record)
                ),
            }
        }
    }

    match validate::validate(runner, command, help_timeout) {
        Ok(result) if result.valid => Verdict::Valid,
        Ok(result) => Verdict::Rejected {
            description: format!(
                "not accepted by '{} --help': {}",
                pinned_command_path(record),
                result.unknown_flags.join(", ")
            ),
            unknown: result.unknown_flags.len(),
        },
        Err(err) => Verdict::Unavailable { reason: err.reason },
    }
}

fn pinned_command_path(record: &IndexRecord) -> String {
    match record.release.prefix() {
        Some(prefix) => format!("gcloud {} {}", prefix, record.path_string()),
        None => format!("gcloud {}", record.path_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolCallError;
    use crate::synonyms::SynonymTables;
    use crate::validate::tests::{HelpRunner, DESCRIBE_HELP};
    use anyhow::{anyhow, Result};
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    const DRAFT: &str = "gcloud run services describe <SERVICE> --region=<REGION> --project=<PROJECT_ID> --format=json";

    fn describe_record() -> IndexRecord {
        let tree = crate::tree::tests::fixture_loaded_tree();
        let index = crate::index::build(&tree, &SynonymTables::builtin());
        index
            .records
            .iter()
            .find(|r| r.path_string() == "run services describe")
            .expect("fixture index must contain run services describe")
            .clone()
    }

    fn openai_config() -> EffectiveAiConfig {
        EffectiveAiConfig::OpenAI {
            api_key: "test-key".to_string(),
            base_url: "http://localhost:9".to_string(),
            model: "test-model".to_string(),
        }
    }

    fn options(max_attempts: u32) -> RefineOptions {
        RefineOptions {
            max_attempts,
            help_timeout: Duration::from_secs(5),
        }
    }

    /// Replays a fixed list of replies; `None` entries simulate transport
    /// failures. Records the validation errors it was shown.
    struct ScriptedGenerator {
        replies: RefCell<VecDeque<Option<String>>>,
        calls: Cell<u32>,
        errors_seen: RefCell<Vec<String>>,
    }

    impl ScriptedGenerator {
        fn new(replies: Vec<Option<&str>>) -> Self {
            Self {
                replies: RefCell::new(
                    replies.into_iter().map(|r| r.map(String::from)).collect(),
                ),
                calls: Cell::new(0),
                errors_seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl CommandGenerator for ScriptedGenerator {
        fn generate(
            &self,
            _ai: &EffectiveAiConfig,
            _request: &str,
            _record: &IndexRecord,
            _rendered: &str,
            previous: Option<&PreviousAttempt>,
        ) -> Result<String> {
            self.calls.set(self.calls.get() + 1);
            if let Some(previous) = previous {
                self.errors_seen.borrow_mut().push(previous.error.clone());
            }
            match self.replies.borrow_mut().pop_front() {
                Some(Some(reply)) => Ok(reply),
                _ => Err(anyhow!("connection refused")),
            }
        }
    }

    struct DownRunner;

    impl ToolRunner for DownRunner {
        fn run(&self, args: &[&str], _timeout: Duration) -> Result<String, ToolCallError> {
            Err(ToolCallError::Timeout {
                argv: args.join(" "),
                timeout_secs: 5,
            })
        }
    }

    #[test]
    fn valid_draft_passes_on_the_first_attempt() {
        let record = describe_record();
        let runner = HelpRunner {
            help: DESCRIBE_HELP.to_string(),
        };
        let generator = ScriptedGenerator::new(vec![]);
        let ai = openai_config();

        let outcome = refine(
            &generator,
            &runner,
            Some(&ai),
            "describe my service",
            &record,
            DRAFT,
            &options(3),
        );

        assert!(outcome.validated);
        assert_eq!(outcome.command, DRAFT);
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.note.is_none());
        assert_eq!(generator.calls.get(), 0);
    }

    #[test]
    fn attempt_bound_holds_when_the_generator_keeps_failing() {
        let record = describe_record();
        let runner = HelpRunner {
            help: DESCRIBE_HELP.to_string(),
        };
        let bad_draft =
            "gcloud run services describe <SERVICE> --region=<REGION> --frobnicate";
        let generator = ScriptedGenerator::new(vec![None, None]);
        let ai = openai_config();

        let outcome = refine(
            &generator,
            &runner,
            Some(&ai),
            "describe my service",
            &record,
            bad_draft,
            &options(3),
        );

        assert!(!outcome.validated);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.command, bad_draft);
        assert!(outcome.note.is_some());
        assert_eq!(generator.calls.get(), 2);
    }

    #[test]
    fn a_corrected_reply_is_validated_and_accepted() {
        let record = describe_record();
        let runner = HelpRunner {
            help: DESCRIBE_HELP.to_string(),
        };
        let bad_draft =
            "gcloud run services describe <SERVICE> --region=<REGION> --frobnicate";
        let fixed = "gcloud run services describe <SERVICE> --region=<REGION> --async";
        let generator = ScriptedGenerator::new(vec![Some(fixed)]);
        let ai = openai_config();

        let outcome = refine(
            &generator,
            &runner,
            Some(&ai),
            "describe my service",
            &record,
            bad_draft,
            &options(3),
        );

        assert!(outcome.validated);
        assert_eq!(outcome.command, fixed);
        assert_eq!(outcome.attempts, 2);
        let errors = generator.errors_seen.borrow();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("--frobnicate"));
    }

    #[test]
    fn replies_that_leave_the_command_path_never_escape() {
        let record = describe_record();
        let runner = HelpRunner {
            help: DESCRIBE_HELP.to_string(),
        };
        let bad_draft =
            "gcloud run services describe <SERVICE> --region=<REGION> --frobnicate";
        let drifted = "gcloud compute instances delete <INSTANCE>";
        let generator = ScriptedGenerator::new(vec![Some(drifted), Some(drifted)]);
        let ai = openai_config();

        let outcome = refine(
            &generator,
            &runner,
            Some(&ai),
            "describe my service",
            &record,
            bad_draft,
            &options(3),
        );

        assert!(!outcome.validated);
        assert_eq!(outcome.command, bad_draft);
        let errors = generator.errors_seen.borrow();
        assert!(errors
            .last()
            .map(|e| e.contains("run services describe"))
            .unwrap_or(false));
    }

    #[test]
    fn degrades_after_one_attempt_without_a_generator() {
        let record = describe_record();
        let runner = HelpRunner {
            help: DESCRIBE_HELP.to_string(),
        };
        let bad_draft =
            "gcloud run services describe <SERVICE> --region=<REGION> --frobnicate";
        let generator = ScriptedGenerator::new(vec![]);

        let outcome = refine(
            &generator,
            &runner,
            None,
            "describe my service",
            &record,
            bad_draft,
            &options(3),
        );

        assert!(!outcome.validated);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.command, bad_draft);
        assert!(outcome.note.unwrap().contains("no AI generator configured"));
        assert_eq!(generator.calls.get(), 0);
    }

    #[test]
    fn fallback_picks_the_attempt_with_fewest_unknown_flags() {
        let record = describe_record();
        let runner = HelpRunner {
            help: DESCRIBE_HELP.to_string(),
        };
        let bad_draft =
            "gcloud run services describe <SERVICE> --region=<REGION> --frobnicate --bazzle";
        let closer = "gcloud run services describe <SERVICE> --region=<REGION> --frobnicate";
        let generator = ScriptedGenerator::new(vec![Some(closer), Some(bad_draft)]);
        let ai = openai_config();

        let outcome = refine(
            &generator,
            &runner,
            Some(&ai),
            "describe my service",
            &record,
            bad_draft,
            &options(3),
        );

        assert!(!outcome.validated);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.command, closer);
    }

    #[test]
    fn unavailable_probes_consume_the_budget_without_regenerating() {
        let record = describe_record();
        let generator = ScriptedGenerator::new(vec![]);
        let ai = openai_config();

        let outcome = refine(
            &generator,
            &DownRunner,
            Some(&ai),
            "describe my service",
            &record,
            DRAFT,
            &options(2),
        );

        assert!(!outcome.validated);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.command, DRAFT);
        assert!(outcome.note.unwrap().contains("validation unavailable"));
        assert_eq!(generator.calls.get(), 0);
    }
}
