use crate::error::EnvironmentError;
use crate::gcloud::ToolRunner;
use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Release surface a command lives on. GA commands render without a prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseTrack {
    Ga,
    Beta,
    Alpha,
}

impl ReleaseTrack {
    fn from_raw(raw: Option<&str>) -> Self {
        match raw.map(str::to_ascii_uppercase).as_deref() {
            Some("ALPHA") => ReleaseTrack::Alpha,
            Some("BETA") => ReleaseTrack::Beta,
            _ => ReleaseTrack::Ga,
        }
    }

    /// Path prefix inserted after `gcloud`, if any.
    pub fn prefix(&self) -> Option<&'static str> {
        match self {
            ReleaseTrack::Ga => None,
            ReleaseTrack::Beta => Some("beta"),
            ReleaseTrack::Alpha => Some("alpha"),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ReleaseTrack::Ga => "ga",
            ReleaseTrack::Beta => "beta",
            ReleaseTrack::Alpha => "alpha",
        }
    }
}

/// What kind of value a flag accepts. `Choice` values come straight from the
/// CLI tree; identifiers are never guessed, they render as placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    Identifier,
    Choice(Vec<String>),
    FreeText,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagSpec {
    pub name: String,
    pub required: bool,
    pub takes_value: bool,
    pub value_kind: ValueKind,
}

/// One node of the parsed CLI tree. A node without children is a leaf, i.e.
/// an executable action.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandNode {
    pub path: Vec<String>,
    pub help: String,
    pub release: ReleaseTrack,
    pub flags: Vec<FlagSpec>,
    pub positionals: Vec<String>,
    pub children: Vec<CommandNode>,
}

impl CommandNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// The parsed tree plus the evidence it was built from. The raw bytes and the
/// live version line feed the index fingerprint.
#[derive(Debug)]
pub struct LoadedTree {
    pub root: CommandNode,
    pub source_path: PathBuf,
    pub raw_bytes: Vec<u8>,
    pub tool_version: String,
}

/// Serde model of the JSON written by `gcloud meta generate-cli-trees`.
/// Depending on the SDK vintage children sit under `groups`, `commands`, or
/// both, so both maps are read and merged.
#[derive(Debug, Deserialize)]
struct RawTree {
    #[serde(rename = "CLI_VERSION", default)]
    cli_version: Option<String>,
    #[serde(flatten)]
    root: RawNode,
}

#[derive(Debug, Deserialize)]
struct RawNode {
    #[serde(default)]
    groups: BTreeMap<String, RawNode>,
    #[serde(default)]
    commands: BTreeMap<String, RawNode>,
    #[serde(default)]
    flags: BTreeMap<String, RawFlag>,
    #[serde(default)]
    positionals: Vec<RawPositional>,
    #[serde(default)]
    release: Option<String>,
    #[serde(default)]
    capsule: Option<String>,
    #[serde(default)]
    is_hidden: bool,
}

#[derive(Debug, Deserialize)]
struct RawFlag {
    name: String,
    #[serde(default)]
    is_required: bool,
    #[serde(default)]
    is_global: bool,
    #[serde(default)]
    is_hidden: bool,
    #[serde(rename = "type", default)]
    value_type: Option<String>,
    #[serde(default)]
    choices: Vec<String>,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPositional {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    value: Option<String>,
}

/// Name of the root tree file, both in the SDK data directory and in our
/// cache after an export.
pub const TREE_FILE_NAME: &str = "gcloud.json";

/// Loads the CLI tree, exporting a fresh one into `cache_dir` when no usable
/// tree exists, the existing one is version-stale, or `force_export` is set.
pub fn load(runner: &dyn ToolRunner, cache_dir: &Path, force_export: bool) -> Result<LoadedTree> {
    let tool_version = runner.version_line().map_err(|err| {
        anyhow::Error::new(EnvironmentError::ToolNotFound)
            .context(format!("could not query gcloud version: {}", err))
    })?;

    if !force_export {
        for candidate in candidate_paths(runner, cache_dir) {
            if !candidate.is_file() {
                continue;
            }
            let loaded = read_tree(&candidate, &tool_version)?;
            match loaded {
                Some(tree) => return Ok(tree),
                None => {
                    debug!(
                        "tree at {} is stale for '{}', regenerating",
                        candidate.display(),
                        tool_version
                    );
                    break;
                }
            }
        }
    }

    fs::create_dir_all(cache_dir)
        .with_context(|| format!("Failed to create cache directory {}", cache_dir.display()))?;
    runner
        .export_tree(cache_dir)
        .map_err(|err| anyhow!("CLI tree export failed: {}", err))?;

    let exported = cache_dir.join(TREE_FILE_NAME);
    if !exported.is_file() {
        return Err(anyhow!(
            "gcloud reported success but no tree file appeared at {}",
            exported.display()
        ));
    }
    read_tree(&exported, &tool_version)?.ok_or_else(|| {
        anyhow!(
            "freshly exported tree at {} does not match gcloud version '{}'",
            exported.display(),
            tool_version
        )
    })
}

fn candidate_paths(runner: &dyn ToolRunner, cache_dir: &Path) -> Vec<PathBuf> {
    let mut candidates = vec![cache_dir.join(TREE_FILE_NAME)];
    match runner.sdk_root() {
        Ok(root) if !root.as_os_str().is_empty() => {
            candidates.push(root.join("data").join("cli").join(TREE_FILE_NAME));
        }
        Ok(_) => {}
        Err(err) => debug!("could not determine SDK root: {}", err),
    }
    candidates
}

/// Trailing token of the `--version` line; trees record the bare number
/// ("478.0.0") as CLI_VERSION, not the full "Google Cloud SDK 478.0.0" line.
fn version_stamp(version_line: &str) -> &str {
    version_line
        .split_whitespace()
        .last()
        .unwrap_or(version_line)
}

/// Parses one tree file. Returns Ok(None) when the file is readable but
/// recorded for a different gcloud version. Malformed JSON is fatal.
fn read_tree(path: &Path, tool_version: &str) -> Result<Option<LoadedTree>> {
    let raw_bytes = fs::read(path)
        .with_context(|| format!("Failed to read CLI tree {}", path.display()))?;

    let raw: RawTree =
        serde_json::from_slice(&raw_bytes).map_err(|err| EnvironmentError::TreeParse {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;

    match raw.cli_version.as_deref() {
        Some(recorded) if version_stamp(tool_version) != recorded => return Ok(None),
        Some(_) => {}
        None => warn!(
            "tree {} carries no CLI_VERSION stamp, accepting as-is",
            path.display()
        ),
    }

    let root = convert(Vec::new(), &raw.root, ReleaseTrack::Ga);
    debug!(
        "loaded CLI tree from {} ({} top-level children)",
        path.display(),
        root.children.len()
    );
    Ok(Some(LoadedTree {
        root,
        source_path: path.to_path_buf(),
        raw_bytes,
        tool_version: tool_version.to_string(),
    }))
}

fn convert(path: Vec<String>, raw: &RawNode, parent_release: ReleaseTrack) -> CommandNode {
    let release = raw
        .release
        .as_deref()
        .map(|r| ReleaseTrack::from_raw(Some(r)))
        .unwrap_or(parent_release);

    let mut children = Vec::new();
    for (name, child) in raw.groups.iter().chain(raw.commands.iter()) {
        if child.is_hidden {
            continue;
        }
        let mut child_path = path.clone();
        child_path.push(name.clone());
        children.push(convert(child_path, child, release));
    }

    let flags = raw
        .flags
        .values()
        .filter(|f| !f.is_global && !f.is_hidden && f.name.starts_with("--"))
        .map(convert_flag)
        .collect();

    let positionals = raw
        .positionals
        .iter()
        .filter_map(|p| {
            p.value
                .clone()
                .filter(|v| !v.is_empty())
                .or_else(|| p.name.as_ref().map(|n| n.to_uppercase().replace('-', "_")))
        })
        .collect();

    CommandNode {
        path,
        help: raw.capsule.clone().unwrap_or_default().trim().to_string(),
        release,
        flags,
        positionals,
        children,
    }
}

fn convert_flag(raw: &RawFlag) -> FlagSpec {
    let takes_value = raw.value_type.as_deref() != Some("bool");
    let value_kind = if !raw.choices.is_empty() {
        let mut choices = raw.choices.clone();
        choices.sort_unstable();
        ValueKind::Choice(choices)
    } else if raw
        .value
        .as_deref()
        .is_some_and(|v| !v.is_empty() && v.chars().all(|c| c.is_ascii_uppercase() || c == '_'))
    {
        ValueKind::Identifier
    } else {
        ValueKind::FreeText
    };

    FlagSpec {
        name: raw.name.clone(),
        required: raw.is_required,
        takes_value,
        value_kind,
    }
}
