use crate::synonyms::SynonymTables;
use crate::tree::{CommandNode, FlagSpec, LoadedTree, ReleaseTrack};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Flattened projection of one leaf command. `path` excludes the beta/alpha
/// prefix segment; the release track carries that instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub path: Vec<String>,
    pub release: ReleaseTrack,
    pub help: String,
    pub flags: Vec<FlagSpec>,
    pub positionals: Vec<String>,
    pub keywords: Vec<String>,
}

impl IndexRecord {
    pub fn path_string(&self) -> String {
        self.path.join(" ")
    }

    pub fn flag(&self, name: &str) -> Option<&FlagSpec> {
        self.flags.iter().find(|f| f.name == name)
    }
}

/// The persisted index. Valid only for the exact tree bytes and tool version
/// captured in `fingerprint`; everything here is rebuildable at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandIndex {
    pub fingerprint: String,
    pub tool_version: String,
    pub records: Vec<IndexRecord>,
}

pub const INDEX_FILE_NAME: &str = "index.json";

pub fn index_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(INDEX_FILE_NAME)
}

/// SHA-256 over the raw tree bytes plus the tool version line.
pub fn fingerprint(raw_tree_bytes: &[u8], tool_version: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_tree_bytes);
    hasher.update(b"\n");
    hasher.update(tool_version.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Returns the cached index when it matches `expected_fingerprint`, rebuilds
/// and persists otherwise. A failure to persist is a warning, not an error.
pub fn obtain(
    tree: &LoadedTree,
    synonyms: &SynonymTables,
    cache_dir: &Path,
    force_rebuild: bool,
) -> Result<CommandIndex> {
    let expected = fingerprint(&tree.raw_bytes, &tree.tool_version);

    if !force_rebuild {
        if let Some(cached) = load_cached(&index_path(cache_dir), &expected) {
            debug!("using cached index ({} records)", cached.records.len());
            return Ok(cached);
        }
    }

    let index = build(tree, synonyms);
    info!(
        "built command index: {} records for '{}'",
        index.records.len(),
        index.tool_version
    );
    if let Err(err) = save(&index, cache_dir) {
        warn!("failed to persist index cache: {:#}", err);
    }
    Ok(index)
}

/// Flattens the tree into records, one per visible leaf. Deterministic: the
/// traversal order is fixed by the tree's sorted children and the output is
/// sorted by path, so identical input bytes yield identical output bytes.
pub fn build(tree: &LoadedTree, synonyms: &SynonymTables) -> CommandIndex {
    let mut by_path: BTreeMap<Vec<String>, IndexRecord> = BTreeMap::new();
    collect_leaves(&tree.root, synonyms, &mut by_path);

    CommandIndex {
        fingerprint: fingerprint(&tree.raw_bytes, &tree.tool_version),
        tool_version: tree.tool_version.clone(),
        records: by_path.into_values().collect(),
    }
}

fn collect_leaves(
    node: &CommandNode,
    synonyms: &SynonymTables,
    out: &mut BTreeMap<Vec<String>, IndexRecord>,
) {
    if node.is_leaf() {
        if node.path.is_empty() {
            return;
        }
        let record = record_for(node, synonyms);
        match out.get(&record.path) {
            // The beta/alpha groups mirror most of the GA surface; keep the
            // most stable track for any given path.
            Some(existing) if release_rank(existing.release) <= release_rank(record.release) => {}
            _ => {
                out.insert(record.path.clone(), record);
            }
        }
        return;
    }
    for child in &node.children {
        collect_leaves(child, synonyms, out);
    }
}

fn record_for(node: &CommandNode, synonyms: &SynonymTables) -> IndexRecord {
    let (path, release) = match node.path.first().map(String::as_str) {
        Some("beta") => (node.path[1..].to_vec(), ReleaseTrack::Beta),
        Some("alpha") => (node.path[1..].to_vec(), ReleaseTrack::Alpha),
        _ => (node.path.clone(), node.release),
    };

    let mut keywords: Vec<String> = Vec::new();
    for segment in &path {
        keywords.push(segment.clone());
        for informal in synonyms.informal_variants(segment) {
            keywords.push(informal.to_string());
        }
    }
    keywords.sort_unstable();
    keywords.dedup();

    IndexRecord {
        path,
        release,
        help: node.help.clone(),
        flags: node.flags.clone(),
        positionals: node.positionals.clone(),
        keywords,
    }
}

fn release_rank(release: ReleaseTrack) -> u8 {
    match release {
        ReleaseTrack::Ga => 0,
        ReleaseTrack::Beta => 1,
        ReleaseTrack::Alpha => 2,
    }
}

/// Writes the index to a temp file and renames it over the live one, so a
/// concurrent reader sees the old index or the new one, never a partial file.
pub fn save(index: &CommandIndex, cache_dir: &Path) -> Result<()> {
    fs::create_dir_all(cache_dir)
        .with_context(|| format!("Failed to create cache directory {}", cache_dir.display()))?;

    let target = index_path(cache_dir);
    let tmp = target.with_extension("json.tmp");
    let serialized = serde_json::to_vec_pretty(index).context("Failed to serialize index")?;
    fs::write(&tmp, serialized)
        .with_context(|| format!("Failed to write index temp file {}", tmp.display()))?;
    fs::rename(&tmp, &target).with_context(|| {
        format!(
            "Failed to move index into place {} -> {}",
            tmp.display(),
            target.display()
        )
    })?;
    Ok(())
}

/// Loads a cached index, treating every failure mode (missing file, bad JSON,
/// fingerprint mismatch) as a cache miss.
pub fn load_cached(path: &Path, expected_fingerprint: &str) -> Option<CommandIndex> {
    let content = fs::read(path).ok()?;
    let index: CommandIndex = match serde_json::from_slice(&content) {
        Ok(index) => index,
        Err(err) => {
            debug!("ignoring unreadable index cache {}: {}", path.display(), err);
            return None;
        }
    };
    if index.fingerprint != expected_fingerprint {
        debug!(
            "index cache {} is for fingerprint {}, want {}",
            path.display(),
            index.fingerprint,
            expected_fingerprint
        );
        return None;
    }
    Some(index)
}
