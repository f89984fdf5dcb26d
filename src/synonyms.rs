use std::collections::BTreeMap;

/// Action-word synonyms, informal term -> canonical command verb.
const VERB_SYNONYMS: &[(&str, &str)] = &[
    ("get", "describe"),
    ("show", "describe"),
    ("details", "describe"),
    ("describe", "describe"),
    ("inspect", "describe"),
    ("fetch", "describe"),
    ("list", "list"),
    ("ls", "list"),
    ("enumerate", "list"),
    ("create", "create"),
    ("make", "create"),
    ("new", "create"),
    ("deploy", "deploy"),
    ("apply", "update"),
    ("update", "update"),
    ("patch", "update"),
    ("set", "update"),
    ("delete", "delete"),
    ("remove", "delete"),
    ("rm", "delete"),
];

/// Resource-word synonyms, informal term -> canonical path segment.
/// Two-word keys are matched against token bigrams by the ranker.
const RESOURCE_SYNONYMS: &[(&str, &str)] = &[
    // Cloud Run
    ("cloudrun", "run"),
    ("cloud run", "run"),
    ("service", "services"),
    ("services", "services"),
    ("revision", "revisions"),
    ("revisions", "revisions"),
    ("job", "jobs"),
    ("jobs", "jobs"),
    // Compute
    ("compute engine", "compute"),
    ("vm", "instances"),
    ("vms", "instances"),
    ("instance", "instances"),
    ("instances", "instances"),
    ("firewall", "firewall-rules"),
    ("firewalls", "firewall-rules"),
    ("disk", "disks"),
    ("disks", "disks"),
    ("image", "images"),
    ("images", "images"),
    ("router", "routers"),
    ("routers", "routers"),
    ("mig", "instance-groups"),
    // IAM / Projects
    ("project", "projects"),
    ("projects", "projects"),
    ("service account", "service-accounts"),
    ("service accounts", "service-accounts"),
    ("iam", "iam"),
    // Pub/Sub
    ("pubsub", "pubsub"),
    ("topic", "topics"),
    ("topics", "topics"),
    ("subscription", "subscriptions"),
    ("subscriptions", "subscriptions"),
    // Storage
    ("gcs", "storage"),
    ("storage bucket", "buckets"),
    ("bucket", "buckets"),
    ("buckets", "buckets"),
    // Artifact / Secrets / Build
    ("artifact", "artifacts"),
    ("artifacts", "artifacts"),
    ("secret", "secrets"),
    ("secrets", "secrets"),
    ("cloud build", "builds"),
    ("build", "builds"),
    ("builds", "builds"),
];

/// Immutable verb/resource synonym tables. Built once at startup and passed by
/// reference; lookups are case-insensitive and whitespace-normalized. Terms
/// not present in either table pass through unmapped.
#[derive(Debug)]
pub struct SynonymTables {
    verbs: BTreeMap<String, String>,
    resources: BTreeMap<String, String>,
}

impl SynonymTables {
    pub fn builtin() -> Self {
        let verbs = VERB_SYNONYMS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let resources = RESOURCE_SYNONYMS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self { verbs, resources }
    }

    /// Canonical form of a term, verbs first, then resources. None if the
    /// term is in neither table.
    pub fn canonical(&self, term: &str) -> Option<&str> {
        let key = normalize(term);
        self.verbs
            .get(&key)
            .or_else(|| self.resources.get(&key))
            .map(String::as_str)
    }

    pub fn canonical_verb(&self, term: &str) -> Option<&str> {
        self.verbs.get(&normalize(term)).map(String::as_str)
    }

    pub fn canonical_resource(&self, term: &str) -> Option<&str> {
        self.resources.get(&normalize(term)).map(String::as_str)
    }

    /// Single-word informal terms that map to `canonical`, excluding the
    /// identity entry. Used by the index builder to derive keywords; two-word
    /// phrases are excluded because keywords are single tokens (the ranker
    /// canonicalizes bigrams on the query side instead).
    pub fn informal_variants(&self, canonical: &str) -> Vec<&str> {
        let mut variants: Vec<&str> = self
            .verbs
            .iter()
            .chain(self.resources.iter())
            .filter(|(informal, target)| {
                target.as_str() == canonical
                    && informal.as_str() != canonical
                    && !informal.contains(' ')
            })
            .map(|(informal, _)| informal.as_str())
            .collect();
        variants.sort_unstable();
        variants.dedup();
        variants
    }
}

fn normalize(term: &str) -> String {
    term.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
