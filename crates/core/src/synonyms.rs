//! Query-time alias expansion.
//!
//! The full-text index stems words, so morphological variants already match.
//! What it cannot bridge are abbreviations and aliases that share no stem
//! ("k8s" and "kubernetes"), which is all this table covers.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

static MATCH_SAFE_TERM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[a-z0-9_-]+$").expect("safe term pattern is valid"));

/// Canonical term followed by its alias group. Each group lists its key first.
const CURATED_ALIASES: &[(&str, &[&str])] = &[
    ("login", &["login", "auth", "authentication", "signin"]),
    ("signin", &["signin", "auth", "authentication", "login"]),
    ("signup", &["signup", "register", "registration"]),
    ("logout", &["logout", "signout"]),
    ("db", &["db", "database"]),
    ("auth", &["auth", "authentication", "login"]),
    ("authn", &["authn", "authentication"]),
    ("authz", &["authz", "authorization"]),
    ("js", &["js", "javascript"]),
    ("ts", &["ts", "typescript"]),
    ("py", &["py", "python"]),
    ("env", &["env", "environment"]),
    ("config", &["config", "configuration"]),
    ("repo", &["repo", "repository"]),
    ("deps", &["deps", "dependencies"]),
    ("dev", &["dev", "development"]),
    ("prod", &["prod", "production"]),
    ("pkg", &["pkg", "package"]),
    ("dir", &["dir", "directory"]),
    ("msg", &["msg", "message"]),
    ("req", &["req", "request"]),
    ("res", &["res", "response"]),
    ("fn", &["fn", "function"]),
    ("param", &["param", "parameter"]),
    ("params", &["params", "parameters"]),
    ("args", &["args", "arguments"]),
    ("impl", &["impl", "implementation"]),
    ("info", &["info", "information"]),
    ("err", &["err", "error"]),
    ("doc", &["doc", "document", "documentation"]),
    ("docs", &["docs", "documentation"]),
    ("lib", &["lib", "library"]),
    ("num", &["num", "number"]),
    ("str", &["str", "string"]),
    ("bool", &["bool", "boolean"]),
    ("obj", &["obj", "object"]),
    ("arr", &["arr", "array"]),
    ("idx", &["idx", "index"]),
    ("cmd", &["cmd", "command"]),
    ("cli", &["cli", "command-line"]),
    ("api", &["api", "endpoint"]),
    ("url", &["url", "endpoint", "link"]),
    ("ui", &["ui", "interface"]),
    ("css", &["css", "style", "styling"]),
    ("sql", &["sql", "query", "database"]),
    ("jwt", &["jwt", "token"]),
    ("oauth", &["oauth", "authentication"]),
    ("ssl", &["ssl", "tls", "certificate"]),
    ("dns", &["dns", "domain"]),
    ("ws", &["ws", "websocket"]),
    ("ci", &["ci", "continuous-integration"]),
    ("cd", &["cd", "continuous-deployment"]),
    ("k8s", &["k8s", "kubernetes"]),
];

/// Immutable alias groups plus the reverse index from any member to its
/// siblings. Built once and shared by reference.
#[derive(Debug, Clone)]
pub struct SynonymExpander {
    groups: HashMap<&'static str, &'static [&'static str]>,
    siblings: HashMap<&'static str, Vec<&'static str>>,
}

impl Default for SynonymExpander {
    fn default() -> Self {
        Self::curated()
    }
}

impl SynonymExpander {
    pub fn curated() -> Self {
        Self::from_groups(CURATED_ALIASES)
    }

    pub fn from_groups(table: &[(&'static str, &'static [&'static str])]) -> Self {
        let mut groups = HashMap::new();
        let mut siblings: HashMap<&'static str, Vec<&'static str>> = HashMap::new();

        for &(key, group) in table {
            groups.insert(key, group);
            for &term in group {
                let entry = siblings.entry(term).or_default();
                for &sibling in group {
                    if sibling != term && !entry.contains(&sibling) {
                        entry.push(sibling);
                    }
                }
            }
        }

        Self { groups, siblings }
    }

    /// Returns `term` (lowercased) together with its aliases.
    pub fn expand(&self, term: &str) -> Vec<String> {
        let lower = term.to_lowercase();

        if let Some(group) = self.groups.get(lower.as_str()) {
            return group.iter().map(|alias| alias.to_string()).collect();
        }

        let mut expanded = Vec::new();
        if let Some(siblings) = self.siblings.get(lower.as_str()) {
            expanded.extend(siblings.iter().map(|alias| alias.to_string()));
        }
        expanded.insert(0, lower);
        expanded
    }

    /// Union of `expand` over all terms, deduplicated in first-seen order.
    pub fn expand_query<S: AsRef<str>>(&self, terms: &[S]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut expanded = Vec::new();

        for term in terms {
            for alias in self.expand(term.as_ref()) {
                if seen.insert(alias.clone()) {
                    expanded.push(alias);
                }
            }
        }

        expanded
    }

    /// Renders the expanded terms as an OR of quoted phrases. Never empty when
    /// `terms` is not: if no expanded term is safe to quote, the original terms
    /// are quoted verbatim.
    pub fn build_match_expression<S: AsRef<str>>(&self, terms: &[S]) -> String {
        let safe = self
            .expand_query(terms)
            .into_iter()
            .filter(|term| MATCH_SAFE_TERM.is_match(term))
            .collect::<Vec<_>>();

        if safe.is_empty() {
            return or_join_quoted(terms.iter().map(AsRef::as_ref));
        }
        or_join_quoted(safe.iter().map(String::as_str))
    }
}

fn or_join_quoted<'a>(terms: impl Iterator<Item = &'a str>) -> String {
    terms
        .map(|term| format!("\"{term}\""))
        .collect::<Vec<_>>()
        .join(" OR ")
}
