//! Deployment configuration tree.
//!
//! The document is an arbitrarily nested YAML mapping. A mapping that carries
//! a `gitlab` key is a leaf describing one deployable repository; any other
//! mapping is a group whose values are nodes again. Scalars and sequences
//! under a group are kept verbatim so the document round-trips.
//!
//! ```yaml
//! teamA:
//!   svc1: { gitlab: false, drone_repo: a/1, tag: 4f2c9e1 }
//! teamB: { gitlab: true, drone_repo: b/2 }
//! ```

use std::fmt;
use std::path::Path;

use serde_yaml::{Mapping, Value};

use crate::error::ConfigError;

const GITLAB_KEY: &str = "gitlab";
const DRONE_REPO_KEY: &str = "drone_repo";
const TAG_KEY: &str = "tag";

/// A node of the configuration tree, classified at parse time.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigNode {
    /// Named children in document order.
    Group(Vec<(Value, ConfigNode)>),
    Leaf(RepoEntry),
    /// Anything that is not a mapping; preserved, never walked.
    Other(Value),
}

/// A deployable repository.
///
/// The typed fields mirror `raw`, which is what gets written back. The tag
/// only changes through [`RepoEntry::set_tag`] so the two stay in step.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoEntry {
    gitlab: bool,
    drone_repo: String,
    tag: Option<String>,
    raw: Mapping,
}

impl RepoEntry {
    /// Build a leaf from scratch.
    pub fn new(gitlab: bool, drone_repo: impl Into<String>) -> Self {
        let drone_repo = drone_repo.into();
        let mut raw = Mapping::new();
        raw.insert(Value::from(GITLAB_KEY), Value::Bool(gitlab));
        raw.insert(Value::from(DRONE_REPO_KEY), Value::from(drone_repo.as_str()));
        RepoEntry {
            gitlab,
            drone_repo,
            tag: None,
            raw,
        }
    }

    /// True when the repository builds on the GitLab-backed Drone server.
    pub fn gitlab(&self) -> bool {
        self.gitlab
    }

    /// Repository identifier used in API calls, e.g. `org/svc`.
    pub fn drone_repo(&self) -> &str {
        &self.drone_repo
    }

    /// Commit recorded by the last populate pass.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.set_tag(tag);
        self
    }

    /// Record `commit`, keeping the key's position if it already exists.
    pub fn set_tag(&mut self, commit: impl Into<String>) {
        let commit = commit.into();
        self.raw
            .insert(Value::from(TAG_KEY), Value::from(commit.as_str()));
        self.tag = Some(commit);
    }

    fn parse(raw: Mapping, path: &str) -> Result<Self, ConfigError> {
        let gitlab = match raw.get(GITLAB_KEY) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => true,
            Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => false,
            Some(other) => {
                return Err(ConfigError::invalid(
                    path,
                    format!("`gitlab` must be a boolean, found {}", describe(other)),
                ))
            }
            None => return Err(ConfigError::invalid(path, "missing `gitlab`")),
        };

        let drone_repo = match raw.get(DRONE_REPO_KEY) {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(other) => {
                return Err(ConfigError::invalid(
                    path,
                    format!("`drone_repo` must be a non-empty string, found {}", describe(other)),
                ))
            }
            None => return Err(ConfigError::invalid(path, "missing `drone_repo`")),
        };

        let tag = match raw.get(TAG_KEY) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            // Unquoted all-digit commit prefixes load as integers.
            Some(Value::Number(n)) if n.is_u64() || n.is_i64() => Some(n.to_string()),
            Some(Value::Number(_)) => {
                return Err(ConfigError::invalid(
                    path,
                    "`tag` reads as a non-integer number; quote the commit",
                ))
            }
            Some(other) => {
                return Err(ConfigError::invalid(
                    path,
                    format!("`tag` must be a string, found {}", describe(other)),
                ))
            }
        };

        Ok(RepoEntry {
            gitlab,
            drone_repo,
            tag,
            raw,
        })
    }

    fn to_value(&self) -> Value {
        Value::Mapping(self.raw.clone())
    }
}

/// Location of a leaf: child indices from the root, plus a dotted name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LeafPath {
    indices: Vec<usize>,
    name: String,
}

impl LeafPath {
    fn root() -> Self {
        LeafPath {
            indices: Vec::new(),
            name: String::new(),
        }
    }

    fn child(&self, index: usize, key: &str) -> Self {
        let mut indices = self.indices.clone();
        indices.push(index);
        let name = if self.name.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", self.name, key)
        };
        LeafPath { indices, name }
    }

    pub fn as_str(&self) -> &str {
        if self.name.is_empty() {
            "<root>"
        } else {
            &self.name
        }
    }
}

impl fmt::Display for LeafPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ConfigNode {
    fn parse(value: Value, path: &LeafPath) -> Result<Self, ConfigError> {
        match value {
            Value::Mapping(map) if map.contains_key(GITLAB_KEY) => {
                RepoEntry::parse(map, path.as_str()).map(ConfigNode::Leaf)
            }
            Value::Mapping(map) => {
                let mut children = Vec::with_capacity(map.len());
                for (index, (key, child)) in map.into_iter().enumerate() {
                    let child_path = path.child(index, &key_name(&key));
                    children.push((key, ConfigNode::parse(child, &child_path)?));
                }
                Ok(ConfigNode::Group(children))
            }
            other => Ok(ConfigNode::Other(other)),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            ConfigNode::Group(children) => {
                let mut map = Mapping::with_capacity(children.len());
                for (key, child) in children {
                    map.insert(key.clone(), child.to_value());
                }
                Value::Mapping(map)
            }
            ConfigNode::Leaf(entry) => entry.to_value(),
            ConfigNode::Other(value) => value.clone(),
        }
    }

    fn collect_leaves<'a>(&'a self, path: LeafPath, out: &mut Vec<(LeafPath, &'a RepoEntry)>) {
        match self {
            ConfigNode::Leaf(entry) => out.push((path, entry)),
            ConfigNode::Group(children) => {
                for (index, (key, child)) in children.iter().enumerate() {
                    child.collect_leaves(path.child(index, &key_name(key)), out);
                }
            }
            ConfigNode::Other(_) => {}
        }
    }
}

/// The whole configuration document.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigTree {
    root: ConfigNode,
}

impl ConfigTree {
    pub fn new(root: ConfigNode) -> Self {
        ConfigTree { root }
    }

    /// Parse a YAML document. The top level must be a mapping.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_yaml::from_str(text)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        if !value.is_mapping() {
            return Err(ConfigError::invalid(
                "<root>",
                format!("document must be a mapping, found {}", describe(&value)),
            ));
        }
        let root = ConfigNode::parse(value, &LeafPath::root())?;
        Ok(ConfigTree { root })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_yaml_string()?)?;
        Ok(())
    }

    pub fn to_value(&self) -> Value {
        self.root.to_value()
    }

    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(&self.to_value())?)
    }

    pub fn root(&self) -> &ConfigNode {
        &self.root
    }

    /// Every leaf exactly once, in document order.
    pub fn leaves(&self) -> Vec<(LeafPath, &RepoEntry)> {
        let mut out = Vec::new();
        self.root.collect_leaves(LeafPath::root(), &mut out);
        out
    }

    pub fn leaf_mut(&mut self, path: &LeafPath) -> Option<&mut RepoEntry> {
        let mut node = &mut self.root;
        for &index in &path.indices {
            node = match node {
                ConfigNode::Group(children) => &mut children.get_mut(index)?.1,
                _ => return None,
            };
        }
        match node {
            ConfigNode::Leaf(entry) => Some(entry),
            _ => None,
        }
    }
}

fn key_name(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "~".to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| "?".to_string()),
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NESTED: &str = r#"
teamA:
  svc1:
    gitlab: false
    drone_repo: a/1
  owner: alice
teamB:
  gitlab: true
  drone_repo: b/2
  tag: deadbeef
"#;

    #[test]
    fn test_leaf_is_defined_by_gitlab_key_at_any_depth() {
        let tree = ConfigTree::from_yaml_str(NESTED).unwrap();
        let leaves = tree.leaves();
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[0].0.as_str(), "teamA.svc1");
        assert_eq!(leaves[0].1.drone_repo(), "a/1");
        assert!(!leaves[0].1.gitlab());
        assert_eq!(leaves[1].0.as_str(), "teamB");
        assert_eq!(leaves[1].1.tag(), Some("deadbeef"));
    }

    #[test]
    fn test_stray_scalars_are_preserved() {
        let tree = ConfigTree::from_yaml_str(NESTED).unwrap();
        let out = tree.to_value();
        assert_eq!(out["teamA"]["owner"], Value::from("alice"));
    }

    #[test]
    fn test_round_trip_keeps_key_order() {
        let text = "zeta:\n  gitlab: true\n  drone_repo: z/z\n  notes: keep\nalpha:\n  gitlab: false\n  drone_repo: a/a\n";
        let tree = ConfigTree::from_yaml_str(text).unwrap();
        let yaml = tree.to_yaml_string().unwrap();
        assert_eq!(yaml, text);
    }

    #[test]
    fn test_set_tag_through_leaf_path() {
        let mut tree = ConfigTree::from_yaml_str(NESTED).unwrap();
        let path = tree.leaves()[0].0.clone();
        tree.leaf_mut(&path).unwrap().set_tag("cafe");
        let out = tree.to_value();
        assert_eq!(out["teamA"]["svc1"]["tag"], Value::from("cafe"));
        assert_eq!(out["teamB"]["tag"], Value::from("deadbeef"));
    }

    #[test]
    fn test_quoted_gitlab_strings_are_accepted() {
        let tree =
            ConfigTree::from_yaml_str("svc:\n  gitlab: 'true'\n  drone_repo: org/svc\n").unwrap();
        assert!(tree.leaves()[0].1.gitlab());
    }

    #[test]
    fn test_numeric_tag_is_read_as_string() {
        let tree =
            ConfigTree::from_yaml_str("svc:\n  gitlab: false\n  drone_repo: o/s\n  tag: 1234567\n")
                .unwrap();
        assert_eq!(tree.leaves()[0].1.tag(), Some("1234567"));
    }

    #[test]
    fn test_float_shaped_tag_must_be_quoted() {
        let err =
            ConfigTree::from_yaml_str("svc:\n  gitlab: false\n  drone_repo: o/s\n  tag: 1234e56\n")
                .unwrap_err();
        match err {
            ConfigError::InvalidConfig { path, reason } => {
                assert_eq!(path, "svc");
                assert!(reason.contains("quote"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let quoted =
            ConfigTree::from_yaml_str("svc:\n  gitlab: false\n  drone_repo: o/s\n  tag: '1234e56'\n")
                .unwrap();
        assert_eq!(quoted.leaves()[0].1.tag(), Some("1234e56"));
    }

    #[test]
    fn test_tag_set_through_leaf_mut_is_saved() {
        let mut tree =
            ConfigTree::from_yaml_str("svc:\n  gitlab: false\n  drone_repo: o/s\n").unwrap();
        let path = tree.leaves()[0].0.clone();
        tree.leaf_mut(&path).unwrap().set_tag("abc");

        assert_eq!(tree.leaves()[0].1.tag(), Some("abc"));
        assert_eq!(
            tree.to_yaml_string().unwrap(),
            "svc:\n  gitlab: false\n  drone_repo: o/s\n  tag: abc\n"
        );
    }

    #[test]
    fn test_leaf_without_drone_repo_is_rejected() {
        let err = ConfigTree::from_yaml_str("team:\n  svc:\n    gitlab: true\n").unwrap_err();
        match err {
            ConfigError::InvalidConfig { path, reason } => {
                assert_eq!(path, "team.svc");
                assert!(reason.contains("drone_repo"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bad_gitlab_value_is_rejected() {
        let err = ConfigTree::from_yaml_str("svc:\n  gitlab: maybe\n  drone_repo: o/s\n");
        assert!(matches!(err, Err(ConfigError::InvalidConfig { .. })));
    }

    #[test]
    fn test_non_mapping_document_is_rejected() {
        assert!(matches!(
            ConfigTree::from_yaml_str("- a\n- b\n"),
            Err(ConfigError::InvalidConfig { .. })
        ));
        assert!(matches!(
            ConfigTree::from_yaml_str("svc: [unterminated"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_leaf_mut_rejects_stale_path() {
        let mut tree = ConfigTree::from_yaml_str(NESTED).unwrap();
        let path = LeafPath::root().child(7, "nope");
        assert!(tree.leaf_mut(&path).is_none());
    }

    #[test]
    fn test_new_entry_serializes_like_a_document_leaf() {
        let entry = RepoEntry::new(true, "org/svc").with_tag("abc");
        let yaml = serde_yaml::to_string(&entry.to_value()).unwrap();
        assert_eq!(yaml, "gitlab: true\ndrone_repo: org/svc\ntag: abc\n");
    }
}
