//! Mailmap store and author identity resolution
//!
//! Reads and writes the repository's `.mailmap` in git's own format:
//!
//! - `Proper Name <email>` - rewrite the name for commits with that email
//! - `Proper Name <proper@email> <alias@email>` - rewrite name and email
//! - `Proper Name <proper@email> Alias Name <alias@email>` - match the
//!   exact raw (name, email) pair
//!
//! Resolution is exact alias lookup; raw pairs with no rule become their
//! own singleton identity. Suggestion never mutates the store - the caller
//! confirms and applies entries explicitly.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MailmapError, Result};

/// One alias rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailmapEntry {
    pub canonical_name: String,
    pub canonical_email: String,
    /// When set, the rule matches only this exact raw name; otherwise it
    /// matches on email alone
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias_name: Option<String>,
    pub alias_email: String,
}

/// A canonical contributor with the raw pairs known to map onto it
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorIdentity {
    pub name: String,
    pub email: String,
    pub aliases: Vec<(String, String)>,
}

/// The parsed alias table
#[derive(Debug, Clone, Default)]
pub struct Mailmap {
    entries: Vec<MailmapEntry>,
}

/// Extract `name <email>` identity pairs from a mailmap line.
fn split_identities(line: &str) -> Option<Vec<(String, String)>> {
    let mut identities = Vec::new();
    let mut rest = line;

    while let Some(open) = rest.find('<') {
        let close = rest[open..].find('>')? + open;
        let name = rest[..open].trim().to_string();
        let email = rest[open + 1..close].trim().to_string();
        if email.is_empty() {
            return None;
        }
        identities.push((name, email));
        rest = &rest[close + 1..];
    }

    if identities.is_empty() || !rest.trim().is_empty() {
        return None;
    }

    Some(identities)
}

/// Parse one mailmap line. Blank lines and `#` comments yield `Ok(None)`.
fn parse_line(line: &str, line_number: usize) -> std::result::Result<Option<MailmapEntry>, MailmapError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let invalid = || MailmapError::InvalidLine {
        line_number,
        line: line.to_string(),
    };

    let identities = split_identities(trimmed).ok_or_else(invalid)?;

    match identities.as_slice() {
        // `Proper Name <email>` - name rewrite keyed by the same email
        [(name, email)] => {
            if name.is_empty() {
                return Err(invalid());
            }
            Ok(Some(MailmapEntry {
                canonical_name: name.clone(),
                canonical_email: email.clone(),
                alias_name: None,
                alias_email: email.clone(),
            }))
        }
        // `Proper Name <proper> <alias>` or `Proper <proper> Alias <alias>`
        [(name, email), (alias_name, alias_email)] => Ok(Some(MailmapEntry {
            canonical_name: name.clone(),
            canonical_email: email.clone(),
            alias_name: if alias_name.is_empty() {
                None
            } else {
                Some(alias_name.clone())
            },
            alias_email: alias_email.clone(),
        })),
        _ => Err(invalid()),
    }
}

impl MailmapEntry {
    /// Whether this rule matches a raw (name, email) pair. Email matching
    /// is case-insensitive, per git's mailmap semantics.
    pub fn matches(&self, name: &str, email: &str) -> bool {
        if !self.alias_email.eq_ignore_ascii_case(email) {
            return false;
        }
        match &self.alias_name {
            Some(alias_name) => alias_name == name,
            None => true,
        }
    }

    /// Render this entry as one mailmap line.
    fn format_line(&self) -> String {
        let same_email = self
            .canonical_email
            .eq_ignore_ascii_case(&self.alias_email);
        match (&self.alias_name, same_email) {
            (None, true) => format!("{} <{}>", self.canonical_name, self.canonical_email),
            (None, false) => format!(
                "{} <{}> <{}>",
                self.canonical_name, self.canonical_email, self.alias_email
            ),
            (Some(alias_name), _) => format!(
                "{} <{}> {} <{}>",
                self.canonical_name, self.canonical_email, alias_name, self.alias_email
            ),
        }
    }
}

impl Mailmap {
    /// Path of the mailmap file inside `repo_path`
    pub fn file_path(repo_path: &Path) -> PathBuf {
        repo_path.join(".mailmap")
    }

    /// Parse mailmap text.
    pub fn parse(text: &str) -> std::result::Result<Self, MailmapError> {
        let mut entries = Vec::new();
        for (i, line) in text.lines().enumerate() {
            if let Some(entry) = parse_line(line, i + 1)? {
                entries.push(entry);
            }
        }
        Ok(Self { entries })
    }

    /// Load the repository's `.mailmap`. A missing file is an empty
    /// mailmap, not an error.
    pub async fn load(repo_path: &Path) -> Result<Self> {
        let path = Self::file_path(repo_path);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Self::parse(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No mailmap at {:?}", path);
                Ok(Self::default())
            }
            Err(e) => Err(MailmapError::ReadFailed {
                path,
                reason: e.to_string(),
            }
            .into()),
        }
    }

    /// Write the mailmap back to the repository, atomically (write to a
    /// temp file in the same directory, then rename).
    pub async fn save(&self, repo_path: &Path) -> Result<()> {
        let path = Self::file_path(repo_path);
        let tmp = repo_path.join(".mailmap.tmp");

        let write_err = |e: std::io::Error| MailmapError::WriteFailed {
            path: path.clone(),
            reason: e.to_string(),
        };

        tokio::fs::write(&tmp, self.format()).await.map_err(write_err)?;
        tokio::fs::rename(&tmp, &path).await.map_err(write_err)?;

        debug!("Wrote {} mailmap entries to {:?}", self.entries.len(), path);
        Ok(())
    }

    /// Render the full mailmap text.
    pub fn format(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.format_line());
            out.push('\n');
        }
        out
    }

    /// All entries, in file order
    pub fn entries(&self) -> &[MailmapEntry] {
        &self.entries
    }

    /// Resolve a raw author pair to its canonical (name, email).
    ///
    /// First matching rule wins; an empty canonical name keeps the raw
    /// name (email-only rewrite). Unmatched pairs resolve to themselves.
    pub fn resolve(&self, name: &str, email: &str) -> (String, String) {
        for entry in &self.entries {
            if entry.matches(name, email) {
                let canonical_name = if entry.canonical_name.is_empty() {
                    name.to_string()
                } else {
                    entry.canonical_name.clone()
                };
                return (canonical_name, entry.canonical_email.clone());
            }
        }
        (name.to_string(), email.to_string())
    }

    /// Resolve a raw pair to a full identity, including every alias the
    /// table maps onto the same canonical email.
    pub fn resolve_identity(&self, name: &str, email: &str) -> AuthorIdentity {
        let (canonical_name, canonical_email) = self.resolve(name, email);
        let aliases = self
            .entries
            .iter()
            .filter(|e| e.canonical_email.eq_ignore_ascii_case(&canonical_email))
            .map(|e| {
                (
                    e.alias_name.clone().unwrap_or_default(),
                    e.alias_email.clone(),
                )
            })
            .collect();
        AuthorIdentity {
            name: canonical_name,
            email: canonical_email,
            aliases,
        }
    }

    /// Whether any rule covers this raw pair
    pub fn covers(&self, name: &str, email: &str) -> bool {
        self.entries.iter().any(|e| e.matches(name, email))
    }

    /// Append entries, skipping exact duplicates.
    pub fn add_entries(&mut self, entries: Vec<MailmapEntry>) -> usize {
        let mut added = 0;
        for entry in entries {
            if !self.entries.contains(&entry) {
                self.entries.push(entry);
                added += 1;
            }
        }
        added
    }

    /// Remove an exact entry. Returns whether it was present.
    pub fn remove_entry(&mut self, entry: &MailmapEntry) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e != entry);
        self.entries.len() != before
    }
}

/// Normalize a raw author name for similarity grouping: lowercase,
/// alphanumeric characters only.
fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Propose mailmap entries for raw authors the mailmap does not cover yet.
///
/// Authors are grouped when their emails match case-insensitively or their
/// normalized names are equal; the first-seen member of each group becomes
/// the canonical identity and the rest become alias entries. Suggestions
/// are never applied automatically.
pub fn suggest_entries(authors: &[(String, String)], mailmap: &Mailmap) -> Vec<MailmapEntry> {
    let mut groups: Vec<Vec<(String, String)>> = Vec::new();

    for (name, email) in authors {
        if mailmap.covers(name, email) {
            continue;
        }
        if groups
            .iter()
            .flatten()
            .any(|(n, e)| n == name && e.eq_ignore_ascii_case(email))
        {
            continue; // exact duplicate author
        }

        let key_name = normalize_name(name);
        let found = groups.iter_mut().find(|group| {
            group.iter().any(|(n, e)| {
                e.eq_ignore_ascii_case(email) || (!key_name.is_empty() && normalize_name(n) == key_name)
            })
        });

        match found {
            Some(group) => group.push((name.clone(), email.clone())),
            None => groups.push(vec![(name.clone(), email.clone())]),
        }
    }

    let mut suggestions = Vec::new();
    for group in groups.iter().filter(|g| g.len() > 1) {
        let (canonical_name, canonical_email) = &group[0];
        for (alias_name, alias_email) in &group[1..] {
            suggestions.push(MailmapEntry {
                canonical_name: canonical_name.clone(),
                canonical_email: canonical_email.clone(),
                alias_name: Some(alias_name.clone()),
                alias_email: alias_email.clone(),
            });
        }
    }

    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_name_rewrite() {
        let map = Mailmap::parse("Jane Doe <jane@x.com>\n").unwrap();
        assert_eq!(map.entries().len(), 1);
        assert_eq!(map.resolve("jdoe", "jane@x.com"), ("Jane Doe".to_string(), "jane@x.com".to_string()));
    }

    #[test]
    fn test_parse_email_rewrite() {
        let map = Mailmap::parse("Jane Doe <jane@x.com> <jane@old.com>\n").unwrap();
        assert_eq!(
            map.resolve("Whoever", "JANE@OLD.COM"),
            ("Jane Doe".to_string(), "jane@x.com".to_string())
        );
    }

    #[test]
    fn test_parse_full_pair_rule() {
        let map = Mailmap::parse("Jane Doe <jane@x.com> J. Doe <j@x.com>\n").unwrap();
        // Name must match exactly for pair rules
        assert_eq!(
            map.resolve("J. Doe", "j@x.com"),
            ("Jane Doe".to_string(), "jane@x.com".to_string())
        );
        assert_eq!(
            map.resolve("Other", "j@x.com"),
            ("Other".to_string(), "j@x.com".to_string())
        );
    }

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let map = Mailmap::parse("# header\n\nJane <jane@x.com>\n").unwrap();
        assert_eq!(map.entries().len(), 1);
    }

    #[test]
    fn test_parse_invalid_line() {
        assert!(Mailmap::parse("no email here\n").is_err());
        assert!(Mailmap::parse("<unclosed\n").is_err());
    }

    #[test]
    fn test_unmatched_pair_is_singleton() {
        let map = Mailmap::default();
        assert_eq!(
            map.resolve("Solo", "solo@x.com"),
            ("Solo".to_string(), "solo@x.com".to_string())
        );
    }

    #[test]
    fn test_format_round_trip() {
        let text = "Jane Doe <jane@x.com>\nJane Doe <jane@x.com> <jane@old.com>\nJane Doe <jane@x.com> J. Doe <j@x.com>\n";
        let map = Mailmap::parse(text).unwrap();
        assert_eq!(map.format(), text);

        let reparsed = Mailmap::parse(&map.format()).unwrap();
        assert_eq!(reparsed.entries(), map.entries());
    }

    #[test]
    fn test_add_and_remove_entries() {
        let mut map = Mailmap::default();
        let entry = MailmapEntry {
            canonical_name: "Jane".to_string(),
            canonical_email: "jane@x.com".to_string(),
            alias_name: None,
            alias_email: "old@x.com".to_string(),
        };

        assert_eq!(map.add_entries(vec![entry.clone(), entry.clone()]), 1);
        assert_eq!(map.entries().len(), 1);

        assert!(map.remove_entry(&entry));
        assert!(!map.remove_entry(&entry));
        assert!(map.entries().is_empty());
    }

    #[test]
    fn test_suggest_groups_by_email_case() {
        let authors = vec![
            ("Jane".to_string(), "jane@x.com".to_string()),
            ("Jane Doe".to_string(), "JANE@X.COM".to_string()),
        ];
        let suggestions = suggest_entries(&authors, &Mailmap::default());
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].canonical_name, "Jane");
        assert_eq!(suggestions[0].alias_name.as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn test_suggest_groups_by_normalized_name() {
        let authors = vec![
            ("John Doe".to_string(), "john@x.com".to_string()),
            ("john.doe".to_string(), "jd@elsewhere.com".to_string()),
            ("Unrelated".to_string(), "u@x.com".to_string()),
        ];
        let suggestions = suggest_entries(&authors, &Mailmap::default());
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].alias_email, "jd@elsewhere.com");
    }

    #[test]
    fn test_resolve_identity_collects_aliases() {
        let map = Mailmap::parse(
            "Jane Doe <jane@x.com> <jane@old.com>\nJane Doe <jane@x.com> J. Doe <j@x.com>\n",
        )
        .unwrap();
        let identity = map.resolve_identity("J. Doe", "j@x.com");
        assert_eq!(identity.name, "Jane Doe");
        assert_eq!(identity.email, "jane@x.com");
        assert_eq!(identity.aliases.len(), 2);
    }

    #[test]
    fn test_suggest_skips_covered_authors() {
        let map = Mailmap::parse("Jane <jane@x.com> <old@x.com>\n").unwrap();
        let authors = vec![
            ("Old Jane".to_string(), "old@x.com".to_string()),
            ("Jane".to_string(), "jane@x.com".to_string()),
        ];
        // The old address is already covered; nothing left to group.
        let suggestions = suggest_entries(&authors, &map);
        assert!(suggestions.is_empty());
    }
}
