use regex::bytes::Regex;
use shadejar_api::{AssemblyError, RelocationRule, Result};
use std::collections::HashMap;

const VERSIONS_DIR: &str = "META-INF/versions/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Form {
    /// `com/vendor/lib`, as used in class names, descriptors and paths.
    Internal,
    /// `com.vendor.lib`, as used in string literals and text resources.
    Dotted,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: RelocationRule,
    from_internal: String,
    to_internal: String,
}

/// Finds and rewrites references to relocated namespaces.
///
/// A match must sit on namespace boundaries: `com.vendor.lib` matches
/// `com/vendor/lib/Util`, `Lcom/vendor/lib/Util;` and `com.vendor.lib.Util`,
/// but not `com/vendor/library` or `org/com/vendor/lib`. All rules share one
/// pass, so replaced text is never matched again.
#[derive(Debug, Clone)]
pub struct NamespaceMatcher {
    rules: Vec<CompiledRule>,
    regex: Regex,
    by_literal: HashMap<Vec<u8>, usize>,
}

fn is_identifier_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

fn is_valid_namespace(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'$')
        })
}

/// Rejects rule sets that could only be applied partially or ambiguously.
pub fn validate_rules(rules: &[RelocationRule]) -> Result<()> {
    let config_error = |rule: &RelocationRule, reason: String| {
        AssemblyError::relocation(&rule.from, "configuration", reason)
    };

    for rule in rules {
        if !is_valid_namespace(&rule.from) || !is_valid_namespace(&rule.to) {
            return Err(config_error(
                rule,
                format!("'{}' -> '{}' is not a pair of dotted namespaces", rule.from, rule.to),
            ));
        }
        if rule.from == rule.to {
            return Err(config_error(rule, "source and target are identical".to_string()));
        }
    }

    for (i, a) in rules.iter().enumerate() {
        for (j, b) in rules.iter().enumerate() {
            if i != j && b.from.starts_with(&a.from) {
                return Err(config_error(
                    b,
                    format!("source overlaps with the source of rule '{}'", a.from),
                ));
            }
            if a.covers(&b.to) {
                return Err(config_error(
                    b,
                    format!("target '{}' lies inside relocated namespace '{}'", b.to, a.from),
                ));
            }
        }
    }
    Ok(())
}

impl NamespaceMatcher {
    pub fn new(rules: &[RelocationRule]) -> Result<Self> {
        validate_rules(rules)?;

        let mut alternatives = Vec::new();
        let mut by_literal = HashMap::new();
        let mut compiled = Vec::with_capacity(rules.len());
        for (index, rule) in rules.iter().enumerate() {
            let from_internal = rule.from_internal();
            by_literal.insert(rule.from.as_bytes().to_vec(), index);
            by_literal.insert(from_internal.as_bytes().to_vec(), index);
            alternatives.push(regex::escape(&from_internal));
            if from_internal != rule.from {
                alternatives.push(regex::escape(&rule.from));
            }
            compiled.push(CompiledRule {
                to_internal: rule.to_internal(),
                from_internal,
                rule: rule.clone(),
            });
        }

        // An empty alternation would match everywhere.
        let pattern = if alternatives.is_empty() {
            r"\b\B".to_string()
        } else {
            alternatives.join("|")
        };
        let regex = Regex::new(&pattern)
            .map_err(|e| AssemblyError::Internal(format!("relocation pattern: {e}")))?;

        Ok(Self {
            rules: compiled,
            regex,
            by_literal,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rule and form of a candidate match, if it sits on namespace
    /// boundaries.
    fn accept(&self, haystack: &[u8], start: usize, end: usize) -> Option<(usize, Form)> {
        let literal = &haystack[start..end];
        let index = *self.by_literal.get(literal)?;
        let prev = start.checked_sub(1).map(|i| haystack[i]);
        let next = haystack.get(end).copied();

        // Single-segment namespaces look the same in both forms; the
        // separator that follows decides.
        let form = if literal.contains(&b'/') || (!literal.contains(&b'.') && next == Some(b'/')) {
            Form::Internal
        } else {
            Form::Dotted
        };

        let accepted = match form {
            Form::Internal => {
                let leading = match prev {
                    None | Some(b'L') => true,
                    // Absolute resource names, e.g. "/com/vendor/lib/messages.properties".
                    Some(b'/') => start == 1,
                    Some(b) => !is_identifier_byte(b) && b != b'.',
                };
                leading && matches!(next, None | Some(b'/'))
            }
            Form::Dotted => {
                let leading = match prev {
                    None => true,
                    Some(b) => !is_identifier_byte(b) && b != b'.',
                };
                let trailing = match next {
                    None | Some(b'.') => true,
                    Some(b) => !is_identifier_byte(b) && b != b'/',
                };
                leading && trailing
            }
        };
        accepted.then_some((index, form))
    }

    /// Rewrites every reference in `haystack`; `None` when nothing matched.
    pub fn rewrite(&self, haystack: &[u8]) -> Option<Vec<u8>> {
        if self.rules.is_empty() {
            return None;
        }
        let mut out = Vec::new();
        let mut copied = 0;
        let mut pos = 0;
        while let Some(m) = self.regex.find_at(haystack, pos) {
            match self.accept(haystack, m.start(), m.end()) {
                Some((index, form)) => {
                    let rule = &self.rules[index];
                    let replacement = match form {
                        Form::Internal => rule.to_internal.as_bytes(),
                        Form::Dotted => rule.rule.to.as_bytes(),
                    };
                    out.extend_from_slice(&haystack[copied..m.start()]);
                    out.extend_from_slice(replacement);
                    copied = m.end();
                    pos = m.end();
                }
                None => pos = m.start() + 1,
            }
        }
        if copied == 0 {
            return None;
        }
        out.extend_from_slice(&haystack[copied..]);
        Some(out)
    }

    /// Rewrites a UTF-8 string (manifest values, entry points).
    pub fn rewrite_str(&self, text: &str) -> String {
        match self.rewrite(text.as_bytes()) {
            Some(bytes) => String::from_utf8(bytes)
                .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()),
            None => text.to_string(),
        }
    }

    /// The rule behind the first reference still present in `haystack`.
    pub fn find(&self, haystack: &[u8]) -> Option<&RelocationRule> {
        let mut pos = 0;
        while let Some(m) = self.regex.find_at(haystack, pos) {
            if let Some((index, _)) = self.accept(haystack, m.start(), m.end()) {
                return Some(&self.rules[index].rule);
            }
            pos = m.start() + 1;
        }
        None
    }

    /// Relocates an archive path whose directory lies in a source namespace.
    /// Multi-release paths (`META-INF/versions/<n>/...`) keep their prefix.
    pub fn relocate_path(&self, path: &str) -> Option<String> {
        let (prefix, rest) = split_versioned(path);
        self.rules.iter().find_map(|rule| {
            let tail = rest.strip_prefix(&rule.from_internal)?;
            tail.starts_with('/')
                .then(|| format!("{prefix}{}{tail}", rule.to_internal))
        })
    }

    /// Relocates a dotted name such as a service key.
    pub fn relocate_name(&self, name: &str) -> Option<String> {
        self.rules.iter().find_map(|rule| {
            rule.rule
                .covers(name)
                .then(|| format!("{}{}", rule.rule.to, &name[rule.rule.from.len()..]))
        })
    }

    /// The rule whose target namespace holds `path`, for error reporting.
    pub fn target_rule(&self, path: &str) -> Option<&RelocationRule> {
        let (_, rest) = split_versioned(path);
        self.rules
            .iter()
            .find(|rule| {
                rest.strip_prefix(&rule.to_internal)
                    .is_some_and(|tail| tail.starts_with('/'))
            })
            .map(|rule| &rule.rule)
    }
}

fn split_versioned(path: &str) -> (&str, &str) {
    if let Some(after) = path.strip_prefix(VERSIONS_DIR) {
        if let Some(slash) = after.find('/') {
            let version = &after[..slash];
            if !version.is_empty() && version.bytes().all(|b| b.is_ascii_digit()) {
                let cut = VERSIONS_DIR.len() + slash + 1;
                return (&path[..cut], &path[cut..]);
            }
        }
    }
    ("", path)
}
