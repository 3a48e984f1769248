use serde::{Deserialize, Serialize};

/// Moves every symbol under the dotted namespace `from` to `to`,
/// e.g. `org.jctools` -> `shaded.org.jctools`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelocationRule {
    pub from: String,
    pub to: String,
}

impl RelocationRule {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Source namespace in internal (`a/b/c`) form.
    pub fn from_internal(&self) -> String {
        self.from.replace('.', "/")
    }

    /// Target namespace in internal (`a/b/c`) form.
    pub fn to_internal(&self) -> String {
        self.to.replace('.', "/")
    }

    /// Whether `name` (dotted) is the source namespace or lies below it.
    pub fn covers(&self, name: &str) -> bool {
        name == self.from
            || (name.starts_with(&self.from) && name[self.from.len()..].starts_with('.'))
    }
}
