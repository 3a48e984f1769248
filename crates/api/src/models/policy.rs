use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeAction {
    Exclude,
    #[default]
    KeepFirst,
    KeepLast,
    ConcatenateLines,
    MergeServiceRegistrations,
}

/// Maps a glob over archive paths to a merge action.
///
/// `order` defaults to the declaration index. Among matching policies the one
/// with the longest literal prefix wins, then the lowest order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergePolicy {
    pub pattern: String,
    pub action: MergeAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
}

impl MergePolicy {
    pub fn new(pattern: impl Into<String>, action: MergeAction) -> Self {
        Self {
            pattern: pattern.into(),
            action,
            order: None,
        }
    }

    pub fn with_order(mut self, order: u32) -> Self {
        self.order = Some(order);
        self
    }

    /// Length of the pattern up to its first glob metacharacter.
    pub fn literal_prefix_len(&self) -> usize {
        self.pattern
            .find(['*', '?', '[', '{', '\\'])
            .unwrap_or(self.pattern.len())
    }
}
