use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use shadejar_api::{AssemblyError, MergeAction, MergePolicy, Result};
use std::cmp::Ordering;

#[derive(Debug, Clone)]
struct CompiledPolicy {
    pattern: String,
    action: MergeAction,
    order: u32,
    specificity: usize,
}

/// Immutable lookup table built once from the configured merge policies.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    policies: Vec<CompiledPolicy>,
    set: GlobSet,
}

impl PolicyTable {
    pub fn new(policies: &[MergePolicy]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        let mut compiled = Vec::with_capacity(policies.len());

        for (index, policy) in policies.iter().enumerate() {
            let glob = GlobBuilder::new(&policy.pattern)
                .literal_separator(true)
                .build()
                .map_err(|e| {
                    AssemblyError::InvalidConfig(format!(
                        "invalid merge pattern '{}': {}",
                        policy.pattern, e
                    ))
                })?;
            builder.add(glob);
            compiled.push(CompiledPolicy {
                pattern: policy.pattern.clone(),
                action: policy.action,
                order: policy.order.unwrap_or(index as u32),
                specificity: policy.literal_prefix_len(),
            });
        }

        let set = builder
            .build()
            .map_err(|e| AssemblyError::InvalidConfig(format!("invalid merge patterns: {e}")))?;

        Ok(Self {
            policies: compiled,
            set,
        })
    }

    pub fn empty() -> Self {
        Self {
            policies: Vec::new(),
            set: GlobSet::empty(),
        }
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// The single action that applies to `path`, or `None` when nothing
    /// matches.
    ///
    /// The longest literal prefix wins, then the lowest order. Two matching
    /// policies equal on both counts are an `AmbiguousPolicy` error.
    pub fn lookup(&self, path: &str) -> Result<Option<MergeAction>> {
        if self.policies.is_empty() {
            return Ok(None);
        }

        let mut best: Option<&CompiledPolicy> = None;
        let mut tie: Option<&CompiledPolicy> = None;
        for index in self.set.matches(path) {
            let candidate = &self.policies[index];
            let Some(current) = best else {
                best = Some(candidate);
                continue;
            };
            let ordering = candidate
                .specificity
                .cmp(&current.specificity)
                .then_with(|| current.order.cmp(&candidate.order));
            match ordering {
                Ordering::Greater => {
                    best = Some(candidate);
                    tie = None;
                }
                Ordering::Equal => tie = Some(candidate),
                Ordering::Less => {}
            }
        }

        if let (Some(first), Some(second)) = (best, tie) {
            return Err(AssemblyError::AmbiguousPolicy {
                path: path.to_string(),
                first: first.pattern.clone(),
                second: second.pattern.clone(),
            });
        }
        Ok(best.map(|p| p.action))
    }
}
