//! Instance inclusion rules
//!
//! A [`FilterRule`] combines four predicate categories. Patterns are OR-ed
//! within the name category and every exclusion pattern must be avoided, so
//! the overall rule is "OR within a category, AND across categories":
//!
//! 1. name include patterns (empty = match all)
//! 2. tag-key exclusion patterns
//! 3. tag-value exclusion patterns
//!
//! Exact tags are not re-checked here; they are sent to the provider as a
//! server-side pre-filter on the listing request.

use crate::model::{Instance, Tag};
use regex::Regex;
use thiserror::Error;

/// Rule construction errors
#[derive(Debug, Error)]
pub enum FilterError {
    /// A pattern failed to compile
    #[error("invalid {category} pattern '{pattern}': {source}")]
    InvalidPattern {
        category: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A `key=value` argument had no `=` or an empty key
    #[error("invalid tag '{0}', expected key=value")]
    InvalidTag(String),
}

/// Outcome of evaluating a rule against one instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Instance passed every check
    Included,
    /// No name pattern matched
    NameMismatch,
    /// A tag key matched this exclusion pattern
    ExcludedByTagKey(String),
    /// A tag value matched this exclusion pattern
    ExcludedByTagValue(String),
}

impl Decision {
    pub fn is_included(&self) -> bool {
        matches!(self, Decision::Included)
    }
}

/// Immutable inclusion rule for one discovery run
#[derive(Debug, Clone, Default)]
pub struct FilterRule {
    name_include: Vec<Regex>,
    exact_tags: Vec<Tag>,
    tag_key_exclude: Vec<Regex>,
    tag_value_exclude: Vec<Regex>,
}

impl FilterRule {
    /// Compile a rule from raw pattern strings.
    pub fn new<S: AsRef<str>>(
        name_include: &[S],
        exact_tags: Vec<Tag>,
        tag_key_exclude: &[S],
        tag_value_exclude: &[S],
    ) -> Result<Self, FilterError> {
        Ok(Self {
            name_include: compile("name", name_include)?,
            exact_tags,
            tag_key_exclude: compile("tag key", tag_key_exclude)?,
            tag_value_exclude: compile("tag value", tag_value_exclude)?,
        })
    }

    /// Tags to send to the provider as an exact-match pre-filter
    pub fn exact_tags(&self) -> &[Tag] {
        &self.exact_tags
    }

    /// Evaluate the rule, reporting which check decided the outcome.
    pub fn evaluate(&self, instance: &Instance) -> Decision {
        let name_match = self.name_include.is_empty()
            || self
                .name_include
                .iter()
                .any(|re| re.is_match(&instance.name));
        if !name_match {
            return Decision::NameMismatch;
        }

        for re in &self.tag_key_exclude {
            if instance.tags.iter().any(|t| re.is_match(&t.key)) {
                return Decision::ExcludedByTagKey(re.as_str().to_string());
            }
        }

        for re in &self.tag_value_exclude {
            if instance.tags.iter().any(|t| re.is_match(&t.value)) {
                return Decision::ExcludedByTagValue(re.as_str().to_string());
            }
        }

        Decision::Included
    }

    /// Decide inclusion of an instance
    pub fn matches(&self, instance: &Instance) -> bool {
        self.evaluate(instance).is_included()
    }
}

fn compile<S: AsRef<str>>(category: &'static str, patterns: &[S]) -> Result<Vec<Regex>, FilterError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p.as_ref()).map_err(|source| FilterError::InvalidPattern {
                category,
                pattern: p.as_ref().to_string(),
                source,
            })
        })
        .collect()
}
