//! Read-only snapshots of ECS resources
//!
//! These are the provider-independent shapes the rest of the crate works
//! with. Wire-format decoding lives next to the HTTP client.

use crate::filter::FilterError;
use std::fmt;
use std::str::FromStr;

/// A key/value label attached to a cloud resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Parse a `key=value` argument. Splits on the first `=`, so values may
/// themselves contain `=`.
impl FromStr for Tag {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok(Tag::new(key, value)),
            _ => Err(FilterError::InvalidTag(s.to_string())),
        }
    }
}

/// ECS compute instance as returned by a listing call
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Instance {
    /// Instance identifier (e.g. `i-bp1...`)
    pub id: String,
    /// Human-readable instance name
    pub name: String,
    /// VPC the instance belongs to
    pub network_id: String,
    /// Tags in provider order
    pub tags: Vec<Tag>,
    /// Spot strategy (`NoSpot`, `SpotAsPriceGo`, `SpotWithPriceLimit`)
    pub spot_strategy: String,
    /// Instance type (e.g. `ecs.g6.large`)
    pub instance_type: String,
}

impl Instance {
    /// Whether the instance runs on preemptible capacity
    pub fn is_spot(&self) -> bool {
        self.spot_strategy
            .starts_with(crate::defaults::SPOT_STRATEGY_PREFIX)
    }
}

/// Virtual network (VPC)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    pub id: String,
    pub name: String,
}

/// One page of a paginated listing
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Items on this page, in provider order
    pub items: Vec<T>,
    /// Total number of items across all pages
    pub total_count: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total_count: u32) -> Self {
        Self { items, total_count }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tag() {
        let tag: Tag = "cluster=prod".parse().unwrap();
        assert_eq!(tag, Tag::new("cluster", "prod"));

        let tag: Tag = "expr=a=b".parse().unwrap();
        assert_eq!(tag.value, "a=b");

        let tag: Tag = "empty=".parse().unwrap();
        assert_eq!(tag.value, "");
    }

    #[test]
    fn test_parse_tag_invalid() {
        assert!("cluster".parse::<Tag>().is_err());
        assert!("=prod".parse::<Tag>().is_err());
        assert!("".parse::<Tag>().is_err());
    }

    #[test]
    fn test_is_spot() {
        let mut instance = Instance {
            spot_strategy: "SpotAsPriceGo".to_string(),
            ..Default::default()
        };
        assert!(instance.is_spot());
        instance.spot_strategy = "SpotWithPriceLimit".to_string();
        assert!(instance.is_spot());
        instance.spot_strategy = "NoSpot".to_string();
        assert!(!instance.is_spot());
    }
}
