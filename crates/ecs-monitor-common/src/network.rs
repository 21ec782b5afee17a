//! VPC to environment label mapping

use crate::model::Network;
use std::collections::HashMap;

/// Derive the environment label from a VPC name.
///
/// The VPC literally named `dev` maps to `develop`; every other name is used
/// unchanged.
pub fn environment_label(network_name: &str) -> &str {
    match network_name {
        "dev" => "develop",
        other => other,
    }
}

/// Mapping from network id to environment label, rebuilt every run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkLookup {
    labels: HashMap<String, String>,
}

impl NetworkLookup {
    /// Look up the environment label for a network id
    pub fn environment(&self, network_id: &str) -> Option<&str> {
        self.labels.get(network_id).map(String::as_str)
    }

    /// Label used in metric label sets; unknown networks yield an empty string
    pub fn label_or_empty(&self, network_id: &str) -> &str {
        self.environment(network_id).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl FromIterator<Network> for NetworkLookup {
    fn from_iter<I: IntoIterator<Item = Network>>(iter: I) -> Self {
        Self {
            labels: iter
                .into_iter()
                .map(|n| {
                    let label = environment_label(&n.name).to_string();
                    (n.id, label)
                })
                .collect(),
        }
    }
}
