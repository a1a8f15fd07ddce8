//! Engine namespace conflict detection.
//!
//! Every mounted endpoint claims an alias in the engine namespace, and every
//! credential claims a secret name. Two endpoints claiming the same name
//! would make the second attach fail, so collisions are reported at
//! configuration validation time instead.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

/// A name in the engine namespace that only one endpoint may claim.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Resource {
    /// An alias a database or catalog is attached under.
    Alias(String),
    /// The name of a registered secret.
    Secret(String),
}

impl Resource {
    /// Create an alias resource.
    ///
    /// Engine identifiers are case-insensitive, so the name is lowercased.
    ///
    /// # Examples
    ///
    /// ```
    /// use floe_core::config::Resource;
    ///
    /// assert_eq!(Resource::alias("Lake"), Resource::alias("lake"));
    /// ```
    pub fn alias(name: &str) -> Self {
        Self::Alias(name.to_ascii_lowercase())
    }

    /// Create a secret resource.
    pub fn secret(name: &str) -> Self {
        Self::Secret(name.to_ascii_lowercase())
    }

    /// Detect resource conflicts from a set of endpoint declarations.
    ///
    /// Returns a map from conflicting resource to the set of keys that all
    /// claim it. Empty map means no conflicts.
    ///
    /// # Examples
    ///
    /// ```
    /// use floe_core::config::Resource;
    ///
    /// let endpoints = vec![
    ///     ("storage.s3a", vec![Resource::alias("s3a"), Resource::secret("s3a_secret")]),
    ///     ("postgres.pgsrc", vec![Resource::alias("pgsrc"), Resource::secret("pgsrc_secret")]),
    ///     ("destination.catalog", vec![Resource::alias("s3a")]), // conflict!
    /// ];
    ///
    /// let conflicts = Resource::conflicts(endpoints);
    /// assert_eq!(conflicts.len(), 1);
    ///
    /// let keys = conflicts.get(&Resource::alias("s3a")).unwrap();
    /// assert!(keys.contains(&"storage.s3a"));
    /// assert!(keys.contains(&"destination.catalog"));
    /// ```
    pub fn conflicts<K>(
        components: impl IntoIterator<Item = (K, Vec<Resource>)>,
    ) -> HashMap<Resource, HashSet<K>>
    where
        K: Eq + Hash + Clone,
    {
        let mut resource_to_keys: HashMap<Resource, HashSet<K>> = HashMap::new();

        for (key, resources) in components {
            for resource in resources {
                resource_to_keys
                    .entry(resource)
                    .or_default()
                    .insert(key.clone());
            }
        }

        resource_to_keys
            .into_iter()
            .filter(|(_, keys)| keys.len() > 1)
            .collect()
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alias(name) => write!(f, "alias:{name}"),
            Self::Secret(name) => write!(f, "secret:{name}"),
        }
    }
}
