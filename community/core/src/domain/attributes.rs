// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Entity Attributes
//!
//! Attributes are modelled as a map from a case-sensitive attribute id to an
//! ordered set of string values. Both agents and communities carry them, and
//! search filters are evaluated against them.
//!
//! Mutation from the outside happens through [`AttributeModification`] lists,
//! which is how join/modify requests describe attribute changes on the wire.

use serde::{Deserialize, Serialize};
use std::collections::{btree_map, BTreeMap, BTreeSet};
use std::fmt;

/// Attribute set of an entity: id → ordered set of values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, BTreeSet<String>>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style helper adding one value to `id`.
    pub fn with(mut self, id: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_value(id, value);
        self
    }

    /// Values of `id`, if the attribute is present.
    pub fn get(&self, id: &str) -> Option<&BTreeSet<String>> {
        self.0.get(id)
    }

    /// First value of `id` in sort order.
    pub fn first_value(&self, id: &str) -> Option<&str> {
        self.0.get(id).and_then(|values| values.iter().next()).map(String::as_str)
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.0.contains_key(id)
    }

    pub fn contains_value(&self, id: &str, value: &str) -> bool {
        self.0.get(id).is_some_and(|values| values.contains(value))
    }

    /// Add a value. Returns `true` when the set changed.
    pub fn add_value(&mut self, id: impl Into<String>, value: impl Into<String>) -> bool {
        self.0.entry(id.into()).or_default().insert(value.into())
    }

    /// Remove a single value; an attribute left without values is dropped.
    pub fn remove_value(&mut self, id: &str, value: &str) -> bool {
        let Some(values) = self.0.get_mut(id) else {
            return false;
        };
        let removed = values.remove(value);
        if values.is_empty() {
            self.0.remove(id);
        }
        removed
    }

    /// Replace every value of `id`. An empty value set removes the attribute.
    pub fn set(&mut self, id: impl Into<String>, values: BTreeSet<String>) {
        let id = id.into();
        if values.is_empty() {
            self.0.remove(&id);
        } else {
            self.0.insert(id, values);
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<BTreeSet<String>> {
        self.0.remove(id)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, BTreeSet<String>> {
        self.0.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Apply a list of modifications in order. Returns `true` if anything changed.
    pub fn apply(&mut self, modifications: &[AttributeModification]) -> bool {
        let before = self.clone();
        for modification in modifications {
            modification.apply_to(self);
        }
        *self != before
    }

    /// Modifications that bring `self` in line with `desired` without removing
    /// attributes `desired` does not mention.
    ///
    /// Attributes missing from `self` become [`ModificationOp::Add`]; attributes
    /// whose value sets differ become [`ModificationOp::Replace`].
    pub fn delta_to(&self, desired: &Attributes) -> Vec<AttributeModification> {
        desired
            .iter()
            .filter_map(|(id, values)| match self.get(id) {
                None => Some(AttributeModification::add(id.clone(), values.clone())),
                Some(current) if current != values => {
                    Some(AttributeModification::replace(id.clone(), values.clone()))
                }
                Some(_) => None,
            })
            .collect()
    }
}

impl<K, V> FromIterator<(K, V)> for Attributes
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attributes = Attributes::new();
        for (id, value) in iter {
            attributes.add_value(id, value);
        }
        attributes
    }
}

impl<'a> IntoIterator for &'a Attributes {
    type Item = (&'a String, &'a BTreeSet<String>);
    type IntoIter = btree_map::Iter<'a, String, BTreeSet<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, (id, values)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            let joined: Vec<&str> = values.iter().map(String::as_str).collect();
            write!(f, "{}={}", id, joined.join("|"))?;
        }
        write!(f, "]")
    }
}

/// Kind of attribute modification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModificationOp {
    /// Add the values to the attribute, creating it if absent.
    Add,
    /// Replace all values of the attribute.
    Replace,
    /// Remove the listed values, or the whole attribute when none are listed.
    Remove,
}

/// One attribute change, as carried by modify requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeModification {
    pub op: ModificationOp,
    pub id: String,
    #[serde(default)]
    pub values: BTreeSet<String>,
}

impl AttributeModification {
    pub fn add(id: impl Into<String>, values: BTreeSet<String>) -> Self {
        Self { op: ModificationOp::Add, id: id.into(), values }
    }

    pub fn add_value(id: impl Into<String>, value: impl Into<String>) -> Self {
        Self::add(id, BTreeSet::from([value.into()]))
    }

    pub fn replace(id: impl Into<String>, values: BTreeSet<String>) -> Self {
        Self { op: ModificationOp::Replace, id: id.into(), values }
    }

    pub fn remove(id: impl Into<String>, values: BTreeSet<String>) -> Self {
        Self { op: ModificationOp::Remove, id: id.into(), values }
    }

    pub fn remove_value(id: impl Into<String>, value: impl Into<String>) -> Self {
        Self::remove(id, BTreeSet::from([value.into()]))
    }

    fn apply_to(&self, attributes: &mut Attributes) {
        match self.op {
            ModificationOp::Add => {
                for value in &self.values {
                    attributes.add_value(self.id.clone(), value.clone());
                }
            }
            ModificationOp::Replace => attributes.set(self.id.clone(), self.values.clone()),
            ModificationOp::Remove if self.values.is_empty() => {
                attributes.remove(&self.id);
            }
            ModificationOp::Remove => {
                for value in &self.values {
                    attributes.remove_value(&self.id, value);
                }
            }
        }
    }
}
