//! Strategy state: the committed sales of every strategic supplier.

use std::fmt;
use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::error::EquilibriumError;

/// Opaque strategic-supplier identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupplierId(String);

impl SupplierId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SupplierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SupplierId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SupplierId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Sales quantities of one supplier, one entry per node/period/product index.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SalesVector(Vec<f64>);

impl SalesVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, f64> {
        self.0.iter()
    }

    /// Sum over all indices.
    pub fn total(&self) -> f64 {
        self.0.iter().sum()
    }
}

impl From<Vec<f64>> for SalesVector {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

impl Index<usize> for SalesVector {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.0[index]
    }
}

impl<'a> IntoIterator for &'a SalesVector {
    type Item = &'a f64;
    type IntoIter = std::slice::Iter<'a, f64>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Current committed sales for every strategic supplier.
///
/// Entries keep the order they were created in (the configured supplier
/// order). The supplier set is fixed at construction: entries are replaced in
/// place but never added or removed afterwards.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StrategyState {
    entries: Vec<(SupplierId, SalesVector)>,
}

impl StrategyState {
    /// Build a state from `(supplier, sales)` pairs. Duplicate ids are rejected.
    pub fn from_entries<I>(entries: I) -> Result<Self, EquilibriumError>
    where
        I: IntoIterator<Item = (SupplierId, SalesVector)>,
    {
        let mut out: Vec<(SupplierId, SalesVector)> = Vec::new();
        for (id, sales) in entries {
            if out.iter().any(|(existing, _)| *existing == id) {
                return Err(EquilibriumError::DuplicateSupplier(id));
            }
            out.push((id, sales));
        }
        if out.is_empty() {
            return Err(EquilibriumError::NoStrategicSuppliers);
        }
        Ok(Self { entries: out })
    }

    pub fn get(&self, supplier: &SupplierId) -> Option<&SalesVector> {
        self.entries
            .iter()
            .find(|(id, _)| id == supplier)
            .map(|(_, sales)| sales)
    }

    pub fn contains(&self, supplier: &SupplierId) -> bool {
        self.get(supplier).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Suppliers in state order.
    pub fn suppliers(&self) -> impl Iterator<Item = &SupplierId> {
        self.entries.iter().map(|(id, _)| id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SupplierId, &SalesVector)> {
        self.entries.iter().map(|(id, sales)| (id, sales))
    }

    /// Replace the entry of an existing supplier and return the previous sales.
    pub(crate) fn replace(
        &mut self,
        supplier: &SupplierId,
        sales: SalesVector,
    ) -> Result<SalesVector, EquilibriumError> {
        let slot = self
            .entries
            .iter_mut()
            .find(|(id, _)| id == supplier)
            .map(|(_, slot)| slot)
            .ok_or_else(|| EquilibriumError::UnknownSupplier(supplier.clone()))?;
        Ok(std::mem::replace(slot, sales))
    }
}
