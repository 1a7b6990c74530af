//! Run parameters for the best-response loop.

use serde::{Deserialize, Serialize};

use crate::error::EquilibriumError;
use crate::state::SupplierId;

/// Configuration of one equilibrium run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EquilibriumOptions {
    /// Convergence threshold on a sweep's `max_change` (strict: `max_change < tol`).
    pub tol: f64,
    /// Maximum number of sweeps.
    pub max_iter: usize,
    /// Weight of the new best response in the update, in `(0, 1]`.
    pub damping: f64,
    /// Label forwarded to objective construction.
    pub co2_label: String,
    /// Explicit processing order. `None` uses the configured supplier order.
    pub order: Option<Vec<SupplierId>>,
}

impl Default for EquilibriumOptions {
    fn default() -> Self {
        Self {
            tol: 1e-3,
            max_iter: 30,
            damping: 0.6,
            co2_label: "CO2".to_owned(),
            order: None,
        }
    }
}

impl EquilibriumOptions {
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
        self
    }

    pub fn with_co2_label(mut self, label: impl Into<String>) -> Self {
        self.co2_label = label.into();
        self
    }

    pub fn with_order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SupplierId>,
    {
        self.order = Some(order.into_iter().map(Into::into).collect());
        self
    }

    pub fn validate(&self) -> Result<(), EquilibriumError> {
        if !(self.tol.is_finite() && self.tol > 0.0) {
            return Err(EquilibriumError::InvalidOptions(format!(
                "tol must be a positive finite number, got {}",
                self.tol
            )));
        }
        if self.max_iter == 0 {
            return Err(EquilibriumError::InvalidOptions(
                "max_iter must be at least 1".to_owned(),
            ));
        }
        if !(self.damping > 0.0 && self.damping <= 1.0) {
            return Err(EquilibriumError::InvalidOptions(format!(
                "damping must lie in (0, 1], got {}",
                self.damping
            )));
        }
        Ok(())
    }

    /// Processing order for `configured`: the explicit order if set (checked to
    /// be a permutation of `configured`), else `configured` itself.
    pub fn resolve_order(
        &self,
        configured: &[SupplierId],
    ) -> Result<Vec<SupplierId>, EquilibriumError> {
        if configured.is_empty() {
            return Err(EquilibriumError::NoStrategicSuppliers);
        }
        for (i, id) in configured.iter().enumerate() {
            if configured[..i].contains(id) {
                return Err(EquilibriumError::DuplicateSupplier(id.clone()));
            }
        }
        let Some(order) = &self.order else {
            return Ok(configured.to_vec());
        };
        if order.len() != configured.len() {
            return Err(EquilibriumError::InvalidOrder(format!(
                "{} suppliers listed, {} configured",
                order.len(),
                configured.len()
            )));
        }
        for (i, id) in order.iter().enumerate() {
            if !configured.contains(id) {
                return Err(EquilibriumError::InvalidOrder(format!(
                    "`{id}` is not a configured strategic supplier"
                )));
            }
            if order[..i].contains(id) {
                return Err(EquilibriumError::InvalidOrder(format!("`{id}` listed twice")));
            }
        }
        Ok(order.clone())
    }
}
