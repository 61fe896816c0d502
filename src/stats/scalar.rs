//! Single numeric statistic

use super::{pad_slot, parse_number, truncated_mean, Lifecycle, StatKind};
use crate::error::StatResult;

/// One number per simulation
///
/// Readings are averaged over `repeat` simulations. Each reading is truncated
/// toward zero before it enters the sum, so `1.5` reduces to `1.0`.
#[derive(Debug, Clone)]
pub struct Scalar {
    pub(crate) life: Lifecycle,
    content: Vec<f64>,
    reduced: Option<f64>,
}

impl Scalar {
    pub fn new(repeat: usize) -> Self {
        Self {
            life: Lifecycle::new(StatKind::Scalar, repeat),
            content: Vec::new(),
            reduced: None,
        }
    }

    /// Append one reading
    pub fn set(&mut self, value: &str) -> StatResult<()> {
        self.life.check_settable()?;
        let number = parse_number(self.life.label(), "value", value)?;
        self.content.push(number);
        Ok(())
    }

    pub fn content(&self) -> &[f64] {
        &self.content
    }

    pub fn balance(&mut self) -> StatResult<()> {
        if self.life.check_settable().is_ok() {
            pad_slot(
                self.life.label(),
                "value",
                &mut self.content,
                self.life.repeat(),
            )?;
            self.life.mark_balanced();
        }
        Ok(())
    }

    pub fn reduce(&mut self) -> StatResult<()> {
        self.life.check_reducible()?;
        self.reduced = Some(truncated_mean(&self.content, self.life.repeat()));
        self.life.mark_reduced();
        Ok(())
    }

    pub fn reduced(&self) -> StatResult<f64> {
        self.life.check_reduced()?;
        Ok(self.reduced.unwrap_or_default())
    }
}
