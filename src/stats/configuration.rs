//! Configuration string statistic

use super::{Lifecycle, StatKind};
use crate::error::StatResult;

/// Default reduced value when no reading was seen
pub const DEFAULT_ON_EMPTY: &str = "None";

/// A configuration value (simulator option, binary name, ...)
///
/// Always considered balanced. Reduces to the first reading, or to the
/// `onEmpty` value when nothing was recorded.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub(crate) life: Lifecycle,
    on_empty: String,
    content: Vec<String>,
    reduced: Option<String>,
}

impl Configuration {
    pub fn new(on_empty: impl Into<String>) -> Self {
        Self {
            life: Lifecycle::new(StatKind::Configuration, 1),
            on_empty: on_empty.into(),
            content: Vec::new(),
            reduced: None,
        }
    }

    pub fn on_empty(&self) -> &str {
        &self.on_empty
    }

    pub fn content(&self) -> &[String] {
        &self.content
    }

    pub fn set(&mut self, value: &str) -> StatResult<()> {
        self.life.check_settable()?;
        self.content.push(value.to_string());
        Ok(())
    }

    pub fn balance(&mut self) -> StatResult<()> {
        self.life.mark_balanced();
        Ok(())
    }

    pub fn reduce(&mut self) -> StatResult<()> {
        self.life.check_reducible()?;
        let value = self
            .content
            .first()
            .cloned()
            .unwrap_or_else(|| self.on_empty.clone());
        self.reduced = Some(value);
        self.life.mark_reduced();
        Ok(())
    }

    pub fn reduced(&self) -> StatResult<&str> {
        self.life.check_reduced()?;
        Ok(self.reduced.as_deref().unwrap_or(&self.on_empty))
    }
}
