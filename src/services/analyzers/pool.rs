//! Analyzer Pool
//!
//! Static descriptors for every specialty, built once and shared by
//! reference for the lifetime of the engine.

use std::collections::HashSet;

use medpanel_core::finding_schema;

use crate::utils::error::{EngineError, EngineResult};

use super::specialty::Specialty;
use super::templates;

/// Static description of one analyzer.
#[derive(Debug, Clone)]
pub struct AnalyzerDescriptor {
    pub specialty: Specialty,
    /// Specialty focus text framed by the shared preamble at request time
    pub instruction_template: &'static str,
    /// JSON schema the model output must satisfy
    pub output_contract: serde_json::Value,
}

impl AnalyzerDescriptor {
    pub fn new(specialty: Specialty) -> Self {
        Self {
            specialty,
            instruction_template: templates::focus_template(specialty),
            output_contract: finding_schema(),
        }
    }

    /// Full system prompt for this analyzer.
    pub fn system_prompt(&self) -> String {
        templates::system_prompt(self.specialty, self.instruction_template)
    }
}

/// Immutable set of analyzers, in panel order.
#[derive(Debug, Clone)]
pub struct AnalyzerPool {
    descriptors: Vec<AnalyzerDescriptor>,
}

impl Default for AnalyzerPool {
    fn default() -> Self {
        Self::standard()
    }
}

impl AnalyzerPool {
    /// Pool with every specialty.
    pub fn standard() -> Self {
        Self::with_specialties(Specialty::ALL)
    }

    /// Pool restricted to `specialties`. Duplicates are ignored.
    pub fn with_specialties(specialties: impl IntoIterator<Item = Specialty>) -> Self {
        let mut seen = HashSet::new();
        let descriptors = specialties
            .into_iter()
            .filter(|s| seen.insert(*s))
            .map(AnalyzerDescriptor::new)
            .collect();
        Self { descriptors }
    }

    pub fn descriptors(&self) -> &[AnalyzerDescriptor] {
        &self.descriptors
    }

    pub fn specialties(&self) -> Vec<Specialty> {
        self.descriptors.iter().map(|d| d.specialty).collect()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn get(&self, specialty: Specialty) -> Option<&AnalyzerDescriptor> {
        self.descriptors.iter().find(|d| d.specialty == specialty)
    }

    /// Descriptors for `specialties`, in the requested order.
    ///
    /// Errors when a specialty is not part of the pool.
    pub fn select(&self, specialties: &[Specialty]) -> EngineResult<Vec<AnalyzerDescriptor>> {
        specialties
            .iter()
            .map(|s| {
                self.get(*s).cloned().ok_or_else(|| {
                    EngineError::config(format!("specialty '{}' is not in the analyzer pool", s))
                })
            })
            .collect()
    }

    /// Parse configured specialty keys. An empty list means the whole pool.
    pub fn resolve_keys(&self, keys: &[String]) -> EngineResult<Vec<Specialty>> {
        if keys.is_empty() {
            return Ok(self.specialties());
        }
        let specialties = keys
            .iter()
            .map(|k| k.parse::<Specialty>())
            .collect::<EngineResult<Vec<_>>>()?;
        for s in &specialties {
            if self.get(*s).is_none() {
                return Err(EngineError::config(format!(
                    "specialty '{}' is not in the analyzer pool",
                    s
                )));
            }
        }
        Ok(specialties)
    }
}
