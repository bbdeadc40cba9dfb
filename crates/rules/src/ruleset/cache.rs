use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::compiled::CompiledRuleSet;
use super::error::RuleSetError;

/// Compiles each distinct rule configuration once and hands out shared
/// references to the result.
///
/// Keyed by the rule file's text, so two engines loading the same
/// configuration share one [`CompiledRuleSet`].
#[derive(Debug, Default)]
pub struct RuleSetCache {
    compiled: Mutex<HashMap<String, Arc<CompiledRuleSet>>>,
}

impl RuleSetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compile(&self, yaml: &str) -> Result<Arc<CompiledRuleSet>, RuleSetError> {
        let mut compiled = self.compiled.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(set) = compiled.get(yaml) {
            return Ok(Arc::clone(set));
        }
        let set = Arc::new(CompiledRuleSet::from_yaml_str(yaml)?);
        compiled.insert(yaml.to_string(), Arc::clone(&set));
        Ok(set)
    }

    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Arc<CompiledRuleSet>, RuleSetError> {
        let yaml = std::fs::read_to_string(path)?;
        self.get_or_compile(&yaml)
    }

    pub fn len(&self) -> usize {
        self.compiled.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
