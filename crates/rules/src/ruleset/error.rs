/// Errors raised while loading or compiling a rule set.
#[derive(Debug, thiserror::Error)]
pub enum RuleSetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Duplicate rule id: {0}")]
    DuplicateRule(String),

    #[error("Rule {0} has no conditions")]
    EmptyRule(String),

    #[error("Rule {rule_id} has an invalid cooldown: {value:?}")]
    InvalidCooldown { rule_id: String, value: String },

    #[error("Validation error: {0}")]
    Validation(String),
}
