//! Rule repositories: where the engine gets its rule set for each run.

use rowgraph_core::Result;
use tracing::debug;

use crate::document::RuleSet;

/// Trait for rule sources. Loaded once at the start of every run.
pub trait RuleRepository: Send + Sync {
    fn load(&self) -> Result<RuleSet>;
}

/// Repository over a rule set built in code.
pub struct StaticRuleRepository {
    rules: RuleSet,
}

impl StaticRuleRepository {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }
}

impl RuleRepository for StaticRuleRepository {
    fn load(&self) -> Result<RuleSet> {
        Ok(self.rules.clone())
    }
}

/// Repository over a JSON rule-set document, validated on every load.
pub struct JsonRuleRepository {
    document: String,
}

impl JsonRuleRepository {
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
        }
    }
}

impl RuleRepository for JsonRuleRepository {
    fn load(&self) -> Result<RuleSet> {
        let rules = RuleSet::from_json(&self.document)?;
        debug!("Loaded {} rules from JSON document", rules.len());
        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowgraph_core::Error;

    #[test]
    fn test_json_repository_validates_on_load() {
        let repo = JsonRuleRepository::new(
            r#"[{"name": "x", "rule_type": "node", "source": {"type": "table", "value": "t"}}]"#,
        );
        assert!(matches!(repo.load(), Err(Error::InvalidRule { .. })));
    }

    #[test]
    fn test_static_repository_returns_rules() {
        let repo = StaticRuleRepository::new(RuleSet::default());
        assert!(repo.load().unwrap().is_empty());
    }
}
