use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Rule {
    pub id: String,
    pub checklist_item: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
}

#[derive(Deserialize)]
struct RawRule {
    id: Option<String>,
    checklist_item: Option<String>,
    category: Option<String>,
    severity: Option<String>,
}

/// Ordered, immutable rule set.
#[derive(Debug, Clone)]
pub struct RuleStore {
    rules: Vec<Rule>,
}

impl RuleStore {
    /// Read and validate the rules file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::RulesUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self::from_json_str(&raw, &path.display().to_string())?;
        tracing::info!(path = %path.display(), rules = store.len(), "loaded rule set");
        Ok(store)
    }

    /// Parse a rules document. `origin` names the source in error messages.
    pub fn from_json_str(raw: &str, origin: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| ConfigError::RulesMalformed {
                origin: origin.to_string(),
                message: e.to_string(),
            })?;
        let items = match value {
            serde_json::Value::Array(items) => items,
            _ => {
                return Err(ConfigError::RulesNotArray {
                    origin: origin.to_string(),
                })
            }
        };
        if items.is_empty() {
            return Err(ConfigError::NoRules {
                origin: origin.to_string(),
            });
        }

        let mut rules = Vec::with_capacity(items.len());
        let mut seen = HashSet::new();
        for (index, item) in items.into_iter().enumerate() {
            let raw: RawRule =
                serde_json::from_value(item).map_err(|e| ConfigError::RulesMalformed {
                    origin: origin.to_string(),
                    message: format!("rule #{}: {}", index + 1, e),
                })?;
            let checklist_item = raw
                .checklist_item
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| ConfigError::RuleMissingField {
                    origin: origin.to_string(),
                    index: index + 1,
                    field: "checklist_item",
                })?;
            // Unnumbered sources get positional ids, R1..Rn.
            let id = raw
                .id
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| format!("R{}", index + 1));
            if !seen.insert(id.clone()) {
                return Err(ConfigError::DuplicateRuleId {
                    origin: origin.to_string(),
                    id,
                });
            }
            rules.push(Rule {
                id,
                checklist_item,
                category: raw.category.filter(|s| !s.trim().is_empty()),
                severity: raw.severity.filter(|s| !s.trim().is_empty()),
            });
        }
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// The set of ids a model verdict may legitimately reference.
    pub fn ids(&self) -> HashSet<&str> {
        self.rules.iter().map(|r| r.id.as_str()).collect()
    }
}
