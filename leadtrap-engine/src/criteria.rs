//! Search criteria mapping
//!
//! Translates `{state, city, strategy}` into the provider's criteria JSON
//! and derives the logical watch-set name used for idempotent find-or-create.

use serde_json::{json, Value};

/// Search criteria for one scan or enrichment run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCriteria {
    pub state: String,
    pub city: Option<String>,
    pub strategy: String,
}

impl SearchCriteria {
    pub fn new(state: impl Into<String>, city: Option<String>, strategy: impl Into<String>) -> Self {
        SearchCriteria {
            state: state.into(),
            city,
            strategy: strategy.into(),
        }
    }

    /// Logical watch-set name; resolution by this name is what makes
    /// watch-set creation idempotent across runs.
    pub fn watch_set_name(&self) -> String {
        let city = self.city.as_deref().unwrap_or("ALL").to_uppercase();
        format!("Auto_Monitor_{}_{}", city, self.strategy)
    }

    /// Provider criteria payload: location clauses plus strategy clauses.
    pub fn provider_criteria(&self) -> Value {
        let mut clauses = vec![json!({ "name": "State", "value": [self.state] })];

        if let Some(city) = &self.city {
            // Provider expects city names uppercased
            clauses.push(json!({ "name": "City", "value": [city.to_uppercase()] }));
        }

        clauses.extend(strategy_clauses(&self.strategy));
        Value::Array(clauses)
    }
}

/// Filter rules per investment strategy; unknown strategies contribute none
fn strategy_clauses(strategy: &str) -> Vec<Value> {
    match strategy {
        "tax_delinquent" => vec![json!({ "name": "inTaxDelinquency", "value": [1] })],
        "pre_foreclosure" => vec![json!({
            "name": "ForeclosureStage",
            "value": ["Preforeclosure", "Preforeclosure-NTS"]
        })],
        "vacant" => vec![json!({ "name": "isSiteVacant", "value": [1] })],
        "absentee" => vec![json!({ "name": "isNotSameMailingOrExempt", "value": [1] })],
        "inherited" => vec![json!({ "name": "isDeceasedProperty", "value": [1] })],
        _ => vec![],
    }
}
