use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A user-authored formula targeting one custom field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaDefinition {
    pub id: String,
    /// Display name or id of the target custom field.
    pub field_key: String,
    pub expression: String,
    /// Ascending: lower values run earlier when no dependency decides.
    #[serde(default)]
    pub priority: i64,
    /// Events this formula reacts to. `None` or empty means every event.
    #[serde(default)]
    pub events: Option<BTreeSet<String>>,
}

impl FormulaDefinition {
    pub fn new(id: impl Into<String>, field_key: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            field_key: field_key.into(),
            expression: expression.into(),
            priority: 0,
            events: None,
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.events = Some(events.into_iter().map(Into::into).collect());
        self
    }

    /// Whether this formula runs for `event`. A pass without a triggering
    /// event (historical replay) runs every formula.
    pub fn applies_to(&self, event: Option<&str>) -> bool {
        match (&self.events, event) {
            (None, _) | (_, None) => true,
            (Some(set), Some(ev)) => set.is_empty() || set.contains(ev),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_filtering() {
        let any = FormulaDefinition::new("f1", "A", "1");
        assert!(any.applies_to(Some("NEW_TIME_ENTRY")));
        assert!(any.applies_to(None));

        let scoped = FormulaDefinition::new("f2", "A", "1").with_events(["TIME_ENTRY_UPDATED"]);
        assert!(scoped.applies_to(Some("TIME_ENTRY_UPDATED")));
        assert!(!scoped.applies_to(Some("NEW_TIME_ENTRY")));
        assert!(scoped.applies_to(None));

        let empty = FormulaDefinition::new("f3", "A", "1").with_events(Vec::<String>::new());
        assert!(empty.applies_to(Some("NEW_TIME_ENTRY")));
    }
}
