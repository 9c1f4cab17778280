//! Declarative query request.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub column: String,
    pub function: String,
}

/// Equality predicate `column = value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

/// Absent keys mean no constraint of that kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    #[serde(default)]
    pub aggregations: Vec<Aggregation>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub group: Vec<String>,
}

impl QuerySpec {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|err| {
            PipelineError::query_compilation(format!("invalid query request: {err}"))
        })
    }

    pub fn aggregate(mut self, function: &str, column: &str) -> Self {
        self.aggregations.push(Aggregation {
            column: column.to_string(),
            function: function.to_string(),
        });
        self
    }

    pub fn filter(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            column: column.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn group_by(mut self, column: &str) -> Self {
        self.group.push(column.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_keys_default_to_empty() {
        let spec = QuerySpec::from_json("{}").unwrap();
        assert_eq!(spec, QuerySpec::default());
    }

    #[test]
    fn parses_full_request() {
        let spec = QuerySpec::from_json(
            r#"{
                "aggregations": [{"column": "userAge", "function": "avg"}],
                "filters": [{"column": "userGender", "value": "F"}],
                "group": ["userCity"]
            }"#,
        )
        .unwrap();
        assert_eq!(
            spec,
            QuerySpec::default()
                .aggregate("avg", "userAge")
                .filter("userGender", "F")
                .group_by("userCity")
        );
        assert_eq!(spec.filters[0].value, json!("F"));
    }

    #[test]
    fn wrong_shape_is_compilation_error() {
        let err = QuerySpec::from_json(r#"{"group": "userCity"}"#).unwrap_err();
        assert!(matches!(err, PipelineError::QueryCompilation(_)));
    }
}
