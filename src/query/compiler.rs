//! Lowers a [`QuerySpec`] into parameterized SQL.
//!
//! Identifiers are checked against the table's fixed column list and the SQL
//! text only ever contains the canonical names from that list. Filter values are
//! always bound as parameters.

use std::collections::HashSet;
use std::fmt;

use rusqlite::types::Value as SqlValue;

use crate::db::helpers::json_to_sql;
use crate::error::{PipelineError, Result};
use crate::models::record::{ENRICHED_COLUMNS, ID_COLUMN, TABLE_NAME};
use crate::query::spec::{Aggregation, Filter, QuerySpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "count" => Some(AggregateFunction::Count),
            "sum" => Some(AggregateFunction::Sum),
            "avg" => Some(AggregateFunction::Avg),
            "min" => Some(AggregateFunction::Min),
            "max" => Some(AggregateFunction::Max),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
        }
    }
}

/// Aggregate argument: a table column, or every row for `COUNT(*)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Column(&'static str),
    AllRows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateTerm {
    pub function: AggregateFunction,
    pub operand: Operand,
}

impl AggregateTerm {
    /// Result column name, e.g. `AVG_userAge` or `COUNT_all`.
    pub fn alias(&self) -> String {
        let function = self.function.as_sql();
        match self.operand {
            Operand::Column(column) => format!("{function}_{column}"),
            Operand::AllRows => format!("{function}_all"),
        }
    }
}

impl fmt::Display for AggregateTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let function = self.function.as_sql();
        match self.operand {
            Operand::Column(column) => write!(f, "{function}({column}) AS {}", self.alias()),
            Operand::AllRows => write!(f, "{function}(*) AS {}", self.alias()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: &'static str,
    pub value: SqlValue,
}

/// Structured form of a query before it becomes SQL text.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub aggregates: Vec<AggregateTerm>,
    pub predicates: Vec<Predicate>,
    pub group_by: Vec<&'static str>,
}

/// SQL text plus its positional parameters, in binding order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

fn resolve_column(name: &str) -> Result<&'static str> {
    if name == ID_COLUMN {
        return Ok(ID_COLUMN);
    }
    ENRICHED_COLUMNS
        .iter()
        .copied()
        .find(|known| *known == name)
        .ok_or_else(|| PipelineError::query_compilation(format!("unknown column '{name}'")))
}

fn plan_aggregate(aggregation: &Aggregation) -> Result<AggregateTerm> {
    let function = AggregateFunction::parse(&aggregation.function).ok_or_else(|| {
        PipelineError::query_compilation(format!(
            "unknown aggregate function '{}'",
            aggregation.function
        ))
    })?;

    let operand = if aggregation.column == "*" {
        if function != AggregateFunction::Count {
            return Err(PipelineError::query_compilation(format!(
                "'*' is only valid with count, not '{}'",
                aggregation.function
            )));
        }
        Operand::AllRows
    } else {
        Operand::Column(resolve_column(&aggregation.column)?)
    };

    Ok(AggregateTerm { function, operand })
}

fn plan_predicate(filter: &Filter) -> Result<Predicate> {
    let column = resolve_column(&filter.column)?;
    let value = json_to_sql(&filter.value).ok_or_else(|| {
        PipelineError::query_compilation(format!(
            "filter on '{column}' needs a string, number or boolean value"
        ))
    })?;
    Ok(Predicate { column, value })
}

fn plan_aggregates(aggregations: &[Aggregation]) -> Result<Vec<AggregateTerm>> {
    let mut aliases = HashSet::new();
    let mut terms = Vec::with_capacity(aggregations.len());
    for aggregation in aggregations {
        let term = plan_aggregate(aggregation)?;
        let alias = term.alias();
        if !aliases.insert(alias.clone()) {
            return Err(PipelineError::query_compilation(format!(
                "aggregation '{alias}' is requested more than once"
            )));
        }
        terms.push(term);
    }
    Ok(terms)
}

impl QueryPlan {
    pub fn build(spec: &QuerySpec) -> Result<Self> {
        Ok(Self {
            aggregates: plan_aggregates(&spec.aggregations)?,
            predicates: spec
                .filters
                .iter()
                .map(plan_predicate)
                .collect::<Result<_>>()?,
            group_by: spec
                .group
                .iter()
                .map(|name| resolve_column(name))
                .collect::<Result<_>>()?,
        })
    }

    pub fn lower(self) -> CompiledQuery {
        let select_list = if self.aggregates.is_empty() {
            "*".to_string()
        } else {
            self.group_by
                .iter()
                .map(|column| column.to_string())
                .chain(self.aggregates.iter().map(AggregateTerm::to_string))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut sql = format!("SELECT {select_list} FROM {TABLE_NAME}");

        if !self.predicates.is_empty() {
            let clauses = self
                .predicates
                .iter()
                .map(|predicate| format!("{} = ?", predicate.column))
                .collect::<Vec<_>>()
                .join(" AND ");
            sql.push_str(" WHERE ");
            sql.push_str(&clauses);
        }

        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }

        CompiledQuery {
            sql,
            params: self.predicates.into_iter().map(|p| p.value).collect(),
        }
    }
}

/// Validates `spec` and lowers it to SQL. Nothing is executed.
pub fn compile(spec: &QuerySpec) -> Result<CompiledQuery> {
    QueryPlan::build(spec).map(QueryPlan::lower)
}
