//! Typed query builder.
//!
//! Callers describe a query as data — table, columns, filter tree, ordering —
//! and the builder renders parameterized SQL. Column and table names are
//! validated against a strict identifier grammar and then double-quoted, so
//! no caller-supplied text is ever spliced into SQL; values always travel as
//! bind parameters.

use circles_index_core::{ColumnValue, IndexError, TableSchema, ValueType};

// ─── Filter tree ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Like,
}

impl Comparison {
    fn operator(&self) -> &'static str {
        match self {
            Self::Equals => "=",
            Self::NotEquals => "<>",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::Like => "LIKE",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Filter {
    /// `column <op> $n`
    Compare {
        column: String,
        comparison: Comparison,
        value: ColumnValue,
    },
    /// `column IN ($n, $n+1, …)`
    In {
        column: String,
        values: Vec<ColumnValue>,
    },
    /// All sub-filters joined with `AND`.
    And(Vec<Filter>),
    /// All sub-filters joined with `OR`.
    Or(Vec<Filter>),
}

impl Filter {
    pub fn equals(column: &str, value: impl Into<ColumnValue>) -> Self {
        Self::Compare {
            column: column.to_string(),
            comparison: Comparison::Equals,
            value: value.into(),
        }
    }

    pub fn compare(column: &str, comparison: Comparison, value: impl Into<ColumnValue>) -> Self {
        Self::Compare {
            column: column.to_string(),
            comparison,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone)]
pub struct OrderBy {
    pub column: String,
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn ascending(column: &str) -> Self {
        Self {
            column: column.to_string(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(column: &str) -> Self {
        Self {
            column: column.to_string(),
            direction: SortDirection::Descending,
        }
    }
}

// ─── Select ──────────────────────────────────────────────────────────────────

/// A select statement as data. Render with [`Select::to_sql`].
#[derive(Debug, Clone)]
pub struct Select {
    pub table: String,
    pub columns: Vec<String>,
    pub filter: Option<Filter>,
    pub order_by: Vec<OrderBy>,
    pub distinct: bool,
    pub limit: Option<i64>,
}

impl Select {
    pub fn new(table: &str, columns: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            table: table.to_string(),
            columns: columns.into_iter().map(str::to_string).collect(),
            filter: None,
            order_by: Vec::new(),
            distinct: false,
            limit: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Renders the statement as SQL plus its bind parameters, in order.
    pub fn to_sql(&self) -> Result<ParameterizedSql, IndexError> {
        self.render(None)
    }

    /// Like [`Select::to_sql`], but NUMERIC columns of `schema` are cast to
    /// text in the select list so the driver can read them without a decimal
    /// type mapping.
    pub fn to_sql_for(&self, schema: &TableSchema) -> Result<ParameterizedSql, IndexError> {
        self.render(Some(schema))
    }

    fn render(&self, schema: Option<&TableSchema>) -> Result<ParameterizedSql, IndexError> {
        if self.columns.is_empty() {
            return Err(IndexError::Validation("select with no columns".into()));
        }

        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        let columns: Result<Vec<String>, IndexError> = self
            .columns
            .iter()
            .map(|c| {
                let quoted = quote_identifier(c)?;
                let is_numeric = schema
                    .map(|s| {
                        s.columns
                            .iter()
                            .any(|col| col.name == *c && col.ty == ValueType::BigInt)
                    })
                    .unwrap_or(false);
                Ok(if is_numeric {
                    format!("{quoted}::text AS {quoted}")
                } else {
                    quoted
                })
            })
            .collect();
        sql.push_str(&columns?.join(", "));
        sql.push_str(" FROM ");
        sql.push_str(&quote_identifier(&self.table)?);

        let mut parameters = Vec::new();
        if let Some(filter) = &self.filter {
            sql.push_str(" WHERE ");
            render_filter(filter, &mut sql, &mut parameters)?;
        }

        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            let mut first = true;
            for order in &self.order_by {
                if !first {
                    sql.push_str(", ");
                }
                first = false;
                sql.push_str(&quote_identifier(&order.column)?);
                sql.push_str(match order.direction {
                    SortDirection::Ascending => " ASC",
                    SortDirection::Descending => " DESC",
                });
            }
        }

        if let Some(limit) = self.limit {
            if limit < 0 {
                return Err(IndexError::Validation(format!("negative limit {limit}")));
            }
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        Ok(ParameterizedSql { sql, parameters })
    }
}

/// Rendered SQL with its bind parameters in `$1..$n` order.
#[derive(Debug, Clone)]
pub struct ParameterizedSql {
    pub sql: String,
    pub parameters: Vec<ColumnValue>,
}

fn render_filter(
    filter: &Filter,
    sql: &mut String,
    parameters: &mut Vec<ColumnValue>,
) -> Result<(), IndexError> {
    match filter {
        Filter::Compare {
            column,
            comparison,
            value,
        } => {
            sql.push_str(&quote_identifier(column)?);
            sql.push(' ');
            sql.push_str(comparison.operator());
            sql.push(' ');
            push_placeholder(sql, parameters, value.clone());
        }
        Filter::In { column, values } => {
            if values.is_empty() {
                // IN over the empty set matches nothing.
                sql.push_str("FALSE");
                return Ok(());
            }
            sql.push_str(&quote_identifier(column)?);
            sql.push_str(" IN (");
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                push_placeholder(sql, parameters, value.clone());
            }
            sql.push(')');
        }
        Filter::And(filters) | Filter::Or(filters) => {
            if filters.is_empty() {
                return Err(IndexError::Validation("empty conjunction".into()));
            }
            let joiner = if matches!(filter, Filter::And(_)) {
                " AND "
            } else {
                " OR "
            };
            sql.push('(');
            for (i, sub) in filters.iter().enumerate() {
                if i > 0 {
                    sql.push_str(joiner);
                }
                render_filter(sub, sql, parameters)?;
            }
            sql.push(')');
        }
    }
    Ok(())
}

fn push_placeholder(sql: &mut String, parameters: &mut Vec<ColumnValue>, value: ColumnValue) {
    let cast = matches!(value, ColumnValue::BigInt(_));
    parameters.push(value);
    sql.push_str(&format!("${}", parameters.len()));
    // U256 values are bound as decimal text and cast server-side.
    if cast {
        sql.push_str("::numeric");
    }
}

/// Validates `name` against `[A-Za-z_][A-Za-z0-9_]*` and double-quotes it.
pub fn quote_identifier(name: &str) -> Result<String, IndexError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if !valid {
        return Err(IndexError::Validation(format!(
            "'{name}' is not a valid identifier"
        )));
    }
    Ok(format!("\"{name}\""))
}
