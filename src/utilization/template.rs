use crate::utilization::dimension::{GroupBy, NULL_AIRCRAFT_TYPE};
use duckdb::types::ToSqlOutput;

/// Label of the ungrouped "all aircraft" row.
pub const BASELINE_LABEL: &str = "All Aircraft";

/// Caller mistakes detected before any SQL is built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("either groupBy or includeBaseline must be requested")]
    MissingGrouping,

    #[error("unrecognized groupBy dimension: {0}")]
    UnknownDimension(String),

    #[error("emissions metrics require isHoursAndCycle")]
    EmissionsRequireHoursAndCycles,
}

/// A single bind value. Kept as an owned enum so compiled queries can cross
/// into `spawn_blocking`.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Int(i64),
    Text(String),
}

impl duckdb::ToSql for SqlParam {
    fn to_sql(&self) -> duckdb::Result<ToSqlOutput<'_>> {
        match self {
            SqlParam::Int(v) => v.to_sql(),
            SqlParam::Text(v) => v.to_sql(),
        }
    }
}

/// Positional bind list. Each `bind` returns the `$n` placeholder for the
/// value, which may then be referenced from any block of the statement.
#[derive(Debug, Default)]
pub struct SqlParams {
    values: Vec<SqlParam>,
}

impl SqlParams {
    pub fn bind(&mut self, value: SqlParam) -> String {
        self.values.push(value);
        format!("${}", self.values.len())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// SQL text plus the values for its placeholders, in placeholder order.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl CompiledQuery {
    pub fn new(sql: String, params: SqlParams) -> Self {
        Self {
            sql,
            params: params.values,
        }
    }
}

/// One `SELECT` with its clauses held separately until rendered.
#[derive(Debug, Clone, Default)]
pub struct SelectBlock {
    columns: Vec<String>,
    from: String,
    joins: Vec<String>,
    predicates: Vec<String>,
    group_by: Vec<String>,
    qualify: Option<String>,
}

impl SelectBlock {
    pub fn new(from: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            ..Self::default()
        }
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.columns.push(column.into());
        self
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn join(mut self, join: impl Into<String>) -> Self {
        self.joins.push(join.into());
        self
    }

    pub fn filter(mut self, predicate: impl Into<String>) -> Self {
        self.predicates.push(predicate.into());
        self
    }

    pub fn group_by(mut self, column: impl Into<String>) -> Self {
        self.group_by.push(column.into());
        self
    }

    pub fn qualify(mut self, rule: impl Into<String>) -> Self {
        self.qualify = Some(rule.into());
        self
    }

    /// Output column list, used to check union compatibility.
    pub fn column_aliases(&self) -> Vec<&str> {
        self.columns
            .iter()
            .map(|c| match c.rsplit_once(" AS ") {
                Some((_, alias)) => alias.trim(),
                None => c.trim(),
            })
            .collect()
    }

    pub fn render(&self) -> String {
        let mut sql = String::from("SELECT\n    ");
        sql.push_str(&self.columns.join(",\n    "));
        sql.push_str("\nFROM ");
        sql.push_str(&self.from);
        for join in &self.joins {
            sql.push('\n');
            sql.push_str(join);
        }
        if !self.predicates.is_empty() {
            sql.push_str("\nWHERE ");
            sql.push_str(&self.predicates.join("\n    AND "));
        }
        if !self.group_by.is_empty() {
            sql.push_str("\nGROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }
        if let Some(ref rule) = self.qualify {
            sql.push_str("\nQUALIFY ");
            sql.push_str(rule);
        }
        sql
    }
}

/// Named common table expression.
#[derive(Debug, Clone)]
pub struct Cte {
    name: String,
    body: String,
}

impl Cte {
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
        }
    }
}

/// Turns the comma-separated id string bound at `placeholder` into a
/// `Number` row set. Blank and non-numeric entries are dropped.
pub fn filtered_ids_cte(placeholder: &str) -> Cte {
    Cte::new(
        "filtered_ids",
        format!(
            "SELECT DISTINCT TRY_CAST(trim(ids.id_text) AS BIGINT) AS Number\n\
             FROM (SELECT UNNEST(string_split(CAST({placeholder} AS VARCHAR), ',')) AS id_text) AS ids\n\
             WHERE TRY_CAST(trim(ids.id_text) AS BIGINT) IS NOT NULL"
        ),
    )
}

/// CTEs followed by one or more select blocks joined with `UNION`.
#[derive(Debug, Clone, Default)]
pub struct SqlStatement {
    ctes: Vec<Cte>,
    blocks: Vec<SelectBlock>,
    order_by: Vec<String>,
}

impl SqlStatement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, cte: Cte) -> Self {
        self.ctes.push(cte);
        self
    }

    pub fn union(mut self, blocks: impl IntoIterator<Item = SelectBlock>) -> Self {
        self.blocks.extend(blocks);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.order_by.push(column.into());
        self
    }

    pub fn render(&self) -> String {
        let mut sql = String::new();
        if !self.ctes.is_empty() {
            sql.push_str("WITH ");
            let ctes: Vec<String> = self
                .ctes
                .iter()
                .map(|c| format!("{} AS (\n{}\n)", c.name, c.body))
                .collect();
            sql.push_str(&ctes.join(",\n"));
            sql.push('\n');
        }
        let blocks: Vec<String> = self.blocks.iter().map(SelectBlock::render).collect();
        sql.push_str(&blocks.join("\nUNION\n"));
        if !self.order_by.is_empty() {
            sql.push_str("\nORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }
        sql
    }
}

/// Per-instantiation pieces a base template is filled with: the baseline
/// fragments or one dimension's fragments.
#[derive(Debug, Clone)]
pub struct GroupFragments {
    pub dimension: Option<GroupBy>,
    label: String,
    id: String,
    extra_select: &'static str,
    group_by: Vec<&'static str>,
    predicate: Option<String>,
}

impl GroupFragments {
    pub fn baseline() -> Self {
        Self {
            dimension: None,
            label: format!("'{BASELINE_LABEL}'"),
            id: "NULL".to_string(),
            extra_select: NULL_AIRCRAFT_TYPE,
            group_by: Vec::new(),
            predicate: None,
        }
    }

    pub fn dimension(group_by: GroupBy) -> Self {
        let cols = group_by.columns();
        let mut grouping = vec![cols.id_column, cols.name_column];
        grouping.extend(cols.extra_group_by);
        Self {
            dimension: Some(group_by),
            label: cols.name_column.to_string(),
            id: cols.id_column.to_string(),
            extra_select: cols.extra_select,
            group_by: grouping,
            predicate: Some(format!(
                "{} IN (SELECT Number FROM filtered_ids)",
                cols.id_column
            )),
        }
    }

    /// `Group`, `GroupId` and `AircraftType` select entries, in that order.
    pub fn group_columns(&self) -> [String; 3] {
        [
            format!("{} AS \"Group\"", self.label),
            format!("CAST({} AS BIGINT) AS \"GroupId\"", self.id),
            self.extra_select.to_string(),
        ]
    }

    fn apply(&self, mut block: SelectBlock) -> SelectBlock {
        if let Some(ref predicate) = self.predicate {
            block = block.filter(predicate.clone());
        }
        for column in &self.group_by {
            block = block.group_by(*column);
        }
        block
    }
}

/// Instantiates `template` for the baseline and/or the dimension. Grouped
/// blocks are restricted to `filtered_ids` and grouped by the dimension's
/// columns on top of whatever the template groups by.
pub fn instantiate<F>(
    group_by: Option<GroupBy>,
    include_baseline: bool,
    mut template: F,
) -> Result<Vec<SelectBlock>, QueryError>
where
    F: FnMut(&GroupFragments) -> SelectBlock,
{
    if group_by.is_none() && !include_baseline {
        return Err(QueryError::MissingGrouping);
    }

    let mut blocks = Vec::with_capacity(2);
    if include_baseline {
        let fragments = GroupFragments::baseline();
        blocks.push(fragments.apply(template(&fragments)));
    }
    if let Some(dimension) = group_by {
        let fragments = GroupFragments::dimension(dimension);
        blocks.push(fragments.apply(template(&fragments)));
    }
    Ok(blocks)
}
