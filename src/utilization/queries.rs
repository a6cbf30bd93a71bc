//! SQL builders for the utilization endpoints.
//!
//! Every statement reads the warehouse through the `fleet` schema:
//! `fleet.aircraft`, `fleet.aircraft_utilization_monthly` and
//! `fleet.portfolio_aircraft`. Scope filters become bind parameters; a missing
//! portfolio drops the membership join entirely.

use crate::utilization::dimension::GroupBy;
use crate::utilization::mapper::SERIES_START_YEAR;
use crate::utilization::template::{
    filtered_ids_cte, instantiate, CompiledQuery, Cte, GroupFragments, QueryError, SelectBlock,
    SqlParam, SqlParams, SqlStatement,
};
use crate::utilization::types::{FleetScope, LessorListRequest, MonthlyUtilizationRequest};

/// Kilometres per statute mile, applied to per-ASK intensities.
pub const KM_PER_MILE: f64 = 1.60934;

/// Placeholders for the scope filters that were actually bound.
struct ScopeBinds {
    portfolio: Option<String>,
    operator: Option<String>,
    lessor: Option<String>,
}

impl ScopeBinds {
    fn bind(scope: &FleetScope, params: &mut SqlParams) -> Self {
        Self {
            portfolio: scope.portfolio_id.map(|id| params.bind(SqlParam::Int(id))),
            operator: scope.operator_id.map(|id| params.bind(SqlParam::Int(id))),
            lessor: scope.lessor_id.map(|id| params.bind(SqlParam::Int(id))),
        }
    }

    /// Adds the portfolio join and the scope predicates to a block reading
    /// `fleet.aircraft` as `a`.
    fn apply(&self, mut block: SelectBlock) -> SelectBlock {
        if let Some(ref p) = self.portfolio {
            block = block
                .join("JOIN fleet.portfolio_aircraft pa ON pa.aircraft_id = a.aircraft_id")
                .filter(format!("pa.portfolio_id = {p}"));
        }
        if let Some(ref p) = self.operator {
            block = block.filter(format!("a.operator_organization_id = {p}"));
        }
        if let Some(ref p) = self.lessor {
            block = block.filter(format!("a.lessor_organization_id = {p}"));
        }
        block
    }
}

const DIMENSION_COLUMNS: [&str; 10] = [
    "a.aircraft_market_class_id",
    "a.aircraft_market_class",
    "a.aircraft_family_id",
    "a.aircraft_family",
    "a.aircraft_type_id",
    "a.aircraft_type",
    "a.aircraft_series_id",
    "a.aircraft_series",
    "a.aircraft_serial_number",
    "a.operator_organization_id",
];

const METRIC_COLUMNS: [&str; 8] = [
    "u.hours",
    "u.cycles",
    "u.hours_per_cycle",
    "u.co2_emissions_kg",
    "u.seats",
    "u.flight_distance_km",
    "u.co2_kg_per_seat",
    "u.co2_g_per_ask",
];

/// Aircraft-month rows in scope, one per (aircraft, year, month) when
/// `dedupe` is set.
fn aircraft_months(scope: &ScopeBinds, with_metrics: bool, dedupe: bool) -> SelectBlock {
    let mut block = SelectBlock::new("fleet.aircraft_utilization_monthly u")
        .columns(["u.aircraft_id", "u.year", "u.month"])
        .columns(DIMENSION_COLUMNS)
        .join("JOIN fleet.aircraft a ON a.aircraft_id = u.aircraft_id")
        .filter(format!("u.year >= {SERIES_START_YEAR}"));
    if with_metrics {
        block = block.columns(METRIC_COLUMNS);
    }
    block = scope.apply(block);
    if dedupe {
        block = block.qualify("ROW_NUMBER() OVER (PARTITION BY u.aircraft_id, u.year, u.month) = 1");
    }
    block
}

fn period_and_group_columns(fragments: &GroupFragments) -> Vec<String> {
    let mut columns = vec![
        "CAST(year AS INTEGER) AS \"Year\"".to_string(),
        "CAST(month AS INTEGER) AS \"Month\"".to_string(),
    ];
    columns.extend(fragments.group_columns());
    columns.push("COUNT(DISTINCT aircraft_id) AS \"NumberOfAircraftInGroup\"".to_string());
    columns
}

fn qualifying_aircraft(qualifier: &str) -> String {
    format!("COUNT(DISTINCT CASE WHEN {qualifier} THEN aircraft_id END)")
}

/// `round(sum of all values / qualifying aircraft, 2)`, or 0 when no aircraft
/// qualifies. The qualifier narrows the denominator only, so the numerator is
/// the same sum the matching total reports.
fn guarded_average(value: &str, qualifier: &str, alias: &str) -> String {
    let denominator = qualifying_aircraft(qualifier);
    format!(
        "CAST(CASE WHEN {denominator} = 0 THEN 0 \
         ELSE COALESCE(ROUND(SUM({value}) / {denominator}, 2), 0) END \
         AS DOUBLE) AS \"{alias}\""
    )
}

fn rounded_total(value: &str, alias: &str) -> String {
    format!("CAST(COALESCE(ROUND(SUM({value}), 2), 0) AS DOUBLE) AS \"{alias}\"")
}

fn aircraft_count(qualifier: &str, alias: &str) -> String {
    format!("{} AS \"{alias}\"", qualifying_aircraft(qualifier))
}

fn hours_and_cycle_columns() -> Vec<String> {
    vec![
        guarded_average("hours", "hours >= 0", "AverageHours"),
        rounded_total("hours", "TotalHours"),
        aircraft_count("hours >= 0", "NumberOfAircraftWithHours"),
        guarded_average("cycles", "cycles >= 0", "AverageCycles"),
        rounded_total("cycles", "TotalCycles"),
        aircraft_count("cycles >= 0", "NumberOfAircraftWithCycles"),
        guarded_average("hours_per_cycle", "hours_per_cycle > 0", "AverageHoursPerCycle"),
        aircraft_count("hours_per_cycle > 0", "NumberOfAircraftWithHoursPerCycle"),
    ]
}

fn emissions_columns() -> Vec<String> {
    let per_seat = "co2_emissions_kg > 0 AND seats > 0";
    let per_distance = "co2_emissions_kg > 0 AND flight_distance_km > 0";
    vec![
        guarded_average("co2_kg_per_seat", per_seat, "AverageCo2KgPerSeat"),
        rounded_total("co2_kg_per_seat", "TotalCo2KgPerSeat"),
        guarded_average("co2_g_per_ask", per_distance, "AverageCo2GPerAsk"),
        rounded_total("co2_g_per_ask", "TotalCo2GPerAsk"),
        guarded_average(
            &format!("co2_g_per_ask * {KM_PER_MILE}"),
            per_distance,
            "AverageCo2GPerAsm",
        ),
    ]
}

/// Monthly utilization per group: aircraft counts, optionally hours/cycles,
/// optionally emissions intensities.
pub fn compile_monthly_utilization(
    request: &MonthlyUtilizationRequest,
) -> Result<CompiledQuery, QueryError> {
    if request.group_by.is_none() && !request.include_baseline {
        return Err(QueryError::MissingGrouping);
    }
    if request.is_emissions && !request.is_hours_and_cycle {
        return Err(QueryError::EmissionsRequireHoursAndCycles);
    }
    let features = request.features();

    let mut params = SqlParams::default();
    let ids = params.bind(SqlParam::Text(request.filter_ids_param()));
    let scope = ScopeBinds::bind(&request.scope, &mut params);

    let blocks = instantiate(request.group_by, request.include_baseline, |fragments| {
        let mut columns = period_and_group_columns(fragments);
        if features.hours_and_cycles {
            columns.extend(hours_and_cycle_columns());
        }
        if features.emissions {
            columns.extend(emissions_columns());
        }
        SelectBlock::new("aircraft_months")
            .columns(columns)
            .group_by("year")
            .group_by("month")
    })?;

    let statement = SqlStatement::new()
        .with(filtered_ids_cte(&ids))
        .with(Cte::new(
            "aircraft_months",
            aircraft_months(&scope, features.hours_and_cycles, true).render(),
        ))
        .union(blocks)
        .order_by("\"GroupId\" NULLS FIRST")
        .order_by("\"Year\"")
        .order_by("\"Month\"");

    let sql = statement.render();
    tracing::debug!(
        group_by = ?request.group_by,
        include_baseline = request.include_baseline,
        global_fleet = request.scope.is_global_fleet(),
        params = params.len(),
        "compiled monthly utilization query"
    );
    Ok(CompiledQuery::new(sql, params))
}

/// Distinct aircraft per group per month.
pub fn compile_group_counts(
    request: &MonthlyUtilizationRequest,
) -> Result<CompiledQuery, QueryError> {
    let mut params = SqlParams::default();
    let ids = params.bind(SqlParam::Text(request.filter_ids_param()));
    let scope = ScopeBinds::bind(&request.scope, &mut params);

    let blocks = instantiate(request.group_by, request.include_baseline, |fragments| {
        SelectBlock::new("fleet_months")
            .columns(period_and_group_columns(fragments))
            .group_by("year")
            .group_by("month")
    })?;

    let statement = SqlStatement::new()
        .with(filtered_ids_cte(&ids))
        .with(Cte::new(
            "fleet_months",
            aircraft_months(&scope, false, false).render(),
        ))
        .union(blocks)
        .order_by("\"GroupId\" NULLS FIRST")
        .order_by("\"Year\"")
        .order_by("\"Month\"");

    Ok(CompiledQuery::new(statement.render(), params))
}

/// Dimension values visible to a scope. Serial numbers are only listed for a
/// portfolio; the global fleet has too many to offer as options.
pub fn compile_group_options(scope: &FleetScope) -> CompiledQuery {
    let mut params = SqlParams::default();
    let binds = ScopeBinds::bind(scope, &mut params);

    let blocks = GroupBy::ALL
        .into_iter()
        .filter(|g| *g != GroupBy::AircraftSerialNumber || !scope.is_global_fleet())
        .map(|g| {
            let cols = g.columns();
            let block = SelectBlock::new("fleet.aircraft a")
                .columns([
                    format!("'{}' AS \"GroupBy\"", g.as_str()),
                    format!("CAST(a.{} AS BIGINT) AS \"Id\"", cols.id_column),
                    format!("a.{} AS \"Name\"", cols.name_column),
                ])
                .filter(format!("a.{} IS NOT NULL", cols.id_column));
            binds.apply(block)
        });

    let statement = SqlStatement::new()
        .union(blocks)
        .order_by("\"GroupBy\"")
        .order_by("\"Name\"");

    CompiledQuery::new(statement.render(), params)
}

/// Lessors visible to a scope, narrowed to the chosen dimension values.
pub fn compile_lessors(request: &LessorListRequest) -> CompiledQuery {
    let mut params = SqlParams::default();
    let ids = params.bind(SqlParam::Text(request.filter_ids_param()));
    let binds = ScopeBinds::bind(&request.scope, &mut params);

    let mut block = SelectBlock::new("fleet.aircraft a")
        .columns([
            "CAST(a.lessor_organization_id AS BIGINT) AS \"LessorId\"",
            "a.lessor_organization AS \"Lessor\"",
        ])
        .filter("a.lessor_organization_id IS NOT NULL");
    if let Some(group_by) = request.group_by {
        block = block.filter(format!(
            "a.{} IN (SELECT Number FROM filtered_ids)",
            group_by.columns().id_column
        ));
    }
    block = binds.apply(block).group_by("a.lessor_organization_id").group_by("a.lessor_organization");

    let statement = SqlStatement::new()
        .with(filtered_ids_cte(&ids))
        .union([block])
        .order_by("\"Lessor\"");

    CompiledQuery::new(statement.render(), params)
}

/// Operators visible to a scope.
pub fn compile_operators(scope: &FleetScope) -> CompiledQuery {
    let mut params = SqlParams::default();
    let binds = ScopeBinds::bind(scope, &mut params);

    let block = SelectBlock::new("fleet.aircraft a")
        .columns([
            "CAST(a.operator_organization_id AS BIGINT) AS \"OperatorId\"",
            "a.operator_organization AS \"Operator\"",
        ])
        .filter("a.operator_organization_id IS NOT NULL");
    let block = binds
        .apply(block)
        .group_by("a.operator_organization_id")
        .group_by("a.operator_organization");

    let statement = SqlStatement::new().union([block]).order_by("\"Operator\"");
    CompiledQuery::new(statement.render(), params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn request(group_by: Option<GroupBy>, include_baseline: bool) -> MonthlyUtilizationRequest {
        MonthlyUtilizationRequest {
            scope: FleetScope {
                portfolio_id: Some(42),
                ..Default::default()
            },
            group_by,
            group_by_filter_ids: BTreeSet::from([3, 1]),
            include_baseline,
            is_emissions: false,
            is_hours_and_cycle: false,
        }
    }

    /// Column aliases of each `UNION` branch, in order.
    fn branch_aliases(sql: &str) -> Vec<Vec<String>> {
        sql.split("\nUNION\n")
            .map(|branch| {
                let select = branch.rsplit("SELECT\n").next().unwrap_or_default();
                let list = select.split("\nFROM ").next().unwrap_or_default();
                list.split(",\n")
                    .map(|c| c.rsplit_once(" AS ").map(|(_, a)| a).unwrap_or(c).trim().to_string())
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_neither_baseline_nor_dimension_is_configuration_error() {
        let err = compile_monthly_utilization(&request(None, false)).unwrap_err();
        assert_eq!(err, QueryError::MissingGrouping);
        let err = compile_group_counts(&request(None, false)).unwrap_err();
        assert_eq!(err, QueryError::MissingGrouping);
    }

    #[test]
    fn test_emissions_without_hours_is_configuration_error() {
        let mut req = request(Some(GroupBy::AircraftType), true);
        req.is_emissions = true;
        let err = compile_monthly_utilization(&req).unwrap_err();
        assert_eq!(err, QueryError::EmissionsRequireHoursAndCycles);
    }

    #[test]
    fn test_baseline_and_dimension_union_once() {
        let mut req = request(Some(GroupBy::AircraftFamily), true);
        req.is_hours_and_cycle = true;
        req.is_emissions = true;
        let q = compile_monthly_utilization(&req).unwrap();

        assert!(q.sql.starts_with("WITH filtered_ids AS ("));
        assert_eq!(q.sql.matches("\nUNION\n").count(), 1);
        assert!(!q.sql.contains("UNION ALL"));
        assert!(q.sql.contains("aircraft_family_id IN (SELECT Number FROM filtered_ids)"));

        let branches = branch_aliases(&q.sql);
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[0], branches[1]);
        assert_eq!(branches[0].len(), 6 + 8 + 5);
    }

    #[test]
    fn test_params_bind_filter_ids_then_scope() {
        let mut req = request(Some(GroupBy::MarketClass), false);
        req.scope.operator_id = Some(7);
        let q = compile_monthly_utilization(&req).unwrap();
        assert_eq!(
            q.params,
            vec![
                SqlParam::Text("1,3".into()),
                SqlParam::Int(42),
                SqlParam::Int(7)
            ]
        );
        assert!(q.sql.contains("pa.portfolio_id = $2"));
        assert!(q.sql.contains("a.operator_organization_id = $3"));
        assert!(!q.sql.contains("lessor_organization_id ="));
    }

    #[test]
    fn test_global_fleet_omits_portfolio_join() {
        let mut req = request(None, true);
        req.scope.portfolio_id = None;
        req.group_by_filter_ids.clear();
        let q = compile_monthly_utilization(&req).unwrap();
        assert!(!q.sql.contains("portfolio_aircraft"));
        assert!(!q.sql.contains("portfolio_id"));
        assert_eq!(q.params, vec![SqlParam::Text(String::new())]);
    }

    #[test]
    fn test_metric_blocks_follow_flags() {
        let q = compile_monthly_utilization(&request(None, true)).unwrap();
        assert!(q.sql.contains("\"NumberOfAircraftInGroup\""));
        assert!(!q.sql.contains("AverageHours"));
        assert!(!q.sql.contains("u.hours"));

        let mut req = request(None, true);
        req.is_hours_and_cycle = true;
        let q = compile_monthly_utilization(&req).unwrap();
        assert!(q.sql.contains("\"AverageHoursPerCycle\""));
        assert!(q.sql.contains("hours_per_cycle > 0"));
        assert!(!q.sql.contains("Co2"));

        req.is_emissions = true;
        let q = compile_monthly_utilization(&req).unwrap();
        assert!(q.sql.contains("co2_emissions_kg > 0 AND seats > 0"));
        assert!(q.sql.contains("co2_emissions_kg > 0 AND flight_distance_km > 0"));
        assert!(q.sql.contains("co2_g_per_ask * 1.60934"));
    }

    #[test]
    fn test_average_is_zero_guarded() {
        let column = guarded_average("hours", "hours >= 0", "AverageHours");
        assert!(column.contains(
            "CASE WHEN COUNT(DISTINCT CASE WHEN hours >= 0 THEN aircraft_id END) = 0 THEN 0"
        ));
        assert!(column.ends_with("AS \"AverageHours\""));
    }

    #[test]
    fn test_average_sums_every_value() {
        let column = guarded_average("hours", "hours >= 0", "AverageHours");
        assert!(column.contains("ROUND(SUM(hours) / COUNT(DISTINCT"), "got {column}");
        assert!(!column.contains("SUM(CASE"));
    }

    #[test]
    fn test_aircraft_months_are_deduplicated() {
        let q = compile_monthly_utilization(&request(None, true)).unwrap();
        assert!(q.sql.contains(
            "QUALIFY ROW_NUMBER() OVER (PARTITION BY u.aircraft_id, u.year, u.month) = 1"
        ));
        assert!(q.sql.contains("u.year >= 2017"));
    }

    #[test]
    fn test_group_counts_shape() {
        let q = compile_group_counts(&request(Some(GroupBy::AircraftSerialNumber), true)).unwrap();
        assert!(q.sql.starts_with("WITH filtered_ids AS ("));
        assert!(q.sql.contains("aircraft_id IN (SELECT Number FROM filtered_ids)"));
        assert!(!q.sql.contains("QUALIFY"));
        let branches = branch_aliases(&q.sql);
        assert_eq!(branches[0], branches[1]);
        assert_eq!(branches[0].len(), 6);
    }

    #[test]
    fn test_group_options_list_serials_only_for_portfolio() {
        let portfolio = FleetScope {
            portfolio_id: Some(1),
            ..Default::default()
        };
        let q = compile_group_options(&portfolio);
        assert_eq!(q.sql.matches("\nUNION\n").count(), 4);
        assert!(q.sql.contains("'AircraftSerialNumber' AS \"GroupBy\""));

        let q = compile_group_options(&FleetScope::default());
        assert_eq!(q.sql.matches("\nUNION\n").count(), 3);
        assert!(!q.sql.contains("AircraftSerialNumber"));
        assert!(q.params.is_empty());
    }

    #[test]
    fn test_lessors_filtered_by_dimension_when_present() {
        let req = LessorListRequest {
            scope: FleetScope {
                lessor_id: Some(5),
                ..Default::default()
            },
            group_by: Some(GroupBy::AircraftSeries),
            group_by_filter_ids: BTreeSet::from([10]),
        };
        let q = compile_lessors(&req);
        assert!(q.sql.contains("a.aircraft_series_id IN (SELECT Number FROM filtered_ids)"));
        assert!(q.sql.contains("a.lessor_organization_id = $2"));
        assert_eq!(q.params, vec![SqlParam::Text("10".into()), SqlParam::Int(5)]);

        let q = compile_lessors(&LessorListRequest::default());
        assert!(!q.sql.contains("IN (SELECT Number FROM filtered_ids)"));
    }

    #[test]
    fn test_operators_scope() {
        let q = compile_operators(&FleetScope {
            portfolio_id: Some(3),
            lessor_id: Some(4),
            ..Default::default()
        });
        assert!(q.sql.contains("pa.portfolio_id = $1"));
        assert!(q.sql.contains("a.lessor_organization_id = $2"));
        assert_eq!(q.params, vec![SqlParam::Int(3), SqlParam::Int(4)]);
    }
}
