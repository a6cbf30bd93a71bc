use crate::error::{AppError, AppResult};
use crate::utilization::conn::DuckDbConn;
use crate::utilization::dimension::GroupBy;
use crate::utilization::mapper::SeriesNormalizer;
use crate::utilization::queries;
use crate::utilization::template::{CompiledQuery, BASELINE_LABEL};
use crate::utilization::types::{
    EmissionsMetrics, FilterOptionsResponse, FleetScope, GroupKey, GroupOption,
    HoursAndCycleMetrics, LessorListRequest, LessorOption, MetricFeatures,
    MonthlyUtilizationRequest, MonthlyUtilizationRow, OperatorOption, UtilizationGroup,
};
use chrono::{DateTime, Utc};
use duckdb::{params_from_iter, Row};
use std::collections::HashMap;

/// Compile, execute and normalize a monthly utilization request.
pub async fn fetch_monthly_utilization(
    conn: &DuckDbConn,
    request: &MonthlyUtilizationRequest,
    now: DateTime<Utc>,
) -> AppResult<Vec<UtilizationGroup>> {
    let query = queries::compile_monthly_utilization(request)?;
    let features = request.features();
    let rows = load_rows(conn, query, features).await?;
    let groups = partition(rows, request.include_baseline);
    Ok(SeriesNormalizer::new(now, features).normalize(groups))
}

/// Aircraft counts per group and month, gap-filled like utilization series.
pub async fn fetch_group_counts(
    conn: &DuckDbConn,
    request: &MonthlyUtilizationRequest,
    now: DateTime<Utc>,
) -> AppResult<Vec<UtilizationGroup>> {
    let query = queries::compile_group_counts(request)?;
    let features = MetricFeatures::default();
    let rows = load_rows(conn, query, features).await?;
    let groups = partition(rows, request.include_baseline);
    Ok(SeriesNormalizer::new(now, features).normalize(groups))
}

async fn load_rows(
    conn: &DuckDbConn,
    query: CompiledQuery,
    features: MetricFeatures,
) -> AppResult<Vec<MonthlyUtilizationRow>> {
    let CompiledQuery { sql, params } = query;
    conn.query(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params), |row| read_row(row, features))?;
        rows.collect::<Result<Vec<_>, _>>()
    })
    .await
    .map_err(AppError::Warehouse)
}

/// Column layout: period and group columns, then the hours/cycles block,
/// then the emissions block, each only when compiled in.
fn read_row(row: &Row<'_>, features: MetricFeatures) -> duckdb::Result<MonthlyUtilizationRow> {
    let raw_month: i32 = row.get(1)?;
    let month = u32::try_from(raw_month)
        .ok()
        .filter(|m| (1..=12).contains(m))
        .ok_or_else(|| {
            duckdb::Error::FromSqlConversionFailure(
                1,
                duckdb::types::Type::Int,
                format!("month {raw_month} is not a calendar month").into(),
            )
        })?;
    let hours_and_cycles = if features.hours_and_cycles {
        Some(HoursAndCycleMetrics {
            average_hours: row.get(6)?,
            total_hours: row.get(7)?,
            number_of_aircraft_with_hours: row.get(8)?,
            average_cycles: row.get(9)?,
            total_cycles: row.get(10)?,
            number_of_aircraft_with_cycles: row.get(11)?,
            average_hours_per_cycle: row.get(12)?,
            number_of_aircraft_with_hours_per_cycle: row.get(13)?,
        })
    } else {
        None
    };
    let emissions = if features.emissions {
        Some(EmissionsMetrics {
            average_co2_kg_per_seat: row.get(14)?,
            total_co2_kg_per_seat: row.get(15)?,
            average_co2_g_per_ask: row.get(16)?,
            total_co2_g_per_ask: row.get(17)?,
            average_co2_g_per_asm: row.get(18)?,
        })
    } else {
        None
    };

    Ok(MonthlyUtilizationRow {
        year: row.get(0)?,
        month,
        group: row.get(2)?,
        group_id: row.get(3)?,
        aircraft_type: row.get(4)?,
        number_of_aircraft_in_group: row.get(5)?,
        hours_and_cycles,
        emissions,
    })
}

/// Split a flat result set into groups keyed by (groupId, group), keeping
/// first-seen order. A requested baseline is always present, even when the
/// data engine returned no rows for it.
pub fn partition(rows: Vec<MonthlyUtilizationRow>, include_baseline: bool) -> Vec<UtilizationGroup> {
    let mut groups: Vec<UtilizationGroup> = Vec::new();
    let mut index: HashMap<(Option<i64>, String), usize> = HashMap::new();

    if include_baseline {
        let key = GroupKey {
            group_id: None,
            group: BASELINE_LABEL.to_string(),
            aircraft_type: None,
        };
        index.insert((None, key.group.clone()), 0);
        groups.push(UtilizationGroup {
            key,
            rows: Vec::new(),
        });
    }

    for row in rows {
        let slot = *index
            .entry((row.group_id, row.group.clone()))
            .or_insert_with(|| {
                groups.push(UtilizationGroup {
                    key: GroupKey::of(&row),
                    rows: Vec::new(),
                });
                groups.len() - 1
            });
        groups[slot].rows.push(row);
    }

    groups
}

pub async fn fetch_group_options(
    conn: &DuckDbConn,
    scope: &FleetScope,
) -> AppResult<Vec<GroupOption>> {
    let CompiledQuery { sql, params } = queries::compile_group_options(scope);
    conn.query(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params), |row| {
            let raw: String = row.get(0)?;
            let group_by = raw.parse::<GroupBy>().map_err(|e| {
                duckdb::Error::FromSqlConversionFailure(0, duckdb::types::Type::Text, Box::new(e))
            })?;
            Ok(GroupOption {
                group_by,
                id: row.get(1)?,
                name: row.get(2)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>()
    })
    .await
    .map_err(AppError::Warehouse)
}

pub async fn fetch_lessors(
    conn: &DuckDbConn,
    request: &LessorListRequest,
) -> AppResult<Vec<LessorOption>> {
    let CompiledQuery { sql, params } = queries::compile_lessors(request);
    conn.query(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params), |row| {
            Ok(LessorOption {
                lessor_id: row.get(0)?,
                lessor: row.get(1)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>()
    })
    .await
    .map_err(AppError::Warehouse)
}

pub async fn fetch_operators(
    conn: &DuckDbConn,
    scope: &FleetScope,
) -> AppResult<Vec<OperatorOption>> {
    let CompiledQuery { sql, params } = queries::compile_operators(scope);
    conn.query(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params), |row| {
            Ok(OperatorOption {
                operator_id: row.get(0)?,
                operator: row.get(1)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>()
    })
    .await
    .map_err(AppError::Warehouse)
}

/// Independent option lookups run concurrently; the first failure fails the
/// whole lookup.
pub async fn resolve_filter_options(
    conn: &DuckDbConn,
    scope: &FleetScope,
) -> AppResult<FilterOptionsResponse> {
    let lessor_request = LessorListRequest {
        scope: scope.clone(),
        ..Default::default()
    };
    let (groups, lessors, operators) = tokio::try_join!(
        fetch_group_options(conn, scope),
        fetch_lessors(conn, &lessor_request),
        fetch_operators(conn, scope),
    )?;
    Ok(FilterOptionsResponse {
        groups,
        lessors,
        operators,
    })
}
