use crate::utilization::dimension::GroupBy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which aircraft a query covers. No portfolio means the global fleet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetScope {
    pub portfolio_id: Option<i64>,
    pub operator_id: Option<i64>,
    pub lessor_id: Option<i64>,
}

impl FleetScope {
    pub fn is_global_fleet(&self) -> bool {
        self.portfolio_id.is_none()
    }
}

/// Body of the monthly utilization and group count endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyUtilizationRequest {
    #[serde(flatten)]
    pub scope: FleetScope,
    pub group_by: Option<GroupBy>,
    #[serde(default)]
    pub group_by_filter_ids: BTreeSet<i64>,
    #[serde(default)]
    pub include_baseline: bool,
    #[serde(default)]
    pub is_emissions: bool,
    #[serde(default)]
    pub is_hours_and_cycle: bool,
}

impl MonthlyUtilizationRequest {
    /// Filter ids as the single comma-separated bind value.
    pub fn filter_ids_param(&self) -> String {
        join_ids(&self.group_by_filter_ids)
    }

    pub fn features(&self) -> MetricFeatures {
        MetricFeatures {
            hours_and_cycles: self.is_hours_and_cycle,
            emissions: self.is_emissions && self.is_hours_and_cycle,
        }
    }

    /// Request-shape checks done before compilation.
    pub fn validate(&self) -> Result<(), String> {
        require_filter_ids(self.group_by, &self.group_by_filter_ids)
    }
}

/// Body of the lessor listing endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessorListRequest {
    #[serde(flatten)]
    pub scope: FleetScope,
    pub group_by: Option<GroupBy>,
    #[serde(default)]
    pub group_by_filter_ids: BTreeSet<i64>,
}

impl LessorListRequest {
    pub fn filter_ids_param(&self) -> String {
        join_ids(&self.group_by_filter_ids)
    }

    pub fn validate(&self) -> Result<(), String> {
        require_filter_ids(self.group_by, &self.group_by_filter_ids)
    }
}

fn require_filter_ids(group_by: Option<GroupBy>, ids: &BTreeSet<i64>) -> Result<(), String> {
    if group_by.is_some() && ids.is_empty() {
        return Err("groupByFilterIds must not be empty when groupBy is set".to_string());
    }
    Ok(())
}

fn join_ids(ids: &BTreeSet<i64>) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Metric blocks compiled into a statement and carried by its rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricFeatures {
    pub hours_and_cycles: bool,
    pub emissions: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoursAndCycleMetrics {
    pub average_hours: f64,
    pub total_hours: f64,
    pub number_of_aircraft_with_hours: i64,
    pub average_cycles: f64,
    pub total_cycles: f64,
    pub number_of_aircraft_with_cycles: i64,
    pub average_hours_per_cycle: f64,
    pub number_of_aircraft_with_hours_per_cycle: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmissionsMetrics {
    pub average_co2_kg_per_seat: f64,
    pub total_co2_kg_per_seat: f64,
    pub average_co2_g_per_ask: f64,
    pub total_co2_g_per_ask: f64,
    pub average_co2_g_per_asm: f64,
}

/// One group's figures for one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyUtilizationRow {
    pub year: i32,
    pub month: u32,
    pub group: String,
    pub group_id: Option<i64>,
    pub aircraft_type: Option<String>,
    pub number_of_aircraft_in_group: i64,
    #[serde(flatten)]
    pub hours_and_cycles: Option<HoursAndCycleMetrics>,
    #[serde(flatten)]
    pub emissions: Option<EmissionsMetrics>,
}

/// Identity shared by every row of one group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey {
    pub group_id: Option<i64>,
    pub group: String,
    pub aircraft_type: Option<String>,
}

impl GroupKey {
    pub fn of(row: &MonthlyUtilizationRow) -> Self {
        Self {
            group_id: row.group_id,
            group: row.group.clone(),
            aircraft_type: row.aircraft_type.clone(),
        }
    }

    pub fn is_baseline(&self) -> bool {
        self.group_id.is_none()
    }
}

/// A group label with whatever months the data engine returned for it.
#[derive(Debug, Clone, PartialEq)]
pub struct UtilizationGroup {
    pub key: GroupKey,
    pub rows: Vec<MonthlyUtilizationRow>,
}

#[derive(Debug, Serialize)]
pub struct MonthlyUtilizationResponse {
    pub series: Vec<Vec<MonthlyUtilizationRow>>,
}

impl From<Vec<UtilizationGroup>> for MonthlyUtilizationResponse {
    fn from(groups: Vec<UtilizationGroup>) -> Self {
        Self {
            series: groups.into_iter().map(|g| g.rows).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupOption {
    pub group_by: GroupBy,
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessorOption {
    pub lessor_id: i64,
    pub lessor: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorOption {
    pub operator_id: i64,
    pub operator: String,
}

#[derive(Debug, Serialize)]
pub struct LessorsResponse {
    pub lessors: Vec<LessorOption>,
}

#[derive(Debug, Serialize)]
pub struct FilterOptionsResponse {
    pub groups: Vec<GroupOption>,
    pub lessors: Vec<LessorOption>,
    pub operators: Vec<OperatorOption>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub db_ok: bool,
}
