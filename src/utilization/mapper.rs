use crate::utilization::types::{
    EmissionsMetrics, GroupKey, HoursAndCycleMetrics, MetricFeatures, MonthlyUtilizationRow,
    UtilizationGroup,
};
use chrono::{DateTime, Datelike, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;

/// First month of tracked utilization data.
pub const SERIES_START_YEAR: i32 = 2017;
pub const SERIES_START_MONTH: u32 = 1;

/// Closed range of calendar months, held as `year * 12 + (month - 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthRange {
    first: i64,
    last: i64,
}

impl MonthRange {
    pub fn new(start: (i32, u32), end: (i32, u32)) -> Self {
        Self {
            first: month_index(start.0, start.1),
            last: month_index(end.0, end.1),
        }
    }

    /// January 2017 through the last month that has fully ended at `now`.
    pub fn completed_as_of(now: DateTime<Utc>) -> Self {
        let current = month_index(now.year(), now.month());
        Self {
            first: month_index(SERIES_START_YEAR, SERIES_START_MONTH),
            last: current - 1,
        }
    }

    pub fn len(&self) -> usize {
        usize::try_from(self.last - self.first + 1).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn months(&self) -> impl Iterator<Item = (i32, u32)> {
        (self.first..=self.last).map(|idx| {
            let year = idx.div_euclid(12) as i32;
            let month = idx.rem_euclid(12) as u32 + 1;
            (year, month)
        })
    }
}

fn month_index(year: i32, month: u32) -> i64 {
    i64::from(year) * 12 + i64::from(month) - 1
}

/// Turns sparse per-group query results into complete, ordered monthly
/// series.
#[derive(Debug, Clone, Copy)]
pub struct SeriesNormalizer {
    range: MonthRange,
    features: MetricFeatures,
}

impl SeriesNormalizer {
    pub fn new(now: DateTime<Utc>, features: MetricFeatures) -> Self {
        Self::with_range(MonthRange::completed_as_of(now), features)
    }

    pub fn with_range(range: MonthRange, features: MetricFeatures) -> Self {
        Self { range, features }
    }

    pub fn range(&self) -> MonthRange {
        self.range
    }

    /// One output group per input group. The baseline comes first, the rest
    /// by aircraft count at their most recent reported month, descending.
    pub fn normalize(&self, groups: Vec<UtilizationGroup>) -> Vec<UtilizationGroup> {
        let mut ranked: Vec<(i64, UtilizationGroup)> =
            groups.into_iter().map(|g| self.fill(g)).collect();

        ranked.sort_by(|(count_a, a), (count_b, b)| {
            match (a.key.is_baseline(), b.key.is_baseline()) {
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                _ => count_b.cmp(count_a),
            }
        });

        ranked.into_iter().map(|(_, group)| group).collect()
    }

    /// Returns the filled group and its ranking count.
    fn fill(&self, group: UtilizationGroup) -> (i64, UtilizationGroup) {
        let mut by_month: HashMap<(i32, u32), MonthlyUtilizationRow> =
            HashMap::with_capacity(group.rows.len());
        for row in group.rows {
            by_month.entry((row.year, row.month)).or_insert(row);
        }

        let key = group.key;
        let mut latest_count = 0;
        let rows = self
            .range
            .months()
            .map(|(year, month)| match by_month.remove(&(year, month)) {
                Some(row) => {
                    latest_count = row.number_of_aircraft_in_group;
                    row
                }
                None => self.zero_row(&key, year, month),
            })
            .collect();

        (latest_count, UtilizationGroup { key, rows })
    }

    fn zero_row(&self, key: &GroupKey, year: i32, month: u32) -> MonthlyUtilizationRow {
        MonthlyUtilizationRow {
            year,
            month,
            group: key.group.clone(),
            group_id: key.group_id,
            aircraft_type: key.aircraft_type.clone(),
            number_of_aircraft_in_group: 0,
            hours_and_cycles: self
                .features
                .hours_and_cycles
                .then(HoursAndCycleMetrics::default),
            emissions: self.features.emissions.then(EmissionsMetrics::default),
        }
    }
}
