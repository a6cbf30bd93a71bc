use crate::utilization::template::QueryError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Dimension a utilization report can be broken down by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum GroupBy {
    MarketClass,
    AircraftFamily,
    AircraftType,
    AircraftSeries,
    AircraftSerialNumber,
}

/// Column set a dimension contributes to a grouped select block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimensionColumns {
    pub id_column: &'static str,
    pub name_column: &'static str,
    /// Select-list entry that always yields an `AircraftType` column.
    pub extra_select: &'static str,
    pub extra_group_by: Option<&'static str>,
}

pub(crate) const NULL_AIRCRAFT_TYPE: &str = "CAST(NULL AS VARCHAR) AS \"AircraftType\"";

const MARKET_CLASS: DimensionColumns = DimensionColumns {
    id_column: "aircraft_market_class_id",
    name_column: "aircraft_market_class",
    extra_select: NULL_AIRCRAFT_TYPE,
    extra_group_by: None,
};

const AIRCRAFT_FAMILY: DimensionColumns = DimensionColumns {
    id_column: "aircraft_family_id",
    name_column: "aircraft_family",
    extra_select: NULL_AIRCRAFT_TYPE,
    extra_group_by: None,
};

const AIRCRAFT_TYPE: DimensionColumns = DimensionColumns {
    id_column: "aircraft_type_id",
    name_column: "aircraft_type",
    extra_select: NULL_AIRCRAFT_TYPE,
    extra_group_by: None,
};

const AIRCRAFT_SERIES: DimensionColumns = DimensionColumns {
    id_column: "aircraft_series_id",
    name_column: "aircraft_series",
    extra_select: NULL_AIRCRAFT_TYPE,
    extra_group_by: None,
};

const AIRCRAFT_SERIAL_NUMBER: DimensionColumns = DimensionColumns {
    id_column: "aircraft_id",
    name_column: "aircraft_serial_number",
    extra_select: "aircraft_type AS \"AircraftType\"",
    extra_group_by: Some("aircraft_type"),
};

impl GroupBy {
    pub const ALL: [GroupBy; 5] = [
        GroupBy::MarketClass,
        GroupBy::AircraftFamily,
        GroupBy::AircraftType,
        GroupBy::AircraftSeries,
        GroupBy::AircraftSerialNumber,
    ];

    pub fn columns(&self) -> &'static DimensionColumns {
        match self {
            GroupBy::MarketClass => &MARKET_CLASS,
            GroupBy::AircraftFamily => &AIRCRAFT_FAMILY,
            GroupBy::AircraftType => &AIRCRAFT_TYPE,
            GroupBy::AircraftSeries => &AIRCRAFT_SERIES,
            GroupBy::AircraftSerialNumber => &AIRCRAFT_SERIAL_NUMBER,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GroupBy::MarketClass => "MarketClass",
            GroupBy::AircraftFamily => "AircraftFamily",
            GroupBy::AircraftType => "AircraftType",
            GroupBy::AircraftSeries => "AircraftSeries",
            GroupBy::AircraftSerialNumber => "AircraftSerialNumber",
        }
    }
}

impl std::fmt::Display for GroupBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupBy {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GroupBy::ALL
            .into_iter()
            .find(|g| g.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| QueryError::UnknownDimension(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_serial_number_carries_aircraft_type() {
        for g in GroupBy::ALL {
            let cols = g.columns();
            if g == GroupBy::AircraftSerialNumber {
                assert_eq!(cols.extra_select, "aircraft_type AS \"AircraftType\"");
                assert_eq!(cols.extra_group_by, Some("aircraft_type"));
            } else {
                assert!(
                    cols.extra_select.starts_with("CAST(NULL"),
                    "{g} should emit a null AircraftType"
                );
                assert!(cols.extra_group_by.is_none());
            }
        }
    }

    #[test]
    fn test_catalog_columns() {
        assert_eq!(GroupBy::MarketClass.columns().id_column, "aircraft_market_class_id");
        assert_eq!(GroupBy::AircraftFamily.columns().name_column, "aircraft_family");
        assert_eq!(GroupBy::AircraftType.columns().id_column, "aircraft_type_id");
        assert_eq!(GroupBy::AircraftSeries.columns().name_column, "aircraft_series");
        assert_eq!(GroupBy::AircraftSerialNumber.columns().id_column, "aircraft_id");
        assert_eq!(
            GroupBy::AircraftSerialNumber.columns().name_column,
            "aircraft_serial_number"
        );
    }

    #[test]
    fn test_parse_round_trips_display() {
        for g in GroupBy::ALL {
            assert_eq!(g.to_string().parse::<GroupBy>().unwrap(), g);
        }
        assert_eq!("aircraftfamily".parse::<GroupBy>().unwrap(), GroupBy::AircraftFamily);
    }

    #[test]
    fn test_parse_unknown_dimension_is_configuration_error() {
        let err = "Operator".parse::<GroupBy>().unwrap_err();
        assert!(matches!(err, QueryError::UnknownDimension(ref v) if v == "Operator"));
    }
}
