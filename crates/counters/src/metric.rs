use std::fmt;
use std::str::FromStr;

use crate::Error;

/// A hardware counter tracked for every sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Metric {
    LlcLoads,
    LlcMisses,
    Instructions,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::LlcLoads, Metric::LlcMisses, Metric::Instructions];

    /// Position of the metric in [`Metric::ALL`]
    pub fn index(&self) -> usize {
        match self {
            Metric::LlcLoads => 0,
            Metric::LlcMisses => 1,
            Metric::Instructions => 2,
        }
    }

    /// Column name used by wide-form counter tables
    pub fn column_name(&self) -> &'static str {
        match self {
            Metric::LlcLoads => "LLC-loads",
            Metric::LlcMisses => "LLC-misses",
            Metric::Instructions => "Instructions",
        }
    }

    /// Value of the `Type` column in long-form counter tables
    pub fn type_name(&self) -> &'static str {
        match self {
            Metric::LlcLoads => "LOAD",
            Metric::LlcMisses => "MISS",
            Metric::Instructions => "INSTRUCTIONS",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Metric::LlcLoads => write!(f, "llc_loads"),
            Metric::LlcMisses => write!(f, "llc_misses"),
            Metric::Instructions => write!(f, "instructions"),
        }
    }
}

/// Accepts long-form type names, wide-form column names and the display names.
impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .into_iter()
            .find(|metric| {
                s == metric.type_name() || s == metric.column_name() || s == metric.to_string()
            })
            .ok_or_else(|| Error::UnknownCounterType(s.to_string()))
    }
}
