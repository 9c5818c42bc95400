//! Packet group classification
//!
//! Every atom belongs to exactly one of six groups. The group decides which
//! reactors are eligible to run it through its declared [`Affinity`].

use crate::error::RuntimeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed six-way atom classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketGroup {
    /// Control flow
    CF,
    /// Data flow
    DF,
    /// Event driven
    ED,
    /// Collective / coordination
    CO,
    /// Meta-computational
    MC,
    /// Resource management
    RM,
}

/// Execution profile a group prefers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Affinity {
    SequentialLowLatency,
    ParallelMemoryBound,
    LowLatencyIo,
    NetworkCoordination,
    CpuBoundIntrospection,
    General,
}

impl PacketGroup {
    pub const ALL: [PacketGroup; 6] = [
        PacketGroup::CF,
        PacketGroup::DF,
        PacketGroup::ED,
        PacketGroup::CO,
        PacketGroup::MC,
        PacketGroup::RM,
    ];

    /// Declared routing affinity
    pub fn affinity(self) -> Affinity {
        match self {
            PacketGroup::CF => Affinity::SequentialLowLatency,
            PacketGroup::DF => Affinity::ParallelMemoryBound,
            PacketGroup::ED => Affinity::LowLatencyIo,
            PacketGroup::CO => Affinity::NetworkCoordination,
            PacketGroup::MC => Affinity::CpuBoundIntrospection,
            PacketGroup::RM => Affinity::General,
        }
    }

    /// Lowercase wire/config code (`"cf"`, `"df"`, ...)
    pub fn code(self) -> &'static str {
        match self {
            PacketGroup::CF => "cf",
            PacketGroup::DF => "df",
            PacketGroup::ED => "ed",
            PacketGroup::CO => "co",
            PacketGroup::MC => "mc",
            PacketGroup::RM => "rm",
        }
    }
}

impl fmt::Display for PacketGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for PacketGroup {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cf" => Ok(PacketGroup::CF),
            "df" => Ok(PacketGroup::DF),
            "ed" => Ok(PacketGroup::ED),
            "co" => Ok(PacketGroup::CO),
            "mc" => Ok(PacketGroup::MC),
            "rm" => Ok(PacketGroup::RM),
            other => Err(RuntimeError::invalid_atom(format!(
                "unknown packet group '{}': expected one of cf, df, ed, co, mc, rm",
                other
            ))),
        }
    }
}
