use serde::{Deserialize, Serialize};
use std::fmt;

/// State of the black-start / grid-failure state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridState {
    GridConnected,
    GridFailureDetected,
    Transferring,
    IslandMode,
    Reconnecting,
    Synchronizing,
}

impl fmt::Display for GridState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::GridConnected => "GRID_CONNECTED",
            Self::GridFailureDetected => "GRID_FAILURE_DETECTED",
            Self::Transferring => "TRANSFERRING",
            Self::IslandMode => "ISLAND_MODE",
            Self::Reconnecting => "RECONNECTING",
            Self::Synchronizing => "SYNCHRONIZING",
        };
        write!(f, "{s}")
    }
}

/// Load-shed priority, 1 = never shed, 6 = first to go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LoadPriority {
    LifeSafety = 1,
    Communications = 2,
    Illumination = 3,
    HvacServers = 4,
    HvacComfort = 5,
    Elevators = 6,
}

impl LoadPriority {
    pub const ALL: [LoadPriority; 6] = [
        LoadPriority::LifeSafety,
        LoadPriority::Communications,
        LoadPriority::Illumination,
        LoadPriority::HvacServers,
        LoadPriority::HvacComfort,
        LoadPriority::Elevators,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::LifeSafety => "life_safety",
            Self::Communications => "communications",
            Self::Illumination => "illumination",
            Self::HvacServers => "hvac_servers",
            Self::HvacComfort => "hvac_comfort",
            Self::Elevators => "elevators",
        }
    }
}

impl fmt::Display for LoadPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Determine the set of load priorities that remain energized at a given
/// SOC while islanded. Non-increasing in SOC; never reinstated mid-island.
pub fn active_priorities_for_soc(soc_percent: f64) -> Vec<LoadPriority> {
    use LoadPriority::*;
    if soc_percent > 40.0 {
        vec![LifeSafety, Communications, Illumination, HvacServers, HvacComfort, Elevators]
    } else if soc_percent > 30.0 {
        vec![LifeSafety, Communications, Illumination, HvacServers, HvacComfort]
    } else if soc_percent > 20.0 {
        vec![LifeSafety, Communications, Illumination, HvacServers]
    } else if soc_percent > 10.0 {
        vec![LifeSafety, Communications, Illumination]
    } else {
        vec![LifeSafety, Communications]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_soc_keeps_all_loads() {
        assert_eq!(active_priorities_for_soc(45.0).len(), 6);
    }

    #[test]
    fn low_soc_sheds_to_emergency_only() {
        assert_eq!(
            active_priorities_for_soc(8.0),
            vec![LoadPriority::LifeSafety, LoadPriority::Communications]
        );
    }

    #[test]
    fn shedding_is_non_increasing_in_soc() {
        let high = active_priorities_for_soc(45.0).len();
        let mid = active_priorities_for_soc(25.0).len();
        let low = active_priorities_for_soc(5.0).len();
        assert!(high >= mid && mid >= low);
    }
}
