pub mod decision;
pub mod grid;
pub mod snapshot;
pub mod types;

pub use decision::{Action, ControllerDecision, DecisionLayer};
pub use grid::{active_priorities_for_soc, GridState, LoadPriority};
pub use snapshot::TelemetrySnapshot;
pub use types::{Current, Duration, Energy, Percentage, Power, Price, Temperature, Timestamp, Voltage};
