pub mod arbitrage;
pub mod black_start;
pub mod decision_engine;
pub mod peak_shaving;
pub mod solar;

pub use arbitrage::{ArbitrageConfig, ArbitrageController};
pub use black_start::{BlackStartController, BlackStartEvent, BlackStartStatus};
pub use decision_engine::{DecisionEngine, SiteInputs};
pub use peak_shaving::{PeakShavingConfig, PeakShavingController};
pub use solar::{SolarConfig, SolarSelfConsumptionController};
