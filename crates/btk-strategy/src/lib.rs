//! Strategy contract, plugin registry, and the Opening-Range Breakout
//! reference strategy.

pub mod orb;
pub mod registry;
pub mod types;

pub use orb::{OrbParams, OrbStrategy};
pub use registry::{PluginRegistry, RegistryError, StrategyCategoryLabel, StrategyFactory, StrategyMeta};
pub use types::{IndicatorSpec, RiskLimits, Strategy, StrategyCategory, StrategyContext, StrategyError, StrategyState};
