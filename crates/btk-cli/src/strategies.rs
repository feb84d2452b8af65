//! Wires the built-in strategies into a [`PluginRegistry`] the `run`
//! command looks names up in. New strategies are added here, once, rather
//! than at every call site that needs to instantiate one by name.

use btk_strategy::{OrbParams, OrbStrategy, PluginRegistry, StrategyCategory, StrategyMeta};

pub fn built_in_registry() -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    registry
        .register(
            StrategyMeta::new("orb", "1.0.0", StrategyCategory::DayTrading, "opening-range breakout"),
            || Box::new(OrbStrategy::new(OrbParams::default())),
        )
        .expect("built-in strategy names must be unique");
    registry
}
