//! Catalogue of available strategies and their factories, kept separate
//! from execution: the replay engine looks a strategy up by name and
//! instantiates a fresh instance for each run, it never drives the
//! registry itself.

use crate::types::{Strategy, StrategyCategory};

/// A thread-safe factory closure that produces a fresh strategy instance.
/// `Send + Sync` so the registry can be shared across sweep worker threads.
pub type StrategyFactory = Box<dyn Fn() -> Box<dyn Strategy> + Send + Sync>;

/// Static metadata for a registered strategy, queryable without
/// instantiating it.
#[derive(Clone, Debug, PartialEq)]
pub struct StrategyMeta {
    pub name: String,
    pub version: String,
    pub category: StrategyCategory,
    pub description: String,
}

impl StrategyMeta {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        category: StrategyCategory,
        description: impl Into<String>,
    ) -> StrategyMeta {
        StrategyMeta { name: name.into(), version: version.into(), category, description: description.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryError {
    DuplicateName { name: String },
    UnknownStrategy { name: String },
    EmptyName,
    CategoryMismatch { name: String, meta: StrategyCategoryLabel, actual: StrategyCategoryLabel },
}

/// `StrategyCategory` doesn't derive `Display`; this newtype exists only so
/// `RegistryError`'s message can print a readable category name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StrategyCategoryLabel(pub StrategyCategory);

impl std::fmt::Display for StrategyCategoryLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.0 {
            StrategyCategory::DayTrading => "day_trading",
            StrategyCategory::SwingTrading => "swing_trading",
            StrategyCategory::PositionTrading => "position_trading",
        };
        write!(f, "{label}")
    }
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::DuplicateName { name } => write!(f, "strategy '{name}' is already registered"),
            RegistryError::UnknownStrategy { name } => write!(f, "no strategy named '{name}' is registered"),
            RegistryError::EmptyName => write!(f, "strategy name must not be empty"),
            RegistryError::CategoryMismatch { name, meta, actual } => {
                write!(f, "strategy '{name}': metadata category {meta} != instantiated category {actual}")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

struct RegistryEntry {
    meta: StrategyMeta,
    factory: StrategyFactory,
}

/// Catalogue of available strategies and their factories, in insertion
/// order. Names are compared case-sensitively.
pub struct PluginRegistry {
    entries: Vec<RegistryEntry>,
}

impl PluginRegistry {
    pub fn new() -> PluginRegistry {
        PluginRegistry { entries: Vec::new() }
    }

    pub fn register<F>(&mut self, meta: StrategyMeta, factory: F) -> Result<(), RegistryError>
    where
        F: Fn() -> Box<dyn Strategy> + Send + Sync + 'static,
    {
        if meta.name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.contains(&meta.name) {
            return Err(RegistryError::DuplicateName { name: meta.name.clone() });
        }
        self.entries.push(RegistryEntry { meta, factory: Box::new(factory) });
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.meta.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn list(&self) -> Vec<&StrategyMeta> {
        self.entries.iter().map(|e| &e.meta).collect()
    }

    pub fn lookup(&self, name: &str) -> Result<&StrategyMeta, RegistryError> {
        self.entries
            .iter()
            .find(|e| e.meta.name == name)
            .map(|e| &e.meta)
            .ok_or_else(|| RegistryError::UnknownStrategy { name: name.to_string() })
    }

    /// Each call produces a fresh instance — a parameter sweep hands every
    /// run its own unshared strategy, never a clone of one already mutated
    /// by another run.
    pub fn instantiate(&self, name: &str) -> Result<Box<dyn Strategy>, RegistryError> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.meta.name == name)
            .ok_or_else(|| RegistryError::UnknownStrategy { name: name.to_string() })?;
        Ok((entry.factory)())
    }

    /// Instantiate and verify the produced strategy's `category()` matches
    /// the registered metadata — catches a factory that drifted out of
    /// sync with its own `StrategyMeta` entry.
    pub fn instantiate_verified(&self, name: &str) -> Result<Box<dyn Strategy>, RegistryError> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.meta.name == name)
            .ok_or_else(|| RegistryError::UnknownStrategy { name: name.to_string() })?;

        let strategy = (entry.factory)();
        if strategy.category() != entry.meta.category {
            return Err(RegistryError::CategoryMismatch {
                name: name.to_string(),
                meta: StrategyCategoryLabel(entry.meta.category),
                actual: StrategyCategoryLabel(strategy.category()),
            });
        }
        Ok(strategy)
    }

    pub fn deregister(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.meta.name != name);
        self.entries.len() < before
    }
}

impl Default for PluginRegistry {
    fn default() -> PluginRegistry {
        PluginRegistry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StrategyContext, StrategyState};
    use btk_bar::Signal;

    struct FixedStrategy {
        name: &'static str,
        category: StrategyCategory,
    }

    impl Strategy for FixedStrategy {
        fn name(&self) -> &str {
            self.name
        }
        fn category(&self) -> StrategyCategory {
            self.category
        }
        fn required_history(&self) -> usize {
            0
        }
        fn on_bar(&mut self, ctx: &StrategyContext, _state: &mut StrategyState) -> Signal {
            Signal::hold(ctx.current_bar.timestamp)
        }
        fn clone_box(&self) -> Box<dyn Strategy> {
            Box::new(FixedStrategy { name: self.name, category: self.category })
        }
    }

    fn make_meta(name: &str, category: StrategyCategory) -> StrategyMeta {
        StrategyMeta::new(name, "1.0.0", category, "test strategy")
    }

    fn make_factory(name: &'static str, category: StrategyCategory) -> impl Fn() -> Box<dyn Strategy> + Send + Sync {
        move || Box::new(FixedStrategy { name, category })
    }

    #[test]
    fn register_single_strategy_succeeds() {
        let mut reg = PluginRegistry::new();
        reg.register(make_meta("alpha", StrategyCategory::DayTrading), make_factory("alpha", StrategyCategory::DayTrading)).unwrap();
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn register_duplicate_name_errors() {
        let mut reg = PluginRegistry::new();
        reg.register(make_meta("alpha", StrategyCategory::DayTrading), make_factory("alpha", StrategyCategory::DayTrading)).unwrap();
        let err = reg.register(make_meta("alpha", StrategyCategory::SwingTrading), make_factory("alpha", StrategyCategory::SwingTrading));
        assert_eq!(err, Err(RegistryError::DuplicateName { name: "alpha".to_string() }));
    }

    #[test]
    fn register_empty_name_errors() {
        let mut reg = PluginRegistry::new();
        let meta = StrategyMeta::new("", "1.0.0", StrategyCategory::DayTrading, "bad");
        let err = reg.register(meta, make_factory("x", StrategyCategory::DayTrading));
        assert_eq!(err, Err(RegistryError::EmptyName));
    }

    #[test]
    fn list_returns_entries_in_insertion_order() {
        let mut reg = PluginRegistry::new();
        reg.register(make_meta("alpha", StrategyCategory::DayTrading), make_factory("alpha", StrategyCategory::DayTrading)).unwrap();
        reg.register(make_meta("beta", StrategyCategory::SwingTrading), make_factory("beta", StrategyCategory::SwingTrading)).unwrap();
        let names: Vec<&str> = reg.list().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["alpha", "beta"]);
    }

    #[test]
    fn lookup_unknown_name_errors() {
        let reg = PluginRegistry::new();
        assert_eq!(reg.lookup("ghost"), Err(RegistryError::UnknownStrategy { name: "ghost".to_string() }));
    }

    #[test]
    fn instantiate_called_twice_produces_independent_instances() {
        let mut reg = PluginRegistry::new();
        reg.register(make_meta("alpha", StrategyCategory::DayTrading), make_factory("alpha", StrategyCategory::DayTrading)).unwrap();
        let s1 = reg.instantiate("alpha").unwrap();
        let s2 = reg.instantiate("alpha").unwrap();
        assert_eq!(s1.name(), s2.name());
    }

    #[test]
    fn instantiate_verified_errors_on_category_mismatch() {
        let mut reg = PluginRegistry::new();
        reg.register(make_meta("alpha", StrategyCategory::DayTrading), make_factory("alpha", StrategyCategory::SwingTrading)).unwrap();
        let err = reg.instantiate_verified("alpha");
        assert!(matches!(err, Err(RegistryError::CategoryMismatch { .. })));
    }

    #[test]
    fn deregister_preserves_insertion_order_of_remaining() {
        let mut reg = PluginRegistry::new();
        reg.register(make_meta("alpha", StrategyCategory::DayTrading), make_factory("alpha", StrategyCategory::DayTrading)).unwrap();
        reg.register(make_meta("beta", StrategyCategory::SwingTrading), make_factory("beta", StrategyCategory::SwingTrading)).unwrap();
        reg.register(make_meta("gamma", StrategyCategory::PositionTrading), make_factory("gamma", StrategyCategory::PositionTrading)).unwrap();

        reg.deregister("beta");

        let names: Vec<&str> = reg.list().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["alpha", "gamma"]);
    }
}
