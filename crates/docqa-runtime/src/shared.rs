//! Hot-reloadable engine shared across tasks.
//!
//! Readers take an `Arc` snapshot and release the lock immediately. Writers
//! replace the engine copy-on-write, so a record that is already being
//! processed finishes with the engine it started with.

use parking_lot::RwLock;
use std::sync::Arc;

use docqa_core::{ConfigError, Engine, EngineConfig, Outcome, RecordMetadata, Rule, ScoreWeights};

/// An [`Engine`] behind a read-mostly lock.
pub struct SharedEngine {
    inner: RwLock<Arc<Engine>>,
}

impl SharedEngine {
    pub fn new(engine: Engine) -> Self {
        Self {
            inner: RwLock::new(Arc::new(engine)),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(Engine::from_config(config)?))
    }

    /// The current engine.
    pub fn snapshot(&self) -> Arc<Engine> {
        Arc::clone(&*self.inner.read())
    }

    /// Process one payload with the current engine.
    pub fn process(&self, raw: &str, metadata: &RecordMetadata) -> Outcome {
        self.snapshot().process(raw, metadata)
    }

    /// Current weight table.
    pub fn weights(&self) -> ScoreWeights {
        *self.inner.read().weights()
    }

    /// Adjust named weights (each clamped to [0, 1]; unknown names ignored).
    pub fn adjust_weights<I, S>(&self, updates: I)
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        let mut guard = self.inner.write();
        Arc::make_mut(&mut *guard).adjust_weights(updates);
        tracing::info!(weights = ?guard.weights(), "score weights adjusted");
    }

    /// Replace the whole weight table.
    pub fn set_weights(&self, weights: ScoreWeights) {
        let mut guard = self.inner.write();
        Arc::make_mut(&mut *guard).set_weights(weights);
        tracing::info!(weights = ?guard.weights(), "score weights replaced");
    }

    /// Add or replace a validation rule.
    pub fn register_rule(&self, rule: Rule) {
        let id = rule.id.clone();
        let mut guard = self.inner.write();
        Arc::make_mut(&mut *guard).register_rule(rule);
        tracing::info!(rule = %id, "rule registered");
    }

    /// Rebuild the engine from a new configuration.
    ///
    /// On error the current engine stays in place.
    pub fn reload(&self, config: &EngineConfig) -> Result<(), ConfigError> {
        let engine = Engine::from_config(config)?;
        *self.inner.write() = Arc::new(engine);
        tracing::info!(rules = config.rules.len(), "engine reloaded");
        Ok(())
    }
}

impl Default for SharedEngine {
    fn default() -> Self {
        Self::new(Engine::new())
    }
}
