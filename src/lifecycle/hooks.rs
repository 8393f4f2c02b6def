//! Start/stop callbacks.

use thiserror::Error;

/// Error returned by a lifecycle hook.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// A zero-argument lifecycle callback.
pub type Hook = Box<dyn FnMut() -> Result<(), HookError> + Send>;

/// Point in the lifecycle at which hooks fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    BeforeStart,
    AfterStart,
    BeforeStop,
    AfterStop,
}

impl std::fmt::Display for HookStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HookStage::BeforeStart => "before_start",
            HookStage::AfterStart => "after_start",
            HookStage::BeforeStop => "before_stop",
            HookStage::AfterStop => "after_stop",
        };
        f.write_str(name)
    }
}

/// A hook that failed, with the stage it was registered for.
#[derive(Debug, Error)]
#[error("{stage} hook failed: {source}")]
pub struct HookFailure {
    pub stage: HookStage,
    #[source]
    pub source: HookError,
}

/// Registered hooks, one list per stage.
#[derive(Default)]
pub struct Hooks {
    before_start: Vec<Hook>,
    after_start: Vec<Hook>,
    before_stop: Vec<Hook>,
    after_stop: Vec<Hook>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    fn list(&mut self, stage: HookStage) -> &mut Vec<Hook> {
        match stage {
            HookStage::BeforeStart => &mut self.before_start,
            HookStage::AfterStart => &mut self.after_start,
            HookStage::BeforeStop => &mut self.before_stop,
            HookStage::AfterStop => &mut self.after_stop,
        }
    }

    pub fn add<F>(&mut self, stage: HookStage, hook: F)
    where
        F: FnMut() -> Result<(), HookError> + Send + 'static,
    {
        self.list(stage).push(Box::new(hook));
    }

    /// Run a stage's hooks in registration order, stopping at the first failure.
    pub fn fire(&mut self, stage: HookStage) -> Result<(), HookFailure> {
        for hook in self.list(stage).iter_mut() {
            hook().map_err(|source| HookFailure { stage, source })?;
        }
        Ok(())
    }

    pub fn len(&self, stage: HookStage) -> usize {
        match stage {
            HookStage::BeforeStart => self.before_start.len(),
            HookStage::AfterStart => self.after_start.len(),
            HookStage::BeforeStop => self.before_stop.len(),
            HookStage::AfterStop => self.after_stop.len(),
        }
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("before_start", &self.before_start.len())
            .field("after_start", &self.after_start.len())
            .field("before_stop", &self.before_stop.len())
            .field("after_stop", &self.after_stop.len())
            .finish()
    }
}
