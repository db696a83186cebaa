//! Exploration schedules.
//!
//! Both hooks are pure functions of the game ply at the search root. The
//! exploration constant is evaluated once per search and shared by every
//! worker. The Dirichlet predicate is checked once per root expansion.

use std::fmt;
use std::sync::Arc;

/// Exploration constant as a function of the game ply.
pub trait CpuctSchedule: Send + Sync + fmt::Debug {
    fn cpuct(&self, step: u32) -> f32;
}

/// Whether root priors get Dirichlet noise at this game ply.
pub trait DirichletSchedule: Send + Sync + fmt::Debug {
    fn apply(&self, step: u32) -> bool;
}

#[derive(Debug, Clone, Copy)]
pub struct ConstantCpuct(pub f32);

impl CpuctSchedule for ConstantCpuct {
    fn cpuct(&self, _step: u32) -> f32 {
        self.0
    }
}

/// `max(floor, initial * decay^step)`.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialCpuct {
    pub initial: f32,
    pub decay: f32,
    pub floor: f32,
}

impl CpuctSchedule for ExponentialCpuct {
    fn cpuct(&self, step: u32) -> f32 {
        let exponent = i32::try_from(step).unwrap_or(i32::MAX);
        (self.initial * self.decay.powi(exponent)).max(self.floor)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NoDirichlet;

impl DirichletSchedule for NoDirichlet {
    fn apply(&self, _step: u32) -> bool {
        false
    }
}

/// Noise for every ply before `cutoff`.
#[derive(Debug, Clone, Copy)]
pub struct DirichletUntil(pub u32);

impl DirichletSchedule for DirichletUntil {
    fn apply(&self, step: u32) -> bool {
        step < self.0
    }
}

/// The pair of schedules a search consults.
#[derive(Debug, Clone)]
pub struct ExplorationHooks {
    pub cpuct: Arc<dyn CpuctSchedule>,
    pub dirichlet: Arc<dyn DirichletSchedule>,
}

impl Default for ExplorationHooks {
    fn default() -> Self {
        Self::for_evaluation(1.25)
    }
}

impl ExplorationHooks {
    pub fn new(cpuct: Arc<dyn CpuctSchedule>, dirichlet: Arc<dyn DirichletSchedule>) -> Self {
        Self { cpuct, dirichlet }
    }

    /// Decaying exploration and root noise for the opening plies.
    pub fn for_training(
        c_puct: f32,
        decay: f32,
        floor: f32,
        dirichlet_cutoff: u32,
    ) -> Self {
        Self::new(
            Arc::new(ExponentialCpuct {
                initial: c_puct,
                decay,
                floor,
            }),
            Arc::new(DirichletUntil(dirichlet_cutoff)),
        )
    }

    /// Fixed exploration, no noise.
    pub fn for_evaluation(c_puct: f32) -> Self {
        Self::new(Arc::new(ConstantCpuct(c_puct)), Arc::new(NoDirichlet))
    }
}
