use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::foundation::error::{RenderError, RenderResult};

/// Which bound stops progressive rendering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionMode {
    /// Keep refining until cancelled.
    Unlimited,
    /// Stop after `max_iterations`.
    #[default]
    IterationCount,
    /// Stop once `max_seconds` of wall-clock time have passed.
    TimeLimit,
}

/// Stopping condition for one render session.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionCriteriaParams {
    /// Authoritative bound.
    pub mode: CompletionMode,
    /// Iteration bound for [`CompletionMode::IterationCount`].
    pub max_iterations: u32,
    /// Deadline for [`CompletionMode::TimeLimit`].
    pub max_seconds: f64,
    /// Iterations a time-limited session always completes, however short the deadline.
    pub min_iterations: u32,
}

impl Default for CompletionCriteriaParams {
    fn default() -> Self {
        Self {
            mode: CompletionMode::IterationCount,
            max_iterations: 64,
            max_seconds: 0.0,
            min_iterations: 1,
        }
    }
}

impl CompletionCriteriaParams {
    /// Stop after `n` iterations.
    pub fn iterations(n: u32) -> Self {
        Self {
            mode: CompletionMode::IterationCount,
            max_iterations: n,
            ..Self::default()
        }
    }

    /// Stop after `seconds` of rendering.
    pub fn seconds(seconds: f64) -> Self {
        Self {
            mode: CompletionMode::TimeLimit,
            max_seconds: seconds,
            ..Self::default()
        }
    }

    /// Deadline given as hours, minutes and seconds.
    pub fn from_hms(hours: u32, minutes: u32, seconds: u32) -> Self {
        Self::seconds(f64::from(hours) * 3600.0 + f64::from(minutes) * 60.0 + f64::from(seconds))
    }

    /// Never stop on its own.
    pub fn unlimited() -> Self {
        Self {
            mode: CompletionMode::Unlimited,
            ..Self::default()
        }
    }

    /// Preset used by thumbnail contexts.
    pub fn thumbnail(iterations: u32) -> Self {
        Self::iterations(iterations.max(1))
    }

    /// True when the session has a finite bound.
    pub fn is_finite(&self) -> bool {
        self.mode != CompletionMode::Unlimited
    }

    /// Reject bounds that can never be reached or never be measured.
    pub fn validate(&self) -> RenderResult<()> {
        match self.mode {
            CompletionMode::Unlimited => Ok(()),
            CompletionMode::IterationCount if self.max_iterations == 0 => Err(
                RenderError::configuration("iteration-count completion needs max_iterations >= 1"),
            ),
            CompletionMode::IterationCount => Ok(()),
            CompletionMode::TimeLimit
                if !self.max_seconds.is_finite() || self.max_seconds <= 0.0 =>
            {
                Err(RenderError::configuration(format!(
                    "time-limit completion needs a positive deadline, got {}",
                    self.max_seconds
                )))
            }
            CompletionMode::TimeLimit => Ok(()),
        }
    }
}

/// Tracks iterations and elapsed time of one render session against its criteria.
#[derive(Clone, Debug)]
pub struct CompletionEvaluator {
    params: CompletionCriteriaParams,
    iteration: u32,
    started: Option<Instant>,
    shaders_cached: bool,
}

impl CompletionEvaluator {
    /// Evaluator for `params`. Call [`CompletionEvaluator::start`] when rendering begins.
    pub fn new(params: CompletionCriteriaParams) -> Self {
        Self {
            params,
            iteration: 0,
            started: None,
            shaders_cached: true,
        }
    }

    /// Criteria in force.
    pub fn params(&self) -> &CompletionCriteriaParams {
        &self.params
    }

    /// Replace the criteria. Counters are kept; call `start` to reset them.
    pub fn set_params(&mut self, params: CompletionCriteriaParams) {
        self.params = params;
    }

    /// Reset counters and start the clock.
    pub fn start(&mut self) {
        self.iteration = 0;
        self.started = Some(Instant::now());
    }

    /// True between `start` and the next reset.
    pub fn is_started(&self) -> bool {
        self.started.is_some()
    }

    /// Iterations completed since `start`.
    pub fn current_iteration(&self) -> u32 {
        self.iteration
    }

    /// Wall-clock time since `start`.
    pub fn elapsed(&self) -> Duration {
        self.started.map(|t| t.elapsed()).unwrap_or_default()
    }

    /// Record `n` completed iterations.
    pub fn advance(&mut self, n: u32) {
        self.iteration = self.iteration.saturating_add(n);
    }

    /// Whether another iteration should run.
    pub fn keep_running(&self) -> bool {
        self.keep_running_at(self.elapsed())
    }

    /// [`CompletionEvaluator::keep_running`] evaluated at a given elapsed time.
    pub fn keep_running_at(&self, elapsed: Duration) -> bool {
        match self.params.mode {
            CompletionMode::Unlimited => true,
            CompletionMode::IterationCount => self.iteration < self.params.max_iterations,
            CompletionMode::TimeLimit => {
                self.iteration < self.params.min_iterations
                    || elapsed.as_secs_f64() < self.params.max_seconds
            }
        }
    }

    /// Percent complete against the authoritative bound, `None` for unlimited sessions.
    ///
    /// Reaches 100 exactly when [`CompletionEvaluator::keep_running`] turns false.
    pub fn progress(&self) -> Option<u32> {
        self.progress_at(self.elapsed())
    }

    /// [`CompletionEvaluator::progress`] evaluated at a given elapsed time.
    pub fn progress_at(&self, elapsed: Duration) -> Option<u32> {
        match self.params.mode {
            CompletionMode::Unlimited => None,
            CompletionMode::IterationCount => {
                let max = u64::from(self.params.max_iterations.max(1));
                Some((u64::from(self.iteration) * 100 / max).min(100) as u32)
            }
            CompletionMode::TimeLimit => {
                let ratio = elapsed.as_secs_f64() / self.params.max_seconds;
                let percent = (ratio * 100.0).clamp(0.0, 100.0) as u32;
                // 100 only once the guaranteed iterations are done as well.
                if self.iteration < self.params.min_iterations {
                    Some(percent.min(99))
                } else {
                    Some(percent)
                }
            }
        }
    }

    /// Iterations to request next: `samples` clamped to what the iteration bound still allows.
    pub fn next_step(&self, samples: u32) -> u32 {
        let samples = samples.max(1);
        match self.params.mode {
            CompletionMode::IterationCount => {
                samples.min(self.params.max_iterations.saturating_sub(self.iteration))
            }
            CompletionMode::Unlimited | CompletionMode::TimeLimit => samples,
        }
    }

    /// Record whether the backend has compiled its shaders yet.
    pub fn set_shaders_cached(&mut self, cached: bool) {
        self.shaders_cached = cached;
    }

    /// Advisory "warming up" hint: nothing rendered yet and shaders still to compile.
    pub fn is_first_iteration_and_shaders_not_cached(&self) -> bool {
        self.iteration == 0 && !self.shaders_cached
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/completion.rs"]
mod tests;
