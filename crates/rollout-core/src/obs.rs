//! Structured observability hooks for rollout lifecycle events.
//!
//! Every stack, secret, trust, and probe transition is emitted as a
//! structured `tracing` event so log aggregation can follow a run without
//! parsing the rendered report.

use tracing::{info, warn};

/// RAII guard that enters a run-scoped tracing span for the duration of a run.
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    /// Create and enter a span tagged with the run id.
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("rollout.run", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: run started.
pub fn emit_run_started(run_id: &str, environment: &str, stack_count: usize) {
    info!(
        event = "run.started",
        run_id = %run_id,
        environment = %environment,
        stack_count = stack_count,
    );
}

/// Emit event: run finished.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, exit_code: i32, cancelled: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        exit_code = exit_code,
        cancelled = cancelled,
    );
}

/// Emit event: a wave of stacks started deploying.
pub fn emit_wave_started(run_id: &str, wave: usize, stacks: usize) {
    info!(event = "wave.started", run_id = %run_id, wave = wave, stacks = stacks);
}

/// Emit event: one stack's deploy attempt started.
pub fn emit_stack_deploying(run_id: &str, stack: &str, attempt: u32) {
    info!(event = "stack.deploying", run_id = %run_id, stack = %stack, attempt = attempt);
}

/// Emit event: a stack reached `Deployed`.
pub fn emit_stack_deployed(run_id: &str, stack: &str, attempts: u32, unchanged: bool) {
    info!(
        event = "stack.deployed",
        run_id = %run_id,
        stack = %stack,
        attempts = attempts,
        unchanged = unchanged,
    );
}

/// Emit event: a stack failed terminally (warning level).
pub fn emit_stack_failed(run_id: &str, stack: &str, error: &dyn std::fmt::Display) {
    warn!(event = "stack.failed", run_id = %run_id, stack = %stack, error = %error);
}

/// Emit event: a stack was skipped because an upstream dependency failed.
pub fn emit_stack_skipped(run_id: &str, stack: &str, failed_dependency: &str) {
    warn!(
        event = "stack.skipped",
        run_id = %run_id,
        stack = %stack,
        failed_dependency = %failed_dependency,
    );
}

/// Emit event: the run was cancelled before all stacks were scheduled.
pub fn emit_run_cancelled(run_id: &str, pending_stacks: usize) {
    warn!(event = "run.cancelled", run_id = %run_id, pending_stacks = pending_stacks);
}
