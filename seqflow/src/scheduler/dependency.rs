//! Dependency expressions.

use crate::core::JobHandle;

/// Encodes "depends on all of these jobs" for Slurm.
///
/// Empty handles are dropped before joining, so a skipped upstream never
/// produces a malformed expression like `afterok::12`. Returns `None` when no
/// handle remains.
///
/// `kill_on_error = true` yields `afterok:<id>:...`; `false` yields
/// `afterany:<id>:...`, which lets the job start even if an upstream failed.
#[must_use]
pub fn dependency_expression(handles: &[JobHandle], kill_on_error: bool) -> Option<String> {
    let submitted = JobHandle::submitted(handles);
    if submitted.is_empty() {
        return None;
    }

    let kind = if kill_on_error { "afterok" } else { "afterany" };
    let ids: Vec<&str> = submitted.iter().map(JobHandle::as_str).collect();
    Some(format!("{kind}:{}", ids.join(":")))
}
