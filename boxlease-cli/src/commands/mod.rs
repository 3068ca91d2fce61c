pub mod create;
pub mod exec;
pub mod info;
pub mod list;
pub mod metrics;
pub mod restart;
pub mod rm;
pub mod run;
pub mod start;
pub mod stop;

use boxlease::BoxleaseResult;
use boxlease::sync_api::SyncRuntime;

/// Apply `op` to every target, printing each one that succeeds.
///
/// All targets are tried. A single failure is returned as is; several are
/// reported individually and summarized.
pub(crate) fn for_each_target<F>(targets: &[String], mut op: F) -> anyhow::Result<()>
where
    F: FnMut(&str) -> BoxleaseResult<()>,
{
    let mut failures = Vec::new();
    for target in targets {
        match op(target) {
            Ok(()) => println!("{}", target),
            Err(e) => failures.push((target, e)),
        }
    }

    match failures.len() {
        0 => Ok(()),
        1 => {
            let (_, e) = failures.remove(0);
            Err(e.into())
        }
        n => {
            for (target, e) in &failures {
                eprintln!("Error: {}: {}", target, e);
            }
            anyhow::bail!("{} of {} boxes failed", n, targets.len())
        }
    }
}

/// Release the runtime. A shutdown failure only surfaces when the command
/// itself succeeded.
pub(crate) fn finish<T>(rt: &SyncRuntime, outcome: anyhow::Result<T>) -> anyhow::Result<T> {
    if let Err(e) = rt.stop() {
        if outcome.is_ok() {
            return Err(e.into());
        }
        tracing::warn!(error = %e, "Failed to shut down runtime");
    }
    outcome
}
