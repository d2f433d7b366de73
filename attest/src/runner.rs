//! Whole-run orchestration: load generation, then analysis racing the
//! optional fast checker, folded into one verdict.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::{debug, info};

use crate::analyst::ConsistencyAnalyst;
use crate::checker::FastChecker;
use crate::config::RunConfig;
use crate::store::KvConnector;
use crate::verdict::{RunError, RunOutcome, Verdict};
use crate::workload::{Workload, WorkloadError};

/// Run one full verification: fill the graph, analyze it, and race the fast
/// checker alongside the analysis.
///
/// Any violation — from either signal — wins over a consistent report. The
/// caller owns the program watchdog; this function returns as soon as both
/// signals are in.
pub fn verify<C: KvConnector>(connector: &C, config: &RunConfig) -> Result<RunOutcome, RunError> {
    config.validate()?;
    let started = Instant::now();

    let workload = Workload::new(config.workload.clone());
    let report = workload.run(connector).map_err(|err| match err {
        WorkloadError::Setup(cause) => RunError::Setup(cause),
        WorkloadError::Internal(message) => RunError::Internal(message),
    })?;
    let operations = report.recorded;
    let mut analyst = ConsistencyAnalyst::from_graph(report.graph);

    let stop = AtomicBool::new(false);
    let scope_result = crossbeam::scope(|s| {
        let checker_handle = if config.fast_check {
            let checker = FastChecker::new(config.fast_check_key.clone());
            let stop = &stop;
            Some(s.spawn(move |_| checker.run(connector, stop)))
        } else {
            None
        };

        info!(operations, "analyzing collected history");
        let analysis = analyst.analyze();
        stop.store(true, Ordering::SeqCst);

        let checker_verdict = match checker_handle {
            Some(handle) => match handle.join() {
                Ok(result) => Some(result),
                Err(_) => return Err(RunError::Internal("fast checker panicked".to_string())),
            },
            None => None,
        };
        Ok((analysis, checker_verdict))
    });
    let (analysis, checker_verdict) = scope_result
        .map_err(|_| RunError::Internal("fast checker panicked".to_string()))??;

    let verdict = match analysis {
        Err(violation) => Verdict::Inconsistent(violation),
        Ok(analysis_report) => {
            info!(report = %analysis_report, "analysis found no violation");
            match checker_verdict {
                Some(Err(violation)) => Verdict::Inconsistent(violation),
                Some(Ok(iterations)) => {
                    debug!(iterations, "fast checker found no violation");
                    Verdict::Consistent(analysis_report)
                }
                None => Verdict::Consistent(analysis_report),
            }
        }
    };

    Ok(RunOutcome {
        verdict,
        operations,
        elapsed: started.elapsed(),
    })
}
