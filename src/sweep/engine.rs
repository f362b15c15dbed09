//! Main sweep engine implementation

use crate::config::SweepConfig;
use crate::credential::{CredentialContext, CredentialGuard, CredentialProvider, PassThroughProvider};
use crate::error::SweepError;
use crate::pacing::{JitterTimer, PacingPlan};
use crate::probe::{guarded_probe, HostProbe, LivenessCheck, ProbeOutcome};
use crate::sweep::{SweepPhase, SweepReport, SweepStats, SweepSummary};
use crate::target::{Target, TargetResolver, TargetSource};
use crate::utils::Logger;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Sink receiving every outcome as soon as it is known
pub type OutcomeSink = mpsc::UnboundedSender<ProbeOutcome>;

/// Everything a worker needs, cheap to clone into tasks
#[derive(Clone)]
struct ProbeContext {
    probe: Arc<dyn HostProbe>,
    liveness: Option<Arc<dyn LivenessCheck>>,
    credential: Option<CredentialContext>,
    limit: Duration,
    stop_on_success: bool,
    cancel: CancellationToken,
    sink: OutcomeSink,
}

impl ProbeContext {
    /// Probe one target and publish the outcome. Returns true when the
    /// sweep should stop.
    async fn visit(&self, target: &Target, stats: &mut SweepStats) -> bool {
        let outcome = guarded_probe(
            self.probe.as_ref(),
            self.liveness.as_deref(),
            target,
            self.credential.as_ref(),
            self.limit,
        )
        .await;

        stats.record(&outcome);
        let hit = outcome.result.has_access();
        if hit {
            log::info!("Access confirmed on {}", target);
        }
        // A closed receiver only means nobody is listening any more
        let _ = self.sink.send(outcome);

        if hit && self.stop_on_success {
            log::info!("Stopping after first host with access");
            self.cancel.cancel();
            return true;
        }
        false
    }
}

/// Orchestrates one or more sweeps over a fixed configuration
pub struct SweepEngine {
    config: SweepConfig,
    probe: Arc<dyn HostProbe>,
    resolver: Option<Arc<dyn TargetResolver>>,
    provider: Arc<dyn CredentialProvider>,
    liveness: Option<Arc<dyn LivenessCheck>>,
    cancel: CancellationToken,
    phases: std::sync::Mutex<Vec<SweepPhase>>,
}

impl SweepEngine {
    /// Create an engine for `config` that asks `probe` about each host
    pub fn new(config: SweepConfig, probe: Arc<dyn HostProbe>) -> crate::Result<Self> {
        config.validate()?;

        let resolver = config.build_resolver()?;
        let liveness = config.build_liveness();

        Ok(Self {
            config,
            probe,
            resolver,
            provider: Arc::new(PassThroughProvider),
            liveness,
            cancel: CancellationToken::new(),
            phases: std::sync::Mutex::new(Vec::new()),
        })
    }

    /// Create an engine whose probe is built from the configured check
    pub fn from_config(config: SweepConfig) -> crate::Result<Self> {
        let probe = config.build_probe()?;
        Self::new(config, probe)
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn TargetResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_credential_provider(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.provider = provider;
        self
    }

    /// Replace the liveness pre-check; `None` disables it
    pub fn with_liveness(mut self, liveness: Option<Arc<dyn LivenessCheck>>) -> Self {
        self.liveness = liveness;
        self
    }

    /// Use an externally owned cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Phases entered by the most recent run, in order
    pub fn phase_history(&self) -> Vec<SweepPhase> {
        self.phases.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn enter(&self, phase: SweepPhase) {
        log::info!("Sweep phase: {}", phase);
        if let Ok(mut phases) = self.phases.lock() {
            if phase == SweepPhase::Init {
                phases.clear();
            }
            phases.push(phase);
        }
    }

    /// Run a sweep, streaming every outcome into `sink`
    ///
    /// Fatal errors are returned after cleanup; per-host failures are
    /// reported as unreachable outcomes instead.
    pub async fn run(&self, sink: OutcomeSink) -> crate::Result<SweepSummary> {
        let run_id = Uuid::new_v4();
        let start = Instant::now();
        self.enter(SweepPhase::Init);

        let mut guard = CredentialGuard::empty();
        let result = self.drive(&mut guard, sink).await;

        self.enter(SweepPhase::Cleanup);
        guard.release();
        self.enter(SweepPhase::Done);

        let (targets, stats) = match result {
            Ok(done) => done,
            Err(e) => {
                log::error!("Sweep {} aborted: {}", run_id, e);
                return Err(e);
            }
        };

        let summary = SweepSummary::new(
            run_id,
            targets,
            &stats,
            self.cancel.is_cancelled(),
            start.elapsed(),
        );
        Logger::log_sweep_complete(&summary);
        Ok(summary)
    }

    /// Run a sweep and collect the outcomes in memory
    pub async fn run_collect(&self) -> crate::Result<SweepReport> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let summary = self.run(tx).await?;

        let mut outcomes = Vec::new();
        while let Ok(outcome) = rx.try_recv() {
            outcomes.push(outcome);
        }
        Ok(SweepReport { outcomes, summary })
    }

    async fn drive(
        &self,
        guard: &mut CredentialGuard,
        sink: OutcomeSink,
    ) -> crate::Result<(usize, SweepStats)> {
        self.enter(SweepPhase::Resolving);
        let targets = self.resolve_targets().await?;
        log::info!("Resolved {} targets", targets.len());

        if let Some(credential) = &self.config.credential {
            self.enter(SweepPhase::AcquireCredential);
            *guard = CredentialGuard::acquire(Arc::clone(&self.provider), credential).await?;
        }

        let plan = self.config.pacing_plan();
        Logger::log_sweep_start(
            targets.len(),
            plan.name(),
            guard.context().map(|c| c.identity()),
        );

        // Stop-on-success cancels this run only, not the caller's token
        let ctx = ProbeContext {
            probe: Arc::clone(&self.probe),
            liveness: self.liveness.clone(),
            credential: guard.context().cloned(),
            limit: self.config.probe_timeout_duration(),
            stop_on_success: self.config.stop_on_success,
            cancel: self.cancel.child_token(),
            sink,
        };

        let total = targets.len();
        let stats = match plan {
            PacingPlan::Sequential { delay, jitter } => {
                self.enter(SweepPhase::ProbingSequential);
                run_sequential(targets, JitterTimer::new(delay, jitter), ctx).await
            }
            PacingPlan::Concurrent { workers } => {
                self.enter(SweepPhase::ProbingConcurrent);
                run_concurrent(targets, workers, ctx).await
            }
        };

        Ok((total, stats))
    }

    async fn resolve_targets(&self) -> Result<Vec<Target>, SweepError> {
        let explicit = self.config.explicit_targets()?;
        let source = TargetSource::select(explicit, self.config.query.as_ref())?;
        source.resolve(self.resolver.as_deref()).await
    }
}

/// One target at a time, pausing before every probe
async fn run_sequential(targets: Vec<Target>, timer: JitterTimer, ctx: ProbeContext) -> SweepStats {
    let mut stats = SweepStats::default();

    for target in targets {
        if ctx.cancel.is_cancelled() {
            break;
        }

        let pause = timer.next_delay();
        log::debug!("Waiting {:?} before probing {}", pause, target);
        tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            _ = tokio::time::sleep(pause) => {}
        }

        if ctx.visit(&target, &mut stats).await {
            break;
        }
    }

    stats
}

/// Fixed pool of workers draining a shared queue
async fn run_concurrent(targets: Vec<Target>, workers: usize, ctx: ProbeContext) -> SweepStats {
    let worker_count = workers.max(1).min(targets.len());
    let queue = Arc::new(Mutex::new(VecDeque::from(targets)));

    // Dropping the set (e.g. when the run future is dropped) aborts the workers
    let mut pool = JoinSet::new();
    for id in 0..worker_count {
        let queue = Arc::clone(&queue);
        let ctx = ctx.clone();
        pool.spawn(async move {
            let mut stats = SweepStats::default();
            loop {
                if ctx.cancel.is_cancelled() {
                    break;
                }
                let next = queue.lock().await.pop_front();
                let Some(target) = next else {
                    break;
                };
                if ctx.visit(&target, &mut stats).await {
                    break;
                }
            }
            log::debug!("Worker {} finished after {} hosts", id, stats.total());
            stats
        });
    }
    drop(ctx);

    let mut stats = SweepStats::default();
    while let Some(joined) = pool.join_next().await {
        match joined {
            Ok(worker_stats) => stats.merge(&worker_stats),
            Err(e) => log::warn!("Sweep worker terminated abnormally: {}", e),
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CheckKind;
    use crate::credential::Credential;
    use crate::error::ProbeError;
    use crate::probe::ProbeResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AccessOn(&'static str);

    #[async_trait]
    impl HostProbe for AccessOn {
        async fn probe(
            &self,
            target: &Target,
            _context: Option<&CredentialContext>,
        ) -> Result<ProbeResult, ProbeError> {
            if target.as_str() == self.0 {
                Ok(ProbeResult::ReachableAccess)
            } else {
                Ok(ProbeResult::ReachableNoAccess)
            }
        }

        fn name(&self) -> &str {
            "access-on"
        }
    }

    fn config(hosts: Vec<&str>) -> SweepConfig {
        SweepConfig {
            check: CheckKind::Port,
            liveness: false,
            ..SweepConfig::new(hosts)
        }
    }

    #[tokio::test]
    async fn test_phases_on_success() {
        let engine = SweepEngine::new(config(vec!["A", "B"]), Arc::new(AccessOn("B"))).unwrap();
        engine.run_collect().await.unwrap();
        assert_eq!(
            engine.phase_history(),
            vec![
                SweepPhase::Init,
                SweepPhase::Resolving,
                SweepPhase::ProbingConcurrent,
                SweepPhase::Cleanup,
                SweepPhase::Done,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_phases_with_credential() {
        let config = config(vec!["A"]).with_delay(1).with_jitter(0.0);
        let config = config.with_credential(Credential::new("alice", "pw"));
        let engine = SweepEngine::new(config, Arc::new(AccessOn("A"))).unwrap();

        engine.run_collect().await.unwrap();
        assert_eq!(
            engine.phase_history(),
            vec![
                SweepPhase::Init,
                SweepPhase::Resolving,
                SweepPhase::AcquireCredential,
                SweepPhase::ProbingSequential,
                SweepPhase::Cleanup,
                SweepPhase::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_no_targets_skips_probing() {
        let engine = SweepEngine::new(config(vec![]), Arc::new(AccessOn("B"))).unwrap();
        let result = engine.run_collect().await;
        assert!(matches!(result, Err(SweepError::NoTargets)));
        assert_eq!(
            engine.phase_history(),
            vec![
                SweepPhase::Init,
                SweepPhase::Resolving,
                SweepPhase::Cleanup,
                SweepPhase::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_more_workers_than_targets() {
        let engine = SweepEngine::new(
            config(vec!["A", "B", "C"]).with_threads(100),
            Arc::new(AccessOn("C")),
        )
        .unwrap();
        let report = engine.run_collect().await.unwrap();
        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.positives(), vec![Target::from("C")]);
        assert!(!report.summary.cancelled);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_probes_nothing() {
        struct Counting(AtomicUsize);

        #[async_trait]
        impl HostProbe for Counting {
            async fn probe(
                &self,
                _target: &Target,
                _context: Option<&CredentialContext>,
            ) -> Result<ProbeResult, ProbeError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(ProbeResult::ReachableNoAccess)
            }

            fn name(&self) -> &str {
                "counting"
            }
        }

        let probe = Arc::new(Counting(AtomicUsize::new(0)));
        let token = CancellationToken::new();
        token.cancel();

        let engine = SweepEngine::new(config(vec!["A", "B"]), probe.clone())
            .unwrap()
            .with_cancellation(token);
        let report = engine.run_collect().await.unwrap();

        assert!(report.summary.cancelled);
        assert!(report.outcomes.is_empty());
        assert_eq!(probe.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = SweepEngine::new(config(vec!["A"]).with_threads(0), Arc::new(AccessOn("A")));
        assert!(matches!(result, Err(SweepError::ConfigError(_))));
    }
}
