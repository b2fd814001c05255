//! Aggregate progress accounting across concurrently-running pipelines.

/// Started/finished/failed counters for one batch of pipelines.
///
/// The counters are updated exclusively by the job orchestrator's
/// step-completion transitions. Invariants after every transition:
/// `finished <= started` and `failed <= finished`.
#[derive(Debug, Default)]
pub struct Progress {
    started: usize,
    finished: usize,
    failed: usize,
}

impl Progress {
    /// Fresh counters, all zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// A pipeline began executing its first step.
    pub fn record_start(&mut self) {
        self.started = self.started.saturating_add(1);
    }

    /// A pipeline ran every step successfully.
    pub fn record_finish(&mut self) {
        self.finished = self.finished.saturating_add(1);
    }

    /// A pipeline terminated at a failing step. Failed pipelines count as
    /// finished too, so `started == finished` still means "nothing in
    /// flight".
    pub fn record_failure(&mut self) {
        self.finished = self.finished.saturating_add(1);
        self.failed = self.failed.saturating_add(1);
    }

    /// Whether no pipeline is currently in flight.
    pub fn is_idle(&self) -> bool {
        self.started == self.finished
    }

    /// Zero the counters between batches.
    ///
    /// A no-op while any pipeline is in flight, so a reset can never
    /// corrupt an active batch's accounting.
    pub fn reset(&mut self) {
        if !self.is_idle() {
            return;
        }
        self.started = 0;
        self.finished = 0;
        self.failed = 0;
    }

    /// Number of pipelines that recorded a start.
    pub fn started(&self) -> usize {
        self.started
    }

    /// Number of pipelines that reached a terminal state.
    pub fn finished(&self) -> usize {
        self.finished
    }

    /// Number of pipelines that terminated at a failing step.
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Render the human-readable status line.
    pub fn status(&self) -> String {
        if self.failed > 0 {
            format!("{}/{}, failed: {}", self.finished, self.started, self.failed)
        } else {
            format!("{}/{}", self.finished, self.started)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn status_without_failures() {
        let mut progress = Progress::new();
        progress.record_start();
        progress.record_start();
        progress.record_finish();
        assert_eq!(progress.status(), "1/2");
    }

    #[test]
    fn status_with_failures() {
        let mut progress = Progress::new();
        progress.record_start();
        progress.record_start();
        progress.record_finish();
        progress.record_failure();
        assert_eq!(progress.status(), "2/2, failed: 1");
    }

    #[test]
    fn failure_counts_as_finished() {
        let mut progress = Progress::new();
        progress.record_start();
        progress.record_failure();
        assert!(progress.is_idle());
        assert_eq!(progress.finished(), 1);
        assert_eq!(progress.failed(), 1);
    }

    #[test]
    fn reset_is_a_noop_while_in_flight() {
        let mut progress = Progress::new();
        progress.record_start();
        progress.reset();
        assert_eq!(progress.started(), 1, "reset must not zero an active batch");

        progress.record_finish();
        progress.reset();
        assert_eq!(progress.started(), 0);
        assert_eq!(progress.status(), "0/0");
    }

    mod property_tests {
        use proptest::prelude::*;

        use super::*;

        #[derive(Debug, Clone)]
        enum Op {
            Start,
            Finish,
            Failure,
            Reset,
        }

        fn op_strategy() -> impl Strategy<Value = Op> {
            prop_oneof![
                Just(Op::Start),
                Just(Op::Finish),
                Just(Op::Failure),
                Just(Op::Reset),
            ]
        }

        proptest! {
            // Drive the counters with arbitrary (well-formed) operation
            // sequences: terminal transitions only fire for pipelines that
            // actually started, as the orchestrator guarantees.
            #[test]
            fn invariants_hold_after_every_transition(
                ops in proptest::collection::vec(op_strategy(), 0..64)
            ) {
                let mut progress = Progress::new();
                let mut in_flight = 0usize;

                for op in ops {
                    match op {
                        Op::Start => {
                            progress.record_start();
                            in_flight += 1;
                        }
                        Op::Finish if in_flight > 0 => {
                            progress.record_finish();
                            in_flight -= 1;
                        }
                        Op::Failure if in_flight > 0 => {
                            progress.record_failure();
                            in_flight -= 1;
                        }
                        Op::Reset => {
                            let was_idle = progress.is_idle();
                            let before = progress.started();
                            progress.reset();
                            if !was_idle {
                                prop_assert_eq!(progress.started(), before);
                            }
                        }
                        Op::Finish | Op::Failure => {}
                    }

                    prop_assert!(progress.finished() <= progress.started());
                    prop_assert!(progress.failed() <= progress.finished());
                }
            }
        }
    }
}
