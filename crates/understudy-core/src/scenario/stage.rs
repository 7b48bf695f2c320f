/// Pipeline stages a scenario moves through, strictly in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Configuration checks; failures never start the pipeline.
    Validate,
    /// Entry point invoked with the configured inputs.
    Execute,
    /// Polling for an explicit completion designation.
    WaitForCompletionSignal,
    /// Recorded calls compared against expectations.
    VerifyMocks,
    /// Repeated timed cycles for performance reports.
    ExecutePerformanceSampling,
    /// Performance mode: normal pass/fail judgment is skipped.
    SkipTest,
    /// User callback invoked and interceptions torn down.
    Finish,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validate => "validate",
            Stage::Execute => "execute",
            Stage::WaitForCompletionSignal => "wait_for_completion",
            Stage::VerifyMocks => "verify_mocks",
            Stage::ExecutePerformanceSampling => "performance_sampling",
            Stage::SkipTest => "skip_test",
            Stage::Finish => "finish",
        }
    }
}
