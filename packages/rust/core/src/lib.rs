//! Pipeline orchestration for SupportPilot.
//!
//! A request flows through five stages in a fixed order, each wrapped by the
//! same timeout/retry harness:
//!
//! 1. classify (`ClassifierAgent`)
//! 2. retrieve (`RetrieverAgent`)
//! 3. draft (`WriterAgent`)
//! 4. validate (`GuardAgent`)
//! 5. evaluate (`LoggerAgent`)
//!
//! [`Workflow::process_request`] always returns a [`ProcessResult`].
//!
//! [`ProcessResult`]: supportpilot_shared::ProcessResult

pub mod prompts;
pub mod stages;
pub mod state;
pub mod step;
pub mod workflow;

pub use prompts::PromptSet;
pub use stages::Stage;
pub use state::PipelineState;
pub use step::{StepError, StepPolicy, run_step};
pub use workflow::{ProgressReporter, SilentProgress, Workflow, WorkflowConfig};
