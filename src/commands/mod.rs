//! Subcommand implementations.
pub mod completions;
pub mod elevated;
pub mod verb;

use crate::logging::FileStatus;
use crate::marble::VerbOutcome;

impl From<VerbOutcome> for FileStatus {
    fn from(outcome: VerbOutcome) -> Self {
        match outcome {
            VerbOutcome::Applied => Self::Ok,
            VerbOutcome::AlreadyCorrect => Self::AlreadyCorrect,
        }
    }
}
