//! Entry point for the privileged child started by
//! [`SudoElevator`](crate::transaction::SudoElevator).
//!
//! Performs exactly one [`Mutation`] and prints a single JSON
//! [`ElevatedOutcome`] line on stdout; nothing else is written there.
use anyhow::Result;

use crate::cli::RunElevatedOpts;
use crate::fs_ops::Mutation;
use crate::transaction::ElevatedOutcome;

/// Perform the requested mutation and report its outcome on stdout.
///
/// # Errors
///
/// Returns an error only if the outcome cannot be serialized.
pub fn run(opts: &RunElevatedOpts) -> Result<()> {
    let outcome = perform(&opts.function, &opts.args);
    println!("{}", serde_json::to_string(&outcome)?);
    Ok(())
}

/// Decode and perform one mutation call.
#[must_use]
pub fn perform(function: &str, args: &str) -> ElevatedOutcome {
    match Mutation::from_call(function, args) {
        Ok(mutation) => ElevatedOutcome::from_result(mutation.perform()),
        Err(e) => ElevatedOutcome {
            success: false,
            error: Some(format!("invalid call {function}: {e}")),
        },
    }
}
