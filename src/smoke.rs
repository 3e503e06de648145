//! Post-install smoke test.

use log::info;
use std::path::Path;

use crate::descriptor::SmokeTest;
use crate::error::{InstallError, describe_status};
use crate::runtime::{CommandOutput, CommandSpec, Runtime};

/// Invoke the exposed entry point at `link` with the declared arguments.
///
/// Fails when the command cannot be started, exits non-zero, or its combined
/// output lacks the expected substring.
#[tracing::instrument(skip(runtime, test, search_path))]
pub fn run_smoke_test<R: Runtime>(
    runtime: &R,
    link: &Path,
    test: &SmokeTest,
    search_path: &str,
) -> Result<CommandOutput, InstallError> {
    let command = CommandSpec::new(link)
        .args(test.args.iter().cloned())
        .env("PATH", search_path);
    info!("Smoke testing: {}", command.display());

    let output = runtime.run(&command).map_err(|e| InstallError::SmokeTest {
        command: command.display(),
        status: "could not be started".to_string(),
        output: format!("{:#}", e),
    })?;

    if !output.success() {
        return Err(InstallError::SmokeTest {
            command: command.display(),
            status: describe_status(output.code),
            output: output.combined(),
        });
    }

    if let Some(expected) = &test.expect
        && !output.combined().contains(expected.as_str())
    {
        return Err(InstallError::SmokeTest {
            command: command.display(),
            status: format!("output does not contain {:?}", expected),
            output: output.combined(),
        });
    }

    Ok(output)
}
