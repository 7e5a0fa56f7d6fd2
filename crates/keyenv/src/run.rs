// SPDX-FileCopyrightText: 2026 Keyenv Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `keyenv run`: launch a command with credentials in its environment.

use std::process::{Command, ExitStatus};

use keyenv_core::{KeyenvError, Result};
use keyenv_vault::CredentialEnv;
use tracing::debug;

/// Spawn `argv` with `env` applied and wait for it.
///
/// The decrypted bindings are dropped as soon as the child is running.
/// Returns the exit code to forward.
pub fn run_with_env(env: CredentialEnv, argv: &[String]) -> Result<i32> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| KeyenvError::Validation("no command given after --".to_string()))?;

    let mut command = Command::new(program);
    command.args(args);
    env.apply_to(&mut command);
    debug!(program = %program, vars = env.len(), "spawning child");

    let spawned = command.spawn();
    drop(command);
    drop(env);
    let mut child = spawned
        .map_err(|e| KeyenvError::Internal(format!("cannot run {program}: {e}")))?;

    let status = child
        .wait()
        .map_err(|e| KeyenvError::Internal(format!("waiting for {program} failed: {e}")))?;
    Ok(exit_code(status))
}

/// Exit code of a finished child, with signals mapped to `128 + signal`.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
