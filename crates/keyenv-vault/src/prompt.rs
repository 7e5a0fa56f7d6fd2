// SPDX-FileCopyrightText: 2026 Keyenv Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential value acquisition: hidden TTY prompt, or piped stdin.

use std::io::{BufRead, IsTerminal};

use keyenv_core::{KeyenvError, Result};
use zeroize::Zeroizing;

/// Read a value for `name` without echoing it.
///
/// On a terminal the user is prompted via `rpassword`. Otherwise the first
/// line of stdin is taken, so `echo "$TOKEN" | keyenv add NAME` works.
pub fn read_value(name: &str) -> Result<Zeroizing<String>> {
    let value = if std::io::stdin().is_terminal() {
        let prompt = format!("Value for {name}: ");
        Zeroizing::new(
            rpassword::prompt_password(prompt)
                .map_err(|e| KeyenvError::Validation(format!("failed to read value: {e}")))?,
        )
    } else {
        value_from_reader(std::io::stdin().lock())?
    };
    if value.is_empty() {
        return Err(KeyenvError::Validation(format!(
            "empty value for {name} not allowed"
        )));
    }
    Ok(value)
}

/// First line of `reader` with the line terminator removed.
pub fn value_from_reader(mut reader: impl BufRead) -> Result<Zeroizing<String>> {
    let mut line = Zeroizing::new(String::new());
    reader
        .read_line(&mut line)
        .map_err(|e| KeyenvError::Validation(format!("failed to read value from stdin: {e}")))?;
    let trimmed = line.trim_end_matches(['\n', '\r']).len();
    line.truncate(trimmed);
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn takes_first_line_only() {
        let value = value_from_reader(&b"sk-test-1\nsecond\n"[..]).unwrap();
        assert_eq!(value.as_str(), "sk-test-1");
    }

    #[test]
    fn strips_crlf() {
        let value = value_from_reader(&b"abc\r\n"[..]).unwrap();
        assert_eq!(value.as_str(), "abc");
    }

    #[test]
    fn keeps_inner_whitespace() {
        let value = value_from_reader(&b"  spaced value \n"[..]).unwrap();
        assert_eq!(value.as_str(), "  spaced value ");
    }

    #[test]
    fn empty_input_yields_empty_value() {
        let value = value_from_reader(&b""[..]).unwrap();
        assert!(value.is_empty());
    }
}
