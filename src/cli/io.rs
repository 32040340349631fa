//! JSON line I/O for the CLI
//!
//! - Input: one JSON object per line
//! - Output: one JSON object per line on stdout; logs go to stderr
//! - UTF-8 only

use std::io::{self, BufRead, Write};

use serde_json::Value;

use super::errors::{CliError, CliResult};

/// Reads the first non-blank line as a JSON object
pub fn read_request<R: BufRead>(input: &mut R) -> CliResult<Value> {
    let mut line = String::new();
    loop {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Err(CliError::io_error("Empty input"));
        }
        if !line.trim().is_empty() {
            break;
        }
    }
    let value: Value = serde_json::from_str(&line)?;
    if !value.is_object() {
        return Err(CliError::io_error("Request must be a JSON object"));
    }
    Ok(value)
}

/// Non-blank request lines, unparsed
pub fn read_requests<R: BufRead>(input: R) -> impl Iterator<Item = CliResult<String>> {
    input.lines().filter_map(|line| match line {
        Ok(line) if line.trim().is_empty() => None,
        Ok(line) => Some(Ok(line)),
        Err(e) => Some(Err(CliError::from(e))),
    })
}

/// Writes one JSON line and flushes
pub fn write_json<W: Write>(output: &mut W, json_str: &str) -> CliResult<()> {
    writeln!(output, "{}", json_str)?;
    output.flush()?;
    Ok(())
}

/// Writes an error line in the response format
pub fn write_error<W: Write>(output: &mut W, code: &str, message: &str) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "error",
        "code": code,
        "message": message
    });
    write_json(output, &response.to_string())
}

pub fn stdin() -> io::StdinLock<'static> {
    io::stdin().lock()
}

pub fn stdout() -> io::StdoutLock<'static> {
    io::stdout().lock()
}
