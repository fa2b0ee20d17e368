use std::io::{BufRead, Write};

use anyhow::Result;

/// Reads one trimmed line. End of input reads as an empty line.
pub fn read_line<R: BufRead>(input: &mut R) -> Result<String> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Prints `prompt` without a newline and reads the answer.
pub fn ask<R: BufRead, W: Write>(prompt: &str, input: &mut R, out: &mut W) -> Result<String> {
    write!(out, "{prompt}")?;
    out.flush()?;
    read_line(input)
}

/// Asks a yes/no question that defaults to no.
pub fn confirm<R: BufRead, W: Write>(question: &str, input: &mut R, out: &mut W) -> Result<bool> {
    let answer = ask(&format!("{question} (y/N): "), input, out)?.to_lowercase();
    Ok(answer == "y" || answer == "yes")
}

/// Asks a yes/no question that defaults to yes.
pub fn confirm_default_yes<R: BufRead, W: Write>(
    question: &str,
    input: &mut R,
    out: &mut W,
) -> Result<bool> {
    let answer = ask(&format!("{question} (Y/n): "), input, out)?.to_lowercase();
    Ok(answer.is_empty() || answer == "y" || answer == "yes")
}
