use std::io::{self, BufRead, Write};

use anyhow::{bail, Context, Result};

/// Print `label` and read one line, trimmed. An empty answer falls back to
/// `default` when there is one.
pub fn ask<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    label: &str,
    default: Option<&str>,
) -> Result<String> {
    match default {
        Some(value) if !value.is_empty() => write!(output, "{} [{}]: ", label, value)?,
        _ => write!(output, "{}: ", label)?,
    }
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        bail!("Input closed while waiting for {}", label);
    }

    let answer = line.trim();
    if answer.is_empty() {
        Ok(default.unwrap_or_default().to_string())
    } else {
        Ok(answer.to_string())
    }
}

/// Ask on the terminal unless `preset` already holds a value.
pub fn ask_if_missing(preset: Option<String>, label: &str, default: Option<&str>) -> Result<String> {
    if let Some(value) = preset {
        return Ok(value);
    }
    let stdin = io::stdin();
    let mut input = stdin.lock();
    ask(&mut input, &mut io::stdout(), label, default)
}

pub fn ask_password(label: &str) -> Result<String> {
    rpassword::prompt_password(format!("{}: ", label)).context("Failed to read password")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_ask_trims_answer() {
        let mut input = Cursor::new(b"  imap.example.com  \n".to_vec());
        let mut output = Vec::new();
        let answer = ask(&mut input, &mut output, "Server", None).unwrap();

        assert_eq!(answer, "imap.example.com");
        assert_eq!(String::from_utf8(output).unwrap(), "Server: ");
    }

    #[test]
    fn test_ask_uses_default_on_empty_line() {
        let mut input = Cursor::new(b"\n".to_vec());
        let mut output = Vec::new();
        let answer = ask(&mut input, &mut output, "Folder (recursive)", Some("INBOX")).unwrap();

        assert_eq!(answer, "INBOX");
        assert_eq!(String::from_utf8(output).unwrap(), "Folder (recursive) [INBOX]: ");
    }

    #[test]
    fn test_ask_empty_without_default() {
        let mut input = Cursor::new(b"\n".to_vec());
        let answer = ask(&mut input, &mut Vec::new(), "Folder (recursive)", None).unwrap();
        assert_eq!(answer, "");
    }

    #[test]
    fn test_ask_fails_on_eof() {
        let mut input = Cursor::new(Vec::new());
        assert!(ask(&mut input, &mut Vec::new(), "Username", None).is_err());
    }

    #[test]
    fn test_preset_skips_prompt() {
        let value = ask_if_missing(Some("me".to_string()), "Username", None).unwrap();
        assert_eq!(value, "me");
    }
}
