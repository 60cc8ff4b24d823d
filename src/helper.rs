use std::io::{stdin, stdout, Write};

use log::info;

use crate::{Result, StorimpError};

/// Sets up env_logger. `RUST_LOG` wins over the default level.
pub fn initialize_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level));
    builder.format_timestamp_secs().format_module_path(true);

    // `try_init` so tests and repeated calls don't panic
    if builder.try_init().is_ok() {
        info!("Logger initialized");
    }
}

/// First non-empty line of `content`, cut to `max_chars` characters
pub fn content_preview(content: &str, max_chars: usize) -> String {
    let first_line = content
        .lines()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("")
        .trim();

    if first_line.chars().count() <= max_chars {
        first_line.to_string()
    } else {
        let cut: String = first_line.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

pub fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

/// Asks a yes/no question on the terminal. Anything but "y" or "yes" is a no.
pub fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N]: ", question);
    stdout().flush().map_err(StorimpError::Io)?;

    let mut input = String::new();
    stdin().read_line(&mut input).map_err(StorimpError::Io)?;

    Ok(is_affirmative(&input))
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_takes_first_non_empty_line() {
        assert_eq!(content_preview("\n\n  hello world  \nmore", 100), "hello world");
        assert_eq!(content_preview("", 10), "");
    }

    #[test]
    fn preview_cuts_on_character_boundaries() {
        assert_eq!(content_preview("héllo wörld", 5), "héllo...");
    }

    #[test]
    fn only_yes_confirms() {
        assert!(is_affirmative("y\n"));
        assert!(is_affirmative(" YES "));
        assert!(!is_affirmative("\n"));
        assert!(!is_affirmative("nope"));
    }
}
