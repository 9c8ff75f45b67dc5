use colored::Colorize;

/// Lamports per SOL constant
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Convert lamports to SOL (as f64)
pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

/// Convert SOL to lamports
pub fn sol_to_lamports(sol: f64) -> u64 {
    (sol * LAMPORTS_PER_SOL as f64) as u64
}

/// Format lamports as SOL string with color
pub fn format_sol(lamports: u64) -> String {
    format!("{:.9} SOL", lamports_to_sol(lamports))
        .yellow()
        .to_string()
}

/// Format pubkey truncated for display
pub fn format_pubkey(pubkey: &str) -> String {
    if pubkey.len() <= 12 {
        pubkey.to_string()
    } else {
        format!("{}...{}", &pubkey[..6], &pubkey[pubkey.len() - 6..])
    }
}

/// Format timestamp in human-readable format
pub fn format_timestamp(timestamp: &chrono::DateTime<chrono::Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Minimum spacing between provider calls, shared across tasks.
pub struct RateLimiter {
    delay: std::time::Duration,
    last_call: std::sync::Mutex<Option<std::time::Instant>>,
}

impl RateLimiter {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay: std::time::Duration::from_millis(delay_ms),
            last_call: std::sync::Mutex::new(None),
        }
    }

    pub async fn wait(&self) {
        let sleep_for = {
            let mut last = self.last_call.lock().unwrap();
            let now = std::time::Instant::now();
            let sleep_for = match *last {
                Some(prev) if now.duration_since(prev) < self.delay => {
                    Some(self.delay - now.duration_since(prev))
                }
                _ => None,
            };
            *last = Some(now + sleep_for.unwrap_or_default());
            sleep_for
        };

        if let Some(remaining) = sleep_for {
            tokio::time::sleep(remaining).await;
        }
    }
}

/// Prompt user for yes/no confirmation
pub fn confirm_action(prompt: &str) -> bool {
    use std::io::{self, Write};

    print!("{} (y/N): ", prompt);
    let _ = io::stdout().flush();

    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        return false;
    }

    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Print a formatted table border
pub fn print_table_border(width: usize) {
    println!("{}", "=".repeat(width));
}

/// Print a table row with columns
pub fn print_table_row(columns: &[&str], widths: &[usize]) {
    let mut row = String::new();
    for (i, col) in columns.iter().enumerate() {
        if i < widths.len() {
            row.push_str(&format!("{:<width$}  ", col, width = widths[i]));
        }
    }
    println!("{}", row.trim_end());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lamports_conversion() {
        assert_eq!(lamports_to_sol(LAMPORTS_PER_SOL), 1.0);
        assert_eq!(sol_to_lamports(1.0), LAMPORTS_PER_SOL);
        assert_eq!(sol_to_lamports(0.5), LAMPORTS_PER_SOL / 2);
    }

    #[test]
    fn test_format_pubkey() {
        assert_eq!(format_pubkey("short"), "short");
        assert_eq!(
            format_pubkey("So11111111111111111111111111111111111111112"),
            "So1111...111112"
        );
    }
}
