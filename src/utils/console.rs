// src/utils/console.rs

//! Console reporting with server-style formatting.
//!
//! Human-oriented output for the CLI (headers, steps, summaries). Diagnostic
//! logging goes through the `log` facade instead.

use chrono::Local;

/// Format a line with timestamp and tag.
fn format_line(tag: &str, message: &str) -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    format!("[{}] [{}] {}", timestamp, tag, message)
}

/// Print an informational line.
pub fn info(message: &str) {
    println!("{}", format_line("INFO", message));
}

/// Print a success line.
pub fn success(message: &str) {
    println!("{}", format_line("INFO", &format!("✓ {}", message)));
}

/// Print a warning line to stderr.
pub fn warn(message: &str) {
    eprintln!("{}", format_line("WARN", message));
}

/// Print a header.
pub fn header(title: &str) {
    let border = "═".repeat(60);
    println!("{}", format_line("INFO", &border));
    println!("{}", format_line("INFO", &format!("  {}", title)));
    println!("{}", format_line("INFO", &border));
}

/// Print an indented sub-item.
pub fn sub_item(message: &str) {
    println!("{}", format_line("INFO", &format!("    {}", message)));
}

/// Print a summary section.
pub fn summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("{}", format_line("SUMMARY", title));
    for (key, value) in items {
        println!("{}", format_line("SUMMARY", &format!("    {}: {}", key, value)));
    }
}
