use freestrm_core::domain::ProgressEvent;

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    pub fn is_json(self) -> bool {
        matches!(self, OutputFormat::Json)
    }
}

/// Trait for formatting CLI output
pub trait OutputFormatter {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
    fn print_json(&self, value: &serde_json::Value);
    /// One progress record of a run.
    fn progress(&self, event: &ProgressEvent);
}

/// Human-readable output formatter with checkmarks and indentation
pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn success(&self, message: &str) {
        println!("\u{2713} {}", message);
    }
    fn error(&self, message: &str) {
        eprintln!("\u{2717} Error: {}", message);
    }
    fn warn(&self, message: &str) {
        eprintln!("\u{26a0} Warning: {}", message);
    }
    fn info(&self, message: &str) {
        println!("  {}", message);
    }
    fn print_json(&self, _value: &serde_json::Value) {}
    fn progress(&self, event: &ProgressEvent) {
        if let Some(line) = describe_progress(event) {
            println!("  {}", line);
        }
    }
}

/// JSON output formatter
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn success(&self, message: &str) {
        println!(
            "{}",
            serde_json::json!({"success": true, "message": message})
        );
    }
    fn error(&self, message: &str) {
        eprintln!(
            "{}",
            serde_json::json!({"success": false, "error": message})
        );
    }
    fn warn(&self, message: &str) {
        eprintln!(
            "{}",
            serde_json::json!({"level": "warning", "message": message})
        );
    }
    fn info(&self, _message: &str) {}
    fn print_json(&self, value: &serde_json::Value) {
        println!(
            "{}",
            serde_json::to_string_pretty(value).unwrap_or_default()
        );
    }
    fn progress(&self, event: &ProgressEvent) {
        // One record per line, the same shape subscribers receive.
        println!("{}", event.to_json());
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    if format.is_json() {
        Box::new(JsonFormatter)
    } else {
        Box::new(HumanFormatter)
    }
}

/// Line shown for a progress record, or `None` for intermediate percentages.
pub fn describe_progress(event: &ProgressEvent) -> Option<String> {
    let overall = event.overall_percent.as_deref().unwrap_or("-");
    match (&event.file_path, event.percent, &event.error) {
        (Some(path), _, Some(error)) => Some(format!("\u{2717} {path}: {error}")),
        (Some(path), Some(100), None) => Some(format!("[{overall:>6}%] {path}")),
        (None, _, Some(error)) => Some(format!("\u{2717} {error}")),
        _ if event.is_cancellation() => Some("Cancelled".to_string()),
        _ if event.done == Some(true) => Some(format!("[{overall:>6}%] Done")),
        _ => None,
    }
}

/// `"1 file"`, `"3 files"`
pub fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

/// `"850ms"`, `"12.4s"`
pub fn format_duration_ms(ms: u64) -> String {
    if ms >= 1000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{}ms", ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_progress() {
        assert_eq!(
            describe_progress(&ProgressEvent::file("tv/ep1.strm", 100, 50.0)).as_deref(),
            Some("[ 50.00%] tv/ep1.strm")
        );
        assert_eq!(describe_progress(&ProgressEvent::file("tv/ep2.srt", 40, 20.0)), None);
        assert_eq!(
            describe_progress(&ProgressEvent::file_error("a.srt", "Not found: a.srt")).as_deref(),
            Some("\u{2717} a.srt: Not found: a.srt")
        );
        assert_eq!(
            describe_progress(&ProgressEvent::cancelled()).as_deref(),
            Some("Cancelled")
        );
        assert_eq!(
            describe_progress(&ProgressEvent::completed(100.0)).as_deref(),
            Some("[100.00%] Done")
        );
    }

    #[test]
    fn test_plural_and_duration() {
        assert_eq!(plural(1, "file"), "1 file");
        assert_eq!(plural(0, "file"), "0 files");
        assert_eq!(format_duration_ms(850), "850ms");
        assert_eq!(format_duration_ms(12_400), "12.4s");
    }
}
