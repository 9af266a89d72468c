//! Output renderers for command results.

use std::fmt::Write as _;
use std::time::Duration;

use octo_client::{WatchReport, WatchVerdict};

pub(crate) fn render_watch_report(report: &WatchReport) {
    print!("{}", format_watch_report(report));
}

pub(crate) fn format_watch_report(report: &WatchReport) -> String {
    let mut text = String::new();
    let _ = writeln!(
        text,
        "{:<24} {:<20} {:<10} STATE",
        "TARGET", "TASK", "PHASE"
    );
    for task in &report.tasks {
        let _ = writeln!(
            text,
            "{:<24} {:<20} {:<10} {}",
            task.label,
            task.id,
            task.state.phase(),
            task.state
        );
    }

    let summary = match report.verdict {
        WatchVerdict::Succeeded => format!(
            "all {} deployment(s) succeeded after {}",
            report.tasks.len(),
            format_duration(report.elapsed)
        ),
        WatchVerdict::Failed => {
            let failed: Vec<String> = report
                .failed()
                .iter()
                .map(|task| task.label.clone())
                .collect();
            format!("deployment failed for: {}", failed.join(", "))
        }
        WatchVerdict::TimedOut => {
            let pending: Vec<String> = report
                .pending()
                .iter()
                .map(|task| task.label.clone())
                .collect();
            format!(
                "timed out after {} waiting for: {}",
                format_duration(report.timeout),
                pending.join(", ")
            )
        }
        WatchVerdict::Aborted => match &report.last_error {
            Some(err) => format!("stopped watching after {} round(s): {err}", report.rounds),
            None => format!("stopped watching after {} round(s)", report.rounds),
        },
    };
    let _ = writeln!(text, "{summary}");
    text
}

/// Render a duration as `hh:mm:ss`.
pub(crate) fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    format!(
        "{:02}:{:02}:{:02}",
        total / 3_600,
        (total % 3_600) / 60,
        total % 60
    )
}
