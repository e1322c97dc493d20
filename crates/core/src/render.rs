//! Plain-text rendering of jobs and analysis results.

use std::fmt::Write;

use crate::job::{Job, JobStatus};
use crate::report::{AnalysisResult, IssueView};

/// Render the headline numbers, breakdowns, recommendations and summary.
pub fn render_report(result: &AnalysisResult) -> String {
    let mut out = String::new();
    let (score_label, score) = result.score();

    // Writing into a String cannot fail.
    let _ = writeln!(out, "{}", result.title());
    let _ = writeln!(out, "Documents Analyzed: {}", result.documents_analyzed());
    let _ = writeln!(out, "Total Issues: {}", result.total_issues());
    let _ = writeln!(out, "{score_label}: {}", format_score(score));
    if let AnalysisResult::FirmStandard(report) = result {
        if !report.compliance_level.is_empty() {
            let _ = writeln!(out, "Compliance Level: {}", report.compliance_level);
        }
    }

    let _ = writeln!(out, "\nSeverity Breakdown:");
    for (severity, count) in result.severity_counts().entries() {
        let _ = writeln!(out, "  {}: {count}", severity.label());
    }

    let _ = writeln!(out, "\nIssues by Category:");
    for (label, count) in result.category_counts() {
        let _ = writeln!(out, "  {label}: {count}");
    }

    let recommendations = result.recommendations();
    if !recommendations.is_empty() {
        let _ = writeln!(out, "\nRecommendations:");
        for rec in recommendations {
            let _ = writeln!(out, "  - {rec}");
        }
    }

    if !result.summary().is_empty() {
        let _ = writeln!(out, "\nSummary:\n  {}", result.summary());
    }

    out
}

/// Render a list of issues, one block per issue.
pub fn render_issues(issues: &[IssueView]) -> String {
    if issues.is_empty() {
        return "No issues found.\n".to_string();
    }

    let mut out = String::new();
    for (idx, issue) in issues.iter().enumerate() {
        let severity = issue.severity.map(|s| s.label()).unwrap_or("Unrated");
        let _ = writeln!(
            out,
            "{}. [{severity}] {}: {}",
            idx + 1,
            issue.category,
            issue.description
        );
        if let Some(location) = &issue.location {
            let _ = writeln!(out, "   at {location}");
        }
        if !issue.affected_documents.is_empty() {
            let _ = writeln!(out, "   affects {}", issue.affected_documents.join(", "));
        }
        if let Some(fix) = &issue.suggested_fix {
            let _ = writeln!(out, "   fix: {fix}");
        }
    }
    out
}

/// One-line progress indicator, e.g. `[ 40%] Parser Agent: Reading a.pdf`.
pub fn render_progress_line(percent: f64, agent: &str, message: &str) -> String {
    format!("[{:>3.0}%] {agent}: {message}", percent)
}

/// One-line job summary for status displays.
pub fn render_job_status(job: &Job) -> String {
    match job.status() {
        JobStatus::Failed => format!(
            "Job {} failed: {}",
            job.id(),
            job.error().unwrap_or("unknown error")
        ),
        status => format!(
            "Job {} {status} ({:.0}%, {} file(s), {} log line(s))",
            job.id(),
            job.progress(),
            job.files().len(),
            job.log_len()
        ),
    }
}

fn format_score(score: f64) -> String {
    if score.fract() == 0.0 {
        format!("{score:.0}")
    } else {
        format!("{score:.1}")
    }
}
