use std::{collections::BTreeMap, io::Write};

use anyhow::Result;
use pull_request_fixer::{BlockedPullRequest, FixReport, PrField, RunSummary};

fn group_by_repository(blocked: &[BlockedPullRequest]) -> BTreeMap<String, Vec<&BlockedPullRequest>> {
    let mut repos = BTreeMap::new();
    for pr in blocked {
        repos
            .entry(pr.repository().full_name())
            .or_insert_with(Vec::new)
            .push(pr);
    }
    for prs in repos.values_mut() {
        prs.sort_by_key(|pr| pr.number());
    }
    repos
}

fn display_repository_header<W: Write>(repo_name: &str, writer: &mut W) -> Result<()> {
    writeln!(writer, "Repository: {repo_name}")?;
    writeln!(writer, "=====================================")?;
    Ok(())
}

fn display_blocked_pr<W: Write>(pr: &BlockedPullRequest, writer: &mut W) -> Result<()> {
    let number = pr
        .number()
        .map_or_else(|| "?".to_string(), |n| n.to_string());
    writeln!(writer, "  #{number} {}", pr.title())?;
    if let Some(url) = pr.url() {
        writeln!(writer, "     {url}")?;
    }
    for reason in &pr.reasons {
        writeln!(writer, "     - {reason}")?;
    }
    Ok(())
}

pub fn display_blocked_prs<W: Write>(blocked: &[BlockedPullRequest], writer: &mut W) -> Result<()> {
    if blocked.is_empty() {
        writeln!(writer, "No blocked pull requests found")?;
        return Ok(());
    }

    for (repo_name, prs) in group_by_repository(blocked) {
        display_repository_header(&repo_name, writer)?;
        for pr in prs {
            display_blocked_pr(pr, writer)?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

fn describe_report(report: &FixReport) -> String {
    let verb = if report.dry_run { "would update" } else { "updated" };
    let mut parts: Vec<String> = Vec::new();

    let fields: Vec<PrField> = if report.dry_run {
        report.fields.iter().map(|change| change.field).collect()
    } else {
        report.applied_fields().collect()
    };
    parts.extend(fields.iter().map(|field| format!("{verb} {field}")));

    let files = if report.dry_run {
        report.files.len()
    } else {
        report.applied_files()
    };
    if files > 0 {
        parts.push(format!("{verb} {files} file(s)"));
    }
    if report.rerun_checks > 0 {
        parts.push(format!("re-ran {} check(s)", report.rerun_checks));
    }

    if parts.is_empty() {
        "no changes needed".to_string()
    } else {
        parts.join(", ")
    }
}

pub fn display_fix_reports<W: Write>(reports: &[FixReport], writer: &mut W) -> Result<()> {
    let mut sorted: Vec<&FixReport> = reports.iter().collect();
    sorted.sort_by(|a, b| a.target.to_string().cmp(&b.target.to_string()));
    for report in sorted {
        writeln!(writer, "{}: {}", report.target, describe_report(report))?;
    }
    Ok(())
}

pub fn display_summary<W: Write>(summary: &RunSummary, writer: &mut W) -> Result<()> {
    let fixed_label = if summary.dry_run { "would fix" } else { "fixed" };
    writeln!(
        writer,
        "Summary: {} blocked, {} {}, {} error(s){}",
        summary.blocked.len(),
        summary.fixed(),
        fixed_label,
        summary.errors,
        if summary.dry_run { " [dry run]" } else { "" }
    )?;
    Ok(())
}
