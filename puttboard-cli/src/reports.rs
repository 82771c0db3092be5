use std::io::Write;

use anyhow::Result;
use colored::Colorize;
use puttboard_engine::batch::CommitReport;
use puttboard_engine::config::RunFilters;
use puttboard_engine::gate::RunMode;
use puttboard_engine::jobs::{ReconcileReport, ScoringReport};
use puttboard_engine::store::RejectedDocument;
use serde::Serialize;

/// What the operator asked for, printed before any work starts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunPreamble<'a> {
    pub job: &'a str,
    pub mode: RunMode,
    pub target: &'a str,
    /// Whether `--project` confirmed the target.
    pub target_verified: bool,
    pub filters: &'a RunFilters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bonus_step: Option<f64>,
}

#[derive(Serialize)]
struct JsonReport<'a, T: Serialize> {
    run: &'a RunPreamble<'a>,
    report: &'a T,
}

fn list_or_all(values: &[String]) -> String {
    if values.is_empty() {
        "all".to_string()
    } else {
        values.join(", ")
    }
}

/// One-line form of the preamble for the log.
pub fn preamble_line(preamble: &RunPreamble<'_>) -> String {
    let game_types: Vec<String> = preamble
        .filters
        .game_types
        .iter()
        .map(ToString::to_string)
        .collect();
    format!(
        "{} run: mode={} target={}{} game_types={} events={} seasons={}",
        preamble.job,
        preamble.mode,
        preamble.target,
        if preamble.target_verified { "" } else { " (unverified)" },
        list_or_all(&game_types),
        list_or_all(&preamble.filters.event_ids),
        list_or_all(&preamble.filters.season_ids)
    )
}

pub fn write_preamble<W: Write>(out: &mut W, preamble: &RunPreamble<'_>) -> Result<()> {
    writeln!(out, "{}", format!("🏌️ puttboard {}", preamble.job).bright_cyan().bold())?;
    writeln!(out, "{}", "=".repeat(32).cyan())?;
    let mode = match preamble.mode {
        RunMode::DryRun => "dry-run (no writes)".yellow(),
        RunMode::Apply => "apply".red().bold(),
    };
    writeln!(out, "Mode: {mode}")?;
    if preamble.target_verified {
        writeln!(out, "Target: {}", preamble.target.bold())?;
    } else {
        writeln!(
            out,
            "Target: {} {}",
            preamble.target.bold(),
            "(unverified; pass --project to check)".yellow()
        )?;
    }
    let game_types: Vec<String> = preamble
        .filters
        .game_types
        .iter()
        .map(ToString::to_string)
        .collect();
    writeln!(out, "Game types: {}", list_or_all(&game_types))?;
    writeln!(out, "Events: {}", list_or_all(&preamble.filters.event_ids))?;
    writeln!(out, "Seasons: {}", list_or_all(&preamble.filters.season_ids))?;
    if let Some(step) = preamble.bonus_step {
        writeln!(out, "Bonus step override: {step}")?;
    }
    writeln!(out)?;
    Ok(())
}

fn write_commit_line<W: Write>(
    out: &mut W,
    mode: RunMode,
    planned: usize,
    commit: Option<CommitReport>,
) -> Result<()> {
    match commit {
        Some(commit) => writeln!(
            out,
            "{} {} writes in {} chunks",
            "✅ Committed".green(),
            commit.writes,
            commit.chunks
        )?,
        None if mode.is_apply() => writeln!(out, "Nothing committed.")?,
        None => writeln!(
            out,
            "{} {planned} mutations planned; rerun with --apply --confirm to write",
            "🔎 Dry run:".yellow()
        )?,
    }
    Ok(())
}

fn write_rejected<W: Write>(out: &mut W, rejected: &[RejectedDocument]) -> Result<()> {
    if rejected.is_empty() {
        return Ok(());
    }
    writeln!(out, "Unreadable documents skipped: {}", rejected.len().to_string().yellow())?;
    for doc in rejected {
        writeln!(
            out,
            "  • {} {}: {}",
            doc.collection,
            doc.id.as_deref().unwrap_or("<no id>"),
            doc.reason
        )?;
    }
    Ok(())
}

pub fn write_reconcile_console<W: Write>(out: &mut W, report: &ReconcileReport) -> Result<()> {
    let stats = &report.stats;
    writeln!(out, "{}", "📊 Reconcile Summary".bright_cyan().bold())?;
    writeln!(out, "{}", "====================".cyan())?;
    writeln!(out, "Sessions scanned: {}", stats.sessions_scanned)?;
    writeln!(out, "Entries scanned: {}", stats.entries_scanned)?;
    writeln!(out, "Players seen: {}", stats.players_seen)?;
    writeln!(out, "Created: {}", stats.created.to_string().green())?;
    writeln!(out, "Updated: {}", stats.updated.to_string().green())?;
    writeln!(out, "Unchanged: {}", stats.unchanged)?;
    writeln!(out, "Duplicates: {}", stats.duplicates.to_string().yellow())?;
    writeln!(
        out,
        "Skipped: {} (score), {} (identity)",
        stats.skipped_score, stats.skipped_identity
    )?;
    writeln!(out, "Identity lookups: {}", report.identity_lookups)?;
    write_rejected(out, &report.rejected)?;
    write_commit_line(out, report.mode, report.mutations.len(), report.commit)
}

pub fn write_scoring_console<W: Write>(out: &mut W, report: &ScoringReport) -> Result<()> {
    let stats = &report.stats;
    writeln!(out, "{}", "📊 Event Scoring Summary".bright_cyan().bold())?;
    writeln!(out, "{}", "========================".cyan())?;
    writeln!(out, "Events scanned: {}", stats.events_scanned)?;
    writeln!(out, "Results scanned: {}", stats.results_scanned)?;
    writeln!(out, "Results updated: {}", stats.results_changed.to_string().green())?;
    writeln!(out, "Results unchanged: {}", stats.results_unchanged)?;
    writeln!(out, "Skipped (no rank): {}", stats.skipped_unranked)?;
    writeln!(out, "Events updated: {}", stats.events_patched)?;
    if stats.held_back > 0 {
        writeln!(out, "Held back: {}", stats.held_back.to_string().yellow())?;
    }
    let aggregates = &stats.aggregates;
    writeln!(
        out,
        "Season stats: {} upserts, {} already applied, {} dropped, {} clipped at zero",
        aggregates.upserts,
        aggregates.already_applied,
        aggregates.dropped_missing_keys,
        aggregates.floored
    )?;
    write_rejected(out, &report.rejected)?;
    if !report.warnings.is_empty() {
        writeln!(out, "Warnings:")?;
        for warning in &report.warnings {
            writeln!(out, "  • {}", warning.yellow())?;
        }
    }
    write_commit_line(out, report.mode, report.mutations.len(), report.commit)
}

pub fn write_json<W: Write, T: Serialize>(
    out: &mut W,
    preamble: &RunPreamble<'_>,
    report: &T,
) -> Result<()> {
    let document = JsonReport {
        run: preamble,
        report,
    };
    serde_json::to_writer_pretty(&mut *out, &document)?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use puttboard_engine::jobs::ScoringStats;
    use puttboard_engine::reconcile::ReconcileStats;

    fn preamble(filters: &RunFilters) -> RunPreamble<'_> {
        RunPreamble {
            job: "reconcile",
            mode: RunMode::DryRun,
            target: "league-dev",
            target_verified: true,
            filters,
            bonus_step: None,
        }
    }

    #[test]
    fn preamble_lists_target_and_filters() {
        colored::control::set_override(false);
        let filters = RunFilters::new(&["ladder".to_string()], &[], &[]).unwrap();
        let mut out = Vec::new();
        write_preamble(&mut out, &preamble(&filters)).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Mode: dry-run"));
        assert!(text.contains("Target: league-dev"));
        assert!(text.contains("Game types: ladder"));
        assert!(text.contains("Events: all"));
    }

    #[test]
    fn dry_run_summary_mentions_planned_mutations() {
        colored::control::set_override(false);
        let report = ReconcileReport {
            mode: RunMode::DryRun,
            stats: ReconcileStats {
                created: 2,
                ..ReconcileStats::default()
            },
            identity_lookups: 0,
            rejected: Vec::new(),
            mutations: Vec::new(),
            commit: None,
        };
        let mut out = Vec::new();
        write_reconcile_console(&mut out, &report).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Created: 2"));
        assert!(text.contains("0 mutations planned"));
    }

    #[test]
    fn json_report_nests_run_and_report() {
        let filters = RunFilters::default();
        let report = ScoringReport {
            mode: RunMode::DryRun,
            stats: ScoringStats::default(),
            warnings: vec!["event e1: result r3 has rank 3 beyond 2 participants".to_string()],
            rejected: Vec::new(),
            mutations: Vec::new(),
            commit: None,
        };
        let mut out = Vec::new();
        write_json(&mut out, &preamble(&filters), &report).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["run"]["mode"], "dry-run");
        assert_eq!(value["run"]["target"], "league-dev");
        assert_eq!(value["report"]["warnings"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn unverified_target_is_flagged() {
        colored::control::set_override(false);
        let filters = RunFilters::default();
        let mut preamble = preamble(&filters);
        preamble.target_verified = false;
        let mut out = Vec::new();
        write_preamble(&mut out, &preamble).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Target: league-dev (unverified; pass --project to check)"));
        assert!(preamble_line(&preamble).contains("target=league-dev (unverified)"));
    }

    #[test]
    fn rejected_documents_are_listed() {
        colored::control::set_override(false);
        let report = ReconcileReport {
            mode: RunMode::DryRun,
            stats: ReconcileStats::default(),
            identity_lookups: 0,
            rejected: vec![RejectedDocument {
                collection: "sessions",
                id: Some("bad".to_string()),
                reason: "invalid type".to_string(),
                raw: serde_json::Value::Null,
            }],
            mutations: Vec::new(),
            commit: None,
        };
        let mut out = Vec::new();
        write_reconcile_console(&mut out, &report).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Unreadable documents skipped: 1"));
        assert!(text.contains("sessions bad: invalid type"));
    }
}
