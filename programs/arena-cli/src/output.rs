//! Plain-text rendering of reports

use std::fmt::Write;

use arena_core::{InterpretedStrategy, Provenance, TournamentReport};

fn provenance_label(provenance: Provenance) -> &'static str {
    match provenance {
        Provenance::Cached => "cached",
        Provenance::FreshlyInterpreted => "fresh",
        Provenance::Fallback => "fallback",
    }
}

fn percent(rate: Option<f64>) -> String {
    rate.map_or_else(|| "-".to_string(), |r| format!("{:.1}%", r * 100.0))
}

/// Leaderboard table followed by degraded strategies and anomalies.
pub fn render_table(report: &TournamentReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} matches, {} rounds each (T={} R={} P={} S={})",
        report.match_count(),
        report.rounds_per_match,
        report.payoff.temptation(),
        report.payoff.reward(),
        report.payoff.punishment(),
        report.payoff.sucker(),
    );
    let _ = writeln!(
        out,
        "{:>4}  {:<20} {:>8} {:>9} {:>8} {:>7}  {}",
        "rank", "strategy", "score", "per 100", "coop", "anom", "source"
    );
    for (rank, standing) in report.leaderboard().iter().enumerate() {
        let source = if standing.degraded && standing.provenance != Provenance::Fallback {
            "cached fallback"
        } else {
            provenance_label(standing.provenance)
        };
        let _ = writeln!(
            out,
            "{:>4}  {:<20} {:>8} {:>9.1} {:>8} {:>7}  {}",
            rank + 1,
            standing.name,
            standing.total_score,
            standing.normalized_score(),
            percent(standing.cooperation_rate()),
            standing.anomalies,
            source,
        );
    }

    let degraded = report.degraded();
    if !degraded.is_empty() {
        let _ = writeln!(out, "\nplaying the fallback:");
        for standing in degraded {
            let reason = standing.fallback_reason.as_deref().unwrap_or("same text failed earlier");
            let _ = writeln!(out, "  {}: {}", standing.name, reason);
        }
    }

    let anomalies = report.anomalies();
    if !anomalies.is_empty() {
        let _ = writeln!(out, "\nruntime anomalies:");
        for anomaly in anomalies {
            let _ = writeln!(out, "  {anomaly}");
        }
    }
    out
}

/// What `arena interpret` prints.
pub fn render_interpretation(interpreted: &InterpretedStrategy) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "source: {}", provenance_label(interpreted.provenance));
    let _ = writeln!(out, "logic:  {}", interpreted.logic.describe());
    if let Some(reason) = &interpreted.fallback_reason {
        let _ = writeln!(out, "reason: {reason}");
    }
    out
}
