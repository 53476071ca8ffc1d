//! Terminal rendering for sessions, messages and analysis progress.

use deepchat_core::models::{AnalysisPhase, KpiState, Message, Role, Session};
use deepchat_core::{AnalysisSnapshot, Notifier};

const BAR_WIDTH: usize = 30;

/// Prints notifications to stderr so stdout stays clean for data.
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn success(&self, message: &str) {
        eprintln!("✓ {}", message);
    }

    fn error(&self, message: &str) {
        eprintln!("✗ {}", message);
    }
}

pub fn progress_bar(progress: f64) -> String {
    let pct = progress.clamp(0.0, 100.0);
    let filled = ((pct / 100.0) * BAR_WIDTH as f64).round() as usize;
    format!(
        "[{}{}] {:>3.0}%",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled),
        pct
    )
}

pub fn kpi_icon(state: KpiState) -> &'static str {
    match state {
        KpiState::Success => "✓",
        KpiState::Failure => "✗",
        KpiState::Pending => "…",
    }
}

fn phase_label(phase: AnalysisPhase) -> &'static str {
    match phase {
        AnalysisPhase::NotStarted => "not started",
        AnalysisPhase::Running => "running",
        AnalysisPhase::Complete => "complete",
        AnalysisPhase::Failed => "failed",
    }
}

/// Status line, progress bar and one line per KPI.
pub fn render_snapshot(snapshot: &AnalysisSnapshot) -> String {
    let mut out = match &snapshot.status {
        Some(status) => format!("{} ({})\n", status.status, phase_label(snapshot.phase)),
        None => format!("Deep analysis {}\n", phase_label(snapshot.phase)),
    };
    out.push_str(&progress_bar(snapshot.progress));

    if let Some(status) = &snapshot.status {
        for kpi in &status.kpi_list {
            out.push_str(&format!("\n  {} {}", kpi_icon(status.kpi_state(kpi)), kpi));
        }
        if let Some(url) = &status.report_url {
            out.push_str(&format!("\nReport: {}", url));
        }
    }
    out
}

/// One dashboard line: id, file name, size and creation time.
pub fn session_row(session: &Session) -> String {
    let rows = session
        .file_info
        .as_ref()
        .and_then(|f| f.total_rows)
        .map(|n| format!("{} rows", n))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{:<38} {:<32} {:>12}  {}",
        session.session_id,
        truncate(session.display_name(), 32),
        rows,
        session.created_at.as_deref().unwrap_or("")
    )
}

pub fn render_message(message: &Message) -> String {
    let who = match message.role {
        Role::User => "you",
        Role::Assistant => "assistant",
    };
    let mut out = format!("[{}] {}", who, message.content);

    if let Some(meta) = &message.metadata {
        if let Some(code) = &meta.code {
            out.push_str(&format!("\n```python\n{}\n```", code.trim_end()));
        }
        if let Some(explanation) = &meta.code_explanation {
            out.push_str(&format!("\n{}", explanation));
        }
        if let Some(url) = &meta.file_url {
            out.push_str(&format!("\nFile: {}", url));
        }
    }
    if message.role == Role::Assistant && !message.id.is_empty() {
        out.push_str(&format!("\n(message id: {})", message.id));
    }
    out
}

pub fn render_smart_questions(questions: &[String]) -> String {
    questions
        .iter()
        .enumerate()
        .map(|(i, q)| format!("  {}. {}", i + 1, q))
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepchat_core::models::{AnalysisStatus, MessageMetadata};
    use std::collections::HashMap;

    #[test]
    fn test_progress_bar_bounds() {
        assert_eq!(progress_bar(0.0), format!("[{}]   0%", "-".repeat(30)));
        assert_eq!(progress_bar(100.0), format!("[{}] 100%", "#".repeat(30)));
        assert_eq!(progress_bar(150.0), progress_bar(100.0));
        assert_eq!(
            progress_bar(50.0),
            format!("[{}{}]  50%", "#".repeat(15), "-".repeat(15))
        );
    }

    #[test]
    fn test_snapshot_lists_kpis_with_icons() {
        let mut kpi_status = HashMap::new();
        kpi_status.insert("Revenue".to_string(), KpiState::Success);
        kpi_status.insert("Churn".to_string(), KpiState::Failure);
        let snapshot = AnalysisSnapshot {
            phase: AnalysisPhase::Running,
            status: Some(AnalysisStatus {
                status: "Deep Analysis KPI List Generated".to_string(),
                kpi_list: vec!["Revenue".into(), "Churn".into(), "ARPU".into()],
                kpi_status,
                report_url: None,
                created_at: None,
                updated_at: None,
            }),
            progress: 60.0,
        };

        let text = render_snapshot(&snapshot);
        assert!(text.starts_with("Deep Analysis KPI List Generated (running)"));
        assert!(text.contains("✓ Revenue"));
        assert!(text.contains("✗ Churn"));
        assert!(text.contains("… ARPU"));
        assert!(!text.contains("Report:"));
    }

    #[test]
    fn test_session_row_without_file_info() {
        let session: Session =
            serde_json::from_value(serde_json::json!({ "session_id": "s-1" })).unwrap();
        let row = session_row(&session);
        assert!(row.starts_with("s-1"));
        assert!(row.contains("Unknown file"));
    }

    #[test]
    fn test_render_assistant_message_with_code() {
        let message = Message {
            id: "m-1".to_string(),
            session_id: "s-1".to_string(),
            role: Role::Assistant,
            content: "Mean price is 42".to_string(),
            created_at: String::new(),
            content_type: "text".to_string(),
            metadata: Some(MessageMetadata {
                code: Some("df.price.mean()\n".to_string()),
                code_explanation: None,
                file_url: None,
            }),
        };
        let text = render_message(&message);
        assert!(text.starts_with("[assistant] Mean price is 42"));
        assert!(text.contains("```python\ndf.price.mean()\n```"));
        assert!(text.ends_with("(message id: m-1)"));
    }

    #[test]
    fn test_truncate_long_names() {
        assert_eq!(truncate("short.csv", 32), "short.csv");
        let long = "a".repeat(40);
        let cut = truncate(&long, 10);
        assert_eq!(cut.chars().count(), 10);
        assert!(cut.ends_with('…'));
    }
}
