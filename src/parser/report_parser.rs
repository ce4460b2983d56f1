//! Extracts completion and verdict reports from raw agent output text
//! (§4.4). Used only when an agent signals completion in prose instead of
//! invoking `report_to_parent` / per-task verdict tool calls directly.

use std::collections::HashMap;

use crate::models::{CompletionReport, Task, Verdict, VerificationVerdict};

const FAILURE_KEYWORDS: &[&str] = &["failed", "blocked", "error"];
const NEGATION_MARKERS: &[&str] = &["not approved", "❌", "needs fix"];
const POSITIVE_MARKERS: &[&str] = &["approved", "✅"];

/// Locates a completion statement (the final non-blank paragraph) and
/// yields a report with `success=true` unless that statement contains a
/// failure keyword.
pub fn parse_crafter_completion(
    agent_id: &str,
    output: &str,
    task: &Task,
) -> Option<CompletionReport> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return None;
    }

    let last_paragraph = trimmed
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .last()
        .unwrap_or(trimmed);

    let lower = last_paragraph.to_lowercase();
    let success = !FAILURE_KEYWORDS.iter().any(|kw| lower.contains(kw));

    Some(CompletionReport {
        agent_id: agent_id.to_string(),
        task_id: task.id.clone(),
        summary: last_paragraph.to_string(),
        files_modified: None,
        verification_results: None,
        success,
    })
}

/// Scans GATE output for a per-task verdict. Returns a verdict only for
/// tasks the text explicitly references by title or id; callers (the
/// GateVerification stage) apply the NOT_APPROVED default for any task
/// missing from the returned map, except in the blanket-approval case
/// described below.
///
/// When no task-specific marker is found anywhere in the output but a bare
/// `APPROVED` (or `✅`) appears, every review task inherits APPROVED — this
/// is the stated fallback for GATE output that approves the whole wave
/// without naming tasks individually.
pub fn parse_gate_verdicts(
    _gate_agent_id: &str,
    output: &str,
    review_tasks: &[Task],
) -> HashMap<String, VerificationVerdict> {
    let mut verdicts = HashMap::new();

    for task in review_tasks {
        if let Some(verdict) = find_task_verdict(output, task) {
            verdicts.insert(
                task.id.clone(),
                VerificationVerdict {
                    task_id: task.id.clone(),
                    verdict,
                    summary: extract_task_context(output, task),
                },
            );
        }
    }

    if verdicts.is_empty() && contains_blanket_approval(output) {
        for task in review_tasks {
            verdicts.insert(
                task.id.clone(),
                VerificationVerdict {
                    task_id: task.id.clone(),
                    verdict: Verdict::Approved,
                    summary: "blanket APPROVED".to_string(),
                },
            );
        }
    }

    verdicts
}

fn find_task_verdict(output: &str, task: &Task) -> Option<Verdict> {
    let title_lower = task.title.to_lowercase();
    let id_lower = task.id.to_lowercase();

    let mut saw_negation = false;
    let mut saw_positive = false;
    let mut referenced = false;

    for line in output.lines() {
        let lower = line.to_lowercase();
        if !lower.contains(&title_lower) && !lower.contains(&id_lower) {
            continue;
        }
        referenced = true;
        if NEGATION_MARKERS.iter().any(|m| lower.contains(m)) {
            saw_negation = true;
        } else if POSITIVE_MARKERS.iter().any(|m| lower.contains(m)) {
            saw_positive = true;
        }
    }

    if !referenced {
        return None;
    }
    if saw_negation {
        Some(Verdict::NotApproved)
    } else if saw_positive {
        Some(Verdict::Approved)
    } else {
        Some(Verdict::NotApproved)
    }
}

fn extract_task_context(output: &str, task: &Task) -> String {
    let title_lower = task.title.to_lowercase();
    output
        .lines()
        .find(|line| line.to_lowercase().contains(&title_lower))
        .unwrap_or("")
        .trim()
        .to_string()
}

fn contains_blanket_approval(output: &str) -> bool {
    let lower = output.to_lowercase();
    let has_positive = POSITIVE_MARKERS.iter().any(|m| lower.contains(m));
    let has_negation = NEGATION_MARKERS.iter().any(|m| lower.contains(m));
    has_positive && !has_negation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Task;

    fn task(id: &str, title: &str) -> Task {
        let mut t = Task::new(id.to_string(), "ws1".to_string());
        t.title = title.to_string();
        t
    }

    #[test]
    fn crafter_completion_success_by_default() {
        let t = task("t1", "Add greet");
        let report = parse_crafter_completion("a1", "Implemented greet().\n\nTask completed.", &t)
            .unwrap();
        assert!(report.success);
    }

    #[test]
    fn crafter_completion_detects_failure_keyword() {
        let t = task("t1", "Add greet");
        let report =
            parse_crafter_completion("a1", "Attempted the change.\n\nBlocked by missing dependency.", &t)
                .unwrap();
        assert!(!report.success);
    }

    #[test]
    fn crafter_completion_none_for_blank_output() {
        let t = task("t1", "Add greet");
        assert!(parse_crafter_completion("a1", "   ", &t).is_none());
    }

    #[test]
    fn gate_verdicts_blanket_approval_when_no_task_named() {
        let tasks = vec![task("t1", "Add greet"), task("t2", "Add farewell")];
        let verdicts = parse_gate_verdicts("gate1", "APPROVED", &tasks);
        assert_eq!(verdicts.len(), 2);
        assert!(verdicts.values().all(|v| v.verdict == Verdict::Approved));
    }

    #[test]
    fn gate_verdicts_per_task_negation_wins_over_substring_approved() {
        let tasks = vec![task("t1", "Add greet")];
        let verdicts = parse_gate_verdicts("gate1", "Add greet: NOT APPROVED, missing tests", &tasks);
        assert_eq!(verdicts["t1"].verdict, Verdict::NotApproved);
    }

    #[test]
    fn gate_verdicts_per_task_approval() {
        let tasks = vec![task("t1", "Add greet"), task("t2", "Add farewell")];
        let output = "Add greet: APPROVED ✅\nAdd farewell: NOT APPROVED, missing edge case";
        let verdicts = parse_gate_verdicts("gate1", output, &tasks);
        assert_eq!(verdicts["t1"].verdict, Verdict::Approved);
        assert_eq!(verdicts["t2"].verdict, Verdict::NotApproved);
    }

    #[test]
    fn gate_verdicts_unreferenced_task_is_absent_from_map() {
        let tasks = vec![task("t1", "Add greet"), task("t2", "Add farewell")];
        let output = "Add greet: APPROVED";
        let verdicts = parse_gate_verdicts("gate1", output, &tasks);
        assert!(verdicts.contains_key("t1"));
        assert!(!verdicts.contains_key("t2"));
    }
}
