//! `@@@task` plan-text grammar (§4.3).
//!
//! Stateful line-by-line scan: a task block opens on `#{0,6}\s*@@@tasks?`
//! and closes on a line that is exactly `@@@`. Inside a block, fenced code
//! (``` ```) is tracked so a `#` bash comment inside a fenced verification
//! snippet is never mistaken for a level-1 heading (scenario E3). A single
//! block may hold several tasks, split at each unfenced `# ` heading.

use regex::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::models::Task;

fn block_start_regex() -> &'static Regex {
    static BLOCK_START: OnceLock<Regex> = OnceLock::new();
    BLOCK_START.get_or_init(|| Regex::new(r"^#{0,6}\s*@@@tasks?\s*$").unwrap())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Objective,
    Scope,
    DefinitionOfDone,
    Verification,
}

fn section_alias(name: &str) -> Option<Section> {
    match name {
        "Objective" | "Goal" | "目标" | "目的" => Some(Section::Objective),
        "Scope" | "范围" | "作用域" => Some(Section::Scope),
        "Definition of Done" | "Acceptance Criteria" | "Done Criteria" | "完成标准"
        | "验收标准" | "完成条件" => Some(Section::DefinitionOfDone),
        "Verification" | "Verify" | "验证" | "验证方法" | "测试验证" => {
            Some(Section::Verification)
        }
        _ => None,
    }
}

fn is_level1_heading(trimmed: &str) -> bool {
    trimmed.starts_with("# ") && !trimmed.starts_with("##")
}

fn is_level2_heading(trimmed: &str) -> bool {
    trimmed.starts_with("## ")
}

fn toggles_fence(trimmed: &str) -> bool {
    trimmed.starts_with("```")
}

/// Extracts tasks from free-form LLM plan text. Returns `[]` for blank
/// input; malformed blocks (no closing `@@@`) are dropped entirely.
pub fn parse_tasks(plan_text: &str, workspace_id: &str) -> Vec<Task> {
    let normalized = plan_text.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = normalized.split('\n').collect();

    let blocks = extract_blocks(&lines);

    let mut tasks = Vec::new();
    for block in blocks {
        for chunk in split_into_chunks(&block) {
            if let Some(task) = parse_chunk(&chunk, workspace_id) {
                tasks.push(task);
            }
        }
    }
    tasks
}

/// Returns the raw line bodies of every well-formed `@@@task ... @@@` block.
fn extract_blocks<'a>(lines: &[&'a str]) -> Vec<Vec<&'a str>> {
    let mut blocks = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        if block_start_regex().is_match(lines[i].trim()) {
            let mut fenced = false;
            let mut body = Vec::new();
            let mut j = i + 1;
            let mut closed = false;
            while j < lines.len() {
                let trimmed = lines[j].trim();
                if toggles_fence(trimmed) {
                    fenced = !fenced;
                    body.push(lines[j]);
                    j += 1;
                    continue;
                }
                if !fenced && trimmed == "@@@" {
                    closed = true;
                    break;
                }
                body.push(lines[j]);
                j += 1;
            }
            if closed {
                blocks.push(body);
                i = j + 1;
            } else {
                // No terminator found before EOF: malformed, drop.
                i += 1;
            }
        } else {
            i += 1;
        }
    }
    blocks
}

/// Splits a block's body at every unfenced level-1 heading. Lines before
/// the first heading belong to no task and are discarded.
fn split_into_chunks<'a>(body: &[&'a str]) -> Vec<Vec<&'a str>> {
    let mut chunks: Vec<Vec<&'a str>> = Vec::new();
    let mut current: Option<Vec<&'a str>> = None;
    let mut fenced = false;

    for &line in body {
        let trimmed = line.trim();
        if toggles_fence(trimmed) {
            fenced = !fenced;
            if let Some(chunk) = current.as_mut() {
                chunk.push(line);
            }
            continue;
        }
        if !fenced && is_level1_heading(trimmed) {
            if let Some(chunk) = current.take() {
                chunks.push(chunk);
            }
            current = Some(vec![line]);
            continue;
        }
        if let Some(chunk) = current.as_mut() {
            chunk.push(line);
        }
    }
    if let Some(chunk) = current.take() {
        chunks.push(chunk);
    }
    chunks
}

fn parse_chunk(chunk: &[&str], workspace_id: &str) -> Option<Task> {
    let title_line = chunk.first()?.trim();
    if !is_level1_heading(title_line) {
        return None;
    }
    let title = title_line.trim_start_matches('#').trim().to_string();
    if title.is_empty() {
        return None;
    }

    let mut sections: std::collections::HashMap<Section, Vec<String>> =
        std::collections::HashMap::new();
    let mut current_section: Option<Section> = None;
    let mut fenced = false;

    for &line in &chunk[1..] {
        let trimmed = line.trim();
        if toggles_fence(trimmed) {
            fenced = !fenced;
            if let Some(section) = current_section {
                sections.entry(section).or_default().push(line.to_string());
            }
            continue;
        }
        if !fenced && is_level2_heading(trimmed) {
            let name = trimmed.trim_start_matches("## ").trim();
            current_section = section_alias(name);
            continue;
        }
        if let Some(section) = current_section {
            sections.entry(section).or_default().push(line.to_string());
        }
    }

    let objective = sections
        .get(&Section::Objective)
        .map(|lines| lines.join("\n").trim().to_string())
        .unwrap_or_default();
    let scope = list_items(sections.get(&Section::Scope));
    let acceptance_criteria = list_items(sections.get(&Section::DefinitionOfDone));
    let verification_commands = list_items(sections.get(&Section::Verification));

    let mut task = Task::new(Uuid::new_v4().to_string(), workspace_id.to_string());
    task.title = title;
    task.objective = objective;
    task.scope = scope;
    task.acceptance_criteria = acceptance_criteria;
    task.verification_commands = verification_commands;
    Some(task)
}

fn list_items(lines: Option<&Vec<String>>) -> Vec<String> {
    match lines {
        None => Vec::new(),
        Some(lines) => lines
            .iter()
            .filter_map(|l| {
                let trimmed = l.trim();
                if let Some(rest) = trimmed.strip_prefix('-') {
                    let item = rest.trim();
                    if item.is_empty() {
                        None
                    } else {
                        Some(item.to_string())
                    }
                } else {
                    None
                }
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_input_yields_no_tasks() {
        assert!(parse_tasks("", "ws1").is_empty());
        assert!(parse_tasks("   \n\n", "ws1").is_empty());
    }

    #[test]
    fn single_task_with_all_sections() {
        let plan = "@@@task\n# Add greet\n\n## Objective\nAdd a function greet() that returns \"hello\".\n\n## Definition of Done\n- greet() returns \"hello\"\n\n## Verification\n- run tests\n@@@\n";
        let tasks = parse_tasks(plan, "ws1");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "Add greet");
        assert!(tasks[0].objective.contains("returns \"hello\""));
        assert_eq!(tasks[0].acceptance_criteria, vec!["greet() returns \"hello\""]);
        assert_eq!(tasks[0].verification_commands, vec!["run tests"]);
        assert_eq!(tasks[0].workspace_id, "ws1");
    }

    #[test]
    fn nested_fence_hides_bash_comment_title() {
        let plan = "@@@task\n# Add greet\n## Verification\n```bash\n# just a bash comment\nrun tests\n```\n@@@\n";
        let tasks = parse_tasks(plan, "ws1");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "Add greet");
    }

    #[test]
    fn two_titles_in_one_block_yield_two_tasks() {
        let plan = "@@@task\n# Task A\n## Objective\nA\n# Task B\n## Objective\nB\n@@@\n";
        let tasks = parse_tasks(plan, "ws1");
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].title, "Task A");
        assert_eq!(tasks[1].title, "Task B");
    }

    #[test]
    fn malformed_block_missing_terminator_is_dropped() {
        let plan = "@@@task\n# Task A\n## Objective\nnever closes\n";
        assert!(parse_tasks(plan, "ws1").is_empty());
    }

    #[test]
    fn crlf_input_is_accepted() {
        let plan = "@@@task\r\n# Add greet\r\n## Objective\r\nhello\r\n@@@\r\n";
        let tasks = parse_tasks(plan, "ws1");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "Add greet");
    }

    #[test]
    fn chinese_section_aliases_are_recognised() {
        let plan = "@@@task\n# 任务\n## 目标\n做点什么\n## 验证\n- 运行测试\n@@@\n";
        let tasks = parse_tasks(plan, "ws1");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].objective, "做点什么");
        assert_eq!(tasks[0].verification_commands, vec!["运行测试"]);
    }
}
