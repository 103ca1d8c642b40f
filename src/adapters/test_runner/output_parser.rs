//! Parsing of test-runner output into [`TestEvidence`].
//!
//! Recognizes `cargo test` and `pytest` summaries. Unknown runners fall back to
//! the process exit code alone.

use crate::domain::models::TestEvidence;

/// Counts and failing test names extracted from runner output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedOutput {
    pub passed: u32,
    pub failed: u32,
    pub failing_tests: Vec<String>,
}

impl ParsedOutput {
    pub fn into_evidence(self, output_excerpt: String, exit_code: Option<i32>) -> TestEvidence {
        TestEvidence {
            failing_tests: self.failing_tests,
            output_excerpt,
            exit_code,
            passed_count: self.passed,
            failed_count: self.failed,
        }
    }
}

/// Parse combined stdout and stderr.
///
/// Recognized patterns:
/// - `test some::path ... ok` / `... FAILED`
/// - `test result: FAILED. 1 passed; 1 failed; ...` (summed across binaries)
/// - pytest `FAILED tests/test_x.py::test_name - reason`
/// - pytest `=== 1 failed, 3 passed in 0.12s ===`
pub fn parse_output(stdout: &str, stderr: &str) -> ParsedOutput {
    let combined = format!("{stdout}\n{stderr}");
    let mut parsed = ParsedOutput::default();

    let mut line_passed = 0;
    let mut line_failed = 0;
    let mut summary: Option<(u32, u32)> = None;

    for line in combined.lines() {
        let trimmed = line.trim();

        if let Some(rest) = trimmed.strip_prefix("test ") {
            if rest.ends_with("... ok") {
                line_passed += 1;
            } else if let Some(name) = rest.strip_suffix(" ... FAILED") {
                line_failed += 1;
                push_unique(&mut parsed.failing_tests, name.trim());
            }
        }

        if trimmed.starts_with("test result:") {
            let (passed, failed) = summary.unwrap_or((0, 0));
            summary = Some((
                passed + extract_count(trimmed, "passed").unwrap_or(0),
                failed + extract_count(trimmed, "failed").unwrap_or(0),
            ));
        } else if let Some(rest) = trimmed.strip_prefix("FAILED ") {
            let name = rest.split(" - ").next().unwrap_or(rest).trim();
            push_unique(&mut parsed.failing_tests, name);
        } else if is_pytest_summary(trimmed) {
            let body = trimmed.trim_matches('=').trim();
            let body = body.split(" in ").next().unwrap_or(body);
            let (passed, failed) = summary.unwrap_or((0, 0));
            summary = Some((
                passed + extract_count_comma(body, "passed").unwrap_or(0),
                failed + extract_count_comma(body, "failed").unwrap_or(0),
            ));
        }
    }

    let (passed, failed) = summary.unwrap_or((line_passed, line_failed));
    parsed.passed = passed;
    parsed.failed = failed.max(u32::try_from(parsed.failing_tests.len()).unwrap_or(u32::MAX));
    parsed
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if !name.is_empty() && !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
}

fn is_pytest_summary(line: &str) -> bool {
    line.starts_with('=')
        && line.ends_with('=')
        && (line.contains(" passed") || line.contains(" failed"))
}

/// Extract a numeric count preceding a keyword from a `;`-separated summary.
///
/// From `"10 passed; 0 failed"` extract 10 for keyword `"passed"`.
fn extract_count(line: &str, keyword: &str) -> Option<u32> {
    count_in_parts(line.split(';'), keyword)
}

fn extract_count_comma(line: &str, keyword: &str) -> Option<u32> {
    count_in_parts(line.split(','), keyword)
}

fn count_in_parts<'a>(parts: impl Iterator<Item = &'a str>, keyword: &str) -> Option<u32> {
    parts
        .map(str::trim)
        .filter(|part| part.contains(keyword))
        .find_map(|part| part.split_whitespace().find_map(|word| word.parse::<u32>().ok()))
}

/// Keep the last `max_chars` characters, where failures are usually reported.
pub fn tail_excerpt(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    text.chars().skip(count - max_chars).collect()
}
