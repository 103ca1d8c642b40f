use serde::{Deserialize, Serialize};

/// Excerpt of a workspace file included in a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileExcerpt {
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub truncated: bool,
}

/// The slice of project context sent to the worker with a ticket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSlice {
    #[serde(default)]
    pub files: Vec<FileExcerpt>,
    #[serde(default)]
    pub log_excerpt: Option<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    /// Instructions produced by the feedback loop after a failed attempt
    #[serde(default)]
    pub corrective_instructions: Vec<String>,
}

impl ContextSlice {
    pub fn is_retry(&self) -> bool {
        !self.corrective_instructions.is_empty()
    }

    /// Append constraints, skipping ones already present.
    pub fn add_constraints<I, S>(&mut self, constraints: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for constraint in constraints {
            let constraint = constraint.into();
            if !self.constraints.contains(&constraint) {
                self.constraints.push(constraint);
            }
        }
    }

    pub fn merge_instructions(&mut self, instructions: &[String]) {
        self.corrective_instructions.extend(instructions.iter().cloned());
    }

    /// Render the slice as the prompt body sent alongside the ticket.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.constraints.is_empty() {
            out.push_str("## Constraints\n");
            for constraint in &self.constraints {
                out.push_str("- ");
                out.push_str(constraint);
                out.push('\n');
            }
        }
        if !self.corrective_instructions.is_empty() {
            out.push_str("\n## Corrective instructions\n");
            for instruction in &self.corrective_instructions {
                out.push_str(instruction);
                out.push('\n');
            }
        }
        for file in &self.files {
            out.push_str(&format!("\n## File: {}\n```\n{}\n```\n", file.path, file.content));
            if file.truncated {
                out.push_str("(truncated)\n");
            }
        }
        if let Some(log) = &self.log_excerpt {
            out.push_str(&format!("\n## Recent log\n```\n{log}\n```\n"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_constraints_dedups() {
        let mut slice = ContextSlice::default();
        slice.add_constraints(["write a failing test first", "write a failing test first"]);
        assert_eq!(slice.constraints.len(), 1);
    }

    #[test]
    fn test_render_includes_instructions_and_files() {
        let mut slice = ContextSlice {
            files: vec![FileExcerpt {
                path: "src/lib.rs".into(),
                content: "pub fn add() {}".into(),
                truncated: false,
            }],
            ..Default::default()
        };
        slice.merge_instructions(&["Fix the failing assertion".to_string()]);
        let rendered = slice.render();
        assert!(slice.is_retry());
        assert!(rendered.contains("## Corrective instructions\nFix the failing assertion"));
        assert!(rendered.contains("## File: src/lib.rs"));
    }
}
