//! Line-oriented content rewrites applied to pull request files.

use regex::Regex;

#[derive(Debug, Clone)]
pub enum LineRule {
    /// Regex replacement applied to every line independently.
    Replace { search: Regex, replacement: String },
    /// Drops lines matching `pattern`. With `context_start`, only lines inside
    /// a region that opens at a `context_start` match and closes at the next
    /// `context_end` match (or end of file) are considered.
    RemoveLines {
        pattern: Regex,
        context_start: Option<Regex>,
        context_end: Option<Regex>,
    },
}

/// Splits `content` into lines, keeping each line's terminator.
fn split_lines(content: &str) -> impl Iterator<Item = (&str, &str)> {
    content.split_inclusive('\n').map(|line| {
        let text = line
            .strip_suffix("\r\n")
            .or_else(|| line.strip_suffix('\n'))
            .unwrap_or(line);
        (text, &line[text.len()..])
    })
}

impl LineRule {
    /// Returns the rewritten content, or `None` when the rule changed nothing.
    pub fn apply(&self, content: &str) -> Option<String> {
        let rewritten = match self {
            LineRule::Replace {
                search,
                replacement,
            } => split_lines(content)
                .map(|(text, ending)| {
                    format!("{}{}", search.replace_all(text, replacement.as_str()), ending)
                })
                .collect::<String>(),
            LineRule::RemoveLines {
                pattern,
                context_start,
                context_end,
            } => {
                let mut in_region = context_start.is_none();
                let mut kept = String::with_capacity(content.len());
                for (text, ending) in split_lines(content) {
                    if let Some(start) = context_start {
                        if !in_region && start.is_match(text) {
                            in_region = true;
                        } else if in_region && context_end.as_ref().is_some_and(|end| end.is_match(text)) {
                            in_region = false;
                        }
                    }
                    if in_region && pattern.is_match(text) {
                        continue;
                    }
                    kept.push_str(text);
                    kept.push_str(ending);
                }
                kept
            }
        };

        (rewritten != content).then_some(rewritten)
    }
}

/// A rule together with the file paths it applies to.
#[derive(Debug, Clone)]
pub struct FileRule {
    pub file_pattern: Regex,
    pub rule: LineRule,
}

impl FileRule {
    pub fn matches(&self, path: &str) -> bool {
        self.file_pattern.is_match(path)
    }
}
