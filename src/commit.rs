//! Splitting commit messages into the pieces used for pull request metadata.

use std::sync::LazyLock;

use regex::Regex;

static TRAILER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(signed-off-by|co-authored-by|reviewed-by|tested-by|acked-by|cc|reported-by|suggested-by|fixes|see-also|link|bug|change-id):",
    )
    .expect("trailer pattern is valid")
});

/// Subject and body of a commit message, with trailers removed from the body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommitMessage {
    pub subject: String,
    pub body: String,
}

impl CommitMessage {
    pub fn parse(message: &str) -> Self {
        let mut lines = message.lines();
        let subject = lines.next().unwrap_or_default().trim().to_string();

        let rest: Vec<&str> = lines
            .skip_while(|line| line.trim().is_empty())
            .collect();
        let body_len = rest.len() - trailer_block_len(&rest);

        let body = rest[..body_len].join("\n").trim().to_string();
        Self { subject, body }
    }
}

fn is_trailer(line: &str) -> bool {
    TRAILER.is_match(line.trim_start())
}

/// Number of trailing lines (trailers and blank lines) that make up the
/// trailer block.
fn trailer_block_len(lines: &[&str]) -> usize {
    let mut block = 0;
    for line in lines.iter().rev() {
        if line.trim().is_empty() || is_trailer(line) {
            block += 1;
        } else {
            break;
        }
    }
    block
}
