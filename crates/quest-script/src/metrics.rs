use std::sync::LazyLock;

use regex::Regex;

static BLOCK_ID_ARG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(,\s*)?'block_id_[^']*'\)").unwrap());
static LINE_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"//[^\n]*").unwrap());
static BLOCK_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());
static TRAILING_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+\n").unwrap());
static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{2,}").unwrap());

/// Counts the lines a learner would consider "their code": block-id
/// arguments, comments and blank lines are ignored.
pub fn count_lines_of_code(src: &str) -> usize {
    let code = BLOCK_ID_ARG.replace_all(src, ")");
    let code = BLOCK_COMMENT.replace_all(&code, "");
    let code = LINE_COMMENT.replace_all(&code, "");
    let code = TRAILING_SPACE.replace_all(&code, "\n");
    let code = BLANK_LINES.replace_all(&code, "\n");
    let code = code.trim();
    if code.is_empty() { 0 } else { code.lines().count() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_code_counts_statements() {
        let src = "moveForward('block_id_a');\n\nwhile (notDone()) {\n  turnLeft('block_id_b');\n}\n";
        assert_eq!(count_lines_of_code(src), 4);
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let src = "// setup\n/* a\n b */\nvar a = 1;   \n\n\n  a++; // bump\n";
        assert_eq!(count_lines_of_code(src), 2);
    }

    #[test]
    fn empty_source() {
        assert_eq!(count_lines_of_code("  \n// nothing\n"), 0);
    }
}
