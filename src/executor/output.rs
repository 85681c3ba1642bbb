//! Output sanitization for subprocess error messages.

const MAX_LINE_CHARS: usize = 200;
const MAX_TOTAL_CHARS: usize = 1000;

/// Trim captured output to something that fits in an error message.
///
/// Keeps at most `max_lines` lines, cuts long lines on a character boundary
/// and stops once the total budget is used up. Truncation is marked.
pub fn sanitize_output(output: &str, max_lines: usize) -> String {
    let mut result = String::new();
    let mut total = 0;

    for line in output.lines().take(max_lines) {
        let line = match line.char_indices().nth(MAX_LINE_CHARS) {
            Some((cut, _)) => format!("{}...", &line[..cut]),
            None => line.to_string(),
        };

        let len = line.chars().count();
        if total + len > MAX_TOTAL_CHARS {
            result.push_str("...[truncated]");
            return result;
        }

        if !result.is_empty() {
            result.push('\n');
        }
        result.push_str(&line);
        total += len;
    }

    if output.lines().nth(max_lines).is_some() {
        result.push_str("\n...[additional output truncated]");
    }

    result
}
