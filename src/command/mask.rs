//! Masking of secrets in logged command lines
//!
//! Any key containing `secret` or `password` (case-insensitive) has its value
//! replaced with `******`, in both `key=value` and `key value` form. A quoted
//! value keeps its quotes and may contain whitespace:
//!
//! ```text
//! --conf HivePassword='abc 123' x    ->    --conf HivePassword='******' x
//! ```
//!
//! Only the displayed form is masked; executed tokens are never touched.

/// Replacement for masked values
pub const MASK: &str = "******";

const KEYWORDS: [&str; 2] = ["secret", "password"];

/// Mask a command line in its joined string form.
pub fn mask_command_line(line: &str) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut out = String::with_capacity(line.len());
    let mut pos = 0;

    while pos < chars.len() {
        match (pos..chars.len()).find_map(|start| match_at(&chars, start)) {
            Some(m) => {
                out.extend(&chars[pos..m.value_start]);
                out.push_str(MASK);
                if let Some(quote) = m.quote {
                    out.push(quote);
                }
                pos = m.end;
            }
            None => {
                out.extend(&chars[pos..]);
                break;
            }
        }
    }

    out
}

/// Mask a token list, returning the display tokens.
///
/// A token that ends in a bare secret key (`--password`) masks the token
/// after it.
pub fn mask_tokens<S: AsRef<str>>(tokens: &[S]) -> Vec<String> {
    let mut masked = Vec::with_capacity(tokens.len());
    let mut mask_next = false;

    for token in tokens {
        let token = token.as_ref();
        if mask_next {
            masked.push(mask_whole_value(token));
            mask_next = false;
            continue;
        }
        masked.push(mask_command_line(token));
        mask_next = ends_with_bare_key(token);
    }

    masked
}

/// Mask a token list and join it for logging.
pub fn masked_display<S: AsRef<str>>(tokens: &[S]) -> String {
    mask_tokens(tokens).join(" ")
}

struct Match {
    /// Index of the first masked character
    value_start: usize,
    /// Closing quote to re-emit after the mask
    quote: Option<char>,
    /// Index just past the match
    end: usize,
}

/// Try to match a masked key/value pair starting exactly at `start`.
fn match_at(chars: &[char], start: usize) -> Option<Match> {
    if chars[start].is_whitespace() {
        return None;
    }

    let segment_end = run_end(chars, start, |c| !c.is_whitespace());
    let keyword_end = find_keyword(&chars[start..segment_end])? + start;

    let separator_end = match chars[keyword_end..segment_end].iter().position(|&c| c == '=') {
        Some(offset) => keyword_end + offset + 1,
        None if segment_end < chars.len() => run_end(chars, segment_end, char::is_whitespace),
        None => return None,
    };

    if let Some(&quote) = chars.get(separator_end).filter(|c| **c == '\'' || **c == '"') {
        if let Some(close) = closing_quote(chars, separator_end + 1, quote) {
            return Some(Match {
                value_start: separator_end + 1,
                quote: Some(quote),
                end: close + 1,
            });
        }
    }

    Some(Match {
        value_start: separator_end,
        quote: None,
        end: run_end(chars, separator_end, |c| !c.is_whitespace()),
    })
}

fn run_end(chars: &[char], from: usize, pred: impl Fn(char) -> bool) -> usize {
    chars[from..]
        .iter()
        .position(|&c| !pred(c))
        .map_or(chars.len(), |offset| from + offset)
}

/// End offset of the first keyword in `segment`
fn find_keyword(segment: &[char]) -> Option<usize> {
    (0..segment.len()).find_map(|i| {
        KEYWORDS.iter().find_map(|keyword| {
            let len = keyword.chars().count();
            let candidate = segment.get(i..i + len)?;
            let hit = candidate
                .iter()
                .zip(keyword.chars())
                .all(|(a, b)| a.to_ascii_lowercase() == b);
            hit.then_some(i + len)
        })
    })
}

/// Closing quote for a value opened at `from - 1`.
///
/// The value runs to the first quote followed by whitespace; without one it
/// runs to the last quote before the end of the line.
fn closing_quote(chars: &[char], from: usize, quote: char) -> Option<usize> {
    let mut i = from;
    while i < chars.len() && chars[i] != '\n' {
        if chars[i] == quote && chars.get(i + 1).is_some_and(|c| c.is_whitespace()) {
            return Some(i);
        }
        i += 1;
    }
    (from..i).rev().find(|&j| chars[j] == quote)
}

fn ends_with_bare_key(token: &str) -> bool {
    let chars: Vec<char> = token.chars().collect();
    let last_start = chars
        .iter()
        .rposition(|c| c.is_whitespace())
        .map_or(0, |i| i + 1);
    let segment = &chars[last_start..];
    match find_keyword(segment) {
        Some(keyword_end) => !segment[keyword_end..].contains(&'='),
        None => false,
    }
}

fn mask_whole_value(token: &str) -> String {
    let mut chars = token.chars();
    match (chars.next(), chars.next_back()) {
        (Some(open), Some(close)) if open == close && (open == '\'' || open == '"') => {
            format!("{open}{MASK}{close}")
        }
        _ => MASK.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_key_value_forms() {
        let cases = [
            ("", ""),
            ("key", "key"),
            ("key=value", "key=value"),
            ("password=abc", "password=******"),
            ("PASSWORD=abc", "PASSWORD=******"),
            ("HivePassword=abc123", "HivePassword=******"),
            ("spark.ssl.keyStorePassword=x", "spark.ssl.keyStorePassword=******"),
            ("my_secret_key=abc", "my_secret_key=******"),
            ("password abc", "password ******"),
            ("password   abc rest", "password   ****** rest"),
            ("password=", "password=******"),
        ];
        for (input, expected) in cases {
            assert_eq!(mask_command_line(input), expected, "input: {input:?}");
        }
    }

    #[test]
    fn test_mask_quoted_values() {
        let cases = [
            ("HivePassword='abc'", "HivePassword='******'"),
            ("HivePassword=\"abc\"", "HivePassword=\"******\""),
            ("password='a b c' next", "password='******' next"),
            ("password=\"a 'b' c\" next", "password=\"******\" next"),
            ("password='abc", "password=******"),
            ("password='a' b='c'", "password='******' b='c'"),
        ];
        for (input, expected) in cases {
            assert_eq!(mask_command_line(input), expected, "input: {input:?}");
        }
    }

    #[test]
    fn test_mask_in_full_command_line() {
        let line = "spark-submit --master yarn --conf spark.foo=bar \
                    --conf HivePassword=abc123 --conf mySecret=xyz --name job app.py";
        assert_eq!(
            mask_command_line(line),
            "spark-submit --master yarn --conf spark.foo=bar \
             --conf HivePassword=****** --conf mySecret=****** --name job app.py"
        );
    }

    #[test]
    fn test_mask_is_idempotent() {
        let line = "--conf HivePassword='abc 123' --password hunter2 --secret=\"x\"";
        let once = mask_command_line(line);
        assert_eq!(mask_command_line(&once), once);
    }

    #[test]
    fn test_mask_tokens() {
        let tokens = ["--conf", "HivePassword=abc123"];
        assert_eq!(mask_tokens(&tokens), vec!["--conf", "HivePassword=******"]);
    }

    #[test]
    fn test_mask_tokens_separate_value() {
        let tokens = ["app.py", "--password", "hunter2", "--db-password", "'quoted'", "plain"];
        assert_eq!(
            mask_tokens(&tokens),
            vec!["app.py", "--password", "******", "--db-password", "'******'", "plain"]
        );
    }

    #[test]
    fn test_mask_tokens_does_not_touch_input() {
        let tokens = vec!["--conf".to_string(), "secret=s3cr3t".to_string()];
        let masked = mask_tokens(&tokens);
        assert_eq!(tokens[1], "secret=s3cr3t");
        assert_eq!(masked[1], "secret=******");
        assert_eq!(masked_display(&tokens), "--conf secret=******");
    }
}
