use pldbg_core::surface::{AnonymousBlockCheck, PlParser};
use pldbg_core::target::{PlKind, PlSchema};

#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordPlParser;

impl KeywordPlParser {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl PlParser for KeywordPlParser {
    fn parse_as_anonymous_block(&self, source: &str) -> AnonymousBlockCheck {
        AnonymousBlockCheck {
            is_anonymous_block: is_anonymous_block(source),
        }
    }
}

fn is_anonymous_block(source: &str) -> bool {
    let code = strip_comments(source);
    let words = keywords(&code);
    let opens = matches!(words.first().map(String::as_str), Some("DECLARE" | "BEGIN"));

    let body = code.trim_end().trim_end_matches('/').trim_end();
    let closes = body.ends_with(';')
        && words
            .iter()
            .rev()
            .take(2)
            .any(|word| word == "END" || word == "END;");

    opens && closes
}

#[must_use]
pub fn infer_schema(source: &str) -> PlSchema {
    let code = strip_comments(source);
    let words = keywords(&code);
    let mut words = words.iter().map(String::as_str).peekable();

    if words.next() != Some("CREATE") {
        return PlSchema::anonymous(source);
    }
    if words.peek() == Some(&"OR") {
        words.next();
        words.next();
    }
    if matches!(words.peek(), Some(&("EDITIONABLE" | "NONEDITIONABLE"))) {
        words.next();
    }

    let kind = match words.next() {
        Some("PROCEDURE") => PlKind::Procedure,
        Some("FUNCTION") => PlKind::Function,
        Some("TRIGGER") => PlKind::Trigger,
        Some("TYPE") => {
            if words.peek() == Some(&"BODY") {
                words.next();
            }
            PlKind::Type
        }
        Some("PACKAGE") => {
            if words.peek() == Some(&"BODY") {
                words.next();
                PlKind::PackageBody
            } else {
                PlKind::PackageHead
            }
        }
        _ => return PlSchema::anonymous(source),
    };

    let Some(name) = raw_object_name(&code, kind) else {
        return PlSchema::anonymous(source);
    };
    let name = name
        .rsplit('.')
        .next()
        .unwrap_or(name)
        .trim_matches('"')
        .to_string();
    PlSchema::named(kind, name, source)
}

fn raw_object_name(code: &str, kind: PlKind) -> Option<&str> {
    let marker = match kind {
        PlKind::Procedure => "PROCEDURE",
        PlKind::Function => "FUNCTION",
        PlKind::Trigger => "TRIGGER",
        PlKind::Type => "TYPE",
        PlKind::PackageHead | PlKind::PackageBody => "PACKAGE",
        PlKind::AnonymousBlock => return None,
    };

    let mut tokens = code
        .split(|ch: char| ch.is_whitespace() || ch == '(' || ch == ';')
        .filter(|token| !token.is_empty());
    tokens.find(|token| token.eq_ignore_ascii_case(marker))?;
    tokens.find(|token| !token.eq_ignore_ascii_case("BODY"))
}

#[must_use]
pub fn executable_lines(source: &str) -> Vec<u32> {
    strip_comments(source)
        .lines()
        .enumerate()
        .filter(|(_, line)| is_statement_line(line))
        .filter_map(|(index, _)| u32::try_from(index + 1).ok())
        .collect()
}

fn is_statement_line(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed == "/" {
        return false;
    }
    let first = trimmed
        .split(|ch: char| ch.is_whitespace() || ch == ';')
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    !matches!(
        first.as_str(),
        "DECLARE" | "BEGIN" | "EXCEPTION" | "END" | "CREATE" | "IS" | "AS"
    )
}

fn keywords(code: &str) -> Vec<String> {
    code.split_whitespace()
        .map(str::to_ascii_uppercase)
        .collect()
}

/// Drops `--` and `/* */` comments outside string literals. Newlines are
/// kept so line numbers still match the source.
#[must_use]
pub fn strip_comments(source: &str) -> String {
    let mut code = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();

    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut in_line_comment = false;
    let mut in_block_comment = false;

    while let Some(ch) = chars.next() {
        if in_line_comment {
            if ch == '\n' {
                in_line_comment = false;
                code.push(ch);
            }
            continue;
        }

        if in_block_comment {
            if ch == '*' && chars.peek() == Some(&'/') {
                chars.next();
                in_block_comment = false;
            } else if ch == '\n' {
                code.push(ch);
            }
            continue;
        }

        if !in_single_quote && !in_double_quote {
            if ch == '-' && chars.peek() == Some(&'-') {
                chars.next();
                in_line_comment = true;
                continue;
            }

            if ch == '/' && chars.peek() == Some(&'*') {
                chars.next();
                in_block_comment = true;
                continue;
            }
        }

        match ch {
            '\'' if !in_double_quote => in_single_quote = !in_single_quote,
            '"' if !in_single_quote => in_double_quote = !in_double_quote,
            _ => {}
        }
        code.push(ch);
    }

    code
}
