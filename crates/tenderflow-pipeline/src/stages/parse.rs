use tenderflow_core::error::{Result, TenderError};

/// Clauses that modify the graph. Generated queries must not contain them.
const WRITE_CLAUSES: &[&str] = &["CREATE", "MERGE", "DELETE", "DETACH", "SET", "REMOVE", "DROP", "FOREACH"];

/// The first balanced `{...}` object in `text`, ignoring braces inside strings.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Remove a surrounding Markdown code fence (```lang ... ```), if present.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the info string (e.g. "cypher") on the opening line
    let body = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Uppercased keywords of a Cypher query, skipping string literals,
/// comments and property names (`d.set`).
fn keywords(query: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut is_property = false;
    let mut after_dot = false;
    let mut quote: Option<char> = None;
    let mut chars = query.chars().peekable();

    let mut flush = |current: &mut String, is_property: bool| {
        if !current.is_empty() {
            let word = std::mem::take(current);
            if !is_property {
                words.push(word);
            }
        }
    };

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            if c == '\\' {
                chars.next();
            } else if c == q {
                quote = None;
            }
            continue;
        }
        if c.is_alphanumeric() || c == '_' {
            if current.is_empty() {
                is_property = after_dot;
            }
            after_dot = false;
            current.push(c.to_ascii_uppercase());
            continue;
        }
        flush(&mut current, is_property);

        if c == '/' && chars.peek() == Some(&'/') {
            for n in chars.by_ref() {
                if n == '\n' {
                    break;
                }
            }
            after_dot = false;
            continue;
        }
        if c == '/' && chars.peek() == Some(&'*') {
            chars.next();
            let mut prev = '\0';
            for n in chars.by_ref() {
                if prev == '*' && n == '/' {
                    break;
                }
                prev = n;
            }
            after_dot = false;
            continue;
        }
        if c == '\'' || c == '"' || c == '`' {
            quote = Some(c);
        }
        if !c.is_whitespace() {
            after_dot = c == '.';
        }
    }
    flush(&mut current, is_property);
    words
}

/// Check that a generated query is a non-empty, read-only Cypher query.
pub fn validate_cypher(query: &str) -> Result<()> {
    if query.trim().is_empty() {
        return Err(TenderError::Validation("generated query is empty".into()));
    }

    let words = keywords(query);
    let has = |kw: &str| words.iter().any(|w| w == kw);

    if let Some(clause) = WRITE_CLAUSES.iter().find(|kw| has(kw)) {
        return Err(TenderError::Validation(format!(
            "generated query contains write clause {}",
            clause
        )));
    }
    if !(has("MATCH") || has("CALL")) {
        return Err(TenderError::Validation(
            "generated query has no MATCH or CALL clause".into(),
        ));
    }
    if !has("RETURN") {
        return Err(TenderError::Validation(
            "generated query has no RETURN clause".into(),
        ));
    }
    Ok(())
}
