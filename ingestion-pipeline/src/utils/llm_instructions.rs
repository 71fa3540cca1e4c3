//! Prompts for merging and naming appended content, and parsers for the replies.

pub const MAX_KEYWORDS: usize = 5;
pub const FALLBACK_TITLE: &str = "Untitled note";
const MAX_TITLE_CHARS: usize = 120;

pub fn create_merge_prompt(original_content: &str, additional_content: &str) -> String {
    format!(
        r"
        Merge the two texts below into a single document.
        - Remove information that appears in both; keep one copy of it.
        - Preserve the structural formatting (headings, lists, code blocks, tables).
        - Keep a logical reading order, placing new material where it belongs.
        Respond with the merged document only, without commentary.

        Existing content:
        ==================
        {original_content}

        Additional content:
        ==================
        {additional_content}
        "
    )
}

pub fn create_title_prompt(content: &str) -> String {
    format!(
        r"
        Write a concise title of at most eight words for the content below.
        Respond with the title only.

        Content:
        ==================
        {content}
        "
    )
}

pub fn create_keywords_prompt(content: &str) -> String {
    format!(
        r"
        List up to {MAX_KEYWORDS} keywords that describe the content below.
        Respond with a comma separated list and nothing else.

        Content:
        ==================
        {content}
        "
    )
}

/// First non-empty line of the reply, stripped of labels, quotes and markdown heading marks.
pub fn clean_title(raw: &str) -> String {
    let line = raw
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();
    let line = line.trim_start_matches('#').trim();
    let line = strip_label(line, "title:");
    let title = line
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '*' || c == '`')
        .trim();

    if title.is_empty() {
        return FALLBACK_TITLE.to_string();
    }
    title.chars().take(MAX_TITLE_CHARS).collect()
}

/// Comma or newline separated keywords, de-duplicated case-insensitively, capped at [`MAX_KEYWORDS`].
pub fn parse_keywords(raw: &str) -> Vec<String> {
    let raw = strip_label(raw.trim(), "keywords:");
    let mut keywords: Vec<String> = Vec::new();

    for candidate in raw.split([',', '\n']) {
        let keyword = candidate
            .trim()
            .trim_start_matches(['-', '*', '•'])
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '.')
            .trim();
        if keyword.is_empty() {
            continue;
        }
        if keywords
            .iter()
            .any(|existing| existing.eq_ignore_ascii_case(keyword))
        {
            continue;
        }
        keywords.push(keyword.to_string());
        if keywords.len() == MAX_KEYWORDS {
            break;
        }
    }

    keywords
}

fn strip_label<'a>(text: &'a str, label: &str) -> &'a str {
    match (text.get(..label.len()), text.get(label.len()..)) {
        (Some(prefix), Some(rest)) if prefix.eq_ignore_ascii_case(label) => rest.trim_start(),
        _ => text,
    }
}
