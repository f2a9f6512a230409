//! Lenient parsing of model replies
//!
//! A reply is first treated as JSON (bare, fenced, or embedded in prose).
//! When that yields nothing usable, a line-based heuristic recovers what it
//! can from headings and bullet lists. Either path returns the same shape.

use super::Tutorial;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::sync::OnceLock;

pub const SUMMARY_UNAVAILABLE: &str = "Summary not available";

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSummary {
    pub summary: String,
    pub key_points: Vec<String>,
    pub technical_concepts: Vec<String>,
    pub tutorials: Vec<Tutorial>,
    pub structured_notes: String,
}

/// Parse a model reply. Never fails: a reply with no recoverable structure
/// yields a placeholder summary and the raw text as notes.
pub fn parse_response(text: &str) -> ParsedSummary {
    if let Some(parsed) = parse_structured(text) {
        return parsed;
    }
    log::debug!("Reply was not structured JSON, using heuristic parse");
    parse_heuristic(text)
}

// ============================================================================
// Structured stage
// ============================================================================

/// Models often send `null` for an empty list or string.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSummary {
    summary: Option<String>,
    #[serde(alias = "key_points")]
    #[serde(rename = "keyPoints")]
    #[serde(deserialize_with = "null_as_default")]
    key_points: Vec<String>,
    #[serde(alias = "technical_concepts")]
    #[serde(rename = "technicalConcepts")]
    #[serde(deserialize_with = "null_as_default")]
    technical_concepts: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    tutorials: Vec<RawTutorial>,
    #[serde(alias = "structured_notes")]
    #[serde(rename = "structuredNotes")]
    structured_notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTutorial {
    #[serde(deserialize_with = "null_as_default")]
    title: String,
    timestamp: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    description: String,
}

fn parse_structured(text: &str) -> Option<ParsedSummary> {
    let value = extract_json_from_response(text)?;
    let raw: RawSummary = serde_json::from_value(value).ok()?;

    let summary = raw
        .summary
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    if summary.is_none() && raw.key_points.is_empty() {
        return None;
    }

    Some(ParsedSummary {
        summary: summary.unwrap_or_else(|| SUMMARY_UNAVAILABLE.to_string()),
        key_points: clean_list(raw.key_points),
        technical_concepts: dedup(clean_list(raw.technical_concepts)),
        tutorials: raw
            .tutorials
            .into_iter()
            .filter(|t| !t.title.trim().is_empty())
            .map(|t| Tutorial {
                title: t.title.trim().to_string(),
                timestamp: t.timestamp.filter(|s| !s.trim().is_empty()),
                description: t.description.trim().to_string(),
            })
            .collect(),
        structured_notes: raw
            .structured_notes
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| text.to_string()),
    })
}

/// Extract JSON from LLM response (handles markdown code blocks)
pub(crate) fn extract_json_from_response(response: &str) -> Option<serde_json::Value> {
    let trimmed = response.trim();

    // Try direct parse first
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) {
        return Some(json);
    }

    // Try to extract from markdown code block
    for marker in ["```json", "```"] {
        if let Some(start) = trimmed.find(marker) {
            let after_marker = &trimmed[start + marker.len()..];
            if let Some(end) = after_marker.find("```") {
                let json_str = after_marker[..end].trim();
                if let Ok(json) = serde_json::from_str::<serde_json::Value>(json_str) {
                    return Some(json);
                }
            }
        }
    }

    // Find the first balanced object, ignoring braces inside strings
    let start = trimmed.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in trimmed[start..].char_indices() {
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
                    let end = start + i + c.len_utf8();
                    return serde_json::from_str::<serde_json::Value>(&trimmed[start..end]).ok();
                }
            }
            _ => {}
        }
    }

    None
}

// ============================================================================
// Heuristic stage
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    Preamble,
    Summary,
    KeyPoints,
    Concepts,
    Tutorials,
    Other,
}

fn bullet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(?:[-*•+]|\d+[.)])\s+").expect("valid bullet regex"))
}

fn timestamp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{1,2}:\d{2}(?::\d{2})?\b").expect("valid timestamp regex"))
}

/// Classify a line as a section heading. Bullets are never headings.
fn heading(line: &str) -> Option<Section> {
    if bullet_re().is_match(line) {
        return None;
    }
    let stripped = line
        .trim()
        .trim_start_matches('#')
        .trim_matches(|c: char| c == '*' || c == '_' || c.is_whitespace())
        .trim_end_matches(':')
        .trim_matches(|c: char| c == '*' || c == '_')
        .to_lowercase();
    if stripped.is_empty() || stripped.len() > 60 {
        return None;
    }
    let is_heading_shaped = line.trim_start().starts_with('#')
        || line.trim_end().ends_with(':')
        || line.trim_start().starts_with("**");
    if !is_heading_shaped {
        return None;
    }

    if stripped.contains("key point") || stripped.contains("takeaway") {
        Some(Section::KeyPoints)
    } else if stripped.contains("technical concept")
        || stripped.contains("tools")
        || stripped.contains("technolog")
    {
        Some(Section::Concepts)
    } else if stripped.contains("tutorial") {
        Some(Section::Tutorials)
    } else if stripped.contains("summary") || stripped.contains("overview") {
        Some(Section::Summary)
    } else {
        Some(Section::Other)
    }
}

fn strip_bullet(line: &str) -> String {
    bullet_re().replace(line, "").trim().to_string()
}

fn parse_heuristic(text: &str) -> ParsedSummary {
    let mut section = Section::Preamble;
    let mut preamble = Vec::new();
    let mut summary_lines = Vec::new();
    let mut key_points = Vec::new();
    let mut concepts = Vec::new();
    let mut tutorials = Vec::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(next) = heading(line) {
            section = next;
            continue;
        }
        let item = strip_bullet(line);
        if item.is_empty() {
            continue;
        }
        match section {
            Section::Preamble => preamble.push(item),
            Section::Summary => summary_lines.push(item),
            Section::KeyPoints => key_points.push(item),
            Section::Concepts => concepts.extend(
                item.split(',')
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty()),
            ),
            Section::Tutorials => tutorials.push(Tutorial {
                timestamp: timestamp_re().find(&item).map(|m| m.as_str().to_string()),
                title: item,
                description: String::new(),
            }),
            Section::Other => {}
        }
    }

    let summary_source = if summary_lines.is_empty() {
        preamble.into_iter().take(3).collect::<Vec<_>>()
    } else {
        summary_lines
    };
    let summary = summary_source.join(" ").trim().to_string();

    ParsedSummary {
        summary: if summary.is_empty() {
            SUMMARY_UNAVAILABLE.to_string()
        } else {
            summary
        },
        key_points,
        technical_concepts: dedup(concepts),
        tutorials,
        structured_notes: text.to_string(),
    }
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn dedup(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|s| seen.insert(s.to_lowercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_from_response() {
        // Direct JSON
        assert!(extract_json_from_response(r#"{"name": "test"}"#).is_some());

        // Markdown code block
        let json = extract_json_from_response(
            r#"Here's the result:
```json
{"items": [1, 2, 3]}
```
"#,
        );
        assert!(json.is_some());

        // JSON embedded in text
        let json =
            extract_json_from_response(r#"The extracted data is: {"value": 42} and that's it."#);
        assert_eq!(json.unwrap()["value"], 42);
    }

    #[test]
    fn test_extract_json_ignores_braces_in_strings() {
        let json = extract_json_from_response(
            r#"Sure: {"summary": "uses {curly} braces", "keyPoints": []} done"#,
        )
        .unwrap();
        assert_eq!(json["summary"], "uses {curly} braces");
    }

    #[test]
    fn test_structured_reply() {
        let parsed = parse_response(
            r###"```json
{"summary": "A tour of TSL.", "keyPoints": ["Nodes compile to WGSL"], "technicalConcepts": ["TSL", "WGSL", "TSL"], "tutorials": [{"title": "First node", "description": "Build one"}], "structuredNotes": "## TSL"}
```"###,
        );
        assert_eq!(parsed.summary, "A tour of TSL.");
        assert_eq!(parsed.key_points, vec!["Nodes compile to WGSL"]);
        assert_eq!(parsed.technical_concepts, vec!["TSL", "WGSL"]);
        assert_eq!(parsed.tutorials.len(), 1);
        assert_eq!(parsed.tutorials[0].timestamp, None);
        assert_eq!(parsed.structured_notes, "## TSL");
    }

    #[test]
    fn test_structured_reply_missing_notes_keeps_raw() {
        let raw = r#"{"summary": "Short."}"#;
        let parsed = parse_response(raw);
        assert_eq!(parsed.summary, "Short.");
        assert_eq!(parsed.structured_notes, raw);
        assert!(parsed.key_points.is_empty());
    }

    #[test]
    fn test_null_lists_parse_as_empty() {
        let parsed = parse_response(
            r#"{"summary": "S", "keyPoints": null, "technicalConcepts": null, "tutorials": [{"title": "Intro", "description": null}], "structuredNotes": null}"#,
        );
        assert_eq!(parsed.summary, "S");
        assert!(parsed.key_points.is_empty());
        assert!(parsed.technical_concepts.is_empty());
        assert_eq!(parsed.tutorials.len(), 1);
        assert_eq!(parsed.tutorials[0].description, "");
    }

    #[test]
    fn test_snake_case_keys_accepted() {
        let parsed = parse_response(r#"{"summary": "S", "key_points": ["a"], "technical_concepts": ["b"]}"#);
        assert_eq!(parsed.key_points, vec!["a"]);
        assert_eq!(parsed.technical_concepts, vec!["b"]);
    }

    #[test]
    fn test_heuristic_sections() {
        let reply = "\
This video walks through a raymarching shader.
It targets WebGL2.

## Key Points
- Signed distance functions compose
- Step count trades quality for speed

**Technical Concepts:**
- SDF, raymarching
- GLSL

Tutorials:
1. Building the first SDF at 03:15
";
        let parsed = parse_response(reply);
        assert_eq!(
            parsed.summary,
            "This video walks through a raymarching shader. It targets WebGL2."
        );
        assert_eq!(
            parsed.key_points,
            vec![
                "Signed distance functions compose",
                "Step count trades quality for speed"
            ]
        );
        assert_eq!(parsed.technical_concepts, vec!["SDF", "raymarching", "GLSL"]);
        assert_eq!(parsed.tutorials[0].timestamp.as_deref(), Some("03:15"));
        assert_eq!(parsed.structured_notes, reply);
    }

    #[test]
    fn test_heuristic_summary_section_wins_over_preamble() {
        let parsed = parse_response("Sure, here you go.\n\nSummary:\nThe real summary.\n");
        assert_eq!(parsed.summary, "The real summary.");
    }

    #[test]
    fn test_bullet_mentioning_tools_is_not_a_heading() {
        let parsed = parse_response("Key points:\n- The tools panel moved\n- Shortcuts changed");
        assert_eq!(parsed.key_points.len(), 2);
        assert!(parsed.technical_concepts.is_empty());
    }

    #[test]
    fn test_empty_reply_still_has_summary() {
        let parsed = parse_response("   ");
        assert_eq!(parsed.summary, SUMMARY_UNAVAILABLE);
        assert!(parsed.key_points.is_empty());
    }

    #[test]
    fn test_json_without_content_falls_back() {
        let parsed = parse_response(r#"{"status": "ok"}"#);
        assert_eq!(parsed.summary, r#"{"status": "ok"}"#);
    }
}
