use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;

use castcheck_core::{Verdict, VerdictResult};

use crate::ReviewError;

#[derive(Deserialize)]
struct LlmVerdict {
    rule_id: Value,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    notes: Option<Value>,
    #[serde(default)]
    reason: Option<Value>,
}

/// Notes as text; `notes` wins over `reason`, and non-string values are kept
/// in their JSON form.
fn note_text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// Counts of everything the parser had to forgive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseStats {
    /// Elements found in the model output.
    pub received: usize,
    pub accepted: usize,
    pub unknown_rule: usize,
    pub malformed: usize,
    pub duplicate: usize,
    /// Accepted verdicts whose result was outside the vocabulary.
    pub coerced: usize,
    /// True when the verdicts were pulled out of an array that did not decode whole.
    pub salvaged: bool,
}

impl ParseStats {
    pub fn dropped(&self) -> usize {
        self.unknown_rule + self.malformed + self.duplicate
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseReport {
    pub verdicts: Vec<Verdict>,
    pub stats: ParseStats,
}

/// Parse raw LLM output into verdicts for known rules.
///
/// Noise around the JSON (prose, code fences) is tolerated, as are bad
/// individual elements. Output with nothing recoverable is an error, never an
/// empty success.
pub fn parse(raw: &str, known_rule_ids: &HashSet<&str>) -> Result<ParseReport, ReviewError> {
    let (elements, salvaged) = extract_elements(raw).map_err(|reason| {
        ReviewError::UnparsableResponse {
            reason,
            raw_text: raw.to_string(),
        }
    })?;

    let mut stats = ParseStats {
        received: elements.len(),
        salvaged,
        ..ParseStats::default()
    };
    let mut seen: HashSet<String> = HashSet::new();
    let mut verdicts = Vec::with_capacity(elements.len());

    for element in elements {
        let lv: LlmVerdict = match serde_json::from_value(element) {
            Ok(v) => v,
            Err(_) => {
                stats.malformed += 1;
                continue;
            }
        };
        let Some(rule_id) = resolve_rule_id(&lv.rule_id, known_rule_ids) else {
            if id_text(&lv.rule_id).is_some() {
                stats.unknown_rule += 1;
            } else {
                stats.malformed += 1;
            }
            continue;
        };
        if !seen.insert(rule_id.clone()) {
            stats.duplicate += 1;
            continue;
        }
        let result = match lv.result.as_ref().and_then(Value::as_str) {
            Some(s) => VerdictResult::from_model(s),
            None => None,
        };
        let result = result.unwrap_or_else(|| {
            stats.coerced += 1;
            VerdictResult::NeedsReview
        });
        let notes = note_text(lv.notes)
            .or_else(|| note_text(lv.reason))
            .unwrap_or_default();
        verdicts.push(Verdict::new(rule_id, result, notes));
    }
    stats.accepted = verdicts.len();

    if stats.dropped() > 0 || stats.coerced > 0 || stats.salvaged {
        tracing::warn!(
            received = stats.received,
            accepted = stats.accepted,
            unknown_rule = stats.unknown_rule,
            malformed = stats.malformed,
            duplicate = stats.duplicate,
            coerced = stats.coerced,
            salvaged = stats.salvaged,
            "model output needed repair"
        );
    }
    if stats.received == 0 {
        tracing::warn!("model returned an empty verdict array");
    }

    Ok(ParseReport { verdicts, stats })
}

fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Match a rule identifier from LLM output to a known id.
/// Tries the exact id, then case-insensitive, then a bare number as `R{n}`.
fn resolve_rule_id(value: &Value, known: &HashSet<&str>) -> Option<String> {
    let id = id_text(value)?;
    if known.contains(id.as_str()) {
        return Some(id);
    }
    if let Some(k) = known.iter().find(|k| k.eq_ignore_ascii_case(&id)) {
        return Some(k.to_string());
    }
    if id.chars().all(|c| c.is_ascii_digit()) {
        let prefixed = format!("R{id}");
        if known.contains(prefixed.as_str()) {
            return Some(prefixed);
        }
    }
    None
}

/// Find the verdict elements in raw output. The flag reports salvage.
fn extract_elements(raw: &str) -> Result<(Vec<Value>, bool), String> {
    let candidates = json_candidates(raw);
    if candidates.is_empty() {
        return Err("no JSON array or object found in model output".to_string());
    }

    let mut loose: Vec<Value> = Vec::new();
    for candidate in &candidates {
        match serde_json::from_str::<Value>(candidate) {
            // A decoded array of verdicts beats loose objects seen before it.
            Ok(Value::Array(items)) if items.iter().any(Value::is_object) => {
                return Ok((items, false));
            }
            Ok(Value::Array(items)) if items.is_empty() => {
                if loose.is_empty() {
                    return Ok((items, false));
                }
            }
            Ok(Value::Object(map)) => {
                if let Some(items) = wrapped_array(&map) {
                    if loose.is_empty() || items.iter().any(Value::is_object) {
                        return Ok((items, false));
                    }
                } else if map.contains_key("rule_id") {
                    loose.push(Value::Object(map));
                }
            }
            _ => {}
        }
    }
    // Bare verdict objects, e.g. from an array the model never closed.
    if !loose.is_empty() {
        return Ok((loose, true));
    }

    // An array that is bracket-balanced but not valid JSON (trailing commas,
    // one broken element): keep the objects that do decode.
    for candidate in candidates.iter().filter(|c| c.starts_with('[')) {
        let inner = &candidate[1..candidate.len() - 1];
        let salvaged: Vec<Value> = json_candidates(inner)
            .into_iter()
            .filter(|c| c.starts_with('{'))
            .filter_map(|c| serde_json::from_str::<Value>(c).ok())
            .collect();
        if !salvaged.is_empty() {
            return Ok((salvaged, true));
        }
    }

    Err("model output contains no decodable verdict array".to_string())
}

fn wrapped_array(map: &serde_json::Map<String, Value>) -> Option<Vec<Value>> {
    ["verdicts", "results", "evaluations"]
        .iter()
        .find_map(|key| match map.get(*key) {
            Some(Value::Array(items)) => Some(items.clone()),
            _ => None,
        })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Code,
    InString,
    Escape,
}

/// Top-level bracket-balanced `[...]` / `{...}` spans, in order.
/// Brackets inside JSON strings are ignored; a span whose brackets do not
/// pair up is abandoned and scanning resumes one byte later.
fn json_candidates(raw: &str) -> Vec<&str> {
    let bytes = raw.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if matches!(bytes[i], b'[' | b'{') {
            if let Some(end) = match_span(bytes, i) {
                out.push(&raw[i..=end]);
                i = end + 1;
                continue;
            }
        }
        i += 1;
    }
    out
}

/// Index of the bracket closing the one at `start`, if the span is balanced.
fn match_span(bytes: &[u8], start: usize) -> Option<usize> {
    let mut stack: Vec<u8> = Vec::new();
    let mut state = ScanState::Code;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        match state {
            ScanState::Escape => state = ScanState::InString,
            ScanState::InString => match b {
                b'\\' => state = ScanState::Escape,
                b'"' => state = ScanState::Code,
                _ => {}
            },
            ScanState::Code => match b {
                b'"' => state = ScanState::InString,
                b'[' | b'{' => stack.push(b),
                b']' | b'}' => {
                    let open = stack.pop()?;
                    let paired = matches!((open, b), (b'[', b']') | (b'{', b'}'));
                    if !paired {
                        return None;
                    }
                    if stack.is_empty() {
                        return Some(start + offset);
                    }
                }
                _ => {}
            },
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known() -> HashSet<&'static str> {
        ["R1", "R2", "R3"].into_iter().collect()
    }

    #[test]
    fn fenced_single_verdict() {
        let raw = "Here is the result:\n```json\n[{\"rule_id\":\"R1\",\"result\":\"Compliant\",\"notes\":\"ok\"}]\n```";
        let report = parse(raw, &known()).unwrap();
        assert_eq!(
            report.verdicts,
            vec![Verdict::new("R1", VerdictResult::Compliant, "ok")]
        );
        assert_eq!(report.stats.dropped(), 0);
    }

    #[test]
    fn no_json_is_unparsable_and_keeps_raw_text() {
        let raw = "I'm sorry, I cannot evaluate this drawing.";
        match parse(raw, &known()) {
            Err(ReviewError::UnparsableResponse { raw_text, .. }) => assert_eq!(raw_text, raw),
            other => panic!("expected UnparsableResponse, got {other:?}"),
        }
    }

    #[test]
    fn brackets_inside_strings_do_not_truncate() {
        let raw = r#"[{"rule_id":"R1","result":"NonCompliant","notes":"wall [A] is thin } here"},{"rule_id":"R2","result":"Compliant","notes":"ok"}]"#;
        let report = parse(raw, &known()).unwrap();
        assert_eq!(report.verdicts.len(), 2);
        assert_eq!(report.verdicts[0].notes, "wall [A] is thin } here");
    }

    #[test]
    fn escaped_quotes_stay_inside_strings() {
        let raw = r#"[{"rule_id":"R1","result":"Compliant","notes":"a \"quoted] note"}]"#;
        let report = parse(raw, &known()).unwrap();
        assert_eq!(report.verdicts[0].notes, "a \"quoted] note");
    }

    #[test]
    fn prose_brackets_before_the_array_are_skipped() {
        let raw = "Checked all rules [see notes] below:\n[{\"rule_id\":\"R2\",\"result\":\"No\",\"notes\":\"x\"}]";
        let report = parse(raw, &known()).unwrap();
        assert_eq!(report.verdicts[0].result, VerdictResult::NonCompliant);
    }

    #[test]
    fn unknown_ids_dropped_duplicates_dropped_results_coerced() {
        let raw = r#"[
            {"rule_id":"R1","result":"Compliant","notes":"a"},
            {"rule_id":"R9","result":"Compliant","notes":"b"},
            {"rule_id":"R1","result":"NonCompliant","notes":"dup"},
            {"rule_id":"R2","result":"Probably","notes":"c"},
            {"result":"Compliant"},
            "stray string"
        ]"#;
        let report = parse(raw, &known()).unwrap();
        let ids: Vec<&str> = report.verdicts.iter().map(|v| v.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["R1", "R2"]);
        assert_eq!(report.verdicts[0].notes, "a");
        assert_eq!(report.verdicts[1].result, VerdictResult::NeedsReview);
        let s = &report.stats;
        assert_eq!(s.received, 6);
        assert_eq!(s.unknown_rule, 1);
        assert_eq!(s.duplicate, 1);
        assert_eq!(s.malformed, 2);
        assert_eq!(s.coerced, 1);
        assert_eq!(s.dropped(), 4);
    }

    #[test]
    fn reason_alias_and_loose_ids() {
        let raw = r#"[{"rule_id":"r3","result":"yes","reason":"fine"},{"rule_id":2,"result":"fail"}]"#;
        let report = parse(raw, &known()).unwrap();
        assert_eq!(report.verdicts[0], Verdict::new("R3", VerdictResult::Compliant, "fine"));
        assert_eq!(report.verdicts[1], Verdict::new("R2", VerdictResult::NonCompliant, ""));
    }

    #[test]
    fn odd_note_shapes_keep_the_verdict() {
        let raw = r#"[{"rule_id":"R1","result":"Compliant","notes":42},{"rule_id":"R2","result":"No","notes":"thin","reason":"wall"},{"rule_id":"R3","result":"No","reason":["a","b"]}]"#;
        let report = parse(raw, &known()).unwrap();
        assert_eq!(report.stats.malformed, 0);
        assert_eq!(
            report.verdicts,
            vec![
                Verdict::new("R1", VerdictResult::Compliant, "42"),
                Verdict::new("R2", VerdictResult::NonCompliant, "thin"),
                Verdict::new("R3", VerdictResult::NonCompliant, r#"["a","b"]"#),
            ]
        );
    }

    #[test]
    fn echoed_example_object_loses_to_the_full_array() {
        let raw = r#"Format: {"rule_id":"R1","result":"Compliant","notes":"example"}
Answer: [{"rule_id":"R1","result":"No","notes":"real"},{"rule_id":"R2","result":"Compliant","notes":"ok"}]"#;
        let report = parse(raw, &known()).unwrap();
        assert_eq!(report.verdicts.len(), 2);
        assert_eq!(report.verdicts[0].notes, "real");
        assert!(!report.stats.salvaged);
    }

    #[test]
    fn wrapped_object_is_accepted() {
        let raw = r#"{"verdicts":[{"rule_id":"R1","result":"NeedsReview","notes":"hidden"}]}"#;
        let report = parse(raw, &known()).unwrap();
        assert_eq!(report.verdicts[0].result, VerdictResult::NeedsReview);
        assert!(!report.stats.salvaged);
    }

    #[test]
    fn trailing_comma_array_is_salvaged() {
        let raw = r#"[{"rule_id":"R1","result":"Compliant","notes":"a"},{"rule_id":"R2","result":"Compliant","notes":"b"},]"#;
        let report = parse(raw, &known()).unwrap();
        assert_eq!(report.verdicts.len(), 2);
        assert!(report.stats.salvaged);
    }

    #[test]
    fn unterminated_array_keeps_complete_objects() {
        let raw = r#"[{"rule_id":"R1","result":"Compliant","notes":"a"},{"rule_id":"R2","result":"No","notes":"b"},{"rule_id":"R3","res"#;
        let report = parse(raw, &known()).unwrap();
        assert_eq!(report.verdicts.len(), 2);
        assert!(report.stats.salvaged);
    }

    #[test]
    fn number_arrays_are_not_verdicts() {
        let raw = "Scores [1, 2, 3] only.";
        assert!(matches!(
            parse(raw, &known()),
            Err(ReviewError::UnparsableResponse { .. })
        ));
    }

    #[test]
    fn empty_array_is_a_valid_answer() {
        let report = parse("[]", &known()).unwrap();
        assert!(report.verdicts.is_empty());
        assert_eq!(report.stats.received, 0);
    }
}
