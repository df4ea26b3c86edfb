//! Text helpers: fuzzy matching for suggestions and sensitive-value masking.

use serde_json::Value;

/// Subsequence fuzzy scorer used to rank "Did you mean?" candidates.
///
/// Returns `Some(score)` when every character of `needle` appears in order
/// within `hay` (case-insensitive), `None` otherwise. Scoring favors
/// consecutive matches, word-boundary matches, whole-prefix matches, and
/// shorter candidates.
pub fn fuzzy_score(hay: &str, needle: &str) -> Option<i64> {
    if needle.is_empty() {
        return Some(0);
    }
    if hay.is_empty() {
        return None;
    }

    let hay_chars: Vec<char> = hay.chars().flat_map(char::to_lowercase).collect();
    let needle_chars: Vec<char> = needle.chars().flat_map(char::to_lowercase).collect();

    let mut score = 0i64;
    let mut hay_index = 0usize;
    let mut consecutive = 0i64;
    let mut previous: Option<usize> = None;

    for &wanted in &needle_chars {
        let found = hay_chars[hay_index..]
            .iter()
            .position(|&candidate| candidate == wanted)?;
        let absolute = hay_index + found;

        if previous == Some(absolute.wrapping_sub(1)) {
            consecutive += 1;
        } else {
            consecutive = 1;
        }
        score += 6 * consecutive;

        if let Some(prev) = previous {
            score -= ((absolute - prev - 1) as i64) / 2;
        }

        let at_boundary = absolute == 0
            || hay_chars
                .get(absolute - 1)
                .is_some_and(|c| c.is_whitespace() || c.is_ascii_punctuation());
        if at_boundary {
            score += 10;
        }

        previous = Some(absolute);
        hay_index = absolute + 1;
    }

    let needle_lower: String = needle_chars.iter().collect();
    let hay_lower: String = hay_chars.iter().collect();
    if hay_lower.starts_with(&needle_lower) {
        score += 30;
    }

    Some(score - hay_chars.len() as i64 / 8)
}

/// Ranks `candidates` by closeness to `target` for "Did you mean?"
/// suggestions, best first, at most `max_results`. A candidate qualifies
/// when its edit distance is within a length-scaled threshold or one
/// string contains the other; everything else is dropped.
pub fn find_similar_items<'a, I>(target: &str, candidates: I, max_results: usize) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let target_lower = target.to_lowercase();
    let threshold = (target_lower.chars().count() / 3).max(2);

    let mut scored: Vec<(usize, &str)> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let candidate_lower = candidate.to_lowercase();
            let distance = edit_distance(&target_lower, &candidate_lower);
            let contained = candidate_lower.contains(&target_lower)
                || target_lower.contains(&candidate_lower);
            if distance <= threshold || contained {
                Some((distance, candidate))
            } else {
                None
            }
        })
        .collect();
    scored.sort_by(|left, right| left.0.cmp(&right.0).then_with(|| left.1.cmp(right.1)));
    scored
        .into_iter()
        .take(max_results)
        .map(|(_, candidate)| candidate.to_string())
        .collect()
}

/// Levenshtein distance over characters.
fn edit_distance(left: &str, right: &str) -> usize {
    let left: Vec<char> = left.chars().collect();
    let right: Vec<char> = right.chars().collect();
    if left.is_empty() {
        return right.len();
    }
    if right.is_empty() {
        return left.len();
    }

    let mut previous: Vec<usize> = (0..=right.len()).collect();
    let mut current = vec![0usize; right.len() + 1];

    for (row, &left_char) in left.iter().enumerate() {
        current[0] = row + 1;
        for (column, &right_char) in right.iter().enumerate() {
            let substitution_cost = usize::from(left_char != right_char);
            current[column + 1] = (previous[column] + substitution_cost)
                .min(previous[column + 1] + 1)
                .min(current[column] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[right.len()]
}

/// Returns true when a parameter name looks like it carries a secret.
pub fn is_sensitive_key(key: &str) -> bool {
    let lowered = key.to_ascii_lowercase();
    ["password", "token", "secret", "key"]
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Formats a parameter value for display, masking secrets and truncating
/// long strings.
pub fn mask_param_value(key: &str, value: &Value) -> String {
    if is_sensitive_key(key) {
        return "********".to_string();
    }
    let rendered = match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    if rendered.chars().count() > 50 {
        let prefix: String = rendered.chars().take(47).collect();
        format!("{prefix}...")
    } else {
        rendered
    }
}
