//! Deterministic generation of candidate local parts from a contact's name.
//!
//! The output order is fixed, most-common-pattern-first, because it seeds
//! the priority used when several candidates tie in score. Pure function,
//! no I/O.

use crate::core::models::Candidate;

/// Lowercases and strips everything but ASCII letters from a name token.
fn normalize_name(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Generates the ordered, deduplicated candidate list for a contact.
///
/// Name parts that are empty (or too short for a given pattern) are
/// skipped rather than producing malformed locals; an unusable name pair
/// yields an empty list.
pub fn generate_candidates(first: &str, last: &str, domain: &str) -> Vec<Candidate> {
    let first = normalize_name(first);
    let last = normalize_name(last);
    let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();

    if domain.is_empty() {
        return Vec::new();
    }

    let fi = first.chars().next().map(|c| c.to_string());
    let li = last.chars().next().map(|c| c.to_string());
    // Single-letter tokens only contribute their initial forms; using them
    // as a "full" name would duplicate those.
    let full_first = (first.len() >= 2).then_some(first.as_str());
    let full_last = (last.len() >= 2).then_some(last.as_str());

    let mut locals: Vec<(&'static str, String)> = Vec::new();
    let mut push = |id: &'static str, local: Option<String>| {
        if let Some(local) = local {
            locals.push((id, local));
        }
    };

    push(
        "first.last",
        full_first.zip(full_last).map(|(f, l)| format!("{f}.{l}")),
    );
    push(
        "firstlast",
        full_first.zip(full_last).map(|(f, l)| format!("{f}{l}")),
    );
    push(
        "first_last",
        full_first.zip(full_last).map(|(f, l)| format!("{f}_{l}")),
    );
    push(
        "first-last",
        full_first.zip(full_last).map(|(f, l)| format!("{f}-{l}")),
    );
    push("first", full_first.map(str::to_string));
    push(
        "last.first",
        full_last.zip(full_first).map(|(l, f)| format!("{l}.{f}")),
    );
    push(
        "f.last",
        fi.as_deref()
            .zip(full_last)
            .map(|(f, l)| format!("{f}.{l}")),
    );
    push(
        "first.l",
        full_first
            .zip(li.as_deref())
            .map(|(f, l)| format!("{f}.{l}")),
    );
    push(
        "flast",
        fi.as_deref().zip(full_last).map(|(f, l)| format!("{f}{l}")),
    );
    push(
        "firstl",
        full_first
            .zip(li.as_deref())
            .map(|(f, l)| format!("{f}{l}")),
    );
    push(
        "f.l",
        fi.as_deref()
            .zip(li.as_deref())
            .map(|(f, l)| format!("{f}.{l}")),
    );
    push("last", full_last.map(str::to_string));

    let mut seen = std::collections::HashSet::new();
    locals
        .into_iter()
        .filter(|(_, local)| seen.insert(local.clone()))
        .map(|(pattern_id, local_part)| Candidate {
            local_part,
            domain: domain.clone(),
            pattern_id,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_three_patterns_are_fixed() {
        let candidates = generate_candidates("John", "Doe", "example.com");
        let addresses: Vec<String> = candidates.iter().take(3).map(|c| c.address()).collect();
        assert_eq!(
            addresses,
            vec![
                "john.doe@example.com",
                "johndoe@example.com",
                "john_doe@example.com",
            ]
        );
    }

    #[test]
    fn full_pattern_set_is_covered() {
        let candidates = generate_candidates("John", "Doe", "example.com");
        let ids: Vec<&str> = candidates.iter().map(|c| c.pattern_id).collect();
        assert_eq!(
            ids,
            vec![
                "first.last",
                "firstlast",
                "first_last",
                "first-last",
                "first",
                "last.first",
                "f.last",
                "first.l",
                "flast",
                "firstl",
                "f.l",
                "last",
            ]
        );
    }

    #[test]
    fn generation_is_deterministic() {
        let a = generate_candidates("Jane", "Smith", "corp.io");
        let b = generate_candidates("Jane", "Smith", "corp.io");
        assert_eq!(a, b);
    }

    #[test]
    fn normalizes_case_and_punctuation() {
        let candidates = generate_candidates(" Mary-Ann ", "O'Brien", "Example.COM");
        assert_eq!(candidates[0].address(), "maryann.obrien@example.com");
    }

    #[test]
    fn single_letter_first_skips_full_first_patterns() {
        let candidates = generate_candidates("J", "Doe", "example.com");
        let ids: Vec<&str> = candidates.iter().map(|c| c.pattern_id).collect();
        // "first.last" and friends would be malformed duplicates of the
        // initial forms; only initial-based and last-only patterns remain.
        assert_eq!(ids, vec!["f.last", "flast", "f.l", "last"]);
        assert_eq!(candidates[0].address(), "j.doe@example.com");
    }

    #[test]
    fn empty_names_yield_no_candidates() {
        assert!(generate_candidates("", "", "example.com").is_empty());
        assert!(generate_candidates("John", "Doe", "").is_empty());
    }

    #[test]
    fn duplicates_keep_first_occurrence() {
        // Identical first/last tokens collide across patterns; dedup keeps
        // the earliest (highest-priority) occurrence.
        let candidates = generate_candidates("Lee", "Lee", "example.com");
        let locals: Vec<&str> = candidates.iter().map(|c| c.local_part.as_str()).collect();
        let unique: std::collections::HashSet<&&str> = locals.iter().collect();
        assert_eq!(locals.len(), unique.len());
        assert_eq!(candidates[0].pattern_id, "first.last");
        // "last.first" duplicates "first.last" here and must not reappear.
        assert!(!candidates.iter().any(|c| c.pattern_id == "last.first"));
    }
}
