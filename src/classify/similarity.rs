//! Fuzzy matching of a foreign-key stem against a set of candidate table
//! names, used to resolve which Hub a Satellite or Link side belongs to.

use difflib::sequencematcher::SequenceMatcher;

/// Tables whose similarity ratio against `needle` is below this threshold
/// are never considered a match.
pub const SIMILARITY_THRESHOLD: f32 = 0.7;

/// Ratcliff/Obershelp longest-common-subsequence ratio between two strings,
/// via `difflib`'s faithful port of Python's `SequenceMatcher.ratio()`.
pub fn similarity_ratio(a: &str, b: &str) -> f32 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let mut matcher = SequenceMatcher::new(&a_chars, &b_chars);
    matcher.ratio()
}

/// Returns the candidate with the highest similarity ratio against `needle`,
/// excluding `exclude` (the asking table itself), provided the top score is
/// at least [`SIMILARITY_THRESHOLD`] and ties are not allowed to resolve.
pub fn resolve<'a>(
    needle: &str,
    candidates: impl IntoIterator<Item = &'a str>,
    exclude: &str,
) -> Option<&'a str> {
    let mut best: Option<(&'a str, f32)> = None;
    let mut tied = false;

    for candidate in candidates {
        if candidate == exclude {
            continue;
        }
        let score = similarity_ratio(needle, candidate);
        match best {
            None => best = Some((candidate, score)),
            Some((_, best_score)) if score > best_score => {
                best = Some((candidate, score));
                tied = false;
            }
            Some((_, best_score)) if (score - best_score).abs() < f32::EPSILON => {
                tied = true;
            }
            _ => {}
        }
    }

    match best {
        Some((name, score)) if score >= SIMILARITY_THRESHOLD && !tied => Some(name),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_scores_one() {
        assert_eq!(similarity_ratio("customer", "customer"), 1.0);
    }

    #[test]
    fn resolves_best_candidate_above_threshold() {
        let candidates = ["customer_hub", "order_hub", "invoice_hub"];
        let resolved = resolve("customer", candidates, "customer_sat");
        assert_eq!(resolved, Some("customer_hub"));
    }

    #[test]
    fn returns_none_below_threshold() {
        let candidates = ["zzz_hub", "yyy_hub"];
        assert_eq!(resolve("customer", candidates, "customer_sat"), None);
    }

    #[test]
    fn excludes_the_asking_table() {
        let candidates = ["customer_hub"];
        assert_eq!(resolve("customer_hub", candidates, "customer_hub"), None);
    }

    #[test]
    fn ties_do_not_resolve() {
        let candidates = ["customer_hub_a", "customer_hub_b"];
        assert_eq!(resolve("customer_hub", candidates, "other"), None);
    }
}
