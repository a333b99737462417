//! Small text helpers shared by trait display and body rendering.

use regex::{Captures, Regex};
use std::sync::OnceLock;

fn citation_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"\[(\d+)\]").expect("citation marker pattern is valid"))
}

/// Capitalize the first letter of every space-separated word and lowercase the rest.
#[must_use]
pub fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Replace `[n]` markers with the output of `link` for the n-th (1-based) citation.
///
/// Markers without a matching citation are left untouched.
#[must_use]
pub fn link_citations<F>(body: &str, citations: &[String], link: F) -> String
where
    F: Fn(usize, &str) -> String,
{
    if citations.is_empty() {
        return body.to_string();
    }
    citation_marker()
        .replace_all(body, |caps: &Captures<'_>| {
            let resolved = caps[1]
                .parse::<usize>()
                .ok()
                .filter(|n| *n >= 1)
                .and_then(|n| citations.get(n - 1).map(|url| link(n, url)));
            resolved.unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_case_handles_mixed_input() {
        assert_eq!(title_case("stem magnet"), "Stem Magnet");
        assert_eq!(title_case("LOCAL public"), "Local Public");
        assert_eq!(title_case(""), "");
        assert_eq!(title_case("a  b"), "A  B");
    }

    #[test]
    fn citations_link_known_markers_only() {
        let citations = vec!["https://a.example".to_string()];
        let out = link_citations("see [1] and [2]", &citations, |n, url| {
            format!("<{url}#{n}>")
        });
        assert_eq!(out, "see <https://a.example#1> and [2]");
    }

    #[test]
    fn citations_without_sources_are_identity() {
        let out = link_citations("plain [1]", &[], |_, _| unreachable!());
        assert_eq!(out, "plain [1]");
    }
}
