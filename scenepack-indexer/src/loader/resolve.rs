//! Resource name matching inside an opened container

/// ID-code prefixes the host may prepend to stored object names
const STORAGE_PREFIXES: &[&str] = &["OB", "ME", "GR"];

/// How a candidate matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    CandidateContainsName,
    NameContainsCandidate,
    PrefixStripped,
}

/// Find the container resource an asset name refers to
///
/// Priority: exact match, candidate contains the name, name contains the
/// candidate, then candidate with a storage prefix stripped equal to the
/// name ignoring case. Within one rule the first candidate wins. Empty
/// candidates never match.
pub fn match_resource_name<'a>(name: &str, candidates: &'a [String]) -> Option<(&'a str, MatchKind)> {
    if name.is_empty() {
        return None;
    }
    let usable = || candidates.iter().map(String::as_str).filter(|c| !c.is_empty());

    if let Some(c) = usable().find(|c| *c == name) {
        return Some((c, MatchKind::Exact));
    }
    if let Some(c) = usable().find(|c| c.contains(name)) {
        return Some((c, MatchKind::CandidateContainsName));
    }
    if let Some(c) = usable().find(|c| name.contains(c)) {
        return Some((c, MatchKind::NameContainsCandidate));
    }
    usable()
        .find(|c| {
            strip_storage_prefix(c)
                .map(|rest| rest.eq_ignore_ascii_case(name))
                .unwrap_or(false)
        })
        .map(|c| (c, MatchKind::PrefixStripped))
}

fn strip_storage_prefix(candidate: &str) -> Option<&str> {
    STORAGE_PREFIXES
        .iter()
        .find_map(|p| candidate.strip_prefix(p))
        .map(|rest| rest.trim_start_matches(['_', '.', ' ']))
        .filter(|rest| !rest.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_exact_wins_over_contains() {
        let candidates = names(&["Barrel_Rusty", "Barrel"]);
        assert_eq!(match_resource_name("Barrel", &candidates), Some(("Barrel", MatchKind::Exact)));
    }

    #[test]
    fn test_candidate_contains_name() {
        let candidates = names(&["Crate", "Barrel.001"]);
        assert_eq!(
            match_resource_name("Barrel", &candidates),
            Some(("Barrel.001", MatchKind::CandidateContainsName))
        );
    }

    #[test]
    fn test_name_contains_candidate() {
        let candidates = names(&["Lamp"]);
        assert_eq!(
            match_resource_name("Lamp_Post_02", &candidates),
            Some(("Lamp", MatchKind::NameContainsCandidate))
        );
    }

    #[test]
    fn test_prefix_stripped_case_insensitive() {
        let candidates = names(&["OBbench"]);
        assert_eq!(
            match_resource_name("Bench", &candidates),
            Some(("OBbench", MatchKind::PrefixStripped))
        );
    }

    #[test]
    fn test_empty_candidates_skipped() {
        let candidates = names(&["", "Tree"]);
        assert_eq!(match_resource_name("Rock", &candidates), None);
        assert_eq!(match_resource_name("", &candidates), None);
    }
}
