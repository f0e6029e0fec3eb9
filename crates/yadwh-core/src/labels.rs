//! Group membership via the opt-in container label.
//!
//! A container joins one or more groups by setting the label key to a
//! comma-separated list of group names, e.g. `backend_prod, STAGING`.
//! Matching trims every token and ignores ASCII case.

/// Label key a container sets to opt into webhook groups.
pub const DEFAULT_LABEL_KEY: &str = "io.d2a.yadwh.ug";

/// Canonical form of a group name used for store keys.
pub fn normalize_group(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// Iterate the group names encoded in a label value.
pub fn groups(label_value: &str) -> impl Iterator<Item = &str> {
    label_value
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Whether `label_value` lists `group`.
pub fn is_member(label_value: &str, group: &str) -> bool {
    let group = group.trim();
    if group.is_empty() {
        return false;
    }
    groups(label_value).any(|token| token.eq_ignore_ascii_case(group))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_value_matches_ignoring_case() {
        assert!(is_member("BACKEND_PROD", "backend_prod"));
        assert!(is_member("backend_prod", "BACKEND_PROD"));
    }

    #[test]
    fn list_matches_every_member() {
        let label = "backend_prod, STAGING";
        assert!(is_member(label, "BACKEND_PROD"));
        assert!(is_member(label, "staging"));
        assert!(is_member(label, "  staging "));
        assert!(!is_member(label, "backend"));
    }

    #[test]
    fn prefix_is_not_membership() {
        assert!(!is_member("backend_prod", "backend"));
        assert!(!is_member("backend", "backend_prod"));
    }

    #[test]
    fn empty_tokens_never_match() {
        assert!(!is_member("a,,b", ""));
        assert!(!is_member("", ""));
        assert!(!is_member(" , ", " "));
        assert_eq!(groups("a,,b, ").collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize_group("  Backend_PROD \n"), "backend_prod");
    }
}
