use std::collections::HashSet;

use regex::Regex;
use tracing::warn;

/// Separator between exact labels in the configured sampler list.
pub const LABEL_SEPARATOR: char = ';';

/// Decides whether a sampler label is of interest.
///
/// Two arms, both always consulted: an anchored regex (regex mode) and an
/// exact label set (list mode). A label passes if either arm accepts.
/// Normal configuration populates only one arm; the permissive OR keeps a
/// misconfigured host from silently dropping every event.
#[derive(Debug)]
pub struct SamplerFilter {
    regex: Option<Regex>,
    labels: HashSet<String>,
}

impl SamplerFilter {
    /// Builds the filter from the raw `samplersList` value.
    ///
    /// In regex mode the pattern is anchored so it must cover the whole
    /// label, not a substring. A pattern that fails to compile is logged
    /// and leaves the regex arm disabled.
    pub fn from_config(samplers_list: &str, use_regex: bool) -> Self {
        if use_regex {
            let regex = match Regex::new(&format!("^(?:{samplers_list})$")) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(
                        pattern = samplers_list,
                        error = %e,
                        "invalid sampler regex, regex arm disabled",
                    );
                    None
                }
            };
            Self {
                regex,
                labels: HashSet::new(),
            }
        } else {
            Self {
                regex: None,
                labels: samplers_list
                    .split(LABEL_SEPARATOR)
                    .map(str::to_owned)
                    .collect(),
            }
        }
    }

    /// True when the regex arm matches the whole label or the label is in
    /// the exact set.
    pub fn accepts(&self, label: &str) -> bool {
        self.regex.as_ref().is_some_and(|re| re.is_match(label))
            || self.labels.contains(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pattern_accepts_everything() {
        let filter = SamplerFilter::from_config(".*", true);
        assert!(filter.accepts("Login"));
        assert!(filter.accepts(""));
        assert!(filter.accepts("any label at all"));
    }

    #[test]
    fn test_regex_mode_is_full_match() {
        let filter = SamplerFilter::from_config("Login.*", true);
        assert!(filter.accepts("Login"));
        assert!(filter.accepts("Login-01"));
        assert!(!filter.accepts("PreLogin"));

        // A mid-label hit is not enough; the pattern must span the label.
        let filter = SamplerFilter::from_config("Log", true);
        assert!(!filter.accepts("Login"));
        assert!(filter.accepts("Log"));
    }

    #[test]
    fn test_regex_alternation() {
        let filter = SamplerFilter::from_config("Login|Checkout", true);
        assert!(filter.accepts("Login"));
        assert!(filter.accepts("Checkout"));
        assert!(!filter.accepts("Search"));
    }

    #[test]
    fn test_set_mode_exact_case_sensitive() {
        let filter = SamplerFilter::from_config("Login;Checkout", false);
        assert!(filter.accepts("Login"));
        assert!(filter.accepts("Checkout"));
        assert!(!filter.accepts("login"));
        assert!(!filter.accepts("Login "));
        assert!(!filter.accepts("Search"));
    }

    #[test]
    fn test_set_mode_does_not_treat_entries_as_regex() {
        let filter = SamplerFilter::from_config("a.*", false);
        assert!(filter.accepts("a.*"));
        assert!(!filter.accepts("abc"));
    }

    #[test]
    fn test_malformed_regex_disables_regex_arm() {
        let filter = SamplerFilter::from_config("(unclosed", true);
        assert!(!filter.accepts("Login"));
        assert!(!filter.accepts("(unclosed"));
    }
}
