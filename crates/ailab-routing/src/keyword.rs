//! Exact-match routing layer.
//!
//! Keywords of every route are compiled into one Aho-Corasick automaton so a
//! single pass over the input finds all hits.  Regex pattern routes are
//! checked only when no keyword matched, and expose their named captures.

use std::collections::HashMap;

use aho_corasick::AhoCorasick;
use regex::Regex;
use tracing::debug;

use crate::error::{Result, RoutingError};
use crate::route::Route;

/// A keyword-layer hit.
#[derive(Debug, Clone, PartialEq)]
pub enum KeywordMatch {
    /// One of the route's keywords occurs in the input.
    Keyword { route: String, keyword: String },
    /// A regex pattern matched; named groups are returned.
    Pattern {
        route: String,
        captures: HashMap<String, String>,
    },
}

impl KeywordMatch {
    pub fn route(&self) -> &str {
        match self {
            Self::Keyword { route, .. } | Self::Pattern { route, .. } => route,
        }
    }
}

struct PatternRoute {
    regex: Regex,
    route: String,
}

/// Keyword and pattern matcher over a fixed route table.
pub struct KeywordMatcher {
    routes: Vec<String>,
    /// Lowercased keyword per automaton pattern id.
    keywords: Vec<String>,
    /// Route index per automaton pattern id.
    owners: Vec<usize>,
    automaton: Option<AhoCorasick>,
    patterns: Vec<PatternRoute>,
}

impl std::fmt::Debug for KeywordMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeywordMatcher")
            .field("routes", &self.routes)
            .field("keywords", &self.keywords.len())
            .field("patterns", &self.patterns.len())
            .finish()
    }
}

impl KeywordMatcher {
    /// Compile the keywords of `routes`.  Blank keywords are ignored.
    pub fn new(routes: &[Route]) -> Result<Self> {
        let mut keywords = Vec::new();
        let mut owners = Vec::new();
        for (index, route) in routes.iter().enumerate() {
            for keyword in &route.keywords {
                let lowered = keyword.trim().to_lowercase();
                if lowered.is_empty() {
                    continue;
                }
                keywords.push(lowered);
                owners.push(index);
            }
        }

        let automaton = if keywords.is_empty() {
            None
        } else {
            Some(AhoCorasick::new(&keywords).map_err(|e| RoutingError::Automaton(e.to_string()))?)
        };

        debug!(routes = routes.len(), keywords = keywords.len(), "keyword matcher built");
        Ok(Self {
            routes: routes.iter().map(|r| r.name.clone()).collect(),
            keywords,
            owners,
            automaton,
            patterns: Vec::new(),
        })
    }

    /// Add a regex route, tried in insertion order after the keywords.
    pub fn add_pattern(&mut self, pattern: &str, route: impl Into<String>) -> Result<()> {
        let regex = Regex::new(pattern).map_err(|e| RoutingError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        self.patterns.push(PatternRoute {
            regex,
            route: route.into(),
        });
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.automaton.is_none() && self.patterns.is_empty()
    }

    /// Match `input`.
    ///
    /// When several routes have a keyword in the input, the one registered
    /// first wins regardless of where in the input its keyword occurs.
    pub fn find(&self, input: &str) -> Option<KeywordMatch> {
        let lowered = input.to_lowercase();

        if let Some(automaton) = &self.automaton {
            let best = automaton
                .find_overlapping_iter(lowered.as_str())
                .map(|mat| mat.pattern().as_usize())
                .min_by_key(|&id| (self.owners[id], id));
            if let Some(id) = best {
                let route = self.routes[self.owners[id]].clone();
                debug!(route = %route, keyword = %self.keywords[id], "keyword match");
                return Some(KeywordMatch::Keyword {
                    route,
                    keyword: self.keywords[id].clone(),
                });
            }
        }

        for pattern in &self.patterns {
            if let Some(caps) = pattern.regex.captures(&lowered) {
                let captures = pattern
                    .regex
                    .capture_names()
                    .flatten()
                    .filter_map(|name| {
                        caps.name(name)
                            .map(|m| (name.to_string(), m.as_str().to_string()))
                    })
                    .collect();
                debug!(route = %pattern.route, "pattern match");
                return Some(KeywordMatch::Pattern {
                    route: pattern.route.clone(),
                    captures,
                });
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> KeywordMatcher {
        KeywordMatcher::new(&[
            Route::new("ADMIN").with_keywords(["sudo", "root", "config", "system-reset"]),
            Route::new("SUPPORT").with_keywords(["help", "error", "bug", "无法"]),
        ])
        .unwrap()
    }

    #[test]
    fn keyword_is_case_insensitive() {
        match matcher().find("SUDO reset system") {
            Some(KeywordMatch::Keyword { route, keyword }) => {
                assert_eq!(route, "ADMIN");
                assert_eq!(keyword, "sudo");
            }
            other => panic!("expected keyword match, got {other:?}"),
        }
    }

    #[test]
    fn earlier_route_wins_over_earlier_position() {
        let hit = matcher().find("help me edit the config").unwrap();
        assert_eq!(hit.route(), "ADMIN");
    }

    #[test]
    fn chinese_keyword_matches() {
        assert_eq!(matcher().find("程序无法启动").unwrap().route(), "SUPPORT");
        assert!(matcher().find("我的应用在启动时闪退了").is_none());
    }

    #[test]
    fn pattern_routes_capture_named_groups() {
        let mut m = matcher();
        m.add_pattern(r"order\s+#?(?P<order>\d+)", "BILLING").unwrap();
        match m.find("Where is order #4521?") {
            Some(KeywordMatch::Pattern { route, captures }) => {
                assert_eq!(route, "BILLING");
                assert_eq!(captures.get("order").map(String::as_str), Some("4521"));
            }
            other => panic!("expected pattern match, got {other:?}"),
        }
    }

    #[test]
    fn keywords_take_precedence_over_patterns() {
        let mut m = matcher();
        m.add_pattern(r".*", "CATCH_ALL").unwrap();
        assert_eq!(m.find("bug report").unwrap().route(), "SUPPORT");
        assert_eq!(m.find("anything").unwrap().route(), "CATCH_ALL");
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let mut m = matcher();
        match m.add_pattern("(unclosed", "X") {
            Err(RoutingError::InvalidPattern { pattern, .. }) => assert_eq!(pattern, "(unclosed"),
            other => panic!("expected InvalidPattern, got {other:?}"),
        }
    }

    #[test]
    fn no_keywords_means_empty() {
        let m = KeywordMatcher::new(&[Route::new("A").with_keywords(["  "])]).unwrap();
        assert!(m.is_empty());
        assert!(m.find("whatever").is_none());
    }
}
