//! The common routing interface.

use async_trait::async_trait;

use crate::error::Result;

/// Anything that maps an input to a route label.
#[async_trait]
pub trait Router: Send + Sync {
    /// Name used in logs and evaluation reports.
    fn name(&self) -> &str;

    async fn route(&self, input: &str) -> Result<String>;
}

/// Rule-based router: the first rule with a keyword contained in the input
/// wins, otherwise the fallback label.
#[derive(Debug, Clone)]
pub struct KeywordRouter {
    name: String,
    rules: Vec<(String, Vec<String>)>,
    fallback: String,
}

impl KeywordRouter {
    pub fn new(name: impl Into<String>, fallback: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
            fallback: fallback.into(),
        }
    }

    /// Add a rule.  Blank keywords are dropped.
    #[must_use]
    pub fn rule<I, S>(mut self, label: impl Into<String>, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keywords = keywords
            .into_iter()
            .map(Into::<String>::into)
            .filter(|k| !k.trim().is_empty())
            .collect();
        self.rules.push((label.into(), keywords));
        self
    }

    pub fn classify(&self, input: &str) -> &str {
        self.rules
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| input.contains(k.as_str())))
            .map(|(label, _)| label.as_str())
            .unwrap_or(&self.fallback)
    }
}

#[async_trait]
impl Router for KeywordRouter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn route(&self, input: &str) -> Result<String> {
        Ok(self.classify(input).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_rule_then_fallback() {
        let router = KeywordRouter::new("rules", "OTHER")
            .rule("A", ["apple"])
            .rule("B", ["banana", "apple"]);
        assert_eq!(router.route("apple banana").await.unwrap(), "A");
        assert_eq!(router.route("banana").await.unwrap(), "B");
        assert_eq!(router.route("cherry").await.unwrap(), "OTHER");
        assert_eq!(router.name(), "rules");
    }

    #[test]
    fn blank_keywords_match_nothing() {
        let router = KeywordRouter::new("rules", "OTHER")
            .rule("CATCH_ALL", ["", "  "])
            .rule("B", ["banana"]);
        assert_eq!(router.classify("banana"), "B");
        assert_eq!(router.classify("cherry"), "OTHER");
    }
}
