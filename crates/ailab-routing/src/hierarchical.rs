//! Two-level routing: pick a department, then a queue inside it.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, RoutingError};
use crate::router::Router;

/// Label used when no sub-route matches.
pub const GENERAL: &str = "GENERAL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubRoute {
    pub id: String,
    pub description: String,
}

impl SubRoute {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
        }
    }

    /// Substrings of the input that select this sub-route: the lowercased
    /// id and the first two characters of the description.
    fn cues(&self) -> impl Iterator<Item = String> {
        let prefix: String = self.description.chars().take(2).collect();
        [self.id.to_lowercase(), prefix]
            .into_iter()
            .filter(|cue| !cue.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: String,
    pub description: String,
    /// Substrings that send an input to this node at level one.
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub sub_routes: Vec<SubRoute>,
}

impl TreeNode {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            triggers: Vec::new(),
            sub_routes: Vec::new(),
        }
    }

    #[must_use]
    pub fn triggers<I, S>(mut self, triggers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.triggers.extend(triggers.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn sub_route(mut self, id: impl Into<String>, description: impl Into<String>) -> Self {
        self.sub_routes.push(SubRoute::new(id, description));
        self
    }
}

/// Result of a tree walk; displays as `TOP > SUB`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutePath {
    pub top: String,
    pub sub: String,
}

impl fmt::Display for RoutePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} > {}", self.top, self.sub)
    }
}

#[derive(Debug, Clone)]
pub struct RouteTree {
    nodes: Vec<TreeNode>,
    default_node: usize,
}

impl RouteTree {
    /// Build a tree.  `default_id` names the node used when no trigger
    /// matches and must be one of `nodes`.
    pub fn new(nodes: Vec<TreeNode>, default_id: &str) -> Result<Self> {
        let default_node = nodes
            .iter()
            .position(|n| n.id == default_id)
            .ok_or(RoutingError::UnknownRoute {
                route: default_id.to_string(),
            })?;
        Ok(Self {
            nodes,
            default_node,
        })
    }

    /// `default_node` must index into `nodes`.
    pub(crate) fn from_parts(nodes: Vec<TreeNode>, default_node: usize) -> Self {
        debug_assert!(default_node < nodes.len());
        Self {
            nodes,
            default_node,
        }
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    fn top_level(&self, input: &str) -> &TreeNode {
        self.nodes
            .iter()
            .find(|node| node.triggers.iter().any(|t| !t.is_empty() && input.contains(t.as_str())))
            .unwrap_or(&self.nodes[self.default_node])
    }

    pub fn route(&self, input: &str) -> RoutePath {
        let node = self.top_level(input);
        let sub = node
            .sub_routes
            .iter()
            .find(|sub| sub.cues().any(|cue| input.contains(cue.as_str())))
            .map_or(GENERAL, |sub| sub.id.as_str());

        let path = RoutePath {
            top: node.id.clone(),
            sub: sub.to_string(),
        };
        debug!(%path, "tree route");
        path
    }
}

#[async_trait]
impl Router for RouteTree {
    fn name(&self) -> &str {
        "tree"
    }

    async fn route(&self, input: &str) -> Result<String> {
        Ok(RouteTree::route(self, input).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presets;

    #[test]
    fn billing_refund() {
        let tree = presets::support_tree();
        let path = tree.route("我需要申请退款，年度计划不符合预期");
        assert_eq!(path.top, "BILLING");
        assert_eq!(path.sub, "REFUND");
        assert_eq!(path.to_string(), "BILLING > REFUND");
    }

    #[test]
    fn default_node_and_general() {
        let tree = presets::support_tree();
        assert_eq!(tree.route("软件在启动时提示权限不足").to_string(), "SUPPORT > GENERAL");
        assert_eq!(tree.route("安装卡住了").to_string(), "SUPPORT > INSTALLATION");
        assert_eq!(tree.route("账号被锁").to_string(), "SUPPORT > SECURITY");
    }

    #[test]
    fn id_cue_is_lowercased() {
        let tree = presets::support_tree();
        assert_eq!(tree.route("费用 invoice please").to_string(), "BILLING > INVOICE");
    }

    #[test]
    fn unknown_default_is_rejected() {
        assert!(RouteTree::new(vec![TreeNode::new("A", "a")], "B").is_err());
    }
}
