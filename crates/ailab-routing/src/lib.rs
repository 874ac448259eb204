//! Intent routing for ailab.
//!
//! Layers, cheapest first:
//!
//! ```text
//!  input ──► KeywordMatcher ──hit──► route            (no model call)
//!               │ miss
//!               ▼
//!          SemanticRouter  ──► argmax cosine(input, centroid)
//!               │
//!               ▼
//!          ThresholdPolicy ──► dispatch / review / reject
//! ```
//!
//! [`RouteTree`] walks a two-level department tree, [`LlmRouter`] asks a
//! model for a structured decision and [`ContextualRouter`] folds the
//! conversation history into the query first.  Every router implements
//! [`Router`], which is what [`evaluate`] measures.

pub mod contextual;
pub mod error;
pub mod evaluation;
pub mod hierarchical;
pub mod hybrid;
pub mod keyword;
pub mod llm_router;
pub mod presets;
pub mod route;
pub mod router;
pub mod semantic;
pub mod similarity;
pub mod threshold;

pub use contextual::{ContextualDecision, ContextualRouter};
pub use error::{Result, RoutingError};
pub use evaluation::{CaseResult, EvalCase, EvaluationReport, Traced, evaluate, trace};
pub use hierarchical::{RoutePath, RouteTree, SubRoute, TreeNode};
pub use hybrid::{HybridDecision, HybridRouter, RoutingLayer};
pub use keyword::{KeywordMatch, KeywordMatcher};
pub use llm_router::{LlmDecision, LlmRouter};
pub use route::Route;
pub use router::{KeywordRouter, Router};
pub use semantic::{RouteScore, SemanticRouter};
pub use similarity::{SimilarityLabel, centroid, cosine_similarity};
pub use threshold::{RoutingAction, ThresholdDecision, ThresholdPolicy, ThresholdRouter};
