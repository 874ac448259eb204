//! Multi-agent patterns built from plain generation calls.
//!
//! - [`Supervisor`]: a planner reads the request and hands it to a worker.
//!   Research results are passed on to the writer.
//! - [`ReflectionLoop`]: draft, review, refine until the reviewer answers
//!   `PASS` or the rounds run out.
//! - [`Collaboration`]: a writer drafts, a reviewer suggests changes and the
//!   writer produces the final version.  Writer and reviewer may be
//!   different models.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::llm::model::{LanguageModel, SharedModel, generate_text};

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

pub const SUPERVISOR_PROMPT: &str = "你是一位项目经理。分析用户的输入，只输出一个单词：
- 如果用户想了解信息、查事实，输出 \"RESEARCH\"。
- 如果用户想写文章、润色、创作，输出 \"WRITE\"。
- 其他情况，输出 \"UNKNOWN\"。";
pub const RESEARCHER_PROMPT: &str = "你是一位专业的研究员。请提供关于给定话题的 3 个核心事实。";
pub const WRITER_PROMPT: &str =
    "你是一位资深编辑。请将以下事实改写成一段生动的、适合在社交媒体发布的文字。";

pub const CODER_PROMPT: &str = "你是一位程序员。请只输出代码，不要有任何解释。";
pub const CODE_REVIEW_PROMPT: &str = "你是一位高级测试工程师。请审查以下代码，寻找潜在的错误、性能问题或不符合最佳实践的地方。如果有错，请指出；如果完美，请回复 \"PASS\"。";
pub const REFINE_PROMPT: &str =
    "你是一位资深工程师。请根据测试反馈修正之前的代码。只输出修正后的代码，不要解释。";

pub const AUTHOR_PROMPT: &str = "你是一位资深后端工程师，擅长简洁明了地解释技术概念。";
pub const EDITOR_PROMPT: &str = "你是一位严苛的技术编辑，负责确保内容的准确性和专业性。";
pub const REVISER_PROMPT: &str = "你是一位擅长吸收反馈的资深工程师。";

/// Reviewer verdict that ends a reflection loop.
pub const PASS: &str = "PASS";

async fn ask(model: &dyn LanguageModel, system: &str, prompt: &str) -> Result<String> {
    let done = generate_text(model, Some(system), prompt).await?;
    Ok(done.into_text())
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

/// A model with a fixed role.
#[derive(Clone)]
pub struct Worker {
    name: String,
    system_prompt: String,
    model: SharedModel,
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("model", &self.model.model_id())
            .finish()
    }
}

impl Worker {
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>, model: SharedModel) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            model,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn run(&self, input: &str) -> Result<String> {
        info!(worker = %self.name, model_id = self.model.model_id(), "worker started");
        ask(self.model.as_ref(), &self.system_prompt, input).await
    }
}

/// What the planner decided the request needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskIntent {
    Research,
    Write,
    Unknown,
}

impl TaskIntent {
    /// Read a planner reply.  Surrounding words and case are ignored;
    /// `RESEARCH` is checked before `WRITE`.
    pub fn parse(reply: &str) -> Self {
        let reply = reply.trim().to_uppercase();
        if reply.contains("RESEARCH") {
            Self::Research
        } else if reply.contains("WRITE") {
            Self::Write
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Research => "RESEARCH",
            Self::Write => "WRITE",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for TaskIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerOutput {
    pub worker: String,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupervisorReport {
    pub intent: TaskIntent,
    /// Worker outputs in the order they ran.  Empty for `UNKNOWN`.
    pub steps: Vec<WorkerOutput>,
}

impl SupervisorReport {
    /// Output of the last worker that ran.
    pub fn final_output(&self) -> Option<&str> {
        self.steps.last().map(|s| s.output.as_str())
    }
}

/// Dispatches a request to a research or writing worker.
///
/// ```text
///  input ──► planner ──► RESEARCH ──► researcher ──► writer
///                   ├──► WRITE ─────────────────────► writer
///                   └──► UNKNOWN (nothing runs)
/// ```
#[derive(Debug, Clone)]
pub struct Supervisor {
    planner: Worker,
    researcher: Worker,
    writer: Worker,
}

impl Supervisor {
    /// Planner and both workers share `model`.
    pub fn new(model: SharedModel) -> Self {
        Self {
            researcher: Worker::new("researcher", RESEARCHER_PROMPT, Arc::clone(&model)),
            writer: Worker::new("writer", WRITER_PROMPT, Arc::clone(&model)),
            planner: Worker::new("supervisor", SUPERVISOR_PROMPT, model),
        }
    }

    #[must_use]
    pub fn with_researcher(mut self, worker: Worker) -> Self {
        self.researcher = worker;
        self
    }

    #[must_use]
    pub fn with_writer(mut self, worker: Worker) -> Self {
        self.writer = worker;
        self
    }

    pub async fn classify(&self, input: &str) -> Result<TaskIntent> {
        let reply = self.planner.run(input).await?;
        let intent = TaskIntent::parse(&reply);
        debug!(%intent, reply = %reply.trim(), "supervisor classified request");
        Ok(intent)
    }

    pub async fn run(&self, input: &str) -> Result<SupervisorReport> {
        let intent = self.classify(input).await?;
        let mut steps = Vec::new();

        match intent {
            TaskIntent::Research => {
                let facts = self.researcher.run(input).await?;
                let post = self.writer.run(&facts).await?;
                steps.push(WorkerOutput {
                    worker: self.researcher.name.clone(),
                    output: facts,
                });
                steps.push(WorkerOutput {
                    worker: self.writer.name.clone(),
                    output: post,
                });
            }
            TaskIntent::Write => {
                let draft = self.writer.run(input).await?;
                steps.push(WorkerOutput {
                    worker: self.writer.name.clone(),
                    output: draft,
                });
            }
            TaskIntent::Unknown => warn!("no worker for request"),
        }

        info!(%intent, steps = steps.len(), "supervisor finished");
        Ok(SupervisorReport { intent, steps })
    }
}

// ---------------------------------------------------------------------------
// Self-reflection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReflectionRound {
    pub feedback: String,
    /// `None` when the reviewer passed the code.
    pub revision: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReflectionReport {
    pub draft: String,
    pub rounds: Vec<ReflectionRound>,
    pub output: String,
    /// Whether the last review was `PASS`.
    pub passed: bool,
}

fn is_pass(feedback: &str) -> bool {
    feedback.trim().eq_ignore_ascii_case(PASS)
}

/// Draft, review and refine.
pub struct ReflectionLoop {
    author: SharedModel,
    reviewer: SharedModel,
    max_rounds: u32,
}

impl ReflectionLoop {
    /// One model writes and reviews; a single review round.
    pub fn new(model: SharedModel) -> Self {
        Self {
            reviewer: Arc::clone(&model),
            author: model,
            max_rounds: 1,
        }
    }

    #[must_use]
    pub fn with_reviewer(mut self, reviewer: SharedModel) -> Self {
        self.reviewer = reviewer;
        self
    }

    /// Review rounds; at least one.
    #[must_use]
    pub fn with_max_rounds(mut self, rounds: u32) -> Self {
        self.max_rounds = rounds.max(1);
        self
    }

    pub async fn run(&self, task: &str) -> Result<ReflectionReport> {
        let draft = ask(self.author.as_ref(), CODER_PROMPT, task).await?;
        let mut current = draft.clone();
        let mut rounds = Vec::new();
        let mut passed = false;

        for round in 1..=self.max_rounds {
            let feedback = ask(
                self.reviewer.as_ref(),
                CODE_REVIEW_PROMPT,
                &format!("代码内容:\n{current}"),
            )
            .await?;

            if is_pass(&feedback) {
                info!(round, "review passed");
                rounds.push(ReflectionRound {
                    feedback,
                    revision: None,
                });
                passed = true;
                break;
            }

            debug!(round, "review requested changes");
            let revision = ask(
                self.author.as_ref(),
                REFINE_PROMPT,
                &format!("初稿:\n{current}\n\n反馈意见:\n{feedback}"),
            )
            .await?;
            rounds.push(ReflectionRound {
                feedback,
                revision: Some(revision.clone()),
            });
            current = revision;
        }

        Ok(ReflectionReport {
            draft,
            rounds,
            output: current,
            passed,
        })
    }
}

// ---------------------------------------------------------------------------
// Collaboration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollaborationReport {
    pub draft: String,
    pub review: String,
    pub final_version: String,
}

/// Writer and reviewer pipeline.
pub struct Collaboration {
    writer: SharedModel,
    reviewer: SharedModel,
}

impl Collaboration {
    pub fn new(writer: SharedModel, reviewer: SharedModel) -> Self {
        Self { writer, reviewer }
    }

    pub async fn run(&self, task: &str) -> Result<CollaborationReport> {
        info!(writer = self.writer.model_id(), reviewer = self.reviewer.model_id(), "drafting");
        let draft = ask(self.writer.as_ref(), AUTHOR_PROMPT, task).await?;

        let review = ask(
            self.reviewer.as_ref(),
            EDITOR_PROMPT,
            &format!("请审查以下内容，并给出 2 条具体的改进建议：\n\n{draft}"),
        )
        .await?;

        let final_version = ask(
            self.writer.as_ref(),
            REVISER_PROMPT,
            &format!("请参考以下建议，对初稿进行最终润色：\n\n建议：{review}\n\n初稿：{draft}"),
        )
        .await?;

        Ok(CollaborationReport {
            draft,
            review,
            final_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;

    #[test]
    fn intent_parsing() {
        assert_eq!(TaskIntent::parse(" research\n"), TaskIntent::Research);
        assert_eq!(TaskIntent::parse("Intent: WRITE."), TaskIntent::Write);
        assert_eq!(TaskIntent::parse("不确定"), TaskIntent::Unknown);
        assert_eq!(TaskIntent::Research.to_string(), "RESEARCH");
    }

    #[tokio::test]
    async fn research_feeds_the_writer() {
        let model = Arc::new(
            ScriptedModel::new("qwen")
                .reply("RESEARCH")
                .reply("三个事实")
                .reply("一条推文"),
        );
        let report = Supervisor::new(model.clone())
            .run("帮我查一下什么是 OpenCode，并整理成推文。")
            .await
            .unwrap();

        assert_eq!(report.intent, TaskIntent::Research);
        let workers: Vec<&str> = report.steps.iter().map(|s| s.worker.as_str()).collect();
        assert_eq!(workers, vec!["researcher", "writer"]);
        assert_eq!(report.final_output(), Some("一条推文"));

        let seen = model.requests();
        assert_eq!(seen[0].system_text().as_deref(), Some(SUPERVISOR_PROMPT));
        assert_eq!(seen[1].system_text().as_deref(), Some(RESEARCHER_PROMPT));
        assert_eq!(seen[2].last_user_text(), Some("三个事实"));
    }

    #[tokio::test]
    async fn write_goes_straight_to_the_writer() {
        let model = Arc::new(ScriptedModel::new("qwen").reply("write").reply("深夜食堂"));
        let report = Supervisor::new(model.clone()).run("写一段文字").await.unwrap();
        assert_eq!(report.intent, TaskIntent::Write);
        assert_eq!(report.steps.len(), 1);
        assert_eq!(report.final_output(), Some("深夜食堂"));
    }

    #[tokio::test]
    async fn unknown_runs_no_worker() {
        let model = Arc::new(ScriptedModel::new("qwen").reply("嗯？"));
        let report = Supervisor::new(model.clone()).run("你好").await.unwrap();
        assert_eq!(report.intent, TaskIntent::Unknown);
        assert!(report.final_output().is_none());
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn planner_failure_propagates() {
        let model = Arc::new(ScriptedModel::new("qwen").fail("API returned 500"));
        assert!(Supervisor::new(model).run("x").await.is_err());
    }

    #[tokio::test]
    async fn reflection_stops_on_pass() {
        let author = Arc::new(ScriptedModel::new("coder").reply("fn days() {}"));
        let reviewer = Arc::new(ScriptedModel::new("tester").reply(" pass\n"));
        let report = ReflectionLoop::new(author.clone())
            .with_reviewer(reviewer.clone())
            .run("计算两个日期之间相差的天数")
            .await
            .unwrap();

        assert!(report.passed);
        assert_eq!(report.output, "fn days() {}");
        assert_eq!(report.rounds[0].revision, None);
        assert_eq!(author.calls(), 1);
        assert_eq!(
            reviewer.requests()[0].last_user_text(),
            Some("代码内容:\nfn days() {}")
        );
    }

    #[tokio::test]
    async fn reflection_refines_once_by_default() {
        let author = Arc::new(ScriptedModel::new("coder").reply("v1").reply("v2"));
        let reviewer = Arc::new(ScriptedModel::new("tester").reply("off by one"));
        let report = ReflectionLoop::new(author.clone())
            .with_reviewer(reviewer.clone())
            .run("task")
            .await
            .unwrap();

        assert!(!report.passed);
        assert_eq!(report.draft, "v1");
        assert_eq!(report.output, "v2");
        assert_eq!(reviewer.calls(), 1);
        assert_eq!(
            author.requests()[1].last_user_text(),
            Some("初稿:\nv1\n\n反馈意见:\noff by one")
        );
    }

    #[tokio::test]
    async fn reflection_reviews_each_revision() {
        let author = Arc::new(ScriptedModel::new("coder").reply("v1").reply("v2"));
        let reviewer = Arc::new(ScriptedModel::new("tester").reply("bug").reply("PASS"));
        let report = ReflectionLoop::new(author)
            .with_reviewer(reviewer.clone())
            .with_max_rounds(3)
            .run("task")
            .await
            .unwrap();

        assert!(report.passed);
        assert_eq!(report.output, "v2");
        assert_eq!(report.rounds.len(), 2);
        assert_eq!(
            reviewer.requests()[1].last_user_text(),
            Some("代码内容:\nv2")
        );
    }

    #[tokio::test]
    async fn collaboration_pipeline() {
        let writer = Arc::new(ScriptedModel::new("qwen").reply("初稿").reply("终稿"));
        let reviewer = Arc::new(ScriptedModel::new("phi4").reply("1. 更准确 2. 更简洁"));
        let report = Collaboration::new(writer.clone(), reviewer.clone())
            .run("请用 100 字以内解释什么是 Redis 的持久化。")
            .await
            .unwrap();

        assert_eq!(report.draft, "初稿");
        assert_eq!(report.final_version, "终稿");
        assert!(
            reviewer.requests()[0]
                .last_user_text()
                .unwrap()
                .ends_with("\n\n初稿")
        );
        assert_eq!(
            writer.requests()[1].last_user_text(),
            Some("请参考以下建议，对初稿进行最终润色：\n\n建议：1. 更准确 2. 更简洁\n\n初稿：初稿")
        );
    }
}
