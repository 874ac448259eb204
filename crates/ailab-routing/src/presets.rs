//! Ready-made route tables for the customer-support demos.

use ailab_agent::SharedModel;

use crate::evaluation::EvalCase;
use crate::hierarchical::{RouteTree, TreeNode};
use crate::llm_router::LlmRouter;
use crate::route::Route;
use crate::router::KeywordRouter;

/// Label for inputs no department should handle.
pub const HUMAN_FALLBACK: &str = "HUMAN_FALLBACK";

/// Departments the model router may choose.
pub const LLM_ROUTES: [&str; 3] = ["TECHNICAL", "BILLING", "SALES"];

/// Target description of the refund queue.
pub const REFUND_TARGET: &str = "我想要退还我的钱，我不满意服务，申请退款流程";

pub const LLM_ROUTER_PROMPT: &str = "你是一个专业的企业客服中转系统。请分析用户的输入并分发到正确的部门。

参考示例：
- 用户输入：\"我上周付过款了，为什么发票还没开出来？\" -> 路由：BILLING
- 用户输入：\"软件在启动时提示权限不足\" -> 路由：TECHNICAL
- 用户输入：\"我想咨询一下针对 100 人团队的定价方案\" -> 路由：SALES

请确保 confidence 字段是一个 0 到 100 之间的整数。";

/// Admin and support routes with keywords and examples.
pub fn support_routes() -> Vec<Route> {
    vec![
        Route::new("ADMIN")
            .with_description("系统管理与高权限操作")
            .with_keywords(["sudo", "root", "config", "system-reset"])
            .with_examples(["如何重置系统配置", "进入管理后台", "修改系统底层参数"]),
        Route::new("SUPPORT")
            .with_description("技术支持与故障处理")
            .with_keywords(["help", "error", "bug", "无法"])
            .with_examples(["软件运行报错了", "安装过程中崩溃", "找不到对应的文件"]),
    ]
}

/// Support and billing departments with their queues.  Inputs mentioning
/// money go to billing; everything else defaults to support.
pub fn support_tree() -> RouteTree {
    let nodes = vec![
        TreeNode::new("SUPPORT", "技术支持与故障处理")
            .sub_route("INSTALLATION", "安装与环境配置问题")
            .sub_route("RUNTIME", "运行报错与性能问题")
            .sub_route("SECURITY", "账号安全与权限问题"),
        TreeNode::new("BILLING", "账单、发票与支付")
            .triggers(["钱", "费", "退款"])
            .sub_route("REFUND", "退款申请")
            .sub_route("INVOICE", "发票开具")
            .sub_route("SUBSCRIPTION", "订阅计划变更"),
    ];
    RouteTree::from_parts(nodes, 0)
}

pub fn support_llm_router(model: SharedModel) -> LlmRouter {
    LlmRouter::new(model, LLM_ROUTES, LLM_ROUTER_PROMPT)
}

/// Rule-based reference for benchmarking the model router.
pub fn baseline_router() -> KeywordRouter {
    KeywordRouter::new("baseline", HUMAN_FALLBACK)
        .rule("BILLING", ["退款", "发票"])
        .rule("TECHNICAL", ["启动", "权限"])
        .rule("SALES", ["购买", "多少钱"])
}

pub fn benchmark_cases() -> Vec<EvalCase> {
    [
        ("我想退款", "BILLING"),
        ("软件无法启动，报 404", "TECHNICAL"),
        ("批量购买有优惠吗", "SALES"),
        ("发票还没收到", "BILLING"),
        ("权限不足无法访问", "TECHNICAL"),
        ("你们的产品多少钱", "SALES"),
        ("今天天气不错", HUMAN_FALLBACK),
    ]
    .into_iter()
    .map(|(input, expected)| EvalCase::new(input, expected))
    .collect()
}
