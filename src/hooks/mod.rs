use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::HookError;
use crate::tools::{ToolAccess, ToolContent};

/// Verdict a pre-invocation hook hands back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HookDecision {
    Approve,
    Deny { reason: String },
    PassThrough,
}

/// Verdict a prompt-submission hook hands back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PromptDecision {
    PassThrough,
    Amend(String),
    Deny { reason: String },
}

/// Pending tool call as hooks observe it.
#[derive(Clone, Debug)]
pub struct ToolInvocation {
    pub call_id: String,
    pub tool: String,
    pub access: ToolAccess,
    pub arguments: Value,
}

/// Committed outcome of one invocation, shown to post-hooks and emitted as
/// the result event payload.
#[derive(Clone, Debug, PartialEq)]
pub struct InvocationRecord {
    pub is_error: bool,
    pub content: ToolContent,
}

impl InvocationRecord {
    pub fn success(content: ToolContent) -> Self {
        Self {
            is_error: false,
            content,
        }
    }

    pub fn error(content: ToolContent) -> Self {
        Self {
            is_error: true,
            content,
        }
    }
}

#[async_trait]
pub trait PreToolHook: Send + Sync {
    async fn before_tool(&self, invocation: &ToolInvocation) -> Result<HookDecision, HookError>;
}

#[async_trait]
pub trait PostToolHook: Send + Sync {
    async fn after_tool(
        &self,
        invocation: &ToolInvocation,
        record: &InvocationRecord,
        elapsed: Duration,
    ) -> Result<(), HookError>;
}

#[async_trait]
pub trait PromptHook: Send + Sync {
    async fn on_prompt(&self, prompt: &str) -> Result<PromptDecision, HookError>;
}

struct PreToolFn<F>(F);

#[async_trait]
impl<F> PreToolHook for PreToolFn<F>
where
    F: Fn(&ToolInvocation) -> HookDecision + Send + Sync,
{
    async fn before_tool(&self, invocation: &ToolInvocation) -> Result<HookDecision, HookError> {
        Ok((self.0)(invocation))
    }
}

/// Wraps a plain closure as a pre-invocation hook. Implement
/// [`PreToolHook`] directly when the hook needs to await or fail.
pub fn pre_tool_fn<F>(f: F) -> Arc<dyn PreToolHook>
where
    F: Fn(&ToolInvocation) -> HookDecision + Send + Sync + 'static,
{
    Arc::new(PreToolFn(f))
}

struct PostToolFn<F>(F);

#[async_trait]
impl<F> PostToolHook for PostToolFn<F>
where
    F: Fn(&ToolInvocation, &InvocationRecord, Duration) + Send + Sync,
{
    async fn after_tool(
        &self,
        invocation: &ToolInvocation,
        record: &InvocationRecord,
        elapsed: Duration,
    ) -> Result<(), HookError> {
        (self.0)(invocation, record, elapsed);
        Ok(())
    }
}

pub fn post_tool_fn<F>(f: F) -> Arc<dyn PostToolHook>
where
    F: Fn(&ToolInvocation, &InvocationRecord, Duration) + Send + Sync + 'static,
{
    Arc::new(PostToolFn(f))
}

struct PromptFn<F>(F);

#[async_trait]
impl<F> PromptHook for PromptFn<F>
where
    F: Fn(&str) -> PromptDecision + Send + Sync,
{
    async fn on_prompt(&self, prompt: &str) -> Result<PromptDecision, HookError> {
        Ok((self.0)(prompt))
    }
}

pub fn prompt_fn<F>(f: F) -> Arc<dyn PromptHook>
where
    F: Fn(&str) -> PromptDecision + Send + Sync + 'static,
{
    Arc::new(PromptFn(f))
}

/// Mode-level verdict computed from the permission mode and the tool's
/// access level before any hook runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApprovalBaseline {
    /// The mode auto-approves; hooks can still deny.
    Auto,
    /// An explicit hook approval is required.
    Ask,
    /// Mode-level denial; hooks are not consulted.
    Deny { reason: String },
}

/// Aggregate outcome of the pre-invocation fold.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PreVerdict {
    Approved,
    Denied { reason: String },
}

/// Ordered interceptors for one session, keyed by event kind.
#[derive(Clone, Default)]
pub struct HookSet {
    pre_tool_use: Vec<Arc<dyn PreToolHook>>,
    post_tool_use: Vec<Arc<dyn PostToolHook>>,
    prompt_submit: Vec<Arc<dyn PromptHook>>,
}

impl std::fmt::Debug for HookSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookSet")
            .field("pre_tool_use", &self.pre_tool_use.len())
            .field("post_tool_use", &self.post_tool_use.len())
            .field("prompt_submit", &self.prompt_submit.len())
            .finish()
    }
}

impl HookSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_pre_tool_use(mut self, hook: Arc<dyn PreToolHook>) -> Self {
        self.pre_tool_use.push(hook);
        self
    }

    pub fn on_post_tool_use(mut self, hook: Arc<dyn PostToolHook>) -> Self {
        self.post_tool_use.push(hook);
        self
    }

    pub fn on_prompt_submit(mut self, hook: Arc<dyn PromptHook>) -> Self {
        self.prompt_submit.push(hook);
        self
    }

    /// Folds the baseline and every pre-hook into one verdict.
    ///
    /// Hooks run in registration order and all of them run; the first
    /// denial's reason wins and later approvals cannot override it. A hook
    /// that fails counts as a denial carrying the failure text. With an
    /// `Ask` baseline the invocation is approved only if some hook
    /// explicitly approved it.
    pub async fn evaluate_pre(
        &self,
        invocation: &ToolInvocation,
        baseline: ApprovalBaseline,
    ) -> PreVerdict {
        let mut approved = match baseline {
            ApprovalBaseline::Auto => true,
            ApprovalBaseline::Ask => false,
            ApprovalBaseline::Deny { reason } => return PreVerdict::Denied { reason },
        };
        let mut denial: Option<String> = None;

        for hook in &self.pre_tool_use {
            match hook.before_tool(invocation).await {
                Ok(HookDecision::Approve) => approved = true,
                Ok(HookDecision::PassThrough) => {}
                Ok(HookDecision::Deny { reason }) => {
                    if denial.is_none() {
                        denial = Some(reason);
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        tool = %invocation.tool,
                        error = %err,
                        "pre-invocation hook failed, treating as denial"
                    );
                    if denial.is_none() {
                        denial = Some(err.to_string());
                    }
                }
            }
        }

        if let Some(reason) = denial {
            return PreVerdict::Denied { reason };
        }
        if approved {
            PreVerdict::Approved
        } else {
            PreVerdict::Denied {
                reason: format!(
                    "tool '{}' requires approval and no hook approved it",
                    invocation.tool
                ),
            }
        }
    }

    /// Post-hooks are side-effect only; failures are logged and dropped.
    pub async fn run_post(
        &self,
        invocation: &ToolInvocation,
        record: &InvocationRecord,
        elapsed: Duration,
    ) {
        for hook in &self.post_tool_use {
            if let Err(err) = hook.after_tool(invocation, record, elapsed).await {
                tracing::warn!(
                    tool = %invocation.tool,
                    error = %err,
                    "post-invocation hook failed"
                );
            }
        }
    }

    /// Runs prompt hooks in order: amendments feed the next hook, the first
    /// denial stops the chain, a failing hook rejects the prompt.
    pub async fn evaluate_prompt(&self, prompt: &str) -> PromptDecision {
        let mut current = prompt.to_string();
        let mut amended = false;

        for hook in &self.prompt_submit {
            match hook.on_prompt(&current).await {
                Ok(PromptDecision::PassThrough) => {}
                Ok(PromptDecision::Amend(text)) => {
                    current = text;
                    amended = true;
                }
                Ok(PromptDecision::Deny { reason }) => return PromptDecision::Deny { reason },
                Err(err) => {
                    tracing::warn!(error = %err, "prompt hook failed, rejecting prompt");
                    return PromptDecision::Deny {
                        reason: err.to_string(),
                    };
                }
            }
        }

        if amended {
            PromptDecision::Amend(current)
        } else {
            PromptDecision::PassThrough
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    fn invocation() -> ToolInvocation {
        ToolInvocation {
            call_id: "call_1".to_string(),
            tool: "write_note".to_string(),
            access: ToolAccess::Edit,
            arguments: json!({"text": "hi"}),
        }
    }

    struct FailingHook;

    #[async_trait]
    impl PreToolHook for FailingHook {
        async fn before_tool(&self, _: &ToolInvocation) -> Result<HookDecision, HookError> {
            Err(HookError("audit backend unreachable".to_string()))
        }
    }

    #[tokio::test]
    async fn auto_baseline_with_no_hooks_approves() {
        let verdict = HookSet::new()
            .evaluate_pre(&invocation(), ApprovalBaseline::Auto)
            .await;
        assert_eq!(verdict, PreVerdict::Approved);
    }

    #[tokio::test]
    async fn ask_baseline_requires_an_explicit_approval() {
        let verdict = HookSet::new()
            .evaluate_pre(&invocation(), ApprovalBaseline::Ask)
            .await;
        assert!(
            matches!(verdict, PreVerdict::Denied { reason } if reason.contains("requires approval"))
        );

        let approving = HookSet::new().on_pre_tool_use(pre_tool_fn(|_| HookDecision::Approve));
        let verdict = approving
            .evaluate_pre(&invocation(), ApprovalBaseline::Ask)
            .await;
        assert_eq!(verdict, PreVerdict::Approved);
    }

    #[tokio::test]
    async fn denial_is_sticky_over_a_later_approval() {
        let hooks = HookSet::new()
            .on_pre_tool_use(pre_tool_fn(|_| HookDecision::Deny {
                reason: "blocked by policy".to_string(),
            }))
            .on_pre_tool_use(pre_tool_fn(|_| HookDecision::Approve));

        let verdict = hooks
            .evaluate_pre(&invocation(), ApprovalBaseline::Auto)
            .await;
        assert_eq!(
            verdict,
            PreVerdict::Denied {
                reason: "blocked by policy".to_string()
            }
        );
    }

    #[tokio::test]
    async fn approve_then_deny_still_denies() {
        let hooks = HookSet::new()
            .on_pre_tool_use(pre_tool_fn(|_| HookDecision::Approve))
            .on_pre_tool_use(pre_tool_fn(|_| HookDecision::Deny {
                reason: "second thoughts".to_string(),
            }));

        let verdict = hooks
            .evaluate_pre(&invocation(), ApprovalBaseline::Ask)
            .await;
        assert_eq!(
            verdict,
            PreVerdict::Denied {
                reason: "second thoughts".to_string()
            }
        );
    }

    #[tokio::test]
    async fn first_denial_reason_wins() {
        let hooks = HookSet::new()
            .on_pre_tool_use(pre_tool_fn(|_| HookDecision::Deny {
                reason: "first".to_string(),
            }))
            .on_pre_tool_use(pre_tool_fn(|_| HookDecision::Deny {
                reason: "second".to_string(),
            }));

        let verdict = hooks
            .evaluate_pre(&invocation(), ApprovalBaseline::Auto)
            .await;
        assert_eq!(
            verdict,
            PreVerdict::Denied {
                reason: "first".to_string()
            }
        );
    }

    #[tokio::test]
    async fn hook_error_fails_closed() {
        let hooks = HookSet::new()
            .on_pre_tool_use(Arc::new(FailingHook))
            .on_pre_tool_use(pre_tool_fn(|_| HookDecision::Approve));

        let verdict = hooks
            .evaluate_pre(&invocation(), ApprovalBaseline::Auto)
            .await;
        assert!(matches!(verdict, PreVerdict::Denied { reason } if reason.contains("unreachable")));
    }

    #[tokio::test]
    async fn baseline_denial_skips_hooks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let hooks = HookSet::new().on_pre_tool_use(pre_tool_fn(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            HookDecision::Approve
        }));

        let verdict = hooks
            .evaluate_pre(
                &invocation(),
                ApprovalBaseline::Deny {
                    reason: "blocked in plan mode".to_string(),
                },
            )
            .await;

        assert!(matches!(verdict, PreVerdict::Denied { reason } if reason.contains("plan mode")));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn prompt_amendments_feed_the_next_hook() {
        let hooks = HookSet::new()
            .on_prompt_submit(prompt_fn(|_| {
                PromptDecision::Amend("rewritten".to_string())
            }))
            .on_prompt_submit(prompt_fn(|prompt| {
                assert_eq!(prompt, "rewritten");
                PromptDecision::PassThrough
            }));

        let decision = hooks.evaluate_prompt("original").await;
        assert_eq!(decision, PromptDecision::Amend("rewritten".to_string()));
    }

    #[tokio::test]
    async fn prompt_denial_stops_the_chain() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let hooks = HookSet::new()
            .on_prompt_submit(prompt_fn(|_| PromptDecision::Deny {
                reason: "off topic".to_string(),
            }))
            .on_prompt_submit(prompt_fn(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
                PromptDecision::PassThrough
            }));

        let decision = hooks.evaluate_prompt("hello").await;
        assert_eq!(
            decision,
            PromptDecision::Deny {
                reason: "off topic".to_string()
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn post_hooks_observe_the_committed_record() {
        let observed = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&observed);
        let hooks = HookSet::new().on_post_tool_use(post_tool_fn(move |_, record, _| {
            assert!(record.is_error);
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        let record = InvocationRecord::error(ToolContent::text("denied"));
        hooks
            .run_post(&invocation(), &record, Duration::from_millis(3))
            .await;
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }
}
