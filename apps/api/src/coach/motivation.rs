//! Motivational message for the daily briefing.
//!
//! `AppState` carries an `Arc<dyn Motivator>`: `LlmMotivator` when an API key
//! is configured, `TemplateMotivator` otherwise. A failing motivator never
//! fails the briefing; `motivational_message` falls back to the template.

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use crate::coach::prompts::{
    MAX_PROMPT_SKILLS, MOTIVATION_MAX_TOKENS, MOTIVATION_PROMPT_TEMPLATE, MOTIVATION_SYSTEM,
    MOTIVATION_TEMPERATURE, NO_FOCUS_SKILLS,
};
use crate::llm_client::{CallOptions, LlmClient, LlmError};

/// Progress figures a motivator writes about.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MotivationContext {
    pub completed_count: usize,
    pub pending_count: usize,
    pub overdue_count: usize,
    pub completion_pct: f64,
    pub focus_skills: Vec<String>,
}

#[async_trait]
pub trait Motivator: Send + Sync {
    async fn motivate(&self, ctx: &MotivationContext) -> Result<String, LlmError>;
}

/// Deterministic message keyed off the day's progress.
pub fn template_message(ctx: &MotivationContext) -> String {
    if ctx.completed_count > 0 {
        format!(
            "Great progress! You've completed {} task(s) today. Keep up the momentum!",
            ctx.completed_count
        )
    } else if ctx.pending_count > 0 {
        format!(
            "You have {} task(s) ahead. Take it one step at a time - you've got this!",
            ctx.pending_count
        )
    } else {
        "Every journey begins with a single step. Let's make today count!".to_string()
    }
}

pub struct TemplateMotivator;

#[async_trait]
impl Motivator for TemplateMotivator {
    async fn motivate(&self, ctx: &MotivationContext) -> Result<String, LlmError> {
        Ok(template_message(ctx))
    }
}

pub struct LlmMotivator {
    llm: LlmClient,
}

impl LlmMotivator {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

pub fn build_prompt(ctx: &MotivationContext) -> String {
    let focus = if ctx.focus_skills.is_empty() {
        NO_FOCUS_SKILLS.to_string()
    } else {
        ctx.focus_skills
            .iter()
            .take(MAX_PROMPT_SKILLS)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    };
    MOTIVATION_PROMPT_TEMPLATE
        .replace("{completed_count}", &ctx.completed_count.to_string())
        .replace("{pending_count}", &ctx.pending_count.to_string())
        .replace("{overdue_count}", &ctx.overdue_count.to_string())
        .replace("{completion_pct}", &format!("{:.1}", ctx.completion_pct))
        .replace("{focus_skills}", &focus)
}

#[async_trait]
impl Motivator for LlmMotivator {
    async fn motivate(&self, ctx: &MotivationContext) -> Result<String, LlmError> {
        let options = CallOptions {
            max_tokens: MOTIVATION_MAX_TOKENS,
            temperature: Some(MOTIVATION_TEMPERATURE),
        };
        self.llm
            .call_text(&build_prompt(ctx), MOTIVATION_SYSTEM, options)
            .await
    }
}

pub async fn motivational_message(motivator: &dyn Motivator, ctx: &MotivationContext) -> String {
    match motivator.motivate(ctx).await {
        Ok(message) if !message.trim().is_empty() => message.trim().to_string(),
        Ok(_) => {
            warn!("Motivator returned an empty message, using template");
            template_message(ctx)
        }
        Err(e) => {
            warn!("Failed to generate motivational message: {e}");
            template_message(ctx)
        }
    }
}
