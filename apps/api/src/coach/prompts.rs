// LLM prompt constants for the daily coach.

/// System prompt for the briefing's motivational message.
pub const MOTIVATION_SYSTEM: &str = "You are a supportive and encouraging study coach. \
    Generate brief, motivating messages (1-2 sentences) based on the user's progress. \
    Be positive, specific, and actionable. Celebrate completed tasks, \
    encourage progress on pending ones, acknowledge effort and consistency, \
    and give gentle motivation for overdue tasks. \
    Respond with the message text only.";

/// Motivation prompt template. Replace every `{placeholder}` before sending.
pub const MOTIVATION_PROMPT_TEMPLATE: &str = "Generate a motivational message for today's study session.

Completed tasks: {completed_count}
Pending tasks: {pending_count}
Overdue tasks: {overdue_count}
Completion percentage: {completion_pct}%

Today's focus skills: {focus_skills}

Generate a brief, encouraging message.";

/// Shown in place of focus skills when today has none.
pub const NO_FOCUS_SKILLS: &str = "General skills";

/// Focus skills listed in the prompt.
pub const MAX_PROMPT_SKILLS: usize = 5;

/// Creative sampling for short encouragement.
pub const MOTIVATION_TEMPERATURE: f32 = 0.7;
pub const MOTIVATION_MAX_TOKENS: u32 = 200;
