pub mod briefing;
pub mod handlers;
pub mod motivation;
pub mod prompts;
pub mod tracker;
