//! Prompt templates for command help.

use crate::ports::CommandContext;

pub const EXPLAIN_MAX_TOKENS: u32 = 1000;
pub const SUGGEST_MAX_TOKENS: u32 = 800;

const UNKNOWN: &str = "unknown";
const DEFAULT_TOOLS: &str = "standard shell commands";

/// Asks what a command does, its risks, uses and alternatives.
pub fn explain_command(command: &str, context: &CommandContext) -> String {
    let context_json =
        serde_json::to_string_pretty(context).unwrap_or_else(|_| "{}".to_string());
    format!(
        "Explain this command and what it does:\n\
         \n\
         Command: {command}\n\
         Context: {context_json}\n\
         \n\
         Please provide:\n\
         1. What this command does\n\
         2. Any potential risks or side effects\n\
         3. Common use cases\n\
         4. Alternative approaches if applicable\n\
         \n\
         Keep the explanation concise but comprehensive."
    )
}

/// Asks for commands accomplishing a task on the caller's system.
pub fn suggest_command(description: &str, context: &CommandContext) -> String {
    let platform = context.platform.as_deref().unwrap_or(UNKNOWN);
    let cwd = context.working_directory.as_deref().unwrap_or(UNKNOWN);
    let tools = if context.available_tools.is_empty() {
        DEFAULT_TOOLS.to_string()
    } else {
        context.available_tools.join(", ")
    };
    format!(
        "Based on this description, suggest the best command(s) to accomplish the task:\n\
         \n\
         Task: {description}\n\
         System: {platform}\n\
         Current Directory: {cwd}\n\
         Available Tools: {tools}\n\
         \n\
         Please provide:\n\
         1. The exact command(s) to run\n\
         2. Brief explanation of what each command does\n\
         3. Any prerequisites or considerations\n\
         \n\
         Format as executable commands when possible."
    )
}
