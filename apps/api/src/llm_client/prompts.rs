// Cross-cutting prompt fragments. Each service that calls the model keeps its
// own prompts.rs alongside it.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Joins a task-specific system prompt with the JSON-only rule.
pub fn json_system(task: &str) -> String {
    format!("{task}\n\n{JSON_ONLY_SYSTEM}")
}
