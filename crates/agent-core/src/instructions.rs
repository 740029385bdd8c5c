//! Default agent instructions

const BASE_INSTRUCTIONS: &str = "You are a helpful and knowledgeable AI assistant powered by the GPT-OSS model running locally.

You should:
- Be concise but thorough in your responses
- Use web search when you need current information or when explicitly asked
- Explain your reasoning process when solving complex problems
- Ask clarifying questions when the user's request is ambiguous
- Be honest about the limitations of your knowledge";

const WEB_SEARCH_INSTRUCTIONS: &str = "

You have access to web search capabilities through the following tools ONLY:
- web_search: Search the internet for current information
- get_page_content: Retrieve the full content of specific web pages

These are the ONLY tools available. Do NOT attempt to use any other tools like find_in_page, extract_text, or similar - they do not exist.

Use these tools when you need to:
- Find current news, events, or information
- Research topics that may have recent developments
- Get specific details from web pages
- Verify or supplement your knowledge with up-to-date information

IMPORTANT: Only use the two tools listed above. If you need to find information on a page, use get_page_content and analyze the content yourself.

Always be clear about when you're using web search vs. your training knowledge.";

const FOOTER: &str = "

Remember that you're running on a local model, so you have the benefit of privacy and control, but you should use web search to supplement your knowledge when needed for current events or specific factual queries.";

/// Built-in instructions, with the web search section when search tools are offered
pub fn default_instructions(has_web_search: bool) -> String {
    let mut instructions = String::from(BASE_INSTRUCTIONS);
    if has_web_search {
        instructions.push_str(WEB_SEARCH_INSTRUCTIONS);
    }
    instructions.push_str(FOOTER);
    instructions
}

/// Short descriptions of the known tools
pub fn tool_description(name: &str) -> Option<&'static str> {
    match name {
        "web_search" => Some("Search the internet for current information"),
        "get_page_content" => Some("Retrieve the full content of specific web pages"),
        _ => None,
    }
}

/// Compose instructions from a behaviour description, a tool list and extra context.
/// Unknown tool names are skipped.
pub fn build_custom_instructions(
    base_behavior: &str,
    available_tools: &[String],
    additional_context: Option<&str>,
) -> String {
    let mut instructions = base_behavior.to_string();

    let described: Vec<String> = available_tools
        .iter()
        .filter_map(|name| tool_description(name).map(|d| format!("- {name}: {d}\n")))
        .collect();
    if !available_tools.is_empty() {
        instructions.push_str("\n\nAvailable tools:\n");
        instructions.push_str(&described.concat());
    }

    if let Some(context) = additional_context.filter(|c| !c.is_empty()) {
        instructions.push_str("\n\nAdditional context:\n");
        instructions.push_str(context);
    }

    instructions
}
