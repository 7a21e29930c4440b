//! Prompt templates sent to the language models
//!
//! This module holds the system prompts, canned replies and sampling settings used by
//! the proxy endpoints.

use crate::upstream::Sampling;

/// System prompt asking for a JSON decision tree in a fenced block
pub const TREE_SYSTEM_PROMPT: &str = r#"You generate **structured JSON decision trees** to organize **creative ideas, projects, and plans**. Every response follows this format:

```json
[
  {
    "name": "Branch 1",
    "children": [{ "name": "Leaf 1.1" }, { "name": "Leaf 1.2" }]
  },
  {
    "name": "Branch 2",
    "children": [{ "name": "Leaf 2.1" }, { "name": "Leaf 2.2" }]
  }
]
```

Keep it **structured, clear, and creative.**"#;

/// Returned by the idea endpoint when the model answers with nothing
pub const EMPTY_IDEA_REPLY: &str = "Generated Idea";

/// Returned by the idea endpoint when the upstream call fails
pub const FAILED_IDEA_REPLY: &str = "Failed to generate idea";

/// Returned by the chat endpoints when the model answers with nothing
pub const EMPTY_CHAT_REPLY: &str = "Could you tell me more about what you'd like to know?";

/// Returned by the chat endpoints when the upstream call fails
pub const FAILED_CHAT_REPLY: &str = "Could you rephrase that? I want to help you plan this better.";

/// Prompt asking for 3-4 short ideas as a numbered list
pub fn idea_prompt(context: &str, current_node: &str, depth: usize) -> String {
    format!(
        "You are a creative AI specializing in generating innovative ideas based on given context.\n\
         Context: {}\n\
         Current Focus: {}\n\
         Depth Level: {}\n\
         Generate exactly 3-4 unique and relevant ideas based on the given focus and context.\n\
         Each idea must be only 2-3 words long.\n\
         Respond only with a numbered list and nothing else.",
        context, current_node, depth
    )
}

/// System prompt for a conversation about `topic`
pub fn chat_system_prompt(topic: &str) -> String {
    format!(
        "You are a helpful and friendly AI assistant discussing: \"{}\".\n\
         Keep responses concise (1-2 sentences) and end with a brief question to encourage discussion.\n\
         Be engaging and show personality while staying focused on the topic.",
        topic
    )
}

/// First message of every conversation
pub fn greeting(topic: &str) -> String {
    format!(
        "Hi! Let's talk about \"{}\". What would you like to explore?",
        topic
    )
}

pub fn tree_sampling() -> Sampling {
    Sampling {
        temperature: Some(0.6),
        top_p: Some(0.95),
        max_tokens: Some(8192),
        presence_penalty: None,
    }
}

pub fn idea_sampling() -> Sampling {
    Sampling {
        temperature: Some(0.7),
        ..Sampling::default()
    }
}

/// Short, focused replies
pub fn chat_sampling() -> Sampling {
    Sampling {
        temperature: Some(0.7),
        top_p: None,
        max_tokens: Some(80),
        presence_penalty: Some(0.6),
    }
}
