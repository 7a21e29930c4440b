//! Idea generation
//!
//! Turns a node's ancestor chain into 3-4 short child ideas, and parses the replies
//! of the tree and idea endpoints.

use serde::Deserialize;

use crate::api::client::Client;
use crate::models::{IdeaContext, IdeaNode, IdeaRequest};

/// Used whenever idea generation fails, so a node always gains a child
pub const FALLBACK_IDEA: &str = "New Idea";

pub const MAX_IDEAS: usize = 4;

/// Splits a numbered list (`"1. Idea\n2. Idea"`) into its items.
///
/// One leading `"<digits>. "` prefix is stripped per line and empty lines dropped;
/// lines without a prefix are kept as they are.
pub fn parse_numbered_list(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| strip_number_prefix(line.trim()).trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

// The dot must be followed by whitespace or end the line, so "1.5 mile hike" keeps its number
fn strip_number_prefix(line: &str) -> &str {
    let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return line;
    }
    match line[digits..].strip_prefix('.') {
        Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => rest,
        _ => line,
    }
}

/// Extracts the tree from a model reply.
///
/// The reply is expected to hold a ```` ```json ```` fenced block; without one the
/// whole reply is parsed. Both an array of nodes and a single node are accepted.
pub fn parse_tree_reply(reply: &str) -> Result<Vec<IdeaNode>, serde_json::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum TreeShape {
        Many(Vec<IdeaNode>),
        One(IdeaNode),
    }

    let json = extract_json_fence(reply).unwrap_or(reply).trim();
    match serde_json::from_str::<TreeShape>(json)? {
        TreeShape::Many(nodes) => Ok(nodes),
        TreeShape::One(node) => Ok(vec![node]),
    }
}

fn extract_json_fence(reply: &str) -> Option<&str> {
    const OPEN: &str = "```json";
    const CLOSE: &str = "```";

    let start = reply.find(OPEN)? + OPEN.len();
    let end = reply[start..].find(CLOSE)? + start;
    Some(&reply[start..end])
}

/// Context string sent upstream: the ancestor chain and the node, joined with `" > "`
pub fn context_string(context: &IdeaContext) -> String {
    context
        .ancestors
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(context.current.as_str()))
        .collect::<Vec<_>>()
        .join(" > ")
}

/// Asks the client for child ideas of a node. Never fails: any error, or a reply with
/// no usable lines, yields a single [`FALLBACK_IDEA`].
pub async fn generate_ideas<C: Client + ?Sized>(client: &C, context: &IdeaContext) -> Vec<String> {
    let request = IdeaRequest {
        context: context_string(context),
        current_node: context.current.clone(),
        depth: context.depth,
    };

    match client.generate_idea(&request).await {
        Ok(text) => {
            let mut ideas = parse_numbered_list(&text);
            ideas.truncate(MAX_IDEAS);
            if ideas.is_empty() {
                tracing::warn!(node = %context.current, "Idea reply was empty; using fallback");
                vec![FALLBACK_IDEA.to_string()]
            } else {
                ideas
            }
        }
        Err(e) => {
            tracing::error!(node = %context.current, "Idea generation failed: {}", e);
            vec![FALLBACK_IDEA.to_string()]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedClient;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_numbered_list() {
        let ideas = parse_numbered_list("1. Garden party\n2. Beach vows\n\n3. City loft\n");
        assert_eq!(ideas, vec!["Garden party", "Beach vows", "City loft"]);
    }

    #[test]
    fn test_parse_numbered_list_property() {
        let items = ["Rustic barn", "Sky lanterns", "Jazz trio", "Late brunch"];
        for count in 1..=items.len() {
            for blank_every in [0usize, 1, 2] {
                let mut text = String::new();
                for (i, item) in items.iter().take(count).enumerate() {
                    text.push_str(&format!("{}. {}\n", i + 1, item));
                    if blank_every > 0 && i % blank_every == 0 {
                        text.push_str("   \n");
                    }
                }
                let non_empty = text.lines().filter(|l| !l.trim().is_empty()).count();

                let ideas = parse_numbered_list(&text);
                assert_eq!(ideas.len(), non_empty);
                for idea in &ideas {
                    let digits = idea.trim_start_matches(|c: char| c.is_ascii_digit());
                    assert!(
                        digits.len() == idea.len() || !digits.starts_with('.'),
                        "prefix left on {:?}",
                        idea
                    );
                }
            }
        }
    }

    #[test]
    fn test_parse_keeps_unnumbered_and_two_digit_lines() {
        assert_eq!(parse_numbered_list("Single idea"), vec!["Single idea"]);
        assert_eq!(parse_numbered_list("12. Twelve"), vec!["Twelve"]);
        assert_eq!(parse_numbered_list("1990s theme"), vec!["1990s theme"]);
        assert!(parse_numbered_list("\n \n").is_empty());
    }

    #[test]
    fn test_parse_keeps_decimals_in_ideas() {
        assert_eq!(
            parse_numbered_list("1. 3.5 star hotel\n2. 1.5 mile hike\n3. 2. Second"),
            vec!["3.5 star hotel", "1.5 mile hike", "2. Second"]
        );
        assert_eq!(parse_numbered_list("1.5 mile hike"), vec!["1.5 mile hike"]);
        assert_eq!(parse_numbered_list("4.\n5.Tight"), vec!["5.Tight"]);
    }

    #[test]
    fn test_parse_tree_reply_fenced() {
        let reply = "Sure!\n```json\n[{\"name\":\"Venue\",\"children\":[{\"name\":\"Outdoor\"},{\"name\":\"Indoor\"}]}]\n```\nEnjoy.";
        let tree = parse_tree_reply(reply).unwrap();
        assert_eq!(
            tree,
            vec![IdeaNode::branch(
                "Venue",
                vec![IdeaNode::leaf("Outdoor"), IdeaNode::leaf("Indoor")]
            )]
        );
    }

    #[test]
    fn test_parse_tree_reply_raw_and_single() {
        assert_eq!(
            parse_tree_reply(r#"[{"name":"Venue"}]"#).unwrap(),
            vec![IdeaNode::leaf("Venue")]
        );
        assert_eq!(
            parse_tree_reply(r#"{"name":"Venue"}"#).unwrap(),
            vec![IdeaNode::leaf("Venue")]
        );
        assert!(parse_tree_reply("no tree here").is_err());
    }

    #[test]
    fn test_context_string() {
        let context = IdeaContext {
            ancestors: vec!["Plan a wedding".to_string(), "Venue".to_string()],
            current: "Outdoor".to_string(),
            depth: 2,
        };
        assert_eq!(context_string(&context), "Plan a wedding > Venue > Outdoor");
    }

    #[tokio::test]
    async fn test_generate_ideas_parses_and_caps() {
        let client = ScriptedClient::default()
            .with_ideas(vec![Ok("1. A\n2. B\n3. C\n4. D\n5. E".to_string())]);
        let context = IdeaContext {
            ancestors: vec![],
            current: "root".to_string(),
            depth: 0,
        };

        let ideas = generate_ideas(&client, &context).await;
        assert_eq!(ideas, vec!["A", "B", "C", "D"]);

        let requests = client.idea_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].context, "root");
        assert_eq!(requests[0].current_node, "root");
    }

    #[tokio::test]
    async fn test_generate_ideas_falls_back() {
        let client = ScriptedClient::default().with_ideas(vec![
            Err("connection refused".to_string()),
            Ok("\n\n".to_string()),
        ]);
        let context = IdeaContext {
            ancestors: vec!["root".to_string()],
            current: "leaf".to_string(),
            depth: 1,
        };

        assert_eq!(generate_ideas(&client, &context).await, vec![FALLBACK_IDEA]);
        assert_eq!(generate_ideas(&client, &context).await, vec![FALLBACK_IDEA]);
    }
}
