//! Core models for the heartree library
//!
//! This module contains the idea tree arena, its visibility projection, and the
//! conversation/wire types shared by the server and the clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a node inside a [`Tree`] arena
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the arena index of this node.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a planted tree held by [`crate::Core`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct TreeId(u32);

impl TreeId {
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the inner value of the id.
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for TreeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node as returned by the tree generation endpoint, nested to any depth
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdeaNode {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<IdeaNode>>,
}

impl IdeaNode {
    pub fn leaf(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: None,
        }
    }

    pub fn branch(name: impl Into<String>, children: Vec<IdeaNode>) -> Self {
        Self {
            name: name.into(),
            children: Some(children),
        }
    }
}

/// Expansion state of a node
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Collapsed,
    /// Children are being generated; further toggles are ignored
    Expanding,
    Expanded,
}

/// A node in the idea tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    id: NodeId,
    name: String,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    state: NodeState,
}

impl Node {
    fn new(id: NodeId, name: String) -> Self {
        Self {
            id,
            name,
            children: Vec::new(),
            parent: None,
            state: NodeState::Collapsed,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Parent as of the last [`Tree::attach_parents`] pass
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn is_expanded(&self) -> bool {
        self.state == NodeState::Expanded
    }
}

/// What a toggle request resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Toggle {
    Collapsed,
    /// Cached children were revealed without a fetch
    Expanded,
    /// The node has no children yet; ideas must be generated and handed to
    /// [`Tree::complete_expansion`]
    NeedsIdeas(IdeaContext),
    /// A generation for this node is already in flight
    InFlight,
}

/// Everything the idea generator needs to know about a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdeaContext {
    pub ancestors: Vec<String>,
    pub current: String,
    pub depth: usize,
}

/// Errors raised by tree operations
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("Tree '{0}' not found")]
    TreeNotFound(TreeId),

    #[error("Node '{0}' not found")]
    NodeNotFound(NodeId),

    #[error("Node '{0}' is not waiting for ideas")]
    NotExpanding(NodeId),

    #[error("Tree generation failed: {0}")]
    Generation(String),
}

/// Arena-backed idea tree. The root always lives at index 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// Creates a tree holding only a root node
    pub fn new(root_name: impl Into<String>) -> Self {
        Self {
            nodes: vec![Node::new(NodeId(0), root_name.into())],
        }
    }

    /// Builds a tree from the generation endpoint's branches, with `prompt` as the root.
    /// Parents are attached before returning.
    pub fn from_ideas(prompt: impl Into<String>, branches: Vec<IdeaNode>) -> Self {
        fn insert(tree: &mut Tree, parent: NodeId, idea: IdeaNode) {
            let id = tree.push_child(parent, idea.name);
            for child in idea.children.unwrap_or_default() {
                insert(tree, id, child);
            }
        }

        let mut tree = Tree::new(prompt);
        let root = tree.root();
        for branch in branches {
            insert(&mut tree, root, branch);
        }
        tree.attach_parents();
        tree
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut Node, TreeError> {
        self.nodes.get_mut(id.0).ok_or(TreeError::NodeNotFound(id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Appends a collapsed child to `parent` and returns its id.
    ///
    /// Only the owning direction is recorded; call [`Tree::attach_parents`]
    /// before querying ancestors.
    pub fn push_child(&mut self, parent: NodeId, name: impl Into<String>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(id, name.into()));
        if let Some(node) = self.nodes.get_mut(parent.0) {
            node.children.push(id);
        }
        id
    }

    /// Recomputes every parent pointer from the children lists, starting at the root
    pub fn attach_parents(&mut self) {
        fn visit(nodes: &mut [Node], id: NodeId) {
            let children = nodes[id.0].children.clone();
            for child in children {
                nodes[child.0].parent = Some(id);
                visit(nodes, child);
            }
        }

        let root = self.root();
        if let Some(node) = self.nodes.get_mut(root.0) {
            node.parent = None;
            visit(&mut self.nodes, root);
        }
    }

    /// Returns the ancestors of `id`, root-most first, excluding `id` itself.
    ///
    /// The walk stops at the first node without a parent, so a node that has not
    /// been attached yields an empty list.
    pub fn find_ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut ancestors = Vec::new();
        let mut current = self.get(id).and_then(Node::parent);
        while let Some(parent) = current {
            // a stale pointer can form a cycle; never walk more nodes than exist
            if ancestors.len() >= self.nodes.len() {
                break;
            }
            ancestors.push(parent);
            current = self.get(parent).and_then(Node::parent);
        }
        ancestors.reverse();
        ancestors
    }

    /// Ancestor names of `id`, root-most first
    pub fn ancestor_names(&self, id: NodeId) -> Vec<String> {
        self.find_ancestors(id)
            .into_iter()
            .filter_map(|ancestor| self.get(ancestor).map(|n| n.name.clone()))
            .collect()
    }

    pub fn depth(&self, id: NodeId) -> usize {
        self.find_ancestors(id).len()
    }

    /// Copy of this tree in its initial display state: root expanded, everything else collapsed
    pub fn add_expanded_state(&self) -> Tree {
        let mut tree = self.clone();
        let root = tree.root();
        for node in &mut tree.nodes {
            node.state = if node.id == root {
                NodeState::Expanded
            } else {
                NodeState::Collapsed
            };
        }
        tree
    }

    /// Projection of the whole tree for rendering
    pub fn visible(&self) -> VisibleNode {
        self.visible_from(self.root())
            .unwrap_or_else(|| VisibleNode::empty(self.root()))
    }

    /// Projection of the subtree under `id`; children of non-expanded nodes are omitted
    pub fn visible_from(&self, id: NodeId) -> Option<VisibleNode> {
        let node = self.get(id)?;
        let children = if node.is_expanded() {
            Some(
                node.children
                    .iter()
                    .filter_map(|&child| self.visible_from(child))
                    .collect(),
            )
        } else {
            None
        };

        Some(VisibleNode {
            id: node.id,
            name: node.name.clone(),
            state: node.state,
            children,
        })
    }

    /// Starts a toggle of `id`.
    ///
    /// Collapses an expanded node, reveals cached children, or moves a childless node
    /// into `Expanding` and returns the context needed to generate its ideas.
    pub fn begin_toggle(&mut self, id: NodeId) -> Result<Toggle, TreeError> {
        let context = IdeaContext {
            ancestors: self.ancestor_names(id),
            current: self.get(id).ok_or(TreeError::NodeNotFound(id))?.name.clone(),
            depth: self.depth(id),
        };

        let node = self.get_mut(id)?;
        let toggle = match node.state {
            NodeState::Expanding => Toggle::InFlight,
            NodeState::Expanded => {
                node.state = NodeState::Collapsed;
                Toggle::Collapsed
            }
            NodeState::Collapsed if !node.children.is_empty() => {
                node.state = NodeState::Expanded;
                Toggle::Expanded
            }
            NodeState::Collapsed => {
                node.state = NodeState::Expanding;
                Toggle::NeedsIdeas(context)
            }
        };

        Ok(toggle)
    }

    /// Attaches generated ideas as collapsed children of an expanding node and expands it
    pub fn complete_expansion(
        &mut self,
        id: NodeId,
        ideas: Vec<String>,
    ) -> Result<Vec<NodeId>, TreeError> {
        if self.get_mut(id)?.state != NodeState::Expanding {
            return Err(TreeError::NotExpanding(id));
        }

        let children: Vec<NodeId> = ideas
            .into_iter()
            .map(|idea| self.push_child(id, idea))
            .collect();
        self.get_mut(id)?.state = NodeState::Expanded;
        self.attach_parents();

        Ok(children)
    }
}

/// Render-ready projection of a node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VisibleNode {
    pub id: NodeId,
    pub name: String,
    pub state: NodeState,
    /// Present only when the node is expanded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<VisibleNode>>,
}

impl VisibleNode {
    fn empty(id: NodeId) -> Self {
        Self {
            id,
            name: String::new(),
            state: NodeState::Collapsed,
            children: None,
        }
    }

    /// Number of nodes in this projection, including itself
    pub fn count(&self) -> usize {
        1 + self
            .children
            .iter()
            .flatten()
            .map(VisibleNode::count)
            .sum::<usize>()
    }
}

/// Author of a chat message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

/// One entry in a conversation transcript
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub text: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    /// Set on the typing placeholder until the reply arrives
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub pending: bool,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(text, Sender::User)
    }

    pub fn ai(text: impl Into<String>) -> Self {
        Self::new(text, Sender::Ai)
    }

    fn new(text: impl Into<String>, sender: Sender) -> Self {
        Self {
            text: text.into(),
            sender,
            timestamp: Utc::now(),
            pending: false,
        }
    }

    pub fn typing() -> Self {
        Self {
            pending: true,
            ..Self::ai("...")
        }
    }
}

/// Request body of the idea generation endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IdeaRequest {
    pub context: String,
    pub current_node: String,
    pub depth: usize,
}

/// Response body of the idea generation endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdeaResponse {
    pub text: String,
}

/// Request body of the tree generation endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeRequest {
    pub prompt: String,
}

/// A transcript entry as sent to the chat endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub text: String,
    pub sender: String,
}

impl From<&Message> for HistoryEntry {
    fn from(message: &Message) -> Self {
        let sender = match message.sender {
            Sender::User => "user",
            Sender::Ai => "ai",
        };
        Self {
            text: message.text.clone(),
            sender: sender.to_string(),
        }
    }
}

/// Request body of the chat endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    pub context: String,
    #[serde(default)]
    pub message_history: Vec<HistoryEntry>,
}

/// Response body of the chat endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

/// Request body of the image generation endpoint. The first non-blank of
/// `prompt`, `response`, `message` is used as the image subject.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl ImageRequest {
    pub fn subject(&self) -> Option<&str> {
        [&self.prompt, &self.response, &self.message]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
    }
}

/// Handle of a submitted image job; `request_id` is the poll URL
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageJob {
    pub request_id: String,
}

/// Body returned when polling an image job
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<PollResult>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PollResponse {
    pub const PENDING: &'static str = "Pending";
    pub const READY: &'static str = "Ready";

    pub fn pending() -> Self {
        Self {
            status: Self::PENDING.to_string(),
            result: None,
        }
    }

    pub fn ready(sample: impl Into<String>) -> Self {
        Self {
            status: Self::READY.to_string(),
            result: Some(PollResult {
                sample: Some(sample.into()),
                error: None,
            }),
        }
    }

    /// Interprets the body: `Pending` keeps polling, a sample resolves the job,
    /// any other status is a failure.
    pub fn into_status(self) -> crate::retry::PollStatus<String> {
        use crate::retry::PollStatus;

        if self.status == Self::PENDING {
            return PollStatus::Pending;
        }
        let result = self.result.unwrap_or_default();
        match result.sample {
            Some(sample) => PollStatus::Ready(sample),
            None => PollStatus::Failed(
                result
                    .error
                    .unwrap_or_else(|| format!("job finished with status '{}'", self.status)),
            ),
        }
    }
}

/// Request body of the text-to-speech endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechRequest {
    pub text: String,
}
