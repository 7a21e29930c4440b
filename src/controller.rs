//! Tree expansion controller
//!
//! [`Core`] owns every planted tree and per-node conversation. State transitions
//! happen under a mutex; network calls happen between locked sections, so a slow
//! provider never blocks other trees.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::api::client::Client;
use crate::ideas::generate_ideas;
use crate::models::{
    ChatRequest, IdeaContext, NodeId, Toggle, Tree, TreeError, TreeId, VisibleNode,
};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::session::{
    request_image, request_reply, request_speech, Conversation, SessionError, TurnOptions,
};

/// What a toggle did to the tree
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToggleAction {
    Collapsed,
    /// Cached children revealed
    Expanded,
    /// Children generated and revealed
    Generated,
    /// A generation for the node was already running
    Ignored,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleOutcome {
    pub action: ToggleAction,
    /// Nodes created by this toggle
    pub added: Vec<NodeId>,
    pub tree: VisibleNode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TreeSummary {
    pub id: TreeId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlantedTree {
    pub id: TreeId,
    pub tree: VisibleNode,
}

#[derive(Default)]
struct Workspace {
    trees: BTreeMap<TreeId, Tree>,
    sessions: HashMap<(TreeId, NodeId), Conversation>,
    next_id: u32,
}

impl Workspace {
    fn tree(&self, id: TreeId) -> Result<&Tree, TreeError> {
        self.trees.get(&id).ok_or(TreeError::TreeNotFound(id))
    }

    fn tree_mut(&mut self, id: TreeId) -> Result<&mut Tree, TreeError> {
        self.trees.get_mut(&id).ok_or(TreeError::TreeNotFound(id))
    }

    /// Returns the node's conversation, starting one if needed
    fn session(&mut self, id: TreeId, node: NodeId) -> Result<&mut Conversation, TreeError> {
        let tree = self.tree(id)?;
        let name = tree
            .get(node)
            .ok_or(TreeError::NodeNotFound(node))?
            .name()
            .to_string();
        Ok(self
            .sessions
            .entry((id, node))
            .or_insert_with(|| Conversation::new(name)))
    }
}

#[derive(Clone)]
pub struct Core {
    inner: Arc<Mutex<Workspace>>,
    client: Arc<dyn Client>,
    update_tx: Arc<tokio::sync::broadcast::Sender<TreeId>>,
    retry: RetryPolicy,
    turn: TurnOptions,
}

impl Core {
    pub fn new(client: Arc<dyn Client>) -> Self {
        // Create a broadcast channel with capacity for 100 messages
        let (tx, _rx) = tokio::sync::broadcast::channel(100);

        Self {
            inner: Arc::new(Mutex::new(Workspace::default())),
            client,
            update_tx: Arc::new(tx),
            retry: RetryPolicy::TREE_FETCH,
            turn: TurnOptions::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_turn_options(mut self, turn: TurnOptions) -> Self {
        self.turn = turn;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Workspace> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn notify(&self, id: TreeId) {
        let _ = self.update_tx.send(id);
    }

    // Subscribe to state updates
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<TreeId> {
        self.update_tx.subscribe()
    }

    pub fn list_trees(&self) -> Vec<TreeSummary> {
        let workspace = self.lock();
        workspace
            .trees
            .iter()
            .map(|(id, tree)| TreeSummary {
                id: *id,
                name: tree
                    .get(tree.root())
                    .map(|root| root.name().to_string())
                    .unwrap_or_default(),
            })
            .collect()
    }

    /// Stores a tree in its initial display state and returns its id
    pub fn insert_tree(&self, tree: Tree) -> TreeId {
        let id = {
            let mut workspace = self.lock();
            let id = TreeId::new(workspace.next_id);
            workspace.next_id += 1;
            workspace.trees.insert(id, tree.add_expanded_state());
            id
        };
        self.notify(id);
        id
    }

    /// Fetches a tree for `prompt` (with retries) and plants it
    pub async fn plant(&self, prompt: &str) -> Result<PlantedTree, TreeError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(TreeError::Generation("Prompt is required".to_string()));
        }

        let client = self.client.clone();
        let branches = retry_with_backoff(self.retry, |attempt| {
            tracing::debug!(attempt, "Fetching tree");
            client.generate_tree(prompt)
        })
        .await
        .map_err(|e| TreeError::Generation(e.to_string()))?;

        let id = self.insert_tree(Tree::from_ideas(prompt, branches));
        tracing::info!(tree = %id, "Planted tree for prompt {:?}", prompt);

        Ok(PlantedTree {
            id,
            tree: self.visible(id)?,
        })
    }

    pub fn visible(&self, id: TreeId) -> Result<VisibleNode, TreeError> {
        Ok(self.lock().tree(id)?.visible())
    }

    pub fn ancestors(&self, id: TreeId, node: NodeId) -> Result<Vec<String>, TreeError> {
        let workspace = self.lock();
        let tree = workspace.tree(id)?;
        tree.get(node).ok_or(TreeError::NodeNotFound(node))?;
        Ok(tree.ancestor_names(node))
    }

    /// Toggles a node, generating its children on first expansion.
    ///
    /// While a generation is in flight further toggles of that node are ignored.
    pub async fn toggle(&self, id: TreeId, node: NodeId) -> Result<ToggleOutcome, TreeError> {
        let toggle = self.lock().tree_mut(id)?.begin_toggle(node)?;

        let (action, added) = match toggle {
            Toggle::Collapsed => (ToggleAction::Collapsed, Vec::new()),
            Toggle::Expanded => (ToggleAction::Expanded, Vec::new()),
            Toggle::InFlight => (ToggleAction::Ignored, Vec::new()),
            Toggle::NeedsIdeas(context) => {
                // Runs detached so a dropped caller cannot leave the node Expanding
                let core = self.clone();
                let added = tokio::spawn(async move { core.expand(id, node, context).await })
                    .await
                    .map_err(|e| TreeError::Generation(e.to_string()))??;
                (ToggleAction::Generated, added)
            }
        };

        // A generated expansion notifies from its own task
        if matches!(action, ToggleAction::Collapsed | ToggleAction::Expanded) {
            self.notify(id);
        }

        Ok(ToggleOutcome {
            action,
            added,
            tree: self.visible(id)?,
        })
    }

    async fn expand(
        &self,
        id: TreeId,
        node: NodeId,
        context: IdeaContext,
    ) -> Result<Vec<NodeId>, TreeError> {
        let ideas = generate_ideas(self.client.as_ref(), &context).await;
        let added = self
            .lock()
            .tree_mut(id)?
            .complete_expansion(node, ideas)?;
        tracing::info!(tree = %id, node = %node, added = added.len(), "Expanded node");
        self.notify(id);
        Ok(added)
    }

    /// Returns the node's conversation, starting it with a greeting if needed
    pub fn open_session(&self, id: TreeId, node: NodeId) -> Result<Conversation, TreeError> {
        Ok(self.lock().session(id, node)?.clone())
    }

    /// Latest speech clip of the node's conversation
    pub fn session_audio(&self, id: TreeId, node: NodeId) -> Option<Vec<u8>> {
        let workspace = self.lock();
        workspace
            .sessions
            .get(&(id, node))
            .and_then(|session| session.last_audio().map(<[u8]>::to_vec))
    }

    fn update_session<F>(&self, id: TreeId, node: NodeId, f: F) -> Result<Conversation, TreeError>
    where
        F: FnOnce(&mut Conversation),
    {
        let snapshot = {
            let mut workspace = self.lock();
            let session = workspace.session(id, node)?;
            f(session);
            session.clone()
        };
        self.notify(id);
        Ok(snapshot)
    }

    /// Runs one conversation turn for a node: chat, then speech, then image.
    ///
    /// Rejects the message while a previous turn for the same node is still running.
    /// Once accepted, the turn runs to completion even if the caller goes away.
    pub async fn send_message(
        &self,
        id: TreeId,
        node: NodeId,
        text: &str,
    ) -> Result<Conversation, SessionError> {
        let request = self.lock().session(id, node)?.begin_turn(text)?;
        self.notify(id);

        let core = self.clone();
        tokio::spawn(async move { core.finish_turn(id, node, request).await })
            .await
            .map_err(|e| SessionError::Interrupted(e.to_string()))?
            .map_err(SessionError::from)
    }

    async fn finish_turn(
        &self,
        id: TreeId,
        node: NodeId,
        request: ChatRequest,
    ) -> Result<Conversation, TreeError> {
        let reply = request_reply(self.client.as_ref(), &request).await;
        let snapshot = self.update_session(id, node, |s| s.apply_reply(reply.clone()))?;

        let Some(reply_text) = reply else {
            return self.update_session(id, node, Conversation::end_turn);
        };

        let audio = if self.turn.speak {
            request_speech(self.client.as_ref(), &reply_text).await
        } else {
            None
        };
        let image_request = snapshot.image_request(&request.message, &reply_text);
        let image = request_image(self.client.as_ref(), &image_request, self.turn.poll).await;

        self.update_session(id, node, |s| {
            s.apply_audio(audio);
            s.apply_image(image);
            s.end_turn();
        })
    }
}
