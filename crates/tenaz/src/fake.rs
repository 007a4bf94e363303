//! Scriptable in-memory page for testing flows without a browser.
//!
//! [`FakePage`] implements [`PageDriver`] over a plain node list, with
//! mutations that fire at scripted offsets from page creation (new nodes
//! appearing, modals closing, the page being torn down). Combined with
//! `tokio::time::pause`, this makes every wait, retry, and cancellation
//! path deterministic and instant to test.
//!
//! Create instances inside a tokio runtime: scripted mutations are timed
//! against `tokio::time::Instant`.

use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::watch;

use crate::driver::{ElementHandle, InteractionError, InteractionErrorKind, PageDriver};
use crate::locator::Strategy;
use crate::result::{TenazError, TenazResult};
use crate::session::AuthState;

/// One element in the fake DOM
#[derive(Debug, Clone)]
pub struct FakeNode {
    /// Driver-internal id, assigned on insertion
    pub id: String,
    /// Explicit test identifier
    pub test_id: Option<String>,
    /// Accessible role
    pub role: String,
    /// Accessible name
    pub name: String,
    /// Structural class tokens
    pub css: Vec<String>,
    /// Text content
    pub text: String,
    /// Current input value
    pub value: String,
    /// Rendered and laid out
    pub visible: bool,
    /// Accepts input
    pub enabled: bool,
    /// An overlay currently intercepts pointer events
    pub intercepted: bool,
}

impl FakeNode {
    /// Create a visible, enabled node
    #[must_use]
    pub fn new(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            test_id: None,
            role: role.into(),
            name: name.into(),
            css: Vec::new(),
            text: String::new(),
            value: String::new(),
            visible: true,
            enabled: true,
            intercepted: false,
        }
    }

    /// Attach an explicit test identifier
    #[must_use]
    pub fn with_test_id(mut self, id: impl Into<String>) -> Self {
        self.test_id = Some(id.into());
        self
    }

    /// Add a structural class token
    #[must_use]
    pub fn with_css(mut self, class: impl Into<String>) -> Self {
        self.css.push(class.into());
        self
    }

    /// Set text content
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Start hidden
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Start disabled
    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Start covered by an intercepting overlay
    #[must_use]
    pub const fn intercepted(mut self) -> Self {
        self.intercepted = true;
        self
    }

    /// Whether this node matches a strategy, using the same semantics
    /// the fake's queries use
    #[must_use]
    pub fn matches(&self, strategy: &Strategy) -> bool {
        match strategy {
            Strategy::ById(id) => self.test_id.as_deref() == Some(id.as_str()),
            Strategy::ByRole { role, name, exact } => {
                self.role == *role
                    && if *exact {
                        self.name == *name
                    } else {
                        self.name.contains(name.as_str())
                    }
            }
            Strategy::ByText(text) => {
                self.text.contains(text.as_str()) || self.name.contains(text.as_str())
            }
            Strategy::ByStructure(selector) => self.css.iter().any(|c| c == selector),
        }
    }

    fn to_handle(&self) -> ElementHandle {
        ElementHandle {
            id: self.id.clone(),
            role: self.role.clone(),
            name: self.name.clone(),
            text: self.text.clone(),
            visible: self.visible,
            attached: true,
            enabled: self.enabled,
        }
    }
}

/// A scripted change to the fake DOM
#[derive(Debug, Clone)]
pub enum Mutation {
    /// Insert a node
    AddNode(FakeNode),
    /// Remove the node with the given name
    RemoveNode {
        /// Accessible name of the node to remove
        name: String,
    },
    /// Make the named node visible
    ShowNode {
        /// Accessible name
        name: String,
    },
    /// Hide the named node
    HideNode {
        /// Accessible name
        name: String,
    },
    /// Enable the named node
    EnableNode {
        /// Accessible name
        name: String,
    },
    /// Toggle overlay interception on the named node
    SetIntercepted {
        /// Accessible name
        name: String,
        /// New interception state
        intercepted: bool,
    },
    /// Replace the named node's text content
    SetText {
        /// Accessible name
        name: String,
        /// New text
        text: String,
    },
    /// Tear the page down
    ClosePage,
}

/// A recorded click
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickEvent {
    /// Accessible name of the clicked node
    pub target: String,
    /// Whether the forced path performed it
    pub forced: bool,
}

#[derive(Debug)]
struct Scripted {
    after: std::time::Duration,
    mutation: Mutation,
}

#[derive(Debug, Default)]
struct PageState {
    url: String,
    nodes: Vec<FakeNode>,
    scripted: Vec<Scripted>,
    next_id: u32,
    clicks: Vec<ClickEvent>,
    hovered: Vec<String>,
    keys: Vec<String>,
    session: Option<AuthState>,
}

impl PageState {
    fn insert(&mut self, mut node: FakeNode) {
        self.next_id += 1;
        node.id = format!("e{}", self.next_id);
        self.nodes.push(node);
    }

    fn by_name_mut(&mut self, name: &str) -> Option<&mut FakeNode> {
        self.nodes.iter_mut().find(|n| n.name == name)
    }
}

/// In-memory [`PageDriver`] implementation with scripted mutations
pub struct FakePage {
    state: Mutex<PageState>,
    start: tokio::time::Instant,
    closed_tx: watch::Sender<bool>,
}

impl std::fmt::Debug for FakePage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakePage")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Default for FakePage {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePage {
    /// Create an empty page at `about:blank`
    #[must_use]
    pub fn new() -> Self {
        let (closed_tx, _) = watch::channel(false);
        Self {
            state: Mutex::new(PageState {
                url: "about:blank".to_string(),
                ..PageState::default()
            }),
            start: tokio::time::Instant::now(),
            closed_tx,
        }
    }

    /// Add a node before the page is shared (builder form)
    #[must_use]
    pub fn with_node(self, node: FakeNode) -> Self {
        self.state.lock().unwrap().insert(node);
        self
    }

    /// Schedule a mutation to fire `after` the page was created
    pub fn script(&self, after: std::time::Duration, mutation: Mutation) {
        self.state
            .lock()
            .unwrap()
            .scripted
            .push(Scripted { after, mutation });
    }

    /// Insert a node immediately
    pub fn add_node(&self, node: FakeNode) {
        let mut state = self.state.lock().unwrap();
        state.insert(node);
    }

    /// Remove a node by accessible name immediately
    pub fn remove_by_name(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.nodes.retain(|n| n.name != name);
    }

    /// Toggle interception on a node immediately
    pub fn set_intercepted(&self, name: &str, intercepted: bool) {
        let mut state = self.state.lock().unwrap();
        if let Some(node) = state.by_name_mut(name) {
            node.intercepted = intercepted;
        }
    }

    /// Tear the page down, waking every pending wait
    pub fn close(&self) {
        let _ = self.closed_tx.send(true);
    }

    /// Clicks recorded so far
    #[must_use]
    pub fn clicks(&self) -> Vec<ClickEvent> {
        self.state.lock().unwrap().clicks.clone()
    }

    /// Hovered node names recorded so far
    #[must_use]
    pub fn hovered(&self) -> Vec<String> {
        self.state.lock().unwrap().hovered.clone()
    }

    /// Keys pressed so far
    #[must_use]
    pub fn pressed_keys(&self) -> Vec<String> {
        self.state.lock().unwrap().keys.clone()
    }

    /// The session bundle applied through the driver boundary, if any
    #[must_use]
    pub fn applied_session(&self) -> Option<AuthState> {
        self.state.lock().unwrap().session.clone()
    }

    /// Build a handle for the first node with the given name
    #[must_use]
    pub fn handle_by_name(&self, name: &str) -> Option<ElementHandle> {
        let state = self.state.lock().unwrap();
        state
            .nodes
            .iter()
            .find(|n| n.name == name)
            .map(FakeNode::to_handle)
    }

    fn apply_due(&self, state: &mut PageState) {
        let elapsed = self.start.elapsed();
        let due: Vec<Mutation> = {
            let mut due = Vec::new();
            let mut remaining = Vec::new();
            for scripted in state.scripted.drain(..) {
                if scripted.after <= elapsed {
                    due.push(scripted.mutation);
                } else {
                    remaining.push(scripted);
                }
            }
            state.scripted = remaining;
            due
        };

        for mutation in due {
            match mutation {
                Mutation::AddNode(node) => state.insert(node),
                Mutation::RemoveNode { name } => state.nodes.retain(|n| n.name != name),
                Mutation::ShowNode { name } => {
                    if let Some(node) = state.by_name_mut(&name) {
                        node.visible = true;
                    }
                }
                Mutation::HideNode { name } => {
                    if let Some(node) = state.by_name_mut(&name) {
                        node.visible = false;
                    }
                }
                Mutation::EnableNode { name } => {
                    if let Some(node) = state.by_name_mut(&name) {
                        node.enabled = true;
                    }
                }
                Mutation::SetIntercepted { name, intercepted } => {
                    if let Some(node) = state.by_name_mut(&name) {
                        node.intercepted = intercepted;
                    }
                }
                Mutation::SetText { name, text } => {
                    if let Some(node) = state.by_name_mut(&name) {
                        node.text = text;
                    }
                }
                Mutation::ClosePage => {
                    let _ = self.closed_tx.send(true);
                }
            }
        }
    }

    fn interaction_target<'a>(
        state: &'a mut PageState,
        handle: &ElementHandle,
    ) -> Result<&'a mut FakeNode, InteractionError> {
        state
            .nodes
            .iter_mut()
            .find(|n| n.id == handle.id)
            .ok_or_else(|| InteractionError::detached(&handle.name))
    }

    fn closed_interaction() -> InteractionError {
        InteractionError::new(InteractionErrorKind::Other, "page closed")
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn navigate(&self, url: &str) -> TenazResult<()> {
        if self.is_closed() {
            return Err(TenazError::Cancelled {
                during: format!("navigate to {url}"),
            });
        }
        let mut state = self.state.lock().unwrap();
        self.apply_due(&mut state);
        state.url = url.to_string();
        Ok(())
    }

    async fn current_url(&self) -> TenazResult<String> {
        if self.is_closed() {
            return Err(TenazError::Cancelled {
                during: "read url".to_string(),
            });
        }
        let mut state = self.state.lock().unwrap();
        self.apply_due(&mut state);
        Ok(state.url.clone())
    }

    async fn query(&self, strategy: &Strategy) -> TenazResult<Vec<ElementHandle>> {
        let mut state = self.state.lock().unwrap();
        self.apply_due(&mut state);
        if self.is_closed() {
            return Err(TenazError::Cancelled {
                during: format!("query {strategy}"),
            });
        }
        Ok(state
            .nodes
            .iter()
            .filter(|n| n.matches(strategy))
            .map(FakeNode::to_handle)
            .collect())
    }

    async fn click(&self, target: &ElementHandle, force: bool) -> Result<(), InteractionError> {
        if self.is_closed() {
            return Err(Self::closed_interaction());
        }
        let mut state = self.state.lock().unwrap();
        self.apply_due(&mut state);
        let name = {
            let node = Self::interaction_target(&mut state, target)?;
            if !node.enabled {
                return Err(InteractionError::disabled(&node.name));
            }
            if node.intercepted && !force {
                return Err(InteractionError::intercepted("overlay"));
            }
            node.name.clone()
        };
        state.clicks.push(ClickEvent {
            target: name,
            forced: force,
        });
        Ok(())
    }

    async fn fill(
        &self,
        target: &ElementHandle,
        text: &str,
        force: bool,
    ) -> Result<(), InteractionError> {
        if self.is_closed() {
            return Err(Self::closed_interaction());
        }
        let mut state = self.state.lock().unwrap();
        self.apply_due(&mut state);
        let node = Self::interaction_target(&mut state, target)?;
        if !node.enabled {
            return Err(InteractionError::disabled(&node.name));
        }
        if node.intercepted && !force {
            return Err(InteractionError::intercepted("overlay"));
        }
        node.value = text.to_string();
        Ok(())
    }

    async fn hover(&self, target: &ElementHandle, force: bool) -> Result<(), InteractionError> {
        if self.is_closed() {
            return Err(Self::closed_interaction());
        }
        let mut state = self.state.lock().unwrap();
        self.apply_due(&mut state);
        let name = {
            let node = Self::interaction_target(&mut state, target)?;
            if node.intercepted && !force {
                return Err(InteractionError::intercepted("overlay"));
            }
            node.name.clone()
        };
        state.hovered.push(name);
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<(), InteractionError> {
        if self.is_closed() {
            return Err(Self::closed_interaction());
        }
        let mut state = self.state.lock().unwrap();
        self.apply_due(&mut state);
        state.keys.push(key.to_string());
        Ok(())
    }

    async fn read_value(&self, target: &ElementHandle) -> TenazResult<String> {
        let mut state = self.state.lock().unwrap();
        self.apply_due(&mut state);
        state
            .nodes
            .iter()
            .find(|n| n.id == target.id)
            .map(|n| n.value.clone())
            .ok_or_else(|| TenazError::NotFound {
                intent: target.name.clone(),
                tried: "live re-query".to_string(),
            })
    }

    async fn apply_session(&self, auth: &AuthState) -> TenazResult<()> {
        let mut state = self.state.lock().unwrap();
        state.session = Some(auth.clone());
        Ok(())
    }

    async fn screenshot(&self) -> TenazResult<Vec<u8>> {
        if self.is_closed() {
            return Err(TenazError::Cancelled {
                during: "screenshot".to_string(),
            });
        }
        // PNG magic plus a stub payload; enough for artifact plumbing.
        Ok(vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00])
    }

    fn is_closed(&self) -> bool {
        *self.closed_tx.borrow()
    }

    fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed_tx.subscribe()
    }
}
