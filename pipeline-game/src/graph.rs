//! Static narrative graph: nodes, their options, and id resolution.
//!
//! The graph is built once through [`GraphBuilder`] and is immutable
//! afterwards. Ids are compared lowercase on both sides so authored ids and
//! routing strings cannot drift apart by case alone.
use rand::RngCore;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::Hasher;
use std::sync::Arc;
use thiserror::Error;
use twox_hash::XxHash64;

use crate::traits::TraitStore;

pub type BodyFn = Arc<dyn Fn(&TraitStore) -> String + Send + Sync>;
pub type EligibilityFn = Arc<dyn Fn(&TraitStore) -> Eligibility + Send + Sync>;
pub type SelectHook = Arc<dyn Fn(&mut TraitStore, &mut dyn RngCore) -> Option<String> + Send + Sync>;
pub type EnterHook = Arc<dyn Fn(&mut TraitStore, &mut dyn RngCore) + Send + Sync>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("node '{0}' does not exist in the graph")]
    NodeNotFound(String),
    #[error("node id '{0}' is declared more than once")]
    DuplicateNode(String),
    #[error("node ids must not be empty (node named '{0}')")]
    EmptyId(String),
}

fn normalize_id(id: &str) -> String {
    id.to_lowercase()
}

/// Result of an option's eligibility predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    /// Player-facing explanation of why the option is closed.
    Ineligible(String),
}

impl Eligibility {
    /// `Eligible` when `condition` holds, otherwise `Ineligible(reason)`.
    pub fn require(condition: bool, reason: impl Into<String>) -> Self {
        if condition {
            Self::Eligible
        } else {
            Self::Ineligible(reason.into())
        }
    }

    #[must_use]
    pub const fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible)
    }

    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Eligible => None,
            Self::Ineligible(reason) => Some(reason.as_str()),
        }
    }
}

/// Node body: fixed text or text computed from the current traits.
#[derive(Clone)]
pub enum Body {
    Static(String),
    Computed(BodyFn),
}

impl Body {
    #[must_use]
    pub fn render(&self, traits: &TraitStore) -> String {
        match self {
            Self::Static(text) => text.clone(),
            Self::Computed(render) => render(traits),
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::Static(String::new())
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(text) => f.debug_tuple("Static").field(text).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// A selectable edge leaving a node.
#[derive(Clone, Default)]
pub struct NodeOption {
    name: String,
    destination: Option<String>,
    dynamic_routes: Vec<String>,
    annotation: Option<String>,
    is_eligible: Option<EligibilityFn>,
    on_select: Option<SelectHook>,
}

impl NodeOption {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Static destination id.
    #[must_use]
    pub fn to(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// Declare ids `on_select` may route to, so graph lints can see them.
    #[must_use]
    pub fn may_route<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dynamic_routes.extend(ids.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn annotate(mut self, text: impl Into<String>) -> Self {
        self.annotation = Some(text.into());
        self
    }

    #[must_use]
    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&TraitStore) -> Eligibility + Send + Sync + 'static,
    {
        self.is_eligible = Some(Arc::new(predicate));
        self
    }

    #[must_use]
    pub fn on_select<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut TraitStore, &mut dyn RngCore) -> Option<String> + Send + Sync + 'static,
    {
        self.on_select = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    #[must_use]
    pub fn annotation(&self) -> Option<&str> {
        self.annotation.as_deref()
    }

    #[must_use]
    pub fn dynamic_routes(&self) -> &[String] {
        &self.dynamic_routes
    }

    #[must_use]
    pub const fn has_select_hook(&self) -> bool {
        self.on_select.is_some()
    }

    /// Evaluate the eligibility predicate; options without one are always open.
    #[must_use]
    pub fn eligibility(&self, traits: &TraitStore) -> Eligibility {
        self.is_eligible
            .as_ref()
            .map_or(Eligibility::Eligible, |predicate| predicate(traits))
    }

    /// Run the selection hook and return the target id.
    ///
    /// The hook's return value overrides the static destination.
    pub fn route(&self, traits: &mut TraitStore, rng: &mut dyn RngCore) -> String {
        let static_target = self.destination.clone().unwrap_or_default();
        match &self.on_select {
            Some(hook) => hook(traits, rng).unwrap_or(static_target),
            None => static_target,
        }
    }

    fn route_candidates(&self) -> impl Iterator<Item = &str> {
        self.destination
            .as_deref()
            .into_iter()
            .chain(self.dynamic_routes.iter().map(String::as_str))
    }
}

impl fmt::Debug for NodeOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeOption")
            .field("name", &self.name)
            .field("destination", &self.destination)
            .field("dynamic_routes", &self.dynamic_routes)
            .field("annotation", &self.annotation)
            .field("gated", &self.is_eligible.is_some())
            .field("on_select", &self.on_select.is_some())
            .finish()
    }
}

/// A single narrative state.
#[derive(Clone, Default)]
pub struct Node {
    id: String,
    name: String,
    body: Body,
    options: Vec<NodeOption>,
    is_terminal_loss: bool,
    is_terminal_win: bool,
    log_to_history: bool,
    on_enter: Option<EnterHook>,
    citations: Vec<String>,
}

impl Node {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn body(mut self, text: impl Into<String>) -> Self {
        self.body = Body::Static(text.into());
        self
    }

    #[must_use]
    pub fn computed_body<F>(mut self, render: F) -> Self
    where
        F: Fn(&TraitStore) -> String + Send + Sync + 'static,
    {
        self.body = Body::Computed(Arc::new(render));
        self
    }

    #[must_use]
    pub fn option(mut self, option: NodeOption) -> Self {
        self.options.push(option);
        self
    }

    #[must_use]
    pub fn loss(mut self) -> Self {
        self.is_terminal_loss = true;
        self
    }

    #[must_use]
    pub fn win(mut self) -> Self {
        self.is_terminal_win = true;
        self
    }

    /// Record this node's name in the history log when the player leaves it.
    #[must_use]
    pub fn logged(mut self) -> Self {
        self.log_to_history = true;
        self
    }

    #[must_use]
    pub fn on_enter<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut TraitStore, &mut dyn RngCore) + Send + Sync + 'static,
    {
        self.on_enter = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn cite(mut self, source: impl Into<String>) -> Self {
        self.citations.push(source.into());
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn body_source(&self) -> &Body {
        &self.body
    }

    #[must_use]
    pub fn render_body(&self, traits: &TraitStore) -> String {
        self.body.render(traits)
    }

    #[must_use]
    pub fn options(&self) -> &[NodeOption] {
        &self.options
    }

    #[must_use]
    pub const fn is_terminal_loss(&self) -> bool {
        self.is_terminal_loss
    }

    #[must_use]
    pub const fn is_terminal_win(&self) -> bool {
        self.is_terminal_win
    }

    #[must_use]
    pub const fn logs_to_history(&self) -> bool {
        self.log_to_history
    }

    /// A node with no options ends the playthrough.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.options.is_empty()
    }

    #[must_use]
    pub fn citations(&self) -> &[String] {
        &self.citations
    }

    /// Run the entry hook, if any.
    pub fn enter(&self, traits: &mut TraitStore, rng: &mut dyn RngCore) {
        if let Some(hook) = &self.on_enter {
            hook(traits, rng);
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("body", &self.body)
            .field("options", &self.options)
            .field("is_terminal_loss", &self.is_terminal_loss)
            .field("is_terminal_win", &self.is_terminal_win)
            .field("log_to_history", &self.log_to_history)
            .field("on_enter", &self.on_enter.is_some())
            .field("citations", &self.citations)
            .finish()
    }
}

/// A static option destination that does not resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingDestination {
    pub node_id: String,
    pub option: String,
    pub destination: String,
}

/// Collects nodes and validates them into a [`NodeGraph`].
#[derive(Debug)]
pub struct GraphBuilder {
    initial: Node,
    nodes: Vec<Node>,
}

impl GraphBuilder {
    #[must_use]
    pub fn node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    #[must_use]
    pub fn nodes<I>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = Node>,
    {
        self.nodes.extend(nodes);
        self
    }

    /// Validate ids and freeze the graph.
    ///
    /// # Errors
    ///
    /// Returns an error when an id is empty or declared twice.
    pub fn build(self) -> Result<NodeGraph, GraphError> {
        let mut nodes = Vec::with_capacity(self.nodes.len() + 1);
        nodes.push(self.initial);
        nodes.extend(self.nodes);

        let mut index = HashMap::with_capacity(nodes.len());
        for (position, node) in nodes.iter().enumerate() {
            let key = normalize_id(&node.id);
            if key.trim().is_empty() {
                return Err(GraphError::EmptyId(node.name.clone()));
            }
            if index.insert(key, position).is_some() {
                return Err(GraphError::DuplicateNode(node.id.clone()));
            }
        }
        log::debug!("node graph built with {} nodes", nodes.len());
        Ok(NodeGraph { nodes, index })
    }
}

/// Immutable directed graph of narrative nodes. The first node is the initial one.
#[derive(Debug)]
pub struct NodeGraph {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
}

impl NodeGraph {
    #[must_use]
    pub fn builder(initial: Node) -> GraphBuilder {
        GraphBuilder {
            initial,
            nodes: Vec::new(),
        }
    }

    /// Look up a node by id, ignoring case and surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::NodeNotFound`] when no node carries the id.
    pub fn resolve(&self, id: &str) -> Result<&Node, GraphError> {
        self.index
            .get(&normalize_id(id))
            .and_then(|position| self.nodes.get(*position))
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(&normalize_id(id))
    }

    #[must_use]
    pub fn initial(&self) -> &Node {
        &self.nodes[0]
    }

    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every declared destination (static or `may_route`) that does not resolve.
    #[must_use]
    pub fn dangling_destinations(&self) -> Vec<DanglingDestination> {
        self.nodes
            .iter()
            .flat_map(|node| {
                node.options.iter().flat_map(move |option| {
                    option
                        .route_candidates()
                        .filter(|target| !self.contains(target))
                        .map(move |target| DanglingDestination {
                            node_id: node.id.clone(),
                            option: option.name.clone(),
                            destination: target.to_string(),
                        })
                })
            })
            .collect()
    }

    /// Ids of nodes no declared route reaches from the initial node.
    ///
    /// Undeclared dynamic routes are invisible here, so treat the result as advisory.
    #[must_use]
    pub fn unreachable_nodes(&self) -> Vec<&str> {
        let mut seen = HashSet::from([0usize]);
        let mut queue = VecDeque::from([0usize]);
        while let Some(position) = queue.pop_front() {
            for target in self.nodes[position]
                .options
                .iter()
                .flat_map(NodeOption::route_candidates)
            {
                if let Some(next) = self.index.get(&normalize_id(target))
                    && seen.insert(*next)
                {
                    queue.push_back(*next);
                }
            }
        }
        self.nodes
            .iter()
            .enumerate()
            .filter(|(position, _)| !seen.contains(position))
            .map(|(_, node)| node.id.as_str())
            .collect()
    }

    /// Stable digest of ids, names, flags, and declared routes.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = XxHash64::with_seed(0);
        for node in &self.nodes {
            hasher.write(node.id.as_bytes());
            hasher.write_u8(0x1F);
            hasher.write(node.name.as_bytes());
            hasher.write_u8(u8::from(node.is_terminal_loss));
            hasher.write_u8(u8::from(node.is_terminal_win));
            hasher.write_u8(u8::from(node.log_to_history));
            for option in &node.options {
                hasher.write(option.name.as_bytes());
                hasher.write_u8(0x1F);
                for target in option.route_candidates() {
                    hasher.write(target.as_bytes());
                    hasher.write_u8(0x1E);
                }
            }
            hasher.write_u8(0x1D);
        }
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn sample_graph() -> NodeGraph {
        NodeGraph::builder(
            Node::new("start", "Start").option(NodeOption::new("Go").to("Mid")),
        )
        .node(
            Node::new("mid", "Mid")
                .logged()
                .option(NodeOption::new("On").to("end"))
                .option(NodeOption::new("Nowhere").to("missing")),
        )
        .node(Node::new("end", "End").win())
        .node(Node::new("island", "Island").loss())
        .build()
        .unwrap()
    }

    #[test]
    fn resolve_normalizes_case() {
        let graph = sample_graph();
        assert_eq!(graph.resolve("MID").unwrap().name(), "Mid");
        assert_eq!(graph.resolve(" end ").unwrap().id(), "end");
        assert_eq!(
            graph.resolve("ghost").unwrap_err(),
            GraphError::NodeNotFound("ghost".to_string())
        );
        assert_eq!(graph.initial().id(), "start");
        assert_eq!(graph.len(), 4);
    }

    #[test]
    fn duplicate_ids_rejected_case_insensitively() {
        let err = NodeGraph::builder(Node::new("a", "A"))
            .node(Node::new("A", "Again"))
            .build()
            .unwrap_err();
        assert_eq!(err, GraphError::DuplicateNode("A".to_string()));

        let err = NodeGraph::builder(Node::new("  ", "Blank")).build().unwrap_err();
        assert_eq!(err, GraphError::EmptyId("Blank".to_string()));

        let graph = NodeGraph::builder(Node::new("a", "A"))
            .node(Node::new(" a", "Padded"))
            .build()
            .unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.resolve(" a").unwrap().name(), "Padded");
        assert!(graph.resolve("a ").is_err());
    }

    #[test]
    fn lint_reports_dangling_and_unreachable() {
        let graph = sample_graph();
        let dangling = graph.dangling_destinations();
        assert_eq!(dangling.len(), 1);
        assert_eq!(dangling[0].node_id, "mid");
        assert_eq!(dangling[0].destination, "missing");
        assert_eq!(graph.unreachable_nodes(), vec!["island"]);
    }

    #[test]
    fn declared_dynamic_routes_count_as_reachable() {
        let graph = NodeGraph::builder(
            Node::new("a", "A").option(
                NodeOption::new("Maybe")
                    .to("b")
                    .may_route(["c"])
                    .on_select(|_, _| Some("c".to_string())),
            ),
        )
        .node(Node::new("b", "B"))
        .node(Node::new("c", "C"))
        .build()
        .unwrap();
        assert!(graph.unreachable_nodes().is_empty());
        assert!(graph.dangling_destinations().is_empty());
    }

    #[test]
    fn route_prefers_hook_result() {
        let mut traits = TraitStore::new();
        let mut rng = SmallRng::seed_from_u64(1);
        let fixed = NodeOption::new("Fixed").to("b");
        assert_eq!(fixed.route(&mut traits, &mut rng), "b");

        let dynamic = NodeOption::new("Dyn").to("b").on_select(|traits, _| {
            traits.add_stat("visits", 1.0);
            Some("c".to_string())
        });
        assert_eq!(dynamic.route(&mut traits, &mut rng), "c");
        assert!(traits.has_stat("visits", 1.0));

        let passthrough = NodeOption::new("Pass").to("b").on_select(|_, _| None);
        assert_eq!(passthrough.route(&mut traits, &mut rng), "b");

        let nowhere = NodeOption::new("Nowhere");
        assert_eq!(nowhere.route(&mut traits, &mut rng), "");
    }

    #[test]
    fn bodies_and_eligibility_read_traits() {
        let mut traits = TraitStore::new();
        traits.set_class("income", Some("low"));
        let node = Node::new("n", "N").computed_body(|traits| {
            format!("Your family is {} income.", traits.get_class("income").unwrap_or("?"))
        });
        assert_eq!(node.render_body(&traits), "Your family is low income.");
        assert!(format!("{node:?}").contains("Computed(..)"));

        let gated = NodeOption::new("Private").when(|traits| {
            Eligibility::require(traits.is_class("income", "high"), "You cannot afford it.")
        });
        assert_eq!(
            gated.eligibility(&traits).reason(),
            Some("You cannot afford it.")
        );
        assert!(NodeOption::new("Open").eligibility(&traits).is_eligible());
    }

    #[test]
    fn fingerprint_tracks_structure() {
        let a = sample_graph().fingerprint();
        assert_eq!(a, sample_graph().fingerprint());
        let changed = NodeGraph::builder(Node::new("start", "Start"))
            .build()
            .unwrap()
            .fingerprint();
        assert_ne!(a, changed);
    }
}
