//! Session: a lifetime scope owning agents and shared tool registries.
//!
//! A [`Session`] is bulk-teardown plumbing: agents and registries
//! created inside it live exactly as long as the session, and closing
//! (or dropping) it releases them in reverse-creation order. Nothing in
//! the session is persisted — per-agent conversation buffers are plain
//! values owned here, so a session that goes away takes every buffer
//! with it.
//!
//! Agents are addressed by [`AgentId`] handles rather than references so
//! the session can own them while callers still run them:
//!
//! ```rust,no_run
//! # use agentry::{Agent, Llm, LlmConfig, Session};
//! # use std::sync::Arc;
//! # async fn demo() -> agentry::Result<()> {
//! let llm = Arc::new(Llm::new(
//!     LlmConfig::builder().provider("anthropic").build()?,
//! )?);
//!
//! let mut session = Session::open();
//! let researcher = session.create_agent(
//!     Agent::builder().name("researcher").llm(llm),
//! )?;
//!
//! let result = session.run(researcher, "What is a monad?").await?;
//! println!("{}", result.content);
//! session.close();
//! # Ok(())
//! # }
//! ```

use crate::agent::{Agent, AgentBuilder, AgentResult};
use crate::tools::ToolRegistry;
use crate::{Error, Result};
use std::sync::Arc;
use tracing::debug;

/// Handle to an agent owned by a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AgentId(usize);

/// Scoped owner of agents and tool registries.
#[derive(Default)]
pub struct Session {
    registries: Vec<Arc<ToolRegistry>>,
    agents: Vec<Agent>,
}

impl Session {
    /// Open a new, empty session.
    pub fn open() -> Self {
        Self::default()
    }

    /// Take ownership of a registry and return the shared handle agents
    /// are built with.
    pub fn register_tools(&mut self, registry: ToolRegistry) -> Arc<ToolRegistry> {
        let registry = Arc::new(registry);
        self.registries.push(registry.clone());
        registry
    }

    /// Build an agent inside this session.
    pub fn create_agent(&mut self, builder: AgentBuilder) -> Result<AgentId> {
        let agent = builder.build()?;
        debug!(agent = agent.name(), "agent created in session");
        self.agents.push(agent);
        Ok(AgentId(self.agents.len() - 1))
    }

    /// Number of agents owned by this session.
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Borrow an agent.
    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(id.0)
    }

    /// Mutably borrow an agent (needed for [`Agent::run`]).
    pub fn agent_mut(&mut self, id: AgentId) -> Option<&mut Agent> {
        self.agents.get_mut(id.0)
    }

    /// Run an agent by handle.
    pub async fn run(&mut self, id: AgentId, input: &str) -> Result<AgentResult> {
        let agent = self
            .agents
            .get_mut(id.0)
            .ok_or_else(|| Error::invalid_arg("no such agent in session"))?;
        agent.run(input).await
    }

    /// Close the session, releasing everything it owns.
    ///
    /// Equivalent to dropping, made explicit for call sites that want
    /// the teardown point visible.
    pub fn close(self) {}
}

impl Drop for Session {
    fn drop(&mut self) {
        // Reverse-creation order: agents first (they reference the
        // registries), newest first.
        while self.agents.pop().is_some() {}
        while self.registries.pop().is_some() {}
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("agents", &self.agents.len())
            .field("registries", &self.registries.len())
            .finish()
    }
}
