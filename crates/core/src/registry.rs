//! Tool registry and startup discovery.
//!
//! Discovery walks every [`ToolSource`], validates each candidate (name,
//! description, parameter schema, loadable executor) and either returns a
//! complete registry or fails with **every** problem it found. A registry is
//! immutable once built and can be shared across runs behind an `Arc`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{error, info};

use crate::error::ToolError;
use crate::provider::ToolDefinition;
use crate::schema::ParameterSchema;
use crate::tool::{Tool, ToolDescriptor};

const MAX_NAME_LEN: usize = 64;

/// A candidate that could not be turned into a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    /// What the source was trying to load (module, file, catalog entry)
    pub item: String,
    pub reason: String,
}

/// Anything that can enumerate candidate tools.
pub trait ToolSource: Send + Sync {
    /// Name used in discovery diagnostics.
    fn name(&self) -> &str;

    /// Every candidate, in a stable order.
    fn candidates(&self) -> Vec<Result<Arc<dyn Tool>, SourceError>>;
}

/// An explicit registration list.
pub struct StaticSource {
    name: String,
    items: Vec<Result<Arc<dyn Tool>, SourceError>>,
}

impl StaticSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
        }
    }

    /// Register a tool.
    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.items.push(Ok(Arc::new(tool)));
        self
    }

    /// Register an already shared tool.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        self.items.push(Ok(tool));
        self
    }

    /// Record an entry whose executor could not be produced.
    pub fn with_failure(mut self, item: impl Into<String>, reason: impl Into<String>) -> Self {
        self.items.push(Err(SourceError {
            item: item.into(),
            reason: reason.into(),
        }));
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl ToolSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn candidates(&self) -> Vec<Result<Arc<dyn Tool>, SourceError>> {
        self.items.clone()
    }
}

/// One thing wrong with the discovered tool set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryProblem {
    /// The source could not produce an executor for an entry.
    LoadFailed {
        source: String,
        item: String,
        reason: String,
    },
    InvalidName {
        source: String,
        name: String,
        reason: String,
    },
    MissingDescription {
        source: String,
        name: String,
    },
    InvalidSchema {
        source: String,
        name: String,
        problems: Vec<String>,
    },
    /// The same name was offered more than once (all origins listed).
    DuplicateName {
        name: String,
        sources: Vec<String>,
    },
}

impl fmt::Display for DiscoveryProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoadFailed {
                source,
                item,
                reason,
            } => write!(f, "[{source}] failed to load '{item}': {reason}"),
            Self::InvalidName {
                source,
                name,
                reason,
            } => write!(f, "[{source}] invalid tool name '{name}': {reason}"),
            Self::MissingDescription { source, name } => {
                write!(f, "[{source}] tool '{name}' has an empty description")
            }
            Self::InvalidSchema {
                source,
                name,
                problems,
            } => write!(
                f,
                "[{source}] tool '{name}' has an invalid parameter schema: {}",
                problems.join("; ")
            ),
            Self::DuplicateName { name, sources } => write!(
                f,
                "tool name '{name}' registered {} times (from {})",
                sources.len(),
                sources.join(", ")
            ),
        }
    }
}

/// Discovery failed; carries every problem found in the pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryError {
    pub problems: Vec<DiscoveryProblem>,
}

impl DiscoveryError {
    /// Names involved in duplicate registrations.
    pub fn duplicate_names(&self) -> Vec<&str> {
        self.problems
            .iter()
            .filter_map(|p| match p {
                DiscoveryProblem::DuplicateName { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} problem(s)", self.problems.len())?;
        for problem in &self.problems {
            write!(f, "\n  - {problem}")?;
        }
        Ok(())
    }
}

impl std::error::Error for DiscoveryError {}

fn check_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name is empty".into());
    }
    if name.len() > MAX_NAME_LEN {
        return Err(format!("longer than {MAX_NAME_LEN} characters"));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(format!("contains '{bad}' (allowed: A-Z a-z 0-9 _ -)"));
    }
    Ok(())
}

/// The set of callable tools, in discovery order.
///
/// The agent loop uses this to:
/// 1. Get tool definitions to send to the LLM
/// 2. Look up the descriptor for each tool call the LLM requests
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// A registry with no tools.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validate every candidate from every source and build the registry.
    pub fn discover(sources: &[&dyn ToolSource]) -> Result<Self, DiscoveryError> {
        let mut problems = Vec::new();
        let mut tools: Vec<ToolDescriptor> = Vec::new();
        // name -> every source that offered it, in first-seen order
        let mut origins: Vec<(String, Vec<String>)> = Vec::new();
        let mut origin_index: HashMap<String, usize> = HashMap::new();

        for source in sources {
            let source_name = source.name().to_string();
            info!(source = %source_name, "Scanning tool source");

            for candidate in source.candidates() {
                let tool = match candidate {
                    Ok(tool) => tool,
                    Err(e) => {
                        problems.push(DiscoveryProblem::LoadFailed {
                            source: source_name.clone(),
                            item: e.item,
                            reason: e.reason,
                        });
                        continue;
                    }
                };

                let name = tool.name().to_string();
                if let Err(reason) = check_name(&name) {
                    problems.push(DiscoveryProblem::InvalidName {
                        source: source_name.clone(),
                        name,
                        reason,
                    });
                    continue;
                }

                match origin_index.get(&name) {
                    Some(&i) => {
                        origins[i].1.push(source_name.clone());
                        continue;
                    }
                    None => {
                        origin_index.insert(name.clone(), origins.len());
                        origins.push((name.clone(), vec![source_name.clone()]));
                    }
                }

                let description = tool.description().trim().to_string();
                if description.is_empty() {
                    problems.push(DiscoveryProblem::MissingDescription {
                        source: source_name.clone(),
                        name: name.clone(),
                    });
                }

                match ParameterSchema::parse(&tool.parameters_schema()) {
                    Ok(schema) => {
                        if !description.is_empty() {
                            tools.push(ToolDescriptor::new(
                                name,
                                description,
                                schema,
                                source_name.clone(),
                                tool,
                            ));
                        }
                    }
                    Err(e) => problems.push(DiscoveryProblem::InvalidSchema {
                        source: source_name.clone(),
                        name,
                        problems: e.problems,
                    }),
                }
            }
        }

        for (name, sources) in origins {
            if sources.len() > 1 {
                problems.push(DiscoveryProblem::DuplicateName { name, sources });
            }
        }

        if !problems.is_empty() {
            for problem in &problems {
                error!(%problem, "Tool discovery problem");
            }
            return Err(DiscoveryError { problems });
        }

        let index = tools
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name().to_string(), i))
            .collect();
        for tool in &tools {
            info!(tool = %tool.name(), source = %tool.source(), "Loaded tool");
        }
        info!(count = tools.len(), "Tool discovery complete");

        Ok(Self { tools, index })
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// Get a tool by name, or `ToolError::NotFound`.
    pub fn lookup(&self, name: &str) -> Result<&ToolDescriptor, ToolError> {
        self.get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))
    }

    /// All tools in discovery order.
    pub fn list(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Get all tool definitions (for sending to the LLM), in discovery order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(ToolDescriptor::to_definition).collect()
    }

    /// List all registered tool names, in discovery order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
