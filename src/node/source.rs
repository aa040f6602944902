//! Node sources (panel client side).
//!
//! # Responsibilities
//! - Define the interface the core pulls node descriptors through
//! - Provide a file-backed source for standalone deployments

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::node::descriptor::NodeDescriptor;

/// Errors produced while fetching node descriptors.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

/// Supplies the current node set. Called at start and on each reload.
#[async_trait]
pub trait NodeSource: Send + Sync {
    async fn fetch_nodes(&self) -> Result<Vec<NodeDescriptor>, SourceError>;
}

#[derive(Deserialize)]
struct NodesFile {
    #[serde(default)]
    nodes: Vec<NodeDescriptor>,
}

/// Reads nodes from a TOML or JSON file (`nodes = [...]`).
#[derive(Debug, Clone)]
pub struct FileNodeSource {
    path: PathBuf,
}

impl FileNodeSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse(&self, content: &str) -> Result<Vec<NodeDescriptor>, SourceError> {
        let is_json = self
            .path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let file: NodesFile = if is_json {
            serde_json::from_str(content).map_err(|e| SourceError::Parse(e.to_string()))?
        } else {
            toml::from_str(content).map_err(|e| SourceError::Parse(e.to_string()))?
        };
        Ok(file.nodes)
    }
}

#[async_trait]
impl NodeSource for FileNodeSource {
    async fn fetch_nodes(&self) -> Result<Vec<NodeDescriptor>, SourceError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let nodes = self.parse(&content)?;
        tracing::debug!(path = ?self.path, count = nodes.len(), "Loaded node descriptors");
        Ok(nodes)
    }
}
