//! External fetch pipeline.
//!
//! Two sequential outbound GETs (topology, then hardware), each wrapped
//! in a resource-budget check, a consensus-sanitizing response transform,
//! an explicit status check, and a strict JSON parse. The second call
//! needs nothing from the first; sequencing exists only because both
//! populate the same snapshot.
//!
//! Responses are parsed as a tagged-variant document tree
//! ([`serde_json::Value`]) with explicit, fallible field lookups; no
//! field's presence or type is assumed. Parse failure is a hard failure:
//! no statistics are ever derived from a partially parsed document.
//!
//! There is no retry and no cancellation: a failed refresh is simply
//! re-requested by a caller later.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::generation::Generation;

/// `subnet id -> node ids`, as parsed from the topology endpoint.
pub type TopologyDataset = BTreeMap<String, Vec<String>>;

/// `node id -> generation`, as parsed from the hardware endpoint. May be
/// incomplete; missing entries resolve through the fallback policy.
pub type HardwareDataset = HashMap<String, Generation>;

/// Fetch pipeline errors, mirroring the service error taxonomy.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum FetchError {
    /// The declared resource budget is below the floor required for an
    /// outbound call.
    #[error("insufficient resource budget: {available} available, {required} required")]
    InsufficientBudget {
        /// Budget currently available.
        available: u64,
        /// Floor required per call.
        required: u64,
    },

    /// The transport failed before a status was obtained.
    #[error("transport failure for {url}: {message}")]
    Transport {
        /// Request URL.
        url: String,
        /// Transport-level description.
        message: String,
    },

    /// The endpoint answered with a non-success status.
    #[error("unexpected status {status} from {url}")]
    BadStatus {
        /// Request URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The response body was not valid UTF-8 or not valid JSON.
    #[error("failed to decode response body from {url}: {message}")]
    BodyDecode {
        /// Request URL.
        url: String,
        /// Decoder description.
        message: String,
    },

    /// The document decoded but does not have the expected shape.
    #[error("malformed document: {context}")]
    MalformedDocument {
        /// What was being looked up when the shape diverged.
        context: String,
    },
}

/// A raw response as produced by the transport, before sanitization.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers as received.
    pub headers: Vec<(String, String)>,
    /// Response body bytes.
    pub body: Vec<u8>,
}

/// A response after the consensus-sanitizing transform: status and body
/// only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body bytes.
    pub body: Vec<u8>,
}

/// The consensus-sanitizing transform.
///
/// Strips headers and every other volatile field so that independent
/// executions of the same call converge on byte-identical input. Pure and
/// deterministic.
#[must_use]
pub fn sanitize(raw: RawResponse) -> SanitizedResponse {
    SanitizedResponse {
        status: raw.status,
        body: raw.body,
    }
}

/// Transport seam for the pipeline; production uses a reqwest-backed
/// implementation, tests use [`ScriptedBackend`].
#[async_trait]
pub trait HttpBackend: Send + Sync {
    /// Issues a GET and returns the raw response.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Transport`] when no response was obtained.
    async fn get(&self, url: &str) -> Result<RawResponse, FetchError>;

    /// Backend name for logging.
    fn name(&self) -> &'static str;
}

/// Declared resource budget gating outbound calls.
///
/// The pipeline declines to issue a call when the available budget is
/// below the per-call floor; this is surfaced verbatim as
/// [`FetchError::InsufficientBudget`] and aborts the operation with no
/// state change.
#[derive(Debug, Clone, Copy)]
pub struct ResourceBudget {
    available: u64,
    floor: u64,
}

impl ResourceBudget {
    /// Creates a budget with the given availability and per-call floor.
    #[must_use]
    pub const fn new(available: u64, floor: u64) -> Self {
        Self { available, floor }
    }

    /// Checks that one outbound call is affordable.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InsufficientBudget`] when it is not.
    pub const fn ensure_call(&self) -> Result<(), FetchError> {
        if self.available < self.floor {
            return Err(FetchError::InsufficientBudget {
                available: self.available,
                required: self.floor,
            });
        }
        Ok(())
    }
}

/// The two-step fetch pipeline.
pub struct FetchPipeline {
    backend: std::sync::Arc<dyn HttpBackend>,
    topology_url: String,
    hardware_url: String,
    budget: ResourceBudget,
}

impl FetchPipeline {
    /// Creates a pipeline over the given backend and endpoints.
    #[must_use]
    pub fn new(
        backend: std::sync::Arc<dyn HttpBackend>,
        topology_url: impl Into<String>,
        hardware_url: impl Into<String>,
        budget: ResourceBudget,
    ) -> Self {
        Self {
            backend,
            topology_url: topology_url.into(),
            hardware_url: hardware_url.into(),
            budget,
        }
    }

    /// Fetches both datasets in sequence, returning on the first failure.
    ///
    /// # Errors
    ///
    /// Propagates the first [`FetchError`] from either step.
    pub async fn fetch_all(&self) -> Result<(TopologyDataset, HardwareDataset), FetchError> {
        let topology = self.fetch_topology().await?;
        let hardware = self.fetch_hardware().await?;
        Ok((topology, hardware))
    }

    /// Fetches and parses the topology dataset.
    ///
    /// # Errors
    ///
    /// Returns the budget, transport, status, decode, or shape error of
    /// the failing stage.
    pub async fn fetch_topology(&self) -> Result<TopologyDataset, FetchError> {
        let document = self.fetch_document(&self.topology_url).await?;
        parse_topology(&document)
    }

    /// Fetches and parses the hardware dataset.
    ///
    /// # Errors
    ///
    /// Returns the budget, transport, status, decode, or shape error of
    /// the failing stage.
    pub async fn fetch_hardware(&self) -> Result<HardwareDataset, FetchError> {
        let document = self.fetch_document(&self.hardware_url).await?;
        parse_hardware(&document)
    }

    /// Budget check, GET, sanitize, status check, decode, JSON parse.
    async fn fetch_document(&self, url: &str) -> Result<Value, FetchError> {
        self.budget.ensure_call()?;

        let raw = self.backend.get(url).await?;
        let response = sanitize(raw);
        debug!(url, status = response.status, backend = self.backend.name(), "fetched");

        if !(200..300).contains(&response.status) {
            return Err(FetchError::BadStatus {
                url: url.to_string(),
                status: response.status,
            });
        }

        let text = std::str::from_utf8(&response.body).map_err(|e| FetchError::BodyDecode {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        serde_json::from_str(text).map_err(|e| FetchError::BodyDecode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

impl std::fmt::Debug for FetchPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchPipeline")
            .field("backend", &self.backend.name())
            .field("topology_url", &self.topology_url)
            .field("hardware_url", &self.hardware_url)
            .field("budget", &self.budget)
            .finish()
    }
}

/// Fallible object-field lookup.
fn field<'a>(value: &'a Value, name: &str, context: &str) -> Result<&'a Value, FetchError> {
    value
        .as_object()
        .and_then(|object| object.get(name))
        .ok_or_else(|| FetchError::MalformedDocument {
            context: format!("{context}: missing field `{name}`"),
        })
}

fn as_str<'a>(value: &'a Value, context: &str) -> Result<&'a str, FetchError> {
    value.as_str().ok_or_else(|| FetchError::MalformedDocument {
        context: format!("{context}: expected string"),
    })
}

fn as_array<'a>(value: &'a Value, context: &str) -> Result<&'a Vec<Value>, FetchError> {
    value.as_array().ok_or_else(|| FetchError::MalformedDocument {
        context: format!("{context}: expected array"),
    })
}

/// Parses a `{subnets: [{subnet_id, nodes: [...]}]}` document.
fn parse_topology(document: &Value) -> Result<TopologyDataset, FetchError> {
    let subnets = as_array(field(document, "subnets", "topology document")?, "subnets")?;

    let mut dataset = TopologyDataset::new();
    for (index, subnet) in subnets.iter().enumerate() {
        let context = format!("subnets[{index}]");
        let subnet_id = as_str(field(subnet, "subnet_id", &context)?, &context)?;
        let nodes = as_array(field(subnet, "nodes", &context)?, &context)?;

        let mut node_ids = Vec::with_capacity(nodes.len());
        for (node_index, node) in nodes.iter().enumerate() {
            let node_context = format!("{context}.nodes[{node_index}]");
            // A node entry is either a bare id string or an object with a
            // node_id field.
            let node_id = match node {
                Value::String(id) => id.as_str(),
                _ => as_str(field(node, "node_id", &node_context)?, &node_context)?,
            };
            node_ids.push(node_id.to_string());
        }
        dataset.insert(subnet_id.to_string(), node_ids);
    }
    Ok(dataset)
}

/// Parses a `{nodes: [{node_id, chip_id | node_hardware_generation}]}`
/// document.
///
/// A `chip_id` code goes through the substring rule, an explicit
/// `node_hardware_generation` label through the exact-match rule. Entries
/// carrying neither field are skipped; the dataset is allowed to be
/// incomplete and the correlator's fallback policy covers the gap.
fn parse_hardware(document: &Value) -> Result<HardwareDataset, FetchError> {
    let nodes = as_array(field(document, "nodes", "hardware document")?, "nodes")?;

    let mut dataset = HardwareDataset::new();
    for (index, node) in nodes.iter().enumerate() {
        let context = format!("nodes[{index}]");
        let node_id = as_str(field(node, "node_id", &context)?, &context)?;

        let generation = if let Some(chip_id) = node.get("chip_id").and_then(Value::as_str) {
            Generation::from_reward_code(chip_id)
        } else if let Some(label) = node
            .get("node_hardware_generation")
            .and_then(Value::as_str)
        {
            Generation::from_label(label)
        } else {
            continue;
        };
        dataset.insert(node_id.to_string(), generation);
    }
    Ok(dataset)
}

/// Scripted backend for tests: responses are queued per URL and consumed
/// in order.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    responses: Mutex<HashMap<String, VecDeque<Result<RawResponse, FetchError>>>>,
}

impl ScriptedBackend {
    /// Creates a backend with no scripted responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful response for a URL.
    pub fn script_ok(&self, url: &str, status: u16, body: impl Into<Vec<u8>>) {
        self.script(
            url,
            Ok(RawResponse {
                status,
                headers: vec![("date".to_string(), "volatile".to_string())],
                body: body.into(),
            }),
        );
    }

    /// Queues an arbitrary result for a URL.
    pub fn script(&self, url: &str, result: Result<RawResponse, FetchError>) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.entry(url.to_string()).or_default().push_back(result);
        }
    }
}

#[async_trait]
impl HttpBackend for ScriptedBackend {
    async fn get(&self, url: &str) -> Result<RawResponse, FetchError> {
        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut responses| responses.get_mut(url).and_then(VecDeque::pop_front));
        next.unwrap_or_else(|| {
            Err(FetchError::Transport {
                url: url.to_string(),
                message: "no scripted response".to_string(),
            })
        })
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
