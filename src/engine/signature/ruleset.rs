//! Rule set loading and compilation.
//!
//! # Responsibilities
//! - Parse TOML rule sources (file or inline text)
//! - Compile patterns and targets up front
//! - Merge engine directives (mode, body limits) across sources
//!
//! # Design Decisions
//! - A source is applied atomically: any bad rule rejects the whole source,
//!   rules from other sources stay loaded
//! - Later sources override directives set by earlier ones

use std::fs;
use std::path::Path;

use regex::bytes::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::engine::RuleEngineMode;

/// Default request body limit (12.5 MiB).
pub const DEFAULT_REQUEST_BODY_LIMIT: usize = 13_107_200;

/// Default response body limit (512 KiB).
pub const DEFAULT_RESPONSE_BODY_LIMIT: usize = 524_288;

/// Status used by `deny` rules that do not name one.
pub const DEFAULT_DENY_STATUS: u16 = 403;

/// Errors raised while loading a rule source.
#[derive(Debug, Error)]
pub enum RuleSetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("rule {id}: invalid pattern: {source}")]
    Pattern {
        id: String,
        #[source]
        source: regex::Error,
    },

    #[error("rule {id}: unknown target '{target}'")]
    Target { id: String, target: String },
}

/// What the engine does when a body exceeds its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitAction {
    /// Keep the bytes up to the limit and inspect those.
    #[default]
    ProcessPartial,
    /// Keep nothing more; block when the engine is enabled.
    Reject,
}

/// Action taken when a rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Deny,
    #[default]
    Pass,
}

/// Transaction variable a rule inspects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    RemoteAddr,
    RequestMethod,
    RequestUri,
    RequestProtocol,
    /// All request header values, or only the named one.
    RequestHeaders(Option<String>),
    RequestBody,
    ResponseStatus,
    ResponseHeaders(Option<String>),
    ResponseBody,
}

impl Target {
    fn parse(raw: &str) -> Option<Self> {
        let (kind, name) = match raw.split_once(':') {
            Some((kind, name)) => (kind, Some(name.to_string())),
            None => (raw, None),
        };

        let target = match (kind, name) {
            ("remote_addr", None) => Target::RemoteAddr,
            ("request_method", None) => Target::RequestMethod,
            ("request_uri", None) => Target::RequestUri,
            ("request_protocol", None) => Target::RequestProtocol,
            ("request_headers", name) => Target::RequestHeaders(name),
            ("request_body", None) => Target::RequestBody,
            ("response_status", None) => Target::ResponseStatus,
            ("response_headers", name) => Target::ResponseHeaders(name),
            ("response_body", None) => Target::ResponseBody,
            _ => return None,
        };
        Some(target)
    }

    /// Engine phase in which the target becomes available.
    ///
    /// 1 = request headers, 2 = request body, 3 = response headers,
    /// 4 = response body.
    pub fn phase(&self) -> u8 {
        match self {
            Target::RemoteAddr
            | Target::RequestMethod
            | Target::RequestUri
            | Target::RequestProtocol
            | Target::RequestHeaders(_) => 1,
            Target::RequestBody => 2,
            Target::ResponseStatus | Target::ResponseHeaders(_) => 3,
            Target::ResponseBody => 4,
        }
    }
}

/// A compiled rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub target: Target,
    pub pattern: Regex,
    pub action: RuleAction,
    pub status: u16,
    pub msg: String,
}

impl Rule {
    pub fn phase(&self) -> u8 {
        self.target.phase()
    }

    pub fn is_disruptive(&self) -> bool {
        self.action == RuleAction::Deny
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleSource {
    mode: Option<RuleEngineMode>,
    request_body_limit: Option<usize>,
    response_body_limit: Option<usize>,
    request_body_limit_action: Option<LimitAction>,
    response_body_limit_action: Option<LimitAction>,
    #[serde(default, rename = "rule")]
    rules: Vec<RuleDefinition>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleDefinition {
    id: String,
    target: String,
    pattern: String,
    #[serde(default)]
    action: RuleAction,
    status: Option<u16>,
    #[serde(default)]
    msg: String,
}

impl RuleDefinition {
    fn compile(self) -> Result<Rule, RuleSetError> {
        let target = Target::parse(&self.target).ok_or_else(|| RuleSetError::Target {
            id: self.id.clone(),
            target: self.target.clone(),
        })?;
        let pattern = Regex::new(&self.pattern).map_err(|source| RuleSetError::Pattern {
            id: self.id.clone(),
            source,
        })?;

        Ok(Rule {
            id: self.id,
            target,
            pattern,
            action: self.action,
            status: self.status.unwrap_or(DEFAULT_DENY_STATUS),
            msg: self.msg,
        })
    }
}

/// Engine directives plus the compiled rules.
#[derive(Debug, Clone)]
pub struct RuleSet {
    pub mode: RuleEngineMode,
    pub request_body_limit: usize,
    pub response_body_limit: usize,
    pub request_body_limit_action: LimitAction,
    pub response_body_limit_action: LimitAction,
    rules: Vec<Rule>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            // An unconfigured engine never blocks.
            mode: RuleEngineMode::Disabled,
            request_body_limit: DEFAULT_REQUEST_BODY_LIMIT,
            response_body_limit: DEFAULT_RESPONSE_BODY_LIMIT,
            request_body_limit_action: LimitAction::default(),
            response_body_limit_action: LimitAction::default(),
            rules: Vec::new(),
        }
    }
}

impl RuleSet {
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Load a rule source from disk. Returns the number of rules added.
    pub fn load_file(&mut self, path: &Path) -> Result<usize, RuleSetError> {
        let text = fs::read_to_string(path).map_err(|source| RuleSetError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.load_inline(&text)
    }

    /// Load a rule source from text. Returns the number of rules added.
    pub fn load_inline(&mut self, text: &str) -> Result<usize, RuleSetError> {
        let source: RuleSource = toml::from_str(text)?;
        let compiled = source
            .rules
            .into_iter()
            .map(RuleDefinition::compile)
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(mode) = source.mode {
            self.mode = mode;
        }
        if let Some(limit) = source.request_body_limit {
            self.request_body_limit = limit;
        }
        if let Some(limit) = source.response_body_limit {
            self.response_body_limit = limit;
        }
        if let Some(action) = source.request_body_limit_action {
            self.request_body_limit_action = action;
        }
        if let Some(action) = source.response_body_limit_action {
            self.response_body_limit_action = action;
        }

        let count = compiled.len();
        self.rules.extend(compiled);
        Ok(count)
    }
}
