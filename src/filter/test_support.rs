//! Scripted engine for filter tests.

use std::mem::discriminant;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use ::metrics::{Counter, CounterFn, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};

use crate::engine::{EngineTransaction, Intervention, RuleEngineMode, RuleMatch, RuleMatchSink, VerdictEngine};

/// An engine call, as recorded by [`ScriptedEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connection,
    Uri(String, String, String),
    RequestHeader(String, Vec<u8>),
    RequestHeaders,
    RequestChunk(Vec<u8>),
    RequestBody,
    ResponseHeader(String, Vec<u8>),
    ResponseHeaders(u16),
    ResponseChunk(Vec<u8>),
    ResponseBody,
    Logging,
}

pub struct NullSink;

impl RuleMatchSink for NullSink {
    fn on_rule_match(&self, _record: Option<&RuleMatch>) {}
}

/// Engine that records every call and turns disruptive on a chosen one.
#[derive(Clone)]
pub struct ScriptedEngine {
    mode: RuleEngineMode,
    block: Option<(Call, u16)>,
    report: Option<(Call, Option<RuleMatch>)>,
    body_limit: usize,
    silent_drop: bool,
    calls: Arc<Mutex<Vec<Call>>>,
    request_held: Arc<Mutex<usize>>,
}

impl ScriptedEngine {
    pub fn with_mode(mode: RuleEngineMode) -> Self {
        Self {
            mode,
            block: None,
            report: None,
            body_limit: usize::MAX,
            silent_drop: false,
            calls: Arc::new(Mutex::new(Vec::new())),
            request_held: Arc::new(Mutex::new(0)),
        }
    }

    pub fn enabled() -> Self {
        Self::with_mode(RuleEngineMode::Enabled)
    }

    /// Turn disruptive once a call of the same kind as `call` is made.
    pub fn block_on(mut self, call: Call, status: u16) -> Self {
        self.block = Some((call, status));
        self
    }

    /// Push `record` to the sink when a call of the same kind as `call` is made.
    pub fn report_on(mut self, call: Call, record: Option<RuleMatch>) -> Self {
        self.report = Some((call, record));
        self
    }

    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    /// Accept chunks past the limit without storing them.
    pub fn silent_drop(mut self) -> Self {
        self.silent_drop = true;
        self
    }

    /// Request body bytes the last transaction kept.
    pub fn request_held(&self) -> usize {
        *self.request_held.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn transaction(&self) -> Box<dyn EngineTransaction> {
        self.new_transaction(Arc::new(NullSink))
    }
}

impl VerdictEngine for ScriptedEngine {
    fn new_transaction(&self, sink: Arc<dyn RuleMatchSink>) -> Box<dyn EngineTransaction> {
        Box::new(ScriptedTransaction {
            script: self.clone(),
            sink,
            request_len: 0,
            response_len: 0,
            intervention: Intervention::default(),
        })
    }
}

/// Metrics recorder that tallies counter increments by name.
/// Install it with `metrics::with_local_recorder`.
#[derive(Default)]
pub struct CountingRecorder {
    counts: Arc<Mutex<Vec<(String, u64)>>>,
}

impl CountingRecorder {
    pub fn count(&self, name: &str) -> u64 {
        self.counts
            .lock()
            .unwrap()
            .iter()
            .filter(|(counter, _)| counter == name)
            .map(|(_, value)| value)
            .sum()
    }
}

struct Tally {
    name: String,
    counts: Arc<Mutex<Vec<(String, u64)>>>,
}

impl CounterFn for Tally {
    fn increment(&self, value: u64) {
        self.counts.lock().unwrap().push((self.name.clone(), value));
    }

    fn absolute(&self, _value: u64) {}
}

impl Recorder for CountingRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        Counter::from_arc(Arc::new(Tally {
            name: key.name().to_string(),
            counts: Arc::clone(&self.counts),
        }))
    }

    fn register_gauge(&self, _key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, _key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}

pub fn sample_match(disruptive: bool) -> RuleMatch {
    RuleMatch {
        rule_id: "942100".to_string(),
        phase: 2,
        is_disruptive: disruptive,
        message: "SQL Injection Attack Detected".to_string(),
        data: "1' OR '1'='1".to_string(),
        uri: "/login".to_string(),
        client_ip: "192.0.2.10".to_string(),
        status: disruptive.then_some(403),
    }
}

struct ScriptedTransaction {
    script: ScriptedEngine,
    sink: Arc<dyn RuleMatchSink>,
    request_len: usize,
    response_len: usize,
    intervention: Intervention,
}

impl ScriptedTransaction {
    fn record(&mut self, call: Call) {
        if let Some((trigger, status)) = &self.script.block {
            if discriminant(trigger) == discriminant(&call) {
                self.intervention = Intervention::block(*status);
            }
        }
        if let Some((trigger, record)) = &self.script.report {
            if discriminant(trigger) == discriminant(&call) {
                self.sink.on_rule_match(record.as_ref());
            }
        }
        self.script.calls.lock().unwrap().push(call);
    }

    fn append(limit: usize, silent_drop: bool, held: &mut usize, chunk: &[u8]) -> bool {
        if *held + chunk.len() <= limit {
            *held += chunk.len();
            return true;
        }
        if silent_drop {
            return true;
        }
        *held = limit;
        false
    }
}

impl EngineTransaction for ScriptedTransaction {
    fn process_connection(&mut self, _client: SocketAddr, _server: SocketAddr) {
        self.record(Call::Connection);
    }

    fn process_uri(&mut self, uri: &str, method: &str, protocol: &str) {
        self.record(Call::Uri(uri.into(), method.into(), protocol.into()));
    }

    fn add_request_header(&mut self, name: &str, value: &[u8]) {
        self.record(Call::RequestHeader(name.into(), value.to_vec()));
    }

    fn process_request_headers(&mut self) {
        self.record(Call::RequestHeaders);
    }

    fn append_request_body(&mut self, chunk: &[u8]) -> bool {
        self.record(Call::RequestChunk(chunk.to_vec()));
        let accepted = Self::append(self.script.body_limit, self.script.silent_drop, &mut self.request_len, chunk);
        *self.script.request_held.lock().unwrap() = self.request_len;
        accepted
    }

    fn request_body_length(&self) -> usize {
        self.request_len
    }

    fn process_request_body(&mut self) {
        self.record(Call::RequestBody);
    }

    fn add_response_header(&mut self, name: &str, value: &[u8]) {
        self.record(Call::ResponseHeader(name.into(), value.to_vec()));
    }

    fn process_response_headers(&mut self, status: u16, _protocol: &str) {
        self.record(Call::ResponseHeaders(status));
    }

    fn append_response_body(&mut self, chunk: &[u8]) -> bool {
        self.record(Call::ResponseChunk(chunk.to_vec()));
        Self::append(self.script.body_limit, self.script.silent_drop, &mut self.response_len, chunk)
    }

    fn response_body_length(&self) -> usize {
        self.response_len
    }

    fn process_response_body(&mut self) {
        self.record(Call::ResponseBody);
    }

    fn process_logging(&mut self) {
        self.record(Call::Logging);
    }

    fn intervention(&self) -> Intervention {
        self.intervention
    }

    fn rule_engine_mode(&self) -> RuleEngineMode {
        self.script.mode
    }
}
