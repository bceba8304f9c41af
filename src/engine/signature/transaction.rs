//! Per-request evaluation context of the signature engine.

use std::net::SocketAddr;
use std::sync::Arc;

use regex::bytes::Regex;

use crate::engine::signature::ruleset::{LimitAction, Rule, RuleSet, Target};
use crate::engine::{EngineTransaction, Intervention, RuleEngineMode, RuleMatch, RuleMatchSink};

/// Longest excerpt of matched data carried in a rule match.
const EXCERPT_LEN: usize = 64;

/// Status of the intervention raised by a rejected body.
const BODY_LIMIT_STATUS: u16 = 413;

enum Append {
    Appended,
    Truncated,
    Rejected,
}

fn append_limited(buffer: &mut Vec<u8>, chunk: &[u8], limit: usize, action: LimitAction) -> Append {
    if buffer.len() + chunk.len() <= limit {
        buffer.extend_from_slice(chunk);
        return Append::Appended;
    }
    match action {
        LimitAction::ProcessPartial => {
            let room = limit.saturating_sub(buffer.len());
            buffer.extend_from_slice(&chunk[..room]);
            Append::Truncated
        }
        LimitAction::Reject => Append::Rejected,
    }
}

fn find_in(pattern: &Regex, value: &[u8]) -> Option<String> {
    pattern.find(value).map(|m| {
        let matched = m.as_bytes();
        String::from_utf8_lossy(&matched[..matched.len().min(EXCERPT_LEN)]).into_owned()
    })
}

fn find_in_headers(pattern: &Regex, headers: &[(String, Vec<u8>)], name: Option<&str>) -> Option<String> {
    headers
        .iter()
        .filter(|(key, _)| name.map_or(true, |n| key.eq_ignore_ascii_case(n)))
        .find_map(|(_, value)| find_in(pattern, value))
}

pub struct SignatureTransaction {
    rules: Arc<RuleSet>,
    sink: Arc<dyn RuleMatchSink>,
    client: Option<SocketAddr>,
    method: String,
    uri: String,
    protocol: String,
    request_headers: Vec<(String, Vec<u8>)>,
    request_body: Vec<u8>,
    response_status: Option<u16>,
    response_headers: Vec<(String, Vec<u8>)>,
    response_body: Vec<u8>,
    intervention: Intervention,
    /// Blocking matches, reported at the logging phase.
    pending: Vec<RuleMatch>,
}

impl SignatureTransaction {
    pub fn new(rules: Arc<RuleSet>, sink: Arc<dyn RuleMatchSink>) -> Self {
        Self {
            rules,
            sink,
            client: None,
            method: String::new(),
            uri: String::new(),
            protocol: String::new(),
            request_headers: Vec::new(),
            request_body: Vec::new(),
            response_status: None,
            response_headers: Vec::new(),
            response_body: Vec::new(),
            intervention: Intervention::default(),
            pending: Vec::new(),
        }
    }

    fn find(&self, rule: &Rule) -> Option<String> {
        match &rule.target {
            Target::RemoteAddr => {
                let ip = self.client?.ip().to_string();
                find_in(&rule.pattern, ip.as_bytes())
            }
            Target::RequestMethod => find_in(&rule.pattern, self.method.as_bytes()),
            Target::RequestUri => find_in(&rule.pattern, self.uri.as_bytes()),
            Target::RequestProtocol => find_in(&rule.pattern, self.protocol.as_bytes()),
            Target::RequestHeaders(name) => find_in_headers(&rule.pattern, &self.request_headers, name.as_deref()),
            Target::RequestBody => find_in(&rule.pattern, &self.request_body),
            Target::ResponseStatus => {
                let status = self.response_status?.to_string();
                find_in(&rule.pattern, status.as_bytes())
            }
            Target::ResponseHeaders(name) => find_in_headers(&rule.pattern, &self.response_headers, name.as_deref()),
            Target::ResponseBody => find_in(&rule.pattern, &self.response_body),
        }
    }

    fn evaluate(&mut self, phase: u8) {
        if self.rules.mode == RuleEngineMode::Disabled || self.intervention.disruptive {
            return;
        }

        let rules = Arc::clone(&self.rules);
        for rule in rules.rules().iter().filter(|r| r.phase() == phase) {
            let Some(data) = self.find(rule) else {
                continue;
            };

            let record = RuleMatch {
                rule_id: rule.id.clone(),
                phase,
                is_disruptive: rule.is_disruptive(),
                message: rule.msg.clone(),
                data,
                uri: self.uri.clone(),
                client_ip: self.client.map(|c| c.ip().to_string()).unwrap_or_default(),
                status: rule.is_disruptive().then_some(rule.status),
            };

            if rule.is_disruptive() && rules.mode == RuleEngineMode::Enabled {
                self.intervention = Intervention::block(rule.status);
                self.pending.push(record);
                return;
            }
            self.sink.on_rule_match(Some(&record));
        }
    }

    fn reject_body(&mut self) {
        if self.rules.mode == RuleEngineMode::Enabled && !self.intervention.disruptive {
            self.intervention = Intervention::block(BODY_LIMIT_STATUS);
        }
    }
}

impl EngineTransaction for SignatureTransaction {
    fn process_connection(&mut self, client: SocketAddr, _server: SocketAddr) {
        self.client = Some(client);
    }

    fn process_uri(&mut self, uri: &str, method: &str, protocol: &str) {
        self.uri = uri.to_string();
        self.method = method.to_string();
        self.protocol = protocol.to_string();
    }

    fn add_request_header(&mut self, name: &str, value: &[u8]) {
        self.request_headers.push((name.to_string(), value.to_vec()));
    }

    fn process_request_headers(&mut self) {
        self.evaluate(1);
    }

    fn append_request_body(&mut self, chunk: &[u8]) -> bool {
        match append_limited(
            &mut self.request_body,
            chunk,
            self.rules.request_body_limit,
            self.rules.request_body_limit_action,
        ) {
            Append::Appended => true,
            Append::Truncated => false,
            Append::Rejected => {
                self.reject_body();
                true
            }
        }
    }

    fn request_body_length(&self) -> usize {
        self.request_body.len()
    }

    fn process_request_body(&mut self) {
        self.evaluate(2);
    }

    fn add_response_header(&mut self, name: &str, value: &[u8]) {
        self.response_headers.push((name.to_string(), value.to_vec()));
    }

    fn process_response_headers(&mut self, status: u16, _protocol: &str) {
        self.response_status = Some(status);
        self.evaluate(3);
    }

    fn append_response_body(&mut self, chunk: &[u8]) -> bool {
        match append_limited(
            &mut self.response_body,
            chunk,
            self.rules.response_body_limit,
            self.rules.response_body_limit_action,
        ) {
            Append::Appended => true,
            Append::Truncated => false,
            Append::Rejected => {
                self.reject_body();
                true
            }
        }
    }

    fn response_body_length(&self) -> usize {
        self.response_body.len()
    }

    fn process_response_body(&mut self) {
        self.evaluate(4);
    }

    fn process_logging(&mut self) {
        for record in self.pending.drain(..) {
            self.sink.on_rule_match(Some(&record));
        }
    }

    fn intervention(&self) -> Intervention {
        self.intervention
    }

    fn rule_engine_mode(&self) -> RuleEngineMode {
        self.rules.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<RuleMatch>>);

    impl RuleMatchSink for Collect {
        fn on_rule_match(&self, record: Option<&RuleMatch>) {
            if let Some(record) = record {
                self.0.lock().unwrap().push(record.clone());
            }
        }
    }

    fn transaction(rules: &str) -> (SignatureTransaction, Arc<Collect>) {
        let mut set = RuleSet::default();
        set.load_inline(rules).unwrap();
        let sink = Arc::new(Collect::default());
        (SignatureTransaction::new(Arc::new(set), sink.clone()), sink)
    }

    fn client() -> SocketAddr {
        "10.0.0.7:40000".parse().unwrap()
    }

    fn server() -> SocketAddr {
        "10.0.0.1:8080".parse().unwrap()
    }

    #[test]
    fn test_deny_blocks_and_defers_report() {
        let (mut txn, sink) = transaction(
            r#"
            mode = "enabled"
            [[rule]]
            id = "1"
            target = "request_uri"
            pattern = "/admin"
            action = "deny"
            status = 401
            msg = "admin area"
            "#,
        );

        txn.process_connection(client(), server());
        txn.process_uri("/admin/users", "GET", "1.1");
        txn.process_request_headers();

        assert_eq!(txn.intervention(), Intervention::block(401));
        assert!(sink.0.lock().unwrap().is_empty());

        txn.process_logging();
        let reported = sink.0.lock().unwrap();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].rule_id, "1");
        assert_eq!(reported[0].client_ip, "10.0.0.7");
        assert_eq!(reported[0].data, "/admin");
        assert!(reported[0].is_disruptive);
    }

    #[test]
    fn test_detection_only_reports_without_blocking() {
        let (mut txn, sink) = transaction(
            r#"
            mode = "detection_only"
            [[rule]]
            id = "7"
            target = "request_headers:user-agent"
            pattern = "(?i)nikto"
            action = "deny"
            "#,
        );

        txn.add_request_header("User-Agent", b"Nikto/2.5");
        txn.process_request_headers();

        assert!(!txn.intervention().disruptive);
        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_process_partial_truncates_at_limit() {
        let (mut txn, _) = transaction(
            r#"
            mode = "enabled"
            request_body_limit = 100
            "#,
        );

        assert!(txn.append_request_body(&[b'a'; 75]));
        assert!(!txn.append_request_body(&[b'b'; 75]));
        assert_eq!(txn.request_body_length(), 100);
        assert!(!txn.intervention().disruptive);
    }

    #[test]
    fn test_reject_keeps_length_and_blocks() {
        let (mut txn, _) = transaction(
            r#"
            mode = "enabled"
            response_body_limit = 10
            response_body_limit_action = "reject"
            "#,
        );

        assert!(txn.append_response_body(b"0123456789"));
        assert!(txn.append_response_body(b"x"));
        assert_eq!(txn.response_body_length(), 10);
        assert_eq!(txn.intervention(), Intervention::block(413));
    }

    #[test]
    fn test_disabled_mode_buffers_but_never_matches() {
        let (mut txn, sink) = transaction(
            r#"
            mode = "disabled"
            [[rule]]
            id = "1"
            target = "request_body"
            pattern = "."
            action = "deny"
            "#,
        );

        assert!(txn.append_request_body(b"payload"));
        assert_eq!(txn.request_body_length(), 7);
        assert!(txn.append_response_body(b"ok"));
        assert_eq!(txn.response_body_length(), 2);
        txn.process_request_body();
        txn.process_response_body();
        assert!(!txn.intervention().disruptive);
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_response_status_rule() {
        let (mut txn, sink) = transaction(
            r#"
            mode = "enabled"
            [[rule]]
            id = "50"
            target = "response_status"
            pattern = "^5"
            msg = "upstream error"
            "#,
        );

        txn.process_response_headers(503, "1.1");
        let reported = sink.0.lock().unwrap();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].phase, 3);
        assert_eq!(reported[0].data, "5");
    }
}
