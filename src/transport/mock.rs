//! # Scripted Mock Transport
//!
//! In-memory transport that replays a scripted sequence of outcomes and
//! records every request it receives. Used by tests and local development;
//! once the script is exhausted it keeps returning the final outcome.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Transport, TransportError, TransportRequest, TransportResponse};

/// One scripted outcome
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    Respond(u16),
    RespondWith(TransportResponse),
    Fail(TransportError),
    /// Delay before responding, to exercise timeout paths
    DelayThenRespond(std::time::Duration, u16),
}

#[derive(Default)]
struct MockState {
    script: VecDeque<ScriptedOutcome>,
    last_outcome: Option<ScriptedOutcome>,
    requests: Vec<TransportRequest>,
}

/// Scripted transport double
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a plain status response
    pub fn respond(self, status: u16) -> Self {
        self.push(ScriptedOutcome::Respond(status));
        self
    }

    /// Script `count` consecutive responses with the same status
    pub fn respond_times(self, status: u16, count: usize) -> Self {
        for _ in 0..count {
            self.push(ScriptedOutcome::Respond(status));
        }
        self
    }

    /// Script a transport-level failure
    pub fn fail(self, error: TransportError) -> Self {
        self.push(ScriptedOutcome::Fail(error));
        self
    }

    /// Script a delayed response
    pub fn respond_after(self, delay: std::time::Duration, status: u16) -> Self {
        self.push(ScriptedOutcome::DelayThenRespond(delay, status));
        self
    }

    fn push(&self, outcome: ScriptedOutcome) {
        self.state.lock().script.push_back(outcome);
    }

    /// Number of requests the transport actually received
    pub fn call_count(&self) -> usize {
        self.state.lock().requests.len()
    }

    /// Requests received so far, in order
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.state.lock().requests.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let outcome = {
            let mut state = self.state.lock();
            state.requests.push(request);
            match state.script.pop_front() {
                Some(outcome) => {
                    state.last_outcome = Some(outcome.clone());
                    outcome
                }
                None => state
                    .last_outcome
                    .clone()
                    .unwrap_or(ScriptedOutcome::Respond(200)),
            }
        };

        match outcome {
            ScriptedOutcome::Respond(status) => Ok(TransportResponse {
                status,
                headers: Default::default(),
                body: None,
            }),
            ScriptedOutcome::RespondWith(response) => Ok(response),
            ScriptedOutcome::Fail(error) => Err(error),
            ScriptedOutcome::DelayThenRespond(delay, status) => {
                tokio::time::sleep(delay).await;
                Ok(TransportResponse {
                    status,
                    headers: Default::default(),
                    body: None,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_replays_in_order_then_repeats_last() {
        let transport = MockTransport::new().respond(503).respond(200);

        let first = transport.send(TransportRequest::new("GET", "/a")).await;
        assert_eq!(first.unwrap().status, 503);

        let second = transport.send(TransportRequest::new("GET", "/b")).await;
        assert_eq!(second.unwrap().status, 200);

        // Script exhausted: last outcome repeats
        let third = transport.send(TransportRequest::new("GET", "/c")).await;
        assert_eq!(third.unwrap().status, 200);

        assert_eq!(transport.call_count(), 3);
    }
}
