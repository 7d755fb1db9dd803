//! Scripted transport for unit tests

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::client::{AliyunClient, RpcInvocation, RpcTransport};
use crate::error::{AlicloudError, Result};

#[derive(Debug, Clone)]
enum Scripted {
    Response(Value),
    Error { code: String, status: u16 },
}

/// Transport that replays scripted responses per action
///
/// Each action has a queue; the last entry is repeated once the others are
/// used up. Every call is recorded.
#[derive(Default)]
pub struct MockTransport {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<RpcInvocation>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, action: &str, scripted: Scripted) {
        self.scripts
            .lock()
            .unwrap()
            .entry(action.to_string())
            .or_default()
            .push_back(scripted);
    }

    pub fn respond(&self, action: &str, response: Value) {
        self.push(action, Scripted::Response(response));
    }

    pub fn fail(&self, action: &str, code: &str, status: u16) {
        self.push(
            action,
            Scripted::Error {
                code: code.to_string(),
                status,
            },
        );
    }

    pub fn calls(&self) -> Vec<RpcInvocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, action: &str) -> Vec<RpcInvocation> {
        self.calls()
            .into_iter()
            .filter(|c| c.action == action)
            .collect()
    }

    pub fn actions(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.action).collect()
    }
}

#[async_trait]
impl RpcTransport for MockTransport {
    async fn call(&self, invocation: &RpcInvocation) -> Result<Value> {
        self.calls.lock().unwrap().push(invocation.clone());

        let scripted = {
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(&invocation.action) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match scripted {
            Some(Scripted::Response(value)) => Ok(value),
            Some(Scripted::Error { code, status }) => Err(AlicloudError::Api {
                message: format!("scripted {} failure", code),
                code,
                request_id: "mock-request".to_string(),
                status,
            }),
            None => Err(AlicloudError::Api {
                code: "UnexpectedAction".to_string(),
                message: format!("no response scripted for {}", invocation.action),
                request_id: "mock-request".to_string(),
                status: 400,
            }),
        }
    }
}

/// Client in cn-hangzhou wired to a fresh mock transport
pub fn mock_client() -> (AliyunClient, Arc<MockTransport>) {
    let transport = Arc::new(MockTransport::new());
    let client = AliyunClient::with_transport("cn-hangzhou", transport.clone());
    (client, transport)
}
