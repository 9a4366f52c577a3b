//! Scripted JSON-RPC transport for tests

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::RpcError;
use crate::health::ProviderEndpoint;
use crate::rpc::{parse_quantity, RawLog, RpcTransport};

#[derive(Debug, Clone)]
pub enum Reply {
    Value(Value),
    Error(i64, String),
    Status(u16),
    Hang,
}

#[derive(Default)]
struct State {
    head: u64,
    logs: Vec<RawLog>,
    balances: HashMap<Address, U256>,
    url_replies: HashMap<String, Reply>,
    method_replies: HashMap<String, Reply>,
    fail_next: HashMap<String, usize>,
    failing_ranges: HashSet<(u64, u64)>,
    fetched_ranges: Vec<(u64, u64)>,
    calls: HashMap<String, usize>,
    methods: Vec<String>,
}

#[derive(Default)]
pub struct ScriptedTransport {
    state: Mutex<State>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_head(&self, head: u64) {
        self.state.lock().unwrap().head = head;
    }

    pub fn add_log(&self, log: RawLog) {
        self.state.lock().unwrap().logs.push(log);
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.state.lock().unwrap().balances.insert(address, balance);
    }

    /// Every call to `url` gets `reply`
    pub fn on_url(&self, url: &str, reply: Reply) {
        self.state.lock().unwrap().url_replies.insert(url.to_string(), reply);
    }

    pub fn clear_url(&self, url: &str) {
        self.state.lock().unwrap().url_replies.remove(url);
    }

    /// Every call of `method`, on any provider, gets `reply`
    pub fn on_method(&self, method: &str, reply: Reply) {
        self.state.lock().unwrap().method_replies.insert(method.to_string(), reply);
    }

    pub fn clear_method(&self, method: &str) {
        self.state.lock().unwrap().method_replies.remove(method);
    }

    /// The next `n` calls to `url` fail with a 502
    pub fn fail_next(&self, url: &str, n: usize) {
        self.state.lock().unwrap().fail_next.insert(url.to_string(), n);
    }

    /// `eth_getLogs` for exactly this sub-range always errors
    pub fn fail_logs_range(&self, from: u64, to: u64) {
        self.state.lock().unwrap().failing_ranges.insert((from, to));
    }

    /// Successfully served `eth_getLogs` ranges, in call order
    pub fn fetched_ranges(&self) -> Vec<(u64, u64)> {
        self.state.lock().unwrap().fetched_ranges.clone()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.state.lock().unwrap().calls.get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().unwrap().calls.values().sum()
    }

    pub fn method_calls(&self, method: &str) -> usize {
        self.state.lock().unwrap().methods.iter().filter(|m| *m == method).count()
    }

    fn answer(&self, endpoint: &ProviderEndpoint, method: &str, params: &Value) -> Reply {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(endpoint.url.clone()).or_default() += 1;
        state.methods.push(method.to_string());

        if let Some(remaining) = state.fail_next.get_mut(&endpoint.url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Reply::Status(502);
            }
        }
        if let Some(reply) = state.url_replies.get(&endpoint.url) {
            return reply.clone();
        }
        if let Some(reply) = state.method_replies.get(method) {
            return reply.clone();
        }

        match method {
            "eth_blockNumber" => Reply::Value(json!(format!("0x{:x}", state.head))),
            "eth_getBalance" => {
                let address: Address = serde_json::from_value(params[0].clone()).unwrap();
                let balance = state.balances.get(&address).copied().unwrap_or_default();
                Reply::Value(json!(format!("0x{balance:x}")))
            }
            "eth_getLogs" => {
                let filter = &params[0];
                let from = parse_quantity("fromBlock", filter["fromBlock"].as_str().unwrap()).unwrap();
                let to = parse_quantity("toBlock", filter["toBlock"].as_str().unwrap()).unwrap();
                if state.failing_ranges.contains(&(from, to)) {
                    return Reply::Error(-32005, format!("query {from}-{to} failed"));
                }
                state.fetched_ranges.push((from, to));
                let logs: Vec<&RawLog> = state
                    .logs
                    .iter()
                    .filter(|log| {
                        parse_quantity("blockNumber", &log.block_number)
                            .map(|n| (from..=to).contains(&n))
                            .unwrap_or(true)
                    })
                    .collect();
                Reply::Value(serde_json::to_value(logs).unwrap())
            }
            other => Reply::Error(-32601, format!("method {other} not found")),
        }
    }
}

#[async_trait]
impl RpcTransport for ScriptedTransport {
    async fn call(
        &self,
        endpoint: &ProviderEndpoint,
        method: &str,
        params: Value,
    ) -> Result<Value, RpcError> {
        match self.answer(endpoint, method, &params) {
            Reply::Value(value) => Ok(value),
            Reply::Error(code, message) => Err(RpcError::Remote { code, message }),
            Reply::Status(status) => Err(RpcError::Status(status)),
            Reply::Hang => futures::future::pending().await,
        }
    }
}
