//! In-memory collaborators for unit tests

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{SolCall, SolValue};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::chain::ChainReader;
use crate::error::{OptimizerError, Result};
use crate::http::JsonClient;
use crate::tokens::IERC20;

/// Canned `eth_call` responses.
///
/// Exact calldata matches win over selector-only matches, so a test can give
/// `balanceOf(vault)` and `balanceOf(user)` different answers.
#[derive(Default)]
pub struct MockChainReader {
    exact: Mutex<HashMap<(Address, Vec<u8>), Bytes>>,
    by_selector: Mutex<HashMap<(Address, [u8; 4]), Bytes>>,
    calls: AtomicUsize,
}

impl MockChainReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `call` on `to` with an already ABI-encoded return
    pub fn on_call<C: SolCall>(&self, to: Address, call: C, output: Vec<u8>) {
        self.exact
            .lock()
            .unwrap()
            .insert((to, call.abi_encode()), output.into());
    }

    /// Answer any call of `C` on `to`, whatever the arguments
    pub fn on_selector<C: SolCall>(&self, to: Address, output: Vec<u8>) {
        self.by_selector
            .lock()
            .unwrap()
            .insert((to, C::SELECTOR), output.into());
    }

    pub fn mock_token(&self, address: Address, name: &str, symbol: &str, decimals: u8) {
        self.on_selector::<IERC20::nameCall>(address, name.to_string().abi_encode());
        self.on_selector::<IERC20::symbolCall>(address, symbol.to_string().abi_encode());
        self.on_selector::<IERC20::decimalsCall>(address, U256::from(decimals).abi_encode());
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainReader for MockChainReader {
    async fn call(&self, _chain_id: u64, to: Address, calldata: Bytes) -> Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(output) = self.exact.lock().unwrap().get(&(to, calldata.to_vec())) {
            return Ok(output.clone());
        }

        let selector: [u8; 4] = calldata
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| OptimizerError::Chain("calldata shorter than a selector".into()))?;

        self.by_selector
            .lock()
            .unwrap()
            .get(&(to, selector))
            .cloned()
            .ok_or_else(|| {
                OptimizerError::Chain(format!("execution reverted: no mock for 0x{} on {to}", hex::encode(selector)))
            })
    }
}

/// Canned JSON responses keyed by URL; POST bodies are recorded
#[derive(Default)]
pub struct MockJsonClient {
    responses: Mutex<HashMap<String, Value>>,
    posted: Mutex<Vec<(String, Value)>>,
}

impl MockJsonClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, body: Value) {
        self.responses.lock().unwrap().insert(url.to_string(), body);
    }

    pub fn posted(&self) -> Vec<(String, Value)> {
        self.posted.lock().unwrap().clone()
    }

    fn lookup(&self, url: &str) -> Result<Value> {
        self.responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| OptimizerError::Http(format!("GET {url}: 404 Not Found")))
    }
}

#[async_trait]
impl JsonClient for MockJsonClient {
    async fn get_json(&self, url: &str) -> Result<Value> {
        self.lookup(url)
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
        self.posted.lock().unwrap().push((url.to_string(), body.clone()));
        self.lookup(url)
    }
}
