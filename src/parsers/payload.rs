//! Read-only view over a raw transaction payload.
//!
//! Payloads are stored verbatim as returned by the node, so everything here
//! works on `serde_json::Value` and treats absent or oddly-shaped fields as
//! "nothing to see" rather than errors.

use crate::config::ProgramSet;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Tokenized representation of the chain's native currency.
pub const WRAPPED_NATIVE_MINT: &str = "So11111111111111111111111111111111111111112";

/// Net mint deltas below this are lamport rounding noise, not trades.
const MIN_TOKEN_DELTA: f64 = 1e-9;

pub struct TxPayload {
    raw: Value,
}

impl TxPayload {
    pub fn parse(text: &str) -> Option<Self> {
        let raw: Value = serde_json::from_str(text).ok()?;
        raw.is_object().then_some(Self { raw })
    }

    pub fn from_value(raw: Value) -> Self {
        Self { raw }
    }

    pub fn block_time(&self) -> Option<i64> {
        self.raw.pointer("/result/blockTime").and_then(Value::as_i64)
    }

    /// Every account referenced by the transaction: the message's account
    /// keys (plain strings or `{pubkey}` objects) plus any instruction-level
    /// program ids.
    pub fn account_keys(&self) -> HashSet<String> {
        let mut found = HashSet::new();

        if let Some(keys) = self
            .raw
            .pointer("/result/transaction/message/accountKeys")
            .and_then(Value::as_array)
        {
            for key in keys {
                match key {
                    Value::String(s) => {
                        found.insert(s.clone());
                    }
                    Value::Object(obj) => {
                        if let Some(pubkey) = obj.get("pubkey").and_then(Value::as_str) {
                            found.insert(pubkey.to_string());
                        }
                    }
                    _ => {}
                }
            }
        }

        if let Some(instructions) = self
            .raw
            .pointer("/result/transaction/message/instructions")
            .and_then(Value::as_array)
        {
            for ix in instructions {
                if let Some(program_id) = ix.get("programId").and_then(Value::as_str) {
                    found.insert(program_id.to_string());
                }
            }
        }

        found
    }

    /// First configured AMM program referenced by this transaction, if any.
    pub fn detect_program(&self, programs: &ProgramSet) -> Option<String> {
        let keys = self.account_keys();
        programs
            .ids()
            .iter()
            .find(|id| keys.contains(**id))
            .map(|id| id.to_string())
    }

    /// Net per-mint balance change across the whole transaction, from the
    /// pre/post token balance lists. Near-zero residues are dropped.
    pub fn mint_deltas(&self) -> HashMap<String, f64> {
        let mut deltas: HashMap<String, f64> = HashMap::new();

        for entry in self.token_balances("preTokenBalances") {
            if let Some((mint, amount)) = token_amount(entry) {
                *deltas.entry(mint).or_default() -= amount;
            }
        }
        for entry in self.token_balances("postTokenBalances") {
            if let Some((mint, amount)) = token_amount(entry) {
                *deltas.entry(mint).or_default() += amount;
            }
        }

        deltas.retain(|_, delta| delta.abs() > MIN_TOKEN_DELTA);
        deltas
    }

    fn token_balances(&self, field: &str) -> impl Iterator<Item = &Value> {
        self.raw
            .pointer(&format!("/result/meta/{}", field))
            .and_then(Value::as_array)
            .map(|a| a.iter())
            .into_iter()
            .flatten()
    }
}

/// (mint, ui amount) from one token-balance entry. Prefers the node's
/// normalized `uiAmount`, falling back to the raw amount scaled by decimals.
fn token_amount(entry: &Value) -> Option<(String, f64)> {
    let mint = entry.get("mint")?.as_str()?.to_string();
    let ui = entry.get("uiTokenAmount")?;

    if let Some(amount) = ui.get("uiAmount").and_then(Value::as_f64) {
        return Some((mint, amount));
    }

    let raw: f64 = ui.get("amount")?.as_str()?.parse().ok()?;
    let decimals = ui.get("decimals").and_then(Value::as_u64).unwrap_or(0);
    Some((mint, raw / 10f64.powi(decimals as i32)))
}
