//! Reward ledger client
//!
//! JSON-RPC client for a rippled-compatible ledger node. Submission is
//! at-least-once: a timed-out call may have succeeded on the network, so
//! callers must treat outcomes as advisory and rely on the transaction
//! audit log for reconciliation. Bounded transport retry lives here, not
//! in the settlement orchestrator.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::types::{EngineError, Result};

/// Hard ceiling on serialized mint payloads, imposed by the ledger network
pub const MAX_MINT_PAYLOAD_BYTES: usize = 256;

/// Opaque signing credential. Zeroized on drop, redacted in Debug output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw credential for a signing call
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret(<redacted>)")
    }
}

/// Newly created ledger account
pub struct LedgerAccount {
    pub address: String,
    pub secret: Secret,
}

/// Outcome of a currency transfer. Network-level rejection is in-band
/// (`success: false`); transport failures surface as `EngineError::Ledger`.
#[derive(Debug, Clone)]
pub struct TransferResult {
    pub success: bool,
    pub tx_ref: Option<String>,
    pub error: Option<String>,
}

/// Outcome of a token mint
#[derive(Debug, Clone)]
pub struct MintResult {
    pub success: bool,
    pub tx_ref: Option<String>,
    pub token_ref: Option<String>,
    pub error: Option<String>,
}

/// Black-box reward ledger operations
#[async_trait]
pub trait RewardLedger: Send + Sync {
    /// Create a new ledger account (address + signing secret)
    async fn create_account(&self) -> Result<LedgerAccount>;

    /// Current XRP balance of an account
    async fn get_balance(&self, address: &str) -> Result<f64>;

    /// Transfer XRP from the account owning `secret` to `destination`
    async fn transfer(&self, secret: &Secret, destination: &str, amount_xrp: f64)
        -> Result<TransferResult>;

    /// Mint a badge token carrying `payload` (serialized JSON, <= 256 bytes)
    async fn mint_token(&self, secret: &Secret, payload: &[u8]) -> Result<MintResult>;
}

// =============================================================================
// rippled JSON-RPC implementation
// =============================================================================

/// JSON-RPC client for a rippled-compatible node
pub struct XrplClient {
    http: reqwest::Client,
    rpc_url: String,
    faucet_url: Option<String>,
    retries: u32,
}

impl XrplClient {
    pub fn new(
        rpc_url: String,
        faucet_url: Option<String>,
        timeout_ms: u64,
        retries: u32,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| EngineError::Config(format!("Failed to build ledger client: {}", e)))?;

        Ok(Self {
            http,
            rpc_url,
            faucet_url,
            retries,
        })
    }

    /// Issue a JSON-RPC call, retrying transport errors a bounded number
    /// of times. Application-level rejections are never retried: the
    /// submission may already be externally visible.
    async fn rpc(&self, method: &str, params: Value) -> Result<Value> {
        let body = json!({ "method": method, "params": [params] });

        let mut last_err = None;
        for attempt in 0..=self.retries {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(250 * attempt as u64)).await;
                debug!(method, attempt, "retrying ledger call");
            }

            match self.http.post(&self.rpc_url).json(&body).send().await {
                Ok(response) => {
                    let value: Value = response
                        .json()
                        .await
                        .map_err(|e| EngineError::Ledger(format!("Invalid ledger response: {}", e)))?;
                    let result = value
                        .get("result")
                        .cloned()
                        .ok_or_else(|| EngineError::Ledger("Missing result in ledger response".into()))?;

                    if result.get("error").is_some() {
                        let message = result
                            .get("error_message")
                            .and_then(Value::as_str)
                            .or_else(|| result.get("error").and_then(Value::as_str))
                            .unwrap_or("unknown ledger error");
                        return Err(EngineError::Ledger(format!("{}: {}", method, message)));
                    }

                    return Ok(result);
                }
                Err(e) => {
                    warn!(method, attempt, "ledger transport error: {}", e);
                    last_err = Some(e);
                }
            }
        }

        Err(EngineError::Ledger(format!(
            "{} failed after {} attempts: {}",
            method,
            self.retries + 1,
            last_err.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    /// Derive the classic address for a seed via wallet_propose
    async fn derive_address(&self, secret: &Secret) -> Result<String> {
        let result = self
            .rpc("wallet_propose", json!({ "seed": secret.expose() }))
            .await?;
        result
            .get("account_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| EngineError::Ledger("wallet_propose returned no account_id".into()))
    }

    /// Sign and submit a transaction, mapping the engine result to an
    /// in-band success flag
    async fn submit(&self, secret: &Secret, tx_json: Value) -> Result<(bool, Option<String>, Option<String>, Value)> {
        let result = self
            .rpc(
                "submit",
                json!({ "secret": secret.expose(), "tx_json": tx_json }),
            )
            .await?;

        let engine_result = result
            .get("engine_result")
            .and_then(Value::as_str)
            .unwrap_or("");
        // tes* = success; tec*/ter*/tem* = rejected but possibly fee-claimed
        let success = engine_result.starts_with("tes");
        let tx_hash = result
            .pointer("/tx_json/hash")
            .and_then(Value::as_str)
            .map(str::to_string);
        let error = if success {
            None
        } else {
            Some(
                result
                    .get("engine_result_message")
                    .and_then(Value::as_str)
                    .unwrap_or(engine_result)
                    .to_string(),
            )
        };

        Ok((success, tx_hash, error, result))
    }
}

#[async_trait]
impl RewardLedger for XrplClient {
    async fn create_account(&self) -> Result<LedgerAccount> {
        let result = self.rpc("wallet_propose", json!({})).await?;

        let address = result
            .get("account_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| EngineError::Ledger("wallet_propose returned no account_id".into()))?;
        let seed = result
            .get("master_seed")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| EngineError::Ledger("wallet_propose returned no master_seed".into()))?;

        // Fund the account on test networks; best effort, the account
        // exists on-ledger only once funded
        if let Some(ref faucet) = self.faucet_url {
            let funding = self
                .http
                .post(faucet)
                .json(&json!({ "destination": address }))
                .send()
                .await;
            if let Err(e) = funding {
                warn!("Faucet funding failed for new account: {}", e);
            }
        }

        debug!(address, "created ledger account");

        Ok(LedgerAccount {
            address,
            secret: Secret::new(seed),
        })
    }

    async fn get_balance(&self, address: &str) -> Result<f64> {
        let result = self
            .rpc(
                "account_info",
                json!({ "account": address, "ledger_index": "validated" }),
            )
            .await?;

        let drops: u64 = result
            .pointer("/account_data/Balance")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| EngineError::Ledger("account_info returned no balance".into()))?;

        Ok(drops as f64 / 1_000_000.0)
    }

    async fn transfer(
        &self,
        secret: &Secret,
        destination: &str,
        amount_xrp: f64,
    ) -> Result<TransferResult> {
        let account = self.derive_address(secret).await?;
        let drops = (amount_xrp * 1_000_000.0).round() as u64;

        let tx_json = json!({
            "TransactionType": "Payment",
            "Account": account,
            "Destination": destination,
            "Amount": drops.to_string(),
        });

        let (success, tx_ref, error, _) = self.submit(secret, tx_json).await?;

        Ok(TransferResult {
            success,
            tx_ref,
            error,
        })
    }

    async fn mint_token(&self, secret: &Secret, payload: &[u8]) -> Result<MintResult> {
        if payload.len() > MAX_MINT_PAYLOAD_BYTES {
            return Err(EngineError::Validation(format!(
                "Mint payload is {} bytes, ledger ceiling is {}",
                payload.len(),
                MAX_MINT_PAYLOAD_BYTES
            )));
        }

        let account = self.derive_address(secret).await?;

        let tx_json = json!({
            "TransactionType": "NFTokenMint",
            "Account": account,
            "URI": hex::encode_upper(payload),
            "NFTokenTaxon": 0,
            // tfTransferable
            "Flags": 8,
        });

        let (success, tx_ref, error, result) = self.submit(secret, tx_json).await?;

        // The token id only appears in validated metadata; fall back to
        // the tx hash as the external reference
        let token_ref = result
            .pointer("/meta/nftoken_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| tx_ref.clone());

        Ok(MintResult {
            success,
            tx_ref,
            token_ref,
            error,
        })
    }
}

// =============================================================================
// Mock ledger for tests
// =============================================================================

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Mutex;

    /// Configurable in-memory ledger for settlement tests
    #[derive(Default)]
    pub struct MockLedger {
        pub fail_mints: AtomicBool,
        pub fail_transfers: AtomicBool,
        counter: AtomicU64,
        pub mints: Mutex<Vec<Vec<u8>>>,
        pub transfers: Mutex<Vec<(String, f64)>>,
    }

    impl MockLedger {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_mints() -> Self {
            let ledger = Self::default();
            ledger.fail_mints.store(true, Ordering::SeqCst);
            ledger
        }

        pub fn mint_count(&self) -> usize {
            self.mints.lock().unwrap().len()
        }

        pub fn transfer_count(&self) -> usize {
            self.transfers.lock().unwrap().len()
        }

        fn next_ref(&self, prefix: &str) -> String {
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            format!("{}-{:08}", prefix, n)
        }
    }

    #[async_trait]
    impl RewardLedger for MockLedger {
        async fn create_account(&self) -> Result<LedgerAccount> {
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            Ok(LedgerAccount {
                address: format!("rMOCK{:010}", n),
                secret: Secret::new(format!("sMOCK{:010}", n)),
            })
        }

        async fn get_balance(&self, _address: &str) -> Result<f64> {
            Ok(1000.0)
        }

        async fn transfer(
            &self,
            _secret: &Secret,
            destination: &str,
            amount_xrp: f64,
        ) -> Result<TransferResult> {
            if self.fail_transfers.load(Ordering::SeqCst) {
                return Ok(TransferResult {
                    success: false,
                    tx_ref: None,
                    error: Some("insufficient funds".into()),
                });
            }
            self.transfers
                .lock()
                .unwrap()
                .push((destination.to_string(), amount_xrp));
            Ok(TransferResult {
                success: true,
                tx_ref: Some(self.next_ref("PAY")),
                error: None,
            })
        }

        async fn mint_token(&self, _secret: &Secret, payload: &[u8]) -> Result<MintResult> {
            if payload.len() > MAX_MINT_PAYLOAD_BYTES {
                return Err(EngineError::Validation("payload too large".into()));
            }
            if self.fail_mints.load(Ordering::SeqCst) {
                return Ok(MintResult {
                    success: false,
                    tx_ref: None,
                    token_ref: None,
                    error: Some("mint rejected".into()),
                });
            }
            self.mints.lock().unwrap().push(payload.to_vec());
            let tx = self.next_ref("MINT");
            Ok(MintResult {
                success: true,
                tx_ref: Some(tx.clone()),
                token_ref: Some(format!("NFT-{}", tx)),
                error: None,
            })
        }
    }
}

#[cfg(test)]
pub use mock::MockLedger;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_debug_is_redacted() {
        let secret = Secret::new("sVERYSECRETSEED");
        assert_eq!(format!("{:?}", secret), "Secret(<redacted>)");
    }

    #[tokio::test]
    async fn mock_ledger_rejects_oversized_payload() {
        let ledger = MockLedger::new();
        let secret = Secret::new("s");
        let payload = vec![b'x'; MAX_MINT_PAYLOAD_BYTES + 1];
        assert!(ledger.mint_token(&secret, &payload).await.is_err());
    }
}
