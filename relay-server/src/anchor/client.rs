//! 锚定客户端
//!
//! - [`MockChainAnchor`]: 确定性模拟链，未配置 `ANCHOR_RPC_URL` 时使用
//! - [`HttpAnchorClient`]: `POST {rpc}/anchor`, `POST {rpc}/verify`

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::types::{AnchorError, AnchorReceipt, AuditBatchItem};

/// 模拟链起始区块号
const MOCK_BASE_BLOCK: u64 = 18_000_000;

/// 上报方标识
const REPORTER: &str = "audit-service";

#[async_trait]
pub trait AnchorClient: Send + Sync + std::fmt::Debug {
    /// 锚定单条审计记录摘要
    async fn anchor(&self, item: &AuditBatchItem) -> Result<AnchorReceipt, AnchorError>;

    /// 校验已存回执 (txHash, blockNumber) 是否确实对应这条记录的摘要
    async fn verify(
        &self,
        record_id: &str,
        digest: &str,
        tx_hash: &str,
        block_number: u64,
    ) -> Result<bool, AnchorError>;

    fn name(&self) -> &'static str;

    fn is_available(&self) -> bool {
        true
    }
}

// ========== Mock ==========

/// 确定性模拟链
///
/// 同一条记录总是得到相同的 txHash / blockNumber。
#[derive(Debug)]
pub struct MockChainAnchor {
    available: AtomicBool,
    anchored: AtomicU64,
}

impl MockChainAnchor {
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            anchored: AtomicU64::new(0),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn anchored_count(&self) -> u64 {
        self.anchored.load(Ordering::SeqCst)
    }

    /// 计算模拟回执的 (txHash, blockNumber)
    pub fn derive(record_id: &str, digest: &str) -> (String, u64) {
        let mut hasher = Sha256::new();
        hasher.update(format!("{record_id}:{digest}:anchor"));
        let hash = hex::encode(hasher.finalize());

        let prefix = u64::from_str_radix(&hash[..8], 16).unwrap_or(0);
        let block_number = MOCK_BASE_BLOCK + prefix % 1_000_000;
        (format!("0x{hash}"), block_number)
    }
}

impl Default for MockChainAnchor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnchorClient for MockChainAnchor {
    async fn anchor(&self, item: &AuditBatchItem) -> Result<AnchorReceipt, AnchorError> {
        if !self.is_available() {
            return Err(AnchorError::Unavailable("mock chain offline".into()));
        }

        let (tx_hash, block_number) = Self::derive(&item.record_id, &item.digest);
        self.anchored.fetch_add(1, Ordering::SeqCst);
        Ok(AnchorReceipt {
            tx_hash,
            block_number,
            anchored_at: shared::util::now_rfc3339(),
        })
    }

    async fn verify(
        &self,
        record_id: &str,
        digest: &str,
        tx_hash: &str,
        block_number: u64,
    ) -> Result<bool, AnchorError> {
        if !self.is_available() {
            return Err(AnchorError::Unavailable("mock chain offline".into()));
        }
        let (expected_tx, expected_block) = Self::derive(record_id, digest);
        Ok(expected_tx == tx_hash && expected_block == block_number)
    }

    fn name(&self) -> &'static str {
        "mock"
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

// ========== HTTP ==========

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnchorRequest<'a> {
    record_id: &'a str,
    hash: &'a str,
    reporter: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnchorResponse {
    tx_hash: String,
    block_number: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyRequest<'a> {
    record_id: &'a str,
    hash: &'a str,
    tx_hash: &'a str,
    block_number: u64,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    valid: bool,
}

#[derive(Debug)]
pub struct HttpAnchorClient {
    client: Client,
    endpoint: String,
    verify_endpoint: String,
}

impl HttpAnchorClient {
    pub fn new(rpc_url: &str, timeout: Duration) -> Result<Self, AnchorError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AnchorError::Unavailable(format!("Failed to build HTTP client: {e}")))?;

        let base = rpc_url.trim_end_matches('/');
        Ok(Self {
            client,
            endpoint: format!("{base}/anchor"),
            verify_endpoint: format!("{base}/verify"),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AnchorClient for HttpAnchorClient {
    async fn anchor(&self, item: &AuditBatchItem) -> Result<AnchorReceipt, AnchorError> {
        let body = AnchorRequest {
            record_id: &item.record_id,
            hash: &item.digest,
            reporter: REPORTER,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| AnchorError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AnchorError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: AnchorResponse = resp
            .json()
            .await
            .map_err(|e| AnchorError::InvalidResponse(e.to_string()))?;

        Ok(AnchorReceipt {
            tx_hash: parsed.tx_hash,
            block_number: parsed.block_number,
            anchored_at: shared::util::now_rfc3339(),
        })
    }

    async fn verify(
        &self,
        record_id: &str,
        digest: &str,
        tx_hash: &str,
        block_number: u64,
    ) -> Result<bool, AnchorError> {
        let body = VerifyRequest {
            record_id,
            hash: digest,
            tx_hash,
            block_number,
        };

        let resp = self
            .client
            .post(&self.verify_endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| AnchorError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AnchorError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: VerifyResponse = resp
            .json()
            .await
            .map_err(|e| AnchorError::InvalidResponse(e.to_string()))?;
        Ok(parsed.valid)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
