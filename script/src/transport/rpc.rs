use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use ethers::types::{Address, Bytes, TransactionReceipt, TransactionRequest, H256, U256, U64};
use log::{debug, trace, warn};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::{sync::mpsc, time::sleep};
use url::Url;

use evmscript_common::{
    config::DEFAULT_BLOCK_POLL_INTERVAL_MS,
    rpc::{JsonRpcRequest, JsonRpcResponse, RpcError},
};

use super::{BlockSubscription, Transport};

// Block hashes buffered between the poller and the watcher
const BLOCK_CHANNEL_CAPACITY: usize = 64;

/// Configuration for transport retries and timeouts
#[derive(Debug, Clone)]
pub struct RpcTransportConfig {
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub connection_timeout: Duration,
    // Interval between two polls of the block filter
    pub poll_interval: Duration,
}

impl Default for RpcTransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            connection_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(DEFAULT_BLOCK_POLL_INTERVAL_MS),
        }
    }
}

/// Ethereum JSON-RPC client over HTTP
#[derive(Clone)]
pub struct RpcTransport {
    client: Client,
    url: Url,
    config: RpcTransportConfig,
}

/// Accept `host:port` as well as full http(s) URLs
pub fn normalize_rpc_url(address: &str) -> Result<Url> {
    let url = if address.starts_with("http://") || address.starts_with("https://") {
        Url::parse(address)?
    } else {
        Url::parse(&format!("http://{}", address))?
    };
    Ok(url)
}

impl RpcTransport {
    /// Create a new transport with default configuration
    pub fn new(address: &str) -> Result<Self> {
        Self::with_config(address, RpcTransportConfig::default())
    }

    /// Create a new transport with custom configuration
    pub fn with_config(address: &str, config: RpcTransportConfig) -> Result<Self> {
        let url = normalize_rpc_url(address)?;
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connection_timeout)
            .build()?;

        Ok(Self {
            client,
            url,
            config,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Make a JSON-RPC request with retry logic
    async fn make_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        self.make_request_with(method, params, RpcError::is_retryable).await
    }

    /// Make a JSON-RPC request, retrying the errors accepted by `retryable`
    async fn make_request_with(
        &self,
        method: &str,
        params: Value,
        retryable: fn(&RpcError) -> bool,
    ) -> Result<Value, RpcError> {
        let request = JsonRpcRequest::new(rand::random::<u32>(), method, params);
        trace!("Making JSON-RPC request to {}: {}", self.url, method);

        let mut attempt = 0;
        loop {
            match self.make_single_request(&request).await {
                Ok(result) => return Ok(result),
                Err(e) if retryable(&e) && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        "Request {} to {} failed: {}, retrying (attempt {}/{})",
                        method, self.url, e, attempt, self.config.max_retries
                    );
                    sleep(self.config.retry_delay).await;
                }
                Err(e) => {
                    debug!("Request {} failed: {}", method, e);
                    return Err(e);
                }
            }
        }
    }

    /// Make a single JSON-RPC request without retry logic
    async fn make_single_request(&self, request: &JsonRpcRequest<'_>) -> Result<Value, RpcError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RpcError::Timeout(self.config.request_timeout)
                } else if e.is_connect() {
                    RpcError::Connection(e.to_string())
                } else {
                    RpcError::Network(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(RpcError::Http {
                code: response.status().as_u16(),
                reason: response
                    .status()
                    .canonical_reason()
                    .unwrap_or("Unknown error")
                    .to_string(),
            });
        }

        let rpc_response: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| RpcError::InvalidResponse(e.to_string()))?;

        if let Some(error) = rpc_response.error {
            return Err(RpcError::Remote(error));
        }

        // `null` is a valid result, e.g. for a pending receipt
        Ok(rpc_response.result.unwrap_or(Value::Null))
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        self.request_with(method, params, RpcError::is_retryable).await
    }

    async fn request_with<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
        retryable: fn(&RpcError) -> bool,
    ) -> Result<T> {
        let result = self.make_request_with(method, params, retryable).await?;
        serde_json::from_value(result).map_err(|e| {
            anyhow::Error::new(RpcError::UnexpectedResult {
                method: method.to_string(),
                reason: e.to_string(),
            })
        })
    }

    // Poll the block filter until the subscription is dropped
    async fn poll_blocks(self, filter_id: Value, sender: mpsc::Sender<H256>) {
        let mut interval = tokio::time::interval(self.config.poll_interval);
        'poll: loop {
            tokio::select! {
                _ = sender.closed() => break 'poll,
                _ = interval.tick() => {}
            }

            match self
                .request::<Vec<H256>>("eth_getFilterChanges", json!([filter_id]))
                .await
            {
                Ok(blocks) => {
                    for block in blocks {
                        if sender.send(block).await.is_err() {
                            break 'poll;
                        }
                    }
                }
                Err(e) => warn!("Failed polling new blocks: {:#}", e),
            }
        }

        if let Err(e) = self
            .make_request("eth_uninstallFilter", json!([filter_id]))
            .await
        {
            debug!("Failed uninstalling block filter {}: {}", filter_id, e);
        }
        debug!("Block filter {} stopped", filter_id);
    }
}

#[async_trait]
impl Transport for RpcTransport {
    async fn get_chain_id(&self) -> Result<u64> {
        let chain_id: U64 = self.request("eth_chainId", json!([])).await?;
        Ok(chain_id.as_u64())
    }

    async fn get_transaction_count(&self, address: Address) -> Result<U256> {
        self.request("eth_getTransactionCount", json!([address, "latest"]))
            .await
            .with_context(|| format!("Error while fetching transaction count of {:?}", address))
    }

    async fn get_gas_price(&self) -> Result<U256> {
        self.request("eth_gasPrice", json!([])).await
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<U256> {
        self.request("eth_estimateGas", json!([tx]))
            .await
            .context("Error while estimating gas")
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256> {
        self.request_with(
            "eth_sendRawTransaction",
            json!([raw]),
            RpcError::is_retryable_submission,
        )
        .await
    }

    async fn subscribe_new_blocks(&self) -> Result<BlockSubscription> {
        let filter_id: Value = self.make_request("eth_newBlockFilter", json!([])).await?;
        if filter_id.is_null() {
            return Err(anyhow!("Node returned no block filter id"));
        }
        debug!("Installed block filter {}", filter_id);

        let (sender, subscription) = BlockSubscription::channel(BLOCK_CHANNEL_CAPACITY);
        tokio::spawn(self.clone().poll_blocks(filter_id, sender));
        Ok(subscription)
    }

    async fn get_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>> {
        self.request("eth_getTransactionReceipt", json!([hash])).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
    };

    #[test]
    fn test_normalize_rpc_url() {
        assert_eq!(
            normalize_rpc_url("127.0.0.1:8545").unwrap().as_str(),
            "http://127.0.0.1:8545/"
        );
        assert_eq!(
            normalize_rpc_url("https://node.example.org/rpc").unwrap().as_str(),
            "https://node.example.org/rpc"
        );
        assert!(normalize_rpc_url("http://").is_err());
    }

    #[test]
    fn test_default_config() {
        let config = RpcTransportConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_unreachable_node() {
        let transport = RpcTransport::with_config(
            "127.0.0.1:1",
            RpcTransportConfig {
                max_retries: 0,
                request_timeout: Duration::from_secs(2),
                connection_timeout: Duration::from_secs(1),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(transport.get_gas_price().await.is_err());
    }

    // Node answering every request with 503, counting them
    async fn unavailable_node() -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let requests = Arc::new(AtomicUsize::new(0));

        let counter = requests.clone();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                read_request(&mut stream).await;
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = stream
                    .write_all(
                        b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    )
                    .await;
                let _ = stream.shutdown().await;
            }
        });
        (address, requests)
    }

    async fn read_request(stream: &mut TcpStream) {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let Ok(read) = stream.read(&mut chunk).await else { return };
            if read == 0 {
                return;
            }
            buffer.extend_from_slice(&chunk[..read]);

            let text = String::from_utf8_lossy(&buffer);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buffer.len() >= end + 4 + length {
                    return;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_submission_not_retried_on_server_error() {
        let (address, requests) = unavailable_node().await;
        let transport = RpcTransport::with_config(
            &address,
            RpcTransportConfig {
                max_retries: 2,
                retry_delay: Duration::from_millis(10),
                ..Default::default()
            },
        )
        .unwrap();

        let err = transport
            .send_raw_transaction(Bytes::from(vec![0xf8, 0x6b]))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RpcError>(),
            Some(RpcError::Http { code: 503, .. })
        ));
        assert_eq!(requests.load(Ordering::SeqCst), 1);

        // reads are retried
        assert!(transport.get_gas_price().await.is_err());
        assert_eq!(requests.load(Ordering::SeqCst), 1 + 3);
    }
}
