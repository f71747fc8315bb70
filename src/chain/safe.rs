use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Address, Bytes, TxKind, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use super::gas::GasSettings;
use super::provider::{Rpc, RpcError};

sol! {
    function getOwners() external view returns (address[] owners);
    function getThreshold() external view returns (uint256);
    function nonce() external view returns (uint256);
    function getTransactionHash(
        address to,
        uint256 value,
        bytes data,
        uint8 operation,
        uint256 safeTxGas,
        uint256 baseGas,
        uint256 gasPrice,
        address gasToken,
        address refundReceiver,
        uint256 _nonce
    ) external view returns (bytes32);
    function execTransaction(
        address to,
        uint256 value,
        bytes data,
        uint8 operation,
        uint256 safeTxGas,
        uint256 baseGas,
        uint256 gasPrice,
        address gasToken,
        address refundReceiver,
        bytes signatures
    ) external payable returns (bool);
}

/// Gas headroom added on top of the node's estimate for the outer call.
const GAS_ESTIMATE_BUMP_PCT: u64 = 20;

/// Fallback gas limit when estimation fails and the quote has no hint.
const FALLBACK_GAS_LIMIT: u64 = 600_000;

/// Safe wrapper overhead added to a quote's inner-call gas hint.
const WALLET_OVERHEAD_GAS: u64 = 150_000;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("malformed wallet response: {0}")]
    Malformed(String),
}

/// A single call the wallet should carry.
#[derive(Debug, Clone)]
pub struct WalletCall {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

/// Multi-signature smart-contract wallet for one `(wallet, chain)` pair.
/// Reads tolerate concurrent use; broadcasts are serialised by the caller's
/// per-trade lease.
#[async_trait]
pub trait MultisigWallet: Send + Sync {
    fn address(&self) -> Address;

    async fn owners(&self) -> Result<Vec<Address>, WalletError>;

    async fn threshold(&self) -> Result<u32, WalletError>;

    /// Build, sign as the agent owner, and broadcast a wallet transaction
    /// carrying `call`. Returns the outer transaction hash; the caller awaits
    /// the receipt through the RPC adapter.
    async fn execute(
        &self,
        call: WalletCall,
        gas: GasSettings,
        gas_limit_hint: Option<u64>,
    ) -> Result<B256, WalletError>;
}

// ---------------------------------------------------------------------------
// Safe implementation
// ---------------------------------------------------------------------------

/// Gnosis-Safe-style wallet driven by a single agent owner against a
/// threshold-of-one policy. The safe transaction hash is produced by the
/// contract itself, signed locally, and submitted via `execTransaction`.
pub struct SafeWallet {
    rpc: Arc<dyn Rpc>,
    signer: PrivateKeySigner,
    address: Address,
    chain_id: u64,
}

impl SafeWallet {
    pub fn new(
        rpc: Arc<dyn Rpc>,
        signer: PrivateKeySigner,
        address: Address,
        chain_id: u64,
    ) -> Self {
        Self {
            rpc,
            signer,
            address,
            chain_id,
        }
    }

    pub fn signer_address(&self) -> Address {
        self.signer.address()
    }

    async fn safe_nonce(&self) -> Result<U256, WalletError> {
        let ret = self
            .rpc
            .call(self.address, nonceCall {}.abi_encode().into())
            .await?;
        word(&ret).ok_or_else(|| WalletError::Malformed("nonce".into()))
    }

    async fn safe_tx_hash(&self, call: &WalletCall, nonce: U256) -> Result<B256, WalletError> {
        let data = getTransactionHashCall {
            to: call.to,
            value: call.value,
            data: call.data.clone(),
            operation: 0,
            safeTxGas: U256::ZERO,
            baseGas: U256::ZERO,
            gasPrice: U256::ZERO,
            gasToken: Address::ZERO,
            refundReceiver: Address::ZERO,
            _nonce: nonce,
        }
        .abi_encode();

        let ret = self.rpc.call(self.address, data.into()).await?;
        if ret.len() < 32 {
            return Err(WalletError::Malformed("transaction hash".into()));
        }
        Ok(B256::from_slice(&ret[..32]))
    }

    fn owner_signature(&self, hash: B256) -> Result<Bytes, WalletError> {
        let sig = self
            .signer
            .sign_hash_sync(&hash)
            .map_err(|e| WalletError::Signing(e.to_string()))?;

        // r || s || v with v in {27, 28}, the wallet's ECDSA convention.
        let mut out = Vec::with_capacity(65);
        out.extend_from_slice(&sig.r().to_be_bytes::<32>());
        out.extend_from_slice(&sig.s().to_be_bytes::<32>());
        out.push(27 + sig.v() as u8);
        Ok(out.into())
    }

    async fn gas_limit(&self, exec_data: &Bytes, hint: Option<u64>) -> u64 {
        match self
            .rpc
            .estimate_gas(self.signer.address(), self.address, exec_data, U256::ZERO)
            .await
        {
            Ok(estimate) => estimate.saturating_mul(100 + GAS_ESTIMATE_BUMP_PCT) / 100,
            Err(e) => {
                tracing::warn!(error = %e, "Gas estimation failed, using hint/fallback");
                hint.map(|h| h + WALLET_OVERHEAD_GAS)
                    .unwrap_or(FALLBACK_GAS_LIMIT)
            }
        }
    }
}

#[async_trait]
impl MultisigWallet for SafeWallet {
    fn address(&self) -> Address {
        self.address
    }

    async fn owners(&self) -> Result<Vec<Address>, WalletError> {
        let ret = self
            .rpc
            .call(self.address, getOwnersCall {}.abi_encode().into())
            .await?;
        decode_address_array(&ret).ok_or_else(|| WalletError::Malformed("owners".into()))
    }

    async fn threshold(&self) -> Result<u32, WalletError> {
        let ret = self
            .rpc
            .call(self.address, getThresholdCall {}.abi_encode().into())
            .await?;
        word(&ret)
            .map(|u| u.to::<u32>())
            .ok_or_else(|| WalletError::Malformed("threshold".into()))
    }

    async fn execute(
        &self,
        call: WalletCall,
        gas: GasSettings,
        gas_limit_hint: Option<u64>,
    ) -> Result<B256, WalletError> {
        let safe_nonce = self.safe_nonce().await?;
        let hash = self.safe_tx_hash(&call, safe_nonce).await?;
        let signatures = self.owner_signature(hash)?;

        let exec_data: Bytes = execTransactionCall {
            to: call.to,
            value: call.value,
            data: call.data,
            operation: 0,
            safeTxGas: U256::ZERO,
            baseGas: U256::ZERO,
            gasPrice: U256::ZERO,
            gasToken: Address::ZERO,
            refundReceiver: Address::ZERO,
            signatures,
        }
        .abi_encode()
        .into();

        let gas_limit = self.gas_limit(&exec_data, gas_limit_hint).await;
        let nonce = self.rpc.transaction_count(self.signer.address()).await?;

        let envelope: TxEnvelope = match gas {
            GasSettings::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => {
                let tx = TxEip1559 {
                    chain_id: self.chain_id,
                    nonce,
                    gas_limit,
                    max_fee_per_gas,
                    max_priority_fee_per_gas,
                    to: TxKind::Call(self.address),
                    value: U256::ZERO,
                    access_list: Default::default(),
                    input: exec_data,
                };
                let sig = self
                    .signer
                    .sign_hash_sync(&tx.signature_hash())
                    .map_err(|e| WalletError::Signing(e.to_string()))?;
                tx.into_signed(sig).into()
            }
            GasSettings::Legacy { gas_price } => {
                let tx = TxLegacy {
                    chain_id: Some(self.chain_id),
                    nonce,
                    gas_price,
                    gas_limit,
                    to: TxKind::Call(self.address),
                    value: U256::ZERO,
                    input: exec_data,
                };
                let sig = self
                    .signer
                    .sign_hash_sync(&tx.signature_hash())
                    .map_err(|e| WalletError::Signing(e.to_string()))?;
                tx.into_signed(sig).into()
            }
        };

        let raw: Bytes = envelope.encoded_2718().into();
        let tx_hash = self.rpc.send_raw(raw).await?;

        tracing::info!(
            wallet = %self.address,
            tx_hash = %tx_hash,
            gas_limit,
            "Wallet transaction broadcast"
        );

        Ok(tx_hash)
    }
}

fn word(ret: &Bytes) -> Option<U256> {
    if ret.len() < 32 {
        return None;
    }
    Some(U256::from_be_slice(&ret[..32]))
}

/// Decode a returned dynamic `address[]`.
fn decode_address_array(ret: &Bytes) -> Option<Vec<Address>> {
    if ret.len() < 64 {
        return None;
    }
    let offset: usize = U256::from_be_slice(&ret[..32]).try_into().ok()?;
    let len_end = offset.checked_add(32)?;
    if ret.len() < len_end {
        return None;
    }
    let len: usize = U256::from_be_slice(&ret[offset..len_end]).try_into().ok()?;
    let mut out = Vec::with_capacity(len);
    for i in 0..len {
        let start = len_end.checked_add(i.checked_mul(32)?)?;
        let end = start.checked_add(32)?;
        if ret.len() < end {
            return None;
        }
        out.push(Address::from_slice(&ret[start + 12..end]));
    }
    Some(out)
}
