pub mod erc20;
pub mod gas;
pub mod networks;
pub mod provider;
pub mod safe;

pub use gas::{GasOracle, GasSettings};
pub use networks::{ChainHandle, ChainSet, SafeWalletProvider, WalletProvider};
pub use provider::{FeeData, HttpRpc, LogEntry, Rpc, RpcError, TxReceipt};
pub use safe::{MultisigWallet, SafeWallet, WalletCall, WalletError};
