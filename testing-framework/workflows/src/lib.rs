pub mod expectation;
pub mod harness;
pub mod memo;

pub use expectation::{BalanceExpectation, BalanceMismatch, BalanceSnapshot, ExpectationError};
pub use harness::{Deployment, Harness, HarnessError, TransferReceipt, TransferRequest};
pub use memo::WasmHookMemo;
