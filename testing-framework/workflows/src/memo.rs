use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Transfer memo asking the destination chain to run a contract with the
/// received funds: `{"wasm":{"contract":"..","msg":{..}}}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WasmHookMemo {
    wasm: WasmHook,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct WasmHook {
    contract: String,
    msg: Value,
}

impl WasmHookMemo {
    #[must_use]
    pub fn new(contract: impl Into<String>, msg: Value) -> Self {
        Self {
            wasm: WasmHook {
                contract: contract.into(),
                msg,
            },
        }
    }

    #[must_use]
    pub fn contract(&self) -> &str {
        &self.wasm.contract
    }

    #[must_use]
    pub const fn msg(&self) -> &Value {
        &self.wasm.msg
    }

    pub fn parse(memo: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(memo)
    }
}

impl fmt::Display for WasmHookMemo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&raw)
    }
}
