//! In-process liquid-staking contract for the mock backend.
//!
//! Receives IBC vouchers (usually through a wasm hook), burns them and mints
//! `{ls_prefix}{base_denom}` for the receiver, optionally sending the minted
//! tokens back out over a transfer channel. `claim` hands the staked voucher
//! denom back to the original sender for liquid tokens left in the contract.

use std::sync::Arc;

use interchain_testing_core::mock::{CodeFactory, ContractContext, MockContract};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const ARTIFACT: &str = "ica_liquid_staking.wasm";
pub const LS_PREFIX: &str = "stk/";

#[derive(Debug, thiserror::Error)]
pub enum LiquidStakeError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Not active")]
    NotActive,
    #[error("No funds sent")]
    NoFunds,
    #[error("Too many funds sent")]
    TooManyFunds,
    #[error("Invalid denom {denom}")]
    InvalidDenom { denom: String },
    #[error("No claimable tokens")]
    NoClaimableTokens,
    #[error("contract is not instantiated")]
    NotInstantiated,
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    #[error("{0}")]
    Bank(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    pub ibc_transfer_timeout: String,
    pub ica_timeout: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstantiateMsg {
    pub ls_prefix: String,
    #[serde(default)]
    pub timeouts: Option<Timeouts>,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            ibc_transfer_timeout: "5".to_owned(),
            ica_timeout: "10".to_owned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecuteMsg {
    LiquidStake {
        receiver: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transfer_channel: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recovery_address: Option<String>,
    },
    UpdateConfig {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        active: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ls_prefix: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeouts: Option<Timeouts>,
    },
    Claim {},
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMsg {
    LsConfig {},
    IbcConfig {},
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LsConfig {
    pub active: bool,
    pub ls_prefix: String,
}

#[derive(Clone, Debug)]
struct State {
    admin: String,
    config: LsConfig,
    timeouts: Timeouts,
}

/// Last liquid stake, kept for `claim`.
#[derive(Clone, Debug)]
struct PendingClaim {
    sender: String,
    receiver: String,
    ibc_denom: String,
    ls_token_denom: String,
    prev_ls_token_balance: u128,
}

#[derive(Clone, Debug, Default)]
pub struct LiquidStakeContract {
    state: Option<State>,
    pending: Option<PendingClaim>,
}

#[must_use]
pub fn code_factory() -> CodeFactory {
    Arc::new(|| Box::new(LiquidStakeContract::default()) as Box<dyn MockContract>)
}

#[must_use]
pub fn instantiate_msg() -> Value {
    json!({
        "ls_prefix": LS_PREFIX,
        "timeouts": Timeouts::default(),
    })
}

#[must_use]
pub fn liquid_stake_msg(
    receiver: &str,
    transfer_channel: Option<&str>,
    recovery_address: Option<&str>,
) -> Value {
    to_value(&ExecuteMsg::LiquidStake {
        receiver: receiver.to_owned(),
        transfer_channel: transfer_channel.map(str::to_owned),
        recovery_address: recovery_address.map(str::to_owned),
    })
}

#[must_use]
pub fn update_config_msg(
    active: Option<bool>,
    ls_prefix: Option<&str>,
    timeouts: Option<Timeouts>,
) -> Value {
    to_value(&ExecuteMsg::UpdateConfig {
        active,
        ls_prefix: ls_prefix.map(str::to_owned),
        timeouts,
    })
}

#[must_use]
pub fn claim_msg() -> Value {
    to_value(&ExecuteMsg::Claim {})
}

#[must_use]
pub fn ls_config_query() -> Value {
    to_value(&QueryMsg::LsConfig {})
}

#[must_use]
pub fn ibc_config_query() -> Value {
    to_value(&QueryMsg::IbcConfig {})
}

fn to_value<T: Serialize>(msg: &T) -> Value {
    serde_json::to_value(msg).unwrap_or(Value::Null)
}

impl LiquidStakeContract {
    fn state_mut(&mut self) -> Result<&mut State, LiquidStakeError> {
        self.state.as_mut().ok_or(LiquidStakeError::NotInstantiated)
    }

    fn liquid_stake(
        &mut self,
        ctx: &mut ContractContext<'_>,
        receiver: &str,
        transfer_channel: Option<&str>,
    ) -> Result<(), LiquidStakeError> {
        let config = self.state_mut()?.config.clone();
        if !config.active {
            return Err(LiquidStakeError::NotActive);
        }

        let coin = match ctx.funds() {
            [] => return Err(LiquidStakeError::NoFunds),
            [coin] => coin.clone(),
            _ => return Err(LiquidStakeError::TooManyFunds),
        };
        let trace = ctx
            .denom_trace(&coin.denom)
            .ok_or_else(|| LiquidStakeError::InvalidDenom {
                denom: coin.denom.clone(),
            })?;

        let ls_token_denom = format!("{}{}", config.ls_prefix, trace.base_denom);
        let contract = ctx.contract_address().to_owned();
        let prev_ls_token_balance = ctx.balance(&contract, &ls_token_denom);

        ctx.burn(&coin.denom, coin.amount)
            .map_err(LiquidStakeError::Bank)?;
        ctx.mint(&ls_token_denom, coin.amount);

        match transfer_channel {
            Some(channel) => {
                ctx.ibc_transfer(channel, receiver, &ls_token_denom, coin.amount)
                    .map_err(LiquidStakeError::Bank)?;
            }
            None => ctx
                .send(receiver, &ls_token_denom, coin.amount)
                .map_err(LiquidStakeError::Bank)?,
        }

        self.pending = Some(PendingClaim {
            sender: ctx.sender().to_owned(),
            receiver: receiver.to_owned(),
            ibc_denom: coin.denom,
            ls_token_denom,
            prev_ls_token_balance,
        });
        Ok(())
    }

    fn update_config(
        &mut self,
        sender: &str,
        active: Option<bool>,
        ls_prefix: Option<String>,
        timeouts: Option<Timeouts>,
    ) -> Result<(), LiquidStakeError> {
        let state = self.state_mut()?;
        if sender != state.admin {
            return Err(LiquidStakeError::Unauthorized);
        }
        if let Some(active) = active {
            state.config.active = active;
        }
        if let Some(ls_prefix) = ls_prefix {
            state.config.ls_prefix = ls_prefix;
        }
        if let Some(timeouts) = timeouts {
            state.timeouts = timeouts;
        }
        Ok(())
    }

    fn claim(&mut self, ctx: &mut ContractContext<'_>) -> Result<(), LiquidStakeError> {
        if !self.state_mut()?.config.active {
            return Err(LiquidStakeError::NotActive);
        }
        let pending = self
            .pending
            .clone()
            .ok_or(LiquidStakeError::NoClaimableTokens)?;
        if pending.receiver != ctx.sender() {
            return Err(LiquidStakeError::Unauthorized);
        }

        let contract = ctx.contract_address().to_owned();
        let balance = ctx.balance(&contract, &pending.ls_token_denom);
        let amount = balance
            .checked_sub(pending.prev_ls_token_balance)
            .filter(|amount| *amount > 0)
            .ok_or(LiquidStakeError::NoClaimableTokens)?;

        ctx.send(&pending.sender, &pending.ibc_denom, amount)
            .map_err(LiquidStakeError::Bank)?;
        self.pending = None;
        Ok(())
    }
}

impl MockContract for LiquidStakeContract {
    fn instantiate(&mut self, ctx: &mut ContractContext<'_>, msg: &Value) -> Result<(), String> {
        let msg: InstantiateMsg = serde_json::from_value(msg.clone())
            .map_err(|e| LiquidStakeError::InvalidMessage(e.to_string()).to_string())?;
        self.state = Some(State {
            admin: ctx.sender().to_owned(),
            config: LsConfig {
                active: true,
                ls_prefix: msg.ls_prefix,
            },
            timeouts: msg.timeouts.unwrap_or_default(),
        });
        Ok(())
    }

    fn execute(&mut self, ctx: &mut ContractContext<'_>, msg: &Value) -> Result<(), String> {
        let msg: ExecuteMsg = serde_json::from_value(msg.clone())
            .map_err(|e| LiquidStakeError::InvalidMessage(e.to_string()).to_string())?;
        let outcome = match msg {
            ExecuteMsg::LiquidStake {
                receiver,
                transfer_channel,
                ..
            } => self.liquid_stake(ctx, &receiver, transfer_channel.as_deref()),
            ExecuteMsg::UpdateConfig {
                active,
                ls_prefix,
                timeouts,
            } => {
                let sender = ctx.sender().to_owned();
                self.update_config(&sender, active, ls_prefix, timeouts)
            }
            ExecuteMsg::Claim {} => self.claim(ctx),
        };
        outcome.map_err(|e| e.to_string())
    }

    fn query(&self, msg: &Value) -> Result<Value, String> {
        let msg: QueryMsg = serde_json::from_value(msg.clone())
            .map_err(|e| LiquidStakeError::InvalidMessage(e.to_string()).to_string())?;
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| LiquidStakeError::NotInstantiated.to_string())?;
        match msg {
            QueryMsg::LsConfig {} => serde_json::to_value(&state.config),
            QueryMsg::IbcConfig {} => serde_json::to_value(&state.timeouts),
        }
        .map_err(|e| e.to_string())
    }

    fn clone_box(&self) -> Box<dyn MockContract> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_use_snake_case_envelopes() {
        assert_eq!(
            liquid_stake_msg("persistence1user", None, None),
            json!({ "liquid_stake": { "receiver": "persistence1user" } })
        );
        assert_eq!(
            liquid_stake_msg("cosmos1user", Some("channel-0"), Some("persistence1rec")),
            json!({
                "liquid_stake": {
                    "receiver": "cosmos1user",
                    "transfer_channel": "channel-0",
                    "recovery_address": "persistence1rec"
                }
            })
        );
        assert_eq!(
            update_config_msg(Some(false), None, None),
            json!({ "update_config": { "active": false } })
        );
        assert_eq!(claim_msg(), json!({ "claim": {} }));
        assert_eq!(ls_config_query(), json!({ "ls_config": {} }));
    }

    #[test]
    fn instantiate_msg_parses() {
        let msg: InstantiateMsg = serde_json::from_value(instantiate_msg()).expect("parse");
        assert_eq!(msg.ls_prefix, LS_PREFIX);
        assert_eq!(
            msg.timeouts.map(|t| t.ica_timeout),
            Some("10".to_owned())
        );
    }
}
