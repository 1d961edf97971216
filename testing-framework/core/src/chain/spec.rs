use std::fmt;

use serde::{Deserialize, Serialize};

/// Chain software driven through the [`NetworkHandle`](super::NetworkHandle)
/// capability interface.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainKind {
    #[default]
    Cosmos,
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cosmos => f.write_str("cosmos"),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DockerImage {
    pub repository: String,
    pub version: String,
    /// `uid:gid` the container runs as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid_gid: Option<String>,
}

impl DockerImage {
    #[must_use]
    pub fn new(repository: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            version: version.into(),
            uid_gid: None,
        }
    }

    #[must_use]
    pub fn with_uid_gid(mut self, uid_gid: impl Into<String>) -> Self {
        self.uid_gid = Some(uid_gid.into());
        self
    }

    #[must_use]
    pub fn reference(&self) -> String {
        format!("{}:{}", self.repository, self.version)
    }
}

/// One genesis override, addressed by a dotted path such as
/// `app_state.gov.params.min_deposit.0.denom`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenesisKv {
    pub key: String,
    pub value: serde_json::Value,
}

impl GenesisKv {
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Declarative description of a chain network, handed to a
/// [`ChainFactory`](super::ChainFactory).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainSpec {
    pub name: String,
    pub chain_id: String,
    #[serde(default)]
    pub kind: ChainKind,
    pub binary: String,
    #[serde(default)]
    pub images: Vec<DockerImage>,
    pub denom: String,
    pub bech32_prefix: String,
    #[serde(default)]
    pub gas_prices: String,
    #[serde(default = "default_gas_adjustment")]
    pub gas_adjustment: f64,
    #[serde(default = "default_coin_type")]
    pub coin_type: u32,
    #[serde(default = "default_validators")]
    pub validators: usize,
    #[serde(default)]
    pub full_nodes: usize,
    #[serde(default)]
    pub genesis_overrides: Vec<GenesisKv>,
    /// Newer SDK binaries moved genesis commands under `genesis`.
    #[serde(default)]
    pub using_new_genesis_command: bool,
    #[serde(default = "default_trusting_period")]
    pub trusting_period: String,
}

const fn default_gas_adjustment() -> f64 {
    1.5
}

const fn default_coin_type() -> u32 {
    118
}

const fn default_validators() -> usize {
    1
}

fn default_trusting_period() -> String {
    "112h".to_owned()
}

impl ChainSpec {
    #[must_use]
    pub fn cosmos(
        name: impl Into<String>,
        chain_id: impl Into<String>,
        binary: impl Into<String>,
        denom: impl Into<String>,
        bech32_prefix: impl Into<String>,
    ) -> Self {
        let denom = denom.into();
        Self {
            name: name.into(),
            chain_id: chain_id.into(),
            kind: ChainKind::Cosmos,
            binary: binary.into(),
            images: Vec::new(),
            gas_prices: format!("0{denom}"),
            denom,
            bech32_prefix: bech32_prefix.into(),
            gas_adjustment: default_gas_adjustment(),
            coin_type: default_coin_type(),
            validators: default_validators(),
            full_nodes: 0,
            genesis_overrides: Vec::new(),
            using_new_genesis_command: false,
            trusting_period: default_trusting_period(),
        }
    }

    #[must_use]
    pub fn with_image(mut self, image: DockerImage) -> Self {
        self.images.push(image);
        self
    }

    #[must_use]
    pub const fn with_node_counts(mut self, validators: usize, full_nodes: usize) -> Self {
        self.validators = validators;
        self.full_nodes = full_nodes;
        self
    }

    #[must_use]
    pub fn with_genesis_overrides(mut self, overrides: Vec<GenesisKv>) -> Self {
        self.genesis_overrides = overrides;
        self
    }

    #[must_use]
    pub fn with_gas_prices(mut self, gas_prices: impl Into<String>) -> Self {
        self.gas_prices = gas_prices.into();
        self
    }

    #[must_use]
    pub const fn with_new_genesis_command(mut self, enabled: bool) -> Self {
        self.using_new_genesis_command = enabled;
        self
    }

    #[must_use]
    pub const fn node_count(&self) -> usize {
        self.validators + self.full_nodes
    }

    #[must_use]
    pub fn primary_image(&self) -> Option<&DockerImage> {
        self.images.first()
    }
}
