//! Declarative description of the networks, relayers and links a scenario
//! needs, handed once to the build sequencer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{chain::NetworkHandle, ibc::ChannelOptions, relayer::Relayer};

#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("{kind} {id} is already part of the topology")]
    DuplicateIdentity { kind: &'static str, id: String },
    #[error("link {path} names unknown {kind} {id}")]
    UnknownMember {
        path: String,
        kind: &'static str,
        id: String,
    },
}

/// A messaging path between two networks, mediated by one relayer.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub chain1: String,
    pub chain2: String,
    pub relayer: String,
    pub path: String,
    #[serde(default)]
    pub channel: ChannelOptions,
}

impl Link {
    #[must_use]
    pub fn new(
        chain1: impl Into<String>,
        chain2: impl Into<String>,
        relayer: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            chain1: chain1.into(),
            chain2: chain2.into(),
            relayer: relayer.into(),
            path: path.into(),
            channel: ChannelOptions::default(),
        }
    }

    #[must_use]
    pub fn with_channel(mut self, channel: ChannelOptions) -> Self {
        self.channel = channel;
        self
    }

    #[must_use]
    pub fn touches(&self, chain_id: &str) -> bool {
        self.chain1 == chain_id || self.chain2 == chain_id
    }
}

/// Networks, relayers and links in declaration order.
#[derive(Clone, Default)]
pub struct TopologyGraph {
    networks: Vec<Arc<dyn NetworkHandle>>,
    relayers: Vec<(String, Arc<dyn Relayer>)>,
    links: Vec<Link>,
}

impl TopologyGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_network(
        &mut self,
        network: Arc<dyn NetworkHandle>,
    ) -> Result<&mut Self, TopologyError> {
        if self.network(network.chain_id()).is_some() {
            return Err(TopologyError::DuplicateIdentity {
                kind: "network",
                id: network.chain_id().to_owned(),
            });
        }
        self.networks.push(network);
        Ok(self)
    }

    pub fn add_relayer(
        &mut self,
        name: impl Into<String>,
        relayer: Arc<dyn Relayer>,
    ) -> Result<&mut Self, TopologyError> {
        let name = name.into();
        if self.relayer(&name).is_some() {
            return Err(TopologyError::DuplicateIdentity {
                kind: "relayer",
                id: name,
            });
        }
        self.relayers.push((name, relayer));
        Ok(self)
    }

    pub fn add_link(&mut self, link: Link) -> Result<&mut Self, TopologyError> {
        if self.link(&link.path).is_some() {
            return Err(TopologyError::DuplicateIdentity {
                kind: "path",
                id: link.path,
            });
        }
        for chain_id in [&link.chain1, &link.chain2] {
            if self.network(chain_id).is_none() {
                return Err(TopologyError::UnknownMember {
                    path: link.path.clone(),
                    kind: "network",
                    id: chain_id.clone(),
                });
            }
        }
        if self.relayer(&link.relayer).is_none() {
            return Err(TopologyError::UnknownMember {
                path: link.path.clone(),
                kind: "relayer",
                id: link.relayer.clone(),
            });
        }
        self.links.push(link);
        Ok(self)
    }

    #[must_use]
    pub fn networks(&self) -> &[Arc<dyn NetworkHandle>] {
        &self.networks
    }

    #[must_use]
    pub fn network(&self, chain_id: &str) -> Option<&Arc<dyn NetworkHandle>> {
        self.networks.iter().find(|n| n.chain_id() == chain_id)
    }

    pub fn relayers(&self) -> impl Iterator<Item = (&str, &Arc<dyn Relayer>)> {
        self.relayers.iter().map(|(name, r)| (name.as_str(), r))
    }

    #[must_use]
    pub fn relayer(&self, name: &str) -> Option<&Arc<dyn Relayer>> {
        self.relayers
            .iter()
            .find_map(|(n, relayer)| (n == name).then_some(relayer))
    }

    #[must_use]
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    #[must_use]
    pub fn link(&self, path: &str) -> Option<&Link> {
        self.links.iter().find(|l| l.path == path)
    }

    /// Networks touched by any link of `relayer`, in declaration order.
    #[must_use]
    pub fn networks_for_relayer(&self, relayer: &str) -> Vec<Arc<dyn NetworkHandle>> {
        self.networks
            .iter()
            .filter(|network| {
                self.links
                    .iter()
                    .any(|l| l.relayer == relayer && l.touches(network.chain_id()))
            })
            .cloned()
            .collect()
    }

    pub fn links_for_relayer<'a>(&'a self, relayer: &'a str) -> impl Iterator<Item = &'a Link> {
        self.links.iter().filter(move |l| l.relayer == relayer)
    }
}
