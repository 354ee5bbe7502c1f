//! Infrastructure intermediate representation
//!
//! Describes the proxy fleet that must exist to serve one gateway.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Infra {
    pub proxy: ProxyInfra,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyInfra {
    pub name: String,
    pub namespace: String,
    pub listeners: Vec<ProxyListener>,
}

impl ProxyInfra {
    pub fn ports(&self) -> impl Iterator<Item = u16> + '_ {
        self.listeners.iter().map(|listener| listener.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyListener {
    pub name: String,
    pub port: u16,
}
