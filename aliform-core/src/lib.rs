//! Aliform Core
//!
//! Contract between an infrastructure-as-code host and the Alibaba Cloud
//! provider: resource and state values, the Provider trait, and the differs
//! used to decide which remote calls an update needs.

pub mod differ;
pub mod provider;
pub mod resource;
