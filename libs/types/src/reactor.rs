//! Reactor registration records
//!
//! A [`ReactorDescriptor`] is what a node announces about itself, either in
//! static configuration or through a `register` control message.

use crate::group::PacketGroup;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a reactor declares it can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ReactorCapability {
    /// Atoms of one specific group
    Group(PacketGroup),
    /// Member of the general-purpose fallback pool
    General,
}

impl fmt::Display for ReactorCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReactorCapability::Group(group) => write!(f, "{}", group),
            ReactorCapability::General => f.write_str("general"),
        }
    }
}

impl FromStr for ReactorCapability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("general") {
            return Ok(ReactorCapability::General);
        }
        s.parse::<PacketGroup>()
            .map(ReactorCapability::Group)
            .map_err(|e| e.to_string())
    }
}

impl TryFrom<String> for ReactorCapability {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReactorCapability> for String {
    fn from(value: ReactorCapability) -> Self {
        value.to_string()
    }
}

fn default_capacity() -> u32 {
    100
}

/// Static reactor registration: `{id, name, endpoint, types, capacity}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactorDescriptor {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// `host:port` of the reactor's wire listener
    pub endpoint: String,
    #[serde(default)]
    pub types: Vec<ReactorCapability>,
    #[serde(default = "default_capacity")]
    pub capacity: u32,
}

impl ReactorDescriptor {
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            endpoint: endpoint.into(),
            types: Vec::new(),
            capacity: default_capacity(),
        }
    }

    pub fn with_types(mut self, types: impl IntoIterator<Item = ReactorCapability>) -> Self {
        self.types = types.into_iter().collect();
        self
    }

    pub fn with_groups(mut self, groups: impl IntoIterator<Item = PacketGroup>) -> Self {
        self.types = groups.into_iter().map(ReactorCapability::Group).collect();
        self
    }

    pub fn handles(&self, group: PacketGroup) -> bool {
        self.types.contains(&ReactorCapability::Group(group))
    }

    /// General pool: declares `general` or declares nothing at all
    pub fn is_general(&self) -> bool {
        self.types.is_empty() || self.types.contains(&ReactorCapability::General)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_descriptor_deserializes_capabilities() {
        let descriptor: ReactorDescriptor = serde_json::from_value(json!({
            "id": "r1",
            "endpoint": "127.0.0.1:7401",
            "types": ["cf", "DF", "general"],
        }))
        .unwrap();
        assert!(descriptor.handles(PacketGroup::CF));
        assert!(descriptor.handles(PacketGroup::DF));
        assert!(!descriptor.handles(PacketGroup::MC));
        assert!(descriptor.is_general());
        assert_eq!(descriptor.capacity, 100);
    }

    #[test]
    fn test_unknown_capability_is_rejected() {
        let result: Result<ReactorDescriptor, _> = serde_json::from_value(json!({
            "id": "r1",
            "endpoint": "127.0.0.1:7401",
            "types": ["gpu"],
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_untyped_reactor_is_general() {
        let descriptor = ReactorDescriptor::new("r2", "127.0.0.1:7402");
        assert!(descriptor.is_general());
        assert!(!descriptor.with_groups([PacketGroup::ED]).is_general());
    }
}
