//! Window adapter options

use bus::ChannelId;
use serde::{Deserialize, Serialize};

use crate::log::LogLevel;

/// A single value or a list, as accepted in option files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        match self {
            OneOrMany::One(item) => vec![item.clone()],
            OneOrMany::Many(items) => items.clone(),
        }
    }
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl<T> From<T> for OneOrMany<T> {
    fn from(item: T) -> Self {
        OneOrMany::One(item)
    }
}

impl<T> From<Vec<T>> for OneOrMany<T> {
    fn from(items: Vec<T>) -> Self {
        OneOrMany::Many(items)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WindowAdapterOptions {
    /// Origins allowed to talk to us; `*` allows any
    pub origins: OneOrMany<String>,

    /// Inbound channel restriction. Empty means unrestricted.
    pub available_channel_ids: OneOrMany<ChannelId>,

    /// Stamped on every outbound message
    pub channel_id: Option<ChannelId>,

    pub log_level: LogLevel,
}

impl WindowAdapterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_origins(mut self, origins: impl Into<OneOrMany<String>>) -> Self {
        self.origins = origins.into();
        self
    }

    pub fn with_available_channel_ids(mut self, ids: impl Into<OneOrMany<ChannelId>>) -> Self {
        self.available_channel_ids = ids.into();
        self
    }

    pub fn with_channel_id(mut self, channel_id: impl Into<ChannelId>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn origin_list(&self) -> Vec<String> {
        self.origins.to_vec()
    }

    pub fn channel_list(&self) -> Vec<ChannelId> {
        self.available_channel_ids.to_vec()
    }
}
