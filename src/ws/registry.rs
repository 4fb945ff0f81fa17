//! Connection registry: client id → connection handle, channel id → members.
//!
//! Both maps use per-entry locking; no lock is held across a send. Fan-out
//! snapshots the peer senders under the entry lock and releases it before
//! any message is written.

use super::protocol::{DeviceType, ServerMessage};
use crate::error::{GatewayError, Result};
use dashmap::DashMap;
use tokio::sync::mpsc;

/// Frame queued for delivery to one connection.
#[derive(Debug, Clone)]
pub enum Outbound {
    Message(ServerMessage),
    Binary(Vec<u8>),
}

/// Queue depth per connection before backpressure drops fan-outs.
const OUTBOUND_QUEUE: usize = 256;

/// One registered connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub client_id: String,
    pub device_type: DeviceType,
    pub session_id: String,
    pub channel: Option<String>,
    pub sender: mpsc::Sender<Outbound>,
}

/// A peer visible for fan-out.
#[derive(Debug, Clone)]
pub struct Peer {
    pub client_id: String,
    pub device_type: DeviceType,
    pub sender: mpsc::Sender<Outbound>,
}

#[derive(Debug, Default)]
struct ChannelMembers {
    desktop: Option<String>,
    mobile: Option<String>,
}

impl ChannelMembers {
    fn slot_mut(&mut self, device_type: DeviceType) -> &mut Option<String> {
        match device_type {
            DeviceType::Desktop => &mut self.desktop,
            DeviceType::Mobile => &mut self.mobile,
        }
    }

    fn ids(&self) -> impl Iterator<Item = &String> {
        self.desktop.iter().chain(self.mobile.iter())
    }

    fn is_empty(&self) -> bool {
        self.desktop.is_none() && self.mobile.is_none()
    }
}

/// Registry of live connections and channel membership.
#[derive(Default)]
pub struct ConnectionRegistry {
    conns: DashMap<String, ConnectionHandle>,
    channels: DashMap<String, ChannelMembers>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the outbound queue for a new connection.
    pub fn make_queue() -> (mpsc::Sender<Outbound>, mpsc::Receiver<Outbound>) {
        mpsc::channel(OUTBOUND_QUEUE)
    }

    /// Register an identified connection.
    pub fn register(
        &self,
        client_id: &str,
        device_type: DeviceType,
        session_id: &str,
        sender: mpsc::Sender<Outbound>,
    ) {
        self.conns.insert(
            client_id.to_string(),
            ConnectionHandle {
                client_id: client_id.to_string(),
                device_type,
                session_id: session_id.to_string(),
                channel: None,
                sender,
            },
        );
    }

    /// Place a registered connection into a channel.
    ///
    /// # Errors
    ///
    /// `CHANNEL_FULL` when the channel already holds a device of the same
    /// type; `INVALID_CHANNEL` when the connection is not registered.
    pub fn join(&self, client_id: &str, channel: &str) -> Result<()> {
        let device_type = self
            .conns
            .get(client_id)
            .map(|c| c.device_type)
            .ok_or(GatewayError::InvalidChannel)?;

        {
            let mut members = self.channels.entry(channel.to_string()).or_default();
            let slot = members.slot_mut(device_type);
            if slot.is_some() {
                return Err(GatewayError::ChannelFull);
            }
            *slot = Some(client_id.to_string());
        }

        if let Some(mut conn) = self.conns.get_mut(client_id) {
            conn.channel = Some(channel.to_string());
            Ok(())
        } else {
            // connection vanished mid-join; undo the membership
            if let Some(mut members) = self.channels.get_mut(channel) {
                *members.slot_mut(device_type) = None;
            }
            self.drop_channel_if_empty(channel);
            Err(GatewayError::InvalidChannel)
        }
    }

    /// Snapshot of the other members in the caller's channel.
    pub fn peers(&self, client_id: &str) -> Vec<Peer> {
        let Some(channel) = self.conns.get(client_id).and_then(|c| c.channel.clone()) else {
            return Vec::new();
        };
        self.channel_peers(&channel, Some(client_id))
    }

    /// Snapshot of all members of a channel, minus `exclude` if given.
    pub fn channel_peers(&self, channel: &str, exclude: Option<&str>) -> Vec<Peer> {
        let ids: Vec<String> = match self.channels.get(channel) {
            Some(members) => members
                .ids()
                .filter(|id| exclude != Some(id.as_str()))
                .cloned()
                .collect(),
            None => return Vec::new(),
        };
        ids.iter()
            .filter_map(|id| self.conns.get(id))
            .map(|c| Peer {
                client_id: c.client_id.clone(),
                device_type: c.device_type,
                sender: c.sender.clone(),
            })
            .collect()
    }

    /// Device type of a registered connection.
    pub fn device_type(&self, client_id: &str) -> Option<DeviceType> {
        self.conns.get(client_id).map(|c| c.device_type)
    }

    /// Session id of a registered connection.
    pub fn session_id(&self, client_id: &str) -> Option<String> {
        self.conns.get(client_id).map(|c| c.session_id.clone())
    }

    /// Remove a connection. Returns its channel, device type and remaining
    /// peers so the caller can emit administrative events; reports whether
    /// the channel is now gone.
    pub fn unregister(&self, client_id: &str) -> Option<Departure> {
        let (_, conn) = self.conns.remove(client_id)?;
        let channel = conn.channel?;

        if let Some(mut members) = self.channels.get_mut(&channel) {
            let slot = members.slot_mut(conn.device_type);
            if slot.as_deref() == Some(client_id) {
                *slot = None;
            }
        }
        let channel_empty = self.drop_channel_if_empty(&channel);
        let peers = self.channel_peers(&channel, None);
        Some(Departure {
            channel,
            device_type: conn.device_type,
            peers,
            channel_empty,
        })
    }

    fn drop_channel_if_empty(&self, channel: &str) -> bool {
        self.channels
            .remove_if(channel, |_, members| members.is_empty())
            .is_some()
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    /// Whether a channel currently exists.
    pub fn channel_exists(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }
}

/// What `unregister` left behind.
pub struct Departure {
    pub channel: String,
    pub device_type: DeviceType,
    pub peers: Vec<Peer>,
    pub channel_empty: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg_with(reg: &ConnectionRegistry, id: &str, dt: DeviceType) -> mpsc::Receiver<Outbound> {
        let (tx, rx) = ConnectionRegistry::make_queue();
        reg.register(id, dt, &format!("sess-{id}"), tx);
        rx
    }

    #[test]
    fn join_enforces_one_device_per_type() {
        let reg = ConnectionRegistry::new();
        let _d = reg_with(&reg, "d1", DeviceType::Desktop);
        let _m = reg_with(&reg, "m1", DeviceType::Mobile);
        let _d2 = reg_with(&reg, "d2", DeviceType::Desktop);

        reg.join("d1", "pair-000001").expect("desktop joins");
        reg.join("m1", "pair-000001").expect("mobile joins");
        let err = reg.join("d2", "pair-000001").unwrap_err();
        assert_eq!(err.wire_code(), "CHANNEL_FULL");
    }

    #[test]
    fn join_requires_registration() {
        let reg = ConnectionRegistry::new();
        let err = reg.join("ghost", "pair-000001").unwrap_err();
        assert_eq!(err.wire_code(), "INVALID_CHANNEL");
        assert!(!reg.channel_exists("pair-000001"));
    }

    #[test]
    fn peers_excludes_self() {
        let reg = ConnectionRegistry::new();
        let _d = reg_with(&reg, "d1", DeviceType::Desktop);
        let _m = reg_with(&reg, "m1", DeviceType::Mobile);
        reg.join("d1", "pair-000002").expect("join");
        reg.join("m1", "pair-000002").expect("join");

        let peers = reg.peers("d1");
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].client_id, "m1");
        assert_eq!(peers[0].device_type, DeviceType::Mobile);
    }

    #[test]
    fn unregister_reports_departure_and_drops_empty_channel() {
        let reg = ConnectionRegistry::new();
        let _d = reg_with(&reg, "d1", DeviceType::Desktop);
        let _m = reg_with(&reg, "m1", DeviceType::Mobile);
        reg.join("d1", "pair-000003").expect("join");
        reg.join("m1", "pair-000003").expect("join");

        let dep = reg.unregister("d1").expect("departure");
        assert_eq!(dep.channel, "pair-000003");
        assert_eq!(dep.device_type, DeviceType::Desktop);
        assert_eq!(dep.peers.len(), 1);
        assert!(!dep.channel_empty);
        assert!(reg.channel_exists("pair-000003"));

        let dep = reg.unregister("m1").expect("departure");
        assert!(dep.channel_empty);
        assert!(!reg.channel_exists("pair-000003"));
        assert!(reg.is_empty());
    }

    #[test]
    fn freed_slot_can_be_rejoined() {
        let reg = ConnectionRegistry::new();
        let _d = reg_with(&reg, "d1", DeviceType::Desktop);
        let _m = reg_with(&reg, "m1", DeviceType::Mobile);
        reg.join("d1", "pair-000004").expect("join");
        reg.join("m1", "pair-000004").expect("join");
        reg.unregister("d1");

        let _d2 = reg_with(&reg, "d2", DeviceType::Desktop);
        reg.join("d2", "pair-000004").expect("slot is free again");
    }
}
