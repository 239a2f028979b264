//! The switch aggregate: flow table, port table, controller connections
//! and the datapath-provider handle, composed behind one object.
//!
//! The switch runs inside a host poll loop: [`run`](struct.Switch.html#method.run)
//! does a bounded unit of work and never blocks, [`wait`](struct.Switch.html#method.wait)
//! registers wakeups. There is no internal parallelism; everything on
//! this struct is single-threaded.

pub mod connection;
mod dispatch;

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use rand::Rng;

use {Error, IoKind, Result};
use actions::ActionList;
use classifier::{Classifier, RuleId};
use flow::Match;
use port::{PortEvent, PortTable};
use provider::{DatapathProvider, DpEvent, ExpiryReason, PortPoll};
use ratelimit::RateLimiter;
use rule::{self, Rule};
use wire::flow_mod::RemovedReason;
use wire::openflow::Version;
use wire::stats::DescStatsRepr;

pub use self::connection::{ConnId, ConnKind, ConnectionManager};

/// What the switch does when no controller is reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailMode {
    /// Keep the flow table as-is and wait.
    Secure,
    /// Fall back to standalone L2 switching.
    Standalone,
}

lazy_static! {
    static ref SWITCHES_BY_NAME: Mutex<BTreeSet<String>> = Mutex::new(BTreeSet::new());
}

fn register_name(name: &str) -> Result<()> {
    let mut registry = SWITCHES_BY_NAME.lock().unwrap();
    if !registry.insert(name.to_string()) {
        warn!("switch name {} already in use", name);
        return Err(Error::Io(IoKind::Other));
    }
    Ok(())
}

fn unregister_name(name: &str) {
    SWITCHES_BY_NAME.lock().unwrap().remove(name);
}

/// The admin `list` command: one switch name per line with an HTTP-like
/// status code.
pub fn admin_list() -> (u16, String) {
    let registry = SWITCHES_BY_NAME.lock().unwrap();
    let mut body = String::new();
    for name in registry.iter() {
        body.push_str(name);
        body.push('\n');
    }
    (200, body)
}

/// Summary handed to admin tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchInfo {
    pub name: String,
    pub datapath_type: String,
    pub datapath_id: u64,
    pub n_ports: usize,
    pub n_flows: usize,
    pub fail_mode: FailMode,
}

fn random_fallback_dpid() -> u64 {
    let mut mac: [u8; 6] = rand::thread_rng().gen();
    // locally administered, unicast
    mac[0] = (mac[0] & 0xfc) | 0x02;
    mac.iter().fold(0u64, |acc, byte| acc << 8 | u64::from(*byte))
}

fn truncate_to(value: &str, width: usize) -> String {
    // strings are silently truncated to their fixed wire width
    let mut out = String::with_capacity(width.min(value.len()));
    for c in value.chars() {
        if out.len() + c.len_utf8() > width - 1 {
            break;
        }
        out.push(c);
    }
    out
}

pub struct Switch {
    name: String,
    datapath_type: String,
    fallback_dpid: u64,
    custom_dpid: Option<u64>,
    descriptions: DescStatsRepr,
    fail_mode: FailMode,
    enabled_versions: Vec<Version>,
    classifier: Classifier,
    ports: PortTable,
    provider: Box<DatapathProvider>,
    conns: ConnectionManager,
    // opaque pass-through configuration owned by out-of-scope subsystems
    sflow: Option<Vec<u8>>,
    netflow: Option<Vec<u8>>,
    bundles: HashMap<String, Vec<u16>>,
    mirrors: HashMap<String, Vec<u8>>,
    flood_vlans: Vec<u16>,
    rl_table_id: RateLimiter,
    rl_flow_mod: RateLimiter,
}

impl Switch {
    /// Build a switch over an opened datapath provider and register it in
    /// the process-wide registry. The port table is seeded from the
    /// provider's inventory.
    pub fn new(
        name: &str,
        datapath_type: &str,
        mut provider: Box<DatapathProvider>,
    ) -> Result<Switch> {
        register_name(name)?;
        let mut ports = PortTable::new();
        match provider.port_dump() {
            Ok(dump) => {
                ports.populate(dump);
            }
            Err(err) => {
                unregister_name(name);
                return Err(err);
            }
        }
        let mut descriptions = DescStatsRepr::default();
        descriptions.dp_desc = truncate_to(name, ::wire::stats::DESC_STR_LEN);
        Ok(Switch {
            name: name.to_string(),
            datapath_type: datapath_type.to_string(),
            fallback_dpid: random_fallback_dpid(),
            custom_dpid: None,
            descriptions,
            fail_mode: FailMode::Secure,
            enabled_versions: vec![Version::OpenFlow1Dot0],
            classifier: Classifier::new(),
            ports,
            provider,
            conns: ConnectionManager::new(),
            sflow: None,
            netflow: None,
            bundles: HashMap::new(),
            mirrors: HashMap::new(),
            flood_vlans: Vec::new(),
            rl_table_id: RateLimiter::default(),
            rl_flow_mod: RateLimiter::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn datapath_id(&self) -> u64 {
        self.custom_dpid.unwrap_or(self.fallback_dpid)
    }

    /// Pin the datapath id; `None` returns to the random fallback.
    pub fn set_datapath_id(&mut self, dpid: Option<u64>) {
        self.custom_dpid = dpid;
    }

    pub fn fail_mode(&self) -> FailMode {
        self.fail_mode
    }

    pub fn set_fail_mode(&mut self, mode: FailMode) {
        self.fail_mode = mode;
    }

    /// Versions the dispatcher accepts. Messages in other versions are
    /// answered with a version error.
    pub fn set_enabled_versions(&mut self, versions: Vec<Version>) {
        self.enabled_versions = versions;
    }

    /// Set the switch description strings, each silently truncated to its
    /// fixed wire width.
    pub fn set_descriptions(&mut self, desc: &DescStatsRepr) {
        use wire::stats::{DESC_STR_LEN, SERIAL_NUM_LEN};
        self.descriptions = DescStatsRepr {
            mfr_desc: truncate_to(&desc.mfr_desc, DESC_STR_LEN),
            hw_desc: truncate_to(&desc.hw_desc, DESC_STR_LEN),
            sw_desc: truncate_to(&desc.sw_desc, DESC_STR_LEN),
            serial_num: truncate_to(&desc.serial_num, SERIAL_NUM_LEN),
            dp_desc: truncate_to(&desc.dp_desc, DESC_STR_LEN),
        };
    }

    pub fn descriptions(&self) -> &DescStatsRepr {
        &self.descriptions
    }

    pub fn info(&self) -> SwitchInfo {
        SwitchInfo {
            name: self.name.clone(),
            datapath_type: self.datapath_type.clone(),
            datapath_id: self.datapath_id(),
            n_ports: self.ports.len(),
            n_flows: self.classifier.len(),
            fail_mode: self.fail_mode,
        }
    }

    // Pass-through configuration for subsystems outside this core.

    pub fn set_sflow(&mut self, config: Option<Vec<u8>>) {
        self.sflow = config;
    }

    pub fn set_netflow(&mut self, config: Option<Vec<u8>>) {
        self.netflow = config;
    }

    pub fn register_bundle(&mut self, name: &str, slaves: Vec<u16>) {
        self.bundles.insert(name.to_string(), slaves);
    }

    pub fn unregister_bundle(&mut self, name: &str) {
        self.bundles.remove(name);
    }

    pub fn register_mirror(&mut self, name: &str, config: Vec<u8>) {
        self.mirrors.insert(name.to_string(), config);
    }

    pub fn unregister_mirror(&mut self, name: &str) {
        self.mirrors.remove(name);
    }

    pub fn set_flood_vlans(&mut self, vlans: Vec<u16>) {
        self.flood_vlans = vlans;
    }

    // Controller connection plumbing (driven by the transport layer).

    pub fn connect_controller(&mut self, kind: ConnKind) -> ConnId {
        self.conns.connect(kind)
    }

    pub fn disconnect_controller(&mut self, id: ConnId) {
        self.conns.disconnect(id);
    }

    /// Messages queued for one connection since the last drain.
    pub fn take_output(&mut self, id: ConnId) -> Vec<Vec<u8>> {
        self.conns
            .get_mut(id)
            .map(Connection::take_output)
            .unwrap_or_default()
    }

    /// One bounded unit of periodic work: provider events (expiry,
    /// punted packets), then port-change reconciliation. An
    /// `Err(Io(DeviceGone))` return is fatal: the datapath is gone and
    /// the caller must destroy the switch.
    pub fn run(&mut self, now_ms: u64) -> Result<()> {
        let events = self.provider.run(now_ms)?;
        for event in events {
            match event {
                DpEvent::RuleExpired { id, reason } => self.expire_rule(id, reason, now_ms),
                DpEvent::PacketIn {
                    in_port,
                    reason,
                    data,
                } => self.deliver_packet_in(in_port, reason, data),
            }
        }
        loop {
            match self.provider.port_poll() {
                Ok(PortPoll::None) => break,
                Ok(PortPoll::Changed(name)) => self.update_port(&name)?,
                Ok(PortPoll::Bulk) | Err(Error::Io(IoKind::NoBufs)) => self.rescan_ports()?,
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    pub fn wait(&self) {
        self.provider.wait();
        self.provider.port_poll_wait();
    }

    /// Attach a device to the datapath and pick up the resulting port.
    /// Returns the assigned OpenFlow port number.
    pub fn add_port(&mut self, devname: &str) -> Result<u16> {
        let port_no = self.provider.port_add(devname)?;
        self.update_port(devname)?;
        Ok(port_no)
    }

    /// Detach a port from the datapath and drop it from the table.
    pub fn del_port(&mut self, port_no: u16) -> Result<()> {
        let name = match self.ports.get(port_no) {
            Some(port) => port.name.clone(),
            None => return Err(Error::Io(IoKind::Other)),
        };
        self.provider.port_del(port_no)?;
        self.update_port(&name)
    }

    /// Reconcile one named port with the datapath and notify controllers
    /// of the outcome.
    pub fn update_port(&mut self, name: &str) -> Result<()> {
        let query = self.provider.port_query_by_name(name)?;
        let events = self.ports.reconcile(name, query);
        self.broadcast_port_events(&events);
        Ok(())
    }

    /// Full re-enumeration, for when the provider lost track of
    /// individual changes.
    fn rescan_ports(&mut self) -> Result<()> {
        let dump = self.provider.port_dump()?;
        let mut known: Vec<String> = self
            .ports
            .iter_sorted()
            .iter()
            .map(|port| port.name.clone())
            .collect();
        known.retain(|name| !dump.iter().any(|info| &info.name == name));
        let mut events: Vec<PortEvent> = Vec::new();
        for name in known {
            events.extend(self.ports.reconcile(&name, None));
        }
        for info in dump {
            let name = info.name.clone();
            events.extend(self.ports.reconcile(&name, Some(info)));
        }
        self.broadcast_port_events(&events);
        Ok(())
    }

    // --- flow table primitives (C3) -----------------------------------

    /// Install a rule: classifier insert, datapath mirror, displaced
    /// twin destroyed. Used by the flow-mod handlers and by internal
    /// subsystems installing hidden rules.
    pub fn install_flow(&mut self, rule: Rule, now_ms: u64) -> Result<RuleId> {
        let (id, displaced) = self.classifier.insert(rule);
        if let Some((old_id, _old_rule)) = displaced {
            // replacement: the predecessor's counters are lost
            self.provider.rule_destruct(old_id);
        }
        let mirror = {
            let rule = self.classifier.get(id).unwrap();
            self.provider.rule_construct(id, rule, now_ms)
        };
        if let Err(err) = mirror {
            self.classifier.remove(id);
            return Err(err);
        }
        Ok(id)
    }

    /// Install a rule above the controller-visible priority range. Such
    /// rules never show up in controller stats or loose deletes.
    pub fn install_hidden_flow(
        &mut self,
        match_: Match,
        priority: u32,
        actions: ActionList,
        now_ms: u64,
    ) -> Result<RuleId> {
        debug_assert!(rule::is_hidden_priority(priority));
        let mut rule = Rule::new(match_, priority, now_ms);
        rule.actions = actions;
        self.install_flow(rule, now_ms)
    }

    /// Remove one rule, notifying controllers when asked to.
    fn remove_rule(&mut self, id: RuleId, reason: RemovedReason, now_ms: u64) {
        self.refresh_rule_stats(id);
        if let Some(rule) = self.classifier.remove(id) {
            if !rule.is_hidden() && rule.send_flow_removed {
                self.broadcast_flow_removed(&rule, reason, now_ms);
            }
        }
        self.provider.rule_destruct(id);
    }

    fn expire_rule(&mut self, id: RuleId, reason: ExpiryReason, now_ms: u64) {
        let wire_reason = match reason {
            ExpiryReason::IdleTimeout => RemovedReason::IdleTimeout,
            ExpiryReason::HardTimeout => RemovedReason::HardTimeout,
        };
        self.remove_rule(id, wire_reason, now_ms);
    }

    /// Remove every rule. One batched datapath call when the provider
    /// has one; no flow-removed notifications are generated.
    pub fn flush_flows(&mut self) {
        let ids = self.classifier.ids();
        match self.provider.flush() {
            Some(_result) => {
                for id in ids {
                    self.classifier.remove(id);
                }
            }
            None => {
                for id in ids {
                    self.classifier.remove(id);
                    self.provider.rule_destruct(id);
                }
            }
        }
    }

    /// Pull the latest datapath counters into a rule.
    fn refresh_rule_stats(&mut self, id: RuleId) {
        if let Ok((packets, bytes)) = self.provider.rule_get_stats(id) {
            if let Some(rule) = self.classifier.get_mut(id) {
                rule.update_stats(packets, bytes);
            }
        }
    }

    /// Direct read access for hosts and tests.
    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn ports(&self) -> &PortTable {
        &self.ports
    }
}

impl Drop for Switch {
    fn drop(&mut self) {
        self.flush_flows();
        self.ports.clear();
        unregister_name(&self.name);
    }
}

use self::connection::Connection;

#[cfg(test)]
mod test {
    use super::*;
    use provider::TestProvider;

    #[test]
    fn test_registry_uniqueness() {
        let first = Switch::new("reg-test-br0", "test", Box::new(TestProvider::new())).unwrap();
        assert!(Switch::new("reg-test-br0", "test", Box::new(TestProvider::new())).is_err());
        drop(first);
        // the name is free again after destruction
        let again = Switch::new("reg-test-br0", "test", Box::new(TestProvider::new())).unwrap();
        drop(again);
    }

    #[test]
    fn test_admin_list() {
        let switch = Switch::new("list-test-br0", "test", Box::new(TestProvider::new())).unwrap();
        let (status, body) = admin_list();
        assert_eq!(status, 200);
        assert!(body.lines().any(|line| line == "list-test-br0"));
        drop(switch);
        let (_, body) = admin_list();
        assert!(!body.lines().any(|line| line == "list-test-br0"));
    }

    #[test]
    fn test_fallback_dpid_is_local_unicast() {
        let switch = Switch::new("dpid-test-br0", "test", Box::new(TestProvider::new())).unwrap();
        let dpid = switch.datapath_id();
        assert_eq!(dpid >> 48, 0);
        let top_byte = (dpid >> 40) as u8;
        assert_eq!(top_byte & 0x02, 0x02);
        assert_eq!(top_byte & 0x01, 0x00);
    }

    #[test]
    fn test_description_truncation() {
        let mut switch =
            Switch::new("desc-test-br0", "test", Box::new(TestProvider::new())).unwrap();
        let mut desc = DescStatsRepr::default();
        desc.serial_num = "x".repeat(100);
        switch.set_descriptions(&desc);
        assert_eq!(switch.descriptions().serial_num.len(), 31);
    }
}
