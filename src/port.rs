//! The port table: the switch's view of its datapath interfaces.
//!
//! Ports are indexed both by OpenFlow port number and by name, and the
//! two indices always resolve to the same record. A port's number and
//! name are immutable once installed; the datapath renaming or
//! renumbering an interface shows up as delete-plus-add.

use std::collections::HashMap;

use smoltcp::wire::EthernetAddress;

use ratelimit::RateLimiter;
use wire::port_msg::{PhyPortRepr, PortConfig, PortFeatures, PortState};

/// What the datapath provider reports about one interface: the merge of
/// the datapath's port record and the freshly opened network device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub port_no: u16,
    pub name: String,
    pub hw_addr: EthernetAddress,
    /// Administratively down.
    pub port_down: bool,
    /// No carrier.
    pub link_down: bool,
    pub curr: PortFeatures,
    pub advertised: PortFeatures,
    pub supported: PortFeatures,
    pub peer: PortFeatures,
    /// Identity of the device handle backing this report. The provider
    /// may reopen the underlying device at any time, so the port always
    /// adopts the latest handle even when nothing else changed.
    pub netdev_generation: u64,
}

/// One switch port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    pub ofp_port: u16,
    pub name: String,
    pub hw_addr: EthernetAddress,
    pub config: PortConfig,
    pub state: PortState,
    pub curr: PortFeatures,
    pub advertised: PortFeatures,
    pub supported: PortFeatures,
    pub peer: PortFeatures,
    pub netdev_generation: u64,
}

impl Port {
    fn from_info(info: &PortInfo) -> Port {
        let mut config = PortConfig::empty();
        if info.port_down {
            config |= PortConfig::PORT_DOWN;
        }
        let mut state = PortState::empty();
        if info.link_down {
            state |= PortState::LINK_DOWN;
        }
        Port {
            ofp_port: info.port_no,
            name: info.name.clone(),
            hw_addr: info.hw_addr,
            config,
            state,
            curr: info.curr,
            advertised: info.advertised,
            supported: info.supported,
            peer: info.peer,
            netdev_generation: info.netdev_generation,
        }
    }

    /// The port as it appears in features replies and port-status
    /// messages.
    pub fn to_phy(&self) -> PhyPortRepr {
        PhyPortRepr {
            port_no: self.ofp_port,
            hw_addr: self.hw_addr,
            name: self.name.clone(),
            config: self.config,
            state: self.state,
            curr: self.curr,
            advertised: self.advertised,
            supported: self.supported,
            peer: self.peer,
        }
    }

    /// Would refreshing from `info` change anything a controller can
    /// observe? Only the PORT_DOWN config bit participates: the other
    /// config bits are controller-managed and a datapath refresh must not
    /// reset them.
    fn differs_from(&self, info: &PortInfo) -> bool {
        self.hw_addr != info.hw_addr
            || self.config.contains(PortConfig::PORT_DOWN) != info.port_down
            || self.state.contains(PortState::LINK_DOWN) != info.link_down
            || self.curr != info.curr
            || self.advertised != info.advertised
            || self.supported != info.supported
            || self.peer != info.peer
    }

    fn refresh(&mut self, info: &PortInfo) {
        self.hw_addr = info.hw_addr;
        if info.port_down {
            self.config |= PortConfig::PORT_DOWN;
        } else {
            self.config &= !PortConfig::PORT_DOWN;
        }
        if info.link_down {
            self.state |= PortState::LINK_DOWN;
        } else {
            self.state &= !PortState::LINK_DOWN;
        }
        self.curr = info.curr;
        self.advertised = info.advertised;
        self.supported = info.supported;
        self.peer = info.peer;
    }
}

/// A port-table change that controllers must hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortEvent {
    Added(PhyPortRepr),
    Deleted(PhyPortRepr),
    Modified(PhyPortRepr),
}

#[derive(Debug)]
pub struct PortTable {
    by_number: HashMap<u16, Port>,
    by_name: HashMap<String, u16>,
    rl_dup: RateLimiter,
}

impl Default for PortTable {
    fn default() -> Self {
        PortTable {
            by_number: HashMap::new(),
            by_name: HashMap::new(),
            rl_dup: RateLimiter::default(),
        }
    }
}

impl PortTable {
    pub fn new() -> PortTable {
        PortTable::default()
    }

    pub fn len(&self) -> usize {
        self.by_number.len()
    }

    pub fn get(&self, ofp_port: u16) -> Option<&Port> {
        self.by_number.get(&ofp_port)
    }

    pub fn get_mut(&mut self, ofp_port: u16) -> Option<&mut Port> {
        self.by_number.get_mut(&ofp_port)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Port> {
        self.by_name
            .get(name)
            .and_then(|port_no| self.by_number.get(port_no))
    }

    /// Ports in ascending number order (stable output for features
    /// replies and stats).
    pub fn iter_sorted(&self) -> Vec<&Port> {
        let mut ports: Vec<&Port> = self.by_number.values().collect();
        ports.sort_by_key(|port| port.ofp_port);
        ports
    }

    fn install(&mut self, port: Port) -> PortEvent {
        let phy = port.to_phy();
        self.by_name.insert(port.name.clone(), port.ofp_port);
        self.by_number.insert(port.ofp_port, port);
        PortEvent::Added(phy)
    }

    fn remove_number(&mut self, ofp_port: u16) -> Option<PortEvent> {
        let port = self.by_number.remove(&ofp_port)?;
        self.by_name.remove(&port.name);
        Some(PortEvent::Deleted(port.to_phy()))
    }

    fn remove_name(&mut self, name: &str) -> Option<PortEvent> {
        let port_no = self.by_name.remove(name)?;
        let port = self.by_number.remove(&port_no)?;
        Some(PortEvent::Deleted(port.to_phy()))
    }

    /// Remove every port, returning the deletions lowest-number first.
    pub fn clear(&mut self) -> Vec<PortEvent> {
        let mut numbers: Vec<u16> = self.by_number.keys().cloned().collect();
        numbers.sort();
        numbers
            .into_iter()
            .filter_map(|port_no| self.remove_number(port_no))
            .collect()
    }

    /// Initial population from a full datapath dump. Duplicate numbers or
    /// names are skipped with a rate-limited complaint.
    pub fn populate(&mut self, dump: Vec<PortInfo>) -> Vec<PortEvent> {
        let mut events = Vec::new();
        for info in dump {
            if self.by_number.contains_key(&info.port_no)
                || self.by_name.contains_key(&info.name)
            {
                rl_warn!(
                    self.rl_dup,
                    "ignoring duplicate device {} (port {})",
                    info.name,
                    info.port_no
                );
                continue;
            }
            events.push(self.install(Port::from_info(&info)));
        }
        events
    }

    /// Reconcile one named port against the datapath's report of it
    /// (`None` when the datapath no longer knows the name).
    pub fn reconcile(&mut self, name: &str, query: Option<PortInfo>) -> Vec<PortEvent> {
        let mut events = Vec::new();
        let info = match query {
            Some(info) => info,
            None => {
                events.extend(self.remove_name(name));
                return events;
            }
        };

        let same_port = match self.by_number.get(&info.port_no) {
            Some(existing) => existing.name == info.name,
            None => false,
        };
        if same_port {
            let port = self.by_number.get_mut(&info.port_no).unwrap();
            let changed = port.differs_from(&info);
            if changed {
                port.refresh(&info);
            }
            // the device may have been reopened underneath us
            port.netdev_generation = info.netdev_generation;
            if changed {
                events.push(PortEvent::Modified(port.to_phy()));
            }
        } else {
            // The number was reassigned, the name moved, or the port is
            // new. Whatever occupied either slot is gone.
            events.extend(self.remove_name(&info.name));
            events.extend(self.remove_number(info.port_no));
            events.push(self.install(Port::from_info(&info)));
        }
        events
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn info(port_no: u16, name: &str) -> PortInfo {
        PortInfo {
            port_no,
            name: name.to_string(),
            hw_addr: EthernetAddress::from_bytes(&[0x52, 0x54, 0, 0, 0, port_no as u8]),
            port_down: false,
            link_down: false,
            curr: PortFeatures::F_1GB_FD | PortFeatures::COPPER,
            advertised: PortFeatures::empty(),
            supported: PortFeatures::F_1GB_FD,
            peer: PortFeatures::empty(),
            netdev_generation: 1,
        }
    }

    #[test]
    fn test_indices_agree() {
        let mut table = PortTable::new();
        table.populate(vec![info(5, "eth0")]);
        let by_no = table.get(5).unwrap().clone();
        let by_name = table.get_by_name("eth0").unwrap().clone();
        assert_eq!(by_no, by_name);
    }

    #[test]
    fn test_populate_skips_duplicates() {
        let mut table = PortTable::new();
        table.populate(vec![info(5, "eth0"), info(5, "eth1"), info(6, "eth0")]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_reconcile_add() {
        let mut table = PortTable::new();
        let events = table.reconcile("eth0", Some(info(5, "eth0")));
        assert_eq!(events.len(), 1);
        match events[0] {
            PortEvent::Added(ref phy) => assert_eq!(phy.port_no, 5),
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn test_reconcile_removed() {
        let mut table = PortTable::new();
        table.populate(vec![info(5, "eth0")]);
        let events = table.reconcile("eth0", None);
        assert_eq!(events.len(), 1);
        match events[0] {
            PortEvent::Deleted(ref phy) => assert_eq!(phy.port_no, 5),
            _ => panic!("expected delete"),
        }
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_reconcile_carrier_change() {
        let mut table = PortTable::new();
        table.populate(vec![info(5, "eth0")]);
        let mut update = info(5, "eth0");
        update.link_down = true;
        update.netdev_generation = 2;
        let events = table.reconcile("eth0", Some(update));
        assert_eq!(events.len(), 1);
        match events[0] {
            PortEvent::Modified(ref phy) => {
                assert!(phy.state.contains(PortState::LINK_DOWN))
            }
            _ => panic!("expected modify"),
        }
        assert_eq!(table.get(5).unwrap().netdev_generation, 2);
    }

    #[test]
    fn test_reconcile_keeps_controller_config_bits() {
        let mut table = PortTable::new();
        table.populate(vec![info(5, "eth0")]);
        table.get_mut(5).unwrap().config |= PortConfig::NO_FLOOD;

        // identical datapath report: not a significant change
        let mut update = info(5, "eth0");
        update.netdev_generation = 2;
        assert!(table.reconcile("eth0", Some(update)).is_empty());
        assert!(table.get(5).unwrap().config.contains(PortConfig::NO_FLOOD));

        // admin-down toggles PORT_DOWN but leaves NO_FLOOD alone
        let mut update = info(5, "eth0");
        update.port_down = true;
        let events = table.reconcile("eth0", Some(update));
        assert_eq!(events.len(), 1);
        let port = table.get(5).unwrap();
        assert!(port.config.contains(PortConfig::PORT_DOWN));
        assert!(port.config.contains(PortConfig::NO_FLOOD));
    }

    #[test]
    fn test_reconcile_renumber_is_delete_plus_add() {
        let mut table = PortTable::new();
        table.populate(vec![info(5, "eth0")]);
        let events = table.reconcile("eth0", Some(info(6, "eth0")));
        assert_eq!(events.len(), 2);
        match (&events[0], &events[1]) {
            (&PortEvent::Deleted(ref old), &PortEvent::Added(ref new)) => {
                assert_eq!(old.port_no, 5);
                assert_eq!(new.port_no, 6);
            }
            _ => panic!("expected delete then add"),
        }
        assert_eq!(table.get_by_name("eth0").unwrap().ofp_port, 6);
        assert!(table.get(5).is_none());
    }
}
