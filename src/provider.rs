//! The downward contract: everything the control plane asks of a
//! datapath (forwarding engine).
//!
//! The switch core never forwards packets itself; it mirrors its flow
//! table into the provider and reacts to the events the provider raises
//! (rule expiry, port changes, device loss). Providers are driven
//! cooperatively: `run` does a bounded unit of work, `wait` registers
//! wakeups with the host poll loop.

use {Error, IoKind, Result};

use actions::ActionList;
use classifier::RuleId;
use port::PortInfo;
use rule::Rule;

/// Why the provider expired a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryReason {
    IdleTimeout,
    HardTimeout,
}

/// Why the datapath punted a packet to the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpcallReason {
    /// No rule matched.
    NoMatch,
    /// A rule's action said to send it up.
    Action,
}

/// Events surfaced by [`DatapathProvider::run`](trait.DatapathProvider.html#tymethod.run).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DpEvent {
    /// A mirrored rule hit one of its timeouts. The core decides what to
    /// tell controllers and removes the rule.
    RuleExpired { id: RuleId, reason: ExpiryReason },
    /// The datapath could not handle a packet; punt it to controllers.
    PacketIn {
        in_port: u16,
        reason: UpcallReason,
        data: Vec<u8>,
    },
}

/// Result of polling for port changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortPoll {
    /// Nothing changed.
    None,
    /// The named port changed; reconcile just that one.
    Changed(String),
    /// Change notifications were lost; re-enumerate everything.
    Bulk,
}

/// The per-switch datapath operations.
///
/// Construction and destruction map onto the implementing type's own
/// constructor and `Drop`; the factory side of the contract is
/// [`ProviderFactory`](trait.ProviderFactory.html).
pub trait DatapathProvider {
    /// One bounded unit of periodic work. `Err(Io(DeviceGone))` means the
    /// datapath vanished and the switch must be torn down.
    fn run(&mut self, now_ms: u64) -> Result<Vec<DpEvent>>;

    /// Register wakeups with the host poll loop.
    fn wait(&self) {}

    /// Enumerate every datapath port.
    fn port_dump(&mut self) -> Result<Vec<PortInfo>>;

    /// The datapath's current view of one named port.
    fn port_query_by_name(&mut self, name: &str) -> Result<Option<PortInfo>>;

    fn port_add(&mut self, devname: &str) -> Result<u16>;

    fn port_del(&mut self, port_no: u16) -> Result<()>;

    /// Poll for port changes since the last call.
    fn port_poll(&mut self) -> Result<PortPoll>;

    fn port_poll_wait(&self) {}

    /// Mirror a newly installed rule.
    fn rule_construct(&mut self, id: RuleId, rule: &Rule, now_ms: u64) -> Result<()>;

    /// Drop the mirror of a removed rule. Infallible: the rule is going
    /// away regardless.
    fn rule_destruct(&mut self, id: RuleId);

    fn rule_modify_actions(&mut self, id: RuleId, actions: &ActionList) -> Result<()>;

    /// Run a buffered packet through a rule's action list.
    fn rule_execute(&mut self, id: RuleId, in_port: u16, packet: &[u8]) -> Result<()>;

    /// Fetch `(packets, bytes)` for a mirrored rule.
    fn rule_get_stats(&self, id: RuleId) -> Result<(u64, u64)>;

    /// Execute an ad-hoc action list on an ad-hoc packet.
    fn packet_out(&mut self, packet: &[u8], in_port: u16, actions: &ActionList) -> Result<()>;

    fn get_drop_frags(&self) -> bool;

    fn set_drop_frags(&mut self, drop_frags: bool);

    /// Remove every mirrored rule in one call, if the provider can.
    /// `None` means unsupported and the core falls back to per-rule
    /// destruction.
    fn flush(&mut self) -> Option<Result<()>> {
        None
    }

    /// Lookup counters for table stats: `(lookups, matches)`.
    fn table_counters(&self) -> (u64, u64) {
        (0, 0)
    }

    /// Port counters for port stats, if the provider keeps them.
    fn port_stats(&self, _port_no: u16) -> Result<[u64; 12]> {
        Err(Error::Io(IoKind::Unsupported))
    }
}

/// The factory side of the provider contract: one instance per datapath
/// type.
pub trait ProviderFactory {
    /// The datapath type name (e.g. "system", "netdev").
    fn kind(&self) -> &str;

    /// Names of the datapaths of this type that currently exist.
    fn enumerate_names(&mut self) -> Result<Vec<String>>;

    /// Delete a datapath without attaching to it.
    fn del(&mut self, name: &str) -> Result<()>;

    /// Open provider state for the named datapath.
    fn construct(&mut self, name: &str) -> Result<Box<DatapathProvider>>;
}

// ----------------------------------------------------------------------

use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone)]
struct MirrorRule {
    hard_deadline_ms: Option<u64>,
    idle_deadline_ms: Option<u64>,
    packets: u64,
    bytes: u64,
}

/// An in-memory provider for the test suites: mirrors rules, fakes port
/// inventory, and lets tests inject expiry and port-change events.
#[derive(Default)]
pub struct TestProvider {
    ports: HashMap<u16, PortInfo>,
    rules: HashMap<RuleId, MirrorRule>,
    poll_queue: VecDeque<PortPoll>,
    upcalls: VecDeque<DpEvent>,
    pub executed: Vec<(u16, Vec<u8>)>,
    drop_frags: bool,
    device_gone: bool,
    supports_flush: bool,
    next_generation: u64,
    pub flushes: usize,
    lookups: u64,
    matches: u64,
}

impl TestProvider {
    pub fn new() -> TestProvider {
        TestProvider {
            supports_flush: true,
            next_generation: 1,
            ..TestProvider::default()
        }
    }

    /// Add or replace a fake datapath port and queue a change
    /// notification for it.
    pub fn set_port(&mut self, mut info: PortInfo) {
        self.next_generation += 1;
        info.netdev_generation = self.next_generation;
        self.poll_queue.push_back(PortPoll::Changed(info.name.clone()));
        self.ports.insert(info.port_no, info);
    }

    /// Install a fake port without queuing a notification (initial
    /// inventory).
    pub fn seed_port(&mut self, info: PortInfo) {
        self.ports.insert(info.port_no, info);
    }

    pub fn drop_port(&mut self, port_no: u16) {
        if let Some(info) = self.ports.remove(&port_no) {
            self.poll_queue.push_back(PortPoll::Changed(info.name));
        }
    }

    /// Move a port to a new number, as a datapath re-attach would.
    pub fn renumber_port(&mut self, old_no: u16, new_no: u16) {
        if let Some(mut info) = self.ports.remove(&old_no) {
            info.port_no = new_no;
            self.set_port(info);
        }
    }

    pub fn queue_bulk_change(&mut self) {
        self.poll_queue.push_back(PortPoll::Bulk);
    }

    pub fn set_device_gone(&mut self) {
        self.device_gone = true;
    }

    pub fn set_supports_flush(&mut self, supported: bool) {
        self.supports_flush = supported;
    }

    /// Account traffic against a mirrored rule.
    pub fn record_traffic(&mut self, id: RuleId, packets: u64, bytes: u64) {
        if let Some(mirror) = self.rules.get_mut(&id) {
            mirror.packets += packets;
            mirror.bytes += bytes;
        }
    }

    /// Declare a rule idle long enough for its idle timeout, effective at
    /// the given time.
    pub fn force_idle_expiry(&mut self, id: RuleId, at_ms: u64) {
        if let Some(mirror) = self.rules.get_mut(&id) {
            mirror.idle_deadline_ms = Some(at_ms);
        }
    }

    pub fn mirrored_rules(&self) -> usize {
        self.rules.len()
    }

    /// Queue a packet punt for the next `run`.
    pub fn punt_packet(&mut self, in_port: u16, reason: UpcallReason, data: Vec<u8>) {
        self.upcalls.push_back(DpEvent::PacketIn {
            in_port,
            reason,
            data,
        });
    }
}

impl DatapathProvider for TestProvider {
    fn run(&mut self, now_ms: u64) -> Result<Vec<DpEvent>> {
        if self.device_gone {
            return Err(Error::Io(IoKind::DeviceGone));
        }
        let mut events: Vec<DpEvent> = self.upcalls.drain(..).collect();
        for (id, mirror) in &self.rules {
            if let Some(deadline) = mirror.hard_deadline_ms {
                if now_ms >= deadline {
                    events.push(DpEvent::RuleExpired {
                        id: *id,
                        reason: ExpiryReason::HardTimeout,
                    });
                    continue;
                }
            }
            if let Some(deadline) = mirror.idle_deadline_ms {
                if now_ms >= deadline {
                    events.push(DpEvent::RuleExpired {
                        id: *id,
                        reason: ExpiryReason::IdleTimeout,
                    });
                }
            }
        }
        Ok(events)
    }

    fn port_dump(&mut self) -> Result<Vec<PortInfo>> {
        let mut dump: Vec<PortInfo> = self.ports.values().cloned().collect();
        dump.sort_by_key(|info| info.port_no);
        Ok(dump)
    }

    fn port_query_by_name(&mut self, name: &str) -> Result<Option<PortInfo>> {
        Ok(self.ports.values().find(|info| info.name == name).cloned())
    }

    fn port_add(&mut self, devname: &str) -> Result<u16> {
        let port_no = (1..0xff00)
            .find(|no| !self.ports.contains_key(no))
            .ok_or(Error::Io(IoKind::Other))?;
        use smoltcp::wire::EthernetAddress;
        use wire::port_msg::PortFeatures;
        self.set_port(PortInfo {
            port_no,
            name: devname.to_string(),
            hw_addr: EthernetAddress::from_bytes(&[0x52, 0x54, 0, 0, 0, port_no as u8]),
            port_down: false,
            link_down: false,
            curr: PortFeatures::F_1GB_FD | PortFeatures::COPPER,
            advertised: PortFeatures::empty(),
            supported: PortFeatures::F_1GB_FD,
            peer: PortFeatures::empty(),
            netdev_generation: 0,
        });
        Ok(port_no)
    }

    fn port_del(&mut self, port_no: u16) -> Result<()> {
        if self.ports.remove(&port_no).is_none() {
            return Err(Error::Io(IoKind::Other));
        }
        Ok(())
    }

    fn port_poll(&mut self) -> Result<PortPoll> {
        Ok(self.poll_queue.pop_front().unwrap_or(PortPoll::None))
    }

    fn rule_construct(&mut self, id: RuleId, rule: &Rule, now_ms: u64) -> Result<()> {
        let hard_deadline_ms = if rule.hard_timeout > 0 {
            Some(now_ms + u64::from(rule.hard_timeout) * 1000)
        } else {
            None
        };
        self.rules.insert(
            id,
            MirrorRule {
                hard_deadline_ms,
                idle_deadline_ms: None,
                packets: 0,
                bytes: 0,
            },
        );
        Ok(())
    }

    fn rule_destruct(&mut self, id: RuleId) {
        self.rules.remove(&id);
    }

    fn rule_modify_actions(&mut self, id: RuleId, _actions: &ActionList) -> Result<()> {
        if self.rules.contains_key(&id) {
            Ok(())
        } else {
            Err(Error::Io(IoKind::Other))
        }
    }

    fn rule_execute(&mut self, id: RuleId, in_port: u16, packet: &[u8]) -> Result<()> {
        if !self.rules.contains_key(&id) {
            return Err(Error::Io(IoKind::Other));
        }
        self.executed.push((in_port, packet.to_vec()));
        Ok(())
    }

    fn rule_get_stats(&self, id: RuleId) -> Result<(u64, u64)> {
        self.rules
            .get(&id)
            .map(|mirror| (mirror.packets, mirror.bytes))
            .ok_or(Error::Io(IoKind::Other))
    }

    fn packet_out(&mut self, packet: &[u8], in_port: u16, _actions: &ActionList) -> Result<()> {
        self.executed.push((in_port, packet.to_vec()));
        Ok(())
    }

    fn get_drop_frags(&self) -> bool {
        self.drop_frags
    }

    fn set_drop_frags(&mut self, drop_frags: bool) {
        self.drop_frags = drop_frags;
    }

    fn flush(&mut self) -> Option<Result<()>> {
        if !self.supports_flush {
            return None;
        }
        self.rules.clear();
        self.flushes += 1;
        Some(Ok(()))
    }

    fn table_counters(&self) -> (u64, u64) {
        (self.lookups, self.matches)
    }

    fn port_stats(&self, port_no: u16) -> Result<[u64; 12]> {
        if self.ports.contains_key(&port_no) {
            Ok([0; 12])
        } else {
            Err(Error::Io(IoKind::Other))
        }
    }
}

/// Factory for [`TestProvider`](struct.TestProvider.html)s: a name is a
/// datapath as soon as it is constructed.
#[derive(Default)]
pub struct TestProviderFactory {
    names: Vec<String>,
}

impl ProviderFactory for TestProviderFactory {
    fn kind(&self) -> &str {
        "test"
    }

    fn enumerate_names(&mut self) -> Result<Vec<String>> {
        Ok(self.names.clone())
    }

    fn del(&mut self, name: &str) -> Result<()> {
        let before = self.names.len();
        self.names.retain(|known| known != name);
        if self.names.len() == before {
            return Err(Error::Io(IoKind::Other));
        }
        Ok(())
    }

    fn construct(&mut self, name: &str) -> Result<Box<DatapathProvider>> {
        if !self.names.iter().any(|known| known == name) {
            self.names.push(name.to_string());
        }
        Ok(Box::new(TestProvider::new()))
    }
}

use std::cell::RefCell;
use std::rc::Rc;

/// A [`TestProvider`](struct.TestProvider.html) handle that can be kept
/// by a test while the switch owns the provider. The core is
/// single-threaded, so the interior mutability is never contended.
#[derive(Clone)]
pub struct SharedProvider(pub Rc<RefCell<TestProvider>>);

impl SharedProvider {
    pub fn new() -> SharedProvider {
        SharedProvider(Rc::new(RefCell::new(TestProvider::new())))
    }
}

impl DatapathProvider for SharedProvider {
    fn run(&mut self, now_ms: u64) -> Result<Vec<DpEvent>> {
        self.0.borrow_mut().run(now_ms)
    }

    fn port_dump(&mut self) -> Result<Vec<PortInfo>> {
        self.0.borrow_mut().port_dump()
    }

    fn port_query_by_name(&mut self, name: &str) -> Result<Option<PortInfo>> {
        self.0.borrow_mut().port_query_by_name(name)
    }

    fn port_add(&mut self, devname: &str) -> Result<u16> {
        self.0.borrow_mut().port_add(devname)
    }

    fn port_del(&mut self, port_no: u16) -> Result<()> {
        self.0.borrow_mut().port_del(port_no)
    }

    fn port_poll(&mut self) -> Result<PortPoll> {
        self.0.borrow_mut().port_poll()
    }

    fn rule_construct(&mut self, id: RuleId, rule: &Rule, now_ms: u64) -> Result<()> {
        self.0.borrow_mut().rule_construct(id, rule, now_ms)
    }

    fn rule_destruct(&mut self, id: RuleId) {
        self.0.borrow_mut().rule_destruct(id)
    }

    fn rule_modify_actions(&mut self, id: RuleId, actions: &ActionList) -> Result<()> {
        self.0.borrow_mut().rule_modify_actions(id, actions)
    }

    fn rule_execute(&mut self, id: RuleId, in_port: u16, packet: &[u8]) -> Result<()> {
        self.0.borrow_mut().rule_execute(id, in_port, packet)
    }

    fn rule_get_stats(&self, id: RuleId) -> Result<(u64, u64)> {
        self.0.borrow().rule_get_stats(id)
    }

    fn packet_out(&mut self, packet: &[u8], in_port: u16, actions: &ActionList) -> Result<()> {
        self.0.borrow_mut().packet_out(packet, in_port, actions)
    }

    fn get_drop_frags(&self) -> bool {
        self.0.borrow().get_drop_frags()
    }

    fn set_drop_frags(&mut self, drop_frags: bool) {
        self.0.borrow_mut().set_drop_frags(drop_frags)
    }

    fn flush(&mut self) -> Option<Result<()>> {
        self.0.borrow_mut().flush()
    }

    fn table_counters(&self) -> (u64, u64) {
        self.0.borrow().table_counters()
    }

    fn port_stats(&self, port_no: u16) -> Result<[u64; 12]> {
        self.0.borrow().port_stats(port_no)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_factory_lifecycle() {
        let mut factory = TestProviderFactory::default();
        assert_eq!(factory.kind(), "test");
        let _provider = factory.construct("dp0").unwrap();
        assert_eq!(factory.enumerate_names().unwrap(), vec!["dp0".to_string()]);
        factory.del("dp0").unwrap();
        assert!(factory.del("dp0").is_err());
        assert!(factory.enumerate_names().unwrap().is_empty());
    }

    #[test]
    fn test_hard_timeout_deadline() {
        let mut provider = TestProvider::new();
        let mut rule = ::rule::Rule::new(::flow::Match::catch_all(), 1, 0);
        rule.hard_timeout = 2;
        let id = {
            let mut classifier = ::classifier::Classifier::new();
            let (id, _) = classifier.insert(rule.clone());
            id
        };
        provider.rule_construct(id, &rule, 0).unwrap();
        assert!(provider.run(1_900).unwrap().is_empty());
        let events = provider.run(2_000).unwrap();
        assert_eq!(
            events,
            vec![DpEvent::RuleExpired {
                id,
                reason: ExpiryReason::HardTimeout,
            }]
        );
    }
}
