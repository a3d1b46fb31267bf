// ── Topology discovery ──
//
// The portal describes a site as a nested tree (site → gateway → device).
// Walks here are iterative with an explicit stack and a visited guard, so
// repeated or deeply nested fragments never recurse or double-count.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use fusion_api::{ChildDevice, PortalClient};

use crate::config::SiteRef;
use crate::error::CoreError;
use crate::model::{ClassifiedDevice, DeviceCategory, DeviceNode};

/// Type code the portal assigns to string inverters.
pub const INVERTER_TYPE_ID: i64 = 23022;

/// Name fragments that mark a gateway (data logger).
const GATEWAY_MARKERS: [&str; 2] = ["smartlogger", "logger"];

struct NameRule {
    needle: &'static str,
    category: DeviceCategory,
}

/// Name heuristics, first match wins.
const NAME_RULES: &[NameRule] = &[
    NameRule { needle: "inverter", category: DeviceCategory::Inverter },
    NameRule { needle: "meter", category: DeviceCategory::Meter },
    NameRule { needle: "emic", category: DeviceCategory::Sensor },
    NameRule { needle: "sensor", category: DeviceCategory::Sensor },
    NameRule { needle: "weather", category: DeviceCategory::Sensor },
    NameRule { needle: "emi", category: DeviceCategory::Sensor },
];

// ── Classification ───────────────────────────────────────────────────

/// Maps `(type code, name)` to a [`DeviceCategory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classifier {
    inverter_type_id: i64,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(INVERTER_TYPE_ID)
    }
}

impl Classifier {
    pub fn new(inverter_type_id: i64) -> Self {
        Self { inverter_type_id }
    }

    /// A type-code match wins over any name rule.
    pub fn classify(&self, type_id: Option<i64>, name: &str) -> DeviceCategory {
        if type_id == Some(self.inverter_type_id) {
            return DeviceCategory::Inverter;
        }

        let lower = name.to_lowercase();
        let mut matches = NAME_RULES.iter().filter(|r| lower.contains(r.needle));
        let Some(first) = matches.next() else {
            return DeviceCategory::Unclassified;
        };
        if let Some(other) = matches.find(|r| r.category != first.category) {
            debug!(
                name,
                chosen = %first.category,
                also = %other.category,
                "device name matches several categories"
            );
        }
        first.category
    }

    pub fn classify_node(&self, node: DeviceNode) -> ClassifiedDevice {
        let category = self.classify(node.type_id, &node.name);
        ClassifiedDevice { node, category }
    }
}

/// Classify with the default inverter type code.
pub fn classify(type_id: Option<i64>, name: &str) -> DeviceCategory {
    Classifier::default().classify(type_id, name)
}

// ── Tree walks ───────────────────────────────────────────────────────

pub fn is_gateway_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    GATEWAY_MARKERS.iter().any(|m| lower.contains(m))
}

/// Every gateway in the tree, once each, in document order.
pub fn discover_gateways(tree: &Value) -> Vec<DeviceNode> {
    walk(tree, |node| is_gateway_name(&node.name))
}

/// Every leaf device (`isParent == false` with a dn) in the tree.
pub fn discover_devices(tree: &Value) -> Vec<DeviceNode> {
    walk(tree, |node| !node.is_parent && !node.dn.is_empty())
}

/// Tree nodes whose dn names one of `targets`.
pub fn filter_sites(tree: &Value, targets: &[SiteRef]) -> Vec<DeviceNode> {
    let wanted: HashSet<&str> = targets.iter().map(|s| s.id.as_str()).collect();
    walk(tree, |node| wanted.contains(node.dn.as_str()))
}

#[derive(Hash, PartialEq, Eq)]
enum VisitKey<'a> {
    Dn(&'a str),
    Node(usize),
}

fn roots(tree: &Value) -> &[Value] {
    match tree {
        Value::Array(items) => items,
        Value::Object(_) => match tree.get("childList") {
            Some(Value::Array(items)) => items,
            _ => &[],
        },
        _ => &[],
    }
}

fn walk(tree: &Value, keep: impl Fn(&DeviceNode) -> bool) -> Vec<DeviceNode> {
    let mut found = Vec::new();
    let mut visited: HashSet<VisitKey<'_>> = HashSet::new();
    let mut stack: Vec<(&Value, Option<&str>)> =
        roots(tree).iter().rev().map(|v| (v, None)).collect();

    while let Some((value, parent_dn)) = stack.pop() {
        let Some(node) = DeviceNode::from_value(value, parent_dn) else {
            continue;
        };

        let own_dn = value
            .get("elementDn")
            .and_then(Value::as_str)
            .filter(|dn| !dn.is_empty());
        let key = match own_dn {
            Some(dn) => VisitKey::Dn(dn),
            None => VisitKey::Node(std::ptr::from_ref(value).addr()),
        };
        if !visited.insert(key) {
            continue;
        }

        if let Some(Value::Array(children)) = value.get("childList") {
            let child_parent = own_dn.or(parent_dn);
            stack.extend(children.iter().rev().map(|c| (c, child_parent)));
        }

        if keep(&node) {
            found.push(node);
        }
    }

    found
}

// ── Site topology ────────────────────────────────────────────────────

/// Gateways and devices of one site, as of one discovery pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SiteTopology {
    pub site: SiteRef,
    pub gateways: Vec<DeviceNode>,
    /// Gateway dn → its devices, every one classified.
    pub devices_by_gateway: IndexMap<String, Vec<ClassifiedDevice>>,
    /// Gateway dn → static info of its monitored devices.
    pub children_by_gateway: IndexMap<String, Vec<ChildDevice>>,
    /// Devices no rule matched. Listed, never fetched.
    pub unclassified: Vec<ClassifiedDevice>,
}

impl SiteTopology {
    pub fn device_count(&self) -> usize {
        self.devices_by_gateway.values().map(Vec::len).sum()
    }

    /// Every device paired with its gateway dn.
    pub fn devices(&self) -> impl Iterator<Item = (&str, &ClassifiedDevice)> {
        self.devices_by_gateway
            .iter()
            .flat_map(|(gw, devices)| devices.iter().map(move |d| (gw.as_str(), d)))
    }

    pub fn devices_of(&self, category: DeviceCategory) -> impl Iterator<Item = &ClassifiedDevice> {
        self.devices()
            .map(|(_, d)| d)
            .filter(move |d| d.category == category)
    }

    /// Static info (model, SN) for a device, from its gateway's children list.
    pub fn static_info(&self, dn: &str) -> Option<&ChildDevice> {
        self.children_by_gateway
            .values()
            .flatten()
            .find(|child| child.dn == dn)
    }
}

// ── Discoverer ───────────────────────────────────────────────────────

/// Builds a [`SiteTopology`] from the portal's organization tree.
#[derive(Clone)]
pub struct TopologyDiscoverer {
    client: Arc<PortalClient>,
    classifier: Classifier,
}

impl TopologyDiscoverer {
    pub fn new(client: Arc<PortalClient>, classifier: Classifier) -> Self {
        Self { client, classifier }
    }

    /// Walk one site: its gateways, then each gateway's devices.
    ///
    /// A gateway whose subtree cannot be fetched contributes no devices.
    /// Only the site-level fetch fails the whole call.
    pub async fn discover(&self, site: &SiteRef) -> Result<SiteTopology, CoreError> {
        let tree = self
            .client
            .organization_tree(&site.id)
            .await
            .map_err(|e| CoreError::discovery(&site.id, &e))?;

        let gateways = discover_gateways(&tree);
        let mut topology = SiteTopology {
            site: site.clone(),
            ..SiteTopology::default()
        };

        for gateway in &gateways {
            let devices = match self.client.organization_tree(&gateway.dn).await {
                Ok(subtree) => discover_devices(&subtree),
                Err(e) if e.is_session_expired() => return Err(CoreError::SessionInvalid),
                Err(e) => {
                    warn!(gateway = %gateway.name, error = %e, "could not list gateway devices");
                    Vec::new()
                }
            };

            let children = match self.client.children_list(&gateway.dn).await {
                Ok(children) => children,
                Err(e) => {
                    debug!(gateway = %gateway.name, error = %e, "no static device info");
                    Vec::new()
                }
            };

            let classified: Vec<ClassifiedDevice> = devices
                .into_iter()
                .map(|node| self.classifier.classify_node(node))
                .collect();
            for device in classified.iter().filter(|d| !d.category.is_harvested()) {
                warn!(
                    site = %site.name,
                    gateway = %gateway.name,
                    device = %device.name(),
                    dn = %device.dn(),
                    type_id = ?device.node.type_id,
                    "unclassified device will not be harvested"
                );
                topology.unclassified.push(device.clone());
            }

            topology
                .devices_by_gateway
                .insert(gateway.dn.clone(), classified);
            topology
                .children_by_gateway
                .insert(gateway.dn.clone(), children);
        }

        topology.gateways = gateways;
        info!(
            site = %site.name,
            gateways = topology.gateways.len(),
            devices = topology.device_count(),
            unclassified = topology.unclassified.len(),
            "site discovered"
        );
        Ok(topology)
    }

    /// Fetch the locate tree for a site, falling back to a captured hint.
    pub async fn fetch_site_tree(&self, target_dn: &str) -> Result<Value, CoreError> {
        match self.client.locate_tree(target_dn).await {
            Ok(tree) => Ok(tree),
            Err(e) => {
                if let Some(tree) = recover_site_tree(self.client.session()) {
                    warn!(error = %e, "locate tree failed, using captured response");
                    return Ok(tree);
                }
                Err(CoreError::discovery(target_dn, &e))
            }
        }
    }
}

/// First captured locate-tree response that parses as JSON.
pub fn recover_site_tree(session: &fusion_api::SessionManager) -> Option<Value> {
    let hint = session.recover_json()?;
    match serde_json::from_slice(&hint.body) {
        Ok(tree) => Some(tree),
        Err(e) => {
            debug!(url = %hint.url, error = %e, "captured hint is not valid JSON");
            None
        }
    }
}
