// ── Device domain types ──

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

/// Category a discovered device is harvested as.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DeviceCategory {
    Inverter,
    Meter,
    Sensor,
    Unclassified,
}

impl DeviceCategory {
    /// Categories that are fetched each cycle, in fetch order.
    pub const HARVESTED: [Self; 3] = [Self::Inverter, Self::Meter, Self::Sensor];

    pub fn is_harvested(self) -> bool {
        !matches!(self, Self::Unclassified)
    }
}

/// One node of the portal's organization tree.
///
/// Rebuilt on every discovery pass; its children stay in the raw tree and
/// are visited by the walker rather than copied here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceNode {
    /// Distinguished name, e.g. `NE=123456`.
    pub dn: String,
    pub name: String,
    pub status: String,
    /// Vendor type code. Absent or unparsable codes are `None`.
    pub type_id: Option<i64>,
    pub is_parent: bool,
    /// Dn of the nearest ancestor that carried one.
    pub parent_dn: Option<String>,
}

impl DeviceNode {
    /// Read a node from a tree element. Returns `None` for non-objects.
    pub fn from_value(value: &Value, parent_dn: Option<&str>) -> Option<Self> {
        let obj = value.as_object()?;
        let text = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned()
        };
        let type_id = obj.get("typeId").and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });

        Some(Self {
            dn: text("elementDn"),
            name: unescape_html(&text("nodeName")),
            status: text("status"),
            type_id,
            is_parent: obj.get("isParent").and_then(Value::as_bool).unwrap_or(false),
            parent_dn: parent_dn.map(str::to_owned),
        })
    }
}

/// A device node tagged with the category it will be harvested as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedDevice {
    #[serde(flatten)]
    pub node: DeviceNode,
    pub category: DeviceCategory,
}

impl ClassifiedDevice {
    pub fn dn(&self) -> &str {
        &self.node.dn
    }

    pub fn name(&self) -> &str {
        &self.node.name
    }
}

/// Decode the handful of entities the portal uses in display names.
pub fn unescape_html(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_owned();
    }
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}
