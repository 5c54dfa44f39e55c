use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, warn};

use super::cells::RawRecord;
use crate::error::RegionError;

/// Digits 3–4 of a province-administered county-level unit.
const PSEUDO_CITY_DIGITS: u32 = 90;

/// Six-digit administrative code helpers: `PPCCAA`.
trait AdminCode {
    fn province_prefix(self) -> u32;
    fn city_prefix(self) -> u32;
    fn is_province(self) -> bool;
    fn is_city_tier(self) -> bool;
    fn is_pseudo_city(self) -> bool;
}

impl AdminCode for u32 {
    fn province_prefix(self) -> u32 {
        self / 10000
    }

    fn city_prefix(self) -> u32 {
        self / 100
    }

    fn is_province(self) -> bool {
        self % 10000 == 0
    }

    fn is_city_tier(self) -> bool {
        self % 100 == 0
    }

    fn is_pseudo_city(self) -> bool {
        self.city_prefix() % 100 == PSEUDO_CITY_DIGITS
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    pub code: u32,
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

impl Node {
    fn leaf(record: &RawRecord) -> Self {
        Node {
            code: record.code,
            name: record.name.clone(),
            children: Vec::new(),
        }
    }
}

/// Classification policy handed to [`build`].
#[derive(Debug, Clone)]
pub struct HierarchyOptions {
    /// Province names whose city tier collapses to one synthetic node.
    pub municipalities: HashSet<String>,
    /// Added to a municipality's code to form its synthetic city code.
    pub municipality_city_offset: u32,
    /// Reject provinces that end up without any children.
    pub require_children: bool,
}

impl Default for HierarchyOptions {
    fn default() -> Self {
        HierarchyOptions {
            municipalities: ["北京市", "天津市", "上海市", "重庆市"]
                .into_iter()
                .map(String::from)
                .collect(),
            municipality_city_offset: 0,
            require_children: false,
        }
    }
}

/// Partition a flat record list into province → city → area trees.
///
/// One grouping pass keyed by code prefix; provinces and children keep
/// their source order.
pub fn build(records: &[RawRecord], opts: &HierarchyOptions) -> Result<Vec<Node>, RegionError> {
    if records.is_empty() {
        return Err(RegionError::EmptyInput);
    }

    let mut provinces: Vec<&RawRecord> = Vec::new();
    let mut by_province: HashMap<u32, Vec<&RawRecord>> = HashMap::new();
    for record in records {
        if record.code.is_province() {
            provinces.push(record);
        } else {
            by_province
                .entry(record.code.province_prefix())
                .or_default()
                .push(record);
        }
    }

    let mut placed = provinces.len();
    let mut tree = Vec::with_capacity(provinces.len());
    for province in provinces {
        let members = by_province
            .remove(&province.code.province_prefix())
            .unwrap_or_default();

        let (node, used) = if opts.municipalities.contains(&province.name) {
            municipality(province, &members, opts.municipality_city_offset)
        } else {
            ordinary_province(province, &members)
        };

        if opts.require_children && node.children.is_empty() {
            return Err(RegionError::Structure {
                code: node.code,
                name: node.name,
            });
        }
        debug!(code = node.code, children = node.children.len(), "Built province");
        placed += used;
        tree.push(node);
    }

    let orphans: usize = by_province.values().map(Vec::len).sum();
    if orphans > 0 {
        warn!("Dropped {} records whose province is missing", orphans);
    }
    let unplaced = records.len() - placed - orphans;
    if unplaced > 0 {
        warn!("Dropped {} records whose city is missing", unplaced);
    }

    Ok(tree)
}

/// Returns the province node and how many input records it consumed.
///
/// The first city-tier record names the synthetic city; everything else
/// under the prefix, later city-tier records included, becomes its child.
fn municipality(province: &RawRecord, members: &[&RawRecord], offset: u32) -> (Node, usize) {
    let absorbed = members.iter().position(|r| r.code.is_city_tier());

    let city = Node {
        code: province.code + offset,
        name: absorbed.map_or_else(|| province.name.clone(), |i| members[i].name.clone()),
        children: members
            .iter()
            .enumerate()
            .filter(|&(i, _)| Some(i) != absorbed)
            .map(|(_, r)| Node::leaf(r))
            .collect(),
    };

    let node = Node {
        code: province.code,
        name: province.name.clone(),
        children: vec![city],
    };
    (node, members.len())
}

fn ordinary_province(province: &RawRecord, members: &[&RawRecord]) -> (Node, usize) {
    let mut cities: Vec<&RawRecord> = Vec::new();
    let mut areas_by_city: HashMap<u32, Vec<&RawRecord>> = HashMap::new();
    for &record in members {
        if record.code.is_city_tier() || record.code.is_pseudo_city() {
            cities.push(record);
        } else {
            areas_by_city
                .entry(record.code.city_prefix())
                .or_default()
                .push(record);
        }
    }

    let mut used = 0;
    let children = cities
        .into_iter()
        .map(|city| {
            let mut node = Node::leaf(city);
            if !city.code.is_pseudo_city() {
                if let Some(areas) = areas_by_city.get(&city.code.city_prefix()) {
                    node.children = areas.iter().map(|r| Node::leaf(r)).collect();
                }
            }
            used += 1 + node.children.len();
            node
        })
        .collect();

    let node = Node {
        code: province.code,
        name: province.name.clone(),
        children,
    };
    (node, used)
}

// ── Tests ──
