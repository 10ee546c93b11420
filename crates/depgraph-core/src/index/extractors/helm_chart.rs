use std::collections::BTreeMap;

use super::{is_placeholder, ExtractedReference, Extractor, ReferenceType};
use crate::model::{Node, NodeKind};

pub struct HelmChartExtractor;

impl Extractor for HelmChartExtractor {
    fn reference_type(&self) -> ReferenceType {
        ReferenceType::HelmChart
    }

    fn can_handle(&self, node: &Node) -> bool {
        node.kind == NodeKind::HelmRelease || node.attr_str("chart").is_some()
    }

    fn extract(&self, node: &Node) -> Vec<ExtractedReference> {
        let Some(chart) = node.attr_str("chart") else { return Vec::new() };
        if is_placeholder(chart) {
            return Vec::new();
        }
        let mut components = BTreeMap::new();
        components.insert("chart".to_string(), chart.to_string());
        if let Some(version) = node.attr_str("chartVersion") {
            components.insert("version".to_string(), version.to_string());
        }
        let external_id = match node.attr_str("chartVersion") {
            Some(version) => format!("{chart}@{version}"),
            None => chart.to_string(),
        };
        vec![ExtractedReference { reference_type: ReferenceType::HelmChart, external_id, components }]
    }

    fn normalize(&self, id: &str) -> String {
        id.trim().to_lowercase()
    }

    fn parse_components(&self, id: &str) -> Option<BTreeMap<String, String>> {
        let mut components = BTreeMap::new();
        match id.split_once('@') {
            Some((chart, version)) => {
                components.insert("chart".to_string(), chart.to_string());
                components.insert("version".to_string(), version.to_string());
            }
            None => {
                components.insert("chart".to_string(), id.to_string());
            }
        }
        Some(components)
    }
}
