use anyhow::{Context, Result};
use serde::Deserialize;
use serde_yaml::{Deserializer, Value};

use crate::model::{DependencyGraph, Node, NodeKind, SourceLocation};

/// Kubernetes manifests are frequently multi-document (`---`-separated); a
/// document whose `kind` isn't one of the three we track, or that's missing
/// `metadata.name`, is skipped rather than treated as an error.
pub fn detect_manifest_file(content: &str, file: &str, graph: &mut DependencyGraph) -> Result<()> {
    for document in Deserializer::from_str(content) {
        let Ok(value) = Value::deserialize(document) else { continue };
        let Some(kind) = value.get("kind").and_then(|v| v.as_str()) else { continue };
        let Some(metadata) = value.get("metadata") else { continue };
        let Some(name) = metadata.get("name").and_then(|v| v.as_str()) else { continue };
        let namespace = metadata.get("namespace").and_then(|v| v.as_str()).unwrap_or("default");

        match kind {
            "Deployment" => add_deployment_node(&value, name, namespace, file, graph),
            "Service" => add_service_node(&value, name, namespace, file, graph),
            "ConfigMap" => add_configmap_node(&value, name, namespace, file, graph),
            _ => continue,
        }
    }
    Ok(())
}

fn add_deployment_node(value: &Value, name: &str, namespace: &str, file: &str, graph: &mut DependencyGraph) {
    let id = Node::k8s_deployment_id(namespace, name);
    let mut node = Node::new(id, name, NodeKind::K8sDeployment, SourceLocation::point(file, 1)).with_attribute("namespace", namespace);
    if let Some(image) = value.get("spec").and_then(first_container_image) {
        node = node.with_attribute("image", image);
    }
    graph.add_node(node);
}

fn add_service_node(value: &Value, name: &str, namespace: &str, file: &str, graph: &mut DependencyGraph) {
    let id = Node::k8s_service_id(namespace, name);
    let mut node = Node::new(id, name, NodeKind::K8sService, SourceLocation::point(file, 1)).with_attribute("namespace", namespace);
    if let Some(service_type) = value.get("spec").and_then(|s| s.get("type")).and_then(|v| v.as_str()) {
        node = node.with_attribute("serviceType", service_type);
    }
    graph.add_node(node);
}

fn add_configmap_node(value: &Value, name: &str, namespace: &str, file: &str, graph: &mut DependencyGraph) {
    let id = Node::k8s_configmap_id(namespace, name);
    let mut node = Node::new(id, name, NodeKind::K8sConfigMap, SourceLocation::point(file, 1)).with_attribute("namespace", namespace);
    if let Some(keys) = value.get("data").and_then(|d| d.as_mapping()) {
        let keys: Vec<String> = keys.keys().filter_map(|k| k.as_str().map(String::from)).collect();
        node = node.with_attribute("dataKeys", keys);
    }
    graph.add_node(node);
}

fn first_container_image(spec: &Value) -> Option<String> {
    let containers = spec.get("template")?.get("spec")?.get("containers")?.as_sequence()?;
    containers.first()?.get("image")?.as_str().map(String::from)
}

/// A `Chart.yaml` names and versions a release; it's the primary source for
/// the `helm_release` node when one is present alongside `values.yaml`.
pub fn detect_chart_file(content: &str, file: &str, graph: &mut DependencyGraph) -> Result<()> {
    let yaml: Value = serde_yaml::from_str(content).context("failed to parse Chart.yaml")?;
    let name = yaml.get("name").and_then(|v| v.as_str()).context("Chart.yaml missing required 'name' field")?;
    let version = yaml.get("version").and_then(|v| v.as_str());

    let id = Node::helm_release_id(name);
    let mut node = Node::new(id, name, NodeKind::HelmRelease, SourceLocation::point(file, 1)).with_attribute("chart", name);
    if let Some(version) = version {
        node = node.with_attribute("chartVersion", version);
    }
    graph.add_node(node);
    Ok(())
}

/// `values.yaml` carries no release name of its own; we take it from the
/// chart directory it lives in. Skipped entirely when no `image` block is
/// found anywhere in the tree, since a bare values file with nothing to
/// extract isn't worth a node of its own.
pub fn detect_values_file(content: &str, file: &str, graph: &mut DependencyGraph) -> Result<()> {
    let yaml: Value = serde_yaml::from_str(content).context("failed to parse values.yaml")?;
    let Some(image) = find_first_image(&yaml) else {
        return Ok(());
    };

    let release_name = release_name_from_path(file);
    let id = Node::helm_release_id(&release_name);
    let node =
        Node::new(id, &release_name, NodeKind::HelmRelease, SourceLocation::point(file, 1)).with_attribute("chart", release_name.clone()).with_attribute("image", image);
    graph.add_node(node);
    Ok(())
}

fn release_name_from_path(file: &str) -> String {
    let dir = file.strip_suffix("/values.yaml").unwrap_or(file);
    dir.rsplit('/').next().filter(|s| !s.is_empty()).unwrap_or("values").to_string()
}

/// Depth-first search for the first `image: {repository, tag}` block,
/// matching the per-component shape a Helm chart's `values.yaml` typically
/// nests its image references under (e.g. `etlOrchestrator.image.repository`).
fn find_first_image(value: &Value) -> Option<String> {
    if let Some(image) = value.get("image") {
        if let Some(repository) = image.get("repository").and_then(|v| v.as_str()) {
            let tag = image.get("tag").and_then(|v| v.as_str()).unwrap_or("latest");
            return Some(format!("{repository}:{tag}"));
        }
    }
    let mapping = value.as_mapping()?;
    mapping.values().find_map(find_first_image)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEPLOYMENT_AND_SERVICE: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: api-gateway
  namespace: prod
spec:
  replicas: 3
  template:
    spec:
      containers:
        - name: api-gateway
          image: registry.example.com/api-gateway:1.2.3
---
apiVersion: v1
kind: Service
metadata:
  name: api-gateway
  namespace: prod
spec:
  type: LoadBalancer
"#;

    #[test]
    fn multi_document_manifest_yields_both_node_kinds() {
        let mut graph = DependencyGraph::new("scan-1");
        detect_manifest_file(DEPLOYMENT_AND_SERVICE, "k8s/api-gateway.yaml", &mut graph).unwrap();
        assert!(graph.contains("k8s_deployment.prod.api-gateway"));
        assert!(graph.contains("k8s_service.prod.api-gateway"));
    }

    #[test]
    fn deployment_node_carries_container_image() {
        let mut graph = DependencyGraph::new("scan-1");
        detect_manifest_file(DEPLOYMENT_AND_SERVICE, "k8s/api-gateway.yaml", &mut graph).unwrap();
        let node = graph.nodes().find(|n| n.id == "k8s_deployment.prod.api-gateway").unwrap();
        assert_eq!(node.attr_str("image"), Some("registry.example.com/api-gateway:1.2.3"));
    }

    #[test]
    fn unrelated_yaml_documents_are_skipped_without_error() {
        let mut graph = DependencyGraph::new("scan-1");
        detect_manifest_file("apiVersion: v1\nkind: Namespace\nmetadata:\n  name: prod\n", "k8s/ns.yaml", &mut graph).unwrap();
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn chart_yaml_produces_helm_release_node() {
        let mut graph = DependencyGraph::new("scan-1");
        detect_chart_file("name: data-platform\nversion: 1.0.0\n", "charts/data-platform/Chart.yaml", &mut graph).unwrap();
        let node = graph.nodes().find(|n| n.id == "helm_release.data-platform").unwrap();
        assert_eq!(node.attr_str("chartVersion"), Some("1.0.0"));
    }

    #[test]
    fn values_yaml_derives_release_name_from_directory() {
        let mut graph = DependencyGraph::new("scan-1");
        let values = "etlOrchestrator:\n  image:\n    repository: example/etl-orchestrator\n    tag: latest\n";
        detect_values_file(values, "charts/data-platform/values.yaml", &mut graph).unwrap();
        let node = graph.nodes().find(|n| n.id == "helm_release.data-platform").unwrap();
        assert_eq!(node.attr_str("image"), Some("example/etl-orchestrator:latest"));
    }

    #[test]
    fn values_yaml_without_image_block_produces_no_node() {
        let mut graph = DependencyGraph::new("scan-1");
        detect_values_file("replicaCount: 2\n", "charts/data-platform/values.yaml", &mut graph).unwrap();
        assert_eq!(graph.node_count(), 0);
    }
}
