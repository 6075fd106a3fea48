use crate::model::Labels;
use crate::model::ResourceDescriptor;

pub const DEFAULT_RESOURCE_TYPE: &str = "gke_container";

/// Identity of the machine the collector runs on, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceConfig {
    pub resource_type: String,
    pub project: String,
    pub zone: String,
    pub cluster: String,
    pub instance: String,
}

impl ResourceConfig {
    /// Descriptor attached to every point of the given component.
    pub fn descriptor_for(&self, component: &str) -> ResourceDescriptor {
        let mut labels = Labels::new();
        labels.insert("project_id".to_string(), self.project.clone());
        labels.insert("zone".to_string(), self.zone.clone());
        labels.insert("cluster_name".to_string(), self.cluster.clone());
        labels.insert("instance_id".to_string(), self.instance.clone());
        labels.insert("container_name".to_string(), component.to_string());
        ResourceDescriptor {
            resource_type: self.resource_type.clone(),
            labels,
        }
    }
}
