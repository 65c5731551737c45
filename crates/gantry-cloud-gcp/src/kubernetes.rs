//! Kubernetes object clients
//!
//! Every object is rendered to a JSON manifest and server-side applied, so
//! create and update are the same call.

use crate::kubectl::Kubectl;
use crate::status::{certificate_status, describe_status, ingress_status, phase_status, spec_mismatch};
use async_trait::async_trait;
use gantry_cloud::{AuthStatus, ExternalStatus, ResourceClient, Result};
use gantry_core::{
    Context, IngressSpec, K8sServiceAccountSpec, ManagedCertificateSpec, NamespaceSpec,
    ResourceDescriptor, ResourceSpec,
};
use serde_json::{Map, Value, json};

const MANAGED_BY: &str = "app.kubernetes.io/managed-by";

pub fn namespace_manifest(spec: &NamespaceSpec) -> Value {
    let mut labels = Map::new();
    for (key, value) in &spec.labels {
        labels.insert(key.clone(), Value::String(value.clone()));
    }
    labels.insert(MANAGED_BY.to_string(), json!("gantry"));

    json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": {
            "name": spec.name,
            "labels": labels,
        }
    })
}

pub fn service_account_manifest(spec: &K8sServiceAccountSpec) -> Value {
    let mut metadata = json!({
        "name": spec.name,
        "namespace": spec.namespace,
        "labels": { MANAGED_BY: "gantry" },
    });
    if let Some(email) = &spec.gcp_service_account {
        metadata["annotations"] = json!({ "iam.gke.io/gcp-service-account": email });
    }

    json!({
        "apiVersion": "v1",
        "kind": "ServiceAccount",
        "metadata": metadata,
    })
}

pub fn ingress_manifest(spec: &IngressSpec) -> Value {
    let mut annotations = Map::new();
    if let Some(address) = &spec.static_address {
        annotations.insert(
            "kubernetes.io/ingress.global-static-ip-name".to_string(),
            json!(address),
        );
    }
    if let Some(certificate) = &spec.certificate {
        annotations.insert(
            "networking.gke.io/managed-certificates".to_string(),
            json!(certificate),
        );
    }

    let backend = json!({
        "service": {
            "name": spec.service,
            "port": { "number": spec.port },
        }
    });
    let mut rule = json!({
        "http": {
            "paths": [{
                "path": "/",
                "pathType": "Prefix",
                "backend": backend,
            }]
        }
    });
    if let Some(host) = &spec.host {
        rule["host"] = json!(host);
    }

    let mut body = json!({
        "defaultBackend": backend,
        "rules": [rule],
    });
    if let Some(class) = &spec.ingress_class {
        body["ingressClassName"] = json!(class);
    }

    json!({
        "apiVersion": "networking.k8s.io/v1",
        "kind": "Ingress",
        "metadata": {
            "name": spec.name,
            "namespace": spec.namespace,
            "labels": { MANAGED_BY: "gantry" },
            "annotations": annotations,
        },
        "spec": body,
    })
}

pub fn certificate_manifest(spec: &ManagedCertificateSpec) -> Value {
    json!({
        "apiVersion": "networking.gke.io/v1",
        "kind": "ManagedCertificate",
        "metadata": {
            "name": spec.name,
            "namespace": spec.namespace,
            "labels": { MANAGED_BY: "gantry" },
        },
        "spec": {
            "domains": spec.domains,
        }
    })
}

/// Kubernetes namespaces
#[derive(Debug, Clone, Default)]
pub struct NamespaceClient {
    kubectl: Kubectl,
}

impl NamespaceClient {
    pub fn new(kubectl: Kubectl) -> Self {
        Self { kubectl }
    }
}

#[async_trait]
impl ResourceClient for NamespaceClient {
    fn name(&self) -> &str {
        "kubectl-namespace"
    }

    async fn check_auth(&self, ctx: &Context) -> Result<AuthStatus> {
        kubectl_auth(&self.kubectl, ctx).await
    }

    async fn create(&self, ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        let ResourceSpec::Namespace(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };
        self.kubectl.apply(ctx, &namespace_manifest(spec)).await?;
        Ok(())
    }

    async fn update(&self, ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        self.create(ctx, descriptor).await
    }

    async fn get_status(
        &self,
        ctx: &Context,
        descriptor: &ResourceDescriptor,
    ) -> Result<ExternalStatus> {
        let ResourceSpec::Namespace(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };
        Ok(
            match self.kubectl.get(ctx, "namespace", None, &spec.name).await? {
                Some(raw) => phase_status(&raw),
                None => ExternalStatus::absent(),
            },
        )
    }

    async fn delete(&self, ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        let ResourceSpec::Namespace(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };
        self.kubectl.delete(ctx, "namespace", None, &spec.name).await?;
        Ok(())
    }
}

/// Kubernetes service accounts, optionally bound to a GCP account
#[derive(Debug, Clone, Default)]
pub struct K8sServiceAccountClient {
    kubectl: Kubectl,
}

impl K8sServiceAccountClient {
    pub fn new(kubectl: Kubectl) -> Self {
        Self { kubectl }
    }
}

#[async_trait]
impl ResourceClient for K8sServiceAccountClient {
    fn name(&self) -> &str {
        "kubectl-service-account"
    }

    async fn check_auth(&self, ctx: &Context) -> Result<AuthStatus> {
        kubectl_auth(&self.kubectl, ctx).await
    }

    async fn create(&self, ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        let ResourceSpec::K8sServiceAccount(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };
        self.kubectl
            .apply(ctx, &service_account_manifest(spec))
            .await?;
        Ok(())
    }

    async fn update(&self, ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        self.create(ctx, descriptor).await
    }

    async fn get_status(
        &self,
        ctx: &Context,
        descriptor: &ResourceDescriptor,
    ) -> Result<ExternalStatus> {
        let ResourceSpec::K8sServiceAccount(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };
        let found = self
            .kubectl
            .get(ctx, "serviceaccount", Some(&spec.namespace), &spec.name)
            .await?;
        Ok(describe_status(found))
    }

    async fn delete(&self, ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        let ResourceSpec::K8sServiceAccount(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };
        self.kubectl
            .delete(ctx, "serviceaccount", Some(&spec.namespace), &spec.name)
            .await?;
        Ok(())
    }
}

/// Kubernetes ingresses
#[derive(Debug, Clone, Default)]
pub struct IngressClient {
    kubectl: Kubectl,
}

impl IngressClient {
    pub fn new(kubectl: Kubectl) -> Self {
        Self { kubectl }
    }
}

#[async_trait]
impl ResourceClient for IngressClient {
    fn name(&self) -> &str {
        "kubectl-ingress"
    }

    async fn check_auth(&self, ctx: &Context) -> Result<AuthStatus> {
        kubectl_auth(&self.kubectl, ctx).await
    }

    async fn create(&self, ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        let ResourceSpec::Ingress(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };
        self.kubectl.apply(ctx, &ingress_manifest(spec)).await?;
        Ok(())
    }

    async fn update(&self, ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        self.create(ctx, descriptor).await
    }

    async fn get_status(
        &self,
        ctx: &Context,
        descriptor: &ResourceDescriptor,
    ) -> Result<ExternalStatus> {
        let ResourceSpec::Ingress(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };
        Ok(
            match self
                .kubectl
                .get(ctx, "ingress", Some(&spec.namespace), &spec.name)
                .await?
            {
                Some(raw) => ingress_status(&raw),
                None => ExternalStatus::absent(),
            },
        )
    }

    async fn delete(&self, ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        let ResourceSpec::Ingress(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };
        self.kubectl
            .delete(ctx, "ingress", Some(&spec.namespace), &spec.name)
            .await?;
        Ok(())
    }
}

/// GKE ManagedCertificate objects
#[derive(Debug, Clone, Default)]
pub struct ManagedCertificateClient {
    kubectl: Kubectl,
}

impl ManagedCertificateClient {
    pub fn new(kubectl: Kubectl) -> Self {
        Self { kubectl }
    }
}

#[async_trait]
impl ResourceClient for ManagedCertificateClient {
    fn name(&self) -> &str {
        "kubectl-managed-certificate"
    }

    async fn check_auth(&self, ctx: &Context) -> Result<AuthStatus> {
        kubectl_auth(&self.kubectl, ctx).await
    }

    async fn create(&self, ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        let ResourceSpec::ManagedCertificate(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };
        self.kubectl.apply(ctx, &certificate_manifest(spec)).await?;
        Ok(())
    }

    async fn update(&self, ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        self.create(ctx, descriptor).await
    }

    async fn get_status(
        &self,
        ctx: &Context,
        descriptor: &ResourceDescriptor,
    ) -> Result<ExternalStatus> {
        let ResourceSpec::ManagedCertificate(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };
        Ok(
            match self
                .kubectl
                .get(ctx, "managedcertificate", Some(&spec.namespace), &spec.name)
                .await?
            {
                Some(raw) => certificate_status(&raw),
                None => ExternalStatus::absent(),
            },
        )
    }

    async fn delete(&self, ctx: &Context, descriptor: &ResourceDescriptor) -> Result<()> {
        let ResourceSpec::ManagedCertificate(spec) = &descriptor.spec else {
            return Err(spec_mismatch(self.name(), descriptor));
        };
        self.kubectl
            .delete(ctx, "managedcertificate", Some(&spec.namespace), &spec.name)
            .await?;
        Ok(())
    }
}

async fn kubectl_auth(kubectl: &Kubectl, ctx: &Context) -> Result<AuthStatus> {
    Ok(match kubectl.check_auth(ctx).await {
        Ok(context) => AuthStatus::ok(context),
        Err(e) => AuthStatus::failed(e.to_string()),
    })
}
