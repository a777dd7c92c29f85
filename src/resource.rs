// SPDX-License-Identifier: MIT
//! Resource (service identity) attached to every span, metric and log record.

use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions::resource::SERVICE_VERSION;

use crate::error::ConfigError;

/// `service.version` used when none is configured.
pub const DEFAULT_SERVICE_VERSION: &str = "1.0";
/// `deployment.environment` used when none is configured.
pub const DEFAULT_ENVIRONMENT: &str = "production";
/// Resource key for the deployment environment.
pub const DEPLOYMENT_ENVIRONMENT: &str = "deployment.environment";

/// Static identity of the running service.
///
/// The name is mandatory: an unnamed service is rejected with
/// [`ConfigError::MissingServiceName`] instead of exporting telemetry under an
/// empty identity. Version and environment fall back to [`DEFAULT_SERVICE_VERSION`]
/// and [`DEFAULT_ENVIRONMENT`] when empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceIdentity {
    name: String,
    version: String,
    environment: String,
}

impl ServiceIdentity {
    pub fn new(
        name: impl Into<String>,
        version: Option<String>,
        environment: Option<String>,
    ) -> Result<Self, ConfigError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(ConfigError::MissingServiceName);
        }
        Ok(Self {
            name,
            version: non_empty_or(version, DEFAULT_SERVICE_VERSION),
            environment: non_empty_or(environment, DEFAULT_ENVIRONMENT),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }
}

fn non_empty_or(value: Option<String>, default: &str) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Build the shared resource for all three providers.
///
/// SDK defaults (`telemetry.sdk.*`, `OTEL_RESOURCE_ATTRIBUTES`) are merged first and the
/// service identity is applied on top, so the configured identity always wins.
/// Pure construction: no I/O. `Resource` is reference counted, so clones handed to
/// the providers share one descriptor.
pub fn build_resource(identity: &ServiceIdentity) -> Resource {
    Resource::builder()
        .with_service_name(identity.name.clone())
        .with_attributes([
            KeyValue::new(SERVICE_VERSION, identity.version.clone()),
            KeyValue::new(DEPLOYMENT_ENVIRONMENT, identity.environment.clone()),
        ])
        .build()
}
