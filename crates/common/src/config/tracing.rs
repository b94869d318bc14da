//! OTLP 追踪配置（`[observability.tracing]`）

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Service name prefix; the running role is appended when no name is configured.
pub const SERVICE_NAME_PREFIX: &str = "wifi-ha";

fn default_endpoint() -> String {
    "http://127.0.0.1:4317".to_string()
}

fn default_sample_ratio() -> f64 {
    1.0
}

/// OTLP span export settings.
///
/// Only takes effect in builds with the `opentelemetry` feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracingConfig {
    #[serde(default)]
    pub enable: bool,

    /// 覆盖默认服务名；不设置时为 `wifi-ha-gateway` / `wifi-ha-operator`
    #[serde(default)]
    pub service_name: Option<String>,

    /// OTLP gRPC endpoint (collector, Tempo, Jaeger ...)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// 采样比例（0.0 - 1.0）
    ///
    /// Each cluster runs a reconcile pass every few seconds, so a large fleet
    /// usually wants this well below 1.
    #[serde(default = "default_sample_ratio")]
    pub sample_ratio: f64,

    /// Extra resource attributes, e.g. `site = "pop-3"`.
    #[serde(default)]
    pub resource_attributes: BTreeMap<String, String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enable: false,
            service_name: None,
            endpoint: default_endpoint(),
            sample_ratio: default_sample_ratio(),
            resource_attributes: BTreeMap::new(),
        }
    }
}

impl TracingConfig {
    /// Service name reported to the backend for a process running `component`.
    ///
    /// A process running both roles reports the bare prefix.
    pub fn service_name_for(&self, component: Option<&str>) -> String {
        match (&self.service_name, component) {
            (Some(name), _) => name.clone(),
            (None, Some(component)) => format!("{SERVICE_NAME_PREFIX}-{component}"),
            (None, None) => SERVICE_NAME_PREFIX.to_string(),
        }
    }

    /// 校验追踪配置；未启用时不检查
    pub fn validate(&self) -> Result<(), Vec<String>> {
        if !self.enable {
            return Ok(());
        }

        let mut errors = Vec::new();
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            errors.push(format!(
                "endpoint '{}' must start with http:// or https://",
                self.endpoint
            ));
        }
        if !(0.0..=1.0).contains(&self.sample_ratio) {
            errors.push(format!(
                "sample_ratio must be within 0.0..=1.0, got {}",
                self.sample_ratio
            ));
        }
        if let Some(name) = &self.service_name
            && name.trim().is_empty()
        {
            errors.push("service_name cannot be empty when set".to_string());
        }
        if self.resource_attributes.keys().any(|k| k.trim().is_empty()) {
            errors.push("resource_attributes keys cannot be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_name_follows_role() {
        let config = TracingConfig::default();
        assert_eq!(config.service_name_for(Some("gateway")), "wifi-ha-gateway");
        assert_eq!(config.service_name_for(Some("operator")), "wifi-ha-operator");
        assert_eq!(config.service_name_for(None), "wifi-ha");

        let config = TracingConfig {
            service_name: Some("cwf-ha-east".to_string()),
            ..Default::default()
        };
        assert_eq!(config.service_name_for(Some("gateway")), "cwf-ha-east");
    }

    #[test]
    fn test_disabled_tracing_skips_validation() {
        let config = TracingConfig {
            endpoint: "collector:4317".to_string(),
            sample_ratio: 3.0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_collects_every_problem() {
        let config = TracingConfig {
            enable: true,
            service_name: Some(" ".to_string()),
            endpoint: "collector:4317".to_string(),
            sample_ratio: 1.5,
            resource_attributes: BTreeMap::from([(String::new(), "x".to_string())]),
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 4, "{errors:?}");
        assert!(errors[0].contains("collector:4317"));
        assert!(errors[1].contains("sample_ratio"));
    }

    #[test]
    fn test_resource_attributes_from_toml() {
        let config: TracingConfig = toml::from_str(
            r#"
            enable = true
            sample_ratio = 0.1

            [resource_attributes]
            site = "pop-3"
            carrier = "acme"
            "#,
        )
        .unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.service_name, None);
        assert_eq!(config.resource_attributes["site"], "pop-3");
        assert_eq!(config.resource_attributes.len(), 2);
    }
}
