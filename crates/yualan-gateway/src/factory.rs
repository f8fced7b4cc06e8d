//! # Gateway Client Factory
//!
//! Builds a client per tenant and provider from the tenant's own credentials.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  iPaymu credential resolution                                           │
//! │                                                                         │
//! │  tenant.ipaymu_va ──────── missing? ──► platform va                     │
//! │  tenant.ipaymu_secret_key ─ missing? ──► platform api key               │
//! │                                                                         │
//! │  any platform value used ─► platform base URL                           │
//! │  otherwise               ─► tenant mode (production │ sandbox) URL      │
//! │  still missing           ─► GatewayError::NotConfigured                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use yualan_core::{GatewayMode, PaymentMethod, Tenant};

use crate::client::GatewayClient;
use crate::error::{GatewayError, GatewayResult};
use crate::ipaymu::{IpaymuClient, IpaymuCredentials, IPAYMU_PRODUCTION_URL, IPAYMU_SANDBOX_URL};
use crate::midtrans::{MidtransClient, MidtransCredentials};

/// Produces a gateway client for a tenant.
///
/// The services depend on this trait so tests can hand out scripted clients.
pub trait GatewayFactory: Send + Sync {
    fn client_for(
        &self,
        tenant: &Tenant,
        provider: PaymentMethod,
    ) -> GatewayResult<Arc<dyn GatewayClient>>;
}

/// Platform-level iPaymu account used when a tenant has none.
#[derive(Clone, Default)]
pub struct PlatformIpaymu {
    pub va: Option<String>,
    pub api_key: Option<String>,
    pub base_url: String,
}

impl std::fmt::Debug for PlatformIpaymu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformIpaymu")
            .field("va", &self.va)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Builds real HTTP clients from tenant credentials.
#[derive(Debug, Clone)]
pub struct TenantGatewayFactory {
    http: reqwest::Client,
    platform_ipaymu: PlatformIpaymu,
}

impl TenantGatewayFactory {
    /// One shared connection pool with a per-request timeout.
    pub fn new(timeout: Duration, platform_ipaymu: PlatformIpaymu) -> GatewayResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("yualan-reconciler/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::not_configured(PaymentMethod::Ipaymu, e.to_string()))?;

        Ok(TenantGatewayFactory {
            http,
            platform_ipaymu,
        })
    }

    /// Resolves the iPaymu credentials a tenant's calls are made with.
    pub fn ipaymu_credentials(&self, tenant: &Tenant) -> GatewayResult<IpaymuCredentials> {
        let tenant_va = non_empty(&tenant.ipaymu_va);
        let tenant_secret = non_empty(&tenant.ipaymu_secret_key);
        let uses_platform = tenant_va.is_none() || tenant_secret.is_none();

        let va = tenant_va.or_else(|| non_empty(&self.platform_ipaymu.va));
        let secret = tenant_secret.or_else(|| non_empty(&self.platform_ipaymu.api_key));

        let (Some(va), Some(secret)) = (va, secret) else {
            return Err(GatewayError::not_configured(
                PaymentMethod::Ipaymu,
                format!("no VA or API key for tenant {} ({})", tenant.name, tenant.slug),
            ));
        };

        let base_url = if uses_platform {
            self.platform_ipaymu.base_url.clone()
        } else {
            match tenant.ipaymu_mode {
                GatewayMode::Production => IPAYMU_PRODUCTION_URL.to_string(),
                GatewayMode::Sandbox => IPAYMU_SANDBOX_URL.to_string(),
            }
        };

        Ok(IpaymuCredentials {
            va,
            secret,
            base_url,
        })
    }

    fn midtrans_credentials(&self, tenant: &Tenant) -> GatewayResult<MidtransCredentials> {
        let server_key = non_empty(&tenant.midtrans_server_key).ok_or_else(|| {
            GatewayError::not_configured(
                PaymentMethod::Midtrans,
                format!("no server key for tenant {} ({})", tenant.name, tenant.slug),
            )
        })?;

        Ok(MidtransCredentials {
            server_key,
            is_production: tenant.midtrans_is_production,
        })
    }
}

impl GatewayFactory for TenantGatewayFactory {
    fn client_for(
        &self,
        tenant: &Tenant,
        provider: PaymentMethod,
    ) -> GatewayResult<Arc<dyn GatewayClient>> {
        match provider {
            PaymentMethod::Ipaymu => Ok(Arc::new(IpaymuClient::new(
                self.http.clone(),
                self.ipaymu_credentials(tenant)?,
            ))),
            PaymentMethod::Midtrans => Ok(Arc::new(MidtransClient::new(
                self.http.clone(),
                self.midtrans_credentials(tenant)?,
            ))),
            PaymentMethod::Cash => Err(GatewayError::Unsupported {
                provider,
                operation: "gateway calls",
            }),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
