//! Shared-secret HTTP provisioning API over the alias provisioner.

pub mod provisioning_api;

pub use provisioning_api::{
    build_provisioning_api_router, run_provisioning_api, ProvisioningApiConfig,
    ProvisioningApiState, DEFAULT_SHARED_SECRET,
};
