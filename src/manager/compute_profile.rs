/// Compute profile provisioning for vdcs bound to the external service
use tracing::{debug, info};

use crate::broker::models::ComputeProfileParams;
use crate::broker::Broker;
use crate::directory::{compute_profile_name, ProviderContext, VdcRef};
use crate::error::{Error, Result};

/// Build the compute profile of `vdc` in `org`
pub fn profile_params(
    ctx: &ProviderContext,
    org: &str,
    vdc: &VdcRef,
) -> Result<ComputeProfileParams> {
    let placement = ctx.placement.as_ref().ok_or_else(|| {
        Error::Configuration(format!(
            "no placement known for vdc '{}' on compute endpoint '{}'",
            vdc.name, ctx.compute_endpoint
        ))
    })?;

    Ok(ComputeProfileParams {
        cp_name: compute_profile_name(&vdc.id, &vdc.name),
        az_name: format!("az-{}", vdc.name),
        description: format!("{}--{}--{}", org, vdc.name, vdc.id),
        cpi: placement.cpi.clone(),
        datacenter_name: placement.datacenter.clone(),
        cluster_name: placement.cluster.clone(),
        ovdc_rp_name: format!("{} ({})", vdc.name, vdc.id),
    })
}

/// Submit the profile; an existing profile counts as success
pub async fn ensure_compute_profile(broker: &dyn Broker, params: &ComputeProfileParams) -> Result<()> {
    info!("Creating compute profile: {}", params.cp_name);

    match broker.create_compute_profile(params).await {
        Ok(()) => Ok(()),
        Err(Error::ProvisioningConflict { profile }) => {
            debug!("Compute profile name {} already exists", profile);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::Placement;
    use crate::testing::FakeBroker;
    use tokio_test::{assert_err, assert_ok};

    fn vdc(id: &str, name: &str) -> VdcRef {
        VdcRef {
            id: id.into(),
            name: name.into(),
            org: "Acme".into(),
        }
    }

    fn context() -> ProviderContext {
        ProviderContext {
            name: "pks-1".into(),
            host: "pks.example.com".into(),
            port: 9021,
            username: "broker".into(),
            secret: Some("secret".into()),
            compute_endpoint: "vc1".into(),
            placement: Some(Placement {
                datacenter: "dc1".into(),
                cluster: "cluster-a".into(),
                cpi: "cpi-1".into(),
            }),
            compute_profile_name: None,
            plans: vec![],
            network: None,
        }
    }

    #[test]
    fn test_profile_params_naming() {
        let params = profile_params(&context(), "Acme", &vdc("1234", "vdc-PKS1")).unwrap();
        assert_eq!(params.cp_name, "cp--1234--vdc-PKS1");
        assert_eq!(params.az_name, "az-vdc-PKS1");
        assert_eq!(params.description, "Acme--vdc-PKS1--1234");
        assert_eq!(params.ovdc_rp_name, "vdc-PKS1 (1234)");
        assert_eq!(params.cpi, "cpi-1");
        assert_eq!(params.datacenter_name, "dc1");
        assert_eq!(params.cluster_name, "cluster-a");
    }

    #[test]
    fn test_profile_params_need_placement() {
        let mut ctx = context();
        ctx.placement = None;
        let err = profile_params(&ctx, "Acme", &vdc("1234", "vdc1")).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_conflict_is_success() {
        let broker = FakeBroker::external("pks-1").with_profile_conflict();
        let params = profile_params(&context(), "Acme", &vdc("1234", "vdc1")).unwrap();
        assert_ok!(ensure_compute_profile(broker.as_ref(), &params).await);
        assert_eq!(broker.calls(), vec!["profile cp--1234--vdc1"]);
    }

    #[tokio::test]
    async fn test_other_failures_abort() {
        let broker = FakeBroker::external("pks-1").failing();
        let params = profile_params(&context(), "Acme", &vdc("1234", "vdc1")).unwrap();
        assert_err!(ensure_compute_profile(broker.as_ref(), &params).await);
    }
}
