use super::DeployError;
use crate::models::{
    is_error, ConditionType, DataPlaneStatus, ExternalCompute, NOVA_COMPUTE_READY, READY,
};

/// Reflect the compute record's readiness onto the node status.
///
/// The record's `Ready` condition is copied into `status` as
/// `NovaComputeReady`; when the record has not reported `Ready` yet the node
/// condition is left as it was. Fails only when the tracked condition is an
/// explicit error.
pub fn mirror_compute_status(
    compute: &ExternalCompute,
    status: &mut DataPlaneStatus,
) -> Result<(), DeployError> {
    let conditions = &compute.status.conditions;

    if let Some(mirrored) = conditions.mirror(NOVA_COMPUTE_READY) {
        status.conditions.set(mirrored);
    }

    match conditions.get(&ConditionType::from(READY)) {
        Some(ready) => tracing::info!(
            "NovaExternalCompute ReadyCondition status: {}",
            ready.status
        ),
        None => tracing::info!("NovaExternalCompute ReadyCondition not yet set"),
    }

    let tracked = status.conditions.get(&ConditionType::from(NOVA_COMPUTE_READY));
    if is_error(tracked) {
        tracing::info!("{} error", NOVA_COMPUTE_READY);
        let (reason, message) = tracked
            .map(|c| (c.reason.clone(), c.message.clone()))
            .unwrap_or_default();
        return Err(DeployError::ComputeFailed {
            name: compute.metadata.name.clone(),
            namespace: compute.metadata.namespace.clone(),
            reason,
            message,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Condition, ConditionStatus, ObjectKey, Severity};

    fn compute_with(conditions: Vec<Condition>) -> ExternalCompute {
        let mut compute = ExternalCompute::blank(&ObjectKey::new("openstack", "edpm-0"));
        compute.status.conditions = conditions.into_iter().collect();
        compute
    }

    fn tracked(status: &DataPlaneStatus) -> Option<&Condition> {
        status.conditions.get(&NOVA_COMPUTE_READY.into())
    }

    #[test]
    fn absent_ready_leaves_unset_condition_unset() {
        let mut status = DataPlaneStatus::default();

        mirror_compute_status(&compute_with(vec![]), &mut status).unwrap();

        assert!(tracked(&status).is_none());
    }

    #[test]
    fn absent_ready_leaves_prior_value_untouched() {
        let mut status = DataPlaneStatus::default();
        let prior = Condition::false_(NOVA_COMPUTE_READY, Severity::Error, "Old", "old failure");
        status.conditions.set(prior.clone());

        // Stale error is still reported.
        let err = mirror_compute_status(&compute_with(vec![]), &mut status).unwrap_err();

        assert_eq!(tracked(&status), Some(&prior));
        assert!(matches!(err, DeployError::ComputeFailed { .. }));
    }

    #[test]
    fn ready_true_is_copied_and_succeeds() {
        let mut status = DataPlaneStatus::default();
        let compute = compute_with(vec![Condition::true_(READY, "Ready", "Setup complete")]);

        mirror_compute_status(&compute, &mut status).unwrap();

        let condition = tracked(&status).unwrap();
        assert_eq!(condition.status, ConditionStatus::True);
        assert_eq!(condition.reason, "Ready");
        assert_eq!(condition.message, "Setup complete");
    }

    #[test]
    fn progressing_compute_does_not_fail() {
        for condition in [
            Condition::unknown(READY, "Init", ""),
            Condition::false_(READY, Severity::Info, "Requested", "deployment in progress"),
            Condition::false_(READY, Severity::Warning, "Degraded", "retrying"),
        ] {
            let mut status = DataPlaneStatus::default();
            let expected = condition.status;

            mirror_compute_status(&compute_with(vec![condition]), &mut status).unwrap();

            assert_eq!(tracked(&status).unwrap().status, expected);
        }
    }

    #[test]
    fn error_is_mirrored_and_fails_naming_the_record() {
        let mut status = DataPlaneStatus::default();
        let compute = compute_with(vec![Condition::false_(
            READY,
            Severity::Error,
            "Error",
            "playbook failed",
        )]);

        let err = mirror_compute_status(&compute, &mut status).unwrap_err();

        assert_eq!(
            err.to_string(),
            "failed: NovaExternalCompute name edpm-0 NovaExternalCompute namespace openstack"
        );
        let condition = tracked(&status).unwrap();
        assert_eq!(condition.status, ConditionStatus::False);
        assert_eq!(condition.severity, Severity::Error);
        assert_eq!(condition.message, "playbook failed");
    }

    #[test]
    fn recovery_clears_a_previous_error() {
        let mut status = DataPlaneStatus::default();
        status.conditions.set(Condition::false_(
            NOVA_COMPUTE_READY,
            Severity::Error,
            "Error",
            "playbook failed",
        ));
        let compute = compute_with(vec![Condition::true_(READY, "Ready", "Setup complete")]);

        mirror_compute_status(&compute, &mut status).unwrap();

        assert!(tracked(&status).unwrap().is_true());
    }
}
