//! Hardware autofocus on the nuclear stain channel.
//!
//! `focus` is a single attempt: select the channel at its defaults and
//! trigger the focus unit once. Retry policy is not this component's
//! concern; the run controller applies the configured attempt count and
//! the fault-kind contract (well-permanent faults are not retried)
//! around this call.

use acq_core::capabilities::MicroscopeGateway;
use acq_core::error::DeviceFault;
use acq_core::settings::ChannelSettings;

#[derive(Debug, Clone)]
pub struct AutofocusController {
    channel: ChannelSettings,
}

impl AutofocusController {
    pub fn new(channel: ChannelSettings) -> Self {
        Self { channel }
    }

    /// Select the focus channel at defaults and run autofocus once.
    /// Leaves the focus channel selected on success so a confluency
    /// snapshot can follow directly.
    pub async fn focus(&self, scope: &dyn MicroscopeGateway) -> Result<(), DeviceFault> {
        scope.select_channel(&self.channel).await?;
        scope
            .set_exposure(self.channel.default_exposure_time)
            .await?;
        scope
            .set_laser_power(self.channel.default_laser_power)
            .await?;
        scope.autofocus().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acq_core::error::FaultKind;
    use acq_driver_mock::MockMicroscope;

    #[tokio::test]
    async fn focus_triggers_exactly_one_autofocus_call() {
        let scope = MockMicroscope::builder().build();
        let positions = scope.position_list().await.unwrap();
        scope.move_to(&positions[0]).await.unwrap();

        let controller = AutofocusController::new(ChannelSettings::dapi());
        assert!(controller.focus(&scope).await.is_ok());
        assert_eq!(scope.afc_call_count(), 1);
    }

    #[tokio::test]
    async fn focus_does_not_retry_internally() {
        let scope = MockMicroscope::builder()
            .afc_fail_on_first_n_calls(1)
            .build();
        let positions = scope.position_list().await.unwrap();
        scope.move_to(&positions[0]).await.unwrap();

        let controller = AutofocusController::new(ChannelSettings::dapi());
        let err = controller.focus(&scope).await.unwrap_err();
        assert_eq!(err.kind, FaultKind::WarmUp);
        assert_eq!(scope.afc_call_count(), 1);

        // A second call from the policy layer succeeds.
        assert!(controller.focus(&scope).await.is_ok());
        assert_eq!(scope.afc_call_count(), 2);
    }
}
