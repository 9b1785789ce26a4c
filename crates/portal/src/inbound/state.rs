use std::sync::Arc;

use app_core::config::Config;
use tower_cookies::Key;

use crate::outbound::identity::IdentityService;
use crate::usecase::gate::GateUseCase;
use crate::usecase::onboarding::OnboardingUseCase;

#[derive(Clone)]
pub struct PortalState {
    pub cookie_key: Key,
    pub config: Arc<Config>,
    pub identity: Arc<dyn IdentityService>,
    pub gate: Arc<dyn GateUseCase>,
    pub onboarding: Arc<dyn OnboardingUseCase>,
}

impl PortalState {
    pub fn new(
        cookie_key: Key,
        config: Arc<Config>,
        identity: Arc<dyn IdentityService>,
        gate: Arc<dyn GateUseCase>,
        onboarding: Arc<dyn OnboardingUseCase>,
    ) -> Self {
        Self { cookie_key, config, identity, gate, onboarding }
    }
}

#[cfg(test)]
mod tests {
    use app_core::config::test_utils::TestConfigBuilder;

    use super::*;
    use crate::outbound::identity::MockIdentityService;
    use crate::usecase::gate::MockGateUseCase;
    use crate::usecase::onboarding::MockOnboardingUseCase;

    #[test]
    fn test_portal_state_new() {
        let cookie_key = Key::generate();
        let identity: Arc<dyn IdentityService> = Arc::new(MockIdentityService::new());
        let gate: Arc<dyn GateUseCase> = Arc::new(MockGateUseCase::new());
        let onboarding: Arc<dyn OnboardingUseCase> = Arc::new(MockOnboardingUseCase::new());

        let config = Arc::new(TestConfigBuilder::new().build());

        let state = PortalState::new(cookie_key.clone(), config, identity.clone(), gate.clone(), onboarding.clone());

        assert!(Arc::ptr_eq(&state.identity, &identity));
        assert!(Arc::ptr_eq(&state.gate, &gate));
        assert!(Arc::ptr_eq(&state.onboarding, &onboarding));
        assert_eq!(state.cookie_key.master(), cookie_key.master());
    }
}
