use serde::Serialize;

use super::account::DoctorState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressStep {
    pub title: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'static str>,
    pub completed: bool,
}

/// What the onboarding status page shows for a doctor record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingProgress {
    pub state: DoctorState,
    pub steps: Vec<ProgressStep>,
}

impl OnboardingProgress {
    pub fn for_state(state: DoctorState) -> Self {
        let submitted = matches!(state, DoctorState::Pending | DoctorState::Approved);
        let approved = state == DoctorState::Approved;

        let steps = vec![
            ProgressStep {
                title: "Create user account",
                description: Some("Create your doctor user account."),
                completed: true,
            },
            ProgressStep { title: "List your practice", description: None, completed: submitted },
            ProgressStep {
                title: "Pending verification",
                description: Some("This process takes 1 to 2 business days. Hang tight!"),
                completed: submitted,
            },
            ProgressStep {
                title: "Ready to go live",
                description: Some("Congratulations, you are now a verified HealthLane partner!"),
                completed: approved,
            },
        ];

        Self { state, steps }
    }

    pub fn is_approved(&self) -> bool {
        self.state == DoctorState::Approved
    }
}
