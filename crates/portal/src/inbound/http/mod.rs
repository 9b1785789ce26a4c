pub mod gate;
pub mod onboarding;
