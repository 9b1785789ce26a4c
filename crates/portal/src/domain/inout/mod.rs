pub mod gate;
pub mod onboarding;

pub mod prelude {
    pub use super::gate::*;
    pub use super::onboarding::*;
}
