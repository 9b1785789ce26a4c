pub mod gate;
pub mod onboarding;
pub mod resolver;
pub mod routing;
pub mod watcher;
pub mod wizard;
