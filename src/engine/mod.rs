pub mod broadcaster;
pub mod dispatcher;
pub mod eligibility;
pub mod fleet;
pub mod lifecycle;
pub mod notifications;
pub mod selector;
