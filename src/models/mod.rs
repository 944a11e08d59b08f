pub mod alert;
pub mod observation;
pub mod preference;
pub mod rule;
pub mod severity;
pub mod subscription;

pub use alert::{AlertRecord, HistoryFilter, TriggeredAlert};
pub use observation::Observation;
pub use preference::{AlertPreference, Channel, PreferencePatch};
pub use rule::{AlertRule, AlertType, ConditionSet, SeverityLadder};
pub use severity::AlertSeverity;
pub use subscription::{NewSubscription, Subscription, SubscriptionPatch};
