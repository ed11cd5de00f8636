//! Domain layer: rules, states, transitions, queries and frames.
//!
//! These are plain value types. The evaluation engine owns them and hands
//! copies to the history backends.

pub mod frame;
pub mod labels;
pub mod query;
pub mod rule_meta;
pub mod state;
pub mod transition;

pub use frame::{Field, FieldValues, Frame};
pub use labels::Labels;
pub use query::{HistoryQuery, Identity};
pub use rule_meta::{AlertRule, PanelKey, RuleMeta};
pub use state::State;
pub use transition::{AlertState, StateTransition};
