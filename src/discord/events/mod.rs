pub mod gateway_events;

pub use gateway_events::{MemberJoinLog, ReadyLog};
