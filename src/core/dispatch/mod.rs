pub mod dispatch_router;
pub mod interaction;

pub use dispatch_router::*;
pub use interaction::{
    Caller, CommandInteraction, InboundInteraction, Invocation, OptionValue, PermissionSet, Reply,
    ReplyError, ReplyTransport, Responder,
};
