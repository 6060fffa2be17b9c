mod inbound;
mod middleware;
mod public;

pub use inbound::inbound_request;
pub use public::{HttpState, build_router, outcome_response, tracking_cookie};
