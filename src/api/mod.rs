pub(crate) mod auth;
pub(crate) mod errors;
pub(crate) mod exam;
pub(crate) mod guards;
pub(crate) mod handlers;
pub(crate) mod results;
pub(crate) mod router;
pub(crate) mod summaries;
