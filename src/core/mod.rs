pub mod identifiers;
pub mod presentation;
pub mod presentation_exchange;
pub mod response;
