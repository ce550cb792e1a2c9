pub mod error;
pub mod geo;
pub mod identity;
pub mod items;
pub mod meetup;
pub mod notifications;
pub mod ports;
pub mod proximity;
pub mod util;

pub type DomainResult<T> = Result<T, error::DomainError>;
