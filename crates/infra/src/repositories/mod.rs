mod items;
mod notifications;
mod rows;
mod users;

pub use items::*;
pub use notifications::*;
pub use users::*;
