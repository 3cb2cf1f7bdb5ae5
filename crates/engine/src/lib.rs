pub use accounts::Account;
pub use currency::Currency;
pub use error::EngineError;
pub use ops::{Engine, EngineBuilder};
pub use principal::{Principal, Role};
pub use users::UserProfile;

mod accounts;
mod currency;
mod error;
mod ops;
mod policy;
mod principal;
mod users;
mod util;

type ResultEngine<T> = Result<T, EngineError>;
