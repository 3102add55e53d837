pub mod account;
pub mod options;
pub mod skin;
