pub mod accounts;
pub mod password;
pub mod permissions;
pub mod seed;
