pub mod jwt;
pub mod ownership;
pub mod password;
